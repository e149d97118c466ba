//! Progress events and the broadcast channel that carries them.
//!
//! The pipeline emits `ProgressEvent`s as each target moves through its
//! states. Events go through a `tokio::sync::broadcast` channel to any
//! subscriber; with no subscriber they are dropped.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    Pending,
    Resolving,
    Retrieving,
    Persisting,
    DiagnosingFailure,
    Succeeded,
    Failed,
}

impl TargetState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for TargetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Resolving => "resolving",
            Self::Retrieving => "retrieving",
            Self::Persisting => "persisting",
            Self::DiagnosingFailure => "diagnosing failure",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A progress event for one target of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Position of the target in the input list.
    pub target_index: usize,
    /// The target address.
    pub target_id: String,
    /// Monotonically increasing across the run.
    pub seq: u64,
    pub event: ProgressEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    StateChanged { state: TargetState },
    SelectorTried { selector: String, matched: usize, accepted: bool },
    CooldownStarted { ms: u64 },
    Warning { message: String },
}

pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// A bounded broadcast channel; a full default registry run emits well
/// under 256 events per target.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Emit an event, ignoring the error raised when nobody is listening.
pub fn emit(
    tx: &Option<ProgressSender>,
    target_index: usize,
    target_id: &str,
    seq: &mut u64,
    event: ProgressEventKind,
) {
    if let Some(ref sender) = tx {
        *seq += 1;
        let _ = sender.send(ProgressEvent {
            target_index,
            target_id: target_id.to_string(),
            seq: *seq,
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = ProgressEvent {
            target_index: 1,
            target_id: "https://example.com/in/alice/".to_string(),
            seq: 3,
            event: ProgressEventKind::StateChanged {
                state: TargetState::DiagnosingFailure,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("StateChanged"));
        assert!(json.contains("diagnosing_failure"));

        let parsed: ProgressEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.seq, 3);
        assert_eq!(parsed.target_index, 1);
    }

    #[tokio::test]
    async fn test_emit_increments_seq() {
        let (tx, mut rx) = channel();
        let tx = Some(tx);
        let mut seq = 0;
        emit(&tx, 0, "a", &mut seq, ProgressEventKind::CooldownStarted { ms: 10 });
        emit(
            &tx,
            0,
            "a",
            &mut seq,
            ProgressEventKind::Warning {
                message: "w".into(),
            },
        );
        assert_eq!(seq, 2);
        assert_eq!(rx.recv().await.unwrap().seq, 1);
        assert_eq!(rx.recv().await.unwrap().seq, 2);
    }

    #[test]
    fn test_emit_without_listeners() {
        let (tx, rx) = channel();
        drop(rx);
        let mut seq = 0;
        emit(
            &Some(tx),
            0,
            "a",
            &mut seq,
            ProgressEventKind::CooldownStarted { ms: 1 },
        );
        emit(&None, 0, "a", &mut seq, ProgressEventKind::CooldownStarted { ms: 1 });
        assert_eq!(seq, 1);
    }

    #[test]
    fn test_terminal_states() {
        assert!(TargetState::Succeeded.is_terminal());
        assert!(TargetState::Failed.is_terminal());
        assert!(!TargetState::Persisting.is_terminal());
        assert_eq!(TargetState::DiagnosingFailure.to_string(), "diagnosing failure");
    }
}
