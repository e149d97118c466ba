//! The single-target, batch and inspect commands.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use headshot::progress::{self, ProgressReceiver};
use headshot::{
    validate_address, CancelHandle, ChromiumDocument, Document, HtmlDocument, HttpFetcher,
    NavigateOptions, Pipeline, ProgressEventKind, Settings, TargetState, WaitCondition,
};

use crate::{output, GlobalArgs, Status, UsageError};

/// Launch Chromium and wire it to an HTTP fetcher.
async fn open_pipeline(global: &GlobalArgs, settings: Settings, out: &Path) -> Result<Pipeline> {
    let registry = global.candidate_registry(&settings)?;
    let fetcher = HttpFetcher::new(settings.fetch_timeout, &settings.user_agent)
        .context("could not build HTTP client")?;
    let document = ChromiumDocument::launch(&settings.chromium_options())
        .await
        .context("could not start Chromium (run `headshot doctor`)")?;
    Ok(Pipeline::new(
        Box::new(document),
        Arc::new(fetcher),
        registry,
        settings,
        out,
    ))
}

/// Cancel on the first Ctrl-C, exit on the second.
fn cancel_on_ctrl_c(handle: CancelHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("Interrupted, abandoning the current target (Ctrl-C again to quit)");
        handle.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(Status::Failure.code().into());
        }
    });
}

async fn shutdown(pipeline: Pipeline) {
    if let Err(e) = pipeline.shutdown().await {
        tracing::warn!("browser did not close cleanly: {e}");
    }
}

/// `headshot <ADDRESS> [OUTPUT_DIR]`
pub async fn single(global: &GlobalArgs, address: &str, out: &Path) -> Result<Status> {
    let settings = global.settings(Settings::from_env());
    validate_address(address, &settings.address_rules())?;

    let mut pipeline = open_pipeline(global, settings, out).await?;
    cancel_on_ctrl_c(pipeline.cancel_handle());
    let result = pipeline.run_single(address).await;
    shutdown(pipeline).await;
    let result = result?;

    output::print_result(&result, global.json);
    Ok(Status::from_success(result.is_success()))
}

/// Addresses from the command line followed by those in `file`.
///
/// Blank lines and lines starting with `#` are skipped.
pub fn collect_targets(addresses: &[String], file: Option<&Path>) -> Result<Vec<String>> {
    let mut targets: Vec<String> = addresses.iter().map(|a| a.trim().to_string()).collect();
    if let Some(path) = file {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| UsageError(format!("cannot read {}: {e}", path.display())))?;
        targets.extend(
            raw.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string),
        );
    }
    targets.retain(|t| !t.is_empty());
    if targets.is_empty() {
        return Err(UsageError("no addresses given".to_string()).into());
    }
    Ok(targets)
}

/// Print per-target progress to stderr until the pipeline drops its sender.
fn spawn_progress_printer(mut rx: ProgressReceiver, total: usize) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => match ev.event {
                    ProgressEventKind::StateChanged { state } => match state {
                        TargetState::Resolving
                        | TargetState::Retrieving
                        | TargetState::DiagnosingFailure => eprintln!(
                            "[{}/{}] {} {}",
                            ev.target_index + 1,
                            total,
                            state,
                            ev.target_id
                        ),
                        s if s.is_terminal() => eprintln!("      {s}"),
                        _ => {}
                    },
                    ProgressEventKind::CooldownStarted { ms } => {
                        eprintln!("      waiting {ms}ms before the next target")
                    }
                    ProgressEventKind::Warning { message } => eprintln!("      warning: {message}"),
                    ProgressEventKind::SelectorTried { .. } => {}
                },
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// `headshot batch`
pub async fn batch(
    global: &GlobalArgs,
    addresses: &[String],
    file: Option<&Path>,
    out: &Path,
) -> Result<Status> {
    let targets = collect_targets(addresses, file)?;
    let settings = global.settings(Settings::from_env());

    let mut pipeline = open_pipeline(global, settings, out).await?;
    let printer = if global.json {
        None
    } else {
        let (tx, rx) = progress::channel();
        pipeline = pipeline.with_progress(tx);
        Some(spawn_progress_printer(rx, targets.len()))
    };
    cancel_on_ctrl_c(pipeline.cancel_handle());

    let report = pipeline.run_batch(&targets).await;
    shutdown(pipeline).await;
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    output::print_report(&report, global.json);
    Ok(Status::from_success(report.all_succeeded()))
}

/// `headshot inspect`
pub async fn inspect(global: &GlobalArgs, html_file: &Path, base_url: Option<&str>) -> Result<Status> {
    let settings = global.settings(Settings::from_env());
    let registry = global.candidate_registry(&settings)?;

    let address = match base_url {
        Some(url) => url.to_string(),
        None => {
            let full = std::fs::canonicalize(html_file)
                .map_err(|e| UsageError(format!("cannot read {}: {e}", html_file.display())))?;
            format!("file://{}", full.display())
        }
    };
    let mut document = HtmlDocument::from_file(html_file, &address)
        .map_err(|e| UsageError(format!("cannot read {}: {e}", html_file.display())))?;
    document
        .navigate(
            &address,
            NavigateOptions {
                wait_condition: WaitCondition::DomContentLoaded,
                timeout: settings.nav_timeout,
            },
        )
        .await?;

    let report = headshot::inspect(&mut document, &registry, Duration::ZERO).await;
    output::print_inspection(&report, global.json);
    Ok(Status::from_success(matches!(
        report.outcome,
        headshot::ResolutionOutcome::Found(_)
    )))
}
