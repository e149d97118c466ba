// Copyright 2026 Headshot Contributors
// SPDX-License-Identifier: MIT

//! Argument parsing and command dispatch for the `headshot` binary.

pub mod commands;
pub mod doctor;
pub mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use headshot::{CandidateRegistry, PipelineError, Settings};

/// Default output directory for saved images.
pub const DEFAULT_OUTPUT_DIR: &str = "images";

#[derive(Parser, Debug)]
#[command(
    name = "headshot",
    about = "Find a profile photo on a rendered page and save it",
    version,
    args_conflicts_with_subcommands = true,
    after_help = "Run 'headshot <command> --help' for details on each command."
)]
pub struct Cli {
    /// Profile address to process
    pub address: Option<String>,

    /// Directory to save the image into
    pub output_dir: Option<PathBuf>,

    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    pub json: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Show the browser window
    #[arg(long, global = true)]
    pub headed: bool,

    /// JSON file replacing the built-in candidate registry
    #[arg(long, global = true, value_name = "FILE")]
    pub registry: Option<PathBuf>,

    /// Extra alt-text keyword for the profile heuristic (repeatable)
    #[arg(long = "keyword", global = true, value_name = "K")]
    pub keywords: Vec<String>,

    /// Pause between batch targets
    #[arg(long, global = true, value_name = "MS")]
    pub cooldown_ms: Option<u64>,

    /// How long each selector may wait for a match
    #[arg(long, global = true, value_name = "MS")]
    pub selector_wait_ms: Option<u64>,

    /// Pause after navigation before searching
    #[arg(long, global = true, value_name = "MS")]
    pub settle_ms: Option<u64>,

    /// Navigation timeout
    #[arg(long, global = true, value_name = "MS")]
    pub nav_timeout_ms: Option<u64>,

    /// Accept addresses on any host
    #[arg(long, global = true)]
    pub allow_any_domain: bool,
}

impl GlobalArgs {
    /// Apply command-line overrides on top of `base`.
    pub fn settings(&self, base: Settings) -> Settings {
        let mut s = base;
        let ms = Duration::from_millis;
        if let Some(v) = self.cooldown_ms {
            s.cooldown = ms(v);
        }
        if let Some(v) = self.selector_wait_ms {
            s.selector_wait = ms(v);
        }
        if let Some(v) = self.settle_ms {
            s.settle_delay = ms(v);
        }
        if let Some(v) = self.nav_timeout_ms {
            s.nav_timeout = ms(v);
        }
        if self.headed {
            s.headless = false;
        }
        if self.allow_any_domain {
            s.allowed_domains.clear();
        }
        s.extra_alt_keywords.extend(self.keywords.iter().cloned());
        s
    }

    /// The candidate registry to use, from `--registry` or built in.
    pub fn candidate_registry(&self, settings: &Settings) -> Result<CandidateRegistry> {
        let rules = settings.heuristic_rules();
        match &self.registry {
            Some(path) => CandidateRegistry::from_json_file(path, rules).map_err(|e| {
                UsageError(format!("cannot load registry {}: {e}", path.display())).into()
            }),
            None => Ok(CandidateRegistry::profile_photo(rules)),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process several addresses in order, with a cooldown between them
    Batch {
        /// Profile addresses
        addresses: Vec<String>,

        /// Read more addresses from a file, one per line
        #[arg(long, value_name = "F")]
        file: Option<PathBuf>,

        /// Directory to save images into
        #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
        out: PathBuf,
    },

    /// Run the locator against a saved HTML page, offline
    Inspect {
        /// Saved page
        html_file: PathBuf,

        /// Address the page was saved from
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,
    },

    /// Check that Chromium can be found and the output directory is usable
    Doctor,

    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish)
        shell: Shell,
    },
}

/// A problem with the invocation rather than with a target.
#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct UsageError(pub String);

/// How the process should exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
    Usage,
}

impl Status {
    pub fn from_success(ok: bool) -> Self {
        if ok {
            Self::Success
        } else {
            Self::Failure
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Usage => 2,
        }
    }
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        ExitCode::from(status.code())
    }
}

/// Exit status for an error that aborted the command.
pub fn status_for_error(err: &anyhow::Error) -> Status {
    if err.downcast_ref::<UsageError>().is_some() || err.downcast_ref::<PipelineError>().is_some()
    {
        Status::Usage
    } else {
        Status::Failure
    }
}

/// Install the stderr log subscriber.
pub fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
