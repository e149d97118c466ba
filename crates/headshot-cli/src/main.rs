// Copyright 2026 Headshot Contributors
// SPDX-License-Identifier: MIT

use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use headshot::Settings;
use headshot_cli::{
    commands, doctor, init_logging, output, status_for_error, Cli, Commands, Status,
    DEFAULT_OUTPUT_DIR,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.global.log_level);
    let global = cli.global.clone();

    let result = match cli.command {
        None => match cli.address {
            Some(address) => {
                let out = cli
                    .output_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
                commands::single(&global, &address, &out).await
            }
            None => Cli::command()
                .error(
                    ErrorKind::MissingRequiredArgument,
                    "a profile address is required (or use a subcommand)",
                )
                .exit(),
        },
        Some(Commands::Batch {
            addresses,
            file,
            out,
        }) => commands::batch(&global, &addresses, file.as_deref(), &out).await,
        Some(Commands::Inspect {
            html_file,
            base_url,
        }) => commands::inspect(&global, &html_file, base_url.as_deref()).await,
        Some(Commands::Doctor) => {
            let settings = global.settings(Settings::from_env());
            doctor::run(&PathBuf::from(DEFAULT_OUTPUT_DIR), &settings, global.json).await
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "headshot", &mut std::io::stdout());
            Ok(Status::Success)
        }
    };

    // 0 = every target succeeded, 1 = a target or the run failed, 2 = bad invocation.
    match result {
        Ok(status) => status.into(),
        Err(e) => {
            if global.json {
                output::print_json(&serde_json::json!({
                    "error": true,
                    "message": format!("{e:#}"),
                }));
            } else {
                eprintln!("  Error: {e:#}");
            }
            status_for_error(&e).into()
        }
    }
}
