use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use env_logger::Env;
use relance::{
    configuration::get_configuration,
    services::{normalize_csv, OutreachOptions, OutreachOrchestrator, RunError},
};

#[derive(Parser)]
#[command(name = "relance", about = "Contact list normalization and outreach", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract and validate e-mail addresses from a raw contact export
    Normalize {
        /// Raw CSV export to read
        input: PathBuf,

        /// Destination CSV for the normalized records
        #[arg(default_value = "improved_emails.csv")]
        output: PathBuf,
    },
    /// Send personalized applications to a normalized contact list
    Send {
        /// Normalized CSV produced by the normalize command
        input: PathBuf,

        /// Simulate sends without connecting to the SMTP server
        #[arg(long)]
        dry_run: bool,

        /// Number of concurrent workers
        #[arg(long, default_value_t = 1)]
        workers: usize,

        /// Generate a fresh letter for every contact instead of reusing one
        #[arg(long)]
        no_cache: bool,

        /// Path to the CV to attach, overrides the configured one
        #[arg(long)]
        cv: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut configuration = get_configuration().expect("Failed to read configuration.");

    match cli.command {
        Command::Normalize { input, output } => match normalize_csv(&input, &output) {
            Ok(report) => {
                log::info!(
                    "Normalization finished. {} rows processed, {} emails extracted, {} emails rejected.",
                    report.rows_processed,
                    report.emails_found,
                    report.emails_rejected
                );
                ExitCode::SUCCESS
            }
            Err(RunError::InputNotFound(path)) => {
                log::error!("Input file not found: {}", path.display());
                ExitCode::from(2)
            }
            Err(e) => {
                log::error!("Normalization failed: {}", e);
                ExitCode::FAILURE
            }
        },
        Command::Send {
            input,
            dry_run,
            workers,
            no_cache,
            cv,
        } => {
            if configuration.api.api_key.is_empty() {
                log::error!("No API key configured, set APP_API__API_KEY or edit the configuration files.");
                return ExitCode::FAILURE;
            }
            if !dry_run && configuration.email.password.is_empty() {
                log::error!("No SMTP password configured, set APP_EMAIL__PASSWORD or use --dry-run.");
                return ExitCode::FAILURE;
            }
            if let Some(cv) = cv {
                configuration.candidate.cv_path = cv.display().to_string();
            }

            let options = OutreachOptions {
                dry_run,
                workers,
                cache_letters: !no_cache,
            };
            let orchestrator = Arc::new(OutreachOrchestrator::new(configuration, options));

            match orchestrator.run(&input).await {
                Ok(report) => {
                    log::info!(
                        "Done: {} rows read, {} emails found, {} sent, {} skipped.",
                        report.rows_processed,
                        report.emails_found,
                        report.emails_sent,
                        report.emails_skipped
                    );
                    ExitCode::SUCCESS
                }
                Err(RunError::InputNotFound(path)) => {
                    log::error!("Input file not found: {}", path.display());
                    ExitCode::from(2)
                }
                Err(e) => {
                    log::error!("Outreach run failed: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}
