pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use quotedesk_core::config::{AppConfig, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "quotedesk",
    about = "Quotedesk operator CLI",
    long_about = "Operate the quotation database: migrations, demo data, config inspection, \
                  readiness checks, totals and approval decisions.",
    after_help = "Examples:\n  quotedesk migrate\n  quotedesk doctor --json\n  \
                  quotedesk totals qt-demo-001\n  quotedesk approve qt-demo-001 sales sales-lead"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Read configuration from this TOML file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset and verify it")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, DB connectivity and schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print the totals breakdown of a quotation")]
    Totals { quotation_id: String },
    #[command(about = "Grant an approval stage (technical, sales, final) on a quotation")]
    Approve { quotation_id: String, stage: String, approver: String },
    #[command(about = "Reject a quotation")]
    Reject {
        quotation_id: String,
        approver: String,
        #[arg(long, help = "Reason recorded with the rejection")]
        reason: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions { config_path: cli.config, ..LoadOptions::default() };

    // Commands report config failures themselves; logging just falls back to defaults.
    let logging = AppConfig::load(options.clone())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);
    if let Err(error) = logging::init_logging(&logging) {
        eprintln!("{error:#}");
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(options),
        Command::Seed => commands::seed::run(options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(options) }
        }
        Command::Doctor { json } => commands::doctor::run(options, json),
        Command::Totals { quotation_id } => commands::totals::run(options, &quotation_id),
        Command::Approve { quotation_id, stage, approver } => {
            commands::approve::run(options, &quotation_id, &stage, &approver)
        }
        Command::Reject { quotation_id, approver, reason } => {
            commands::reject::run(options, &quotation_id, &approver, reason)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
