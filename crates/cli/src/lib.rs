pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "shipshape",
    about = "Shipshape operator CLI",
    long_about = "Operate the Shipshape agent engine: migrations, config inspection, readiness checks, and one-off pipeline runs.",
    after_help = "Examples:\n  shipshape doctor --json\n  shipshape migrate\n  shipshape run --user u1 --message-id m1 --from jo@example.com --subject \"Where is my order #12345?\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate configuration and database connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Process one inbound inquiry through the agent pipeline")]
    Run {
        #[arg(long, help = "Owning user identifier")]
        user: String,
        #[arg(long = "message-id", help = "Source message identifier (dedup key)")]
        message_id: String,
        #[arg(long, help = "Customer address the inquiry came from")]
        from: String,
        #[arg(long, help = "Message subject line")]
        subject: String,
        #[arg(long, default_value = "", help = "Message body text")]
        body: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Run { user, message_id, from, subject, body } => {
            commands::run::run(user, message_id, from, subject, body)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
