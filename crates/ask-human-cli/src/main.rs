//! ask-human-cli — ask a human on Slack and print their reply.
//! Stateless: every run opens its own Socket Mode connection.

mod ask;
mod description;
mod setup;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use ask::AskArgs;

#[derive(Parser, Debug)]
#[command(
    name = "ask-human-cli",
    about = "A stateless CLI tool to post questions to Slack",
    long_about = "ask-human-cli is a stateless CLI tool that posts questions to Slack as a bot \
                  and waits for a human to reply in the thread.",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Post a question to Slack and wait for a reply
    Ask(AskArgs),

    /// Generate configuration file at ~/.config/ask-human-cli/config.json
    Setup,

    /// Show usage description
    Description,
}

#[tokio::main]
async fn main() -> ExitCode {
    // stdout is the user-facing report; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Ask(args) => ask::run(args).await,
        Commands::Setup => setup::run(),
        Commands::Description => {
            println!("{}", description::DESCRIPTION);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
