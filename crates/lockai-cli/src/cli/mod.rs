//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use lockai_core::config::Config;

mod commands;

#[derive(Parser)]
#[command(name = "lockai")]
#[command(version)]
#[command(about = "Terminal client for the LockAI chat and paper backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Send a chat message and stream the reply
    Chat {
        /// The message to send
        message: String,

        /// Continue an existing session by ID (default: new session)
        #[arg(long, value_name = "ID")]
        session: Option<String>,
    },

    /// Manage saved chat sessions
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Generate and manage papers
    Paper {
        #[command(subcommand)]
        command: PaperCommands,
    },
}

#[derive(clap::Subcommand)]
enum SessionCommands {
    /// List saved sessions, newest first
    List,
    /// Print a session transcript
    Show { id: String },
    /// Delete a session
    Delete { id: String },
}

#[derive(clap::Subcommand)]
enum PaperCommands {
    /// Generate a new paper from a topic
    Generate { topic: String },
    /// Revise an existing paper
    Revise {
        id: String,
        /// Revision instruction
        instruction: String,
    },
    /// Query the server-side status of a paper
    Status { id: String },
    /// Follow an in-flight paper until it finishes
    Watch { id: String },
    /// List local paper records, newest first
    List,
    /// Delete a local paper record
    Delete { id: String },
}

/// Parses arguments and dispatches to the command handlers.
///
/// # Errors
/// Returns an error if the command fails.
pub fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("load configuration")?;

    let runtime = tokio::runtime::Runtime::new().context("start async runtime")?;
    runtime.block_on(dispatch(cli, config))
}

async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Chat { message, session } => commands::chat::run(config, &message, session).await,
        Commands::Sessions { command } => match command {
            SessionCommands::List => commands::sessions::list(),
            SessionCommands::Show { id } => commands::sessions::show(&id),
            SessionCommands::Delete { id } => commands::sessions::delete(&id),
        },
        Commands::Paper { command } => match command {
            PaperCommands::Generate { topic } => commands::paper::generate(config, &topic).await,
            PaperCommands::Revise { id, instruction } => {
                commands::paper::revise(config, &id, &instruction).await
            }
            PaperCommands::Status { id } => commands::paper::status(config, &id).await,
            PaperCommands::Watch { id } => commands::paper::watch(config, &id).await,
            PaperCommands::List => commands::paper::list(),
            PaperCommands::Delete { id } => commands::paper::delete(config, &id).await,
        },
    }
}
