//! maitre CLI — the main entry point.
//!
//! Commands:
//! - `onboard`  — Write a default config
//! - `chat`     — Interactive or single-message conversation
//! - `classify` — Print the intent result for a text as JSON
//! - `usage`    — Daily and per-user rollups from the telemetry log
//! - `pricing`  — List model prices
//! - `estimate` — Cost estimate for a model and token counts

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "maitre",
    about = "maitre — conversational middleware for restaurant chat assistants",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Onboard,

    /// Talk to the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// User id used for context and profile
        #[arg(short, long, default_value = "local")]
        user: String,

        /// Answer as in a group chat
        #[arg(long)]
        group: bool,
    },

    /// Classify a text and print the result as JSON
    Classify {
        text: String,
    },

    /// Show usage rollups from the telemetry log
    Usage {
        /// Only this user
        #[arg(long)]
        user: Option<String>,
    },

    /// List model pricing
    Pricing,

    /// Estimate the cost of a call
    Estimate {
        model: String,
        input_tokens: u32,
        output_tokens: u32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat {
            message,
            user,
            group,
        } => commands::chat::run(message, user, group).await?,
        Commands::Classify { text } => commands::classify::run(&text)?,
        Commands::Usage { user } => commands::usage::usage(user.as_deref())?,
        Commands::Pricing => commands::usage::pricing()?,
        Commands::Estimate {
            model,
            input_tokens,
            output_tokens,
        } => commands::usage::estimate(&model, input_tokens, output_tokens)?,
    }

    Ok(())
}
