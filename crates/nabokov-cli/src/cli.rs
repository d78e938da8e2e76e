//! CLI argument and command definitions.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "nabokov", version, about = "Nabokov: streaming LLM generation backend")]
pub struct Cli {
    /// Provider key to use (codex, claude, mock). Overrides LLM_PROVIDER.
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Model to request (defaults to the provider's default model).
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP backend.
    Serve {
        /// Port to listen on.
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Stream a single prompt to stdout.
    Exec {
        /// The prompt to send.
        prompt: String,

        /// System prompt.
        #[arg(long)]
        system: Option<String>,

        /// Emit JSON lines instead of plain text.
        #[arg(long)]
        json: bool,
    },

    /// Generate a card from a button template and print each store update.
    Generate {
        /// Prompt template, e.g. "Summarize {{content}}".
        template: String,

        /// Title of the source card.
        #[arg(long, default_value = "")]
        title: String,

        /// Content of the source card (HTML or plain text).
        #[arg(long)]
        content: String,

        /// Button label.
        #[arg(long, default_value = "Generate")]
        label: String,
    },

    /// List registered providers.
    Providers,
}
