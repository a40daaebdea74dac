use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "quizbot")]
#[command(author, version, about = "Telegram multiple-choice medical quiz bot", long_about = None)]
pub struct Cli {
    /// Extra env file loaded after `.env`
    #[arg(long, global = true)]
    pub env_file: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the bot with long polling (default)
    Run,

    /// Serve the webhook and admin endpoints over HTTP
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
