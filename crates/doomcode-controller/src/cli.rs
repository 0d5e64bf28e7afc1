//! Command-line surface (§6 "Controller CLI").

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "doomcode-controller", about = "DoomCode controller runtime")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mint a new pairing session and start supervising the assistant.
    Start {
        #[arg(long, default_value = "ws://127.0.0.1:4000/ws")]
        ws_url: String,
        #[arg(long, default_value = "http://127.0.0.1:4000")]
        http_url: String,
        #[arg(long, default_value = ".")]
        dir: String,
        #[arg(long, default_value = "assistant")]
        agent: String,
        /// Reconnect using the cached session instead of minting a new one.
        #[arg(long)]
        reuse: bool,
    },
    /// Join an existing session as the controller (reconnect path).
    Connect {
        session_id: String,
        #[arg(long, default_value = "ws://127.0.0.1:4000/ws")]
        ws_url: String,
        #[arg(long, default_value = "http://127.0.0.1:4000")]
        http_url: String,
        #[arg(long, default_value = "assistant")]
        agent: String,
    },
}
