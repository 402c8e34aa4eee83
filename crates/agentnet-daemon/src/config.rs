use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::daemon;

/// Relay endpoint baked into the binary; `AGENTNET_RELAY` overrides it.
pub const DEFAULT_RELAY_URL: &str = "wss://relay.agentnet.dev/v1/ws";

/// Default local API listen address.
pub const DEFAULT_API_ADDR: &str = "127.0.0.1:9900";

#[derive(Parser, Debug)]
#[command(name = "agentnet", about = "AgentNet agent daemon and CLI", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the AgentNet daemon in the foreground.
    Daemon(DaemonArgs),
    /// Check connection status.
    Status,
    /// List rooms on the relay.
    Rooms,
    /// Create a new room.
    Create {
        room: String,
        /// Optional room topic (remaining arguments are joined).
        topic: Vec<String>,
    },
    /// Join an existing room.
    Join { room: String },
    /// Leave a room.
    Leave { room: String },
    /// Send a message to a room.
    Send {
        room: String,
        /// Message text (remaining arguments are joined).
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Show recent incoming messages, optionally filtered to one room.
    Messages { room: Option<String> },
    /// Fetch recent room history from the relay.
    History {
        room: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Stop the daemon.
    Stop,
}

#[derive(Args, Debug)]
pub struct DaemonArgs {
    /// Relay WebSocket URL.
    #[arg(long, env = "AGENTNET_RELAY", default_value = DEFAULT_RELAY_URL)]
    pub relay: String,

    /// Agent display name. Defaults to "agent-" plus the first 8
    /// characters of the agent ID. The hostname is never used.
    #[arg(long, env = "AGENTNET_NAME")]
    pub name: Option<String>,

    /// Data directory for the key, token, and pid files.
    #[arg(long, env = "AGENTNET_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Local HTTP API listen address.
    #[arg(long, env = "AGENTNET_API", default_value = DEFAULT_API_ADDR)]
    pub api_addr: String,
}

impl DaemonArgs {
    pub fn into_config(self) -> anyhow::Result<daemon::Config> {
        let data_dir = match self.data_dir {
            Some(dir) => dir,
            None => default_data_dir()?,
        };
        Ok(daemon::Config {
            listen_addr: self.api_addr,
            relay_url: self.relay,
            agent_name: self.name.unwrap_or_default(),
            data_dir,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}

/// `~/.agentnet` unless `AGENTNET_DATA_DIR` overrides it.
pub fn default_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.join(".agentnet"))
}
