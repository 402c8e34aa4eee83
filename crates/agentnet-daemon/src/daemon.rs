//! The long-running agent daemon.
//!
//! Owns one relay session at a time, the joined-room intent set, the
//! incoming-message buffer, and the local HTTP control API. The intent
//! set expresses *desired* membership: it is mutated only by successful
//! create/join/leave commands, never by disconnection, so a reconnect
//! restores the rooms the operator asked for.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::RngCore;
use tokio::sync::{Mutex, RwLock};

use agentnet_client::{ClientError, RelayClient};
use agentnet_protocol::constants::{RECONNECT_BACKOFF_INITIAL, RECONNECT_BACKOFF_MAX};
use agentnet_protocol::IncomingMessage;

use crate::api;
use crate::buffer::{MessageBuffer, BUFFER_CAPACITY};
use crate::identity::{self, Identity};
use crate::version;

pub struct Config {
    pub listen_addr: String,
    pub relay_url: String,
    /// Display name; empty means derive from the agent ID.
    pub agent_name: String,
    pub data_dir: PathBuf,
    pub version: String,
}

/// Run the daemon to completion. Startup failures (identity, token file,
/// first relay connection, API bind) are fatal.
pub async fn run(config: Config) -> Result<()> {
    let daemon = Daemon::start(config).await?;
    daemon.serve().await
}

#[derive(Clone)]
pub struct Daemon {
    inner: Arc<DaemonInner>,
}

struct DaemonInner {
    config: Config,
    identity: Identity,
    agent_name: String,
    api_token: String,
    http: reqwest::Client,
    /// The live session, if any. None while reconnecting.
    client: RwLock<Option<RelayClient>>,
    /// Rooms this agent wants to be in, independent of session state.
    joined_rooms: Mutex<HashSet<String>>,
    messages: Mutex<MessageBuffer>,
    latest_version: RwLock<Option<String>>,
}

impl Daemon {
    /// Build a daemon that has not yet touched the network. Used by
    /// [`Daemon::start`] and directly by tests.
    fn new(config: Config, identity: Identity, api_token: String) -> Result<Self> {
        let agent_name = if config.agent_name.is_empty() {
            let id = identity.agent_id();
            let short = &id[..id.len().min(8)];
            format!("agent-{short}")
        } else {
            config.agent_name.clone()
        };

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent(format!("agentnet-daemon/{}", config.version))
            .build()
            .context("build http client")?;

        Ok(Self {
            inner: Arc::new(DaemonInner {
                config,
                identity,
                agent_name,
                api_token,
                http,
                client: RwLock::new(None),
                joined_rooms: Mutex::new(HashSet::new()),
                messages: Mutex::new(MessageBuffer::new(BUFFER_CAPACITY)),
                latest_version: RwLock::new(None),
            }),
        })
    }

    /// Full startup sequence: token, identity, initial connect (fatal on
    /// failure), background loops, pid file.
    pub async fn start(config: Config) -> Result<Self> {
        let api_token = generate_token();
        let token_path = config.data_dir.join("api.token");
        let identity = Identity::load_or_create(&config.data_dir.join("agent.key"))
            .context("keystore")?;
        identity::write_private_file(&token_path, api_token.as_bytes())
            .context("write token")?;
        tracing::info!("API token written to {}", token_path.display());

        let daemon = Self::new(config, identity, api_token)?;

        tracing::info!(agent_id = %daemon.inner.identity.agent_id(), "agent identity loaded");
        tracing::info!(name = %daemon.inner.agent_name, "agent name");
        tracing::info!(relay = %daemon.inner.config.relay_url, "connecting to relay");

        daemon.connect_and_rejoin().await.context("connect")?;

        tokio::spawn(daemon.clone().reconnect_loop());
        tokio::spawn(version::check_loop(daemon.clone()));

        let pid_path = daemon.inner.config.data_dir.join("daemon.pid");
        identity::write_private_file(&pid_path, std::process::id().to_string().as_bytes())
            .context("write pid file")?;

        Ok(daemon)
    }

    /// Serve the HTTP API until the process exits.
    pub async fn serve(&self) -> Result<()> {
        api::serve(self.clone(), &self.inner.config.listen_addr).await
    }

    /// Open a new session, re-join every room in the intent set, and
    /// start draining its message stream into the buffer. Re-join
    /// failures are logged and skipped; one broken room must not keep
    /// the agent offline.
    pub async fn connect_and_rejoin(&self) -> Result<(), ClientError> {
        let client = RelayClient::connect(
            &self.inner.config.relay_url,
            &self.inner.identity.agent_id(),
            &self.inner.agent_name,
            self.inner.identity.signing_key().clone(),
        )
        .await?;

        *self.inner.client.write().await = Some(client.clone());

        let rooms: Vec<String> = {
            let joined = self.inner.joined_rooms.lock().await;
            joined.iter().cloned().collect()
        };
        for room in rooms {
            match client.join_room(&room).await {
                Ok(_) => tracing::info!(room = %room, "rejoined room"),
                Err(e) => tracing::warn!(room = %room, "rejoin failed: {e}"),
            }
        }

        if let Some(mut stream) = client.take_messages() {
            let daemon = self.clone();
            tokio::spawn(async move {
                while let Some(msg) = stream.recv().await {
                    daemon.inner.messages.lock().await.push(msg);
                }
            });
        }

        Ok(())
    }

    /// Watch the live session and reconnect with exponential backoff
    /// when it dies. Runs for the life of the process.
    pub async fn reconnect_loop(self) {
        loop {
            let client = self.inner.client.read().await.clone();
            if let Some(client) = client {
                client.wait().await;
            }
            *self.inner.client.write().await = None;

            tracing::warn!("relay disconnected, reconnecting");

            let mut backoff = RECONNECT_BACKOFF_INITIAL;
            loop {
                tokio::time::sleep(backoff).await;
                tracing::info!(relay = %self.inner.config.relay_url, "attempting reconnect");
                match self.connect_and_rejoin().await {
                    Ok(()) => {
                        tracing::info!("reconnected");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("reconnect failed: {e}");
                        backoff = (backoff * 2).min(RECONNECT_BACKOFF_MAX);
                    }
                }
            }
        }
    }

    // ── accessors for the API layer ─────────────────────────────────────

    pub async fn client(&self) -> Option<RelayClient> {
        self.inner.client.read().await.clone()
    }

    pub async fn mark_joined(&self, room: &str) {
        self.inner.joined_rooms.lock().await.insert(room.to_string());
    }

    pub async fn mark_left(&self, room: &str) {
        self.inner.joined_rooms.lock().await.remove(room);
    }

    pub async fn joined_rooms(&self) -> Vec<String> {
        self.inner.joined_rooms.lock().await.iter().cloned().collect()
    }

    pub async fn push_message(&self, msg: IncomingMessage) {
        self.inner.messages.lock().await.push(msg);
    }

    pub async fn drain_messages(&self, room: Option<&str>) -> Vec<IncomingMessage> {
        self.inner.messages.lock().await.drain(room)
    }

    pub async fn buffered_count(&self) -> usize {
        self.inner.messages.lock().await.len()
    }

    pub async fn latest_version(&self) -> Option<String> {
        self.inner.latest_version.read().await.clone()
    }

    pub async fn set_latest_version(&self, latest: String) {
        *self.inner.latest_version.write().await = Some(latest);
    }

    pub fn api_token(&self) -> &str {
        &self.inner.api_token
    }

    pub fn agent_name(&self) -> &str {
        &self.inner.agent_name
    }

    pub fn relay_url(&self) -> &str {
        &self.inner.config.relay_url
    }

    pub fn version(&self) -> &str {
        &self.inner.config.version
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Close the session and exit the process. Called by `/stop`.
    pub async fn shutdown(&self) {
        if let Some(client) = self.client().await {
            client.close().await;
        }
        std::process::exit(0);
    }
}

/// 32 random bytes, hex-encoded: the API bearer token.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
