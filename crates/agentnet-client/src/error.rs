use agentnet_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("dial: {0}")]
    Dial(String),

    /// The relay sent an `error` frame during the handshake.
    #[error("auth error: {0}")]
    Auth(String),

    /// A handshake step received a frame of the wrong type.
    #[error("unexpected frame: {0}")]
    Unexpected(String),

    /// The relay rejected a command; carries the server's message verbatim.
    #[error("{0}")]
    Server(String),

    #[error("timeout waiting for relay response")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("transport: {0}")]
    Transport(String),

    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    /// True when the relay itself rejected the command (as opposed to a
    /// local transport or timeout failure). The HTTP API maps these to 400.
    pub fn is_server_rejection(&self) -> bool {
        matches!(self, Self::Server(_))
    }
}
