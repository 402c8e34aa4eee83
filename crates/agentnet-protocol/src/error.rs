use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid base58: {0}")]
    InvalidBase58(String),

    #[error("invalid key length: expected 32 or 64 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("stored public key does not match the private key")]
    KeyMismatch,

    #[error("frame is not a JSON object with a type field")]
    MissingType,

    #[error("frame decode error: {0}")]
    Decode(#[from] serde_json::Error),
}
