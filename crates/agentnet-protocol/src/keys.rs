//! Ed25519 key encoding.
//!
//! The agent-ID is the base58-encoded public key. Private keys are stored
//! base58-encoded; both the 32-byte seed form and the 64-byte
//! seed-plus-public form decode, so key files written by other
//! implementations of the protocol load unchanged.

use ed25519_dalek::{SigningKey, VerifyingKey, SECRET_KEY_LENGTH};

use crate::error::ProtocolError;

/// Keypair encoding: seed followed by the public key.
const KEYPAIR_LENGTH: usize = 64;

/// The agent's stable identity: base58 of the public key.
pub fn agent_id(key: &VerifyingKey) -> String {
    bs58::encode(key.as_bytes()).into_string()
}

/// Base58 encoding of the 32-byte private seed.
pub fn encode_private_key(key: &SigningKey) -> String {
    bs58::encode(key.to_bytes()).into_string()
}

/// Decode a base58 private key (32-byte seed or 64-byte keypair form).
pub fn decode_private_key(encoded: &str) -> Result<SigningKey, ProtocolError> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| ProtocolError::InvalidBase58(e.to_string()))?;

    match bytes.len() {
        SECRET_KEY_LENGTH => {
            let seed: [u8; SECRET_KEY_LENGTH] = bytes
                .try_into()
                .map_err(|_| ProtocolError::InvalidKeyLength(SECRET_KEY_LENGTH))?;
            Ok(SigningKey::from_bytes(&seed))
        }
        KEYPAIR_LENGTH => {
            let pair: [u8; KEYPAIR_LENGTH] = bytes
                .try_into()
                .map_err(|_| ProtocolError::InvalidKeyLength(KEYPAIR_LENGTH))?;
            SigningKey::from_keypair_bytes(&pair).map_err(|_| ProtocolError::KeyMismatch)
        }
        other => Err(ProtocolError::InvalidKeyLength(other)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
