//! On-disk Ed25519 identity.
//!
//! The keypair outlives any process invocation: created on first use,
//! stable afterwards. Only the private key is persisted, base58-encoded
//! inside a small JSON object, with owner-only permissions.

use std::fs;
use std::io;
use std::path::Path;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use agentnet_protocol::keys;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity io: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt identity file: {0}")]
    Corrupt(String),
}

#[derive(Serialize, Deserialize)]
struct StoredKey {
    private_key: String,
}

pub struct Identity {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl Identity {
    /// Load the keypair from `path`, or generate and persist a fresh one.
    ///
    /// The parent directory is created with mode 0700, the key file with
    /// mode 0600. Unparseable files and wrong key lengths fail with
    /// [`IdentityError::Corrupt`] rather than silently regenerating — a
    /// corrupt key file needs operator attention, not a new identity.
    pub fn load_or_create(path: &Path) -> Result<Self, IdentityError> {
        if let Some(parent) = path.parent() {
            create_private_dir(parent)?;
        }

        match fs::read(path) {
            Ok(data) => {
                let stored: StoredKey = serde_json::from_slice(&data)
                    .map_err(|e| IdentityError::Corrupt(e.to_string()))?;
                let signing_key = keys::decode_private_key(&stored.private_key)
                    .map_err(|e| IdentityError::Corrupt(e.to_string()))?;
                Ok(Self::from_signing_key(signing_key))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let signing_key = SigningKey::generate(&mut OsRng);
                let stored = StoredKey {
                    private_key: keys::encode_private_key(&signing_key),
                };
                let data = serde_json::to_vec_pretty(&stored)
                    .map_err(|e| IdentityError::Corrupt(e.to_string()))?;
                write_private_file(path, &data)?;
                Ok(Self::from_signing_key(signing_key))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// base58 of the public key — the agent's stable identity.
    pub fn agent_id(&self) -> String {
        keys::agent_id(&self.verifying_key)
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

fn create_private_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(dir)
    }
}

/// Write `data` to `path` with owner-only permissions.
pub fn write_private_file(path: &Path, data: &[u8]) -> io::Result<()> {
    use std::io::Write;
    // mode 0o600: the private key and API token must never be readable
    // by other users.
    #[cfg(unix)]
    let mut file = {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?
    };
    #[cfg(not(unix))]
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(data)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_then_load_is_stable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.key");

        let first = Identity::load_or_create(&path).unwrap();
        let second = Identity::load_or_create(&path).unwrap();

        assert_eq!(
            first.signing_key().to_bytes(),
            second.signing_key().to_bytes()
        );
        assert_eq!(first.agent_id(), second.agent_id());
    }

    #[test]
    fn creates_missing_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("agent.key");
        let identity = Identity::load_or_create(&path).unwrap();
        assert!(!identity.agent_id().is_empty());
        assert!(path.exists());
    }

    #[test]
    fn unparseable_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.key");
        fs::write(&path, b"not json at all").unwrap();
        assert!(matches!(
            Identity::load_or_create(&path),
            Err(IdentityError::Corrupt(_))
        ));
    }

    #[test]
    fn wrong_key_length_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.key");
        let short = bs58::encode([1u8; 16]).into_string();
        fs::write(&path, format!(r#"{{"private_key":"{short}"}}"#)).unwrap();
        assert!(matches!(
            Identity::load_or_create(&path),
            Err(IdentityError::Corrupt(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.key");
        Identity::load_or_create(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn agent_id_matches_encoded_public_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.key");
        let identity = Identity::load_or_create(&path).unwrap();
        let decoded = bs58::decode(identity.agent_id()).into_vec().unwrap();
        assert_eq!(decoded.len(), 32);
    }
}
