// agentnet-protocol: the AgentNet relay wire protocol.
// Canonical JSON encoding + Ed25519 message signing, the SHA-256
// proof-of-work puzzle, and typed views of the JSON frames exchanged
// with a relay.

pub mod canonical;
pub mod constants;
pub mod error;
pub mod frame;
pub mod keys;
pub mod pow;

pub use canonical::{canonical_json, sign_value, signing_bytes, verify_value};
pub use constants::*;
pub use error::ProtocolError;
pub use frame::{IncomingMessage, Member, RoomInfo, RoomListItem};
