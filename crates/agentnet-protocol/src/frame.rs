//! Typed views of relay frames and builders for outgoing requests.
//!
//! Every frame is a JSON object carrying a `type` discriminator. Outgoing
//! request-like frames additionally carry `timestamp` (milliseconds since
//! the Unix epoch), `nonce` (16 random bytes, base58) and `signature`
//! (base58 Ed25519 over the canonical form, see [`crate::canonical`]).
//!
//! Two frames are sent unsigned: `ping` and `rooms.list`. The relay
//! accepts them as-is; this asymmetry is preserved for wire compatibility.

use ed25519_dalek::SigningKey;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::canonical::sign_value;
use crate::constants::{NONCE_LEN, PROTOCOL_VERSION};

// ============================================================================
// Incoming frames
// ============================================================================

/// `pow.challenge` — puzzle issued during handshake and room creation.
#[derive(Debug, Clone, Deserialize)]
pub struct PowChallenge {
    pub challenge: String,
    pub difficulty: u32,
}

/// `error` — the relay rejected a request or the handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorFrame {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// A room member as reported in `room.joined`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// `room.joined` — successful create/join reply.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomJoined {
    pub room: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub members: Vec<Member>,
}

/// Room details returned from create/join operations.
#[derive(Debug, Clone, Serialize)]
pub struct RoomInfo {
    pub name: String,
    pub topic: String,
    pub tags: Vec<String>,
    pub members: Vec<Member>,
}

impl From<RoomJoined> for RoomInfo {
    fn from(j: RoomJoined) -> Self {
        Self {
            name: j.room,
            topic: j.topic,
            tags: j.tags,
            members: j.members,
        }
    }
}

/// One entry of `rooms.list.result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomListItem {
    pub name: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub agents: u32,
    #[serde(default)]
    pub last_active: i64,
}

/// `rooms.list.result` — reply to `rooms.list`.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomsListResult {
    #[serde(default)]
    pub rooms: Vec<RoomListItem>,
}

/// Content object of a `message` frame.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageContent {
    #[serde(default)]
    pub text: String,
}

/// `message` — a text message delivered to a joined room.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageFrame {
    pub room: String,
    pub from: String,
    #[serde(default)]
    pub from_name: Option<String>,
    pub content: MessageContent,
    #[serde(default)]
    pub timestamp: i64,
}

/// A message record as buffered by the daemon and returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub room: String,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    pub text: String,
    pub timestamp: i64,
}

impl From<MessageFrame> for IncomingMessage {
    fn from(m: MessageFrame) -> Self {
        Self {
            room: m.room,
            from: m.from,
            from_name: m.from_name,
            text: m.content.text,
            timestamp: m.timestamp,
        }
    }
}

/// Parse raw frame text, requiring a JSON object with a `type` field.
pub fn decode(text: &str) -> Result<Value, crate::error::ProtocolError> {
    let frame: Value = serde_json::from_str(text)?;
    if frame.get("type").and_then(Value::as_str).is_none() {
        return Err(crate::error::ProtocolError::MissingType);
    }
    Ok(frame)
}

/// Read the `type` discriminator of a raw frame.
pub fn frame_type(frame: &Value) -> &str {
    frame.get("type").and_then(Value::as_str).unwrap_or("")
}

/// Read the `room` field of a raw frame, if any.
pub fn frame_room(frame: &Value) -> Option<&str> {
    frame.get("room").and_then(Value::as_str)
}

// ============================================================================
// Outgoing frame builders
// ============================================================================

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// 16 random bytes, base58-encoded.
pub fn random_nonce() -> String {
    let mut bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bs58::encode(bytes).into_string()
}

fn signed(key: &SigningKey, mut frame: Value) -> Value {
    let sig = sign_value(key, &frame);
    frame["signature"] = Value::String(sig);
    frame
}

/// `hello` — first handshake frame, carries the agent profile.
pub fn hello(key: &SigningKey, agent_id: &str, agent_name: &str) -> Value {
    signed(
        key,
        json!({
            "type": "hello",
            "profile": {
                "id": agent_id,
                "name": agent_name,
                "version": PROTOCOL_VERSION,
            },
            "timestamp": now_millis(),
            "nonce": random_nonce(),
        }),
    )
}

/// `hello.pow` — second handshake frame, answers the relay's puzzle.
pub fn hello_pow(key: &SigningKey, challenge: &str, proof: &str) -> Value {
    signed(
        key,
        json!({
            "type": "hello.pow",
            "pow": {
                "challenge": challenge,
                "proof": proof,
            },
        }),
    )
}

/// `room.create` — optionally carries a solved puzzle on the second attempt.
pub fn room_create(
    key: &SigningKey,
    room: &str,
    topic: &str,
    tags: &[String],
    pow: Option<(&str, &str)>,
) -> Value {
    let mut frame = json!({
        "type": "room.create",
        "room": room,
        "topic": topic,
        "tags": tags,
        "nonce": random_nonce(),
        "timestamp": now_millis(),
    });
    if let Some((challenge, proof)) = pow {
        frame["pow"] = json!({ "challenge": challenge, "proof": proof });
    }
    signed(key, frame)
}

/// `room.join`
pub fn room_join(key: &SigningKey, room: &str) -> Value {
    signed(
        key,
        json!({
            "type": "room.join",
            "room": room,
            "nonce": random_nonce(),
            "timestamp": now_millis(),
        }),
    )
}

/// `room.leave`
pub fn room_leave(key: &SigningKey, room: &str) -> Value {
    signed(
        key,
        json!({
            "type": "room.leave",
            "room": room,
            "nonce": random_nonce(),
            "timestamp": now_millis(),
        }),
    )
}

/// `message` — a text message to a room.
pub fn message(key: &SigningKey, agent_id: &str, room: &str, text: &str) -> Value {
    signed(
        key,
        json!({
            "type": "message",
            "id": Uuid::new_v4().to_string(),
            "room": room,
            "from": agent_id,
            "content": {
                "type": "text",
                "text": text,
            },
            "timestamp": now_millis(),
            "nonce": random_nonce(),
        }),
    )
}

/// `rooms.list` — sent unsigned (wire quirk, kept for compatibility).
pub fn rooms_list(tags: &[String], limit: u32) -> Value {
    let mut frame = json!({
        "type": "rooms.list",
        "limit": limit,
    });
    if !tags.is_empty() {
        frame["tags"] = json!(tags);
    }
    frame
}

/// `ping` — sent unsigned (wire quirk, kept for compatibility).
pub fn ping() -> Value {
    json!({ "type": "ping" })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::verify_value;
    use rand::rngs::OsRng;
    use std::collections::HashSet;

    fn test_key() -> SigningKey {
        SigningKey::generate(&mut OsRng)
    }

    #[test]
    fn hello_carries_profile_and_verifies() {
        let key = test_key();
        let frame = hello(&key, "agent-id", "agent-name");

        assert_eq!(frame_type(&frame), "hello");
        assert_eq!(frame["profile"]["id"], "agent-id");
        assert_eq!(frame["profile"]["name"], "agent-name");
        assert_eq!(frame["profile"]["version"], PROTOCOL_VERSION);

        let sig = frame["signature"].as_str().unwrap().to_string();
        assert!(verify_value(&key.verifying_key(), &frame, &sig));
    }

    #[test]
    fn room_create_pow_variants() {
        let key = test_key();
        let tags = vec!["a".to_string()];

        let first = room_create(&key, "r", "topic", &tags, None);
        assert!(first.get("pow").is_none());

        let second = room_create(&key, "r", "topic", &tags, Some(("chal", "42")));
        assert_eq!(second["pow"]["challenge"], "chal");
        assert_eq!(second["pow"]["proof"], "42");

        let sig = second["signature"].as_str().unwrap().to_string();
        assert!(verify_value(&key.verifying_key(), &second, &sig));
    }

    #[test]
    fn message_wraps_text_content() {
        let key = test_key();
        let frame = message(&key, "me", "general", "hi there");
        assert_eq!(frame["content"]["type"], "text");
        assert_eq!(frame["content"]["text"], "hi there");
        assert_eq!(frame["from"], "me");
        // id is a v4 UUID
        let id = frame["id"].as_str().unwrap();
        assert_eq!(id.len(), 36);
        assert_eq!(&id[14..15], "4");
    }

    #[test]
    fn ping_and_rooms_list_are_unsigned() {
        assert!(ping().get("signature").is_none());
        let list = rooms_list(&[], 50);
        assert!(list.get("signature").is_none());
        assert!(list.get("tags").is_none());

        let tagged = rooms_list(&["x".to_string()], 10);
        assert_eq!(tagged["tags"][0], "x");
    }

    #[test]
    fn nonces_are_unique() {
        let mut seen = HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(random_nonce()));
        }
    }

    #[test]
    fn message_frame_maps_to_incoming_message() {
        let raw = serde_json::json!({
            "type": "message",
            "room": "general",
            "from": "abc",
            "from_name": "Alice",
            "content": { "type": "text", "text": "hello" },
            "timestamp": 1700000000000i64,
        });
        let frame: MessageFrame = serde_json::from_value(raw).unwrap();
        let msg = IncomingMessage::from(frame);
        assert_eq!(msg.room, "general");
        assert_eq!(msg.from, "abc");
        assert_eq!(msg.from_name.as_deref(), Some("Alice"));
        assert_eq!(msg.text, "hello");
        assert_eq!(msg.timestamp, 1700000000000);
    }
}
