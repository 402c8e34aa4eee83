//! Room history pass-through.
//!
//! The relay keeps per-room history behind a REST endpoint alongside its
//! WebSocket. `/history` proxies it and renders a plain-text transcript,
//! one line per message, for direct consumption by an assistant.

use chrono::DateTime;
use serde::Deserialize;

/// One message as returned by the relay's REST API. `content` is itself
/// a JSON string of the form `{"type":"text","text":"..."}`.
#[derive(Debug, Deserialize)]
pub struct RelayMessage {
    #[serde(default)]
    pub from_id: String,
    #[serde(default)]
    pub from_name: String,
    #[serde(default)]
    pub content: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
}

/// Envelope around the relay's message list.
#[derive(Debug, Deserialize)]
pub struct HistoryEnvelope {
    #[serde(default)]
    pub messages: Vec<RelayMessage>,
}

/// Map a relay WebSocket URL to the HTTP base of its REST API:
/// `wss` → `https`, `ws` → `http`, path stripped to host only.
pub fn relay_http_base(relay_ws: &str) -> String {
    let (scheme, rest) = if let Some(rest) = relay_ws.strip_prefix("wss://") {
        ("https", rest)
    } else if let Some(rest) = relay_ws.strip_prefix("ws://") {
        ("http", rest)
    } else {
        ("https", relay_ws)
    };

    let host = match rest.find('/') {
        Some(idx) => &rest[..idx],
        None => rest,
    };
    format!("{scheme}://{host}")
}

/// Extract plain text from relay content JSON, falling back to the raw
/// string when it is not the expected shape.
pub fn parse_content(content: &str) -> String {
    #[derive(Deserialize)]
    struct Content {
        #[serde(default)]
        text: String,
    }

    match serde_json::from_str::<Content>(content) {
        Ok(c) if !c.text.is_empty() => c.text,
        _ => content.to_string(),
    }
}

/// Render the transcript: `[YYYY-MM-DD HH:MM:SS UTC] <name-or-id>: <text>`.
pub fn format_transcript(room: &str, limit: u32, messages: &[RelayMessage]) -> String {
    let mut out = format!("=== Room: {room} (last {limit} messages) ===\n");
    if messages.is_empty() {
        out.push_str("(no messages)\n");
        return out;
    }
    for msg in messages {
        let ts = DateTime::from_timestamp_millis(msg.timestamp)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| msg.timestamp.to_string());
        let name = if msg.from_name.is_empty() {
            &msg.from_id
        } else {
            &msg.from_name
        };
        let text = parse_content(&msg.content);
        out.push_str(&format!("[{ts} UTC] {name}: {text}\n"));
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
