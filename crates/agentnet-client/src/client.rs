//! The relay connection engine.
//!
//! A [`RelayClient`] owns one WebSocket to an AgentNet relay. The relay
//! multiplexes unsolicited events (`message`, member joins/leaves) with
//! command replies (`room.joined`, `rooms.list.result`, `pow.challenge`,
//! `error`) on the same socket, so the client runs exactly one reader and
//! demultiplexes by frame type:
//!
//!   - `message` frames go to a bounded channel drained by the daemon
//!   - liveness and membership broadcasts are discarded
//!   - everything else lands in a small response channel consumed by the
//!     one synchronous operation in flight
//!
//! Synchronous operations (create/join/list) serialize on an operation
//! mutex that owns the response receiver, so at most one awaiter exists
//! and re-queued envelopes cannot starve another waiter. During the
//! handshake no loops are running yet; frames are read inline, which is
//! the only time unsolicited frames cannot arrive.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use ed25519_dalek::SigningKey;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use agentnet_protocol::constants::{
    MESSAGE_CHANNEL_CAPACITY, PING_INTERVAL, RESPONSE_CHANNEL_CAPACITY, RESPONSE_TIMEOUT,
};
use agentnet_protocol::frame::{
    self, frame_room, frame_type, ErrorFrame, MessageFrame, PowChallenge, RoomJoined,
    RoomsListResult,
};
use agentnet_protocol::{pow, IncomingMessage, RoomInfo, RoomListItem};

use crate::error::ClientError;

type WsConn = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsConn, Message>;
type WsStream = SplitStream<WsConn>;

/// A live session with a relay. Cheap to clone; all clones share the
/// same socket. The session ends when either side closes the socket —
/// a dead client is discarded, never reconnected in place.
#[derive(Clone)]
pub struct RelayClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient").finish_non_exhaustive()
    }
}

struct ClientInner {
    agent_id: String,
    signing_key: SigningKey,
    /// Write half. The lock serializes frames; no two writes interleave.
    sink: Mutex<WsSink>,
    /// Operation mutex. Owning the response receiver makes "at most one
    /// awaiter" structural rather than a convention.
    ops: Mutex<mpsc::Receiver<Value>>,
    /// Producer side of the response channel; also used to re-enqueue
    /// envelopes a waiter inspected but did not want.
    resp_tx: mpsc::Sender<Value>,
    /// Handed out once to the single message consumer.
    msg_rx: StdMutex<Option<mpsc::Receiver<IncomingMessage>>>,
    /// Rooms this session believes itself joined to.
    rooms: StdMutex<HashSet<String>>,
    closed: AtomicBool,
    done_rx: watch::Receiver<bool>,
}

impl RelayClient {
    /// Dial the relay and run the handshake: `hello` → `pow.challenge` →
    /// `hello.pow` → `welcome`. On success the read and ping loops are
    /// started and the session is live.
    pub async fn connect(
        url: &str,
        agent_id: &str,
        agent_name: &str,
        signing_key: SigningKey,
    ) -> Result<Self, ClientError> {
        let (mut ws, _) = connect_async(url)
            .await
            .map_err(|e| ClientError::Dial(e.to_string()))?;

        if let Err(err) = handshake(&mut ws, &signing_key, agent_id, agent_name).await {
            let _ = ws.close(None).await;
            return Err(err);
        }

        let (sink, stream) = ws.split();
        let (msg_tx, msg_rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let (resp_tx, resp_rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        let (done_tx, done_rx) = watch::channel(false);

        let client = Self {
            inner: Arc::new(ClientInner {
                agent_id: agent_id.to_string(),
                signing_key,
                sink: Mutex::new(sink),
                ops: Mutex::new(resp_rx),
                resp_tx: resp_tx.clone(),
                msg_rx: StdMutex::new(Some(msg_rx)),
                rooms: StdMutex::new(HashSet::new()),
                closed: AtomicBool::new(false),
                done_rx,
            }),
        };

        tokio::spawn(read_loop(stream, msg_tx, resp_tx, done_tx));
        tokio::spawn(ping_loop(client.clone()));

        Ok(client)
    }

    /// Create a room, answering the relay's PoW challenge when one is
    /// issued. Two-phase: an unproven `room.create` first, then a second
    /// one carrying the solved puzzle.
    pub async fn create_room(
        &self,
        name: &str,
        topic: &str,
        tags: &[String],
    ) -> Result<RoomInfo, ClientError> {
        let mut rx = self.inner.ops.lock().await;

        self.write_frame(&frame::room_create(
            &self.inner.signing_key,
            name,
            topic,
            tags,
            None,
        ))
        .await?;

        let mut resp = self
            .recv_typed(&mut rx, Some(name), &["pow.challenge", "room.joined", "error"])
            .await?;

        if frame_type(&resp) == "pow.challenge" {
            let challenge: PowChallenge = serde_json::from_value(resp)?;
            let proof = pow::solve(&challenge.challenge, challenge.difficulty);

            self.write_frame(&frame::room_create(
                &self.inner.signing_key,
                name,
                topic,
                tags,
                Some((&challenge.challenge, &proof)),
            ))
            .await?;

            resp = self
                .recv_typed(&mut rx, Some(name), &["room.joined", "error"])
                .await?;
        }

        self.room_reply(resp)
    }

    /// Join an existing room.
    pub async fn join_room(&self, name: &str) -> Result<RoomInfo, ClientError> {
        let mut rx = self.inner.ops.lock().await;

        self.write_frame(&frame::room_join(&self.inner.signing_key, name))
            .await?;

        let resp = self
            .recv_typed(&mut rx, Some(name), &["room.joined", "error"])
            .await?;
        self.room_reply(resp)
    }

    /// Leave a room. Fire-and-forget: the write is acknowledged, the
    /// relay's reaction is not awaited.
    pub async fn leave_room(&self, name: &str) -> Result<(), ClientError> {
        self.inner.rooms.lock().unwrap().remove(name);
        self.write_frame(&frame::room_leave(&self.inner.signing_key, name))
            .await
    }

    /// Send a text message to a room. Fire-and-forget.
    pub async fn send_message(&self, room: &str, text: &str) -> Result<(), ClientError> {
        self.write_frame(&frame::message(
            &self.inner.signing_key,
            &self.inner.agent_id,
            room,
            text,
        ))
        .await
    }

    /// List rooms on the relay, optionally filtered by tags.
    pub async fn list_rooms(
        &self,
        tags: &[String],
        limit: u32,
    ) -> Result<Vec<RoomListItem>, ClientError> {
        let mut rx = self.inner.ops.lock().await;

        self.write_frame(&frame::rooms_list(tags, limit)).await?;

        let resp = self
            .recv_typed(&mut rx, None, &["rooms.list.result", "error"])
            .await?;
        if frame_type(&resp) == "error" {
            return Err(ClientError::Server(error_message(&resp)));
        }
        let result: RoomsListResult = serde_json::from_value(resp)?;
        Ok(result.rooms)
    }

    /// Take the incoming-message receiver. Returns `Some` exactly once;
    /// there is a single consumer per session.
    pub fn take_messages(&self) -> Option<mpsc::Receiver<IncomingMessage>> {
        self.inner.msg_rx.lock().unwrap().take()
    }

    /// Snapshot of the rooms this session has observed `room.joined` for.
    pub fn rooms(&self) -> Vec<String> {
        let rooms = self.inner.rooms.lock().unwrap();
        rooms.iter().cloned().collect()
    }

    /// Close the socket. The read loop observes the close and exits;
    /// [`RelayClient::wait`] then returns.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let mut sink = self.inner.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
    }

    /// Block until the read loop exits (the session is dead).
    pub async fn wait(&self) {
        let mut done = self.inner.done_rx.clone();
        loop {
            if *done.borrow() {
                return;
            }
            if done.changed().await.is_err() {
                return;
            }
        }
    }

    // ── internals ────────────────────────────────────────────────────────

    async fn write_frame(&self, frame: &Value) -> Result<(), ClientError> {
        let text = serde_json::to_string(frame)?;
        let mut sink = self.inner.sink.lock().await;
        sink.send(Message::Text(text.into()))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    /// Wait for a response envelope whose `type` is in `want_types`; for
    /// `room.joined` additionally require `room == want_room` so a join
    /// racing with another room's late reply cannot cross-talk. Envelopes
    /// that do not match are re-enqueued for a later operation. Overall
    /// deadline: [`RESPONSE_TIMEOUT`].
    ///
    /// Callers hold the operation mutex (they own `rx`), so there is
    /// never more than one waiter.
    async fn recv_typed(
        &self,
        rx: &mut mpsc::Receiver<Value>,
        want_room: Option<&str>,
        want_types: &[&str],
    ) -> Result<Value, ClientError> {
        let deadline = tokio::time::Instant::now() + RESPONSE_TIMEOUT;
        let mut unmatched: Vec<Value> = Vec::new();

        let result = loop {
            let next = tokio::time::timeout_at(deadline, rx.recv()).await;
            match next {
                Err(_) => break Err(ClientError::Timeout),
                Ok(None) => break Err(ClientError::Closed),
                Ok(Some(envelope)) => {
                    let ty = frame_type(&envelope).to_string();
                    if !want_types.contains(&ty.as_str()) {
                        unmatched.push(envelope);
                        continue;
                    }
                    if ty == "room.joined" {
                        if let Some(want) = want_room {
                            if frame_room(&envelope) != Some(want) {
                                unmatched.push(envelope);
                                continue;
                            }
                        }
                    }
                    break Ok(envelope);
                }
            }
        };

        // Put inspected-but-unwanted envelopes back for the next operation.
        // Best effort: the channel is small and drops on overflow.
        for envelope in unmatched {
            let _ = self.inner.resp_tx.try_send(envelope);
        }

        result
    }

    fn room_reply(&self, resp: Value) -> Result<RoomInfo, ClientError> {
        if frame_type(&resp) == "error" {
            return Err(ClientError::Server(error_message(&resp)));
        }
        let joined: RoomJoined = serde_json::from_value(resp)?;
        self.inner.rooms.lock().unwrap().insert(joined.room.clone());
        Ok(joined.into())
    }
}

/// Extract the human-readable message from an `error` frame.
fn error_message(envelope: &Value) -> String {
    match serde_json::from_value::<ErrorFrame>(envelope.clone()) {
        Ok(err) => err.message,
        Err(_) => "relay error".to_string(),
    }
}

// ============================================================================
// Handshake
// ============================================================================

/// States: Dialing → HelloSent → PoWSolving → PoWReplied → Welcomed, with
/// any deviation terminal. Runs before the read loop starts, so inline
/// reads are safe here and nowhere else.
async fn handshake(
    ws: &mut WsConn,
    key: &SigningKey,
    agent_id: &str,
    agent_name: &str,
) -> Result<(), ClientError> {
    send_inline(ws, &frame::hello(key, agent_id, agent_name)).await?;

    let challenge_frame = read_inline(ws).await?;
    match frame_type(&challenge_frame) {
        "pow.challenge" => {}
        "error" => return Err(ClientError::Auth(error_message(&challenge_frame))),
        other => return Err(ClientError::Unexpected(other.to_string())),
    }
    let challenge: PowChallenge = serde_json::from_value(challenge_frame)?;

    let proof = pow::solve(&challenge.challenge, challenge.difficulty);
    send_inline(ws, &frame::hello_pow(key, &challenge.challenge, &proof)).await?;

    let welcome = read_inline(ws).await?;
    match frame_type(&welcome) {
        "welcome" => Ok(()),
        "error" => Err(ClientError::Auth(error_message(&welcome))),
        other => Err(ClientError::Unexpected(other.to_string())),
    }
}

async fn send_inline(ws: &mut WsConn, frame: &Value) -> Result<(), ClientError> {
    let text = serde_json::to_string(frame)?;
    ws.send(Message::Text(text.into()))
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))
}

/// Read one JSON frame during the handshake, skipping transport-level
/// control frames.
async fn read_inline(ws: &mut WsConn) -> Result<Value, ClientError> {
    while let Some(next) = ws.next().await {
        let msg = next.map_err(|e| ClientError::Transport(e.to_string()))?;
        match msg {
            Message::Text(text) => return Ok(frame::decode(&text)?),
            Message::Binary(bytes) => {
                let text = String::from_utf8(bytes.to_vec())
                    .map_err(|_| ClientError::Unexpected("non-utf8 frame".to_string()))?;
                return Ok(frame::decode(&text)?);
            }
            Message::Close(_) => return Err(ClientError::Closed),
            _ => continue,
        }
    }
    Err(ClientError::Closed)
}

// ============================================================================
// Background loops
// ============================================================================

/// The single reader after the handshake. Classifies each frame by type
/// and fans it out; any read error ends the session.
async fn read_loop(
    mut stream: WsStream,
    msg_tx: mpsc::Sender<IncomingMessage>,
    resp_tx: mpsc::Sender<Value>,
    done_tx: watch::Sender<bool>,
) {
    while let Some(next) = stream.next().await {
        let msg = match next {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!("read loop ending: {e}");
                break;
            }
        };

        let text = match msg {
            Message::Text(text) => text.to_string(),
            Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(_) => continue,
            },
            Message::Close(_) => break,
            _ => continue,
        };

        let Ok(envelope) = serde_json::from_str::<Value>(&text) else {
            tracing::debug!("dropping unparseable frame");
            continue;
        };

        let ty = frame_type(&envelope).to_string();
        match ty.as_str() {
            "message" => match serde_json::from_value::<MessageFrame>(envelope) {
                // Blocking insert: if the consumer stalls with a full
                // channel, protocol processing halts rather than corrupting
                // state. Eviction happens in the daemon's ring buffer.
                Ok(m) => {
                    if msg_tx.send(m.into()).await.is_err() {
                        tracing::debug!("message consumer gone");
                    }
                }
                Err(e) => tracing::debug!("bad message frame: {e}"),
            },
            // Liveness reply, nothing waits on it.
            "pong" => {}
            // Broadcast events, not command responses.
            "room.member_joined" | "room.member_left" => {}
            _ => {
                // Non-blocking: the read loop must never stall on a reply
                // nobody is waiting for.
                let _ = resp_tx.try_send(envelope);
            }
        }
    }

    let _ = done_tx.send(true);
}

/// Unsigned keepalive every [`PING_INTERVAL`] until the session closes.
async fn ping_loop(client: RelayClient) {
    let mut ticker = tokio::time::interval(PING_INTERVAL);
    ticker.tick().await; // consume the immediate first tick
    let mut done = client.inner.done_rx.clone();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if client.inner.closed.load(Ordering::SeqCst) {
                    return;
                }
                if client.write_frame(&frame::ping()).await.is_err() {
                    return;
                }
            }
            _ = done.changed() => return,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use agentnet_protocol::canonical::verify_value;
    use agentnet_protocol::keys;
    use ed25519_dalek::VerifyingKey;
    use rand::rngs::OsRng;
    use tokio::net::TcpListener;

    type StubWs = WebSocketStream<TcpStream>;

    const STUB_CHALLENGE: &str = "stub-challenge";

    async fn stub_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    async fn stub_accept(listener: &TcpListener) -> StubWs {
        let (stream, _) = listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(stream).await.unwrap()
    }

    async fn stub_read(ws: &mut StubWs) -> Value {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                Message::Close(_) => panic!("stub: unexpected close"),
                _ => continue,
            }
        }
    }

    async fn stub_send(ws: &mut StubWs, frame: Value) {
        ws.send(Message::Text(frame.to_string().into()))
            .await
            .unwrap();
    }

    /// Drive the relay side of a handshake, verifying the hello signature
    /// and the PoW proof.
    async fn stub_handshake(ws: &mut StubWs, vk: &VerifyingKey, difficulty: u32) {
        let hello = stub_read(ws).await;
        assert_eq!(frame_type(&hello), "hello");
        let sig = hello["signature"].as_str().unwrap().to_string();
        assert!(verify_value(vk, &hello, &sig), "hello signature invalid");

        stub_send(
            ws,
            serde_json::json!({
                "type": "pow.challenge",
                "challenge": STUB_CHALLENGE,
                "difficulty": difficulty,
            }),
        )
        .await;

        let pow_frame = stub_read(ws).await;
        assert_eq!(frame_type(&pow_frame), "hello.pow");
        let proof = pow_frame["pow"]["proof"].as_str().unwrap();
        assert!(pow::verify(STUB_CHALLENGE, proof, difficulty));

        stub_send(ws, serde_json::json!({ "type": "welcome" })).await;
    }

    fn test_key() -> SigningKey {
        SigningKey::generate(&mut OsRng)
    }

    async fn connected_pair() -> (RelayClient, StubWs) {
        let key = test_key();
        let vk = key.verifying_key();
        let id = keys::agent_id(&vk);
        let (listener, url) = stub_listener().await;

        let server = tokio::spawn(async move {
            let mut ws = stub_accept(&listener).await;
            stub_handshake(&mut ws, &vk, 8).await;
            ws
        });

        let client = RelayClient::connect(&url, &id, "tester", key).await.unwrap();
        (client, server.await.unwrap())
    }

    #[tokio::test]
    async fn handshake_happy_path() {
        let (client, _ws) = connected_pair().await;
        assert!(client.rooms().is_empty());
    }

    #[tokio::test]
    async fn handshake_error_frame_fails_with_auth() {
        let key = test_key();
        let id = keys::agent_id(&key.verifying_key());
        let (listener, url) = stub_listener().await;

        tokio::spawn(async move {
            let mut ws = stub_accept(&listener).await;
            let _hello = stub_read(&mut ws).await;
            stub_send(
                &mut ws,
                serde_json::json!({ "type": "error", "message": "agent banned" }),
            )
            .await;
        });

        let err = RelayClient::connect(&url, &id, "tester", key)
            .await
            .unwrap_err();
        match err {
            ClientError::Auth(msg) => assert_eq!(msg, "agent banned"),
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn handshake_wrong_frame_type_fails() {
        let key = test_key();
        let id = keys::agent_id(&key.verifying_key());
        let (listener, url) = stub_listener().await;

        tokio::spawn(async move {
            let mut ws = stub_accept(&listener).await;
            let _hello = stub_read(&mut ws).await;
            stub_send(&mut ws, serde_json::json!({ "type": "surprise" })).await;
        });

        let err = RelayClient::connect(&url, &id, "tester", key)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Unexpected(t) if t == "surprise"));
    }

    #[tokio::test]
    async fn create_room_two_phase_pow() {
        let (client, mut ws) = connected_pair().await;

        let server = tokio::spawn(async move {
            let first = stub_read(&mut ws).await;
            assert_eq!(frame_type(&first), "room.create");
            assert!(first.get("pow").is_none());

            stub_send(
                &mut ws,
                serde_json::json!({
                    "type": "pow.challenge",
                    "challenge": "create-chal",
                    "difficulty": 8,
                }),
            )
            .await;

            let second = stub_read(&mut ws).await;
            assert_eq!(frame_type(&second), "room.create");
            let proof = second["pow"]["proof"].as_str().unwrap();
            assert!(pow::verify("create-chal", proof, 8));

            stub_send(
                &mut ws,
                serde_json::json!({
                    "type": "room.joined",
                    "room": "r",
                    "topic": "t",
                    "tags": ["x"],
                    "members": [{ "id": "self", "name": "me" }],
                }),
            )
            .await;
        });

        let info = client.create_room("r", "t", &["x".to_string()]).await.unwrap();
        server.await.unwrap();

        assert_eq!(info.name, "r");
        assert_eq!(info.members.len(), 1);
        assert_eq!(info.members[0].id, "self");
        assert!(client.rooms().contains(&"r".to_string()));
    }

    #[tokio::test]
    async fn join_room_server_error_is_surfaced() {
        let (client, mut ws) = connected_pair().await;

        tokio::spawn(async move {
            let join = stub_read(&mut ws).await;
            assert_eq!(frame_type(&join), "room.join");
            stub_send(
                &mut ws,
                serde_json::json!({ "type": "error", "message": "room not found" }),
            )
            .await;
            // keep the socket open so the error is not racing a close
            let _ = ws.next().await;
        });

        let err = client.join_room("missing").await.unwrap_err();
        assert!(matches!(err, ClientError::Server(msg) if msg == "room not found"));
        assert!(client.rooms().is_empty());
    }

    #[tokio::test]
    async fn join_room_skips_mismatched_room_joined() {
        let (client, mut ws) = connected_pair().await;

        tokio::spawn(async move {
            let _join = stub_read(&mut ws).await;
            // A stale join reply for another room arrives first.
            stub_send(
                &mut ws,
                serde_json::json!({ "type": "room.joined", "room": "other" }),
            )
            .await;
            stub_send(
                &mut ws,
                serde_json::json!({ "type": "room.joined", "room": "wanted" }),
            )
            .await;
            let _ = ws.next().await;
        });

        let info = client.join_room("wanted").await.unwrap();
        assert_eq!(info.name, "wanted");
    }

    #[tokio::test]
    async fn list_rooms_is_unsigned_and_parses_result() {
        let (client, mut ws) = connected_pair().await;

        tokio::spawn(async move {
            let req = stub_read(&mut ws).await;
            assert_eq!(frame_type(&req), "rooms.list");
            assert!(req.get("signature").is_none());
            assert_eq!(req["limit"], 50);

            stub_send(
                &mut ws,
                serde_json::json!({
                    "type": "rooms.list.result",
                    "rooms": [
                        { "name": "general", "topic": "", "tags": [], "agents": 3, "last_active": 1 },
                    ],
                }),
            )
            .await;
            let _ = ws.next().await;
        });

        let rooms = client.list_rooms(&[], 50).await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].name, "general");
        assert_eq!(rooms[0].agents, 3);
    }

    #[tokio::test]
    async fn unmatched_envelope_requeued_for_next_operation() {
        let (client, mut ws) = connected_pair().await;

        tokio::spawn(async move {
            let _join = stub_read(&mut ws).await;
            // A list result nobody asked for yet, then the join reply.
            stub_send(
                &mut ws,
                serde_json::json!({ "type": "rooms.list.result", "rooms": [] }),
            )
            .await;
            stub_send(
                &mut ws,
                serde_json::json!({ "type": "room.joined", "room": "r1" }),
            )
            .await;

            // The follow-up list request finds the re-queued result.
            let list = stub_read(&mut ws).await;
            assert_eq!(frame_type(&list), "rooms.list");
            let _ = ws.next().await;
        });

        client.join_room("r1").await.unwrap();
        let rooms = client.list_rooms(&[], 10).await.unwrap();
        assert!(rooms.is_empty());
    }

    #[tokio::test]
    async fn incoming_messages_reach_the_stream() {
        let (client, mut ws) = connected_pair().await;
        let mut messages = client.take_messages().unwrap();
        // Only one consumer per session.
        assert!(client.take_messages().is_none());

        tokio::spawn(async move {
            stub_send(
                &mut ws,
                serde_json::json!({
                    "type": "message",
                    "room": "general",
                    "from": "peer",
                    "from_name": "Peer",
                    "content": { "type": "text", "text": "hi" },
                    "timestamp": 42,
                }),
            )
            .await;
            let _ = ws.next().await;
        });

        let msg = messages.recv().await.unwrap();
        assert_eq!(msg.room, "general");
        assert_eq!(msg.from, "peer");
        assert_eq!(msg.text, "hi");
        assert_eq!(msg.timestamp, 42);
    }

    #[tokio::test]
    async fn send_message_and_leave_are_fire_and_forget() {
        let (client, mut ws) = connected_pair().await;

        let server = tokio::spawn(async move {
            let msg = stub_read(&mut ws).await;
            assert_eq!(frame_type(&msg), "message");
            assert_eq!(msg["content"]["text"], "hello");
            assert!(msg.get("signature").is_some());

            let leave = stub_read(&mut ws).await;
            assert_eq!(frame_type(&leave), "room.leave");
            assert_eq!(leave["room"], "general");
        });

        client.send_message("general", "hello").await.unwrap();
        client.leave_room("general").await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn wait_returns_when_server_closes() {
        let (client, mut ws) = connected_pair().await;

        tokio::spawn(async move {
            ws.close(None).await.unwrap();
        });

        // Must complete promptly once the read loop observes the close.
        tokio::time::timeout(std::time::Duration::from_secs(5), client.wait())
            .await
            .expect("wait did not return after close");
    }

    #[tokio::test]
    async fn close_ends_the_session() {
        let (client, mut ws) = connected_pair().await;

        let server = tokio::spawn(async move {
            // Drain until the client's close arrives.
            while let Some(Ok(msg)) = ws.next().await {
                if matches!(msg, Message::Close(_)) {
                    break;
                }
            }
        });

        client.close().await;
        tokio::time::timeout(std::time::Duration::from_secs(5), client.wait())
            .await
            .expect("wait did not return after close");
        server.await.unwrap();
    }
}
