// agentnet-client: WebSocket client for an AgentNet relay.
// One socket, two logical streams: signed requests out, frames in.
// Unsolicited events and command replies are interleaved on the same
// connection; the client demultiplexes them (see client.rs).

pub mod client;
pub mod error;

pub use client::RelayClient;
pub use error::ClientError;
