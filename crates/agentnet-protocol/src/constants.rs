// ============================================================================
// Protocol constants
// ============================================================================

use std::time::Duration;

/// Protocol version tag sent in the hello profile.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// --- Channels ---------------------------------------------------------------

/// Capacity of the incoming-message channel between the read loop and the
/// single consumer. When full, the read loop blocks until space appears.
pub const MESSAGE_CHANNEL_CAPACITY: usize = 1000;

/// Capacity of the response channel carrying demultiplexed non-event frames
/// back to the one synchronous operation in flight. The operation mutex
/// guarantees at most one awaiter, so a small buffer suffices; producers
/// drop on overflow rather than block the read loop.
pub const RESPONSE_CHANNEL_CAPACITY: usize = 4;

// --- Timing -----------------------------------------------------------------

/// Overall deadline for a synchronous request/response exchange.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(15);

/// Interval between unsigned keepalive pings.
pub const PING_INTERVAL: Duration = Duration::from_secs(25);

/// First reconnect delay after a session dies.
pub const RECONNECT_BACKOFF_INITIAL: Duration = Duration::from_secs(2);

/// Reconnect delay ceiling; backoff doubles until it reaches this.
pub const RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(60);

// --- Nonces -----------------------------------------------------------------

/// Random bytes in a request nonce (base58-encoded on the wire).
pub const NONCE_LEN: usize = 16;
