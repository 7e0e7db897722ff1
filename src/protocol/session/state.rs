use crate::types::{FinsClientConfig, Transport};
use std::time::Duration;

/// Session lifecycle state.
///
/// The channel is strictly owned by the session: it only exists between the
/// `Connecting` and `Closed` transitions, so there is no half-open socket to
/// race against during teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLifecycleState {
    /// No connection attempt yet.
    Idle,
    /// Transport connecting (for TCP this includes the node handshake).
    Connecting,
    /// Channel open and usable.
    Ready,
    /// Session shut down; no further exchanges are accepted.
    Closed,
}

/// Session events for observability.
#[derive(Debug, Clone, Copy)]
pub enum SessionEvent {
    /// Lifecycle changed notification.
    LifecycleChanged(SessionLifecycleState),
    /// A transport level failure forced a channel rebuild.
    TransportError,
}

/// FINS session configuration derived from the client configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// PLC host name or address.
    pub host: String,
    /// PLC port, 9600 by default for both transports.
    pub port: u16,
    /// Transport selection.
    pub transport: Transport,
    /// Configured source node id (may be overridden by TCP negotiation).
    pub local_node: u8,
    /// Configured destination node id (may be overridden by TCP negotiation).
    pub remote_node: u8,
    /// Per-request deadline.
    pub request_timeout: Duration,
    /// Connect deadline for channel establishment.
    pub connect_timeout: Duration,
    /// Additional attempts beyond the first on transient failure.
    pub retries: u32,
}

impl From<&FinsClientConfig> for SessionConfig {
    fn from(cfg: &FinsClientConfig) -> Self {
        Self {
            host: cfg.host.clone(),
            port: cfg.port,
            transport: cfg.transport,
            local_node: cfg.local_node_id,
            remote_node: cfg.remote_node_id,
            request_timeout: Duration::from_millis(cfg.timeout_ms),
            connect_timeout: Duration::from_millis(cfg.connect_timeout_ms),
            retries: cfg.retries,
        }
    }
}
