//! Async Omron FINS client with a reactive polled-tag layer.
//!
//! The crate speaks the FINS command protocol over TCP (with the 16-byte
//! envelope and node-address negotiation) or UDP (raw datagrams), and layers
//! a typed tag engine on top: callers declare named memory addresses, the
//! engine polls them on an interval and multicasts changed values to
//! subscribers.
//!
//! Structure:
//!
//! - [`protocol`]: wire frames, BCD codec, TCP framing, transports and the
//!   session with its single-in-flight request pipeline;
//! - [`TagCodec`]: word layouts for the closed [`TagKind`] set;
//! - [`FinsClient`]: registration, observation, cached reads, fire-and-forget
//!   writes and the clock and cycle-time pass-throughs.

pub mod client;
pub mod codec;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod types;
pub mod value;

pub use client::FinsClient;
pub use codec::{TagCodec, DEFAULT_STRING_LEN};
pub use engine::{ErrorEvent, TagChange};
pub use error::{DriverError, DriverResult};
pub use protocol::frame::addr::FinsAddress;
pub use protocol::frame::area::MemoryArea;
pub use protocol::frame::pdu::{ClockReading, ControllerData, CycleTimeReading};
pub use protocol::session::{
    ControllerIdentity, ExchangeOutcome, SessionEvent, SessionLifecycleState, SessionStats,
};
pub use types::{FinsClientConfig, PlcType, Transport, DEFAULT_PORT};
pub use value::{FromTagValue, IntoTagValue, TagKind, TagValue};
