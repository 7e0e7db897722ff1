//! FINS protocol stack.
//!
//! Submodules define the wire frames, the BCD codec, the TCP framing codec,
//! the two transports and the session that ties them into a request pipeline.

pub mod bcd;
pub mod codec;
pub mod error;
pub mod frame;
pub mod session;
pub(crate) mod transport;

pub use error::{Error, Result};
