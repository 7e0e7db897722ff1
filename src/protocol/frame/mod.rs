//! FINS frame structures.
//!
//! Submodules define the fixed header, the closed command enumeration, memory
//! area codes, the textual address parser, request builders and response
//! parsing with payload extractors.

pub mod addr;
pub mod area;
pub mod builder;
pub mod command;
pub mod header;
pub mod pdu;

use self::{command::FinsCommandKind, header::FinsHeader};
use bytes::{BufMut, Bytes, BytesMut};

/// A fully formed FINS command frame ready for the wire.
///
/// The encoded form is the 10-byte header, the two command bytes and the
/// command-specific payload, independent of the carrying transport.
#[derive(Debug, Clone)]
pub struct FinsRequest {
    /// Addressing and correlation header.
    pub header: FinsHeader,
    /// Semantic command kind, resolved to function and sub-function bytes.
    pub command: FinsCommandKind,
    /// Command-specific payload.
    pub payload: Bytes,
}

impl FinsRequest {
    /// Serialize header, command bytes and payload into one buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(header::FINS_HEADER_SIZE + 2 + self.payload.len());
        buf.put_slice(&self.header.to_bytes());
        buf.put_slice(&self.command.code());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Total encoded length in bytes.
    pub fn wire_len(&self) -> usize {
        header::FINS_HEADER_SIZE + 2 + self.payload.len()
    }
}
