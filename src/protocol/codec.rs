//! FINS-over-TCP framing codec.
//!
//! TCP carries FINS messages inside a 16-byte envelope: the ASCII magic
//! `FINS`, a big-endian 32-bit length covering command, error code and
//! payload, a 32-bit frame command and a 32-bit error code. The codec
//! provides streaming reassembly over `Framed` with `Sink`/`Stream`
//! semantics.

use super::error::Error;
use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// ASCII frame magic.
pub const TCP_MAGIC: [u8; 4] = *b"FINS";
/// Envelope size preceding the frame body.
pub const TCP_HEADER_SIZE: usize = 16;
/// Length field portion occupied by the command and error words.
const LENGTH_OVERHEAD: usize = 8;
/// Upper bound accepted for the length field. FINS frames are small; anything
/// beyond this indicates a corrupted stream.
const MAX_FRAME_LENGTH: usize = 8 + 4096;

/// Frame commands defined by the TCP envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpFrameCommand {
    /// Client asks the PLC for node addresses.
    NodeAddressRequest,
    /// PLC replies with the assigned node addresses.
    NodeAddressReply,
    /// Envelope carries a raw FINS message.
    Fins,
}

impl TcpFrameCommand {
    pub fn code(self) -> u32 {
        match self {
            TcpFrameCommand::NodeAddressRequest => 0,
            TcpFrameCommand::NodeAddressReply => 1,
            TcpFrameCommand::Fins => 2,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(TcpFrameCommand::NodeAddressRequest),
            1 => Some(TcpFrameCommand::NodeAddressReply),
            2 => Some(TcpFrameCommand::Fins),
            _ => None,
        }
    }
}

/// One decoded TCP envelope frame.
#[derive(Debug, Clone)]
pub struct TcpFrame {
    /// Envelope command.
    pub command: TcpFrameCommand,
    /// Body following the envelope, a FINS message for `Fins` frames.
    pub payload: Bytes,
}

impl TcpFrame {
    pub fn new(command: TcpFrameCommand, payload: Bytes) -> Self {
        Self { command, payload }
    }
}

/// Error codes the PLC may place in the envelope error word.
fn tcp_error_description(code: u32) -> &'static str {
    match code {
        1 => "the header is not FINS",
        2 => "the data length is too long",
        3 => "the command is not supported",
        20 => "all connections are in use",
        21 => "the specified node is already connected",
        22 => "attempt to access a protected node from an unspecified IP address",
        23 => "the client FINS node address is out of range",
        24 => "the same FINS node address is already in use",
        25 => "all available node addresses are in use",
        _ => "unknown FINS/TCP error code",
    }
}

/// Streaming codec for the FINS/TCP envelope.
#[derive(Debug, Clone, Default)]
pub struct FinsTcpCodec;

impl Decoder for FinsTcpCodec {
    type Item = TcpFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < TCP_HEADER_SIZE {
            return Ok(None);
        }

        if src[0..4] != TCP_MAGIC {
            return Err(Error::Framing {
                context: "FINS/TCP magic mismatch",
            });
        }

        let length = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if !(LENGTH_OVERHEAD..=MAX_FRAME_LENGTH).contains(&length) {
            return Err(Error::Framing {
                context: "FINS/TCP length field out of range",
            });
        }

        let command_code = u32::from_be_bytes([src[8], src[9], src[10], src[11]]);
        let command = TcpFrameCommand::from_code(command_code).ok_or(Error::Framing {
            context: "unknown FINS/TCP frame command",
        })?;

        let error_code = u32::from_be_bytes([src[12], src[13], src[14], src[15]]);
        if error_code != 0 {
            return Err(Error::Framing {
                context: tcp_error_description(error_code),
            });
        }

        let body_len = length - LENGTH_OVERHEAD;
        let frame_len = TCP_HEADER_SIZE + body_len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let frame = src.split_to(frame_len).freeze();
        Ok(Some(TcpFrame {
            command,
            payload: frame.slice(TCP_HEADER_SIZE..),
        }))
    }
}

impl Encoder<TcpFrame> for FinsTcpCodec {
    type Error = Error;

    fn encode(&mut self, item: TcpFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(TCP_HEADER_SIZE + item.payload.len());
        dst.put_slice(&TCP_MAGIC);
        dst.put_u32((LENGTH_OVERHEAD + item.payload.len()) as u32);
        dst.put_u32(item.command.code());
        dst.put_u32(0);
        dst.put_slice(&item.payload);
        Ok(())
    }
}
