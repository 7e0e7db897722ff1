//! FINS channel transports.
//!
//! Both channels expose the same surface: send one FINS message, receive one
//! FINS message within a deadline, purge stale input after a service-id
//! mismatch. A channel only exists in the connected state and is consumed by
//! teardown, so rebuild always means constructing a fresh one.

use super::codec::{FinsTcpCodec, TcpFrame, TcpFrameCommand};
use super::error::{Error, Result};
use super::frame::header::starts_with_response_icf;
use super::frame::pdu::MIN_RESPONSE_SIZE;
use super::session::SessionConfig;
use crate::types::Transport;
use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use std::io;
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{self, Instant};
use tokio_util::codec::Framed;
use tracing::{debug, trace};

/// Reserved node id that must never appear in a handshake reply.
const NODE_ID_RESERVED: u8 = 255;

/// Map socket failures onto the protocol taxonomy. Connection teardown races
/// surface as `ChannelClosed`, everything else stays a transport error.
fn map_io_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset => Error::ChannelClosed,
        _ => Error::Transport(e),
    }
}

/// FINS channel over TCP with the 16-byte envelope and negotiated node ids.
pub(crate) struct TcpChannel {
    framed: Framed<TcpStream, FinsTcpCodec>,
    /// Node ids assigned by the PLC during the handshake: (local, remote).
    negotiated: (u8, u8),
}

impl TcpChannel {
    /// Connect and run the node-address handshake.
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        let stream = time::timeout(
            config.connect_timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| Error::Timeout)?
        .map_err(map_io_error)?;
        let _ = stream.set_nodelay(true);

        let mut framed = Framed::new(stream, FinsTcpCodec);
        let negotiated = Self::handshake(&mut framed, config.request_timeout).await?;
        debug!(
            local = negotiated.0,
            remote = negotiated.1,
            "FINS/TCP node addresses negotiated"
        );
        Ok(Self { framed, negotiated })
    }

    /// Node-address negotiation on a freshly connected stream.
    ///
    /// The client sends a command-0 frame with a four byte zero payload and
    /// receives a command-1 reply whose payload carries the assigned client
    /// node id at byte 3 and the server node id at byte 7.
    async fn handshake(
        framed: &mut Framed<TcpStream, FinsTcpCodec>,
        timeout: Duration,
    ) -> Result<(u8, u8)> {
        let request = TcpFrame::new(
            TcpFrameCommand::NodeAddressRequest,
            Bytes::from_static(&[0, 0, 0, 0]),
        );
        time::timeout(timeout, framed.send(request))
            .await
            .map_err(|_| Error::Timeout)??;

        let reply = time::timeout(timeout, framed.next())
            .await
            .map_err(|_| Error::Timeout)?
            .ok_or(Error::ChannelClosed)??;

        if reply.command != TcpFrameCommand::NodeAddressReply {
            return Err(Error::Handshake {
                context: "expected node address reply frame",
            });
        }
        if reply.payload.len() < 8 {
            return Err(Error::Handshake {
                context: "node address reply payload too short",
            });
        }
        let local = reply.payload[3];
        let remote = reply.payload[7];
        if local == 0 || local == NODE_ID_RESERVED || remote == 0 || remote == NODE_ID_RESERVED {
            return Err(Error::Handshake {
                context: "assigned node address out of range",
            });
        }
        Ok((local, remote))
    }

    pub fn negotiated_nodes(&self) -> (u8, u8) {
        self.negotiated
    }

    pub async fn send(&mut self, message: Bytes) -> Result<()> {
        self.framed
            .send(TcpFrame::new(TcpFrameCommand::Fins, message))
            .await
    }

    pub async fn receive(&mut self, timeout: Duration) -> Result<Bytes> {
        let frame = time::timeout(timeout, self.framed.next())
            .await
            .map_err(|_| Error::Timeout)?
            .ok_or(Error::ChannelClosed)??;

        if frame.command != TcpFrameCommand::Fins {
            return Err(Error::Framing {
                context: "unexpected FINS/TCP frame command",
            });
        }
        if !starts_with_response_icf(&frame.payload) {
            return Err(Error::Framing {
                context: "FINS/TCP body does not start with a response ICF",
            });
        }
        Ok(frame.payload)
    }

    /// Drain buffered frames after a service-id mismatch, absorbing errors.
    pub async fn purge(&mut self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        loop {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return;
            };
            match time::timeout(remaining, self.framed.next()).await {
                Ok(Some(Ok(frame))) => {
                    trace!(len = frame.payload.len(), "purged stale FINS/TCP frame");
                }
                Ok(Some(Err(_))) => continue,
                Ok(None) | Err(_) => return,
            }
        }
    }
}

/// FINS channel over bare UDP datagrams.
pub(crate) struct UdpChannel {
    socket: UdpSocket,
}

impl UdpChannel {
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(map_io_error)?;
        time::timeout(
            config.connect_timeout,
            socket.connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| Error::Timeout)?
        .map_err(map_io_error)?;
        Ok(Self { socket })
    }

    pub async fn send(&mut self, message: Bytes) -> Result<()> {
        self.socket.send(&message).await.map_err(map_io_error)?;
        Ok(())
    }

    /// Accumulate datagrams until the buffer holds a FINS response start and
    /// at least the minimum response length, or the deadline passes.
    pub async fn receive(&mut self, timeout: Duration) -> Result<Bytes> {
        let deadline = Instant::now() + timeout;
        let mut buf = BytesMut::new();
        let mut datagram = [0u8; 4096];
        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or(Error::Timeout)?;
            let n = time::timeout(remaining, self.socket.recv(&mut datagram))
                .await
                .map_err(|_| Error::Timeout)?
                .map_err(map_io_error)?;
            buf.extend_from_slice(&datagram[..n]);

            if buf.len() >= MIN_RESPONSE_SIZE && starts_with_response_icf(&buf) {
                return Ok(buf.freeze());
            }
            trace!(len = buf.len(), "incomplete FINS/UDP buffer, reading more");
        }
    }

    /// Drain readable datagrams until the deadline, silently absorbing read
    /// errors.
    pub async fn purge(&mut self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let mut datagram = [0u8; 4096];
        loop {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return;
            };
            match time::timeout(remaining, self.socket.recv(&mut datagram)).await {
                Ok(Ok(n)) => {
                    trace!(len = n, "purged stale FINS/UDP datagram");
                }
                Ok(Err(_)) => continue,
                Err(_) => return,
            }
        }
    }
}

/// Transport-selected FINS channel.
pub(crate) enum Channel {
    Tcp(TcpChannel),
    Udp(UdpChannel),
}

impl Channel {
    pub async fn open(config: &SessionConfig) -> Result<Self> {
        match config.transport {
            Transport::Tcp => Ok(Channel::Tcp(TcpChannel::connect(config).await?)),
            Transport::Udp => Ok(Channel::Udp(UdpChannel::connect(config).await?)),
        }
    }

    /// Node ids negotiated by the TCP handshake, if any.
    pub fn negotiated_nodes(&self) -> Option<(u8, u8)> {
        match self {
            Channel::Tcp(tcp) => Some(tcp.negotiated_nodes()),
            Channel::Udp(_) => None,
        }
    }

    pub async fn send(&mut self, message: Bytes) -> Result<()> {
        match self {
            Channel::Tcp(tcp) => tcp.send(message).await,
            Channel::Udp(udp) => udp.send(message).await,
        }
    }

    pub async fn receive(&mut self, timeout: Duration) -> Result<Bytes> {
        match self {
            Channel::Tcp(tcp) => tcp.receive(timeout).await,
            Channel::Udp(udp) => udp.receive(timeout).await,
        }
    }

    pub async fn purge(&mut self, timeout: Duration) {
        match self {
            Channel::Tcp(tcp) => tcp.purge(timeout).await,
            Channel::Udp(udp) => udp.purge(timeout).await,
        }
    }
}
