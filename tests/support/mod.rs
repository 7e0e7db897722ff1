//! In-process mock FINS PLC used by the integration tests.
//!
//! Serves both transports: raw FINS over UDP and the 16-byte envelope with
//! node-address negotiation over TCP. A small scripted reply queue lets tests
//! inject faults (wrong service id, silence, dropped connections) ahead of
//! the default auto-responder backed by a word-addressable memory model.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Once};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "debug".into()),
            )
            .with_target(false)
            .without_time()
            .try_init();
    });
}

/// Node id the mock assigns to the client during the TCP handshake.
pub const ASSIGNED_CLIENT_NODE: u8 = 11;
/// Node id the mock reports for itself during the TCP handshake.
pub const ASSIGNED_SERVER_NODE: u8 = 1;

/// Scripted reply for the next FINS exchange, ahead of the auto-responder.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer via the memory-model auto-responder.
    Auto,
    /// Answer correctly but with a shifted service id.
    WrongSid,
    /// Swallow the request; the client runs into its deadline.
    Silent,
    /// Drop the TCP connection instead of answering. On UDP behaves like
    /// `Silent`.
    Drop,
    /// Answer with this FINS end code.
    EndCode(u8, u8),
}

#[derive(Default)]
struct PlcState {
    /// Word memory keyed by (word area code, address).
    memory: HashMap<(u8, u16), u16>,
    script: VecDeque<MockReply>,
}

/// Handle to a running mock PLC.
pub struct MockPlc {
    pub addr: SocketAddr,
    state: Arc<Mutex<PlcState>>,
    model: String,
    /// FINS exchanges served (handshakes excluded).
    pub requests: Arc<AtomicU32>,
    /// TCP handshakes completed.
    pub handshakes: Arc<AtomicU32>,
    /// Raw bytes of the first handshake frame received.
    pub handshake_frame: Arc<Mutex<Option<Vec<u8>>>>,
    /// Header bytes of the most recent FINS request.
    pub last_request_header: Arc<Mutex<Option<Vec<u8>>>>,
    handle: JoinHandle<()>,
}

impl Drop for MockPlc {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl MockPlc {
    pub async fn spawn_tcp(model: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind tcp");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(Mutex::new(PlcState::default()));
        let requests = Arc::new(AtomicU32::new(0));
        let handshakes = Arc::new(AtomicU32::new(0));
        let handshake_frame = Arc::new(Mutex::new(None));
        let last_request_header = Arc::new(Mutex::new(None));

        let ctx = ServerCtx {
            state: Arc::clone(&state),
            model: model.to_string(),
            requests: Arc::clone(&requests),
            handshakes: Arc::clone(&handshakes),
            handshake_frame: Arc::clone(&handshake_frame),
            last_request_header: Arc::clone(&last_request_header),
        };
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                // One connection at a time keeps the request ordering
                // deterministic across reconnects.
                let _ = serve_tcp_connection(stream, &ctx).await;
            }
        });

        Self {
            addr,
            state,
            model: model.to_string(),
            requests,
            handshakes,
            handshake_frame,
            last_request_header,
            handle,
        }
    }

    pub async fn spawn_udp(model: &str) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind udp");
        let addr = socket.local_addr().expect("local addr");
        let state = Arc::new(Mutex::new(PlcState::default()));
        let requests = Arc::new(AtomicU32::new(0));
        let handshakes = Arc::new(AtomicU32::new(0));
        let handshake_frame = Arc::new(Mutex::new(None));
        let last_request_header = Arc::new(Mutex::new(None));

        let ctx = ServerCtx {
            state: Arc::clone(&state),
            model: model.to_string(),
            requests: Arc::clone(&requests),
            handshakes: Arc::clone(&handshakes),
            handshake_frame: Arc::clone(&handshake_frame),
            last_request_header: Arc::clone(&last_request_header),
        };
        let handle = tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                let Ok((n, peer)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                let request = buf[..n].to_vec();
                ctx.requests.fetch_add(1, Ordering::SeqCst);
                *ctx.last_request_header.lock().unwrap() = Some(request[..10.min(n)].to_vec());
                match next_reply(&ctx.state) {
                    MockReply::Silent | MockReply::Drop => {}
                    MockReply::WrongSid => {
                        let mut resp = auto_respond(&request, &ctx.state, &ctx.model);
                        resp[9] = resp[9].wrapping_add(1);
                        let _ = socket.send_to(&resp, peer).await;
                    }
                    MockReply::EndCode(main, sub) => {
                        let resp = fins_response_with_code(&request, main, sub, &[]);
                        let _ = socket.send_to(&resp, peer).await;
                    }
                    MockReply::Auto => {
                        let resp = auto_respond(&request, &ctx.state, &ctx.model);
                        let _ = socket.send_to(&resp, peer).await;
                    }
                }
            }
        });

        Self {
            addr,
            state,
            model: model.to_string(),
            requests,
            handshakes,
            handshake_frame,
            last_request_header,
            handle,
        }
    }

    /// Queue a scripted reply for an upcoming exchange.
    pub fn push(&self, reply: MockReply) {
        self.state.lock().unwrap().script.push_back(reply);
    }

    /// Set a word in the memory model by its word area code.
    pub fn set_word(&self, area_word_code: u8, addr: u16, value: u16) {
        self.state
            .lock()
            .unwrap()
            .memory
            .insert((area_word_code, addr), value);
    }

    /// Read a word back out of the memory model.
    pub fn word(&self, area_word_code: u8, addr: u16) -> u16 {
        self.state
            .lock()
            .unwrap()
            .memory
            .get(&(area_word_code, addr))
            .copied()
            .unwrap_or(0)
    }
}

struct ServerCtx {
    state: Arc<Mutex<PlcState>>,
    model: String,
    requests: Arc<AtomicU32>,
    handshakes: Arc<AtomicU32>,
    handshake_frame: Arc<Mutex<Option<Vec<u8>>>>,
    last_request_header: Arc<Mutex<Option<Vec<u8>>>>,
}

fn next_reply(state: &Arc<Mutex<PlcState>>) -> MockReply {
    state
        .lock()
        .unwrap()
        .script
        .pop_front()
        .unwrap_or(MockReply::Auto)
}

async fn read_envelope(stream: &mut TcpStream) -> std::io::Result<(u32, Vec<u8>)> {
    let mut header = [0u8; 16];
    stream.read_exact(&mut header).await?;
    assert_eq!(&header[0..4], b"FINS", "envelope magic");
    let length = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let command = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
    let mut body = vec![0u8; length - 8];
    stream.read_exact(&mut body).await?;
    Ok((command, body))
}

async fn write_envelope(
    stream: &mut TcpStream,
    command: u32,
    payload: &[u8],
) -> std::io::Result<()> {
    let mut frame = Vec::with_capacity(16 + payload.len());
    frame.extend_from_slice(b"FINS");
    frame.extend_from_slice(&((8 + payload.len()) as u32).to_be_bytes());
    frame.extend_from_slice(&command.to_be_bytes());
    frame.extend_from_slice(&0u32.to_be_bytes());
    frame.extend_from_slice(payload);
    stream.write_all(&frame).await
}

async fn serve_tcp_connection(mut stream: TcpStream, ctx: &ServerCtx) -> std::io::Result<()> {
    // Node-address handshake.
    let mut raw = vec![0u8; 20];
    stream.read_exact(&mut raw).await?;
    let command = u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]);
    assert_eq!(command, 0, "expected node address request");
    ctx.handshake_frame.lock().unwrap().get_or_insert(raw);
    let reply = [0, 0, 0, ASSIGNED_CLIENT_NODE, 0, 0, 0, ASSIGNED_SERVER_NODE];
    write_envelope(&mut stream, 1, &reply).await?;
    ctx.handshakes.fetch_add(1, Ordering::SeqCst);

    loop {
        let (command, body) = read_envelope(&mut stream).await?;
        assert_eq!(command, 2, "expected FINS frame");
        ctx.requests.fetch_add(1, Ordering::SeqCst);
        *ctx.last_request_header.lock().unwrap() = Some(body[..10.min(body.len())].to_vec());

        match next_reply(&ctx.state) {
            MockReply::Drop => return Ok(()),
            MockReply::Silent => {}
            MockReply::WrongSid => {
                let mut resp = auto_respond(&body, &ctx.state, &ctx.model);
                resp[9] = resp[9].wrapping_add(1);
                write_envelope(&mut stream, 2, &resp).await?;
            }
            MockReply::EndCode(main, sub) => {
                let resp = fins_response_with_code(&body, main, sub, &[]);
                write_envelope(&mut stream, 2, &resp).await?;
            }
            MockReply::Auto => {
                let resp = auto_respond(&body, &ctx.state, &ctx.model);
                write_envelope(&mut stream, 2, &resp).await?;
            }
        }
    }
}

/// Build a response frame echoing the request with the given end code.
fn fins_response_with_code(request: &[u8], main: u8, sub: u8, payload: &[u8]) -> Vec<u8> {
    let mut resp = Vec::with_capacity(14 + payload.len());
    resp.push(0xC0);
    resp.push(0x00);
    resp.push(0x02);
    // Swap source and destination from the request.
    resp.push(request[6]);
    resp.push(request[7]);
    resp.push(request[8]);
    resp.push(request[3]);
    resp.push(request[4]);
    resp.push(request[5]);
    resp.push(request[9]);
    resp.push(request[10]);
    resp.push(request[11]);
    resp.push(main);
    resp.push(sub);
    resp.extend_from_slice(payload);
    resp
}

fn bit_to_word_code(code: u8) -> Option<u8> {
    match code {
        0x02 => Some(0x82),
        0x30 => Some(0xB0),
        0x31 => Some(0xB1),
        0x32 => Some(0xB2),
        0x33 => Some(0xB3),
        _ => None,
    }
}

/// Default responder backed by the word memory model.
fn auto_respond(request: &[u8], state: &Arc<Mutex<PlcState>>, model: &str) -> Vec<u8> {
    let command = (request[10], request[11]);
    match command {
        // Controller data read.
        (0x05, 0x01) => {
            let mut payload = vec![0u8; 92];
            let model_bytes = model.as_bytes();
            payload[..model_bytes.len()].copy_from_slice(model_bytes);
            payload[20..25].copy_from_slice(b"02.01");
            fins_response_with_code(request, 0, 0, &payload)
        }
        // Memory area read, word or bit depending on the area code.
        (0x01, 0x01) => {
            let code = request[12];
            let addr = u16::from_be_bytes([request[13], request[14]]);
            let bit = request[15];
            let len = u16::from_be_bytes([request[16], request[17]]);
            let state = state.lock().unwrap();
            if let Some(word_code) = bit_to_word_code(code) {
                let word = state.memory.get(&(word_code, addr)).copied().unwrap_or(0);
                let payload: Vec<u8> = (0..len)
                    .map(|i| ((word >> (bit as u16 + i)) & 1) as u8)
                    .collect();
                fins_response_with_code(request, 0, 0, &payload)
            } else {
                let mut payload = Vec::with_capacity(len as usize * 2);
                for i in 0..len {
                    let word = state.memory.get(&(code, addr + i)).copied().unwrap_or(0);
                    payload.extend_from_slice(&word.to_be_bytes());
                }
                fins_response_with_code(request, 0, 0, &payload)
            }
        }
        // Memory area write, word or bit depending on the area code.
        (0x01, 0x02) => {
            let code = request[12];
            let addr = u16::from_be_bytes([request[13], request[14]]);
            let bit = request[15];
            let len = u16::from_be_bytes([request[16], request[17]]);
            let mut state = state.lock().unwrap();
            if let Some(word_code) = bit_to_word_code(code) {
                let entry = state.memory.entry((word_code, addr)).or_insert(0);
                for i in 0..len {
                    let mask = 1u16 << (bit as u16 + i);
                    if request[18 + i as usize] != 0 {
                        *entry |= mask;
                    } else {
                        *entry &= !mask;
                    }
                }
            } else {
                for i in 0..len {
                    let off = 18 + i as usize * 2;
                    let value = u16::from_be_bytes([request[off], request[off + 1]]);
                    state.memory.insert((code, addr + i), value);
                }
            }
            fins_response_with_code(request, 0, 0, &[])
        }
        // Clock read: 2024-01-02 03:04:05, Wednesday.
        (0x07, 0x01) => fins_response_with_code(
            request,
            0,
            0,
            &[0x24, 0x01, 0x02, 0x03, 0x04, 0x05, 0x03],
        ),
        // Clock write.
        (0x07, 0x02) => fins_response_with_code(request, 0, 0, &[]),
        // Cycle time read: avg 12.3 ms, max 45.6 ms, min 7.8 ms.
        (0x06, 0x20) => fins_response_with_code(
            request,
            0,
            0,
            &[
                0x00, 0x00, 0x01, 0x23, 0x00, 0x00, 0x04, 0x56, 0x00, 0x00, 0x00, 0x78,
            ],
        ),
        _ => fins_response_with_code(request, 0x04, 0x01, &[]),
    }
}
