//! Player-count probe speaking the Minecraft Server List Ping status exchange.
//!
//! The exchange is: handshake (next state = status), status request, and a
//! single status response carrying a JSON document. Only `players.online` is
//! read from that document.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::ProbeError;
use crate::resolve::{SrvResolver, resolve_endpoint};

pub const DEFAULT_SERVER_PORT: u16 = 25565;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(800);

const PROTOCOL_VERSION: i32 = 47;
const HANDSHAKE_PACKET_ID: i32 = 0x00;
const STATUS_PACKET_ID: i32 = 0x00;
const NEXT_STATE_STATUS: i32 = 1;
const MAX_VARINT_LEN: usize = 5;
const MAX_HOST_LEN: usize = 255;
// Status documents embed a base64 favicon, so leave generous headroom.
const MAX_PACKET_LEN: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Reads the online player count of one server.
///
/// Implementations never fail: anything that prevents a reading is reported
/// as `None`.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, address: &ServerAddress) -> Option<u32>;
}

#[derive(Clone)]
pub struct StatusProber {
    timeout: Duration,
    srv: Option<Arc<dyn SrvResolver>>,
}

impl StatusProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, srv: None }
    }

    /// Looks up `_minecraft._tcp` SRV records before connecting to hosts
    /// configured without an explicit port.
    pub fn with_srv_resolver(mut self, resolver: Arc<dyn SrvResolver>) -> Self {
        self.srv = Some(resolver);
        self
    }
}

impl fmt::Debug for StatusProber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusProber")
            .field("timeout", &self.timeout)
            .field("srv", &self.srv.is_some())
            .finish()
    }
}

impl Default for StatusProber {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

#[async_trait]
impl Prober for StatusProber {
    async fn probe(&self, address: &ServerAddress) -> Option<u32> {
        match query_player_count(address, self.srv.as_deref(), self.timeout).await {
            Ok(online) => Some(online),
            Err(err) => {
                debug!("status probe of {address} failed: {err}");
                None
            }
        }
    }
}

/// Runs one full status exchange, bounded by `timeout` end to end. SRV
/// resolution, when a resolver is given, counts against the same budget.
pub async fn query_player_count(
    address: &ServerAddress,
    srv: Option<&dyn SrvResolver>,
    timeout: Duration,
) -> Result<u32, ProbeError> {
    tokio::time::timeout(timeout, status_exchange(address, srv))
        .await
        .map_err(|_| ProbeError::Timeout)?
}

async fn status_exchange(
    address: &ServerAddress,
    srv: Option<&dyn SrvResolver>,
) -> Result<u32, ProbeError> {
    let endpoint = resolve_endpoint(address, srv).await;
    if endpoint != *address {
        debug!("{address} resolved through SRV to {endpoint}");
    }
    let mut stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
    stream.set_nodelay(true)?;

    let mut request = Vec::with_capacity(64);
    write_frame(&mut request, &handshake_body(address)?);
    write_frame(&mut request, &status_request_body());
    stream.write_all(&request).await?;

    let body = read_frame(&mut stream).await?;
    let json = decode_status_response(&body)?;
    parse_player_count(&json)
}

fn handshake_body(address: &ServerAddress) -> Result<Vec<u8>, ProbeError> {
    let mut body = Vec::with_capacity(address.host.len() + 16);
    encode_varint(&mut body, HANDSHAKE_PACKET_ID);
    encode_varint(&mut body, PROTOCOL_VERSION);
    encode_string(&mut body, &address.host)?;
    body.extend_from_slice(&address.port.to_be_bytes());
    encode_varint(&mut body, NEXT_STATE_STATUS);
    Ok(body)
}

fn status_request_body() -> Vec<u8> {
    let mut body = Vec::with_capacity(1);
    encode_varint(&mut body, STATUS_PACKET_ID);
    body
}

fn write_frame(out: &mut Vec<u8>, body: &[u8]) {
    // Bodies are built locally and bounded by MAX_HOST_LEN.
    encode_varint(out, body.len() as i32);
    out.extend_from_slice(body);
}

fn encode_string(out: &mut Vec<u8>, value: &str) -> Result<(), ProbeError> {
    if value.len() > MAX_HOST_LEN {
        return Err(ProbeError::Protocol(format!(
            "host name is {} bytes, limit is {MAX_HOST_LEN}",
            value.len()
        )));
    }
    encode_varint(out, value.len() as i32);
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

pub fn encode_varint(out: &mut Vec<u8>, value: i32) {
    let mut value = value as u32;
    loop {
        if value & !0x7F == 0 {
            out.push(value as u8);
            return;
        }
        out.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
}

/// Decodes a VarInt from the front of `buf`, advancing it past the value.
pub fn decode_varint(buf: &mut &[u8]) -> Result<i32, ProbeError> {
    let mut value: u32 = 0;
    for position in 0..MAX_VARINT_LEN {
        let (&byte, rest) = buf
            .split_first()
            .ok_or_else(|| ProbeError::Protocol("truncated VarInt".to_owned()))?;
        *buf = rest;
        value |= u32::from(byte & 0x7F) << (7 * position);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(ProbeError::Protocol("VarInt longer than 5 bytes".to_owned()))
}

async fn read_varint<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i32, ProbeError> {
    let mut value: u32 = 0;
    for position in 0..MAX_VARINT_LEN {
        let byte = reader.read_u8().await?;
        value |= u32::from(byte & 0x7F) << (7 * position);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(ProbeError::Protocol("VarInt longer than 5 bytes".to_owned()))
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProbeError> {
    let len = read_varint(reader).await?;
    let len = usize::try_from(len)
        .ok()
        .filter(|len| (1..=MAX_PACKET_LEN).contains(len))
        .ok_or_else(|| ProbeError::Protocol(format!("invalid packet length {len}")))?;

    let mut body = vec![0; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

fn decode_status_response(mut body: &[u8]) -> Result<String, ProbeError> {
    let packet_id = decode_varint(&mut body)?;
    if packet_id != STATUS_PACKET_ID {
        return Err(ProbeError::Protocol(format!(
            "expected status response, got packet {packet_id:#04x}"
        )));
    }

    let len = decode_varint(&mut body)?;
    let len = usize::try_from(len)
        .map_err(|_| ProbeError::Protocol(format!("negative string length {len}")))?;
    let json = body
        .get(..len)
        .ok_or_else(|| ProbeError::Protocol("truncated status payload".to_owned()))?;

    String::from_utf8(json.to_vec())
        .map_err(|_| ProbeError::Protocol("status payload is not UTF-8".to_owned()))
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    players: Option<StatusPlayers>,
}

#[derive(Debug, Deserialize)]
struct StatusPlayers {
    online: Option<i64>,
}

pub fn parse_player_count(json: &str) -> Result<u32, ProbeError> {
    let status: StatusPayload = serde_json::from_str(json)?;
    let online = status
        .players
        .and_then(|players| players.online)
        .ok_or(ProbeError::MissingPlayerCount)?;
    u32::try_from(online).map_err(|_| ProbeError::MissingPlayerCount)
}
