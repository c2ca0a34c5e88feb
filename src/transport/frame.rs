//! RFC 6455 WebSocket frame codec.
//!
//! Handshake accept value and the on-the-wire frame format are implemented
//! from scratch rather than delegated to a tungstenite-style crate, matching
//! the bespoke parser this system was distilled from.

use base64::Engine;
use bytes::{Bytes, BytesMut};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt};

const ACCEPT_MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes `Sec-WebSocket-Accept` from a client's `Sec-WebSocket-Key`.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(ACCEPT_MAGIC.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    fn from_raw(raw: u8) -> Option<OpCode> {
        match raw {
            0x0 => Some(OpCode::Continuation),
            0x1 => Some(OpCode::Text),
            0x2 => Some(OpCode::Binary),
            0x8 => Some(OpCode::Close),
            0x9 => Some(OpCode::Ping),
            0xA => Some(OpCode::Pong),
            _ => None,
        }
    }

    pub(crate) fn as_raw(self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: OpCode,
    pub payload: Bytes,
}

/// Frame-protocol violations are always fatal to the connection; the caller
/// closes the transport silently rather than surfacing these further.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("reserved bits set in frame header")]
    ReservedBitsSet,
    #[error("unknown or disallowed opcode {0}")]
    UnknownOpcode(u8),
    #[error("control frame payload exceeds 125 bytes")]
    ControlFrameTooLarge,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reads one frame from `stream`. Returns `Ok(None)` on a clean EOF before
/// any header byte is read (the normal "peer went away" case).
pub async fn read_frame<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Option<Frame>, FrameError> {
    let mut header = [0u8; 2];
    match read_exact_or_eof(stream, &mut header).await? {
        false => return Ok(None),
        true => {}
    }

    let fin = header[0] & 0x80 != 0;
    let rsv = header[0] & 0x70;
    if rsv != 0 {
        return Err(FrameError::ReservedBitsSet);
    }
    let opcode = OpCode::from_raw(header[0] & 0x0F).ok_or(FrameError::UnknownOpcode(header[0] & 0x0F))?;

    let masked = header[1] & 0x80 != 0;
    let mut len = (header[1] & 0x7F) as u64;
    if len == 126 {
        let mut ext = [0u8; 2];
        stream.read_exact(&mut ext).await?;
        len = u16::from_be_bytes(ext) as u64;
    } else if len == 127 {
        let mut ext = [0u8; 8];
        stream.read_exact(&mut ext).await?;
        len = u64::from_be_bytes(ext);
    }

    if opcode.is_control() && len > 125 {
        return Err(FrameError::ControlFrameTooLarge);
    }

    let mask = if masked {
        let mut mask = [0u8; 4];
        stream.read_exact(&mut mask).await?;
        Some(mask)
    } else {
        None
    };

    let mut payload = BytesMut::zeroed(len as usize);
    stream.read_exact(&mut payload).await?;
    if let Some(mask) = mask {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask[i % 4];
        }
    }

    Ok(Some(Frame {
        fin,
        opcode,
        payload: payload.freeze(),
    }))
}

/// Reads exactly `buf.len()` bytes, but tolerates a zero-byte read at the
/// very first byte as a clean end-of-stream rather than an error.
async fn read_exact_or_eof<R: AsyncRead + Unpin>(stream: &mut R, buf: &mut [u8]) -> Result<bool, std::io::Error> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        }
        filled += n;
    }
    Ok(true)
}

/// Encodes a single unfragmented, unmasked server-to-client frame with the
/// shortest length encoding that fits the payload.
pub fn encode_frame(opcode: OpCode, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 10);
    out.push(0x80 | opcode.as_raw());
    let len = payload.len();
    if len < 126 {
        out.push(len as u8);
    } else if len <= u16::MAX as usize {
        out.push(126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_rfc6455_example() {
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[tokio::test]
    async fn round_trips_small_unmasked_payload() {
        let encoded = encode_frame(OpCode::Text, b"hi");
        let mut cursor = std::io::Cursor::new(encoded);
        let frame = read_frame(&mut cursor).await.unwrap().unwrap();
        assert!(frame.fin);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(&frame.payload[..], b"hi");
    }

    #[tokio::test]
    async fn decodes_masked_client_frame() {
        let payload = b"hello world";
        let mask = [0x11, 0x22, 0x33, 0x44];
        let mut raw = vec![0x81, 0x80 | payload.len() as u8];
        raw.extend_from_slice(&mask);
        raw.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
        let mut cursor = std::io::Cursor::new(raw);
        let frame = read_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!(&frame.payload[..], payload);
    }

    #[tokio::test]
    async fn rejects_reserved_bits() {
        let raw = vec![0x81 | 0x40, 0x00];
        let mut cursor = std::io::Cursor::new(raw);
        assert!(matches!(read_frame(&mut cursor).await, Err(FrameError::ReservedBitsSet)));
    }

    #[tokio::test]
    async fn clean_eof_before_header_returns_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        assert!(read_frame(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn long_payload_uses_16_bit_length() {
        let payload = vec![0x42u8; 300];
        let encoded = encode_frame(OpCode::Binary, &payload);
        assert_eq!(encoded[1], 126);
        let mut cursor = std::io::Cursor::new(encoded);
        let frame = read_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!(frame.payload.len(), 300);
    }
}
