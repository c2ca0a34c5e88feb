//! Length-prefixed raw wire framing.
//!
//! Only the outbound direction is framed. Inbound data on a raw transport is
//! forwarded as opaque 4 KiB chunks with no length prefix at all, matching
//! the original `rawsocketHttp.py`'s `rawsocket_send`/recv loop (see
//! SPEC_FULL.md §9 open questions) — the asymmetry is intentional, not an
//! oversight.

/// The size each raw read is chunked to.
pub const READ_CHUNK_SIZE: usize = 4096;

/// The exact 4 zero bytes the splicing engine writes to a raw master the
/// instant a client attaches (an empty length-prefixed frame).
pub const CLIENT_ATTACH_SIGNAL: [u8; 4] = [0, 0, 0, 0];

/// Prefixes `payload` with its big-endian u32 length.
pub fn encode_raw(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_encodes_to_client_attach_signal() {
        assert_eq!(encode_raw(&[]), CLIENT_ATTACH_SIGNAL);
    }

    #[test]
    fn prefixes_big_endian_length() {
        let encoded = encode_raw(&[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(encoded, vec![0, 0, 0, 4, 0xDE, 0xAD, 0xBE, 0xEF]);
    }
}
