//! TLS record framing (RFC 8446 §5.1, RFC 5246 §6.2).
//!
//! The engine never decrypts records itself; it only needs to know where
//! record boundaries fall in the inbound buffer so the library is never
//! handed half a record.

/// TLS record content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
    Heartbeat = 24,
}

impl ContentType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            20 => Some(Self::ChangeCipherSpec),
            21 => Some(Self::Alert),
            22 => Some(Self::Handshake),
            23 => Some(Self::ApplicationData),
            24 => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

/// TLS record header (5 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub legacy_version: u16,
    pub length: u16,
}

impl RecordHeader {
    /// Header plus payload.
    pub fn record_len(&self) -> usize {
        RECORD_HEADER_LEN + self.length as usize
    }
}

/// TLS record header size.
pub const RECORD_HEADER_LEN: usize = 5;

/// Largest payload a TLS 1.2 ciphertext record may carry (2^14 + 2048).
pub const MAX_CIPHERTEXT_LEN: usize = 16384 + 2048;

/// Decode a record header from the first 5 bytes of `data`.
///
/// Returns `None` if `data` is shorter than a header or the header is not
/// a plausible TLS record (unknown content type, non-3.x version, oversized
/// length).
pub fn decode_record_header(data: &[u8]) -> Option<RecordHeader> {
    if data.len() < RECORD_HEADER_LEN {
        return None;
    }
    let content_type = ContentType::from_byte(data[0])?;
    let legacy_version = ((data[1] as u16) << 8) | (data[2] as u16);
    let length = ((data[3] as u16) << 8) | (data[4] as u16);
    if data[1] != 0x03 || length as usize > MAX_CIPHERTEXT_LEN {
        return None;
    }
    Some(RecordHeader {
        content_type,
        legacy_version,
        length,
    })
}

/// Length of the longest prefix of `data` made only of complete records.
///
/// If a header in `data` is malformed, the whole of `data` is returned:
/// there is no boundary to wait for, and the library must see the bytes to
/// reject them.
pub fn complete_prefix_len(data: &[u8]) -> usize {
    let mut off = 0;
    while data.len() - off >= RECORD_HEADER_LEN {
        let Some(hdr) = decode_record_header(&data[off..]) else {
            return data.len();
        };
        let total = hdr.record_len();
        if data.len() - off < total {
            break;
        }
        off += total;
    }
    off
}
