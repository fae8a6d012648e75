//! Additional-information entries carried by extended `L_Data` frames.

use crate::error::{KnxError, Result};

/// One `(type, bytes)` pair of the additional-info block. `ty` and the
/// payload length are each a single byte; the payload itself is 0..=255
/// bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionalInfo {
    pub ty: u8,
    pub data: Vec<u8>,
}

impl AdditionalInfo {
    pub fn new(ty: u8, data: Vec<u8>) -> Result<Self> {
        if data.len() > 255 {
            return Err(KnxError::illegal_argument(
                "additional-info payload exceeds 255 bytes",
            ));
        }
        Ok(AdditionalInfo { ty, data })
    }

    /// Encoded size: 1 type byte + 1 length byte + payload.
    fn wire_len(&self) -> usize {
        2 + self.data.len()
    }
}

/// Validate and compute the total additional-info block length (the
/// 1-byte field that precedes the entries on the wire). Entries are
/// sorted ascending by `ty` before being emitted.
pub fn total_len(entries: &[AdditionalInfo]) -> Result<u8> {
    let total: usize = entries.iter().map(AdditionalInfo::wire_len).sum();
    if total > 255 {
        return Err(KnxError::illegal_argument(
            "total additional-info length exceeds 255 bytes",
        ));
    }
    Ok(total as u8)
}

pub fn encode_sorted(entries: &[AdditionalInfo], out: &mut Vec<u8>) {
    let mut sorted: Vec<&AdditionalInfo> = entries.iter().collect();
    sorted.sort_by_key(|e| e.ty);
    for e in sorted {
        out.push(e.ty);
        out.push(e.data.len() as u8);
        out.extend_from_slice(&e.data);
    }
}

/// Parse `total_len` bytes worth of additional-info entries starting at
/// `bytes[0]`.
pub fn decode(bytes: &[u8], total_len: u8) -> Result<Vec<AdditionalInfo>> {
    let total = total_len as usize;
    if bytes.len() < total {
        return Err(KnxError::format(
            "truncated additional-info block",
        ));
    }
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos < total {
        if pos + 2 > total {
            return Err(KnxError::format(
                "additional-info entry header runs past declared length",
            ));
        }
        let ty = bytes[pos];
        let len = bytes[pos + 1] as usize;
        if pos + 2 + len > total {
            return Err(KnxError::format(
                "additional-info entry payload runs past declared length",
            ));
        }
        entries.push(AdditionalInfo {
            ty,
            data: bytes[pos + 2..pos + 2 + len].to_vec(),
        });
        pos += 2 + len;
    }
    Ok(entries)
}
