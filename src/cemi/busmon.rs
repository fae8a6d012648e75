//! Busmonitor indications and connection-oriented `T_Data` frames.

use crate::cemi::constants::{L_BUSMON_IND, T_DATA_CONNECTED_IND, T_DATA_CONNECTED_REQ};
use crate::error::{KnxError, Result};

/// A busmonitor indication: raw medium bytes with a 16-bit (optionally
/// 32-bit extended) timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Busmonitor {
    pub timestamp: u32,
    pub extended_timestamp: bool,
    pub status: u8,
    pub raw_frame: Vec<u8>,
}

impl Busmonitor {
    pub fn new(timestamp: u32, extended_timestamp: bool, status: u8, raw_frame: Vec<u8>) -> Self {
        Busmonitor {
            timestamp,
            extended_timestamp,
            status,
            raw_frame,
        }
    }

    pub fn message_code(&self) -> u8 {
        L_BUSMON_IND
    }

    /// Additional-info type used to carry the 4-byte extended timestamp
    /// (mirrors `AdditionalInfoType::ExtendedRelativeTimestamp`).
    const EXT_TIMESTAMP_INFO_TYPE: u8 = 0x06;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.message_code()];
        if self.extended_timestamp {
            out.push(6); // 1 type + 1 length + 4 data bytes
            out.push(Self::EXT_TIMESTAMP_INFO_TYPE);
            out.push(4);
            out.extend_from_slice(&self.timestamp.to_be_bytes());
        } else {
            out.push(0);
        }
        out.push(self.status);
        if !self.extended_timestamp {
            out.extend_from_slice(&(self.timestamp as u16).to_be_bytes());
        }
        out.extend_from_slice(&self.raw_frame);
        out
    }

    pub fn struct_length(&self) -> usize {
        self.to_bytes().len()
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 || bytes[0] != L_BUSMON_IND {
            return Err(KnxError::format("not a busmonitor indication"));
        }
        let info_len = bytes[1] as usize;
        if bytes.len() < 2 + info_len {
            return Err(KnxError::format("busmonitor frame truncated before additional info"));
        }
        let extended_timestamp = info_len >= 6;
        let timestamp_from_info = if extended_timestamp {
            let entry = &bytes[2..2 + info_len];
            if entry[0] != Self::EXT_TIMESTAMP_INFO_TYPE || entry[1] != 4 {
                return Err(KnxError::format("unexpected extended-timestamp additional-info entry"));
            }
            Some(u32::from_be_bytes([entry[2], entry[3], entry[4], entry[5]]))
        } else {
            None
        };
        let mut pos = 2 + info_len;
        if bytes.len() < pos + 1 {
            return Err(KnxError::format("busmonitor frame truncated before status"));
        }
        let status = bytes[pos];
        pos += 1;
        let timestamp = if extended_timestamp {
            timestamp_from_info.unwrap_or(0)
        } else {
            if bytes.len() < pos + 2 {
                return Err(KnxError::format("busmonitor frame truncated before timestamp"));
            }
            let t = u16::from_be_bytes([bytes[pos], bytes[pos + 1]]) as u32;
            pos += 2;
            t
        };
        let raw_frame = bytes[pos..].to_vec();
        Ok(Busmonitor {
            timestamp,
            extended_timestamp,
            status,
            raw_frame,
        })
    }
}

/// A connection-oriented transport-layer frame (`T_Data_Connected`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TData {
    pub indication: bool,
    pub tpdu: Vec<u8>,
}

impl TData {
    pub fn message_code(&self) -> u8 {
        if self.indication {
            T_DATA_CONNECTED_IND
        } else {
            T_DATA_CONNECTED_REQ
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.message_code(), 0x00];
        out.extend_from_slice(&self.tpdu);
        out
    }

    pub fn struct_length(&self) -> usize {
        self.to_bytes().len()
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(KnxError::format("T_Data frame shorter than 2 bytes"));
        }
        let indication = match bytes[0] {
            T_DATA_CONNECTED_REQ => false,
            T_DATA_CONNECTED_IND => true,
            other => return Err(KnxError::format(format!("unknown T_Data code 0x{other:02X}"))),
        };
        Ok(TData {
            indication,
            tpdu: bytes[2..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busmonitor_roundtrip_standard_timestamp() {
        let f = Busmonitor::new(0x1234, false, 0x00, vec![0x29, 0x00, 0xBC, 0xE0]);
        let bytes = f.to_bytes();
        let parsed = Busmonitor::parse(&bytes).unwrap();
        assert_eq!(f, parsed);
    }

    #[test]
    fn t_data_roundtrip() {
        let f = TData {
            indication: true,
            tpdu: vec![0x00, 0x80],
        };
        let bytes = f.to_bytes();
        assert_eq!(TData::parse(&bytes).unwrap(), f);
    }
}
