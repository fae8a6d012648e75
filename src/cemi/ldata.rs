//! Standard and extended `L_Data` frames.
//!
//! Both share the same wire layout (additional-info block, two control
//! bytes, source, destination, NPDU length, TPDU); they differ in
//! mutability and in the maximum TPDU length. `ctrl1` bit 7 selects which
//! one a given buffer decodes to.

use crate::address::{Address, GroupAddress, IndividualAddress, Priority};
use crate::cemi::additional_info::{self, AdditionalInfo};
use crate::cemi::constants::*;
use crate::error::{KnxError, Result};
use std::sync::Mutex;

/// An immutable standard `L_Data` frame (`ctrl1` bit 7 set). TPDU is at
/// most 16 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LData {
    pub msg_code: LDataMessageCode,
    pub additional_info: Vec<AdditionalInfo>,
    pub ctrl1: u8,
    pub ctrl2: u8,
    pub source: IndividualAddress,
    pub dest_raw: u16,
    pub tpdu: Vec<u8>,
}

impl LData {
    pub const MAX_TPDU_LEN: usize = 16;

    pub fn new(
        msg_code: LDataMessageCode,
        source: IndividualAddress,
        dest: Address,
        priority: Priority,
        hop_count: u8,
        tpdu: Vec<u8>,
    ) -> Result<Self> {
        if tpdu.is_empty() || tpdu.len() > Self::MAX_TPDU_LEN {
            return Err(KnxError::illegal_argument(format!(
                "standard L_Data tpdu length {} out of range [1..{}]",
                tpdu.len(),
                Self::MAX_TPDU_LEN
            )));
        }
        if hop_count > 7 {
            return Err(KnxError::illegal_argument("hop count out of range [0..7]"));
        }
        let ctrl1 = CTRL1_STANDARD_FRAME
            | CTRL1_DO_NOT_REPEAT
            | CTRL1_BROADCAST
            | (priority.bits() << CTRL1_PRIORITY_SHIFT);
        let ctrl2 = ((hop_count << CTRL2_HOP_COUNT_SHIFT) & CTRL2_HOP_COUNT_MASK)
            | if dest.is_group() { CTRL2_GROUP_ADDRESS } else { 0 };
        Ok(LData {
            msg_code,
            additional_info: Vec::new(),
            ctrl1,
            ctrl2,
            source,
            dest_raw: dest.raw(),
            tpdu,
        })
    }

    pub fn destination(&self) -> Address {
        decode_destination(self.ctrl2, self.dest_raw)
    }

    pub fn priority(&self) -> Priority {
        Priority::from_bits(self.ctrl1 >> CTRL1_PRIORITY_SHIFT)
    }

    pub fn hop_count(&self) -> u8 {
        (self.ctrl2 & CTRL2_HOP_COUNT_MASK) >> CTRL2_HOP_COUNT_SHIFT
    }

    pub fn is_repeated(&self) -> bool {
        self.ctrl1 & CTRL1_DO_NOT_REPEAT == 0
    }

    /// `.con` positive/negative confirmation flag (bit 0 of `ctrl1`).
    pub fn is_positive_confirmation(&self) -> bool {
        self.ctrl1 & CTRL1_CONFIRM_ERROR == 0
    }

    pub fn message_code(&self) -> u8 {
        self.msg_code as u8
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.message_code()];
        let info_len = additional_info::total_len(&self.additional_info).unwrap_or(0);
        out.push(info_len);
        additional_info::encode_sorted(&self.additional_info, &mut out);
        out.push(self.ctrl1);
        out.push(self.ctrl2);
        out.extend_from_slice(&self.source.raw().to_be_bytes());
        out.extend_from_slice(&self.dest_raw.to_be_bytes());
        out.push((self.tpdu.len() - 1) as u8);
        out.extend_from_slice(&self.tpdu);
        out
    }

    pub fn struct_length(&self) -> usize {
        self.to_bytes().len()
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (msg_code, additional_info, ctrl1, ctrl2, source, dest_raw, tpdu) =
            parse_common(bytes)?;
        if ctrl1 & CTRL1_STANDARD_FRAME == 0 {
            return Err(KnxError::format(
                "ctrl1 selects extended L_Data, not standard",
            ));
        }
        if tpdu.len() > Self::MAX_TPDU_LEN {
            return Err(KnxError::format(
                "standard L_Data tpdu exceeds 16 bytes; frame must be extended",
            ));
        }
        if matches!(msg_code, LDataMessageCode::Ind | LDataMessageCode::Req)
            && ctrl1 & CTRL1_VALID_MASK != CTRL1_VALID_VALUE
        {
            return Err(KnxError::format("invalid ctrl1 for TP1/PL110 L_Data"));
        }
        Ok(LData {
            msg_code,
            additional_info,
            ctrl1,
            ctrl2,
            source,
            dest_raw,
            tpdu,
        })
    }
}

/// A mutable extended `L_Data` frame (`ctrl1` bit 7 clear). TPDU up to
/// 255 bytes (256 and above are rejected). The additional-info list and
/// control fields are guarded by the frame's own lock so callers can
/// stamp additional info without rebuilding the frame.
#[derive(Debug)]
pub struct LDataExtended {
    pub msg_code: LDataMessageCode,
    pub source: IndividualAddress,
    pub dest_raw: u16,
    pub tpdu: Vec<u8>,
    mutable: Mutex<ExtMutable>,
}

#[derive(Debug, Clone)]
struct ExtMutable {
    additional_info: Vec<AdditionalInfo>,
    ctrl1: u8,
    ctrl2: u8,
}

// `Mutex` has no `PartialEq`, so this is written by hand against the
// locked snapshot rather than derived.
impl PartialEq for LDataExtended {
    fn eq(&self, other: &Self) -> bool {
        self.msg_code == other.msg_code
            && self.source == other.source
            && self.dest_raw == other.dest_raw
            && self.tpdu == other.tpdu
            && self.ctrl1() == other.ctrl1()
            && self.ctrl2() == other.ctrl2()
            && self.additional_info() == other.additional_info()
    }
}

impl Eq for LDataExtended {}

impl LDataExtended {
    /// 255 TPDU bytes would encode npdu_len as 254, which `parse_common`
    /// rejects as the reserved escape code, so the real ceiling is 254.
    pub const MAX_TPDU_LEN: usize = 254;

    pub fn new(
        msg_code: LDataMessageCode,
        source: IndividualAddress,
        dest: Address,
        priority: Priority,
        hop_count: u8,
        tpdu: Vec<u8>,
    ) -> Result<Self> {
        if tpdu.is_empty() || tpdu.len() > Self::MAX_TPDU_LEN {
            return Err(KnxError::illegal_argument(format!(
                "extended L_Data tpdu length {} out of range [1..{}]",
                tpdu.len(),
                Self::MAX_TPDU_LEN
            )));
        }
        if hop_count > 7 {
            return Err(KnxError::illegal_argument("hop count out of range [0..7]"));
        }
        let ctrl1 = CTRL1_DO_NOT_REPEAT | CTRL1_BROADCAST | (priority.bits() << CTRL1_PRIORITY_SHIFT);
        let ctrl2 = ((hop_count << CTRL2_HOP_COUNT_SHIFT) & CTRL2_HOP_COUNT_MASK)
            | if dest.is_group() { CTRL2_GROUP_ADDRESS } else { 0 };
        Ok(LDataExtended {
            msg_code,
            source,
            dest_raw: dest.raw(),
            tpdu,
            mutable: Mutex::new(ExtMutable {
                additional_info: Vec::new(),
                ctrl1,
                ctrl2,
            }),
        })
    }

    pub fn add_additional_info(&self, info: AdditionalInfo) {
        self.mutable.lock().unwrap().additional_info.push(info);
    }

    pub fn additional_info(&self) -> Vec<AdditionalInfo> {
        self.mutable.lock().unwrap().additional_info.clone()
    }

    pub fn ctrl1(&self) -> u8 {
        self.mutable.lock().unwrap().ctrl1
    }

    pub fn ctrl2(&self) -> u8 {
        self.mutable.lock().unwrap().ctrl2
    }

    pub fn set_hop_count(&self, hop_count: u8) -> Result<()> {
        if hop_count > 7 {
            return Err(KnxError::illegal_argument("hop count out of range [0..7]"));
        }
        let mut m = self.mutable.lock().unwrap();
        m.ctrl2 = (m.ctrl2 & !CTRL2_HOP_COUNT_MASK) | ((hop_count << CTRL2_HOP_COUNT_SHIFT) & CTRL2_HOP_COUNT_MASK);
        Ok(())
    }

    pub fn destination(&self) -> Address {
        decode_destination(self.ctrl2(), self.dest_raw)
    }

    pub fn priority(&self) -> Priority {
        Priority::from_bits(self.ctrl1() >> CTRL1_PRIORITY_SHIFT)
    }

    pub fn hop_count(&self) -> u8 {
        (self.ctrl2() & CTRL2_HOP_COUNT_MASK) >> CTRL2_HOP_COUNT_SHIFT
    }

    pub fn is_lte_hee(&self) -> bool {
        self.ctrl2() & CTRL2_LTE_HEE_MASK == CTRL2_LTE_HEE_VALUE
    }

    pub fn is_positive_confirmation(&self) -> bool {
        self.ctrl1() & CTRL1_CONFIRM_ERROR == 0
    }

    pub fn message_code(&self) -> u8 {
        self.msg_code as u8
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let m = self.mutable.lock().unwrap();
        let mut out = vec![self.message_code()];
        let info_len = additional_info::total_len(&m.additional_info).unwrap_or(0);
        out.push(info_len);
        additional_info::encode_sorted(&m.additional_info, &mut out);
        out.push(m.ctrl1);
        out.push(m.ctrl2);
        out.extend_from_slice(&self.source.raw().to_be_bytes());
        out.extend_from_slice(&self.dest_raw.to_be_bytes());
        out.push((self.tpdu.len() - 1) as u8);
        out.extend_from_slice(&self.tpdu);
        out
    }

    pub fn struct_length(&self) -> usize {
        self.to_bytes().len()
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (msg_code, additional_info, ctrl1, ctrl2, source, dest_raw, tpdu) =
            parse_common(bytes)?;
        if ctrl1 & CTRL1_STANDARD_FRAME != 0 {
            return Err(KnxError::format(
                "ctrl1 selects standard L_Data, not extended",
            ));
        }
        Ok(LDataExtended {
            msg_code,
            source,
            dest_raw,
            tpdu,
            mutable: Mutex::new(ExtMutable {
                additional_info,
                ctrl1,
                ctrl2,
            }),
        })
    }
}

impl Clone for LDataExtended {
    fn clone(&self) -> Self {
        let m = self.mutable.lock().unwrap().clone();
        LDataExtended {
            msg_code: self.msg_code,
            source: self.source,
            dest_raw: self.dest_raw,
            tpdu: self.tpdu.clone(),
            mutable: Mutex::new(m),
        }
    }
}

fn decode_destination(ctrl2: u8, raw: u16) -> Address {
    if ctrl2 & CTRL2_GROUP_ADDRESS != 0 {
        Address::Group(GroupAddress::new(raw))
    } else {
        Address::Individual(IndividualAddress::new(raw))
    }
}

#[allow(clippy::type_complexity)]
fn parse_common(
    bytes: &[u8],
) -> Result<(
    LDataMessageCode,
    Vec<AdditionalInfo>,
    u8,
    u8,
    IndividualAddress,
    u16,
    Vec<u8>,
)> {
    if bytes.len() < 2 {
        return Err(KnxError::format("L_Data frame shorter than 2 bytes"));
    }
    let msg_code = LDataMessageCode::from_byte(bytes[0])
        .ok_or_else(|| KnxError::format(format!("unknown L_Data message code 0x{:02X}", bytes[0])))?;
    let info_len = bytes[1] as usize;
    let info_start = 2;
    if bytes.len() < info_start + info_len {
        return Err(KnxError::format("truncated additional-info block"));
    }
    let additional_info = additional_info::decode(&bytes[info_start..], info_len as u8)?;
    let rest = &bytes[info_start + info_len..];
    if rest.len() < 7 {
        return Err(KnxError::format("L_Data frame truncated before fixed fields"));
    }
    let ctrl1 = rest[0];
    let ctrl2 = rest[1];
    let source = IndividualAddress::new(u16::from_be_bytes([rest[2], rest[3]]));
    let dest_raw = u16::from_be_bytes([rest[4], rest[5]]);
    let npdu_len = rest[6] as usize;
    if npdu_len == 254 {
        return Err(KnxError::format("tpdu length 255 is a reserved escape code"));
    }
    let tpdu_len = npdu_len + 1;
    let tpdu_start = info_start + info_len + 7;
    if bytes.len() != tpdu_start + tpdu_len {
        return Err(KnxError::format("L_Data tpdu length does not match frame length"));
    }
    let tpdu = bytes[tpdu_start..].to_vec();
    Ok((msg_code, additional_info, ctrl1, ctrl2, source, dest_raw, tpdu))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_ind_parse_scenario() {
        // 29 00 BC E0 11 01 09 01 01 00 81
        let bytes = [0x29u8, 0x00, 0xBC, 0xE0, 0x11, 0x01, 0x09, 0x01, 0x01, 0x00, 0x81];
        let f = LData::parse(&bytes).unwrap();
        assert_eq!(f.msg_code, LDataMessageCode::Ind);
        assert_eq!(f.source, IndividualAddress::from_levels(1, 1, 1).unwrap());
        assert_eq!(f.destination(), Address::Group(GroupAddress::from_levels3(1, 1, 1).unwrap()));
        assert_eq!(f.priority(), Priority::Low);
        assert_eq!(f.hop_count(), 6);
        assert_eq!(f.tpdu, vec![0x00, 0x81]);
    }

    #[test]
    fn standard_roundtrip() {
        let f = LData::new(
            LDataMessageCode::Ind,
            IndividualAddress::from_levels(1, 1, 1).unwrap(),
            Address::Group(GroupAddress::from_levels3(1, 1, 1).unwrap()),
            Priority::Low,
            6,
            vec![0x00, 0x81],
        )
        .unwrap();
        let bytes = f.to_bytes();
        let parsed = LData::parse(&bytes).unwrap();
        assert_eq!(f, parsed);
    }

    #[test]
    fn extended_roundtrip_with_additional_info() {
        let f = LDataExtended::new(
            LDataMessageCode::Ind,
            IndividualAddress::from_levels(2, 0, 1).unwrap(),
            Address::Group(GroupAddress::from_levels3(1, 2, 3).unwrap()),
            Priority::Normal,
            6,
            vec![0u8; 17],
        )
        .unwrap();
        f.add_additional_info(AdditionalInfo::new(2, vec![0x11, 0x22, 0x33]).unwrap());

        let bytes = f.to_bytes();
        assert_eq!(bytes[1], 5); // total additional-info length
        assert_eq!(&bytes[2..4], &[2, 3]); // sorted single entry, type 2, len 3

        let parsed = LDataExtended::parse(&bytes).unwrap();
        assert_eq!(parsed.source, f.source);
        assert_eq!(parsed.destination(), f.destination());
        assert_eq!(parsed.tpdu, f.tpdu);
        assert_eq!(parsed.additional_info(), f.additional_info());
    }

    #[test]
    fn extended_rejects_tpdu_256() {
        let res = LDataExtended::new(
            LDataMessageCode::Req,
            IndividualAddress::new(1),
            Address::Group(GroupAddress::new(1)),
            Priority::Low,
            6,
            vec![0u8; 256],
        );
        assert!(res.is_err());
    }

    #[test]
    fn standard_requires_extended_when_tpdu_over_16() {
        let f = LDataExtended::new(
            LDataMessageCode::Req,
            IndividualAddress::new(1),
            Address::Group(GroupAddress::new(1)),
            Priority::Low,
            6,
            vec![0u8; 17],
        )
        .unwrap();
        let bytes = f.to_bytes();
        assert!(LData::parse(&bytes).is_err());
    }
}
