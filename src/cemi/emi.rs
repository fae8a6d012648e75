//! EMI1/EMI2 ⇄ cEMI `L_Data` translation for BCU-class devices.
//!
//! EMI frames are 7 bytes of header plus TPDU, standard-length only
//! (`tpdu.len() <= 16`); there is no additional-info block and no
//! separate extended-frame layout. Hop count is not carried on the wire
//! by real BCU firmware — it is always 6 — so the translation fixes it
//! at 6 in both directions.

use crate::address::{Address, IndividualAddress, Priority};
use crate::cemi::constants::*;
use crate::cemi::ldata::LData;
use crate::config::CemiConfig;
use crate::error::{KnxError, Result};

const EMI_HOP_COUNT: u8 = 6;

/// Translate a standard cEMI `L_Data` frame to its 7-byte-header EMI1/2
/// wire form.
pub fn to_emi(frame: &LData, config: CemiConfig) -> Result<Vec<u8>> {
    if frame.tpdu.len() > LData::MAX_TPDU_LEN {
        return Err(KnxError::illegal_argument(
            "EMI frames only carry standard-length tpdus (<=16 bytes)",
        ));
    }
    let msg_code = match frame.msg_code {
        crate::cemi::constants::LDataMessageCode::Ind => EmiMessageCode::LDataInd as u8,
        crate::cemi::constants::LDataMessageCode::Con => EmiMessageCode::LDataCon as u8,
        crate::cemi::constants::LDataMessageCode::Req => EmiMessageCode::LDataReqBroadcast as u8,
    };
    let mut ctrl = frame.ctrl1;
    if config.set_reserved_emi_ctrl_bits {
        ctrl |= 0xB0;
    }
    let mut out = vec![msg_code, ctrl];
    out.extend_from_slice(&frame.source.raw().to_be_bytes());
    out.extend_from_slice(&frame.dest_raw.to_be_bytes());
    out.push((frame.tpdu.len() - 1) as u8);
    out.extend_from_slice(&frame.tpdu);
    Ok(out)
}

/// Translate an EMI1/2 frame back to a standard cEMI `L_Data` value,
/// preserving source, destination, TPDU, priority, hop count (fixed at
/// 6), and the system-broadcast flag.
pub fn from_emi(bytes: &[u8]) -> Result<LData> {
    if bytes.len() < 7 {
        return Err(KnxError::format("EMI frame shorter than 7 bytes"));
    }
    let emi_code = EmiMessageCode::from_byte(bytes[0])
        .ok_or_else(|| KnxError::format(format!("unknown EMI message code 0x{:02X}", bytes[0])))?;
    let msg_code = emi_code.to_cemi();
    let mut ctrl1 = bytes[1] & !0xB0; // clear reserved-bit workaround on decode
    if matches!(
        emi_code,
        EmiMessageCode::LDataReqBroadcast | EmiMessageCode::LDataConBroadcast | EmiMessageCode::LDataIndBroadcast
    ) {
        ctrl1 &= !CTRL1_BROADCAST; // domain-broadcast flag cleared for system broadcast
    }
    ctrl1 |= CTRL1_STANDARD_FRAME;
    let source = IndividualAddress::new(u16::from_be_bytes([bytes[2], bytes[3]]));
    let dest_raw = u16::from_be_bytes([bytes[4], bytes[5]]);
    let npdu_len = bytes[6] as usize;
    let tpdu_len = npdu_len + 1;
    if bytes.len() != 7 + tpdu_len {
        return Err(KnxError::format("EMI frame length does not match tpdu length"));
    }
    if tpdu_len > LData::MAX_TPDU_LEN {
        return Err(KnxError::format("EMI tpdu exceeds standard length"));
    }
    let tpdu = bytes[7..].to_vec();
    // EMI carries no explicit group/individual discriminator bit distinct
    // from cEMI's ctrl2; BCU group-oriented services always target group
    // addresses, so EMI destinations decode as group addresses.
    let ctrl2 = CTRL2_GROUP_ADDRESS | (EMI_HOP_COUNT << CTRL2_HOP_COUNT_SHIFT);
    let priority = Priority::from_bits(ctrl1 >> CTRL1_PRIORITY_SHIFT);
    LData::new(msg_code, source, Address::Group(dest_raw.into()), priority, EMI_HOP_COUNT, tpdu)
        .map(|mut f| {
            f.ctrl1 = ctrl1;
            f.ctrl2 = ctrl2;
            f
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::GroupAddress;
    use crate::cemi::constants::LDataMessageCode;

    #[test]
    fn emi_roundtrip_preserves_core_fields() {
        let frame = LData::new(
            LDataMessageCode::Ind,
            IndividualAddress::from_levels(1, 1, 1).unwrap(),
            Address::Group(GroupAddress::from_levels3(1, 1, 1).unwrap()),
            Priority::Low,
            EMI_HOP_COUNT,
            vec![0x00, 0x81],
        )
        .unwrap();
        let emi = to_emi(&frame, CemiConfig::default()).unwrap();
        assert_eq!(emi.len(), 9);
        let back = from_emi(&emi).unwrap();
        assert_eq!(back.source, frame.source);
        assert_eq!(back.destination(), frame.destination());
        assert_eq!(back.tpdu, frame.tpdu);
        assert_eq!(back.priority(), frame.priority());
        assert_eq!(back.hop_count(), frame.hop_count());
    }

    #[test]
    fn reserved_ctrl_bits_workaround_forces_bits_set() {
        let frame = LData::new(
            LDataMessageCode::Req,
            IndividualAddress::new(1),
            Address::Group(GroupAddress::new(1)),
            Priority::Low,
            EMI_HOP_COUNT,
            vec![0x00],
        )
        .unwrap();
        let cfg = CemiConfig { set_reserved_emi_ctrl_bits: true };
        let emi = to_emi(&frame, cfg).unwrap();
        assert_eq!(emi[1] & 0xB0, 0xB0);
    }

    #[test]
    fn oversized_tpdu_is_rejected() {
        let frame = LData {
            msg_code: LDataMessageCode::Req,
            additional_info: Vec::new(),
            ctrl1: CTRL1_STANDARD_FRAME,
            ctrl2: 0,
            source: IndividualAddress::new(0),
            dest_raw: 0,
            tpdu: vec![0u8; 17],
        };
        assert!(to_emi(&frame, CemiConfig::default()).is_err());
    }
}
