//! cEMI / EMI frame codec (component B): bit-exact encode/decode of the
//! link-layer and device-management frames that cross every KNX access
//! path.
//!
//! Frames are represented as an explicit tagged sum rather than through
//! inheritance — each variant exposes the same small operation surface
//! (`message_code`, `struct_length`, `to_bytes`, `payload`).

pub mod additional_info;
pub mod busmon;
pub mod constants;
pub mod devmgmt;
pub mod emi;
pub mod ldata;

pub use additional_info::AdditionalInfo;
pub use busmon::{Busmonitor, TData};
pub use constants::{DevMgmtMessageCode, LDataMessageCode};
pub use devmgmt::DeviceManagement;
pub use ldata::{LData, LDataExtended};

use crate::error::{KnxError, Result};

/// The frame variants that traverse the link layer, dispatched by
/// message code.
#[derive(Debug)]
pub enum Frame {
    LData(LData),
    LDataExtended(LDataExtended),
    DeviceManagement(DeviceManagement),
    Busmonitor(Busmonitor),
    TData(TData),
}

impl Frame {
    pub fn message_code(&self) -> u8 {
        match self {
            Frame::LData(f) => f.message_code(),
            Frame::LDataExtended(f) => f.message_code(),
            Frame::DeviceManagement(f) => f.message_code(),
            Frame::Busmonitor(f) => f.message_code(),
            Frame::TData(f) => f.message_code(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Frame::LData(f) => f.to_bytes(),
            Frame::LDataExtended(f) => f.to_bytes(),
            Frame::DeviceManagement(f) => f.to_bytes(),
            Frame::Busmonitor(f) => f.to_bytes(),
            Frame::TData(f) => f.to_bytes(),
        }
    }

    pub fn struct_length(&self) -> usize {
        self.to_bytes().len()
    }

    /// The frame's application-facing payload: TPDU for L-Data / T-Data,
    /// property payload for device management, raw medium bytes for
    /// busmonitor.
    pub fn payload(&self) -> &[u8] {
        match self {
            Frame::LData(f) => &f.tpdu,
            Frame::LDataExtended(f) => &f.tpdu,
            Frame::DeviceManagement(f) => &f.payload,
            Frame::Busmonitor(f) => &f.raw_frame,
            Frame::TData(f) => &f.tpdu,
        }
    }

    /// Dispatch on the first byte (message code) to the appropriate
    /// variant parser.
    ///
    /// For an `L_Data` message code whose frame looks like it could be
    /// either layout (length under 26 bytes, not LTE-HEE), the standard
    /// layout is attempted first; any structural rejection falls back to
    /// the extended layout.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let code = *bytes
            .first()
            .ok_or_else(|| KnxError::format("empty frame"))?;

        if LDataMessageCode::from_byte(code).is_some() {
            let looks_short_non_lte = bytes.len() < 26;
            if looks_short_non_lte {
                if let Ok(f) = LData::parse(bytes) {
                    return Ok(Frame::LData(f));
                }
            }
            return LDataExtended::parse(bytes).map(Frame::LDataExtended);
        }
        if DevMgmtMessageCode::from_byte(code).is_some() {
            return DeviceManagement::parse(bytes).map(Frame::DeviceManagement);
        }
        if code == constants::L_BUSMON_IND {
            return Busmonitor::parse(bytes).map(Frame::Busmonitor);
        }
        if code == constants::T_DATA_CONNECTED_REQ || code == constants::T_DATA_CONNECTED_IND {
            return TData::parse(bytes).map(Frame::TData);
        }
        Err(KnxError::format(format!("unknown cEMI message code 0x{code:02X}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Address, GroupAddress, IndividualAddress, Priority};

    #[test]
    fn dispatch_picks_standard_ldata() {
        let bytes = [0x29u8, 0x00, 0xBC, 0xE0, 0x11, 0x01, 0x09, 0x01, 0x01, 0x00, 0x81];
        match Frame::parse(&bytes).unwrap() {
            Frame::LData(_) => {}
            other => panic!("expected standard L_Data, got {other:?}"),
        }
    }

    #[test]
    fn dispatch_falls_back_to_extended_for_long_tpdu() {
        let ext = LDataExtended::new(
            LDataMessageCode::Req,
            IndividualAddress::new(1),
            Address::Group(GroupAddress::new(1)),
            Priority::Low,
            6,
            vec![0u8; 17],
        )
        .unwrap();
        let bytes = ext.to_bytes();
        match Frame::parse(&bytes).unwrap() {
            Frame::LDataExtended(_) => {}
            other => panic!("expected extended L_Data, got {other:?}"),
        }
    }

    #[test]
    fn dispatch_rejects_unknown_code() {
        assert!(Frame::parse(&[0xAA]).is_err());
    }
}
