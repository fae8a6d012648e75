//! cEMI device-management frames (property read/write/info, function
//! properties, and reset).

use crate::cemi::constants::DevMgmtMessageCode;
use crate::error::{DeviceManagementError, KnxError, Result};

/// A device-management frame. `start_index` and `elements` are absent
/// (and read as `0`) for the function-property subset and for reset
/// frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceManagement {
    pub msg_code: DevMgmtMessageCode,
    pub interface_object_type: u16,
    pub object_instance: u8,
    pub property_id: u8,
    pub start_index: u16,
    pub elements: u8,
    pub payload: Vec<u8>,
}

impl DeviceManagement {
    pub fn reset(msg_code: DevMgmtMessageCode) -> Result<Self> {
        if !msg_code.is_reset() {
            return Err(KnxError::illegal_argument("not a reset message code"));
        }
        Ok(DeviceManagement {
            msg_code,
            interface_object_type: 0,
            object_instance: 0,
            property_id: 0,
            start_index: 0,
            elements: 0,
            payload: Vec::new(),
        })
    }

    pub fn property(
        msg_code: DevMgmtMessageCode,
        interface_object_type: u16,
        object_instance: u8,
        property_id: u8,
        start_index: u16,
        elements: u8,
        payload: Vec<u8>,
    ) -> Result<Self> {
        if msg_code.is_reset() {
            return Err(KnxError::illegal_argument(
                "reset message code has no property fields",
            ));
        }
        if object_instance == 0 {
            return Err(KnxError::illegal_argument(
                "object instance must be in [1..255]",
            ));
        }
        if start_index > 0x0FFF {
            return Err(KnxError::illegal_argument("start index out of range [0..4095]"));
        }
        if elements > 0x0F {
            return Err(KnxError::illegal_argument("element count out of range [0..15]"));
        }
        if msg_code.requires_nonzero_elements() && elements == 0 {
            return Err(KnxError::illegal_argument(format!(
                "{msg_code:?} requires elements >= 1"
            )));
        }
        Ok(DeviceManagement {
            msg_code,
            interface_object_type,
            object_instance,
            property_id,
            start_index,
            elements,
            payload,
        })
    }

    /// Negative iff message code is `PropRead.con`/`PropWrite.con` and
    /// element count is 0; payload then starts with a 1-byte error code.
    pub fn is_negative_response(&self) -> bool {
        self.msg_code.is_confirmation() && self.elements == 0
    }

    pub fn error(&self) -> Option<DeviceManagementError> {
        if self.is_negative_response() {
            self.payload.first().copied().map(DeviceManagementError::from_byte)
        } else {
            None
        }
    }

    pub fn error_message(&self) -> Option<&'static str> {
        self.error().map(DeviceManagementError::message)
    }

    pub fn message_code(&self) -> u8 {
        self.msg_code as u8
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.message_code()];
        if self.msg_code.is_reset() {
            return out;
        }
        out.extend_from_slice(&self.interface_object_type.to_be_bytes());
        out.push(self.object_instance);
        out.push(self.property_id);
        if !self.msg_code.is_function_property() {
            out.push(((self.elements & 0x0F) << 4) | ((self.start_index >> 8) as u8 & 0x0F));
            out.push((self.start_index & 0xFF) as u8);
        }
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn struct_length(&self) -> usize {
        self.to_bytes().len()
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(KnxError::format("empty device-management frame"));
        }
        let msg_code = DevMgmtMessageCode::from_byte(bytes[0]).ok_or_else(|| {
            KnxError::format(format!("unknown device-management code 0x{:02X}", bytes[0]))
        })?;
        if msg_code.is_reset() {
            if bytes.len() != 1 {
                return Err(KnxError::format("reset frame carries no payload"));
            }
            return DeviceManagement::reset(msg_code);
        }
        if bytes.len() < 5 {
            return Err(KnxError::format("device-management frame truncated"));
        }
        let interface_object_type = u16::from_be_bytes([bytes[1], bytes[2]]);
        let object_instance = bytes[3];
        let property_id = bytes[4];
        if msg_code.is_function_property() {
            return DeviceManagement::property(
                msg_code,
                interface_object_type,
                object_instance,
                property_id,
                0,
                0,
                bytes[5..].to_vec(),
            )
            .map(|mut f| {
                // function-property frames carry no element count; treat
                // the request-side nonzero-elements rule as inapplicable.
                f.elements = 0;
                f
            });
        }
        if bytes.len() < 7 {
            return Err(KnxError::format(
                "device-management frame truncated before start-index/elements",
            ));
        }
        let elements = bytes[5] >> 4;
        let start_index = (((bytes[5] & 0x0F) as u16) << 8) | bytes[6] as u16;
        let payload = bytes[7..].to_vec();
        if msg_code.requires_nonzero_elements() && elements == 0 {
            return Err(KnxError::format(format!(
                "{msg_code:?} requires elements >= 1"
            )));
        }
        Ok(DeviceManagement {
            msg_code,
            interface_object_type,
            object_instance,
            property_id,
            start_index,
            elements,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_confirmation_reports_error_message() {
        let f = DeviceManagement::property(
            DevMgmtMessageCode::PropReadCon,
            0,
            1,
            56,
            1,
            0,
            vec![0x07],
        )
        .unwrap();
        assert!(f.is_negative_response());
        assert_eq!(f.error_message(), Some("nonexistent property"));
    }

    #[test]
    fn roundtrip_negative_confirmation() {
        let f = DeviceManagement::property(
            DevMgmtMessageCode::PropReadCon,
            0,
            1,
            56,
            1,
            0,
            vec![0x07],
        )
        .unwrap();
        let bytes = f.to_bytes();
        let parsed = DeviceManagement::parse(&bytes).unwrap();
        assert_eq!(f, parsed);
        assert!(parsed.is_negative_response());
    }

    #[test]
    fn property_req_rejects_zero_elements() {
        let res = DeviceManagement::property(DevMgmtMessageCode::PropReadReq, 0, 1, 56, 0, 0, vec![]);
        assert!(res.is_err());
    }

    #[test]
    fn function_property_roundtrip_has_no_index_bytes() {
        let f = DeviceManagement::property(
            DevMgmtMessageCode::FuncPropCommandReq,
            11,
            1,
            1,
            0,
            0,
            vec![0x01, 0x02],
        )
        .unwrap();
        let bytes = f.to_bytes();
        assert_eq!(bytes.len(), 1 + 2 + 1 + 1 + 2);
        let parsed = DeviceManagement::parse(&bytes).unwrap();
        assert_eq!(parsed.payload, vec![0x01, 0x02]);
    }

    #[test]
    fn reset_roundtrip() {
        let f = DeviceManagement::reset(DevMgmtMessageCode::ResetReq).unwrap();
        let bytes = f.to_bytes();
        assert_eq!(bytes, vec![0xF1]);
        assert_eq!(DeviceManagement::parse(&bytes).unwrap(), f);
    }
}
