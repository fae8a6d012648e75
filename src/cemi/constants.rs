//! cEMI / EMI message codes and control-field bit layouts.

/// L-Data message codes (cEMI).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LDataMessageCode {
    Req = 0x11,
    Con = 0x2E,
    Ind = 0x29,
}

impl LDataMessageCode {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x11 => Some(Self::Req),
            0x2E => Some(Self::Con),
            0x29 => Some(Self::Ind),
            _ => None,
        }
    }
}

/// Device-management message codes (cEMI). Ten values in `0xF0..=0xFC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DevMgmtMessageCode {
    ResetReq = 0xF1,
    ResetInd = 0xF0,
    PropWriteReq = 0xF6,
    PropWriteCon = 0xF5,
    PropReadReq = 0xFC,
    PropReadCon = 0xFB,
    PropInfoInd = 0xF7,
    FuncPropCommandReq = 0xF8,
    FuncPropStateReadReq = 0xF9,
    FuncPropCon = 0xFA,
}

impl DevMgmtMessageCode {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0xF1 => Some(Self::ResetReq),
            0xF0 => Some(Self::ResetInd),
            0xF6 => Some(Self::PropWriteReq),
            0xF5 => Some(Self::PropWriteCon),
            0xFC => Some(Self::PropReadReq),
            0xFB => Some(Self::PropReadCon),
            0xF7 => Some(Self::PropInfoInd),
            0xF8 => Some(Self::FuncPropCommandReq),
            0xF9 => Some(Self::FuncPropStateReadReq),
            0xFA => Some(Self::FuncPropCon),
            _ => None,
        }
    }

    /// `F8`, `F9`, `FA`: function-property frames have no start-index /
    /// element-count bytes.
    pub fn is_function_property(self) -> bool {
        matches!(
            self,
            Self::FuncPropCommandReq | Self::FuncPropStateReadReq | Self::FuncPropCon
        )
    }

    pub fn is_reset(self) -> bool {
        matches!(self, Self::ResetReq | Self::ResetInd)
    }

    /// A `.con` that may carry a negative response.
    pub fn is_confirmation(self) -> bool {
        matches!(self, Self::PropReadCon | Self::PropWriteCon)
    }

    /// `PropRead.req`, `PropWrite.req`, `PropInfo.ind`: element count must
    /// be `>= 1` at construction.
    pub fn requires_nonzero_elements(self) -> bool {
        matches!(self, Self::PropReadReq | Self::PropWriteReq | Self::PropInfoInd)
    }
}

/// Busmonitor indication message code.
pub const L_BUSMON_IND: u8 = 0x2B;

/// T-Data connection-oriented request/indication codes.
pub const T_DATA_CONNECTED_REQ: u8 = 0x41;
pub const T_DATA_CONNECTED_IND: u8 = 0x89;

/// EMI1/EMI2 message codes that the codec translates to/from cEMI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EmiMessageCode {
    LDataInd = 0x49,
    LDataCon = 0x4E,
    LDataReqBroadcast = 0x15,
    LDataConBroadcast = 0x4C,
    LDataIndBroadcast = 0x4D,
}

impl EmiMessageCode {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x49 => Some(Self::LDataInd),
            0x4E => Some(Self::LDataCon),
            0x15 => Some(Self::LDataReqBroadcast),
            0x4C => Some(Self::LDataConBroadcast),
            0x4D => Some(Self::LDataIndBroadcast),
            _ => None,
        }
    }

    pub fn to_cemi(self) -> LDataMessageCode {
        match self {
            Self::LDataInd | Self::LDataIndBroadcast => LDataMessageCode::Ind,
            Self::LDataCon | Self::LDataConBroadcast => LDataMessageCode::Con,
            Self::LDataReqBroadcast => LDataMessageCode::Req,
        }
    }
}

/// Mask and required pattern for a structurally valid TP1/PL110 standard
/// `L_Data` control field 1 (reserved bit clear, broadcast set, no ack
/// request, positive confirm).
pub const CTRL1_VALID_MASK: u8 = 0x53;
pub const CTRL1_VALID_VALUE: u8 = 0x10;

/// `ctrl1` bit layout.
pub const CTRL1_STANDARD_FRAME: u8 = 0x80;
pub const CTRL1_DO_NOT_REPEAT: u8 = 0x20;
pub const CTRL1_BROADCAST: u8 = 0x10;
pub const CTRL1_ACK_REQUEST: u8 = 0x02;
pub const CTRL1_CONFIRM_ERROR: u8 = 0x01;
pub const CTRL1_PRIORITY_SHIFT: u8 = 2;
pub const CTRL1_PRIORITY_MASK: u8 = 0x0C;

/// `ctrl2` bit layout.
pub const CTRL2_GROUP_ADDRESS: u8 = 0x80;
pub const CTRL2_HOP_COUNT_SHIFT: u8 = 4;
pub const CTRL2_HOP_COUNT_MASK: u8 = 0x70;
pub const CTRL2_EXT_FORMAT_MASK: u8 = 0x0F;
/// LTE-HEE destinations: `ctrl2 & 0x0C == 0x04`.
pub const CTRL2_LTE_HEE_MASK: u8 = 0x0C;
pub const CTRL2_LTE_HEE_VALUE: u8 = 0x04;
