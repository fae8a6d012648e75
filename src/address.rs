//! Immutable address and priority value types (component A).
//!
//! `IndividualAddress` and `GroupAddress` both wrap a 16-bit value and
//! differ only in semantics and string rendering.

use crate::error::{KnxError, Result};
use std::fmt;
use std::str::FromStr;

/// `IndividualAddress(0xFFFF)` is a reserved sentinel meaning "no pending
/// `L_Data.con`" (used by the FT1.2 layer).
pub const NO_ADDRESS: IndividualAddress = IndividualAddress(0xFFFF);

/// A KNX individual (physical) device address, rendered `a.b.c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndividualAddress(u16);

impl IndividualAddress {
    pub const fn raw(self) -> u16 {
        self.0
    }

    pub fn new(raw: u16) -> Self {
        IndividualAddress(raw)
    }

    pub fn from_levels(area: u8, line: u8, device: u8) -> Result<Self> {
        if area > 0x0F {
            return Err(KnxError::illegal_argument(format!(
                "individual address area {area} out of range [0..15]"
            )));
        }
        if line > 0x0F {
            return Err(KnxError::illegal_argument(format!(
                "individual address line {line} out of range [0..15]"
            )));
        }
        let raw = ((area as u16) << 12) | ((line as u16) << 8) | device as u16;
        Ok(IndividualAddress(raw))
    }

    pub const fn area(self) -> u8 {
        ((self.0 >> 12) & 0x0F) as u8
    }

    pub const fn line(self) -> u8 {
        ((self.0 >> 8) & 0x0F) as u8
    }

    pub const fn device(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub const fn is_sentinel(self) -> bool {
        self.0 == NO_ADDRESS.0
    }
}

impl fmt::Display for IndividualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.area(), self.line(), self.device())
    }
}

impl FromStr for IndividualAddress {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('.');
        let (Some(a), Some(b), Some(c), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(KnxError::illegal_argument(format!(
                "'{s}' is not a valid individual address"
            )));
        };
        let parse = |field: &str| {
            field
                .parse::<u16>()
                .map_err(|_| KnxError::illegal_argument(format!("'{s}' is not a valid address")))
        };
        let (a, b, c) = (parse(a)?, parse(b)?, parse(c)?);
        if a > 15 || b > 15 || c > 255 {
            return Err(KnxError::illegal_argument(format!(
                "'{s}' has a field out of range"
            )));
        }
        IndividualAddress::from_levels(a as u8, b as u8, c as u8)
    }
}

impl From<u16> for IndividualAddress {
    fn from(raw: u16) -> Self {
        IndividualAddress(raw)
    }
}

/// A KNX group address, rendered in 3-level (`a/b/c`) form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupAddress(u16);

impl GroupAddress {
    pub const fn raw(self) -> u16 {
        self.0
    }

    pub fn new(raw: u16) -> Self {
        GroupAddress(raw)
    }

    /// 3-level form: `a ∈ [0..31]`, `b ∈ [0..7]`, `c ∈ [0..255]`.
    pub fn from_levels3(main: u8, middle: u8, sub: u8) -> Result<Self> {
        if main > 31 {
            return Err(KnxError::illegal_argument(format!(
                "group address main {main} out of range [0..31]"
            )));
        }
        if middle > 7 {
            return Err(KnxError::illegal_argument(format!(
                "group address middle {middle} out of range [0..7]"
            )));
        }
        let raw = ((main as u16) << 11) | ((middle as u16) << 8) | sub as u16;
        Ok(GroupAddress(raw))
    }

    /// 2-level form: `a ∈ [0..31]`, `b ∈ [0..2047]`.
    pub fn from_levels2(main: u8, sub: u16) -> Result<Self> {
        if main > 31 {
            return Err(KnxError::illegal_argument(format!(
                "group address main {main} out of range [0..31]"
            )));
        }
        if sub > 2047 {
            return Err(KnxError::illegal_argument(format!(
                "group address sub {sub} out of range [0..2047]"
            )));
        }
        let raw = ((main as u16) << 11) | sub;
        Ok(GroupAddress(raw))
    }

    pub const fn main(self) -> u8 {
        ((self.0 >> 11) & 0x1F) as u8
    }

    pub const fn middle(self) -> u8 {
        ((self.0 >> 8) & 0x07) as u8
    }

    pub const fn sub(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub const fn sub2(self) -> u16 {
        self.0 & 0x07FF
    }
}

impl fmt::Display for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.main(), self.middle(), self.sub())
    }
}

impl FromStr for GroupAddress {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        let parse = |field: &str| {
            field
                .parse::<u16>()
                .map_err(|_| KnxError::illegal_argument(format!("'{s}' is not a valid address")))
        };
        match parts.as_slice() {
            [a, b, c] => {
                let (a, b, c) = (parse(a)?, parse(b)?, parse(c)?);
                if a > 31 || b > 7 || c > 255 {
                    return Err(KnxError::illegal_argument(format!(
                        "'{s}' has a field out of range"
                    )));
                }
                GroupAddress::from_levels3(a as u8, b as u8, c as u8)
            }
            [a, b] => {
                let (a, b) = (parse(a)?, parse(b)?);
                if a > 31 || b > 2047 {
                    return Err(KnxError::illegal_argument(format!(
                        "'{s}' has a field out of range"
                    )));
                }
                GroupAddress::from_levels2(a as u8, b)
            }
            _ => Err(KnxError::illegal_argument(format!(
                "'{s}' is not a valid group address"
            ))),
        }
    }
}

impl From<u16> for GroupAddress {
    fn from(raw: u16) -> Self {
        GroupAddress(raw)
    }
}

/// Either an individual or a group address; `ctrl2` bit 7 of the cEMI
/// frame discriminates the two at the wire level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    Individual(IndividualAddress),
    Group(GroupAddress),
}

impl Address {
    pub const fn raw(self) -> u16 {
        match self {
            Address::Individual(a) => a.raw(),
            Address::Group(a) => a.raw(),
        }
    }

    pub const fn is_group(self) -> bool {
        matches!(self, Address::Group(_))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Individual(a) => fmt::Display::fmt(a, f),
            Address::Group(a) => fmt::Display::fmt(a, f),
        }
    }
}

/// 2-bit KNX message priority, fixed wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Priority {
    System = 0b00,
    Normal = 0b01,
    Urgent = 0b10,
    Low = 0b11,
}

impl Priority {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Priority::System,
            0b01 => Priority::Normal,
            0b10 => Priority::Urgent,
            _ => Priority::Low,
        }
    }

    pub const fn bits(self) -> u8 {
        self as u8
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Low
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::System => "System",
            Priority::Normal => "Normal",
            Priority::Urgent => "Urgent",
            Priority::Low => "Low",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn individual_address_string_roundtrip() {
        let a = IndividualAddress::from_levels(1, 2, 3).unwrap();
        assert_eq!(a.to_string(), "1.2.3");
        assert_eq!("1.2.3".parse::<IndividualAddress>().unwrap(), a);
    }

    #[test]
    fn group_address_3level_string_roundtrip() {
        let g = GroupAddress::from_levels3(1, 2, 3).unwrap();
        assert_eq!(g.to_string(), "1/2/3");
        assert_eq!("1/2/3".parse::<GroupAddress>().unwrap(), g);
    }

    #[test]
    fn group_address_2level_parses_to_same_raw() {
        let g3 = GroupAddress::from_levels3(1, 0, 3).unwrap();
        let g2 = "1/3".parse::<GroupAddress>().unwrap();
        assert_eq!(g3.raw(), g2.raw());
    }

    #[test]
    fn rejects_out_of_range_fields() {
        assert!(IndividualAddress::from_levels(16, 0, 0).is_err());
        assert!(GroupAddress::from_levels3(32, 0, 0).is_err());
        assert!(GroupAddress::from_levels3(0, 8, 0).is_err());
        assert!(GroupAddress::from_levels2(0, 2048).is_err());
    }

    #[test]
    fn sentinel_address_is_recognized() {
        assert!(NO_ADDRESS.is_sentinel());
        assert!(!IndividualAddress::new(0).is_sentinel());
    }

    #[test]
    fn priority_bit_roundtrip() {
        for bits in 0..4u8 {
            assert_eq!(Priority::from_bits(bits).bits(), bits);
        }
    }
}
