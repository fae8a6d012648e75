//! Error taxonomy shared by every layer of the core.
//!
//! Codec errors bubble up unchanged; link and process-communicator errors
//! carry just enough context for a caller to decide whether to retry.

use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KnxError>;

/// The closed set of error kinds raised by the core (see the error taxonomy
/// table in the specification). Each variant maps to exactly one raising
/// site category; none of them perform cleanup beyond what is documented on
/// the call that raised them.
#[derive(Debug, thiserror::Error)]
pub enum KnxError {
    /// Invalid frame structure: truncated buffer, unknown message code,
    /// invalid control field, or an impossible length field.
    #[error("format error: {0}")]
    Format(String),

    /// A caller-supplied value was out of range (address, TPDU length,
    /// element count, timeout).
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// FT1.2 did not receive a single ACK byte across all reset/send
    /// attempts.
    #[error("ack timeout")]
    AckTimeout,

    /// A blocking wait (process communicator read, FT1.2 `.con` wait)
    /// elapsed without the awaited event.
    #[error("timeout")]
    Timeout,

    /// A group response's APDU length fell outside the caller's
    /// `[min, max]` window.
    #[error("invalid response: apdu length {actual} not in [{min}, {max}]")]
    InvalidResponse { actual: usize, min: usize, max: usize },

    /// The FT1.2 port is closed, either because it was never opened, or
    /// because an I/O error or explicit close tore it down.
    #[error("port closed")]
    PortClosed,

    /// The network link collaborator is closed.
    #[error("link closed")]
    LinkClosed,

    /// A device-management `.con` carried a negative response.
    #[error("negative response: {0}")]
    NegativeResponse(DeviceManagementError),
}

impl KnxError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        KnxError::Format(msg.into())
    }

    pub(crate) fn illegal_argument(msg: impl Into<String>) -> Self {
        KnxError::IllegalArgument(msg.into())
    }
}

/// The fixed 1-byte error-code taxonomy carried in the payload of a negative
/// `PropRead.con` / `PropWrite.con` (see §7 of the specification).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceManagementError {
    Unspecified,
    OutOfRange,
    OutOfMaxRange,
    OutOfMinRange,
    MemoryError,
    ReadOnlyProperty,
    IllegalCommand,
    NonexistentProperty,
    TypeConflict,
    IndexRangeError,
    ValueNotWritableNow,
    /// A code outside the normative `0x00..=0x0A` table. The raw byte is
    /// preserved so callers can still inspect it.
    Unknown(u8),
}

impl DeviceManagementError {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x00 => Self::Unspecified,
            0x01 => Self::OutOfRange,
            0x02 => Self::OutOfMaxRange,
            0x03 => Self::OutOfMinRange,
            0x04 => Self::MemoryError,
            0x05 => Self::ReadOnlyProperty,
            0x06 => Self::IllegalCommand,
            0x07 => Self::NonexistentProperty,
            0x08 => Self::TypeConflict,
            0x09 => Self::IndexRangeError,
            0x0A => Self::ValueNotWritableNow,
            other => Self::Unknown(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Unspecified => 0x00,
            Self::OutOfRange => 0x01,
            Self::OutOfMaxRange => 0x02,
            Self::OutOfMinRange => 0x03,
            Self::MemoryError => 0x04,
            Self::ReadOnlyProperty => 0x05,
            Self::IllegalCommand => 0x06,
            Self::NonexistentProperty => 0x07,
            Self::TypeConflict => 0x08,
            Self::IndexRangeError => 0x09,
            Self::ValueNotWritableNow => 0x0A,
            Self::Unknown(b) => b,
        }
    }

    /// Human-readable message, matching the taxonomy table verbatim.
    pub fn message(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::OutOfRange => "out of range",
            Self::OutOfMaxRange => "out of max range",
            Self::OutOfMinRange => "out of min range",
            Self::MemoryError => "memory error",
            Self::ReadOnlyProperty => "read-only property",
            Self::IllegalCommand => "illegal command",
            Self::NonexistentProperty => "nonexistent property",
            Self::TypeConflict => "type conflict",
            Self::IndexRangeError => "index/range error",
            Self::ValueNotWritableNow => "value not writable now",
            Self::Unknown(_) => "unknown error code",
        }
    }
}

impl fmt::Display for DeviceManagementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.message(), self.to_byte())
    }
}
