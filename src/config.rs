//! Process-wide configuration knobs, modeled as an immutable struct
//! threaded through codecs and links rather than global mutable state
//! (see the "Global mutable state" design note).

use crate::address::Priority;
use crate::error::{KnxError, Result};
use std::time::Duration;

/// EMI1/2 and cEMI codec configuration.
#[derive(Debug, Clone, Copy)]
pub struct CemiConfig {
    /// Workaround for non-conforming USB sticks: force the two reserved
    /// EMI1/2 control bits (`0xB0`) to 1 on send.
    pub set_reserved_emi_ctrl_bits: bool,
}

impl Default for CemiConfig {
    fn default() -> Self {
        CemiConfig {
            set_reserved_emi_ctrl_bits: false,
        }
    }
}

/// Process communicator configuration.
#[derive(Debug, Clone, Copy)]
pub struct ProcessCommunicatorConfig {
    pub response_timeout: Duration,
    pub priority: Priority,
}

impl ProcessCommunicatorConfig {
    pub fn new(response_timeout: Duration, priority: Priority) -> Result<Self> {
        if response_timeout.is_zero() {
            return Err(KnxError::illegal_argument(
                "response timeout must be > 0",
            ));
        }
        Ok(ProcessCommunicatorConfig {
            response_timeout,
            priority,
        })
    }
}

impl Default for ProcessCommunicatorConfig {
    fn default() -> Self {
        ProcessCommunicatorConfig {
            response_timeout: Duration::from_secs(5),
            priority: Priority::Low,
        }
    }
}

/// Supported FT1.2 serial baud rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudRate {
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
}

impl BaudRate {
    pub const fn value(self) -> u32 {
        match self {
            BaudRate::B9600 => 9_600,
            BaudRate::B19200 => 19_200,
            BaudRate::B38400 => 38_400,
            BaudRate::B57600 => 57_600,
            BaudRate::B115200 => 115_200,
        }
    }
}

impl Default for BaudRate {
    fn default() -> Self {
        BaudRate::B19200
    }
}
