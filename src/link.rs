//! The network-link collaborator: whatever carries frames between the
//! process communicator and the KNX medium (an FT1.2 serial connection,
//! a KNXnet/IP tunnel, …). The process communicator only ever depends on
//! this trait, never on a concrete transport.

use crate::address::IndividualAddress;
use crate::cemi::Frame;
use crate::error::Result;
use std::sync::Arc;

/// Receives frames and closure notifications from a [`NetworkLink`].
pub trait LinkListener: Send + Sync {
    fn frame_received(&self, frame: &Frame);
    fn link_closed(&self, reason: &str);
}

/// A link-layer connection to the KNX medium.
pub trait NetworkLink: Send + Sync {
    /// Send `frame` and wait for the medium to accept it (not for an
    /// application-level response).
    fn send_request_wait(&self, frame: Frame) -> Result<()>;

    fn add_link_listener(&self, listener: Arc<dyn LinkListener>);
    fn remove_link_listener(&self, listener: &Arc<dyn LinkListener>);

    fn is_open(&self) -> bool;
    fn device_address(&self) -> IndividualAddress;
    fn close(&self);
}
