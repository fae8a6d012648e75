//! The secure-application-layer collaborator: KNX Data Secure group
//! encryption/decryption and group-key management. The process
//! communicator calls through this trait whenever a group address has an
//! assigned key; plain groups bypass it entirely.

use crate::address::{GroupAddress, IndividualAddress};
use crate::error::Result;
use std::sync::Arc;

pub trait GroupKeyStore: Send + Sync {
    fn key_for(&self, group: GroupAddress) -> Option<[u8; 16]>;
}

pub trait SecureApplicationLayer: Send + Sync {
    /// Attempt secure wrapping of a plain group-write ASDU. `Ok(None)`
    /// means `dst` has no group key, so the caller sends the ASDU
    /// unsecured.
    fn secure_group_object(
        &self,
        src: IndividualAddress,
        dst: GroupAddress,
        plain_asdu: &[u8],
    ) -> Result<Option<Vec<u8>>>;

    /// Send a group-object-diagnostics write for `dst` instead of a
    /// normal secure group write.
    fn write_group_object_diagnostics(&self, dst: GroupAddress, data: &[u8]) -> Result<()>;

    fn group_keys(&self) -> Arc<dyn GroupKeyStore>;
    fn close(&self);
}

/// Whether group-object diagnostics should be active for `group`: an
/// explicit caller override always wins; absent that, diagnostics follow
/// whether the group carries a key (only secured groups have anything to
/// diagnose).
pub fn use_go_diagnostics(group: GroupAddress, keys: &dyn GroupKeyStore, override_: Option<bool>) -> bool {
    override_.unwrap_or_else(|| keys.key_for(group).is_some())
}
