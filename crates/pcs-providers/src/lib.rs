//! Storage provider adapters: one module per personal cloud service, each
//! implementing [`pcs_core::ports::StorageProvider`] and registering itself
//! with [`pcs_core::registry`] under a short provider name.
//!
//! Every adapter is grounded on the matching file under
//! `original_source/.../providers/` (see `DESIGN.md`). `swift` is the odd one
//! out: it is a reusable Swift sub-client consumed by `hubic`, not a provider
//! in its own right.

pub mod cloudme;
pub mod dropbox;
pub mod googledrive;
pub mod hubic;
pub mod onedrive;
pub mod rapidshare;
pub mod swift;

/// Registers every built-in provider factory. Call once during application
/// startup (see `pcs-cli`'s `main`) before building a [`pcs_core::StorageBuilder`].
pub fn register_all() {
    dropbox::register();
    googledrive::register();
    onedrive::register();
    hubic::register();
    rapidshare::register();
    cloudme::register();
}
