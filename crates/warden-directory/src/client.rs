//! ---
//! warden_section: "05-networking-external-interfaces"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Upstream directory contract and adapters."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use async_trait::async_trait;

use crate::{Endpoint, Result};

/// Interface implemented by directory backends.
///
/// Implementations report failures as tagged [`crate::DirectoryError`]
/// values and never retry on their own; the retry policy lives in
/// [`crate::DirectorySession`].
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Retrieve the current endpoint listing.
    async fn fetch(&mut self) -> Result<Vec<Endpoint>>;

    /// Exchange the refresh credential for a new access credential.
    async fn refresh_credential(&mut self) -> Result<()>;

    /// Persist the current credentials so a restart can reuse them.
    async fn persist_credential(&self) -> Result<()>;

    /// Establish a fresh identity after the refresh path failed.
    async fn reauthenticate(&mut self) -> Result<()>;
}
