//! ---
//! warden_section: "05-networking-external-interfaces"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Upstream directory contract and adapters."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Endpoint model and the contract with the upstream directory service.
//!
//! The controller only ever talks to [`DirectorySession`], which wraps a
//! [`DirectoryClient`] and owns the refresh-and-retry rules for expired
//! authorization.

mod client;
mod credentials;
mod endpoint;
mod http;
mod session;

pub use client::DirectoryClient;
pub use credentials::SessionCredentials;
pub use endpoint::{Endpoint, EndpointStatus, LogicalServer, LogicalServersResponse, PhysicalServer};
pub use http::HttpDirectoryClient;
pub use session::DirectorySession;

/// Result alias used throughout the directory crate.
pub type Result<T> = std::result::Result<T, DirectoryError>;

/// Tagged failure reported by a directory client.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The access credential expired and must be refreshed.
    #[error("authorization expired")]
    AuthExpired,
    /// The directory is temporarily unavailable.
    #[error("directory service unavailable")]
    ServiceUnavailable,
    /// Any other upstream or transport failure. `code` is 0 for transport errors.
    #[error("directory error {code}: {message}")]
    Other {
        /// HTTP-like status code.
        code: u16,
        /// Upstream message or transport error text.
        message: String,
    },
    /// No usable identity credentials are available.
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    /// Reading or writing the credential file failed.
    #[error("credential store io error: {0}")]
    Io(#[from] std::io::Error),
    /// The credential file could not be decoded.
    #[error("malformed session data: {0}")]
    Json(#[from] serde_json::Error),
}

impl DirectoryError {
    /// Construct an [`DirectoryError::Other`] variant.
    pub fn other(code: u16, message: impl Into<String>) -> Self {
        Self::Other {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_error_renders_code_and_message() {
        let err = DirectoryError::other(429, "rate limited");
        assert_eq!(err.to_string(), "directory error 429: rate limited");
    }
}
