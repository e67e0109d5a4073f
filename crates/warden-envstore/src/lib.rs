//! ---
//! warden_section: "03-persistence-logging"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Persistence of the live endpoint selection."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Flat `KEY=VALUE` store that records which endpoint the tunnel uses.

/// Result alias used throughout the store crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for the endpoint store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Wrapper for IO errors encountered while reading or replacing the store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The endpoint lacks a value required by a managed key.
    #[error("endpoint {endpoint} has no value for {key}")]
    MissingValue {
        /// Endpoint being written.
        endpoint: String,
        /// Managed key that could not be filled.
        key: String,
    },
    /// A value would span more than one line of the store.
    #[error("value for {key} contains a line break")]
    InvalidValue {
        /// Managed key whose value was rejected.
        key: String,
    },
}

pub mod merge;
pub mod store;

pub use merge::{merge_env, read_value, ManagedSettings};
pub use store::EnvStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_value_names_key() {
        let err = StoreError::MissingValue {
            endpoint: "CH#1".into(),
            key: "ENDPOINT_KEY".into(),
        };
        assert_eq!(format!("{err}"), "endpoint CH#1 has no value for ENDPOINT_KEY");
    }
}
