//! ---
//! warden_section: "03-persistence-logging"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Persistence of the live endpoint selection."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};
use warden_common::{StoreConfig, StoreKeys};
use warden_directory::Endpoint;

use crate::merge::{merge_env, read_value, ManagedSettings};
use crate::Result;

/// File-backed endpoint store.
#[derive(Debug, Clone)]
pub struct EnvStore {
    path: PathBuf,
    keys: StoreKeys,
}

impl EnvStore {
    /// Store at `path` using the given key names.
    pub fn new(path: impl Into<PathBuf>, keys: StoreKeys) -> Self {
        Self {
            path: path.into(),
            keys,
        }
    }

    /// Store described by configuration.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.path.clone(), config.keys.clone())
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_contents(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Name of the endpoint currently configured as live.
    ///
    /// A missing file or an empty assignment reads as `None`.
    pub fn current_endpoint(&self) -> Result<Option<String>> {
        Ok(self
            .read_contents()?
            .and_then(|contents| read_value(&contents, &self.keys.name)))
    }

    /// Make `endpoint` the live endpoint.
    pub fn write_endpoint(&self, endpoint: &Endpoint) -> Result<()> {
        let settings = ManagedSettings::for_endpoint(&self.keys, endpoint)?;
        self.apply(&settings)?;
        info!(
            endpoint = %endpoint.name,
            address = %endpoint.entry_address,
            store = %self.path.display(),
            "endpoint store updated"
        );
        Ok(())
    }

    /// Merge `settings` into the store with a single full-file replace.
    ///
    /// Values containing line breaks are rejected before the file is read.
    /// The merged content is written to a temporary file next to the store
    /// and renamed over it, so readers see either the old or the new file.
    pub fn apply(&self, settings: &ManagedSettings) -> Result<()> {
        settings.validate()?;
        let existing = self.read_contents()?;
        let merged = merge_env(existing.as_deref().unwrap_or_default(), settings);

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(merged.as_bytes())?;
        tmp.as_file().sync_all()?;
        if existing.is_some() {
            let permissions = fs::metadata(&self.path)?.permissions();
            fs::set_permissions(tmp.path(), permissions)?;
        }
        tmp.persist(&self.path).map_err(|err| err.error)?;
        debug!(store = %self.path.display(), bytes = merged.len(), "store replaced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;

    fn store(dir: &Path) -> EnvStore {
        EnvStore::new(dir.join(".env"), StoreKeys::default())
    }

    fn endpoint(name: &str) -> Endpoint {
        Endpoint::new(name, "US", "San Jose", 12).with_connection("203.0.113.9", "pk-9")
    }

    #[test]
    fn missing_file_has_no_current_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store(dir.path()).current_endpoint().unwrap(), None);
    }

    #[test]
    fn write_creates_and_updates_store() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store(dir.path());
        fs::write(store.path(), "COMPOSE_PROJECT=vpn\nENDPOINT_NAME=US-CA#1\n")?;
        assert_eq!(store.current_endpoint()?.as_deref(), Some("US-CA#1"));

        store.write_endpoint(&endpoint("US-CA#9"))?;
        assert_eq!(store.current_endpoint()?.as_deref(), Some("US-CA#9"));
        let contents = fs::read_to_string(store.path())?;
        assert_eq!(
            contents,
            "COMPOSE_PROJECT=vpn\nENDPOINT_NAME=US-CA#9\nENDPOINT_ADDRESS=203.0.113.9\n\
             ENDPOINT_PORT=51820\nENDPOINT_KEY=pk-9\n"
        );
        Ok(())
    }

    #[test]
    fn rejected_endpoint_leaves_store_untouched() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store(dir.path());
        fs::write(store.path(), "ENDPOINT_NAME=US-CA#1\n")?;

        let keyless = Endpoint::new("US-CA#2", "US", "San Jose", 3);
        let err = store.write_endpoint(&keyless).unwrap_err();
        assert!(matches!(err, StoreError::MissingValue { .. }));
        assert_eq!(fs::read_to_string(store.path())?, "ENDPOINT_NAME=US-CA#1\n");
        Ok(())
    }

    #[test]
    fn line_break_in_listing_value_aborts_write() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store(dir.path());
        fs::write(store.path(), "ENDPOINT_NAME=US-CA#1\n")?;

        let forged = Endpoint::new("US-CA#2\nENDPOINT_NAME=other", "US", "San Jose", 3)
            .with_connection("203.0.113.2", "pk-2");
        let err = store.write_endpoint(&forged).unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue { ref key } if key == "ENDPOINT_NAME"));

        let split_key = endpoint("US-CA#3").with_connection("203.0.113.3", "pk\r\nX=1");
        assert!(matches!(
            store.write_endpoint(&split_key),
            Err(StoreError::InvalidValue { .. })
        ));
        assert_eq!(fs::read_to_string(store.path())?, "ENDPOINT_NAME=US-CA#1\n");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn replace_keeps_file_permissions() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let store = store(dir.path());
        fs::write(store.path(), "A=1\n")?;
        fs::set_permissions(store.path(), fs::Permissions::from_mode(0o640))?;

        store.write_endpoint(&endpoint("US-CA#3"))?;
        let mode = fs::metadata(store.path())?.permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
        Ok(())
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvStore::new(dir.path().join("absent").join(".env"), StoreKeys::default());
        let err = store.write_endpoint(&endpoint("US-CA#4")).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
