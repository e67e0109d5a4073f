//! ---
//! warden_section: "05-networking-external-interfaces"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Upstream directory contract and adapters."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{DirectoryError, Result};

/// Session material produced by an external login step.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredentials {
    /// Session identifier sent as `x-pm-uid`.
    pub uid: String,
    /// Bearer token.
    pub access_token: String,
    /// Token exchanged for a new access token.
    pub refresh_token: String,
}

impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("uid", &self.uid)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

impl SessionCredentials {
    /// Load credentials from a JSON session file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(DirectoryError::MissingCredentials(format!(
                    "session file {} does not exist",
                    path.display()
                )))
            }
            Err(err) => return Err(err.into()),
        };
        let credentials: SessionCredentials = serde_json::from_str(&raw)?;
        if credentials.uid.is_empty() || credentials.access_token.is_empty() {
            return Err(DirectoryError::MissingCredentials(format!(
                "session file {} has no usable session",
                path.display()
            )));
        }
        Ok(credentials)
    }

    /// Write the credentials atomically with owner-only permissions.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))?;
        }
        tmp.persist(path).map_err(|err| err.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SessionCredentials {
        SessionCredentials {
            uid: "uid-1".into(),
            access_token: "access".into(),
            refresh_token: "refresh".into(),
        }
    }

    #[test]
    fn save_then_load_preserves_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        sample().save(&path).unwrap();
        assert_eq!(SessionCredentials::load(&path).unwrap(), sample());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn missing_file_is_missing_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let err = SessionCredentials::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, DirectoryError::MissingCredentials(_)));
    }

    #[test]
    fn debug_output_hides_tokens() {
        let rendered = format!("{:?}", sample());
        assert!(rendered.contains("uid-1"));
        assert!(!rendered.contains("\"access\""));
        assert!(!rendered.contains("\"refresh\""));
    }
}
