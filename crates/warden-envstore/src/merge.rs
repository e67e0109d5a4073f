//! ---
//! warden_section: "03-persistence-logging"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Persistence of the live endpoint selection."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use warden_common::StoreKeys;
use warden_directory::Endpoint;

use crate::{Result, StoreError};

/// Ordered set of managed `KEY=VALUE` assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedSettings {
    entries: Vec<(String, String)>,
}

impl ManagedSettings {
    /// Empty settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite an assignment, keeping first-insertion order.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    /// Settings that make `endpoint` the live endpoint.
    ///
    /// Fails when the endpoint has no entry address or connection key.
    pub fn for_endpoint(keys: &StoreKeys, endpoint: &Endpoint) -> Result<Self> {
        let missing = |key: &str| StoreError::MissingValue {
            endpoint: endpoint.name.clone(),
            key: key.to_owned(),
        };
        if endpoint.entry_address.is_empty() {
            return Err(missing(&keys.address));
        }
        let connection_key = endpoint
            .connection_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| missing(&keys.public_key))?;

        let mut settings = Self::new();
        settings
            .set(&keys.name, &endpoint.name)
            .set(&keys.address, &endpoint.entry_address)
            .set(&keys.port, endpoint.port.to_string())
            .set(&keys.public_key, connection_key);
        Ok(settings)
    }

    /// Iterate over assignments in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Value assigned to `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Number of managed keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys are managed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reject values that would break the one-line-per-key layout.
    pub fn validate(&self) -> Result<()> {
        match self
            .entries
            .iter()
            .find(|(_, value)| value.contains(['\n', '\r']))
        {
            Some((key, _)) => Err(StoreError::InvalidValue { key: key.clone() }),
            None => Ok(()),
        }
    }

    fn position_of(&self, line: &str) -> Option<usize> {
        let line = line.trim_start();
        self.entries.iter().position(|(key, _)| {
            line.strip_prefix(key.as_str())
                .is_some_and(|rest| rest.starts_with('='))
        })
    }
}

/// Apply `settings` to the store contents `existing`.
///
/// Each managed key ends up on exactly one line: its first assignment is
/// replaced in place and later duplicates are dropped. Unmanaged lines are
/// kept byte for byte in their original order. Keys that were absent are
/// appended after ensuring the content ends with a newline.
///
/// A replaced line keeps its own terminator. Added line breaks follow the
/// first line of `existing`, `\r\n` if it uses one and `\n` otherwise.
/// Values are expected to have passed [`ManagedSettings::validate`].
pub fn merge_env(existing: &str, settings: &ManagedSettings) -> String {
    let eol = match existing.split_inclusive('\n').next() {
        Some(first) if first.ends_with("\r\n") => "\r\n",
        _ => "\n",
    };
    let mut merged = String::with_capacity(existing.len() + 128);
    let mut written = vec![false; settings.len()];

    for line in existing.split_inclusive('\n') {
        match settings.position_of(line) {
            Some(idx) if written[idx] => {}
            Some(idx) => {
                let (key, value) = &settings.entries[idx];
                let terminator = if line.ends_with("\r\n") {
                    "\r\n"
                } else if line.ends_with('\n') {
                    "\n"
                } else {
                    eol
                };
                push_assignment(&mut merged, key, value, terminator);
                written[idx] = true;
            }
            None => merged.push_str(line),
        }
    }

    if !merged.is_empty() && !merged.ends_with('\n') {
        merged.push_str(eol);
    }

    for (idx, (key, value)) in settings.entries.iter().enumerate() {
        if !written[idx] {
            push_assignment(&mut merged, key, value, eol);
        }
    }
    merged
}

fn push_assignment(out: &mut String, key: &str, value: &str, eol: &str) {
    out.push_str(key);
    out.push('=');
    out.push_str(value);
    out.push_str(eol);
}

/// Value of the first assignment of `key` in `contents`.
///
/// Empty values read as absent.
pub fn read_value(contents: &str, key: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let value = line.trim().strip_prefix(key)?.strip_prefix('=')?;
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_owned())
    })
}
