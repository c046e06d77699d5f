//! Local state file
//!
//! Records the last reconciled state of every managed policy as a single
//! JSON document. Writes are atomic (write to `.tmp`, then rename).

use crate::error::StateError;
use crate::policy::PolicyState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Current state file format
pub const FORMAT_VERSION: u32 = 1;

/// Address of a managed policy, e.g. `xray_license_policy.no-gpl`
pub fn address(type_name: &str, name: &str) -> String {
    format!("{}.{}", type_name, name)
}

/// One managed policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResource {
    #[serde(rename = "type")]
    pub type_name: String,
    pub state: PolicyState,
}

/// Contents of the state file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    pub format_version: u32,
    #[serde(default)]
    pub resources: BTreeMap<String, StoredResource>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            resources: BTreeMap::new(),
        }
    }
}

impl StateFile {
    /// Load the state file. A missing file is an empty state.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| StateError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let state: StateFile =
            serde_json::from_str(&contents).map_err(|source| StateError::Json {
                path: path.display().to_string(),
                source,
            })?;

        if state.format_version > FORMAT_VERSION {
            return Err(StateError::UnsupportedFormat(state.format_version));
        }
        Ok(state)
    }

    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        let io = |source| StateError::Io {
            path: path.display().to_string(),
            source,
        };

        let json = serde_json::to_string_pretty(self).map_err(|source| StateError::Json {
            path: path.display().to_string(),
            source,
        })?;

        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, json).map_err(io)?;
        std::fs::rename(&tmp_path, path).map_err(io)?;
        Ok(())
    }

    pub fn get(&self, address: &str) -> Option<&StoredResource> {
        self.resources.get(address)
    }

    pub fn insert(&mut self, type_name: &str, state: PolicyState) {
        self.resources.insert(
            address(type_name, &state.name),
            StoredResource {
                type_name: type_name.to_string(),
                state,
            },
        );
    }

    pub fn remove(&mut self, address: &str) -> Option<StoredResource> {
        self.resources.remove(address)
    }
}
