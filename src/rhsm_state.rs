//! Resource state.
//!
//! Unique responsibility: hold the flat attribute state of one resource
//! instance, and persist a set of such states locally.
//!
//! The authoritative state always lives in RHSM; a [`ResourceState`] is a cache
//! that a read refreshes or clears. Persistence is only used by callers that
//! have no provisioning runtime of their own (the demo binary).

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::rhsm_error::RhsmError;

/// State file format version.
const STATE_FORMAT_VERSION: u32 = 1;

/// Attribute state of one resource instance.
///
/// Attributes are kept in a sorted map so two reads of the same remote entity
/// produce byte-identical state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    id: Option<String>,
    attributes: Map<String, Value>,
}

impl ResourceState {
    /// Empty state with no id.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty state with the given id.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            attributes: Map::new(),
        }
    }

    /// Resource id, if the resource exists.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Set the resource id.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// All attributes.
    #[must_use]
    pub const fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Set an attribute.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Builder-style [`ResourceState::set`].
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a string set attribute (sorted, de-duplicated).
    pub fn set_string_set<I, S>(&mut self, name: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut items: Vec<String> = values.into_iter().map(Into::into).collect();
        items.sort();
        items.dedup();
        self.set(name, items)
    }

    /// Get a raw attribute value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Get a string attribute.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Get an integer attribute.
    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Get a boolean attribute.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// Get a string set attribute (sorted, de-duplicated; empty when unset).
    #[must_use]
    pub fn get_string_set(&self, name: &str) -> Vec<String> {
        let mut items: Vec<String> = self
            .get(name)
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        items.sort();
        items.dedup();
        items
    }

    /// Get a non-empty string attribute or fail validation.
    ///
    /// # Errors
    ///
    /// Returns [`RhsmError::Validation`] if the attribute is missing or empty.
    pub fn require_str(&self, name: &str) -> Result<&str, RhsmError> {
        self.get_str(name)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RhsmError::validation(name, "attribute is required"))
    }

    /// Get a 32-bit integer attribute or fail validation.
    ///
    /// # Errors
    ///
    /// Returns [`RhsmError::Validation`] if missing or out of range.
    pub fn require_i32(&self, name: &str) -> Result<i32, RhsmError> {
        let raw = self
            .get_i64(name)
            .ok_or_else(|| RhsmError::validation(name, "attribute is required"))?;
        i32::try_from(raw).map_err(|_| RhsmError::validation(name, "out of 32-bit range"))
    }

    /// Get the resource id or fail validation.
    ///
    /// # Errors
    ///
    /// Returns [`RhsmError::Validation`] if the state has no id.
    pub fn require_id(&self) -> Result<&str, RhsmError> {
        self.id()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RhsmError::validation("id", "resource has no id"))
    }
}

/// Persisted collection of resource states keyed by address
/// (e.g. `rhsm_allocation_manifest.main`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// Format version for state serialization.
    pub format_version: u32,
    /// Resource states by address.
    pub resources: BTreeMap<String, ResourceState>,
    /// Last local update timestamp (ms).
    pub last_updated_ms: u64,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            format_version: STATE_FORMAT_VERSION,
            resources: BTreeMap::new(),
            last_updated_ms: 0,
        }
    }
}

impl StateFile {
    /// Record or clear a resource's state. `None` (absent remotely) removes it.
    pub fn put(&mut self, address: impl Into<String>, state: Option<ResourceState>, now_ms: u64) {
        let address = address.into();
        match state {
            Some(s) => {
                self.resources.insert(address, s);
            }
            None => {
                self.resources.remove(&address);
            }
        }
        self.last_updated_ms = now_ms;
    }

    /// State recorded for an address.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<&ResourceState> {
        self.resources.get(address)
    }
}

/// Trait for persisting resource state.
pub trait StateStore {
    /// Load the state from storage.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails (I/O, parsing, or validation).
    fn load(&self) -> Result<Option<StateFile>, RhsmError>;
    /// Save the state to storage.
    ///
    /// # Errors
    ///
    /// Returns an error if saving fails (I/O, serialization, or validation).
    fn save(&self, state: &StateFile) -> Result<(), RhsmError>;
}

/// File-based JSON state store with atomic writes.
#[derive(Debug, Clone)]
pub struct JsonFileStateStore {
    path: PathBuf,
}

impl JsonFileStateStore {
    /// Create a new JSON file state store.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the path to the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the default path from environment or fallback.
    ///
    /// Env: `RHSM_STATE_PATH` (default: `.rhsm_state.json`)
    #[must_use]
    pub fn default_path() -> PathBuf {
        if let Some(p) = std::env::var_os("RHSM_STATE_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from(".rhsm_state.json")
    }

    fn ensure_parent_dir(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl StateStore for JsonFileStateStore {
    fn load(&self) -> Result<Option<StateFile>, RhsmError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        let state: StateFile =
            serde_json::from_slice(&bytes).map_err(|e| RhsmError::StateFile(e.to_string()))?;
        if state.format_version != STATE_FORMAT_VERSION {
            return Err(RhsmError::StateFile(format!(
                "unsupported state format version {}",
                state.format_version
            )));
        }
        Ok(Some(state))
    }

    fn save(&self, state: &StateFile) -> Result<(), RhsmError> {
        if state.format_version != STATE_FORMAT_VERSION {
            return Err(RhsmError::StateFile("wrong state format version".to_string()));
        }

        self.ensure_parent_dir()?;

        // Temp file in the same directory so the rename stays atomic.
        let mut tmp = self.path.clone();
        let tmp_name = format!(
            ".{}.tmp",
            self.path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("rhsm_state")
        );
        tmp.set_file_name(tmp_name);

        let json =
            serde_json::to_vec_pretty(state).map_err(|e| RhsmError::StateFile(e.to_string()))?;

        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&json)?;
            f.sync_all()?;
        }

        // On Windows, rename over an existing file can fail.
        if self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }
        fs::rename(&tmp, &self.path)?;

        Ok(())
    }
}

/// Utility: current timestamp in milliseconds since UNIX epoch.
#[must_use]
pub fn now_unix_ms() -> u64 {
    let Ok(dur) = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) else {
        return 0;
    };
    u64::try_from(dur.as_millis()).unwrap_or(u64::MAX)
}
