//! Persisted gun-profile collection.
//!
//! The whole collection lives in one JSON document mapping profile name to
//! profile record. Every mutation is written through immediately (temp file
//! plus rename) so a crash never loses a just-saved profile, and a corrupt
//! document degrades to an empty collection instead of blocking startup.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::{validate_name, Profile, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no profile named '{0}'")]
    NotFound(String),

    #[error(transparent)]
    InvalidName(#[from] ValidationError),

    #[error("failed to persist profile collection: {0}")]
    Persistence(String),
}

/// Exclusive owner of the persisted profile collection. The control loop only
/// ever holds a copy of the active profile, refreshed when one is loaded.
#[derive(Debug)]
pub struct ProfileStore {
    path: PathBuf,
    entries: HashMap<String, Profile>,
}

impl ProfileStore {
    /// Opens the collection at `path`, creating an empty document if none
    /// exists. An unreadable or unparsable document is logged and served as
    /// empty; the file on disk is left alone until the next successful save.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<HashMap<String, Profile>>(&content) {
                Ok(entries) => {
                    info!("Loaded {} gun profiles from {}", entries.len(), path.display());
                    entries
                }
                Err(e) => {
                    warn!("Profile collection at {} is corrupt ({}), starting empty", path.display(), e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No profile collection at {}, creating one", path.display());
                let store = Self {
                    path: path.clone(),
                    entries: HashMap::new(),
                };
                store.persist()?;
                return Ok(store);
            }
            Err(e) => {
                warn!("Cannot read profile collection at {}: {}", path.display(), e);
                HashMap::new()
            }
        };
        Ok(Self { path, entries })
    }

    pub fn load(&self, name: &str) -> Result<Profile, StoreError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    /// Saves `profile` under `name`, overwriting any existing entry. The
    /// in-memory entry is rolled back if the write-through fails, so memory
    /// and disk never disagree.
    pub fn save(&mut self, name: &str, profile: Profile) -> Result<(), StoreError> {
        validate_name(name)?;
        let previous = self.entries.insert(name.to_string(), profile);
        if let Err(e) = self.persist() {
            match previous {
                Some(p) => self.entries.insert(name.to_string(), p),
                None => self.entries.remove(name),
            };
            return Err(e);
        }
        info!("Saved gun profile '{}'", name);
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> Result<(), StoreError> {
        let previous = self
            .entries
            .remove(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        if let Err(e) = self.persist() {
            self.entries.insert(name.to_string(), previous);
            return Err(e);
        }
        info!("Deleted gun profile '{}'", name);
        Ok(())
    }

    /// Names in arbitrary order; callers sort for display.
    pub fn list_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| StoreError::Persistence(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Persistence(e.to_string()))?;
        }
        // Write to a sibling temp file first so an interrupted write can never
        // truncate the real collection.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| StoreError::Persistence(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::Persistence(e.to_string()))?;
        Ok(())
    }
}
