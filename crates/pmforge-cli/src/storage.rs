//! Persistent collection storage: `~/.pmforge/collections/`
//!
//! Collections are addressed by the fingerprint of their JSON form, so
//! saving the same collection twice yields the same id and one file.

use std::path::{Path, PathBuf};

use pmforge_core::{Collection, fingerprint_value};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HOME is not set; cannot locate the collection store")]
    NoHome,

    #[error("Invalid collection id: {0}")]
    InvalidId(String),

    #[error("No stored collection matches {0}")]
    NotFound(String),

    #[error("Collection id {prefix} is ambiguous ({count} matches)")]
    Ambiguous { prefix: String, count: usize },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored collection is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Saves and loads collections by content address.
pub trait CollectionStore {
    /// Persist `collection`, returning its id
    fn save(&self, collection: &Collection) -> Result<String, StoreError>;

    /// Load the collection stored under `id` (a full id or a unique prefix)
    fn load(&self, id: &str) -> Result<Collection, StoreError>;
}

/// One JSON file per collection, named `<fingerprint>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store under `~/.pmforge/collections`
    pub fn default_location() -> Result<Self, StoreError> {
        let home = std::env::var_os("HOME").ok_or(StoreError::NoHome)?;
        Ok(Self::new(
            PathBuf::from(home).join(".pmforge").join("collections"),
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    /// Expand a unique id prefix to the full stored id.
    fn resolve(&self, prefix: &str) -> Result<String, StoreError> {
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidId(prefix.to_string()));
        }
        if self.path_of(prefix).exists() {
            return Ok(prefix.to_string());
        }

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(prefix.to_string()));
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let matches: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let id = name.strip_suffix(".json")?;
                id.starts_with(prefix).then(|| id.to_string())
            })
            .collect();

        match matches.as_slice() {
            [] => Err(StoreError::NotFound(prefix.to_string())),
            [only] => Ok(only.clone()),
            many => Err(StoreError::Ambiguous {
                prefix: prefix.to_string(),
                count: many.len(),
            }),
        }
    }
}

impl CollectionStore for FileStore {
    fn save(&self, collection: &Collection) -> Result<String, StoreError> {
        let value = serde_json::to_value(collection)?;
        let id = fingerprint_value(&value);
        let path = self.path_of(&id);

        std::fs::create_dir_all(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;
        let content = serde_json::to_string_pretty(&value)?;
        std::fs::write(&path, content).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(id = %id, path = %path.display(), "collection stored");
        Ok(id)
    }

    fn load(&self, id: &str) -> Result<Collection, StoreError> {
        let id = self.resolve(id)?;
        let path = self.path_of(&id);
        let content = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}
