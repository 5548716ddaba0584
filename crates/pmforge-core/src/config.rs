//! Project settings and per-route test configuration

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::status::StatusKey;

/// Project settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// OpenAPI document: local path or http(s) URL
    pub spec: String,

    /// Test configuration file (yaml, json or toml)
    #[serde(default)]
    pub test_config: Option<PathBuf>,

    /// Host placed in the `baseUrl` collection variable
    #[serde(default)]
    pub host: Option<String>,

    /// Where `convert` writes the collection
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Turn ambiguity and over-depth conditions into hard failures
    #[serde(default = "default_true")]
    pub strict: bool,

    /// Log builder diagnostics at info instead of debug
    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub synthesis: SynthesisSettings,

    #[serde(default)]
    pub resolver: ResolverSettings,
}

/// Test data synthesis knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisSettings {
    /// Minimum length imposed on string leaves without `minLength` or `format`
    #[serde(default = "default_str_min_length")]
    pub str_min_length: usize,

    /// Minimum imposed on integer leaves without `minimum`
    #[serde(default = "default_int_min")]
    pub int_min: i64,

    /// Batches regenerated before giving up on a leaf
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Candidates drawn per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub pick: PickStrategy,

    /// Fixed seed for reproducible output
    #[serde(default)]
    pub seed: Option<u64>,
}

/// How one value is chosen from a generated batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickStrategy {
    #[default]
    First,
    Random,
}

/// Reference resolution knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Times one reference may re-enter its own resolution chain
    #[serde(default = "default_max_ref_depth")]
    pub max_ref_depth: usize,

    /// Memoized resolutions kept per resolver
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_true() -> bool {
    true
}
fn default_output() -> PathBuf {
    PathBuf::from("collection.json")
}
fn default_str_min_length() -> usize {
    1
}
fn default_int_min() -> i64 {
    1
}
fn default_retries() -> u32 {
    5
}
fn default_batch_size() -> usize {
    20
}
fn default_max_ref_depth() -> usize {
    5
}
fn default_cache_capacity() -> usize {
    1024
}
fn default_response_time() -> u64 {
    200
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            str_min_length: default_str_min_length(),
            int_min: default_int_min(),
            retries: default_retries(),
            batch_size: default_batch_size(),
            pick: PickStrategy::First,
            seed: None,
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_ref_depth: default_max_ref_depth(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            spec: "openapi.yaml".to_string(),
            test_config: None,
            host: None,
            output: default_output(),
            strict: true,
            verbose: false,
            synthesis: SynthesisSettings::default(),
            resolver: ResolverSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    /// Load from default location (.pmforge.toml)
    ///
    /// # Errors
    ///
    /// Returns error if a candidate file exists but cannot be parsed
    pub fn load_default() -> Result<Self, ConfigError> {
        let candidates = [".pmforge.toml", ".pmforge.json", "pmforge.toml"];

        for name in candidates {
            let path = Path::new(name);
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Whether `spec` points at a remote document.
    #[must_use]
    pub fn spec_is_remote(&self) -> bool {
        self.spec.starts_with("http://") || self.spec.starts_with("https://")
    }

    /// Template written by `pmforge init`
    #[must_use]
    pub fn example() -> &'static str {
        r#"# pmforge configuration

# OpenAPI document (local file or http(s) URL)
spec = "openapi.yaml"

# Per-route variables, expectations and scripts (yaml, json or toml)
# test_config = "test_config.yaml"

# Value of the {{baseUrl}} collection variable
host = "http://localhost:8080"

# Where the collection is written
output = "collection.json"

# Fail on ambiguous path variables and runaway references
strict = true

[synthesis]
str_min_length = 1
int_min = 1
retries = 5
batch_size = 20
# "first" or "random"
pick = "first"
# seed = 42

[resolver]
max_ref_depth = 5
cache_capacity = 1024
"#
    }
}

// ── Test configuration ──

/// Per-route overrides keyed by `"VERB /path"`, plus an optional
/// `"Collection"` entry for collection-wide settings.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    pub entries: IndexMap<String, TestConfigEntry>,
    /// Directory that relative variable files are resolved against
    pub base_dir: Option<PathBuf>,
}

/// Key of the collection-wide entry
pub const COLLECTION_KEY: &str = "Collection";

/// Canonical key for a route, e.g. `"POST /pets"`.
#[must_use]
pub fn route_key(verb: &str, path: &str) -> String {
    format!("{} {}", verb.to_uppercase(), path)
}

impl TestConfig {
    /// Load a test configuration; format follows the file extension.
    ///
    /// # Errors
    ///
    /// Returns error on unknown extension, unreadable file or invalid content
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let value = load_structured_file(path)?;
        let mut config = Self::from_value(value)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Build from an already parsed mapping.
    ///
    /// # Errors
    ///
    /// Returns error if an entry does not match the expected shape
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let entries: IndexMap<String, TestConfigEntry> =
            serde_json::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(Self {
            entries,
            base_dir: None,
        })
    }

    /// The collection-wide entry, if any.
    #[must_use]
    pub fn collection(&self) -> Option<&TestConfigEntry> {
        self.entries
            .iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(COLLECTION_KEY))
            .map(|(_, v)| v)
    }

    /// Entry for a route; the verb matches case-insensitively.
    #[must_use]
    pub fn for_route(&self, verb: &str, path: &str) -> Option<&TestConfigEntry> {
        self.entries
            .iter()
            .find(|(k, _)| key_matches(k, verb, path))
            .map(|(_, v)| v)
    }

    /// Keys of route entries (everything except the collection entry).
    pub fn route_keys(&self) -> impl Iterator<Item = &str> {
        self.entries
            .keys()
            .map(String::as_str)
            .filter(|k| !k.trim().eq_ignore_ascii_case(COLLECTION_KEY))
    }

    /// Resolve an entry's variables, loading them from file when needed.
    ///
    /// # Errors
    ///
    /// Returns error if a referenced variables file cannot be loaded
    pub fn variables_of(&self, entry: &TestConfigEntry) -> Result<IndexMap<String, Value>, ConfigError> {
        match &entry.variables {
            None => Ok(IndexMap::new()),
            Some(vars) => vars.load(self.base_dir.as_deref()),
        }
    }
}

/// Whether a `"VERB /path"` key names the route; the verb is case-insensitive.
#[must_use]
pub fn key_matches(key: &str, verb: &str, path: &str) -> bool {
    key.trim()
        .split_once(char::is_whitespace)
        .is_some_and(|(v, p)| v.eq_ignore_ascii_case(verb) && p.trim() == path)
}

/// Configuration for one route (or the whole collection).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestConfigEntry {
    /// Literal values, or a path to a file holding them
    #[serde(default)]
    pub variables: Option<Variables>,

    #[serde(default)]
    pub expect: Option<Expect>,

    /// Global variable name → response field path (`.data.id`)
    #[serde(default)]
    pub make_global: IndexMap<String, String>,

    /// Extra post-response scripts
    #[serde(default)]
    pub test: Vec<String>,

    /// Extra pre-request scripts
    #[serde(default)]
    pub prerequest: Vec<String>,

    /// Request headers added verbatim
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

/// Variable values: inline, or loaded from a structured file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Variables {
    Inline(IndexMap<String, Value>),
    File(PathBuf),
}

impl Variables {
    /// Materialize the values.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be loaded or is not a mapping
    pub fn load(&self, base_dir: Option<&Path>) -> Result<IndexMap<String, Value>, ConfigError> {
        match self {
            Self::Inline(map) => Ok(map.clone()),
            Self::File(path) => {
                let full = match base_dir {
                    Some(dir) if path.is_relative() => dir.join(path),
                    _ => path.clone(),
                };
                match load_structured_file(&full)? {
                    Value::Object(obj) => Ok(obj.into_iter().collect()),
                    Value::Null => Ok(IndexMap::new()),
                    _ => Err(ConfigError::Parse(format!(
                        "{}: variables file must hold a mapping",
                        full.display()
                    ))),
                }
            }
        }
    }
}

/// Which response is expected, and which checks to generate for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expect {
    /// Expected status; defaults to the first 2xx response
    #[serde(default)]
    pub code: Option<StatusKey>,

    /// Generate assertions for this route at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Response-time ceiling in milliseconds
    #[serde(default = "default_response_time")]
    pub response_time: u64,

    /// Expected response headers (name → exact value)
    #[serde(default)]
    pub headers: IndexMap<String, String>,

    /// Assertion kinds to emit
    #[serde(default = "AssertionKind::all")]
    pub assertions: Vec<AssertionKind>,

    /// Synthesize missing parameter values
    #[serde(default = "default_true")]
    pub fake_data: bool,
}

impl Default for Expect {
    fn default() -> Self {
        Self {
            code: None,
            enabled: true,
            response_time: default_response_time(),
            headers: IndexMap::new(),
            assertions: AssertionKind::all(),
            fake_data: true,
        }
    }
}

impl Expect {
    #[must_use]
    pub fn asserts(&self, kind: AssertionKind) -> bool {
        self.assertions.contains(&kind)
    }
}

/// Kind of generated response assertion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionKind {
    Status,
    ContentType,
    ResponseTime,
    Schema,
}

impl AssertionKind {
    #[must_use]
    pub fn all() -> Vec<Self> {
        vec![
            Self::Status,
            Self::ContentType,
            Self::ResponseTime,
            Self::Schema,
        ]
    }
}

/// Parse a yaml, json or toml file into a JSON value.
///
/// # Errors
///
/// Returns error on unknown extension, unreadable file or invalid content
pub fn load_structured_file(path: &Path) -> Result<Value, ConfigError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !matches!(ext.as_str(), "json" | "yaml" | "yml" | "toml") {
        return Err(ConfigError::UnknownFileType(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

    match ext.as_str() {
        "json" => serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string())),
        "toml" => toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string())),
        _ => serde_yml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string())),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Unknown file type: {0} (expected .json, .yaml, .yml or .toml)")]
    UnknownFileType(PathBuf),
}
