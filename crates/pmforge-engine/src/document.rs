//! Source document loading

use std::path::Path;

use pmforge_core::fingerprint_value;
use serde_json::Value;

use crate::error::ConvertError;
use crate::fetch::Fetcher;

/// A loaded OpenAPI document and its content fingerprint.
///
/// The value is never mutated after loading; references are resolved on
/// demand by the resolver.
#[derive(Debug, Clone)]
pub struct SchemaDocument {
    value: Value,
    fingerprint: String,
}

impl SchemaDocument {
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let fingerprint = fingerprint_value(&value);
        Self { value, fingerprint }
    }

    /// Load from a local `.json`, `.yaml` or `.yml` file.
    ///
    /// # Errors
    ///
    /// Returns error on unknown extension, unreadable file or invalid content
    pub fn load(path: &Path) -> Result<Self, ConvertError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !matches!(ext.as_str(), "json" | "yaml" | "yml") {
            return Err(ConvertError::UnknownFileType(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConvertError::Io(format!("{}: {e}", path.display())))?;
        let value = parse_document(Some(&ext), &content)?;
        Self::checked(value)
    }

    /// Fetch from a remote URL.
    ///
    /// # Errors
    ///
    /// Returns error if the fetch fails or the body is neither JSON nor YAML
    pub fn fetch(url: &str, fetcher: &dyn Fetcher) -> Result<Self, ConvertError> {
        let content = fetcher.fetch(url)?;
        let value = parse_document(extension_of(url), &content)?;
        Self::checked(value)
    }

    /// Load from a local path or an http(s) URL.
    ///
    /// # Errors
    ///
    /// See [`SchemaDocument::load`] and [`SchemaDocument::fetch`]
    pub fn open(location: &str, fetcher: &dyn Fetcher) -> Result<Self, ConvertError> {
        if is_url(location) {
            Self::fetch(location, fetcher)
        } else {
            Self::load(Path::new(location))
        }
    }

    fn checked(value: Value) -> Result<Self, ConvertError> {
        if !value.is_object() {
            return Err(ConvertError::Parse(
                "document root must be a mapping".into(),
            ));
        }
        Ok(Self::from_value(value))
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    #[must_use]
    pub fn title(&self) -> &str {
        self.info_str("title").unwrap_or("")
    }

    #[must_use]
    pub fn version(&self) -> &str {
        self.info_str("version").unwrap_or("")
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.info_str("description").filter(|d| !d.is_empty())
    }

    /// `"<title> <version>"`
    #[must_use]
    pub fn title_version(&self) -> String {
        format!("{} {}", self.title(), self.version())
    }

    fn info_str(&self, key: &str) -> Option<&str> {
        self.value
            .get("info")
            .and_then(|i| i.get(key))
            .and_then(Value::as_str)
    }
}

pub(crate) fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

pub(crate) fn extension_of(location: &str) -> Option<&str> {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    let file = path.rsplit('/').next().unwrap_or(path);
    file.rsplit_once('.').map(|(_, ext)| ext)
}

/// Parse document text; the extension hint wins, otherwise sniff the content.
///
/// # Errors
///
/// Returns `ConvertError::Parse` for invalid JSON or YAML
pub fn parse_document(ext: Option<&str>, content: &str) -> Result<Value, ConvertError> {
    let ext = ext.map(str::to_ascii_lowercase).unwrap_or_default();

    match ext.as_str() {
        "yaml" | "yml" => serde_yml::from_str(content)
            .map_err(|e| ConvertError::Parse(format!("Invalid YAML: {e}"))),
        "json" => serde_json::from_str(content)
            .map_err(|e| ConvertError::Parse(format!("Invalid JSON: {e}"))),
        _ => {
            // Content sniffing: trimmed first char
            if content.trim_start().starts_with('{') {
                serde_json::from_str(content)
                    .map_err(|e| ConvertError::Parse(format!("Invalid JSON: {e}")))
            } else {
                serde_yml::from_str(content)
                    .map_err(|e| ConvertError::Parse(format!("Invalid YAML: {e}")))
            }
        }
    }
}
