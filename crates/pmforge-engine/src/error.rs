use std::path::PathBuf;

use pmforge_core::ConfigError;

/// Conversion failure.
///
/// `Ambiguous` and `MaxDepth` are only raised in strict mode; lenient
/// conversions log them and continue with a partial result. Every other
/// variant is fatal regardless of mode.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown file type: {} (expected .json, .yaml or .yml)", .0.display())]
    UnknownFileType(PathBuf),

    #[error("{route}: parameter '{name}' has unsupported location '{location}'")]
    UnsupportedLocation {
        route: String,
        name: String,
        location: String,
    },

    #[error("{route}: path segment variable '{name}' is not mapped to a value")]
    UnmappedVariable { route: String, name: String },

    #[error("Cannot resolve {reference}: {reason}")]
    Resolution { reference: String, reason: String },

    #[error("Max reference depth {depth} reached for {reference}")]
    MaxDepth { reference: String, depth: usize },

    #[error("Fetching {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("{route}: path parameter '{name}' is not in the path and cannot be placed (unassigned: {candidates:?})")]
    Ambiguous {
        route: String,
        name: String,
        candidates: Vec<String>,
    },

    #[error("No value satisfies {schema} after {attempts} attempts")]
    Unsatisfiable { schema: String, attempts: u32 },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<ConfigError> for ConvertError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Io(path, reason) => Self::Io(format!("{}: {reason}", path.display())),
            ConfigError::Parse(reason) => Self::Parse(reason),
            ConfigError::UnknownFileType(path) => Self::UnknownFileType(path),
        }
    }
}
