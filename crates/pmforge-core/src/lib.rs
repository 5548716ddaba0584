//! pmforge-core: shared types for OpenAPI → Postman collection conversion
//!
//! This crate holds the project settings and test configuration, the output
//! collection model, status-code helpers, content fingerprints and the
//! conversion plan types. The conversion itself lives in `pmforge-engine`.

pub mod collection;
pub mod config;
pub mod fingerprint;
pub mod plan;
pub mod status;

pub use collection::{Collection, Event, Item, Listen, Script};
pub use config::{
    AssertionKind, ConfigError, Expect, PickStrategy, Settings, TestConfig, TestConfigEntry,
};
pub use fingerprint::{fingerprint_str, fingerprint_value, stable_id};
pub use plan::{ConversionPlan, PlannedRoute, ResourceConflict, Validation, ValidationStatus};
pub use status::StatusKey;
