//! Conversion plan types and settings validation
//!
//! Describes what a conversion *would* produce without synthesizing data or
//! writing a collection. Used for pre-flight checks and CI previews.

use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::Settings;

// ── Plan types ──

/// Complete conversion plan: ordered routes, grouping conflicts and checks.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConversionPlan {
    /// Document title
    pub title: String,
    /// Routes in the order they will appear in the collection
    pub routes: Vec<PlannedRoute>,
    /// Resource groups that merged unrelated paths
    pub conflicts: Vec<ResourceConflict>,
    /// Settings / document / test-config validation results
    pub validations: Vec<Validation>,
}

/// Plan for a single route.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlannedRoute {
    /// Route label, e.g. "POST /pets"
    pub operation: String,
    pub method: String,
    pub path: String,
    /// Guessed resource name used for ordering
    pub resource: String,
    /// Required parameter names
    pub required_parameters: Vec<String>,
    /// Request body property names
    pub body_properties: Vec<String>,
    /// Status whose assertions will be generated
    pub expected_status: Option<String>,
    /// A test-config entry applies to this route
    pub has_test_config: bool,
    /// Globals this route promotes from its response
    pub promotions: Vec<String>,
}

/// Routes with different paths that were grouped under one resource name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResourceConflict {
    pub resource: String,
    /// Distinct path prefixes that guessed this name
    pub bases: Vec<String>,
    /// Route labels in the merged group
    pub routes: Vec<String>,
}

/// A validation check result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Validation {
    pub check: String,
    pub status: ValidationStatus,
    pub message: String,
}

impl Validation {
    #[must_use]
    pub fn ok(check: &str, message: impl Into<String>) -> Self {
        Self::new(check, ValidationStatus::Ok, message)
    }

    #[must_use]
    pub fn warning(check: &str, message: impl Into<String>) -> Self {
        Self::new(check, ValidationStatus::Warning, message)
    }

    #[must_use]
    pub fn error(check: &str, message: impl Into<String>) -> Self {
        Self::new(check, ValidationStatus::Error, message)
    }

    fn new(check: &str, status: ValidationStatus, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            status,
            message: message.into(),
        }
    }
}

/// Status of a validation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Ok,
    Warning,
    Error,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

// ── Settings validation ──

/// Validate settings that can be checked without loading the document.
#[must_use]
pub fn validate_settings(settings: &Settings) -> Vec<Validation> {
    let mut checks = Vec::new();

    if settings.spec_is_remote() {
        checks.push(Validation::ok(
            "spec",
            format!("spec: {} (remote)", settings.spec),
        ));
    } else if Path::new(&settings.spec).exists() {
        checks.push(Validation::ok(
            "spec",
            format!("spec: {} (exists)", settings.spec),
        ));
    } else {
        checks.push(Validation::error(
            "spec",
            format!("spec: {} (not found)", settings.spec),
        ));
    }

    match &settings.test_config {
        None => checks.push(Validation::ok("test_config", "test_config: none")),
        Some(path) if path.exists() => checks.push(Validation::ok(
            "test_config",
            format!("test_config: {} (exists)", path.display()),
        )),
        Some(path) => checks.push(Validation::error(
            "test_config",
            format!("test_config: {} (not found)", path.display()),
        )),
    }

    match settings.host.as_deref() {
        None => checks.push(Validation::warning(
            "host",
            "host: not set (baseUrl defaults to \"/\")",
        )),
        Some(host) if host.starts_with("http://") || host.starts_with("https://") => {
            checks.push(Validation::ok("host", format!("host: {host}")));
        }
        Some(host) => checks.push(Validation::warning(
            "host",
            format!("host: {host} (missing http:// or https:// prefix)"),
        )),
    }

    checks
}

// ── Display helpers ──

impl ConversionPlan {
    /// Format as human-readable terminal output.
    #[must_use]
    pub fn to_terminal(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "Plan: {} ({} routes)\n",
            self.title,
            self.routes.len()
        ));

        for route in &self.routes {
            let expected = route.expected_status.as_deref().unwrap_or("none");
            lines.push(format!(
                "{} [resource: {}, expect: {}]",
                route.operation, route.resource, expected
            ));
            if !route.required_parameters.is_empty() {
                lines.push(format!(
                    "  Required parameters: {}",
                    route.required_parameters.join(", ")
                ));
            }
            if !route.body_properties.is_empty() {
                lines.push(format!(
                    "  Body properties: {}",
                    route.body_properties.join(", ")
                ));
            }
            if route.has_test_config {
                lines.push("  Test config: yes".into());
            }
            if !route.promotions.is_empty() {
                lines.push(format!("  Promotes: {}", route.promotions.join(", ")));
            }
        }
        lines.push(String::new());

        if !self.conflicts.is_empty() {
            lines.push("Resource conflicts:".into());
            for c in &self.conflicts {
                lines.push(format!(
                    "  {}: {} ({})",
                    c.resource,
                    c.bases.join(" | "),
                    c.routes.join(", ")
                ));
            }
            lines.push(String::new());
        }

        lines.push("Validation:".into());
        for v in &self.validations {
            lines.push(format!("  [{}] {}", v.status, v.message));
        }

        lines.join("\n")
    }

    /// Returns true if any validation has Error status.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.validations
            .iter()
            .any(|v| v.status == ValidationStatus::Error)
    }

    /// Returns true if any validation has Warning status.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.validations
            .iter()
            .any(|v| v.status == ValidationStatus::Warning)
    }
}
