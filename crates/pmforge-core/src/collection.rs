//! Output collection model (Postman collection format v2.1)
//!
//! These types mirror the subset of the collection format the converter
//! emits. Field names follow the format's JSON exactly, so a generated
//! collection can be imported or run without post-processing.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema identifier placed in `info.schema`.
pub const COLLECTION_SCHEMA_URL: &str =
    "https://schema.getpostman.com/json/collection/v2.1.0/collection.json";

/// Name of the collection variable holding the target host.
pub const BASE_URL_VARIABLE: &str = "baseUrl";

/// A complete request collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Collection {
    pub info: Info,
    /// Requests in execution order
    pub item: Vec<Item>,
    /// Collection-level scripts
    #[serde(default)]
    pub event: Vec<Event>,
    /// Global variable pool (`baseUrl` first)
    #[serde(default)]
    pub variable: Vec<Variable>,
}

impl Collection {
    /// Look up a collection variable by key.
    #[must_use]
    pub fn variable(&self, key: &str) -> Option<&Variable> {
        self.variable.iter().find(|v| v.key == key)
    }

    /// Look up an item by name.
    #[must_use]
    pub fn item(&self, name: &str) -> Option<&Item> {
        self.item.iter().find(|i| i.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Info {
    #[serde(rename = "_postman_id")]
    pub postman_id: String,
    pub name: String,
    pub schema: String,
    pub description: Description,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Description {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Description {
    #[must_use]
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: "text/plain".to_string(),
        }
    }
}

/// Collection-wide variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Variable {
    pub id: String,
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Variable {
    #[must_use]
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            id: key.clone(),
            key,
            value: value.into(),
            kind: "string".to_string(),
        }
    }
}

/// One request in the collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub request: Request,
    /// Example responses taken from the source document
    #[serde(default)]
    pub response: Vec<ResponseTemplate>,
    #[serde(default)]
    pub event: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Request {
    pub name: String,
    pub method: String,
    pub url: Url,
    pub auth: Auth,
    #[serde(default)]
    pub header: Vec<Header>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<RequestBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Description>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Url {
    /// Always `["{{baseUrl}}"]`
    pub host: Vec<String>,
    /// Path tokens: literals, `:name` and `{{name}}` markers
    pub path: Vec<String>,
    #[serde(default)]
    pub query: Vec<Parameter>,
    /// Values for `:name` path tokens
    #[serde(default)]
    pub variable: Vec<Parameter>,
}

impl Url {
    /// Render as `{{baseUrl}}/a/:b?x=1` for display.
    #[must_use]
    pub fn raw(&self) -> String {
        let mut raw = self.host.join(".");
        for segment in &self.path {
            raw.push('/');
            raw.push_str(segment);
        }
        let query: Vec<String> = self
            .query
            .iter()
            .filter(|q| !q.disabled)
            .map(|q| format!("{}={}", q.key, value_text(&q.value)))
            .collect();
        if !query.is_empty() {
            raw.push('?');
            raw.push_str(&query.join("&"));
        }
        raw
    }

    /// Value of a path variable.
    #[must_use]
    pub fn path_variable(&self, key: &str) -> Option<&Value> {
        self.variable.iter().find(|v| v.key == key).map(|v| &v.value)
    }
}

/// Key/value pair used for query parameters and URL variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Parameter {
    pub key: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Parameter {
    #[must_use]
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            disabled: false,
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Header {
    pub key: String,
    pub value: String,
}

impl Header {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RequestBody {
    pub mode: String,
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<BodyOptions>,
}

impl RequestBody {
    /// Raw JSON body.
    #[must_use]
    pub fn json(payload: &Value) -> Self {
        Self {
            mode: "raw".to_string(),
            raw: payload.to_string(),
            options: Some(BodyOptions {
                raw: RawOptions {
                    language: "json".to_string(),
                },
            }),
        }
    }

    /// Parsed payload, when the raw text is JSON.
    #[must_use]
    pub fn payload(&self) -> Option<Value> {
        serde_json::from_str(&self.raw).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BodyOptions {
    pub raw: RawOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawOptions {
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Auth {
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for Auth {
    fn default() -> Self {
        Self {
            kind: "noauth".to_string(),
        }
    }
}

/// Example response attached to an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResponseTemplate {
    pub id: String,
    pub name: String,
    #[serde(rename = "originalRequest")]
    pub original_request: OriginalRequest,
    /// Reason phrase
    pub status: String,
    pub code: u16,
    #[serde(default)]
    pub header: Vec<Header>,
    #[serde(default)]
    pub cookie: Vec<Value>,
    pub body: String,
    #[serde(
        rename = "_postman_previewlanguage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub preview_language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OriginalRequest {
    pub method: String,
    pub url: Url,
    #[serde(default)]
    pub body: Value,
}

/// Script hook on an item or the collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Event {
    pub id: String,
    pub listen: Listen,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
    pub script: Script,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Listen {
    /// Runs after the response arrives
    Test,
    /// Runs before the request is sent
    Prerequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Script {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Source lines
    pub exec: Vec<String>,
}

impl Script {
    /// JavaScript source as a single string.
    #[must_use]
    pub fn source(&self) -> String {
        self.exec.join("\n")
    }
}

impl Item {
    /// Scripts attached for `listen`, if any.
    #[must_use]
    pub fn script(&self, listen: Listen) -> Option<&Script> {
        self.event
            .iter()
            .find(|e| e.listen == listen)
            .map(|e| &e.script)
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Generate JSON Schema for the collection format as a pretty-printed string.
#[must_use]
pub fn generate_schema() -> String {
    let schema = schemars::schema_for!(Collection);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
