//! Operation parameters and request bodies, resolved and typed

use std::fmt;

use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::document::SchemaDocument;
use crate::error::ConvertError;
use crate::resolver::{ResolveScope, Resolver};
use crate::routes::Route;

/// Where a parameter travels.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
    /// Swagger 2 style body parameter
    Body,
    Other(String),
}

impl ParamLocation {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "path" => Self::Path,
            "query" => Self::Query,
            "header" => Self::Header,
            "cookie" => Self::Cookie,
            "body" => Self::Body,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path => f.write_str("path"),
            Self::Query => f.write_str("query"),
            Self::Header => f.write_str("header"),
            Self::Cookie => f.write_str("cookie"),
            Self::Body => f.write_str("body"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// A declared parameter with its schema resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    /// Resolved schema; may still hold references in lenient mode
    pub schema: Value,
    /// Declared examples: `example`, `examples`, then `schema.example`
    pub examples: Vec<Value>,
    pub description: Option<String>,
}

impl Parameter {
    fn from_value(value: &Value, schema: Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?.to_string();
        let location = ParamLocation::parse(value.get("in")?.as_str()?);
        let required = value
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut examples = Vec::new();
        if let Some(example) = value.get("example") {
            examples.push(example.clone());
        }
        match value.get("examples") {
            Some(Value::Array(items)) => examples.extend(items.iter().cloned()),
            Some(Value::Object(named)) => {
                examples.extend(named.values().filter_map(|e| e.get("value")).cloned());
            }
            _ => {}
        }
        if let Some(example) = schema.get("example") {
            examples.push(example.clone());
        }

        Some(Self {
            name,
            location,
            required,
            schema,
            examples,
            description: value
                .get("description")
                .and_then(Value::as_str)
                .map(String::from),
        })
    }

    /// Property schemas of a body parameter.
    #[must_use]
    pub fn body_properties(&self) -> IndexMap<String, Option<Value>> {
        properties_of(&self.schema)
    }
}

/// Declared request body.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestBodySpec {
    pub required: bool,
    pub media_types: Vec<MediaTypeSpec>,
}

/// One media type of a request body.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaTypeSpec {
    pub media_type: String,
    /// Property name → resolved schema (`None` when unresolvable)
    pub properties: IndexMap<String, Option<Value>>,
    /// Whole-body example, if declared
    pub example: Option<Value>,
}

impl RequestBodySpec {
    /// The media type used for the request: first JSON-like, else first.
    #[must_use]
    pub fn primary(&self) -> Option<&MediaTypeSpec> {
        self.media_types
            .iter()
            .find(|m| m.media_type.contains("json"))
            .or_else(|| self.media_types.first())
    }
}

/// Everything the builder and synthesizer need from one operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationSpec {
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBodySpec>,
}

impl OperationSpec {
    /// Collect path-level and operation-level parameters (operation wins on
    /// the same name and location) and the request body, resolving
    /// references along the way.
    ///
    /// # Errors
    ///
    /// Returns resolution errors, and `MaxDepth` in strict mode
    pub fn collect(
        route: &Route<'_>,
        resolver: &mut Resolver,
        document: &SchemaDocument,
        scope: &mut ResolveScope,
        strict: bool,
    ) -> Result<Self, ConvertError> {
        let mut parameters: Vec<Parameter> = Vec::new();
        for source in [route.path_item, route.operation] {
            let Some(declared) = source.get("parameters").and_then(Value::as_array) else {
                continue;
            };
            for node in declared {
                let Some(resolved) = resolver.resolve_object(node, document, scope, strict, false)?
                else {
                    warn!(route = %route.label(), "skipping parameter with unresolvable reference");
                    continue;
                };
                let raw_schema = resolved.get("schema").cloned().unwrap_or(json!({"type": "string"}));
                let schema = resolver
                    .resolve_object(&raw_schema, document, scope, strict, true)?
                    .unwrap_or(raw_schema);
                let Some(param) = Parameter::from_value(&resolved, schema) else {
                    warn!(route = %route.label(), "skipping parameter without name or location");
                    continue;
                };
                parameters.retain(|p| !(p.name == param.name && p.location == param.location));
                parameters.push(param);
            }
        }

        let request_body = match route.operation.get("requestBody") {
            None => None,
            Some(node) => match resolver.resolve_object(node, document, scope, strict, false)? {
                None => None,
                Some(body) => Some(request_body_spec(&body, resolver, document, scope, strict)?),
            },
        };

        Ok(Self {
            parameters,
            request_body,
        })
    }

    /// Required parameters in declaration order.
    pub fn required(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.required)
    }

    /// First declared example of every parameter and request body property.
    #[must_use]
    pub fn examples(&self) -> LocationValues {
        let mut values = LocationValues::default();
        for param in &self.parameters {
            if let Some(example) = param.examples.first() {
                values.insert(&param.location, &param.name, example.clone());
            }
            if param.location == ParamLocation::Body {
                for (name, schema) in param.body_properties() {
                    if let Some(example) = schema.as_ref().and_then(|s| s.get("example")) {
                        values.insert(&ParamLocation::Body, &name, example.clone());
                    }
                }
            }
        }
        if let Some(body) = &self.request_body {
            for media in &body.media_types {
                if let Some(Value::Object(example)) = &media.example {
                    for (name, value) in example {
                        values.request_body.entry(name.clone()).or_insert_with(|| value.clone());
                    }
                }
                for (name, schema) in &media.properties {
                    if let Some(example) = schema.as_ref().and_then(|s| s.get("example")) {
                        values
                            .request_body
                            .entry(name.clone())
                            .or_insert_with(|| example.clone());
                    }
                }
            }
        }
        values
    }
}

fn request_body_spec(
    body: &Value,
    resolver: &mut Resolver,
    document: &SchemaDocument,
    scope: &mut ResolveScope,
    strict: bool,
) -> Result<RequestBodySpec, ConvertError> {
    let mut media_types = Vec::new();
    if let Some(content) = body.get("content").and_then(Value::as_object) {
        for (media_type, media) in content {
            let raw_schema = media.get("schema").cloned().unwrap_or(Value::Null);
            let schema = resolver
                .resolve_object(&raw_schema, document, scope, strict, false)?
                .unwrap_or(Value::Null);
            let mut properties = IndexMap::new();
            for (name, prop) in properties_of(&schema) {
                let resolved = match prop {
                    Some(p) => resolver.resolve_object(&p, document, scope, strict, true)?,
                    None => None,
                };
                properties.insert(name, resolved);
            }
            media_types.push(MediaTypeSpec {
                media_type: media_type.clone(),
                properties,
                example: media.get("example").cloned(),
            });
        }
    }
    Ok(RequestBodySpec {
        required: body.get("required").and_then(Value::as_bool).unwrap_or(false),
        media_types,
    })
}

/// `properties` of an object schema (including `allOf` members).
fn properties_of(schema: &Value) -> IndexMap<String, Option<Value>> {
    let mut out = IndexMap::new();
    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop) in props {
            out.insert(name.clone(), Some(prop.clone()));
        }
    }
    if let Some(all_of) = schema.get("allOf").and_then(Value::as_array) {
        for member in all_of {
            for (name, prop) in properties_of(member) {
                out.entry(name).or_insert(prop);
            }
        }
    }
    out
}

// ── Values by location ──

/// Parameter values grouped by where they travel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationValues {
    pub path: IndexMap<String, Value>,
    pub query: IndexMap<String, Value>,
    pub header: IndexMap<String, Value>,
    pub cookie: IndexMap<String, Value>,
    pub body: IndexMap<String, Value>,
    /// Request body properties
    pub request_body: IndexMap<String, Value>,
}

impl LocationValues {
    /// The same values offered for every location and the request body.
    #[must_use]
    pub fn uniform(values: &IndexMap<String, Value>) -> Self {
        Self {
            path: values.clone(),
            query: values.clone(),
            header: values.clone(),
            cookie: values.clone(),
            body: values.clone(),
            request_body: values.clone(),
        }
    }

    #[must_use]
    pub fn section(&self, location: &ParamLocation) -> Option<&IndexMap<String, Value>> {
        match location {
            ParamLocation::Path => Some(&self.path),
            ParamLocation::Query => Some(&self.query),
            ParamLocation::Header => Some(&self.header),
            ParamLocation::Cookie => Some(&self.cookie),
            ParamLocation::Body => Some(&self.body),
            ParamLocation::Other(_) => None,
        }
    }

    pub fn insert(&mut self, location: &ParamLocation, name: &str, value: Value) {
        let section = match location {
            ParamLocation::Path => &mut self.path,
            ParamLocation::Query => &mut self.query,
            ParamLocation::Header => &mut self.header,
            ParamLocation::Cookie => &mut self.cookie,
            ParamLocation::Body => &mut self.body,
            ParamLocation::Other(_) => return,
        };
        section.insert(name.to_string(), value);
    }

    #[must_use]
    pub fn get(&self, location: &ParamLocation, name: &str) -> Option<&Value> {
        self.section(location).and_then(|s| s.get(name))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
            && self.query.is_empty()
            && self.header.is_empty()
            && self.cookie.is_empty()
            && self.body.is_empty()
            && self.request_body.is_empty()
    }
}

/// Collapse a value map into a JSON object.
#[must_use]
pub fn to_object(values: &IndexMap<String, Value>) -> Value {
    Value::Object(values.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Map<_, _>>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::enumerate_routes;
    use pmforge_core::config::ResolverSettings;

    fn document() -> SchemaDocument {
        SchemaDocument::from_value(json!({
            "paths": {
                "/pets/{petId}": {
                    "parameters": [
                        {"name": "petId", "in": "path", "required": true, "schema": {"type": "string"}},
                        {"$ref": "#/components/parameters/Trace"}
                    ],
                    "put": {
                        "parameters": [
                            {"name": "petId", "in": "path", "required": true,
                             "schema": {"$ref": "#/components/schemas/Id"}, "example": "1"},
                            {"name": "limit", "in": "query", "schema": {"type": "integer"},
                             "examples": {"small": {"value": 5}}}
                        ],
                        "requestBody": {"$ref": "#/components/requestBodies/Pet"}
                    }
                }
            },
            "components": {
                "schemas": {
                    "Id": {"type": "integer", "example": 7},
                    "Pet": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string", "example": "doggie"},
                            "tag": {"$ref": "#/components/schemas/Tag"}
                        }
                    },
                    "Tag": {"type": "string"}
                },
                "parameters": {
                    "Trace": {"name": "X-Trace", "in": "header", "required": true, "schema": {"type": "string"}}
                },
                "requestBodies": {
                    "Pet": {
                        "required": true,
                        "content": {
                            "text/plain": {"schema": {"type": "string"}},
                            "application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}
                        }
                    }
                }
            }
        }))
    }

    fn collect(doc: &SchemaDocument) -> OperationSpec {
        let mut resolver = Resolver::new(&ResolverSettings::default());
        let mut scope = resolver.scope();
        let routes = enumerate_routes(doc.value());
        OperationSpec::collect(&routes[0], &mut resolver, doc, &mut scope, true).unwrap()
    }

    #[test]
    fn operation_parameters_override_path_level() {
        let doc = document();
        let spec = collect(&doc);
        let names: Vec<(&str, String)> = spec
            .parameters
            .iter()
            .map(|p| (p.name.as_str(), p.location.to_string()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("X-Trace", "header".to_string()),
                ("petId", "path".to_string()),
                ("limit", "query".to_string()),
            ]
        );
        let pet_id = &spec.parameters[1];
        assert_eq!(pet_id.schema, json!({"type": "integer", "example": 7}));
        assert_eq!(pet_id.examples, vec![json!("1"), json!(7)]);
        assert_eq!(spec.required().count(), 2);
    }

    #[test]
    fn named_examples_are_collected() {
        let doc = document();
        let spec = collect(&doc);
        assert_eq!(spec.parameters[2].examples, vec![json!(5)]);
    }

    #[test]
    fn request_body_properties_are_resolved() {
        let doc = document();
        let spec = collect(&doc);
        let body = spec.request_body.as_ref().unwrap();
        assert!(body.required);
        let primary = body.primary().unwrap();
        assert_eq!(primary.media_type, "application/json");
        assert_eq!(
            primary.properties.get("tag"),
            Some(&Some(json!({"type": "string"})))
        );
    }

    #[test]
    fn examples_by_location() {
        let doc = document();
        let examples = collect(&doc).examples();
        assert_eq!(examples.get(&ParamLocation::Path, "petId"), Some(&json!("1")));
        assert_eq!(examples.get(&ParamLocation::Query, "limit"), Some(&json!(5)));
        assert_eq!(examples.request_body.get("name"), Some(&json!("doggie")));
        assert!(examples.get(&ParamLocation::Header, "X-Trace").is_none());
    }

    #[test]
    fn uniform_values_cover_every_location() {
        let mut vars = IndexMap::new();
        vars.insert("id".to_string(), json!(3));
        let values = LocationValues::uniform(&vars);
        for loc in [ParamLocation::Path, ParamLocation::Query, ParamLocation::Header, ParamLocation::Body] {
            assert_eq!(values.get(&loc, "id"), Some(&json!(3)));
        }
        assert_eq!(values.request_body.get("id"), Some(&json!(3)));
        assert!(values.get(&ParamLocation::Other("formData".into()), "id").is_none());
    }

    #[test]
    fn location_parsing() {
        assert_eq!(ParamLocation::parse("cookie"), ParamLocation::Cookie);
        assert_eq!(
            ParamLocation::parse("formData"),
            ParamLocation::Other("formData".into())
        );
    }
}
