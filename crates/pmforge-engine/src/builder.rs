//! Placement of parameter values into a Postman request
//!
//! Each required parameter is looked up through the provider chain and put
//! where Postman expects it: whole-segment path variables become URL
//! variables, variables embedded in a segment become collection variables
//! (Postman only substitutes `{{name}}` there), query and header values go
//! to the request, and body values become a raw JSON body.

use indexmap::IndexMap;
use pmforge_core::collection::{Header, Parameter as UrlParameter, RequestBody, Variable};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ConvertError;
use crate::params::{OperationSpec, ParamLocation, Parameter, to_object};
use crate::precedence::ProviderChain;
use crate::routes::{Route, segment_variables, url_variables};

const CONTENT_TYPE: &str = "Content-Type";

/// Everything a route contributes to its request and to the collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuiltRequestVariables {
    /// Collection variables for embedded segment variables
    pub globals: Vec<Variable>,
    pub query: Vec<UrlParameter>,
    /// Values for `:name` path tokens, in path order
    pub url_variables: Vec<UrlParameter>,
    pub headers: Vec<Header>,
    pub body: Option<RequestBody>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    pub strict: bool,
    pub verbose: bool,
}

/// Build the request variables of one route.
///
/// `extra_headers` come from the route's test configuration and override
/// headers of the same name.
///
/// # Errors
///
/// - `UnsupportedLocation` for cookie (or unknown) parameters
/// - `UnmappedVariable` for an embedded segment variable without a value
/// - `Ambiguous` in strict mode when a path parameter cannot be placed
pub fn build_request_variables(
    route: &Route<'_>,
    spec: &OperationSpec,
    chain: &ProviderChain<'_>,
    extra_headers: &IndexMap<String, String>,
    options: BuildOptions,
) -> Result<BuiltRequestVariables, ConvertError> {
    let mut builder = Builder {
        label: route.label(),
        tokens: url_variables(route.path),
        segments: segment_variables(route.path),
        chain,
        options,
        out: BuiltRequestVariables::default(),
    };

    let mut body_param = None;
    for param in spec.required() {
        match &param.location {
            ParamLocation::Path => builder.place_path(param)?,
            ParamLocation::Query => builder.place_query(param),
            ParamLocation::Header => builder.place_header(param),
            ParamLocation::Body => body_param = Some(param),
            other => {
                return Err(ConvertError::UnsupportedLocation {
                    route: builder.label.clone(),
                    name: param.name.clone(),
                    location: other.to_string(),
                });
            }
        }
    }
    builder.reconcile();

    match body_param {
        Some(param) => builder.place_body_param(param),
        None => builder.place_request_body(spec),
    }

    for (key, value) in extra_headers {
        builder.set_header(key, value.clone());
    }

    builder.log_diagnostics();
    Ok(builder.out)
}

struct Builder<'c, 'v> {
    label: String,
    /// Whole-segment variables in path order
    tokens: Vec<String>,
    /// Variables embedded in compound segments
    segments: Vec<String>,
    chain: &'c ProviderChain<'v>,
    options: BuildOptions,
    out: BuiltRequestVariables,
}

impl Builder<'_, '_> {
    fn place_path(&mut self, param: &Parameter) -> Result<(), ConvertError> {
        let name = &param.name;
        let mapped = self.chain.lookup(&param.location, name);

        if self.segments.contains(name) {
            let Some(hit) = mapped else {
                return Err(ConvertError::UnmappedVariable {
                    route: self.label.clone(),
                    name: name.clone(),
                });
            };
            debug!(route = %self.label, variable = %name, provider = hit.provider, "segment variable");
            if !self.out.globals.iter().any(|g| &g.key == name) {
                self.out.globals.push(Variable::string(name.clone(), text_of(hit.value)));
            }
            return Ok(());
        }

        if self.tokens.contains(name) {
            match mapped {
                Some(hit) => {
                    debug!(route = %self.label, variable = %name, provider = hit.provider, "path variable");
                    self.push_url_variable(name, hit.value.clone(), param.description.clone());
                }
                None => {
                    debug!(route = %self.label, variable = %name, "no value yet, left for reconciliation");
                }
            }
            return Ok(());
        }

        let unassigned = self.unassigned();
        if let [token] = unassigned.as_slice() {
            let token = token.clone();
            if let Some(hit) = mapped {
                warn!(
                    route = %self.label,
                    parameter = %name,
                    token = %token,
                    "path parameter name does not match the path, using the only unassigned path variable"
                );
                self.push_url_variable(&token, hit.value.clone(), param.description.clone());
            } else if let Some(example) = param.examples.first() {
                warn!(
                    route = %self.label,
                    parameter = %name,
                    token = %token,
                    "path parameter name does not match the path and has no mapped value, using its declared example"
                );
                self.push_url_variable(&token, example.clone(), param.description.clone());
            } else {
                warn!(route = %self.label, parameter = %name, token = %token, "path parameter has no value");
            }
            return Ok(());
        }

        if self.options.strict {
            return Err(ConvertError::Ambiguous {
                route: self.label.clone(),
                name: name.clone(),
                candidates: unassigned,
            });
        }
        warn!(
            route = %self.label,
            parameter = %name,
            candidates = ?unassigned,
            "cannot place path parameter, skipping"
        );
        Ok(())
    }

    fn unassigned(&self) -> Vec<String> {
        self.tokens
            .iter()
            .filter(|t| !self.out.url_variables.iter().any(|v| &v.key == *t))
            .cloned()
            .collect()
    }

    fn push_url_variable(&mut self, key: &str, value: Value, description: Option<String>) {
        self.out
            .url_variables
            .push(UrlParameter::new(key, value).with_description(description));
    }

    /// Fill path tokens no parameter claimed.
    fn reconcile(&mut self) {
        for token in self.unassigned() {
            match self.chain.lookup(&ParamLocation::Path, &token) {
                Some(hit) => {
                    debug!(route = %self.label, variable = %token, provider = hit.provider, "path variable filled");
                    self.push_url_variable(&token, hit.value.clone(), None);
                }
                None => {
                    warn!(route = %self.label, variable = %token, "path variable has no value");
                }
            }
        }
        let order = &self.tokens;
        self.out
            .url_variables
            .sort_by_key(|v| order.iter().position(|t| *t == v.key).unwrap_or(usize::MAX));
    }

    fn place_query(&mut self, param: &Parameter) {
        match self.chain.lookup(&param.location, &param.name) {
            Some(hit) => self.out.query.push(
                UrlParameter::new(param.name.clone(), hit.value.clone())
                    .with_description(param.description.clone()),
            ),
            None => warn!(route = %self.label, parameter = %param.name, "query parameter has no value"),
        }
    }

    fn place_header(&mut self, param: &Parameter) {
        match self.chain.lookup(&param.location, &param.name) {
            Some(hit) => self.set_header(&param.name, text_of(hit.value)),
            None => warn!(route = %self.label, parameter = %param.name, "header has no value"),
        }
    }

    fn set_header(&mut self, key: &str, value: String) {
        self.out.headers.retain(|h| !h.key.eq_ignore_ascii_case(key));
        self.out.headers.push(Header::new(key, value));
    }

    fn has_header(&self, key: &str) -> bool {
        self.out.headers.iter().any(|h| h.key.eq_ignore_ascii_case(key))
    }

    fn place_body_param(&mut self, param: &Parameter) {
        let keys: Vec<String> = param.body_properties().into_keys().collect();
        let keys = (!keys.is_empty()).then_some(keys.as_slice());
        let payload = self.chain.merged(|v| &v.body, keys);
        if payload.is_empty() {
            warn!(route = %self.label, parameter = %param.name, "body parameter has no mapped value");
            return;
        }
        self.out.body = Some(RequestBody::json(&to_object(&payload)));
        self.set_header(CONTENT_TYPE, "application/json".to_string());
    }

    fn place_request_body(&mut self, spec: &OperationSpec) {
        let Some(media) = spec.request_body.as_ref().and_then(|b| b.primary()) else {
            return;
        };
        let keys: Vec<String> = media.properties.keys().cloned().collect();
        let keys = (!keys.is_empty()).then_some(keys.as_slice());
        let payload = self.chain.merged(|v| &v.request_body, keys);
        if payload.is_empty() {
            debug!(route = %self.label, "request body has no values");
            return;
        }
        self.out.body = Some(RequestBody::json(&to_object(&payload)));
        if !self.has_header(CONTENT_TYPE) {
            self.set_header(CONTENT_TYPE, media.media_type.clone());
        }
    }

    fn log_diagnostics(&self) {
        let out = &self.out;
        let sections: [(&str, Vec<String>); 4] = [
            ("globals", out.globals.iter().map(|g| format!("{}={}", g.key, g.value)).collect()),
            ("query", out.query.iter().map(|q| format!("{}={}", q.key, q.value)).collect()),
            (
                "url variables",
                out.url_variables.iter().map(|v| format!("{}={}", v.key, v.value)).collect(),
            ),
            ("headers", out.headers.iter().map(|h| format!("{}: {}", h.key, h.value)).collect()),
        ];
        for (section, entries) in sections.iter().filter(|(_, e)| !e.is_empty()) {
            let entries = entries.join(", ");
            if self.options.verbose {
                info!(route = %self.label, section, entries = %entries, "request variables");
            } else {
                debug!(route = %self.label, section, entries = %entries, "request variables");
            }
        }
        if let Some(body) = &out.body {
            if self.options.verbose {
                info!(route = %self.label, body = %body.raw, "request body");
            } else {
                debug!(route = %self.label, body = %body.raw, "request body");
            }
        }
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
