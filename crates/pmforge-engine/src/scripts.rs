//! Response assertion, global promotion and custom scripts
//!
//! Every script gets an id derived from its name and body, so generating the
//! same route twice yields identical scripts and duplicates collapse when
//! scripts are combined into an event.

use std::str::FromStr;

use indexmap::IndexMap;
use pmforge_core::collection::{Event, Listen, Script};
use pmforge_core::config::{AssertionKind, Expect, TestConfigEntry};
use pmforge_core::{StatusKey, fingerprint_str, stable_id};
use serde_json::Value;
use tracing::{debug, warn};

use crate::document::SchemaDocument;
use crate::error::ConvertError;
use crate::resolver::{ResolveScope, Resolver};
use crate::routes::Route;

const SCRIPT_TYPE: &str = "text/javascript";

/// Length of the source fingerprint shown in custom script names
const CMD_PREFIX_LEN: usize = 12;

// ── Declared responses ──

/// One entry of an operation's `responses`, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredResponse {
    pub key: StatusKey,
    pub description: String,
    /// Media type → schema (unresolved; may be absent)
    pub content: IndexMap<String, Option<Value>>,
}

impl DeclaredResponse {
    /// The media type a response is checked against: first JSON-like, else first.
    #[must_use]
    pub fn primary_media(&self) -> Option<(&str, Option<&Value>)> {
        self.content
            .iter()
            .find(|(media, _)| media.contains("json"))
            .or_else(|| self.content.first())
            .map(|(media, schema)| (media.as_str(), schema.as_ref()))
    }

    /// Responses of a route; keys that are not status codes are skipped.
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
    ) -> Result<Vec<Self>, ConvertError> {
        let Some(responses) = route.operation.get("responses").and_then(Value::as_object) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(responses.len());
        for (key, node) in responses {
            let Ok(status) = StatusKey::from_str(key) else {
                debug!(route = %route.label(), key = %key, "ignoring non-status response key");
                continue;
            };
            let Some(response) = resolver.resolve_object(node, document, scope, strict, false)? else {
                warn!(route = %route.label(), status = %status, "skipping unresolvable response");
                continue;
            };
            let content: IndexMap<String, Option<Value>> = response
                .get("content")
                .and_then(Value::as_object)
                .map(|c| {
                    c.iter()
                        .map(|(media, body)| (media.clone(), body.get("schema").cloned()))
                        .collect()
                })
                .unwrap_or_default();
            out.push(Self {
                key: status,
                description: response
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                content,
            });
        }
        Ok(out)
    }
}

/// The response assertions are generated for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpectedResponse<'a> {
    /// Status to assert: the expectation's code when given, else the declared key
    pub status: StatusKey,
    pub response: &'a DeclaredResponse,
}

/// Pick the expected response: the one matching the expectation's code, or
/// the first 2xx in declaration order. A disabled expectation selects none.
#[must_use]
pub fn select_expected<'a>(
    responses: &'a [DeclaredResponse],
    expect: &Expect,
) -> Option<ExpectedResponse<'a>> {
    if !expect.enabled {
        return None;
    }
    match expect.code {
        Some(code) => responses
            .iter()
            .find(|r| code.matches(r.key))
            .map(|response| ExpectedResponse {
                status: code,
                response,
            }),
        None => responses
            .iter()
            .find(|r| r.key.is_success())
            .map(|response| ExpectedResponse {
                status: response.key,
                response,
            }),
    }
}

// ── Script constructors ──

#[must_use]
pub fn script(name: impl Into<String>, body: impl Into<String>) -> Script {
    let name = name.into();
    let body = body.into();
    Script {
        id: stable_id(&[name.as_str(), body.as_str()]),
        name,
        kind: SCRIPT_TYPE.to_string(),
        exec: body.lines().map(String::from).collect(),
    }
}

/// JavaScript string literal.
fn js(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

#[must_use]
pub fn status_check(route: &str, status: StatusKey) -> Script {
    match status {
        StatusKey::Class(class) => script(
            format!("{route} Test Code is {status}"),
            format!(
                "pm.test(\"Status code is {status}\", function () {{ pm.expect(pm.response.code).to.be.within({}, {}); }});",
                u16::from(class) * 100,
                u16::from(class) * 100 + 99
            ),
        ),
        _ => {
            let code = status.representative();
            script(
                format!("{route} Test Code is {code}"),
                format!(
                    "pm.test(\"Status code is {code}\", function () {{ pm.expect(pm.response).to.have.status({code}); }});"
                ),
            )
        }
    }
}

#[must_use]
pub fn content_type_check(route: &str, media_type: &str) -> Script {
    script(
        format!("{route} Mimetype is {media_type}"),
        format!(
            "pm.test(\"Content-Type Header is {media_type}\", function () {{ pm.expect(postman.getResponseHeader(\"Content-type\")).to.be.eql({}); }});",
            js(media_type)
        ),
    )
}

#[must_use]
pub fn response_time_check(route: &str, millis: u64) -> Script {
    script(
        format!("{route} responds in less than {millis}ms"),
        format!(
            "pm.test(\"Response time is less than {millis}ms\", function () {{ pm.expect(pm.response.responseTime).to.be.below({millis}); }});"
        ),
    )
}

#[must_use]
pub fn header_check(route: &str, header: &str, value: &str) -> Script {
    script(
        format!("{route} Header {header} is {value}"),
        format!(
            "pm.test({}, function () {{ pm.expect(pm.response.headers.get({})).to.eql({}); }});",
            js(&format!("Header {header} is {value}")),
            js(header),
            js(value)
        ),
    )
}

/// Schema conformance check; the source document is merged in so that
/// `#/...` references inside `schema` resolve within the validator.
#[must_use]
pub fn schema_check(route: &str, media_type: &str, schema: &Value, document: &Value) -> Script {
    script(
        format!("{route} Response body matches {media_type} schema"),
        format!(
            "var schema = Object.assign({{}}, {document}, {schema});\npm.test(\"Response body matches schema\", function () {{ pm.response.to.have.jsonSchema(schema); }});"
        ),
    )
}

/// `.data.items.0.id` → `["data"]["items"][0]["id"]`
#[must_use]
pub fn field_accessor(path: &str) -> String {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            if segment.bytes().all(|b| b.is_ascii_digit()) {
                format!("[{segment}]")
            } else {
                format!("[{}]", js(segment))
            }
        })
        .collect()
}

/// Scripts promoting a response field to a global variable.
#[derive(Debug, Clone, PartialEq)]
pub struct PromotionScripts {
    /// Extracts the field after the response arrives
    pub extract: Script,
    /// Logs the global before the route's request
    pub route_debug: Script,
    /// Logs the global before every request
    pub collection_debug: Script,
}

#[must_use]
pub fn promotion_scripts(route: &str, variable: &str, path: &str) -> PromotionScripts {
    let accessor = field_accessor(path);
    let debug_print = |tag: &str| {
        script(
            format!("[{tag}] Debug {variable}"),
            format!(
                "console.log(\"[{tag}] GLOBAL({variable}):\", pm.globals.get({}));",
                js(variable)
            ),
        )
    };
    PromotionScripts {
        extract: script(
            format!("Set response of {route}: JSON_RESPONSE{accessor} to {variable}"),
            format!(
                "pm.test('set {variable}', function() {{ pm.globals.set({}, pm.response.json(){accessor}); }});",
                js(variable)
            ),
        ),
        route_debug: debug_print("prerequest"),
        collection_debug: debug_print("collection_prerequest"),
    }
}

/// Scripts written verbatim in the test configuration.
#[must_use]
pub fn custom_scripts(owner: &str, sources: &[String]) -> Vec<Script> {
    sources
        .iter()
        .map(|source| {
            let fingerprint = fingerprint_str(source);
            let prefix = &fingerprint[..CMD_PREFIX_LEN.min(fingerprint.len())];
            script(format!("{owner} cmd({prefix}) inserted from test config"), source.as_str())
        })
        .collect()
}

// ── Per-route generation ──

/// Scripts one route contributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteScripts {
    pub test: Vec<Script>,
    pub prerequest: Vec<Script>,
    /// Scripts to hoist to the collection's pre-request event
    pub collection_prerequest: Vec<Script>,
}

/// Assertion, promotion and custom scripts for one route.
#[must_use]
pub fn route_scripts(
    route: &str,
    responses: &[DeclaredResponse],
    entry: Option<&TestConfigEntry>,
    document: &Value,
) -> RouteScripts {
    let expect = entry.and_then(|e| e.expect.clone()).unwrap_or_default();
    let mut out = RouteScripts::default();

    match select_expected(responses, &expect) {
        Some(expected) => out.test.extend(assertions(route, &expected, &expect, document)),
        None if expect.enabled => {
            warn!(route = %route, code = ?expect.code.map(|c| c.to_string()), "no declared response to assert");
        }
        None => debug!(route = %route, "assertions disabled"),
    }

    if let Some(entry) = entry {
        for (variable, path) in &entry.make_global {
            let promoted = promotion_scripts(route, variable, path);
            out.test.push(promoted.extract);
            out.prerequest.push(promoted.route_debug);
            out.collection_prerequest.push(promoted.collection_debug);
        }
        out.test.extend(custom_scripts(route, &entry.test));
        out.prerequest.extend(custom_scripts(route, &entry.prerequest));
    }
    out
}

fn assertions(
    route: &str,
    expected: &ExpectedResponse<'_>,
    expect: &Expect,
    document: &Value,
) -> Vec<Script> {
    let mut scripts = Vec::new();
    if expect.asserts(AssertionKind::Status) {
        scripts.push(status_check(route, expected.status));
    }
    let primary = expected.response.primary_media();
    if expect.asserts(AssertionKind::ContentType) {
        if let Some((media, _)) = primary {
            scripts.push(content_type_check(route, media));
        }
    }
    if expect.asserts(AssertionKind::ResponseTime) {
        scripts.push(response_time_check(route, expect.response_time));
    }
    if expect.asserts(AssertionKind::Schema) {
        if let Some((media, Some(schema))) = primary.filter(|(media, _)| media.contains("json")) {
            scripts.push(schema_check(route, media, schema, document));
        }
    }
    scripts.extend(
        expect
            .headers
            .iter()
            .map(|(header, value)| header_check(route, header, value)),
    );
    scripts
}

/// Combine scripts into one event; scripts with equal ids appear once.
#[must_use]
pub fn combine(listen: Listen, scripts: &[Script]) -> Option<Event> {
    let mut seen: Vec<&str> = Vec::new();
    let mut names = Vec::new();
    let mut exec = Vec::new();
    for s in scripts {
        if seen.contains(&s.id.as_str()) {
            continue;
        }
        seen.push(s.id.as_str());
        names.push(s.name.as_str());
        exec.push(format!("// {}", s.name));
        exec.extend(s.exec.iter().cloned());
    }
    if seen.is_empty() {
        return None;
    }
    let listen_name = match listen {
        Listen::Test => "test",
        Listen::Prerequest => "prerequest",
    };
    let mut ids = vec![listen_name];
    ids.extend(seen.iter().copied());
    let id = stable_id(&ids);
    Some(Event {
        id: id.clone(),
        listen,
        disabled: false,
        script: Script {
            id,
            name: names.join("; "),
            kind: SCRIPT_TYPE.to_string(),
            exec,
        },
    })
}
