//! Route enumeration, path tokenization and CRUD-safe ordering

use std::sync::LazyLock;

use indexmap::IndexMap;
use pmforge_core::config::route_key;
use pmforge_core::plan::ResourceConflict;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

/// Verbs looked up on every path item, in enumeration order.
pub const HTTP_VERBS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Creation first, deletion last.
pub const DEFAULT_VERB_ORDER: [&str; 5] = ["post", "put", "get", "patch", "delete"];

static SIMPLE_VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{([^{}]+)\}$").expect("literal regex"));

/// `{x}`, `{{x}}` and `({x})` inside a segment
static EMBEDDED_VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(?\{\{?([^{}]+)\}\}?\)?").expect("literal regex"));

/// One (verb, path, operation) triple.
#[derive(Debug, Clone, Copy)]
pub struct Route<'a> {
    /// Lowercase verb
    pub verb: &'static str,
    pub path: &'a str,
    pub operation: &'a Value,
    /// The enclosing path item (holds path-level parameters)
    pub path_item: &'a Value,
}

impl Route<'_> {
    /// `"POST /pets"`
    #[must_use]
    pub fn label(&self) -> String {
        route_key(self.verb, self.path)
    }

    /// `summary`, falling back to the label.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.operation
            .get("summary")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map_or_else(|| self.label(), String::from)
    }
}

/// Every defined operation, path by path, verbs in [`HTTP_VERBS`] order.
#[must_use]
pub fn enumerate_routes(document: &Value) -> Vec<Route<'_>> {
    let Some(paths) = document.get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut routes = Vec::new();
    for (path, item) in paths {
        for verb in HTTP_VERBS {
            if let Some(operation) = item.get(verb).filter(|op| op.is_object()) {
                routes.push(Route {
                    verb,
                    path,
                    operation,
                    path_item: item,
                });
            }
        }
    }
    routes
}

// ── Path tokens ──

/// One `/`-separated path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathToken {
    Literal(String),
    /// Whole-segment `{name}`, rendered `:name`
    Variable(String),
    /// Segment embedding variables, e.g. `project({id})` → `project{{id}}`
    Compound { text: String, variables: Vec<String> },
}

impl PathToken {
    /// Text placed in the collection URL.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Literal(s) => s.clone(),
            Self::Variable(name) => format!(":{name}"),
            Self::Compound { text, .. } => text.clone(),
        }
    }

    /// Whether this token stands for a value rather than a name.
    #[must_use]
    pub fn is_variable(&self) -> bool {
        match self {
            Self::Literal(_) => false,
            Self::Variable(_) => true,
            Self::Compound { text, .. } => text.starts_with("{{"),
        }
    }

    /// Rendered text with embedded `{{var}}` markers removed.
    #[must_use]
    pub fn stripped(&self) -> String {
        match self {
            Self::Compound { text, variables } => variables
                .iter()
                .fold(text.clone(), |acc, v| acc.replace(&format!("{{{{{v}}}}}"), "")),
            other => other.render(),
        }
    }
}

/// Tokenize a path template.
#[must_use]
pub fn path_tokens(path: &str) -> Vec<PathToken> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(segment_token)
        .collect()
}

fn segment_token(segment: &str) -> PathToken {
    if let Some(caps) = SIMPLE_VARIABLE.captures(segment) {
        return PathToken::Variable(caps[1].to_string());
    }
    if !EMBEDDED_VARIABLE.is_match(segment) {
        return PathToken::Literal(segment.to_string());
    }
    let variables = EMBEDDED_VARIABLE
        .captures_iter(segment)
        .map(|c| c[1].to_string())
        .collect();
    let text = EMBEDDED_VARIABLE
        .replace_all(segment, "{{$1}}")
        .into_owned();
    PathToken::Compound { text, variables }
}

/// Rendered path tokens: `/pets/{id}` → `["pets", ":id"]`.
#[must_use]
pub fn path_parts(path: &str) -> Vec<String> {
    path_tokens(path).iter().map(PathToken::render).collect()
}

/// Names of whole-segment `{name}` variables, in path order.
#[must_use]
pub fn url_variables(path: &str) -> Vec<String> {
    path_tokens(path)
        .into_iter()
        .filter_map(|t| match t {
            PathToken::Variable(name) => Some(name),
            _ => None,
        })
        .collect()
}

/// Names of variables embedded in compound segments, in path order.
#[must_use]
pub fn segment_variables(path: &str) -> Vec<String> {
    path_tokens(path)
        .into_iter()
        .filter_map(|t| match t {
            PathToken::Compound { variables, .. } => Some(variables),
            _ => None,
        })
        .flatten()
        .collect()
}

// ── Resource guessing ──

/// Logical resource a path operates on.
///
/// The last non-variable token before a trailing variable, otherwise the
/// last token (with embedded variables removed).
#[must_use]
pub fn guess_resource(path: &str) -> String {
    let tokens = path_tokens(path);
    let Some(last) = tokens.last() else {
        return String::new();
    };
    if last.is_variable() {
        if let Some(owner) = tokens.iter().rev().skip(1).find(|t| !t.is_variable()) {
            return owner.stripped();
        }
    }
    last.stripped()
}

/// Path prefix that owns the resource: trailing variable tokens removed.
fn resource_base(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let tokens = path_tokens(path);
    let keep = tokens
        .iter()
        .rposition(|t| !t.is_variable())
        .map_or(0, |i| i + 1);
    format!("/{}", segments[..keep].join("/"))
}

/// Routes in CRUD-safe order plus grouping conflicts.
#[derive(Debug, Clone)]
pub struct OrderedRoutes<'a> {
    pub routes: Vec<Route<'a>>,
    pub conflicts: Vec<ResourceConflict>,
}

/// Group routes by guessed resource (first-seen group order) and emit each
/// group's routes by `verb_order`.
///
/// Routes sharing a verb keep their first-seen order; verbs missing from
/// `verb_order` follow the ordered ones. Groups whose routes live under
/// different base paths are reported as conflicts.
#[must_use]
pub fn order_routes_by_resource<'a>(routes: Vec<Route<'a>>, verb_order: &[&str]) -> OrderedRoutes<'a> {
    let mut groups: IndexMap<String, Vec<Route<'a>>> = IndexMap::new();
    for route in routes {
        groups
            .entry(guess_resource(route.path))
            .or_default()
            .push(route);
    }

    let mut ordered = Vec::new();
    let mut conflicts = Vec::new();
    for (resource, group) in &groups {
        for verb in verb_order {
            ordered.extend(group.iter().filter(|r| r.verb.eq_ignore_ascii_case(verb)));
        }
        ordered.extend(
            group
                .iter()
                .filter(|r| !verb_order.iter().any(|v| r.verb.eq_ignore_ascii_case(v))),
        );

        let mut bases: Vec<String> = Vec::new();
        for route in group {
            let base = resource_base(route.path);
            if !bases.contains(&base) {
                bases.push(base);
            }
        }
        if bases.len() > 1 {
            let labels: Vec<String> = group.iter().map(Route::label).collect();
            warn!(
                resource = %resource,
                bases = ?bases,
                routes = ?labels,
                "unrelated paths share a guessed resource name, ordering them as one group"
            );
            conflicts.push(ResourceConflict {
                resource: resource.clone(),
                bases,
                routes: labels,
            });
        }
    }

    OrderedRoutes {
        routes: ordered,
        conflicts,
    }
}
