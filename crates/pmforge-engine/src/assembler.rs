//! OpenAPI document → Postman collection
//!
//! [`Converter`] walks routes in CRUD-safe order. Each route yields a
//! [`RouteContribution`] (its item, the globals it introduces and the scripts
//! it hoists to the collection), and the contributions are folded into the
//! final collection.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use pmforge_core::collection::{
    Auth, BASE_URL_VARIABLE, COLLECTION_SCHEMA_URL, Collection, Description, Header, Info, Item,
    Listen, OriginalRequest, Request, ResponseTemplate, Script, Url, Variable,
};
use pmforge_core::config::{
    COLLECTION_KEY, ResolverSettings, Settings, SynthesisSettings, TestConfig, key_matches,
};
use pmforge_core::plan::{ConversionPlan, PlannedRoute, Validation};
use pmforge_core::stable_id;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::builder::{BuildOptions, build_request_variables};
use crate::document::{SchemaDocument, is_url};
use crate::error::ConvertError;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::params::{LocationValues, OperationSpec};
use crate::precedence::{CONFIG, EXAMPLE, ProviderChain, SYNTHESIZED};
use crate::resolver::{ResolveScope, Resolver};
use crate::routes::{DEFAULT_VERB_ORDER, Route, enumerate_routes, guess_resource, order_routes_by_resource, path_parts};
use crate::scripts::{DeclaredResponse, RouteScripts, combine, custom_scripts, route_scripts, select_expected};
use crate::synthesize::Synthesizer;

/// Content type assumed for responses that declare none
const FALLBACK_MEDIA_TYPE: &str = "text/html";

/// Converts one document, optionally guided by a test configuration.
pub struct Converter {
    document: SchemaDocument,
    test_config: TestConfig,
    host: Option<String>,
    strict: bool,
    verbose: bool,
    synthesis: SynthesisSettings,
    resolver: Resolver,
    base_dir: Option<PathBuf>,
}

impl Converter {
    #[must_use]
    pub fn new(document: SchemaDocument) -> Self {
        Self {
            document,
            test_config: TestConfig::default(),
            host: None,
            strict: true,
            verbose: false,
            synthesis: SynthesisSettings::default(),
            resolver: Resolver::new(&ResolverSettings::default()),
            base_dir: None,
        }
    }

    /// Load the document and test configuration named by `settings`.
    ///
    /// # Errors
    ///
    /// Returns error if the document or test configuration cannot be loaded
    pub fn from_settings(settings: &Settings) -> Result<Self, ConvertError> {
        let fetcher = HttpFetcher::default();
        let document = SchemaDocument::open(&settings.spec, &fetcher)?;
        let mut converter = Self::new(document).with_settings(settings);
        if !is_url(&settings.spec) {
            converter = converter.with_base_dir(Path::new(&settings.spec).parent().map(Path::to_path_buf));
        }
        if let Some(path) = &settings.test_config {
            converter = converter.with_test_config(TestConfig::load(path)?);
        }
        Ok(converter)
    }

    /// Apply host, strictness, verbosity, synthesis and resolver settings.
    ///
    /// Rebuilds the resolver, so call before [`Converter::with_fetcher`].
    #[must_use]
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.host = settings.host.clone().or(self.host);
        self.strict = settings.strict;
        self.verbose = settings.verbose;
        self.synthesis = settings.synthesis.clone();
        self.resolver = Resolver::new(&settings.resolver).with_base_dir(self.base_dir.clone());
        self
    }

    #[must_use]
    pub fn with_test_config(mut self, test_config: TestConfig) -> Self {
        self.test_config = test_config;
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    #[must_use]
    pub fn with_synthesis(mut self, synthesis: SynthesisSettings) -> Self {
        self.synthesis = synthesis;
        self
    }

    /// Where remote references are fetched from.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Box<dyn Fetcher>) -> Self {
        self.resolver = self.resolver.with_fetcher(fetcher);
        self
    }

    /// Directory local file references are relative to.
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: Option<PathBuf>) -> Self {
        self.resolver.set_base_dir(base_dir.clone());
        self.base_dir = base_dir;
        self
    }

    #[must_use]
    pub fn document(&self) -> &SchemaDocument {
        &self.document
    }

    fn pass(&mut self) -> Pass<'_> {
        let scope = self.resolver.scope();
        Pass {
            document: &self.document,
            test_config: &self.test_config,
            resolver: &mut self.resolver,
            scope,
            synthesizer: Synthesizer::new(self.synthesis.clone()),
            options: BuildOptions {
                strict: self.strict,
                verbose: self.verbose,
            },
        }
    }

    /// Build the collection.
    ///
    /// Each call starts a fresh resolution scope; only the content-keyed
    /// reference cache is shared between calls.
    ///
    /// # Errors
    ///
    /// Returns configuration and synthesis errors, and ambiguity or depth
    /// errors in strict mode
    pub fn convert(&mut self) -> Result<Collection, ConvertError> {
        let host = self.host.clone();
        let mut pass = self.pass();
        let document = pass.document;
        let ordered = order_routes_by_resource(enumerate_routes(document.value()), &DEFAULT_VERB_ORDER);

        let mut globals: IndexMap<String, Variable> = IndexMap::new();
        let base_url = Variable::string(BASE_URL_VARIABLE, host.unwrap_or_else(|| "/".to_string()));
        globals.insert(base_url.key.clone(), base_url);

        let mut collection_test: Vec<Script> = Vec::new();
        let mut collection_prerequest: Vec<Script> = Vec::new();
        if let Some(entry) = pass.test_config.collection() {
            for (key, value) in pass.test_config.variables_of(entry)? {
                add_global(&mut globals, Variable::string(key, text_of(&value)));
            }
            collection_test.extend(custom_scripts(COLLECTION_KEY, &entry.test));
            collection_prerequest.extend(custom_scripts(COLLECTION_KEY, &entry.prerequest));
        }

        let mut items = Vec::with_capacity(ordered.routes.len());
        for route in &ordered.routes {
            let contribution = pass.route(route)?;
            for global in contribution.globals {
                add_global(&mut globals, global);
            }
            collection_prerequest.extend(contribution.collection_prerequest);
            items.push(contribution.item);
        }
        info!(
            title = document.title(),
            items = items.len(),
            globals = globals.len(),
            "collection assembled"
        );

        let event = [
            combine(Listen::Prerequest, &collection_prerequest),
            combine(Listen::Test, &collection_test),
        ]
        .into_iter()
        .flatten()
        .collect();

        Ok(Collection {
            info: Info {
                postman_id: stable_id(&["collection", document.fingerprint()]),
                name: document.title().to_string(),
                schema: COLLECTION_SCHEMA_URL.to_string(),
                description: Description::plain(
                    document
                        .description()
                        .map_or_else(|| document.title_version(), String::from),
                ),
            },
            item: items,
            event,
            variable: globals.into_values().collect(),
        })
    }

    /// Describe the conversion without synthesizing data.
    ///
    /// # Errors
    ///
    /// Returns resolution errors (depth errors in strict mode only)
    pub fn plan(&mut self) -> Result<ConversionPlan, ConvertError> {
        let mut pass = self.pass();
        let document = pass.document;
        let ordered = order_routes_by_resource(enumerate_routes(document.value()), &DEFAULT_VERB_ORDER);

        let mut routes = Vec::with_capacity(ordered.routes.len());
        for route in &ordered.routes {
            routes.push(pass.planned(route)?);
        }

        let mut validations = Vec::new();
        if ordered.routes.is_empty() {
            validations.push(Validation::warning("routes", "document defines no operations"));
        } else {
            validations.push(Validation::ok(
                "routes",
                format!("{} operations found", ordered.routes.len()),
            ));
        }
        for key in pass.test_config.route_keys() {
            if !ordered.routes.iter().any(|r| key_matches(key, r.verb, r.path)) {
                validations.push(Validation::warning(
                    "test_config",
                    format!("entry '{key}' matches no route"),
                ));
            }
        }

        Ok(ConversionPlan {
            title: document.title_version(),
            routes,
            conflicts: ordered.conflicts,
            validations,
        })
    }
}

fn add_global(globals: &mut IndexMap<String, Variable>, variable: Variable) {
    match globals.get(&variable.key) {
        Some(existing) if existing.value != variable.value => {
            warn!(
                variable = %variable.key,
                kept = %existing.value,
                ignored = %variable.value,
                "global variable defined twice with different values, keeping the first"
            );
        }
        Some(_) => {}
        None => {
            globals.insert(variable.key.clone(), variable);
        }
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// What one route adds to the collection.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteContribution {
    pub item: Item,
    pub globals: Vec<Variable>,
    pub collection_prerequest: Vec<Script>,
}

/// State of one conversion call.
struct Pass<'a> {
    document: &'a SchemaDocument,
    test_config: &'a TestConfig,
    resolver: &'a mut Resolver,
    scope: ResolveScope,
    synthesizer: Synthesizer,
    options: BuildOptions,
}

impl Pass<'_> {
    fn route(&mut self, route: &Route<'_>) -> Result<RouteContribution, ConvertError> {
        let label = route.label();
        let strict = self.options.strict;
        let entry = self.test_config.for_route(route.verb, route.path);
        let expect = entry.and_then(|e| e.expect.clone()).unwrap_or_default();

        let spec = OperationSpec::collect(route, self.resolver, self.document, &mut self.scope, strict)?;
        let configured = match entry {
            Some(entry) => LocationValues::uniform(&self.test_config.variables_of(entry)?),
            None => LocationValues::default(),
        };
        let examples = spec.examples();
        let synthesized = if expect.fake_data {
            self.synthesizer.synthesize(route, &spec)?
        } else {
            debug!(route = %label, "test data synthesis disabled");
            LocationValues::default()
        };
        let chain = ProviderChain::new()
            .with(CONFIG, &configured)
            .with(EXAMPLE, &examples)
            .with(SYNTHESIZED, &synthesized);

        let no_headers = IndexMap::new();
        let built = build_request_variables(
            route,
            &spec,
            &chain,
            entry.map_or(&no_headers, |e| &e.headers),
            self.options,
        )?;

        let responses = DeclaredResponse::collect(route, self.resolver, self.document, &mut self.scope, strict)?;
        let RouteScripts {
            test,
            prerequest,
            collection_prerequest,
        } = route_scripts(&label, &responses, entry, self.document.value());

        let request = Request {
            name: route.display_name(),
            method: route.verb.to_uppercase(),
            url: Url {
                host: vec![format!("{{{{{BASE_URL_VARIABLE}}}}}")],
                path: path_parts(route.path),
                query: built.query,
                variable: built.url_variables,
            },
            auth: Auth::default(),
            header: built.headers,
            body: built.body,
            description: route
                .operation
                .get("description")
                .and_then(Value::as_str)
                .filter(|d| !d.is_empty())
                .map(Description::plain),
        };
        let response = response_templates(&label, &request, &responses);
        let event = [combine(Listen::Test, &test), combine(Listen::Prerequest, &prerequest)]
            .into_iter()
            .flatten()
            .collect();

        debug!(route = %label, responses = response.len(), "route converted");
        Ok(RouteContribution {
            item: Item {
                id: stable_id(&["item", label.as_str()]),
                name: route.display_name(),
                request,
                response,
                event,
            },
            globals: built.globals,
            collection_prerequest,
        })
    }

    fn planned(&mut self, route: &Route<'_>) -> Result<PlannedRoute, ConvertError> {
        let strict = self.options.strict;
        let entry = self.test_config.for_route(route.verb, route.path);
        let expect = entry.and_then(|e| e.expect.clone()).unwrap_or_default();
        let spec = OperationSpec::collect(route, self.resolver, self.document, &mut self.scope, strict)?;
        let responses = DeclaredResponse::collect(route, self.resolver, self.document, &mut self.scope, strict)?;

        Ok(PlannedRoute {
            operation: route.label(),
            method: route.verb.to_uppercase(),
            path: route.path.to_string(),
            resource: guess_resource(route.path),
            required_parameters: spec
                .required()
                .map(|p| format!("{} ({})", p.name, p.location))
                .collect(),
            body_properties: spec
                .request_body
                .as_ref()
                .and_then(|b| b.primary())
                .map(|m| m.properties.keys().cloned().collect())
                .unwrap_or_default(),
            expected_status: select_expected(&responses, &expect).map(|e| e.status.to_string()),
            has_test_config: entry.is_some(),
            promotions: entry
                .map(|e| e.make_global.keys().cloned().collect())
                .unwrap_or_default(),
        })
    }
}

/// One example response per declared (status, content type) pair.
fn response_templates(label: &str, request: &Request, responses: &[DeclaredResponse]) -> Vec<ResponseTemplate> {
    let mut templates = Vec::new();
    for response in responses {
        let code = response.key.representative();
        let media_types: Vec<&str> = if response.content.is_empty() {
            vec![FALLBACK_MEDIA_TYPE]
        } else {
            response.content.keys().map(String::as_str).collect()
        };
        for media in media_types {
            let key = response.key.to_string();
            templates.push(ResponseTemplate {
                id: stable_id(&["response", label, key.as_str(), media]),
                name: response.description.clone(),
                original_request: OriginalRequest {
                    method: request.method.clone(),
                    url: request.url.clone(),
                    body: json!({}),
                },
                status: response.key.reason_phrase().to_string(),
                code,
                header: vec![Header::new("Content-Type", media)],
                cookie: Vec::new(),
                body: response.description.clone(),
                preview_language: Some(preview_language(media).to_string()),
            });
        }
    }
    templates
}

fn preview_language(media_type: &str) -> &'static str {
    if media_type.contains("json") {
        "json"
    } else if media_type.contains("html") {
        "html"
    } else if media_type.contains("xml") {
        "xml"
    } else {
        "text"
    }
}
