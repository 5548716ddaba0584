//! Reference resolution
//!
//! A reference is a JSON pointer (`#/components/schemas/Pet`), optionally
//! prefixed by the location of another document (`common.yaml#/Pet`,
//! `https://host/api.json#/Pet`). Resolution is a pure function of the
//! reference and the document content, so results are memoized in a bounded
//! LRU cache keyed by a fingerprint of both.
//!
//! Cycle protection lives in [`ResolveScope`], which tracks the references
//! currently being expanded. One scope belongs to one top-level conversion;
//! nothing leaks between conversions.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use lru::LruCache;
use pmforge_core::config::{ResolverSettings, load_structured_file};
use pmforge_core::fingerprint_str;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::document::{SchemaDocument, extension_of, is_url, parse_document};
use crate::error::ConvertError;
use crate::fetch::{Fetcher, HttpFetcher};

/// Unescape one pointer segment (`~1` → `/`, then `~0` → `~`).
#[must_use]
pub fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Unescaped, non-empty segments of a pointer fragment.
#[must_use]
pub fn pointer_segments(fragment: &str) -> Vec<String> {
    fragment
        .split('/')
        .filter(|s| !s.is_empty())
        .map(unescape)
        .collect()
}

/// Split a reference into its document location and pointer fragment.
///
/// `#/a` → `(None, "/a")`, `x.yaml#/a` → `(Some("x.yaml"), "/a")`,
/// `https://h/x.json` → `(Some(..), "")`. A bare `/a/b` is a local pointer.
#[must_use]
pub fn split_reference(reference: &str) -> (Option<&str>, &str) {
    match reference.split_once('#') {
        Some(("", fragment)) => (None, fragment),
        Some((location, fragment)) => (Some(location), fragment),
        None if reference.starts_with('/') => (None, reference),
        None => (Some(reference), ""),
    }
}

/// Walk `fragment` through `document`.
///
/// Mappings are indexed by key, sequences by decimal position.
///
/// # Errors
///
/// Returns `ConvertError::Resolution` naming the first segment that cannot
/// be traversed
pub fn find_ref<'a>(
    reference: &str,
    fragment: &str,
    document: &'a Value,
) -> Result<&'a Value, ConvertError> {
    let mut node = document;
    for segment in pointer_segments(fragment) {
        let next = match node {
            Value::Object(map) => map.get(&segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        node = next.ok_or_else(|| ConvertError::Resolution {
            reference: reference.to_string(),
            reason: format!("segment '{segment}' not found"),
        })?;
    }
    Ok(node)
}

/// The `$ref` string of a reference node.
#[must_use]
pub fn reference_of(node: &Value) -> Option<&str> {
    node.get("$ref").and_then(Value::as_str)
}

/// Whether any `$ref` remains anywhere inside `node`.
#[must_use]
pub fn contains_reference(node: &Value) -> bool {
    match node {
        Value::Object(map) => reference_of(node).is_some() || map.values().any(contains_reference),
        Value::Array(items) => items.iter().any(contains_reference),
        _ => false,
    }
}

/// References being expanded in one conversion, with their nesting count.
#[derive(Debug, Clone)]
pub struct ResolveScope {
    active: HashMap<String, usize>,
    max_depth: usize,
}

impl ResolveScope {
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            active: HashMap::new(),
            max_depth,
        }
    }

    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// How many times `reference` is currently nested in the active chain.
    #[must_use]
    pub fn depth(&self, reference: &str) -> usize {
        self.active.get(reference).copied().unwrap_or(0)
    }

    fn enter(&mut self, reference: &str) -> bool {
        let count = self.active.entry(reference.to_string()).or_insert(0);
        if *count >= self.max_depth {
            return false;
        }
        *count += 1;
        true
    }

    fn exit(&mut self, reference: &str) {
        if let Some(count) = self.active.get_mut(reference) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.active.remove(reference);
            }
        }
    }
}

/// Memoizing reference resolver.
pub struct Resolver {
    resolved: LruCache<String, Value>,
    external: LruCache<String, Value>,
    fetcher: Box<dyn Fetcher>,
    base_dir: Option<PathBuf>,
    max_depth: usize,
}

impl Resolver {
    #[must_use]
    pub fn new(settings: &ResolverSettings) -> Self {
        let capacity = NonZeroUsize::new(settings.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            resolved: LruCache::new(capacity),
            external: LruCache::new(capacity),
            fetcher: Box::new(HttpFetcher::default()),
            base_dir: None,
            max_depth: settings.max_ref_depth,
        }
    }

    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Box<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Directory that relative file references are resolved against.
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: Option<PathBuf>) -> Self {
        self.base_dir = base_dir;
        self
    }

    /// Change the base directory; memoized resolutions are dropped since
    /// relative file references may now point elsewhere.
    pub fn set_base_dir(&mut self, base_dir: Option<PathBuf>) {
        if self.base_dir != base_dir {
            self.resolved.clear();
            self.external.clear();
        }
        self.base_dir = base_dir;
    }

    /// Fresh cycle-protection scope for one conversion.
    #[must_use]
    pub fn scope(&self) -> ResolveScope {
        ResolveScope::new(self.max_depth)
    }

    /// Number of memoized resolutions.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.resolved.len()
    }

    /// Resolve one reference against `document`.
    ///
    /// The target is returned as stored; a target that is itself a `$ref`
    /// node is not followed (see [`Resolver::resolve_object`]). A target that
    /// is a URL or an existing file path is loaded.
    ///
    /// # Errors
    ///
    /// Returns error if a segment cannot be traversed or an external
    /// document cannot be loaded
    pub fn resolve(
        &mut self,
        reference: &str,
        document: &SchemaDocument,
    ) -> Result<Value, ConvertError> {
        let key = fingerprint_str(&format!("{reference}\u{0}{}", document.fingerprint()));
        if let Some(hit) = self.resolved.get(&key) {
            return Ok(hit.clone());
        }

        let (location, fragment) = split_reference(reference);
        let target = match location {
            None => find_ref(reference, fragment, document.value())?.clone(),
            Some(location) => {
                let external = self.load_external(location)?;
                find_ref(reference, fragment, &external)?.clone()
            }
        };
        let value = self.follow_external(reference, target)?;

        self.resolved.put(key, value.clone());
        Ok(value)
    }

    /// Resolve `node` if it is a reference, following chains of references.
    ///
    /// With `deep`, every reference nested in mappings and sequences is
    /// resolved as well. Exceeding the depth limit is an error in strict mode
    /// and yields `None` otherwise (nested nodes are then left unresolved).
    ///
    /// # Errors
    ///
    /// Returns resolution errors, and `MaxDepth` in strict mode
    pub fn resolve_object(
        &mut self,
        node: &Value,
        document: &SchemaDocument,
        scope: &mut ResolveScope,
        strict: bool,
        deep: bool,
    ) -> Result<Option<Value>, ConvertError> {
        if let Some(reference) = reference_of(node) {
            let reference = reference.to_string();
            if !scope.enter(&reference) {
                let depth = scope.max_depth();
                if strict {
                    return Err(ConvertError::MaxDepth { reference, depth });
                }
                warn!(reference = %reference, depth, "max reference depth reached, leaving unresolved");
                return Ok(None);
            }
            debug!(reference = %reference, nesting = scope.depth(&reference), "resolving reference");
            let result = self
                .resolve(&reference, document)
                .and_then(|target| self.resolve_object(&target, document, scope, strict, deep));
            scope.exit(&reference);
            return result;
        }

        if !deep {
            return Ok(Some(node.clone()));
        }

        match node {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, child) in map {
                    let resolved = self.resolve_object(child, document, scope, strict, deep)?;
                    out.insert(key.clone(), resolved.unwrap_or_else(|| child.clone()));
                }
                Ok(Some(Value::Object(out)))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for child in items {
                    let resolved = self.resolve_object(child, document, scope, strict, deep)?;
                    out.push(resolved.unwrap_or_else(|| child.clone()));
                }
                Ok(Some(Value::Array(out)))
            }
            other => Ok(Some(other.clone())),
        }
    }

    fn follow_external(&mut self, reference: &str, target: Value) -> Result<Value, ConvertError> {
        let Value::String(text) = &target else {
            return Ok(target);
        };
        if is_url(text) {
            let (location, fragment) = split_reference(text);
            let location = location.unwrap_or(text.as_str());
            let external = self.load_external(location)?;
            return Ok(find_ref(reference, fragment, &external)?.clone());
        }
        if self.local_path(text).is_file() {
            return self.load_external(text);
        }
        Ok(target)
    }

    fn load_external(&mut self, location: &str) -> Result<Value, ConvertError> {
        let key = if is_url(location) {
            location.to_string()
        } else {
            self.local_path(location).display().to_string()
        };
        if let Some(hit) = self.external.get(&key) {
            return Ok(hit.clone());
        }

        let value = if is_url(location) {
            debug!(url = location, "fetching remote reference");
            let text = self.fetcher.fetch(location).inspect_err(|e| {
                error!(url = location, error = %e, "remote reference fetch failed");
            })?;
            parse_document(extension_of(location), &text)?
        } else {
            let path = self.local_path(location);
            debug!(path = %path.display(), "loading local reference");
            load_structured_file(&path)?
        };

        self.external.put(key, value.clone());
        Ok(value)
    }

    fn local_path(&self, location: &str) -> PathBuf {
        let path = Path::new(location);
        match &self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MemoryFetcher;
    use proptest::prelude::*;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn resolver() -> Resolver {
        Resolver::new(&ResolverSettings::default()).with_fetcher(Box::new(MemoryFetcher::default()))
    }

    fn doc() -> SchemaDocument {
        SchemaDocument::from_value(json!({
            "components": {
                "schemas": {
                    "Pet": {"type": "object", "properties": {"name": {"type": "string"}}},
                    "Alias": {"$ref": "#/components/schemas/Pet"},
                    "Node": {
                        "type": "object",
                        "properties": {"child": {"$ref": "#/components/schemas/Node"}}
                    },
                    "a/b": {"type": "integer"},
                    "t~x": {"type": "boolean"}
                }
            },
            "paths": {
                "/pets": {"get": {"parameters": [{"name": "limit"}, {"name": "skip"}]}}
            }
        }))
    }

    // ── pointers ──

    #[test]
    fn unescape_order() {
        assert_eq!(unescape("a~1b"), "a/b");
        assert_eq!(unescape("t~0x"), "t~x");
        assert_eq!(unescape("~01"), "~1");
    }

    #[test]
    fn split_reference_forms() {
        assert_eq!(split_reference("#/a/b"), (None, "/a/b"));
        assert_eq!(split_reference("common.yaml#/Pet"), (Some("common.yaml"), "/Pet"));
        assert_eq!(
            split_reference("https://h/x.json"),
            (Some("https://h/x.json"), "")
        );
        assert_eq!(split_reference("/a/b"), (None, "/a/b"));
    }

    #[test]
    fn find_ref_escapes_and_indexes() {
        let d = doc();
        let v = find_ref("r", "/components/schemas/a~1b", d.value()).unwrap();
        assert_eq!(v["type"], "integer");
        let v = find_ref("r", "/components/schemas/t~0x", d.value()).unwrap();
        assert_eq!(v["type"], "boolean");
        let v = find_ref("r", "/paths/~1pets/get/parameters/1/name", d.value()).unwrap();
        assert_eq!(v, "skip");
    }

    #[test]
    fn find_ref_reports_missing_segment() {
        let d = doc();
        let err = find_ref("#/components/nope", "/components/nope", d.value()).unwrap_err();
        assert!(err.to_string().contains("'nope'"));
        assert!(find_ref("r", "/paths/~1pets/get/parameters/x", d.value()).is_err());
    }

    proptest! {
        #[test]
        fn escaped_keys_resolve(key in "[a-z~/]{1,8}") {
            let escaped = key.replace('~', "~0").replace('/', "~1");
            let document = json!({"root": {key.clone(): 42}});
            let reference = format!("#/root/{escaped}");
            let (_, fragment) = split_reference(&reference);
            prop_assert_eq!(find_ref(&reference, fragment, &document).unwrap(), &json!(42));
        }
    }

    // ── resolve ──

    #[test]
    fn resolve_is_repeatable_and_non_mutating() {
        let mut r = resolver();
        let d = doc();
        let before = d.value().clone();
        let a = r.resolve("#/components/schemas/Pet", &d).unwrap();
        let b = r.resolve("#/components/schemas/Pet", &d).unwrap();
        assert_eq!(a, b);
        assert_eq!(d.value(), &before);
        assert_eq!(r.cached(), 1);
    }

    #[test]
    fn resolve_object_follows_chains() {
        let mut r = resolver();
        let d = doc();
        let mut scope = r.scope();
        let v = r
            .resolve_object(&json!({"$ref": "#/components/schemas/Alias"}), &d, &mut scope, true, false)
            .unwrap()
            .unwrap();
        assert_eq!(v["type"], "object");
        assert_eq!(scope.depth("#/components/schemas/Alias"), 0);
    }

    #[test]
    fn non_reference_passes_through() {
        let mut r = resolver();
        let d = doc();
        let mut scope = r.scope();
        let node = json!({"type": "string"});
        let v = r.resolve_object(&node, &d, &mut scope, true, false).unwrap();
        assert_eq!(v, Some(node));
    }

    #[test]
    fn shared_reference_does_not_trip_limit() {
        let mut r = resolver();
        let d = doc();
        let mut scope = r.scope();
        for _ in 0..20 {
            let v = r
                .resolve_object(&json!({"$ref": "#/components/schemas/Pet"}), &d, &mut scope, true, false)
                .unwrap();
            assert!(v.is_some());
        }
    }

    #[test]
    fn recursive_schema_strict_fails() {
        let mut r = resolver();
        let d = doc();
        let mut scope = r.scope();
        let err = r
            .resolve_object(&json!({"$ref": "#/components/schemas/Node"}), &d, &mut scope, true, true)
            .unwrap_err();
        assert!(matches!(err, ConvertError::MaxDepth { depth: 5, .. }));
    }

    #[test]
    fn recursive_schema_lenient_leaves_reference() {
        let mut r = resolver();
        let d = doc();
        let mut scope = r.scope();
        let v = r
            .resolve_object(&json!({"$ref": "#/components/schemas/Node"}), &d, &mut scope, false, true)
            .unwrap()
            .unwrap();
        assert_eq!(v["type"], "object");
        assert!(contains_reference(&v));
        // the scope unwinds completely
        assert_eq!(scope.depth("#/components/schemas/Node"), 0);
    }

    #[test]
    fn deep_resolution_replaces_nested_references() {
        let mut r = resolver();
        let d = doc();
        let mut scope = r.scope();
        let node = json!({"items": [{"$ref": "#/components/schemas/Pet"}], "x": {"$ref": "#/components/schemas/a~1b"}});
        let v = r.resolve_object(&node, &d, &mut scope, true, true).unwrap().unwrap();
        assert!(!contains_reference(&v));
        assert_eq!(v["items"][0]["type"], "object");
        assert_eq!(v["x"]["type"], "integer");
    }

    // ── external documents ──

    #[derive(Clone)]
    struct CountingFetcher {
        inner: MemoryFetcher,
        calls: Rc<Cell<usize>>,
    }

    impl Fetcher for CountingFetcher {
        fn fetch(&self, url: &str) -> Result<String, ConvertError> {
            self.calls.set(self.calls.get() + 1);
            self.inner.fetch(url)
        }
    }

    #[test]
    fn remote_reference_is_fetched_once() {
        let calls = Rc::new(Cell::new(0));
        let fetcher = CountingFetcher {
            inner: MemoryFetcher::default().with_document(
                "https://specs.example.com/common.json",
                r#"{"Error": {"type": "object"}, "Id": {"type": "integer"}}"#,
            ),
            calls: Rc::clone(&calls),
        };
        let mut r = Resolver::new(&ResolverSettings::default()).with_fetcher(Box::new(fetcher));
        let d = doc();

        let a = r.resolve("https://specs.example.com/common.json#/Error", &d).unwrap();
        let b = r.resolve("https://specs.example.com/common.json#/Id", &d).unwrap();
        let c = r.resolve("https://specs.example.com/common.json#/Error", &d).unwrap();
        assert_eq!(a["type"], "object");
        assert_eq!(b["type"], "integer");
        assert_eq!(a, c);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn url_valued_target_is_followed() {
        let fetcher = MemoryFetcher::default()
            .with_document("https://h/shared.yaml", "Pet:\n  type: object\n");
        let mut r = Resolver::new(&ResolverSettings::default()).with_fetcher(Box::new(fetcher));
        let d = SchemaDocument::from_value(json!({"x": {"remote": "https://h/shared.yaml#/Pet"}}));
        let v = r.resolve("#/x/remote", &d).unwrap();
        assert_eq!(v, json!({"type": "object"}));
    }

    #[test]
    fn fetch_failure_is_raised() {
        let mut r = resolver();
        let d = doc();
        assert!(matches!(
            r.resolve("https://offline.example.com/a.json#/x", &d),
            Err(ConvertError::Fetch { .. })
        ));
    }

    #[test]
    fn local_file_reference() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("common.yaml"),
            "schemas:\n  Tag:\n    type: string\n",
        )
        .unwrap();
        let mut r = resolver().with_base_dir(Some(dir.path().to_path_buf()));
        let d = SchemaDocument::from_value(json!({"file": "common.yaml"}));

        let v = r.resolve("common.yaml#/schemas/Tag", &d).unwrap();
        assert_eq!(v, json!({"type": "string"}));

        let whole = r.resolve("#/file", &d).unwrap();
        assert_eq!(whole["schemas"]["Tag"]["type"], "string");
    }

    #[test]
    fn changing_base_dir_reloads_relative_files() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(first.path().join("common.yaml"), "Tag:\n  type: string\n").unwrap();
        std::fs::write(second.path().join("common.yaml"), "Tag:\n  type: integer\n").unwrap();
        let d = SchemaDocument::from_value(json!({}));

        let mut r = resolver().with_base_dir(Some(first.path().to_path_buf()));
        let v = r.resolve("common.yaml#/Tag", &d).unwrap();
        assert_eq!(v, json!({"type": "string"}));

        r.set_base_dir(Some(second.path().to_path_buf()));
        assert_eq!(r.cached(), 0);
        let v = r.resolve("common.yaml#/Tag", &d).unwrap();
        assert_eq!(v, json!({"type": "integer"}));
    }

    #[test]
    fn plain_string_target_is_kept() {
        let mut r = resolver();
        let d = SchemaDocument::from_value(json!({"note": "just text"}));
        assert_eq!(r.resolve("#/note", &d).unwrap(), json!("just text"));
    }
}
