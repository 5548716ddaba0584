//! JSON Schema → sample `serde_json::Value` generator
//!
//! Handles the OpenAPI 3.x / JSON Schema subset found in request parameters:
//! string, integer, number, boolean, array, object, enum, const, anyOf,
//! oneOf, allOf. Schemas are expected to be resolved already; a leftover
//! `$ref` generates `null`, which then fails validation.
//!
//! [`Samples`] wraps generation as a lazy, finite, restartable sequence of
//! values that satisfy the schema and an optional filter.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value, json};
use tracing::debug;

/// Maximum recursion depth for schema traversal.
const MAX_DEPTH: u32 = 20;

/// Maximum string length (prevents OOM on absurd maxLength values).
const MAX_STRING_LEN: usize = 10_000;

/// Bound on generated floats (keeps the sampled range finite).
const MAX_NUMBER_MAGNITUDE: f64 = 1e15;

/// Extra predicate a sample must satisfy.
pub type Filter = dyn Fn(&Value) -> bool;

/// Lazy sequence of schema-conforming samples.
///
/// At most `draws` candidates are generated per pass; candidates rejected by
/// validation or the filter are skipped. [`Samples::restart`] replays the
/// exact same sequence.
pub struct Samples<'a> {
    schema: &'a Value,
    filter: Option<&'a Filter>,
    validator: Option<jsonschema::Validator>,
    seed: u64,
    draws: usize,
    remaining: usize,
    rng: SmallRng,
}

impl<'a> Samples<'a> {
    #[must_use]
    pub fn new(schema: &'a Value, seed: u64, draws: usize) -> Self {
        let validator = match jsonschema::validator_for(&assertable(schema)) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!(error = %e, "schema not usable for validation, skipping checks");
                None
            }
        };
        Self {
            schema,
            filter: None,
            validator,
            seed,
            draws,
            remaining: draws,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: &'a Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Rewind to the first sample.
    pub fn restart(&mut self) {
        self.rng = SmallRng::seed_from_u64(self.seed);
        self.remaining = self.draws;
    }

    fn accepts(&self, candidate: &Value) -> bool {
        self.validator
            .as_ref()
            .is_none_or(|v| v.is_valid(candidate))
            && self.filter.is_none_or(|f| f(candidate))
    }
}

impl Iterator for Samples<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        while self.remaining > 0 {
            self.remaining -= 1;
            let candidate = generate(self.schema, &mut self.rng);
            if self.accepts(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

/// Copy of `schema` without keywords the generator cannot honour.
fn assertable(schema: &Value) -> Value {
    match schema {
        Value::Object(obj) => Value::Object(
            obj.iter()
                .filter(|(k, _)| !matches!(k.as_str(), "pattern" | "format" | "$ref"))
                .map(|(k, v)| (k.clone(), assertable(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(assertable).collect()),
        other => other.clone(),
    }
}

/// Generate one random value conforming to `schema`.
pub fn generate(schema: &Value, rng: &mut impl Rng) -> Value {
    generate_inner(schema, rng, 0)
}

fn generate_inner(schema: &Value, rng: &mut impl Rng, depth: u32) -> Value {
    if depth > MAX_DEPTH || schema.get("$ref").is_some() {
        return Value::Null;
    }

    if let Some(value) = schema.get("const") {
        return value.clone();
    }

    if let Some(enum_values) = schema.get("enum").and_then(|v| v.as_array()) {
        if !enum_values.is_empty() {
            return enum_values[rng.gen_range(0..enum_values.len())].clone();
        }
    }

    // anyOf / oneOf: pick one non-null variant
    for key in &["anyOf", "oneOf"] {
        if let Some(variants) = schema.get(*key).and_then(|v| v.as_array()) {
            let non_null: Vec<_> = variants
                .iter()
                .filter(|s| s.get("type").and_then(|t| t.as_str()) != Some("null"))
                .collect();
            if non_null.is_empty() {
                return Value::Null;
            }
            return generate_inner(non_null[rng.gen_range(0..non_null.len())], rng, depth + 1);
        }
    }

    // allOf: merge generated objects
    if let Some(all_of) = schema.get("allOf").and_then(|v| v.as_array()) {
        let mut merged = Map::new();
        for sub in all_of {
            match generate_inner(sub, rng, depth + 1) {
                Value::Object(obj) => merged.extend(obj),
                other if all_of.len() == 1 => return other,
                _ => {}
            }
        }
        return Value::Object(merged);
    }

    match schema_type(schema) {
        "string" => gen_string(schema, rng),
        "integer" => gen_integer(schema, rng),
        "number" => gen_number(schema, rng),
        "boolean" => Value::Bool(rng.gen_bool(0.5)),
        "array" => gen_array(schema, rng, depth + 1),
        "object" => gen_object(schema, rng, depth + 1),
        "null" => Value::Null,
        _ => {
            // Infer from structure
            if schema.get("properties").is_some() {
                gen_object(schema, rng, depth + 1)
            } else if schema.get("items").is_some() {
                gen_array(schema, rng, depth + 1)
            } else {
                Value::String(random_alnum(rng, 8))
            }
        }
    }
}

/// `type` keyword; for a type list the first non-null entry.
fn schema_type(schema: &Value) -> &str {
    match schema.get("type") {
        Some(Value::String(t)) => t,
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null")
            .unwrap_or("null"),
        _ => "",
    }
}

fn gen_string(schema: &Value, rng: &mut impl Rng) -> Value {
    let format = schema.get("format").and_then(|v| v.as_str());
    match format {
        Some("email") => Value::String(format!("user{}@example.com", rng.gen_range(1..9999_u32))),
        Some("uri" | "url") => Value::String("https://example.com".into()),
        Some("hostname") => Value::String("example.com".into()),
        Some("ipv4") => Value::String(format!(
            "10.{}.{}.{}",
            rng.gen_range(0..=255_u8),
            rng.gen_range(0..=255_u8),
            rng.gen_range(1..=254_u8)
        )),
        Some("date") => Value::String("2024-01-15".into()),
        Some("date-time") => Value::String("2024-01-15T12:00:00Z".into()),
        Some("uuid") => Value::String(format!(
            "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
            rng.r#gen::<u32>(),
            rng.r#gen::<u16>(),
            rng.r#gen::<u16>() & 0x0FFF,
            (rng.r#gen::<u16>() & 0x3FFF) | 0x8000,
            rng.r#gen::<u64>() & 0xFFFF_FFFF_FFFF,
        )),
        _ => {
            let min = schema
                .get("minLength")
                .and_then(|v| v.as_u64())
                .map_or(0, |v| (v as usize).min(MAX_STRING_LEN));
            let max = schema
                .get("maxLength")
                .and_then(|v| v.as_u64())
                .map_or(20, |v| (v as usize).min(MAX_STRING_LEN));
            let len = rng.gen_range(min..=max.max(min));
            Value::String(random_alnum(rng, len))
        }
    }
}

fn gen_integer(schema: &Value, rng: &mut impl Rng) -> Value {
    let (mut min, mut max) = (-1000_i64, 1000_i64);
    if let Some(m) = schema.get("minimum").and_then(|v| v.as_i64()) {
        min = m;
        if schema.get("exclusiveMinimum").and_then(Value::as_bool) == Some(true) {
            min = min.saturating_add(1);
        }
        if schema.get("maximum").is_none() {
            max = min.saturating_add(1000);
        }
    }
    if let Some(m) = schema.get("exclusiveMinimum").and_then(|v| v.as_i64()) {
        min = min.max(m.saturating_add(1));
    }
    if let Some(m) = schema.get("maximum").and_then(|v| v.as_i64()) {
        max = m;
        if schema.get("exclusiveMaximum").and_then(Value::as_bool) == Some(true) {
            max = max.saturating_sub(1);
        }
    }
    if let Some(m) = schema.get("exclusiveMaximum").and_then(|v| v.as_i64()) {
        max = max.min(m.saturating_sub(1));
    }
    let value = rng.gen_range(min..=max.max(min));

    match schema.get("multipleOf").and_then(|v| v.as_i64()).filter(|m| *m > 0) {
        Some(step) => {
            let rounded = (value / step) * step;
            let rounded = if rounded < min { rounded + step } else { rounded };
            Value::Number(rounded.into())
        }
        None => Value::Number(value.into()),
    }
}

fn gen_number(schema: &Value, rng: &mut impl Rng) -> Value {
    let min = schema
        .get("minimum")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
        .clamp(-MAX_NUMBER_MAGNITUDE, MAX_NUMBER_MAGNITUDE);
    let max = schema
        .get("maximum")
        .and_then(|v| v.as_f64())
        .unwrap_or(min + 1000.0)
        .clamp(-MAX_NUMBER_MAGNITUDE, MAX_NUMBER_MAGNITUDE);
    json!(rng.gen_range(min..=max.max(min)))
}

fn gen_array(schema: &Value, rng: &mut impl Rng, depth: u32) -> Value {
    let min = schema.get("minItems").and_then(|v| v.as_u64()).unwrap_or(1) as usize;
    let max = schema.get("maxItems").and_then(|v| v.as_u64()).unwrap_or(3) as usize;
    let count = rng.gen_range(min..=max.max(min));
    let items_schema = schema
        .get("items")
        .cloned()
        .unwrap_or(json!({"type": "string"}));
    Value::Array(
        (0..count)
            .map(|_| generate_inner(&items_schema, rng, depth))
            .collect(),
    )
}

fn gen_object(schema: &Value, rng: &mut impl Rng, depth: u32) -> Value {
    let mut obj = Map::new();
    let required: Vec<&str> = schema
        .get("required")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    if let Some(props) = schema.get("properties").and_then(|v| v.as_object()) {
        for (key, prop_schema) in props {
            if required.contains(&key.as_str()) || rng.gen_bool(0.5) {
                obj.insert(key.clone(), generate_inner(prop_schema, rng, depth));
            }
        }
    }
    Value::Object(obj)
}

fn random_alnum(rng: &mut impl Rng, len: usize) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    #[test]
    fn string_respects_length() {
        let schema = json!({"type": "string", "minLength": 3, "maxLength": 5});
        let mut r = rng();
        for _ in 0..50 {
            let v = generate(&schema, &mut r);
            let len = v.as_str().unwrap().len();
            assert!((3..=5).contains(&len), "len {len}");
        }
    }

    #[test]
    fn integer_respects_bounds() {
        let schema = json!({"type": "integer", "minimum": 1});
        let mut r = rng();
        for _ in 0..100 {
            let v = generate(&schema, &mut r).as_i64().unwrap();
            assert!(v >= 1, "got {v}");
        }
    }

    #[test]
    fn integer_exclusive_and_multiple() {
        let schema = json!({"type": "integer", "exclusiveMinimum": 0, "maximum": 100, "multipleOf": 10});
        let mut r = rng();
        for _ in 0..100 {
            let v = generate(&schema, &mut r).as_i64().unwrap();
            assert!(v > 0 && v <= 100 && v % 10 == 0, "got {v}");
        }
    }

    #[test]
    fn number_with_extreme_bounds() {
        let schema = json!({"type": "number", "minimum": -f64::MAX, "maximum": f64::MAX});
        let mut r = rng();
        for _ in 0..20 {
            let v = generate(&schema, &mut r).as_f64().unwrap();
            assert!(v.is_finite());
            assert!(v.abs() <= MAX_NUMBER_MAGNITUDE);
        }
        let v = generate(&json!({"type": "number", "minimum": f64::MAX}), &mut r);
        assert!(v.as_f64().unwrap().is_finite());
    }

    #[test]
    fn enum_and_const() {
        let mut r = rng();
        let v = generate(&json!({"enum": ["available", "sold"]}), &mut r);
        assert!(v == "available" || v == "sold");
        assert_eq!(generate(&json!({"const": 7}), &mut r), json!(7));
    }

    #[test]
    fn nullable_type_list() {
        let mut r = rng();
        let v = generate(&json!({"type": ["null", "integer"], "minimum": 5}), &mut r);
        assert!(v.as_i64().unwrap() >= 5);
    }

    #[test]
    fn object_includes_required() {
        let schema = json!({
            "type": "object",
            "required": ["id", "name"],
            "properties": {
                "id": {"type": "integer"},
                "name": {"type": "string"},
                "tag": {"type": "string"}
            }
        });
        let mut r = rng();
        for _ in 0..20 {
            let v = generate(&schema, &mut r);
            assert!(v.get("id").is_some());
            assert!(v.get("name").is_some());
        }
    }

    #[test]
    fn unresolved_reference_is_null() {
        let mut r = rng();
        assert_eq!(
            generate(&json!({"$ref": "#/components/schemas/Pet"}), &mut r),
            Value::Null
        );
    }

    // ── Samples ──

    #[test]
    fn samples_are_finite_and_valid() {
        let schema = json!({"type": "integer", "minimum": 10, "maximum": 20});
        let values: Vec<Value> = Samples::new(&schema, 1, 15).collect();
        assert!(!values.is_empty());
        assert!(values.len() <= 15);
        assert!(values.iter().all(|v| (10..=20).contains(&v.as_i64().unwrap())));
    }

    #[test]
    fn samples_restart_replays() {
        let schema = json!({"type": "string", "minLength": 1});
        let mut samples = Samples::new(&schema, 9, 10);
        let first: Vec<Value> = samples.by_ref().collect();
        assert_eq!(samples.next(), None);
        samples.restart();
        let second: Vec<Value> = samples.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn filter_can_reject_everything() {
        let schema = json!({"type": "integer", "minimum": 1, "maximum": 5});
        let never = |_: &Value| false;
        let values: Vec<Value> = Samples::new(&schema, 3, 10).with_filter(&never).collect();
        assert!(values.is_empty());
    }

    #[test]
    fn pattern_is_not_asserted() {
        let schema = json!({"type": "string", "pattern": "^[0-9]{3}$", "minLength": 1});
        let values: Vec<Value> = Samples::new(&schema, 5, 5).collect();
        assert!(!values.is_empty());
    }
}
