//! Test data synthesis for route parameters and request bodies

use pmforge_core::config::{PickStrategy, SynthesisSettings};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_json::{Value, json};
use tracing::{debug, error, warn};

use crate::datagen::Samples;
use crate::error::ConvertError;
use crate::params::{LocationValues, OperationSpec, ParamLocation};
use crate::resolver::contains_reference;
use crate::routes::{Route, segment_variables, url_variables};

/// `null`, `""`, `[]` and `{}` carry no test data.
#[must_use]
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Draws constrained sample values.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    settings: SynthesisSettings,
    seed: u64,
    draws: u64,
}

impl Synthesizer {
    #[must_use]
    pub fn new(settings: SynthesisSettings) -> Self {
        let seed = settings.seed.unwrap_or_else(rand::random);
        Self {
            settings,
            seed,
            draws: 0,
        }
    }

    /// Tighten an unconstrained string or integer leaf.
    ///
    /// Strings without `minLength` and `format` get the configured minimum
    /// length; integers without `minimum` get the configured minimum.
    #[must_use]
    pub fn constrained(&self, schema: &Value) -> Value {
        let mut schema = schema.clone();
        let Some(obj) = schema.as_object_mut() else {
            return schema;
        };
        let kind = obj.get("type").and_then(Value::as_str).map(str::to_owned);
        match kind.as_deref() {
            Some("string") if !obj.contains_key("minLength") && !obj.contains_key("format") => {
                obj.insert("minLength".into(), json!(self.settings.str_min_length));
            }
            Some("integer") if !obj.contains_key("minimum") => {
                obj.insert("minimum".into(), json!(self.settings.int_min));
            }
            _ => {}
        }
        schema
    }

    /// One value satisfying `schema`.
    ///
    /// Up to `retries` batches of `batch_size` candidates are drawn, each
    /// batch from a fresh seed.
    ///
    /// # Errors
    ///
    /// Returns `ConvertError::Unsatisfiable` if every batch comes back empty
    pub fn sample(&mut self, schema: &Value) -> Result<Value, ConvertError> {
        let schema = self.constrained(schema);
        let min_len = schema
            .get("minLength")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let minimum = schema.get("minimum").and_then(Value::as_i64);
        let filter = move |v: &Value| match v {
            Value::String(s) => s.chars().count() as u64 >= min_len,
            Value::Number(n) => match (n.as_i64(), minimum) {
                (Some(i), Some(min)) => i >= min,
                _ => true,
            },
            _ => true,
        };

        let attempts = self.settings.retries.max(1);
        for attempt in 0..attempts {
            self.draws = self.draws.wrapping_add(1);
            let seed = self.seed.wrapping_add(self.draws);
            let candidates: Vec<Value> = Samples::new(&schema, seed, self.settings.batch_size)
                .with_filter(&filter)
                .collect();
            if let Some(value) = self.pick_one(candidates, seed) {
                return Ok(value);
            }
            debug!(attempt, "no acceptable candidate in batch, retrying");
        }
        Err(ConvertError::Unsatisfiable {
            schema: schema.to_string(),
            attempts,
        })
    }

    fn pick_one(&self, mut candidates: Vec<Value>, seed: u64) -> Option<Value> {
        if candidates.is_empty() {
            return None;
        }
        let index = match self.settings.pick {
            PickStrategy::First => 0,
            PickStrategy::Random => SmallRng::seed_from_u64(seed).gen_range(0..candidates.len()),
        };
        Some(candidates.swap_remove(index))
    }

    /// Synthesized values for every parameter, body property and path
    /// variable of a route.
    ///
    /// Leaves with unresolved references and empty samples are omitted.
    ///
    /// # Errors
    ///
    /// Returns `ConvertError::Unsatisfiable` if a leaf cannot be sampled
    pub fn synthesize(
        &mut self,
        route: &Route<'_>,
        spec: &OperationSpec,
    ) -> Result<LocationValues, ConvertError> {
        let label = route.label();
        let mut values = LocationValues::default();

        for param in &spec.parameters {
            match &param.location {
                ParamLocation::Other(location) => {
                    debug!(route = %label, name = %param.name, location = %location, "not synthesizing");
                }
                ParamLocation::Body => {
                    for (name, schema) in param.body_properties() {
                        if let Some(v) = self.leaf(&label, &name, schema.as_ref())? {
                            values.body.insert(name, v);
                        }
                    }
                }
                location => {
                    if let Some(v) = self.leaf(&label, &param.name, Some(&param.schema))? {
                        values.insert(location, &param.name, v);
                    }
                }
            }
        }

        if let Some(body) = &spec.request_body {
            for media in &body.media_types {
                for (name, schema) in &media.properties {
                    if values.request_body.contains_key(name) {
                        continue;
                    }
                    if let Some(v) = self.leaf(&label, name, schema.as_ref())? {
                        values.request_body.insert(name.clone(), v);
                    }
                }
            }
        }

        let mut template = url_variables(route.path);
        template.extend(segment_variables(route.path));
        for name in template {
            if values.path.contains_key(&name) {
                continue;
            }
            warn!(route = %label, variable = %name, "path variable is not a declared parameter, synthesizing a string");
            if let Some(v) = self.leaf(&label, &name, Some(&json!({"type": "string"})))? {
                values.path.insert(name, v);
            }
        }

        Ok(values)
    }

    fn leaf(
        &mut self,
        route: &str,
        name: &str,
        schema: Option<&Value>,
    ) -> Result<Option<Value>, ConvertError> {
        let Some(schema) = schema.filter(|s| !contains_reference(s)) else {
            error!(route = %route, name = %name, "schema holds an unresolved reference, skipping");
            return Ok(None);
        };
        let value = self.sample(schema).inspect_err(|e| {
            error!(route = %route, name = %name, error = %e, "test data synthesis failed");
        })?;
        if is_empty_value(&value) {
            debug!(route = %route, name = %name, "dropping empty sample");
            return Ok(None);
        }
        Ok(Some(value))
    }
}
