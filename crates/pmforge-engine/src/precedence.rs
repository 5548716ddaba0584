//! Ordered value providers
//!
//! A lookup walks the providers in order and returns the first value found,
//! together with the name of the provider that supplied it.

use indexmap::IndexMap;
use serde_json::Value;

use crate::params::{LocationValues, ParamLocation};

pub const CONFIG: &str = "config";
pub const EXAMPLE: &str = "example";
pub const SYNTHESIZED: &str = "synthesized";

/// A value and where it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Provided<'a> {
    pub provider: &'static str,
    pub value: &'a Value,
}

#[derive(Debug, Clone, Default)]
pub struct ProviderChain<'a> {
    providers: Vec<(&'static str, &'a LocationValues)>,
}

impl<'a> ProviderChain<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider with lower precedence than those already present.
    #[must_use]
    pub fn with(mut self, name: &'static str, values: &'a LocationValues) -> Self {
        self.providers.push((name, values));
        self
    }

    #[must_use]
    pub fn lookup(&self, location: &ParamLocation, name: &str) -> Option<Provided<'a>> {
        self.providers.iter().find_map(|&(provider, values)| {
            values.get(location, name).map(|value| Provided {
                provider,
                value,
            })
        })
    }

    /// Merge one section across providers, higher precedence winning.
    ///
    /// With `keys`, only those keys are taken, in that order; otherwise every
    /// key of every provider.
    #[must_use]
    pub fn merged(
        &self,
        section: impl Fn(&LocationValues) -> &IndexMap<String, Value>,
        keys: Option<&[String]>,
    ) -> IndexMap<String, Value> {
        let mut out = IndexMap::new();
        match keys {
            Some(keys) => {
                for key in keys {
                    if let Some(value) = self
                        .providers
                        .iter()
                        .find_map(|&(_, values)| section(values).get(key))
                    {
                        out.insert(key.clone(), value.clone());
                    }
                }
            }
            None => {
                for &(_, values) in &self.providers {
                    for (key, value) in section(values) {
                        out.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                }
            }
        }
        out
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.iter().all(|(_, values)| values.is_empty())
    }
}
