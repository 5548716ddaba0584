//! pmforge-engine: OpenAPI document → executable Postman collection

pub mod assembler;
pub mod builder;
pub mod datagen;
pub mod document;
pub mod error;
pub mod fetch;
pub mod params;
pub mod precedence;
pub mod resolver;
pub mod routes;
pub mod scripts;
pub mod synthesize;

pub use assembler::{Converter, RouteContribution};
pub use builder::{BuildOptions, BuiltRequestVariables, build_request_variables};
pub use document::SchemaDocument;
pub use error::ConvertError;
pub use fetch::{Fetcher, HttpFetcher, MemoryFetcher};
pub use precedence::ProviderChain;
pub use resolver::{ResolveScope, Resolver};
pub use routes::{Route, enumerate_routes, guess_resource, order_routes_by_resource};
pub use synthesize::Synthesizer;
