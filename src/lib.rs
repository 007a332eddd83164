//! modelgen
//!
//! A deterministic schema-to-data-model code generator. Given a schema
//! document (OpenAPI, JSON Schema, GraphQL SDL, or sample data) it emits
//! source files containing structurally equivalent data types with their
//! fields, constraints, enumerations, and cross-references. Output is
//! stable under re-runs and faithful to the source schema.
//!
//! ## Pipeline
//!
//! ```text
//! parse -> resolve -> materialize -> normalize -> partition -> emit
//!   input    reference   datatype      names        modules     emit
//!            resolve     model         dedup
//!                                      graph
//! ```
//!
//! The core is a pure function from (schema, config) to artifacts, modulo
//! remote fetches. All traversal orders derive from document order or
//! lexicographic keys, never from hash iteration.

pub mod config;
pub mod datatype;
pub mod dedup;
pub mod diagnostics;
pub mod emit;
pub mod error;
pub mod graph;
pub mod graphql;
pub mod input;
pub mod model;
pub mod modules;
pub mod names;
pub mod pipeline;
pub mod printer;
pub mod reference;
pub mod resolve;

pub use config::{GenerateConfig, InputKind, OutputModelType, ReuseScope};
pub use diagnostics::{DiagnosticItem, Diagnostics};
pub use error::{GeneratorError, Result};
pub use input::Input;
pub use pipeline::{generate, generate_with, Artifacts};
