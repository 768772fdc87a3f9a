//! Schema-driven RPC client generator.
//!
//! An application definition (procedures keyed by dotted paths plus a flat map
//! of JTD-like model definitions) is classified into a closed [`schema::Schema`]
//! tree, lowered into a small emission IR ([`ir`]) and rendered by one of the
//! [`codegen`] targets:
//!
//! ```text
//! definition.json → app_def (classify) → lower (IR + dedup) → Target → source text
//! ```
//!
//! The crate also carries the byte-level wire formats the generated clients
//! speak: [`wire`] for JSON bodies and query strings, [`sse`] for event-stream
//! framing, retry/backoff and the subscription driver.

pub mod app_def;
pub mod cli;
pub mod code_writer;
pub mod codegen;
pub mod context;
pub mod error;
pub mod ir;
pub mod load;
pub mod lower;
pub mod naming;
pub mod output;
pub mod schema;
pub mod sse;
pub mod wire;

pub use app_def::AppDefinition;
pub use codegen::{GeneratedOutput, GeneratorOptions, TargetKind, generate};
