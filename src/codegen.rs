//! Top-level orchestration and the per-target rendering interface.
//!
//! `generate` unflattens the procedures, lowers services first (so params
//! types that travel in query strings are known) and then every top-level
//! definition, and finally asks a [`Target`] to print the preamble, the
//! services and the model declarations, in that order.
pub mod rust;
pub mod typescript;

use std::fmt;
use std::str::FromStr;

use crate::app_def::{AppDefinition, unflatten_procedures};
use crate::code_writer::CodeWriter;
use crate::context::{Discriminant, UsedFeatures, Warning};
use crate::error::GenerateError;
use crate::ir::{Decl, Field, ServiceDecl, Shape};
use crate::lower::Lowerer;

pub use rust::RustTarget;
pub use typescript::TypeScriptTarget;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratorOptions {
    pub client_name: String,
    pub type_prefix: String,
    /// Overrides `info.version` from the definition.
    pub client_version: Option<String>,
    /// Run the target's formatter after writing.
    pub format: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedOutput {
    pub source: String,
    pub warnings: Vec<Warning>,
    pub used_features: UsedFeatures,
}

/// Everything a target needs besides the node it is printing.
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    pub client_name: &'a str,
    pub type_prefix: &'a str,
    pub client_version: &'a str,
    pub schema_version: &'a str,
    pub features: UsedFeatures,
    pub has_services: bool,
}

/// One output language.
///
/// The fragment methods take a source expression and return target source
/// text; `render_*` print whole declarations through a [`CodeWriter`].
pub trait Target: Send + Sync {
    fn kind(&self) -> TargetKind;

    fn type_name(&self, shape: &Shape, cx: &RenderContext<'_>) -> String;

    /// Empty when the shape is nullable; the null state is the default then.
    fn default_value(&self, shape: &Shape, cx: &RenderContext<'_>) -> String;

    /// Statements that declare `target` and bind the decoded `input` to it.
    fn decode(&self, shape: &Shape, cx: &RenderContext<'_>, input: &str, target: &str) -> String;

    /// Statements appending the JSON encoding of `input` to `target`.
    fn encode_json(&self, shape: &Shape, cx: &RenderContext<'_>, input: &str, target: &str) -> String;

    /// Statements pushing `key=value` for `input` onto `target`.
    fn encode_query(
        &self,
        shape: &Shape,
        cx: &RenderContext<'_>,
        input: &str,
        target: &str,
        key: &str,
    ) -> String;

    /// Expression producing a deep copy of `input`.
    fn clone_value(&self, shape: &Shape, cx: &RenderContext<'_>, input: &str) -> String;

    fn render_preamble(&self, w: &mut CodeWriter<&mut String>, cx: &RenderContext<'_>) -> fmt::Result;

    fn render_service(
        &self,
        w: &mut CodeWriter<&mut String>,
        service: &ServiceDecl,
        cx: &RenderContext<'_>,
    ) -> fmt::Result;

    fn render_decl(&self, w: &mut CodeWriter<&mut String>, decl: &Decl, cx: &RenderContext<'_>) -> fmt::Result;
}

/// Everything a composite renderer needs to know about one field.
pub struct PropertyPlan<'a> {
    target: &'a dyn Target,
    cx: &'a RenderContext<'a>,
    pub shape: &'a Shape,
    pub type_name: String,
    pub default_value: String,
    pub can_be_query_string: bool,
}

impl<'a> PropertyPlan<'a> {
    pub fn new(target: &'a dyn Target, cx: &'a RenderContext<'a>, shape: &'a Shape) -> Self {
        Self {
            target,
            cx,
            shape,
            type_name: target.type_name(shape, cx),
            default_value: target.default_value(shape, cx),
            can_be_query_string: shape.can_be_query_string(),
        }
    }

    pub fn decode(&self, input: &str, target: &str) -> String {
        self.target.decode(self.shape, self.cx, input, target)
    }

    pub fn encode_json(&self, input: &str, target: &str) -> String {
        self.target.encode_json(self.shape, self.cx, input, target)
    }

    pub fn encode_query(&self, input: &str, target: &str, key: &str) -> String {
        self.target.encode_query(self.shape, self.cx, input, target, key)
    }

    pub fn clone_value(&self, input: &str) -> String {
        self.target.clone_value(self.shape, self.cx, input)
    }
}

/// Leading fields are all optional, so the first JSON separator is only
/// known at runtime.
pub fn needs_key_counter(fields: &[Field], tag: Option<&Discriminant>) -> bool {
    tag.is_none() && fields.first().is_some_and(|field| field.shape.optional)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    TypeScript,
    Rust,
}

static TYPESCRIPT: TypeScriptTarget = TypeScriptTarget;
static RUST: RustTarget = RustTarget;

impl TargetKind {
    pub fn target(self) -> &'static dyn Target {
        match self {
            Self::TypeScript => &TYPESCRIPT,
            Self::Rust => &RUST,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::Rust => "rust",
        }
    }

    /// External formatter invoked on the written file.
    pub fn formatter(self) -> &'static [&'static str] {
        match self {
            Self::TypeScript => &["prettier", "--write"],
            Self::Rust => &["rustfmt", "--edition", "2021"],
        }
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "typescript" | "ts" => Ok(Self::TypeScript),
            "rust" | "rs" => Ok(Self::Rust),
            other => Err(format!("unknown target \"{other}\" (expected typescript or rust)")),
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ORCHESTRATION
// ————————————————————————————————————————————————————————————————————————————

pub fn generate(
    app: &AppDefinition,
    kind: TargetKind,
    options: &GeneratorOptions,
) -> Result<GeneratedOutput, GenerateError> {
    let target = kind.target();
    let tree = unflatten_procedures(&app.procedures)?;

    let mut lowerer = Lowerer::new(&app.definitions);
    let services = lowerer.lower_services(&tree, &options.client_name);
    lowerer.lower_definitions();
    if app.procedures.is_empty() {
        tracing::info!("no procedures defined, only data models will be generated");
    }

    let cx = RenderContext {
        client_name: &options.client_name,
        type_prefix: &options.type_prefix,
        client_version: options
            .client_version
            .as_deref()
            .or(app.version())
            .unwrap_or_default(),
        schema_version: &app.schema_version,
        features: lowerer.state.used_features,
        has_services: !services.is_empty(),
    };

    let mut source = String::new();
    let mut w = CodeWriter::with_indent_spaces(&mut source, 4);
    target.render_preamble(&mut w, &cx)?;
    if cx.has_services {
        for service in services.walk() {
            w.blank_line()?;
            target.render_service(&mut w, service, &cx)?;
        }
    }
    for decl in &lowerer.decls {
        w.blank_line()?;
        target.render_decl(&mut w, decl, &cx)?;
    }

    tracing::info!(
        language = %kind,
        declarations = lowerer.decls.len(),
        warnings = lowerer.state.warnings.len(),
        "generated client"
    );
    Ok(GeneratedOutput {
        source,
        warnings: lowerer.state.warnings,
        used_features: lowerer.state.used_features,
    })
}
