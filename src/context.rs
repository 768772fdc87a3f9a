//! Generation context.
//!
//! [`Context`] is the per-branch part: cheap to clone and copied whenever the
//! recursion descends. [`RunState`] is the run-scoped part: a single value
//! owned by the orchestrator and threaded through every branch by `&mut`.
use std::collections::HashSet;
use std::fmt;

use indexmap::IndexSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    /// Where the node sits in the data; drives type naming.
    pub instance_path: String,
    /// Where the node was declared; used in diagnostics.
    pub schema_path: String,
    pub is_optional: bool,
    /// Set while lowering a discriminated union member.
    pub discriminator: Option<Discriminant>,
    /// Top-level definition this branch started from.
    pub root_definition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discriminant {
    pub key: String,
    pub value: String,
}

impl Context {
    pub fn for_definition(name: &str) -> Self {
        Self {
            instance_path: format!("/{name}"),
            schema_path: format!("/{name}"),
            root_definition: Some(name.to_owned()),
            ..Self::default()
        }
    }

    /// Field of the object named `type_name`.
    pub fn field(&self, type_name: &str, key: &str, optional: bool) -> Self {
        let group = if optional { "optionalProperties" } else { "properties" };
        Self {
            instance_path: format!("/{type_name}/{key}"),
            schema_path: format!("{}/{group}/{key}", self.schema_path),
            is_optional: optional,
            discriminator: None,
            root_definition: self.root_definition.clone(),
        }
    }

    pub fn element(&self) -> Self {
        Self {
            instance_path: format!("{}/0", self.instance_path),
            schema_path: format!("{}/elements", self.schema_path),
            is_optional: false,
            discriminator: None,
            root_definition: self.root_definition.clone(),
        }
    }

    pub fn record_value(&self) -> Self {
        Self {
            instance_path: format!("{}/value", self.instance_path),
            schema_path: format!("{}/values", self.schema_path),
            is_optional: false,
            discriminator: None,
            root_definition: self.root_definition.clone(),
        }
    }

    /// Member `tag` of the union named `union_name`.
    pub fn variant(&self, union_name: &str, key: &str, tag: &str) -> Self {
        Self {
            instance_path: format!("/{union_name}/{tag}"),
            schema_path: format!("{}/mapping/{tag}", self.schema_path),
            is_optional: false,
            discriminator: Some(Discriminant {
                key: key.to_owned(),
                value: tag.to_owned(),
            }),
            root_definition: self.root_definition.clone(),
        }
    }
}

/// Which runtime helpers the generated preamble must import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsedFeatures {
    pub sse: bool,
    pub ws: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub path: String,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Debug, Default)]
pub struct RunState {
    /// Named types already emitted in this run.
    pub generated_types: IndexSet<String>,
    pub used_features: UsedFeatures,
    pub warnings: Vec<Warning>,
    /// Types serialized into URL query strings by some procedure.
    pub query_param_types: HashSet<String>,
}

impl RunState {
    /// Returns `false` when `name` was already emitted.
    pub fn claim_type(&mut self, name: &str) -> bool {
        let fresh = self.generated_types.insert(name.to_owned());
        if !fresh {
            tracing::debug!(name, "type already generated, reusing");
        }
        fresh
    }

    pub fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        let warning = Warning {
            path: path.into(),
            message: message.into(),
        };
        tracing::warn!(path = %warning.path, "{}", warning.message);
        self.warnings.push(warning);
    }
}
