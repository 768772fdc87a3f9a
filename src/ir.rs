// Emission IR shared by every target. No serde_json::Value here.

use crate::app_def::HttpMethod;
use crate::context::Discriminant;
use crate::schema::ScalarType;

// ————————————————————————————————————————————————————————————————————————————
// FIELD SHAPES
// ————————————————————————————————————————————————————————————————————————————

/// A field type as seen from the declaration that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub kind: ShapeKind,
    pub nullable: bool,
    pub optional: bool,        // field may be absent
    pub instance_path: String,
    pub schema_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShapeKind {
    Scalar(ScalarType),
    Enum { name: String },
    Object { name: String },
    Union { name: String },
    Array(Box<Shape>),
    Record(Box<Shape>),        // string keys
    Ref { name: String, recursive: bool },
    Any,
}

impl Shape {
    /// Scalars and enums flatten into `key=value`.
    pub fn can_be_query_string(&self) -> bool {
        matches!(self.kind, ShapeKind::Scalar(_) | ShapeKind::Enum { .. })
    }

    /// Same shape, seen after the presence check of an optional field.
    pub fn as_present(&self) -> Shape {
        Shape {
            optional: false,
            ..self.clone()
        }
    }

    /// Name of the declaration this shape refers to, if any.
    pub fn decl_name(&self) -> Option<&str> {
        match &self.kind {
            ShapeKind::Enum { name }
            | ShapeKind::Object { name }
            | ShapeKind::Union { name }
            | ShapeKind::Ref { name, .. } => Some(name),
            _ => None,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DECLARATIONS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: String,           // wire name
    pub shape: Shape,
    pub description: Option<String>,
    pub is_deprecated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDecl {
    pub name: String,
    pub fields: Vec<Field>,    // required first, then optional
    pub tag: Option<Discriminant>, // injected first when a union member
    pub description: Option<String>,
    pub is_deprecated: bool,
    pub instance_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: String,
    pub values: Vec<String>,
    pub description: Option<String>,
    pub is_deprecated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionDecl {
    pub name: String,
    pub discriminator: String,
    pub variants: Vec<ObjectDecl>, // mapping order
    pub description: Option<String>,
    pub is_deprecated: bool,
    pub instance_path: String,
}

/// Non-nominal top-level definition, exported under its own name.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasDecl {
    pub name: String,
    pub shape: Shape,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Object(ObjectDecl),
    Enum(EnumDecl),
    Union(UnionDecl),
    Alias(AliasDecl),
}

impl Decl {
    pub fn name(&self) -> &str {
        match self {
            Decl::Object(decl) => &decl.name,
            Decl::Enum(decl) => &decl.name,
            Decl::Union(decl) => &decl.name,
            Decl::Alias(decl) => &decl.name,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SERVICES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDecl {
    pub name: String,
    pub path: Vec<String>,     // keys from the root
    pub procedures: Vec<ProcedureDecl>,
    pub sub_services: Vec<SubService>,
    pub children: Vec<ServiceDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubService {
    pub key: String,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureDecl {
    pub key: String,
    pub rpc_path: String,      // dotted key, for diagnostics
    pub http_path: String,
    pub method: HttpMethod,
    pub params: Option<String>,
    pub response: Option<String>,
    pub is_event_stream: bool,
    pub is_deprecated: bool,
    pub description: Option<String>,
}

impl ServiceDecl {
    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty() && self.sub_services.is_empty()
    }

    /// This service followed by every descendant, parent first.
    pub fn walk(&self) -> Vec<&ServiceDecl> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }
}
