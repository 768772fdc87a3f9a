//! Closed schema model.
//!
//! Raw JSON schema nodes are classified once at the boundary
//! ([`Schema::from_json`]); everything downstream matches on [`Schema`]
//! exhaustively and never looks at raw JSON again.
pub mod classify;

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};

use crate::error::LoadError;
pub use classify::{SchemaForm, classify};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Boolean,
    String,
    Timestamp,
    Float32,
    Float64,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub id: Option<String>,
    pub description: Option<String>,
    pub is_deprecated: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertiesSchema {
    pub properties: IndexMap<String, Schema>,
    pub optional_properties: IndexMap<String, Schema>,
    pub additional_properties: bool,
    pub nullable: bool,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    Type {
        scalar: ScalarType,
        nullable: bool,
        metadata: Metadata,
    },
    Enum {
        values: Vec<String>,
        nullable: bool,
        metadata: Metadata,
    },
    Properties(PropertiesSchema),
    Elements {
        elements: Box<Schema>,
        nullable: bool,
        metadata: Metadata,
    },
    Values {
        values: Box<Schema>,
        nullable: bool,
        metadata: Metadata,
    },
    Discriminator {
        discriminator: String,
        mapping: IndexMap<String, PropertiesSchema>,
        nullable: bool,
        metadata: Metadata,
    },
    /// Name of a top-level definition. Never carries `nullable`.
    Ref { name: String, metadata: Metadata },
    Any { metadata: Metadata },
}

// ————————————————————————————————————————————————————————————————————————————
// SCALARS
// ————————————————————————————————————————————————————————————————————————————

impl ScalarType {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "boolean" => Self::Boolean,
            "string" => Self::String,
            "timestamp" => Self::Timestamp,
            "float32" => Self::Float32,
            "float64" => Self::Float64,
            "int8" => Self::Int8,
            "uint8" => Self::Uint8,
            "int16" => Self::Int16,
            "uint16" => Self::Uint16,
            "int32" => Self::Int32,
            "uint32" => Self::Uint32,
            "int64" => Self::Int64,
            "uint64" => Self::Uint64,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Timestamp => "timestamp",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Int8 => "int8",
            Self::Uint8 => "uint8",
            Self::Int16 => "int16",
            Self::Uint16 => "uint16",
            Self::Int32 => "int32",
            Self::Uint32 => "uint32",
            Self::Int64 => "int64",
            Self::Uint64 => "uint64",
        }
    }

    /// 64-bit integers travel as quoted decimal strings.
    pub fn is_large_int(self) -> bool {
        matches!(self, Self::Int64 | Self::Uint64)
    }

    /// Inclusive bounds for integers that travel as JSON numbers.
    pub fn int_bounds(self) -> Option<(i64, i64)> {
        match self {
            Self::Int8 => Some((i8::MIN.into(), i8::MAX.into())),
            Self::Uint8 => Some((0, u8::MAX.into())),
            Self::Int16 => Some((i16::MIN.into(), i16::MAX.into())),
            Self::Uint16 => Some((0, u16::MAX.into())),
            Self::Int32 => Some((i32::MIN.into(), i32::MAX.into())),
            Self::Uint32 => Some((0, u32::MAX.into())),
            _ => None,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CLASSIFY + VALIDATE
// ————————————————————————————————————————————————————————————————————————————

impl Schema {
    /// Classify a raw node. `schema_path` is only used for error messages.
    pub fn from_json(node: &Value, schema_path: &str) -> Result<Self, LoadError> {
        let metadata = node
            .as_object()
            .map(parse_metadata)
            .unwrap_or_default();
        let nullable = node
            .get("nullable")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let form = classify(node);
        let Some(object) = node.as_object() else {
            tracing::debug!(%schema_path, "schema node is not an object, treating as any");
            return Ok(Self::Any { metadata });
        };
        Ok(match form {
            SchemaForm::Type => {
                // checked by the predicate
                let scalar = object
                    .get("type")
                    .and_then(Value::as_str)
                    .and_then(ScalarType::parse)
                    .unwrap_or(ScalarType::String);
                Self::Type { scalar, nullable, metadata }
            }
            SchemaForm::Enum => {
                let values = object
                    .get("enum")
                    .and_then(Value::as_array)
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_owned)
                            .collect()
                    })
                    .unwrap_or_default();
                Self::Enum { values, nullable, metadata }
            }
            SchemaForm::Properties => {
                Self::Properties(parse_properties(object, schema_path, None)?)
            }
            SchemaForm::Elements => Self::Elements {
                elements: Box::new(Self::from_json(
                    &object["elements"],
                    &format!("{schema_path}/elements"),
                )?),
                nullable,
                metadata,
            },
            SchemaForm::Values => Self::Values {
                values: Box::new(Self::from_json(
                    &object["values"],
                    &format!("{schema_path}/values"),
                )?),
                nullable,
                metadata,
            },
            SchemaForm::Discriminator => {
                let discriminator = object
                    .get("discriminator")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                let mut mapping = IndexMap::new();
                if let Some(Value::Object(members)) = object.get("mapping") {
                    for (tag, member) in members {
                        let member_path = format!("{schema_path}/mapping/{tag}");
                        let Some(member) = member.as_object() else {
                            continue;
                        };
                        let props = parse_properties(member, &member_path, Some(&discriminator))?;
                        mapping.insert(tag.clone(), props);
                    }
                }
                Self::Discriminator {
                    discriminator,
                    mapping,
                    nullable,
                    metadata,
                }
            }
            SchemaForm::Ref => Self::Ref {
                name: object
                    .get("ref")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
                metadata,
            },
            SchemaForm::Any => {
                if !object.is_empty() && !only_annotations(object) {
                    tracing::debug!(%schema_path, "unrecognised schema shape, treating as any");
                }
                Self::Any { metadata }
            }
        })
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Self::Type { metadata, .. }
            | Self::Enum { metadata, .. }
            | Self::Elements { metadata, .. }
            | Self::Values { metadata, .. }
            | Self::Discriminator { metadata, .. }
            | Self::Ref { metadata, .. }
            | Self::Any { metadata } => metadata,
            Self::Properties(props) => &props.metadata,
        }
    }

    pub fn nullable(&self) -> bool {
        match self {
            Self::Type { nullable, .. }
            | Self::Enum { nullable, .. }
            | Self::Elements { nullable, .. }
            | Self::Values { nullable, .. }
            | Self::Discriminator { nullable, .. } => *nullable,
            Self::Properties(props) => props.nullable,
            Self::Ref { .. } | Self::Any { .. } => false,
        }
    }

    pub fn form(&self) -> SchemaForm {
        match self {
            Self::Type { .. } => SchemaForm::Type,
            Self::Enum { .. } => SchemaForm::Enum,
            Self::Properties(_) => SchemaForm::Properties,
            Self::Elements { .. } => SchemaForm::Elements,
            Self::Values { .. } => SchemaForm::Values,
            Self::Discriminator { .. } => SchemaForm::Discriminator,
            Self::Ref { .. } => SchemaForm::Ref,
            Self::Any { .. } => SchemaForm::Any,
        }
    }

    /// Forms that become a named declaration of their own.
    pub fn is_nominal(&self) -> bool {
        matches!(
            self,
            Self::Properties(_) | Self::Enum { .. } | Self::Discriminator { .. }
        )
    }

    /// Collect every ref name reachable inside this node (not through refs).
    pub fn collect_refs(&self, out: &mut IndexSet<String>) {
        match self {
            Self::Ref { name, .. } => {
                out.insert(name.clone());
            }
            Self::Properties(props) => props.collect_refs(out),
            Self::Elements { elements: inner, .. } | Self::Values { values: inner, .. } => {
                inner.collect_refs(out)
            }
            Self::Discriminator { mapping, .. } => {
                for member in mapping.values() {
                    member.collect_refs(out);
                }
            }
            Self::Type { .. } | Self::Enum { .. } | Self::Any { .. } => {}
        }
    }

    /// Normalized JSON form: only the keys this crate understands.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        match self {
            Self::Type { scalar, nullable, .. } => {
                out.insert("type".into(), Value::from(scalar.as_str()));
                insert_nullable(&mut out, *nullable);
            }
            Self::Enum { values, nullable, .. } => {
                out.insert("enum".into(), Value::from(values.clone()));
                insert_nullable(&mut out, *nullable);
            }
            Self::Properties(props) => return props.to_json(),
            Self::Elements { elements, nullable, .. } => {
                out.insert("elements".into(), elements.to_json());
                insert_nullable(&mut out, *nullable);
            }
            Self::Values { values, nullable, .. } => {
                out.insert("values".into(), values.to_json());
                insert_nullable(&mut out, *nullable);
            }
            Self::Discriminator {
                discriminator,
                mapping,
                nullable,
                ..
            } => {
                out.insert("discriminator".into(), Value::from(discriminator.as_str()));
                let mapping = mapping
                    .iter()
                    .map(|(tag, member)| (tag.clone(), member.to_json()))
                    .collect::<Map<_, _>>();
                out.insert("mapping".into(), Value::Object(mapping));
                insert_nullable(&mut out, *nullable);
            }
            Self::Ref { name, .. } => {
                out.insert("ref".into(), Value::from(name.as_str()));
            }
            Self::Any { .. } => {}
        }
        insert_metadata(&mut out, self.metadata());
        Value::Object(out)
    }
}

impl PropertiesSchema {
    /// Required fields first, then optional fields, each in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Schema, bool)> {
        self.properties
            .iter()
            .map(|(key, schema)| (key, schema, false))
            .chain(
                self.optional_properties
                    .iter()
                    .map(|(key, schema)| (key, schema, true)),
            )
    }

    fn collect_refs(&self, out: &mut IndexSet<String>) {
        for (_, schema, _) in self.fields() {
            schema.collect_refs(out);
        }
    }

    fn to_json(&self) -> Value {
        let mut out = Map::new();
        if !self.properties.is_empty() || self.optional_properties.is_empty() {
            let props = self
                .properties
                .iter()
                .map(|(key, schema)| (key.clone(), schema.to_json()))
                .collect::<Map<_, _>>();
            out.insert("properties".into(), Value::Object(props));
        }
        if !self.optional_properties.is_empty() {
            let props = self
                .optional_properties
                .iter()
                .map(|(key, schema)| (key.clone(), schema.to_json()))
                .collect::<Map<_, _>>();
            out.insert("optionalProperties".into(), Value::Object(props));
        }
        if self.additional_properties {
            out.insert("additionalProperties".into(), Value::Bool(true));
        }
        insert_nullable(&mut out, self.nullable);
        insert_metadata(&mut out, &self.metadata);
        Value::Object(out)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn parse_metadata(node: &Map<String, Value>) -> Metadata {
    let Some(Value::Object(meta)) = node.get("metadata") else {
        return Metadata::default();
    };
    let text = |key: &str| meta.get(key).and_then(Value::as_str).map(str::to_owned);
    Metadata {
        id: text("id"),
        description: text("description"),
        is_deprecated: meta
            .get("isDeprecated")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }
}

fn parse_properties(
    node: &Map<String, Value>,
    schema_path: &str,
    discriminator: Option<&str>,
) -> Result<PropertiesSchema, LoadError> {
    let parse_group = |group: &str| -> Result<IndexMap<String, Schema>, LoadError> {
        let mut fields = IndexMap::new();
        if let Some(Value::Object(entries)) = node.get(group) {
            for (key, value) in entries {
                if discriminator == Some(key.as_str()) {
                    return Err(LoadError::DiscriminatorRedeclared {
                        schema_path: schema_path.to_owned(),
                        member: schema_path.rsplit('/').next().unwrap_or_default().to_owned(),
                        discriminator: key.clone(),
                    });
                }
                let field_path = format!("{schema_path}/{group}/{key}");
                fields.insert(key.clone(), Schema::from_json(value, &field_path)?);
            }
        }
        Ok(fields)
    };
    let properties = parse_group("properties")?;
    let optional_properties = parse_group("optionalProperties")?;
    if let Some(field) = properties
        .keys()
        .find(|key| optional_properties.contains_key(*key))
    {
        return Err(LoadError::DuplicateProperty {
            schema_path: schema_path.to_owned(),
            field: field.clone(),
        });
    }
    Ok(PropertiesSchema {
        properties,
        optional_properties,
        additional_properties: node
            .get("additionalProperties")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        nullable: node.get("nullable").and_then(Value::as_bool).unwrap_or(false),
        metadata: parse_metadata(node),
    })
}

fn only_annotations(node: &Map<String, Value>) -> bool {
    node.keys().all(|key| key == "metadata" || key == "nullable")
}

fn insert_nullable(out: &mut Map<String, Value>, nullable: bool) {
    if nullable {
        out.insert("nullable".into(), Value::Bool(true));
    }
}

fn insert_metadata(out: &mut Map<String, Value>, metadata: &Metadata) {
    if *metadata == Metadata::default() {
        return;
    }
    let mut meta = Map::new();
    if let Some(id) = &metadata.id {
        meta.insert("id".into(), Value::from(id.as_str()));
    }
    if let Some(description) = &metadata.description {
        meta.insert("description".into(), Value::from(description.as_str()));
    }
    if metadata.is_deprecated {
        meta.insert("isDeprecated".into(), Value::Bool(true));
    }
    out.insert("metadata".into(), Value::Object(meta));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn properties_keep_declaration_order() {
        let schema = Schema::from_json(
            &json!({
                "properties": {"id": {"type": "string"}, "name": {"type": "string"}},
                "optionalProperties": {"email": {"type": "string", "nullable": true}}
            }),
            "/User",
        )
        .unwrap();
        let Schema::Properties(props) = schema else {
            panic!("expected properties");
        };
        let keys = props.fields().map(|(key, _, optional)| (key.as_str(), optional)).collect::<Vec<_>>();
        assert_eq!(keys, vec![("id", false), ("name", false), ("email", true)]);
        assert!(props.optional_properties["email"].nullable());
    }

    #[test]
    fn required_and_optional_overlap_is_rejected() {
        let err = Schema::from_json(
            &json!({
                "properties": {"id": {"type": "string"}},
                "optionalProperties": {"id": {"type": "string"}}
            }),
            "/User",
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::DuplicateProperty { ref field, .. } if field == "id"));
    }

    #[test]
    fn member_redeclaring_discriminator_is_rejected() {
        let err = Schema::from_json(
            &json!({
                "discriminator": "type",
                "mapping": {
                    "TEXT": {"properties": {"type": {"type": "string"}}}
                }
            }),
            "/Message",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LoadError::DiscriminatorRedeclared { ref member, .. } if member == "TEXT"
        ));
    }

    #[test]
    fn metadata_is_read_from_any_form() {
        let schema = Schema::from_json(
            &json!({
                "enum": ["A"],
                "metadata": {"id": "Letter", "description": "one letter", "isDeprecated": true}
            }),
            "/Letter",
        )
        .unwrap();
        assert_eq!(
            schema.metadata(),
            &Metadata {
                id: Some("Letter".into()),
                description: Some("one letter".into()),
                is_deprecated: true,
            }
        );
    }

    #[test]
    fn unknown_keys_are_dropped_when_normalizing() {
        let schema = Schema::from_json(
            &json!({"elements": {"type": "int64", "x-extra": 1}, "nullable": true}),
            "/Ids",
        )
        .unwrap();
        assert_eq!(
            schema.to_json(),
            json!({"elements": {"type": "int64"}, "nullable": true})
        );
    }

    #[test]
    fn refs_are_collected_through_containers() {
        let schema = Schema::from_json(
            &json!({
                "properties": {
                    "left": {"ref": "Node"},
                    "children": {"elements": {"ref": "Leaf"}}
                }
            }),
            "/Node",
        )
        .unwrap();
        let mut refs = IndexSet::new();
        schema.collect_refs(&mut refs);
        assert_eq!(refs.into_iter().collect::<Vec<_>>(), vec!["Node", "Leaf"]);
    }
}
