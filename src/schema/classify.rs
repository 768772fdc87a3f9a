//! Structural predicates over raw JSON schema nodes.
//!
//! The predicates run in a fixed order and the first one that matches decides
//! the form. Nothing here fails: a node that matches none of them is `Any`.
use serde_json::{Map, Value};

use super::ScalarType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaForm {
    Type,
    Enum,
    Properties,
    Elements,
    Values,
    Discriminator,
    Ref,
    Any,
}

pub fn is_type_form(node: &Map<String, Value>) -> bool {
    node.get("type")
        .and_then(Value::as_str)
        .is_some_and(|name| ScalarType::parse(name).is_some())
}

pub fn is_enum_form(node: &Map<String, Value>) -> bool {
    match node.get("enum") {
        Some(Value::Array(values)) => !values.is_empty() && values.iter().all(Value::is_string),
        _ => false,
    }
}

pub fn is_properties_form(node: &Map<String, Value>) -> bool {
    node.get("properties").is_some_and(Value::is_object)
        || node.get("optionalProperties").is_some_and(Value::is_object)
}

pub fn is_elements_form(node: &Map<String, Value>) -> bool {
    node.get("elements").is_some_and(Value::is_object)
}

pub fn is_values_form(node: &Map<String, Value>) -> bool {
    node.get("values").is_some_and(Value::is_object)
}

/// Every mapping member must itself be in properties form.
pub fn is_discriminator_form(node: &Map<String, Value>) -> bool {
    let Some(Value::String(_)) = node.get("discriminator") else {
        return false;
    };
    match node.get("mapping") {
        Some(Value::Object(mapping)) => mapping
            .values()
            .all(|member| member.as_object().is_some_and(is_properties_form)),
        _ => false,
    }
}

pub fn is_ref_form(node: &Map<String, Value>) -> bool {
    node.get("ref").is_some_and(Value::is_string)
}

pub fn classify(node: &Value) -> SchemaForm {
    let Some(node) = node.as_object() else {
        return SchemaForm::Any;
    };
    const PREDICATES: [(fn(&Map<String, Value>) -> bool, SchemaForm); 7] = [
        (is_type_form, SchemaForm::Type),
        (is_enum_form, SchemaForm::Enum),
        (is_properties_form, SchemaForm::Properties),
        (is_elements_form, SchemaForm::Elements),
        (is_values_form, SchemaForm::Values),
        (is_discriminator_form, SchemaForm::Discriminator),
        (is_ref_form, SchemaForm::Ref),
    ];
    PREDICATES
        .iter()
        .find(|(predicate, _)| predicate(node))
        .map(|(_, form)| *form)
        .unwrap_or(SchemaForm::Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn each_form_is_recognised() {
        assert_eq!(classify(&json!({"type": "int64"})), SchemaForm::Type);
        assert_eq!(classify(&json!({"enum": ["A", "B"]})), SchemaForm::Enum);
        assert_eq!(classify(&json!({"properties": {}})), SchemaForm::Properties);
        assert_eq!(
            classify(&json!({"optionalProperties": {"a": {}}})),
            SchemaForm::Properties
        );
        assert_eq!(classify(&json!({"elements": {}})), SchemaForm::Elements);
        assert_eq!(classify(&json!({"values": {"type": "string"}})), SchemaForm::Values);
        assert_eq!(
            classify(&json!({
                "discriminator": "type",
                "mapping": {"A": {"properties": {}}}
            })),
            SchemaForm::Discriminator
        );
        assert_eq!(classify(&json!({"ref": "User"})), SchemaForm::Ref);
        assert_eq!(classify(&json!({})), SchemaForm::Any);
    }

    #[test]
    fn first_matching_predicate_wins() {
        // both `type` and `enum` present: type is checked first
        assert_eq!(
            classify(&json!({"type": "string", "enum": ["A"]})),
            SchemaForm::Type
        );
        assert_eq!(
            classify(&json!({"properties": {}, "elements": {}})),
            SchemaForm::Properties
        );
    }

    #[test]
    fn malformed_nodes_fall_back_to_any() {
        assert_eq!(classify(&json!({"type": "decimal"})), SchemaForm::Any);
        assert_eq!(classify(&json!({"enum": []})), SchemaForm::Any);
        assert_eq!(classify(&json!({"enum": ["A", 1]})), SchemaForm::Any);
        assert_eq!(classify(&json!({"elements": 3})), SchemaForm::Any);
        assert_eq!(classify(&json!({"ref": 7})), SchemaForm::Any);
        assert_eq!(
            classify(&json!({"discriminator": "type", "mapping": {"A": {"type": "string"}}})),
            SchemaForm::Any
        );
        assert_eq!(classify(&json!(42)), SchemaForm::Any);
        assert_eq!(classify(&json!("string")), SchemaForm::Any);
    }
}
