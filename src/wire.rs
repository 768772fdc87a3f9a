//! Reference implementation of the wire formats generated clients speak.
//!
//! Values are checked against a [`Schema`] plus the definitions map that its
//! refs resolve through. JSON objects keep the declared field order, 64-bit
//! integers travel as quoted decimals and timestamps as RFC 3339 with
//! milliseconds and a `Z` suffix.
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{DecodeError, EncodeError};
use crate::schema::{PropertiesSchema, ScalarType, Schema};

#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Bool(bool),
    String(String),
    Timestamp(DateTime<Utc>),
    Float(f64),
    /// Every signed integer plus the unsigned ones below 64 bits.
    Int(i64),
    Uint(u64),
    Array(Vec<WireValue>),
    Object(IndexMap<String, WireValue>),
    /// Untyped payload of an empty schema.
    Json(Value),
}

impl WireValue {
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, WireValue)>) -> Self {
        WireValue::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn string(text: impl Into<String>) -> Self {
        WireValue::String(text.into())
    }

    fn kind(&self) -> &'static str {
        match self {
            WireValue::Null => "null",
            WireValue::Bool(_) => "boolean",
            WireValue::String(_) => "string",
            WireValue::Timestamp(_) => "timestamp",
            WireValue::Float(_) => "float",
            WireValue::Int(_) => "int",
            WireValue::Uint(_) => "uint",
            WireValue::Array(_) => "array",
            WireValue::Object(_) => "object",
            WireValue::Json(_) => "json",
        }
    }
}

pub type Definitions = IndexMap<String, Schema>;

// ————————————————————————————————————————————————————————————————————————————
// HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// JSON string literal, quotes included.
pub fn serialize_string(text: &str) -> String {
    Value::String(text.to_owned()).to_string()
}

/// `2024-01-02T03:04:05.678Z`
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|value| value.with_timezone(&Utc))
}

/// Timestamp as it appears in a JSON body (`quoted`) or a query string.
pub fn serialize_date_time(value: &DateTime<Utc>, quoted: bool) -> String {
    if quoted {
        format!("\"{}\"", format_timestamp(value))
    } else {
        format_timestamp(value)
    }
}

fn resolve<'a>(schema: &'a Schema, definitions: &'a Definitions, path: &str) -> Result<&'a Schema, String> {
    let mut current = schema;
    // refs may chain through aliases; a cycle of pure refs has no values
    for _ in 0..=definitions.len() {
        match current {
            Schema::Ref { name, .. } => {
                current = definitions
                    .get(name)
                    .ok_or_else(|| format!("unknown definition \"{name}\" referenced at {path}"))?;
            }
            other => return Ok(other),
        }
    }
    Err(format!("ref cycle without a concrete schema at {path}"))
}

fn child(path: &str, key: &str) -> String {
    format!("{path}/{key}")
}

// ————————————————————————————————————————————————————————————————————————————
// JSON ENCODE
// ————————————————————————————————————————————————————————————————————————————

pub fn encode_json(value: &WireValue, schema: &Schema, definitions: &Definitions) -> Result<String, EncodeError> {
    let mut out = String::new();
    JsonEncoder { definitions, out: &mut out }.value(value, schema, "")?;
    Ok(out)
}

struct JsonEncoder<'a> {
    definitions: &'a Definitions,
    out: &'a mut String,
}

impl JsonEncoder<'_> {
    fn value(&mut self, value: &WireValue, schema: &Schema, path: &str) -> Result<(), EncodeError> {
        let schema = resolve(schema, self.definitions, path).map_err(|msg| EncodeError::new(path, msg))?;
        if let Schema::Any { .. } = schema {
            return self.any(value, path);
        }
        if *value == WireValue::Null {
            if schema.nullable() {
                self.out.push_str("null");
                return Ok(());
            }
            return Err(EncodeError::new(path, "null is not allowed here"));
        }
        match schema {
            Schema::Type { scalar, .. } => self.scalar(value, *scalar, path),
            Schema::Enum { values, .. } => match value {
                WireValue::String(text) if values.contains(text) => {
                    self.out.push_str(&serialize_string(text));
                    Ok(())
                }
                WireValue::String(text) => Err(EncodeError::new(path, format!("\"{text}\" is not an enum member"))),
                other => Err(mismatch(path, "enum string", other)),
            },
            Schema::Properties(props) => {
                let WireValue::Object(map) = value else {
                    return Err(mismatch(path, "object", value));
                };
                self.out.push('{');
                self.fields(map, props, None, path)?;
                self.out.push('}');
                Ok(())
            }
            Schema::Discriminator {
                discriminator, mapping, ..
            } => {
                let WireValue::Object(map) = value else {
                    return Err(mismatch(path, "object", value));
                };
                let Some(WireValue::String(tag)) = map.get(discriminator) else {
                    return Err(EncodeError::new(path, format!("missing discriminator \"{discriminator}\"")));
                };
                let member = mapping
                    .get(tag)
                    .ok_or_else(|| EncodeError::new(path, format!("unrecognized discriminator value \"{tag}\"")))?;
                self.out.push('{');
                self.out.push_str(&serialize_string(discriminator));
                self.out.push(':');
                self.out.push_str(&serialize_string(tag));
                self.fields(map, member, Some(discriminator), path)?;
                self.out.push('}');
                Ok(())
            }
            Schema::Elements { elements, .. } => {
                let WireValue::Array(items) = value else {
                    return Err(mismatch(path, "array", value));
                };
                self.out.push('[');
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        self.out.push(',');
                    }
                    self.value(item, elements, &child(path, &index.to_string()))?;
                }
                self.out.push(']');
                Ok(())
            }
            Schema::Values { values, .. } => {
                let WireValue::Object(map) = value else {
                    return Err(mismatch(path, "record", value));
                };
                self.out.push('{');
                for (index, (key, item)) in map.iter().enumerate() {
                    if index > 0 {
                        self.out.push(',');
                    }
                    self.out.push_str(&serialize_string(key));
                    self.out.push(':');
                    self.value(item, values, &child(path, key))?;
                }
                self.out.push('}');
                Ok(())
            }
            Schema::Ref { .. } | Schema::Any { .. } => unreachable!("resolved above"),
        }
    }

    /// Writes declared fields in order; a preceding discriminator counts as
    /// the first key.
    fn fields(
        &mut self,
        map: &IndexMap<String, WireValue>,
        props: &PropertiesSchema,
        tag: Option<&String>,
        path: &str,
    ) -> Result<(), EncodeError> {
        let mut first = tag.is_none();
        for key in map.keys() {
            let known = tag == Some(key) || props.fields().any(|(field, _, _)| field == key);
            if !known && !props.additional_properties {
                return Err(EncodeError::new(path, format!("unexpected property \"{key}\"")));
            }
        }
        for (key, schema, optional) in props.fields() {
            let Some(item) = map.get(key) else {
                if optional {
                    continue;
                }
                return Err(EncodeError::new(path, format!("missing required property \"{key}\"")));
            };
            if !first {
                self.out.push(',');
            }
            first = false;
            self.out.push_str(&serialize_string(key));
            self.out.push(':');
            self.value(item, schema, &child(path, key))?;
        }
        Ok(())
    }

    fn scalar(&mut self, value: &WireValue, scalar: ScalarType, path: &str) -> Result<(), EncodeError> {
        let text = match (scalar, value) {
            (ScalarType::Boolean, WireValue::Bool(b)) => b.to_string(),
            (ScalarType::String, WireValue::String(s)) => serialize_string(s),
            (ScalarType::Timestamp, WireValue::Timestamp(t)) => serialize_date_time(t, true),
            (ScalarType::Float32 | ScalarType::Float64, WireValue::Float(f)) => serde_json::Number::from_f64(*f)
                .map(|n| n.to_string())
                .ok_or_else(|| EncodeError::new(path, format!("{f} has no JSON representation")))?,
            (ScalarType::Int64, WireValue::Int(i)) => format!("\"{i}\""),
            (ScalarType::Uint64, WireValue::Uint(u)) => format!("\"{u}\""),
            (scalar, WireValue::Int(i)) => {
                let (min, max) = scalar
                    .int_bounds()
                    .ok_or_else(|| mismatch(path, scalar.as_str(), value))?;
                if *i < min || *i > max {
                    return Err(EncodeError::new(path, format!("{i} is out of range for {}", scalar.as_str())));
                }
                i.to_string()
            }
            (scalar, other) => return Err(mismatch(path, scalar.as_str(), other)),
        };
        self.out.push_str(&text);
        Ok(())
    }

    fn any(&mut self, value: &WireValue, path: &str) -> Result<(), EncodeError> {
        match value {
            WireValue::Null => self.out.push_str("null"),
            WireValue::Json(json) => self.out.push_str(&json.to_string()),
            other => return Err(mismatch(path, "json", other)),
        }
        Ok(())
    }
}

fn mismatch(path: &str, expected: &str, found: &WireValue) -> EncodeError {
    EncodeError::new(path, format!("expected {expected}, found {}", found.kind()))
}

// ————————————————————————————————————————————————————————————————————————————
// JSON DECODE
// ————————————————————————————————————————————————————————————————————————————

pub fn decode_json(text: &str, schema: &Schema, definitions: &Definitions) -> Result<WireValue, DecodeError> {
    let json: Value = serde_json::from_str(text).map_err(|err| DecodeError::new("", err.to_string()))?;
    decode_value(&json, schema, definitions, "")
}

pub fn decode_value(
    json: &Value,
    schema: &Schema,
    definitions: &Definitions,
    path: &str,
) -> Result<WireValue, DecodeError> {
    let schema = resolve(schema, definitions, path).map_err(|msg| DecodeError::new(path, msg))?;
    if let Schema::Any { .. } = schema {
        return Ok(WireValue::Json(json.clone()));
    }
    if json.is_null() {
        if schema.nullable() {
            return Ok(WireValue::Null);
        }
        return Err(DecodeError::new(path, "null is not allowed here"));
    }
    match schema {
        Schema::Type { scalar, .. } => decode_scalar(json, *scalar, path),
        Schema::Enum { values, .. } => match json.as_str() {
            Some(text) if values.iter().any(|v| v == text) => Ok(WireValue::string(text)),
            Some(text) => Err(DecodeError::new(path, format!("\"{text}\" is not an enum member"))),
            None => Err(DecodeError::new(path, "expected an enum string")),
        },
        Schema::Properties(props) => {
            let object = json
                .as_object()
                .ok_or_else(|| DecodeError::new(path, "expected an object"))?;
            let mut out = IndexMap::new();
            decode_fields(object, props, definitions, path, &mut out)?;
            Ok(WireValue::Object(out))
        }
        Schema::Discriminator {
            discriminator, mapping, ..
        } => {
            let object = json
                .as_object()
                .ok_or_else(|| DecodeError::new(path, "expected an object"))?;
            let tag = object
                .get(discriminator)
                .and_then(Value::as_str)
                .ok_or_else(|| DecodeError::new(path, format!("missing discriminator \"{discriminator}\"")))?;
            let member = mapping.get(tag).ok_or_else(|| {
                DecodeError::new(child(path, discriminator), format!("unrecognized discriminator value \"{tag}\""))
            })?;
            let mut out = IndexMap::new();
            out.insert(discriminator.clone(), WireValue::string(tag));
            decode_fields(object, member, definitions, path, &mut out)?;
            Ok(WireValue::Object(out))
        }
        Schema::Elements { elements, .. } => {
            let items = json
                .as_array()
                .ok_or_else(|| DecodeError::new(path, "expected an array"))?;
            items
                .iter()
                .enumerate()
                .map(|(index, item)| decode_value(item, elements, definitions, &child(path, &index.to_string())))
                .collect::<Result<Vec<_>, _>>()
                .map(WireValue::Array)
        }
        Schema::Values { values, .. } => {
            let object = json
                .as_object()
                .ok_or_else(|| DecodeError::new(path, "expected an object"))?;
            object
                .iter()
                .map(|(key, item)| -> Result<_, DecodeError> {
                    Ok((key.clone(), decode_value(item, values, definitions, &child(path, key))?))
                })
                .collect::<Result<IndexMap<_, _>, _>>()
                .map(WireValue::Object)
        }
        Schema::Ref { .. } | Schema::Any { .. } => unreachable!("resolved above"),
    }
}

fn decode_fields(
    object: &serde_json::Map<String, Value>,
    props: &PropertiesSchema,
    definitions: &Definitions,
    path: &str,
    out: &mut IndexMap<String, WireValue>,
) -> Result<(), DecodeError> {
    for (key, schema, optional) in props.fields() {
        match object.get(key) {
            Some(item) => {
                out.insert(key.clone(), decode_value(item, schema, definitions, &child(path, key))?);
            }
            None if optional => {}
            None => return Err(DecodeError::new(path, format!("missing required property \"{key}\""))),
        }
    }
    Ok(())
}

fn decode_scalar(json: &Value, scalar: ScalarType, path: &str) -> Result<WireValue, DecodeError> {
    let expected = || DecodeError::new(path, format!("expected {}", scalar.as_str()));
    match scalar {
        ScalarType::Boolean => json.as_bool().map(WireValue::Bool).ok_or_else(expected),
        ScalarType::String => json.as_str().map(WireValue::string).ok_or_else(expected),
        ScalarType::Timestamp => {
            let text = json.as_str().ok_or_else(expected)?;
            parse_timestamp(text)
                .map(WireValue::Timestamp)
                .map_err(|err| DecodeError::new(path, format!("invalid timestamp \"{text}\": {err}")))
        }
        ScalarType::Float32 | ScalarType::Float64 => json.as_f64().map(WireValue::Float).ok_or_else(expected),
        ScalarType::Int64 => match json {
            Value::String(text) => text.parse().map(WireValue::Int).map_err(|_| expected()),
            other => other.as_i64().map(WireValue::Int).ok_or_else(expected),
        },
        ScalarType::Uint64 => match json {
            Value::String(text) => text.parse().map(WireValue::Uint).map_err(|_| expected()),
            other => other.as_u64().map(WireValue::Uint).ok_or_else(expected),
        },
        small => {
            let value = json.as_i64().ok_or_else(expected)?;
            let (min, max) = small.int_bounds().ok_or_else(expected)?;
            if value < min || value > max {
                return Err(DecodeError::new(path, format!("{value} is out of range for {}", small.as_str())));
            }
            Ok(WireValue::Int(value))
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// QUERY STRINGS
// ————————————————————————————————————————————————————————————————————————————

fn query_fields<'a>(
    schema: &'a Schema,
    definitions: &'a Definitions,
    tag: Option<&str>,
) -> Result<(Option<&'a String>, &'a PropertiesSchema), String> {
    match resolve(schema, definitions, "")? {
        Schema::Properties(props) => Ok((None, props)),
        Schema::Discriminator {
            discriminator, mapping, ..
        } => {
            let tag = tag.ok_or_else(|| format!("missing discriminator \"{discriminator}\""))?;
            mapping
                .get(tag)
                .map(|member| (Some(discriminator), member))
                .ok_or_else(|| format!("unrecognized discriminator value \"{tag}\""))
        }
        _ => Err("only object schemas can be sent as query strings".to_owned()),
    }
}

fn query_scalar(schema: &Schema, definitions: &Definitions) -> Option<Schema> {
    match resolve(schema, definitions, "").ok()? {
        scalar @ (Schema::Type { .. } | Schema::Enum { .. }) => Some(scalar.clone()),
        _ => None,
    }
}

/// `&`-joined `key=value` pairs. Nested objects, arrays and records are
/// skipped, exactly like generated clients skip them.
pub fn encode_query(value: &WireValue, schema: &Schema, definitions: &Definitions) -> Result<String, EncodeError> {
    let WireValue::Object(map) = value else {
        return Err(mismatch("", "object", value));
    };
    let tag = match resolve(schema, definitions, "").map_err(|msg| EncodeError::new("", msg))? {
        Schema::Discriminator { discriminator, .. } => match map.get(discriminator) {
            Some(WireValue::String(tag)) => Some(tag.as_str()),
            _ => None,
        },
        _ => None,
    };
    let (discriminator, props) = query_fields(schema, definitions, tag).map_err(|msg| EncodeError::new("", msg))?;
    let mut parts = Vec::new();
    if let (Some(key), Some(tag)) = (discriminator, tag) {
        parts.push(format!("{key}={tag}"));
    }
    for (key, field_schema, optional) in props.fields() {
        let Some(scalar) = query_scalar(field_schema, definitions) else {
            continue;
        };
        let item = match map.get(key) {
            Some(item) => item,
            None if optional => continue,
            None => return Err(EncodeError::new("", format!("missing required property \"{key}\""))),
        };
        let text = match (item, &scalar) {
            (WireValue::Null, _) if scalar.nullable() => "null".to_owned(),
            (WireValue::String(s), Schema::Enum { values, .. }) if values.contains(s) => s.clone(),
            (WireValue::String(s), Schema::Type { scalar: ScalarType::String, .. }) => s.clone(),
            (WireValue::Bool(b), Schema::Type { scalar: ScalarType::Boolean, .. }) => b.to_string(),
            (WireValue::Timestamp(t), Schema::Type { scalar: ScalarType::Timestamp, .. }) => format_timestamp(t),
            (WireValue::Float(f), Schema::Type { .. }) => f.to_string(),
            (WireValue::Int(i), Schema::Type { .. }) => i.to_string(),
            (WireValue::Uint(u), Schema::Type { .. }) => u.to_string(),
            (other, _) => return Err(mismatch(&child("", key), "query scalar", other)),
        };
        parts.push(format!("{key}={text}"));
    }
    Ok(parts.join("&"))
}

pub fn decode_query(text: &str, schema: &Schema, definitions: &Definitions) -> Result<WireValue, DecodeError> {
    let pairs = text
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| part.split_once('=').unwrap_or((part, "")))
        .collect::<IndexMap<_, _>>();
    let tag = match resolve(schema, definitions, "").map_err(|msg| DecodeError::new("", msg))? {
        Schema::Discriminator { discriminator, .. } => pairs.get(discriminator.as_str()).copied(),
        _ => None,
    };
    let (discriminator, props) = query_fields(schema, definitions, tag).map_err(|msg| DecodeError::new("", msg))?;
    let mut out = IndexMap::new();
    if let (Some(key), Some(tag)) = (discriminator, tag) {
        out.insert(key.clone(), WireValue::string(tag));
    }
    for (key, field_schema, optional) in props.fields() {
        let Some(scalar) = query_scalar(field_schema, definitions) else {
            continue;
        };
        let path = child("", key);
        let raw = match pairs.get(key.as_str()) {
            Some(raw) => *raw,
            None if optional => continue,
            None => return Err(DecodeError::new("", format!("missing required property \"{key}\""))),
        };
        let value = if raw == "null" && scalar.nullable() {
            WireValue::Null
        } else {
            match &scalar {
                Schema::Enum { values, .. } if values.iter().any(|v| v == raw) => WireValue::string(raw),
                Schema::Enum { .. } => return Err(DecodeError::new(path, format!("\"{raw}\" is not an enum member"))),
                Schema::Type { scalar, .. } => parse_query_scalar(raw, *scalar, &path)?,
                _ => continue,
            }
        };
        out.insert(key.clone(), value);
    }
    Ok(WireValue::Object(out))
}

fn parse_query_scalar(raw: &str, scalar: ScalarType, path: &str) -> Result<WireValue, DecodeError> {
    let invalid = || DecodeError::new(path, format!("\"{raw}\" is not a valid {}", scalar.as_str()));
    let value = match scalar {
        ScalarType::String => WireValue::string(raw),
        ScalarType::Boolean => WireValue::Bool(raw.parse().map_err(|_| invalid())?),
        ScalarType::Timestamp => WireValue::Timestamp(parse_timestamp(raw).map_err(|_| invalid())?),
        ScalarType::Float32 | ScalarType::Float64 => WireValue::Float(raw.parse().map_err(|_| invalid())?),
        ScalarType::Uint64 => WireValue::Uint(raw.parse().map_err(|_| invalid())?),
        ScalarType::Int64 => WireValue::Int(raw.parse().map_err(|_| invalid())?),
        small => {
            let value: i64 = raw.parse().map_err(|_| invalid())?;
            let (min, max) = small.int_bounds().ok_or_else(invalid)?;
            if value < min || value > max {
                return Err(invalid());
            }
            WireValue::Int(value)
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn definitions(value: serde_json::Value) -> Definitions {
        value
            .as_object()
            .unwrap()
            .iter()
            .map(|(name, schema)| (name.clone(), Schema::from_json(schema, &format!("/definitions/{name}")).unwrap()))
            .collect()
    }

    fn reference(name: &str) -> Schema {
        Schema::from_json(&json!({"ref": name}), "").unwrap()
    }

    fn sample_definitions() -> Definitions {
        definitions(json!({
            "User": {
                "properties": {"id": {"type": "string"}, "name": {"type": "string"}},
                "optionalProperties": {"email": {"type": "string", "nullable": true}}
            },
            "Counter": {"properties": {"value": {"type": "int64"}, "total": {"type": "uint64"}}},
            "Message": {
                "discriminator": "type",
                "mapping": {
                    "TEXT": {"properties": {"content": {"type": "string"}}},
                    "IMAGE": {"properties": {"imageUrl": {"type": "string"}}}
                }
            },
            "Search": {
                "properties": {
                    "q": {"type": "string"},
                    "limit": {"type": "uint16"},
                    "since": {"type": "timestamp", "nullable": true},
                    "status": {"enum": ["OPEN", "CLOSED"]},
                    "tags": {"elements": {"type": "string"}}
                },
                "optionalProperties": {"exact": {"type": "boolean"}}
            }
        }))
    }

    #[test]
    fn fields_encode_in_declared_order() {
        let defs = sample_definitions();
        let user = WireValue::object([
            ("email", WireValue::string("a@b.c")),
            ("name", WireValue::string("Ada")),
            ("id", WireValue::string("1")),
        ]);
        let text = encode_json(&user, &reference("User"), &defs).unwrap();
        assert_eq!(text, r#"{"id":"1","name":"Ada","email":"a@b.c"}"#);
    }

    #[test]
    fn absent_and_null_optional_fields_differ() {
        let defs = sample_definitions();
        let absent = WireValue::object([("id", WireValue::string("1")), ("name", WireValue::string("Ada"))]);
        let null = WireValue::object([
            ("id", WireValue::string("1")),
            ("name", WireValue::string("Ada")),
            ("email", WireValue::Null),
        ]);
        let absent_text = encode_json(&absent, &reference("User"), &defs).unwrap();
        let null_text = encode_json(&null, &reference("User"), &defs).unwrap();
        assert_eq!(absent_text, r#"{"id":"1","name":"Ada"}"#);
        assert_eq!(null_text, r#"{"id":"1","name":"Ada","email":null}"#);
        assert_eq!(decode_json(&absent_text, &reference("User"), &defs).unwrap(), absent);
        assert_eq!(decode_json(&null_text, &reference("User"), &defs).unwrap(), null);
    }

    #[test]
    fn required_nullable_accepts_null() {
        let defs = definitions(json!({
            "Holder": {"properties": {"x": {"type": "string", "nullable": true}}}
        }));
        let value = decode_json(r#"{"x": null}"#, &reference("Holder"), &defs).unwrap();
        assert_eq!(value, WireValue::object([("x", WireValue::Null)]));
        let err = decode_json("{}", &reference("Holder"), &defs).unwrap_err();
        assert!(err.message.contains("missing required property \"x\""));
    }

    #[test]
    fn large_integers_survive_as_quoted_decimals() {
        let defs = sample_definitions();
        let counter = WireValue::object([("value", WireValue::Int(9007199254740993)), ("total", WireValue::Uint(u64::MAX))]);
        let text = encode_json(&counter, &reference("Counter"), &defs).unwrap();
        assert_eq!(text, r#"{"value":"9007199254740993","total":"18446744073709551615"}"#);
        assert_eq!(decode_json(&text, &reference("Counter"), &defs).unwrap(), counter);
    }

    #[test]
    fn union_writes_tag_first_and_rejects_unknown_tags() {
        let defs = sample_definitions();
        let text = WireValue::object([("content", WireValue::string("hi")), ("type", WireValue::string("TEXT"))]);
        assert_eq!(
            encode_json(&text, &reference("Message"), &defs).unwrap(),
            r#"{"type":"TEXT","content":"hi"}"#
        );

        let image = decode_json(r#"{"type":"IMAGE","imageUrl":"x"}"#, &reference("Message"), &defs).unwrap();
        assert_eq!(
            image,
            WireValue::object([("type", WireValue::string("IMAGE")), ("imageUrl", WireValue::string("x"))])
        );

        let err = decode_json(r#"{"type":"VIDEO"}"#, &reference("Message"), &defs).unwrap_err();
        assert_eq!(err.path, "/type");
        assert!(err.message.contains("unrecognized discriminator value \"VIDEO\""));
    }

    #[test]
    fn timestamps_use_millisecond_utc() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_timestamp(&at), "2024-01-02T03:04:05.000Z");
        assert_eq!(serialize_date_time(&at, true), "\"2024-01-02T03:04:05.000Z\"");
        assert_eq!(parse_timestamp("2024-01-02T05:04:05+02:00").unwrap(), at);
    }

    #[test]
    fn strings_are_json_escaped() {
        assert_eq!(serialize_string("a\"b\\c\n"), r#""a\"b\\c\n""#);
    }

    #[test]
    fn query_strings_skip_nested_fields_and_round_trip() {
        let defs = sample_definitions();
        let search = WireValue::object([
            ("q", WireValue::string("rust")),
            ("limit", WireValue::Int(20)),
            ("since", WireValue::Null),
            ("status", WireValue::string("OPEN")),
            ("tags", WireValue::Array(vec![WireValue::string("x")])),
            ("exact", WireValue::Bool(true)),
        ]);
        let text = encode_query(&search, &reference("Search"), &defs).unwrap();
        assert_eq!(text, "q=rust&limit=20&since=null&status=OPEN&exact=true");

        let decoded = decode_query(&text, &reference("Search"), &defs).unwrap();
        let mut expected = search.clone();
        if let WireValue::Object(map) = &mut expected {
            map.shift_remove("tags");
        }
        assert_eq!(decoded, expected);
    }

    #[test]
    fn out_of_range_small_ints_are_rejected() {
        let defs = definitions(json!({"Byte": {"properties": {"b": {"type": "uint8"}}}}));
        assert!(decode_json(r#"{"b": 256}"#, &reference("Byte"), &defs).is_err());
        assert!(encode_json(&WireValue::object([("b", WireValue::Int(-1))]), &reference("Byte"), &defs).is_err());
    }
}
