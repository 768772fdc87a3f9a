//! Application definition: procedures keyed by dotted path plus the model
//! definitions they reference.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LoadError;
use crate::load::from_str_with_path;
use crate::schema::Schema;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Http,
    Ws,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureDef {
    pub transport: Transport,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
    #[serde(default)]
    pub params: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_event_stream: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_deprecated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Raw document shape. Definitions stay untyped until classified.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAppDefinition {
    #[serde(default)]
    schema_version: String,
    #[serde(default)]
    info: Option<AppInfo>,
    #[serde(default)]
    procedures: IndexMap<String, ProcedureDef>,
    #[serde(default)]
    definitions: IndexMap<String, Value>,
    #[serde(default)]
    errors: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppDefinition {
    pub schema_version: String,
    pub info: Option<AppInfo>,
    pub procedures: IndexMap<String, ProcedureDef>,
    pub definitions: IndexMap<String, Schema>,
    pub errors: Option<Schema>,
}

/// One level of the service tree implied by dotted procedure keys.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceNode {
    Service(ServiceTree),
    Procedure(ProcedureDef),
}

pub type ServiceTree = IndexMap<String, ServiceNode>;

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Patch => "patch",
            Self::Delete => "delete",
            Self::Head => "head",
        }
    }

    /// GET, HEAD and DELETE carry params in the URL query string.
    pub fn uses_query_string(self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Delete)
    }
}

impl AppDefinition {
    pub fn from_json_str(source: &str) -> Result<Self, LoadError> {
        let raw = from_str_with_path::<RawAppDefinition>(source)?;
        let definitions = raw
            .definitions
            .iter()
            .map(|(name, node)| Ok((name.clone(), Schema::from_json(node, &format!("/{name}"))?)))
            .collect::<Result<IndexMap<_, _>, LoadError>>()?;
        let errors = raw
            .errors
            .as_ref()
            .map(|node| Schema::from_json(node, "/errors"))
            .transpose()?;
        // key conflicts surface here, not halfway through a run
        unflatten_procedures(&raw.procedures)?;
        Ok(Self {
            schema_version: raw.schema_version,
            info: raw.info,
            procedures: raw.procedures,
            definitions,
            errors,
        })
    }

    /// `info.version`, used as the generated client's version string.
    pub fn version(&self) -> Option<&str> {
        self.info.as_ref().and_then(|info| info.version.as_deref())
    }

    /// Normalized JSON form of the whole definition.
    pub fn to_json(&self) -> Value {
        let mut out = serde_json::Map::new();
        out.insert("schemaVersion".into(), Value::from(self.schema_version.as_str()));
        if let Some(info) = &self.info {
            out.insert("info".into(), serde_json::to_value(info).unwrap_or(Value::Null));
        }
        let procedures = self
            .procedures
            .iter()
            .map(|(key, def)| (key.clone(), serde_json::to_value(def).unwrap_or(Value::Null)))
            .collect();
        out.insert("procedures".into(), Value::Object(procedures));
        let definitions = self
            .definitions
            .iter()
            .map(|(name, schema)| (name.clone(), schema.to_json()))
            .collect();
        out.insert("definitions".into(), Value::Object(definitions));
        if let Some(errors) = &self.errors {
            out.insert("errors".into(), errors.to_json());
        }
        Value::Object(out)
    }
}

/// Turn `users.settings.get` style keys into nested services.
///
/// A key that names both a procedure and a service prefix is rejected.
pub fn unflatten_procedures(
    procedures: &IndexMap<String, ProcedureDef>,
) -> Result<ServiceTree, LoadError> {
    let mut root = ServiceTree::new();
    for (key, def) in procedures {
        let segments = key.split('.').collect::<Vec<_>>();
        let Some((last, parents)) = segments.split_last() else {
            continue;
        };
        let mut level = &mut root;
        for (depth, segment) in parents.iter().enumerate() {
            let node = level
                .entry((*segment).to_owned())
                .or_insert_with(|| ServiceNode::Service(ServiceTree::new()));
            level = match node {
                ServiceNode::Service(tree) => tree,
                ServiceNode::Procedure(_) => {
                    return Err(LoadError::ProcedureConflict {
                        path: parents[..=depth].join("."),
                    });
                }
            };
        }
        if level.contains_key(*last) {
            return Err(LoadError::ProcedureConflict { path: key.clone() });
        }
        level.insert((*last).to_owned(), ServiceNode::Procedure(def.clone()));
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn procedure(path: &str) -> ProcedureDef {
        ProcedureDef {
            transport: Transport::Http,
            path: path.into(),
            method: Some(HttpMethod::Get),
            params: None,
            response: None,
            is_event_stream: false,
            is_deprecated: false,
            description: None,
        }
    }

    #[test]
    fn dotted_keys_become_nested_services() {
        let mut procedures = IndexMap::new();
        procedures.insert("users.getUser".to_owned(), procedure("/users/get-user"));
        procedures.insert("users.settings.get".to_owned(), procedure("/users/settings/get"));
        procedures.insert("health".to_owned(), procedure("/health"));
        let tree = unflatten_procedures(&procedures).unwrap();

        assert_eq!(tree.keys().collect::<Vec<_>>(), vec!["users", "health"]);
        let ServiceNode::Service(users) = &tree["users"] else {
            panic!("users should be a service");
        };
        assert!(matches!(users["getUser"], ServiceNode::Procedure(_)));
        let ServiceNode::Service(settings) = &users["settings"] else {
            panic!("settings should be a service");
        };
        assert!(matches!(settings["get"], ServiceNode::Procedure(_)));
    }

    #[test]
    fn procedure_and_service_with_same_key_conflict() {
        let mut procedures = IndexMap::new();
        procedures.insert("users".to_owned(), procedure("/users"));
        procedures.insert("users.get".to_owned(), procedure("/users/get"));
        let err = unflatten_procedures(&procedures).unwrap_err();
        assert!(matches!(err, LoadError::ProcedureConflict { ref path } if path == "users"));

        let mut procedures = IndexMap::new();
        procedures.insert("users.get".to_owned(), procedure("/users/get"));
        procedures.insert("users".to_owned(), procedure("/users"));
        let err = unflatten_procedures(&procedures).unwrap_err();
        assert!(matches!(err, LoadError::ProcedureConflict { ref path } if path == "users"));
    }

    #[test]
    fn parses_transports_and_methods() {
        let app = AppDefinition::from_json_str(
            &json!({
                "schemaVersion": "0.0.7",
                "info": {"version": "1.2.0"},
                "procedures": {
                    "a": {"transport": "http", "method": "delete", "path": "/a", "params": null, "response": null},
                    "b": {"transport": "ws", "path": "/b", "params": null, "response": null},
                    "c": {"transport": "grpc", "path": "/c"}
                },
                "definitions": {}
            })
            .to_string(),
        )
        .unwrap();
        assert_eq!(app.version(), Some("1.2.0"));
        assert_eq!(app.procedures["a"].method, Some(HttpMethod::Delete));
        assert!(app.procedures["a"].method.unwrap().uses_query_string());
        assert_eq!(app.procedures["b"].transport, Transport::Ws);
        assert_eq!(app.procedures["c"].transport, Transport::Unknown);
    }

    #[test]
    fn bad_shape_reports_json_path() {
        let err = AppDefinition::from_json_str(
            r#"{"procedures":{"a":{"transport":"http","path":3}},"definitions":{}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("procedures.a.path"), "{err}");
    }

    #[test]
    fn normalized_form_keeps_definition_order() {
        let app = AppDefinition::from_json_str(
            r#"{"schemaVersion":"1","procedures":{},"definitions":{"B":{"type":"string"},"A":{"enum":["X"]}}}"#,
        )
        .unwrap();
        let normalized = app.to_json();
        let names = normalized["definitions"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["B", "A"]);
    }
}
