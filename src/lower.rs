//! Schema → emission IR.
//!
//! One recursive descent shared by every target. Named declarations are pushed
//! into `decls` children first; the dedup set in [`RunState`] is claimed before
//! recursing so recursive and diamond-shared types terminate and are emitted
//! exactly once.
use indexmap::{IndexMap, IndexSet};

use crate::app_def::{AppDefinition, ProcedureDef, ServiceNode, ServiceTree, Transport};
use crate::context::{Context, RunState};
use crate::ir::{
    AliasDecl, Decl, EnumDecl, Field, ObjectDecl, ProcedureDecl, ServiceDecl, Shape, ShapeKind,
    SubService, UnionDecl,
};
use crate::naming::{pascal, type_name_from_path};
use crate::schema::{PropertiesSchema, Schema};

pub struct Lowerer<'a> {
    definitions: &'a IndexMap<String, Schema>,
    refs: RefGraph,
    alias_stack: Vec<String>,
    pub state: RunState,
    pub decls: Vec<Decl>,
}

impl<'a> Lowerer<'a> {
    pub fn new(definitions: &'a IndexMap<String, Schema>) -> Self {
        Self {
            definitions,
            refs: RefGraph::build(definitions),
            alias_stack: Vec::new(),
            state: RunState::default(),
            decls: Vec::new(),
        }
    }

    // ----- Definitions -----

    /// Lower every top-level definition in document order.
    pub fn lower_definitions(&mut self) {
        for (name, schema) in self.definitions {
            let ctx = Context::for_definition(name);
            if schema.is_nominal() {
                self.lower(schema, &ctx);
                continue;
            }
            let alias = self.definition_type_name(name);
            let shape = self.with_alias_guard(name, |this| this.lower(schema, &ctx));
            if let Some(shape) = shape {
                if self.state.claim_type(&alias) {
                    self.decls.push(Decl::Alias(AliasDecl {
                        name: alias,
                        shape,
                        description: schema.metadata().description.clone(),
                    }));
                }
            }
        }
    }

    /// Exported name of a top-level definition: `metadata.id` wins over the key.
    pub fn definition_type_name(&self, key: &str) -> String {
        match self.definitions.get(key).and_then(|s| s.metadata().id.as_deref()) {
            Some(id) => pascal(id),
            None => pascal(key),
        }
    }

    pub fn lower(&mut self, schema: &Schema, ctx: &Context) -> Shape {
        let kind = match schema {
            Schema::Type { scalar, .. } => ShapeKind::Scalar(*scalar),
            Schema::Enum { values, metadata, .. } => {
                let name = type_name(metadata.id.as_deref(), ctx);
                if self.state.claim_type(&name) {
                    self.decls.push(Decl::Enum(EnumDecl {
                        name: name.clone(),
                        values: values.clone(),
                        description: metadata.description.clone(),
                        is_deprecated: metadata.is_deprecated,
                    }));
                }
                ShapeKind::Enum { name }
            }
            Schema::Properties(props) => {
                let name = type_name(props.metadata.id.as_deref(), ctx);
                if self.state.claim_type(&name) {
                    let decl = self.object_decl(props, ctx, &name);
                    self.decls.push(Decl::Object(decl));
                }
                ShapeKind::Object { name }
            }
            Schema::Elements { elements, .. } => {
                ShapeKind::Array(Box::new(self.lower(elements, &ctx.element())))
            }
            Schema::Values { values, .. } => {
                ShapeKind::Record(Box::new(self.lower(values, &ctx.record_value())))
            }
            Schema::Discriminator {
                discriminator,
                mapping,
                metadata,
                ..
            } => {
                if mapping.is_empty() {
                    self.state.warn(
                        &ctx.schema_path,
                        "discriminator has no mapping entries, falling back to any",
                    );
                    ShapeKind::Any
                } else {
                    let name = type_name(metadata.id.as_deref(), ctx);
                    if self.state.claim_type(&name) {
                        let variants = mapping
                            .iter()
                            .map(|(tag, member)| {
                                let variant_ctx = ctx.variant(&name, discriminator, tag);
                                let variant_name = self.claim_variant_name(member.metadata.id.as_deref(), &variant_ctx);
                                self.object_decl(member, &variant_ctx, &variant_name)
                            })
                            .collect();
                        self.decls.push(Decl::Union(UnionDecl {
                            name: name.clone(),
                            discriminator: discriminator.clone(),
                            variants,
                            description: metadata.description.clone(),
                            is_deprecated: metadata.is_deprecated,
                            instance_path: ctx.instance_path.clone(),
                        }));
                    }
                    ShapeKind::Union { name }
                }
            }
            Schema::Ref { name, .. } => return self.lower_ref(name, ctx),
            Schema::Any { .. } => ShapeKind::Any,
        };
        Shape {
            kind,
            nullable: schema.nullable(),
            optional: ctx.is_optional,
            instance_path: ctx.instance_path.clone(),
            schema_path: ctx.schema_path.clone(),
        }
    }

    fn object_decl(&mut self, props: &PropertiesSchema, ctx: &Context, name: &str) -> ObjectDecl {
        let query_only = self.state.query_param_types.contains(name);
        let mut fields = Vec::with_capacity(props.properties.len() + props.optional_properties.len());
        for (key, schema, optional) in props.fields() {
            let field_ctx = ctx.field(name, key, optional);
            let shape = self.lower(schema, &field_ctx);
            if query_only && !shape.can_be_query_string() {
                self.state.warn(
                    &field_ctx.schema_path,
                    format!(
                        "\"{key}\" of {name} is sent as a URL query parameter but nested objects, arrays and records are not supported there; it will be skipped"
                    ),
                );
            }
            fields.push(Field {
                key: key.clone(),
                shape,
                description: schema.metadata().description.clone(),
                is_deprecated: schema.metadata().is_deprecated,
            });
        }
        ObjectDecl {
            name: name.to_owned(),
            fields,
            tag: ctx.discriminator.clone(),
            description: props.metadata.description.clone(),
            is_deprecated: props.metadata.is_deprecated,
            instance_path: ctx.instance_path.clone(),
        }
    }

    /// Union members carry the tag field, so they can never reuse a
    /// declaration of the same name. A taken name falls back to the member's
    /// path name, then to a numbered one.
    fn claim_variant_name(&mut self, id: Option<&str>, ctx: &Context) -> String {
        let preferred = type_name(id, ctx);
        if self.state.claim_type(&preferred) {
            return preferred;
        }
        let by_path = type_name_from_path(&ctx.instance_path);
        let mut candidate = by_path.clone();
        let mut n = 2;
        while !self.state.claim_type(&candidate) {
            candidate = format!("{by_path}{n}");
            n += 1;
        }
        self.state.warn(
            &ctx.schema_path,
            format!("type name \"{preferred}\" is already in use, emitting this union member as {candidate}"),
        );
        candidate
    }

    fn lower_ref(&mut self, key: &str, ctx: &Context) -> Shape {
        let Some(target) = self.definitions.get(key) else {
            self.state.warn(
                &ctx.schema_path,
                format!("reference to unknown definition \"{key}\", falling back to any"),
            );
            return self.shape(ShapeKind::Any, false, ctx);
        };
        if target.is_nominal() {
            // make sure the target exists even if nothing lowered it yet
            if !self.state.generated_types.contains(&self.definition_type_name(key)) {
                self.lower(target, &Context::for_definition(key));
            }
            let recursive = ctx
                .root_definition
                .as_deref()
                .is_some_and(|root| self.refs.reaches(key, root));
            let name = self.definition_type_name(key);
            let kind = match target {
                // enums are plain strings on the wire, so they stay enums at the use site
                Schema::Enum { .. } => ShapeKind::Enum { name },
                _ => ShapeKind::Ref { name, recursive },
            };
            return self.shape(kind, target.nullable(), ctx);
        }
        // non-nominal targets have nothing to point at: use their shape directly
        let nullable = target.nullable();
        let lowered = self.with_alias_guard(key, |this| {
            let alias_ctx = Context {
                root_definition: Some(key.to_owned()),
                ..ctx.clone()
            };
            this.lower(target, &alias_ctx)
        });
        match lowered {
            Some(shape) => Shape {
                optional: ctx.is_optional,
                nullable,
                ..shape
            },
            None => {
                self.state.warn(
                    &ctx.schema_path,
                    format!("\"{key}\" refers to itself without an object in between, falling back to any"),
                );
                self.shape(ShapeKind::Any, false, ctx)
            }
        }
    }

    fn with_alias_guard<T>(&mut self, key: &str, f: impl FnOnce(&mut Self) -> T) -> Option<T> {
        if self.alias_stack.iter().any(|k| k == key) {
            return None;
        }
        self.alias_stack.push(key.to_owned());
        let out = f(self);
        self.alias_stack.pop();
        Some(out)
    }

    fn shape(&self, kind: ShapeKind, nullable: bool, ctx: &Context) -> Shape {
        Shape {
            kind,
            nullable,
            optional: ctx.is_optional,
            instance_path: ctx.instance_path.clone(),
            schema_path: ctx.schema_path.clone(),
        }
    }

    // ----- Services -----

    /// Lower the service tree. Run before definitions so query-string params
    /// types are known while their fields are lowered.
    pub fn lower_services(&mut self, tree: &ServiceTree, client_name: &str) -> ServiceDecl {
        self.lower_service(tree, client_name, &[])
    }

    fn lower_service(&mut self, tree: &ServiceTree, client_name: &str, path: &[String]) -> ServiceDecl {
        let name = if path.is_empty() {
            pascal(client_name)
        } else {
            pascal(&format!("{client_name}_{}_service", path.join("_")))
        };
        let mut service = ServiceDecl {
            name,
            path: path.to_vec(),
            procedures: Vec::new(),
            sub_services: Vec::new(),
            children: Vec::new(),
        };
        for (key, node) in tree {
            let mut child_path = path.to_vec();
            child_path.push(key.clone());
            match node {
                ServiceNode::Service(sub_tree) => {
                    let child = self.lower_service(sub_tree, client_name, &child_path);
                    if child.is_empty() {
                        continue;
                    }
                    service.sub_services.push(SubService {
                        key: key.clone(),
                        type_name: child.name.clone(),
                    });
                    service.children.push(child);
                }
                ServiceNode::Procedure(def) => {
                    if let Some(procedure) = self.lower_procedure(key, def, &child_path.join(".")) {
                        service.procedures.push(procedure);
                    }
                }
            }
        }
        service
    }

    fn lower_procedure(&mut self, key: &str, def: &ProcedureDef, rpc_path: &str) -> Option<ProcedureDecl> {
        match def.transport {
            Transport::Http => {}
            Transport::Ws => {
                self.state.used_features.ws = true;
                self.state.warn(
                    rpc_path,
                    format!("WebSocket procedures are not supported at this time, skipping {rpc_path}"),
                );
                return None;
            }
            Transport::Unknown => {
                self.state
                    .warn(rpc_path, format!("unsupported transport, skipping {rpc_path}"));
                return None;
            }
        }
        let Some(method) = def.method else {
            self.state
                .warn(rpc_path, format!("http procedure has no method, skipping {rpc_path}"));
            return None;
        };
        let params = def.params.as_deref().map(|key| self.procedure_type(key, rpc_path));
        let response = def.response.as_deref().map(|key| self.procedure_type(key, rpc_path));
        if let Some(params) = &params {
            if method.uses_query_string() {
                self.state.query_param_types.insert(params.clone());
            }
        }
        if def.is_event_stream {
            self.state.used_features.sse = true;
        }
        Some(ProcedureDecl {
            key: key.to_owned(),
            rpc_path: rpc_path.to_owned(),
            http_path: def.path.clone(),
            method,
            params,
            response,
            is_event_stream: def.is_event_stream,
            is_deprecated: def.is_deprecated,
            description: def.description.clone(),
        })
    }

    fn procedure_type(&mut self, key: &str, rpc_path: &str) -> String {
        if !self.definitions.contains_key(key) {
            self.state.warn(
                rpc_path,
                format!("procedure refers to unknown definition \"{key}\""),
            );
        }
        self.definition_type_name(key)
    }
}

/// Type name for a nominal node: its `metadata.id`, or its instance path.
fn type_name(id: Option<&str>, ctx: &Context) -> String {
    match id {
        Some(id) => pascal(id),
        None => type_name_from_path(&ctx.instance_path),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// REF GRAPH
// ————————————————————————————————————————————————————————————————————————————

/// Which definitions each definition mentions directly.
struct RefGraph {
    edges: IndexMap<String, IndexSet<String>>,
}

impl RefGraph {
    fn build(definitions: &IndexMap<String, Schema>) -> Self {
        let edges = definitions
            .iter()
            .map(|(name, schema)| {
                let mut refs = IndexSet::new();
                schema.collect_refs(&mut refs);
                (name.clone(), refs)
            })
            .collect();
        Self { edges }
    }

    /// Whether `to` is reachable from `from` (a definition reaches itself).
    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut seen = IndexSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(next) = self.edges.get(current) {
                stack.extend(next.iter().map(String::as_str));
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_def::unflatten_procedures;
    use serde_json::json;

    fn app(value: serde_json::Value) -> AppDefinition {
        AppDefinition::from_json_str(&value.to_string()).unwrap()
    }

    fn lowered(app: &AppDefinition) -> (ServiceDecl, Lowerer<'_>) {
        let mut lowerer = Lowerer::new(&app.definitions);
        let tree = unflatten_procedures(&app.procedures).unwrap();
        let services = lowerer.lower_services(&tree, "Example");
        lowerer.lower_definitions();
        (services, lowerer)
    }

    fn object<'d>(decls: &'d [Decl], name: &str) -> &'d ObjectDecl {
        decls
            .iter()
            .find_map(|decl| match decl {
                Decl::Object(obj) if obj.name == name => Some(obj),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no object named {name}"))
    }

    #[test]
    fn self_referential_type_is_emitted_once() {
        let app = app(json!({
            "procedures": {},
            "definitions": {
                "BinaryTree": {
                    "properties": {
                        "left": {"ref": "BinaryTree"},
                        "right": {"ref": "BinaryTree"}
                    }
                }
            }
        }));
        let (_, lowerer) = lowered(&app);
        assert_eq!(lowerer.decls.len(), 1);
        let tree = object(&lowerer.decls, "BinaryTree");
        assert!(tree.fields.iter().all(|field| matches!(
            field.shape.kind,
            ShapeKind::Ref { ref name, recursive: true } if name == "BinaryTree"
        )));
    }

    #[test]
    fn mutually_recursive_refs_are_flagged() {
        let app = app(json!({
            "procedures": {},
            "definitions": {
                "Author": {"properties": {"posts": {"elements": {"ref": "Post"}}}},
                "Post": {"properties": {"author": {"ref": "Author"}, "tag": {"ref": "Tag"}}},
                "Tag": {"properties": {"label": {"type": "string"}}}
            }
        }));
        let (_, lowerer) = lowered(&app);
        let post = object(&lowerer.decls, "Post");
        assert!(matches!(post.fields[0].shape.kind, ShapeKind::Ref { recursive: true, .. }));
        assert!(matches!(post.fields[1].shape.kind, ShapeKind::Ref { recursive: false, .. }));
    }

    #[test]
    fn nested_types_are_named_by_path_and_declared_first() {
        let app = app(json!({
            "procedures": {},
            "definitions": {
                "User": {
                    "properties": {
                        "settings": {"properties": {"theme": {"enum": ["LIGHT", "DARK"]}}},
                        "tags": {"elements": {"properties": {"label": {"type": "string"}}}},
                        "scores": {"values": {"properties": {"value": {"type": "float64"}}}}
                    }
                }
            }
        }));
        let (_, lowerer) = lowered(&app);
        let names = lowerer.decls.iter().map(Decl::name).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "UserSettingsTheme",
                "UserSettings",
                "UserTagsElement",
                "UserScoresValue",
                "User"
            ]
        );
    }

    #[test]
    fn union_variants_get_tag_and_prefixed_names() {
        let app = app(json!({
            "procedures": {},
            "definitions": {
                "Message": {
                    "discriminator": "type",
                    "mapping": {
                        "TEXT": {"properties": {"content": {"type": "string"}}},
                        "IMAGE": {"properties": {"imageUrl": {"type": "string"}}}
                    }
                }
            }
        }));
        let (_, lowerer) = lowered(&app);
        let Decl::Union(union) = &lowerer.decls[0] else {
            panic!("expected a union");
        };
        assert_eq!(union.discriminator, "type");
        let variants = union
            .variants
            .iter()
            .map(|v| (v.name.as_str(), v.tag.as_ref().map(|t| t.value.as_str())))
            .collect::<Vec<_>>();
        assert_eq!(
            variants,
            vec![("MessageText", Some("TEXT")), ("MessageImage", Some("IMAGE"))]
        );
    }

    #[test]
    fn metadata_id_dedups_shared_shapes() {
        let app = app(json!({
            "procedures": {},
            "definitions": {
                "Order": {
                    "properties": {
                        "billing": {"properties": {"line": {"type": "string"}}, "metadata": {"id": "Address"}},
                        "shipping": {"properties": {"line": {"type": "string"}}, "metadata": {"id": "Address"}}
                    }
                }
            }
        }));
        let (_, lowerer) = lowered(&app);
        assert_eq!(
            lowerer.decls.iter().filter(|d| d.name() == "Address").count(),
            1
        );
    }

    #[test]
    fn services_nest_and_skip_unsupported_transports() {
        let app = app(json!({
            "procedures": {
                "users.getUser": {"transport": "http", "method": "get", "path": "/users/get-user", "params": "UserParams", "response": "User"},
                "users.settings.watch": {"transport": "http", "method": "post", "path": "/users/settings/watch", "params": null, "response": "User", "isEventStream": true},
                "chat": {"transport": "ws", "path": "/chat", "params": null, "response": null}
            },
            "definitions": {
                "UserParams": {"properties": {"id": {"type": "string"}, "filter": {"elements": {"type": "string"}}}},
                "User": {"properties": {"id": {"type": "string"}}}
            }
        }));
        let (services, lowerer) = lowered(&app);
        assert_eq!(services.name, "Example");
        assert!(services.procedures.is_empty());
        assert_eq!(services.sub_services[0].type_name, "ExampleUsersService");
        let users = &services.children[0];
        assert_eq!(users.procedures[0].key, "getUser");
        assert_eq!(users.children[0].name, "ExampleUsersSettingsService");

        assert!(lowerer.state.used_features.sse);
        assert!(lowerer.state.used_features.ws);
        let messages = lowerer
            .state
            .warnings
            .iter()
            .map(|w| w.message.as_str())
            .collect::<Vec<_>>();
        assert!(messages.iter().any(|m| m.contains("WebSocket") && m.contains("chat")));
        // GET params with an array field
        assert!(messages.iter().any(|m| m.contains("\"filter\" of UserParams")));
    }

    #[test]
    fn scalar_definitions_become_aliases() {
        let app = app(json!({
            "procedures": {},
            "definitions": {
                "UserId": {"type": "string"},
                "User": {"properties": {"id": {"ref": "UserId"}}}
            }
        }));
        let (_, lowerer) = lowered(&app);
        assert!(matches!(&lowerer.decls[0], Decl::Alias(alias) if alias.name == "UserId"));
        let user = object(&lowerer.decls, "User");
        assert_eq!(
            user.fields[0].shape.kind,
            ShapeKind::Scalar(crate::schema::ScalarType::String)
        );
    }

    #[test]
    fn enum_refs_stay_query_string_safe() {
        let app = app(json!({
            "procedures": {
                "users.list": {"transport": "http", "method": "get", "path": "/users/list", "params": "ListParams", "response": null}
            },
            "definitions": {
                "Status": {"enum": ["ACTIVE", "BANNED"]},
                "ListParams": {"properties": {"status": {"ref": "Status"}, "q": {"type": "string"}}}
            }
        }));
        let (_, lowerer) = lowered(&app);
        let params = object(&lowerer.decls, "ListParams");
        assert_eq!(params.fields[0].shape.kind, ShapeKind::Enum { name: "Status".into() });
        assert!(params.fields.iter().all(|field| field.shape.can_be_query_string()));
        assert!(lowerer.state.warnings.is_empty());
    }

    #[test]
    fn refs_take_nullability_from_their_target() {
        let app = app(json!({
            "procedures": {},
            "definitions": {
                "Profile": {"properties": {"bio": {"type": "string"}}, "nullable": true},
                "Status": {"enum": ["ACTIVE"], "nullable": true},
                "User": {"properties": {"profile": {"ref": "Profile"}, "status": {"ref": "Status"}}}
            }
        }));
        let (_, lowerer) = lowered(&app);
        let user = object(&lowerer.decls, "User");
        assert!(user.fields.iter().all(|field| field.shape.nullable));
    }

    #[test]
    fn union_member_with_a_taken_id_is_renamed() {
        let app = app(json!({
            "procedures": {},
            "definitions": {
                "Shared": {"properties": {"value": {"type": "string"}}},
                "Event": {
                    "discriminator": "kind",
                    "mapping": {
                        "SHARED": {"properties": {"value": {"type": "string"}}, "metadata": {"id": "Shared"}}
                    }
                }
            }
        }));
        let (_, lowerer) = lowered(&app);
        assert_eq!(lowerer.decls.iter().filter(|d| d.name() == "Shared").count(), 1);
        let Some(Decl::Union(union)) = lowerer.decls.iter().find(|d| d.name() == "Event") else {
            panic!("expected a union");
        };
        assert_eq!(union.variants[0].name, "EventShared");
        assert!(lowerer.state.warnings.iter().any(|w| w.message.contains("\"Shared\" is already in use")));
    }
}
