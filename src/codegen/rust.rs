//! Rust client target.
//!
//! Models implement `RpcModel` from the `rpcgen_client` runtime and decode from
//! a borrowed `serde_json::Value`; encoding writes straight into a `String`.
//! Optional fields are `Option<T>`, optional nullable fields `Option<Option<T>>`
//! so "absent" and "present but null" stay distinct.
use std::fmt;

use crate::code_writer::{CodeWriter, indent_all, indent_tail};
use crate::codegen::{PropertyPlan, RenderContext, Target, TargetKind, needs_key_counter};
use crate::context::Discriminant;
use crate::ir::{
    AliasDecl, Decl, EnumDecl, Field, ObjectDecl, ProcedureDecl, ServiceDecl, Shape, ShapeKind,
    UnionDecl,
};
use crate::naming::{js_string, local_var, pascal, rust_ident, rust_string, unique_idents};
use crate::schema::ScalarType;

#[derive(Debug, Clone, Copy, Default)]
pub struct RustTarget;

const JSON_OUT: &str = "_json_output_";
const QUERY_OUT: &str = "_query_parts_";

// ————————————————————————————————————————————————————————————————————————————
// PRIMITIVES
// ————————————————————————————————————————————————————————————————————————————

fn prefixed(cx: &RenderContext<'_>, name: &str) -> String {
    format!("{}{}", cx.type_prefix, name)
}

fn scalar_type(scalar: ScalarType) -> &'static str {
    match scalar {
        ScalarType::Boolean => "bool",
        ScalarType::String => "String",
        ScalarType::Timestamp => "DateTime<FixedOffset>",
        ScalarType::Float32 => "f32",
        ScalarType::Float64 => "f64",
        ScalarType::Int8 => "i8",
        ScalarType::Uint8 => "u8",
        ScalarType::Int16 => "i16",
        ScalarType::Uint16 => "u16",
        ScalarType::Int32 => "i32",
        ScalarType::Uint32 => "u32",
        ScalarType::Int64 => "i64",
        ScalarType::Uint64 => "u64",
    }
}

/// Escape braces so `text` can sit inside a `format!` literal.
fn format_escape(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

impl RustTarget {
    fn base_type(&self, shape: &Shape, cx: &RenderContext<'_>) -> String {
        match &shape.kind {
            ShapeKind::Scalar(scalar) => scalar_type(*scalar).to_owned(),
            ShapeKind::Enum { name } | ShapeKind::Object { name } | ShapeKind::Union { name } => {
                prefixed(cx, name)
            }
            ShapeKind::Ref { name, recursive: true } => format!("Box<{}>", prefixed(cx, name)),
            ShapeKind::Ref { name, .. } => prefixed(cx, name),
            ShapeKind::Array(inner) => format!("Vec<{}>", self.type_name(inner, cx)),
            ShapeKind::Record(inner) => format!("BTreeMap<String, {}>", self.type_name(inner, cx)),
            ShapeKind::Any => "serde_json::Value".to_owned(),
        }
    }

    fn base_default(&self, shape: &Shape, cx: &RenderContext<'_>) -> String {
        match &shape.kind {
            ShapeKind::Scalar(ScalarType::Boolean) => "false".to_owned(),
            ShapeKind::Scalar(ScalarType::String) => "String::new()".to_owned(),
            ShapeKind::Scalar(ScalarType::Timestamp) => "DateTime::<FixedOffset>::default()".to_owned(),
            ShapeKind::Scalar(ScalarType::Float32 | ScalarType::Float64) => "0.0".to_owned(),
            ShapeKind::Scalar(_) => "0".to_owned(),
            ShapeKind::Enum { name } | ShapeKind::Object { name } | ShapeKind::Union { name } => {
                format!("{}::new()", prefixed(cx, name))
            }
            ShapeKind::Ref { name, recursive: true } => format!("Box::new({}::new())", prefixed(cx, name)),
            ShapeKind::Ref { name, .. } => format!("{}::new()", prefixed(cx, name)),
            ShapeKind::Array(_) => "Vec::new()".to_owned(),
            ShapeKind::Record(_) => "BTreeMap::new()".to_owned(),
            ShapeKind::Any => "serde_json::Value::Null".to_owned(),
        }
    }

    /// Match pattern and conversion for a present, non-null value bound to `var`.
    fn value_arm(&self, shape: &Shape, cx: &RenderContext<'_>, var: &str) -> (String, String) {
        let model = |name: &str| (var.to_owned(), format!("{}::from_json({var})?", prefixed(cx, name)));
        match &shape.kind {
            ShapeKind::Scalar(ScalarType::Boolean) => {
                (format!("serde_json::Value::Bool({var})"), format!("*{var}"))
            }
            ShapeKind::Scalar(ScalarType::String) => {
                (format!("serde_json::Value::String({var})"), format!("{var}.to_owned()"))
            }
            ShapeKind::Scalar(ScalarType::Timestamp) => (
                format!("serde_json::Value::String({var})"),
                format!("DateTime::<FixedOffset>::parse_from_rfc3339({var}).unwrap_or_default()"),
            ),
            ShapeKind::Scalar(ScalarType::Float32) => (
                format!("serde_json::Value::Number({var})"),
                format!("{var}.as_f64().unwrap_or(0.0) as f32"),
            ),
            ShapeKind::Scalar(ScalarType::Float64) => (
                format!("serde_json::Value::Number({var})"),
                format!("{var}.as_f64().unwrap_or(0.0)"),
            ),
            ShapeKind::Scalar(scalar @ (ScalarType::Int64 | ScalarType::Uint64)) => (
                format!("serde_json::Value::String({var})"),
                format!("{var}.parse::<{}>().unwrap_or(0)", scalar_type(*scalar)),
            ),
            ShapeKind::Scalar(scalar) => (
                format!("serde_json::Value::Number({var})"),
                format!(
                    "{var}.as_i64().and_then(|n| {}::try_from(n).ok()).unwrap_or(0)",
                    scalar_type(*scalar)
                ),
            ),
            ShapeKind::Enum { name } | ShapeKind::Object { name } | ShapeKind::Union { name } => model(name),
            ShapeKind::Ref { name, recursive } => {
                let (pattern, conversion) = model(name);
                if *recursive {
                    (pattern, format!("Box::new({conversion})"))
                } else {
                    (pattern, conversion)
                }
            }
            ShapeKind::Array(inner) => {
                let item = format!("{var}_item");
                let item_decode = self.decode_expr(inner, cx, &format!("Some({item})"), &format!("{item}_val"));
                let conversion = format!(
                    "{{\n    let mut {var}_result: Vec<{ty}> = Vec::new();\n    for {item} in {var} {{\n        let {item}_value = {decode};\n        {var}_result.push({item}_value);\n    }}\n    {var}_result\n}}",
                    ty = self.type_name(inner, cx),
                    decode = indent_tail(&item_decode, 8),
                );
                (format!("serde_json::Value::Array({var})"), conversion)
            }
            ShapeKind::Record(inner) => {
                let value = format!("{var}_value");
                let value_decode =
                    self.decode_expr(inner, cx, &format!("Some({value})"), &format!("{value}_val"));
                let conversion = format!(
                    "{{\n    let mut {var}_result: BTreeMap<String, {ty}> = BTreeMap::new();\n    for ({var}_key, {value}) in {var} {{\n        let {value}_result = {decode};\n        {var}_result.insert({var}_key.to_owned(), {value}_result);\n    }}\n    {var}_result\n}}",
                    ty = self.type_name(inner, cx),
                    decode = indent_tail(&value_decode, 8),
                );
                (format!("serde_json::Value::Object({var})"), conversion)
            }
            ShapeKind::Any => (var.to_owned(), format!("{var}.to_owned()")),
        }
    }

    /// Expression turning `input: Option<&serde_json::Value>` into the field type.
    fn decode_expr(&self, shape: &Shape, cx: &RenderContext<'_>, input: &str, var: &str) -> String {
        if shape.kind == ShapeKind::Any {
            return if shape.optional {
                format!("{input}.map(|{var}| {var}.to_owned())")
            } else {
                format!("match {input} {{\n    Some({var}) => {var}.to_owned(),\n    _ => serde_json::Value::Null,\n}}")
            };
        }
        let (pattern, conversion) = self.value_arm(shape, cx, var);
        let wrapped = match (shape.optional, shape.nullable) {
            (false, false) => conversion,
            (true, true) => format!("Some(Some({conversion}))"),
            _ => format!("Some({conversion})"),
        };
        let mut arms = Vec::new();
        if shape.optional || shape.nullable {
            let null_value = if shape.optional && shape.nullable { "Some(None)" } else { "None" };
            arms.push(format!("Some(serde_json::Value::Null) => {null_value},"));
        }
        arms.push(format!("Some({pattern}) => {wrapped},"));
        let fallback = if shape.optional || shape.nullable {
            "None".to_owned()
        } else {
            self.base_default(shape, cx)
        };
        arms.push(format!("_ => {fallback},"));
        let arms = arms.iter().map(|arm| indent_all(arm, 4)).collect::<Vec<_>>().join("\n");
        format!("match {input} {{\n{arms}\n}}")
    }

    /// Encoding of a present value; `input` is a place or a reference.
    fn encode_base(&self, shape: &Shape, cx: &RenderContext<'_>, input: &str, target: &str) -> String {
        let v = local_var(input);
        match &shape.kind {
            ShapeKind::Scalar(ScalarType::String) => {
                format!("{target}.push_str(serialize_string(&{input}).as_str());")
            }
            ShapeKind::Scalar(ScalarType::Timestamp) => {
                format!("{target}.push_str(serialize_date_time(&{input}, true).as_str());")
            }
            ShapeKind::Scalar(ScalarType::Int64 | ScalarType::Uint64) => {
                format!(r#"{target}.push_str(format!("\"{{}}\"", {input}).as_str());"#)
            }
            ShapeKind::Scalar(_) => format!("{target}.push_str({input}.to_string().as_str());"),
            ShapeKind::Enum { .. } => {
                format!(r#"{target}.push_str(format!("\"{{}}\"", {input}.serial_value()).as_str());"#)
            }
            ShapeKind::Object { .. } | ShapeKind::Union { .. } | ShapeKind::Ref { .. } => {
                format!("{target}.push_str({input}.to_json_string().as_str());")
            }
            ShapeKind::Any => format!(
                r#"{target}.push_str(serde_json::to_string(&{input}).unwrap_or_else(|_| "null".to_string()).as_str());"#
            ),
            ShapeKind::Array(inner) => {
                let element = format!("{v}_element");
                let body = self.encode_json(inner, cx, &element, target);
                format!(
                    "{target}.push('[');\nfor ({v}_index, {element}) in {input}.iter().enumerate() {{\n    if {v}_index != 0 {{\n        {target}.push(',');\n    }}\n{body}\n}}\n{target}.push(']');",
                    body = indent_all(&body, 4),
                )
            }
            ShapeKind::Record(inner) => {
                let value = format!("{v}_value");
                let body = self.encode_json(inner, cx, &value, target);
                format!(
                    "{target}.push('{{');\nfor ({v}_index, ({v}_key, {value})) in {input}.iter().enumerate() {{\n    if {v}_index != 0 {{\n        {target}.push(',');\n    }}\n    {target}.push_str(format!(\"{{}}:\", serialize_string({v}_key)).as_str());\n{body}\n}}\n{target}.push('}}');",
                    body = indent_all(&body, 4),
                )
            }
        }
    }

    fn write_docs(&self, w: &mut CodeWriter<&mut String>, description: Option<&str>, deprecated: bool) -> fmt::Result {
        if let Some(description) = description {
            w.doc_comment("///", description)?;
        }
        if deprecated {
            w.writeln("#[deprecated]")?;
        }
        Ok(())
    }
}

impl Target for RustTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Rust
    }

    fn type_name(&self, shape: &Shape, cx: &RenderContext<'_>) -> String {
        let base = self.base_type(shape, cx);
        let ty = if shape.nullable && shape.kind != ShapeKind::Any {
            format!("Option<{base}>")
        } else {
            base
        };
        if shape.optional { format!("Option<{ty}>") } else { ty }
    }

    fn default_value(&self, shape: &Shape, cx: &RenderContext<'_>) -> String {
        if shape.nullable && shape.kind != ShapeKind::Any {
            String::new()
        } else if shape.optional {
            "None".to_owned()
        } else {
            self.base_default(shape, cx)
        }
    }

    fn decode(&self, shape: &Shape, cx: &RenderContext<'_>, input: &str, target: &str) -> String {
        let var = format!("{}_val", local_var(target));
        format!("let {target} = {};", self.decode_expr(shape, cx, input, &var))
    }

    fn encode_json(&self, shape: &Shape, cx: &RenderContext<'_>, input: &str, target: &str) -> String {
        if !shape.nullable || shape.kind == ShapeKind::Any {
            return self.encode_base(shape, cx, input, target);
        }
        let v = format!("{}_val", local_var(input));
        let body = self.encode_base(shape, cx, &v, target);
        format!(
            "match &{input} {{\n    Some({v}) => {{\n{body}\n    }}\n    _ => {{\n        {target}.push_str(\"null\");\n    }}\n}}",
            body = indent_all(&body, 8),
        )
    }

    fn encode_query(
        &self,
        shape: &Shape,
        _cx: &RenderContext<'_>,
        input: &str,
        target: &str,
        key: &str,
    ) -> String {
        if !shape.can_be_query_string() {
            return format!(
                "// {key}: nested objects, arrays and records cannot be sent as URL query params, skipped ({})",
                shape.schema_path
            );
        }
        let pair = rust_string(&format!("{}={{}}", format_escape(key)));
        let push = |value: &str| {
            let value = match &shape.kind {
                ShapeKind::Scalar(ScalarType::Timestamp) => format!("serialize_date_time(&{value}, false)"),
                ShapeKind::Enum { .. } => format!("{value}.serial_value()"),
                _ => value.to_owned(),
            };
            format!("{target}.push(format!({pair}, {value}));")
        };
        if !shape.nullable {
            return push(input);
        }
        let v = format!("{}_val", local_var(input));
        format!(
            "match &{input} {{\n    Some({v}) => {{\n        {}\n    }}\n    _ => {{\n        {target}.push({}.to_string());\n    }}\n}}",
            push(&v),
            rust_string(&format!("{key}=null")),
        )
    }

    fn clone_value(&self, _shape: &Shape, _cx: &RenderContext<'_>, input: &str) -> String {
        format!("{input}.clone()")
    }

    fn render_preamble(&self, w: &mut CodeWriter<&mut String>, cx: &RenderContext<'_>) -> fmt::Result {
        w.writeln("// This file was autogenerated by rpcgen. Do not modify directly.")?;
        if !cx.schema_version.is_empty() {
            w.writeln(&format!("// Schema version: {}", cx.schema_version))?;
        }
        w.write_fragment(
            "#![allow(\n    dead_code,\n    unused_imports,\n    unused_variables,\n    unconditional_recursion,\n    deprecated\n)]",
        )?;
        w.writeln("use rpcgen_client::{")?;
        {
            let _indent = w.indent();
            w.writeln("chrono::{DateTime, FixedOffset},")?;
            w.writeln("serde_json,")?;
            w.writeln("utils::{serialize_date_time, serialize_string},")?;
            w.writeln("DecodeError, RpcEnum, RpcModel,")?;
            if cx.has_services {
                w.writeln("HttpMethod, RequestBody, RpcClientConfig, RpcClientService, RpcError,")?;
                w.writeln("RpcRequestOptions, parsed_rpc_request,")?;
            }
            if cx.features.sse {
                w.writeln("SseController, SseEvent, SseOptions, parsed_rpc_sse_request,")?;
            }
        }
        w.writeln("};")?;
        w.writeln("use std::collections::BTreeMap;")?;
        if cx.features.ws {
            w.writeln("// WebSocket procedures are not supported by this generator and were skipped.")?;
        }
        Ok(())
    }

    fn render_service(
        &self,
        w: &mut CodeWriter<&mut String>,
        service: &ServiceDecl,
        cx: &RenderContext<'_>,
    ) -> fmt::Result {
        w.block(&format!("pub struct {}", service.name), |w| {
            w.writeln("_config: RpcClientConfig,")?;
            for sub in &service.sub_services {
                w.writeln(&format!("pub {}: {},", rust_ident(&sub.key), sub.type_name))?;
            }
            Ok(())
        })?;
        w.blank_line()?;
        w.block(&format!("impl RpcClientService for {}", service.name), |w| {
            w.block("fn create(config: RpcClientConfig) -> Self", |w| {
                w.block("Self", |w| {
                    w.writeln("_config: config.clone(),")?;
                    for sub in &service.sub_services {
                        w.writeln(&format!(
                            "{}: {}::create(config.clone()),",
                            rust_ident(&sub.key),
                            sub.type_name
                        ))?;
                    }
                    Ok(())
                })
            })
        })?;
        if service.procedures.is_empty() {
            return Ok(());
        }
        w.blank_line()?;
        w.block(&format!("impl {}", service.name), |w| {
            for (index, procedure) in service.procedures.iter().enumerate() {
                if index > 0 {
                    w.blank_line()?;
                }
                self.render_procedure(w, procedure, cx)?;
            }
            Ok(())
        })
    }

    fn render_decl(&self, w: &mut CodeWriter<&mut String>, decl: &Decl, cx: &RenderContext<'_>) -> fmt::Result {
        match decl {
            Decl::Object(object) => self.render_object(w, object, cx),
            Decl::Enum(decl) => self.render_enum(w, decl, cx),
            Decl::Union(union) => self.render_union(w, union, cx),
            Decl::Alias(alias) => self.render_alias(w, alias, cx),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// COMPOSITES
// ————————————————————————————————————————————————————————————————————————————

impl RustTarget {
    fn render_object(&self, w: &mut CodeWriter<&mut String>, decl: &ObjectDecl, cx: &RenderContext<'_>) -> fmt::Result {
        let name = prefixed(cx, &decl.name);
        self.write_docs(w, decl.description.as_deref(), decl.is_deprecated)?;
        w.writeln("#[derive(Clone, Debug, PartialEq)]")?;
        self.write_struct_fields(w, &format!("pub struct {name}"), &decl.fields, "pub ", cx)?;
        w.blank_line()?;
        w.block(&format!("impl RpcModel for {name}"), |w| {
            w.block("fn new() -> Self", |w| {
                self.write_field_defaults(w, "Self", &decl.fields, cx)
            })?;
            w.blank_line()?;
            w.block(
                "fn from_json(input: &serde_json::Value) -> Result<Self, DecodeError>",
                |w| {
                    w.block("match input", |w| {
                        w.block("serde_json::Value::Object(_val_) =>", |w| {
                            self.write_field_decoders(w, &decl.fields, cx)?;
                            w.writeln(&format!("Ok(Self {{ {} }})", field_idents(&decl.fields)))
                        })?;
                        w.writeln(&format!(
                            "_ => Err(DecodeError::new({}, \"expected an object\")),",
                            rust_string(&decl.instance_path)
                        ))
                    })
                },
            )?;
            w.blank_line()?;
            w.block("fn to_json_string(&self) -> String", |w| {
                w.writeln(&format!("let mut {JSON_OUT} = \"{{\".to_string();"))?;
                self.write_json_fields(w, &decl.fields, None, |ident| format!("self.{ident}"), cx)?;
                w.writeln(&format!("{JSON_OUT}.push('}}');"))?;
                w.writeln(JSON_OUT)
            })?;
            w.blank_line()?;
            w.block("fn to_query_params_string(&self) -> String", |w| {
                w.writeln(&format!("let mut {QUERY_OUT}: Vec<String> = Vec::new();"))?;
                self.write_query_fields(w, &decl.fields, None, |ident| format!("self.{ident}"), cx)?;
                w.writeln(&format!("{QUERY_OUT}.join(\"&\")"))
            })
        })
    }

    fn render_union(&self, w: &mut CodeWriter<&mut String>, decl: &UnionDecl, cx: &RenderContext<'_>) -> fmt::Result {
        let name = prefixed(cx, &decl.name);
        let variant_name = |variant: &ObjectDecl| {
            pascal(variant.tag.as_ref().map(|tag| tag.value.as_str()).unwrap_or(variant.name.as_str()))
        };
        self.write_docs(w, decl.description.as_deref(), decl.is_deprecated)?;
        w.writeln("#[derive(Clone, Debug, PartialEq)]")?;
        w.block(&format!("pub enum {name}"), |w| {
            for variant in &decl.variants {
                self.write_docs(w, variant.description.as_deref(), variant.is_deprecated)?;
                if variant.fields.is_empty() {
                    w.writeln(&format!("{} {{}},", variant_name(variant)))?;
                    continue;
                }
                w.block_with_end(&variant_name(variant), "},", |w| {
                    for (field, ident) in variant.fields.iter().zip(field_names(&variant.fields)) {
                        let plan = PropertyPlan::new(self, cx, &field.shape);
                        self.write_docs(w, field.description.as_deref(), field.is_deprecated)?;
                        w.writeln(&format!("{ident}: {},", plan.type_name))?;
                    }
                    Ok(())
                })?;
            }
            Ok(())
        })?;
        w.blank_line()?;

        let tag_path = rust_string(&format!("{}/{}", decl.instance_path, decl.discriminator));
        w.block(&format!("impl RpcModel for {name}"), |w| {
            w.block("fn new() -> Self", |w| match decl.variants.first() {
                Some(first) => self.write_field_defaults(
                    w,
                    &format!("Self::{}", variant_name(first)),
                    &first.fields,
                    cx,
                ),
                None => w.writeln("unreachable!()"),
            })?;
            w.blank_line()?;
            w.block(
                "fn from_json(input: &serde_json::Value) -> Result<Self, DecodeError>",
                |w| {
                    w.block("match input", |w| {
                        w.block_with_end(
                            &format!(
                                "serde_json::Value::Object(_val_) => match _val_.get({})",
                                rust_string(&decl.discriminator)
                            ),
                            "},",
                            |w| {
                                w.block_with_end(
                                    "Some(serde_json::Value::String(_tag_)) => match _tag_.as_str()",
                                    "},",
                                    |w| {
                                        for variant in &decl.variants {
                                            let tag = variant.tag.as_ref().map(|t| t.value.as_str()).unwrap_or_default();
                                            w.block(&format!("{} =>", rust_string(tag)), |w| {
                                                self.write_field_decoders(w, &variant.fields, cx)?;
                                                w.writeln(&format!(
                                                    "Ok(Self::{} {{ {} }})",
                                                    variant_name(variant),
                                                    field_idents(&variant.fields)
                                                ))
                                            })?;
                                        }
                                        w.writeln(&format!(
                                            r#"_ => Err(DecodeError::new({tag_path}, format!("unrecognized discriminator value \"{{_tag_}}\""))),"#
                                        ))
                                    },
                                )?;
                                w.writeln(&format!(
                                    "_ => Err(DecodeError::new({tag_path}, {})),",
                                    rust_string(&format!("missing discriminator field \"{}\"", decl.discriminator))
                                ))
                            },
                        )?;
                        w.writeln(&format!(
                            "_ => Err(DecodeError::new({}, \"expected an object\")),",
                            rust_string(&decl.instance_path)
                        ))
                    })
                },
            )?;
            w.blank_line()?;
            w.block("fn to_json_string(&self) -> String", |w| {
                w.writeln(&format!("let mut {JSON_OUT} = \"{{\".to_string();"))?;
                w.block("match self", |w| {
                    for variant in &decl.variants {
                        w.block(&format!("{} =>", variant_pattern(&variant_name(variant), &variant.fields)), |w| {
                            self.write_json_fields(w, &variant.fields, variant.tag.as_ref(), str::to_owned, cx)
                        })?;
                    }
                    Ok(())
                })?;
                w.writeln(&format!("{JSON_OUT}.push('}}');"))?;
                w.writeln(JSON_OUT)
            })?;
            w.blank_line()?;
            w.block("fn to_query_params_string(&self) -> String", |w| {
                w.writeln(&format!("let mut {QUERY_OUT}: Vec<String> = Vec::new();"))?;
                w.block("match self", |w| {
                    for variant in &decl.variants {
                        w.block(&format!("{} =>", variant_pattern(&variant_name(variant), &variant.fields)), |w| {
                            self.write_query_fields(w, &variant.fields, variant.tag.as_ref(), str::to_owned, cx)
                        })?;
                    }
                    Ok(())
                })?;
                w.writeln(&format!("{QUERY_OUT}.join(\"&\")"))
            })
        })
    }

    fn render_enum(&self, w: &mut CodeWriter<&mut String>, decl: &EnumDecl, cx: &RenderContext<'_>) -> fmt::Result {
        let name = prefixed(cx, &decl.name);
        let path = rust_string(&format!("/{}", decl.name));
        self.write_docs(w, decl.description.as_deref(), decl.is_deprecated)?;
        w.writeln("#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]")?;
        w.block(&format!("pub enum {name}"), |w| {
            for (index, value) in decl.values.iter().enumerate() {
                if index == 0 {
                    w.writeln("#[default]")?;
                }
                w.writeln(&format!("{},", pascal(value)))?;
            }
            Ok(())
        })?;
        w.blank_line()?;
        w.block(&format!("impl RpcEnum for {name}"), |w| {
            w.block("fn from_serial_value(value: &str) -> Option<Self>", |w| {
                w.block("match value", |w| {
                    for value in &decl.values {
                        w.writeln(&format!("{} => Some(Self::{}),", rust_string(value), pascal(value)))?;
                    }
                    w.writeln("_ => None,")
                })
            })?;
            w.blank_line()?;
            w.block("fn serial_value(&self) -> &'static str", |w| {
                w.block("match self", |w| {
                    for value in &decl.values {
                        w.writeln(&format!("Self::{} => {},", pascal(value), rust_string(value)))?;
                    }
                    Ok(())
                })
            })
        })?;
        w.blank_line()?;
        w.block(&format!("impl RpcModel for {name}"), |w| {
            w.block("fn new() -> Self", |w| w.writeln("Self::default()"))?;
            w.blank_line()?;
            w.block(
                "fn from_json(input: &serde_json::Value) -> Result<Self, DecodeError>",
                |w| {
                    w.block("match input", |w| {
                        w.writeln(&format!(
                            r#"serde_json::Value::String(value) => Self::from_serial_value(value).ok_or_else(|| DecodeError::new({path}, format!("unrecognized enum value \"{{value}}\""))),"#
                        ))?;
                        w.writeln(&format!("_ => Err(DecodeError::new({path}, \"expected a string\")),"))
                    })
                },
            )?;
            w.blank_line()?;
            w.block("fn to_json_string(&self) -> String", |w| {
                w.writeln(r#"format!("\"{}\"", self.serial_value())"#)
            })?;
            w.blank_line()?;
            w.block("fn to_query_params_string(&self) -> String", |w| {
                w.writeln("self.serial_value().to_string()")
            })
        })
    }

    fn render_alias(&self, w: &mut CodeWriter<&mut String>, decl: &AliasDecl, cx: &RenderContext<'_>) -> fmt::Result {
        self.write_docs(w, decl.description.as_deref(), false)?;
        let plan = PropertyPlan::new(self, cx, &decl.shape);
        w.writeln(&format!("pub type {} = {};", prefixed(cx, &decl.name), plan.type_name))
    }

    fn render_procedure(
        &self,
        w: &mut CodeWriter<&mut String>,
        procedure: &ProcedureDecl,
        cx: &RenderContext<'_>,
    ) -> fmt::Result {
        let method_name = rust_ident(&procedure.key);
        let response = procedure
            .response
            .as_deref()
            .map(|name| prefixed(cx, name))
            .unwrap_or_else(|| "()".to_owned());
        let params_arg = procedure
            .params
            .as_deref()
            .map(|name| format!(", params: {}", prefixed(cx, name)))
            .unwrap_or_default();
        let body = match &procedure.params {
            None => "RequestBody::None".to_owned(),
            Some(_) if procedure.method.uses_query_string() => {
                "RequestBody::Query(params.to_query_params_string())".to_owned()
            }
            Some(_) => "RequestBody::Json(params.to_json_string())".to_owned(),
        };
        let parse = match &procedure.response {
            Some(name) => format!("|body| {}::from_json_string(body)", prefixed(cx, name)),
            None => "|_| Ok(())".to_owned(),
        };
        let options = [
            "RpcRequestOptions {".to_owned(),
            "    http_client: &self._config.http_client,".to_owned(),
            format!(
                "    url: format!({}, self._config.base_url),",
                rust_string(&format!("{{}}{}", format_escape(&procedure.http_path)))
            ),
            format!("    method: HttpMethod::{},", pascal(procedure.method.as_str())),
            "    headers: self._config.headers.clone(),".to_owned(),
            format!("    client_version: {}.to_string(),", rust_string(cx.client_version)),
            "},".to_owned(),
        ]
        .join("\n");

        self.write_docs(w, procedure.description.as_deref(), procedure.is_deprecated)?;
        if procedure.is_event_stream {
            w.writeln(&format!("pub async fn {method_name}<OnEvent>("))?;
            {
                let _indent = w.indent();
                w.writeln("&self,")?;
                if let Some(params) = &procedure.params {
                    w.writeln(&format!("params: {},", prefixed(cx, params)))?;
                }
                w.writeln("on_event: &mut OnEvent,")?;
                w.writeln("options: SseOptions,")?;
            }
            w.writeln(") where")?;
            {
                let _indent = w.indent();
                w.writeln(&format!(
                    "OnEvent: FnMut(SseEvent<{response}>, &mut SseController) + Send + Sync,"
                ))?;
            }
            w.writeln("{")?;
            {
                let _indent = w.indent();
                w.writeln("parsed_rpc_sse_request(")?;
                {
                    let _indent = w.indent();
                    w.write_fragment(&options)?;
                    w.writeln(&format!("{body},"))?;
                    w.writeln("options,")?;
                    w.writeln(&format!("{parse},"))?;
                    w.writeln("on_event,")?;
                }
                w.writeln(")")?;
                w.writeln(".await;")?;
            }
            w.writeln("}")
        } else {
            w.block(
                &format!("pub async fn {method_name}(&self{params_arg}) -> Result<{response}, RpcError>"),
                |w| {
                    w.writeln("parsed_rpc_request(")?;
                    {
                        let _indent = w.indent();
                        w.write_fragment(&options)?;
                        w.writeln(&format!("{body},"))?;
                        w.writeln(&format!("{parse},"))?;
                    }
                    w.writeln(")")?;
                    w.writeln(".await")
                },
            )
        }
    }

    // ----- Field helpers -----

    fn write_struct_fields(
        &self,
        w: &mut CodeWriter<&mut String>,
        header: &str,
        fields: &[Field],
        visibility: &str,
        cx: &RenderContext<'_>,
    ) -> fmt::Result {
        if fields.is_empty() {
            return w.writeln(&format!("{header} {{}}"));
        }
        w.block(header, |w| {
            for (field, ident) in fields.iter().zip(field_names(fields)) {
                let plan = PropertyPlan::new(self, cx, &field.shape);
                self.write_docs(w, field.description.as_deref(), field.is_deprecated)?;
                w.writeln(&format!("{visibility}{ident}: {},", plan.type_name))?;
            }
            Ok(())
        })
    }

    fn write_field_defaults(
        &self,
        w: &mut CodeWriter<&mut String>,
        constructor: &str,
        fields: &[Field],
        cx: &RenderContext<'_>,
    ) -> fmt::Result {
        if fields.is_empty() {
            return w.writeln(&format!("{constructor} {{}}"));
        }
        w.block(constructor, |w| {
            for (field, ident) in fields.iter().zip(field_names(fields)) {
                let plan = PropertyPlan::new(self, cx, &field.shape);
                let value = if plan.default_value.is_empty() { "None".to_owned() } else { plan.default_value };
                w.writeln(&format!("{ident}: {value},"))?;
            }
            Ok(())
        })
    }

    fn write_field_decoders(&self, w: &mut CodeWriter<&mut String>, fields: &[Field], cx: &RenderContext<'_>) -> fmt::Result {
        for (field, ident) in fields.iter().zip(field_names(fields)) {
            let plan = PropertyPlan::new(self, cx, &field.shape);
            let input = format!("_val_.get({})", rust_string(&field.key));
            w.write_fragment(&plan.decode(&input, &ident))?;
        }
        Ok(())
    }

    /// Separators come from static "first field" knowledge; a runtime counter
    /// is only needed when every leading field is optional.
    fn write_json_fields(
        &self,
        w: &mut CodeWriter<&mut String>,
        fields: &[Field],
        tag: Option<&Discriminant>,
        access: impl Fn(&str) -> String,
        cx: &RenderContext<'_>,
    ) -> fmt::Result {
        let mut first = true;
        if needs_key_counter(fields, tag) {
            w.writeln("let mut _key_count_ = 0;")?;
        }
        if let Some(tag) = tag {
            let text = format!("{}:{}", js_string(&tag.key), js_string(&tag.value));
            w.writeln(&format!("{JSON_OUT}.push_str({});", rust_string(&text)))?;
            first = false;
        }
        for (field, ident) in fields.iter().zip(field_names(fields)) {
            let input = access(&ident);
            let present = field.shape.as_present();
            let plan = PropertyPlan::new(self, cx, &present);
            let key = js_string(&field.key);
            if !field.shape.optional {
                let prefix = if first { format!("{key}:") } else { format!(",{key}:") };
                w.writeln(&format!("{JSON_OUT}.push_str({});", rust_string(&prefix)))?;
                w.write_fragment(&plan.encode_json(&input, JSON_OUT))?;
                first = false;
                continue;
            }
            let v = format!("{}_val", local_var(&input));
            w.block(&format!("if let Some({v}) = &{input}"), |w| {
                if first {
                    w.block("if _key_count_ > 0", |w| w.writeln(&format!("{JSON_OUT}.push(',');")))?;
                    w.writeln(&format!("{JSON_OUT}.push_str({});", rust_string(&format!("{key}:"))))?;
                } else {
                    w.writeln(&format!("{JSON_OUT}.push_str({});", rust_string(&format!(",{key}:"))))?;
                }
                w.write_fragment(&plan.encode_json(&v, JSON_OUT))?;
                if first {
                    w.writeln("_key_count_ += 1;")?;
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    fn write_query_fields(
        &self,
        w: &mut CodeWriter<&mut String>,
        fields: &[Field],
        tag: Option<&Discriminant>,
        access: impl Fn(&str) -> String,
        cx: &RenderContext<'_>,
    ) -> fmt::Result {
        if let Some(tag) = tag {
            w.writeln(&format!(
                "{QUERY_OUT}.push({}.to_string());",
                rust_string(&format!("{}={}", tag.key, tag.value))
            ))?;
        }
        for (field, ident) in fields.iter().zip(field_names(fields)) {
            let input = access(&ident);
            let present = field.shape.as_present();
            let plan = PropertyPlan::new(self, cx, &present);
            if !field.shape.optional || !plan.can_be_query_string {
                w.write_fragment(&plan.encode_query(&input, QUERY_OUT, &field.key))?;
                continue;
            }
            let v = format!("{}_val", local_var(&input));
            w.block(&format!("if let Some({v}) = &{input}"), |w| {
                w.write_fragment(&plan.encode_query(&v, QUERY_OUT, &field.key))
            })?;
        }
        Ok(())
    }
}

/// Rust names for the fields of one struct or variant.
fn field_names(fields: &[Field]) -> Vec<String> {
    unique_idents(fields.iter().map(|field| field.key.as_str()), rust_ident)
}

fn field_idents(fields: &[Field]) -> String {
    field_names(fields).join(", ")
}

fn variant_pattern(variant: &str, fields: &[Field]) -> String {
    if fields.is_empty() {
        format!("Self::{variant} {{}}")
    } else {
        format!("Self::{variant} {{ {} }}", field_idents(fields))
    }
}

#[cfg(test)]
mod tests {
    use crate::app_def::AppDefinition;
    use crate::codegen::{GeneratorOptions, TargetKind, generate};
    use serde_json::json;

    fn render(definition: serde_json::Value) -> String {
        let app = AppDefinition::from_json_str(&definition.to_string()).unwrap();
        let options = GeneratorOptions {
            client_name: "ExampleClient".into(),
            ..GeneratorOptions::default()
        };
        generate(&app, TargetKind::Rust, &options).unwrap().source
    }

    fn models(definitions: serde_json::Value) -> String {
        render(json!({"schemaVersion": "0.0.7", "procedures": {}, "definitions": definitions}))
    }

    #[test]
    fn object_fields_decode_and_encode_in_order() {
        let source = models(json!({
            "User": {
                "properties": {
                    "id": {"type": "string"},
                    "count": {"type": "int64"},
                    "bio": {"type": "string", "nullable": true}
                },
                "optionalProperties": {"email": {"type": "string", "nullable": true}}
            }
        }));
        assert!(source.contains("pub struct User {\n    pub id: String,\n    pub count: i64,\n    pub bio: Option<String>,\n    pub email: Option<Option<String>>,\n}"));
        assert!(source.contains("let count = match _val_.get(\"count\") {"));
        assert!(source.contains("Some(serde_json::Value::String(count_val)) => count_val.parse::<i64>().unwrap_or(0),"));
        assert!(source.contains("Some(serde_json::Value::Null) => Some(None),"));
        assert!(source.contains(r#"_json_output_.push_str("\"id\":");"#));
        assert!(source.contains(r#"_json_output_.push_str(",\"count\":");"#));
        assert!(source.contains(r#"_json_output_.push_str(format!("\"{}\"", self.count).as_str());"#));
        assert!(source.contains("if let Some(email_val) = &self.email {"));
        // required fields exist, so no runtime separator state
        assert!(!source.contains("_key_count_"));
        let id = source.find(r#""\"id\":""#).unwrap();
        let count = source.find(r#"",\"count\":""#).unwrap();
        let email = source.find(r#"",\"email\":""#).unwrap();
        assert!(id < count && count < email);
    }

    #[test]
    fn all_optional_object_counts_keys_at_runtime() {
        let source = models(json!({
            "Patch": {"optionalProperties": {"a": {"type": "boolean"}, "b": {"type": "float64"}}}
        }));
        assert!(source.contains("let mut _key_count_ = 0;"));
        assert!(source.contains("if _key_count_ > 0 {"));
        assert_eq!(source.matches("_key_count_ += 1;").count(), 2);
    }

    #[test]
    fn union_dispatches_on_tag_and_rejects_unknown() {
        let source = models(json!({
            "Message": {
                "discriminator": "type",
                "mapping": {
                    "TEXT": {"properties": {"content": {"type": "string"}}},
                    "IMAGE": {"properties": {"imageUrl": {"type": "string"}}}
                }
            }
        }));
        assert!(source.contains("pub enum Message {\n    Text {\n        content: String,\n    },\n    Image {\n        image_url: String,\n    },\n}"));
        assert!(source.contains("\"TEXT\" => {"));
        assert!(source.contains("Ok(Self::Image { image_url })"));
        assert!(source.contains("unrecognized discriminator value"));
        assert!(source.contains(r#"_json_output_.push_str("\"type\":\"TEXT\"");"#));
        assert!(source.contains(r#"_json_output_.push_str(",\"content\":");"#));
        assert!(source.contains("_query_parts_.push(\"type=TEXT\".to_string());"));
    }

    #[test]
    fn recursive_refs_are_boxed() {
        let source = models(json!({
            "BinaryTree": {
                "properties": {"value": {"type": "int32"}},
                "optionalProperties": {"left": {"ref": "BinaryTree"}}
            }
        }));
        assert_eq!(source.matches("pub struct BinaryTree").count(), 1);
        assert!(source.contains("pub left: Option<Box<BinaryTree>>,"));
        assert!(source.contains("Some(Box::new(BinaryTree::from_json(left_val)?))"));
    }

    #[test]
    fn nullable_arrays_decode_null_to_none() {
        let source = models(json!({
            "Inbox": {"properties": {"tags": {"elements": {"type": "string"}, "nullable": true}}}
        }));
        assert!(source.contains("pub tags: Option<Vec<String>>,"));
        assert!(source.contains("tags: None,"));
        assert!(source.contains("let tags = match _val_.get(\"tags\") {"));
        assert!(source.contains("Some(serde_json::Value::Null) => None,"));
        assert!(source.contains("Some(serde_json::Value::Array(tags_val)) => Some({"));
        assert!(source.contains("_ => None,"));
    }

    #[test]
    fn refs_to_nullable_definitions_are_optional() {
        let source = models(json!({
            "Profile": {"properties": {"bio": {"type": "string"}}, "nullable": true},
            "User": {"properties": {"profile": {"ref": "Profile"}}}
        }));
        assert!(source.contains("pub profile: Option<Profile>,"));
        assert!(source.contains("Some(profile_val) => Some(Profile::from_json(profile_val)?),"));
        assert!(source.contains("Some(serde_json::Value::Null) => None,"));
    }

    #[test]
    fn enum_refs_are_sent_in_query_strings() {
        let source = render(json!({
            "procedures": {
                "users.list": {"transport": "http", "method": "get", "path": "/users/list", "params": "ListParams", "response": null}
            },
            "definitions": {
                "Status": {"enum": ["ACTIVE", "BANNED"]},
                "ListParams": {"properties": {"status": {"ref": "Status"}, "q": {"type": "string"}}}
            }
        }));
        assert!(source.contains("pub status: Status,"));
        assert!(source.contains(r#"_query_parts_.push(format!("status={}", self.status.serial_value()));"#));
        assert!(source.contains(r#"_query_parts_.push(format!("q={}", self.q));"#));
        assert!(!source.contains("cannot be sent as URL query params"));
    }

    #[test]
    fn colliding_field_names_are_numbered() {
        let source = models(json!({
            "Account": {"properties": {"userId": {"type": "string"}, "user_id": {"type": "string"}}}
        }));
        assert!(source.contains("pub struct Account {\n    pub user_id: String,\n    pub user_id_2: String,\n}"));
        assert!(source.contains("let user_id_2 = match _val_.get(\"user_id\") {"));
        assert!(source.contains("Ok(Self { user_id, user_id_2 })"));
        assert!(source.contains("serialize_string(&self.user_id_2)"));
    }

    #[test]
    fn enums_implement_both_traits() {
        let source = models(json!({"Status": {"enum": ["ACTIVE", "ON_HOLD"]}}));
        assert!(source.contains("#[default]\n    Active,\n    OnHold,"));
        assert!(source.contains("\"ON_HOLD\" => Some(Self::OnHold),"));
        assert!(source.contains("impl RpcEnum for Status"));
    }

    #[test]
    fn services_pick_body_by_method() {
        let source = render(json!({
            "schemaVersion": "0.0.7",
            "info": {"version": "2.1.0"},
            "procedures": {
                "users.getUser": {"transport": "http", "method": "get", "path": "/users/get-user", "params": "UserParams", "response": "User"},
                "users.updateUser": {"transport": "http", "method": "post", "path": "/users/update-user", "params": "User", "response": null},
                "users.watchUser": {"transport": "http", "method": "get", "path": "/users/watch-user", "params": "UserParams", "response": "User", "isEventStream": true}
            },
            "definitions": {
                "UserParams": {"properties": {"userId": {"type": "string"}}},
                "User": {"properties": {"id": {"type": "string"}}}
            }
        }));
        assert!(source.contains("SseController, SseEvent, SseOptions, parsed_rpc_sse_request,"));
        assert!(source.contains("pub struct ExampleClient {\n    _config: RpcClientConfig,\n    pub users: ExampleClientUsersService,\n}"));
        assert!(source.contains("pub async fn get_user(&self, params: UserParams) -> Result<User, RpcError> {"));
        assert!(source.contains("RequestBody::Query(params.to_query_params_string()),"));
        assert!(source.contains("pub async fn update_user(&self, params: User) -> Result<(), RpcError> {"));
        assert!(source.contains("RequestBody::Json(params.to_json_string()),"));
        assert!(source.contains("pub async fn watch_user<OnEvent>("));
        assert!(source.contains("OnEvent: FnMut(SseEvent<User>, &mut SseController) + Send + Sync,"));
        assert!(source.contains("client_version: \"2.1.0\".to_string(),"));
        assert!(source.contains("_query_parts_.push(format!(\"userId={}\", self.user_id));"));
    }

    #[test]
    fn type_prefix_applies_to_models_only() {
        let app = AppDefinition::from_json_str(
            &json!({
                "procedures": {"ping": {"transport": "http", "method": "post", "path": "/ping", "params": null, "response": "Pong"}},
                "definitions": {"Pong": {"properties": {"at": {"type": "timestamp"}}}}
            })
            .to_string(),
        )
        .unwrap();
        let options = GeneratorOptions {
            client_name: "Api".into(),
            type_prefix: "My".into(),
            ..GeneratorOptions::default()
        };
        let source = generate(&app, TargetKind::Rust, &options).unwrap().source;
        assert!(source.contains("pub struct Api {"));
        assert!(source.contains("pub struct MyPong {"));
        assert!(source.contains("|body| MyPong::from_json_string(body),"));
        assert!(source.contains("serialize_date_time(&self.at, true)"));
    }
}
