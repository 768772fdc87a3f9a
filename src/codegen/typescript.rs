//! TypeScript client target.
//!
//! Every named model becomes an `export interface` (or a union/enum type) plus
//! a `$$Name` validator object implementing `RpcModelValidator` from the
//! `@rpcgen/client` runtime.
use std::fmt;

use crate::code_writer::{CodeWriter, indent_all};
use crate::codegen::{PropertyPlan, RenderContext, Target, TargetKind, needs_key_counter};
use crate::context::Discriminant;
use crate::ir::{
    AliasDecl, Decl, EnumDecl, Field, ObjectDecl, ProcedureDecl, ServiceDecl, Shape, ShapeKind,
    UnionDecl,
};
use crate::naming::{camel, js_access, js_property, js_string, local_var, unique_idents};
use crate::schema::ScalarType;

#[derive(Debug, Clone, Copy, Default)]
pub struct TypeScriptTarget;

const JSON_OUT: &str = "json";
const QUERY_OUT: &str = "queryParts";

// ————————————————————————————————————————————————————————————————————————————
// PRIMITIVES
// ————————————————————————————————————————————————————————————————————————————

fn prefixed(cx: &RenderContext<'_>, name: &str) -> String {
    format!("{}{}", cx.type_prefix, name)
}

fn validator(cx: &RenderContext<'_>, name: &str) -> String {
    format!("$${}{}", cx.type_prefix, name)
}

/// Local variable prefix derived from an arbitrary expression.
fn var_prefix(input: &str) -> String {
    let plain = camel(&local_var(input));
    if plain.is_empty() { "value".to_owned() } else { plain }
}

/// Text that can sit inside a template literal.
fn template_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('`', "\\`").replace("${", "\\${")
}

fn int_guard(scalar: ScalarType, input: &str) -> Option<String> {
    let (min, max) = match scalar {
        ScalarType::Int8 => ("INT8_MIN", "INT8_MAX"),
        ScalarType::Uint8 => ("0", "UINT8_MAX"),
        ScalarType::Int16 => ("INT16_MIN", "INT16_MAX"),
        ScalarType::Uint16 => ("0", "UINT16_MAX"),
        ScalarType::Int32 => ("INT32_MIN", "INT32_MAX"),
        ScalarType::Uint32 => ("0", "UINT32_MAX"),
        _ => return None,
    };
    Some(format!(
        "typeof {input} === \"number\" && Number.isInteger({input}) && {input} >= {min} && {input} <= {max}"
    ))
}

/// `if (guard) { target = value; } else { target = fallback; }`
fn guarded(guard: &str, target: &str, value: &str, fallback: &str) -> String {
    format!("if ({guard}) {{\n    {target} = {value};\n}} else {{\n    {target} = {fallback};\n}}")
}

impl TypeScriptTarget {
    fn base_type(&self, shape: &Shape, cx: &RenderContext<'_>) -> String {
        match &shape.kind {
            ShapeKind::Scalar(ScalarType::Boolean) => "boolean".to_owned(),
            ShapeKind::Scalar(ScalarType::String) => "string".to_owned(),
            ShapeKind::Scalar(ScalarType::Timestamp) => "Date".to_owned(),
            ShapeKind::Scalar(ScalarType::Int64 | ScalarType::Uint64) => "bigint".to_owned(),
            ShapeKind::Scalar(_) => "number".to_owned(),
            ShapeKind::Enum { name }
            | ShapeKind::Object { name }
            | ShapeKind::Union { name }
            | ShapeKind::Ref { name, .. } => prefixed(cx, name),
            ShapeKind::Array(inner) => {
                let inner = self.type_name(inner, cx);
                if inner.contains(' ') {
                    format!("({inner})[]")
                } else {
                    format!("{inner}[]")
                }
            }
            ShapeKind::Record(inner) => format!("Record<string, {}>", self.type_name(inner, cx)),
            ShapeKind::Any => "any".to_owned(),
        }
    }

    fn base_default(&self, shape: &Shape, cx: &RenderContext<'_>) -> String {
        match &shape.kind {
            ShapeKind::Scalar(ScalarType::Boolean) => "false".to_owned(),
            ShapeKind::Scalar(ScalarType::String) => "\"\"".to_owned(),
            ShapeKind::Scalar(ScalarType::Timestamp) => "new Date()".to_owned(),
            ShapeKind::Scalar(ScalarType::Int64 | ScalarType::Uint64) => "BigInt(0)".to_owned(),
            ShapeKind::Scalar(_) => "0".to_owned(),
            ShapeKind::Enum { name }
            | ShapeKind::Object { name }
            | ShapeKind::Union { name }
            | ShapeKind::Ref { name, .. } => format!("{}.new()", validator(cx, name)),
            ShapeKind::Array(_) => "[]".to_owned(),
            ShapeKind::Record(_) => "{}".to_owned(),
            ShapeKind::Any => "undefined".to_owned(),
        }
    }

    /// Value used when the input is missing or has the wrong type.
    fn fallback(&self, shape: &Shape, cx: &RenderContext<'_>) -> String {
        if shape.nullable && shape.kind != ShapeKind::Any {
            "null".to_owned()
        } else if shape.optional {
            "undefined".to_owned()
        } else {
            self.base_default(shape, cx)
        }
    }

    /// Statements assigning the decoded `input` to the declared `target`.
    fn assign(&self, shape: &Shape, cx: &RenderContext<'_>, input: &str, target: &str, fallback: &str) -> String {
        match &shape.kind {
            ShapeKind::Scalar(ScalarType::String) => {
                guarded(&format!("typeof {input} === \"string\""), target, input, fallback)
            }
            ShapeKind::Scalar(ScalarType::Boolean) => {
                guarded(&format!("typeof {input} === \"boolean\""), target, input, fallback)
            }
            ShapeKind::Scalar(ScalarType::Timestamp) => format!(
                "if (typeof {input} === \"string\" || typeof {input} === \"number\") {{\n    {target} = new Date({input});\n}} else if ({input} instanceof Date) {{\n    {target} = {input};\n}} else {{\n    {target} = {fallback};\n}}"
            ),
            ShapeKind::Scalar(ScalarType::Float32 | ScalarType::Float64) => {
                guarded(&format!("typeof {input} === \"number\""), target, input, fallback)
            }
            ShapeKind::Scalar(ScalarType::Int64 | ScalarType::Uint64) => format!(
                "if (typeof {input} === \"string\" || typeof {input} === \"number\") {{\n    {target} = BigInt({input});\n}} else if (typeof {input} === \"bigint\") {{\n    {target} = {input};\n}} else {{\n    {target} = {fallback};\n}}"
            ),
            ShapeKind::Scalar(scalar) => {
                let guard = int_guard(*scalar, input).unwrap_or_else(|| format!("typeof {input} === \"number\""));
                guarded(&guard, target, input, fallback)
            }
            ShapeKind::Enum { name } => guarded(
                &format!("typeof {input} === \"string\""),
                target,
                &format!("{}.fromSerialValue({input})", validator(cx, name)),
                fallback,
            ),
            ShapeKind::Object { name } | ShapeKind::Union { name } => guarded(
                &format!("isObject({input})"),
                target,
                &format!("{}.fromJson({input})", validator(cx, name)),
                fallback,
            ),
            ShapeKind::Ref { name, .. } => guarded(
                &format!("{input} !== null && typeof {input} !== \"undefined\""),
                target,
                &format!("{}.fromJson({input})", validator(cx, name)),
                fallback,
            ),
            ShapeKind::Array(inner) => {
                let element = format!("{target}El");
                let value = format!("{element}Value");
                let body = self.assign(inner, cx, &element, &value, &self.fallback(inner, cx));
                format!(
                    "if (Array.isArray({input})) {{\n    {target} = [];\n    for (const {element} of {input}) {{\n        let {value}: {ty};\n{body}\n        {target}.push({value});\n    }}\n}} else {{\n    {target} = {fallback};\n}}",
                    ty = self.type_name(inner, cx),
                    body = indent_all(&body, 8),
                )
            }
            ShapeKind::Record(inner) => {
                let key = format!("{target}Key");
                let entry = format!("{target}Value");
                let value = format!("{entry}Result");
                let body = self.assign(inner, cx, &entry, &value, &self.fallback(inner, cx));
                format!(
                    "if (isObject({input})) {{\n    {target} = {{}};\n    for (const [{key}, {entry}] of Object.entries({input})) {{\n        let {value}: {ty};\n{body}\n        {target}[{key}] = {value};\n    }}\n}} else {{\n    {target} = {fallback};\n}}",
                    ty = self.type_name(inner, cx),
                    body = indent_all(&body, 8),
                )
            }
            ShapeKind::Any => format!("{target} = {input};"),
        }
    }

    fn encode_base(&self, shape: &Shape, cx: &RenderContext<'_>, input: &str, target: &str) -> String {
        let v = var_prefix(input);
        match &shape.kind {
            ShapeKind::Scalar(ScalarType::String) => format!("{target} += serializeString({input});"),
            ShapeKind::Scalar(ScalarType::Timestamp) => {
                format!("{target} += `\"${{{input}.toISOString()}}\"`;")
            }
            ShapeKind::Scalar(ScalarType::Int64 | ScalarType::Uint64) | ShapeKind::Enum { .. } => {
                format!("{target} += `\"${{{input}}}\"`;")
            }
            ShapeKind::Scalar(_) => format!("{target} += `${{{input}}}`;"),
            ShapeKind::Object { name } | ShapeKind::Union { name } | ShapeKind::Ref { name, .. } => {
                format!("{target} += {}.toJsonString({input});", validator(cx, name))
            }
            ShapeKind::Any => format!("{target} += JSON.stringify({input}) ?? \"null\";"),
            ShapeKind::Array(inner) => {
                let element = format!("{v}El");
                let body = self.encode_json(inner, cx, &element, target);
                format!(
                    "{target} += \"[\";\nfor (let {v}I = 0; {v}I < {input}.length; {v}I++) {{\n    if ({v}I !== 0) {{\n        {target} += \",\";\n    }}\n    const {element} = {input}[{v}I];\n{body}\n}}\n{target} += \"]\";",
                    body = indent_all(&body, 4),
                )
            }
            ShapeKind::Record(inner) => {
                let value = format!("{v}Value");
                let body = self.encode_json(inner, cx, &value, target);
                format!(
                    "{target} += \"{{\";\nlet {v}Count = 0;\nfor (const [{v}Key, {value}] of Object.entries({input})) {{\n    if ({v}Count !== 0) {{\n        {target} += \",\";\n    }}\n    {target} += `${{serializeString({v}Key)}}:`;\n{body}\n    {v}Count++;\n}}\n{target} += \"}}\";",
                    body = indent_all(&body, 4),
                )
            }
        }
    }

    fn clone_base(&self, shape: &Shape, cx: &RenderContext<'_>, input: &str) -> String {
        let v = var_prefix(input);
        match &shape.kind {
            ShapeKind::Scalar(ScalarType::Timestamp) => format!("new Date({input}.getTime())"),
            ShapeKind::Scalar(_) | ShapeKind::Enum { .. } => input.to_owned(),
            ShapeKind::Object { name } | ShapeKind::Union { name } | ShapeKind::Ref { name, .. } => {
                format!("{}.clone({input})", validator(cx, name))
            }
            ShapeKind::Any => format!("structuredClone({input})"),
            ShapeKind::Array(inner) => {
                let element = format!("{v}El");
                format!("{input}.map(({element}) => {})", self.clone_value(inner, cx, &element))
            }
            ShapeKind::Record(inner) => {
                let key = format!("{v}Key");
                let value = format!("{v}Value");
                format!(
                    "Object.fromEntries(Object.entries({input}).map(([{key}, {value}]) => [{key}, {}]))",
                    self.clone_value(inner, cx, &value)
                )
            }
        }
    }

    fn write_docs(&self, w: &mut CodeWriter<&mut String>, description: Option<&str>, deprecated: bool) -> fmt::Result {
        if description.is_none() && !deprecated {
            return Ok(());
        }
        w.writeln("/**")?;
        if let Some(description) = description {
            w.doc_comment(" *", description)?;
        }
        if deprecated {
            w.writeln(" * @deprecated")?;
        }
        w.writeln(" */")
    }
}

impl Target for TypeScriptTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::TypeScript
    }

    fn type_name(&self, shape: &Shape, cx: &RenderContext<'_>) -> String {
        let base = self.base_type(shape, cx);
        if shape.nullable && shape.kind != ShapeKind::Any {
            format!("{base} | null")
        } else {
            base
        }
    }

    fn default_value(&self, shape: &Shape, cx: &RenderContext<'_>) -> String {
        if shape.nullable && shape.kind != ShapeKind::Any {
            String::new()
        } else if shape.optional {
            "undefined".to_owned()
        } else {
            self.base_default(shape, cx)
        }
    }

    fn decode(&self, shape: &Shape, cx: &RenderContext<'_>, input: &str, target: &str) -> String {
        let ty = self.type_name(shape, cx);
        let fallback = self.fallback(shape, cx);
        let assign = self.assign(&shape.as_present(), cx, input, target, &fallback);
        if shape.optional {
            format!(
                "let {target}: {ty} | undefined;\nif (typeof {input} !== \"undefined\") {{\n{}\n}}",
                indent_all(&assign, 4)
            )
        } else {
            format!("let {target}: {ty};\n{assign}")
        }
    }

    fn encode_json(&self, shape: &Shape, cx: &RenderContext<'_>, input: &str, target: &str) -> String {
        if !shape.nullable || shape.kind == ShapeKind::Any {
            return self.encode_base(shape, cx, input, target);
        }
        format!(
            "if ({input} !== null) {{\n{}\n}} else {{\n    {target} += \"null\";\n}}",
            indent_all(&self.encode_base(shape, cx, input, target), 4)
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
        let value = match &shape.kind {
            ShapeKind::Scalar(ScalarType::Timestamp) => format!("{input}.toISOString()"),
            _ => input.to_owned(),
        };
        let push = format!("{target}.push(`{}=${{{value}}}`);", template_escape(key));
        if !shape.nullable {
            return push;
        }
        format!(
            "if ({input} !== null) {{\n    {push}\n}} else {{\n    {target}.push({});\n}}",
            js_string(&format!("{key}=null"))
        )
    }

    fn clone_value(&self, shape: &Shape, cx: &RenderContext<'_>, input: &str) -> String {
        let copy = self.clone_base(shape, cx, input);
        if shape.nullable && shape.kind != ShapeKind::Any && copy != input {
            format!("{input} === null ? null : {copy}")
        } else {
            copy
        }
    }

    fn render_preamble(&self, w: &mut CodeWriter<&mut String>, cx: &RenderContext<'_>) -> fmt::Result {
        w.writeln("// This file was autogenerated by rpcgen. Do not modify directly.")?;
        if !cx.schema_version.is_empty() {
            w.writeln(&format!("// Schema version: {}", cx.schema_version))?;
        }
        w.writeln("/* eslint-disable */")?;
        w.writeln("import {")?;
        {
            let _indent = w.indent();
            w.writeln("INT8_MAX,")?;
            w.writeln("INT8_MIN,")?;
            w.writeln("INT16_MAX,")?;
            w.writeln("INT16_MIN,")?;
            w.writeln("INT32_MAX,")?;
            w.writeln("INT32_MIN,")?;
            w.writeln("UINT8_MAX,")?;
            w.writeln("UINT16_MAX,")?;
            w.writeln("UINT32_MAX,")?;
            w.writeln("isObject,")?;
            w.writeln("type RpcModelValidator,")?;
            w.writeln("serializeString,")?;
            if cx.has_services {
                w.writeln("rpcRequest,")?;
            }
            if cx.features.sse {
                w.writeln("type EventSourceController,")?;
                w.writeln("rpcSseRequest,")?;
                w.writeln("type SseOptions,")?;
            }
        }
        w.writeln("} from \"@rpcgen/client\";")?;
        if cx.features.ws {
            w.writeln("// WebSocket procedures are not supported by this generator and were skipped.")?;
        }
        if cx.has_services {
            w.blank_line()?;
            w.writeln("type HeaderMap = Record<string, string | undefined>;")?;
            w.block("export interface ClientOptions", |w| {
                w.writeln("baseUrl?: string;")?;
                w.writeln("headers?: HeaderMap | (() => HeaderMap | Promise<HeaderMap>);")
            })?;
        }
        Ok(())
    }

    fn render_service(
        &self,
        w: &mut CodeWriter<&mut String>,
        service: &ServiceDecl,
        cx: &RenderContext<'_>,
    ) -> fmt::Result {
        w.block(&format!("export class {}", service.name), |w| {
            w.writeln("private readonly _baseUrl: string;")?;
            w.writeln("private readonly _headers: HeaderMap | (() => HeaderMap | Promise<HeaderMap>);")?;
            for sub in &service.sub_services {
                w.writeln(&format!("readonly {}: {};", js_property(&sub.key), sub.type_name))?;
            }
            w.blank_line()?;
            w.block("constructor(options: ClientOptions = {})", |w| {
                w.writeln("this._baseUrl = options.baseUrl ?? \"\";")?;
                w.writeln("this._headers = options.headers ?? {};")?;
                for sub in &service.sub_services {
                    w.writeln(&format!(
                        "{} = new {}(options);",
                        js_access("this", &sub.key),
                        sub.type_name
                    ))?;
                }
                Ok(())
            })?;
            for procedure in &service.procedures {
                w.blank_line()?;
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

impl TypeScriptTarget {
    fn render_object(&self, w: &mut CodeWriter<&mut String>, decl: &ObjectDecl, cx: &RenderContext<'_>) -> fmt::Result {
        let name = prefixed(cx, &decl.name);
        let model = validator(cx, &decl.name);
        let tag_entry = decl
            .tag
            .as_ref()
            .map(|tag| format!("{}: {},", js_property(&tag.key), js_string(&tag.value)));

        self.write_docs(w, decl.description.as_deref(), decl.is_deprecated)?;
        w.block(&format!("export interface {name}"), |w| {
            if let Some(tag) = &decl.tag {
                w.writeln(&format!("{}: {};", js_property(&tag.key), js_string(&tag.value)))?;
            }
            for field in &decl.fields {
                let plan = PropertyPlan::new(self, cx, &field.shape);
                let marker = if field.shape.optional { "?" } else { "" };
                self.write_docs(w, field.description.as_deref(), field.is_deprecated)?;
                w.writeln(&format!("{}{marker}: {};", js_property(&field.key), plan.type_name))?;
            }
            Ok(())
        })?;
        w.block_with_end(&format!("export const {model}: RpcModelValidator<{name}> ="), "};", |w| {
            w.block_with_end(&format!("new(): {name}"), "},", |w| {
                w.block_with_end("return", "};", |w| {
                    if let Some(entry) = &tag_entry {
                        w.writeln(entry)?;
                    }
                    for field in decl.fields.iter().filter(|f| !f.shape.optional) {
                        let plan = PropertyPlan::new(self, cx, &field.shape);
                        let value = if plan.default_value.is_empty() { "null".to_owned() } else { plan.default_value };
                        w.writeln(&format!("{}: {value},", js_property(&field.key)))?;
                    }
                    Ok(())
                })
            })?;
            w.block_with_end(&format!("fromJson(input: Record<string, any>): {name}"), "},", |w| {
                let locals = unique_idents(decl.fields.iter().map(|field| field.key.as_str()), local_name);
                for (field, local) in decl.fields.iter().zip(&locals) {
                    let plan = PropertyPlan::new(self, cx, &field.shape);
                    w.write_fragment(&plan.decode(&js_access("input", &field.key), local))?;
                }
                w.block_with_end("return", "};", |w| {
                    if let Some(entry) = &tag_entry {
                        w.writeln(entry)?;
                    }
                    for (field, local) in decl.fields.iter().zip(&locals) {
                        w.writeln(&format!("{}: {local},", js_property(&field.key)))?;
                    }
                    Ok(())
                })
            })?;
            w.block_with_end(&format!("fromJsonString(input: string): {name}"), "},", |w| {
                w.writeln(&format!("return {model}.fromJson(JSON.parse(input));"))
            })?;
            w.block_with_end(&format!("toJsonString(input: {name}): string"), "},", |w| {
                w.writeln(&format!("let {JSON_OUT} = \"{{\";"))?;
                self.write_json_fields(w, &decl.fields, decl.tag.as_ref(), cx)?;
                w.writeln(&format!("{JSON_OUT} += \"}}\";"))?;
                w.writeln(&format!("return {JSON_OUT};"))
            })?;
            w.block_with_end(&format!("toUrlQueryString(input: {name}): string"), "},", |w| {
                w.writeln(&format!("const {QUERY_OUT}: string[] = [];"))?;
                if let Some(tag) = &decl.tag {
                    w.writeln(&format!(
                        "{QUERY_OUT}.push({});",
                        js_string(&format!("{}={}", tag.key, tag.value))
                    ))?;
                }
                for field in &decl.fields {
                    let present = field.shape.as_present();
                    let plan = PropertyPlan::new(self, cx, &present);
                    let input = js_access("input", &field.key);
                    let step = plan.encode_query(&input, QUERY_OUT, &field.key);
                    if field.shape.optional && plan.can_be_query_string {
                        w.block(&format!("if (typeof {input} !== \"undefined\")"), |w| w.write_fragment(&step))?;
                    } else {
                        w.write_fragment(&step)?;
                    }
                }
                w.writeln(&format!("return {QUERY_OUT}.join(\"&\");"))
            })?;
            w.block_with_end(&format!("clone(input: {name}): {name}"), "},", |w| {
                w.block_with_end("return", "};", |w| {
                    if let Some(entry) = &tag_entry {
                        w.writeln(entry)?;
                    }
                    for field in &decl.fields {
                        let present = field.shape.as_present();
                        let plan = PropertyPlan::new(self, cx, &present);
                        let input = js_access("input", &field.key);
                        let copy = plan.clone_value(&input);
                        let copy = if field.shape.optional && copy != input {
                            format!("{input} === undefined ? undefined : {copy}")
                        } else {
                            copy
                        };
                        w.writeln(&format!("{}: {copy},", js_property(&field.key)))?;
                    }
                    Ok(())
                })
            })
        })
    }

    /// Separators come from static "first field" knowledge; a runtime counter
    /// is only needed when every leading field is optional.
    fn write_json_fields(
        &self,
        w: &mut CodeWriter<&mut String>,
        fields: &[Field],
        tag: Option<&Discriminant>,
        cx: &RenderContext<'_>,
    ) -> fmt::Result {
        let mut first = true;
        if needs_key_counter(fields, tag) {
            w.writeln("let _keyCount = 0;")?;
        }
        if let Some(tag) = tag {
            let text = format!("{}:{}", js_string(&tag.key), js_string(&tag.value));
            w.writeln(&format!("{JSON_OUT} += {};", js_string(&text)))?;
            first = false;
        }
        for field in fields {
            let input = js_access("input", &field.key);
            let present = field.shape.as_present();
            let plan = PropertyPlan::new(self, cx, &present);
            let key = js_string(&field.key);
            if !field.shape.optional {
                let prefix = if first { format!("{key}:") } else { format!(",{key}:") };
                w.writeln(&format!("{JSON_OUT} += {};", js_string(&prefix)))?;
                w.write_fragment(&plan.encode_json(&input, JSON_OUT))?;
                first = false;
                continue;
            }
            w.block(&format!("if (typeof {input} !== \"undefined\")"), |w| {
                if first {
                    w.block("if (_keyCount > 0)", |w| w.writeln(&format!("{JSON_OUT} += \",\";")))?;
                    w.writeln(&format!("{JSON_OUT} += {};", js_string(&format!("{key}:"))))?;
                } else {
                    w.writeln(&format!("{JSON_OUT} += {};", js_string(&format!(",{key}:"))))?;
                }
                w.write_fragment(&plan.encode_json(&input, JSON_OUT))?;
                if first {
                    w.writeln("_keyCount++;")?;
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    fn render_union(&self, w: &mut CodeWriter<&mut String>, decl: &UnionDecl, cx: &RenderContext<'_>) -> fmt::Result {
        let name = prefixed(cx, &decl.name);
        let model = validator(cx, &decl.name);
        let tag_access = js_access("input", &decl.discriminator);
        let members = decl
            .variants
            .iter()
            .map(|variant| prefixed(cx, &variant.name))
            .collect::<Vec<_>>();

        self.write_docs(w, decl.description.as_deref(), decl.is_deprecated)?;
        w.writeln(&format!("export type {name} = {};", members.join(" | ")))?;
        // dispatches `expr` on the tag to the matching member validator
        let dispatch = |w: &mut CodeWriter<&mut String>, call: &str| -> fmt::Result {
            w.block(&format!("switch ({tag_access})"), |w| {
                for variant in &decl.variants {
                    let tag = variant.tag.as_ref().map(|t| t.value.as_str()).unwrap_or_default();
                    w.writeln(&format!("case {}:", js_string(tag)))?;
                    let _indent = w.indent();
                    w.writeln(&format!(
                        "return {}.{call}(input as any);",
                        validator(cx, &variant.name)
                    ))?;
                }
                w.writeln("default:")?;
                let _indent = w.indent();
                w.writeln(&format!(
                    "throw new Error(`Unrecognized discriminator value for {}: ${{{tag_access}}}`);",
                    template_escape(&format!("{}.{}", name, decl.discriminator))
                ))
            })
        };
        w.block_with_end(&format!("export const {model}: RpcModelValidator<{name}> ="), "};", |w| {
            w.block_with_end(&format!("new(): {name}"), "},", |w| match decl.variants.first() {
                Some(first) => w.writeln(&format!("return {}.new();", validator(cx, &first.name))),
                None => w.writeln(&format!("throw new Error(\"{name} has no variants\");")),
            })?;
            w.block_with_end(&format!("fromJson(input: Record<string, any>): {name}"), "},", |w| {
                dispatch(w, "fromJson")
            })?;
            w.block_with_end(&format!("fromJsonString(input: string): {name}"), "},", |w| {
                w.writeln(&format!("return {model}.fromJson(JSON.parse(input));"))
            })?;
            w.block_with_end(&format!("toJsonString(input: {name}): string"), "},", |w| {
                dispatch(w, "toJsonString")
            })?;
            w.block_with_end(&format!("toUrlQueryString(input: {name}): string"), "},", |w| {
                dispatch(w, "toUrlQueryString")
            })?;
            w.block_with_end(&format!("clone(input: {name}): {name}"), "},", |w| {
                dispatch(w, "clone")
            })
        })?;
        for variant in &decl.variants {
            w.blank_line()?;
            self.render_object(w, variant, cx)?;
        }
        Ok(())
    }

    fn render_enum(&self, w: &mut CodeWriter<&mut String>, decl: &EnumDecl, cx: &RenderContext<'_>) -> fmt::Result {
        let name = prefixed(cx, &decl.name);
        let model = validator(cx, &decl.name);
        let values = decl.values.iter().map(|v| js_string(v)).collect::<Vec<_>>().join(", ");
        self.write_docs(w, decl.description.as_deref(), decl.is_deprecated)?;
        w.writeln(&format!("export const {model}Values = [{values}] as const;"))?;
        w.writeln(&format!("export type {name} = (typeof {model}Values)[number];"))?;
        w.block_with_end(
            &format!(
                "export const {model}: RpcModelValidator<{name}> & {{ values: typeof {model}Values; fromSerialValue(input: string): {name} }} ="
            ),
            "};",
            |w| {
                w.writeln(&format!("values: {model}Values,"))?;
                w.block_with_end(&format!("new(): {name}"), "},", |w| {
                    w.writeln(&format!("return {model}Values[0];"))
                })?;
                w.block_with_end(&format!("fromSerialValue(input: string): {name}"), "},", |w| {
                    w.block(&format!("if (({model}Values as readonly string[]).includes(input))"), |w| {
                        w.writeln(&format!("return input as {name};"))
                    })?;
                    w.writeln(&format!(
                        "throw new Error(`Invalid value for {}: ${{input}}`);",
                        template_escape(&name)
                    ))
                })?;
                w.block_with_end(&format!("fromJson(input: any): {name}"), "},", |w| {
                    w.writeln(&format!("return {model}.fromSerialValue(input);"))
                })?;
                w.block_with_end(&format!("fromJsonString(input: string): {name}"), "},", |w| {
                    w.writeln(&format!("return {model}.fromJson(JSON.parse(input));"))
                })?;
                w.block_with_end(&format!("toJsonString(input: {name}): string"), "},", |w| {
                    w.writeln("return `\"${input}\"`;")
                })?;
                w.block_with_end(&format!("toUrlQueryString(input: {name}): string"), "},", |w| {
                    w.writeln("return input;")
                })?;
                w.block_with_end(&format!("clone(input: {name}): {name}"), "},", |w| {
                    w.writeln("return input;")
                })
            },
        )
    }

    fn render_alias(&self, w: &mut CodeWriter<&mut String>, decl: &AliasDecl, cx: &RenderContext<'_>) -> fmt::Result {
        self.write_docs(w, decl.description.as_deref(), false)?;
        let plan = PropertyPlan::new(self, cx, &decl.shape);
        w.writeln(&format!("export type {} = {};", prefixed(cx, &decl.name), plan.type_name))
    }

    fn render_procedure(
        &self,
        w: &mut CodeWriter<&mut String>,
        procedure: &ProcedureDecl,
        cx: &RenderContext<'_>,
    ) -> fmt::Result {
        let method_name = camel(&procedure.key);
        let response = procedure
            .response
            .as_deref()
            .map(|name| prefixed(cx, name))
            .unwrap_or_else(|| "undefined".to_owned());
        let params = procedure
            .params
            .as_deref()
            .map(|name| prefixed(cx, name))
            .unwrap_or_else(|| "undefined".to_owned());
        let params_arg = procedure
            .params
            .as_deref()
            .map(|name| format!("params: {}", prefixed(cx, name)));
        let serializer = match &procedure.params {
            Some(name) if procedure.method.uses_query_string() => {
                format!("{}.toUrlQueryString", validator(cx, name))
            }
            Some(name) => format!("{}.toJsonString", validator(cx, name)),
            None => "() => \"\"".to_owned(),
        };
        let (from_json, from_string) = match &procedure.response {
            Some(name) => (
                format!("{}.fromJson", validator(cx, name)),
                format!("{}.fromJsonString", validator(cx, name)),
            ),
            None => ("() => undefined".to_owned(), "() => undefined".to_owned()),
        };
        let request = |w: &mut CodeWriter<&mut String>| -> fmt::Result {
            w.writeln(&format!("url: `${{this._baseUrl}}{}`,", template_escape(&procedure.http_path)))?;
            w.writeln(&format!("method: {},", js_string(procedure.method.as_str())))?;
            w.writeln("headers: this._headers,")?;
            w.writeln(&format!(
                "params: {},",
                if procedure.params.is_some() { "params" } else { "undefined" }
            ))?;
            w.writeln(&format!("responseFromJson: {from_json},"))?;
            w.writeln(&format!("responseFromString: {from_string},"))?;
            w.writeln(&format!("serializer: {serializer},"))?;
            w.writeln(&format!("clientVersion: {},", js_string(cx.client_version)))
        };

        self.write_docs(w, procedure.description.as_deref(), procedure.is_deprecated)?;
        if procedure.is_event_stream {
            let mut args = params_arg.into_iter().collect::<Vec<_>>();
            args.push(format!("options: SseOptions<{response}> = {{}}"));
            w.block(
                &format!("{method_name}({}): EventSourceController", args.join(", ")),
                |w| {
                    w.writeln(&format!("return rpcSseRequest<{response}, {params}>("))?;
                    {
                        let _indent = w.indent();
                        w.writeln("{")?;
                        {
                            let _indent = w.indent();
                            request(w)?;
                        }
                        w.writeln("},")?;
                        w.writeln("options,")?;
                    }
                    w.writeln(");")
                },
            )
        } else {
            w.block(
                &format!(
                    "async {method_name}({}): Promise<{}>",
                    params_arg.unwrap_or_default(),
                    if procedure.response.is_some() { response.as_str() } else { "void" }
                ),
                |w| {
                    w.writeln(&format!("return rpcRequest<{response}, {params}>({{"))?;
                    {
                        let _indent = w.indent();
                        request(w)?;
                    }
                    w.writeln("});")
                },
            )
        }
    }
}

/// Local variable holding a decoded field.
fn local_name(key: &str) -> String {
    format!("_{}", camel(&local_var(key)))
}
