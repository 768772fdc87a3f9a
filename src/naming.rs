//! Identifier derivation shared by the lowering pass and the targets.
use std::collections::HashSet;

use heck::{ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};
use once_cell::sync::Lazy;
use regex::Regex;

static JS_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier pattern"));

const RUST_KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "do",
    "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl", "in",
    "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "static", "struct", "trait", "true", "try", "type", "typeof", "unsafe", "unsized",
    "use", "virtual", "where", "while", "yield",
];

/// Keywords that cannot be written as raw identifiers.
const RUST_RESERVED: &[&str] = &["crate", "self", "Self", "super"];

pub fn pascal(input: &str) -> String {
    let out = input.to_upper_camel_case();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        format!("T{out}")
    } else {
        out
    }
}

pub fn camel(input: &str) -> String {
    input.to_lower_camel_case()
}

/// Type name for an unnamed node, derived from where it sits in the data.
///
/// `/User/settings` becomes `UserSettings`. All-digit segments are the array
/// element placeholder and read as `Element`.
pub fn type_name_from_path(instance_path: &str) -> String {
    instance_path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            if segment.bytes().all(|b| b.is_ascii_digit()) {
                "Element".to_owned()
            } else {
                segment.to_upper_camel_case()
            }
        })
        .collect::<String>()
}

pub fn rust_ident(input: &str) -> String {
    let snake = input.to_snake_case();
    let snake = if snake.is_empty() { "field".to_owned() } else { snake };
    if RUST_RESERVED.contains(&snake.as_str()) {
        format!("{snake}_")
    } else if RUST_KEYWORDS.contains(&snake.as_str()) {
        format!("r#{snake}")
    } else if snake.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{snake}")
    } else {
        snake
    }
}

/// Identifiers for sibling keys. Keys that collapse onto the same identifier
/// (`userId` and `user_id`) get `_2`, `_3`, ... in declaration order.
pub fn unique_idents<'k>(
    keys: impl IntoIterator<Item = &'k str>,
    ident: impl Fn(&str) -> String,
) -> Vec<String> {
    let mut seen = HashSet::new();
    keys.into_iter()
        .map(|key| {
            let base = ident(key);
            let mut candidate = base.clone();
            let mut n = 2;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{base}_{n}");
                n += 1;
            }
            candidate
        })
        .collect()
}

/// Strip everything that cannot appear in a local variable name.
pub fn local_var(input: &str) -> String {
    let trimmed = input
        .trim_start_matches('&')
        .trim_start_matches("self.")
        .trim_start_matches("input.")
        .replace("r#", "");
    let mut out = trimmed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

pub fn is_js_identifier(input: &str) -> bool {
    JS_IDENTIFIER.is_match(input)
}

/// `object.key` when `key` is a valid identifier, `object["key"]` otherwise.
pub fn js_access(object: &str, key: &str) -> String {
    if is_js_identifier(key) {
        format!("{object}.{key}")
    } else {
        format!("{object}[{}]", js_string(key))
    }
}

/// Property name position in an object literal or interface.
pub fn js_property(key: &str) -> String {
    if is_js_identifier(key) {
        key.to_owned()
    } else {
        js_string(key)
    }
}

/// A double-quoted JavaScript string literal.
pub fn js_string(text: &str) -> String {
    serde_json::Value::String(text.to_owned()).to_string()
}

/// A double-quoted Rust string literal.
pub fn rust_string(text: &str) -> String {
    format!("{text:?}")
}
