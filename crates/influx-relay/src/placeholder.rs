// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Placeholder expansion for per-record templates.
//!
//! Templates are plain strings containing tokens of the form:
//!
//! ```text
//! ${identifier}          whole context entry
//! ${identifier[2]}       element of an array entry
//! ${identifier[-1]}      element counted from the end
//! __IDENTIFIER__         same lookup, identifier lowercased
//! __TAG_PARTS[0]__
//! ```
//!
//! Lookups go against a [`PlaceholderContext`] built once per record from
//! the record fields (nested maps flattened to dotted names), the input tag
//! and its decompositions, the host name and static metadata.
//!
//! Unknown tokens never fail: they log a warning and expand to nothing
//! (or to [`Value::Null`] when a typed value is requested).

use crate::precision::EventTime;
use crate::value::{Record, Value};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;

/// Default bound on nested-record flattening.
pub const DEFAULT_MAX_DEPTH: usize = 50;

/// A parsed `${name}` / `${name[i]}` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Context key.
    pub name: String,
    /// Optional array index; negative counts from the end.
    pub index: Option<i64>,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "${{{}[{}]}}", self.name, i),
            None => write!(f, "${{{}}}", self.name),
        }
    }
}

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Placeholder(Reference),
}

/// A template string split into literals and placeholder references.
///
/// Parse once at configuration time, render per record.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Tokenize `source`. Malformed tokens are kept as literal text.
    pub fn parse(source: &str) -> Self {
        Self {
            source: source.to_string(),
            segments: tokenize(source),
        }
    }

    /// Original template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parsed segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// True if the template contains no placeholders.
    pub fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// The single reference, when the template is exactly one token.
    pub fn sole_reference(&self) -> Option<&Reference> {
        match self.segments.as_slice() {
            [Segment::Placeholder(reference)] => Some(reference),
            _ => None,
        }
    }

    /// Render by textual substitution. Always a string.
    pub fn render(&self, ctx: &PlaceholderContext) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(reference) => {
                    if let Some(value) = ctx.resolve_or_warn(reference) {
                        out.push_str(&value.to_string());
                    }
                }
            }
        }
        out
    }

    /// Render to a [`Value`].
    ///
    /// With `preserve_types`, a template that is exactly one placeholder
    /// yields the referenced value unchanged (an integer stays an integer).
    /// Every other template yields a string.
    pub fn render_value(&self, ctx: &PlaceholderContext, preserve_types: bool) -> Value {
        if preserve_types {
            if let Some(reference) = self.sole_reference() {
                return ctx.resolve_or_warn(reference).cloned().unwrap_or(Value::Null);
            }
        }
        Value::String(self.render(ctx))
    }
}

/// Expand placeholders throughout a value, preserving its shape.
///
/// Strings are treated as templates; map keys are expanded textually;
/// arrays and maps recurse; other scalars pass through.
pub fn expand(value: &Value, ctx: &PlaceholderContext, preserve_types: bool) -> Value {
    match value {
        Value::String(s) => Template::parse(s).render_value(ctx, preserve_types),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| expand(item, ctx, preserve_types))
                .collect(),
        ),
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (Template::parse(k).render(ctx), expand(v, ctx, preserve_types)))
                .collect(),
        ),
        scalar => scalar.clone(),
    }
}

/// Static, engine-lifetime placeholder inputs.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    /// Value of `${hostname}` / `__HOSTNAME__`.
    pub hostname: String,
    /// Extra user-defined entries.
    pub extra: IndexMap<String, Value>,
}

impl Metadata {
    /// Metadata with the given host name and no extra entries.
    pub fn with_hostname(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            extra: IndexMap::new(),
        }
    }
}

/// Host name from the environment, or `"localhost"`.
pub fn local_hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .unwrap_or_else(|_| "localhost".to_string())
}

/// Per-record lookup table for placeholder resolution.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderContext {
    entries: HashMap<String, Value>,
}

impl PlaceholderContext {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the context for one record.
    ///
    /// Reserved names (`tag`, `tag_parts`, `tag_prefix`, `tag_suffix`,
    /// `hostname`, `time`) shadow record fields of the same name. Static
    /// metadata entries shadow nothing and are shadowed by everything else.
    pub fn for_record(
        tag: &str,
        time: EventTime,
        record: &Record,
        metadata: &Metadata,
        max_depth: usize,
    ) -> Self {
        let mut ctx = Self::new();
        for (key, value) in &metadata.extra {
            ctx.insert(key.clone(), value.clone());
        }
        for (key, value) in record {
            ctx.flatten(key.clone(), value, 0, max_depth);
        }

        let parts: Vec<&str> = tag.split('.').collect();
        let prefixes: Vec<Value> = (1..=parts.len())
            .map(|n| Value::from(parts[..n].join(".")))
            .collect();
        let suffixes: Vec<Value> = (0..parts.len())
            .map(|n| Value::from(parts[n..].join(".")))
            .collect();

        ctx.insert("tag", Value::from(tag));
        ctx.insert(
            "tag_parts",
            Value::Array(parts.iter().map(|p| Value::from(*p)).collect()),
        );
        ctx.insert("tag_prefix", Value::Array(prefixes));
        ctx.insert("tag_suffix", Value::Array(suffixes));
        ctx.insert("hostname", Value::from(metadata.hostname.as_str()));
        ctx.insert("time", Value::Integer(time.secs));
        ctx
    }

    /// Set an entry, replacing any previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    /// Raw entry lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the context has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a reference, indexing into arrays when requested.
    pub fn resolve(&self, reference: &Reference) -> Option<&Value> {
        let value = self.entries.get(&reference.name)?;
        match reference.index {
            None => Some(value),
            Some(index) => match value {
                Value::Array(items) => {
                    let len = items.len() as i64;
                    let pos = if index < 0 { len + index } else { index };
                    if (0..len).contains(&pos) {
                        items.get(pos as usize)
                    } else {
                        None
                    }
                }
                _ => None,
            },
        }
    }

    fn resolve_or_warn(&self, reference: &Reference) -> Option<&Value> {
        let resolved = self.resolve(reference);
        if resolved.is_none() {
            tracing::warn!(placeholder = %reference, "unresolved placeholder, substituting empty value");
        }
        resolved
    }

    fn flatten(&mut self, key: String, value: &Value, depth: usize, max_depth: usize) {
        if depth >= max_depth {
            tracing::debug!(key = %key, max_depth, "placeholder context depth limit reached");
            return;
        }
        match value {
            Value::Map(map) => {
                for (child, v) in map {
                    self.flatten(format!("{}.{}", key, child), v, depth + 1, max_depth);
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_scalar() {
                        self.flatten(format!("{}[{}]", key, i), item, depth + 1, max_depth);
                    }
                }
            }
            _ => {}
        }
        self.entries.insert(key, value.clone());
    }
}

fn tokenize(source: &str) -> Vec<Segment> {
    let bytes = source.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let token = if bytes[i..].starts_with(b"${") {
            scan_dollar(source, i)
        } else if bytes[i..].starts_with(b"__") {
            scan_snake(source, i)
        } else {
            None
        };

        match token {
            Some((reference, end)) => {
                if literal_start < i {
                    segments.push(Segment::Literal(source[literal_start..i].to_string()));
                }
                segments.push(Segment::Placeholder(reference));
                i = end;
                literal_start = end;
            }
            None => i += 1,
        }
    }

    if literal_start < bytes.len() {
        segments.push(Segment::Literal(source[literal_start..].to_string()));
    }
    segments
}

/// `${...}` starting at `start`. Returns the reference and the end offset.
fn scan_dollar(source: &str, start: usize) -> Option<(Reference, usize)> {
    let body_start = start + 2;
    let close = source[body_start..].find('}')? + body_start;
    let reference = parse_reference(&source[body_start..close], is_ident_char)?;
    Some((reference, close + 1))
}

/// `__NAME__` / `__NAME[i]__` starting at `start`.
fn scan_snake(source: &str, start: usize) -> Option<(Reference, usize)> {
    let bytes = source.as_bytes();
    let name_start = start + 2;
    let mut j = name_start;
    while j < bytes.len() && is_snake_char(bytes[j]) {
        j += 1;
    }

    let (name, index, end) = if j < bytes.len() && bytes[j] == b'[' {
        let close = source[j..].find(']')? + j;
        let index = source[j + 1..close].trim().parse::<i64>().ok()?;
        if !source[close + 1..].starts_with("__") {
            return None;
        }
        (&source[name_start..j], Some(index), close + 3)
    } else {
        let run = &source[name_start..j];
        let name = run.strip_suffix("__")?;
        (name, None, j)
    };

    if !name.as_bytes().first().is_some_and(u8::is_ascii_uppercase) || name.ends_with('_') {
        return None;
    }
    Some((
        Reference {
            name: name.to_ascii_lowercase(),
            index,
        },
        end,
    ))
}

fn parse_reference(body: &str, valid: fn(u8) -> bool) -> Option<Reference> {
    let body = body.trim();
    let (name, index) = match body.strip_suffix(']') {
        Some(head) => {
            let open = head.rfind('[')?;
            let index = head[open + 1..].trim().parse::<i64>().ok()?;
            (&head[..open], Some(index))
        }
        None => (body, None),
    };
    if name.is_empty() || !name.bytes().all(valid) {
        return None;
    }
    Some(Reference {
        name: name.to_string(),
        index,
    })
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-' | b'[' | b']' | b'@')
}

fn is_snake_char(b: u8) -> bool {
    b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with(entries: &[(&str, Value)]) -> PlaceholderContext {
        let mut ctx = PlaceholderContext::new();
        for (k, v) in entries {
            ctx.insert(*k, v.clone());
        }
        ctx
    }

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_tokenize_mixed() {
        let t = Template::parse("db-${tag_parts[1]}-__HOSTNAME__!");
        assert_eq!(
            t.segments(),
            &[
                Segment::Literal("db-".into()),
                Segment::Placeholder(Reference {
                    name: "tag_parts".into(),
                    index: Some(1)
                }),
                Segment::Literal("-".into()),
                Segment::Placeholder(Reference {
                    name: "hostname".into(),
                    index: None
                }),
                Segment::Literal("!".into()),
            ]
        );
    }

    #[test]
    fn test_tokenize_malformed_is_literal() {
        assert!(Template::parse("${unterminated").is_static());
        assert!(Template::parse("${}").is_static());
        assert!(Template::parse("${a b}").is_static());
        assert!(Template::parse("__init__").is_static());
        assert!(Template::parse("a__b").is_static());
        assert!(Template::parse("plain").is_static());
        assert_eq!(Template::parse("${unterminated").render(&PlaceholderContext::new()), "${unterminated");
    }

    #[test]
    fn test_snake_with_index() {
        let t = Template::parse("__TAG_PARTS[-1]__");
        assert_eq!(
            t.sole_reference(),
            Some(&Reference {
                name: "tag_parts".into(),
                index: Some(-1)
            })
        );
    }

    #[test]
    fn test_expand_exact_token() {
        let ctx = ctx_with(&[("a", Value::from("x"))]);
        assert_eq!(expand(&Value::from("${a}"), &ctx, true), Value::from("x"));
        assert_eq!(expand(&Value::from("${a}"), &ctx, false), Value::from("x"));
    }

    #[test]
    fn test_expand_preserves_type_only_for_sole_token() {
        let ctx = ctx_with(&[("port", Value::Integer(8086))]);
        assert_eq!(
            expand(&Value::from("${port}"), &ctx, true),
            Value::Integer(8086)
        );
        assert_eq!(
            expand(&Value::from("${port}"), &ctx, false),
            Value::from("8086")
        );
        assert_eq!(
            expand(&Value::from("prefix-${port}-suffix"), &ctx, true),
            Value::from("prefix-8086-suffix")
        );
    }

    #[test]
    fn test_expand_unknown_token_does_not_fail() {
        let ctx = ctx_with(&[("a", Value::from("x"))]);
        assert_eq!(expand(&Value::from("v-${z}"), &ctx, true), Value::from("v-"));
        assert_eq!(expand(&Value::from("${z}"), &ctx, true), Value::Null);
        assert_eq!(expand(&Value::from("${z}"), &ctx, false), Value::from(""));
    }

    #[test]
    fn test_expand_nested_shapes() {
        let ctx = ctx_with(&[("a", Value::from("x")), ("n", Value::Integer(2))]);
        let mut map = IndexMap::new();
        map.insert("key_${a}".to_string(), Value::from("${n}"));
        map.insert("list".to_string(), Value::Array(vec![Value::from("${a}"), Value::Integer(7)]));
        let expanded = expand(&Value::Map(map), &ctx, true);

        let mut expected = IndexMap::new();
        expected.insert("key_x".to_string(), Value::Integer(2));
        expected.insert(
            "list".to_string(),
            Value::Array(vec![Value::from("x"), Value::Integer(7)]),
        );
        assert_eq!(expanded, Value::Map(expected));
    }

    #[test]
    fn test_context_tag_decomposition() {
        let ctx = PlaceholderContext::for_record(
            "app.web.access",
            EventTime::from_secs(100),
            &Record::new(),
            &Metadata::with_hostname("node-1"),
            DEFAULT_MAX_DEPTH,
        );
        assert_eq!(Template::parse("${tag}").render(&ctx), "app.web.access");
        assert_eq!(Template::parse("${tag_parts[0]}").render(&ctx), "app");
        assert_eq!(Template::parse("${tag_parts[-1]}").render(&ctx), "access");
        assert_eq!(Template::parse("${tag_prefix[1]}").render(&ctx), "app.web");
        assert_eq!(Template::parse("${tag_suffix[1]}").render(&ctx), "web.access");
        assert_eq!(Template::parse("__HOSTNAME__").render(&ctx), "node-1");
        assert_eq!(Template::parse("${time}").render(&ctx), "100");
        assert_eq!(Template::parse("${tag_parts[3]}").render(&ctx), "");
        assert_eq!(Template::parse("${tag_parts[-4]}").render(&ctx), "");
    }

    #[test]
    fn test_context_flattens_nested_record() {
        let mut inner = IndexMap::new();
        inner.insert("region".to_string(), Value::from("eu"));
        let rec = record(&[
            ("meta", Value::Map(inner)),
            ("hosts", Value::Array(vec![Value::from("h1"), Value::from("h2")])),
        ]);
        let ctx = PlaceholderContext::for_record(
            "t",
            EventTime::default(),
            &rec,
            &Metadata::default(),
            DEFAULT_MAX_DEPTH,
        );
        assert_eq!(Template::parse("${meta.region}").render(&ctx), "eu");
        assert_eq!(Template::parse("${hosts[-1]}").render(&ctx), "h2");
    }

    #[test]
    fn test_context_depth_is_bounded() {
        let mut value = Value::from("leaf");
        for _ in 0..200 {
            let mut map = IndexMap::new();
            map.insert("n".to_string(), value);
            value = Value::Map(map);
        }
        let rec = record(&[("deep", value)]);
        let ctx = PlaceholderContext::for_record(
            "t",
            EventTime::default(),
            &rec,
            &Metadata::default(),
            3,
        );
        assert!(ctx.get("deep").is_some());
        assert!(ctx.get("deep.n.n").is_some());
        assert!(ctx.get("deep.n.n.n").is_none());
    }

    #[test]
    fn test_context_reserved_names_shadow_fields() {
        let rec = record(&[("tag", Value::from("field-tag")), ("x", Value::Integer(1))]);
        let mut meta = Metadata::with_hostname("h");
        meta.extra.insert("x".to_string(), Value::Integer(99));
        meta.extra.insert("env".to_string(), Value::from("prod"));
        let ctx = PlaceholderContext::for_record("real.tag", EventTime::default(), &rec, &meta, 50);
        assert_eq!(ctx.get("tag"), Some(&Value::from("real.tag")));
        assert_eq!(ctx.get("x"), Some(&Value::Integer(1)));
        assert_eq!(ctx.get("env"), Some(&Value::from("prod")));
    }
}
