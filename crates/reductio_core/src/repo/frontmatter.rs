//! Node file codec: YAML metadata block plus proposition body.
//!
//! # Responsibility
//! - Split `---` delimited metadata from the body.
//! - Normalize loosely-typed metadata into one canonical [`Node`] shape
//!   before any validation runs.
//! - Render nodes back into the same layout.
//!
//! # Invariants
//! - `\r\n` and `\n` inputs parse identically.
//! - `reduces_to` and `tags` accept a bare string or a list; bracket-wrapped
//!   references (`[[slug]]`, `[[slug|alias]]`) are reduced to the bare slug.
//! - Unknown `level` or `status` values are rejected, never guessed.
//! - Stored status for bedrock nodes is kept on disk but ignored on read.

use crate::model::node::{slug_timestamp, Level, MergeStamp, MergedFrom, Node, Slug, Status};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

/// Splits a document into raw YAML and trimmed body.
///
/// Returns `None` when the opening or closing delimiter is missing.
pub fn split_front_matter(input: &str) -> Option<(String, String)> {
    let normalized = input.replace("\r\n", "\n");
    let normalized = normalized.trim_start_matches('\u{feff}');
    let mut lines = normalized.split('\n');

    if lines.next()?.trim_end() != "---" {
        return None;
    }

    let mut yaml_lines: Vec<&str> = Vec::new();
    let mut closed = false;
    for line in lines.by_ref() {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            closed = true;
            break;
        }
        yaml_lines.push(line);
    }
    if !closed {
        return None;
    }

    let body = lines.collect::<Vec<_>>().join("\n");
    Some((yaml_lines.join("\n"), body.trim().to_string()))
}

/// Parses one node file. `rel_path` is vault-relative; its stem is the slug.
///
/// # Errors
/// Returns a message describing the first offending field.
pub fn parse_document(input: &str, rel_path: &Path) -> Result<Node, String> {
    let slug = rel_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| "file name is not valid UTF-8".to_string())?;

    let (yaml, body) =
        split_front_matter(input).ok_or_else(|| "missing `---` metadata delimiters".to_string())?;
    let fields = parse_yaml_map(&yaml)?;

    let level_text = string_field(&fields, "level")?.ok_or("missing `level`")?;
    let level = Level::parse(&level_text).ok_or_else(|| format!("unknown level `{level_text}`"))?;

    let status = match string_field(&fields, "status")? {
        Some(value) => Status::parse(&value).ok_or_else(|| format!("unknown status `{value}`"))?,
        None => Status::Tentative,
    };

    let created = match string_field(&fields, "created")? {
        Some(value) => parse_timestamp(&value)
            .ok_or_else(|| format!("unparsable `created` value `{value}`"))?,
        None => slug_timestamp(&slug)
            .ok_or("missing `created` and slug carries no timestamp prefix")?,
    };

    let title = string_field(&fields, "title")?
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| slug.clone());

    let mut node = Node::with_slug(slug, title.trim(), level, body, created);
    node.path = rel_path.to_path_buf();
    node.set_status(status);
    node.reduces_to = normalize_references(list_field(&fields, "reduces_to")?);
    node.tags = normalize_tags(list_field(&fields, "tags")?);
    node.deduplication_group =
        string_field(&fields, "deduplication_group")?.filter(|value| !value.trim().is_empty());

    if let Some(value) = fields.get("merged_from").filter(|value| !value.is_null()) {
        node.merged_from = serde_json::from_value::<Vec<MergedFrom>>(value.clone())
            .map_err(|err| format!("invalid `merged_from`: {err}"))?;
    }
    node.merged_reason = string_field(&fields, "merged_reason")?;
    node.merged_date = match string_field(&fields, "merged_date")? {
        Some(value) => Some(
            parse_timestamp(&value)
                .ok_or_else(|| format!("unparsable `merged_date` value `{value}`"))?,
        ),
        None => None,
    };
    node.merge_stamp = parse_merge_stamp(&fields)?;

    Ok(node)
}

#[derive(Serialize)]
struct FrontMatter<'a> {
    title: &'a str,
    level: Level,
    reduces_to: &'a [Slug],
    status: Status,
    tags: &'a [String],
    created: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    deduplication_group: Option<&'a str>,
    #[serde(skip_serializing_if = "is_empty_slice")]
    merged_from: &'a [MergedFrom],
    #[serde(skip_serializing_if = "Option::is_none")]
    merged_reason: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    merged_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    merged_into: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_status: Option<Status>,
}

fn is_empty_slice<T>(value: &&[T]) -> bool {
    value.is_empty()
}

/// Renders a node into its persisted form.
pub fn render_document(node: &Node) -> Result<String, String> {
    let front = FrontMatter {
        title: node.title.as_str(),
        level: node.level,
        reduces_to: &node.reduces_to,
        status: node.status(),
        tags: &node.tags,
        created: format_timestamp(node.created),
        deduplication_group: node.deduplication_group.as_deref(),
        merged_from: &node.merged_from,
        merged_reason: node.merged_reason.as_deref(),
        merged_date: node.merged_date.map(format_timestamp),
        merged_into: node.merge_stamp.as_ref().map(|stamp| stamp.merged_into.as_str()),
        original_path: node
            .merge_stamp
            .as_ref()
            .map(|stamp| stamp.original_path.as_str()),
        original_status: node.merge_stamp.as_ref().map(|stamp| stamp.original_status),
    };
    let yaml = serde_yaml::to_string(&front).map_err(|err| err.to_string())?;
    let body = node.proposition.trim();
    Ok(format!("---\n{yaml}---\n\n{body}\n"))
}

/// Reduces a raw reference to a bare slug.
///
/// Accepts `slug`, `[[slug]]`, `[[slug|alias]]`, `[[dir/slug.md]]`.
pub fn normalize_reference(raw: &str) -> Option<Slug> {
    let mut value = raw.trim();
    if let Some(inner) = value.strip_prefix("[[").and_then(|rest| rest.strip_suffix("]]")) {
        value = inner;
    }
    if let Some((target, _alias)) = value.split_once('|') {
        value = target;
    }
    let value = value.rsplit('/').next().unwrap_or(value);
    let value = value.strip_suffix(".md").unwrap_or(value).trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses RFC 3339, a bare `YYYY-MM-DDTHH:MM:SS` / `YYYY-MM-DD HH:MM:SS`
/// (taken as UTC) or a bare date (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_yaml_map(yaml: &str) -> Result<Map<String, Value>, String> {
    if yaml.trim().is_empty() {
        return Err("empty metadata block".to_string());
    }
    let yaml_value: serde_yaml::Value =
        serde_yaml::from_str(yaml).map_err(|err| format!("invalid YAML: {err}"))?;
    match serde_json::to_value(yaml_value).map_err(|err| format!("invalid YAML: {err}"))? {
        Value::Object(map) => Ok(map),
        _ => Err("metadata block is not a mapping".to_string()),
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Result<Option<String>, String> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(Value::Number(value)) => Ok(Some(value.to_string())),
        Some(Value::Bool(value)) => Ok(Some(value.to_string())),
        Some(_) => Err(format!("`{key}` must be a string")),
    }
}

fn list_field(fields: &Map<String, Value>, key: &str) -> Result<Vec<String>, String> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(value)) => Ok(vec![value.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(|item| match item {
                Value::String(value) => Ok(value.clone()),
                Value::Number(value) => Ok(value.to_string()),
                // YAML reads an unquoted `[[slug]]` as a nested list.
                Value::Array(inner) => match inner.as_slice() {
                    [Value::String(value)] => Ok(value.clone()),
                    [Value::Array(deeper)] => match deeper.as_slice() {
                        [Value::String(value)] => Ok(value.clone()),
                        _ => Err(format!("`{key}` entries must be strings")),
                    },
                    _ => Err(format!("`{key}` entries must be strings")),
                },
                _ => Err(format!("`{key}` entries must be strings")),
            })
            .collect(),
        Some(_) => Err(format!("`{key}` must be a string or a list")),
    }
}

fn normalize_references(raw: Vec<String>) -> Vec<Slug> {
    let mut slugs: Vec<Slug> = Vec::with_capacity(raw.len());
    for value in raw {
        if let Some(slug) = normalize_reference(&value) {
            if !slugs.contains(&slug) {
                slugs.push(slug);
            }
        }
    }
    slugs
}

fn normalize_tags(raw: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for value in raw {
        let tag = value.trim().trim_start_matches('#').trim();
        if !tag.is_empty() && !tags.iter().any(|existing| existing == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

fn parse_merge_stamp(fields: &Map<String, Value>) -> Result<Option<MergeStamp>, String> {
    let Some(merged_into) = string_field(fields, "merged_into")? else {
        return Ok(None);
    };
    let original_path = string_field(fields, "original_path")?
        .ok_or("`merged_into` requires `original_path`")?;
    let status_text = string_field(fields, "original_status")?
        .ok_or("`merged_into` requires `original_status`")?;
    let original_status = Status::parse(&status_text)
        .ok_or_else(|| format!("unknown original_status `{status_text}`"))?;
    Ok(Some(MergeStamp {
        merged_into,
        original_path,
        original_status,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn rel(path: &str) -> PathBuf {
        PathBuf::from(path)
    }

    #[test]
    fn crlf_documents_parse_like_lf_documents() {
        let lf = "---\ntitle: Fire burns\nlevel: rule\nreduces_to:\n  - p1\nstatus: tentative\ntags: [physics]\ncreated: 2026-01-02T03:04:05Z\n---\n\nFire burns wood.\n";
        let crlf = lf.replace('\n', "\r\n");
        let a = parse_document(lf, &rel("rules/20260102030405-fire-burns.md")).unwrap();
        let b = parse_document(&crlf, &rel("rules/20260102030405-fire-burns.md")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.slug, "20260102030405-fire-burns");
        assert_eq!(a.proposition, "Fire burns wood.");
        assert_eq!(a.reduces_to, vec!["p1".to_string()]);
        assert_eq!(a.tags, vec!["physics".to_string()]);
    }

    #[test]
    fn bare_strings_and_bracket_references_are_normalized() {
        let input = "---\ntitle: D\nlevel: deduction\nreduces_to: \"[[r1|the rule]]\"\ntags: ethics\ncreated: 2026-01-02\n---\nbody";
        let node = parse_document(input, &rel("deductions/d.md")).unwrap();
        assert_eq!(node.reduces_to, vec!["r1".to_string()]);
        assert_eq!(node.tags, vec!["ethics".to_string()]);
        assert_eq!(
            node.created,
            Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn unquoted_wikilinks_in_lists_are_accepted() {
        let input = "---\ntitle: D\nlevel: deduction\nreduces_to:\n  - [[r1]]\n  - rules/r2.md\ncreated: 2026-01-02\n---\n";
        let node = parse_document(input, &rel("deductions/d.md")).unwrap();
        assert_eq!(node.reduces_to, vec!["r1".to_string(), "r2".to_string()]);
    }

    #[test]
    fn unknown_level_or_status_is_malformed() {
        let bad_level = "---\ntitle: x\nlevel: theorem\ncreated: 2026-01-02\n---\n";
        assert!(parse_document(bad_level, &rel("x.md"))
            .unwrap_err()
            .contains("theorem"));

        let bad_status = "---\ntitle: x\nlevel: rule\nstatus: maybe\ncreated: 2026-01-02\n---\n";
        assert!(parse_document(bad_status, &rel("x.md"))
            .unwrap_err()
            .contains("maybe"));
    }

    #[test]
    fn missing_delimiters_are_malformed() {
        let err = parse_document("title: x\nlevel: rule\n", &rel("x.md")).unwrap_err();
        assert!(err.contains("delimiters"));
        let unclosed = parse_document("---\ntitle: x\nlevel: rule\n", &rel("x.md")).unwrap_err();
        assert!(unclosed.contains("delimiters"));
    }

    #[test]
    fn bedrock_status_is_ignored_on_read() {
        let input = "---\ntitle: P\nlevel: percept\nstatus: tentative\ncreated: 2026-01-02\n---\n";
        let node = parse_document(input, &rel("percepts/p.md")).unwrap();
        assert_eq!(node.status(), Status::Validated);
    }

    #[test]
    fn created_falls_back_to_slug_prefix() {
        let input = "---\ntitle: R\nlevel: rule\nreduces_to: [p]\n---\n";
        let node = parse_document(input, &rel("rules/20260304050607-r.md")).unwrap();
        assert_eq!(
            node.created,
            Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap()
        );
        assert!(parse_document(input, &rel("rules/r.md")).is_err());
    }

    #[test]
    fn render_then_parse_keeps_merge_metadata() {
        let created = Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap();
        let mut node = Node::new("Canonical", Level::Rule, "Merged claim.", created);
        node.reduces_to = vec!["p".to_string()];
        node.tags = vec!["physics".to_string()];
        node.merged_from = vec![MergedFrom {
            id: "old".to_string(),
            original_path: "rules/old.md".to_string(),
            original_status: Status::Validated,
            trashed_path: ".merged/old.md".to_string(),
        }];
        node.merged_reason = Some("duplicate wording".to_string());
        node.merged_date = Some(created);

        let text = render_document(&node).unwrap();
        assert!(text.starts_with("---\n"));
        let parsed = parse_document(&text, &node.path).unwrap();
        assert_eq!(parsed, node);
    }

    #[test]
    fn render_then_parse_keeps_member_stamp() {
        let created = Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap();
        let mut node = Node::new("Member", Level::Rule, "", created);
        node.reduces_to = vec!["p".to_string()];
        node.merge_stamp = Some(MergeStamp {
            merged_into: "canon".to_string(),
            original_path: "rules/member.md".to_string(),
            original_status: Status::Tentative,
        });
        let text = render_document(&node).unwrap();
        assert!(text.contains("merged_into: canon"));
        let parsed = parse_document(&text, &node.path).unwrap();
        assert_eq!(parsed.merge_stamp, node.merge_stamp);
    }

    #[test]
    fn normalize_reference_strips_wrappers() {
        assert_eq!(normalize_reference(" [[abc]] ").as_deref(), Some("abc"));
        assert_eq!(normalize_reference("[[abc|Alias]]").as_deref(), Some("abc"));
        assert_eq!(normalize_reference("rules/abc.md").as_deref(), Some("abc"));
        assert_eq!(normalize_reference("[[]]"), None);
    }
}
