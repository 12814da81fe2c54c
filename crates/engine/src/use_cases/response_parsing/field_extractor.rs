//! Field-by-field recovery for responses no JSON decoder will accept.
//!
//! Each known key is located with a bounded regex, then its value is read with
//! a bounded scanner. Whatever fields are found are assembled into a
//! best-effort response.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::{Map, Value};

use fablecheck_domain::{
    StructuredResponse, DEBUG_INFO_FIELD, ENTITIES_MENTIONED_FIELD, LOCATION_CONFIRMED_FIELD,
    NARRATIVE_FIELD, PLANNING_BLOCK_FIELD, STATE_UPDATES_FIELD,
};

use super::json_scan::{depths_at, find_matching_close};
use super::{ParseAttemptError, ParserLimits};

// Whitespace runs are bounded so no key match can scan unboundedly.
static FIELD_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#""(narrative|debug_info|state_updates|entities_mentioned|location_confirmed|planning_block)"\s{0,64}:\s{0,64}"#,
    )
    .expect("valid regex")
});

/// Whether the text contains at least one `"known_field":` key.
pub fn contains_known_key(text: &str) -> bool {
    FIELD_KEY_RE.is_match(text)
}

/// Byte offset just past `"field":` for the first occurrence of each known key.
///
/// Only keys at the shallowest bracket depth any known key reaches are used,
/// so a `"narrative":` nested inside `debug_info` never stands in for the
/// response's own.
fn locate_fields(text: &str) -> Vec<(&str, usize)> {
    let keys: Vec<(&str, usize, usize)> = FIELD_KEY_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((caps.get(1)?.as_str(), whole.start(), whole.end()))
        })
        .collect();
    let starts: Vec<usize> = keys.iter().map(|&(_, start, _)| start).collect();
    let depths = depths_at(text, &starts);
    let Some(&top) = depths.iter().min() else {
        return Vec::new();
    };

    let mut found: Vec<(&str, usize)> = Vec::new();
    for ((name, _, value_start), depth) in keys.into_iter().zip(depths) {
        if depth != top || found.iter().any(|(seen, _)| *seen == name) {
            continue;
        }
        found.push((name, value_start));
    }
    found
}

/// Rebuild a response from individually located fields.
pub fn extract_fields(
    text: &str,
    limits: &ParserLimits,
) -> Result<StructuredResponse, ParseAttemptError> {
    let mut response = StructuredResponse::default();
    let mut narrative: Option<String> = None;

    for (field, value_start) in locate_fields(text) {
        match field {
            NARRATIVE_FIELD | LOCATION_CONFIRMED_FIELD | PLANNING_BLOCK_FIELD => {
                let Some(literal) =
                    read_string_literal(text, value_start, limits.max_field_scan_bytes)
                else {
                    response
                        .warnings
                        .push(format!("field '{}' is not a string; ignored", field));
                    continue;
                };
                if !literal.terminated {
                    response
                        .warnings
                        .push(format!("field '{}' was unterminated; kept partial text", field));
                }
                let value = unescape_json_string(literal.raw);
                match field {
                    NARRATIVE_FIELD => narrative = Some(value),
                    LOCATION_CONFIRMED_FIELD => response.location_confirmed = Some(value),
                    _ => response.planning_block = Some(value),
                }
            }
            DEBUG_INFO_FIELD | STATE_UPDATES_FIELD => {
                match read_container::<Map<String, Value>>(text, value_start, limits) {
                    Some(map) if field == DEBUG_INFO_FIELD => response.debug_info = Some(map),
                    Some(map) => response.state_updates = Some(map),
                    None => response
                        .warnings
                        .push(format!("field '{}' could not be recovered; ignored", field)),
                }
            }
            ENTITIES_MENTIONED_FIELD => {
                match read_container::<Vec<Value>>(text, value_start, limits) {
                    Some(items) => {
                        response.entities_mentioned = items
                            .into_iter()
                            .filter_map(|item| match item {
                                Value::String(name) => Some(name),
                                _ => None,
                            })
                            .collect();
                    }
                    None => response.warnings.push(format!(
                        "field '{}' could not be recovered; ignored",
                        field
                    )),
                }
            }
            _ => {}
        }
    }

    response.narrative = narrative.ok_or(ParseAttemptError::MissingNarrative)?;
    Ok(response)
}

/// A string literal's raw (still escaped) body.
#[derive(Debug, PartialEq, Eq)]
struct StringLiteral<'a> {
    raw: &'a str,
    terminated: bool,
}

/// Read the string literal whose opening quote is at `start`.
///
/// Reads at most `max_scan` bytes; an unterminated literal yields everything
/// up to the end of the text or the scan window.
fn read_string_literal(text: &str, start: usize, max_scan: usize) -> Option<StringLiteral<'_>> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'"') {
        return None;
    }

    let body_start = start + 1;
    let limit = bytes.len().min(body_start.saturating_add(max_scan));
    let mut escaped = false;

    for (idx, &b) in bytes.iter().enumerate().take(limit).skip(body_start) {
        if escaped {
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else if b == b'"' {
            return Some(StringLiteral {
                raw: &text[body_start..idx],
                terminated: true,
            });
        }
    }

    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    Some(StringLiteral {
        raw: &text[body_start..end],
        terminated: false,
    })
}

fn read_container<T: serde::de::DeserializeOwned>(
    text: &str,
    start: usize,
    limits: &ParserLimits,
) -> Option<T> {
    let end = find_matching_close(
        text,
        start,
        limits.max_nesting_depth,
        limits.max_field_scan_bytes,
    )?;
    serde_json::from_str(&text[start..=end]).ok()
}

/// Decode JSON string escapes by hand.
///
/// Unknown escapes keep the escaped character, invalid `\u` sequences become
/// U+FFFD, and a dangling backslash at the end is dropped.
pub fn unescape_json_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escape) = chars.next() else {
            break;
        };
        match escape {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{0008}'),
            'f' => out.push('\u{000C}'),
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            '/' => out.push('/'),
            'u' => {
                let Some(high) = read_hex4(&mut chars) else {
                    out.push(char::REPLACEMENT_CHARACTER);
                    continue;
                };
                if (0xD800..0xDC00).contains(&high) {
                    match read_low_surrogate(&chars) {
                        Some((low, rest)) => {
                            chars = rest;
                            let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                            out.push(
                                char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER),
                            );
                        }
                        None => out.push(char::REPLACEMENT_CHARACTER),
                    }
                } else {
                    out.push(char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
            }
            other => out.push(other),
        }
    }

    out
}

type EscapeCursor<'a> = std::iter::Peekable<std::str::Chars<'a>>;

/// A `\uDC00`-`\uDFFF` escape directly following a high surrogate.
fn read_low_surrogate<'a>(chars: &EscapeCursor<'a>) -> Option<(u32, EscapeCursor<'a>)> {
    let mut lookahead = chars.clone();
    if lookahead.next() != Some('\\') || lookahead.next() != Some('u') {
        return None;
    }
    let low = read_hex4(&mut lookahead)?;
    (0xDC00..0xE000)
        .contains(&low)
        .then_some((low, lookahead))
}

fn read_hex4(chars: &mut EscapeCursor<'_>) -> Option<u32> {
    let mut value = 0u32;
    for _ in 0..4 {
        let digit = chars.peek()?.to_digit(16)?;
        chars.next();
        value = value * 16 + digit;
    }
    Some(value)
}
