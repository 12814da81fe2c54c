//! Resilient parser for structured model responses.
//!
//! Converts raw, possibly truncated or malformed model output into a
//! [`StructuredResponse`] through an ordered chain of strategies:
//!
//! 1. `STRICT_JSON` - the whole input is one JSON object
//! 2. `BOUNDARY_EXTRACTION` - the first balanced `{...}` span is one
//! 3. `TRUNCATION_COMPLETION` - a cut-off object, closed and retried
//! 4. `REGEX_EXTRACTION` - known fields recovered one by one
//! 5. `PLAIN_TEXT_FALLBACK` - the raw text used verbatim as narrative
//!
//! Every candidate must pass a sanity check (a non-trivial narrative) before it
//! is accepted. Parsing never fails: the worst case is the raw text presented
//! as narrative.

mod field_extractor;
mod json_scan;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use fablecheck_domain::{
    contains_field_key, ParseMethod, StructuredResponse, DEBUG_INFO_FIELD,
    ENTITIES_MENTIONED_FIELD, LOCATION_CONFIRMED_FIELD, NARRATIVE_FIELD, PLANNING_BLOCK_FIELD,
    STATE_UPDATES_FIELD,
};

pub use field_extractor::unescape_json_string;

/// Hard cap on input size; longer input is cut before any strategy runs.
pub const DEFAULT_MAX_INPUT_BYTES: usize = 1024 * 1024;
/// Hard cap on bracket nesting; stays below serde_json's recursion limit of 128.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 100;
/// Minimum narrative length (in characters, after trimming) a strategy must yield.
pub const DEFAULT_MIN_NARRATIVE_CHARS: usize = 1;
/// Bound on how far field extraction scans for a single value.
pub const DEFAULT_MAX_FIELD_SCAN_BYTES: usize = 256 * 1024;

/// Resource bounds for one parse call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserLimits {
    pub max_input_bytes: usize,
    pub max_nesting_depth: usize,
    pub min_narrative_chars: usize,
    pub max_field_scan_bytes: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            min_narrative_chars: DEFAULT_MIN_NARRATIVE_CHARS,
            max_field_scan_bytes: DEFAULT_MAX_FIELD_SCAN_BYTES,
        }
    }
}

/// Why a single strategy declined the input.
///
/// These never leave the parser; they are logged and the chain moves on.
#[derive(Debug, thiserror::Error)]
pub enum ParseAttemptError {
    #[error("input does not look like a JSON object")]
    NotJsonLike,

    #[error("no balanced object boundary found")]
    NoObjectBoundary,

    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("decoded JSON is not an object")]
    NotAnObject,

    #[error("no string narrative field present")]
    MissingNarrative,

    #[error("narrative shorter than {min} characters after trimming")]
    FailedSanityCheck { min: usize },

    #[error("no truncation repair produced decodable JSON")]
    NothingToComplete,
}

/// Text handed to every strategy after the hard caps were applied
struct ParseInput<'a> {
    text: &'a str,
    limits: &'a ParserLimits,
}

type Strategy = fn(&ParseInput<'_>) -> Result<StructuredResponse, ParseAttemptError>;

/// Structured strategies in the order they are attempted
const STRATEGIES: &[(ParseMethod, Strategy)] = &[
    (ParseMethod::StrictJson, strict_json),
    (ParseMethod::BoundaryExtraction, boundary_extraction),
    (ParseMethod::TruncationCompletion, truncation_completion),
    (ParseMethod::RegexExtraction, regex_extraction),
];

/// Pure, reusable parser; safe to share across threads
#[derive(Debug, Clone, Default)]
pub struct ResponseParser {
    limits: ParserLimits,
}

impl ResponseParser {
    pub fn new(limits: ParserLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ParserLimits {
        &self.limits
    }

    /// Parse raw model output. Never fails.
    ///
    /// With `expect_json_mode == false` the structured strategies are skipped
    /// so braces inside prose are never mistaken for JSON.
    pub fn parse(&self, raw_text: &str, expect_json_mode: bool) -> StructuredResponse {
        let CappedInput { text, warnings } = cap_input(raw_text, &self.limits, expect_json_mode);

        if text.trim().is_empty() {
            tracing::warn!(
                input_bytes = raw_text.len(),
                "Model response is empty; returning empty narrative"
            );
            return plain_text_fallback(
                text,
                warnings,
                Some("input was empty; no narrative available"),
            );
        }

        if !expect_json_mode {
            return plain_text_fallback(text, warnings, None);
        }

        if json_scan::find_object_start(text).is_none() {
            tracing::debug!("JSON output was requested but the response contains no object");
            return plain_text_fallback(
                text,
                warnings,
                Some("expected JSON but found no JSON structure; using raw text"),
            );
        }

        let input = ParseInput {
            text,
            limits: &self.limits,
        };
        for (method, strategy) in STRATEGIES {
            match strategy(&input).and_then(|response| self.sanity_check(response)) {
                Ok(mut response) => {
                    response.parse_method_used = *method;
                    prepend_warnings(&mut response, warnings);
                    tracing::debug!(
                        strategy = %method,
                        narrative_chars = response.narrative.chars().count(),
                        "Parsed structured model response"
                    );
                    return response;
                }
                Err(e) => {
                    tracing::debug!(strategy = %method, error = %e, "Parse strategy declined");
                }
            }
        }

        tracing::warn!(
            input_bytes = text.len(),
            "No structured strategy recovered a narrative; using raw text"
        );
        plain_text_fallback(
            text,
            warnings,
            Some("no structured strategy recovered a narrative; using raw text"),
        )
    }

    fn sanity_check(
        &self,
        response: StructuredResponse,
    ) -> Result<StructuredResponse, ParseAttemptError> {
        let min = self.limits.min_narrative_chars.max(1);
        if response.trimmed_narrative().chars().count() < min {
            return Err(ParseAttemptError::FailedSanityCheck { min });
        }
        Ok(response)
    }
}

/// Parse with default limits.
pub fn parse_structured_response(raw_text: &str, expect_json_mode: bool) -> StructuredResponse {
    ResponseParser::default().parse(raw_text, expect_json_mode)
}

struct CappedInput<'a> {
    text: &'a str,
    warnings: Vec<String>,
}

/// Apply the hard size and nesting caps.
///
/// Nesting only matters to the JSON decoders, so it is capped in JSON mode only.
fn cap_input<'a>(raw: &'a str, limits: &ParserLimits, expect_json_mode: bool) -> CappedInput<'a> {
    let mut warnings = Vec::new();
    let mut text: &'a str = raw;

    if text.len() > limits.max_input_bytes {
        let mut cut = limits.max_input_bytes;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        tracing::warn!(
            input_bytes = raw.len(),
            max_input_bytes = limits.max_input_bytes,
            "Model response exceeds size cap; truncating before parse"
        );
        warnings.push(format!(
            "input truncated before parse: {} bytes exceeds limit of {}",
            raw.len(),
            limits.max_input_bytes
        ));
        text = &text[..cut];
    }

    if expect_json_mode {
        if let Some(cut) = json_scan::depth_overflow_offset(text, limits.max_nesting_depth) {
            tracing::warn!(
                offset = cut,
                max_nesting_depth = limits.max_nesting_depth,
                "Model response exceeds nesting cap; truncating before parse"
            );
            warnings.push(format!(
                "input truncated before parse: nesting deeper than {} levels at byte {}",
                limits.max_nesting_depth, cut
            ));
            text = &text[..cut];
        }
    }

    CappedInput { text, warnings }
}

fn plain_text_fallback(
    text: &str,
    mut warnings: Vec<String>,
    reason: Option<&str>,
) -> StructuredResponse {
    warnings.extend(reason.map(str::to_string));
    let mut response = StructuredResponse::plain_text(text);
    response.warnings = warnings;
    response
}

fn prepend_warnings(response: &mut StructuredResponse, mut leading: Vec<String>) {
    if leading.is_empty() {
        return;
    }
    leading.append(&mut response.warnings);
    response.warnings = leading;
}

fn strict_json(input: &ParseInput<'_>) -> Result<StructuredResponse, ParseAttemptError> {
    let trimmed = input.text.trim();
    if !trimmed.starts_with('{') {
        return Err(ParseAttemptError::NotJsonLike);
    }
    let value: Value = serde_json::from_str(trimmed)?;
    response_from_value(value)
}

fn boundary_extraction(input: &ParseInput<'_>) -> Result<StructuredResponse, ParseAttemptError> {
    let start =
        json_scan::find_object_start(input.text).ok_or(ParseAttemptError::NoObjectBoundary)?;
    let end = json_scan::find_matching_close(
        input.text,
        start,
        input.limits.max_nesting_depth,
        input.limits.max_input_bytes,
    )
    .ok_or(ParseAttemptError::NoObjectBoundary)?;
    let value: Value = serde_json::from_str(&input.text[start..=end])?;
    response_from_value(value)
}

fn truncation_completion(input: &ParseInput<'_>) -> Result<StructuredResponse, ParseAttemptError> {
    let body = strip_code_fence(input.text);
    if !body.starts_with('{') || !field_extractor::contains_known_key(body) {
        return Err(ParseAttemptError::NotJsonLike);
    }

    let state = json_scan::scan_truncation(body, input.limits.max_nesting_depth)
        .ok_or(ParseAttemptError::NothingToComplete)?;

    let mut last_error = ParseAttemptError::NothingToComplete;
    for candidate in state.candidates(body) {
        match serde_json::from_str::<Value>(&candidate)
            .map_err(ParseAttemptError::from)
            .and_then(response_from_value)
        {
            Ok(response) => return Ok(response),
            Err(e) => last_error = e,
        }
    }
    Err(last_error)
}

fn regex_extraction(input: &ParseInput<'_>) -> Result<StructuredResponse, ParseAttemptError> {
    let mut response = field_extractor::extract_fields(input.text, input.limits)?;
    unwrap_nested_narrative(&mut response);
    Ok(response)
}

/// Leading whitespace and an optional markdown fence (```json) removed.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim_start();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    match rest.find('\n') {
        Some(newline) => rest[newline + 1..].trim_start(),
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()).trim_start(),
    }
}

fn response_from_value(value: Value) -> Result<StructuredResponse, ParseAttemptError> {
    match value {
        Value::Object(map) => response_from_object(map),
        _ => Err(ParseAttemptError::NotAnObject),
    }
}

/// Copy known fields out of a decoded object, keeping every value as-is.
fn response_from_object(
    mut map: Map<String, Value>,
) -> Result<StructuredResponse, ParseAttemptError> {
    let narrative = match map.remove(NARRATIVE_FIELD) {
        Some(Value::String(narrative)) => narrative,
        _ => return Err(ParseAttemptError::MissingNarrative),
    };

    let mut response = StructuredResponse::plain_text(narrative);

    response.debug_info = take_object(&mut map, DEBUG_INFO_FIELD, &mut response.warnings);
    response.state_updates = take_object(&mut map, STATE_UPDATES_FIELD, &mut response.warnings);
    response.location_confirmed =
        take_string(&mut map, LOCATION_CONFIRMED_FIELD, &mut response.warnings);
    response.planning_block = take_string(&mut map, PLANNING_BLOCK_FIELD, &mut response.warnings);

    match map.remove(ENTITIES_MENTIONED_FIELD) {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            let total = items.len();
            response.entities_mentioned = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(name) => Some(name),
                    _ => None,
                })
                .collect();
            if response.entities_mentioned.len() < total {
                response.warnings.push(format!(
                    "field '{}' contained non-string items; dropped",
                    ENTITIES_MENTIONED_FIELD
                ));
            }
        }
        Some(_) => response.warnings.push(format!(
            "field '{}' is not an array; ignored",
            ENTITIES_MENTIONED_FIELD
        )),
    }

    if !map.is_empty() {
        tracing::trace!(
            keys = ?map.keys().collect::<Vec<_>>(),
            "Ignoring unknown response fields"
        );
    }

    Ok(response)
}

fn take_object(
    map: &mut Map<String, Value>,
    field: &str,
    warnings: &mut Vec<String>,
) -> Option<Map<String, Value>> {
    match map.remove(field) {
        Some(Value::Object(inner)) => Some(inner),
        None | Some(Value::Null) => None,
        Some(_) => {
            warnings.push(format!("field '{}' is not an object; ignored", field));
            None
        }
    }
}

fn take_string(
    map: &mut Map<String, Value>,
    field: &str,
    warnings: &mut Vec<String>,
) -> Option<String> {
    match map.remove(field) {
        Some(Value::String(value)) => Some(value),
        None | Some(Value::Null) => None,
        Some(_) => {
            warnings.push(format!("field '{}' is not a string; ignored", field));
            None
        }
    }
}

/// Replace a narrative that is itself an encoded response with its inner narrative.
///
/// Only applied to field-by-field recovery, where the narrative was read as
/// raw text. Decoded objects keep their narrative verbatim. One level is unwrapped.
fn unwrap_nested_narrative(response: &mut StructuredResponse) {
    let trimmed = response.narrative.trim();
    if !trimmed.starts_with('{') || !contains_field_key(trimmed) {
        return;
    }
    let inner = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(mut inner)) => match inner.remove(NARRATIVE_FIELD) {
            Some(Value::String(narrative)) => narrative,
            _ => return,
        },
        _ => return,
    };
    response.narrative = inner;
    response
        .warnings
        .push("narrative contained a nested encoded response; unwrapped".to_string());
}

#[cfg(test)]
mod tests;
