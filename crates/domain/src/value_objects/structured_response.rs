//! Structured response - the typed result of interpreting raw model output
//!
//! A `StructuredResponse` is created fresh by every parse call. The narrative is
//! always present; the remaining fields are whatever the model managed to emit.
//!
//! # Wire Shape
//!
//! ```json
//! {
//!   "narrative": "You enter the hall.",
//!   "entities_mentioned": ["Aria"],
//!   "location_confirmed": "Great Hall",
//!   "planning_block": "What do you do next?",
//!   "state_updates": {"player": {"hp": 12}},
//!   "debug_info": {"dm_notes": "perception check passed"}
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DomainError;

/// Top-level key holding the player-facing story text
pub const NARRATIVE_FIELD: &str = "narrative";
/// Top-level key holding DM-only debug data
pub const DEBUG_INFO_FIELD: &str = "debug_info";
/// Top-level key holding proposed game-state changes
pub const STATE_UPDATES_FIELD: &str = "state_updates";
/// Top-level key listing characters the model claims to have mentioned
pub const ENTITIES_MENTIONED_FIELD: &str = "entities_mentioned";
/// Top-level key echoing the location the model believes the scene is in
pub const LOCATION_CONFIRMED_FIELD: &str = "location_confirmed";
/// Top-level key holding the "what next" choices block
pub const PLANNING_BLOCK_FIELD: &str = "planning_block";

/// Every top-level key the parser recognises, narrative first.
pub const KNOWN_FIELDS: &[&str] = &[
    NARRATIVE_FIELD,
    DEBUG_INFO_FIELD,
    STATE_UPDATES_FIELD,
    ENTITIES_MENTIONED_FIELD,
    LOCATION_CONFIRMED_FIELD,
    PLANNING_BLOCK_FIELD,
];

/// Which strategy in the recovery chain produced a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParseMethod {
    /// The whole input decoded as one JSON object
    StrictJson,
    /// The first balanced `{...}` span decoded as JSON
    BoundaryExtraction,
    /// A truncated object decoded after synthesising its closing sequence
    TruncationCompletion,
    /// Individual fields located and decoded one by one
    RegexExtraction,
    /// The raw text used verbatim as narrative
    #[default]
    PlainTextFallback,
}

impl ParseMethod {
    /// All strategies in the order the parser attempts them
    pub fn all() -> &'static [ParseMethod] {
        &[
            ParseMethod::StrictJson,
            ParseMethod::BoundaryExtraction,
            ParseMethod::TruncationCompletion,
            ParseMethod::RegexExtraction,
            ParseMethod::PlainTextFallback,
        ]
    }

    /// Stable identifier used in log records and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMethod::StrictJson => "STRICT_JSON",
            ParseMethod::BoundaryExtraction => "BOUNDARY_EXTRACTION",
            ParseMethod::TruncationCompletion => "TRUNCATION_COMPLETION",
            ParseMethod::RegexExtraction => "REGEX_EXTRACTION",
            ParseMethod::PlainTextFallback => "PLAIN_TEXT_FALLBACK",
        }
    }

    /// Whether the narrative came out of a JSON structure rather than raw text
    pub fn is_structured(&self) -> bool {
        !matches!(self, ParseMethod::PlainTextFallback)
    }
}

impl fmt::Display for ParseMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParseMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STRICT_JSON" => Ok(ParseMethod::StrictJson),
            "BOUNDARY_EXTRACTION" => Ok(ParseMethod::BoundaryExtraction),
            "TRUNCATION_COMPLETION" => Ok(ParseMethod::TruncationCompletion),
            "REGEX_EXTRACTION" => Ok(ParseMethod::RegexExtraction),
            "PLAIN_TEXT_FALLBACK" => Ok(ParseMethod::PlainTextFallback),
            _ => Err(DomainError::parse(format!("Unknown parse method: {}", s))),
        }
    }
}

/// Parsed, typed result of interpreting raw model output
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructuredResponse {
    /// Player-facing story text
    pub narrative: String,
    /// DM-only debug data, structure preserved as emitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<Map<String, Value>>,
    /// Proposed game-state changes, structure preserved as emitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_updates: Option<Map<String, Value>>,
    /// Character names the model claims the narrative mentions
    #[serde(default)]
    pub entities_mentioned: Vec<String>,
    /// Location the model believes the scene takes place in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_confirmed: Option<String>,
    /// "What do you do next?" choices block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planning_block: Option<String>,
    /// Strategy that produced this response
    #[serde(default)]
    pub parse_method_used: ParseMethod,
    /// Degraded conditions encountered while parsing
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl StructuredResponse {
    /// Response carrying only a narrative, every other field at its default
    pub fn plain_text(narrative: impl Into<String>) -> Self {
        Self {
            narrative: narrative.into(),
            ..Self::default()
        }
    }

    /// Narrative with surrounding whitespace and stray quote characters removed.
    ///
    /// This is the text the sanity check measures.
    pub fn trimmed_narrative(&self) -> &str {
        self.narrative
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace())
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Whether the narrative still contains a raw `"field_name":` sequence.
    ///
    /// A structured parse that leaves protocol syntax in the narrative is the
    /// failure the recovery chain exists to prevent.
    pub fn has_protocol_leak(&self) -> bool {
        contains_field_key(&self.narrative)
    }
}

/// Whether `text` contains any known field name written as a JSON key.
///
/// Tolerates whitespace between the closing quote and the colon.
pub fn contains_field_key(text: &str) -> bool {
    KNOWN_FIELDS.iter().any(|field| {
        let quoted = format!("\"{}\"", field);
        text.match_indices(quoted.as_str()).any(|(idx, matched)| {
            text[idx + matched.len()..]
                .trim_start()
                .starts_with(':')
        })
    })
}
