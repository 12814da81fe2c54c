//! Entity presence validation
//!
//! Checks that a narrative mentions every character the scene manifest says
//! should plausibly appear. The result is advisory: callers may use it to
//! request one regeneration, but a missing character never blocks a turn.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use fablecheck_domain::{DomainError, SceneManifest, ValidationResult};

/// Default minimum length of a name component that may stand in for the full name.
pub const DEFAULT_MIN_TOKEN_CHARS: usize = 3;

/// Titles and filler words that never identify a character on their own.
const NON_DISTINCTIVE_TOKENS: &[&str] = &[
    "the", "of", "and", "von", "van", "de", "captain", "lord", "lady", "sir", "dame", "king",
    "queen", "prince", "princess", "duke", "duchess", "baron", "baroness", "count", "countess",
    "master", "mistress", "mister", "mr", "mrs", "ms", "miss", "dr", "doctor", "father",
    "mother", "brother", "sister", "old", "young", "elder", "general", "commander",
    "sergeant", "lieutenant", "saint", "professor",
];

/// How much of a multi-word name must appear for it to count as mentioned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityMatchPolicy {
    /// The full name, or any distinctive component of it ("Thorne" for "Captain Thorne")
    #[default]
    AnyDistinctiveToken,
    /// Only the full name
    FullNameOnly,
}

impl EntityMatchPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityMatchPolicy::AnyDistinctiveToken => "any_token",
            EntityMatchPolicy::FullNameOnly => "full_name",
        }
    }
}

impl fmt::Display for EntityMatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityMatchPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "any_token" | "any_distinctive_token" => Ok(EntityMatchPolicy::AnyDistinctiveToken),
            "full_name" | "full_name_only" => Ok(EntityMatchPolicy::FullNameOnly),
            _ => Err(DomainError::parse(format!(
                "Unknown entity match policy: {}",
                s
            ))),
        }
    }
}

/// Name matching configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMatchConfig {
    pub policy: EntityMatchPolicy,
    /// Shorter name components never count as a mention on their own
    pub min_token_chars: usize,
}

impl Default for EntityMatchConfig {
    fn default() -> Self {
        Self {
            policy: EntityMatchPolicy::default(),
            min_token_chars: DEFAULT_MIN_TOKEN_CHARS,
        }
    }
}

/// Lowercase with whitespace runs collapsed to single spaces.
fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whether `needle` occurs in `haystack` with no letter or digit on either side.
fn contains_whole_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(idx, matched)| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Checks narratives against a scene's expected characters
#[derive(Debug, Clone, Default)]
pub struct EntityPresenceValidator {
    config: EntityMatchConfig,
}

impl EntityPresenceValidator {
    pub fn new(config: EntityMatchConfig) -> Self {
        Self { config }
    }

    /// Names of present, visible, conscious characters in manifest order.
    ///
    /// Blank names are skipped and repeated names (ignoring case) are kept once.
    pub fn expected_entities(&self, manifest: &SceneManifest) -> Vec<String> {
        let mut seen = HashSet::new();
        manifest
            .expected_characters()
            .filter(|entry| !entry.name.trim().is_empty())
            .filter(|entry| seen.insert(normalize_name(&entry.name)))
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Partition `expected` into names the narrative mentions and names it does not.
    pub fn validate(&self, narrative: &str, expected: &[String]) -> ValidationResult {
        let haystack = normalize_name(narrative);
        let (found, missing): (Vec<String>, Vec<String>) = expected
            .iter()
            .cloned()
            .partition(|name| self.is_mentioned(&haystack, name));

        let result = ValidationResult::from_partition(found, missing);

        tracing::debug!(
            expected = result.expected_count(),
            found = result.entities_found.len(),
            confidence = result.confidence,
            "Validated entity presence"
        );
        if !result.all_entities_present {
            tracing::info!(
                missing = ?result.entities_missing,
                confidence = result.confidence,
                "Narrative omits expected characters"
            );
        }

        result
    }

    pub fn validate_against_manifest(
        &self,
        narrative: &str,
        manifest: &SceneManifest,
    ) -> ValidationResult {
        let expected = self.expected_entities(manifest);
        self.validate(narrative, &expected)
    }

    fn is_mentioned(&self, haystack: &str, name: &str) -> bool {
        let full_name = normalize_name(name);
        if contains_whole_word(haystack, &full_name) {
            return true;
        }
        match self.config.policy {
            EntityMatchPolicy::FullNameOnly => false,
            EntityMatchPolicy::AnyDistinctiveToken => self
                .distinctive_tokens(&full_name)
                .any(|token| contains_whole_word(haystack, token)),
        }
    }

    fn distinctive_tokens<'a>(&self, full_name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let min_chars = self.config.min_token_chars;
        full_name
            .split(' ')
            .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(move |token| token.chars().count() >= min_chars)
            .filter(|token| !NON_DISTINCTIVE_TOKENS.contains(token))
    }
}

/// Expected names with the default matching configuration.
pub fn expected_entities(manifest: &SceneManifest) -> Vec<String> {
    EntityPresenceValidator::default().expected_entities(manifest)
}

/// Validate with the default matching configuration.
pub fn validate_entity_presence(narrative: &str, expected: &[String]) -> ValidationResult {
    EntityPresenceValidator::default().validate(narrative, expected)
}
