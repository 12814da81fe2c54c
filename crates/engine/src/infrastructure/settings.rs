//! Processing settings and environment overrides

use serde::{Deserialize, Serialize};

use crate::use_cases::entity_presence::{EntityMatchConfig, EntityMatchPolicy};
use crate::use_cases::legacy_tags::StripperLimits;
use crate::use_cases::response_parsing::ParserLimits;

pub const ENV_MAX_INPUT_BYTES: &str = "FABLECHECK_MAX_INPUT_BYTES";
pub const ENV_MAX_NESTING_DEPTH: &str = "FABLECHECK_MAX_NESTING_DEPTH";
pub const ENV_MIN_NARRATIVE_CHARS: &str = "FABLECHECK_MIN_NARRATIVE_CHARS";
pub const ENV_ENTITY_MATCH: &str = "FABLECHECK_ENTITY_MATCH";

const MAX_INPUT_BYTES_RANGE: (usize, usize) = (1024, 64 * 1024 * 1024);
// serde_json refuses to decode 128 levels of nesting.
const MAX_NESTING_DEPTH_RANGE: (usize, usize) = (2, 127);
const MIN_NARRATIVE_CHARS_RANGE: (usize, usize) = (1, 10_000);

/// Everything the processing pipeline can be tuned with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingSettings {
    #[serde(default)]
    pub parser: ParserLimits,
    #[serde(default)]
    pub stripper: StripperLimits,
    #[serde(default)]
    pub entity_matching: EntityMatchConfig,
}

impl ProcessingSettings {
    /// Defaults with overrides from the process environment applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`.
    ///
    /// Supported variables:
    /// - FABLECHECK_MAX_INPUT_BYTES: input size cap (range: 1024-67108864)
    /// - FABLECHECK_MAX_NESTING_DEPTH: bracket nesting cap (range: 2-127)
    /// - FABLECHECK_MIN_NARRATIVE_CHARS: sanity-check minimum (range: 1-10000)
    /// - FABLECHECK_ENTITY_MATCH: `any_token` or `full_name`
    ///
    /// Invalid values are logged and ignored.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(val) = lookup(ENV_MAX_INPUT_BYTES) {
            match parse_bounded(ENV_MAX_INPUT_BYTES, &val, MAX_INPUT_BYTES_RANGE) {
                Ok(bytes) => {
                    self.parser.max_input_bytes = bytes;
                    tracing::info!(bytes, "Applied FABLECHECK_MAX_INPUT_BYTES environment variable");
                }
                Err(e) => tracing::warn!(error = %e, "Ignoring environment override"),
            }
        }

        if let Some(val) = lookup(ENV_MAX_NESTING_DEPTH) {
            match parse_bounded(ENV_MAX_NESTING_DEPTH, &val, MAX_NESTING_DEPTH_RANGE) {
                Ok(depth) => {
                    self.parser.max_nesting_depth = depth;
                    tracing::info!(depth, "Applied FABLECHECK_MAX_NESTING_DEPTH environment variable");
                }
                Err(e) => tracing::warn!(error = %e, "Ignoring environment override"),
            }
        }

        if let Some(val) = lookup(ENV_MIN_NARRATIVE_CHARS) {
            match parse_bounded(ENV_MIN_NARRATIVE_CHARS, &val, MIN_NARRATIVE_CHARS_RANGE) {
                Ok(chars) => {
                    self.parser.min_narrative_chars = chars;
                    tracing::info!(chars, "Applied FABLECHECK_MIN_NARRATIVE_CHARS environment variable");
                }
                Err(e) => tracing::warn!(error = %e, "Ignoring environment override"),
            }
        }

        if let Some(val) = lookup(ENV_ENTITY_MATCH) {
            match val.parse::<EntityMatchPolicy>() {
                Ok(policy) => {
                    self.entity_matching.policy = policy;
                    tracing::info!(policy = %policy, "Applied FABLECHECK_ENTITY_MATCH environment variable");
                }
                Err(_) => {
                    let e = SettingsError::UnknownValue {
                        key: ENV_ENTITY_MATCH,
                        value: val,
                    };
                    tracing::warn!(error = %e, "Ignoring environment override");
                }
            }
        }

        self
    }
}

/// Why an environment override was rejected
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("{key} is not a valid number: {value:?}")]
    NotANumber { key: &'static str, value: String },

    #[error("{key} out of range [{min}, {max}]: {value}")]
    OutOfRange {
        key: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },

    #[error("{key} has unknown value: {value:?}")]
    UnknownValue { key: &'static str, value: String },
}

fn parse_bounded(
    key: &'static str,
    raw: &str,
    (min, max): (usize, usize),
) -> Result<usize, SettingsError> {
    let value = raw
        .trim()
        .parse::<usize>()
        .map_err(|_| SettingsError::NotANumber {
            key,
            value: raw.to_string(),
        })?;
    if !(min..=max).contains(&value) {
        return Err(SettingsError::OutOfRange {
            key,
            value,
            min,
            max,
        });
    }
    Ok(value)
}
