//! Entity presence validation result
//!
//! Advisory telemetry: a result that is not fully present never blocks a turn.

use serde::{Deserialize, Serialize};

/// Outcome of checking a narrative for the characters a scene expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub entities_found: Vec<String>,
    pub entities_missing: Vec<String>,
    pub all_entities_present: bool,
    /// Fraction of expected entities found, in `[0, 1]`
    pub confidence: f32,
}

impl ValidationResult {
    /// Build a result from the found/missing split.
    ///
    /// With nothing expected the check is vacuously satisfied (confidence 1.0).
    pub fn from_partition(entities_found: Vec<String>, entities_missing: Vec<String>) -> Self {
        let total = entities_found.len() + entities_missing.len();
        let confidence = if total == 0 {
            1.0
        } else {
            entities_found.len() as f32 / total as f32
        };

        Self {
            all_entities_present: entities_missing.is_empty(),
            entities_found,
            entities_missing,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Result for a scene that expects nobody
    pub fn vacuous() -> Self {
        Self::from_partition(Vec::new(), Vec::new())
    }

    pub fn expected_count(&self) -> usize {
        self.entities_found.len() + self.entities_missing.len()
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::vacuous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vacuous_result_passes() {
        let result = ValidationResult::vacuous();
        assert!(result.all_entities_present);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.expected_count(), 0);
    }

    #[test]
    fn test_partial_result() {
        let result =
            ValidationResult::from_partition(vec!["Aria".into()], vec!["Captain Thorne".into()]);
        assert!(!result.all_entities_present);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.entities_missing, vec!["Captain Thorne".to_string()]);
    }
}
