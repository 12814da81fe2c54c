//! Response processing pipeline
//!
//! Raw model text flows one way through three stages:
//!
//! 1. [`ResponseParser`] turns it into a [`StructuredResponse`]
//! 2. [`LegacyDebugTagStripper`] cleans the narrative, only when legacy
//!    inline markup is detected
//! 3. [`EntityPresenceValidator`] checks the narrative against the scene
//!    manifest, only when one is supplied
//!
//! Every stage is infallible, so processing always yields a narrative to show.

use serde::Serialize;

use fablecheck_domain::{
    DebugMode, ParseMethod, SceneManifest, StructuredResponse, ValidationResult,
};

use crate::infrastructure::settings::ProcessingSettings;
use crate::use_cases::entity_presence::EntityPresenceValidator;
use crate::use_cases::legacy_tags::LegacyDebugTagStripper;
use crate::use_cases::response_parsing::ResponseParser;

/// Per-call processing options
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions<'a> {
    /// Whether JSON-structured output was requested from the model
    pub expect_json_mode: bool,
    /// Who will read the narrative
    pub debug_mode: DebugMode,
    /// Scene to validate the narrative against
    pub manifest: Option<&'a SceneManifest>,
}

impl<'a> ProcessOptions<'a> {
    /// Options for a response requested in JSON mode
    pub fn json() -> Self {
        Self {
            expect_json_mode: true,
            ..Self::default()
        }
    }

    /// Options for a response requested as free text
    pub fn plain_text() -> Self {
        Self::default()
    }

    pub fn with_debug_mode(mut self, debug_mode: DebugMode) -> Self {
        self.debug_mode = debug_mode;
        self
    }

    pub fn with_manifest(mut self, manifest: &'a SceneManifest) -> Self {
        self.manifest = Some(manifest);
        self
    }
}

/// Flat summary of one processing call for metrics and logs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingLogRecord {
    pub parse_method: ParseMethod,
    /// Parser warnings followed by any raised while processing
    pub warnings: Vec<String>,
    pub legacy_tags_detected: bool,
    pub legacy_blocks_removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_confidence: Option<f32>,
    pub entities_missing: Vec<String>,
    /// Narrative still contains a raw `"field":` sequence
    pub protocol_leak: bool,
    pub input_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_number: Option<u32>,
}

/// Result bundle for one model response
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedResponse {
    pub response: StructuredResponse,
    /// Narrative after legacy markup handling; `None` when there was none
    pub stripped_narrative: Option<String>,
    /// Present only when a manifest was supplied
    pub validation: Option<ValidationResult>,
    pub log: ProcessingLogRecord,
}

impl ProcessedResponse {
    /// The narrative to present for the requested debug mode.
    pub fn display_narrative(&self) -> &str {
        self.stripped_narrative
            .as_deref()
            .unwrap_or(&self.response.narrative)
    }
}

/// Parser, stripper and validator configured from one set of settings
#[derive(Debug, Clone, Default)]
pub struct ResponseProcessor {
    parser: ResponseParser,
    stripper: LegacyDebugTagStripper,
    validator: EntityPresenceValidator,
}

impl ResponseProcessor {
    pub fn new(settings: &ProcessingSettings) -> Self {
        Self {
            parser: ResponseParser::new(settings.parser.clone()),
            stripper: LegacyDebugTagStripper::new(settings.stripper.clone()),
            validator: EntityPresenceValidator::new(settings.entity_matching.clone()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(&ProcessingSettings::from_env())
    }

    pub fn process(&self, raw_text: &str, options: &ProcessOptions<'_>) -> ProcessedResponse {
        let response = self.parser.parse(raw_text, options.expect_json_mode);
        let mut warnings = response.warnings.clone();

        let legacy_tags_detected = self.stripper.detect(&response.narrative);
        let (stripped_narrative, legacy_blocks_removed) = if legacy_tags_detected {
            let (text, report) = self
                .stripper
                .strip_with_report(&response.narrative, options.debug_mode);
            if report.unterminated {
                warnings.push("legacy debug block was never closed".into());
            }
            (Some(text), report.total_blocks())
        } else {
            (None, 0)
        };

        let validation = options.manifest.map(|manifest| {
            // Commentary never counts as a mention, whoever is reading.
            let hidden = match (&stripped_narrative, options.debug_mode) {
                (Some(text), DebugMode::HideDebug) => text.clone(),
                (Some(_), DebugMode::ShowDebug) => self
                    .stripper
                    .strip(&response.narrative, DebugMode::HideDebug),
                (None, _) => response.narrative.clone(),
            };
            self.validator.validate_against_manifest(&hidden, manifest)
        });

        if let Some(warning) = options
            .manifest
            .and_then(|manifest| location_mismatch(&response, manifest))
        {
            warnings.push(warning);
        }

        let log = ProcessingLogRecord {
            parse_method: response.parse_method_used,
            warnings,
            legacy_tags_detected,
            legacy_blocks_removed,
            validation_confidence: validation.as_ref().map(|v| v.confidence),
            entities_missing: validation
                .as_ref()
                .map(|v| v.entities_missing.clone())
                .unwrap_or_default(),
            protocol_leak: response.has_protocol_leak(),
            input_bytes: raw_text.len(),
            scene_id: options.manifest.map(|m| m.scene_id.clone()),
            turn_number: options.manifest.map(|m| m.turn_number),
        };

        tracing::info!(
            parse_method = %log.parse_method,
            warning_count = log.warnings.len(),
            legacy_tags = log.legacy_tags_detected,
            legacy_blocks = log.legacy_blocks_removed,
            confidence = ?log.validation_confidence,
            entities_missing = ?log.entities_missing,
            protocol_leak = log.protocol_leak,
            scene_id = ?log.scene_id,
            "Processed model response"
        );

        ProcessedResponse {
            response,
            stripped_narrative,
            validation,
            log,
        }
    }
}

/// Process with default settings.
pub fn process_response(raw_text: &str, options: &ProcessOptions<'_>) -> ProcessedResponse {
    ResponseProcessor::default().process(raw_text, options)
}

fn location_mismatch(response: &StructuredResponse, manifest: &SceneManifest) -> Option<String> {
    let confirmed = response.location_confirmed.as_deref()?.trim();
    let expected = manifest.current_location.trim();
    if confirmed.is_empty()
        || expected.is_empty()
        || confirmed.to_lowercase() == expected.to_lowercase()
    {
        return None;
    }
    Some(format!(
        "location_confirmed '{}' differs from scene location '{}'",
        confirmed, expected
    ))
}
