//! Fablecheck Engine library.
//!
//! Turns raw model output into a structured response that is safe to show
//! players, and checks the narrative against the characters a scene expects.
//!
//! ## Structure
//!
//! - `use_cases/` - Parsing, legacy tag stripping, presence checks, and the
//!   pipeline that chains them
//! - `infrastructure/` - Settings and environment overrides

pub mod infrastructure;
pub mod use_cases;

/// Shared helpers for unit tests.
#[cfg(test)]
pub mod test_fixtures;

pub use infrastructure::settings::ProcessingSettings;
pub use use_cases::{
    detect_legacy_tags, expected_entities, parse_structured_response, process_response,
    strip_legacy_tags, validate_entity_presence, EntityPresenceValidator, LegacyDebugTagStripper,
    ProcessOptions, ProcessedResponse, ResponseParser, ResponseProcessor,
};
