//! Use cases - the response handling pipeline.
//!
//! Each stage is a pure, synchronous value that can be shared across threads.

pub mod entity_presence;
pub mod legacy_tags;
pub mod response_parsing;
pub mod response_processing;

pub use entity_presence::{
    expected_entities, validate_entity_presence, EntityMatchConfig, EntityMatchPolicy,
    EntityPresenceValidator,
};
pub use legacy_tags::{
    detect_legacy_tags, strip_legacy_tags, LegacyDebugTagStripper, MarkerKind, StripReport,
    StripperLimits,
};
pub use response_parsing::{parse_structured_response, ParserLimits, ResponseParser};
pub use response_processing::{
    process_response, ProcessOptions, ProcessedResponse, ProcessingLogRecord, ResponseProcessor,
};
