//! Fablecheck Domain - shared data definitions.
//!
//! Plain value objects passed between the response parser, the legacy debug
//! tag stripper, and the entity presence check. Nothing here performs I/O.

pub mod error;
pub mod value_objects;

pub use error::DomainError;

pub use value_objects::{
    contains_field_key, CharacterEntry, CharacterStatus, CharacterVisibility, DebugMode,
    ParseMethod, SceneManifest, StructuredResponse, ValidationResult, DEBUG_INFO_FIELD,
    ENTITIES_MENTIONED_FIELD, KNOWN_FIELDS, LOCATION_CONFIRMED_FIELD, NARRATIVE_FIELD,
    PLANNING_BLOCK_FIELD, STATE_UPDATES_FIELD,
};
