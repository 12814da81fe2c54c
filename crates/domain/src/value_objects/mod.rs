//! Value objects - Immutable objects defined by their attributes

mod debug_mode;
mod entity_validation;
mod scene_manifest;
mod structured_response;

pub use debug_mode::DebugMode;
pub use entity_validation::ValidationResult;
pub use scene_manifest::{CharacterEntry, CharacterStatus, CharacterVisibility, SceneManifest};
pub use structured_response::{
    contains_field_key, ParseMethod, StructuredResponse, DEBUG_INFO_FIELD,
    ENTITIES_MENTIONED_FIELD, KNOWN_FIELDS, LOCATION_CONFIRMED_FIELD, NARRATIVE_FIELD,
    PLANNING_BLOCK_FIELD, STATE_UPDATES_FIELD,
};
