//! Shared helpers for unit tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_fixtures::{init_test_tracing, manifests};
//!
//! #[test]
//! fn test_scene_expects_aria() {
//!     init_test_tracing();
//!     let manifest = manifests::tavern();
//!     // ... test logic
//! }
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Route `tracing` output through the test harness so it shows up for failing tests.
///
/// Level comes from `RUST_LOG`, defaulting to debug for this crate. Safe to call
/// from every test; only the first call installs the subscriber.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fablecheck_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

// =============================================================================
// Scene Manifests
// =============================================================================

pub mod manifests {
    use fablecheck_domain::{CharacterEntry, CharacterStatus, CharacterVisibility, SceneManifest};

    /// Two expected characters ("Aria", "Captain Thorne") plus entries that
    /// must never be expected.
    pub fn tavern() -> SceneManifest {
        SceneManifest::new("scene-tavern", 3, 12, "The Gilded Flagon").with_characters([
            CharacterEntry::new("Aria", 24),
            CharacterEntry::new("Captain Thorne", 40),
            CharacterEntry::new("Shade", 16).with_visibility(CharacterVisibility::Hidden),
            CharacterEntry::new("Old Bram", 10)
                .with_hp(0)
                .with_status(CharacterStatus::Unconscious),
            CharacterEntry::new("Mira", 18).with_present(false),
        ])
    }

    /// A scene nobody is expected in
    pub fn empty_road() -> SceneManifest {
        SceneManifest::new("scene-road", 3, 13, "The North Road")
    }
}
