//! Debug visibility for legacy narrative records

use std::fmt;

use serde::{Deserialize, Serialize};

/// Who is reading the narrative
///
/// Players get `HideDebug`; operators with elevated privileges may request
/// `ShowDebug` to see DM commentary inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebugMode {
    #[default]
    HideDebug,
    ShowDebug,
}

impl DebugMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebugMode::HideDebug => "HIDE_DEBUG",
            DebugMode::ShowDebug => "SHOW_DEBUG",
        }
    }

    pub fn shows_debug(&self) -> bool {
        matches!(self, DebugMode::ShowDebug)
    }
}

impl fmt::Display for DebugMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
