//! Scene manifest - which characters are in the current narrative turn
//!
//! Built fresh from authoritative game state on every turn and handed to the
//! entity presence check read-only. Only characters that are present, visible,
//! and conscious are expected to be mentioned by the narrative.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Whether a character can act and speak in the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterStatus {
    #[default]
    Conscious,
    Unconscious,
}

impl CharacterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CharacterStatus::Conscious => "conscious",
            CharacterStatus::Unconscious => "unconscious",
        }
    }
}

impl fmt::Display for CharacterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CharacterStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conscious" => Ok(CharacterStatus::Conscious),
            "unconscious" => Ok(CharacterStatus::Unconscious),
            _ => Err(DomainError::parse(format!("Unknown character status: {}", s))),
        }
    }
}

/// How perceptible a character is to the players
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterVisibility {
    #[default]
    Visible,
    Hidden,
    Invisible,
}

impl CharacterVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            CharacterVisibility::Visible => "visible",
            CharacterVisibility::Hidden => "hidden",
            CharacterVisibility::Invisible => "invisible",
        }
    }
}

impl fmt::Display for CharacterVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CharacterVisibility {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "visible" => Ok(CharacterVisibility::Visible),
            "hidden" => Ok(CharacterVisibility::Hidden),
            "invisible" => Ok(CharacterVisibility::Invisible),
            _ => Err(DomainError::parse(format!("Unknown visibility: {}", s))),
        }
    }
}

/// One character's presence snapshot for the current turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterEntry {
    pub name: String,
    pub hp_current: i32,
    pub hp_max: i32,
    #[serde(default)]
    pub status: CharacterStatus,
    #[serde(default)]
    pub visibility: CharacterVisibility,
    #[serde(default = "default_present")]
    pub present: bool,
}

fn default_present() -> bool {
    true
}

impl CharacterEntry {
    /// Present, visible, conscious character at full health
    pub fn new(name: impl Into<String>, hp_max: i32) -> Self {
        Self {
            name: name.into(),
            hp_current: hp_max,
            hp_max,
            status: CharacterStatus::Conscious,
            visibility: CharacterVisibility::Visible,
            present: true,
        }
    }

    pub fn with_hp(mut self, hp_current: i32) -> Self {
        self.hp_current = hp_current;
        self
    }

    pub fn with_status(mut self, status: CharacterStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_visibility(mut self, visibility: CharacterVisibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_present(mut self, present: bool) -> Self {
        self.present = present;
        self
    }

    /// Whether the narrative is expected to mention this character.
    ///
    /// Hidden, invisible, or unconscious characters are never required,
    /// even when physically present.
    pub fn is_expected_in_narrative(&self) -> bool {
        self.present
            && self.visibility == CharacterVisibility::Visible
            && self.status == CharacterStatus::Conscious
    }
}

/// Declarative snapshot of the characters in the current narrative turn
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SceneManifest {
    pub scene_id: String,
    pub session_number: u32,
    pub turn_number: u32,
    pub current_location: String,
    #[serde(default)]
    pub characters: Vec<CharacterEntry>,
}

impl SceneManifest {
    pub fn new(
        scene_id: impl Into<String>,
        session_number: u32,
        turn_number: u32,
        current_location: impl Into<String>,
    ) -> Self {
        Self {
            scene_id: scene_id.into(),
            session_number,
            turn_number,
            current_location: current_location.into(),
            characters: Vec::new(),
        }
    }

    pub fn with_character(mut self, entry: CharacterEntry) -> Self {
        self.characters.push(entry);
        self
    }

    pub fn with_characters(mut self, entries: impl IntoIterator<Item = CharacterEntry>) -> Self {
        self.characters.extend(entries);
        self
    }

    /// Characters the narrative must plausibly mention, in manifest order
    pub fn expected_characters(&self) -> impl Iterator<Item = &CharacterEntry> {
        self.characters
            .iter()
            .filter(|entry| entry.is_expected_in_narrative())
    }

    /// Sanity-check manifest data supplied by the game-state collaborator.
    ///
    /// Entity validation works on any manifest; this only reports data the
    /// caller probably did not intend (blank names, impossible HP).
    pub fn validate(&self) -> Result<(), DomainError> {
        for (index, entry) in self.characters.iter().enumerate() {
            if entry.name.trim().is_empty() {
                return Err(DomainError::validation(format!(
                    "Character at index {} has an empty name",
                    index
                )));
            }
            if entry.hp_max < 0 {
                return Err(DomainError::validation(format!(
                    "Character '{}' has negative hp_max {}",
                    entry.name, entry.hp_max
                )));
            }
            if entry.hp_current > entry.hp_max {
                return Err(DomainError::validation(format!(
                    "Character '{}' has hp_current {} above hp_max {}",
                    entry.name, entry.hp_current, entry.hp_max
                )));
            }
        }
        Ok(())
    }
}
