//! Legacy inline debug markup in stored narratives
//!
//! Older records embed DM commentary straight into narrative text between
//! bracketed markers:
//!
//! - `[DEBUG_START]` ... `[DEBUG_END]` - general commentary
//! - `[DEBUG_ROLL_START]` ... `[DEBUG_ROLL_END]` - dice rolls
//! - `[DEBUG_STATE_START]` ... `[DEBUG_STATE_END]` - state reasoning
//! - `[STATE_UPDATES_PROPOSED]` ... `[END_STATE_UPDATES_PROPOSED]` - the
//!   proposed state-update sub-block
//!
//! Players get the text with every block removed. Operators get the content
//! with only the markers removed.
//!
//! # Example
//!
//! ```
//! use fablecheck_domain::DebugMode;
//! use fablecheck_engine::use_cases::legacy_tags::strip_legacy_tags;
//!
//! let text = "You enter. [DEBUG_START]DM rolls perception[DEBUG_END] You see gold.";
//! assert_eq!(strip_legacy_tags(text, DebugMode::HideDebug), "You enter.  You see gold.");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use fablecheck_domain::DebugMode;

/// Default bound on how many blocks may be open at once.
pub const DEFAULT_MAX_BLOCK_DEPTH: usize = 32;

/// Resource bounds for one strip call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripperLimits {
    pub max_block_depth: usize,
}

impl Default for StripperLimits {
    fn default() -> Self {
        Self {
            max_block_depth: DEFAULT_MAX_BLOCK_DEPTH,
        }
    }
}

/// Kind of legacy block, one per marker pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    Debug,
    DebugRoll,
    DebugState,
    StateUpdatesProposed,
}

impl MarkerKind {
    const COUNT: usize = 4;

    pub fn all() -> &'static [MarkerKind] {
        &[
            MarkerKind::Debug,
            MarkerKind::DebugRoll,
            MarkerKind::DebugState,
            MarkerKind::StateUpdatesProposed,
        ]
    }

    pub fn open_marker(&self) -> &'static str {
        match self {
            MarkerKind::Debug => "[DEBUG_START]",
            MarkerKind::DebugRoll => "[DEBUG_ROLL_START]",
            MarkerKind::DebugState => "[DEBUG_STATE_START]",
            MarkerKind::StateUpdatesProposed => "[STATE_UPDATES_PROPOSED]",
        }
    }

    pub fn close_marker(&self) -> &'static str {
        match self {
            MarkerKind::Debug => "[DEBUG_END]",
            MarkerKind::DebugRoll => "[DEBUG_ROLL_END]",
            MarkerKind::DebugState => "[DEBUG_STATE_END]",
            MarkerKind::StateUpdatesProposed => "[END_STATE_UPDATES_PROPOSED]",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerKind::Debug => "debug",
            MarkerKind::DebugRoll => "debug_roll",
            MarkerKind::DebugState => "debug_state",
            MarkerKind::StateUpdatesProposed => "state_updates_proposed",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Open(MarkerKind),
    Close(MarkerKind),
}

/// The recognised marker that `bytes` ends with, and its length.
///
/// No marker is a suffix of another, so at most one can match.
fn trailing_marker(bytes: &[u8]) -> Option<(usize, Marker)> {
    MarkerKind::all().iter().find_map(|kind| {
        let open = kind.open_marker();
        let close = kind.close_marker();
        if bytes.ends_with(open.as_bytes()) {
            Some((open.len(), Marker::Open(*kind)))
        } else if bytes.ends_with(close.as_bytes()) {
            Some((close.len(), Marker::Close(*kind)))
        } else {
            None
        }
    })
}

/// What one strip call removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StripReport {
    blocks: [usize; MarkerKind::COUNT],
    /// Closing markers with no open block of their kind
    pub stray_closers: usize,
    /// A block was still open at end of text
    pub unterminated: bool,
    /// Nesting went past `max_block_depth`
    pub depth_exceeded: bool,
}

impl StripReport {
    /// Blocks of `kind` whose markers were removed (closed or still open at the end).
    pub fn blocks_removed(&self, kind: MarkerKind) -> usize {
        self.blocks[kind.index()]
    }

    pub fn total_blocks(&self) -> usize {
        self.blocks.iter().sum()
    }

    /// Nothing recognised was found.
    pub fn is_clean(&self) -> bool {
        self.total_blocks() == 0 && self.stray_closers == 0
    }

    fn count_block(&mut self, kind: MarkerKind) {
        self.blocks[kind.index()] += 1;
    }
}

/// Detects and removes legacy debug blocks.
///
/// Runs one forward pass over the text. Markers are literal strings checked
/// only at `]`, so cost is linear in the input regardless of how markers are
/// nested or interleaved.
#[derive(Debug, Clone, Default)]
pub struct LegacyDebugTagStripper {
    limits: StripperLimits,
}

impl LegacyDebugTagStripper {
    pub fn new(limits: StripperLimits) -> Self {
        Self { limits }
    }

    /// Whether any recognised opening marker is present.
    pub fn detect(&self, text: &str) -> bool {
        MarkerKind::all()
            .iter()
            .any(|kind| text.contains(kind.open_marker()))
    }

    pub fn strip(&self, text: &str, mode: DebugMode) -> String {
        self.strip_with_report(text, mode).0
    }

    /// Strip legacy blocks and report what was removed.
    ///
    /// `HideDebug` drops every block with its markers; a block left open at
    /// end of text swallows everything after its opening marker.
    /// `ShowDebug` drops the markers only and keeps all block content.
    /// In both modes the output contains no recognised marker, including
    /// markers that only appear once an inner block has been cut out.
    pub fn strip_with_report(&self, text: &str, mode: DebugMode) -> (String, StripReport) {
        let hide = !mode.shows_debug();
        let mut out = String::with_capacity(text.len());
        let mut report = StripReport::default();
        let mut open: Vec<MarkerKind> = Vec::new();

        for (idx, c) in text.char_indices() {
            let marker = if hide && !open.is_empty() {
                // Inside a hidden block nothing reaches the output.
                if c != ']' {
                    continue;
                }
                match trailing_marker(&text.as_bytes()[..=idx]) {
                    Some((_, marker)) => marker,
                    None => continue,
                }
            } else {
                out.push(c);
                if c != ']' {
                    continue;
                }
                match trailing_marker(out.as_bytes()) {
                    Some((len, marker)) => {
                        out.truncate(out.len() - len);
                        marker
                    }
                    None => continue,
                }
            };

            match marker {
                Marker::Open(kind) => {
                    if open.len() >= self.limits.max_block_depth {
                        report.depth_exceeded = true;
                        if hide {
                            break;
                        }
                        continue;
                    }
                    open.push(kind);
                }
                Marker::Close(kind) => match open.iter().rposition(|k| *k == kind) {
                    Some(pos) => {
                        // Closing an outer block implicitly closes anything inside it.
                        for closed in open.drain(pos..) {
                            report.count_block(closed);
                        }
                    }
                    None => report.stray_closers += 1,
                },
            }
        }

        if !open.is_empty() {
            report.unterminated = true;
            for kind in open.drain(..) {
                report.count_block(kind);
            }
            tracing::warn!(
                mode = %mode,
                depth_exceeded = report.depth_exceeded,
                "Legacy debug block left open at end of text"
            );
        }

        if !report.is_clean() {
            tracing::debug!(
                mode = %mode,
                blocks = report.total_blocks(),
                state_update_blocks = report.blocks_removed(MarkerKind::StateUpdatesProposed),
                stray_closers = report.stray_closers,
                "Removed legacy debug markup"
            );
        }

        (out, report)
    }
}

/// Detect legacy markup.
pub fn detect_legacy_tags(text: &str) -> bool {
    LegacyDebugTagStripper::default().detect(text)
}

/// Strip legacy markup with default limits.
pub fn strip_legacy_tags(text: &str, mode: DebugMode) -> String {
    LegacyDebugTagStripper::default().strip(text, mode)
}
