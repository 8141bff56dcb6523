//! # envil-types
//!
//! Shared data model for the ENVIL live-coding workspace: editor buffers and
//! positions, the units the dispatcher produces (statements and bracket
//! regions), lexical scope labels, the post window, and the dispatch error taxonomy.

mod buffer;
mod error;
mod post_window;
mod scope;

pub use buffer::{BracketRegion, CursorPosition, Selection, SourceBuffer, Statement};
pub use error::DispatchError;
pub use post_window::{PostWindow, DEFAULT_HISTORY_CAPACITY};
pub use scope::{ScopeLabel, ScopeStack};

/// Which live-coding runtime a buffer targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LanguageMode {
    /// Visual synthesizer in the browser; statements are broadcast.
    Hydra,
    /// sclang interpreter process; bracket regions are evaluated.
    SuperCollider,
}

impl LanguageMode {
    pub fn name(self) -> &'static str {
        match self {
            LanguageMode::Hydra => "hydra",
            LanguageMode::SuperCollider => "supercollider",
        }
    }
}

impl std::fmt::Display for LanguageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
