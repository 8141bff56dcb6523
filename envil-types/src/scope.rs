//! Lexical scope labels, in the TextMate naming scheme used by sclang grammars.

use std::borrow::Cow;

/// One lexical scope name, e.g. `comment.single.supercollider`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeLabel(Cow<'static, str>);

impl ScopeLabel {
    pub const SOURCE: ScopeLabel = ScopeLabel::from_static("source.supercollider");
    pub const LINE_COMMENT: ScopeLabel = ScopeLabel::from_static("comment.single.supercollider");
    pub const BLOCK_COMMENT: ScopeLabel =
        ScopeLabel::from_static("comment.multiline.supercollider");
    pub const STRING: ScopeLabel = ScopeLabel::from_static("string.quoted.double.supercollider");
    pub const SYMBOL: ScopeLabel = ScopeLabel::from_static("entity.name.symbol.supercollider");
    pub const CHAR_ESCAPE: ScopeLabel =
        ScopeLabel::from_static("constant.character.escape.supercollider");

    /// Labels under which brackets and terminators carry no structure.
    const INERT: [ScopeLabel; 5] = [
        Self::LINE_COMMENT,
        Self::BLOCK_COMMENT,
        Self::STRING,
        Self::SYMBOL,
        Self::CHAR_ESCAPE,
    ];

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Comment, string, symbol, or character literal.
    pub fn is_inert(&self) -> bool {
        Self::INERT.iter().any(|l| l.as_str() == self.as_str())
    }
}

impl std::fmt::Display for ScopeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scopes active at one position, outermost first. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeStack(Vec<ScopeLabel>);

impl ScopeStack {
    pub fn new(labels: Vec<ScopeLabel>) -> Option<Self> {
        if labels.is_empty() {
            None
        } else {
            Some(Self(labels))
        }
    }

    /// Plain code: just the source scope.
    pub fn code() -> Self {
        Self(vec![ScopeLabel::SOURCE])
    }

    /// Source scope with one nested label.
    pub fn nested(inner: ScopeLabel) -> Self {
        Self(vec![ScopeLabel::SOURCE, inner])
    }

    pub fn labels(&self) -> &[ScopeLabel] {
        &self.0
    }

    pub fn innermost(&self) -> &ScopeLabel {
        // non-empty by construction
        &self.0[self.0.len() - 1]
    }

    /// Whether a character here counts toward structure.
    pub fn is_significant(&self) -> bool {
        !self.innermost().is_inert()
    }
}
