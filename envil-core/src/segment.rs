//! Statement segmentation for visual live code.
//!
//! Lines are filtered and rewritten one at a time, concatenated without
//! separators, and cut into statements at each `;`. Whatever follows the last
//! terminator is never emitted.

use std::borrow::Cow;
use std::collections::VecDeque;

use envil_types::{Selection, SourceBuffer, Statement};

pub const TERMINATOR: char = ';';
const COMMENT_MARKER: &str = "//";
const URL_MARKER: &str = "://";

/// Rewrites a project-local path prefix into a URL on the static file server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    marker: String,
    replacement: String,
}

impl Default for RewriteRule {
    fn default() -> Self {
        Self::new("local/files/", "http://localhost:3000/files/")
    }
}

impl RewriteRule {
    pub fn new(marker: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            replacement: replacement.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Replace every occurrence of the marker.
    ///
    /// The replacement must not contain the marker, so applying twice is a no-op.
    pub fn apply<'a>(&self, line: &'a str) -> Cow<'a, str> {
        if !self.marker.is_empty() && line.contains(&self.marker) {
            Cow::Owned(line.replace(&self.marker, &self.replacement))
        } else {
            Cow::Borrowed(line)
        }
    }
}

/// A line counts as a comment if it has `//` and no `://` anywhere.
///
/// Crude on purpose: `x = "http://a" // note` is kept whole, comment included,
/// and `a(); // note` is dropped whole.
fn is_comment_line(line: &str) -> bool {
    !line.contains(URL_MARKER) && line.contains(COMMENT_MARKER)
}

#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    rule: RewriteRule,
}

impl Segmenter {
    pub fn new(rule: RewriteRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &RewriteRule {
        &self.rule
    }

    /// Statements of the selection, or of the whole buffer when nothing is selected.
    pub fn segment_selection(
        &self,
        buffer: &SourceBuffer,
        selection: Option<&Selection>,
    ) -> Vec<Statement> {
        let text = evaluation_text(buffer, selection);
        self.segment(&text).collect()
    }

    /// Lazily split `text` into statements.
    pub fn segment<'a>(&self, text: &'a str) -> Segments<'a> {
        Segments {
            lines: text.split('\n'),
            rule: self.rule.clone(),
            pending: String::new(),
            ready: VecDeque::new(),
        }
    }
}

/// Segment with the default rewrite rule.
pub fn segment(text: &str) -> Segments<'_> {
    Segmenter::default().segment(text)
}

/// The selected text, or the whole buffer when nothing is selected.
pub fn evaluation_text(buffer: &SourceBuffer, selection: Option<&Selection>) -> String {
    match selection {
        Some(sel) if !sel.is_empty() => {
            let text = buffer.selected_text(sel);
            if text.is_empty() {
                buffer.text()
            } else {
                text
            }
        }
        _ => buffer.text(),
    }
}

/// Iterator over the statements of one text.
pub struct Segments<'a> {
    lines: std::str::Split<'a, char>,
    rule: RewriteRule,
    pending: String,
    ready: VecDeque<Statement>,
}

impl Segments<'_> {
    fn take_line(&mut self, line: &str) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if is_comment_line(line) {
            return;
        }
        let line = self.rule.apply(line);
        if line.trim().is_empty() {
            return;
        }

        self.pending.push_str(&line);
        while let Some(idx) = self.pending.find(TERMINATOR) {
            let head: String = self.pending.drain(..=idx).collect();
            if let Some(statement) = Statement::new(&head[..idx]) {
                self.ready.push_back(statement);
            }
        }
    }
}

impl Iterator for Segments<'_> {
    type Item = Statement;

    fn next(&mut self) -> Option<Statement> {
        loop {
            if let Some(statement) = self.ready.pop_front() {
                return Some(statement);
            }
            // end of input drops the unterminated remainder in `pending`
            let line = self.lines.next()?;
            self.take_line(line);
        }
    }
}
