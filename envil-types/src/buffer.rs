use serde::{Deserialize, Serialize};

/// A zero-based `(line, column)` position. Columns count chars, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct CursorPosition {
    pub line: usize,
    pub column: usize,
}

impl CursorPosition {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// An editor selection. `active` is where the cursor sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: CursorPosition,
    pub active: CursorPosition,
}

impl Selection {
    pub fn new(anchor: CursorPosition, active: CursorPosition) -> Self {
        Self { anchor, active }
    }

    /// A collapsed selection: just a cursor.
    pub fn caret(pos: CursorPosition) -> Self {
        Self { anchor: pos, active: pos }
    }

    pub fn is_empty(&self) -> bool {
        self.anchor == self.active
    }

    pub fn start(&self) -> CursorPosition {
        self.anchor.min(self.active)
    }

    pub fn end(&self) -> CursorPosition {
        self.anchor.max(self.active)
    }
}

/// Editor text as an ordered list of lines.
///
/// The dispatcher only ever reads a buffer; anything sent downstream is a copy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceBuffer {
    lines: Vec<String>,
}

impl SourceBuffer {
    /// Split on `\n`, dropping a trailing `\r` from each line.
    pub fn from_text(text: &str) -> Self {
        let lines = text
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
            .collect();
        Self { lines }
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(|s| s.as_str())
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|s| s.as_str())
    }

    /// True when the buffer holds no characters at all.
    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.is_empty())
    }

    /// The whole buffer, lines joined with `\n`.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Copy of the text from `start` (inclusive) to `end` (exclusive).
    ///
    /// Positions past the end of a line or buffer are clamped.
    pub fn text_between(&self, start: CursorPosition, end: CursorPosition) -> String {
        let (start, end) = (start.min(end), start.max(end));
        let last = match self.lines.len().checked_sub(1) {
            Some(l) => l,
            None => return String::new(),
        };
        if start.line > last {
            return String::new();
        }
        let end = if end.line > last {
            CursorPosition::new(last, usize::MAX)
        } else {
            end
        };

        let mut out = String::new();
        for index in start.line..=end.line {
            let line = &self.lines[index];
            let from = if index == start.line { start.column } else { 0 };
            let to = if index == end.line { end.column } else { usize::MAX };
            out.extend(line.chars().skip(from).take(to.saturating_sub(from)));
            if index != end.line {
                out.push('\n');
            }
        }
        out
    }

    pub fn selected_text(&self, selection: &Selection) -> String {
        self.text_between(selection.start(), selection.end())
    }
}

/// One complete, terminator-free unit of live code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Statement(String);

impl Statement {
    /// Trim surrounding whitespace; `None` if nothing is left.
    pub fn new(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A top-level parenthesis group, as an inclusive line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BracketRegion {
    pub start_line: usize,
    pub end_line: usize,
}

impl BracketRegion {
    pub fn new(start_line: usize, end_line: usize) -> Self {
        Self { start_line, end_line }
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }
}
