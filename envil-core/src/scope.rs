//! Lexical scope classification for sclang source.
//!
//! Region extraction only needs to know whether a bracket sits in code or
//! inside a comment or literal. [`SclangScopes`] answers that with a small
//! single-pass tokenizer; other oracles can be plugged in through the trait.

use std::fmt;

use envil_types::{CursorPosition, ScopeLabel, ScopeStack, SourceBuffer};

/// Scope classification could not be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleError(pub String);

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for OracleError {}

/// Scope stacks for every character of a buffer, indexed by line then column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeMap {
    lines: Vec<Vec<ScopeStack>>,
}

impl ScopeMap {
    pub fn from_lines(lines: Vec<Vec<ScopeStack>>) -> Self {
        Self { lines }
    }

    pub fn at(&self, pos: CursorPosition) -> Option<&ScopeStack> {
        self.lines.get(pos.line)?.get(pos.column)
    }

    pub fn line(&self, index: usize) -> &[ScopeStack] {
        self.lines.get(index).map(|l| l.as_slice()).unwrap_or(&[])
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

pub trait ScopeOracle: Send {
    /// Scopes of the character at `pos`.
    fn classify(&self, buffer: &SourceBuffer, pos: CursorPosition)
        -> Result<ScopeStack, OracleError>;

    /// Scopes of every character in the buffer.
    fn classify_buffer(&self, buffer: &SourceBuffer) -> Result<ScopeMap, OracleError> {
        let mut lines = Vec::with_capacity(buffer.line_count());
        for (index, line) in buffer.lines().enumerate() {
            let row = (0..line.chars().count())
                .map(|column| self.classify(buffer, CursorPosition::new(index, column)))
                .collect::<Result<Vec<_>, _>>()?;
            lines.push(row);
        }
        Ok(ScopeMap::from_lines(lines))
    }
}

/// Tokenizer state carried from one line to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    Code,
    /// Inside `/* */`, with the nesting depth.
    Block(usize),
    Str,
}

/// Embedded sclang tokenizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SclangScopes;

impl SclangScopes {
    pub fn new() -> Self {
        Self
    }

    fn scan_line(line: &str, state: &mut Lex) -> Vec<ScopeStack> {
        let chars: Vec<char> = line.chars().collect();
        let len = chars.len();
        let mut out = Vec::with_capacity(len);
        let mut i = 0;

        let code = ScopeStack::code();
        let block = ScopeStack::nested(ScopeLabel::BLOCK_COMMENT);
        let string = ScopeStack::nested(ScopeLabel::STRING);
        let symbol = ScopeStack::nested(ScopeLabel::SYMBOL);
        let escape = ScopeStack::nested(ScopeLabel::CHAR_ESCAPE);

        while i < len {
            let c = chars[i];
            let next = chars.get(i + 1).copied();
            match *state {
                Lex::Block(depth) => {
                    if c == '*' && next == Some('/') {
                        out.push(block.clone());
                        out.push(block.clone());
                        i += 2;
                        *state = if depth <= 1 { Lex::Code } else { Lex::Block(depth - 1) };
                    } else if c == '/' && next == Some('*') {
                        out.push(block.clone());
                        out.push(block.clone());
                        i += 2;
                        *state = Lex::Block(depth + 1);
                    } else {
                        out.push(block.clone());
                        i += 1;
                    }
                }
                Lex::Str => {
                    if c == '\\' {
                        out.push(escape.clone());
                        if next.is_some() {
                            out.push(escape.clone());
                            i += 2;
                        } else {
                            i += 1;
                        }
                    } else {
                        out.push(string.clone());
                        if c == '"' {
                            *state = Lex::Code;
                        }
                        i += 1;
                    }
                }
                Lex::Code => match c {
                    '/' if next == Some('/') => {
                        let comment = ScopeStack::nested(ScopeLabel::LINE_COMMENT);
                        out.extend(std::iter::repeat(comment).take(len - i));
                        i = len;
                    }
                    '/' if next == Some('*') => {
                        out.push(block.clone());
                        out.push(block.clone());
                        i += 2;
                        *state = Lex::Block(1);
                    }
                    '"' => {
                        out.push(string.clone());
                        i += 1;
                        *state = Lex::Str;
                    }
                    '\'' => {
                        // quoted symbols end at the closing quote or the line
                        out.push(symbol.clone());
                        i += 1;
                        while i < len {
                            let s = chars[i];
                            out.push(symbol.clone());
                            i += 1;
                            if s == '\\' && i < len {
                                out.push(symbol.clone());
                                i += 1;
                            } else if s == '\'' {
                                break;
                            }
                        }
                    }
                    '\\' if next.map_or(false, |n| n.is_alphabetic() || n == '_') => {
                        out.push(symbol.clone());
                        i += 1;
                        while i < len && (chars[i].is_alphanumeric() || chars[i] == '_') {
                            out.push(symbol.clone());
                            i += 1;
                        }
                    }
                    '$' if next.is_some() => {
                        out.push(escape.clone());
                        out.push(escape.clone());
                        i += 2;
                        if next == Some('\\') && i < len {
                            out.push(escape.clone());
                            i += 1;
                        }
                    }
                    _ => {
                        out.push(code.clone());
                        i += 1;
                    }
                },
            }
        }
        out
    }
}

impl ScopeOracle for SclangScopes {
    fn classify(
        &self,
        buffer: &SourceBuffer,
        pos: CursorPosition,
    ) -> Result<ScopeStack, OracleError> {
        let mut state = Lex::Code;
        for (index, line) in buffer.lines().enumerate() {
            let row = Self::scan_line(line, &mut state);
            if index == pos.line {
                return row.get(pos.column).cloned().ok_or_else(|| {
                    OracleError(format!("column {} is past the end of line {}", pos.column, pos.line))
                });
            }
        }
        Err(OracleError(format!("line {} is past the end of the buffer", pos.line)))
    }

    fn classify_buffer(&self, buffer: &SourceBuffer) -> Result<ScopeMap, OracleError> {
        let mut state = Lex::Code;
        let lines = buffer
            .lines()
            .map(|line| Self::scan_line(line, &mut state))
            .collect();
        Ok(ScopeMap::from_lines(lines))
    }
}
