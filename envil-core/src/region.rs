//! Top-level parenthesis regions in sclang source.

use std::fmt;

use envil_types::{BracketRegion, CursorPosition, DispatchError, SourceBuffer};

use crate::scope::{OracleError, ScopeMap, ScopeOracle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionError {
    OracleUnavailable(String),
}

impl From<OracleError> for RegionError {
    fn from(e: OracleError) -> Self {
        Self::OracleUnavailable(e.0)
    }
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OracleUnavailable(e) => write!(f, "scope classification unavailable: {}", e),
        }
    }
}

impl std::error::Error for RegionError {}

impl From<RegionError> for DispatchError {
    fn from(e: RegionError) -> Self {
        match e {
            RegionError::OracleUnavailable(e) => DispatchError::OracleUnavailable(e),
        }
    }
}

/// Every balanced top-level `( ... )` group, in source order.
///
/// Brackets in comments and literals are skipped. A stray `)` at depth zero is
/// ignored, and a group that never closes produces no region.
pub fn find_regions(buffer: &SourceBuffer, scopes: &ScopeMap) -> Vec<BracketRegion> {
    let mut regions = Vec::new();
    let mut depth: usize = 0;
    let mut start_line = 0;

    for (line_index, line) in buffer.lines().enumerate() {
        for (column, c) in line.chars().enumerate() {
            if c != '(' && c != ')' {
                continue;
            }
            let significant = scopes
                .at(CursorPosition::new(line_index, column))
                .map_or(true, |stack| stack.is_significant());
            if !significant {
                continue;
            }

            if c == '(' {
                if depth == 0 {
                    start_line = line_index;
                }
                depth += 1;
            } else if depth > 0 {
                depth -= 1;
                if depth == 0 {
                    regions.push(BracketRegion::new(start_line, line_index));
                }
            }
        }
    }
    regions
}

/// The top-level region whose lines contain the cursor, if any.
pub fn extract_region<O: ScopeOracle + ?Sized>(
    buffer: &SourceBuffer,
    cursor: CursorPosition,
    oracle: &O,
) -> Result<Option<BracketRegion>, RegionError> {
    let scopes = oracle.classify_buffer(buffer)?;
    let region = find_regions(buffer, &scopes)
        .into_iter()
        .find(|r| r.contains_line(cursor.line));
    Ok(region)
}

/// Whole lines of the region, from column 0 of the first through the end of the last.
pub fn region_text(buffer: &SourceBuffer, region: &BracketRegion) -> String {
    buffer.text_between(
        CursorPosition::new(region.start_line, 0),
        CursorPosition::new(region.end_line, usize::MAX),
    )
}
