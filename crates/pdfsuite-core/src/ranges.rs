//! Page-range algebra
//!
//! Parses human-entered range strings like `"1-3, 5, 8-10"` into validated
//! `PageRange` values and expands them into concrete zero-based page
//! indices or fixed-size chunk groupings. Parsing preserves input order and
//! keeps overlapping ranges verbatim; de-duplication is an explicit choice
//! made at expansion time, because range-mode splitting is allowed to emit
//! overlapping page groups as separate outputs.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("no page ranges given")]
    Empty,

    #[error("malformed range token {0:?}, expected \"N\" or \"N-M\"")]
    Malformed(String),

    #[error("page numbers must be 1 or greater, got {0:?}")]
    NonPositive(String),

    #[error("inverted range {start}-{end}")]
    Inverted { start: u32, end: u32 },

    #[error("range end {end} exceeds the document's {max_pages} pages")]
    ExceedsDocument { end: u32, max_pages: u32 },
}

/// A 1-based inclusive page range, validated against a page count at parse
/// time. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn page_count(&self) -> u32 {
        self.end - self.start + 1
    }
}

/// Parse a comma-separated range string against a document's page count.
///
/// Tokens are `"N"` or `"N-M"`. Empty tokens (stray commas, trailing comma)
/// are skipped; an input with no tokens at all is an error. Ranges come back
/// in input order, unmerged and undeduplicated.
pub fn parse_page_ranges(input: &str, max_pages: u32) -> Result<Vec<PageRange>, RangeError> {
    let mut ranges = Vec::new();

    for token in input.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        let (start, end) = match token.split_once('-') {
            Some((lhs, rhs)) => (
                parse_bound(lhs.trim(), token)?,
                parse_bound(rhs.trim(), token)?,
            ),
            None => {
                let page = parse_bound(token, token)?;
                (page, page)
            }
        };

        if start > end {
            return Err(RangeError::Inverted { start, end });
        }
        if end > max_pages {
            return Err(RangeError::ExceedsDocument { end, max_pages });
        }
        ranges.push(PageRange { start, end });
    }

    if ranges.is_empty() {
        return Err(RangeError::Empty);
    }
    Ok(ranges)
}

fn parse_bound(bound: &str, token: &str) -> Result<u32, RangeError> {
    if bound.is_empty() || !bound.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::Malformed(token.to_string()));
    }
    let value: u32 = bound
        .parse()
        .map_err(|_| RangeError::Malformed(token.to_string()))?;
    if value == 0 {
        return Err(RangeError::NonPositive(token.to_string()));
    }
    Ok(value)
}

/// Expand ranges into zero-based page indices, in range order.
///
/// With `dedupe`, an index already emitted is skipped and first-occurrence
/// order is preserved; without it, repeats are kept verbatim.
pub fn expand_page_indices(ranges: &[PageRange], dedupe: bool) -> Vec<u32> {
    let mut indices = Vec::new();
    let mut seen = HashSet::new();
    for range in ranges {
        for page in range.start..=range.end {
            let index = page - 1;
            if dedupe && !seen.insert(index) {
                continue;
            }
            indices.push(index);
        }
    }
    indices
}

/// Partition `0..page_count` into contiguous groups of `chunk_size` pages.
///
/// The final group holds the remainder. A zero chunk size or zero page
/// count yields no groups.
pub fn fixed_page_groups(page_count: u32, chunk_size: u32) -> Vec<Vec<u32>> {
    if chunk_size == 0 {
        return Vec::new();
    }
    (0..page_count)
        .collect::<Vec<_>>()
        .chunks(chunk_size as usize)
        .map(|chunk| chunk.to_vec())
        .collect()
}
