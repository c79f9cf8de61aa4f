//! Splitting scraped bill text into sections.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AppError, Result};

// A line break followed by one or more whitespace-only lines. Runs of carriage
// returns belong to the boundary so no section keeps a trailing `\r`.
static BLANK_LINE_BOUNDARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\r*\n(?:[ \t\r]*\n)+").expect("Failed to compile blank line regex")
});

/// Splits `text` on blank-line boundaries, dropping whitespace-only sections and
/// sections that begin with the page-break `marker`.
///
/// Joining the output with `"\n\n"` and splitting it again yields the same sections.
pub fn split_sections<'a>(text: &'a str, marker: &str) -> Vec<&'a str> {
    BLANK_LINE_BOUNDARY
        .split(text)
        .filter(|section| !section.trim().is_empty())
        .filter(|section| !section.starts_with(marker))
        .collect()
}

/// Half-open range of section positions selected for summarization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkWindow {
    pub start: usize,
    pub end: usize,
}

impl ChunkWindow {
    pub fn new(start: usize, end: usize) -> Result<Self> {
        if start > end {
            return Err(AppError::ConfigError(format!(
                "Chunk window start ({}) is after its end ({})",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Selects the window from `items`, clamped to the available length.
    pub fn select<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let end = self.end.min(items.len());
        let start = self.start.min(end);
        &items[start..end]
    }
}
