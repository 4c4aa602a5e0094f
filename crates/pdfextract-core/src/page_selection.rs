//! Page-range selection strings such as `"1, 3-5,8-10"`.
//!
//! Whitespace is allowed at either end and around commas. It is not allowed
//! inside a number or around the range dash, so `"1 - 5"` is rejected.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static SELECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+(?:-\d+)?(?:\s*,\s*\d+(?:-\d+)?)*\s*$").unwrap());

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageSelectionError {
    #[error("Invalid page selection format")]
    Format,
    #[error("Page numbers must be ≥ 1: {0}")]
    PageZero(String),
    #[error("Invalid range in page selection: {0} (start > end)")]
    InvalidRange(String),
}

/// A set of 1-based page numbers. Empty means "all pages".
///
/// Stored as sorted, non-overlapping, non-adjacent inclusive ranges so that a
/// selection like `1-1000000` stays small.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSelection {
    ranges: Vec<RangeInclusive<u32>>,
}

impl PageSelection {
    /// The empty selection, which matches every page.
    pub fn all() -> Self {
        Self::default()
    }

    /// True when no filter is applied.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// True if `page` passes the filter. Every page passes an empty selection.
    pub fn contains(&self, page: u32) -> bool {
        if self.ranges.is_empty() {
            return true;
        }
        self.ranges
            .binary_search_by(|r| {
                if *r.end() < page {
                    std::cmp::Ordering::Less
                } else if *r.start() > page {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    /// Selected pages in ascending order, without duplicates.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(|r| r.clone())
    }

    /// Restrict 1-based pages `1..=page_count` to this selection.
    ///
    /// Selected pages beyond `page_count` are dropped without error.
    pub fn filter_pages(&self, page_count: u32) -> Vec<u32> {
        (1..=page_count).filter(|p| self.contains(*p)).collect()
    }

    fn from_ranges(mut ranges: Vec<RangeInclusive<u32>>) -> Self {
        ranges.sort_by_key(|r| *r.start());
        let mut merged: Vec<RangeInclusive<u32>> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if *range.start() <= last.end().saturating_add(1) => {
                    if range.end() > last.end() {
                        *last = *last.start()..=*range.end();
                    }
                }
                _ => merged.push(range),
            }
        }
        Self { ranges: merged }
    }
}

/// Validates, then parses. Empty input is a format error here.
impl FromStr for PageSelection {
    type Err = PageSelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate(s)?;
        parse(s)
    }
}

impl fmt::Display for PageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if range.start() == range.end() {
                write!(f, "{}", range.start())?;
            } else {
                write!(f, "{}-{}", range.start(), range.end())?;
            }
        }
        Ok(())
    }
}

/// Check the syntax and bounds of a page selection string.
///
/// An empty string is not valid here; callers treat empty input as "all
/// pages" before validating.
pub fn validate(spec: &str) -> Result<(), PageSelectionError> {
    if !SELECTION_RE.is_match(spec) {
        return Err(PageSelectionError::Format);
    }
    for segment in segments(spec) {
        let (start, end) = parse_segment(segment)?;
        if start == 0 || end == 0 {
            return Err(PageSelectionError::PageZero(zero_context(segment)));
        }
        if start > end {
            return Err(PageSelectionError::InvalidRange(segment.to_string()));
        }
    }
    Ok(())
}

/// Expand a page selection string into a [`PageSelection`].
///
/// Empty or whitespace-only input yields the empty selection. The format is
/// assumed to have passed [`validate`], but reversed ranges and zero pages are
/// still rejected here.
pub fn parse(spec: &str) -> Result<PageSelection, PageSelectionError> {
    if spec.trim().is_empty() {
        return Ok(PageSelection::all());
    }
    let mut ranges = Vec::new();
    for segment in segments(spec) {
        let (start, end) = parse_segment(segment)?;
        if start == 0 || end == 0 {
            return Err(PageSelectionError::PageZero(zero_context(segment)));
        }
        if start > end {
            return Err(PageSelectionError::InvalidRange(segment.to_string()));
        }
        ranges.push(start..=end);
    }
    Ok(PageSelection::from_ranges(ranges))
}

fn segments(spec: &str) -> impl Iterator<Item = &str> {
    spec.trim().split(',').map(str::trim)
}

fn parse_segment(segment: &str) -> Result<(u32, u32), PageSelectionError> {
    let number = |s: &str| s.parse::<u32>().map_err(|_| PageSelectionError::Format);
    match segment.split_once('-') {
        Some((start, end)) => Ok((number(start)?, number(end)?)),
        None => {
            let page = number(segment)?;
            Ok((page, page))
        }
    }
}

/// Single pages report the number, ranges report the whole segment.
fn zero_context(segment: &str) -> String {
    match segment.parse::<u32>() {
        Ok(page) => page.to_string(),
        Err(_) => segment.to_string(),
    }
}
