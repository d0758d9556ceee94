//! Size ceilings for prompt sections.
//!
//! Every cut keeps a prefix, lands on a character boundary, and ends with a
//! single marker line saying how much was dropped. The marker is counted
//! against the limit, so a second pass with the same limit is a no-op.

use std::fmt;

const MARKER_OPEN: &str = "... (truncated ";
const MARKER_CLOSE: &str = ") ...";

/// The unit a limit is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// UTF-8 encoded length.
    Bytes,
    /// Unicode scalar values.
    Chars,
}

impl Unit {
    /// Length of `text` in this unit.
    pub fn measure(self, text: &str) -> usize {
        match self {
            Unit::Bytes => text.len(),
            Unit::Chars => text.chars().count(),
        }
    }

    /// Byte index of the longest prefix of `text` that is at most `n` units long.
    fn prefix_end(self, text: &str, n: usize) -> usize {
        match self {
            Unit::Bytes => {
                let mut end = n.min(text.len());
                while !text.is_char_boundary(end) {
                    end -= 1;
                }
                end
            }
            Unit::Chars => text.char_indices().nth(n).map_or(text.len(), |(i, _)| i),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Bytes => write!(f, "bytes"),
            Unit::Chars => write!(f, "chars"),
        }
    }
}

fn marker_line(detail: &str) -> String {
    format!("{MARKER_OPEN}{detail}{MARKER_CLOSE}")
}

fn is_marker_only(text: &str) -> bool {
    let line = text.trim_end_matches('\n');
    !line.contains('\n') && line.starts_with(MARKER_OPEN) && line.ends_with(MARKER_CLOSE)
}

fn close_with_marker(mut body: String, marker: &str) -> String {
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }
    body.push_str(marker);
    body.push('\n');
    body
}

/// Cap `text` at `limit` units.
///
/// Returns the possibly shortened text and whether a cut happened. The cut
/// prefers the last line break inside the kept prefix. When `limit` is too
/// small to hold even the marker, the result is the marker alone.
///
/// # Examples
///
/// ```
/// use coderev_core::truncate::{apply, Unit};
///
/// let (text, cut) = apply("short", 5, Unit::Bytes);
/// assert_eq!(text, "short");
/// assert!(!cut);
///
/// let long = "line one\nline two\n".repeat(20);
/// let (text, cut) = apply(&long, 100, Unit::Bytes);
/// assert!(cut);
/// assert!(text.len() <= 100);
/// assert!(text.trim_end().ends_with(") ..."));
/// ```
pub fn apply(text: &str, limit: usize, unit: Unit) -> (String, bool) {
    let total = unit.measure(text);
    if total <= limit || is_marker_only(text) {
        return (text.to_string(), false);
    }

    // Worst-case marker: dropping everything has the widest count.
    let widest = marker_line(&format!("{total} {unit}"));
    let reserve = widest.len() + 2;
    if limit <= reserve {
        return (close_with_marker(String::new(), &widest), true);
    }

    let end = unit.prefix_end(text, limit - reserve);
    let mut prefix = &text[..end];
    if let Some(nl) = prefix.rfind('\n') {
        prefix = &prefix[..=nl];
    }
    let dropped = total - unit.measure(prefix);
    let marker = marker_line(&format!("{dropped} {unit}"));
    (close_with_marker(prefix.to_string(), &marker), true)
}

/// Result of packing whole sections under one shared limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packed {
    /// Concatenated kept sections, followed by a marker line if any were dropped.
    pub text: String,
    /// Number of leading sections that fit.
    pub kept: usize,
    /// Number of trailing sections that were omitted.
    pub dropped: usize,
    /// Size of the omitted sections, in the limit's unit.
    pub dropped_units: usize,
}

impl Packed {
    /// Whether anything was omitted.
    pub fn truncated(&self) -> bool {
        self.dropped > 0
    }
}

/// A running counter against a fixed ceiling.
///
/// # Examples
///
/// ```
/// use coderev_core::truncate::{Budget, Unit};
///
/// let mut budget = Budget::new(10, Unit::Bytes);
/// assert!(budget.try_take("12345"));
/// assert!(!budget.try_take("123456"));
/// assert_eq!(budget.used(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct Budget {
    limit: usize,
    used: usize,
    unit: Unit,
}

impl Budget {
    /// Create an empty budget of `limit` units.
    pub fn new(limit: usize, unit: Unit) -> Self {
        Self {
            limit,
            used: 0,
            unit,
        }
    }

    /// Charge `text` against the budget if it fits entirely; otherwise leave it untouched.
    pub fn try_take(&mut self, text: &str) -> bool {
        let cost = self.unit.measure(text);
        if self.used + cost > self.limit {
            return false;
        }
        self.used += cost;
        true
    }

    /// Units consumed so far.
    pub fn used(&self) -> usize {
        self.used
    }
}

/// Concatenate `sections` in order, stopping at the first one that would
/// push the total past `limit`.
///
/// Sections are never split: everything from the first misfit onward is
/// dropped and replaced by one marker line naming how many `label`s and
/// units were omitted. The marker is included in the limit.
///
/// # Examples
///
/// ```
/// use coderev_core::truncate::{pack_whole, Unit};
///
/// let sections = vec!["a".repeat(40) + "\n", "b".repeat(40) + "\n", "c".repeat(40) + "\n"];
/// let packed = pack_whole(&sections, 120, Unit::Bytes, "files");
/// assert_eq!(packed.kept, 1);
/// assert_eq!(packed.dropped, 2);
/// assert!(packed.text.len() <= 120);
/// ```
pub fn pack_whole<S: AsRef<str>>(sections: &[S], limit: usize, unit: Unit, label: &str) -> Packed {
    let total: usize = sections.iter().map(|s| unit.measure(s.as_ref())).sum();
    if total <= limit {
        let text: String = sections.iter().map(|s| s.as_ref()).collect();
        return Packed {
            text,
            kept: sections.len(),
            dropped: 0,
            dropped_units: 0,
        };
    }

    let describe = |units: usize, count: usize| {
        marker_line(&format!("{units} {unit}: {count} more {label} omitted"))
    };
    let reserve = describe(total, sections.len()).len() + 2;
    let mut budget = Budget::new(limit.saturating_sub(reserve), unit);

    let mut text = String::new();
    let mut kept = 0;
    for section in sections {
        let section = section.as_ref();
        if !budget.try_take(section) {
            break;
        }
        text.push_str(section);
        kept += 1;
    }

    let dropped = sections.len() - kept;
    let dropped_units = total - budget.used();
    Packed {
        text: close_with_marker(text, &describe(dropped_units, dropped)),
        kept,
        dropped,
        dropped_units,
    }
}
