//! Divergence detection
//!
//! Positional, line-by-line comparison of the reference document against an
//! incoming snapshot. Line `i` of one text is only ever compared with line
//! `i` of the other, so an inserted or deleted line shows up as divergence
//! on every line after it. Columns count Unicode scalar values.

use serde::Serialize;

/// Region of the reference document that differs from the incoming text
///
/// Spans `start..end` on `line`; `end` is always the length of the
/// reference line, so the range may be empty when the incoming line only
/// adds text past the end of the reference line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DivergenceRange {
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

impl DivergenceRange {
    pub fn new(line: usize, start: usize, end: usize) -> Self {
        Self { line, start, end }
    }

    /// Number of highlighted columns
    pub fn width(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

/// Ordered divergence ranges for one comparison, at most one per line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HighlightSet {
    ranges: Vec<DivergenceRange>,
}

impl HighlightSet {
    pub fn ranges(&self) -> &[DivergenceRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DivergenceRange> {
        self.ranges.iter()
    }
}

impl From<Vec<DivergenceRange>> for HighlightSet {
    fn from(ranges: Vec<DivergenceRange>) -> Self {
        Self { ranges }
    }
}

impl IntoIterator for HighlightSet {
    type Item = DivergenceRange;
    type IntoIter = std::vec::IntoIter<DivergenceRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.into_iter()
    }
}

impl<'a> IntoIterator for &'a HighlightSet {
    type Item = &'a DivergenceRange;
    type IntoIter = std::slice::Iter<'a, DivergenceRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

/// Split text into lines, treating `\r\n` and `\n` alike
///
/// A trailing newline yields a trailing empty line, the way an editor shows
/// one, and empty text is a single empty line.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect()
}

/// Compare two texts, bounding the result to the reference's lines
pub fn compare(reference: &str, incoming: &str) -> HighlightSet {
    let reference = split_lines(reference);
    let incoming = split_lines(incoming);
    compare_lines(&reference, &incoming, reference.len())
}

/// Compare two line sequences
///
/// Lines at or past `line_bound` are skipped; pass the line count of the
/// document the ranges will be drawn on.
pub fn compare_lines<R, I>(reference: &[R], incoming: &[I], line_bound: usize) -> HighlightSet
where
    R: AsRef<str>,
    I: AsRef<str>,
{
    let max_lines = reference.len().max(incoming.len()).min(line_bound);

    (0..max_lines)
        .filter_map(|i| {
            let ref_line = reference.get(i).map(AsRef::<str>::as_ref).unwrap_or("");
            let typed_line = incoming.get(i).map(AsRef::<str>::as_ref).unwrap_or("");
            line_divergence(i, ref_line, typed_line)
        })
        .collect::<Vec<_>>()
        .into()
}

fn line_divergence(line: usize, ref_line: &str, typed_line: &str) -> Option<DivergenceRange> {
    let diff_index = ref_line
        .chars()
        .zip(typed_line.chars())
        .take_while(|(a, b)| a == b)
        .count();
    let ref_len = ref_line.chars().count();
    let typed_len = typed_line.chars().count();

    if diff_index < ref_len.min(typed_len) || ref_len != typed_len {
        Some(DivergenceRange::new(line, diff_index, ref_len))
    } else {
        None
    }
}
