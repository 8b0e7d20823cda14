//! Occurrence indexing
//!
//! For each literal substring, the ascending list of every (possibly
//! overlapping) offset at which it occurs in a haystack. One table is built
//! over the raw text and one over the rendered text; these are the only source
//! of candidate anchors during alignment.

use std::collections::BTreeMap;
use std::ops::Range;

/// All start offsets of `needle` in `haystack`, overlapping matches included
pub fn substring_occurrences(haystack: &str, needle: &str) -> Vec<usize> {
    if needle.is_empty() {
        return Vec::new();
    }

    let mut offsets = Vec::new();
    let mut from = 0;
    while let Some(rel) = haystack.get(from..).and_then(|rest| rest.find(needle)) {
        let at = from + rel;
        offsets.push(at);
        from = at + haystack[at..].chars().next().map_or(1, char::len_utf8);
    }
    offsets
}

/// Literal text -> ascending offsets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OccurrenceTable {
    occurrences: BTreeMap<String, Vec<usize>>,
}

impl OccurrenceTable {
    /// Index every needle in `haystack`; needles without a match map to an empty list
    pub fn build<'a, I>(haystack: &str, needles: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut occurrences = BTreeMap::new();
        for needle in needles {
            if needle.is_empty() || occurrences.contains_key(needle) {
                continue;
            }
            occurrences.insert(needle.to_string(), substring_occurrences(haystack, needle));
        }
        Self { occurrences }
    }

    pub fn get(&self, needle: &str) -> &[usize] {
        self.occurrences
            .get(needle)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn count(&self, needle: &str) -> usize {
        self.get(needle).len()
    }

    /// Number of occurrences at or after `from`
    pub fn count_from(&self, needle: &str, from: usize) -> usize {
        let offsets = self.get(needle);
        offsets.len() - offsets.partition_point(|&at| at < from)
    }

    /// Earliest occurrence at or after `from`
    pub fn first_from(&self, needle: &str, from: usize) -> Option<usize> {
        let offsets = self.get(needle);
        offsets.get(offsets.partition_point(|&at| at < from)).copied()
    }

    pub fn contains_at(&self, needle: &str, at: usize) -> bool {
        self.get(needle).binary_search(&at).is_ok()
    }

    /// Restrict to occurrences lying wholly inside `range`
    pub fn within(&self, range: Range<usize>) -> Self {
        let occurrences = self
            .occurrences
            .iter()
            .map(|(needle, offsets)| {
                let kept = offsets
                    .iter()
                    .copied()
                    .filter(|&at| at >= range.start && at + needle.len() <= range.end)
                    .collect();
                (needle.clone(), kept)
            })
            .collect();
        Self { occurrences }
    }

    pub fn needles(&self) -> impl Iterator<Item = &str> {
        self.occurrences.keys().map(String::as_str)
    }

    /// Every (needle, offset) pair, ordered by offset and then by needle
    pub fn sorted_tuples(&self) -> Vec<(&str, usize)> {
        let mut tuples: Vec<(&str, usize)> = self
            .occurrences
            .iter()
            .flat_map(|(needle, offsets)| offsets.iter().map(move |&at| (needle.as_str(), at)))
            .collect();
        tuples.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        tuples
    }
}

impl FromIterator<(String, Vec<usize>)> for OccurrenceTable {
    fn from_iter<I: IntoIterator<Item = (String, Vec<usize>)>>(iter: I) -> Self {
        let occurrences = iter
            .into_iter()
            .map(|(needle, mut offsets)| {
                offsets.sort_unstable();
                offsets.dedup();
                (needle, offsets)
            })
            .collect();
        Self { occurrences }
    }
}
