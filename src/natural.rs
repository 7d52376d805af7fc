//! Natural ("human") ordering for file and folder names.
//!
//! `frame2.png` sorts before `frame10.png`; case is ignored for text runs.

use std::cmp::Ordering;

/// One run of a split name: text runs and digit runs alternate, starting
/// with a (possibly empty) text run.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    /// Digits with leading zeros stripped, so that length then lexical order
    /// equals numeric order without parsing into a bounded integer.
    Number(String),
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
            (Segment::Number(a), Segment::Number(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Segment::Number(_), Segment::Text(_)) => Ordering::Less,
            (Segment::Text(_), Segment::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Composite sort key; compares element-wise like a list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct NaturalKey(Vec<Segment>);

impl NaturalKey {
    pub fn new(text: &str) -> Self {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut in_digits = false;

        for ch in text.chars() {
            let digit = ch.is_ascii_digit();
            if digit != in_digits {
                segments.push(Self::finish(std::mem::take(&mut current), in_digits));
                in_digits = digit;
            }
            current.push(ch);
        }
        segments.push(Self::finish(current, in_digits));

        Self(segments)
    }

    fn finish(run: String, digits: bool) -> Segment {
        if digits {
            let trimmed = run.trim_start_matches('0');
            Segment::Number(trimmed.to_string())
        } else {
            Segment::Text(run.to_lowercase())
        }
    }
}

/// Natural comparison of two strings.
pub fn compare(a: &str, b: &str) -> Ordering {
    NaturalKey::new(a).cmp(&NaturalKey::new(b))
}

/// Sort `items` in place by the natural order of the string `key` extracts.
pub fn sort_by_key<T, F>(items: &mut [T], mut key: F)
where
    F: FnMut(&T) -> &str,
{
    items.sort_by_cached_key(|item| NaturalKey::new(key(item)));
}
