use crate::unicode;

/// A single inclusive code point range in a character class.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct CharRange {
    pub(crate) min: char,
    pub(crate) max: char,
}

impl CharRange {
    pub(crate) fn single(ch: char) -> CharRange {
        CharRange { min: ch, max: ch }
    }
}

/// A named character category backed by the standard library's `char`
/// classification methods.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Ctype {
    Digit,
    Alnum,
    Space,
}

impl Ctype {
    pub(crate) fn is_match(self, ch: char) -> bool {
        match self {
            Ctype::Digit => ch.is_ascii_digit(),
            Ctype::Alnum => ch.is_alphanumeric(),
            Ctype::Space => ch.is_whitespace(),
        }
    }
}

/// A character-set predicate produced from a character class or a class
/// escape: a sorted range table searched by bisection, category
/// predicates with their expected membership, an exclusion list, and an
/// outer negation.
#[derive(Clone, Debug)]
pub(crate) struct CharMatcher {
    /// Sorted by `min`, non-overlapping and non-adjacent after
    /// normalization.
    pub(crate) ranges: Vec<CharRange>,
    /// Each entry is satisfied when the category test result equals the
    /// stored flag.
    pub(crate) ctypes: Vec<(Ctype, bool)>,
    /// When non-empty, any code point *not* in this list counts as a hit.
    pub(crate) excluded: Vec<char>,
    pub(crate) negate: bool,
    pub(crate) ignore_case: bool,
}

impl CharMatcher {
    pub(crate) fn is_match(&self, ch: char) -> bool {
        let ch = if self.ignore_case { unicode::to_lower(ch) } else { ch };
        let found = self.in_ranges(ch)
            || self.ctypes.iter().any(|&(ctype, expected)| ctype.is_match(ch) == expected)
            || (!self.excluded.is_empty() && !self.excluded.contains(&ch));
        found != self.negate
    }

    fn in_ranges(&self, ch: char) -> bool {
        use core::cmp::Ordering;

        self.ranges
            .binary_search_by(|range| {
                if range.max < ch {
                    Ordering::Less
                } else if range.min > ch {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                }
            })
            .is_ok()
    }
}

/// Sorts ranges by their lower bound and merges overlapping or adjacent
/// ranges in place.
pub(crate) fn normalize_ranges(ranges: &mut Vec<CharRange>) {
    if ranges.is_empty() {
        return;
    }
    ranges.sort_by_key(|range| range.min);
    let mut merged = 0;
    for i in 1..ranges.len() {
        let cur = ranges[i];
        let prev = &mut ranges[merged];
        if u32::from(prev.max) + 1 >= u32::from(cur.min) {
            if cur.max > prev.max {
                prev.max = cur.max;
            }
        } else {
            merged += 1;
            ranges[merged] = cur;
        }
    }
    ranges.truncate(merged + 1);
}
