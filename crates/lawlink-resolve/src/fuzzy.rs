//! Approximate string matching over catalog keys.
//!
//! Similarity is the Ratcliff/Obershelp ratio `2·M / (|a| + |b|)`, where `M`
//! is the number of characters in matching blocks: the longest common
//! substring, then recursively the longest common substrings to its left and
//! right. It absorbs typos and pluralisation ("section 42o", "articles 21")
//! without any model.

use std::collections::HashMap;

/// Best fuzzy candidate for a key.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch {
    pub key: String,
    pub similarity: f32,
}

/// Similarity ratio in [0, 1]; two empty strings are identical (1.0).
pub fn similarity(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    ratio(&a, &b)
}

/// Highest-scoring candidate whose similarity is at least `cutoff`.
///
/// Equal scores resolve to the lexicographically smaller key, so the result
/// does not depend on candidate order.
pub fn best_match<'a>(
    key: &str,
    candidates: impl IntoIterator<Item = &'a str>,
    cutoff: f32,
) -> Option<FuzzyMatch> {
    let a: Vec<char> = key.chars().collect();
    let a_counts = char_counts(&a);
    let mut best: Option<FuzzyMatch> = None;

    for candidate in candidates {
        let b: Vec<char> = candidate.chars().collect();
        let floor = best
            .as_ref()
            .map_or(cutoff, |m| m.similarity.max(cutoff));

        // Upper bounds first; a bound equal to the floor can still win a tie.
        if length_bound(&a, &b) < floor || overlap_bound(&a_counts, &a, &b) < floor {
            continue;
        }
        let score = ratio(&a, &b);
        if score < cutoff {
            continue;
        }
        let better = match &best {
            None => true,
            Some(m) => score > m.similarity || (score == m.similarity && candidate < m.key.as_str()),
        };
        if better {
            best = Some(FuzzyMatch {
                key: candidate.to_string(),
                similarity: score,
            });
        }
    }

    best
}

fn ratio_of(matches: usize, a_len: usize, b_len: usize) -> f32 {
    let total = a_len + b_len;
    if total == 0 {
        1.0
    } else {
        2.0 * matches as f32 / total as f32
    }
}

fn ratio(a: &[char], b: &[char]) -> f32 {
    ratio_of(matching_chars(a, b), a.len(), b.len())
}

/// Bound from lengths alone: at most `min(|a|, |b|)` characters can match.
fn length_bound(a: &[char], b: &[char]) -> f32 {
    ratio_of(a.len().min(b.len()), a.len(), b.len())
}

/// Bound from shared character multiset, ignoring order.
fn overlap_bound(a_counts: &HashMap<char, usize>, a: &[char], b: &[char]) -> f32 {
    let mut avail = a_counts.clone();
    let mut shared = 0;
    for c in b {
        if let Some(n) = avail.get_mut(c).filter(|n| **n > 0) {
            *n -= 1;
            shared += 1;
        }
    }
    ratio_of(shared, a.len(), b.len())
}

fn char_counts(s: &[char]) -> HashMap<char, usize> {
    let mut counts = HashMap::new();
    for &c in s {
        *counts.entry(c).or_insert(0) += 1;
    }
    counts
}

/// Total length of the matching blocks between `a` and `b`.
fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut total = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        total += k;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }
    total
}

/// Longest common substring of `a[alo..ahi]` and `b[blo..bhi]`, as
/// `(start in a, start in b, length)`. Ties keep the earliest start in `a`,
/// then in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let mut best = (alo, blo, 0);
    let width = bhi - blo;
    // prev[x] / curr[x]: length of the common suffix ending at a[i], b[blo + x - 1].
    let mut prev = vec![0usize; width + 1];
    let mut curr = vec![0usize; width + 1];

    for i in alo..ahi {
        for j in blo..bhi {
            let x = j - blo + 1;
            if a[i] == b[j] {
                let k = prev[x - 1] + 1;
                curr[x] = k;
                if k > best.2 {
                    best = (i + 1 - k, j + 1 - k, k);
                }
            } else {
                curr[x] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    best
}
