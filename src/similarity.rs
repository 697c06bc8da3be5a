//! Partial-ratio fuzzy matching
//!
//! The shorter string is aligned against every equally long window of the
//! longer one (plus the partial windows overhanging either end). Each window
//! gets the Indel similarity `1 - (m + n - 2 * lcs) / (m + n)`, where `lcs` is
//! the longest common subsequence, and the best one is reported as a
//! percentage.

use std::collections::HashMap;

/// Partial similarity of two strings in `[0, 100]`
///
/// Identical strings score 100. If either string is empty the score is 0.
pub fn partial_ratio(a: &str, b: &str) -> f32 {
    partial_ratio_with_cutoff(a, b, 0.0)
}

/// Like [`partial_ratio`], but reports 0 for any score below `cutoff`
///
/// Windows whose character counts already rule out reaching the cutoff (or
/// beating the best window so far) are skipped without computing their
/// common subsequence.
pub fn partial_ratio_with_cutoff(a: &str, b: &str, cutoff: f32) -> f32 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (needle, haystack) = if a_chars.len() <= b_chars.len() {
        (a_chars, b_chars)
    } else {
        (b_chars, a_chars)
    };

    let needle_len = needle.len();
    if needle_len == 0 {
        return 0.0;
    }

    let cutoff = (f64::from(cutoff) / 100.0).clamp(0.0, 1.0);
    let hay_len = haystack.len();
    let mut best = 0.0f64;

    // Signed count difference between the current window and the needle
    let mut diff: HashMap<char, i32> = HashMap::new();
    let mut distance = 0i32;
    for &c in &needle {
        adjust(&mut diff, &mut distance, c, -1);
    }
    for &c in &haystack[..needle_len] {
        adjust(&mut diff, &mut distance, c, 1);
    }

    for start in 0..=hay_len - needle_len {
        if start > 0 {
            adjust(&mut diff, &mut distance, haystack[start - 1], -1);
            adjust(&mut diff, &mut distance, haystack[start + needle_len - 1], 1);
        }

        // Every unmatched pair of characters costs one deletion and one insertion
        let bound = 1.0 - f64::from(distance) / (2 * needle_len) as f64;
        if below(bound, cutoff) || bound <= best {
            continue;
        }

        let score = indel_similarity(&needle, &haystack[start..start + needle_len]);
        if score > best {
            best = score;
            if best >= 1.0 {
                return 100.0;
            }
        }
    }

    // Partial windows overhanging the ends of the haystack
    for len in (1..needle_len.min(hay_len + 1)).rev() {
        let bound = (2 * len) as f64 / (needle_len + len) as f64;
        if below(bound, cutoff) || bound <= best {
            break;
        }
        let prefix = indel_similarity(&needle, &haystack[..len]);
        let suffix = indel_similarity(&needle, &haystack[hay_len - len..]);
        best = best.max(prefix).max(suffix);
    }

    if best < cutoff {
        return 0.0;
    }
    (best * 100.0) as f32
}

/// Normalized Indel similarity of two character slices
fn indel_similarity(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    (2 * lcs_len(a, b)) as f64 / total as f64
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut diagonal = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}

// Bounds are exact fractions; keep rounding from pruning a window that ties the cutoff
fn below(bound: f64, cutoff: f64) -> bool {
    bound + 1e-9 < cutoff
}

fn adjust(diff: &mut HashMap<char, i32>, distance: &mut i32, c: char, delta: i32) {
    let count = diff.entry(c).or_insert(0);
    let old = count.abs();
    *count += delta;
    *distance += count.abs() - old;
}
