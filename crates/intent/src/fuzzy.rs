//! Normalized edit similarity.
//!
//! `similarity(a, b) = 2 * lcs(a, b) / (len(a) + len(b))` over characters,
//! which equals `1 - indel_distance / (len(a) + len(b))`. A single dropped
//! or swapped vowel in a long word stays well above 0.75.

/// Similarity ratio in `[0, 1]`; 1.0 for identical strings.
pub fn similarity(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    (2 * lcs_len(&a, &b)) as f32 / total as f32
}

/// Longest common subsequence, two-row dynamic programming.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_is_one() {
        assert!((similarity("бронь", "бронь") - 1.0).abs() < f32::EPSILON);
        assert!((similarity("", "") - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn disjoint_is_zero() {
        assert_eq!(similarity("abcd", "wxyz"), 0.0);
        assert_eq!(similarity("abcd", ""), 0.0);
    }

    #[test]
    fn misspelled_booking_clears_threshold() {
        // lcs("забраниров", "забронировать") = 9 → 18 / 23
        let ratio = similarity("забраниров", "забронировать");
        assert!(ratio >= 0.75, "ratio {ratio}");
        assert!((ratio - 18.0 / 23.0).abs() < 1e-6);
    }

    #[test]
    fn symmetric() {
        assert_eq!(similarity("меню", "менюшка"), similarity("менюшка", "меню"));
    }

    #[test]
    fn unrelated_words_stay_low() {
        assert!(similarity("привет", "парковка") < 0.75);
        assert!(similarity("спасибо", "скидка") < 0.75);
    }
}
