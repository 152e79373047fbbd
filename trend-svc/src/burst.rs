//! Burst ("hot keyword") detection
//!
//! A keyword is hot when its recent-window score reaches `ratio` times its
//! preceding-window score. A keyword with no preceding score is never hot: it
//! has to persist into at least one earlier window first.

use std::collections::BTreeSet;

use crate::window::WindowScore;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurstDetector {
    ratio: f64,
}

impl BurstDetector {
    /// `ratio` must be positive and finite; config validation guarantees this
    pub fn new(ratio: f64) -> Self {
        Self { ratio }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn is_hot(&self, recent: u64, past: u64) -> bool {
        past > 0 && recent as f64 >= self.ratio * past as f64
    }

    /// Hot keywords in `recent` relative to `past`
    ///
    /// Pure: the same two inputs always give the same set.
    pub fn detect(&self, recent: &WindowScore, past: &WindowScore) -> BTreeSet<String> {
        recent
            .iter()
            .filter(|(keyword, score)| self.is_hot(**score, past.get(keyword.as_str()).copied().unwrap_or(0)))
            .map(|(keyword, _)| keyword.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(entries: &[(&str, u64)]) -> WindowScore {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_identical_windows_have_no_bursts() {
        let window = scores(&[("a", 10), ("b", 1), ("c", 999)]);
        assert!(BurstDetector::new(3.0).detect(&window, &window).is_empty());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let detector = BurstDetector::new(3.0);
        let recent = scores(&[("exact", 30), ("below", 29), ("above", 31)]);
        let past = scores(&[("exact", 10), ("below", 10), ("above", 10)]);

        let hot = detector.detect(&recent, &past);
        assert_eq!(hot.into_iter().collect::<Vec<_>>(), vec!["above", "exact"]);
    }

    #[test]
    fn test_new_keyword_is_never_hot() {
        let detector = BurstDetector::new(3.0);
        let recent = scores(&[("fresh", 1_000_000)]);
        assert!(detector.detect(&recent, &WindowScore::new()).is_empty());

        let past = scores(&[("fresh", 0)]);
        assert!(detector.detect(&recent, &past).is_empty());
    }

    #[test]
    fn test_detect_is_idempotent() {
        let detector = BurstDetector::new(2.0);
        let recent = scores(&[("a", 10), ("b", 4), ("c", 7)]);
        let past = scores(&[("a", 2), ("b", 4), ("c", 3)]);
        assert_eq!(detector.detect(&recent, &past), detector.detect(&recent, &past));
    }

    #[test]
    fn test_only_recent_keywords_are_considered() {
        let detector = BurstDetector::new(3.0);
        let past = scores(&[("gone", 10)]);
        assert!(detector.detect(&WindowScore::new(), &past).is_empty());
    }
}
