//! Relevance ranking of matched candidates.
//!
//! The final score is a weighted sum of five features, each normalized to
//! [0, 1]: the matcher's name score, its path score, an access-count
//! feature `1 − 1/(1+n)`, an exponential recentness decay with a 30-day
//! time constant, and a size feature rewarding typical content sizes.
//! Ties are broken by ascending path length, then lexicographic path.

use crate::types::{FileRecord, RankingConfig, SearchHit};
use std::cmp::Ordering;

/// Recentness time constant: 30 days in seconds.
const RECENTNESS_TAU_SECS: f64 = 30.0 * 24.0 * 3600.0;

/// Size window considered "typical content".
const SIZE_SCORE_MIN: u64 = 1024;
const SIZE_SCORE_MAX: u64 = 100 * 1024 * 1024;

pub struct Ranker {
    config: RankingConfig,
    now: i64,
}

impl Ranker {
    /// Build a ranker from weights; degenerate weights fall back to the
    /// defaults during normalization.
    pub fn new(config: RankingConfig) -> Self {
        Ranker {
            config: config.normalized(),
            now: chrono::Utc::now().timestamp(),
        }
    }

    #[cfg(test)]
    fn at(config: RankingConfig, now: i64) -> Self {
        Ranker {
            config: config.normalized(),
            now,
        }
    }

    /// Combine the matcher scores with the record features.
    pub fn score(&self, record: &FileRecord, name_score: f64, path_score: f64) -> f64 {
        let access_score = 1.0 - 1.0 / (1.0 + record.access_count as f64);
        let age = (self.now - record.mtime).max(0) as f64;
        let recentness_score = (-age / RECENTNESS_TAU_SECS).exp();
        let size_score = if record.size >= SIZE_SCORE_MIN && record.size <= SIZE_SCORE_MAX {
            0.5
        } else {
            0.0
        };

        self.config.name_weight * name_score.clamp(0.0, 1.0)
            + self.config.path_weight * path_score.clamp(0.0, 1.0)
            + self.config.access_count_weight * access_score
            + self.config.recentness_weight * recentness_score
            + self.config.size_weight * size_score
    }

    /// Ordering for ranked hits: score descending, then shorter path,
    /// then lexicographic path.
    pub fn compare(a: &SearchHit, b: &SearchHit) -> Ordering {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.record.full_path.len().cmp(&b.record.full_path.len()))
            .then_with(|| a.record.full_path.cmp(&b.record.full_path))
    }
}
