//! Primary/fallback selection.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::health::{EndpointStats, Selection};
use crate::ranking::QualityScore;

/// Orders eligible endpoints and picks the primary.
pub struct RankingPolicy<S> {
    scorer: Arc<dyn QualityScore<S>>,
    /// Score slack granted to the current primary.
    tolerance: f64,
}

impl<S> Clone for RankingPolicy<S> {
    fn clone(&self) -> Self {
        Self {
            scorer: self.scorer.clone(),
            tolerance: self.tolerance,
        }
    }
}

struct Candidate<'a, S> {
    stats: &'a EndpointStats<S>,
    position: usize,
    failures: usize,
    score: Option<f64>,
}

fn compare_scores(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl<S> RankingPolicy<S> {
    pub fn new(scorer: Arc<dyn QualityScore<S>>, tolerance: f64) -> Self {
        Self { scorer, tolerance }
    }

    /// Rank `stats` (in configuration order).
    ///
    /// Returns `None` when every endpoint is banned.
    pub fn rank(&self, stats: &[EndpointStats<S>], current_primary: Option<&str>) -> Option<Selection> {
        let eligible: Vec<&EndpointStats<S>> = stats.iter().filter(|s| !s.is_banned()).collect();
        if eligible.is_empty() {
            return None;
        }

        let mut candidates: Vec<Candidate<'_, S>> = stats
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_banned())
            .map(|(position, s)| Candidate {
                stats: s,
                position,
                failures: s.recent_failures(),
                score: self.scorer.score(s, &eligible),
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.failures
                .cmp(&b.failures)
                .then_with(|| compare_scores(a.score, b.score))
                .then_with(|| a.position.cmp(&b.position))
        });

        let top = &candidates[0];
        let kept = current_primary.and_then(|current| {
            candidates
                .iter()
                .position(|c| c.stats.endpoint() == current)
                .filter(|&idx| self.within_tolerance(&candidates[idx], top))
        });
        let primary_idx = kept.unwrap_or(0);

        let primary = candidates[primary_idx].stats.endpoint().to_string();
        let fallbacks = candidates
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != primary_idx)
            .map(|(_, c)| c.stats.endpoint().to_string())
            .collect();

        Some(Selection { primary, fallbacks })
    }

    /// Whether `current` is close enough to `top` to stay primary.
    fn within_tolerance(&self, current: &Candidate<'_, S>, top: &Candidate<'_, S>) -> bool {
        if current.failures > top.failures {
            return false;
        }
        match (current.score, top.score) {
            (Some(current), Some(top)) => current - top <= self.tolerance,
            (None, None) => true,
            // Scored endpoints beat unscored ones.
            (None, Some(_)) => false,
            (Some(_), None) => true,
        }
    }
}
