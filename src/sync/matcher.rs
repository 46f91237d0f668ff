//! Cross-catalog track matching.
//!
//! There is no global ID scheme linking the two platforms, so matching is
//! fuzzy by nature: candidates get an explicit confidence score against a
//! tunable threshold rather than a yes/no answer.

use crate::config::SyncSettings;
use crate::error::CatalogError;
use crate::ports::catalog::{CatalogSource, RawTrack, Track};
use crate::sync::normalize::{NormalizedKey, normalize_raw};
use crate::sync::retry::with_retries;

const TITLE_WEIGHT: f64 = 0.6;
const ARTIST_WEIGHT: f64 = 0.3;
const DURATION_WEIGHT: f64 = 0.1;

/// Hard cap on search results per lookup, regardless of configuration.
const MAX_SEARCH_LIMIT: usize = 10;

/// A scored destination-platform candidate for one source track.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub destination_id: String,
    /// 0.0–1.0 estimate that this is the same recording.
    pub confidence: f64,
    /// Snapshot of the matched destination track.
    pub matched: RawTrack,
}

pub struct CatalogMatcher {
    search_limit: usize,
    threshold: f64,
    call_timeout: std::time::Duration,
    max_retries: usize,
}

impl CatalogMatcher {
    pub fn new(settings: &SyncSettings) -> Self {
        Self {
            search_limit: settings.search_limit.clamp(1, MAX_SEARCH_LIMIT),
            threshold: settings.match_threshold,
            call_timeout: settings.call_timeout(),
            max_retries: settings.max_add_retries,
        }
    }

    /// Best candidate on the destination platform for one source track, or
    /// `None` when nothing clears the threshold. Search failures are not
    /// swallowed here; the planner decides how to degrade.
    pub async fn find_candidate(
        &self,
        search: &impl CatalogSource,
        key: &NormalizedKey,
        original: &Track,
    ) -> Result<Option<MatchCandidate>, CatalogError> {
        let query = format!("{} {}", original.title, original.primary_artist());
        let results = with_retries(self.max_retries, self.call_timeout, || {
            search.search_tracks(&query, self.search_limit)
        })
        .await?;

        let mut best: Option<MatchCandidate> = None;
        for raw in results {
            let score = score(key, &normalize_raw(&raw));
            if score < self.threshold {
                continue;
            }
            // Strictly greater, so ties keep the earlier-ranked result.
            if best.as_ref().is_none_or(|b| score > b.confidence) {
                best = Some(MatchCandidate {
                    destination_id: raw.id.clone(),
                    confidence: score,
                    matched: raw,
                });
            }
        }
        Ok(best)
    }
}

/// Weighted sum of exact matches after normalization. Duration only counts
/// when both sides report one and the 2-second buckets agree.
fn score(key: &NormalizedKey, candidate: &NormalizedKey) -> f64 {
    let mut score = 0.0;
    if key.title == candidate.title {
        score += TITLE_WEIGHT;
    }
    if key.artist == candidate.artist {
        score += ARTIST_WEIGHT;
    }
    if let (Some(a), Some(b)) = (key.duration_bucket, candidate.duration_bucket) {
        if a == b {
            score += DURATION_WEIGHT;
        }
    }
    score
}
