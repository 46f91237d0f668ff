//! Sync planning: resolve an ordered source playlist into an ordered plan of
//! destination candidates before any destination-side mutation happens.

use std::collections::HashMap;

use crate::config::SyncSettings;
use crate::error::{CatalogError, SyncError};
use crate::ports::catalog::{CatalogSource, Track};
use crate::sync::CancelFlag;
use crate::sync::matcher::{CatalogMatcher, MatchCandidate};
use crate::sync::normalize::normalize;

/// Resolution of a single source track within a plan.
#[derive(Debug, Clone)]
pub enum TrackOutcome {
    Matched(MatchCandidate),
    /// No acceptable candidate. Not an error; matching is best-effort.
    Unmatched,
    /// Same normalized key as an earlier entry; its lookup result is reused
    /// and the track is not re-queried or re-added.
    Duplicate { first: usize },
    /// Never looked up: the search capability degraded or the run was
    /// cancelled before this entry's turn. Retryable on a later run.
    Skipped,
}

impl TrackOutcome {
    pub fn as_matched(&self) -> Option<&MatchCandidate> {
        match self {
            TrackOutcome::Matched(candidate) => Some(candidate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub source: Track,
    pub outcome: TrackOutcome,
}

/// Ordered mapping from source playlist tracks to destination candidates.
/// Entry order mirrors the source playlist order exactly.
#[derive(Debug, Clone)]
pub struct PlaylistSyncPlan {
    pub source_playlist_id: String,
    pub source_playlist_name: String,
    pub entries: Vec<PlanEntry>,
}

impl PlaylistSyncPlan {
    pub fn matched_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, TrackOutcome::Matched(_)))
            .count()
    }

    pub fn unmatched_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, TrackOutcome::Unmatched))
            .count()
    }

    pub fn duplicate_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, TrackOutcome::Duplicate { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, TrackOutcome::Skipped))
            .count()
    }

    /// Source tracks with no acceptable candidate, in playlist order.
    pub fn unmatched_tracks(&self) -> Vec<Track> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, TrackOutcome::Unmatched))
            .map(|e| e.source.clone())
            .collect()
    }
}

pub struct SyncPlanner {
    matcher: CatalogMatcher,
    cancel: CancelFlag,
}

impl SyncPlanner {
    pub fn new(settings: &SyncSettings, cancel: CancelFlag) -> Self {
        Self {
            matcher: CatalogMatcher::new(settings),
            cancel,
        }
    }

    /// Resolve every source track in order. Tracks sharing a normalized key
    /// are looked up once, so the matcher runs at most once per distinct key.
    ///
    /// A degraded search (unavailable, or retries exhausted) stops further
    /// lookups: the remaining unfetched entries become `Skipped` rather than
    /// `Unmatched`, while already-cached keys still resolve as duplicates.
    /// Only `AuthExpired` aborts the whole run.
    pub async fn plan(
        &self,
        search: &impl CatalogSource,
        playlist_id: &str,
        playlist_name: &str,
        tracks: Vec<Track>,
    ) -> Result<PlaylistSyncPlan, SyncError> {
        let total = tracks.len();
        let mut entries = Vec::with_capacity(total);
        let mut seen: HashMap<_, usize> = HashMap::new();
        let mut search_down = false;

        for (index, track) in tracks.into_iter().enumerate() {
            let key = normalize(&track);
            let outcome = if let Some(&first) = seen.get(&key) {
                log::debug!(
                    "[{}/{}] {} is a duplicate of entry {}",
                    index + 1,
                    total,
                    track.title,
                    first + 1
                );
                TrackOutcome::Duplicate { first }
            } else if search_down || self.cancel.is_cancelled() {
                TrackOutcome::Skipped
            } else {
                match self.matcher.find_candidate(search, &key, &track).await {
                    Ok(Some(candidate)) => {
                        log::info!(
                            "[{}/{}] matched {} - {} (confidence {:.2})",
                            index + 1,
                            total,
                            track.title,
                            track.primary_artist(),
                            candidate.confidence
                        );
                        seen.insert(key, index);
                        TrackOutcome::Matched(candidate)
                    }
                    Ok(None) => {
                        log::info!(
                            "[{}/{}] no match for {} - {}",
                            index + 1,
                            total,
                            track.title,
                            track.primary_artist()
                        );
                        seen.insert(key, index);
                        TrackOutcome::Unmatched
                    }
                    Err(CatalogError::AuthExpired) => return Err(SyncError::AuthExpired),
                    Err(err) => {
                        log::warn!(
                            "search degraded at {} - {}: {}; skipping remaining lookups",
                            track.title,
                            track.primary_artist(),
                            err
                        );
                        search_down = true;
                        TrackOutcome::Skipped
                    }
                }
            };
            entries.push(PlanEntry {
                source: track,
                outcome,
            });
        }

        Ok(PlaylistSyncPlan {
            source_playlist_id: playlist_id.to_string(),
            source_playlist_name: playlist_name.to_string(),
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::catalog::{MockCatalogSource, Platform, RawTrack};

    fn track(id: &str, title: &str, artist: &str) -> Track {
        Track {
            id: id.into(),
            title: title.into(),
            artists: vec![artist.into()],
            album: None,
            duration_secs: Some(200),
            platform: Platform::Spotify,
        }
    }

    fn matching_raw(title: &str, artist: &str) -> RawTrack {
        RawTrack {
            id: format!("dest-{title}"),
            title: title.into(),
            artists: vec![artist.into()],
            album: None,
            duration_secs: Some(200),
        }
    }

    fn planner() -> SyncPlanner {
        SyncPlanner::new(&SyncSettings::default(), CancelFlag::default())
    }

    #[tokio::test]
    async fn test_empty_playlist_yields_empty_plan() {
        let search = MockCatalogSource::new();
        let plan = planner()
            .plan(&search, "p1", "Empty", vec![])
            .await
            .unwrap();
        assert!(plan.entries.is_empty());
    }

    #[tokio::test]
    async fn test_plan_preserves_source_order() {
        let mut search = MockCatalogSource::new();
        search.expect_search_tracks().returning(|query, _| {
            let title = query.rsplit_once(' ').map(|(t, _)| t).unwrap_or(query);
            Ok(vec![matching_raw(title, "X")])
        });

        let tracks = vec![track("1", "Alpha", "X"), track("2", "Beta", "X")];
        let plan = planner()
            .plan(&search, "p1", "Ordered", tracks)
            .await
            .unwrap();

        let titles: Vec<_> = plan.entries.iter().map(|e| e.source.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Beta"]);
    }

    #[tokio::test]
    async fn test_duplicates_query_once_per_distinct_key() {
        let mut search = MockCatalogSource::new();
        // 4 tracks, 2 distinct keys: the matcher must run exactly twice.
        search
            .expect_search_tracks()
            .times(2)
            .returning(|_, _| Ok(vec![matching_raw("Alpha", "X")]));

        let tracks = vec![
            track("1", "Alpha", "X"),
            track("2", "Beta", "X"),
            track("3", "alpha", "x"),
            track("4", "Beta", "X"),
        ];
        let plan = planner()
            .plan(&search, "p1", "Dups", tracks)
            .await
            .unwrap();

        assert_eq!(plan.duplicate_count(), 2);
        assert!(matches!(
            plan.entries[2].outcome,
            TrackOutcome::Duplicate { first: 0 }
        ));
        assert!(matches!(
            plan.entries[3].outcome,
            TrackOutcome::Duplicate { first: 1 }
        ));
    }

    #[tokio::test]
    async fn test_all_unmatched_is_still_a_successful_plan() {
        let mut search = MockCatalogSource::new();
        search.expect_search_tracks().returning(|_, _| Ok(vec![]));

        let tracks = vec![track("1", "Alpha", "X"), track("2", "Beta", "Y")];
        let plan = planner()
            .plan(&search, "p1", "NoMatches", tracks)
            .await
            .unwrap();

        assert_eq!(plan.matched_count(), 0);
        assert_eq!(plan.unmatched_count(), 2);
    }

    #[tokio::test]
    async fn test_search_unavailable_skips_remaining_tracks() {
        let mut search = MockCatalogSource::new();
        let mut calls = 0;
        search.expect_search_tracks().returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Ok(vec![matching_raw("Alpha", "X")])
            } else {
                Err(CatalogError::SearchUnavailable {
                    reason: "upstream down".into(),
                })
            }
        });

        let tracks = vec![
            track("1", "Alpha", "X"),
            track("2", "Beta", "Y"),
            track("3", "Gamma", "Z"),
            track("4", "Alpha", "X"),
        ];
        let plan = planner()
            .plan(&search, "p1", "Degraded", tracks)
            .await
            .unwrap();

        assert_eq!(plan.matched_count(), 1);
        assert_eq!(plan.skipped_count(), 2);
        // cached key still resolves without a fetch
        assert!(matches!(
            plan.entries[3].outcome,
            TrackOutcome::Duplicate { first: 0 }
        ));
    }

    #[tokio::test]
    async fn test_auth_expired_aborts_the_run() {
        let mut search = MockCatalogSource::new();
        search
            .expect_search_tracks()
            .returning(|_, _| Err(CatalogError::AuthExpired));

        let result = planner()
            .plan(&search, "p1", "Auth", vec![track("1", "Alpha", "X")])
            .await;
        assert!(matches!(result, Err(SyncError::AuthExpired)));
    }

    #[tokio::test]
    async fn test_cancel_skips_all_lookups() {
        let cancel = CancelFlag::default();
        cancel.cancel();
        let planner = SyncPlanner::new(&SyncSettings::default(), cancel);

        let search = MockCatalogSource::new();
        let plan = planner
            .plan(&search, "p1", "Cancelled", vec![track("1", "Alpha", "X")])
            .await
            .unwrap();
        assert_eq!(plan.skipped_count(), 1);
    }
}
