//! Plan execution: create or reuse the destination playlist and add the
//! matched tracks in order, batched to the sink's per-request limit.

use std::collections::HashSet;

use crate::config::SyncSettings;
use crate::error::{CatalogError, SyncError};
use crate::ports::catalog::{CatalogSink, Track};
use crate::sync::CancelFlag;
use crate::sync::planner::PlaylistSyncPlan;
use crate::sync::retry::with_retries;

/// How the destination playlist is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Create a fresh playlist, suffixing the name on collision.
    CreateNew,
    /// Clear an existing playlist of the same name before adding; creates
    /// one when absent.
    ReplaceExisting,
    /// Add to the end of an existing playlist, skipping tracks already
    /// present; creates one when absent.
    AppendExisting,
}

/// Report of a single sync run. Immutable once the executor returns; never
/// persisted across runs.
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub destination_playlist_id: String,
    pub destination_playlist_name: String,
    /// Matched source tracks that were handed to the destination.
    pub matched: usize,
    pub unmatched: usize,
    pub skipped_duplicates: usize,
    /// Tracks never looked up because the search degraded or the run was
    /// cancelled; retryable on a later run.
    pub skipped: usize,
    /// Unmatched source tracks, in playlist order, for user review.
    pub unmatched_tracks: Vec<Track>,
    /// True when at least one add batch failed after retries.
    pub partial: bool,
    /// Source tracks whose destination additions failed after retries.
    pub failed_tracks: Vec<Track>,
}

pub struct SyncExecutor {
    call_timeout: std::time::Duration,
    max_retries: usize,
    cancel: CancelFlag,
}

impl SyncExecutor {
    pub fn new(settings: &SyncSettings, cancel: CancelFlag) -> Self {
        Self {
            call_timeout: settings.call_timeout(),
            max_retries: settings.max_add_retries,
            cancel,
        }
    }

    /// Apply a plan against the destination platform.
    ///
    /// Add batches that fail after retries are recorded in the result rather
    /// than aborting the run; tracks added by earlier batches stay on the
    /// destination. `AuthExpired` and `BatchTooLarge` abort with no result.
    pub async fn execute(
        &self,
        sink: &impl CatalogSink,
        plan: &PlaylistSyncPlan,
        mode: SyncMode,
    ) -> Result<SyncResult, SyncError> {
        let batch_size = sink.max_tracks_per_request();

        // (destination id, plan index) for matched entries, in plan order.
        let mut additions: Vec<(String, usize)> = plan
            .entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                entry
                    .outcome
                    .as_matched()
                    .map(|c| (c.destination_id.clone(), index))
            })
            .collect();

        let mut skipped_duplicates = plan.duplicate_count();

        let (playlist_id, playlist_name) = match mode {
            SyncMode::CreateNew => self.create_with_unique_name(sink, plan).await?,
            SyncMode::ReplaceExisting => {
                match self.find_playlist(sink, &plan.source_playlist_name).await? {
                    Some(id) => {
                        log::info!("clearing destination playlist {}", plan.source_playlist_name);
                        with_retries(self.max_retries, self.call_timeout, || {
                            sink.clear_playlist(&id)
                        })
                        .await?;
                        (id, plan.source_playlist_name.clone())
                    }
                    None => self.create_with_unique_name(sink, plan).await?,
                }
            }
            SyncMode::AppendExisting => {
                match self.find_playlist(sink, &plan.source_playlist_name).await? {
                    Some(id) => {
                        let existing = with_retries(self.max_retries, self.call_timeout, || {
                            sink.playlist_tracks(&id)
                        })
                        .await?;
                        let present: HashSet<String> =
                            existing.into_iter().map(|t| t.id).collect();
                        additions.retain(|(dest_id, _)| {
                            if present.contains(dest_id) {
                                skipped_duplicates += 1;
                                false
                            } else {
                                true
                            }
                        });
                        (id, plan.source_playlist_name.clone())
                    }
                    None => self.create_with_unique_name(sink, plan).await?,
                }
            }
        };

        let matched = additions.len();
        let mut partial = false;
        let mut failed_tracks = Vec::new();

        for chunk in additions.chunks(batch_size) {
            if self.cancel.is_cancelled() {
                log::warn!("sync cancelled; {} tracks not added", chunk.len());
                partial = true;
                failed_tracks.extend(chunk.iter().map(|(_, i)| plan.entries[*i].source.clone()));
                continue;
            }
            let ids: Vec<String> = chunk.iter().map(|(id, _)| id.clone()).collect();
            let outcome = with_retries(self.max_retries, self.call_timeout, || {
                sink.add_tracks(&playlist_id, &ids)
            })
            .await;
            match outcome {
                Ok(()) => log::debug!("added batch of {} tracks", ids.len()),
                Err(CatalogError::AuthExpired) => return Err(SyncError::AuthExpired),
                Err(err @ CatalogError::BatchTooLarge { .. }) => {
                    return Err(SyncError::Catalog(err));
                }
                Err(err) => {
                    log::error!("add batch failed after retries: {}", err);
                    partial = true;
                    failed_tracks
                        .extend(chunk.iter().map(|(_, i)| plan.entries[*i].source.clone()));
                }
            }
        }

        Ok(SyncResult {
            destination_playlist_id: playlist_id,
            destination_playlist_name: playlist_name,
            matched,
            unmatched: plan.unmatched_count(),
            skipped_duplicates,
            skipped: plan.skipped_count(),
            unmatched_tracks: plan.unmatched_tracks(),
            partial,
            failed_tracks,
        })
    }

    async fn find_playlist(
        &self,
        sink: &impl CatalogSink,
        name: &str,
    ) -> Result<Option<String>, CatalogError> {
        with_retries(self.max_retries, self.call_timeout, || {
            sink.find_playlist_by_name(name)
        })
        .await
    }

    /// Create the destination playlist, suffixing " (2)", " (3)", ... while
    /// the name is taken.
    async fn create_with_unique_name(
        &self,
        sink: &impl CatalogSink,
        plan: &PlaylistSyncPlan,
    ) -> Result<(String, String), CatalogError> {
        let base = &plan.source_playlist_name;
        let mut name = base.clone();
        let mut suffix = 2;
        while self.find_playlist(sink, &name).await?.is_some() {
            name = format!("{} ({})", base, suffix);
            suffix += 1;
        }
        log::info!("creating destination playlist {}", name);
        let id = with_retries(self.max_retries, self.call_timeout, || {
            sink.create_playlist(&name)
        })
        .await?;
        Ok((id, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::catalog::{MockCatalogSink, Platform};
    use crate::sync::matcher::MatchCandidate;
    use crate::sync::planner::{PlanEntry, TrackOutcome};
    use mockall::predicate::eq;

    fn track(id: &str, title: &str) -> Track {
        Track {
            id: id.into(),
            title: title.into(),
            artists: vec!["Artist".into()],
            album: None,
            duration_secs: Some(200),
            platform: Platform::Spotify,
        }
    }

    fn matched_entry(source_id: &str, title: &str, dest_id: &str) -> PlanEntry {
        PlanEntry {
            source: track(source_id, title),
            outcome: TrackOutcome::Matched(MatchCandidate {
                destination_id: dest_id.into(),
                confidence: 0.9,
                matched: crate::ports::catalog::RawTrack {
                    id: dest_id.into(),
                    title: title.into(),
                    artists: vec!["Artist".into()],
                    album: None,
                    duration_secs: Some(200),
                },
            }),
        }
    }

    fn plan_with(entries: Vec<PlanEntry>) -> PlaylistSyncPlan {
        PlaylistSyncPlan {
            source_playlist_id: "src-pl".into(),
            source_playlist_name: "Road Trip".into(),
            entries,
        }
    }

    fn executor() -> SyncExecutor {
        SyncExecutor::new(&SyncSettings::default(), CancelFlag::default())
    }

    fn server_error() -> CatalogError {
        let response = http::Response::builder()
            .status(http::StatusCode::INTERNAL_SERVER_ERROR)
            .body("upstream error")
            .unwrap();
        CatalogError::Http(
            reqwest::Response::from(response)
                .error_for_status()
                .unwrap_err(),
        )
    }

    #[tokio::test]
    async fn test_create_new_adds_in_plan_order() {
        let plan = plan_with(vec![
            matched_entry("s1", "Alpha", "d1"),
            PlanEntry {
                source: track("s2", "Beta"),
                outcome: TrackOutcome::Unmatched,
            },
            matched_entry("s3", "Gamma", "d3"),
        ]);

        let mut sink = MockCatalogSink::new();
        sink.expect_max_tracks_per_request().return_const(100usize);
        sink.expect_find_playlist_by_name()
            .with(eq("Road Trip"))
            .returning(|_| Ok(None));
        sink.expect_create_playlist()
            .with(eq("Road Trip"))
            .returning(|_| Ok("dest-pl".into()));
        sink.expect_add_tracks()
            .withf(|id, ids| id == "dest-pl" && ids == ["d1".to_string(), "d3".to_string()])
            .times(1)
            .returning(|_, _| Ok(()));

        let result = executor()
            .execute(&sink, &plan, SyncMode::CreateNew)
            .await
            .unwrap();
        assert_eq!(result.destination_playlist_id, "dest-pl");
        assert_eq!(result.matched, 2);
        assert_eq!(result.unmatched, 1);
        assert_eq!(result.unmatched_tracks[0].title, "Beta");
        assert!(!result.partial);
    }

    #[tokio::test]
    async fn test_create_new_disambiguates_name_collision() {
        let plan = plan_with(vec![matched_entry("s1", "Alpha", "d1")]);

        let mut sink = MockCatalogSink::new();
        sink.expect_max_tracks_per_request().return_const(100usize);
        sink.expect_find_playlist_by_name()
            .with(eq("Road Trip"))
            .returning(|_| Ok(Some("taken".into())));
        sink.expect_find_playlist_by_name()
            .with(eq("Road Trip (2)"))
            .returning(|_| Ok(None));
        sink.expect_create_playlist()
            .with(eq("Road Trip (2)"))
            .returning(|_| Ok("dest-pl".into()));
        sink.expect_add_tracks().returning(|_, _| Ok(()));

        let result = executor()
            .execute(&sink, &plan, SyncMode::CreateNew)
            .await
            .unwrap();
        assert_eq!(result.destination_playlist_name, "Road Trip (2)");
    }

    #[tokio::test]
    async fn test_replace_clears_existing_before_adding() {
        let plan = plan_with(vec![matched_entry("s1", "Alpha", "d1")]);

        let mut sink = MockCatalogSink::new();
        sink.expect_max_tracks_per_request().return_const(100usize);
        sink.expect_find_playlist_by_name()
            .returning(|_| Ok(Some("dest-pl".into())));
        sink.expect_clear_playlist()
            .with(eq("dest-pl"))
            .times(1)
            .returning(|_| Ok(()));
        sink.expect_add_tracks()
            .withf(|_, ids| ids == ["d1".to_string()])
            .returning(|_, _| Ok(()));

        let result = executor()
            .execute(&sink, &plan, SyncMode::ReplaceExisting)
            .await
            .unwrap();
        assert_eq!(result.destination_playlist_id, "dest-pl");
    }

    #[tokio::test]
    async fn test_replace_missing_playlist_behaves_as_create() {
        let plan = plan_with(vec![matched_entry("s1", "Alpha", "d1")]);

        let mut sink = MockCatalogSink::new();
        sink.expect_max_tracks_per_request().return_const(100usize);
        sink.expect_find_playlist_by_name().returning(|_| Ok(None));
        sink.expect_clear_playlist().times(0);
        sink.expect_create_playlist()
            .returning(|_| Ok("dest-pl".into()));
        sink.expect_add_tracks().returning(|_, _| Ok(()));

        let result = executor()
            .execute(&sink, &plan, SyncMode::ReplaceExisting)
            .await
            .unwrap();
        assert!(!result.partial);
    }

    #[tokio::test]
    async fn test_append_skips_tracks_already_present() {
        let plan = plan_with(vec![
            matched_entry("s1", "Alpha", "d1"),
            matched_entry("s2", "Beta", "d2"),
        ]);

        let mut sink = MockCatalogSink::new();
        sink.expect_max_tracks_per_request().return_const(100usize);
        sink.expect_find_playlist_by_name()
            .returning(|_| Ok(Some("dest-pl".into())));
        sink.expect_playlist_tracks()
            .with(eq("dest-pl"))
            .returning(|_| Ok(vec![track("d1", "Alpha")]));
        sink.expect_add_tracks()
            .withf(|_, ids| ids == ["d2".to_string()])
            .times(1)
            .returning(|_, _| Ok(()));

        let result = executor()
            .execute(&sink, &plan, SyncMode::AppendExisting)
            .await
            .unwrap();
        assert_eq!(result.matched, 1);
        assert_eq!(result.skipped_duplicates, 1);
    }

    #[tokio::test]
    async fn test_chunks_additions_and_preserves_order() {
        let plan = plan_with(vec![
            matched_entry("s1", "A", "d1"),
            matched_entry("s2", "B", "d2"),
            matched_entry("s3", "C", "d3"),
        ]);

        let mut sink = MockCatalogSink::new();
        sink.expect_max_tracks_per_request().return_const(2usize);
        sink.expect_find_playlist_by_name().returning(|_| Ok(None));
        sink.expect_create_playlist()
            .returning(|_| Ok("dest-pl".into()));
        let mut seq = mockall::Sequence::new();
        sink.expect_add_tracks()
            .withf(|_, ids| ids == ["d1".to_string(), "d2".to_string()])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        sink.expect_add_tracks()
            .withf(|_, ids| ids == ["d3".to_string()])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let result = executor()
            .execute(&sink, &plan, SyncMode::CreateNew)
            .await
            .unwrap();
        assert_eq!(result.matched, 3);
    }

    #[tokio::test]
    async fn test_transient_add_failure_retries_to_success() {
        let plan = plan_with(vec![matched_entry("s1", "Alpha", "d1")]);

        let mut sink = MockCatalogSink::new();
        sink.expect_max_tracks_per_request().return_const(100usize);
        sink.expect_find_playlist_by_name().returning(|_| Ok(None));
        sink.expect_create_playlist()
            .returning(|_| Ok("dest-pl".into()));
        // One 5xx, then success: the batch must not end up partial.
        let mut calls = 0;
        sink.expect_add_tracks()
            .times(2)
            .returning(move |_, _| {
                calls += 1;
                if calls == 1 { Err(server_error()) } else { Ok(()) }
            });

        let result = executor()
            .execute(&sink, &plan, SyncMode::CreateNew)
            .await
            .unwrap();
        assert!(!result.partial);
        assert!(result.failed_tracks.is_empty());
        assert_eq!(result.matched, 1);
    }

    #[tokio::test]
    async fn test_failed_batch_is_contained_as_partial() {
        let plan = plan_with(vec![
            matched_entry("s1", "A", "d1"),
            matched_entry("s2", "B", "d2"),
            matched_entry("s3", "C", "d3"),
        ]);

        let mut sink = MockCatalogSink::new();
        sink.expect_max_tracks_per_request().return_const(1usize);
        sink.expect_find_playlist_by_name().returning(|_| Ok(None));
        sink.expect_create_playlist()
            .returning(|_| Ok("dest-pl".into()));
        sink.expect_add_tracks()
            .returning(|_, ids| {
                if ids == ["d2".to_string()] {
                    Err(CatalogError::NotFound("dest-pl".into()))
                } else {
                    Ok(())
                }
            });

        let result = executor()
            .execute(&sink, &plan, SyncMode::CreateNew)
            .await
            .unwrap();
        assert!(result.partial);
        assert_eq!(result.failed_tracks.len(), 1);
        assert_eq!(result.failed_tracks[0].title, "B");
    }

    #[tokio::test]
    async fn test_auth_expired_aborts_without_result() {
        let plan = plan_with(vec![matched_entry("s1", "A", "d1")]);

        let mut sink = MockCatalogSink::new();
        sink.expect_max_tracks_per_request().return_const(100usize);
        sink.expect_find_playlist_by_name().returning(|_| Ok(None));
        sink.expect_create_playlist()
            .returning(|_| Ok("dest-pl".into()));
        sink.expect_add_tracks()
            .returning(|_, _| Err(CatalogError::AuthExpired));

        let result = executor().execute(&sink, &plan, SyncMode::CreateNew).await;
        assert!(matches!(result, Err(SyncError::AuthExpired)));
    }

    #[tokio::test]
    async fn test_batch_too_large_is_fatal() {
        let plan = plan_with(vec![matched_entry("s1", "A", "d1")]);

        let mut sink = MockCatalogSink::new();
        sink.expect_max_tracks_per_request().return_const(100usize);
        sink.expect_find_playlist_by_name().returning(|_| Ok(None));
        sink.expect_create_playlist()
            .returning(|_| Ok("dest-pl".into()));
        sink.expect_add_tracks()
            .returning(|_, _| Err(CatalogError::BatchTooLarge { len: 200, limit: 100 }));

        let result = executor().execute(&sink, &plan, SyncMode::CreateNew).await;
        assert!(matches!(
            result,
            Err(SyncError::Catalog(CatalogError::BatchTooLarge { .. }))
        ));
    }

    #[tokio::test]
    async fn test_replace_twice_is_idempotent() {
        // Running replace against an existing destination must clear first,
        // so the final track list is the matched set both times.
        let plan = plan_with(vec![
            matched_entry("s1", "A", "d1"),
            matched_entry("s2", "B", "d2"),
        ]);

        for _ in 0..2 {
            let mut sink = MockCatalogSink::new();
            sink.expect_max_tracks_per_request().return_const(100usize);
            sink.expect_find_playlist_by_name()
                .returning(|_| Ok(Some("dest-pl".into())));
            sink.expect_clear_playlist().times(1).returning(|_| Ok(()));
            sink.expect_add_tracks()
                .withf(|_, ids| ids == ["d1".to_string(), "d2".to_string()])
                .times(1)
                .returning(|_, _| Ok(()));

            let result = executor()
                .execute(&sink, &plan, SyncMode::ReplaceExisting)
                .await
                .unwrap();
            assert_eq!(result.matched, 2);
            assert!(!result.partial);
        }
    }
}
