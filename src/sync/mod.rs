//! The playlist synchronization engine.
//!
//! One-directional copy of a playlist from a source catalog to a destination
//! catalog: normalize each track's identity, find the best destination
//! candidate, build an ordered plan, then apply it. The engine only ever
//! talks to the platforms through the [`crate::ports::catalog`] traits.

pub mod executor;
pub mod matcher;
pub mod normalize;
pub mod planner;
mod retry;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::SyncSettings;
use crate::error::SyncError;
use crate::ports::catalog::{CatalogSink, CatalogSource, PlaylistSummary};

pub use executor::{SyncExecutor, SyncMode, SyncResult};
pub use planner::{PlaylistSyncPlan, SyncPlanner};

/// Cooperative cancellation for a sync run. Once set, no new external calls
/// are issued; mutations already applied are left in place.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Ties the planner and executor together for one source/destination pair.
/// Each sync run owns its plan and result exclusively; nothing is shared
/// across runs.
pub struct PlaylistSyncer<'a, Src, Snk> {
    source: &'a Src,
    sink: &'a Snk,
    planner: SyncPlanner,
    executor: SyncExecutor,
    settings: SyncSettings,
}

impl<'a, Src: CatalogSource, Snk: CatalogSink> PlaylistSyncer<'a, Src, Snk> {
    pub fn new(source: &'a Src, sink: &'a Snk, settings: &SyncSettings, cancel: CancelFlag) -> Self {
        Self {
            source,
            sink,
            planner: SyncPlanner::new(settings, cancel.clone()),
            executor: SyncExecutor::new(settings, cancel),
            settings: settings.clone(),
        }
    }

    /// Fully sync one playlist: fetch, plan, execute.
    pub async fn sync_playlist(
        &self,
        playlist: &PlaylistSummary,
        mode: SyncMode,
    ) -> Result<SyncResult, SyncError> {
        log::info!("fetching source playlist {}", playlist.name);
        let tracks = retry::with_retries(
            self.settings.max_add_retries,
            self.settings.call_timeout(),
            || self.source.playlist_tracks(&playlist.id),
        )
        .await?;
        log::info!("{} tracks in source playlist", tracks.len());

        let plan = self
            .planner
            .plan(self.source, &playlist.id, &playlist.name, tracks)
            .await?;
        self.executor.execute(self.sink, &plan, mode).await
    }
}
