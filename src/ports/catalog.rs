use std::fmt;

use crate::error::CatalogError;

/// The streaming platforms harmony knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Spotify,
    AppleMusic,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Spotify => write!(f, "Spotify"),
            Platform::AppleMusic => write!(f, "Apple Music"),
        }
    }
}

/// Decoupled representation of a track read from a platform playlist.
/// Immutable once fetched from the source.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub duration_secs: Option<u32>,
    pub platform: Platform,
}

impl Track {
    /// First listed artist; featured artists are frequently absent on one
    /// platform, so matching only ever looks at this one.
    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or("")
    }
}

/// A raw search result from the destination catalog, before scoring.
#[derive(Debug, Clone)]
pub struct RawTrack {
    pub id: String,
    pub title: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub duration_secs: Option<u32>,
}

/// Decoupled representation of a platform playlist.
#[derive(Debug, Clone)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub track_count: Option<u32>,
}

/// Read capabilities of a platform catalog.
///
/// Implementations live in `services::spotify` and `services::apple_music`
/// (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogSource: Send + Sync {
    /// Text query against the platform catalog, ordered by the platform's
    /// own ranking. `limit` is the maximum number of results.
    async fn search_tracks(&self, query: &str, limit: usize)
    -> Result<Vec<RawTrack>, CatalogError>;

    /// Tracks of a playlist, in playlist order.
    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, CatalogError>;

    /// The current user's playlists.
    async fn user_playlists(&self) -> Result<Vec<PlaylistSummary>, CatalogError>;
}

/// Write capabilities of a platform catalog.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogSink: Send + Sync {
    /// Exact-name lookup among the current user's playlists.
    async fn find_playlist_by_name(&self, name: &str) -> Result<Option<String>, CatalogError>;

    async fn create_playlist(&self, name: &str) -> Result<String, CatalogError>;

    /// Remove all tracks, keeping the playlist itself.
    async fn clear_playlist(&self, playlist_id: &str) -> Result<(), CatalogError>;

    /// Append tracks in the given order. Callers must respect
    /// [`CatalogSink::max_tracks_per_request`]; oversized batches fail with
    /// [`CatalogError::BatchTooLarge`].
    async fn add_tracks(&self, playlist_id: &str, track_ids: &[String])
    -> Result<(), CatalogError>;

    /// Tracks currently on a destination playlist, for de-duplication.
    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, CatalogError>;

    /// Platform bound on tracks per add request.
    fn max_tracks_per_request(&self) -> usize;
}
