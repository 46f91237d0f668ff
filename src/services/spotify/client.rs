use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::error::CatalogError;
use crate::ports::catalog::{CatalogSink, CatalogSource, Platform, PlaylistSummary, RawTrack, Track};
use crate::services::spotify::types::{SpotifyPlaylist, SpotifyTopArtist, SpotifyTrack, SpotifyUser};
use crate::services::{as_search_error, check_status};

const API_BASE: &str = "https://api.spotify.com/v1";

/// Spotify allows at most 100 tracks per add request.
const ADD_TRACKS_LIMIT: usize = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Spotify API client
pub struct SpotifyClient {
    access_token: String,
    client: reqwest::Client,
}

impl SpotifyClient {
    pub fn new(access_token: String) -> Self {
        Self {
            access_token,
            client: reqwest::Client::new(),
        }
    }

    async fn api_get(&self, url: &str) -> Result<reqwest::Response, CatalogError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        check_status(response)
    }

    /// Get the current user's profile
    pub async fn get_current_user(&self) -> Result<SpotifyUser, CatalogError> {
        let response = self.api_get(&format!("{API_BASE}/me")).await?;
        Ok(response.json::<SpotifyUser>().await?)
    }

    /// Get all playlists for the current user
    pub async fn get_user_playlists(&self) -> Result<Vec<SpotifyPlaylist>, CatalogError> {
        let mut all_playlists = Vec::new();
        let mut next_url = Some(format!("{API_BASE}/me/playlists?limit=50"));

        while let Some(url) = next_url {
            #[derive(Deserialize)]
            struct PlaylistsResponse {
                items: Vec<SpotifyPlaylist>,
                next: Option<String>,
            }

            let page: PlaylistsResponse = self.api_get(&url).await?.json().await?;
            all_playlists.extend(page.items);
            next_url = page.next;
        }

        Ok(all_playlists)
    }

    /// Get all tracks in a playlist, in playlist order
    pub async fn get_playlist_tracks(
        &self,
        playlist_id: &str,
    ) -> Result<Vec<SpotifyTrack>, CatalogError> {
        let mut all_tracks = Vec::new();
        let mut next_url = Some(format!(
            "{API_BASE}/playlists/{playlist_id}/tracks?limit=100"
        ));

        while let Some(url) = next_url {
            #[derive(Deserialize)]
            struct PlaylistTrackObject {
                // null for removed/unavailable tracks
                track: Option<SpotifyTrack>,
            }

            #[derive(Deserialize)]
            struct TracksResponse {
                items: Vec<PlaylistTrackObject>,
                next: Option<String>,
            }

            let page: TracksResponse = self.api_get(&url).await?.json().await?;
            for item in page.items {
                if let Some(track) = item.track {
                    all_tracks.push(track);
                }
            }
            next_url = page.next;
        }

        Ok(all_tracks)
    }

    /// The user's most-listened tracks. `time_range` is one of Spotify's
    /// `short_term` / `medium_term` / `long_term`.
    pub async fn top_tracks(
        &self,
        time_range: &str,
        limit: usize,
    ) -> Result<Vec<SpotifyTrack>, CatalogError> {
        #[derive(Deserialize)]
        struct TopTracksResponse {
            items: Vec<SpotifyTrack>,
        }

        let url = format!("{API_BASE}/me/top/tracks?time_range={time_range}&limit={limit}");
        let page: TopTracksResponse = self.api_get(&url).await?.json().await?;
        Ok(page.items)
    }

    /// The user's most-listened artists over a time range.
    pub async fn top_artists(
        &self,
        time_range: &str,
        limit: usize,
    ) -> Result<Vec<SpotifyTopArtist>, CatalogError> {
        #[derive(Deserialize)]
        struct TopArtistsResponse {
            items: Vec<SpotifyTopArtist>,
        }

        let url = format!("{API_BASE}/me/top/artists?time_range={time_range}&limit={limit}");
        let page: TopArtistsResponse = self.api_get(&url).await?.json().await?;
        Ok(page.items)
    }
}

fn to_track(track: SpotifyTrack) -> Track {
    Track {
        id: track.id,
        title: track.name,
        artists: track.artists.into_iter().map(|a| a.name).collect(),
        album: track.album.map(|a| a.name),
        duration_secs: track.duration_ms.map(ms_to_secs),
        platform: Platform::Spotify,
    }
}

fn to_raw_track(track: SpotifyTrack) -> RawTrack {
    RawTrack {
        id: track.id,
        title: track.name,
        artists: track.artists.into_iter().map(|a| a.name).collect(),
        album: track.album.map(|a| a.name),
        duration_secs: track.duration_ms.map(ms_to_secs),
    }
}

fn ms_to_secs(ms: u64) -> u32 {
    ((ms + 500) / 1000) as u32
}

fn summarize(playlist: SpotifyPlaylist) -> PlaylistSummary {
    PlaylistSummary {
        id: playlist.id,
        name: playlist.name,
        track_count: Some(playlist.tracks.total),
    }
}

#[async_trait::async_trait]
impl CatalogSource for SpotifyClient {
    async fn search_tracks(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RawTrack>, CatalogError> {
        #[derive(Deserialize)]
        struct TrackList {
            items: Vec<SpotifyTrack>,
        }

        #[derive(Deserialize)]
        struct SearchResponse {
            tracks: TrackList,
        }

        let url = format!(
            "{API_BASE}/search?q={}&type=track&limit={limit}",
            urlencoding::encode(query)
        );
        let response: SearchResponse = self
            .api_get(&url)
            .await
            .map_err(as_search_error)?
            .json()
            .await
            .map_err(|e| as_search_error(CatalogError::Http(e)))?;
        Ok(response.tracks.items.into_iter().map(to_raw_track).collect())
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, CatalogError> {
        let tracks = self.get_playlist_tracks(playlist_id).await?;
        Ok(tracks.into_iter().map(to_track).collect())
    }

    async fn user_playlists(&self) -> Result<Vec<PlaylistSummary>, CatalogError> {
        let playlists = self.get_user_playlists().await?;
        Ok(playlists.into_iter().map(summarize).collect())
    }
}

#[async_trait::async_trait]
impl CatalogSink for SpotifyClient {
    async fn find_playlist_by_name(&self, name: &str) -> Result<Option<String>, CatalogError> {
        let playlists = self.get_user_playlists().await?;
        Ok(playlists.into_iter().find(|p| p.name == name).map(|p| p.id))
    }

    async fn create_playlist(&self, name: &str) -> Result<String, CatalogError> {
        let user = self.get_current_user().await?;

        #[derive(Deserialize)]
        struct CreatedPlaylist {
            id: String,
        }

        let response = self
            .client
            .post(format!("{API_BASE}/users/{}/playlists", user.id))
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({ "name": name, "public": false }))
            .send()
            .await?;
        let created: CreatedPlaylist = check_status(response)?.json().await?;
        Ok(created.id)
    }

    async fn clear_playlist(&self, playlist_id: &str) -> Result<(), CatalogError> {
        // Replacing with an empty URI list empties the playlist
        let response = self
            .client
            .put(format!("{API_BASE}/playlists/{playlist_id}/tracks"))
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({ "uris": [] }))
            .send()
            .await?;
        check_status(response)?;
        Ok(())
    }

    async fn add_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> Result<(), CatalogError> {
        if track_ids.len() > ADD_TRACKS_LIMIT {
            return Err(CatalogError::BatchTooLarge {
                len: track_ids.len(),
                limit: ADD_TRACKS_LIMIT,
            });
        }

        let uris: Vec<String> = track_ids
            .iter()
            .map(|id| format!("spotify:track:{id}"))
            .collect();
        let response = self
            .client
            .post(format!("{API_BASE}/playlists/{playlist_id}/tracks"))
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({ "uris": uris }))
            .send()
            .await?;
        check_status(response)?;
        Ok(())
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, CatalogError> {
        let tracks = self.get_playlist_tracks(playlist_id).await?;
        Ok(tracks.into_iter().map(to_track).collect())
    }

    fn max_tracks_per_request(&self) -> usize {
        ADD_TRACKS_LIMIT
    }
}
