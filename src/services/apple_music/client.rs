use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::error::CatalogError;
use crate::ports::catalog::{CatalogSink, CatalogSource, Platform, PlaylistSummary, RawTrack, Track};
use crate::services::apple_music::types::{AppleMusicSong, HeavyRotationResource, LibraryPlaylist};
use crate::services::{as_search_error, check_status};

const API_BASE: &str = "https://api.music.apple.com";

/// Conservative bound for library playlist add requests.
const ADD_TRACKS_LIMIT: usize = 50;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Apple Music API client. Requires a developer token for the catalog and a
/// media user token for the user's library.
pub struct AppleMusicClient {
    developer_token: String,
    media_user_token: String,
    storefront: String,
    client: reqwest::Client,
}

impl AppleMusicClient {
    pub fn new(developer_token: String, media_user_token: String, storefront: String) -> Self {
        Self {
            developer_token,
            media_user_token,
            storefront,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{API_BASE}{path}"))
            .bearer_auth(&self.developer_token)
            .header("Music-User-Token", &self.media_user_token)
            .timeout(REQUEST_TIMEOUT)
    }

    async fn api_get(&self, path: &str) -> Result<reqwest::Response, CatalogError> {
        let response = self.request(reqwest::Method::GET, path).send().await?;
        check_status(response)
    }

    /// Walk a paginated `data`/`next` endpoint to the end.
    async fn get_all_pages<T: serde::de::DeserializeOwned>(
        &self,
        first_path: &str,
    ) -> Result<Vec<T>, CatalogError> {
        #[derive(Deserialize)]
        struct Page<U> {
            data: Vec<U>,
            next: Option<String>,
        }

        let mut all = Vec::new();
        let mut next_path = Some(first_path.to_string());
        while let Some(path) = next_path {
            let page: Page<T> = self.api_get(&path).await?.json().await?;
            all.extend(page.data);
            // `next` is a relative path like /v1/me/library/playlists?offset=25
            next_path = page.next;
        }
        Ok(all)
    }

    pub async fn get_user_playlists(&self) -> Result<Vec<LibraryPlaylist>, CatalogError> {
        self.get_all_pages("/v1/me/library/playlists?limit=100").await
    }

    pub async fn get_playlist_tracks(
        &self,
        playlist_id: &str,
    ) -> Result<Vec<AppleMusicSong>, CatalogError> {
        let path = format!("/v1/me/library/playlists/{playlist_id}/tracks?limit=100");
        match self.get_all_pages(&path).await {
            Ok(tracks) => Ok(tracks),
            // Apple answers 404 for a playlist that has no tracks yet
            Err(CatalogError::NotFound(_)) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    /// The user's most-played albums and playlists.
    pub async fn heavy_rotation(
        &self,
        limit: usize,
    ) -> Result<Vec<HeavyRotationResource>, CatalogError> {
        #[derive(Deserialize)]
        struct HeavyRotationResponse {
            data: Vec<HeavyRotationResource>,
        }

        let path = format!("/v1/me/history/heavy-rotation?limit={limit}");
        let response: HeavyRotationResponse = self.api_get(&path).await?.json().await?;
        Ok(response.data)
    }
}

fn to_track(song: AppleMusicSong) -> Track {
    // Prefer the catalog ID so destination-side de-duplication can compare
    // against catalog search results.
    let id = song
        .attributes
        .play_params
        .as_ref()
        .and_then(|p| p.catalog_id.clone())
        .unwrap_or(song.id);
    Track {
        id,
        title: song.attributes.name,
        artists: vec![song.attributes.artist_name],
        album: song.attributes.album_name,
        duration_secs: song.attributes.duration_in_millis.map(ms_to_secs),
        platform: Platform::AppleMusic,
    }
}

fn to_raw_track(song: AppleMusicSong) -> RawTrack {
    RawTrack {
        id: song.id,
        title: song.attributes.name,
        artists: vec![song.attributes.artist_name],
        album: song.attributes.album_name,
        duration_secs: song.attributes.duration_in_millis.map(ms_to_secs),
    }
}

fn ms_to_secs(ms: u64) -> u32 {
    ((ms + 500) / 1000) as u32
}

#[async_trait::async_trait]
impl CatalogSource for AppleMusicClient {
    async fn search_tracks(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RawTrack>, CatalogError> {
        #[derive(Deserialize)]
        struct SongList {
            data: Vec<AppleMusicSong>,
        }

        #[derive(Deserialize)]
        struct SearchResults {
            songs: Option<SongList>,
        }

        #[derive(Deserialize)]
        struct SearchResponse {
            results: SearchResults,
        }

        let path = format!(
            "/v1/catalog/{}/search?term={}&types=songs&limit={limit}",
            self.storefront,
            urlencoding::encode(query)
        );
        let response: SearchResponse = self
            .api_get(&path)
            .await
            .map_err(as_search_error)?
            .json()
            .await
            .map_err(|e| as_search_error(CatalogError::Http(e)))?;
        Ok(response
            .results
            .songs
            .map(|list| list.data.into_iter().map(to_raw_track).collect())
            .unwrap_or_default())
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, CatalogError> {
        let songs = self.get_playlist_tracks(playlist_id).await?;
        Ok(songs.into_iter().map(to_track).collect())
    }

    async fn user_playlists(&self) -> Result<Vec<PlaylistSummary>, CatalogError> {
        let playlists = self.get_user_playlists().await?;
        Ok(playlists
            .into_iter()
            .map(|p| PlaylistSummary {
                id: p.id,
                name: p.attributes.name,
                track_count: None,
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl CatalogSink for AppleMusicClient {
    async fn find_playlist_by_name(&self, name: &str) -> Result<Option<String>, CatalogError> {
        let playlists = self.get_user_playlists().await?;
        Ok(playlists
            .into_iter()
            .find(|p| p.attributes.name == name)
            .map(|p| p.id))
    }

    async fn create_playlist(&self, name: &str) -> Result<String, CatalogError> {
        #[derive(Deserialize)]
        struct Created {
            id: String,
        }

        #[derive(Deserialize)]
        struct CreateResponse {
            data: Vec<Created>,
        }

        let response = self
            .request(reqwest::Method::POST, "/v1/me/library/playlists")
            .json(&json!({ "attributes": { "name": name } }))
            .send()
            .await?;
        let mut created: CreateResponse = check_status(response)?.json().await?;
        created
            .data
            .pop()
            .map(|c| c.id)
            .ok_or_else(|| CatalogError::NotFound("created playlist id".to_string()))
    }

    async fn clear_playlist(&self, playlist_id: &str) -> Result<(), CatalogError> {
        // The replace-tracks endpoint with an empty list empties the playlist
        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/v1/me/library/playlists/{playlist_id}/tracks"),
            )
            .json(&json!({ "data": [] }))
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

        let data: Vec<_> = track_ids
            .iter()
            .map(|id| json!({ "id": id, "type": "songs" }))
            .collect();
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/v1/me/library/playlists/{playlist_id}/tracks"),
            )
            .json(&json!({ "data": data }))
            .send()
            .await?;
        check_status(response)?;
        Ok(())
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, CatalogError> {
        let songs = self.get_playlist_tracks(playlist_id).await?;
        Ok(songs.into_iter().map(to_track).collect())
    }

    fn max_tracks_per_request(&self) -> usize {
        ADD_TRACKS_LIMIT
    }
}
