use serde::Deserialize;

/// A catalog or library song from the Apple Music API.
#[derive(Debug, Clone, Deserialize)]
pub struct AppleMusicSong {
    pub id: String,
    pub attributes: SongAttributes,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongAttributes {
    pub name: String,
    pub artist_name: String,
    pub album_name: Option<String>,
    pub duration_in_millis: Option<u64>,
    pub play_params: Option<PlayParams>,
}

/// Library songs carry their catalog ID here; the library ID (`i.xxx`) is
/// useless for cross-referencing against search results.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayParams {
    pub catalog_id: Option<String>,
}

/// A playlist in the user's library.
#[derive(Debug, Clone, Deserialize)]
pub struct LibraryPlaylist {
    pub id: String,
    pub attributes: LibraryPlaylistAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryPlaylistAttributes {
    pub name: String,
}

/// An entry from the user's heavy-rotation history. The resource may be an
/// album or a playlist, so only a name is guaranteed.
#[derive(Debug, Clone, Deserialize)]
pub struct HeavyRotationResource {
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: HeavyRotationAttributes,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeavyRotationAttributes {
    pub name: String,
    pub artist_name: Option<String>,
}
