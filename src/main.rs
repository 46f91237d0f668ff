mod config;
mod error;
mod logging;
mod ports;
mod services;
mod sync;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};

use crate::{
    config::Config,
    logging::setup_logging,
    ports::catalog::{CatalogSink, CatalogSource},
    services::{apple_music::AppleMusicClient, spotify, spotify::SpotifyClient},
    sync::{CancelFlag, PlaylistSyncer, SyncMode, SyncResult},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "HARMONY_CONFIG")]
    config: Option<PathBuf>,

    /// Console log level (default: off)
    #[arg(long, default_value = "off", global = true, env = "LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// File log level (default: debug)
    #[arg(long, default_value = "debug", global = true)]
    log_file_level: log::LevelFilter,

    /// Path to log file
    #[arg(long, env = "HARMONY_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum PlatformArg {
    Spotify,
    AppleMusic,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    /// Create a fresh playlist on the destination
    Create,
    /// Overwrite the destination playlist's contents
    Replace,
    /// Add missing tracks to the end of the destination playlist
    Append,
}

impl From<ModeArg> for SyncMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Create => SyncMode::CreateNew,
            ModeArg::Replace => SyncMode::ReplaceExisting,
            ModeArg::Append => SyncMode::AppendExisting,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum TermArg {
    /// Roughly the last four weeks
    Short,
    /// Roughly the last six months
    Medium,
    /// Several years of listening
    Long,
}

impl TermArg {
    fn as_time_range(self) -> &'static str {
        match self {
            TermArg::Short => "short_term",
            TermArg::Medium => "medium_term",
            TermArg::Long => "long_term",
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy a playlist from one platform to the other
    Sync {
        /// The platform to read the playlist from
        #[arg(long, value_enum)]
        from: PlatformArg,

        /// The platform to write the playlist to
        #[arg(long, value_enum)]
        to: PlatformArg,

        /// Name of the source playlist
        #[arg(short, long)]
        playlist: String,

        /// How to write to the destination
        #[arg(short, long, value_enum, default_value = "create")]
        mode: ModeArg,

        /// Destination playlist name (defaults to the source name)
        #[arg(long = "as")]
        rename: Option<String>,
    },
    /// List your playlists on a platform
    Playlists {
        #[arg(value_enum)]
        platform: PlatformArg,
    },
    /// List the tracks of a playlist
    Tracks {
        #[arg(value_enum)]
        platform: PlatformArg,

        /// Name of the playlist
        #[arg(short, long)]
        playlist: String,
    },
    /// Show your listening statistics
    Stats {
        #[arg(value_enum)]
        platform: PlatformArg,

        /// Time range for Spotify top tracks/artists
        #[arg(short, long, value_enum, default_value = "medium")]
        term: TermArg,

        /// How many entries to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

/// Runs the browser OAuth flow and builds an authenticated Spotify client.
async fn spotify_client(config: &Config) -> Result<SpotifyClient> {
    let (client_id, client_secret) = config.spotify_credentials()?;
    let token = spotify::auth::authorize(&client_id, &client_secret).await?;
    Ok(SpotifyClient::new(token.access_token))
}

fn apple_music_client(config: &Config) -> Result<AppleMusicClient> {
    let (developer_token, media_user_token) = config.apple_music_tokens()?;
    Ok(AppleMusicClient::new(
        developer_token,
        media_user_token,
        config.apple_music.storefront.clone(),
    ))
}

async fn run_sync<Src: CatalogSource, Snk: CatalogSink>(
    source: &Src,
    sink: &Snk,
    config: &Config,
    playlist_name: &str,
    mode: SyncMode,
    rename: Option<String>,
    cancel: CancelFlag,
) -> Result<()> {
    let playlists = source.user_playlists().await?;
    let mut playlist = playlists
        .into_iter()
        .find(|p| p.name == playlist_name)
        .ok_or_else(|| eyre!("No source playlist named `{playlist_name}`"))?;
    if let Some(name) = rename {
        playlist.name = name;
    }

    let syncer = PlaylistSyncer::new(source, sink, &config.sync, cancel);
    let result = syncer.sync_playlist(&playlist, mode).await?;
    print_sync_result(&result);
    Ok(())
}

fn print_sync_result(result: &SyncResult) {
    println!(
        "Synced to `{}`: {} matched, {} unmatched, {} duplicates skipped, {} not attempted",
        result.destination_playlist_name,
        result.matched,
        result.unmatched,
        result.skipped_duplicates,
        result.skipped,
    );
    if !result.unmatched_tracks.is_empty() {
        println!("\nNo confident match found for:");
        for track in &result.unmatched_tracks {
            println!("  {} - {}", track.primary_artist(), track.title);
        }
    }
    if result.partial {
        println!("\nSome additions failed and were left out:");
        for track in &result.failed_tracks {
            println!("  {} - {}", track.primary_artist(), track.title);
        }
    }
}

async fn show_playlists<C: CatalogSource>(catalog: &C) -> Result<()> {
    let playlists = catalog.user_playlists().await?;
    if playlists.is_empty() {
        println!("No playlists found");
        return Ok(());
    }
    for playlist in playlists {
        match playlist.track_count {
            Some(count) => println!("{} ({count} tracks)", playlist.name),
            None => println!("{}", playlist.name),
        }
    }
    Ok(())
}

async fn show_tracks<C: CatalogSource>(catalog: &C, playlist_name: &str) -> Result<()> {
    let playlists = catalog.user_playlists().await?;
    let playlist = playlists
        .into_iter()
        .find(|p| p.name == playlist_name)
        .ok_or_else(|| eyre!("No playlist named `{playlist_name}`"))?;

    let tracks = catalog.playlist_tracks(&playlist.id).await?;
    for (position, track) in tracks.iter().enumerate() {
        let duration = track
            .duration_secs
            .map(|secs| format!(" [{}:{:02}]", secs / 60, secs % 60))
            .unwrap_or_default();
        println!(
            "{:>3}. {} - {}{duration}",
            position + 1,
            track.primary_artist(),
            track.title
        );
    }
    Ok(())
}

async fn show_spotify_stats(client: &SpotifyClient, term: TermArg, limit: usize) -> Result<()> {
    let time_range = term.as_time_range();

    println!("Top tracks:");
    for (rank, track) in client.top_tracks(time_range, limit).await?.iter().enumerate() {
        let artists: Vec<&str> = track.artists.iter().map(|a| a.name.as_str()).collect();
        println!("{:>3}. {} - {}", rank + 1, artists.join(", "), track.name);
    }

    println!("\nTop artists:");
    for (rank, artist) in client.top_artists(time_range, limit).await?.iter().enumerate() {
        if artist.genres.is_empty() {
            println!("{:>3}. {}", rank + 1, artist.name);
        } else {
            println!("{:>3}. {} ({})", rank + 1, artist.name, artist.genres.join(", "));
        }
    }
    Ok(())
}

async fn show_apple_music_stats(client: &AppleMusicClient, limit: usize) -> Result<()> {
    println!("Heavy rotation:");
    for (rank, resource) in client.heavy_rotation(limit).await?.iter().enumerate() {
        match &resource.attributes.artist_name {
            Some(artist) => println!(
                "{:>3}. {} - {}",
                rank + 1,
                artist,
                resource.attributes.name
            ),
            None => println!("{:>3}. {}", rank + 1, resource.attributes.name),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    setup_logging(args.log_level, args.log_file.clone(), args.log_file_level)?;

    log::debug!("Harmony starting");
    log::debug!("Loading configuration");

    let config = {
        if let Some(config) = args.config {
            Config::from_file(&config)
        } else {
            Config::load()
        }
    }
    .with_context(|| "Failed to load harmony config")?;

    match args.command {
        Commands::Sync {
            from,
            to,
            playlist,
            mode,
            rename,
        } => {
            if from == to {
                return Err(eyre!("Source and destination platforms must differ"));
            }

            let cancel = CancelFlag::default();
            let ctrl_c_flag = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("cancellation requested, finishing current call");
                    ctrl_c_flag.cancel();
                }
            });

            match from {
                PlatformArg::Spotify => {
                    let source = spotify_client(&config).await?;
                    let sink = apple_music_client(&config)?;
                    run_sync(&source, &sink, &config, &playlist, mode.into(), rename, cancel)
                        .await?;
                }
                PlatformArg::AppleMusic => {
                    let source = apple_music_client(&config)?;
                    let sink = spotify_client(&config).await?;
                    run_sync(&source, &sink, &config, &playlist, mode.into(), rename, cancel)
                        .await?;
                }
            }
        }
        Commands::Playlists { platform } => match platform {
            PlatformArg::Spotify => show_playlists(&spotify_client(&config).await?).await?,
            PlatformArg::AppleMusic => show_playlists(&apple_music_client(&config)?).await?,
        },
        Commands::Tracks { platform, playlist } => match platform {
            PlatformArg::Spotify => {
                show_tracks(&spotify_client(&config).await?, &playlist).await?;
            }
            PlatformArg::AppleMusic => {
                show_tracks(&apple_music_client(&config)?, &playlist).await?;
            }
        },
        Commands::Stats {
            platform,
            term,
            limit,
        } => match platform {
            PlatformArg::Spotify => {
                show_spotify_stats(&spotify_client(&config).await?, term, limit).await?;
            }
            PlatformArg::AppleMusic => {
                show_apple_music_stats(&apple_music_client(&config)?, limit).await?;
            }
        },
        Commands::Config(config_commands) => match config_commands {
            ConfigCommands::CreateDefault => {
                let path = Config::create_default()?;
                println!("Config at {}", path.display());
            }
            ConfigCommands::Path => match Config::config_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        },
    }

    Ok(())
}
