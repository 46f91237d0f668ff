//! Track identity normalization.
//!
//! Produces the canonical key used for cross-platform equality: the two
//! catalogs share no ID scheme, so matching works on cleaned-up text plus a
//! coarse duration bucket.

use unaccent::unaccent;

use crate::ports::catalog::{RawTrack, Track};

/// Canonical identity of a track for matching. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedKey {
    pub title: String,
    pub artist: String,
    /// Duration rounded to the nearest 2-second interval, so minor
    /// encoding-length differences between platforms do not break equality.
    pub duration_bucket: Option<u32>,
}

/// Pure and total: every track gets a key, even with an empty artist list.
pub fn normalize(track: &Track) -> NormalizedKey {
    key_parts(&track.title, &track.artists, track.duration_secs)
}

/// Same canonicalization applied to a destination search result.
pub fn normalize_raw(track: &RawTrack) -> NormalizedKey {
    key_parts(&track.title, &track.artists, track.duration_secs)
}

fn key_parts(title: &str, artists: &[String], duration_secs: Option<u32>) -> NormalizedKey {
    NormalizedKey {
        title: normalize_text(title),
        artist: artists
            .first()
            .map(|a| normalize_text(a))
            .unwrap_or_default(),
        duration_bucket: duration_secs.map(duration_bucket),
    }
}

pub(crate) fn duration_bucket(secs: u32) -> u32 {
    (secs + 1) / 2
}

/// Lowercase, strip diacritics and punctuation, collapse whitespace.
/// Apostrophes are dropped outright so "Don't" and "Dont" compare equal.
pub fn normalize_text(s: &str) -> String {
    unaccent(s)
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else if c == '\'' {
                '\0'
            } else {
                ' '
            }
        })
        .filter(|&c| c != '\0')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
