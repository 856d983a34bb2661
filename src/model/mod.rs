//! Core data model for playable items.
//!
//! Defines the value types shared by the playlist engine and the player
//! interface: [`Track`], [`Artist`], and [`Album`].
//!
//! Tracks are plain values. Two tracks describe the same logical item iff
//! their URIs match, regardless of the protocol id minted for each
//! instance.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Display name used when neither an override nor a title tag exists.
pub const DEFAULT_TRACK_NAME: &str = "Default Track";

/// Player name used when minting track ids without an explicit player.
pub const DEFAULT_PLAYER_NAME: &str = "Track";

/// Ordering key meaning "no explicit rank".
pub const UNRANKED: i64 = -1;

/// Object path MPRIS reserves for "no current track".
pub const NO_TRACK_ID: &str = "/org/mpris/MediaPlayer2/TrackList/NoTrack";

/// A performing artist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Artist {
    pub name: String,
}

impl Artist {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Build a list of artists from names.
pub fn artists<I, S>(names: I) -> Vec<Artist>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(Artist::new).collect()
}

/// An album a track belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Album {
    pub name: String,
    /// Artwork reference (URL or file URI)
    pub art_url: Option<String>,
    /// Album artists (may be empty)
    pub artists: Vec<Artist>,
}

impl Album {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_artists(mut self, artists: Vec<Artist>) -> Self {
        self.artists = artists;
        self
    }
}

/// One playable item and its metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Track {
    pub album: Option<Album>,
    pub art_url: Option<String>,
    pub artists: Vec<Artist>,
    /// Length in microseconds (0 = unknown)
    pub length: i64,
    pub name: String,
    /// Protocol-stable object path, unique per track instance
    pub track_id: String,
    /// Ordering key, [`UNRANKED`] when the track has no explicit rank
    pub order_id: i64,
    pub track_number: Option<u32>,
    /// Resource locator for the audio data
    pub uri: String,
}

impl Track {
    /// Create a track for `uri` with default metadata and a fresh id.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            album: None,
            art_url: None,
            artists: Vec::new(),
            length: 0,
            name: DEFAULT_TRACK_NAME.to_string(),
            track_id: track_id(DEFAULT_PLAYER_NAME),
            order_id: UNRANKED,
            track_number: None,
            uri: uri.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_artists(mut self, artists: Vec<Artist>) -> Self {
        self.artists = artists;
        self
    }

    pub fn with_album(mut self, album: Album) -> Self {
        self.album = Some(album);
        self
    }

    pub fn with_order_id(mut self, order_id: i64) -> Self {
        self.order_id = order_id;
        self
    }

    /// Set the length in microseconds (negative values clamp to 0).
    pub fn with_length(mut self, micros: i64) -> Self {
        self.length = micros.max(0);
        self
    }

    pub fn with_track_number(mut self, number: u32) -> Self {
        self.track_number = Some(number);
        self
    }

    pub fn with_art_url(mut self, url: impl Into<String>) -> Self {
        self.art_url = Some(url.into());
        self
    }

    pub fn with_track_id(mut self, track_id: impl Into<String>) -> Self {
        self.track_id = track_id.into();
        self
    }

    /// Whether this track carries an explicit ordering rank.
    pub fn is_ranked(&self) -> bool {
        self.order_id != UNRANKED
    }

    /// Whether `other` describes the same logical item.
    pub fn same_item(&self, other: &Track) -> bool {
        self.uri == other.uri
    }

    /// Names of all track artists, in order.
    pub fn artist_names(&self) -> Vec<String> {
        self.artists.iter().map(|a| a.name.clone()).collect()
    }

    /// First listed artist, if any.
    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(|a| a.name.as_str())
    }

    pub fn album_name(&self) -> Option<&str> {
        self.album.as_ref().map(|a| a.name.as_str())
    }

    /// Local file path behind a `file://` URI.
    pub fn path(&self) -> Option<PathBuf> {
        path_from_uri(&self.uri)
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.same_item(other)
    }
}

impl Eq for Track {}

/// Mint a protocol-stable track id: `/org/mpris/MediaPlayer2/<player>/<uuid>`.
///
/// Object path elements only allow `[A-Za-z0-9_]`, so other characters in
/// the player name and the uuid hyphens become underscores.
pub fn track_id(player_name: &str) -> String {
    let player: String = player_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let player = if player.is_empty() {
        DEFAULT_PLAYER_NAME.to_string()
    } else {
        player
    };
    let id = uuid::Uuid::new_v4().to_string().replace('-', "_");
    format!("/org/mpris/MediaPlayer2/{}/{}", player, id)
}

/// Convert a local path into an absolute, percent-encoded `file://` URI.
pub fn uri_from_path(path: &Path) -> std::io::Result<String> {
    let absolute = std::path::absolute(path)?;
    let encoded: Vec<String> = absolute
        .to_string_lossy()
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    Ok(format!("file://{}", encoded.join("/")))
}

/// Convert a `file://` URI back into a local path.
///
/// Returns `None` for other schemes or undecodable input.
pub fn path_from_uri(uri: &str) -> Option<PathBuf> {
    let encoded = uri.strip_prefix("file://")?;
    let decoded = urlencoding::decode(encoded).ok()?;
    Some(PathBuf::from(decoded.into_owned()))
}
