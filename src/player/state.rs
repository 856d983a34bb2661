//! Player session state, snapshots, and change notifications.

use std::fmt;
use std::str::FromStr;

use super::PlayerError;
use super::playlist::RepeatMode;
use crate::model::{NO_TRACK_ID, Track};

/// Current playback status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl PlaybackStatus {
    /// Protocol-facing name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackStatus::Stopped => "Stopped",
            PlaybackStatus::Playing => "Playing",
            PlaybackStatus::Paused => "Paused",
        }
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol-facing repeat setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopStatus {
    #[default]
    None,
    Track,
    Playlist,
}

impl LoopStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopStatus::None => "None",
            LoopStatus::Track => "Track",
            LoopStatus::Playlist => "Playlist",
        }
    }

    /// The playlist repeat mode this loop status maps onto.
    pub fn repeat_mode(self) -> RepeatMode {
        match self {
            LoopStatus::None => RepeatMode::Off,
            LoopStatus::Track => RepeatMode::One,
            LoopStatus::Playlist => RepeatMode::All,
        }
    }
}

impl fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoopStatus {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(LoopStatus::None),
            "Track" => Ok(LoopStatus::Track),
            "Playlist" => Ok(LoopStatus::Playlist),
            _ => Err(PlayerError::InvalidLoopStatus(s.to_string())),
        }
    }
}

/// Metadata derived from the current track, in protocol terms.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataSnapshot {
    pub track_id: String,
    pub art_url: Option<String>,
    pub title: String,
    pub url: Option<String>,
    pub artists: Vec<String>,
    pub album: Option<String>,
    /// Length in microseconds
    pub length: i64,
}

impl MetadataSnapshot {
    pub fn from_track(track: &Track) -> Self {
        Self {
            track_id: track.track_id.clone(),
            art_url: track
                .art_url
                .clone()
                .or_else(|| track.album.as_ref().and_then(|a| a.art_url.clone())),
            title: track.name.clone(),
            url: Some(track.uri.clone()),
            artists: track.artist_names(),
            album: track.album_name().map(str::to_string),
            length: track.length,
        }
    }

    /// Placeholder published when no track is loaded.
    pub fn no_track() -> Self {
        Self {
            track_id: NO_TRACK_ID.to_string(),
            art_url: None,
            title: "No Track".to_string(),
            url: None,
            artists: Vec::new(),
            album: None,
            length: 0,
        }
    }
}

impl Default for MetadataSnapshot {
    fn default() -> Self {
        Self::no_track()
    }
}

/// Read-only view of the session used to answer property reads.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub status: PlaybackStatus,
    pub loop_status: LoopStatus,
    pub shuffle: bool,
    /// Protocol-facing volume in [0, 1]
    pub volume: f64,
    /// Microseconds
    pub position: i64,
    pub metadata: MetadataSnapshot,
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            status: PlaybackStatus::Stopped,
            loop_status: LoopStatus::None,
            shuffle: false,
            volume: 1.0,
            position: 0,
            metadata: MetadataSnapshot::no_track(),
        }
    }
}

/// Player properties that can change or be invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    PlaybackStatus,
    LoopStatus,
    Shuffle,
    Volume,
    Metadata,
    Position,
}

impl Property {
    /// Protocol property name.
    pub fn name(&self) -> &'static str {
        match self {
            Property::PlaybackStatus => "PlaybackStatus",
            Property::LoopStatus => "LoopStatus",
            Property::Shuffle => "Shuffle",
            Property::Volume => "Volume",
            Property::Metadata => "Metadata",
            Property::Position => "Position",
        }
    }
}

/// A changed property with its new value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyChange {
    PlaybackStatus(PlaybackStatus),
    LoopStatus(LoopStatus),
    Shuffle(bool),
    Volume(f64),
    Metadata(MetadataSnapshot),
    Position(i64),
}

impl PropertyChange {
    pub fn property(&self) -> Property {
        match self {
            PropertyChange::PlaybackStatus(_) => Property::PlaybackStatus,
            PropertyChange::LoopStatus(_) => Property::LoopStatus,
            PropertyChange::Shuffle(_) => Property::Shuffle,
            PropertyChange::Volume(_) => Property::Volume,
            PropertyChange::Metadata(_) => Property::Metadata,
            PropertyChange::Position(_) => Property::Position,
        }
    }
}

/// Notifications emitted by the player session, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    PropertiesChanged {
        changed: Vec<PropertyChange>,
        invalidated: Vec<Property>,
    },
    /// New absolute position in microseconds
    Seeked(i64),
}

impl PlayerEvent {
    pub fn changed(change: PropertyChange) -> Self {
        PlayerEvent::PropertiesChanged {
            changed: vec![change],
            invalidated: Vec::new(),
        }
    }

    pub fn invalidated(property: Property) -> Self {
        PlayerEvent::PropertiesChanged {
            changed: Vec::new(),
            invalidated: vec![property],
        }
    }
}

/// Why a session ended on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// End of stream with loop status None
    Finished,
    /// Playlist advance found nothing to play
    Exhausted,
}

/// Format microseconds as MM:SS or HH:MM:SS.
pub fn format_micros(micros: i64) -> String {
    let secs = micros.max(0) / 1_000_000;
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}
