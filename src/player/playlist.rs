//! Playlist ordering, navigation, and play history.

use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use serde::Serialize;

use crate::model::{Track, UNRANKED};

/// Errors from playlist configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaylistError {
    #[error("Invalid repeat mode '{0}': expected off, all, or one")]
    InvalidRepeatMode(String),
}

/// Repeat mode for the playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    /// Repeat entire playlist
    All,
    /// Repeat current track
    One,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::All => "all",
            RepeatMode::One => "one",
        }
    }

    /// Next mode in the off → all → one cycle.
    pub fn cycled(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::Off,
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepeatMode {
    type Err = PlaylistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(RepeatMode::Off),
            "all" => Ok(RepeatMode::All),
            "one" => Ok(RepeatMode::One),
            _ => Err(PlaylistError::InvalidRepeatMode(s.to_string())),
        }
    }
}

/// Serializable summary of the playlist state.
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackInfo {
    pub total_tracks: usize,
    pub shuffle: bool,
    pub repeat: RepeatMode,
    pub current_track: Option<CurrentTrackInfo>,
    pub history_size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentTrackInfo {
    pub uri: String,
    pub name: String,
    pub order_id: i64,
    pub artists: Vec<String>,
}

/// Ordered track list with shuffle/repeat navigation and play history.
///
/// Tracks stay sorted by `order_id` descending with unranked tracks last,
/// in insertion order. The shuffle lap is a permutation of track ids that
/// lives until it wraps or shuffle is toggled.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    tracks: Vec<Track>,
    current: Option<Track>,
    shuffle: bool,
    repeat: RepeatMode,
    history: Vec<Track>,
    /// Track ids in shuffled visiting order for the current lap
    lap: Vec<String>,
    /// Index of the last lap entry handed out by `next`
    lap_cursor: Option<usize>,
}

impl Playlist {
    pub fn new(tracks: Vec<Track>) -> Self {
        let mut playlist = Self::default();
        playlist.add_many(tracks);
        playlist
    }

    pub fn with_modes(tracks: Vec<Track>, shuffle: bool, repeat: RepeatMode) -> Self {
        let mut playlist = Self::new(tracks);
        playlist.shuffle = shuffle;
        playlist.repeat = repeat;
        playlist
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// All tracks in sorted order.
    pub fn sorted_tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &[Track] {
        &self.history
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.find(uri).is_some()
    }

    /// Look up the first track with `uri`.
    pub fn find(&self, uri: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.uri == uri)
    }

    pub fn by_artist(&self, name: &str) -> Vec<&Track> {
        self.tracks
            .iter()
            .filter(|t| t.artists.iter().any(|a| a.name == name))
            .collect()
    }

    pub fn by_album(&self, name: &str) -> Vec<&Track> {
        self.tracks
            .iter()
            .filter(|t| t.album_name() == Some(name))
            .collect()
    }

    /// Append a track and restore the sort order.
    pub fn add(&mut self, track: Track) {
        let id = track.track_id.clone();
        self.tracks.push(track);
        self.sort();
        self.insert_into_lap(id);
    }

    pub fn add_many(&mut self, tracks: impl IntoIterator<Item = Track>) {
        let ids: Vec<String> = tracks
            .into_iter()
            .map(|track| {
                let id = track.track_id.clone();
                self.tracks.push(track);
                id
            })
            .collect();
        self.sort();
        for id in ids {
            self.insert_into_lap(id);
        }
    }

    /// Remove the first track with `uri`.
    ///
    /// Clears the current track if it matches and purges the uri from the
    /// play history. Returns whether a track was removed.
    pub fn remove(&mut self, uri: &str) -> bool {
        let Some(index) = self.tracks.iter().position(|t| t.uri == uri) else {
            return false;
        };
        let removed = self.tracks.remove(index);

        if self.current.as_ref().is_some_and(|c| c.same_item(&removed)) {
            self.current = None;
        }
        if let Some(lap_index) = self.lap.iter().position(|id| *id == removed.track_id) {
            self.lap.remove(lap_index);
            // keep the cursor on the last visited entry that survives
            self.lap_cursor = match self.lap_cursor {
                Some(cursor) if lap_index <= cursor => cursor.checked_sub(1),
                cursor => cursor,
            };
        }

        self.history.retain(|t| t.uri != uri);
        self.history.dedup_by(|a, b| a.same_item(b));
        true
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn set_shuffle(&mut self, enabled: bool) {
        self.shuffle = enabled;
        self.lap.clear();
        self.lap_cursor = None;
    }

    pub fn toggle_shuffle(&mut self) {
        self.set_shuffle(!self.shuffle);
    }

    pub fn set_repeat(&mut self, mode: RepeatMode) {
        self.repeat = mode;
    }

    /// Set the repeat mode from its textual name.
    pub fn set_repeat_str(&mut self, mode: &str) -> Result<(), PlaylistError> {
        self.repeat = mode.parse()?;
        Ok(())
    }

    pub fn toggle_repeat(&mut self) {
        self.repeat = self.repeat.cycled();
    }

    /// A fresh random permutation of all tracks. Does not touch the lap.
    pub fn shuffled_tracks(&self) -> Vec<Track> {
        let mut tracks = self.tracks.clone();
        tracks.shuffle(&mut rand::rng());
        tracks
    }

    /// Advance to the next track per the current shuffle/repeat modes.
    ///
    /// Returns `None` when the playlist is empty or the end is reached with
    /// repeat off.
    pub fn next(&mut self) -> Option<Track> {
        if self.tracks.is_empty() {
            return None;
        }

        let repeat_one = self.repeat == RepeatMode::One;
        let next = if let Some(current) = self.current.as_ref().filter(|_| repeat_one) {
            current.clone()
        } else if self.shuffle {
            self.next_shuffled()?
        } else {
            self.next_sorted()?
        };

        self.set_current(next.clone());
        Some(next)
    }

    /// Step back through the play history.
    ///
    /// Returns `None` while the history holds fewer than two entries.
    pub fn previous(&mut self) -> Option<Track> {
        if self.history.len() < 2 {
            return None;
        }
        self.history.pop();
        let previous = self.history.last().cloned();
        self.current = previous.clone();
        previous
    }

    /// Jump directly to the track with `uri`.
    pub fn play(&mut self, uri: &str) -> Option<Track> {
        let track = self.find(uri)?.clone();
        self.set_current(track.clone());
        Some(track)
    }

    pub fn playback_info(&self) -> PlaybackInfo {
        PlaybackInfo {
            total_tracks: self.tracks.len(),
            shuffle: self.shuffle,
            repeat: self.repeat,
            current_track: self.current.as_ref().map(|t| CurrentTrackInfo {
                uri: t.uri.clone(),
                name: t.name.clone(),
                order_id: t.order_id,
                artists: t.artist_names(),
            }),
            history_size: self.history.len(),
        }
    }

    fn sort(&mut self) {
        // Stable: unranked tracks keep their relative insertion order.
        self.tracks
            .sort_by_key(|t| (t.order_id == UNRANKED, Reverse(t.order_id)));
    }

    fn set_current(&mut self, track: Track) {
        if !self.history.last().is_some_and(|last| last.same_item(&track)) {
            self.history.push(track.clone());
        }
        self.current = Some(track);
    }

    /// Position of the current track in the sorted list.
    ///
    /// Matches the exact instance first so duplicate uris stay distinct.
    fn current_position(&self) -> Option<usize> {
        let current = self.current.as_ref()?;
        self.tracks
            .iter()
            .position(|t| t.track_id == current.track_id)
            .or_else(|| self.tracks.iter().position(|t| t.same_item(current)))
    }

    fn next_sorted(&self) -> Option<Track> {
        let index = self.current_position().map_or(0, |p| p + 1);
        match self.tracks.get(index) {
            Some(track) => Some(track.clone()),
            None if self.repeat == RepeatMode::All => self.tracks.first().cloned(),
            None => None,
        }
    }

    fn next_shuffled(&mut self) -> Option<Track> {
        if self.lap.is_empty() || (self.current.is_some() && self.current_lap_index().is_none()) {
            self.start_lap();
        }

        let mut index = self.lap_position().map_or(0, |p| p + 1);
        if index >= self.lap.len() {
            if self.repeat != RepeatMode::All {
                return None;
            }
            self.start_wrapped_lap();
            index = 0;
        }
        self.lap_cursor = Some(index);
        self.lap_track(index)
    }

    fn current_lap_index(&self) -> Option<usize> {
        let current = self.current.as_ref()?;
        self.lap.iter().position(|id| *id == current.track_id)
    }

    /// Where the lap stands: the current track, or the cursor once the
    /// current track is gone.
    fn lap_position(&self) -> Option<usize> {
        self.current_lap_index().or(self.lap_cursor)
    }

    fn lap_track(&self, index: usize) -> Option<Track> {
        let id = self.lap.get(index)?;
        self.tracks.iter().find(|t| t.track_id == *id).cloned()
    }

    fn random_lap(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tracks.iter().map(|t| t.track_id.clone()).collect();
        ids.shuffle(&mut rand::rng());
        ids
    }

    /// New lap with the current track (if any) first.
    fn start_lap(&mut self) {
        let mut ids = self.random_lap();
        if let Some(current) = &self.current
            && let Some(pos) = ids.iter().position(|id| *id == current.track_id)
        {
            let id = ids.remove(pos);
            ids.insert(0, id);
            self.lap_cursor = Some(0);
        } else {
            self.lap_cursor = None;
        }
        self.lap = ids;
    }

    /// Reshuffle at a wrap, avoiding an immediate replay of the last track.
    fn start_wrapped_lap(&mut self) {
        let mut ids = self.random_lap();
        let last = self.current.as_ref().map(|c| c.track_id.clone());
        if ids.len() > 1 && ids.first() == last.as_ref() {
            ids.rotate_left(1);
        }
        self.lap = ids;
        self.lap_cursor = None;
    }

    /// Insert a new track id at a random spot after the current lap position.
    fn insert_into_lap(&mut self, id: String) {
        if !self.shuffle || self.lap.is_empty() {
            return;
        }
        let insert_after = self.lap_position().map_or(0, |p| p + 1);
        let insert_pos = if insert_after >= self.lap.len() {
            self.lap.len()
        } else {
            let mut rng = rand::rng();
            rand::Rng::random_range(&mut rng, insert_after..=self.lap.len())
        };
        self.lap.insert(insert_pos, id);
    }
}
