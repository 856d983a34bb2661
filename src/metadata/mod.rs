//! Audio file metadata reading and writing.
//!
//! Uses the lofty crate for format-independent tag access. Generated speech
//! clips carry extra ID3v2 user text frames (`order_id`, `text_hash`,
//! `full_text`) which are read back when rebuilding a playlist from history.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use lofty::config::{ParseOptions, WriteOptions};
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::id3::v2::Id3v2Tag;
use lofty::mpeg::MpegFile;
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, TagExt};
use tracing::debug;

use crate::model::{Album, Artist, Track, UNRANKED, uri_from_path};

/// Album name written to generated clips.
pub const CLIP_ALBUM: &str = "ElevenLabs TTS";

/// User text frame descriptions on generated clips.
pub const ORDER_ID_FRAME: &str = "order_id";
pub const TEXT_HASH_FRAME: &str = "text_hash";
pub const FULL_TEXT_FRAME: &str = "full_text";

const TITLE_CHARS: usize = 40;

/// Tag values read from a file. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileMetadata {
    pub title: Option<String>,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub album_artists: Vec<String>,
    pub track_number: Option<u32>,
    /// Microseconds
    pub length: Option<i64>,
    pub order_id: Option<i64>,
}

pub fn read(path: &Path) -> Result<FileMetadata> {
    let tagged_file = Probe::open(path)
        .context("Failed to open file for probing")?
        .read()
        .context("Failed to read file metadata")?;

    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag());

    let length = tagged_file.properties().duration();
    let length = (!length.is_zero()).then(|| length.as_micros() as i64);

    let mut meta = FileMetadata {
        length,
        ..FileMetadata::default()
    };

    if let Some(tag) = tag {
        meta.title = tag.title().map(|s| s.to_string());
        meta.artists = tag.artist().map(|s| split_names(&s)).unwrap_or_default();
        meta.album = tag.album().map(|s| s.to_string());
        meta.album_artists = tag
            .get_string(&ItemKey::AlbumArtist)
            .map(split_names)
            .unwrap_or_default();
        meta.track_number = tag
            .get_string(&ItemKey::TrackNumber)
            .and_then(parse_track_number)
            .or_else(|| tag.track());
    }

    meta.order_id = read_user_text(path, ORDER_ID_FRAME).map(|text| parse_order_id(Some(&text)));

    Ok(meta)
}

/// Read one ID3v2 user text frame from an MPEG file.
pub fn read_user_text(path: &Path, description: &str) -> Option<String> {
    let mut file = File::open(path).ok()?;
    let mpeg = MpegFile::read_from(&mut file, ParseOptions::new()).ok()?;
    mpeg.id3v2()?
        .get_user_text(description)
        .map(|s| s.to_string())
}

/// Split a multi-valued tag ("A / B") into trimmed names.
pub fn split_names(value: &str) -> Vec<String> {
    value
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// "3" and "3/12" both yield 3.
pub fn parse_track_number(value: &str) -> Option<u32> {
    value.split('/').next()?.trim().parse().ok()
}

/// Missing or unparseable ordering keys rank below everything else.
pub fn parse_order_id(value: Option<&str>) -> i64 {
    value
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(UNRANKED)
}

/// Explicit values that win over what the file says.
#[derive(Debug, Clone, Default)]
pub struct TrackOverrides {
    pub name: Option<String>,
    pub artists: Option<Vec<String>>,
    pub album: Option<String>,
    pub track_number: Option<u32>,
    /// Microseconds
    pub length: Option<i64>,
    pub order_id: Option<i64>,
}

/// Build a playable track for a local file.
///
/// Overrides take precedence over file tags, which take precedence over
/// defaults. Unreadable tags fall back to defaults; only a path that cannot
/// be made absolute is an error.
pub fn build_track(path: &Path, player_name: &str, overrides: &TrackOverrides) -> std::io::Result<Track> {
    let uri = uri_from_path(path)?;
    let file = read(path).unwrap_or_else(|e| {
        debug!(target: "metadata", path = %path.display(), error = %e, "No usable tags");
        FileMetadata::default()
    });

    let file_name = file.title.clone().or_else(|| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
    });

    let artists: Vec<Artist> = match &overrides.artists {
        Some(names) => names.iter().map(Artist::new).collect(),
        None => file.artists.iter().map(Artist::new).collect(),
    };

    let album = match &overrides.album {
        Some(name) => Some(Album::new(name.clone()).with_artists(artists.clone())),
        None => file.album.as_ref().map(|name| {
            Album::new(name.clone())
                .with_artists(file.album_artists.iter().map(Artist::new).collect())
        }),
    };

    let mut track = Track::new(uri)
        .with_track_id(crate::model::track_id(player_name))
        .with_artists(artists)
        .with_order_id(overrides.order_id.or(file.order_id).unwrap_or(UNRANKED))
        .with_length(overrides.length.or(file.length).unwrap_or(0));

    if let Some(name) = overrides.name.clone().or(file_name) {
        track = track.with_name(name);
    }
    if let Some(album) = album {
        track = track.with_album(album);
    }
    if let Some(number) = overrides.track_number.or(file.track_number) {
        track = track.with_track_number(number);
    }

    Ok(track)
}

/// Tags written to a freshly generated clip.
#[derive(Debug, Clone)]
pub struct ClipTags<'a> {
    pub text: &'a str,
    pub voice_name: &'a str,
    pub order_id: i64,
    pub text_hash: &'a str,
}

/// Title for a clip: the first forty characters of its text.
pub fn clip_title(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(TITLE_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Artist for a clip: the first word of the voice name.
pub fn clip_artist(voice_name: &str) -> String {
    voice_name
        .split_whitespace()
        .next()
        .unwrap_or(voice_name)
        .to_string()
}

/// Write ID3v2 tags to a generated MP3 clip.
pub fn write_clip_tags(path: &Path, tags: &ClipTags<'_>) -> Result<()> {
    let mut file = File::open(path).context("Failed to open clip for tagging")?;
    let mpeg = MpegFile::read_from(&mut file, ParseOptions::new())
        .context("Failed to read clip as MPEG audio")?;
    let mut tag = mpeg.id3v2().cloned().unwrap_or_else(Id3v2Tag::new);

    tag.set_title(clip_title(tags.text));
    tag.set_artist(clip_artist(tags.voice_name));
    tag.set_album(CLIP_ALBUM.to_string());
    tag.insert_user_text(ORDER_ID_FRAME.to_string(), tags.order_id.to_string());
    tag.insert_user_text(TEXT_HASH_FRAME.to_string(), tags.text_hash.to_string());
    tag.insert_user_text(FULL_TEXT_FRAME.to_string(), tags.text.to_string());

    tag.save_to_path(path, WriteOptions::default())
        .context("Failed to write tags to clip")?;

    debug!(target: "metadata", path = %path.display(), order_id = tags.order_id, "Clip tagged");
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Write a short silent MPEG-1 Layer III stream (128 kbps, 44.1 kHz).
    pub(crate) fn write_silent_mp3(path: &Path, frames: usize) {
        const FRAME_LEN: usize = 417;
        let mut bytes = Vec::with_capacity(FRAME_LEN * frames);
        for _ in 0..frames {
            let mut frame = vec![0u8; FRAME_LEN];
            frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
            bytes.extend(frame);
        }
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_split_names() {
        assert_eq!(split_names(" Alice / Bob /"), vec!["Alice", "Bob"]);
        assert!(split_names("  ").is_empty());
    }

    #[test]
    fn test_parse_track_number() {
        assert_eq!(parse_track_number("3/12"), Some(3));
        assert_eq!(parse_track_number("7"), Some(7));
        assert_eq!(parse_track_number("x"), None);
    }

    #[test]
    fn test_parse_order_id() {
        assert_eq!(parse_order_id(Some("12")), 12);
        assert_eq!(parse_order_id(Some("twelve")), UNRANKED);
        assert_eq!(parse_order_id(None), UNRANKED);
    }

    #[test]
    fn test_clip_title_and_artist() {
        assert_eq!(clip_title("Hello"), "Hello");
        let long = "a".repeat(50);
        assert_eq!(clip_title(&long), format!("{}...", "a".repeat(40)));
        assert_eq!(clip_artist("Rachel Green"), "Rachel");
        assert_eq!(clip_artist(""), "");
    }

    #[test]
    fn test_build_track_without_tags_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note one.mp3");
        std::fs::write(&path, b"not audio").unwrap();

        let track = build_track(&path, "Track", &TrackOverrides::default()).unwrap();
        assert_eq!(track.name, "note one");
        assert_eq!(track.order_id, UNRANKED);
        assert_eq!(track.length, 0);
        assert!(track.artists.is_empty());
        assert!(track.uri.starts_with("file://"));
        assert!(track.track_id.starts_with("/org/mpris/MediaPlayer2/Track/"));
    }

    #[test]
    fn test_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp3");
        std::fs::write(&path, b"not audio").unwrap();

        let overrides = TrackOverrides {
            name: Some("Greeting".into()),
            artists: Some(vec!["Rachel".into()]),
            album: Some("Drafts".into()),
            track_number: Some(2),
            length: Some(5_000_000),
            order_id: Some(9),
        };
        let track = build_track(&path, "Track", &overrides).unwrap();

        assert_eq!(track.name, "Greeting");
        assert_eq!(track.artist_names(), vec!["Rachel".to_string()]);
        assert_eq!(track.album_name(), Some("Drafts"));
        assert_eq!(track.track_number, Some(2));
        assert_eq!(track.length, 5_000_000);
        assert_eq!(track.order_id, 9);
    }

    #[test]
    fn test_clip_tags_are_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp3");
        write_silent_mp3(&path, 20);

        write_clip_tags(
            &path,
            &ClipTags {
                text: "Read this aloud please",
                voice_name: "Rachel Green",
                order_id: 4,
                text_hash: "abc123",
            },
        )
        .unwrap();

        assert_eq!(read_user_text(&path, TEXT_HASH_FRAME).as_deref(), Some("abc123"));
        let track = build_track(&path, "Track", &TrackOverrides::default()).unwrap();
        assert_eq!(track.name, "Read this aloud please");
        assert_eq!(track.primary_artist(), Some("Rachel"));
        assert_eq!(track.album_name(), Some(CLIP_ALBUM));
        assert_eq!(track.order_id, 4);
    }
}
