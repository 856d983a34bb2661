//! Conversion of player state into bus values.

use std::collections::HashMap;

use zbus::zvariant::{ObjectPath, Value};

use crate::model::NO_TRACK_ID;
use crate::player::{MetadataSnapshot, PropertyChange};

/// The `Metadata` property as an `a{sv}` map.
///
/// Optional fields are omitted rather than sent empty.
pub fn metadata_map(meta: &MetadataSnapshot) -> HashMap<String, Value<'static>> {
    let mut map = HashMap::new();

    let track_id = ObjectPath::try_from(meta.track_id.clone())
        .unwrap_or_else(|_| ObjectPath::from_static_str_unchecked(NO_TRACK_ID));
    map.insert("mpris:trackid".to_string(), Value::from(track_id));
    map.insert("mpris:length".to_string(), Value::from(meta.length));
    map.insert("xesam:title".to_string(), Value::from(meta.title.clone()));
    map.insert("xesam:artist".to_string(), Value::from(meta.artists.clone()));

    if let Some(url) = &meta.art_url {
        map.insert("mpris:artUrl".to_string(), Value::from(url.clone()));
    }
    if let Some(url) = &meta.url {
        map.insert("xesam:url".to_string(), Value::from(url.clone()));
    }
    if let Some(album) = &meta.album {
        map.insert("xesam:album".to_string(), Value::from(album.clone()));
    }

    map
}

/// Bus value for a changed property.
pub fn change_value(change: &PropertyChange) -> Value<'static> {
    match change {
        PropertyChange::PlaybackStatus(status) => Value::from(status.as_str()),
        PropertyChange::LoopStatus(status) => Value::from(status.as_str()),
        PropertyChange::Shuffle(shuffle) => Value::from(*shuffle),
        PropertyChange::Volume(volume) => Value::from(*volume),
        PropertyChange::Metadata(meta) => Value::from(metadata_map(meta)),
        PropertyChange::Position(position) => Value::from(*position),
    }
}
