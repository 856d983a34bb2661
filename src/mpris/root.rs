//! `org.mpris.MediaPlayer2`: identity and capabilities.

use zbus::interface;

/// Static player identity. Raise and Quit are accepted and ignored.
#[derive(Debug, Clone)]
pub struct RootInterface {
    identity: String,
    desktop_entry: String,
}

impl RootInterface {
    pub fn new(identity: impl Into<String>, desktop_entry: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            desktop_entry: desktop_entry.into(),
        }
    }
}

#[interface(name = "org.mpris.MediaPlayer2")]
impl RootInterface {
    fn raise(&self) {}

    fn quit(&self) {}

    #[zbus(property)]
    fn identity(&self) -> String {
        self.identity.clone()
    }

    #[zbus(property)]
    fn desktop_entry(&self) -> String {
        self.desktop_entry.clone()
    }

    #[zbus(property)]
    fn supported_uri_schemes(&self) -> Vec<String> {
        vec!["file".to_string()]
    }

    #[zbus(property)]
    fn supported_mime_types(&self) -> Vec<String> {
        vec!["audio/mpeg".to_string(), "audio/x-wav".to_string()]
    }

    #[zbus(property)]
    fn can_raise(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn can_quit(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn has_track_list(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        let root = RootInterface::new("ElevenLabs TTS", "elevenlabs-tts");
        assert_eq!(root.identity(), "ElevenLabs TTS");
        assert_eq!(root.desktop_entry(), "elevenlabs-tts");
        assert_eq!(root.supported_uri_schemes(), vec!["file"]);
        assert_eq!(root.supported_mime_types(), vec!["audio/mpeg", "audio/x-wav"]);
        assert!(!root.can_raise() && !root.can_quit() && !root.has_track_list());
    }
}
