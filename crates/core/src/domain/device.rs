//! Device identity and media classes
//!
//! A device is identified by the backend type that drives it, the source the
//! backend found it on, and a human readable name. Identities travel across
//! threads by value and persist as a single `"name (type/source)"` string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Errors produced when parsing the device identity wire format
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceIdentityError {
    /// The `" (type/source)"` suffix is missing or not terminated
    #[error("Missing backend suffix in device string: {0:?}")]
    MissingSuffix(String),

    /// The suffix has no `/` between type and source
    #[error("Missing type/source separator in device string: {0:?}")]
    MissingSeparator(String),

    /// One of name, type or source is empty
    #[error("Empty component in device string: {0:?}")]
    EmptyComponent(String),
}

/// Media class served by a core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaClass {
    AudioInput,
    AudioOutput,
    VideoInput,
}

impl MediaClass {
    pub fn label(&self) -> &'static str {
        match self {
            MediaClass::AudioInput => "audio-input",
            MediaClass::AudioOutput => "audio-output",
            MediaClass::VideoInput => "video-input",
        }
    }
}

impl fmt::Display for MediaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Logical playback path
///
/// Capture cores only ever use `Primary`. The audio output core drives two
/// independent paths so that event sounds can ring on a different device
/// than the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    #[default]
    Primary,
    Secondary,
}

impl Lane {
    pub fn other(self) -> Self {
        match self {
            Lane::Primary => Lane::Secondary,
            Lane::Secondary => Lane::Primary,
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::Primary => f.write_str("primary"),
            Lane::Secondary => f.write_str("secondary"),
        }
    }
}

/// Backend type and source shared by every fallback identity
pub const FALLBACK_TYPE: &str = "Minstrel";
pub const FALLBACK_SOURCE: &str = "Minstrel";
/// Name of the silent audio device (both directions)
pub const AUDIO_FALLBACK_NAME: &str = "Silent";
/// Name of the synthetic video device
pub const VIDEO_FALLBACK_NAME: &str = "Test pattern";

/// Identity of a hardware (or synthetic) endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DeviceIdentity {
    pub device_type: String,
    pub source: String,
    pub name: String,
}

impl DeviceIdentity {
    pub fn new(
        device_type: impl Into<String>,
        source: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            device_type: device_type.into(),
            source: source.into(),
            name: name.into(),
        }
    }

    /// The always-available device for a media class
    pub fn fallback(class: MediaClass) -> Self {
        let name = match class {
            MediaClass::AudioInput | MediaClass::AudioOutput => AUDIO_FALLBACK_NAME,
            MediaClass::VideoInput => VIDEO_FALLBACK_NAME,
        };
        Self::new(FALLBACK_TYPE, FALLBACK_SOURCE, name)
    }

    pub fn is_fallback(&self, class: MediaClass) -> bool {
        *self == Self::fallback(class)
    }

    /// Parse the wire format, normalizing anything malformed to the fallback
    pub fn parse_or_fallback(text: &str, class: MediaClass) -> Self {
        match text.parse() {
            Ok(identity) => identity,
            Err(e) => {
                warn!(class = %class, error = %e, "Malformed device string, using fallback device");
                Self::fallback(class)
            }
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}/{})", self.name, self.device_type, self.source)
    }
}

impl FromStr for DeviceIdentity {
    type Err = DeviceIdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .trim_end()
            .strip_suffix(')')
            .ok_or_else(|| DeviceIdentityError::MissingSuffix(s.to_string()))?;

        // Names may contain parentheses themselves, the backend part is the last one
        let split = body
            .rfind(" (")
            .ok_or_else(|| DeviceIdentityError::MissingSuffix(s.to_string()))?;
        let name = body[..split].trim();
        let backend = &body[split + 2..];

        let (device_type, source) = backend
            .split_once('/')
            .ok_or_else(|| DeviceIdentityError::MissingSeparator(s.to_string()))?;
        let (device_type, source) = (device_type.trim(), source.trim());

        if name.is_empty() || device_type.is_empty() || source.is_empty() {
            return Err(DeviceIdentityError::EmptyComponent(s.to_string()));
        }

        Ok(Self::new(device_type, source, name))
    }
}

impl From<DeviceIdentity> for String {
    fn from(identity: DeviceIdentity) -> Self {
        identity.to_string()
    }
}

impl TryFrom<String> for DeviceIdentity {
    type Error = DeviceIdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_display_format() {
        let id = DeviceIdentity::new("ALSA", "hw", "Built-in Microphone");
        assert_eq!(id.to_string(), "Built-in Microphone (ALSA/hw)");
    }

    #[test]
    fn test_parse_nested_parentheses() {
        let id: DeviceIdentity = "USB Audio (Rev 2) (ALSA/hw:1)".parse().unwrap();
        assert_eq!(id.name, "USB Audio (Rev 2)");
        assert_eq!(id.device_type, "ALSA");
        assert_eq!(id.source, "hw:1");
    }

    #[test]
    fn test_parse_source_with_slash() {
        let id: DeviceIdentity = "Webcam (V4L2//dev/video0)".parse().unwrap();
        assert_eq!(id.device_type, "V4L2");
        assert_eq!(id.source, "/dev/video0");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "no suffix".parse::<DeviceIdentity>(),
            Err(DeviceIdentityError::MissingSuffix(_))
        ));
        assert!(matches!(
            "name (noslash)".parse::<DeviceIdentity>(),
            Err(DeviceIdentityError::MissingSeparator(_))
        ));
        assert!(matches!(
            " (ALSA/hw)".parse::<DeviceIdentity>(),
            Err(DeviceIdentityError::EmptyComponent(_))
        ));
    }

    #[test]
    fn test_garbage_normalizes_to_fallback() {
        for garbage in ["", "(((", "x (/)", "Mic (ALSA/hw", "Mic ALSA/hw)"] {
            assert_eq!(
                DeviceIdentity::parse_or_fallback(garbage, MediaClass::AudioInput),
                DeviceIdentity::fallback(MediaClass::AudioInput),
                "input {garbage:?}"
            );
        }
        assert_eq!(
            DeviceIdentity::parse_or_fallback("junk", MediaClass::VideoInput).name,
            VIDEO_FALLBACK_NAME
        );
    }

    #[test]
    fn test_fallback_round_trips() {
        for class in [MediaClass::AudioInput, MediaClass::AudioOutput, MediaClass::VideoInput] {
            let fallback = DeviceIdentity::fallback(class);
            assert!(fallback.is_fallback(class));
            assert_eq!(fallback.to_string().parse::<DeviceIdentity>().unwrap(), fallback);
        }
    }

    #[test]
    fn test_serde_uses_wire_string() {
        #[derive(Serialize, Deserialize)]
        struct Holder {
            device: DeviceIdentity,
        }

        let holder = Holder {
            device: DeviceIdentity::new("CPAL", "ALSA", "default"),
        };
        let text = toml::to_string(&holder).unwrap();
        assert_eq!(text.trim(), r#"device = "default (CPAL/ALSA)""#);

        let parsed: Holder = toml::from_str(&text).unwrap();
        assert_eq!(parsed.device, holder.device);
    }

    #[test]
    fn test_lane_other() {
        assert_eq!(Lane::Primary.other(), Lane::Secondary);
        assert_eq!(Lane::Secondary.other(), Lane::Primary);
    }

    fn component() -> impl Strategy<Value = String> {
        // Names keep inner spaces and parentheses but no surrounding whitespace
        "[A-Za-z0-9_:.-]([A-Za-z0-9 _:.()-]{0,12}[A-Za-z0-9_:.)-])?"
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            name in component(),
            device_type in "[A-Za-z0-9_-]{1,8}",
            source in "[A-Za-z0-9_:./()-]{1,12}",
        ) {
            let id = DeviceIdentity::new(device_type, source, name);
            let parsed: DeviceIdentity = id.to_string().parse().unwrap();
            prop_assert_eq!(parsed, id);
        }
    }
}
