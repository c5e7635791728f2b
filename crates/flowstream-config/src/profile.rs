//! Stream profile file format and operations.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::validation::{ValidatedProfile, validate_profile};

/// A named set of stream settings.
///
/// Profiles are stored as TOML files. Enumerated settings are kept as their
/// lowercase names and checked by [`validate_profile`].
///
/// # TOML Format
///
/// ```toml
/// name = "low-latency"
/// description = "Small buffers for interactive playback"
/// format = "s16le"
/// rate = 48000
/// channels = 2
/// latency_usec = 20000
/// direction = "playback"
/// flags = ["adjust_latency", "auto_timing_update"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamProfile {
    /// Name of the profile, also announced as the stream name.
    pub name: String,

    /// Optional description of the profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Sample format name (defaults to `s16le`).
    #[serde(default = "default_format")]
    pub format: String,

    /// Sample rate in Hz (defaults to 44100).
    #[serde(default = "default_rate")]
    pub rate: u32,

    /// Channel count (defaults to 2).
    #[serde(default = "default_channels")]
    pub channels: u8,

    /// Latency target in microseconds. Zero leaves buffering to the transport.
    #[serde(default)]
    pub latency_usec: u64,

    /// Direction name (defaults to `playback`).
    #[serde(default = "default_direction")]
    pub direction: String,

    /// Device to connect to. Unset means the default device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    /// Stream flag names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

fn default_format() -> String {
    flowstream::SampleFormat::S16Le.name().to_string()
}

fn default_rate() -> u32 {
    44100
}

fn default_channels() -> u8 {
    2
}

fn default_direction() -> String {
    flowstream::Direction::Playback.name().to_string()
}

impl StreamProfile {
    /// Create a profile with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            format: default_format(),
            rate: default_rate(),
            channels: default_channels(),
            latency_usec: 0,
            direction: default_direction(),
            device: None,
            flags: Vec::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the sample format by name.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Set the sample rate.
    pub fn with_rate(mut self, rate: u32) -> Self {
        self.rate = rate;
        self
    }

    /// Set the channel count.
    pub fn with_channels(mut self, channels: u8) -> Self {
        self.channels = channels;
        self
    }

    /// Set the latency target.
    pub fn with_latency_usec(mut self, latency_usec: u64) -> Self {
        self.latency_usec = latency_usec;
        self
    }

    /// Set the direction by name.
    pub fn with_direction(mut self, direction: impl Into<String>) -> Self {
        self.direction = direction.into();
        self
    }

    /// Set the device.
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Add a stream flag by name.
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    /// Load a profile from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let profile: StreamProfile = toml::from_str(&content)?;
        Ok(profile)
    }

    /// Load a profile from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the profile to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the profile to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the profile and turn it into engine settings.
    pub fn resolve(&self) -> Result<ValidatedProfile, ConfigError> {
        Ok(validate_profile(self)?)
    }
}

impl Default for StreamProfile {
    fn default() -> Self {
        Self::new(flowstream::DEFAULT_STREAM_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let profile = StreamProfile::from_toml("name = \"bare\"").unwrap();
        assert_eq!(profile.format, "s16le");
        assert_eq!(profile.rate, 44100);
        assert_eq!(profile.channels, 2);
        assert_eq!(profile.latency_usec, 0);
        assert_eq!(profile.direction, "playback");
        assert!(profile.device.is_none());
        assert!(profile.flags.is_empty());
    }

    #[test]
    fn builder_matches_parsed() {
        let parsed = StreamProfile::from_toml(
            r#"
name = "mic"
format = "f32le"
rate = 48000
channels = 1
latency_usec = 10000
direction = "record"
device = "usb"
flags = ["start_corked"]
"#,
        )
        .unwrap();

        let built = StreamProfile::new("mic")
            .with_format("f32le")
            .with_rate(48000)
            .with_channels(1)
            .with_latency_usec(10_000)
            .with_direction("record")
            .with_device("usb")
            .with_flag("start_corked");

        assert_eq!(parsed, built);
    }

    #[test]
    fn toml_output_omits_unset_fields() {
        let toml = StreamProfile::new("plain").to_toml().unwrap();
        assert!(!toml.contains("device"));
        assert!(!toml.contains("flags"));
        assert!(!toml.contains("description"));
        assert!(toml.contains("format = \"s16le\""));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let result = StreamProfile::from_toml("name = ");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn default_profile_uses_stream_name() {
        assert_eq!(StreamProfile::default().name, "flowstream");
    }
}
