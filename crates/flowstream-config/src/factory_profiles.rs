//! Factory profiles bundled with the library.
//!
//! Always available without files on disk, and usable as starting points for
//! user profiles.

use crate::StreamProfile;

/// Factory profile names.
pub static FACTORY_PROFILE_NAMES: &[&str] = &["default", "low-latency", "voice-capture", "high-fidelity"];

/// TOML content for factory profiles, embedded at compile time.
static FACTORY_PROFILES_TOML: &[(&str, &str)] = &[
    ("default", DEFAULT_PROFILE),
    ("low-latency", LOW_LATENCY_PROFILE),
    ("voice-capture", VOICE_CAPTURE_PROFILE),
    ("high-fidelity", HIGH_FIDELITY_PROFILE),
];

/// CD-quality playback with transport-chosen buffering.
const DEFAULT_PROFILE: &str = r#"
name = "default"
description = "CD-quality playback, transport-chosen buffering"
format = "s16le"
rate = 44100
channels = 2
direction = "playback"
"#;

/// Small buffers for interactive playback.
const LOW_LATENCY_PROFILE: &str = r#"
name = "low-latency"
description = "Interactive playback with 20ms of buffering"
format = "s16le"
rate = 48000
channels = 2
latency_usec = 20000
direction = "playback"
flags = ["adjust_latency", "auto_timing_update"]
"#;

/// Mono speech capture.
const VOICE_CAPTURE_PROFILE: &str = r#"
name = "voice-capture"
description = "Mono 16kHz speech capture, delivered every 30ms"
format = "s16le"
rate = 16000
channels = 1
latency_usec = 30000
direction = "record"
flags = ["adjust_latency"]
"#;

/// Float playback at 96kHz.
const HIGH_FIDELITY_PROFILE: &str = r#"
name = "high-fidelity"
description = "32-bit float playback at 96kHz"
format = "f32le"
rate = 96000
channels = 2
latency_usec = 100000
direction = "playback"
flags = ["fix_format", "fix_rate"]
"#;

/// All factory profiles.
///
/// Embedded profiles that fail to parse are skipped.
pub fn factory_profiles() -> Vec<StreamProfile> {
    FACTORY_PROFILES_TOML
        .iter()
        .filter_map(|(_, toml)| StreamProfile::from_toml(toml).ok())
        .collect()
}

/// A factory profile by name (case-insensitive).
pub fn get_factory_profile(name: &str) -> Option<StreamProfile> {
    FACTORY_PROFILES_TOML
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .and_then(|(_, toml)| StreamProfile::from_toml(toml).ok())
}

/// Whether `name` is a factory profile.
pub fn is_factory_profile(name: &str) -> bool {
    FACTORY_PROFILE_NAMES.iter().any(|n| n.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate_profile;

    #[test]
    fn every_factory_profile_parses_and_validates() {
        let profiles = factory_profiles();
        assert_eq!(profiles.len(), FACTORY_PROFILE_NAMES.len());
        for profile in &profiles {
            assert!(
                validate_profile(profile).is_ok(),
                "factory profile '{}' failed validation: {:?}",
                profile.name,
                validate_profile(profile).err()
            );
        }
    }

    #[test]
    fn names_match_contents() {
        for name in FACTORY_PROFILE_NAMES {
            let profile = get_factory_profile(name).unwrap();
            assert_eq!(&profile.name, name);
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(get_factory_profile("Low-Latency").is_some());
        assert!(is_factory_profile("VOICE-CAPTURE"));
        assert!(!is_factory_profile("studio"));
        assert!(get_factory_profile("studio").is_none());
    }

    #[test]
    fn voice_capture_records() {
        let profile = get_factory_profile("voice-capture").unwrap();
        let validated = validate_profile(&profile).unwrap();
        assert_eq!(validated.connect.direction, flowstream::Direction::Record);
        assert_eq!(validated.options.spec.channels, 1);
    }
}
