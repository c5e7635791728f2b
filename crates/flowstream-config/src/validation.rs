//! Profile validation.
//!
//! Turns the string-typed fields of a [`StreamProfile`] into engine types and
//! checks numeric ranges. Every problem in a profile is reported, not just
//! the first.
//!
//! # Example
//!
//! ```rust
//! use flowstream_config::{StreamProfile, validate_profile};
//!
//! let profile = StreamProfile::new("music").with_rate(48000).with_flag("adjust_latency");
//! let validated = validate_profile(&profile).expect("valid profile");
//! assert_eq!(validated.options.spec.rate, 48000);
//! ```

use flowstream::{CHANNELS_MAX, Direction, RATE_MAX, SampleFormat, StreamFlags, StreamOptions};
use thiserror::Error;

use crate::profile::StreamProfile;

/// Largest accepted latency target: ten seconds.
pub const LATENCY_USEC_MAX: u64 = 10_000_000;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Profile name is empty.
    #[error("profile name must not be empty")]
    EmptyName,

    /// Unknown sample format name.
    #[error("unknown sample format: {0}")]
    UnknownFormat(String),

    /// Unknown direction name.
    #[error("unknown direction: {0}")]
    UnknownDirection(String),

    /// Direction given as `unset`.
    #[error("direction must be playback, record or upload")]
    UnsetDirection,

    /// Unknown stream flag name.
    #[error("unknown stream flag: {0}")]
    UnknownFlag(String),

    /// Numeric setting out of range.
    #[error("{field} value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Name of the setting.
        field: &'static str,
        /// The value that was out of range.
        value: u64,
        /// Minimum allowed value.
        min: u64,
        /// Maximum allowed value.
        max: u64,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Connect-time settings of a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectSettings {
    /// Device to connect to, or the default device.
    pub device: Option<String>,
    /// Stream direction. Never [`Direction::Unset`].
    pub direction: Direction,
    /// Combined stream flags.
    pub flags: StreamFlags,
}

/// A profile turned into engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedProfile {
    /// Options for [`flowstream::Stream::new`].
    pub options: StreamOptions,
    /// Arguments for [`flowstream::Stream::connect`].
    pub connect: ConnectSettings,
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64, errors: &mut Vec<ValidationError>) {
    if !(min..=max).contains(&value) {
        errors.push(ValidationError::OutOfRange { field, value, min, max });
    }
}

/// Validate a profile.
pub fn validate_profile(profile: &StreamProfile) -> ValidationResult<ValidatedProfile> {
    let mut errors = Vec::new();

    if profile.name.trim().is_empty() {
        errors.push(ValidationError::EmptyName);
    }

    let format = match profile.format.parse::<SampleFormat>() {
        Ok(format) => Some(format),
        Err(_) => {
            errors.push(ValidationError::UnknownFormat(profile.format.clone()));
            None
        }
    };

    let direction = match profile.direction.parse::<Direction>() {
        Ok(Direction::Unset) => {
            errors.push(ValidationError::UnsetDirection);
            None
        }
        Ok(direction) => Some(direction),
        Err(_) => {
            errors.push(ValidationError::UnknownDirection(profile.direction.clone()));
            None
        }
    };

    let mut flags = StreamFlags::NONE;
    for name in &profile.flags {
        match StreamFlags::from_name(name) {
            Some(flag) => flags |= flag,
            None => errors.push(ValidationError::UnknownFlag(name.clone())),
        }
    }

    check_range("rate", u64::from(profile.rate), 1, u64::from(RATE_MAX), &mut errors);
    check_range("channels", u64::from(profile.channels), 1, u64::from(CHANNELS_MAX), &mut errors);
    check_range("latency_usec", profile.latency_usec, 0, LATENCY_USEC_MAX, &mut errors);

    match (format, direction) {
        (Some(format), Some(direction)) if errors.is_empty() => Ok(ValidatedProfile {
            options: StreamOptions::default()
                .with_name(profile.name.clone())
                .with_format(format)
                .with_rate(profile.rate)
                .with_channels(profile.channels)
                .with_latency_usec(profile.latency_usec),
            connect: ConnectSettings {
                device: profile.device.clone(),
                direction,
                flags,
            },
        }),
        _ if errors.len() == 1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}
