//! Stream profiles for flowstream.
//!
//! # Features
//!
//! - **Profiles**: load and save [`StreamProfile`]s as TOML files
//! - **Validation**: turn a profile into [`flowstream::StreamOptions`] and
//!   connect settings, reporting every problem at once
//! - **Paths**: platform-specific user and system profile directories
//! - **Factory Profiles**: built-in profiles for common setups
//!
//! # Example
//!
//! ```rust,no_run
//! use flowstream_config::{StreamProfile, get_factory_profile, user_profiles_dir};
//!
//! let profile = get_factory_profile("low-latency").unwrap().with_device("usb");
//! let resolved = profile.resolve().unwrap();
//! println!("{} at {} Hz", resolved.options.name, resolved.options.spec.rate);
//!
//! profile.save(user_profiles_dir().join("usb.toml")).unwrap();
//! ```

mod error;
mod profile;

/// Platform-specific paths for profiles.
pub mod paths;

/// Profile validation.
pub mod validation;

/// Factory profiles bundled with the library.
pub mod factory_profiles;

pub use error::ConfigError;
pub use factory_profiles::{FACTORY_PROFILE_NAMES, factory_profiles, get_factory_profile, is_factory_profile};
pub use paths::{
    ensure_user_profiles_dir, find_profile, list_system_profiles, list_user_profiles, profile_name_from_path,
    system_profiles_dir, user_profiles_dir,
};
pub use profile::StreamProfile;
pub use validation::{
    ConnectSettings, LATENCY_USEC_MAX, ValidatedProfile, ValidationError, ValidationResult, validate_profile,
};

/// Resolve a profile by name: factory profiles first, then files.
///
/// # Errors
///
/// [`ConfigError::ProfileNotFound`] if neither a factory profile nor a file
/// matches, or the error from loading the file.
pub fn load_profile(name: &str) -> Result<StreamProfile, ConfigError> {
    if let Some(profile) = get_factory_profile(name) {
        return Ok(profile);
    }
    match find_profile(name) {
        Some(path) => StreamProfile::load(path),
        None => Err(ConfigError::ProfileNotFound(name.to_string())),
    }
}
