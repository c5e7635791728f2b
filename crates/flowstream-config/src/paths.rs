//! Platform-specific paths for stream profiles.
//!
//! # Directory Structure
//!
//! - **User profiles**: `~/.config/flowstream/profiles/` (Linux),
//!   `~/Library/Application Support/flowstream/profiles/` (macOS),
//!   `%APPDATA%\flowstream\profiles\` (Windows)
//! - **System profiles**: `/usr/share/flowstream/profiles/` (Linux),
//!   `/Library/Application Support/flowstream/profiles/` (macOS)
//!
//! # Example
//!
//! ```rust,no_run
//! use flowstream_config::paths;
//!
//! if let Some(path) = paths::find_profile("studio") {
//!     println!("Found profile at: {:?}", path);
//! }
//! ```

use std::path::{Path, PathBuf};

/// Application name used for directory paths.
const APP_NAME: &str = "flowstream";

/// Subdirectory name for profiles.
const PROFILES_SUBDIR: &str = "profiles";

/// Returns the user-specific profiles directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_profiles_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
        .join(PROFILES_SUBDIR)
}

/// Returns the system-wide profiles directory.
pub fn system_profiles_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/usr/share").join(APP_NAME).join(PROFILES_SUBDIR)
    }
    #[cfg(target_os = "macos")]
    {
        PathBuf::from("/Library/Application Support")
            .join(APP_NAME)
            .join(PROFILES_SUBDIR)
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME)
            .join(PROFILES_SUBDIR)
    }
}

/// Find a profile file by name.
///
/// Searches in the following order:
/// 1. The name as a path, if it is a file
/// 2. User profiles directory
/// 3. System profiles directory
///
/// A `.toml` extension is added to bare names.
pub fn find_profile(name: &str) -> Option<PathBuf> {
    find_profile_in(name, &[user_profiles_dir(), system_profiles_dir()])
}

fn find_profile_in(name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    let path = PathBuf::from(name);
    if path.is_file() {
        return Some(path);
    }

    let filename = if name.ends_with(".toml") {
        name.to_string()
    } else {
        format!("{name}.toml")
    };

    dirs.iter().map(|dir| dir.join(&filename)).find(|candidate| candidate.is_file())
}

/// Ensure the user profiles directory exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_user_profiles_dir() -> Result<PathBuf, crate::ConfigError> {
    let dir = user_profiles_dir();

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| crate::ConfigError::create_dir(&dir, e))?;
    }

    Ok(dir)
}

/// List profile files in the user profiles directory.
pub fn list_user_profiles() -> Vec<PathBuf> {
    list_profiles_in_dir(&user_profiles_dir())
}

/// List profile files in the system profiles directory.
pub fn list_system_profiles() -> Vec<PathBuf> {
    list_profiles_in_dir(&system_profiles_dir())
}

/// List profile files in `dir`, sorted by path.
///
/// Returns an empty vector if the directory doesn't exist or can't be read.
pub fn list_profiles_in_dir(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut profiles: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    profiles.sort();
    profiles
}

/// Get the profile name from a file path.
///
/// ```rust
/// use flowstream_config::paths::profile_name_from_path;
/// use std::path::Path;
///
/// let name = profile_name_from_path(Path::new("/path/to/studio.toml"));
/// assert_eq!(name, Some("studio".to_string()));
/// ```
pub fn profile_name_from_path(path: &Path) -> Option<String> {
    path.file_stem().and_then(|s| s.to_str()).map(ToString::to_string)
}
