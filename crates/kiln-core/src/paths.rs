use dirs::home_dir;
use std::path::PathBuf;

/// Returns the kiln home directory, or None if the user's home cannot be resolved.
///
/// `KILN_HOME` overrides the default `~/.kiln`.
pub fn kiln_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("KILN_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".kiln"))
}

/// Global configuration file: ~/.kiln/global.toml
pub fn config_path() -> Option<PathBuf> {
    kiln_home().map(|home| home.join("global.toml"))
}

/// Default profile: ~/.kiln/profiles/default.toml
pub fn default_profile_path() -> Option<PathBuf> {
    kiln_home().map(|home| home.join("profiles").join("default.toml"))
}
