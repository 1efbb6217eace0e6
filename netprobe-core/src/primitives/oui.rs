//! Manufacturer (OUI) database file access (§4.2): locate the database
//! at a search path of preferred locations, falling back to a writable
//! user-config location for downloads.

use std::path::PathBuf;

/// Search order for the manufacturer database, mirroring the original's
/// "project directory first, user config directory fallback" behavior.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("data/manuf")];
    if let Some(config_dir) = config_dir() {
        paths.push(config_dir.join("manuf"));
    }
    paths
}

/// The writable fallback location used when the project directory isn't
/// writable (e.g. running as an installed binary or under the external
/// protocol server).
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("netprobe"))
}

pub fn fallback_manuf_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("manuf"))
}

/// Finds the first existing manufacturer database on the search path.
pub fn locate_existing() -> Option<PathBuf> {
    search_paths().into_iter().find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_paths_includes_project_and_config() {
        let paths = search_paths();
        assert!(paths.iter().any(|p| p.ends_with("data/manuf")));
    }
}
