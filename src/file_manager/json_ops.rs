// Settings persistence
// One JSON document on disk. Writes go through a process-wide lock and land
// via temp-then-rename, so a crash mid-save leaves the old file intact and
// concurrent saves cannot interleave.

use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

lazy_static::lazy_static! {
    static ref FILE_LOCK: Mutex<()> = Mutex::new(());
}

pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let _guard = FILE_LOCK
        .lock()
        .map_err(|e| format!("Settings lock poisoned: {}", e))?;

    let contents =
        fs::read_to_string(path).map_err(|e| format!("Could not read {:?}: {}", path, e))?;
    serde_json::from_str(&contents).map_err(|e| format!("Malformed JSON in {:?}: {}", path, e))
}

pub fn write_json_file<T: Serialize>(path: &Path, data: &T) -> Result<(), String> {
    let _guard = FILE_LOCK
        .lock()
        .map_err(|e| format!("Settings lock poisoned: {}", e))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Could not create {:?}: {}", parent, e))?;
    }

    let json = serde_json::to_string_pretty(data)
        .map_err(|e| format!("Could not serialize settings: {}", e))?;

    let staging = path.with_extension("tmp");
    let mut file =
        File::create(&staging).map_err(|e| format!("Could not create {:?}: {}", staging, e))?;
    file.write_all(json.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|e| format!("Could not write {:?}: {}", staging, e))?;

    fs::rename(&staging, path)
        .map_err(|e| format!("Could not move {:?} into place: {}", staging, e))
}

/// Seed the file with `default` if it does not exist yet. An existing file
/// is left exactly as the user saved it.
pub fn initialize_json_file<T: Serialize>(path: &Path, default: &T) -> Result<(), String> {
    if !path.exists() {
        log::info!("Writing initial settings to {:?}", path);
        write_json_file(path, default)?;
    }
    Ok(())
}

pub fn read_json_file_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, String> {
    if path.exists() {
        read_json_file(path)
    } else {
        Ok(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Settings;

    #[test]
    fn test_settings_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");

        let mut settings = Settings::default();
        settings.port = 8123;
        write_json_file(&path, &settings).unwrap();

        let loaded: Settings = read_json_file(&path).unwrap();
        assert_eq!(loaded.port, 8123);
        assert_eq!(loaded.phastest_api_url, settings.phastest_api_url);
        // No stray temp file left behind
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_initialize_does_not_clobber() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");

        let mut settings = Settings::default();
        settings.port = 9999;
        write_json_file(&path, &settings).unwrap();

        initialize_json_file(&path, &Settings::default()).unwrap();
        let loaded: Settings = read_json_file(&path).unwrap();
        assert_eq!(loaded.port, 9999);
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let tmp = tempfile::tempdir().unwrap();
        let loaded: Settings =
            read_json_file_or_default(&tmp.path().join("nope.json")).unwrap();
        assert_eq!(loaded.port, Settings::default().port);
    }

    #[test]
    fn test_malformed_json_reports_the_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        let err = read_json_file::<Settings>(&path).unwrap_err();
        assert!(err.contains("Malformed JSON"));
        assert!(err.contains("settings.json"));
    }
}
