//! Durable cache record.
//!
//! One JSON file holding the last rendered entry, replaced atomically via a
//! temp file + rename so a crash never leaves a half-written record.
//!
//! Records written by the previous service are a JSON string holding the
//! base64 of the entry's JSON; `load` reads both layouts.

use std::fs;
use std::io::{ErrorKind, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StoreError;

/// The cached, rendered form of the newest feed item.
///
/// Accepts the short field names of older cache files on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    #[serde(alias = "id")]
    pub identity: String,
    #[serde(alias = "card")]
    pub display_text: String,
    #[serde(alias = "speech")]
    pub voice_markup: String,
}

/// Reads and writes the cache record at a fixed path.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<CacheEntry, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.clone()));
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let corrupt = |source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        };
        let entry = match serde_json::from_str::<serde_json::Value>(&contents).map_err(corrupt)? {
            serde_json::Value::String(encoded) => {
                let decoded = STANDARD.decode(encoded.trim()).map_err(|source| {
                    StoreError::BadEncoding {
                        path: self.path.clone(),
                        source,
                    }
                })?;
                debug!("Cache record at {} uses the legacy layout", self.path.display());
                serde_json::from_slice(&decoded).map_err(corrupt)?
            }
            value => serde_json::from_value(value).map_err(corrupt)?,
        };
        debug!("Loaded cache record from {}", self.path.display());
        Ok(entry)
    }

    pub fn save(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        info!("Saving cache to file: {}", self.path.display());
        let json = serde_json::to_string_pretty(entry).map_err(StoreError::Serialize)?;
        self.write_atomic(json.as_bytes())
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })
    }

    fn write_atomic(&self, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.temp_path();
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    /// Sibling of the record, so the rename stays on one filesystem.
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> CacheEntry {
        CacheEntry {
            identity: "Wed, 01 May 2024 10:00:00 +0200".into(),
            display_text: "Die Wettermail vom 01.05. 10:00\nSonnig - warm".into(),
            voice_markup: "<speak>warm</speak>".into(),
        }
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path().join("cache.json"));

        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), sample());
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path().join("missing.json"));

        assert!(matches!(store.load(), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_load_garbage_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");
        fs::write(&path, "{\"identity\": ").unwrap();

        let store = CacheStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_record_uses_stable_field_names() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");
        CacheStore::new(&path).save(&sample()).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["identity"], "Wed, 01 May 2024 10:00:00 +0200");
        assert_eq!(raw["voiceMarkup"], "<speak>warm</speak>");
        assert!(raw["displayText"].as_str().unwrap().contains('\n'));
    }

    // Bytes as written by the previous service: base64 of the entry JSON,
    // encoded as a JSON string with a trailing newline.
    const LEGACY_EMPTY: &str = "\"eyJpZCI6IiIsImNhcmQiOiIiLCJzcGVlY2giOiIifQ==\"\n";
    const LEGACY_SUNNY: &str = "\"eyJpZCI6IldlZCwgMDEgTWF5IDIwMjQgMTA6MDA6MDAgKzAyMDAiLCJjYXJkIjoiRGllIFdldHRlcm1haWwgdm9tIDAxLjA1LiAxMDowMCBcblNvbm5pZyAtIEVzIHdpcmQgd2FybSwgZ3LDtsOfZXIgMjAgR3JhZC4iLCJzcGVlY2giOiJcdTAwM2NzcGVha1x1MDAzZVx1MDAzY2JyZWFrIHN0cmVuZ3RoPVwieC1zdHJvbmdcIi9cdTAwM2VXZXR0ZXIgTWFpbCB2b20gXHUwMDNjc2F5LWFzIGludGVycHJldC1hcz1cImRhdGVcIiBmb3JtYXQ9XCJkbVwiXHUwMDNlMS41Llx1MDAzYy9zYXktYXNcdTAwM2UgMTA6MDBcdTAwM2NicmVhayBzdHJlbmd0aD1cIngtc3Ryb25nXCIvXHUwMDNlIFNvbm5pZ1x1MDAzYy9zcGVha1x1MDAzZSJ9\"\n";

    #[test]
    fn test_loads_legacy_empty_record() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".rsscacheWO");
        fs::write(&path, LEGACY_EMPTY).unwrap();

        assert_eq!(CacheStore::new(&path).load().unwrap(), CacheEntry::default());
    }

    #[test]
    fn test_loads_legacy_record() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".rsscacheWO");
        fs::write(&path, LEGACY_SUNNY).unwrap();

        let entry = CacheStore::new(&path).load().unwrap();
        assert_eq!(entry.identity, "Wed, 01 May 2024 10:00:00 +0200");
        assert_eq!(
            entry.display_text,
            "Die Wettermail vom 01.05. 10:00 \nSonnig - Es wird warm, größer 20 Grad."
        );
        assert_eq!(
            entry.voice_markup,
            "<speak><break strength=\"x-strong\"/>Wetter Mail vom \
             <say-as interpret-as=\"date\" format=\"dm\">1.5.</say-as> 10:00\
             <break strength=\"x-strong\"/> Sonnig</speak>"
        );
    }

    #[test]
    fn test_legacy_record_is_rewritten_in_current_layout() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".rsscacheWO");
        fs::write(&path, LEGACY_SUNNY).unwrap();

        let store = CacheStore::new(&path);
        let entry = store.load().unwrap();
        store.save(&entry).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["identity"], "Wed, 01 May 2024 10:00:00 +0200");
        assert_eq!(store.load().unwrap(), entry);
    }

    #[test]
    fn test_legacy_string_with_bad_base64_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".rsscacheWO");
        fs::write(&path, "\"not base64 at all!\"\n").unwrap();

        let result = CacheStore::new(&path).load();
        assert!(matches!(result, Err(StoreError::BadEncoding { .. })));
    }

    #[test]
    fn test_loads_plain_legacy_field_names() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");
        fs::write(&path, r#"{"speech":"<speak>x</speak>","id":"abc","card":"Karte"}"#).unwrap();

        let entry = CacheStore::new(&path).load().unwrap();
        assert_eq!(entry.identity, "abc");
        assert_eq!(entry.display_text, "Karte");
        assert_eq!(entry.voice_markup, "<speak>x</speak>");
    }

    #[cfg(unix)]
    #[test]
    fn test_record_is_private_to_owner() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");
        CacheStore::new(&path).save(&sample()).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_stray_temp_file_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");
        let store = CacheStore::new(&path);
        store.save(&sample()).unwrap();

        // An interrupted write leaves only the temp file behind.
        fs::write(store.temp_path(), "{\"identity\": \"half").unwrap();

        assert_eq!(store.load().unwrap(), sample());
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path().join("nested/dir/cache.json"));

        store.save(&CacheEntry::default()).unwrap();
        assert_eq!(store.load().unwrap(), CacheEntry::default());
    }

    #[test]
    fn test_save_into_file_parent_fails() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();

        let store = CacheStore::new(blocker.join("cache.json"));
        assert!(matches!(store.save(&sample()), Err(StoreError::Write { .. })));
    }
}
