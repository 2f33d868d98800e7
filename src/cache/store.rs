use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{CachePayload, CacheScope, CacheType, CACHE_EXTENSION};
use crate::config::AttendanceConfig;
use crate::error::AttendanceError;
use crate::logging::SharedSink;

#[derive(Serialize)]
struct CacheEntryRef<'a, T> {
    timestamp: DateTime<Utc>,
    cache_type: CacheType,
    payload: &'a T,
}

#[derive(Deserialize)]
struct CacheEntry<T> {
    payload: T,
}

/// Leading fields of an entry, decoded without touching the payload.
#[derive(Deserialize)]
struct CacheHeader {
    timestamp: DateTime<Utc>,
    cache_type: CacheType,
}

/// Directory-backed cache with per-type retention and expiry.
pub struct CacheStore {
    dir: PathBuf,
    expiry: Duration,
    max_versions: usize,
    sink: SharedSink,
}

impl CacheStore {
    pub fn new(dir: PathBuf, expiry_hours: i64, max_versions: usize, sink: SharedSink) -> Self {
        Self {
            dir,
            expiry: Duration::hours(expiry_hours),
            max_versions,
            sink,
        }
    }

    pub fn from_config(config: &AttendanceConfig, sink: SharedSink) -> Self {
        Self::new(
            config.cache_dir.clone(),
            config.cache_expiry_hours,
            config.max_cache_versions,
            sink,
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `payload` to a fresh file, then evicts old entries of the type.
    ///
    /// Returns the new file path, or `None` if the write failed.
    pub fn save<T: Serialize>(&self, cache_type: CacheType, payload: &T) -> Option<PathBuf> {
        self.save_at(cache_type, payload, Utc::now())
    }

    fn save_at<T: Serialize>(
        &self,
        cache_type: CacheType,
        payload: &T,
        timestamp: DateTime<Utc>,
    ) -> Option<PathBuf> {
        let entry = CacheEntryRef {
            timestamp,
            cache_type,
            payload,
        };

        let bytes = match rmp_serde::to_vec_named(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.sink
                    .error(&format!("Failed to encode {} cache entry: {}", cache_type, e));
                return None;
            }
        };

        if let Err(e) = fs::create_dir_all(&self.dir) {
            self.sink.error(&format!(
                "Failed to create cache folder {}: {}",
                self.dir.display(),
                e
            ));
            return None;
        }

        let path = self.dir.join(unique_file_name(cache_type, timestamp));
        if let Err(e) = fs::write(&path, bytes) {
            self.sink
                .error(&format!("Failed to save cache {}: {}", path.display(), e));
            return None;
        }

        self.sink
            .info(&format!("{} data cached as {}.", cache_type, path.display()));
        self.evict(CacheScope::Only(cache_type), self.max_versions);
        Some(path)
    }

    /// Saves only when `enabled` and the payload holds something.
    pub fn save_if_needed<T: CachePayload>(
        &self,
        cache_type: CacheType,
        payload: &T,
        enabled: bool,
    ) -> Option<PathBuf> {
        if !enabled {
            return None;
        }
        if payload.is_empty_payload() {
            self.sink
                .warn(&format!("{} data is empty. Nothing saved to cache.", cache_type));
            return None;
        }
        self.save(cache_type, payload)
    }

    /// Returns the payload of the newest valid entry of `cache_type`.
    ///
    /// Empty, mistyped, expired, and undecodable files are deleted while
    /// scanning.
    pub fn load<T: DeserializeOwned>(&self, cache_type: CacheType) -> Option<T> {
        self.load_at(cache_type, Utc::now())
    }

    fn load_at<T: DeserializeOwned>(&self, cache_type: CacheType, now: DateTime<Utc>) -> Option<T> {
        let mut survivors: Vec<(DateTime<Utc>, PathBuf, Vec<u8>)> = Vec::new();

        for path in self.files_of(cache_type) {
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.discard(&path, &format!("read failure: {}", e));
                    continue;
                }
            };
            if bytes.is_empty() {
                self.discard(&path, "empty content");
                continue;
            }

            let header: CacheHeader = match rmp_serde::from_slice(&bytes) {
                Ok(header) => header,
                Err(e) => {
                    self.discard(&path, &format!("corrupt header: {}", e));
                    continue;
                }
            };
            if header.cache_type != cache_type {
                self.discard(&path, "inconsistent cache type");
                continue;
            }
            if now - header.timestamp >= self.expiry {
                self.discard(&path, "expired timestamp");
                continue;
            }

            survivors.push((header.timestamp, path, bytes));
        }

        survivors.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

        for (_, path, bytes) in survivors {
            match rmp_serde::from_slice::<CacheEntry<T>>(&bytes) {
                Ok(entry) => {
                    self.sink
                        .info(&format!("Loaded valid cache from {}.", path.display()));
                    return Some(entry.payload);
                }
                Err(e) => self.discard(&path, &format!("corrupt payload: {}", e)),
            }
        }

        None
    }

    /// Keeps the newest `keep` entries of each type in `scope`.
    ///
    /// Returns the number of files deleted.
    pub fn evict(&self, scope: CacheScope, keep: usize) -> usize {
        let mut deleted = 0;

        for cache_type in scope.types() {
            let mut files: Vec<(Option<DateTime<Utc>>, PathBuf)> = self
                .files_of(cache_type)
                .into_iter()
                .map(|path| (read_timestamp(&path), path))
                .collect();

            files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

            for (_, path) in files.into_iter().skip(keep) {
                if self.remove(&path) {
                    deleted += 1;
                }
            }
        }

        deleted
    }

    /// Deletes every entry in `scope`.
    pub fn clear(&self, scope: CacheScope) -> usize {
        let deleted = self.evict(scope, 0);
        self.sink
            .info(&format!("Cleared {} cache file(s).", deleted));
        deleted
    }

    fn files_of(&self, cache_type: CacheType) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    let err = AttendanceError::io(&self.dir, e);
                    self.sink.error(&format!("Failed to list cache folder: {}", err));
                }
                return Vec::new();
            }
        };

        entries
            .flatten()
            .filter(|entry| entry.path().is_file())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| cache_type.owns(name))
            })
            .map(|entry| entry.path())
            .collect()
    }

    fn discard(&self, path: &Path, reason: &str) {
        let err = AttendanceError::Cache {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        self.sink.warn(&format!("{}; removing.", err));
        self.remove(path);
    }

    fn remove(&self, path: &Path) -> bool {
        match fs::remove_file(path) {
            Ok(()) => {
                self.sink.debug(&format!("Removed {}.", path.display()));
                true
            }
            Err(e) => {
                self.sink
                    .error(&format!("Failed to remove {}: {}", path.display(), e));
                false
            }
        }
    }
}

fn unique_file_name(cache_type: CacheType, timestamp: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}.{}",
        cache_type.prefix(),
        timestamp.format("%Y%m%d%H%M%S%9f"),
        &suffix[..8],
        CACHE_EXTENSION
    )
}

fn read_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let bytes = fs::read(path).ok()?;
    rmp_serde::from_slice::<CacheHeader>(&bytes)
        .ok()
        .map(|h| h.timestamp)
}
