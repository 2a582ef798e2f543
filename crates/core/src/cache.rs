use crate::error::ProcessingError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Metadata,
    StructuredText,
    ChunkSet,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::StructuredText => "structured_text",
            Self::ChunkSet => "chunks",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope<T> {
    file_hash: String,
    kind: String,
    strategy: Option<String>,
    created_at: DateTime<Utc>,
    payload: T,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub metadata_entries: usize,
    pub structured_text_entries: usize,
    pub chunk_set_entries: usize,
    pub total_bytes: u64,
}

impl CacheStats {
    pub fn total_entries(&self) -> usize {
        self.metadata_entries + self.structured_text_entries + self.chunk_set_entries
    }
}

/// Content-addressed artifact store. Entries are keyed by the SHA-256 of the
/// file bytes, never the path, so renamed or duplicated files share entries.
///
/// The cache is an optimization only: every read or write failure degrades to
/// a miss and the caller recomputes.
pub struct ContentCache {
    root: PathBuf,
}

impl ContentCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn compute_file_hash(path: &Path) -> Result<String, ProcessingError> {
        if !path.exists() {
            return Err(ProcessingError::FileNotFound(
                path.to_string_lossy().to_string(),
            ));
        }
        let bytes = fs::read(path)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }

    fn entry_path(&self, hash: &str, kind: ArtifactKind, strategy: Option<&str>) -> PathBuf {
        let name = match strategy {
            Some(strategy) => format!("{hash}-{}-{strategy}.json", kind.as_str()),
            None => format!("{hash}-{}.json", kind.as_str()),
        };
        self.root.join(name)
    }

    /// Returns the cached artifact if present and still keyed to `hash`.
    /// A stale or unreadable entry is removed and reported as a miss.
    pub fn get<T: DeserializeOwned>(
        &self,
        hash: &str,
        kind: ArtifactKind,
        strategy: Option<&str>,
    ) -> Option<T> {
        let path = self.entry_path(hash, kind, strategy);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(error) => {
                if error.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), %error, "cache read failed, treating as miss");
                }
                return None;
            }
        };

        let envelope: CacheEnvelope<T> = match serde_json::from_slice(&raw) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(path = %path.display(), %error, "cache entry unreadable, removing");
                let _ = fs::remove_file(&path);
                return None;
            }
        };

        if envelope.file_hash != hash {
            warn!(path = %path.display(), "cache entry hash mismatch, removing");
            let _ = fs::remove_file(&path);
            return None;
        }

        debug!(hash, kind = kind.as_str(), strategy, "cache hit");
        Some(envelope.payload)
    }

    /// Persists the artifact, overwriting any prior entry for the same key.
    /// Failures are logged and swallowed.
    pub fn put<T: Serialize>(
        &self,
        hash: &str,
        kind: ArtifactKind,
        strategy: Option<&str>,
        payload: &T,
    ) {
        let envelope = CacheEnvelope {
            file_hash: hash.to_string(),
            kind: kind.as_str().to_string(),
            strategy: strategy.map(str::to_string),
            created_at: Utc::now(),
            payload,
        };

        if let Err(error) = fs::create_dir_all(&self.root) {
            warn!(root = %self.root.display(), %error, "cache dir create failed, skipping write");
            return;
        }

        let path = self.entry_path(hash, kind, strategy);
        let serialized = match serde_json::to_vec(&envelope) {
            Ok(serialized) => serialized,
            Err(error) => {
                warn!(path = %path.display(), %error, "cache serialize failed, skipping write");
                return;
            }
        };

        if let Err(error) = fs::write(&path, serialized) {
            warn!(path = %path.display(), %error, "cache write failed, skipping");
        }
    }

    /// Removes entries for one file hash, or everything when `hash` is `None`.
    pub fn clear(&self, hash: Option<&str>) {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(_) => return,
        };

        for entry in entries.filter_map(|entry| entry.ok()) {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let matches = match hash {
                Some(hash) => name.starts_with(hash),
                None => name.ends_with(".json"),
            };
            if matches {
                let _ = fs::remove_file(entry.path());
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(_) => return stats,
        };

        for entry in entries.filter_map(|entry| entry.ok()) {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.ends_with(".json") {
                continue;
            }
            if name.contains("-metadata") {
                stats.metadata_entries += 1;
            } else if name.contains("-structured_text") {
                stats.structured_text_entries += 1;
            } else if name.contains("-chunks") {
                stats.chunk_set_entries += 1;
            }
            if let Ok(meta) = entry.metadata() {
                stats.total_bytes += meta.len();
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_returns_exact_artifact() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file = dir.path().join("doc.pdf");
        fs::write(&file, b"%PDF-1.4 content")?;

        let cache = ContentCache::new(dir.path().join("cache"));
        let hash = ContentCache::compute_file_hash(&file)?;

        let payload = vec!["alpha".to_string(), "beta".to_string()];
        cache.put(&hash, ArtifactKind::ChunkSet, Some("fixed"), &payload);

        let loaded: Vec<String> = cache
            .get(&hash, ArtifactKind::ChunkSet, Some("fixed"))
            .expect("entry should be present");
        assert_eq!(loaded, payload);
        Ok(())
    }

    #[test]
    fn mutated_file_misses_the_cache() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file = dir.path().join("doc.pdf");
        fs::write(&file, b"original bytes")?;

        let cache = ContentCache::new(dir.path().join("cache"));
        let hash = ContentCache::compute_file_hash(&file)?;
        cache.put(&hash, ArtifactKind::StructuredText, None, &"payload".to_string());

        fs::write(&file, b"original bytez")?;
        let new_hash = ContentCache::compute_file_hash(&file)?;
        assert_ne!(hash, new_hash);

        let stale: Option<String> = cache.get(&new_hash, ArtifactKind::StructuredText, None);
        assert!(stale.is_none());
        Ok(())
    }

    #[test]
    fn corrupt_entry_is_removed_on_read() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let cache = ContentCache::new(dir.path());
        fs::write(dir.path().join("abc-structured_text.json"), b"not json")?;

        let missing: Option<String> = cache.get("abc", ArtifactKind::StructuredText, None);
        assert!(missing.is_none());
        assert!(!dir.path().join("abc-structured_text.json").exists());
        Ok(())
    }

    #[test]
    fn clear_and_stats_track_entries() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let cache = ContentCache::new(dir.path());
        cache.put("h1", ArtifactKind::StructuredText, None, &1u32);
        cache.put("h1", ArtifactKind::ChunkSet, Some("fixed"), &2u32);
        cache.put("h2", ArtifactKind::ChunkSet, Some("fixed"), &3u32);

        let stats = cache.stats();
        assert_eq!(stats.structured_text_entries, 1);
        assert_eq!(stats.chunk_set_entries, 2);
        assert!(stats.total_bytes > 0);

        cache.clear(Some("h1"));
        assert_eq!(cache.stats().total_entries(), 1);

        cache.clear(None);
        assert_eq!(cache.stats().total_entries(), 0);
        Ok(())
    }
}
