use crate::error::{MmsMediaError, Result};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// SHA-256 digest of one decoded attachment payload. Equality within a
/// folder partition means "already extracted".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(digest.into())
    }

    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for byte in &self.0 {
            s.push_str(&format!("{:02x}", byte));
        }
        s
    }

    /// First 8 hex characters, used in generated filenames.
    pub fn short_hex(&self) -> String {
        let mut s = String::with_capacity(8);
        for byte in &self.0[..4] {
            s.push_str(&format!("{:02x}", byte));
        }
        s
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 64 {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = (chunk[0] as char).to_digit(16)?;
            let lo = (chunk[1] as char).to_digit(16)?;
            bytes[i] = ((hi << 4) | lo) as u8;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct HexVisitor;

        impl<'de> Visitor<'de> for HexVisitor {
            type Value = Fingerprint;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 64-character hex string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Fingerprint, E> {
                Fingerprint::from_hex(v)
                    .ok_or_else(|| E::custom(format!("invalid fingerprint: {}", v)))
            }
        }

        deserializer.deserialize_str(HexVisitor)
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    folders: HashMap<String, HashSet<Fingerprint>>,
    dirty: bool,
}

/// Persisted mapping from folder key to the set of fingerprints already
/// extracted. The single source of truth for cross-run and cross-thread
/// deduplication.
///
/// A single mutex guards the whole map, which makes the check-then-reserve
/// sequence linearizable per folder: two workers racing on the same content
/// cannot both miss a duplicate.
#[derive(Debug)]
pub struct FingerprintStore {
    path: PathBuf,
    inner: Mutex<StoreInner>,
}

impl FingerprintStore {
    /// Load the store from disk. A missing file yields an empty store; a
    /// present-but-unreadable or unparsable file is a fatal startup error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let inner = if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| MmsMediaError::StoreUnreadable {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
            let folders: HashMap<String, HashSet<Fingerprint>> = serde_json::from_str(&content)
                .map_err(|e| MmsMediaError::StoreUnreadable {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
            StoreInner {
                folders,
                dirty: false,
            }
        } else {
            StoreInner::default()
        };

        Ok(Self {
            path,
            inner: Mutex::new(inner),
        })
    }

    /// Atomically check-and-reserve a fingerprint for a folder. Returns
    /// `true` when the fingerprint was absent and is now reserved; `false`
    /// means it is a duplicate.
    pub fn reserve(&self, folder: &str, fingerprint: Fingerprint) -> bool {
        let mut inner = self.inner.lock().expect("fingerprint store poisoned");
        let inserted = inner
            .folders
            .entry(folder.to_string())
            .or_default()
            .insert(fingerprint);
        if inserted {
            inner.dirty = true;
        }
        inserted
    }

    /// Roll back a reservation whose write failed, so a later attempt (or a
    /// later run) can extract the content.
    pub fn release(&self, folder: &str, fingerprint: &Fingerprint) {
        let mut inner = self.inner.lock().expect("fingerprint store poisoned");
        if let Some(set) = inner.folders.get_mut(folder) {
            if set.remove(fingerprint) {
                inner.dirty = true;
            }
        }
    }

    pub fn contains(&self, folder: &str, fingerprint: &Fingerprint) -> bool {
        let inner = self.inner.lock().expect("fingerprint store poisoned");
        inner
            .folders
            .get(folder)
            .is_some_and(|set| set.contains(fingerprint))
    }

    /// Flush the store to disk via a temp-file-and-rename. A no-op when
    /// nothing changed since the last flush. Failure is reported to the
    /// caller but never aborts the run; the in-memory store stays
    /// authoritative.
    pub fn persist(&self) -> Result<()> {
        let snapshot = {
            let mut inner = self.inner.lock().expect("fingerprint store poisoned");
            if !inner.dirty {
                return Ok(());
            }
            let encoded =
                serde_json::to_string(&inner.folders).map_err(|e| MmsMediaError::StorePersist {
                    path: self.path.display().to_string(),
                    message: e.to_string(),
                })?;
            inner.dirty = false;
            encoded
        };

        let tmp_path = self.path.with_extension("json.tmp");
        let write = std::fs::write(&tmp_path, snapshot)
            .and_then(|_| std::fs::rename(&tmp_path, &self.path));

        write.map_err(|e| {
            // Re-mark dirty so a later cadence point retries the flush.
            self.inner.lock().expect("fingerprint store poisoned").dirty = true;
            MmsMediaError::StorePersist {
                path: self.path.display().to_string(),
                message: e.to_string(),
            }
        })
    }

    pub fn folder_count(&self) -> usize {
        self.inner
            .lock()
            .expect("fingerprint store poisoned")
            .folders
            .len()
    }

    pub fn fingerprint_count(&self) -> usize {
        self.inner
            .lock()
            .expect("fingerprint store poisoned")
            .folders
            .values()
            .map(|set| set.len())
            .sum()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_hex_roundtrip() {
        let fp = Fingerprint::of(b"hello");
        let hex = fp.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(Fingerprint::from_hex(&hex), Some(fp));
        assert_eq!(fp.short_hex(), hex[..8].to_string());
        assert!(Fingerprint::from_hex("zz").is_none());
    }

    #[test]
    fn test_missing_file_yields_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = FingerprintStore::load(dir.path().join("saved_hashes.json")).unwrap();
        assert_eq!(store.folder_count(), 0);
        assert_eq!(store.fingerprint_count(), 0);
    }

    #[test]
    fn test_unreadable_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved_hashes.json");
        std::fs::write(&path, "this is not json").unwrap();

        let error = FingerprintStore::load(&path).unwrap_err();
        assert!(matches!(error, MmsMediaError::StoreUnreadable { .. }));
        assert!(error.is_startup_fatal());
    }

    #[test]
    fn test_reserve_and_release() {
        let dir = TempDir::new().unwrap();
        let store = FingerprintStore::load(dir.path().join("h.json")).unwrap();
        let fp = Fingerprint::of(b"payload");

        assert!(store.reserve("Alice", fp));
        assert!(!store.reserve("Alice", fp));
        // Different folder partition: same content is not a duplicate
        assert!(store.reserve("Bob", fp));

        store.release("Alice", &fp);
        assert!(!store.contains("Alice", &fp));
        assert!(store.reserve("Alice", fp));
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("h.json");

        let store = FingerprintStore::load(&path).unwrap();
        let fp_a = Fingerprint::of(b"one");
        let fp_b = Fingerprint::of(b"two");
        store.reserve("Alice", fp_a);
        store.reserve("Alice", fp_b);
        store.reserve("Bob", fp_a);
        store.persist().unwrap();

        let reloaded = FingerprintStore::load(&path).unwrap();
        assert_eq!(reloaded.folder_count(), 2);
        assert_eq!(reloaded.fingerprint_count(), 3);
        assert!(reloaded.contains("Alice", &fp_b));
        assert!(!reloaded.contains("Bob", &fp_b));
    }

    #[test]
    fn test_persist_skips_when_clean() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("h.json");
        let store = FingerprintStore::load(&path).unwrap();

        // Nothing reserved: no file should appear
        store.persist().unwrap();
        assert!(!path.exists());

        store.reserve("Alice", Fingerprint::of(b"x"));
        store.persist().unwrap();
        assert!(path.exists());

        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();
        store.persist().unwrap();
        assert_eq!(
            std::fs::metadata(&path).unwrap().modified().unwrap(),
            modified
        );
    }

    #[test]
    fn test_concurrent_reserve_no_double_admit() {
        use std::sync::Arc;

        let dir = TempDir::new().unwrap();
        let store = Arc::new(FingerprintStore::load(dir.path().join("h.json")).unwrap());
        let fp = Fingerprint::of(b"shared");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || store.reserve("Alice", fp)));
        }

        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1);
    }
}
