//! Local key-value store primitive.
//!
//! One serialized blob per string key, stored as a file under a root
//! directory. This is the single shared mutable namespace everything
//! client-local builds on: collections (through the local backend),
//! filter preferences, favorites, the comparison set, and the analytics
//! ring buffers.
//!
//! There are no transactional guarantees across keys; clearing five
//! filter keys is five independent writes. Two processes writing the
//! same root concurrently is an accepted limitation, not handled here.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Handle to a key-value namespace rooted at a directory.
#[derive(Debug, Clone)]
pub struct Kv {
    root: PathBuf,
}

impl Kv {
    /// Open a namespace, creating the root directory if needed.
    pub fn open(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Directory this namespace lives in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    /// Read the raw blob for a key. Missing or unreadable keys degrade to
    /// `None`.
    pub fn read(&self, key: &str) -> Option<String> {
        match fs::read_to_string(self.key_path(key)) {
            Ok(s) => Some(s),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "unreadable key, treating as absent");
                None
            }
        }
    }

    /// Write the raw blob for a key, replacing any previous value.
    pub fn write(&self, key: &str, value: &str) -> io::Result<()> {
        fs::write(self.key_path(key), value)
    }

    /// Remove a key. Removing an absent key succeeds.
    pub fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Deserialize the value under a key. Corrupt payloads degrade to
    /// `None` with a warning.
    pub fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read(key)?;
        match serde_json::from_str(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key, error = %e, "corrupt value, treating as absent");
                None
            }
        }
    }

    /// Serialize a value under a key.
    pub fn write_json<T: Serialize>(&self, key: &str, value: &T) -> io::Result<()> {
        let raw = serde_json::to_string(value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.write(key, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn round_trip_and_remove() {
        let tmp = TempDir::new().unwrap();
        let kv = Kv::open(tmp.path()).unwrap();

        assert_eq!(kv.read("missing"), None);
        kv.write_json("nums", &vec![1, 2, 3]).unwrap();
        assert_eq!(kv.read_json::<Vec<i32>>("nums"), Some(vec![1, 2, 3]));

        kv.remove("nums").unwrap();
        assert_eq!(kv.read("nums"), None);
        // removing again is fine
        kv.remove("nums").unwrap();
    }

    #[test]
    fn corrupt_blob_reads_as_absent() {
        let tmp = TempDir::new().unwrap();
        let kv = Kv::open(tmp.path()).unwrap();
        kv.write("broken", "{not json").unwrap();
        assert_eq!(kv.read_json::<Vec<i32>>("broken"), None);
    }
}
