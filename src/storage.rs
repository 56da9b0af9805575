// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! A small key/value store of JSON documents, one file per key.

use std::{
    collections::HashMap,
    fs,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("stored value for {key} is not valid: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug)]
enum Backend {
    Directory(PathBuf),
    /// Kept only for the lifetime of the process.
    Memory(Arc<Mutex<HashMap<String, String>>>),
}

/// Persistent storage for small documents such as the trial log.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    backend: Backend,
}

impl LocalStorage {
    /// Storage rooted at the given directory, which is created on first write.
    pub fn new(dir: &Path) -> LocalStorage {
        LocalStorage {
            backend: Backend::Directory(dir.to_path_buf()),
        }
    }

    /// Storage that never touches the disk.
    pub fn ephemeral() -> LocalStorage {
        LocalStorage {
            backend: Backend::Memory(Arc::new(Mutex::new(HashMap::new()))),
        }
    }

    fn path(dir: &Path, key: &str) -> PathBuf {
        dir.join(format!("{}.json", key))
    }

    /// Reads the raw document for the key, if one is stored.
    pub fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        match &self.backend {
            Backend::Directory(dir) => match fs::read_to_string(Self::path(dir, key)) {
                Ok(contents) => Ok(Some(contents)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(StorageError::Io {
                    key: key.to_string(),
                    source: e,
                }),
            },
            Backend::Memory(values) => Ok(values.lock().get(key).cloned()),
        }
    }

    /// Writes the raw document for the key.
    pub fn set_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        match &self.backend {
            Backend::Directory(dir) => {
                let io_err = |source| StorageError::Io {
                    key: key.to_string(),
                    source,
                };
                fs::create_dir_all(dir).map_err(io_err)?;
                fs::write(Self::path(dir, key), value).map_err(io_err)
            }
            Backend::Memory(values) => {
                values.lock().insert(key.to_string(), value.to_string());
                Ok(())
            }
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.get_raw(key)? {
            Some(contents) => serde_json::from_str(&contents)
                .map(Some)
                .map_err(|source| StorageError::Json {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let contents = serde_json::to_string(value).map_err(|source| StorageError::Json {
            key: key.to_string(),
            source,
        })?;
        self.set_raw(key, &contents)
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_directory_round_trip() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let storage = LocalStorage::new(&dir.path().join("nested"));

        assert_eq!(None, storage.get::<usize>("missing")?);
        storage.set("ppt-last-chroma-set", &3usize)?;
        assert_eq!(Some(3), storage.get::<usize>("ppt-last-chroma-set")?);
        assert_eq!(
            "3",
            fs::read_to_string(dir.path().join("nested/ppt-last-chroma-set.json"))?
        );
        Ok(())
    }

    #[test]
    fn test_invalid_json() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("broken.json"), "{not json")?;
        let storage = LocalStorage::new(dir.path());

        assert!(matches!(
            storage.get::<usize>("broken"),
            Err(StorageError::Json { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_write_failure() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let blocker = dir.path().join("file");
        fs::write(&blocker, "")?;
        // A regular file where the storage directory should be.
        let storage = LocalStorage::new(&blocker);

        assert!(matches!(
            storage.set("key", &1usize),
            Err(StorageError::Io { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_ephemeral() -> Result<(), Box<dyn Error>> {
        let storage = LocalStorage::ephemeral();
        storage.set("key", &vec![1, 2, 3])?;
        assert_eq!(Some(vec![1, 2, 3]), storage.get::<Vec<i32>>("key")?);

        let shared = storage.clone();
        shared.set("key", &vec![4])?;
        assert_eq!(Some(vec![4]), storage.get::<Vec<i32>>("key")?);
        Ok(())
    }
}
