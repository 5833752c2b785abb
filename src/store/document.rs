// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path-bound JSON document with serialized merge writes.
//!
//! The lifecycle units and the action surface both write to the same
//! documents. Rather than scatter read-modify-write cycles across call
//! sites, every writer funnels through [`JsonDocument::merge`]: the mutex
//! makes the cycle atomic with respect to other writers in this process,
//! and the temp-file + rename keeps a crash from leaving a torn file.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document not found: {0}")]
    NotFound(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A JSON document at a fixed path with single-writer merge discipline.
#[derive(Debug)]
pub struct JsonDocument<T> {
    path: PathBuf,
    write_lock: Mutex<()>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the document exists on disk.
    pub fn exists(&self) -> bool {
        File::open(&self.path).is_ok()
    }

    /// Read and deserialize the document.
    pub fn read(&self) -> StoreResult<T> {
        let file = File::open(&self.path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound(self.path.display().to_string())
            } else {
                StoreError::Io(e)
            }
        })?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Read the document, creating it with default contents on first use.
    pub async fn read_or_init(&self) -> StoreResult<T> {
        match self.read() {
            Ok(value) => Ok(value),
            Err(StoreError::NotFound(_)) => {
                let value = T::default();
                let _guard = self.write_lock.lock().await;
                self.write_unlocked(&value)?;
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }

    /// Apply a patch under the write lock and persist the result atomically.
    ///
    /// The patch sees the current on-disk contents (or the default when the
    /// document does not exist yet). Returns the persisted value.
    pub async fn merge<F>(&self, patch: F) -> StoreResult<T>
    where
        F: FnOnce(&mut T),
    {
        let _guard = self.write_lock.lock().await;
        let mut value = match self.read() {
            Ok(v) => v,
            Err(StoreError::NotFound(_)) => T::default(),
            Err(e) => return Err(e),
        };
        patch(&mut value);
        self.write_unlocked(&value)?;
        Ok(value)
    }

    /// Replace the whole document.
    pub async fn write(&self, value: &T) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        self.write_unlocked(value)
    }

    // Write to a temp file first, then rename for atomicity.
    fn write_unlocked(&self, value: &T) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("tmp");
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
        }

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Doc {
        count: u32,
        label: Option<String>,
    }

    fn doc_in(dir: &tempfile::TempDir) -> JsonDocument<Doc> {
        JsonDocument::new(dir.path().join("doc.json"))
    }

    #[tokio::test]
    async fn read_or_init_creates_default() {
        let dir = tempfile::tempdir().unwrap();
        let doc = doc_in(&dir);
        assert!(!doc.exists());

        let value = doc.read_or_init().await.unwrap();
        assert_eq!(value, Doc::default());
        assert!(doc.exists());
    }

    #[tokio::test]
    async fn merge_patches_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let doc = doc_in(&dir);

        doc.merge(|d| d.count = 3).await.unwrap();
        doc.merge(|d| d.label = Some("hello".into())).await.unwrap();

        let value = doc.read().unwrap();
        assert_eq!(value.count, 3);
        assert_eq!(value.label.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn concurrent_merges_do_not_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let doc = std::sync::Arc::new(doc_in(&dir));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let doc = doc.clone();
            handles.push(tokio::spawn(async move {
                doc.merge(|d| d.count += 1).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(doc.read().unwrap().count, 16);
    }

    #[tokio::test]
    async fn write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let doc = doc_in(&dir);
        doc.write(&Doc {
            count: 1,
            label: None,
        })
        .await
        .unwrap();

        assert!(!dir.path().join("doc.tmp").exists());
    }
}
