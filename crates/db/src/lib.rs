//! JSON document store.
//!
//! The whole application state is one serde document. Readers get clones;
//! writers go through [`DocumentStore::transact`], which applies a command to
//! a draft and only swaps it in after the draft has been written to disk.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;

use circulation_kernel::{InitCtx, Module};

/// Bound for anything the store can hold.
pub trait Document: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Document for T where T: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static {}

pub struct DocumentStore<S> {
    path: Option<PathBuf>,
    state: RwLock<S>,
}

impl<S: Document> DocumentStore<S> {
    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self::with_state(None, S::default())
    }

    /// A store persisted at `path`. Call [`load`](Self::load) to read it.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self::with_state(Some(path.into()), S::default())
    }

    pub fn with_state(path: Option<PathBuf>, state: S) -> Self {
        Self {
            path,
            state: RwLock::new(state),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Replace the in-memory state with the document on disk.
    ///
    /// A missing file leaves the default state in place.
    pub async fn load(&self) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(target: "circulation-db", path = %path.display(), "no snapshot on disk, starting empty");
                return Ok(());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };

        let loaded: S = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        *self.state.write().await = loaded;

        tracing::info!(target: "circulation-db", path = %path.display(), bytes = bytes.len(), "snapshot loaded");
        Ok(())
    }

    /// Clone of the current state.
    pub async fn snapshot(&self) -> S {
        self.state.read().await.clone()
    }

    /// Run `f` against the current state under the read lock.
    pub async fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let guard = self.state.read().await;
        f(&guard)
    }

    /// Apply `f` as one transaction.
    ///
    /// `f` works on a draft. If it fails, or the draft cannot be written,
    /// the committed state is untouched. Writers are serialized by the lock.
    pub async fn transact<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut S) -> Result<R, E>,
        E: From<anyhow::Error>,
    {
        let mut guard = self.state.write().await;
        let mut draft = guard.clone();
        let output = f(&mut draft)?;

        if let Some(path) = &self.path {
            persist(path, &draft).await?;
        }

        *guard = draft;
        Ok(output)
    }
}

/// Write via a sibling temp file and rename so readers never see a torn document.
async fn persist<S: Serialize>(path: &Path, state: &S) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec_pretty(state).context("failed to serialize snapshot")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, &bytes)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to replace {}", path.display()))?;

    tracing::debug!(target: "circulation-db", path = %path.display(), bytes = bytes.len(), "snapshot persisted");
    Ok(())
}

/// Exposes a [`DocumentStore`] as the `db` core module.
pub struct StoreModule<S> {
    store: Arc<DocumentStore<S>>,
}

impl<S: Document> StoreModule<S> {
    pub fn new(store: Arc<DocumentStore<S>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: Document> Module for StoreModule<S> {
    fn name(&self) -> &'static str {
        "db"
    }

    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        match self.store.path() {
            Some(path) => tracing::info!(module = self.name(), path = %path.display(), "opening document store"),
            None => tracing::warn!(module = self.name(), "document store is memory-only, nothing will survive a restart"),
        }
        self.store.load().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Shelf {
        titles: Vec<String>,
    }

    #[tokio::test]
    async fn committed_writes_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("shelf.json");

        let store: DocumentStore<Shelf> = DocumentStore::at_path(&path);
        store.load().await.unwrap();
        store
            .transact(|shelf| {
                shelf.titles.push("Dune".to_string());
                Ok::<_, anyhow::Error>(())
            })
            .await
            .unwrap();

        let reopened: DocumentStore<Shelf> = DocumentStore::at_path(&path);
        reopened.load().await.unwrap();
        assert_eq!(reopened.snapshot().await.titles, vec!["Dune".to_string()]);
    }

    #[tokio::test]
    async fn failed_transaction_leaves_state_untouched() {
        let store: DocumentStore<Shelf> = DocumentStore::in_memory();
        store
            .transact(|shelf| {
                shelf.titles.push("Emma".to_string());
                Ok::<_, anyhow::Error>(())
            })
            .await
            .unwrap();

        let result: anyhow::Result<()> = store
            .transact(|shelf| {
                shelf.titles.clear();
                anyhow::bail!("rejected")
            })
            .await;

        assert!(result.is_err());
        assert_eq!(store.read(|s| s.titles.len()).await, 1);
    }

    #[tokio::test]
    async fn failed_persist_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the rename fail.
        let path = dir.path().join("shelf.json");
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let store: DocumentStore<Shelf> = DocumentStore::at_path(&path);
        let result: anyhow::Result<()> = store
            .transact(|shelf| {
                shelf.titles.push("Ulysses".to_string());
                Ok(())
            })
            .await;

        assert!(result.is_err());
        assert!(store.snapshot().await.titles.is_empty());
    }

    #[tokio::test]
    async fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store: DocumentStore<Shelf> = DocumentStore::at_path(dir.path().join("absent.json"));
        store.load().await.unwrap();
        assert_eq!(store.snapshot().await, Shelf::default());
    }
}
