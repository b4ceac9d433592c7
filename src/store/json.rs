//! JSON document store backing both record kinds
//!
//! The whole document is cached in memory and rewritten (temp file + rename)
//! after every mutation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::display::DisplayId;

use super::{DisplayRecord, DisplayStore, KeybindStore, KeybindUsage, Keybinding, StoreError};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    displays: Vec<DisplayRecord>,
    #[serde(default)]
    keybinds: Vec<Keybinding>,
}

/// File-backed store; `in_memory()` instances never touch disk
pub struct JsonStore {
    path: Option<PathBuf>,
    document: Mutex<StoreDocument>,
}

impl JsonStore {
    /// Open (or create) the store at `path` and seed missing keybindings
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let document = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(?path, "no store document yet, starting empty");
                StoreDocument::default()
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_owned(),
                    source,
                })
            }
        };

        let store = Self {
            path: Some(path.to_owned()),
            document: Mutex::new(document),
        };
        store.seed_keybinds().await?;
        Ok(store)
    }

    /// A store that only lives in memory, seeded like a fresh install
    pub fn in_memory() -> Self {
        let document = StoreDocument {
            displays: Vec::new(),
            keybinds: KeybindUsage::ALL.iter().copied().map(Keybinding::unset).collect(),
        };
        Self {
            path: None,
            document: Mutex::new(document),
        }
    }

    /// Re-read the document from disk, replacing the cache
    ///
    /// Used when the UI reports that it edited the file behind our back.
    pub async fn reload(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = tokio::fs::read(path).await.map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let fresh: StoreDocument = serde_json::from_slice(&bytes)?;
        *self.document.lock().await = fresh;
        self.seed_keybinds().await
    }

    async fn seed_keybinds(&self) -> Result<(), StoreError> {
        let mut document = self.document.lock().await;
        let mut next = document.clone();
        let mut seeded = false;
        for usage in KeybindUsage::ALL {
            if !next.keybinds.iter().any(|k| k.usage == usage) {
                debug!(%usage, "seeding unset keybinding");
                next.keybinds.push(Keybinding::unset(usage));
                seeded = true;
            }
        }
        if seeded {
            self.persist(&next).await?;
            *document = next;
        }
        Ok(())
    }

    /// Apply `edit` to a copy, write it, then publish it to the cache
    ///
    /// A failed write leaves the cache exactly as it was on disk.
    async fn update<F>(&self, edit: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StoreDocument) + Send,
    {
        let mut document = self.document.lock().await;
        let mut next = document.clone();
        edit(&mut next);
        self.persist(&next).await?;
        *document = next;
        Ok(())
    }

    async fn persist(&self, document: &StoreDocument) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let bytes = serde_json::to_vec_pretty(document)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl DisplayStore for JsonStore {
    async fn get_display(&self, id: DisplayId) -> Result<Option<DisplayRecord>, StoreError> {
        let document = self.document.lock().await;
        Ok(document.displays.iter().find(|d| d.display_id == id).cloned())
    }

    async fn list_displays(&self) -> Result<Vec<DisplayRecord>, StoreError> {
        Ok(self.document.lock().await.displays.clone())
    }

    async fn put_display(&self, record: DisplayRecord) -> Result<(), StoreError> {
        self.update(move |document| {
            match document
                .displays
                .iter_mut()
                .find(|d| d.display_id == record.display_id)
            {
                Some(existing) => *existing = record,
                None => document.displays.push(record),
            }
        })
        .await
    }

    async fn delete_all_displays(&self) -> Result<(), StoreError> {
        self.update(|document| document.displays.clear()).await
    }
}

#[async_trait]
impl KeybindStore for JsonStore {
    async fn get_keybind(&self, usage: KeybindUsage) -> Result<Option<Keybinding>, StoreError> {
        let document = self.document.lock().await;
        Ok(document.keybinds.iter().find(|k| k.usage == usage).cloned())
    }

    async fn list_keybinds(&self) -> Result<Vec<Keybinding>, StoreError> {
        Ok(self.document.lock().await.keybinds.clone())
    }

    async fn put_keybind(&self, binding: Keybinding) -> Result<(), StoreError> {
        self.update(move |document| {
            match document.keybinds.iter_mut().find(|k| k.usage == binding.usage) {
                Some(existing) => *existing = binding,
                None => document.keybinds.push(binding),
            }
        })
        .await
    }
}
