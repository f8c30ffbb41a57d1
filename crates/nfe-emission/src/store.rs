//! # Emission Repository
//!
//! The orchestrator owns its document and contingency state through an
//! explicit repository trait: no process-wide singletons, no ad-hoc
//! global maps. Two backends ship with the engine:
//!
//! - [`InMemoryStore`]: concurrent maps, the default for embedding.
//! - [`FileStore`]: contingency records additionally persisted as one
//!   JSON file per access key, so parked documents survive a restart.
//!
//! Contingency insertion is first-writer-wins: a document enters the
//! queue at most once, and a second insertion attempt is an error.

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use nfe_core::{AccessKey, DocumentState, FiscalDocument};
use nfe_sefaz::AuthorityResponse;
use nfe_sign::SignedEnvelope;

use crate::contingency::{ContingencyRecord, StorageLocation};

/// Repository failures.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The document already has a contingency record.
    #[error("document {access_key} is already queued for contingency")]
    AlreadyQueued {
        /// Access key of the document.
        access_key: String,
    },

    /// No document record for the given access key.
    #[error("no document record for {access_key}")]
    NotFound {
        /// Access key that was looked up.
        access_key: String,
    },

    /// Filesystem failure in a persistent backend.
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    /// Record (de)serialization failure in a persistent backend.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Everything the engine tracks about one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// The document as handed to the engine.
    pub document: FiscalDocument,
    /// Current lifecycle state.
    pub state: DocumentState,
    /// The signed envelope, once produced.
    pub envelope: Option<SignedEnvelope>,
    /// Every authority response received for this document, in arrival
    /// order. Never pruned; rejections are audit material.
    pub responses: Vec<AuthorityResponse>,
    /// Protocol number of the final authorization.
    pub protocol: Option<String>,
}

impl DocumentRecord {
    /// A record for a freshly accepted draft.
    pub fn draft(document: FiscalDocument) -> Self {
        Self {
            document,
            state: DocumentState::Draft,
            envelope: None,
            responses: Vec::new(),
            protocol: None,
        }
    }
}

/// The repository the orchestrator drives.
///
/// Implementations must be `Send + Sync`; the emission paths and the
/// reconciliation loop share one instance.
pub trait EmissionStore: Send + Sync {
    /// Insert or replace the record for a document.
    fn put_document(&self, key: &AccessKey, record: DocumentRecord);

    /// Fetch a document record.
    fn document(&self, key: &AccessKey) -> Option<DocumentRecord>;

    /// Mutate a document record in place under the store's lock.
    fn update_document(
        &self,
        key: &AccessKey,
        update: &mut dyn FnMut(&mut DocumentRecord),
    ) -> Result<(), StoreError>;

    /// Queue a contingency record. Fails with
    /// [`StoreError::AlreadyQueued`] if the document is already queued.
    fn put_contingency(&self, record: ContingencyRecord) -> Result<ContingencyRecord, StoreError>;

    /// Replace an existing contingency record (retry bookkeeping).
    fn update_contingency(&self, record: &ContingencyRecord) -> Result<(), StoreError>;

    /// Delete a contingency record once its document is terminal.
    fn remove_contingency(&self, key: &AccessKey) -> Result<(), StoreError>;

    /// All currently parked records.
    fn pending_contingency(&self) -> Vec<ContingencyRecord>;
}

// ─── InMemoryStore ───────────────────────────────────────────────────────

/// Concurrent in-memory repository.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    documents: DashMap<String, DocumentRecord>,
    contingency: DashMap<String, ContingencyRecord>,
}

impl InMemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EmissionStore for InMemoryStore {
    fn put_document(&self, key: &AccessKey, record: DocumentRecord) {
        self.documents.insert(key.as_str().to_string(), record);
    }

    fn document(&self, key: &AccessKey) -> Option<DocumentRecord> {
        self.documents.get(key.as_str()).map(|r| r.clone())
    }

    fn update_document(
        &self,
        key: &AccessKey,
        update: &mut dyn FnMut(&mut DocumentRecord),
    ) -> Result<(), StoreError> {
        match self.documents.get_mut(key.as_str()) {
            Some(mut record) => {
                update(&mut record);
                Ok(())
            }
            None => Err(StoreError::NotFound {
                access_key: key.as_str().to_string(),
            }),
        }
    }

    fn put_contingency(&self, record: ContingencyRecord) -> Result<ContingencyRecord, StoreError> {
        use dashmap::mapref::entry::Entry;
        match self.contingency.entry(record.access_key.as_str().to_string()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyQueued {
                access_key: record.access_key.as_str().to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    fn update_contingency(&self, record: &ContingencyRecord) -> Result<(), StoreError> {
        self.contingency
            .insert(record.access_key.as_str().to_string(), record.clone());
        Ok(())
    }

    fn remove_contingency(&self, key: &AccessKey) -> Result<(), StoreError> {
        self.contingency.remove(key.as_str());
        Ok(())
    }

    fn pending_contingency(&self) -> Vec<ContingencyRecord> {
        self.contingency.iter().map(|r| r.clone()).collect()
    }
}

// ─── FileStore ───────────────────────────────────────────────────────────

/// Repository that persists contingency records to disk.
///
/// Document records stay in memory (their system of record is the
/// caller's own persistence, which is outside this engine); contingency
/// records carry the signed envelope and must survive a restart, so each
/// one is written as `<access_key>.json` under the store directory.
#[derive(Debug)]
pub struct FileStore {
    inner: InMemoryStore,
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory and loading
    /// any records left by a previous process.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let store = Self {
            inner: InMemoryStore::new(),
            dir,
        };
        for entry in std::fs::read_dir(&store.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let data = std::fs::read_to_string(&path)?;
            let record: ContingencyRecord = serde_json::from_str(&data)?;
            store
                .inner
                .contingency
                .insert(record.access_key.as_str().to_string(), record);
        }
        Ok(store)
    }

    fn record_path(&self, key: &AccessKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }

    fn write_record(&self, path: &Path, record: &ContingencyRecord) -> Result<(), StoreError> {
        let data = serde_json::to_string_pretty(record)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

impl EmissionStore for FileStore {
    fn put_document(&self, key: &AccessKey, record: DocumentRecord) {
        self.inner.put_document(key, record);
    }

    fn document(&self, key: &AccessKey) -> Option<DocumentRecord> {
        self.inner.document(key)
    }

    fn update_document(
        &self,
        key: &AccessKey,
        update: &mut dyn FnMut(&mut DocumentRecord),
    ) -> Result<(), StoreError> {
        self.inner.update_document(key, update)
    }

    fn put_contingency(
        &self,
        mut record: ContingencyRecord,
    ) -> Result<ContingencyRecord, StoreError> {
        let path = self.record_path(&record.access_key);
        record.location = StorageLocation::File(path.clone());
        let stored = self.inner.put_contingency(record)?;
        self.write_record(&path, &stored)?;
        Ok(stored)
    }

    fn update_contingency(&self, record: &ContingencyRecord) -> Result<(), StoreError> {
        self.inner.update_contingency(record)?;
        self.write_record(&self.record_path(&record.access_key), record)
    }

    fn remove_contingency(&self, key: &AccessKey) -> Result<(), StoreError> {
        self.inner.remove_contingency(key)?;
        let path = self.record_path(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn pending_contingency(&self) -> Vec<ContingencyRecord> {
        self.inner.pending_contingency()
    }
}
