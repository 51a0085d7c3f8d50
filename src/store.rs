//! Key-value persistence for timetable documents.
//!
//! Every value is a whole JSON document stored under a fixed key. Writes
//! replace the document; nothing is patched in place.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::{Entry, Mode};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// String-keyed storage of serialized documents.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

// ==================== Storage Keys ====================

/// The documents the application keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    Entries,
    ExamEntries,
    ExamWindow,
    SubjectTemplates,
    TimeTemplates,
    ExamSubjectTemplates,
    ExamTimeTemplates,
    ExamTitleTemplates,
    ExamScheduleTemplates,
    ScheduledNotifications,
}

impl StorageKey {
    pub const fn as_str(self) -> &'static str {
        match self {
            StorageKey::Entries => "@timetable_entries_v1",
            StorageKey::ExamEntries => "@exam_entries_v1",
            StorageKey::ExamWindow => "@exam_mode_v1",
            StorageKey::SubjectTemplates => "@subject_templates_v1",
            StorageKey::TimeTemplates => "@time_templates_v1",
            StorageKey::ExamSubjectTemplates => "@exam_subject_templates_v1",
            StorageKey::ExamTimeTemplates => "@exam_time_templates_v1",
            StorageKey::ExamTitleTemplates => "@exam_title_templates_v1",
            StorageKey::ExamScheduleTemplates => "@exam_schedule_templates_v1",
            StorageKey::ScheduledNotifications => "@scheduled_notifications_v1",
        }
    }

    pub const fn entries(mode: Mode) -> Self {
        match mode {
            Mode::Regular => StorageKey::Entries,
            Mode::Exam => StorageKey::ExamEntries,
        }
    }

    pub const fn subject_templates(mode: Mode) -> Self {
        match mode {
            Mode::Regular => StorageKey::SubjectTemplates,
            Mode::Exam => StorageKey::ExamSubjectTemplates,
        }
    }

    pub const fn time_templates(mode: Mode) -> Self {
        match mode {
            Mode::Regular => StorageKey::TimeTemplates,
            Mode::Exam => StorageKey::ExamTimeTemplates,
        }
    }
}

// ==================== Typed Access ====================

/// Read and decode a document. A missing key is `Ok(None)`.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: StorageKey,
) -> Result<Option<T>, StoreError> {
    match store.get(key.as_str())? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: StorageKey,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)?;
    store.set(key.as_str(), &raw)
}

/// Result of a best-effort write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Saved,
    /// The write failed; in-memory state is still authoritative for this
    /// session.
    Failed(String),
}

impl PersistOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, PersistOutcome::Saved)
    }
}

/// Write a document, logging instead of propagating failures.
pub fn persist<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: StorageKey,
    value: &T,
) -> PersistOutcome {
    match save_json(store, key, value) {
        Ok(()) => PersistOutcome::Saved,
        Err(e) => {
            tracing::warn!(key = key.as_str(), error = %e, "Failed to persist document");
            PersistOutcome::Failed(e.to_string())
        }
    }
}

/// Read a document, logging and falling back to `None` on failure.
pub fn load_or_warn<T: DeserializeOwned>(store: &dyn KeyValueStore, key: StorageKey) -> Option<T> {
    match load_json(store, key) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key = key.as_str(), error = %e, "Failed to load document");
            None
        }
    }
}

// ==================== Entry Documents ====================

/// A stored entry collection, decoded one record at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryDocument {
    pub entries: Vec<Entry>,
    /// Records that failed to decode, kept verbatim.
    pub unreadable: Vec<Value>,
}

/// Read an entry collection. A record that fails to decode is set aside
/// instead of failing the whole document; only a document that is not a JSON
/// array is an error.
pub fn load_entries(store: &dyn KeyValueStore, key: StorageKey) -> Result<EntryDocument, StoreError> {
    let Some(raw) = store.get(key.as_str())? else {
        return Ok(EntryDocument::default());
    };
    let records: Vec<Value> = serde_json::from_str(&raw)?;

    let mut document = EntryDocument::default();
    for record in records {
        match Entry::deserialize(&record) {
            Ok(entry) => document.entries.push(entry),
            Err(e) => {
                tracing::warn!(key = key.as_str(), error = %e, "Skipping unreadable entry");
                document.unreadable.push(record);
            }
        }
    }
    Ok(document)
}

/// One record of an entry collection on its way back to storage.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum EntryRecord<'a> {
    Entry(&'a Entry),
    Unreadable(&'a Value),
}

/// Decoded entries followed by the records that could not be decoded.
pub fn entry_records<'a>(entries: &'a [Entry], unreadable: &'a [Value]) -> Vec<EntryRecord<'a>> {
    entries
        .iter()
        .map(EntryRecord::Entry)
        .chain(unreadable.iter().map(EntryRecord::Unreadable))
        .collect()
}

// ==================== JSON File Store ====================

/// All documents in a single JSON file, rewritten atomically on every set.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    documents: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing or empty file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let documents = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), documents = documents.len(), "Opened store");
        Ok(Self {
            path,
            documents: Mutex::new(documents),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>, StoreError> {
        self.documents
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn write_file(&self, documents: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(documents)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut documents = self.lock()?;
        let mut next = documents.clone();
        next.insert(key.to_string(), value.to_string());
        self.write_file(&next)?;
        *documents = next;
        Ok(())
    }
}

// ==================== Memory Store ====================

/// In-memory store for tests. Writes can be made to fail on demand.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    documents: Arc<Mutex<HashMap<String, String>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set` fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Raw stored text for a key.
    pub fn raw(&self, key: StorageKey) -> Option<String> {
        self.documents.lock().unwrap().get(key.as_str()).cloned()
    }

    pub fn insert_raw(&self, key: StorageKey, value: &str) {
        self.documents
            .lock()
            .unwrap()
            .insert(key.as_str().to_string(), value.to_string());
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.documents.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        self.documents
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
