//! File registry service: validates, catalogues and retrieves uploaded
//! documents, optionally scoped to a patient.
//!
//! # Persistence
//!
//! All state lives in the key-value store:
//! - `uploaded_file_<id>`: JSON `FileRecord`
//! - `uploaded_files_index`: JSON array of ids
//!
//! Nothing is cached in memory; every read goes back to the store. The index
//! is updated with compare-and-swap so concurrent uploads and deletes never
//! drop each other's ids.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{TimeDelta, Utc};

use crate::adapters::StorageError;
use crate::domain::{generate_file_id, FileRecord, FileStats, UploadFile, ValidationError};
use crate::ports::KeyValueStore;

/// Key prefix of per-file entries.
pub const FILE_KEY_PREFIX: &str = "uploaded_file_";

/// Key of the id index.
pub const INDEX_KEY: &str = "uploaded_files_index";

/// Default delay between progress ticks.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

const PROGRESS_STEP: u8 = 10;
const MAX_INDEX_RETRIES: usize = 16;

/// Error type for registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Registry entry serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Index update lost the race {0} times in a row")]
    IndexContention(usize),
}

/// Progress notification for a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadProgress {
    pub file_name: String,
    /// 0 to 100
    pub percent: u8,
}

/// Outcome of a batch upload. Rejections do not abort the batch.
#[derive(Debug, Default)]
pub struct UploadBatch {
    pub stored: Vec<FileRecord>,
    pub rejected: Vec<ValidationError>,
}

fn storage_err<E: Into<StorageError>>(e: E) -> RegistryError {
    RegistryError::Storage(e.into())
}

fn record_key(id: &str) -> String {
    format!("{FILE_KEY_PREFIX}{id}")
}

/// Service for the local document catalog.
pub struct FileRegistry<S>
where
    S: KeyValueStore,
{
    store: Arc<S>,
    progress_interval: Duration,
}

impl<S> FileRegistry<S>
where
    S: KeyValueStore,
    S::Error: Into<StorageError>,
{
    /// Create a new registry over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Set the delay between progress ticks.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Validate and store a batch of files.
    ///
    /// Each file is checked independently; a rejected file is reported in
    /// `UploadBatch::rejected` and the rest of the batch proceeds. Progress
    /// is reported from 0 to 100 in steps of 10 for every accepted file.
    ///
    /// # Errors
    /// Returns error if the store fails; files stored before the failure stay
    /// stored.
    pub fn upload(
        &self,
        files: Vec<UploadFile>,
        patient_id: Option<&str>,
        mut on_progress: Option<&mut dyn FnMut(&UploadProgress)>,
    ) -> Result<UploadBatch, RegistryError> {
        let mut batch = UploadBatch::default();

        for file in files {
            if let Err(rejection) = file.validate() {
                tracing::warn!("Rejected upload: {}", rejection);
                batch.rejected.push(rejection);
                continue;
            }

            let id = self.unique_id()?;
            let mut report = |percent: u8| {
                if let Some(callback) = on_progress.as_mut() {
                    callback(&UploadProgress {
                        file_name: file.name.clone(),
                        percent,
                    });
                }
            };

            let mut percent = 0;
            while percent < 100 {
                report(percent);
                if !self.progress_interval.is_zero() {
                    thread::sleep(self.progress_interval);
                }
                percent += PROGRESS_STEP;
            }

            let record = FileRecord::new(id, &file, patient_id.map(str::to_string), Utc::now());
            self.persist(&record)?;
            report(100);

            tracing::debug!("Stored file {} ({} bytes)", record.id, record.size);
            batch.stored.push(record);
        }

        tracing::info!(
            "Upload batch complete: {} stored, {} rejected",
            batch.stored.len(),
            batch.rejected.len()
        );
        Ok(batch)
    }

    /// Fetch a record by id.
    ///
    /// # Errors
    /// Returns error if the store fails. A corrupt entry reads as absent.
    pub fn get(&self, id: &str) -> Result<Option<FileRecord>, RegistryError> {
        let Some(raw) = self.store.get(&record_key(id)).map_err(storage_err)? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!("Skipping corrupt registry entry {}: {}", id, e);
                Ok(None)
            }
        }
    }

    /// All records, in index order.
    ///
    /// Index ids whose entry is missing or unreadable are dropped from the
    /// index.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub fn list(&self) -> Result<Vec<FileRecord>, RegistryError> {
        let (ids, _) = self.load_index()?;
        let mut records = Vec::with_capacity(ids.len());
        let mut dangling = Vec::new();
        for id in ids {
            match self.get(&id)? {
                Some(record) => records.push(record),
                None => dangling.push(id),
            }
        }

        if !dangling.is_empty() {
            self.prune_index(&dangling)?;
        }
        Ok(records)
    }

    /// Records owned by a patient (no ordering guarantee).
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub fn get_by_patient(&self, patient_id: &str) -> Result<Vec<FileRecord>, RegistryError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|record| record.patient_id.as_deref() == Some(patient_id))
            .collect())
    }

    /// Delete a record. Returns whether anything was removed.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub fn delete(&self, id: &str) -> Result<bool, RegistryError> {
        let removed_entry = self.store.remove(&record_key(id)).map_err(storage_err)?;

        let mut removed_from_index = false;
        self.update_index(|ids| {
            let before = ids.len();
            ids.retain(|existing| existing != id);
            removed_from_index = ids.len() != before;
            removed_from_index
        })?;

        if removed_entry || removed_from_index {
            tracing::debug!("Deleted file {}", id);
        }
        Ok(removed_entry || removed_from_index)
    }

    /// Delete every record uploaded more than `days` days ago.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub fn cleanup_older_than(&self, days: u32) -> Result<usize, RegistryError> {
        // Past the representable range nothing can be older than the cutoff.
        let Some(cutoff) = TimeDelta::try_days(i64::from(days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            tracing::info!("Cleanup cutoff of {} days predates any record", days);
            return Ok(0);
        };

        let mut removed = 0;
        for record in self.list()? {
            if record.uploaded_at < cutoff && self.delete(&record.id)? {
                removed += 1;
            }
        }

        tracing::info!("Cleanup removed {} files older than {} days", removed, days);
        Ok(removed)
    }

    /// Aggregate counts and sizes over the current contents.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub fn stats(&self) -> Result<FileStats, RegistryError> {
        Ok(FileStats::from_records(&self.list()?))
    }

    /// Write a record and add its id to the index.
    fn persist(&self, record: &FileRecord) -> Result<(), RegistryError> {
        let json = serde_json::to_string(record)?;
        self.store
            .set(&record_key(&record.id), &json)
            .map_err(storage_err)?;

        self.update_index(|ids| {
            if ids.iter().any(|existing| existing == &record.id) {
                false
            } else {
                ids.push(record.id.clone());
                true
            }
        })
    }

    /// Remove ids with no readable entry from the index.
    fn prune_index(&self, dangling: &[String]) -> Result<(), RegistryError> {
        tracing::warn!("Dropping {} dangling ids from the registry index", dangling.len());
        self.update_index(|ids| {
            let before = ids.len();
            ids.retain(|id| !dangling.contains(id));
            ids.len() != before
        })
    }

    fn unique_id(&self) -> Result<String, RegistryError> {
        loop {
            let id = generate_file_id();
            if self.store.get(&record_key(&id)).map_err(storage_err)?.is_none() {
                return Ok(id);
            }
        }
    }

    /// Read the index along with the raw value it was parsed from.
    ///
    /// An unreadable index is rebuilt from the per-file keys.
    fn load_index(&self) -> Result<(Vec<String>, Option<String>), RegistryError> {
        let raw = self.store.get(INDEX_KEY).map_err(storage_err)?;

        let ids = match raw.as_deref() {
            None => Vec::new(),
            Some(text) => match serde_json::from_str::<Vec<String>>(text) {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::warn!("Registry index unreadable ({}), rebuilding from entries", e);
                    self.store
                        .keys_with_prefix(FILE_KEY_PREFIX)
                        .map_err(storage_err)?
                        .into_iter()
                        .filter_map(|key| key.strip_prefix(FILE_KEY_PREFIX).map(str::to_string))
                        .collect()
                }
            },
        };

        Ok((ids, raw))
    }

    /// Read-modify-write the index. `mutate` returns whether it changed
    /// anything; unchanged indexes are not written back.
    fn update_index<F>(&self, mut mutate: F) -> Result<(), RegistryError>
    where
        F: FnMut(&mut Vec<String>) -> bool,
    {
        for _ in 0..MAX_INDEX_RETRIES {
            let (mut ids, raw) = self.load_index()?;
            if !mutate(&mut ids) {
                return Ok(());
            }

            let updated = serde_json::to_string(&ids)?;
            if self
                .store
                .compare_and_swap(INDEX_KEY, raw.as_deref(), &updated)
                .map_err(storage_err)?
            {
                return Ok(());
            }
            tracing::debug!("Registry index changed concurrently, retrying");
        }

        Err(RegistryError::IndexContention(MAX_INDEX_RETRIES))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::SqliteStore;

    const MIB: usize = 1024 * 1024;

    fn create_test_registry() -> FileRegistry<SqliteStore> {
        let store = Arc::new(SqliteStore::in_memory().expect("Should create db"));
        FileRegistry::new(store).with_progress_interval(Duration::ZERO)
    }

    fn pdf(name: &str, size: usize) -> UploadFile {
        UploadFile::new(name, "application/pdf", vec![0u8; size])
    }

    fn aged_record(registry: &FileRegistry<SqliteStore>, name: &str, days: i64) -> FileRecord {
        let uploaded_at = Utc::now() - chrono::Duration::days(days);
        let record = FileRecord::new(generate_file_id(), &pdf(name, 10), None, uploaded_at);
        registry.persist(&record).expect("Should persist");
        record
    }

    #[test]
    fn test_rejected_type_creates_no_entry() {
        let registry = create_test_registry();
        let exe = UploadFile::new("setup.bin", "application/x-executable", vec![1, 2, 3]);

        let batch = registry.upload(vec![exe], None, None).expect("Should run");
        assert!(batch.stored.is_empty());
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].file_name, "setup.bin");
        assert_eq!(registry.stats().expect("Should stat").total_files, 0);
    }

    #[test]
    fn test_size_limit() {
        let registry = create_test_registry();

        let batch = registry
            .upload(vec![pdf("big.pdf", 6 * MIB), pdf("ok.pdf", 4 * MIB)], None, None)
            .expect("Should run");

        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].file_name, "big.pdf");
        assert_eq!(batch.stored.len(), 1);

        let stored = &batch.stored[0];
        let fetched = registry.get(&stored.id).expect("Should read").expect("Should exist");
        assert_eq!(&fetched, stored);
        assert_eq!(fetched.size, (4 * MIB) as u64);
    }

    #[test]
    fn test_get_missing_is_none() {
        let registry = create_test_registry();
        assert!(registry.get("does-not-exist").expect("Should read").is_none());
    }

    #[test]
    fn test_get_by_patient() {
        let registry = create_test_registry();
        registry
            .upload(vec![pdf("a.pdf", 10), pdf("b.pdf", 20)], Some("BJ20250001"), None)
            .expect("Should upload");
        registry
            .upload(vec![pdf("c.pdf", 30)], Some("BJ20250002"), None)
            .expect("Should upload");

        let mut names: Vec<String> = registry
            .get_by_patient("BJ20250001")
            .expect("Should query")
            .into_iter()
            .map(|r| r.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
        assert!(registry.get_by_patient("BJ29999999").expect("Should query").is_empty());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let registry = create_test_registry();
        let batch = registry.upload(vec![pdf("a.pdf", 10)], None, None).expect("Should upload");
        let id = batch.stored[0].id.clone();

        assert!(registry.delete(&id).expect("Should delete"));
        assert!(!registry.delete(&id).expect("Should delete"));
        assert!(registry.get(&id).expect("Should read").is_none());
        assert!(registry.list().expect("Should list").is_empty());
    }

    #[test]
    fn test_cleanup_older_than() {
        let registry = create_test_registry();
        let old_a = aged_record(&registry, "old-a.pdf", 45);
        let old_b = aged_record(&registry, "old-b.pdf", 31);
        let recent = aged_record(&registry, "recent.pdf", 29);
        registry.upload(vec![pdf("today.pdf", 10)], None, None).expect("Should upload");

        assert_eq!(registry.cleanup_older_than(30).expect("Should clean"), 2);
        assert_eq!(registry.cleanup_older_than(30).expect("Should clean"), 0);

        assert!(registry.get(&old_a.id).expect("Should read").is_none());
        assert!(registry.get(&old_b.id).expect("Should read").is_none());
        assert!(registry.get(&recent.id).expect("Should read").is_some());
        assert_eq!(registry.list().expect("Should list").len(), 2);
    }

    #[test]
    fn test_progress_reports() {
        let registry = create_test_registry();
        let mut events = Vec::new();
        let mut on_progress = |p: &UploadProgress| events.push(p.clone());

        registry
            .upload(
                vec![
                    pdf("a.pdf", 10),
                    UploadFile::new("x.exe", "application/x-msdownload", vec![1]),
                ],
                None,
                Some(&mut on_progress),
            )
            .expect("Should upload");

        let percents: Vec<u8> = events.iter().map(|p| p.percent).collect();
        assert_eq!(percents, vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
        assert!(events.iter().all(|p| p.file_name == "a.pdf"));
    }

    #[test]
    fn test_stats() {
        let registry = create_test_registry();
        registry
            .upload(
                vec![
                    pdf("a.pdf", 100),
                    UploadFile::new("b.png", "image/png", vec![0u8; 50]),
                    UploadFile::new("c.gif", "", vec![0u8; 25]),
                ],
                None,
                None,
            )
            .expect("Should upload");

        let stats = registry.stats().expect("Should stat");
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.total_size, 175);
        assert_eq!(stats.files_by_type["application/pdf"], 1);
        assert_eq!(stats.files_by_type["image/png"], 1);
        assert_eq!(stats.files_by_type["image/gif"], 1);
    }

    #[test]
    fn test_store_is_canonical() {
        let store = Arc::new(SqliteStore::in_memory().expect("Should create db"));
        let writer = FileRegistry::new(Arc::clone(&store)).with_progress_interval(Duration::ZERO);
        let reader = FileRegistry::new(Arc::clone(&store));

        let batch = writer.upload(vec![pdf("a.pdf", 10)], None, None).expect("Should upload");
        let id = &batch.stored[0].id;

        assert!(reader.get(id).expect("Should read").is_some());
        let index = store.get(INDEX_KEY).expect("Should read").expect("Index exists");
        assert_eq!(index, format!("[\"{id}\"]"));
    }

    #[test]
    fn test_corrupt_index_is_rebuilt() {
        let store = Arc::new(SqliteStore::in_memory().expect("Should create db"));
        let registry = FileRegistry::new(Arc::clone(&store)).with_progress_interval(Duration::ZERO);
        registry.upload(vec![pdf("a.pdf", 10)], None, None).expect("Should upload");

        store.set(INDEX_KEY, "{not json").expect("Should write");
        assert_eq!(registry.list().expect("Should list").len(), 1);

        registry.upload(vec![pdf("b.pdf", 10)], None, None).expect("Should upload");
        assert_eq!(registry.list().expect("Should list").len(), 2);
    }

    #[test]
    fn test_corrupt_entry_is_skipped() {
        let store = Arc::new(SqliteStore::in_memory().expect("Should create db"));
        let registry = FileRegistry::new(Arc::clone(&store)).with_progress_interval(Duration::ZERO);
        let batch = registry
            .upload(vec![pdf("a.pdf", 10), pdf("b.pdf", 10)], None, None)
            .expect("Should upload");

        store
            .set(&record_key(&batch.stored[0].id), "garbage")
            .expect("Should write");

        assert!(registry.get(&batch.stored[0].id).expect("Should read").is_none());
        assert_eq!(registry.list().expect("Should list").len(), 1);

        let index = store.get(INDEX_KEY).expect("Should read").expect("Index exists");
        assert_eq!(index, format!("[\"{}\"]", batch.stored[1].id));
    }

    #[test]
    fn test_missing_entry_is_dropped_from_index() {
        let store = Arc::new(SqliteStore::in_memory().expect("Should create db"));
        let registry = FileRegistry::new(Arc::clone(&store)).with_progress_interval(Duration::ZERO);
        let old = aged_record(&registry, "old.pdf", 45);
        let stale = aged_record(&registry, "stale.pdf", 45);

        store.remove(&record_key(&old.id)).expect("Should delete");

        assert_eq!(registry.cleanup_older_than(30).expect("Should clean"), 1);
        assert!(registry.get(&stale.id).expect("Should read").is_none());

        let index = store.get(INDEX_KEY).expect("Should read").expect("Index exists");
        assert_eq!(index, "[]");
    }

    #[test]
    fn test_cleanup_with_out_of_range_age() {
        let registry = create_test_registry();
        aged_record(&registry, "old.pdf", 3650);

        assert_eq!(registry.cleanup_older_than(u32::MAX).expect("Should clean"), 0);
        assert_eq!(registry.list().expect("Should list").len(), 1);
    }

    #[test]
    fn test_concurrent_uploads_keep_every_id() {
        let store = Arc::new(SqliteStore::in_memory().expect("Should create db"));
        let registry =
            Arc::new(FileRegistry::new(Arc::clone(&store)).with_progress_interval(Duration::ZERO));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..5 {
                        registry
                            .upload(vec![pdf(&format!("{t}-{i}.pdf"), 10)], None, None)
                            .expect("Should upload");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("Thread should finish");
        }

        assert_eq!(registry.stats().expect("Should stat").total_files, 20);
    }
}
