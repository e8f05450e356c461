//! Label-partitioned training image collection.

use crate::blob::{BlobStore, DirBlobStore};
use crate::disease::Category;
use crate::error::{DatasetError, PersistenceError};
use crate::notify::{Notifier, Severity, TracingNotifier};
use crate::storage::{FileStore, KeyValueStore};
use crate::{ScanOptions, scan_folder_with};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetImage {
    pub id: String,
    pub filename: String,
    /// `blob:` URL of the stored bytes.
    pub url: String,
    pub category: Category,
    #[serde(rename = "dateAdded")]
    pub date_added: DateTime<Utc>,
}

/// All records, one ordered partition per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSnapshot {
    pub early_blight: Vec<DatasetImage>,
    pub late_blight: Vec<DatasetImage>,
    pub healthy: Vec<DatasetImage>,
}

impl DatasetSnapshot {
    pub fn partition(&self, category: Category) -> &[DatasetImage] {
        match category {
            Category::EarlyBlight => &self.early_blight,
            Category::LateBlight => &self.late_blight,
            Category::Healthy => &self.healthy,
        }
    }

    fn partition_mut(&mut self, category: Category) -> &mut Vec<DatasetImage> {
        match category {
            Category::EarlyBlight => &mut self.early_blight,
            Category::LateBlight => &mut self.late_blight,
            Category::Healthy => &mut self.healthy,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &DatasetImage)> {
        Category::ALL
            .into_iter()
            .flat_map(move |c| self.partition(c).iter().map(move |img| (c, img)))
    }

    pub fn stats(&self) -> DatasetStats {
        let early_blight = self.early_blight.len();
        let late_blight = self.late_blight.len();
        let healthy = self.healthy.len();
        DatasetStats {
            early_blight,
            late_blight,
            healthy,
            total: early_blight + late_blight + healthy,
        }
    }

    fn contains_id(&self, id: &str) -> bool {
        self.iter().any(|(_, img)| img.id == id)
    }

    /// Make every record's category agree with the partition holding it.
    fn retag(&mut self) -> usize {
        let mut fixed = 0;
        for c in Category::ALL {
            for img in self.partition_mut(c) {
                if img.category != c {
                    img.category = c;
                    fixed += 1;
                }
            }
        }
        fixed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DatasetStats {
    pub early_blight: usize,
    pub late_blight: usize,
    pub healthy: usize,
    pub total: usize,
}

impl DatasetStats {
    pub fn count(&self, category: Category) -> usize {
        match category {
            Category::EarlyBlight => self.early_blight,
            Category::LateBlight => self.late_blight,
            Category::Healthy => self.healthy,
        }
    }

    /// Fraction of all images in `category`; 0 for an empty dataset.
    pub fn share(&self, category: Category) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.count(category) as f32 / self.total as f32
        }
    }
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub added: Vec<DatasetImage>,
    pub skipped: Vec<(PathBuf, String)>,
}

/// In-memory dataset mirrored to a key/value slot.
///
/// Every mutation rewrites the whole snapshot. Storage failures are logged
/// and reported, never returned; memory stays authoritative.
pub struct DatasetStore {
    kv: Box<dyn KeyValueStore>,
    blobs: Box<dyn BlobStore>,
    key: String,
    data: DatasetSnapshot,
    notifier: Arc<dyn Notifier>,
}

impl DatasetStore {
    pub fn open(
        kv: impl KeyValueStore + 'static,
        blobs: impl BlobStore + 'static,
        key: impl Into<String>,
    ) -> Self {
        Self::open_with_notifier(kv, blobs, key, Arc::new(TracingNotifier))
    }

    /// Open and load, reporting a failed load through `notifier`.
    ///
    /// A snapshot that cannot be parsed is set aside before anything can
    /// overwrite it.
    pub fn open_with_notifier(
        kv: impl KeyValueStore + 'static,
        blobs: impl BlobStore + 'static,
        key: impl Into<String>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let mut store = Self {
            kv: Box::new(kv),
            blobs: Box::new(blobs),
            key: key.into(),
            data: DatasetSnapshot::default(),
            notifier,
        };
        match store.load() {
            Ok(Some(data)) => store.data = data,
            Ok(None) => tracing::debug!(key = %store.key, "no stored dataset, starting empty"),
            Err(err) => {
                tracing::warn!("could not load dataset: {err}");
                if matches!(err, PersistenceError::Malformed(_)) {
                    match store.kv.set_aside(&store.key) {
                        Ok(()) => tracing::info!(key = %store.key, "kept unreadable dataset aside"),
                        Err(err) => tracing::warn!("could not keep unreadable dataset: {err}"),
                    }
                }
                store.notifier.notify(
                    Severity::Error,
                    "Stored dataset could not be loaded, starting empty",
                );
            }
        }
        store
    }

    /// File-backed store: snapshot in `dir/<key>.json`, bytes in `dir/images`.
    pub fn open_dir(dir: impl AsRef<Path>, key: impl Into<String>) -> Self {
        Self::open_dir_with_notifier(dir, key, Arc::new(TracingNotifier))
    }

    pub fn open_dir_with_notifier(
        dir: impl AsRef<Path>,
        key: impl Into<String>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let dir = dir.as_ref();
        Self::open_with_notifier(
            FileStore::new(dir),
            DirBlobStore::new(dir.join("images")),
            key,
            notifier,
        )
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    fn load(&self) -> Result<Option<DatasetSnapshot>, PersistenceError> {
        let Some(raw) = self.kv.read(&self.key)? else {
            return Ok(None);
        };
        let mut data: DatasetSnapshot = serde_json::from_str(&raw)?;
        let fixed = data.retag();
        if fixed > 0 {
            tracing::warn!(fixed, "re-tagged records filed under the wrong category");
        }
        Ok(Some(data))
    }

    fn persist(&self) {
        let result = serde_json::to_string(&self.data)
            .map_err(PersistenceError::from)
            .and_then(|json| self.kv.write(&self.key, &json));
        if let Err(err) = result {
            tracing::warn!("could not save dataset: {err}");
            self.notifier.notify(
                Severity::Error,
                "Could not save the dataset, changes are kept for this session",
            );
        }
    }

    fn fresh_id(&self) -> String {
        loop {
            let random = uuid::Uuid::new_v4().simple().to_string();
            let id = format!("img_{}_{}", Utc::now().timestamp_millis(), &random[..9]);
            if !self.data.contains_id(&id) {
                return id;
            }
        }
    }

    /// Store an image under `category` and return its new record.
    pub fn add(
        &mut self,
        bytes: &[u8],
        filename: &str,
        category: Category,
    ) -> Result<DatasetImage, DatasetError> {
        if bytes.is_empty() || image::guess_format(bytes).is_err() {
            return Err(DatasetError::InvalidImage {
                filename: filename.to_string(),
            });
        }
        let url = self.blobs.put(bytes, filename)?;
        let record = DatasetImage {
            id: self.fresh_id(),
            filename: filename.to_string(),
            url,
            category,
            date_added: Utc::now(),
        };
        self.data.partition_mut(category).push(record.clone());
        self.persist();
        tracing::info!(id = %record.id, %category, "added dataset image");
        Ok(record)
    }

    pub fn list(&self) -> &DatasetSnapshot {
        &self.data
    }

    pub fn images(&self, category: Category) -> &[DatasetImage] {
        self.data.partition(category)
    }

    pub fn remove(&mut self, id: &str, category: Category) -> Result<DatasetImage, DatasetError> {
        let partition = self.data.partition_mut(category);
        let Some(idx) = partition.iter().position(|img| img.id == id) else {
            return Err(DatasetError::NotFound {
                id: id.to_string(),
                category,
            });
        };
        let removed = partition.remove(idx);
        if let Err(err) = self.blobs.release(&removed.url) {
            tracing::warn!(url = %removed.url, "could not release image bytes: {err}");
            self.notifier.notify(
                Severity::Error,
                &format!("Removed {} but its image file could not be deleted", removed.filename),
            );
        }
        self.persist();
        tracing::info!(id = %removed.id, %category, "removed dataset image");
        Ok(removed)
    }

    pub fn stats(&self) -> DatasetStats {
        self.data.stats()
    }

    pub fn image_bytes(&self, image: &DatasetImage) -> io::Result<Vec<u8>> {
        self.blobs.get(&image.url)
    }

    /// Add every supported image in `dir` to `category`. Unreadable or
    /// invalid files are skipped and reported in the summary.
    pub fn import_folder(
        &mut self,
        dir: impl AsRef<Path>,
        category: Category,
        opts: ScanOptions,
    ) -> Result<ImportSummary, DatasetError> {
        let files = scan_folder_with(dir, opts).map_err(|e| DatasetError::Import(format!("{e:#}")))?;
        let mut summary = ImportSummary::default();
        for path in files {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let outcome = fs::read(&path)
                .map_err(|source| DatasetError::Read {
                    path: path.clone(),
                    source,
                })
                .and_then(|bytes| self.add(&bytes, &filename, category));
            match outcome {
                Ok(record) => summary.added.push(record),
                Err(err) => {
                    tracing::warn!("skipping {}: {err}", path.display());
                    summary.skipped.push((path, err.to_string()));
                }
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::leaf::test_support::solid_png;
    use crate::notify::test_support::RecordingNotifier;
    use crate::storage::MemoryStore;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;
    use tempfile::tempdir;

    const KEY: &str = "potato-disease-dataset";

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn read(&self, key: &str) -> Result<Option<String>, PersistenceError> {
            Err(PersistenceError::Read {
                key: key.to_string(),
                source: io::Error::other("disk on fire"),
            })
        }

        fn write(&self, key: &str, _value: &str) -> Result<(), PersistenceError> {
            Err(PersistenceError::Write {
                key: key.to_string(),
                source: io::Error::other("disk on fire"),
            })
        }
    }

    fn memory_store() -> (DatasetStore, Arc<MemoryStore>, Arc<MemoryBlobStore>) {
        let kv = Arc::new(MemoryStore::default());
        let blobs = Arc::new(MemoryBlobStore::default());
        (DatasetStore::open(kv.clone(), blobs.clone(), KEY), kv, blobs)
    }

    fn leaf() -> Vec<u8> {
        solid_png(2, 2, [0, 255, 0])
    }

    #[test]
    fn add_then_list_then_remove() {
        let (mut store, kv, blobs) = memory_store();
        let img = store.add(&leaf(), "a.png", Category::LateBlight).unwrap();
        assert!(img.id.starts_with("img_"));
        assert_eq!(store.images(Category::LateBlight), &[img.clone()]);
        assert!(store.images(Category::Healthy).is_empty());
        assert_eq!(blobs.len(), 1);
        assert!(kv.read(KEY).unwrap().unwrap().contains(&img.id));

        let removed = store.remove(&img.id, Category::LateBlight).unwrap();
        assert_eq!(removed, img);
        assert!(store.images(Category::LateBlight).is_empty());
        assert!(blobs.is_empty());
        assert!(!kv.read(KEY).unwrap().unwrap().contains(&img.id));
    }

    #[test]
    fn remove_unknown_or_wrong_partition_is_not_found() {
        let (mut store, _, _) = memory_store();
        let img = store.add(&leaf(), "a.png", Category::Healthy).unwrap();
        let before = store.list().clone();

        let err = store.remove("img_nope", Category::Healthy).unwrap_err();
        assert!(matches!(err, DatasetError::NotFound { .. }));
        let err = store.remove(&img.id, Category::EarlyBlight).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::NotFound { category: Category::EarlyBlight, .. }
        ));
        assert_eq!(store.list(), &before);
    }

    #[test]
    fn rejects_non_images() {
        let (mut store, _, blobs) = memory_store();
        assert!(matches!(
            store.add(b"", "empty.png", Category::Healthy),
            Err(DatasetError::InvalidImage { .. })
        ));
        assert!(matches!(
            store.add(b"hello world", "notes.txt", Category::Healthy),
            Err(DatasetError::InvalidImage { .. })
        ));
        assert!(blobs.is_empty());
        assert_eq!(store.stats().total, 0);
    }

    #[test]
    fn ids_are_unique_within_a_burst() {
        let (mut store, _, _) = memory_store();
        let bytes = leaf();
        let ids: HashSet<String> = (0..500)
            .map(|i| store.add(&bytes, "x.png", Category::ALL[i % 3]).unwrap().id)
            .collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn stats_total_matches_partitions_under_random_edits() {
        let (mut store, _, _) = memory_store();
        let bytes = leaf();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..300 {
            let category = Category::ALL[rng.random_range(0..3)];
            if rng.random_bool(0.6) || store.images(category).is_empty() {
                store.add(&bytes, "x.png", category).unwrap();
            } else {
                let idx = rng.random_range(0..store.images(category).len());
                let id = store.images(category)[idx].id.clone();
                store.remove(&id, category).unwrap();
            }
            let s = store.stats();
            assert_eq!(s.total, s.early_blight + s.late_blight + s.healthy);
            for c in Category::ALL {
                assert_eq!(s.count(c), store.images(c).len());
            }
        }
    }

    #[test]
    fn stats_shares() {
        let (mut store, _, _) = memory_store();
        assert_eq!(store.stats().share(Category::Healthy), 0.0);
        store.add(&leaf(), "a.png", Category::Healthy).unwrap();
        store.add(&leaf(), "b.png", Category::EarlyBlight).unwrap();
        let s = store.stats();
        assert_eq!(s.share(Category::Healthy), 0.5);
        assert_eq!(s.share(Category::LateBlight), 0.0);
    }

    #[test]
    fn broken_storage_never_fails_mutations() {
        let notes = Arc::new(RecordingNotifier::default());
        let mut store = DatasetStore::open(BrokenStore, MemoryBlobStore::default(), KEY)
            .with_notifier(notes.clone());
        let img = store.add(&leaf(), "a.png", Category::EarlyBlight).unwrap();
        assert_eq!(store.stats().early_blight, 1);
        store.remove(&img.id, Category::EarlyBlight).unwrap();
        assert_eq!(store.stats().total, 0);
        assert_eq!(notes.severities(), vec![Severity::Error, Severity::Error]);
    }

    #[test]
    fn malformed_snapshot_starts_empty() {
        let kv = MemoryStore::default();
        kv.write(KEY, "{not json").unwrap();
        let store = DatasetStore::open(kv, MemoryBlobStore::default(), KEY);
        assert_eq!(store.stats().total, 0);
    }

    #[test]
    fn malformed_snapshot_is_reported_and_set_aside() {
        let kv = Arc::new(MemoryStore::default());
        kv.write(KEY, "{not json").unwrap();
        let notes = Arc::new(RecordingNotifier::default());
        let mut store = DatasetStore::open_with_notifier(
            kv.clone(),
            MemoryBlobStore::default(),
            KEY,
            notes.clone(),
        );
        assert_eq!(notes.severities(), vec![Severity::Error]);
        assert_eq!(
            notes.messages(),
            vec!["Stored dataset could not be loaded, starting empty"]
        );

        store.add(&leaf(), "a.png", Category::Healthy).unwrap();
        let bad_key = format!("{KEY}.bad");
        assert_eq!(kv.read(&bad_key).unwrap().as_deref(), Some("{not json"));
        assert!(kv.read(KEY).unwrap().unwrap().contains("a.png"));
    }

    #[test]
    fn unreadable_storage_is_reported_on_open() {
        let notes = Arc::new(RecordingNotifier::default());
        let store = DatasetStore::open_with_notifier(
            BrokenStore,
            MemoryBlobStore::default(),
            KEY,
            notes.clone(),
        );
        assert_eq!(store.stats().total, 0);
        assert_eq!(notes.severities(), vec![Severity::Error]);
    }

    #[test]
    fn missing_snapshot_is_silent() {
        let notes = Arc::new(RecordingNotifier::default());
        let _store = DatasetStore::open_with_notifier(
            MemoryStore::default(),
            MemoryBlobStore::default(),
            KEY,
            notes.clone(),
        );
        assert!(notes.severities().is_empty());
    }

    #[test]
    fn file_backed_malformed_snapshot_survives_next_write() -> anyhow::Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join(format!("{KEY}.json")), "[1, 2")?;
        let notes = Arc::new(RecordingNotifier::default());
        let mut store = DatasetStore::open_dir_with_notifier(dir.path(), KEY, notes.clone());
        store.add(&leaf(), "a.png", Category::EarlyBlight)?;

        let kept = fs::read_to_string(dir.path().join(format!("{KEY}.json.bad")))?;
        assert_eq!(kept, "[1, 2");
        assert_eq!(notes.severities(), vec![Severity::Error]);
        assert_eq!(DatasetStore::open_dir(dir.path(), KEY).stats().early_blight, 1);
        Ok(())
    }

    #[test]
    fn odd_filenames_do_not_leak_bytes_on_remove() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let notes = Arc::new(RecordingNotifier::default());
        let mut store = DatasetStore::open_dir_with_notifier(dir.path(), KEY, notes.clone());
        let img = store.add(&leaf(), "leaf.p\\ng", Category::Healthy)?;
        assert!(img.url.ends_with(".png"));
        assert_eq!(img.filename, "leaf.p\\ng");

        store.remove(&img.id, Category::Healthy)?;
        let left = fs::read_dir(dir.path().join("images"))?.count();
        assert_eq!(left, 0);
        assert!(notes.severities().is_empty());
        Ok(())
    }

    #[test]
    fn failed_release_is_reported() {
        let notes = Arc::new(RecordingNotifier::default());
        let blobs = Arc::new(MemoryBlobStore::default());
        let mut store = DatasetStore::open_with_notifier(
            MemoryStore::default(),
            blobs.clone(),
            KEY,
            notes.clone(),
        );
        let img = store.add(&leaf(), "a.png", Category::LateBlight).unwrap();
        blobs.release(&img.url).unwrap();

        let removed = store.remove(&img.id, Category::LateBlight).unwrap();
        assert_eq!(removed.id, img.id);
        assert!(store.images(Category::LateBlight).is_empty());
        assert_eq!(notes.severities(), vec![Severity::Error]);
        assert!(notes.messages()[0].contains("a.png"));
    }

    #[test]
    fn misfiled_records_are_retagged_on_load() {
        let kv = MemoryStore::default();
        kv.write(
            KEY,
            r#"{"healthy":[{"id":"img_1_abc","filename":"a.png","url":"blob:a.png",
                "category":"late_blight","dateAdded":"2024-05-01T10:00:00Z"}]}"#,
        )
        .unwrap();
        let store = DatasetStore::open(kv, MemoryBlobStore::default(), KEY);
        let healthy = store.images(Category::Healthy);
        assert_eq!(healthy.len(), 1);
        assert_eq!(healthy[0].category, Category::Healthy);
        assert!(store.images(Category::LateBlight).is_empty());
    }

    #[test]
    fn file_backed_store_reloads() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let mut store = DatasetStore::open_dir(dir.path(), KEY);
        let a = store.add(&leaf(), "a.png", Category::EarlyBlight)?;
        let b = store.add(&leaf(), "b.png", Category::EarlyBlight)?;
        store.add(&leaf(), "c.png", Category::Healthy)?;
        store.remove(&a.id, Category::EarlyBlight)?;
        let snapshot = store.list().clone();
        drop(store);

        let reopened = DatasetStore::open_dir(dir.path(), KEY);
        assert_eq!(reopened.list(), &snapshot);
        assert_eq!(reopened.image_bytes(&b)?, leaf());
        assert!(dir.path().join(format!("{KEY}.json")).exists());
        Ok(())
    }
}
