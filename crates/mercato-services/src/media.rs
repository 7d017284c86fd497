//! # Media Importer
//!
//! Imports entity images from URLs or local paths into a media album,
//! without storing the same content twice.
//!
//! ## Import Flow (per entity)
//! ```text
//! DownloadItem ×N
//!    │
//!    ├── pending URL ──► Downloader ──► download folder
//!    │                      └── failure ──► message (DownloadFailed), skip
//!    ▼
//! content hash (SHA-256)
//!    │
//!    ├── equal to a file assigned or queued for the entity ─► EqualFile, skip
//!    ├── equal to a file in the album ───────────► assign existing file
//!    └── new ──► batch ──► duplicate names (Rename / Overwrite / ThrowError)
//!                  │
//!                  ▼
//!             insert_files (one transaction) ──► assign
//! ```
//!
//! Entities are processed one after another; a failing entity is reported
//! through the message handler and the import goes on.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mercato_core::media::{
    content_hash, file_name_from_url, is_web_url, mime_type_for, sanitize_file_name,
    unique_file_name, unique_file_name_by, with_quality_query, AssignedMediaFile, DownloadItem,
    DownloadUrlCache, DuplicateFileHandling, ImportMessage, ImportMessageReason, ImportMessageType,
    MediaFile, MediaFolder,
};
use mercato_db::NewMediaFile;

use crate::config::DataExchangeSettings;
use crate::error::{ServiceError, ServiceResult};
use crate::store::MediaStore;

// =============================================================================
// Downloader
// =============================================================================

/// Fetches remote files.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str) -> ServiceResult<Vec<u8>>;
}

/// HTTP downloader on a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> ServiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(HttpDownloader { client })
    }

    pub fn from_settings(settings: &DataExchangeSettings) -> ServiceResult<Self> {
        Self::new(Duration::from_secs(settings.download_timeout_secs))
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str) -> ServiceResult<Vec<u8>> {
        let failed = |reason: String| ServiceError::Download {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| failed(e.to_string()))?;

        let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

// =============================================================================
// Media Importer
// =============================================================================

type MessageHandler = Box<dyn Fn(&ImportMessage, Option<&DownloadItem>) + Send + Sync>;

/// A new file waiting for the batch save.
struct PendingFile {
    entity_id: i64,
    display_order: i32,
    hash: String,
    file: NewMediaFile,
}

/// Imports media for one import job.
pub struct MediaImporter {
    store: Arc<dyn MediaStore>,
    downloader: Arc<dyn Downloader>,
    url_cache: DownloadUrlCache,
    message_handler: Option<MessageHandler>,
}

impl MediaImporter {
    pub fn new(store: Arc<dyn MediaStore>, downloader: Arc<dyn Downloader>) -> Self {
        MediaImporter {
            store,
            downloader,
            url_cache: DownloadUrlCache::default(),
            message_handler: None,
        }
    }

    /// Receives progress and problem reports.
    pub fn with_message_handler(
        mut self,
        handler: impl Fn(&ImportMessage, Option<&DownloadItem>) + Send + Sync + 'static,
    ) -> Self {
        self.message_handler = Some(Box::new(handler));
        self
    }

    fn notify(
        &self,
        message: impl Into<String>,
        item: Option<&DownloadItem>,
        message_type: ImportMessageType,
        reason: ImportMessageReason,
    ) {
        let Some(handler) = &self.message_handler else {
            return;
        };
        let message = message.into();
        if message.is_empty() {
            return;
        }

        handler(
            &ImportMessage {
                message,
                message_type,
                reason,
                affected_field: item.map(DownloadItem::affected_field),
            },
            item,
        );
    }

    // =========================================================================
    // Download Items
    // =========================================================================

    /// Describes where the file for an entity comes from.
    ///
    /// ## Arguments
    /// * `image_dir` - base of relative local paths
    /// * `download_dir` - where downloads are saved
    /// * `file_name_lookup` - names already used by this import; extended
    ///
    /// Returns `None` for empty input.
    pub fn create_download_item(
        &self,
        image_dir: &Path,
        download_dir: &Path,
        entity_id: i64,
        url_or_path: &str,
        display_order: i32,
        file_name_lookup: Option<&mut HashSet<String>>,
    ) -> Option<DownloadItem> {
        let source = url_or_path.trim();
        if source.is_empty() {
            return None;
        }

        let mut item = DownloadItem {
            entity_id,
            display_order,
            url: None,
            file_name: String::new(),
            path: PathBuf::new(),
            mime_type: String::new(),
            success: false,
            error_message: None,
        };

        if is_web_url(source) {
            let url = with_quality_query(source);

            match self.url_cache.get(&url) {
                Some(cached) => {
                    item.success = true;
                    item.file_name = cached.to_string();
                }
                None => {
                    let file_name = file_name_from_url(source).unwrap_or_else(random_file_name);
                    item.file_name = match file_name_lookup {
                        Some(lookup) => {
                            let unique = unique_file_name(&file_name, Some(&*lookup));
                            lookup.insert(unique.clone());
                            unique
                        }
                        None => file_name,
                    };
                }
            }

            item.path = download_dir.join(&item.file_name);
            item.url = Some(url);
        } else {
            let local = Path::new(source);
            item.success = true;
            item.file_name = local
                .file_name()
                .map(|n| sanitize_file_name(&n.to_string_lossy()))
                .filter(|n| !n.is_empty())
                .unwrap_or_else(random_file_name);
            item.path = if local.is_absolute() {
                local.to_path_buf()
            } else {
                image_dir.join(source.trim_start_matches(['/', '\\']))
            };
        }

        item.mime_type = mime_type_for(&item.file_name).to_string();
        Some(item)
    }

    /// Downloads all pending items, recording success or the error.
    pub async fn download_files(&self, items: &mut [DownloadItem]) {
        for item in items.iter_mut().filter(|i| i.is_pending_download()) {
            let Some(url) = item.url.clone() else {
                continue;
            };

            match self.download_to(&url, &item.path).await {
                Ok(size) => {
                    debug!(url = %url, size = size, "Media downloaded");
                    item.success = true;
                    item.error_message = None;
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Media download failed");
                    item.success = false;
                    item.error_message = Some(e.to_string());
                }
            }
        }
    }

    async fn download_to(&self, url: &str, path: &Path) -> ServiceResult<usize> {
        let bytes = self.downloader.download(url).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &bytes).await?;
        Ok(bytes.len())
    }

    /// Whether the item's file is available; caches its URL if so.
    async fn download_succeeded(&mut self, item: &DownloadItem) -> bool {
        let exists = tokio::fs::try_exists(&item.path).await.unwrap_or(false);
        if item.success && exists {
            if let Some(url) = &item.url {
                let file_name = item
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| item.file_name.clone());
                self.url_cache.remember(url, &file_name);
            }
            return true;
        }

        if let Some(error) = &item.error_message {
            self.notify(error.clone(), Some(item), ImportMessageType::Error, ImportMessageReason::None);
        }
        false
    }

    /// Content of a successfully downloaded item; `None` when empty.
    async fn read_content(&mut self, item: &DownloadItem) -> ServiceResult<Option<Vec<u8>>> {
        if !self.download_succeeded(item).await {
            if let Some(url) = &item.url {
                self.notify(
                    format!("Download failed for image {url}."),
                    Some(item),
                    ImportMessageType::Info,
                    ImportMessageReason::DownloadFailed,
                );
            }
            return Ok(None);
        }

        let content = tokio::fs::read(&item.path).await?;
        Ok((!content.is_empty()).then_some(content))
    }

    // =========================================================================
    // Import
    // =========================================================================

    /// Assigned files of the entities, keyed by entity id.
    pub async fn load_existing_files(
        &self,
        entity_name: &str,
        entity_ids: impl IntoIterator<Item = i64>,
    ) -> ServiceResult<HashMap<i64, Vec<AssignedMediaFile>>> {
        let mut existing = HashMap::new();
        for entity_id in entity_ids {
            let files = self.store.assigned_files(entity_name, entity_id).await?;
            existing.insert(entity_id, files);
        }
        Ok(existing)
    }

    /// Imports several files per entity.
    ///
    /// ## Arguments
    /// * `album` - media folder name, created if missing
    /// * `entity_name` - entity type new files are assigned to
    /// * `existing_files` - files already assigned per entity; extended
    ///
    /// Returns the number of files saved to the album.
    pub async fn import_media_files_many(
        &mut self,
        items: Vec<DownloadItem>,
        album: &str,
        entity_name: &str,
        existing_files: &mut HashMap<i64, Vec<AssignedMediaFile>>,
        duplicate_handling: DuplicateFileHandling,
    ) -> ServiceResult<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let folder = self.store.get_or_create_folder(album).await?;

        let mut by_entity: BTreeMap<i64, Vec<DownloadItem>> = BTreeMap::new();
        for item in items {
            by_entity.entry(item.entity_id).or_default().push(item);
        }

        let mut new_files = Vec::new();
        for (entity_id, entity_items) in by_entity {
            let result = self
                .import_entity_files(&folder, entity_name, entity_id, entity_items, existing_files, &mut new_files)
                .await;

            if let Err(e) = result {
                warn!(entity_id = entity_id, error = %e, "Media import failed for entity");
                self.notify(e.to_string(), None, ImportMessageType::Warning, ImportMessageReason::None);
            }
        }

        let queued = new_files.len();
        let saved = self
            .save_new_files(&folder, entity_name, new_files, duplicate_handling, Some(existing_files))
            .await?;

        info!(album = %album, entity = %entity_name, queued = queued, saved = saved, "Media import finished");
        Ok(saved)
    }

    async fn import_entity_files(
        &mut self,
        folder: &MediaFolder,
        entity_name: &str,
        entity_id: i64,
        mut items: Vec<DownloadItem>,
        existing_files: &mut HashMap<i64, Vec<AssignedMediaFile>>,
        new_files: &mut Vec<PendingFile>,
    ) -> ServiceResult<()> {
        // continuous display order when the caller gave none
        let mut max_display_order = items.iter().all(|i| i.display_order == 0).then(|| {
            existing_files
                .get(&entity_id)
                .and_then(|files| files.iter().map(|f| f.display_order).max())
                .unwrap_or(0)
        });

        if items.iter().any(DownloadItem::is_pending_download) {
            self.download_files(&mut items).await;
        }

        items.sort_by_key(|i| i.display_order);

        for mut item in items {
            let Some(content) = self.read_content(&item).await? else {
                continue;
            };
            let hash = content_hash(&content);

            let assigned_equal = existing_files
                .get(&entity_id)
                .is_some_and(|files| files.iter().any(|f| f.media_file.content_hash == hash));
            let queued_equal = new_files
                .iter()
                .any(|p| p.entity_id == entity_id && p.hash == hash);
            if assigned_equal || queued_equal {
                self.notify(
                    format!("Found equal file in product data for '{}'. Skipping file.", item.file_name),
                    Some(&item),
                    ImportMessageType::Info,
                    ImportMessageReason::EqualFile,
                );
                continue;
            }

            if let Some(max) = max_display_order.as_mut() {
                *max += 1;
                item.display_order = *max;
            }

            if let Some(equal) = self.store.find_equal_in_folder(folder.id, &hash).await? {
                let assigned = self
                    .assign(entity_name, entity_id, equal, item.display_order)
                    .await?;
                existing_files.entry(entity_id).or_default().push(assigned);
                self.notify(
                    format!(
                        "Found equal file in {} album for '{}'. Assigning existing file instead.",
                        folder.name, item.file_name
                    ),
                    Some(&item),
                    ImportMessageType::Info,
                    ImportMessageReason::EqualFileInAlbum,
                );
                continue;
            }

            new_files.push(PendingFile {
                entity_id,
                display_order: item.display_order,
                hash,
                file: NewMediaFile {
                    name: item.file_name.clone(),
                    mime_type: item.mime_type.clone(),
                    content,
                },
            });
        }

        Ok(())
    }

    /// Imports at most one file per item, each for its own entity.
    ///
    /// ## Arguments
    /// * `check_assigned` - skip content already assigned to the entity
    /// * `check_existing` - reuse equal content already in the album
    ///
    /// Returns the number of files saved to the album.
    pub async fn import_media_files(
        &mut self,
        items: Vec<DownloadItem>,
        album: &str,
        entity_name: &str,
        check_assigned: bool,
        check_existing: bool,
        duplicate_handling: DuplicateFileHandling,
    ) -> ServiceResult<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let folder = self.store.get_or_create_folder(album).await?;
        let mut new_files = Vec::new();

        for item in items {
            let entity_id = item.entity_id;
            let result = self
                .import_single_file(&folder, entity_name, item, check_assigned, check_existing, &mut new_files)
                .await;

            if let Err(e) = result {
                warn!(entity_id = entity_id, error = %e, "Media import failed for entity");
                self.notify(e.to_string(), None, ImportMessageType::Warning, ImportMessageReason::None);
            }
        }

        let queued = new_files.len();
        let saved = self
            .save_new_files(&folder, entity_name, new_files, duplicate_handling, None)
            .await?;

        info!(album = %album, entity = %entity_name, queued = queued, saved = saved, "Media import finished");
        Ok(saved)
    }

    async fn import_single_file(
        &mut self,
        folder: &MediaFolder,
        entity_name: &str,
        item: DownloadItem,
        check_assigned: bool,
        check_existing: bool,
        new_files: &mut Vec<PendingFile>,
    ) -> ServiceResult<()> {
        let mut items = [item];
        if items[0].is_pending_download() {
            self.download_files(&mut items).await;
        }
        let [item] = items;

        let Some(content) = self.read_content(&item).await? else {
            return Ok(());
        };
        let hash = content_hash(&content);

        if check_assigned {
            let assigned = self.store.assigned_files(entity_name, item.entity_id).await?;
            if assigned.iter().any(|f| f.media_file.content_hash == hash) {
                self.notify(
                    format!("Found equal file for {} '{}'. Skipping file.", entity_name, item.file_name),
                    Some(&item),
                    ImportMessageType::Info,
                    ImportMessageReason::EqualFile,
                );
                return Ok(());
            }
        }

        if check_existing {
            if let Some(equal) = self.store.find_equal_in_folder(folder.id, &hash).await? {
                self.assign(entity_name, item.entity_id, equal, item.display_order)
                    .await?;
                self.notify(
                    format!(
                        "Found equal file in {} album for '{}'. Assigning existing file instead.",
                        folder.name, item.file_name
                    ),
                    Some(&item),
                    ImportMessageType::Info,
                    ImportMessageReason::EqualFileInAlbum,
                );
                return Ok(());
            }
        }

        new_files.push(PendingFile {
            entity_id: item.entity_id,
            display_order: item.display_order,
            hash,
            file: NewMediaFile {
                name: item.file_name,
                mime_type: item.mime_type,
                content,
            },
        });
        Ok(())
    }

    // =========================================================================
    // Batch Save
    // =========================================================================

    /// Saves queued files into the album and assigns them.
    ///
    /// Returns how many files were inserted or overwritten. Name clashes
    /// rejected under `ThrowError` are not counted.
    async fn save_new_files(
        &self,
        folder: &MediaFolder,
        entity_name: &str,
        new_files: Vec<PendingFile>,
        duplicate_handling: DuplicateFileHandling,
        mut existing_files: Option<&mut HashMap<i64, Vec<AssignedMediaFile>>>,
    ) -> ServiceResult<usize> {
        if new_files.is_empty() {
            return Ok(0);
        }

        let mut names = self.store.file_names_in_folder(folder.id).await?;
        let mut batch = Vec::with_capacity(new_files.len());
        let mut overwritten = 0;

        for mut pending in new_files {
            let key = pending.file.name.to_lowercase();
            if !names.contains(&key) {
                names.insert(key);
                batch.push(pending);
                continue;
            }

            match duplicate_handling {
                DuplicateFileHandling::Rename => {
                    let renamed =
                        unique_file_name_by(&pending.file.name, |n| names.contains(&n.to_lowercase()));
                    debug!(from = %pending.file.name, to = %renamed, "Duplicate media file renamed");
                    names.insert(renamed.to_lowercase());
                    pending.file.name = renamed;
                    batch.push(pending);
                }
                DuplicateFileHandling::Overwrite => {
                    if let Some(file) = self.store.replace_content(folder.id, &pending.file).await? {
                        overwritten += 1;
                        let assigned = self
                            .assign(entity_name, pending.entity_id, file, pending.display_order)
                            .await?;
                        if let Some(existing) = existing_files.as_deref_mut() {
                            existing.entry(pending.entity_id).or_default().push(assigned);
                        }
                    }
                }
                DuplicateFileHandling::ThrowError => {
                    self.notify(
                        format!(
                            "File '{}' already exists in album '{}'.",
                            pending.file.name, folder.name
                        ),
                        None,
                        ImportMessageType::Error,
                        ImportMessageReason::None,
                    );
                }
            }
        }

        if batch.is_empty() {
            return Ok(overwritten);
        }

        let (targets, files): (Vec<(i64, i32)>, Vec<NewMediaFile>) = batch
            .into_iter()
            .map(|p| ((p.entity_id, p.display_order), p.file))
            .unzip();
        let saved = self.store.insert_files(folder.id, &files).await?;
        let inserted = saved.len();

        for ((entity_id, display_order), file) in targets.into_iter().zip(saved) {
            let assigned = self.assign(entity_name, entity_id, file, display_order).await?;
            if let Some(existing) = existing_files.as_deref_mut() {
                existing.entry(entity_id).or_default().push(assigned);
            }
        }

        Ok(inserted + overwritten)
    }

    async fn assign(
        &self,
        entity_name: &str,
        entity_id: i64,
        file: MediaFile,
        display_order: i32,
    ) -> ServiceResult<AssignedMediaFile> {
        self.store
            .assign(entity_name, entity_id, file.id, display_order)
            .await?;
        Ok(AssignedMediaFile {
            entity_id,
            media_file: file,
            display_order,
        })
    }
}

fn random_file_name() -> String {
    Uuid::new_v4().simple().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use mercato_db::{Database, DbConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeDownloader {
        files: HashMap<String, Vec<u8>>,
        calls: AtomicUsize,
    }

    impl FakeDownloader {
        fn new(files: &[(&str, &[u8])]) -> Arc<Self> {
            Arc::new(FakeDownloader {
                files: files
                    .iter()
                    .map(|(url, bytes)| (with_quality_query(url), bytes.to_vec()))
                    .collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Downloader for FakeDownloader {
        async fn download(&self, url: &str) -> ServiceResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.files.get(url).cloned().ok_or_else(|| ServiceError::Download {
                url: url.to_string(),
                reason: "404 Not Found".into(),
            })
        }
    }

    struct Setup {
        db: Database,
        dir: PathBuf,
        messages: Arc<Mutex<Vec<ImportMessage>>>,
        importer: MediaImporter,
    }

    impl Drop for Setup {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    async fn setup(downloader: Arc<FakeDownloader>) -> Setup {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let dir = std::env::temp_dir().join(format!("mercato-media-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&messages);
        let importer = MediaImporter::new(Arc::new(db.clone()), downloader)
            .with_message_handler(move |m, _| sink.lock().unwrap().push(m.clone()));

        Setup {
            db,
            dir,
            messages,
            importer,
        }
    }

    fn reasons(messages: &Mutex<Vec<ImportMessage>>) -> Vec<ImportMessageReason> {
        messages.lock().unwrap().iter().map(|m| m.reason).collect()
    }

    #[tokio::test]
    async fn test_create_download_item() {
        let s = setup(FakeDownloader::new(&[])).await;
        let images = Path::new("/data/images");
        let downloads = Path::new("/data/downloads");
        let mut lookup: HashSet<String> = ["chair.jpg".to_string()].into();

        assert!(s
            .importer
            .create_download_item(images, downloads, 1, "  ", 0, None)
            .is_none());

        let web = s
            .importer
            .create_download_item(images, downloads, 1, "https://cdn.example.com/img/chair.jpg", 0, Some(&mut lookup))
            .unwrap();
        assert_eq!(web.url.as_deref(), Some("https://cdn.example.com/img/chair.jpg?q=100"));
        assert_eq!(web.file_name, "chair-1.jpg");
        assert_eq!(web.path, downloads.join("chair-1.jpg"));
        assert_eq!(web.mime_type, "image/jpeg");
        assert!(web.is_pending_download());
        assert!(lookup.contains("chair-1.jpg"));

        let local = s
            .importer
            .create_download_item(images, downloads, 2, "sub/table.png", 3, None)
            .unwrap();
        assert!(local.success);
        assert_eq!(local.file_name, "table.png");
        assert_eq!(local.path, images.join("sub/table.png"));
        assert_eq!(local.display_order, 3);
    }

    #[tokio::test]
    async fn test_downloaded_url_is_reused() {
        let downloader = FakeDownloader::new(&[("https://cdn.example.com/a.png", b"aaa")]);
        let mut s = setup(downloader.clone()).await;
        let downloads = s.dir.join("downloads");

        let item = s
            .importer
            .create_download_item(&s.dir, &downloads, 1, "https://cdn.example.com/a.png", 0, None)
            .unwrap();
        let count = s
            .importer
            .import_media_files_many(vec![item], "catalog", "Product", &mut HashMap::new(), DuplicateFileHandling::Rename)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let again = s
            .importer
            .create_download_item(&s.dir, &downloads, 2, "https://cdn.example.com/a.png", 0, None)
            .unwrap();
        assert!(again.success);
        assert_eq!(again.file_name, "a.png");
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_import_many_skips_equal_content() {
        let downloader = FakeDownloader::new(&[
            ("https://cdn.example.com/red.jpg", b"red"),
            ("https://cdn.example.com/red-copy.jpg", b"red"),
            ("https://cdn.example.com/blue.jpg", b"blue"),
        ]);
        let mut s = setup(downloader).await;
        let downloads = s.dir.join("downloads");
        let mut lookup = HashSet::new();

        let mut items = Vec::new();
        for (entity, url) in [
            (1, "https://cdn.example.com/red.jpg"),
            (1, "https://cdn.example.com/red-copy.jpg"),
            (2, "https://cdn.example.com/blue.jpg"),
        ] {
            items.push(
                s.importer
                    .create_download_item(&s.dir, &downloads, entity, url, 0, Some(&mut lookup))
                    .unwrap(),
            );
        }

        let mut existing = HashMap::new();
        let count = s
            .importer
            .import_media_files_many(items, "catalog", "Product", &mut existing, DuplicateFileHandling::Rename)
            .await
            .unwrap();

        // red-copy has the content of red
        assert_eq!(count, 2);
        let first = s.db.media().assigned_files("Product", 1).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].display_order, 1);
        assert_eq!(existing[&2].len(), 1);
        assert_eq!(reasons(&s.messages), vec![ImportMessageReason::EqualFile]);

        // second run: everything is already assigned
        let again = vec![s
            .importer
            .create_download_item(&s.dir, &downloads, 2, "https://cdn.example.com/blue.jpg", 0, None)
            .unwrap()];
        let count = s
            .importer
            .import_media_files_many(again, "catalog", "Product", &mut existing, DuplicateFileHandling::Rename)
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(
            reasons(&s.messages),
            vec![ImportMessageReason::EqualFile, ImportMessageReason::EqualFile]
        );
    }

    #[tokio::test]
    async fn test_equal_file_in_album_is_reused() {
        let downloader = FakeDownloader::new(&[("https://cdn.example.com/logo.png", b"logo")]);
        let mut s = setup(downloader).await;
        let downloads = s.dir.join("downloads");

        let item = s
            .importer
            .create_download_item(&s.dir, &downloads, 1, "https://cdn.example.com/logo.png", 0, None)
            .unwrap();
        s.importer
            .import_media_files_many(vec![item.clone()], "catalog", "Product", &mut HashMap::new(), DuplicateFileHandling::Rename)
            .await
            .unwrap();

        let other = DownloadItem { entity_id: 7, ..item };
        let mut existing = s.importer.load_existing_files("Product", [7]).await.unwrap();
        let count = s
            .importer
            .import_media_files_many(vec![other], "catalog", "Product", &mut existing, DuplicateFileHandling::Rename)
            .await
            .unwrap();

        assert_eq!(count, 0);
        assert_eq!(reasons(&s.messages), vec![ImportMessageReason::EqualFileInAlbum]);
        let first = s.db.media().assigned_files("Product", 1).await.unwrap();
        let seventh = s.db.media().assigned_files("Product", 7).await.unwrap();
        assert_eq!(first[0].media_file.id, seventh[0].media_file.id);
    }

    #[tokio::test]
    async fn test_failed_download_is_reported() {
        let mut s = setup(FakeDownloader::new(&[])).await;
        let downloads = s.dir.join("downloads");

        let item = s
            .importer
            .create_download_item(&s.dir, &downloads, 1, "https://cdn.example.com/missing.jpg", 0, None)
            .unwrap();
        let count = s
            .importer
            .import_media_files_many(vec![item], "catalog", "Product", &mut HashMap::new(), DuplicateFileHandling::Rename)
            .await
            .unwrap();

        assert_eq!(count, 0);
        let messages = s.messages.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message_type, ImportMessageType::Error);
        assert_eq!(messages[1].reason, ImportMessageReason::DownloadFailed);
        assert_eq!(messages[1].affected_field.as_deref(), Some("Entity #0"));
    }

    #[tokio::test]
    async fn test_duplicate_names_in_album() {
        let mut s = setup(FakeDownloader::new(&[])).await;
        tokio::fs::write(s.dir.join("chair.jpg"), b"old").await.unwrap();

        let local = |entity: i64| DownloadItem {
            entity_id: entity,
            display_order: 0,
            url: None,
            file_name: "chair.jpg".into(),
            path: s.dir.join("chair.jpg"),
            mime_type: "image/jpeg".into(),
            success: true,
            error_message: None,
        };

        let count = s
            .importer
            .import_media_files(vec![local(1)], "catalog", "Product", true, true, DuplicateFileHandling::Rename)
            .await
            .unwrap();
        assert_eq!(count, 1);

        tokio::fs::write(s.dir.join("chair.jpg"), b"new").await.unwrap();
        s.importer
            .import_media_files(vec![local(2)], "catalog", "Product", true, true, DuplicateFileHandling::Rename)
            .await
            .unwrap();
        let renamed = s.db.media().assigned_files("Product", 2).await.unwrap();
        assert_eq!(renamed[0].media_file.name, "chair-1.jpg");

        tokio::fs::write(s.dir.join("chair.jpg"), b"newer").await.unwrap();
        let count = s
            .importer
            .import_media_files(vec![local(3)], "catalog", "Product", true, true, DuplicateFileHandling::ThrowError)
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(s.db.media().assigned_files("Product", 3).await.unwrap().is_empty());
        assert_eq!(s.messages.lock().unwrap().last().unwrap().message_type, ImportMessageType::Error);

        let count = s
            .importer
            .import_media_files(vec![local(3)], "catalog", "Product", true, true, DuplicateFileHandling::Overwrite)
            .await
            .unwrap();
        assert_eq!(count, 1);
        let overwritten = s.db.media().assigned_files("Product", 3).await.unwrap();
        assert_eq!(overwritten[0].media_file.name, "chair.jpg");
        assert_eq!(overwritten[0].media_file.content_hash, content_hash(b"newer"));
    }

    #[tokio::test]
    async fn test_many_import_counts_only_saved_files() {
        let mut s = setup(FakeDownloader::new(&[])).await;
        tokio::fs::write(s.dir.join("lamp.jpg"), b"first").await.unwrap();
        let item = |entity: i64| DownloadItem {
            entity_id: entity,
            display_order: 0,
            url: None,
            file_name: "lamp.jpg".into(),
            path: s.dir.join("lamp.jpg"),
            mime_type: "image/jpeg".into(),
            success: true,
            error_message: None,
        };

        let count = s
            .importer
            .import_media_files_many(vec![item(1)], "catalog", "Product", &mut HashMap::new(), DuplicateFileHandling::ThrowError)
            .await
            .unwrap();
        assert_eq!(count, 1);

        tokio::fs::write(s.dir.join("lamp.jpg"), b"second").await.unwrap();
        let mut existing = HashMap::new();
        let count = s
            .importer
            .import_media_files_many(vec![item(2)], "catalog", "Product", &mut existing, DuplicateFileHandling::ThrowError)
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(existing.is_empty());
        assert_eq!(s.messages.lock().unwrap().last().unwrap().message_type, ImportMessageType::Error);
    }

    #[tokio::test]
    async fn test_setup_dir_is_removed_on_drop() {
        let s = setup(FakeDownloader::new(&[])).await;
        let dir = s.dir.clone();
        tokio::fs::write(dir.join("tmp.png"), b"x").await.unwrap();
        assert!(dir.exists());

        drop(s);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_single_import_skips_assigned_content() {
        let mut s = setup(FakeDownloader::new(&[])).await;
        tokio::fs::write(s.dir.join("desk.png"), b"desk").await.unwrap();
        let item = s
            .importer
            .create_download_item(&s.dir, &s.dir, 5, "desk.png", 0, None)
            .unwrap();

        s.importer
            .import_media_files(vec![item.clone()], "catalog", "Product", true, true, DuplicateFileHandling::Rename)
            .await
            .unwrap();
        let count = s
            .importer
            .import_media_files(vec![item], "catalog", "Product", true, true, DuplicateFileHandling::Rename)
            .await
            .unwrap();

        assert_eq!(count, 0);
        assert_eq!(reasons(&s.messages), vec![ImportMessageReason::EqualFile]);
    }
}
