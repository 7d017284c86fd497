//! # Media Import Primitives
//!
//! File naming, content hashing and download bookkeeping for media imports.
//!
//! ## Duplicate Detection
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  downloaded bytes ──► sha256 ──► hex                                    │
//! │                                  │                                      │
//! │        ┌─────────────────────────┼──────────────────────────┐           │
//! │        ▼                         ▼                          ▼           │
//! │  same hash already        same hash + name in        otherwise          │
//! │  assigned to entity       the target album           new file           │
//! │  → skip (EqualFile)       → assign existing          → batch save       │
//! │                             (EqualFileInAlbum)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// Quality parameter appended to downloaded image URLs.
pub const DOWNLOAD_QUALITY_QUERY: (&str, &str) = ("q", "100");

/// Default capacity of [`DownloadUrlCache`].
pub const MAX_CACHED_DOWNLOAD_URLS: usize = 1000;

// =============================================================================
// Entities
// =============================================================================

/// A stored media file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MediaFile {
    pub id: i64,
    pub folder_id: i64,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    /// Lower-case hex SHA-256 of the content.
    pub content_hash: String,
    pub created_on_utc: DateTime<Utc>,
}

/// A media folder (album).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFolder {
    pub id: i64,
    pub name: String,
}

/// A media file assigned to an entity (e.g. a product picture).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedMediaFile {
    pub entity_id: i64,
    pub media_file: MediaFile,
    pub display_order: i32,
}

/// What to do when a new file's name already exists in the album.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateFileHandling {
    ThrowError,
    Overwrite,
    #[default]
    Rename,
}

// =============================================================================
// Import Messages
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportMessageType {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportMessageReason {
    None,
    EqualFile,
    EqualFileInAlbum,
    DownloadFailed,
}

/// Progress/problem report emitted during an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportMessage {
    pub message: String,
    pub message_type: ImportMessageType,
    pub reason: ImportMessageReason,
    /// e.g. `"Entity #3"`.
    pub affected_field: Option<String>,
}

// =============================================================================
// Download Items
// =============================================================================

/// A file to import for an entity, either downloaded or read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadItem {
    /// Id of the entity the file belongs to.
    pub entity_id: i64,
    pub display_order: i32,
    /// Set for web sources (`q=100` appended).
    pub url: Option<String>,
    pub file_name: String,
    /// Local file: the source, or the download target.
    pub path: PathBuf,
    pub mime_type: String,
    /// Content is available at `path`.
    pub success: bool,
    pub error_message: Option<String>,
}

impl DownloadItem {
    /// Whether the file still needs downloading.
    pub fn is_pending_download(&self) -> bool {
        self.url.is_some() && !self.success
    }

    pub fn affected_field(&self) -> String {
        format!("Entity #{}", self.display_order)
    }
}

/// Remembers which URL was saved under which file name.
///
/// Entities often share images; a hit avoids downloading the same file
/// twice. Cleared completely once `capacity` entries are reached.
#[derive(Debug, Clone)]
pub struct DownloadUrlCache {
    entries: HashMap<String, String>,
    capacity: usize,
}

impl Default for DownloadUrlCache {
    fn default() -> Self {
        Self::with_capacity(MAX_CACHED_DOWNLOAD_URLS)
    }
}

impl DownloadUrlCache {
    pub fn with_capacity(capacity: usize) -> Self {
        DownloadUrlCache {
            entries: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        self.entries.get(url).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stores a URL unless already known.
    pub fn remember(&mut self, url: &str, file_name: &str) {
        if self.entries.contains_key(url) {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.clear();
        }
        self.entries.insert(url.to_string(), file_name.to_string());
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Lower-case hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// `http://` or `https://` URL.
pub fn is_web_url(value: &str) -> bool {
    Url::parse(value.trim())
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false)
}

/// Sets `q=100` on a web URL, replacing an existing `q`.
///
/// Returns the input unchanged when it does not parse.
pub fn with_quality_query(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url.trim()) else {
        return url.to_string();
    };

    let (key, value) = DOWNLOAD_QUALITY_QUERY;
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(key, value);

    parsed.to_string()
}

/// Last non-empty path segment of a URL, percent-decoded.
pub fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = percent_decode(segment);
    let sanitized = sanitize_file_name(&decoded);
    (!sanitized.is_empty()).then_some(sanitized)
}

// path segments keep a literal `+`, unlike form data
fn percent_decode(segment: &str) -> String {
    percent_encoding::percent_decode_str(segment)
        .decode_utf8_lossy()
        .into_owned()
}

/// Replaces characters that are invalid in file names with `-`.
pub fn sanitize_file_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect()
}

/// Splits `name.ext` into `("name", ".ext")`; the extension may be empty.
fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(i) if i > 0 => (&file_name[..i], &file_name[i..]),
        _ => (file_name, ""),
    }
}

/// Makes `file_name` unique within `lookup` by appending `-1`, `-2`, ….
///
/// ## Example
/// ```rust
/// use std::collections::HashSet;
/// use mercato_core::media::unique_file_name;
///
/// let taken: HashSet<String> = ["chair.jpg".to_string()].into();
/// assert_eq!(unique_file_name("chair.jpg", Some(&taken)), "chair-1.jpg");
/// ```
pub fn unique_file_name(file_name: &str, lookup: Option<&HashSet<String>>) -> String {
    match lookup {
        Some(lookup) => unique_file_name_by(file_name, |name| lookup.contains(name)),
        None => file_name.to_string(),
    }
}

/// Like [`unique_file_name`], with a custom "is taken" test.
pub fn unique_file_name_by(file_name: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(file_name) {
        return file_name.to_string();
    }

    let (stem, ext) = split_extension(file_name);
    (1..)
        .map(|i| format!("{stem}-{i}{ext}"))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| file_name.to_string())
}

/// MIME type by file extension.
pub fn mime_type_for(file_name: &str) -> &'static str {
    let (_, ext) = split_extension(file_name);
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" | "jfif" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "tif" | "tiff" => "image/tiff",
        "avif" => "image/avif",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
