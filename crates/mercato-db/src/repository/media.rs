//! # Media Repository
//!
//! Folders (albums), files, their stored bytes and entity assignments.
//!
//! ## Storage Layout
//! ```text
//! media_folders ◄── media_files ──► media_storage (BLOB)
//!                       ▲
//!                       │
//!             media_file_assignments (entity_name, entity_id, display_order)
//! ```
//!
//! A new file and its blob are written together; `insert_files` saves a whole
//! import batch in one transaction.

use std::collections::HashSet;

use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use mercato_core::media::{content_hash, AssignedMediaFile, MediaFile, MediaFolder};

const FILE_COLUMNS: &str =
    "f.id, f.folder_id, f.name, f.mime_type, f.size, f.content_hash, f.created_on_utc";

/// A file about to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMediaFile {
    pub name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, FromRow)]
struct AssignedRow {
    entity_id: i64,
    display_order: i32,
    #[sqlx(flatten)]
    file: MediaFile,
}

/// Repository for media operations.
#[derive(Debug, Clone)]
pub struct MediaRepository {
    pool: SqlitePool,
}

impl MediaRepository {
    /// Creates a new MediaRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MediaRepository { pool }
    }

    // =========================================================================
    // Folders
    // =========================================================================

    /// Returns the folder with this name, creating it on first use.
    pub async fn get_or_create_folder(&self, name: &str) -> DbResult<MediaFolder> {
        sqlx::query("INSERT OR IGNORE INTO media_folders (name) VALUES (?1)")
            .bind(name)
            .execute(&self.pool)
            .await?;

        let (id, name): (i64, String) =
            sqlx::query_as("SELECT id, name FROM media_folders WHERE name = ?1 COLLATE NOCASE")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;

        Ok(MediaFolder { id, name })
    }

    // =========================================================================
    // Files
    // =========================================================================

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<MediaFile>> {
        let file = sqlx::query_as::<_, MediaFile>(&format!(
            "SELECT {FILE_COLUMNS} FROM media_files f WHERE f.id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }

    /// A file in the folder with the same content hash, if any.
    pub async fn find_equal_in_folder(
        &self,
        folder_id: i64,
        hash: &str,
    ) -> DbResult<Option<MediaFile>> {
        let file = sqlx::query_as::<_, MediaFile>(&format!(
            "SELECT {FILE_COLUMNS} FROM media_files f \
             WHERE f.folder_id = ?1 AND f.content_hash = ?2 ORDER BY f.id LIMIT 1"
        ))
        .bind(folder_id)
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }

    /// All file names in a folder, lower-cased.
    pub async fn file_names_in_folder(&self, folder_id: i64) -> DbResult<HashSet<String>> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT lower(name) FROM media_files WHERE folder_id = ?1")
                .bind(folder_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(names.into_iter().collect())
    }

    /// Stores files and their content in one transaction.
    ///
    /// ## Errors
    /// `UniqueViolation` when a name already exists in the folder; nothing
    /// of the batch is kept in that case.
    pub async fn insert_files(
        &self,
        folder_id: i64,
        files: &[NewMediaFile],
    ) -> DbResult<Vec<MediaFile>> {
        let mut tx = self.pool.begin().await?;
        let mut saved = Vec::with_capacity(files.len());

        for file in files {
            let storage_id = sqlx::query("INSERT INTO media_storage (data) VALUES (?1)")
                .bind(&file.content)
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();

            let hash = content_hash(&file.content);
            let size = i64::try_from(file.content.len())
                .map_err(|e| DbError::decode("media_files.size", e))?;
            let created_on_utc = Utc::now();

            let id = sqlx::query(
                r#"
                INSERT INTO media_files
                    (folder_id, name, mime_type, size, content_hash, media_storage_id, created_on_utc)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(folder_id)
            .bind(&file.name)
            .bind(&file.mime_type)
            .bind(size)
            .bind(&hash)
            .bind(storage_id)
            .bind(created_on_utc)
            .execute(&mut *tx)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::UniqueViolation { field, .. } => DbError::duplicate(field, file.name.clone()),
                other => other,
            })?
            .last_insert_rowid();

            saved.push(MediaFile {
                id,
                folder_id,
                name: file.name.clone(),
                mime_type: file.mime_type.clone(),
                size,
                content_hash: hash,
                created_on_utc,
            });
        }

        tx.commit().await?;

        info!(folder_id = folder_id, count = saved.len(), "Media files stored");

        Ok(saved)
    }

    /// Replaces the content of the file with the same name in the folder.
    ///
    /// Returns `None` when no such file exists.
    pub async fn replace_content(
        &self,
        folder_id: i64,
        file: &NewMediaFile,
    ) -> DbResult<Option<MediaFile>> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64, i64)> = sqlx::query_as(
            "SELECT id, media_storage_id FROM media_files \
             WHERE folder_id = ?1 AND name = ?2 COLLATE NOCASE",
        )
        .bind(folder_id)
        .bind(&file.name)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((id, storage_id)) = existing else {
            return Ok(None);
        };

        let hash = content_hash(&file.content);
        let size = i64::try_from(file.content.len())
            .map_err(|e| DbError::decode("media_files.size", e))?;

        sqlx::query("UPDATE media_storage SET data = ?1 WHERE id = ?2")
            .bind(&file.content)
            .bind(storage_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE media_files SET mime_type = ?1, size = ?2, content_hash = ?3 WHERE id = ?4",
        )
        .bind(&file.mime_type)
        .bind(size)
        .bind(&hash)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query_as::<_, MediaFile>(&format!(
            "SELECT {FILE_COLUMNS} FROM media_files f WHERE f.id = ?1"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(file_id = id, name = %file.name, "Media file content replaced");

        Ok(Some(updated))
    }

    /// Content of a media file.
    pub async fn load_file_content(&self, file_id: i64) -> DbResult<Option<Vec<u8>>> {
        let data: Option<Vec<u8>> = sqlx::query_scalar(
            r#"
            SELECT s.data FROM media_files f
            JOIN media_storage s ON s.id = f.media_storage_id
            WHERE f.id = ?1
            "#,
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(data)
    }

    /// Raw blob by storage id.
    pub async fn load_storage(&self, storage_id: i64) -> DbResult<Option<Vec<u8>>> {
        let data: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT data FROM media_storage WHERE id = ?1")
                .bind(storage_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(data)
    }

    /// Stores a blob and returns its storage id.
    pub async fn insert_storage(&self, data: &[u8]) -> DbResult<i64> {
        let id = sqlx::query("INSERT INTO media_storage (data) VALUES (?1)")
            .bind(data)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        Ok(id)
    }

    // =========================================================================
    // Assignments
    // =========================================================================

    /// Files assigned to an entity, by display order.
    pub async fn assigned_files(
        &self,
        entity_name: &str,
        entity_id: i64,
    ) -> DbResult<Vec<AssignedMediaFile>> {
        let rows = sqlx::query_as::<_, AssignedRow>(&format!(
            "SELECT a.entity_id, a.display_order, {FILE_COLUMNS} \
             FROM media_file_assignments a JOIN media_files f ON f.id = a.media_file_id \
             WHERE a.entity_name = ?1 AND a.entity_id = ?2 \
             ORDER BY a.display_order, a.id"
        ))
        .bind(entity_name)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AssignedMediaFile {
                entity_id: row.entity_id,
                media_file: row.file,
                display_order: row.display_order,
            })
            .collect())
    }

    /// Assigns a file to an entity. Re-assigning updates the display order.
    pub async fn assign(
        &self,
        entity_name: &str,
        entity_id: i64,
        media_file_id: i64,
        display_order: i32,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO media_file_assignments (entity_name, entity_id, media_file_id, display_order)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (entity_name, entity_id, media_file_id)
            DO UPDATE SET display_order = excluded.display_order
            "#,
        )
        .bind(entity_name)
        .bind(entity_id)
        .bind(media_file_id)
        .bind(display_order)
        .execute(&self.pool)
        .await?;

        debug!(
            entity_name = %entity_name,
            entity_id = entity_id,
            media_file_id = media_file_id,
            "Media file assigned"
        );

        Ok(())
    }
}
