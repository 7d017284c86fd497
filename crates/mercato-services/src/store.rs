//! # Store Traits
//!
//! The slices of persistence each service needs, as async traits.
//! [`mercato_db::Database`] implements all of them; tests use in-memory
//! fakes or an in-memory SQLite database.
//!
//! ```text
//! TaxService ─────────► TaxDataStore    ─┐
//! SlugRouteTransformer ► UrlRecordStore  │
//!                      ► LanguageStore   ├──► mercato_db::Database
//! MediaImporter ──────► MediaStore       │
//! QueuedEmailService ─► MailQueueStore  ─┘
//! ```

use std::collections::HashSet;

use async_trait::async_trait;

use mercato_core::media::{AssignedMediaFile, MediaFile, MediaFolder};
use mercato_core::messaging::{EmailAccount, QueuedEmail};
use mercato_core::{Address, CheckoutAttribute, Language, UrlRecord};
use mercato_db::{Database, DbResult, NewMediaFile};

// =============================================================================
// Traits
// =============================================================================

/// Lookups needed by tax resolution.
#[async_trait]
pub trait TaxDataStore: Send + Sync {
    async fn get_address(&self, id: i64) -> DbResult<Option<Address>>;

    async fn get_checkout_attribute(&self, id: i64) -> DbResult<Option<CheckoutAttribute>>;
}

/// Slug records.
#[async_trait]
pub trait UrlRecordStore: Send + Sync {
    async fn find_by_slug(&self, slug: &str) -> DbResult<Option<UrlRecord>>;

    async fn get_active_slug(
        &self,
        entity_id: i64,
        entity_name: &str,
        language_id: i64,
    ) -> DbResult<Option<String>>;

    /// Used by another entity (any language, active or not).
    async fn is_slug_taken(&self, slug: &str, entity_id: i64, entity_name: &str) -> DbResult<bool>;

    async fn save_slug(
        &self,
        entity_id: i64,
        entity_name: &str,
        slug: &str,
        language_id: i64,
    ) -> DbResult<UrlRecord>;
}

/// Storefront languages.
#[async_trait]
pub trait LanguageStore: Send + Sync {
    async fn get_language(&self, id: i64) -> DbResult<Option<Language>>;

    async fn find_by_seo_code(&self, seo_code: &str) -> DbResult<Option<Language>>;

    /// First published language by display order.
    async fn default_language(&self) -> DbResult<Language>;
}

/// Media albums, files and assignments.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn get_or_create_folder(&self, name: &str) -> DbResult<MediaFolder>;

    /// Lower-cased names of all files in the folder.
    async fn file_names_in_folder(&self, folder_id: i64) -> DbResult<HashSet<String>>;

    async fn find_equal_in_folder(&self, folder_id: i64, hash: &str) -> DbResult<Option<MediaFile>>;

    /// Saves a batch in one transaction.
    async fn insert_files(&self, folder_id: i64, files: &[NewMediaFile]) -> DbResult<Vec<MediaFile>>;

    async fn replace_content(&self, folder_id: i64, file: &NewMediaFile) -> DbResult<Option<MediaFile>>;

    async fn assigned_files(&self, entity_name: &str, entity_id: i64) -> DbResult<Vec<AssignedMediaFile>>;

    async fn assign(
        &self,
        entity_name: &str,
        entity_id: i64,
        media_file_id: i64,
        display_order: i32,
    ) -> DbResult<()>;
}

/// The mail queue plus what sending needs to resolve.
#[async_trait]
pub trait MailQueueStore: Send + Sync {
    async fn get_pending(&self, limit: u32) -> DbResult<Vec<QueuedEmail>>;

    async fn update_send_state(&self, emails: &[QueuedEmail]) -> DbResult<()>;

    async fn delete_sent_or_exhausted(&self) -> DbResult<u64>;

    async fn get_email_account(&self, id: i64) -> DbResult<Option<EmailAccount>>;

    /// Raw attachment blob by storage id.
    async fn load_storage(&self, storage_id: i64) -> DbResult<Option<Vec<u8>>>;

    /// Content of a media file.
    async fn load_file_content(&self, file_id: i64) -> DbResult<Option<Vec<u8>>>;
}

// =============================================================================
// Database Implementations
// =============================================================================

#[async_trait]
impl TaxDataStore for Database {
    async fn get_address(&self, id: i64) -> DbResult<Option<Address>> {
        self.addresses().get_by_id(id).await
    }

    async fn get_checkout_attribute(&self, id: i64) -> DbResult<Option<CheckoutAttribute>> {
        self.checkout_attributes().get_by_id(id).await
    }
}

#[async_trait]
impl UrlRecordStore for Database {
    async fn find_by_slug(&self, slug: &str) -> DbResult<Option<UrlRecord>> {
        self.url_records().find_by_slug(slug).await
    }

    async fn get_active_slug(
        &self,
        entity_id: i64,
        entity_name: &str,
        language_id: i64,
    ) -> DbResult<Option<String>> {
        self.url_records()
            .get_active_slug(entity_id, entity_name, language_id)
            .await
    }

    async fn is_slug_taken(&self, slug: &str, entity_id: i64, entity_name: &str) -> DbResult<bool> {
        self.url_records()
            .is_slug_taken(slug, entity_id, entity_name)
            .await
    }

    async fn save_slug(
        &self,
        entity_id: i64,
        entity_name: &str,
        slug: &str,
        language_id: i64,
    ) -> DbResult<UrlRecord> {
        self.url_records()
            .save_slug(entity_id, entity_name, slug, language_id)
            .await
    }
}

#[async_trait]
impl LanguageStore for Database {
    async fn get_language(&self, id: i64) -> DbResult<Option<Language>> {
        self.languages().get_by_id(id).await
    }

    async fn find_by_seo_code(&self, seo_code: &str) -> DbResult<Option<Language>> {
        self.languages().find_by_seo_code(seo_code).await
    }

    async fn default_language(&self) -> DbResult<Language> {
        self.languages().default_language().await
    }
}

#[async_trait]
impl MediaStore for Database {
    async fn get_or_create_folder(&self, name: &str) -> DbResult<MediaFolder> {
        self.media().get_or_create_folder(name).await
    }

    async fn file_names_in_folder(&self, folder_id: i64) -> DbResult<HashSet<String>> {
        self.media().file_names_in_folder(folder_id).await
    }

    async fn find_equal_in_folder(&self, folder_id: i64, hash: &str) -> DbResult<Option<MediaFile>> {
        self.media().find_equal_in_folder(folder_id, hash).await
    }

    async fn insert_files(&self, folder_id: i64, files: &[NewMediaFile]) -> DbResult<Vec<MediaFile>> {
        self.media().insert_files(folder_id, files).await
    }

    async fn replace_content(&self, folder_id: i64, file: &NewMediaFile) -> DbResult<Option<MediaFile>> {
        self.media().replace_content(folder_id, file).await
    }

    async fn assigned_files(&self, entity_name: &str, entity_id: i64) -> DbResult<Vec<AssignedMediaFile>> {
        self.media().assigned_files(entity_name, entity_id).await
    }

    async fn assign(
        &self,
        entity_name: &str,
        entity_id: i64,
        media_file_id: i64,
        display_order: i32,
    ) -> DbResult<()> {
        self.media()
            .assign(entity_name, entity_id, media_file_id, display_order)
            .await
    }
}

#[async_trait]
impl MailQueueStore for Database {
    async fn get_pending(&self, limit: u32) -> DbResult<Vec<QueuedEmail>> {
        self.queued_emails().get_pending(limit).await
    }

    async fn update_send_state(&self, emails: &[QueuedEmail]) -> DbResult<()> {
        self.queued_emails().update_send_state(emails).await
    }

    async fn delete_sent_or_exhausted(&self) -> DbResult<u64> {
        self.queued_emails().delete_sent_or_exhausted().await
    }

    async fn get_email_account(&self, id: i64) -> DbResult<Option<EmailAccount>> {
        self.email_accounts().get_by_id(id).await
    }

    async fn load_storage(&self, storage_id: i64) -> DbResult<Option<Vec<u8>>> {
        self.media().load_storage(storage_id).await
    }

    async fn load_file_content(&self, file_id: i64) -> DbResult<Option<Vec<u8>>> {
        self.media().load_file_content(file_id).await
    }
}
