//! # Language Repository
//!
//! Storefront languages. The first published language by display order is
//! the store's default language; its SEO code may be stripped from URLs.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use mercato_core::Language;

const SELECT_COLUMNS: &str = "SELECT id, name, language_culture, unique_seo_code, published, \
                              display_order FROM languages";

/// Repository for language operations.
#[derive(Debug, Clone)]
pub struct LanguageRepository {
    pool: SqlitePool,
}

impl LanguageRepository {
    /// Creates a new LanguageRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LanguageRepository { pool }
    }

    /// Gets a language by id.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Language>> {
        let language = sqlx::query_as::<_, Language>(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(language)
    }

    /// Finds a language by its URL code ("de", "en"), ignoring case.
    pub async fn find_by_seo_code(&self, seo_code: &str) -> DbResult<Option<Language>> {
        debug!(seo_code = %seo_code, "Looking up language by SEO code");

        let language = sqlx::query_as::<_, Language>(&format!(
            "{SELECT_COLUMNS} WHERE unique_seo_code = ?1 COLLATE NOCASE"
        ))
        .bind(seo_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(language)
    }

    /// Published languages ordered by display order.
    pub async fn list_published(&self) -> DbResult<Vec<Language>> {
        let languages = sqlx::query_as::<_, Language>(&format!(
            "{SELECT_COLUMNS} WHERE published = 1 ORDER BY display_order, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(languages)
    }

    /// The default (first published) language.
    pub async fn default_language(&self) -> DbResult<Language> {
        sqlx::query_as::<_, Language>(&format!(
            "{SELECT_COLUMNS} WHERE published = 1 ORDER BY display_order, id LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Language", "default"))
    }

    /// Inserts a language and returns it with its id.
    pub async fn insert(&self, language: &Language) -> DbResult<Language> {
        let id = sqlx::query(
            r#"
            INSERT INTO languages (name, language_culture, unique_seo_code, published, display_order)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&language.name)
        .bind(&language.language_culture)
        .bind(&language.unique_seo_code)
        .bind(language.published)
        .bind(language.display_order)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => {
                DbError::duplicate(field, language.unique_seo_code.clone())
            }
            other => other,
        })?
        .last_insert_rowid();

        debug!(id = id, seo_code = %language.unique_seo_code, "Language inserted");

        Ok(Language {
            id,
            ..language.clone()
        })
    }
}
