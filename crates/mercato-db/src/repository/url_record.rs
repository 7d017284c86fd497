//! # Url Record Repository
//!
//! Persistence for SEO slugs.
//!
//! ## Slug History
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  url_records for Product #7, language 1                                │
//! │                                                                         │
//! │  id │ slug                │ is_active                                   │
//! │  ───┼─────────────────────┼──────────                                   │
//! │  3  │ espresso-machine    │ 0   ← old slug, redirects permanently      │
//! │  9  │ espresso-maker-pro  │ 1   ← the one and only active slug         │
//! │                                                                         │
//! │  save_slug("espresso-machine") flips the flags in ONE transaction:     │
//! │  3 → active, 9 → inactive. The partial unique index                    │
//! │  ux_url_records_active rejects a second active row.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use mercato_core::UrlRecord;

const SELECT_COLUMNS: &str =
    "SELECT id, entity_id, entity_name, slug, is_active, language_id FROM url_records";

/// Repository for url record operations.
#[derive(Debug, Clone)]
pub struct UrlRecordRepository {
    pool: SqlitePool,
}

impl UrlRecordRepository {
    /// Creates a new UrlRecordRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UrlRecordRepository { pool }
    }

    /// Finds the first record with this slug (case-insensitive).
    ///
    /// Active and inactive records are both returned; the caller decides
    /// whether to redirect.
    pub async fn find_by_slug(&self, slug: &str) -> DbResult<Option<UrlRecord>> {
        debug!(slug = %slug, "Looking up slug");

        let record = sqlx::query_as::<_, UrlRecord>(&format!(
            "{SELECT_COLUMNS} WHERE slug = ?1 COLLATE NOCASE ORDER BY id LIMIT 1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Active slug for an entity in a language.
    pub async fn get_active_slug(
        &self,
        entity_id: i64,
        entity_name: &str,
        language_id: i64,
    ) -> DbResult<Option<String>> {
        let slug: Option<String> = sqlx::query_scalar(
            r#"
            SELECT slug FROM url_records
            WHERE entity_id = ?1
              AND entity_name = ?2 COLLATE NOCASE
              AND language_id = ?3
              AND is_active = 1
            LIMIT 1
            "#,
        )
        .bind(entity_id)
        .bind(entity_name)
        .bind(language_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(slug)
    }

    /// All records (history included) of an entity in a language.
    pub async fn list_for_entity(
        &self,
        entity_id: i64,
        entity_name: &str,
        language_id: i64,
    ) -> DbResult<Vec<UrlRecord>> {
        let records = sqlx::query_as::<_, UrlRecord>(&format!(
            "{SELECT_COLUMNS} WHERE entity_id = ?1 AND entity_name = ?2 COLLATE NOCASE \
             AND language_id = ?3 ORDER BY id"
        ))
        .bind(entity_id)
        .bind(entity_name)
        .bind(language_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Inserts a record as given.
    pub async fn insert(&self, record: &UrlRecord) -> DbResult<UrlRecord> {
        let id = sqlx::query(
            r#"
            INSERT INTO url_records (entity_id, entity_name, slug, is_active, language_id)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(record.entity_id)
        .bind(&record.entity_name)
        .bind(&record.slug)
        .bind(record.is_active)
        .bind(record.language_id)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(UrlRecord {
            id,
            ..record.clone()
        })
    }

    /// Makes `slug` the one active slug of an entity in a language.
    ///
    /// ## What This Does (single transaction)
    /// 1. Rejects slugs recorded for another entity
    /// 2. Deactivates every other record of the entity/language
    /// 3. Re-activates the record that already carries `slug`, or
    /// 4. Inserts a new active record
    ///
    /// ## Errors
    /// `UniqueViolation` when another entity owns the slug.
    pub async fn save_slug(
        &self,
        entity_id: i64,
        entity_name: &str,
        slug: &str,
        language_id: i64,
    ) -> DbResult<UrlRecord> {
        let mut tx = self.pool.begin().await?;

        let owner: Option<(i64, String)> = sqlx::query_as(
            r#"
            SELECT entity_id, entity_name FROM url_records
            WHERE slug = ?1 COLLATE NOCASE
              AND NOT (entity_id = ?2 AND entity_name = ?3 COLLATE NOCASE)
            LIMIT 1
            "#,
        )
        .bind(slug)
        .bind(entity_id)
        .bind(entity_name)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((owner_id, owner_name)) = owner {
            debug!(slug = %slug, owner = %owner_name, owner_id = owner_id, "Slug owned by another entity");
            return Err(DbError::duplicate("slug", slug));
        }

        let existing = sqlx::query_as::<_, UrlRecord>(&format!(
            "{SELECT_COLUMNS} WHERE entity_id = ?1 AND entity_name = ?2 COLLATE NOCASE \
             AND language_id = ?3 AND slug = ?4 COLLATE NOCASE LIMIT 1"
        ))
        .bind(entity_id)
        .bind(entity_name)
        .bind(language_id)
        .bind(slug)
        .fetch_optional(&mut *tx)
        .await?;

        let keep_id = existing.as_ref().map_or(0, |r| r.id);

        sqlx::query(
            r#"
            UPDATE url_records SET is_active = 0
            WHERE entity_id = ?1 AND entity_name = ?2 COLLATE NOCASE
              AND language_id = ?3 AND id <> ?4
            "#,
        )
        .bind(entity_id)
        .bind(entity_name)
        .bind(language_id)
        .bind(keep_id)
        .execute(&mut *tx)
        .await?;

        let record = match existing {
            Some(record) => {
                sqlx::query("UPDATE url_records SET is_active = 1 WHERE id = ?1")
                    .bind(record.id)
                    .execute(&mut *tx)
                    .await?;
                UrlRecord {
                    is_active: true,
                    ..record
                }
            }
            None => {
                let id = sqlx::query(
                    r#"
                    INSERT INTO url_records (entity_id, entity_name, slug, is_active, language_id)
                    VALUES (?1, ?2, ?3, 1, ?4)
                    "#,
                )
                .bind(entity_id)
                .bind(entity_name)
                .bind(slug)
                .bind(language_id)
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();

                UrlRecord {
                    id,
                    entity_id,
                    entity_name: entity_name.to_string(),
                    slug: slug.to_string(),
                    is_active: true,
                    language_id,
                }
            }
        };

        tx.commit().await?;

        debug!(
            entity_id = entity_id,
            entity_name = %entity_name,
            slug = %record.slug,
            "Active slug saved"
        );

        Ok(record)
    }

    /// Whether `slug` is used by any entity other than the given one.
    pub async fn is_slug_taken(&self, slug: &str, entity_id: i64, entity_name: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM url_records
            WHERE slug = ?1 COLLATE NOCASE
              AND NOT (entity_id = ?2 AND entity_name = ?3 COLLATE NOCASE)
            "#,
        )
        .bind(slug)
        .bind(entity_id)
        .bind(entity_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use crate::DbError;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_find_by_slug_is_case_insensitive() {
        let db = db().await;
        let repo = db.url_records();
        repo.save_slug(7, "Product", "espresso-machine", 1).await.unwrap();

        let found = repo.find_by_slug("Espresso-Machine").await.unwrap().unwrap();
        assert_eq!(found.entity_id, 7);
        assert!(found.is_active);
        assert!(repo.find_by_slug("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_slug_keeps_one_active_record() {
        let db = db().await;
        let repo = db.url_records();

        repo.save_slug(7, "Product", "espresso-machine", 1).await.unwrap();
        repo.save_slug(7, "Product", "espresso-maker-pro", 1).await.unwrap();

        let history = repo.list_for_entity(7, "Product", 1).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|r| r.is_active).count(), 1);
        assert_eq!(
            repo.get_active_slug(7, "Product", 1).await.unwrap().as_deref(),
            Some("espresso-maker-pro")
        );

        // switching back re-activates the old record instead of inserting
        let back = repo.save_slug(7, "Product", "espresso-machine", 1).await.unwrap();
        assert_eq!(back.id, history[0].id);
        let history = repo.list_for_entity(7, "Product", 1).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(
            repo.get_active_slug(7, "Product", 1).await.unwrap().as_deref(),
            Some("espresso-machine")
        );
    }

    #[tokio::test]
    async fn test_languages_are_independent() {
        let db = db().await;
        let repo = db.url_records();
        repo.save_slug(7, "Product", "table", 1).await.unwrap();
        repo.save_slug(7, "Product", "tisch", 2).await.unwrap();

        assert_eq!(repo.get_active_slug(7, "Product", 1).await.unwrap().as_deref(), Some("table"));
        assert_eq!(repo.get_active_slug(7, "Product", 2).await.unwrap().as_deref(), Some("tisch"));
    }

    #[tokio::test]
    async fn test_second_active_insert_is_rejected() {
        let db = db().await;
        let repo = db.url_records();
        let first = repo.save_slug(1, "Category", "chairs", 0).await.unwrap();

        let duplicate = mercato_core::UrlRecord {
            id: 0,
            slug: "seating".into(),
            ..first
        };
        let err = repo.insert(&duplicate).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_save_slug_rejects_slug_of_other_entity() {
        let db = db().await;
        let repo = db.url_records();
        repo.save_slug(1, "Product", "table", 0).await.unwrap();

        let err = repo.save_slug(2, "Category", "TABLE", 0).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        // retired slugs stay reserved for their entity
        repo.save_slug(1, "Product", "desk", 0).await.unwrap();
        assert!(repo.save_slug(3, "Product", "table", 0).await.is_err());

        let found = repo.find_by_slug("table").await.unwrap().unwrap();
        assert_eq!((found.entity_id, found.entity_name.as_str()), (1, "Product"));
        assert!(repo.get_active_slug(2, "Category", 0).await.unwrap().is_none());

        // the owner may switch back to it
        repo.save_slug(1, "Product", "table", 0).await.unwrap();
    }

    #[tokio::test]
    async fn test_is_slug_taken_ignores_own_entity() {
        let db = db().await;
        let repo = db.url_records();
        repo.save_slug(1, "Category", "chairs", 0).await.unwrap();

        assert!(!repo.is_slug_taken("chairs", 1, "Category").await.unwrap());
        assert!(repo.is_slug_taken("CHAIRS", 2, "Category").await.unwrap());
        assert!(repo.is_slug_taken("chairs", 1, "Product").await.unwrap());
    }
}
