//! # Checkout Attribute Repository

use sqlx::{FromRow, SqlitePool};

use crate::error::DbResult;
use mercato_core::CheckoutAttribute;

#[derive(Debug, FromRow)]
struct CheckoutAttributeRow {
    id: i64,
    name: String,
    is_tax_exempt: bool,
    tax_category_id: i64,
}

impl From<CheckoutAttributeRow> for CheckoutAttribute {
    fn from(row: CheckoutAttributeRow) -> Self {
        CheckoutAttribute {
            id: row.id,
            name: row.name,
            is_tax_exempt: row.is_tax_exempt,
            tax_category_id: row.tax_category_id,
        }
    }
}

/// Repository for checkout attributes.
#[derive(Debug, Clone)]
pub struct CheckoutAttributeRepository {
    pool: SqlitePool,
}

impl CheckoutAttributeRepository {
    /// Creates a new CheckoutAttributeRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CheckoutAttributeRepository { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<CheckoutAttribute>> {
        let row = sqlx::query_as::<_, CheckoutAttributeRow>(
            "SELECT id, name, is_tax_exempt, tax_category_id FROM checkout_attributes WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CheckoutAttribute::from))
    }

    pub async fn insert(&self, attribute: &CheckoutAttribute) -> DbResult<CheckoutAttribute> {
        let id = sqlx::query(
            "INSERT INTO checkout_attributes (name, is_tax_exempt, tax_category_id) VALUES (?1, ?2, ?3)",
        )
        .bind(&attribute.name)
        .bind(attribute.is_tax_exempt)
        .bind(attribute.tax_category_id)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(CheckoutAttribute {
            id,
            ..attribute.clone()
        })
    }
}
