//! # Address Repository
//!
//! Addresses with their country, as tax resolution needs them.

use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use mercato_core::{Address, Country};

/// Flat row of an address joined with its country.
#[derive(Debug, FromRow)]
struct AddressRow {
    id: i64,
    first_name: Option<String>,
    last_name: Option<String>,
    company: Option<String>,
    city: Option<String>,
    country_id: Option<i64>,
    country_name: Option<String>,
    country_iso: Option<String>,
    country_subject_to_vat: Option<bool>,
}

impl From<AddressRow> for Address {
    fn from(row: AddressRow) -> Self {
        let country = match (row.country_id, row.country_name, row.country_iso) {
            (Some(id), Some(name), Some(two_letter_iso_code)) => Some(Country {
                id,
                name,
                two_letter_iso_code,
                subject_to_vat: row.country_subject_to_vat.unwrap_or(false),
            }),
            _ => None,
        };

        Address {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            company: row.company,
            city: row.city,
            country,
        }
    }
}

/// Repository for address and country operations.
#[derive(Debug, Clone)]
pub struct AddressRepository {
    pool: SqlitePool,
}

impl AddressRepository {
    /// Creates a new AddressRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AddressRepository { pool }
    }

    /// Gets an address (with country) by id.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Address>> {
        debug!(id = id, "Loading address");

        let row = sqlx::query_as::<_, AddressRow>(
            r#"
            SELECT a.id, a.first_name, a.last_name, a.company, a.city,
                   c.id AS country_id,
                   c.name AS country_name,
                   c.two_letter_iso_code AS country_iso,
                   c.subject_to_vat AS country_subject_to_vat
            FROM addresses a
            LEFT JOIN countries c ON c.id = a.country_id
            WHERE a.id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Address::from))
    }

    /// Gets a country by id.
    pub async fn get_country(&self, id: i64) -> DbResult<Option<Country>> {
        let country = sqlx::query_as::<_, Country>(
            "SELECT id, name, two_letter_iso_code, subject_to_vat FROM countries WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(country)
    }

    /// Inserts a country and returns it with its id.
    pub async fn insert_country(&self, country: &Country) -> DbResult<Country> {
        let id = sqlx::query(
            "INSERT INTO countries (name, two_letter_iso_code, subject_to_vat) VALUES (?1, ?2, ?3)",
        )
        .bind(&country.name)
        .bind(&country.two_letter_iso_code)
        .bind(country.subject_to_vat)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Country {
            id,
            ..country.clone()
        })
    }

    /// Inserts an address. The attached country must already exist.
    pub async fn insert_address(&self, address: &Address) -> DbResult<Address> {
        let id = sqlx::query(
            r#"
            INSERT INTO addresses (first_name, last_name, company, city, country_id)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&address.first_name)
        .bind(&address.last_name)
        .bind(&address.company)
        .bind(&address.city)
        .bind(address.country_id())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        debug!(id = id, "Address inserted");

        Ok(Address {
            id,
            ..address.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::DbError;

    #[tokio::test]
    async fn test_address_roundtrip_with_country() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.addresses();

        let germany = repo
            .insert_country(&Country {
                id: 0,
                name: "Germany".into(),
                two_letter_iso_code: "DE".into(),
                subject_to_vat: true,
            })
            .await
            .unwrap();

        let saved = repo
            .insert_address(&Address {
                company: Some("ACME GmbH".into()),
                city: Some("Berlin".into()),
                country: Some(germany.clone()),
                ..Default::default()
            })
            .await
            .unwrap();

        let loaded = repo.get_by_id(saved.id).await.unwrap().unwrap();
        assert_eq!(loaded.country, Some(germany));
        assert!(!loaded.has_no_company());
        assert!(repo.get_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_address_without_country() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.addresses();
        let saved = repo.insert_address(&Address::default()).await.unwrap();

        let loaded = repo.get_by_id(saved.id).await.unwrap().unwrap();
        assert!(loaded.country.is_none());
    }

    #[tokio::test]
    async fn test_address_with_unknown_country_is_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let address = Address {
            country: Some(Country {
                id: 77,
                name: "Nowhere".into(),
                two_letter_iso_code: "NW".into(),
                subject_to_vat: false,
            }),
            ..Default::default()
        };

        let err = db.addresses().insert_address(&address).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }
}
