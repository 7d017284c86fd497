//! # E-Mail Account Repository
//!
//! SMTP accounts queued e-mails are sent through.

use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use mercato_core::messaging::EmailAccount;

#[derive(Debug, FromRow)]
struct EmailAccountRow {
    id: i64,
    email: String,
    display_name: Option<String>,
    host: String,
    port: i64,
    username: Option<String>,
    password: Option<String>,
    enable_ssl: bool,
}

impl TryFrom<EmailAccountRow> for EmailAccount {
    type Error = DbError;

    fn try_from(row: EmailAccountRow) -> Result<Self, Self::Error> {
        let port = u16::try_from(row.port).map_err(|e| DbError::decode("email_accounts.port", e))?;

        Ok(EmailAccount {
            id: row.id,
            email: row.email,
            display_name: row.display_name,
            host: row.host,
            port,
            username: row.username,
            password: row.password,
            enable_ssl: row.enable_ssl,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, email, display_name, host, port, username, password, enable_ssl FROM email_accounts";

/// Repository for e-mail accounts.
#[derive(Debug, Clone)]
pub struct EmailAccountRepository {
    pool: SqlitePool,
}

impl EmailAccountRepository {
    /// Creates a new EmailAccountRepository.
    pub fn new(pool: SqlitePool) -> Self {
        EmailAccountRepository { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<EmailAccount>> {
        sqlx::query_as::<_, EmailAccountRow>(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(EmailAccount::try_from)
            .transpose()
    }

    pub async fn list(&self) -> DbResult<Vec<EmailAccount>> {
        sqlx::query_as::<_, EmailAccountRow>(&format!("{SELECT_COLUMNS} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(EmailAccount::try_from)
            .collect()
    }

    pub async fn insert(&self, account: &EmailAccount) -> DbResult<EmailAccount> {
        let id = sqlx::query(
            r#"
            INSERT INTO email_accounts (email, display_name, host, port, username, password, enable_ssl)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&account.email)
        .bind(&account.display_name)
        .bind(&account.host)
        .bind(i64::from(account.port))
        .bind(&account.username)
        .bind(&account.password)
        .bind(account.enable_ssl)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        debug!(id = id, host = %account.host, "E-mail account inserted");

        Ok(EmailAccount {
            id,
            ..account.clone()
        })
    }
}
