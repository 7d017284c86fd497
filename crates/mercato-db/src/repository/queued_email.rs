//! # Queued E-Mail Repository
//!
//! The outgoing mail queue.
//!
//! ## Queue Selection
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  get_pending(limit)                                                     │
//! │                                                                         │
//! │    sent_on_utc IS NULL          not sent yet                            │
//! │    sent_tries  < MAX_SEND_TRIES attempts left                           │
//! │    send_manually = 0            not held back for an operator           │
//! │                                                                         │
//! │    ORDER BY priority DESC, created_on_utc ASC                           │
//! │                                                                         │
//! │  update_send_state(chunk)  ← after every chunk of MAIL_BATCH_SIZE       │
//! │  delete_sent_or_exhausted  ← housekeeping                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use crate::error::DbResult;
use mercato_core::messaging::{
    EmailAttachmentStorageLocation, QueuedEmail, QueuedEmailAttachment, MAX_SEND_TRIES,
};
use mercato_core::Reference;

#[derive(Debug, FromRow)]
struct QueuedEmailRow {
    id: i64,
    priority: i32,
    from_address: String,
    to_address: String,
    reply_to: Option<String>,
    cc: Option<String>,
    bcc: Option<String>,
    subject: String,
    body: String,
    created_on_utc: DateTime<Utc>,
    sent_tries: i32,
    sent_on_utc: Option<DateTime<Utc>>,
    email_account_id: i64,
    send_manually: bool,
}

impl From<QueuedEmailRow> for QueuedEmail {
    fn from(row: QueuedEmailRow) -> Self {
        QueuedEmail {
            id: row.id,
            priority: row.priority,
            from: row.from_address,
            to: row.to_address,
            reply_to: row.reply_to,
            cc: row.cc,
            bcc: row.bcc,
            subject: row.subject,
            body: row.body,
            created_on_utc: row.created_on_utc,
            sent_tries: row.sent_tries,
            sent_on_utc: row.sent_on_utc,
            email_account_id: row.email_account_id,
            send_manually: row.send_manually,
            attachments: Vec::new(),
        }
    }
}

#[derive(Debug, FromRow)]
struct AttachmentRow {
    id: i64,
    queued_email_id: i64,
    storage_location: EmailAttachmentStorageLocation,
    name: String,
    mime_type: String,
    path: Option<String>,
    media_storage_id: Option<i64>,
    media_file_id: Option<i64>,
}

impl From<AttachmentRow> for QueuedEmailAttachment {
    fn from(row: AttachmentRow) -> Self {
        QueuedEmailAttachment {
            id: row.id,
            queued_email_id: row.queued_email_id,
            storage_location: row.storage_location,
            name: row.name,
            mime_type: row.mime_type,
            path: row.path,
            media_storage: row.media_storage_id.map(Reference::unloaded),
            media_file: row.media_file_id.map(Reference::unloaded),
        }
    }
}

const SELECT_COLUMNS: &str = "SELECT id, priority, from_address, to_address, reply_to, cc, bcc, \
                              subject, body, created_on_utc, sent_tries, sent_on_utc, \
                              email_account_id, send_manually FROM queued_emails";

/// Repository for queued e-mails.
#[derive(Debug, Clone)]
pub struct QueuedEmailRepository {
    pool: SqlitePool,
}

impl QueuedEmailRepository {
    /// Creates a new QueuedEmailRepository.
    pub fn new(pool: SqlitePool) -> Self {
        QueuedEmailRepository { pool }
    }

    /// Queues an e-mail with its attachments.
    ///
    /// Blob attachments whose content is loaded but not yet stored
    /// (storage id `0`) get their blob written first.
    pub async fn insert(&self, email: &QueuedEmail) -> DbResult<QueuedEmail> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO queued_emails (
                priority, from_address, to_address, reply_to, cc, bcc, subject, body,
                created_on_utc, sent_tries, sent_on_utc, email_account_id, send_manually
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(email.priority)
        .bind(&email.from)
        .bind(&email.to)
        .bind(&email.reply_to)
        .bind(&email.cc)
        .bind(&email.bcc)
        .bind(&email.subject)
        .bind(&email.body)
        .bind(email.created_on_utc)
        .bind(email.sent_tries)
        .bind(email.sent_on_utc)
        .bind(email.email_account_id)
        .bind(email.send_manually)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let mut attachments = Vec::with_capacity(email.attachments.len());
        for attachment in &email.attachments {
            let media_storage = match &attachment.media_storage {
                Some(blob) if blob.id() == 0 => match blob.value() {
                    Some(data) => {
                        let storage_id = sqlx::query("INSERT INTO media_storage (data) VALUES (?1)")
                            .bind(data)
                            .execute(&mut *tx)
                            .await?
                            .last_insert_rowid();
                        Some(Reference::loaded(storage_id, data.clone()))
                    }
                    None => None,
                },
                other => other.clone(),
            };

            let attachment_id = sqlx::query(
                r#"
                INSERT INTO queued_email_attachments (
                    queued_email_id, storage_location, name, mime_type, path,
                    media_storage_id, media_file_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(id)
            .bind(attachment.storage_location)
            .bind(&attachment.name)
            .bind(&attachment.mime_type)
            .bind(&attachment.path)
            .bind(media_storage.as_ref().map(Reference::id))
            .bind(attachment.media_file.as_ref().map(Reference::id))
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            attachments.push(QueuedEmailAttachment {
                id: attachment_id,
                queued_email_id: id,
                media_storage,
                ..attachment.clone()
            });
        }

        tx.commit().await?;

        debug!(id = id, to = %email.to, attachments = attachments.len(), "E-mail queued");

        Ok(QueuedEmail {
            id,
            attachments,
            ..email.clone()
        })
    }

    /// Gets a queued e-mail (with attachments) by id.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<QueuedEmail>> {
        let row = sqlx::query_as::<_, QueuedEmailRow>(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut emails = vec![QueuedEmail::from(row)];
        self.attach(&mut emails).await?;
        Ok(emails.pop())
    }

    /// Mails waiting to be sent, highest priority first.
    pub async fn get_pending(&self, limit: u32) -> DbResult<Vec<QueuedEmail>> {
        debug!(limit = limit, "Loading pending e-mails");

        let rows = sqlx::query_as::<_, QueuedEmailRow>(&format!(
            "{SELECT_COLUMNS} WHERE sent_on_utc IS NULL AND sent_tries < ?1 AND send_manually = 0 \
             ORDER BY priority DESC, created_on_utc ASC, id ASC LIMIT ?2"
        ))
        .bind(MAX_SEND_TRIES)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut emails: Vec<QueuedEmail> = rows.into_iter().map(QueuedEmail::from).collect();
        self.attach(&mut emails).await?;
        Ok(emails)
    }

    /// Loads the attachments of `emails` with one query.
    async fn attach(&self, emails: &mut [QueuedEmail]) -> DbResult<()> {
        if emails.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["?"; emails.len()].join(", ");
        let sql = format!(
            "SELECT id, queued_email_id, storage_location, name, mime_type, path, \
             media_storage_id, media_file_id FROM queued_email_attachments \
             WHERE queued_email_id IN ({placeholders}) ORDER BY id"
        );

        let mut query = sqlx::query_as::<_, AttachmentRow>(&sql);
        for email in emails.iter() {
            query = query.bind(email.id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut by_email: HashMap<i64, Vec<QueuedEmailAttachment>> = HashMap::new();
        for row in rows {
            by_email
                .entry(row.queued_email_id)
                .or_default()
                .push(QueuedEmailAttachment::from(row));
        }

        for email in emails.iter_mut() {
            email.attachments = by_email.remove(&email.id).unwrap_or_default();
        }

        Ok(())
    }

    /// Persists `sent_tries` and `sent_on_utc` for a chunk of mails.
    pub async fn update_send_state(&self, emails: &[QueuedEmail]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        for email in emails {
            sqlx::query("UPDATE queued_emails SET sent_tries = ?1, sent_on_utc = ?2 WHERE id = ?3")
                .bind(email.sent_tries)
                .bind(email.sent_on_utc)
                .bind(email.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        debug!(count = emails.len(), "Send state saved");
        Ok(())
    }

    /// Deletes every mail that was sent or ran out of attempts.
    ///
    /// Returns the number of deleted mails; attachments cascade.
    pub async fn delete_sent_or_exhausted(&self) -> DbResult<u64> {
        let result =
            sqlx::query("DELETE FROM queued_emails WHERE sent_on_utc IS NOT NULL OR sent_tries >= ?1")
                .bind(MAX_SEND_TRIES)
                .execute(&self.pool)
                .await?;

        info!(deleted = result.rows_affected(), "Queued e-mails deleted");
        Ok(result.rows_affected())
    }

    /// Total number of queued mails.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queued_emails")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;
    use mercato_core::messaging::EmailAccount;

    async fn setup() -> (Database, i64) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let account = db
            .email_accounts()
            .insert(&EmailAccount {
                id: 0,
                email: "shop@example.com".into(),
                display_name: None,
                host: "localhost".into(),
                port: 25,
                username: None,
                password: None,
                enable_ssl: false,
            })
            .await
            .unwrap();
        (db, account.id)
    }

    fn email(account_id: i64, priority: i32, minutes_ago: i64) -> QueuedEmail {
        QueuedEmail {
            id: 0,
            priority,
            from: "shop@example.com".into(),
            to: "jane@example.com".into(),
            reply_to: None,
            cc: None,
            bcc: None,
            subject: "Hello".into(),
            body: "Body".into(),
            created_on_utc: Utc::now() - Duration::minutes(minutes_ago),
            sent_tries: 0,
            sent_on_utc: None,
            email_account_id: account_id,
            send_manually: false,
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_pending_order_and_filters() {
        let (db, account) = setup().await;
        let repo = db.queued_emails();

        let old_low = repo.insert(&email(account, 0, 30)).await.unwrap();
        let high = repo.insert(&email(account, 5, 1)).await.unwrap();
        let new_low = repo.insert(&email(account, 0, 2)).await.unwrap();

        let mut exhausted = email(account, 9, 0);
        exhausted.sent_tries = MAX_SEND_TRIES;
        repo.insert(&exhausted).await.unwrap();

        let mut manual = email(account, 9, 0);
        manual.send_manually = true;
        repo.insert(&manual).await.unwrap();

        let mut sent = email(account, 9, 0);
        sent.sent_on_utc = Some(Utc::now());
        repo.insert(&sent).await.unwrap();

        let ids: Vec<i64> = repo.get_pending(10).await.unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![high.id, old_low.id, new_low.id]);
        assert_eq!(repo.get_pending(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_attachments_roundtrip() {
        let (db, account) = setup().await;
        let repo = db.queued_emails();

        let mut mail = email(account, 0, 0);
        mail.attachments = vec![
            QueuedEmailAttachment {
                id: 0,
                queued_email_id: 0,
                storage_location: EmailAttachmentStorageLocation::Blob,
                name: "invoice.pdf".into(),
                mime_type: "application/pdf".into(),
                path: None,
                media_storage: Some(Reference::loaded(0, b"%PDF".to_vec())),
                media_file: None,
            },
            QueuedEmailAttachment {
                id: 0,
                queued_email_id: 0,
                storage_location: EmailAttachmentStorageLocation::Path,
                name: "terms.txt".into(),
                mime_type: "text/plain".into(),
                path: Some("/srv/terms.txt".into()),
                media_storage: None,
                media_file: None,
            },
        ];

        let saved = repo.insert(&mail).await.unwrap();
        let loaded = repo.get_by_id(saved.id).await.unwrap().unwrap();
        assert_eq!(loaded.attachments.len(), 2);

        let blob = &loaded.attachments[0];
        assert_eq!(blob.storage_location, EmailAttachmentStorageLocation::Blob);
        let storage = blob.media_storage.as_ref().unwrap();
        assert!(!storage.is_loaded());
        assert_eq!(
            db.media().load_storage(storage.id()).await.unwrap(),
            Some(b"%PDF".to_vec())
        );
        assert_eq!(loaded.attachments[1].path.as_deref(), Some("/srv/terms.txt"));
    }

    #[tokio::test]
    async fn test_send_state_and_cleanup() {
        let (db, account) = setup().await;
        let repo = db.queued_emails();

        let mut a = repo.insert(&email(account, 0, 3)).await.unwrap();
        let mut b = repo.insert(&email(account, 0, 2)).await.unwrap();
        let c = repo.insert(&email(account, 0, 1)).await.unwrap();

        a.sent_tries = 1;
        a.sent_on_utc = Some(Utc::now());
        b.sent_tries = MAX_SEND_TRIES;
        repo.update_send_state(&[a.clone(), b.clone()]).await.unwrap();

        let pending: Vec<i64> = repo.get_pending(10).await.unwrap().iter().map(|e| e.id).collect();
        assert_eq!(pending, vec![c.id]);

        assert_eq!(repo.delete_sent_or_exhausted().await.unwrap(), 2);
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}
