//! # Queued E-mail Service
//!
//! Sends queued e-mails through the SMTP account each mail belongs to, or
//! writes them to a pickup directory.
//!
//! ## Dispatch Flow
//! ```text
//! pending mails
//!      │  stable sort by email_account_id
//!      ▼
//! ┌──────────── per account ────────────┐
//! │ pickup dir?  ── yes ──► no client    │
//! │      │ no                            │
//! │      ▼                               │
//! │ MailTransportFactory::connect        │
//! │      │                               │
//! │      ▼                               │
//! │ chunks of MAIL_BATCH_SIZE            │
//! │   convert_email ─► send / .eml       │
//! │   sent_tries += 1 (sent_on_utc = now)│
//! │   update_send_state (per chunk)      │
//! └──────────────────────────────────────┘
//! ```
//!
//! A failing mail is logged and counted as an attempt; it never stops the
//! rest of the chunk. An account that cannot be connected is skipped for
//! this run and its mails stay untouched.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use mercato_core::messaging::{
    to_mail_message_with, EmailAccount, EmailAttachmentStorageLocation, MailAddress, MailAttachment,
    MailMessage, QueuedEmail, QueuedEmailAttachment, MAIL_BATCH_SIZE,
};
use mercato_db::DbError;

use crate::config::EmailSettings;
use crate::error::{ServiceError, ServiceResult};
use crate::store::MailQueueStore;

// =============================================================================
// Transport Traits
// =============================================================================

/// An open connection to a mail server.
#[async_trait]
pub trait MailClient: Send + Sync {
    async fn send(&self, message: &MailMessage) -> ServiceResult<()>;
}

/// Opens [`MailClient`]s for e-mail accounts.
#[async_trait]
pub trait MailTransportFactory: Send + Sync {
    async fn connect(&self, account: &EmailAccount) -> ServiceResult<Box<dyn MailClient>>;
}

// =============================================================================
// Lettre SMTP Transport
// =============================================================================

/// SMTP transport backed by lettre.
#[derive(Debug, Clone)]
pub struct LettreTransportFactory {
    timeout: Duration,
}

impl LettreTransportFactory {
    pub fn new(timeout: Duration) -> Self {
        LettreTransportFactory { timeout }
    }

    pub fn from_settings(settings: &EmailSettings) -> Self {
        Self::new(Duration::from_secs(settings.smtp_timeout_secs))
    }
}

#[async_trait]
impl MailTransportFactory for LettreTransportFactory {
    async fn connect(&self, account: &EmailAccount) -> ServiceResult<Box<dyn MailClient>> {
        let builder = if account.enable_ssl {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&account.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&account.host)
        };

        let mut builder = builder.port(account.port).timeout(Some(self.timeout));
        if let (Some(username), Some(password)) = (&account.username, &account.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        let transport = builder.build();

        if !transport.test_connection().await? {
            return Err(ServiceError::Mail(format!(
                "SMTP server {}:{} refused the connection",
                account.host, account.port
            )));
        }

        debug!(account_id = account.id, host = %account.host, port = account.port, "SMTP connected");
        Ok(Box::new(LettreClient { transport }))
    }
}

struct LettreClient {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

#[async_trait]
impl MailClient for LettreClient {
    async fn send(&self, message: &MailMessage) -> ServiceResult<()> {
        let message = build_message(message)?;
        self.transport.send(message).await?;
        Ok(())
    }
}

/// Parses `addr` or `Name <addr>` with lettre's mailbox grammar, so quoted
/// names and escapes survive.
fn parse_mail_address(value: &str) -> ServiceResult<MailAddress> {
    let mailbox: Mailbox = value.trim().parse()?;
    Ok(MailAddress {
        address: mailbox.email.to_string(),
        display_name: mailbox.name,
    })
}

fn mailbox(address: &MailAddress) -> ServiceResult<Mailbox> {
    Ok(Mailbox::new(
        address.display_name.clone(),
        address.address.parse()?,
    ))
}

/// Builds the MIME message: an HTML body, plus one part per attachment.
fn build_message(message: &MailMessage) -> ServiceResult<Message> {
    let mut builder = Message::builder()
        .from(mailbox(&message.from)?)
        .subject(message.subject.clone());

    for to in &message.to {
        builder = builder.to(mailbox(to)?);
    }
    for reply_to in &message.reply_to {
        builder = builder.reply_to(mailbox(reply_to)?);
    }
    for cc in &message.cc {
        builder = builder.cc(mailbox(cc)?);
    }
    for bcc in &message.bcc {
        builder = builder.bcc(mailbox(bcc)?);
    }

    let body = SinglePart::html(message.body.clone());
    if message.attachments.is_empty() {
        return Ok(builder.singlepart(body)?);
    }

    let mut parts = MultiPart::mixed().singlepart(body);
    for attachment in &message.attachments {
        let content_type = ContentType::parse(&attachment.mime_type)
            .or_else(|_| ContentType::parse("application/octet-stream"))
            .map_err(|e| ServiceError::Mail(e.to_string()))?;
        parts = parts.singlepart(
            Attachment::new(attachment.name.clone()).body(attachment.content.clone(), content_type),
        );
    }
    Ok(builder.multipart(parts)?)
}

// =============================================================================
// Queued E-mail Service
// =============================================================================

/// Dispatches the mail queue.
pub struct QueuedEmailService {
    store: Arc<dyn MailQueueStore>,
    transports: Arc<dyn MailTransportFactory>,
    settings: EmailSettings,
}

impl QueuedEmailService {
    pub fn new(
        store: Arc<dyn MailQueueStore>,
        transports: Arc<dyn MailTransportFactory>,
        settings: EmailSettings,
    ) -> Self {
        QueuedEmailService {
            store,
            transports,
            settings,
        }
    }

    pub fn settings(&self) -> &EmailSettings {
        &self.settings
    }

    /// One worker poll: load pending mails, send them and clean up.
    ///
    /// Returns the number of mails sent.
    pub async fn process_queue(&self, cancel: &watch::Receiver<bool>) -> ServiceResult<usize> {
        let mut emails = self.store.get_pending(self.settings.fetch_size).await?;
        if emails.is_empty() {
            debug!("No queued e-mails");
            return Ok(0);
        }

        let sent = self.send_mails(&mut emails, cancel).await?;

        if self.settings.delete_sent_mails {
            self.delete_all_queued_mails().await?;
        }
        Ok(sent)
    }

    /// Sends `emails`, grouped by account, and saves their send state.
    ///
    /// `emails` is left sorted by account. Stops between mails once
    /// `cancel` turns true. Returns the number of mails sent.
    ///
    /// ## Errors
    /// `InvalidConfig` when the pickup directory does not exist; storage
    /// failures while saving the send state.
    pub async fn send_mails(
        &self,
        emails: &mut [QueuedEmail],
        cancel: &watch::Receiver<bool>,
    ) -> ServiceResult<usize> {
        let pickup = self.pickup_directory().await?;

        emails.sort_by_key(|email| email.email_account_id);

        let mut sent = 0;
        let mut start = 0;
        while start < emails.len() && !*cancel.borrow() {
            let account_id = emails[start].email_account_id;
            let end = emails[start..]
                .iter()
                .position(|email| email.email_account_id != account_id)
                .map_or(emails.len(), |offset| start + offset);
            let group = &mut emails[start..end];
            start = end;

            let client = match pickup {
                Some(_) => None,
                None => match self.connect(account_id).await {
                    Ok(client) => Some(client),
                    Err(e) => {
                        error!(account_id = account_id, mails = group.len(), error = %e, "Failed to connect e-mail account");
                        continue;
                    }
                },
            };

            for batch in group.chunks_mut(MAIL_BATCH_SIZE) {
                if *cancel.borrow() {
                    break;
                }
                sent += self
                    .process_batch(batch, client.as_deref(), pickup, cancel)
                    .await;
                self.store.update_send_state(batch).await?;
            }
        }

        if *cancel.borrow() {
            warn!(sent = sent, "Mail dispatch cancelled");
        } else {
            info!(sent = sent, total = emails.len(), "Queued e-mails processed");
        }
        Ok(sent)
    }

    async fn process_batch(
        &self,
        batch: &mut [QueuedEmail],
        client: Option<&dyn MailClient>,
        pickup: Option<&Path>,
        cancel: &watch::Receiver<bool>,
    ) -> usize {
        let mut sent = 0;
        for email in batch.iter_mut() {
            if *cancel.borrow() {
                break;
            }

            match self.send_one(email, client, pickup).await {
                Ok(()) => {
                    email.sent_on_utc = Some(Utc::now());
                    sent += 1;
                    debug!(email_id = email.id, to = %email.to, "E-mail sent");
                }
                Err(e) => {
                    error!(email_id = email.id, to = %email.to, error = %e, "Failed to send e-mail");
                }
            }
            email.sent_tries += 1;
        }
        sent
    }

    async fn send_one(
        &self,
        email: &QueuedEmail,
        client: Option<&dyn MailClient>,
        pickup: Option<&Path>,
    ) -> ServiceResult<()> {
        let message = self.convert_email(email).await?;

        match (pickup, client) {
            (Some(dir), _) => {
                save_to_pickup_directory(&message, dir).await?;
            }
            (None, Some(client)) => {
                client.send(&message).await?;
                if self.settings.mail_sending_delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(self.settings.mail_sending_delay_ms))
                        .await;
                }
            }
            (None, None) => {
                return Err(ServiceError::Mail("no mail client".into()));
            }
        }
        Ok(())
    }

    async fn connect(&self, account_id: i64) -> ServiceResult<Box<dyn MailClient>> {
        let account = self
            .store
            .get_email_account(account_id)
            .await?
            .ok_or_else(|| DbError::not_found("EmailAccount", account_id))?;
        self.transports.connect(&account).await
    }

    async fn pickup_directory(&self) -> ServiceResult<Option<&Path>> {
        let Some(dir) = self.settings.pickup_directory.as_deref() else {
            return Ok(None);
        };

        let is_dir = tokio::fs::metadata(dir)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(ServiceError::InvalidConfig(format!(
                "mail pickup directory does not exist: {}",
                dir.display()
            )));
        }
        Ok(Some(dir))
    }

    /// Builds the outgoing message of a queued mail, attachments loaded.
    ///
    /// Attachments without content are left out.
    pub async fn convert_email(&self, email: &QueuedEmail) -> ServiceResult<MailMessage> {
        let mut message = to_mail_message_with(email, parse_mail_address)?;

        for attachment in &email.attachments {
            match self.load_attachment_content(attachment).await? {
                Some(content) if !content.is_empty() => {
                    message.attachments.push(MailAttachment {
                        name: attachment.name.clone(),
                        mime_type: attachment.mime_type.clone(),
                        content,
                    });
                }
                _ => {
                    debug!(email_id = email.id, attachment = %attachment.name, "Attachment has no content, skipped");
                }
            }
        }

        Ok(message)
    }

    async fn load_attachment_content(
        &self,
        attachment: &QueuedEmailAttachment,
    ) -> ServiceResult<Option<Vec<u8>>> {
        match attachment.storage_location {
            EmailAttachmentStorageLocation::Blob => self.load_attachment_binary(attachment).await,
            EmailAttachmentStorageLocation::Path => {
                let Some(path) = attachment.path.as_deref().map(str::trim).filter(|p| !p.is_empty())
                else {
                    return Ok(None);
                };
                match tokio::fs::read(path).await {
                    Ok(bytes) => Ok(Some(bytes)),
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(e.into()),
                }
            }
            EmailAttachmentStorageLocation::FileReference => match &attachment.media_file {
                Some(file) => Ok(self.store.load_file_content(file.id()).await?),
                None => Ok(None),
            },
        }
    }

    /// Blob content of an attachment; `None` for other storage locations.
    pub async fn load_attachment_binary(
        &self,
        attachment: &QueuedEmailAttachment,
    ) -> ServiceResult<Option<Vec<u8>>> {
        if attachment.storage_location != EmailAttachmentStorageLocation::Blob {
            return Ok(None);
        }

        let data = match &attachment.media_storage {
            Some(storage) => match storage.value() {
                Some(bytes) => Some(bytes.clone()),
                None => self.store.load_storage(storage.id()).await?,
            },
            None => None,
        };
        Ok(Some(data.unwrap_or_default()))
    }

    /// Deletes mails that were sent or ran out of attempts.
    pub async fn delete_all_queued_mails(&self) -> ServiceResult<u64> {
        Ok(self.store.delete_sent_or_exhausted().await?)
    }
}

/// Writes the message as `<uuid>.eml` into `dir`.
async fn save_to_pickup_directory(message: &MailMessage, dir: &Path) -> ServiceResult<PathBuf> {
    let path = dir.join(format!("{}.eml", Uuid::new_v4().simple()));
    tokio::fs::write(&path, build_message(message)?.formatted()).await?;
    debug!(path = %path.display(), "E-mail written to pickup directory");
    Ok(path)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use mercato_core::media::MediaFile;
    use mercato_core::Reference;
    use mercato_db::{Database, DbConfig, DbResult};

    #[derive(Default)]
    struct FakeStore {
        accounts: HashMap<i64, EmailAccount>,
        storage: HashMap<i64, Vec<u8>>,
        files: HashMap<i64, Vec<u8>>,
        saved: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl MailQueueStore for FakeStore {
        async fn get_pending(&self, _limit: u32) -> DbResult<Vec<QueuedEmail>> {
            Ok(Vec::new())
        }

        async fn update_send_state(&self, emails: &[QueuedEmail]) -> DbResult<()> {
            self.saved.lock().unwrap().push(emails.len());
            Ok(())
        }

        async fn delete_sent_or_exhausted(&self) -> DbResult<u64> {
            Ok(0)
        }

        async fn get_email_account(&self, id: i64) -> DbResult<Option<EmailAccount>> {
            Ok(self.accounts.get(&id).cloned())
        }

        async fn load_storage(&self, storage_id: i64) -> DbResult<Option<Vec<u8>>> {
            Ok(self.storage.get(&storage_id).cloned())
        }

        async fn load_file_content(&self, file_id: i64) -> DbResult<Option<Vec<u8>>> {
            Ok(self.files.get(&file_id).cloned())
        }
    }

    /// Records sent subjects; refuses accounts on port 0 and subjects
    /// containing "fail".
    #[derive(Default)]
    struct FakeTransport {
        connects: AtomicUsize,
        sent: Arc<Mutex<Vec<(i64, String)>>>,
    }

    struct FakeClient {
        account_id: i64,
        sent: Arc<Mutex<Vec<(i64, String)>>>,
    }

    #[async_trait]
    impl MailTransportFactory for FakeTransport {
        async fn connect(&self, account: &EmailAccount) -> ServiceResult<Box<dyn MailClient>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if account.port == 0 {
                return Err(ServiceError::Mail("connection refused".into()));
            }
            Ok(Box::new(FakeClient {
                account_id: account.id,
                sent: self.sent.clone(),
            }))
        }
    }

    #[async_trait]
    impl MailClient for FakeClient {
        async fn send(&self, message: &MailMessage) -> ServiceResult<()> {
            if message.subject.contains("fail") {
                return Err(ServiceError::Mail("550 mailbox unavailable".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((self.account_id, message.subject.clone()));
            Ok(())
        }
    }

    fn account(id: i64, port: u16) -> EmailAccount {
        EmailAccount {
            id,
            email: format!("shop{id}@mercato.dev"),
            display_name: None,
            host: "smtp.mercato.dev".into(),
            port,
            username: None,
            password: None,
            enable_ssl: false,
        }
    }

    fn mail(id: i64, account_id: i64, subject: &str) -> QueuedEmail {
        QueuedEmail {
            id,
            priority: 0,
            from: "Mercato <shop@mercato.dev>".into(),
            to: "jane@example.com".into(),
            reply_to: None,
            cc: None,
            bcc: None,
            subject: subject.into(),
            body: "<p>Hello</p>".into(),
            created_on_utc: Utc::now(),
            sent_tries: 0,
            sent_on_utc: None,
            email_account_id: account_id,
            send_manually: false,
            attachments: Vec::new(),
        }
    }

    fn attachment(location: EmailAttachmentStorageLocation, name: &str) -> QueuedEmailAttachment {
        QueuedEmailAttachment {
            id: 0,
            queued_email_id: 1,
            storage_location: location,
            name: name.into(),
            mime_type: "application/octet-stream".into(),
            path: None,
            media_storage: None,
            media_file: None,
        }
    }

    fn store_with_accounts(accounts: &[EmailAccount]) -> FakeStore {
        FakeStore {
            accounts: accounts.iter().map(|a| (a.id, a.clone())).collect(),
            ..FakeStore::default()
        }
    }

    fn service(
        store: Arc<FakeStore>,
        transport: Arc<FakeTransport>,
        settings: EmailSettings,
    ) -> QueuedEmailService {
        QueuedEmailService::new(store, transport, settings)
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mercato-mail-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_send_mails_one_connection_per_account() {
        let store = Arc::new(store_with_accounts(&[account(1, 25), account(2, 25)]));
        let transport = Arc::new(FakeTransport::default());
        let mails = service(store.clone(), transport.clone(), EmailSettings::default());
        let (_tx, cancel) = watch::channel(false);

        let mut emails = vec![mail(1, 2, "a"), mail(2, 1, "b"), mail(3, 2, "c")];
        let sent = mails.send_mails(&mut emails, &cancel).await.unwrap();

        assert_eq!(sent, 3);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
        assert!(emails.iter().all(|e| e.is_sent() && e.sent_tries == 1));

        // sorted by account, input order kept within an account
        let order: Vec<i64> = emails.iter().map(|e| e.id).collect();
        assert_eq!(order, vec![2, 1, 3]);
        assert_eq!(*store.saved.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failed_mail_does_not_stop_batch() {
        let store = Arc::new(store_with_accounts(&[account(1, 25)]));
        let transport = Arc::new(FakeTransport::default());
        let mails = service(store, transport.clone(), EmailSettings::default());
        let (_tx, cancel) = watch::channel(false);

        let mut bad_address = mail(2, 1, "b");
        bad_address.to = "not-an-address".into();
        let mut emails = vec![mail(1, 1, "fail"), bad_address, mail(3, 1, "c")];

        let sent = mails.send_mails(&mut emails, &cancel).await.unwrap();

        assert_eq!(sent, 1);
        assert!(emails.iter().all(|e| e.sent_tries == 1));
        assert!(!emails[0].is_sent());
        assert!(!emails[1].is_sent());
        assert!(emails[2].is_sent());
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_state_saved_per_chunk() {
        let store = Arc::new(store_with_accounts(&[account(1, 25)]));
        let transport = Arc::new(FakeTransport::default());
        let mails = service(store.clone(), transport.clone(), EmailSettings::default());
        let (_tx, cancel) = watch::channel(false);

        let mut emails: Vec<QueuedEmail> = (1..=150).map(|id| mail(id, 1, "bulk")).collect();
        let sent = mails.send_mails(&mut emails, &cancel).await.unwrap();

        assert_eq!(sent, 150);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
        assert_eq!(*store.saved.lock().unwrap(), vec![MAIL_BATCH_SIZE, 50]);
    }

    #[tokio::test]
    async fn test_unreachable_account_is_skipped() {
        let store = Arc::new(store_with_accounts(&[account(1, 0), account(2, 25)]));
        let transport = Arc::new(FakeTransport::default());
        let mails = service(store.clone(), transport, EmailSettings::default());
        let (_tx, cancel) = watch::channel(false);

        // account 3 does not exist
        let mut emails = vec![mail(1, 1, "a"), mail(2, 2, "b"), mail(3, 3, "c")];
        let sent = mails.send_mails(&mut emails, &cancel).await.unwrap();

        assert_eq!(sent, 1);
        assert_eq!(emails[0].sent_tries, 0);
        assert_eq!(emails[1].sent_tries, 1);
        assert_eq!(emails[2].sent_tries, 0);
        assert_eq!(*store.saved.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let store = Arc::new(store_with_accounts(&[account(1, 25)]));
        let transport = Arc::new(FakeTransport::default());
        let mails = service(store, transport.clone(), EmailSettings::default());
        let (tx, cancel) = watch::channel(false);
        tx.send(true).unwrap();

        let mut emails = vec![mail(1, 1, "a")];
        let sent = mails.send_mails(&mut emails, &cancel).await.unwrap();

        assert_eq!(sent, 0);
        assert_eq!(emails[0].sent_tries, 0);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pickup_directory_writes_eml() {
        let dir = temp_dir();
        let store = Arc::new(FakeStore::default());
        let transport = Arc::new(FakeTransport::default());
        let settings = EmailSettings {
            pickup_directory: Some(dir.clone()),
            ..EmailSettings::default()
        };
        let mails = service(store, transport.clone(), settings);
        let (_tx, cancel) = watch::channel(false);

        let mut emails = vec![mail(1, 1, "Order #1001"), mail(2, 9, "Order #1002")];
        let sent = mails.send_mails(&mut emails, &cancel).await.unwrap();

        assert_eq!(sent, 2);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 0);

        let files: Vec<PathBuf> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| p.extension().unwrap() == "eml"));

        let eml = std::fs::read_to_string(&files[0]).unwrap();
        assert!(eml.contains("Subject: Order #100"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_missing_pickup_directory_is_config_error() {
        let settings = EmailSettings {
            pickup_directory: Some(std::env::temp_dir().join(format!("missing-{}", Uuid::new_v4()))),
            ..EmailSettings::default()
        };
        let mails = service(
            Arc::new(FakeStore::default()),
            Arc::new(FakeTransport::default()),
            settings,
        );
        let (_tx, cancel) = watch::channel(false);

        let err = mails
            .send_mails(&mut [mail(1, 1, "a")], &cancel)
            .await
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_convert_email_loads_attachments() {
        let dir = temp_dir();
        let terms = dir.join("terms.txt");
        std::fs::write(&terms, b"terms").unwrap();

        let store = Arc::new(FakeStore {
            storage: HashMap::from([(5, b"%PDF".to_vec())]),
            files: HashMap::from([(7, b"PNG".to_vec())]),
            ..FakeStore::default()
        });
        let mails = service(store, Arc::new(FakeTransport::default()), EmailSettings::default());

        let mut loaded_blob = attachment(EmailAttachmentStorageLocation::Blob, "a.bin");
        loaded_blob.media_storage = Some(Reference::loaded(4, b"inline".to_vec()));
        let mut stored_blob = attachment(EmailAttachmentStorageLocation::Blob, "invoice.pdf");
        stored_blob.media_storage = Some(Reference::unloaded(5));
        let mut empty_blob = attachment(EmailAttachmentStorageLocation::Blob, "empty.bin");
        empty_blob.media_storage = Some(Reference::unloaded(6));
        let mut on_disk = attachment(EmailAttachmentStorageLocation::Path, "terms.txt");
        on_disk.path = Some(terms.to_string_lossy().into_owned());
        let mut gone = attachment(EmailAttachmentStorageLocation::Path, "gone.txt");
        gone.path = Some(dir.join("gone.txt").to_string_lossy().into_owned());
        let mut media = attachment(EmailAttachmentStorageLocation::FileReference, "logo.png");
        media.media_file = Some(Reference::<MediaFile>::unloaded(7));

        let mut email = mail(1, 1, "Invoice\r\n#1");
        email.cc = Some("a@example.com; b@example.com".into());
        email.attachments = vec![loaded_blob, stored_blob, empty_blob, on_disk, gone, media];

        let message = mails.convert_email(&email).await.unwrap();

        assert_eq!(message.subject, "Invoice#1");
        assert_eq!(message.cc.len(), 2);
        let names: Vec<&str> = message.attachments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a.bin", "invoice.pdf", "terms.txt", "logo.png"]);
        assert_eq!(message.attachments[1].content, b"%PDF".to_vec());
        assert_eq!(message.attachments[2].content, b"terms".to_vec());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_load_attachment_binary() {
        let store = Arc::new(FakeStore {
            storage: HashMap::from([(5, b"%PDF".to_vec())]),
            ..FakeStore::default()
        });
        let mails = service(store, Arc::new(FakeTransport::default()), EmailSettings::default());

        let mut blob = attachment(EmailAttachmentStorageLocation::Blob, "invoice.pdf");
        blob.media_storage = Some(Reference::unloaded(5));
        assert_eq!(
            mails.load_attachment_binary(&blob).await.unwrap(),
            Some(b"%PDF".to_vec())
        );

        blob.media_storage = Some(Reference::unloaded(99));
        assert_eq!(mails.load_attachment_binary(&blob).await.unwrap(), Some(Vec::new()));

        let path = attachment(EmailAttachmentStorageLocation::Path, "terms.txt");
        assert_eq!(mails.load_attachment_binary(&path).await.unwrap(), None);
    }

    #[test]
    fn test_parse_mail_address_quoted_name() {
        let quoted = parse_mail_address(" \"Doe, Jane\" <jane@example.com> ").unwrap();
        assert_eq!(quoted.address, "jane@example.com");
        assert_eq!(quoted.display_name.as_deref(), Some("Doe, Jane"));

        let plain = parse_mail_address("jane@example.com").unwrap();
        assert!(plain.display_name.is_none());

        assert!(matches!(
            parse_mail_address("Jane <not-an-address>"),
            Err(ServiceError::Mail(_))
        ));

        // the name round-trips into the built message header
        let eml = String::from_utf8(
            build_message(&MailMessage {
                from: quoted.clone(),
                to: vec![plain],
                reply_to: Vec::new(),
                cc: Vec::new(),
                bcc: Vec::new(),
                subject: "Hi".into(),
                body: "<p>Hi</p>".into(),
                attachments: Vec::new(),
            })
            .unwrap()
            .formatted(),
        )
        .unwrap();
        let from = eml.lines().find(|l| l.starts_with("From: ")).unwrap();
        assert!(from.contains("Doe, Jane"));
        assert!(from.ends_with("<jane@example.com>"));
    }

    #[tokio::test]
    async fn test_convert_email_keeps_quoted_sender() {
        let mails = service(
            Arc::new(FakeStore::default()),
            Arc::new(FakeTransport::default()),
            EmailSettings::default(),
        );
        let mut email = mail(1, 1, "Hello");
        email.from = "\"Mercato; Shop\" <shop@mercato.dev>".into();

        let message = mails.convert_email(&email).await.unwrap();
        assert_eq!(message.from.display_name.as_deref(), Some("Mercato; Shop"));
        assert_eq!(message.from.address, "shop@mercato.dev");
    }

    #[test]
    fn test_build_message_with_attachment() {
        let message = MailMessage {
            from: MailAddress::parse("Mercato <shop@mercato.dev>").unwrap(),
            to: vec![MailAddress::parse("jane@example.com").unwrap()],
            reply_to: Vec::new(),
            cc: Vec::new(),
            bcc: vec![MailAddress::parse("audit@mercato.dev").unwrap()],
            subject: "Invoice".into(),
            body: "<p>Attached</p>".into(),
            attachments: vec![MailAttachment {
                name: "invoice.pdf".into(),
                mime_type: "not a mime type".into(),
                content: b"%PDF".to_vec(),
            }],
        };

        let eml = String::from_utf8(build_message(&message).unwrap().formatted()).unwrap();
        assert!(eml.contains("Subject: Invoice"));
        assert!(eml.contains("multipart/mixed"));
        assert!(eml.contains("invoice.pdf"));
        assert!(eml.contains("application/octet-stream"));
    }

    #[tokio::test]
    async fn test_process_queue_against_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let account = db.email_accounts().insert(&account(0, 25)).await.unwrap();
        for subject in ["Welcome", "fail"] {
            db.queued_emails()
                .insert(&mail(0, account.id, subject))
                .await
                .unwrap();
        }

        let transport = Arc::new(FakeTransport::default());
        let mails = QueuedEmailService::new(
            Arc::new(db.clone()),
            transport.clone(),
            EmailSettings::default(),
        );
        let (_tx, cancel) = watch::channel(false);

        assert_eq!(mails.process_queue(&cancel).await.unwrap(), 1);

        // the sent mail is deleted, the failed one waits for a retry
        let pending = db.queued_emails().get_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].subject, "fail");
        assert_eq!(pending[0].sent_tries, 1);
        assert_eq!(db.queued_emails().count().await.unwrap(), 1);
    }
}
