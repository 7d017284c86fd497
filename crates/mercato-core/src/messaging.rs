//! # Messaging Types
//!
//! Queued e-mails as persisted, and the transport-neutral [`MailMessage`]
//! they are converted into before sending.
//!
//! ## Lifecycle of a Queued E-mail
//! ```text
//!   queued ──► send attempt ──► sent_tries += 1
//!                   │
//!          ┌────────┴────────┐
//!          ▼                 ▼
//!       success           failure
//!   sent_on_utc = now   (retried until MAX_SEND_TRIES)
//!          │                 │
//!          └──────┬──────────┘
//!                 ▼
//!   delete_all_queued_mails() removes sent or exhausted mails
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::media::MediaFile;
use crate::types::Reference;
use crate::validation::{validate_email_address, ValidationResult};

/// Attempts after which a mail is no longer picked up.
pub const MAX_SEND_TRIES: i32 = 3;

/// Mails per send chunk; state is saved after every chunk.
pub const MAIL_BATCH_SIZE: usize = 100;

// =============================================================================
// Persisted Types
// =============================================================================

/// Where an attachment's content lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum EmailAttachmentStorageLocation {
    /// Bytes stored in the database.
    Blob,
    /// A file on disk.
    Path,
    /// A media file.
    FileReference,
}

/// An attachment of a queued e-mail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedEmailAttachment {
    pub id: i64,
    pub queued_email_id: i64,
    pub storage_location: EmailAttachmentStorageLocation,
    pub name: String,
    pub mime_type: String,
    /// For [`EmailAttachmentStorageLocation::Path`].
    pub path: Option<String>,
    /// For [`EmailAttachmentStorageLocation::Blob`].
    pub media_storage: Option<Reference<Vec<u8>>>,
    /// For [`EmailAttachmentStorageLocation::FileReference`].
    pub media_file: Option<Reference<MediaFile>>,
}

/// An SMTP account mails are sent through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAccount {
    pub id: i64,
    pub email: String,
    pub display_name: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub enable_ssl: bool,
}

/// An e-mail waiting to be sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedEmail {
    pub id: i64,
    pub priority: i32,
    /// Sender, `addr` or `Name <addr>`.
    pub from: String,
    pub to: String,
    pub reply_to: Option<String>,
    /// `;`-separated.
    pub cc: Option<String>,
    /// `;`-separated.
    pub bcc: Option<String>,
    pub subject: String,
    pub body: String,
    pub created_on_utc: DateTime<Utc>,
    pub sent_tries: i32,
    pub sent_on_utc: Option<DateTime<Utc>>,
    pub email_account_id: i64,
    pub send_manually: bool,
    #[serde(default)]
    pub attachments: Vec<QueuedEmailAttachment>,
}

impl QueuedEmail {
    pub fn is_sent(&self) -> bool {
        self.sent_on_utc.is_some()
    }

    /// Sent, or out of attempts.
    pub fn is_deletable(&self) -> bool {
        self.is_sent() || self.sent_tries >= MAX_SEND_TRIES
    }
}

// =============================================================================
// Outgoing Message
// =============================================================================

/// A single mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailAddress {
    pub address: String,
    pub display_name: Option<String>,
}

impl MailAddress {
    /// Parses `addr` or `Display Name <addr>`.
    ///
    /// ## Example
    /// ```rust
    /// use mercato_core::messaging::MailAddress;
    ///
    /// let a = MailAddress::parse("Shop <shop@example.com>").unwrap();
    /// assert_eq!(a.address, "shop@example.com");
    /// assert_eq!(a.display_name.as_deref(), Some("Shop"));
    /// ```
    pub fn parse(value: &str) -> ValidationResult<Self> {
        let value = value.trim();

        let (display_name, address) = match (value.rfind('<'), value.ends_with('>')) {
            (Some(open), true) => {
                let name = value[..open].trim().trim_matches('"').trim();
                let addr = value[open + 1..value.len() - 1].trim();
                ((!name.is_empty()).then(|| name.to_string()), addr)
            }
            _ => (None, value),
        };

        validate_email_address(address)?;

        Ok(MailAddress {
            address: address.to_string(),
            display_name,
        })
    }
}

impl std::fmt::Display for MailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.display_name {
            Some(name) => write!(f, "{} <{}>", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// An attachment with its content loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

/// A message ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: MailAddress,
    pub to: Vec<MailAddress>,
    pub reply_to: Vec<MailAddress>,
    pub cc: Vec<MailAddress>,
    pub bcc: Vec<MailAddress>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<MailAttachment>,
}

// =============================================================================
// Helpers
// =============================================================================

/// Removes line breaks from a subject line.
pub fn sanitize_subject(subject: &str) -> String {
    subject.replace(['\r', '\n'], "")
}

/// Parses a `;`-separated address list, skipping blank entries.
///
/// ## Errors
/// The first entry that is not an e-mail address.
pub fn parse_address_list(addresses: Option<&str>) -> ValidationResult<Vec<MailAddress>> {
    parse_address_list_with(addresses, MailAddress::parse)
}

fn parse_address_list_with<E>(
    addresses: Option<&str>,
    parse: impl Fn(&str) -> Result<MailAddress, E>,
) -> Result<Vec<MailAddress>, E> {
    addresses
        .unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(parse)
        .collect()
}

/// Builds a message without attachments from a queued e-mail.
pub fn to_mail_message(email: &QueuedEmail) -> Result<MailMessage, ValidationError> {
    to_mail_message_with(email, MailAddress::parse)
}

/// [`to_mail_message`] with the address parser of a transport.
pub fn to_mail_message_with<E>(
    email: &QueuedEmail,
    parse: impl Fn(&str) -> Result<MailAddress, E>,
) -> Result<MailMessage, E> {
    let reply_to = match email.reply_to.as_deref().map(str::trim) {
        Some(r) if !r.is_empty() => vec![parse(r)?],
        _ => Vec::new(),
    };

    Ok(MailMessage {
        from: parse(&email.from)?,
        to: vec![parse(&email.to)?],
        reply_to,
        cc: parse_address_list_with(email.cc.as_deref(), &parse)?,
        bcc: parse_address_list_with(email.bcc.as_deref(), &parse)?,
        subject: sanitize_subject(&email.subject),
        body: email.body.clone(),
        attachments: Vec::new(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
