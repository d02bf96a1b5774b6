//! Stored file types for the FileVault bucket.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{Result, VaultError};

/// Metadata keys written by the service.
pub mod keys {
    /// Filename as declared at upload time.
    pub const ORIGINAL_NAME: &str = "originalName";
    /// Declared content type.
    pub const MIMETYPE: &str = "mimetype";
    /// Declared size in bytes.
    pub const SIZE: &str = "size";
    /// Hex SHA-256 of the content.
    pub const HASH: &str = "hash";
    /// Upload timestamp.
    pub const UPLOADED_AT: &str = "uploadedAt";
    /// Owning chat.
    pub const CHAT_ID: &str = "chatId";
    /// Owning user.
    pub const USER_ID: &str = "userId";
    /// Free-text description (searched by listings).
    pub const DESCRIPTION: &str = "description";
    /// Stamped by rename and replace.
    pub const UPDATED_AT: &str = "updatedAt";
    /// Id of the record a replace superseded.
    pub const ORIGINAL_REPLACED_ID: &str = "originalReplacedId";

    /// Keys describing the stored bytes; a replace never inherits them.
    pub const CONTENT: &[&str] = &[ORIGINAL_NAME, MIMETYPE, SIZE, HASH, UPLOADED_AT];
}

/// Fallback content type when a record carries none.
pub const DEFAULT_MIMETYPE: &str = "application/octet-stream";

/// Identifier assigned by the bucket when a file is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(Uuid);

impl FileId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an identifier supplied by a caller.
    ///
    /// A malformed id can never resolve to a record, so it fails with
    /// `NotFound` rather than a validation error.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| VaultError::NotFound(format!("file {s}")))
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for FileId {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// One logical file: the metadata document of a bucket entry.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    /// Bucket-assigned id.
    pub id: FileId,
    /// Display name.
    pub filename: String,
    /// Byte length of the stored content.
    pub size: i64,
    /// Declared content type.
    pub mimetype: String,
    /// When the record was created.
    pub upload_date: DateTime<Utc>,
    /// Hex SHA-256 of the content, computed at upload.
    pub content_hash: String,
    /// Open-ended annotations.
    pub metadata: Map<String, Value>,
}

impl StoredFile {
    /// Owning chat, if the record carries one.
    pub fn chat_id(&self) -> Option<&str> {
        self.metadata.get(keys::CHAT_ID).and_then(Value::as_str)
    }

    /// Last rename/replace time, if any.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.metadata
            .get(keys::UPDATED_AT)
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
    }
}

/// Raw `files` row.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FileRow {
    pub id: String,
    pub filename: String,
    pub length: i64,
    pub upload_date: String,
    pub metadata: String,
}

impl TryFrom<FileRow> for StoredFile {
    type Error = VaultError;

    fn try_from(row: FileRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id)
            .map(FileId)
            .map_err(|e| VaultError::Database(format!("invalid file id {:?}: {e}", row.id)))?;
        let upload_date = parse_timestamp(&row.upload_date).ok_or_else(|| {
            VaultError::Database(format!("invalid upload_date {:?}", row.upload_date))
        })?;
        let metadata = match serde_json::from_str::<Value>(&row.metadata)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let mimetype = metadata
            .get(keys::MIMETYPE)
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_MIMETYPE)
            .to_string();
        let content_hash = metadata
            .get(keys::HASH)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            id,
            filename: row.filename,
            size: row.length,
            mimetype,
            upload_date,
            content_hash,
            metadata,
        })
    }
}

/// Current time at the precision timestamps are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Format a timestamp for storage.
///
/// Fixed microsecond precision keeps lexical and chronological order equal.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored RFC 3339 timestamp.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Lowercase hex SHA-256 of `content`.
pub fn content_hash(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}
