//! File service for FileVault.
//!
//! This module provides high-level file operations including:
//! - Upload with validation and content-hash deduplication
//! - Streamed download and point lookup
//! - Filtered listing in page or cursor mode
//! - Metadata-only rename and full content replace

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::config::FilesConfig;
use crate::db::Database;
use crate::{Result, VaultError};

use super::bucket::{Bucket, DownloadStream, FindOptions};
use super::filter::{FileFilter, SortBy, SortOrder, SortValue};
use super::metadata::{content_hash, format_timestamp, keys, now, FileId, StoredFile};

/// Request data for an upload or replace.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// File content.
    pub content: Vec<u8>,
    /// Declared filename.
    pub filename: String,
    /// Declared content type.
    pub mimetype: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Owning chat.
    pub chat_id: Option<String>,
    /// Owning user.
    pub user_id: Option<String>,
    /// Caller annotations, merged over the service-written keys.
    pub metadata: Map<String, Value>,
}

impl UploadRequest {
    /// Create a new upload request; the declared size is the content length.
    pub fn new(filename: impl Into<String>, mimetype: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            size: content.len() as u64,
            content,
            filename: filename.into(),
            mimetype: mimetype.into(),
            chat_id: None,
            user_id: None,
            metadata: Map::new(),
        }
    }

    /// Override the declared size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Set the owning chat.
    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    /// Set the owning user.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Replace the caller metadata.
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add a single caller metadata field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Projection returned by upload and replace.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub id: FileId,
    pub filename: String,
    pub size: i64,
    pub mimetype: String,
    pub upload_date: DateTime<Utc>,
    /// True if an existing record with the same content and name was returned.
    pub deduplicated: bool,
}

impl UploadedFile {
    fn from_stored(file: StoredFile, deduplicated: bool) -> Self {
        Self {
            id: file.id,
            filename: file.filename,
            size: file.size,
            mimetype: file.mimetype,
            upload_date: file.upload_date,
            deduplicated,
        }
    }
}

/// Listing parameters.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Substring search over filename, original name and description.
    pub q: Option<String>,
    /// Exact mimetype.
    pub mimetype: Option<String>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    /// 1-based page number (page mode).
    pub page: Option<i64>,
    /// Id of the last item already seen (cursor mode).
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

/// Result of [`FileService::list_files`].
#[derive(Debug, Clone)]
pub enum ListResult {
    /// Offset page with the total matching count.
    Page {
        items: Vec<StoredFile>,
        total: i64,
        page: i64,
        limit: i64,
    },
    /// Keyset page; `next_cursor` is set when more items may follow.
    Cursor {
        items: Vec<StoredFile>,
        next_cursor: Option<String>,
    },
}

impl ListResult {
    /// Items in this page.
    pub fn items(&self) -> &[StoredFile] {
        match self {
            ListResult::Page { items, .. } | ListResult::Cursor { items, .. } => items,
        }
    }

    /// Take the items out of this page.
    pub fn into_items(self) -> Vec<StoredFile> {
        match self {
            ListResult::Page { items, .. } | ListResult::Cursor { items, .. } => items,
        }
    }
}

/// File service for managing stored files.
#[derive(Debug, Clone)]
pub struct FileService {
    bucket: Bucket,
    config: FilesConfig,
}

impl FileService {
    /// Create a new FileService over an open database.
    pub fn new(db: &Database, config: FilesConfig) -> Self {
        Self {
            bucket: Bucket::new(db.pool().clone(), config.chunk_size),
            config,
        }
    }

    /// Underlying bucket.
    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    /// Upload limits in effect.
    pub fn config(&self) -> &FilesConfig {
        &self.config
    }

    /// Upload a file.
    ///
    /// # Validation
    /// - Filename must be non-empty
    /// - Declared size must not exceed `max_file_size`
    /// - Mimetype must be in `accepted_types` when that list is non-empty
    ///
    /// If a file with the same content hash and filename exists, it is
    /// returned and nothing is written.
    pub async fn upload(&self, request: &UploadRequest) -> Result<UploadedFile> {
        self.validate(request)?;
        let mut metadata = request.metadata.clone();
        metadata.remove(keys::UPDATED_AT);
        self.store(request, metadata).await
    }

    fn validate(&self, request: &UploadRequest) -> Result<()> {
        if request.filename.is_empty() {
            return Err(VaultError::InvalidRequest("No file uploaded".to_string()));
        }

        if request.size > self.config.max_file_size {
            return Err(VaultError::InvalidRequest(format!(
                "File size exceeds the maximum limit of {} bytes",
                self.config.max_file_size
            )));
        }

        if !self.config.accepted_types.is_empty()
            && !self.config.accepted_types.contains(&request.mimetype)
        {
            return Err(VaultError::InvalidRequest(format!(
                "File type {} is not allowed",
                request.mimetype
            )));
        }

        Ok(())
    }

    async fn store(
        &self,
        request: &UploadRequest,
        caller_metadata: Map<String, Value>,
    ) -> Result<UploadedFile> {
        let hash = content_hash(&request.content);

        let duplicate = FileFilter::new()
            .hash(hash.as_str())
            .filename(request.filename.as_str());
        if let Some(existing) = self.bucket.find_one(&duplicate).await? {
            debug!(
                "Upload of {:?} matches existing file {}",
                request.filename, existing.id
            );
            return Ok(UploadedFile::from_stored(existing, true));
        }

        let mut metadata = Map::new();
        metadata.insert(keys::ORIGINAL_NAME.to_string(), json!(request.filename));
        metadata.insert(keys::MIMETYPE.to_string(), json!(request.mimetype));
        metadata.insert(keys::SIZE.to_string(), json!(request.size));
        metadata.insert(keys::HASH.to_string(), json!(hash));
        metadata.insert(keys::UPLOADED_AT.to_string(), json!(format_timestamp(&now())));
        if let Some(ref chat_id) = request.chat_id {
            metadata.insert(keys::CHAT_ID.to_string(), json!(chat_id));
        }
        if let Some(ref user_id) = request.user_id {
            metadata.insert(keys::USER_ID.to_string(), json!(user_id));
        }
        metadata.extend(caller_metadata);
        // Hash and mimetype always describe the stored bytes as validated
        metadata.insert(keys::HASH.to_string(), json!(hash));
        metadata.insert(keys::MIMETYPE.to_string(), json!(request.mimetype));

        let mut stream = self
            .bucket
            .open_upload_stream(&request.filename, metadata)
            .await?;

        if let Err(e) = stream.write(&request.content).await {
            if let Err(abort_err) = stream.abort().await {
                warn!("Failed to roll back upload: {}", abort_err);
            }
            return Err(e);
        }

        let file = stream.finish().await?;
        info!(
            "Stored file {} ({:?}, {} bytes)",
            file.id, file.filename, file.size
        );

        Ok(UploadedFile::from_stored(file, false))
    }

    /// Get file metadata by id.
    pub async fn get_file_info(&self, id: &str) -> Result<StoredFile> {
        let file_id = FileId::parse(id)?;
        self.bucket
            .find_by_id(file_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("file {id}")))
    }

    /// Open a chunk reader for a file along with its metadata.
    ///
    /// Every failure is reported as `NotFound`.
    pub async fn get_file_stream(&self, id: &str) -> Result<(DownloadStream, StoredFile)> {
        let not_found = || VaultError::NotFound(format!("file {id}"));

        let file = self.get_file_info(id).await.map_err(|_| not_found())?;
        let stream = self
            .bucket
            .open_download_stream(file.id)
            .await
            .map_err(|_| not_found())?;

        Ok((stream, file))
    }

    /// List files in page mode, or in cursor mode when a cursor is given.
    pub async fn list_files(&self, query: &ListQuery) -> Result<ListResult> {
        let max_limit = self.config.max_page_size.max(1);
        let limit = query
            .limit
            .unwrap_or(self.config.default_page_size)
            .clamp(1, max_limit);

        let mut filter = FileFilter::new();
        if let Some(ref q) = query.q {
            filter = filter.search(q);
        }
        if let Some(mimetype) = query.mimetype.as_deref().filter(|m| !m.is_empty()) {
            filter = filter.mimetype(mimetype);
        }

        let options = FindOptions::sorted(query.sort_by, query.sort_order).with_limit(limit);

        debug!(
            "Listing files: q={:?} mimetype={:?} sort={:?} {:?} limit={}",
            query.q, query.mimetype, query.sort_by, query.sort_order, limit
        );

        if let Some(cursor) = query.cursor.as_deref().filter(|c| !c.trim().is_empty()) {
            if let Some((value, cursor_id)) = self.resolve_cursor(cursor, query.sort_by).await? {
                filter = filter.after(
                    query.sort_by,
                    query.sort_order,
                    value,
                    cursor_id.to_string(),
                );
            }

            let items = self.bucket.find(&filter, &options).await?;
            let next_cursor = if items.len() as i64 == limit {
                items.last().map(|f| f.id.to_string())
            } else {
                None
            };

            return Ok(ListResult::Cursor { items, next_cursor });
        }

        let page = query.page.filter(|p| *p > 0).unwrap_or(1);
        let options = options.with_skip((page - 1).saturating_mul(limit));

        let (items, total) = tokio::join!(
            self.bucket.find(&filter, &options),
            self.bucket.count(&filter)
        );

        Ok(ListResult::Page {
            items: items?,
            total: total?,
            page,
            limit,
        })
    }

    /// Resolve a cursor id to its sort-key value.
    ///
    /// A malformed or vanished cursor resolves to `None`.
    async fn resolve_cursor(
        &self,
        cursor: &str,
        sort_by: SortBy,
    ) -> Result<Option<(SortValue, FileId)>> {
        let Ok(cursor_id) = FileId::parse(cursor) else {
            debug!("Ignoring malformed cursor {:?}", cursor);
            return Ok(None);
        };

        let value = self.bucket.sort_value(cursor_id, sort_by).await?;
        if value.is_none() {
            debug!("Ignoring cursor {} with no matching file", cursor_id);
        }
        Ok(value.map(|v| (v, cursor_id)))
    }

    /// Rename a file and/or merge a metadata patch into it.
    ///
    /// Content, size, hash, mimetype and id are never changed. `updatedAt` is always
    /// stamped; the filename changes only when a non-blank name is given.
    pub async fn rename(
        &self,
        id: &str,
        filename: Option<&str>,
        patch: Option<Map<String, Value>>,
    ) -> Result<StoredFile> {
        let file = self.get_file_info(id).await?;

        let mut metadata = file.metadata.clone();
        if let Some(patch) = patch {
            metadata.extend(patch);
        }
        for key in [keys::HASH, keys::MIMETYPE] {
            match file.metadata.get(key) {
                Some(value) => {
                    metadata.insert(key.to_string(), value.clone());
                }
                None => {
                    metadata.remove(key);
                }
            }
        }
        metadata.insert(keys::UPDATED_AT.to_string(), json!(format_timestamp(&now())));

        let new_name = filename.map(str::trim).filter(|name| !name.is_empty());

        if !self.bucket.update(file.id, new_name, &metadata).await? {
            return Err(VaultError::NotFound(format!("file {id}")));
        }
        info!("Updated file {} (rename: {:?})", file.id, new_name);

        self.bucket
            .find_by_id(file.id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("file {id}")))
    }

    /// Replace a file's content, producing a new record.
    ///
    /// The old record is deleted and a new one uploaded with the old
    /// metadata carried over, minus the keys describing the old content.
    /// The new record references the old id in `originalReplacedId`.
    pub async fn replace(&self, id: &str, request: &UploadRequest) -> Result<UploadedFile> {
        self.validate(request)?;
        let old = self.get_file_info(id).await?;

        if let Err(e) = self.bucket.delete(old.id).await {
            warn!("Failed to delete replaced file {}: {}", old.id, e);
        }

        let mut metadata = old.metadata;
        for key in keys::CONTENT {
            metadata.remove(*key);
        }
        if request.chat_id.is_some() {
            metadata.remove(keys::CHAT_ID);
        }
        if request.user_id.is_some() {
            metadata.remove(keys::USER_ID);
        }
        metadata.extend(request.metadata.clone());
        metadata.insert(
            keys::ORIGINAL_REPLACED_ID.to_string(),
            json!(old.id.to_string()),
        );
        metadata.insert(keys::UPDATED_AT.to_string(), json!(format_timestamp(&now())));

        let uploaded = self.store(request, metadata).await?;
        info!("Replaced file {} with {}", old.id, uploaded.id);

        Ok(uploaded)
    }

    /// Delete a file and its content.
    ///
    /// Any failure is reported as `NotFound`.
    pub async fn delete_file(&self, id: &str) -> Result<()> {
        let file_id = FileId::parse(id)?;

        self.bucket.delete(file_id).await.map_err(|e| {
            if !e.is_not_found() {
                warn!("Failed to delete file {}: {}", file_id, e);
            }
            VaultError::NotFound(format!("file {id}"))
        })?;

        info!("Deleted file {}", file_id);
        Ok(())
    }

    /// Total number of stored files.
    pub async fn get_file_count(&self) -> Result<i64> {
        self.bucket.count(&FileFilter::new()).await
    }

    /// All files owned by a chat, newest first.
    pub async fn get_files_by_chat_id(&self, chat_id: &str) -> Result<Vec<StoredFile>> {
        let filter = FileFilter::new().chat_id(chat_id);
        let options = FindOptions::sorted(SortBy::CreatedAt, SortOrder::Desc);
        self.bucket.find(&filter, &options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (Database, FileService) {
        setup_with(FilesConfig::default()).await
    }

    async fn setup_with(config: FilesConfig) -> (Database, FileService) {
        let db = Database::open_in_memory().await.unwrap();
        let service = FileService::new(&db, config);
        (db, service)
    }

    fn text(filename: &str, content: &str) -> UploadRequest {
        UploadRequest::new(filename, "text/plain", content.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_upload_success() {
        let (_db, service) = setup().await;

        let uploaded = service
            .upload(&text("hello.txt", "Hello, World!").with_chat_id("chat-1"))
            .await
            .unwrap();
        assert_eq!(uploaded.filename, "hello.txt");
        assert_eq!(uploaded.size, 13);
        assert_eq!(uploaded.mimetype, "text/plain");
        assert!(!uploaded.deduplicated);

        let file = service
            .get_file_info(&uploaded.id.to_string())
            .await
            .unwrap();
        assert_eq!(file.content_hash, content_hash(b"Hello, World!"));
        assert_eq!(file.metadata[keys::ORIGINAL_NAME], json!("hello.txt"));
        assert_eq!(file.metadata[keys::SIZE], json!(13));
        assert_eq!(file.chat_id(), Some("chat-1"));
        assert!(file.metadata.contains_key(keys::UPLOADED_AT));
        assert!(!file.metadata.contains_key(keys::USER_ID));
    }

    #[tokio::test]
    async fn test_upload_empty_filename() {
        let (_db, service) = setup().await;

        let err = service.upload(&text("", "data")).await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidRequest(ref m) if m == "No file uploaded"));
    }

    #[tokio::test]
    async fn test_upload_file_too_large() {
        let config = FilesConfig {
            max_file_size: 8,
            ..FilesConfig::default()
        };
        let (_db, service) = setup_with(config).await;

        let err = service
            .upload(&text("big.txt", "more than eight bytes"))
            .await
            .unwrap_err();
        match err {
            VaultError::InvalidRequest(msg) => assert!(msg.contains("8 bytes")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(service.bucket().chunk_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upload_checks_declared_size() {
        let config = FilesConfig {
            max_file_size: 100,
            ..FilesConfig::default()
        };
        let (_db, service) = setup_with(config).await;

        let err = service
            .upload(&text("small.txt", "tiny").with_size(101))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_upload_type_not_accepted() {
        let config = FilesConfig {
            accepted_types: vec!["image/png".to_string()],
            ..FilesConfig::default()
        };
        let (_db, service) = setup_with(config).await;

        let err = service.upload(&text("a.txt", "a")).await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidRequest(ref m) if m.contains("text/plain")));

        let png = UploadRequest::new("a.png", "image/png", vec![0x89, 0x50]);
        assert!(service.upload(&png).await.is_ok());
    }

    #[tokio::test]
    async fn test_upload_deduplicates_same_name_and_content() {
        let (_db, service) = setup().await;

        let first = service.upload(&text("a.txt", "same")).await.unwrap();
        let second = service.upload(&text("a.txt", "same")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(second.deduplicated);
        assert_eq!(service.get_file_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_caller_metadata_cannot_override_hash() {
        let (_db, service) = setup().await;

        let uploaded = service
            .upload(
                &text("a.txt", "content")
                    .with_field("hash", "forged")
                    .with_field("description", "notes"),
            )
            .await
            .unwrap();

        let file = service
            .get_file_info(&uploaded.id.to_string())
            .await
            .unwrap();
        assert_eq!(file.content_hash, content_hash(b"content"));
        assert_eq!(file.metadata[keys::DESCRIPTION], json!("notes"));
    }

    #[tokio::test]
    async fn test_caller_metadata_cannot_override_mimetype() {
        let config = FilesConfig {
            accepted_types: vec!["image/png".to_string()],
            ..FilesConfig::default()
        };
        let (_db, service) = setup_with(config).await;

        let request = UploadRequest::new("a.png", "image/png", vec![0x89, 0x50])
            .with_field("mimetype", "text/html");
        let uploaded = service.upload(&request).await.unwrap();
        assert_eq!(uploaded.mimetype, "image/png");

        let file = service
            .get_file_info(&uploaded.id.to_string())
            .await
            .unwrap();
        assert_eq!(file.mimetype, "image/png");
        assert_eq!(file.metadata[keys::MIMETYPE], json!("image/png"));
    }

    #[tokio::test]
    async fn test_caller_metadata_cannot_set_updated_at() {
        let (_db, service) = setup().await;

        let uploaded = service
            .upload(&text("a.txt", "a").with_field("updatedAt", 5))
            .await
            .unwrap();

        let file = service
            .get_file_info(&uploaded.id.to_string())
            .await
            .unwrap();
        assert!(!file.metadata.contains_key(keys::UPDATED_AT));
    }

    #[tokio::test]
    async fn test_get_file_stream() {
        let config = FilesConfig {
            chunk_size: 4,
            ..FilesConfig::default()
        };
        let (_db, service) = setup_with(config).await;
        let uploaded = service
            .upload(&text("stream.txt", "streamed content"))
            .await
            .unwrap();

        let (stream, file) = service
            .get_file_stream(&uploaded.id.to_string())
            .await
            .unwrap();
        assert_eq!(file.id, uploaded.id);
        assert_eq!(stream.read_to_end().await.unwrap(), b"streamed content");
    }

    #[tokio::test]
    async fn test_get_file_not_found() {
        let (_db, service) = setup().await;

        let missing = FileId::new().to_string();
        assert!(service.get_file_info(&missing).await.unwrap_err().is_not_found());
        assert!(service.get_file_info("garbage").await.unwrap_err().is_not_found());
        assert!(service
            .get_file_stream("garbage")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_rename_keeps_content() {
        let (_db, service) = setup().await;
        let uploaded = service.upload(&text("old.txt", "payload")).await.unwrap();
        let id = uploaded.id.to_string();

        let mut patch = Map::new();
        patch.insert("description".to_string(), json!("renamed"));
        patch.insert("hash".to_string(), json!("forged"));

        let renamed = service
            .rename(&id, Some("  new.txt  "), Some(patch))
            .await
            .unwrap();

        assert_eq!(renamed.id, uploaded.id);
        assert_eq!(renamed.filename, "new.txt");
        assert_eq!(renamed.size, uploaded.size);
        assert_eq!(renamed.content_hash, content_hash(b"payload"));
        assert_eq!(renamed.metadata[keys::DESCRIPTION], json!("renamed"));
        assert!(renamed.updated_at().is_some());
    }

    #[tokio::test]
    async fn test_rename_cannot_change_mimetype() {
        let (_db, service) = setup().await;
        let uploaded = service.upload(&text("a.txt", "a")).await.unwrap();

        let mut patch = Map::new();
        patch.insert("mimetype".to_string(), json!("application/x-msdownload"));
        patch.insert("updatedAt".to_string(), json!(5));

        let renamed = service
            .rename(&uploaded.id.to_string(), None, Some(patch))
            .await
            .unwrap();
        assert_eq!(renamed.mimetype, "text/plain");
        assert_eq!(renamed.metadata[keys::MIMETYPE], json!("text/plain"));
        assert!(renamed.metadata[keys::UPDATED_AT].is_string());
    }

    #[tokio::test]
    async fn test_rename_blank_name_keeps_filename() {
        let (_db, service) = setup().await;
        let uploaded = service.upload(&text("keep.txt", "x")).await.unwrap();

        let renamed = service
            .rename(&uploaded.id.to_string(), Some("   "), None)
            .await
            .unwrap();
        assert_eq!(renamed.filename, "keep.txt");
        assert!(renamed.updated_at().is_some());
    }

    #[tokio::test]
    async fn test_rename_not_found() {
        let (_db, service) = setup().await;
        let err = service
            .rename(&FileId::new().to_string(), Some("x.txt"), None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_replace_merges_metadata() {
        let (_db, service) = setup().await;
        let original = service
            .upload(
                &text("v1.txt", "version one")
                    .with_chat_id("chat-1")
                    .with_user_id("user-1")
                    .with_field("description", "first"),
            )
            .await
            .unwrap();
        let old_id = original.id.to_string();

        let replaced = service
            .replace(
                &old_id,
                &UploadRequest::new("v2.md", "text/markdown", b"version two".to_vec())
                    .with_user_id("user-2"),
            )
            .await
            .unwrap();

        assert_ne!(replaced.id, original.id);
        assert!(service.get_file_info(&old_id).await.unwrap_err().is_not_found());

        let file = service
            .get_file_info(&replaced.id.to_string())
            .await
            .unwrap();
        assert_eq!(file.filename, "v2.md");
        assert_eq!(file.mimetype, "text/markdown");
        assert_eq!(file.content_hash, content_hash(b"version two"));
        assert_eq!(file.metadata[keys::ORIGINAL_NAME], json!("v2.md"));
        assert_eq!(file.metadata[keys::ORIGINAL_REPLACED_ID], json!(old_id));
        assert_eq!(file.metadata[keys::DESCRIPTION], json!("first"));
        assert_eq!(file.chat_id(), Some("chat-1"));
        assert_eq!(file.metadata[keys::USER_ID], json!("user-2"));
        assert!(file.updated_at().is_some());
        assert_eq!(service.get_file_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replace_validates_before_deleting() {
        let config = FilesConfig {
            max_file_size: 10,
            ..FilesConfig::default()
        };
        let (_db, service) = setup_with(config).await;
        let original = service.upload(&text("a.txt", "small")).await.unwrap();

        let err = service
            .replace(
                &original.id.to_string(),
                &text("a.txt", "far too large for the limit"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::InvalidRequest(_)));
        assert!(service
            .get_file_info(&original.id.to_string())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_replace_proceeds_when_delete_fails() {
        let (db, service) = setup().await;
        let original = service.upload(&text("v1.txt", "one")).await.unwrap();
        let old_id = original.id.to_string();

        sqlx::query(
            "CREATE TRIGGER keep_files BEFORE DELETE ON files
             BEGIN SELECT RAISE(ABORT, 'delete blocked'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let replaced = service
            .replace(&old_id, &text("v2.txt", "two"))
            .await
            .unwrap();
        assert_ne!(replaced.id, original.id);

        let file = service
            .get_file_info(&replaced.id.to_string())
            .await
            .unwrap();
        assert_eq!(file.metadata[keys::ORIGINAL_REPLACED_ID], json!(old_id));
        assert!(service.get_file_info(&old_id).await.is_ok());
        assert_eq!(service.get_file_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_replace_not_found() {
        let (_db, service) = setup().await;
        let err = service
            .replace(&FileId::new().to_string(), &text("a.txt", "a"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_file() {
        let (_db, service) = setup().await;
        let uploaded = service.upload(&text("gone.txt", "bye")).await.unwrap();
        let id = uploaded.id.to_string();

        service.delete_file(&id).await.unwrap();
        assert_eq!(service.get_file_count().await.unwrap(), 0);
        assert_eq!(service.bucket().chunk_count().await.unwrap(), 0);

        assert!(service.delete_file(&id).await.unwrap_err().is_not_found());
        assert!(service.delete_file("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_page_mode() {
        let (_db, service) = setup().await;
        for i in 0..5 {
            service
                .upload(&text(&format!("file{i}.txt"), &"x".repeat(i + 1)))
                .await
                .unwrap();
        }

        let query = ListQuery {
            sort_by: SortBy::Size,
            sort_order: SortOrder::Asc,
            page: Some(2),
            limit: Some(2),
            ..ListQuery::default()
        };
        match service.list_files(&query).await.unwrap() {
            ListResult::Page {
                items,
                total,
                page,
                limit,
            } => {
                assert_eq!(total, 5);
                assert_eq!(page, 2);
                assert_eq!(limit, 2);
                let sizes: Vec<i64> = items.iter().map(|f| f.size).collect();
                assert_eq!(sizes, vec![3, 4]);
            }
            other => panic!("expected page result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_limit_is_clamped() {
        let config = FilesConfig {
            max_page_size: 3,
            ..FilesConfig::default()
        };
        let (_db, service) = setup_with(config).await;
        for i in 0..4 {
            service
                .upload(&text(&format!("f{i}.txt"), &i.to_string()))
                .await
                .unwrap();
        }

        let query = ListQuery {
            limit: Some(100),
            page: Some(0),
            ..ListQuery::default()
        };
        match service.list_files(&query).await.unwrap() {
            ListResult::Page {
                items, page, limit, ..
            } => {
                assert_eq!(page, 1);
                assert_eq!(limit, 3);
                assert_eq!(items.len(), 3);
            }
            other => panic!("expected page result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_search_is_literal() {
        let (_db, service) = setup().await;
        service.upload(&text("100%_done.txt", "a")).await.unwrap();
        service.upload(&text("100xxdone.txt", "b")).await.unwrap();

        let query = ListQuery {
            q: Some("0%_d".to_string()),
            ..ListQuery::default()
        };
        let items = service.list_files(&query).await.unwrap().into_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].filename, "100%_done.txt");
    }

    #[tokio::test]
    async fn test_get_files_by_chat_id() {
        let (_db, service) = setup().await;
        let first = service
            .upload(&text("a.txt", "a").with_chat_id("chat-1"))
            .await
            .unwrap();
        let second = service
            .upload(&text("b.txt", "b").with_chat_id("chat-1"))
            .await
            .unwrap();
        service
            .upload(&text("c.txt", "c").with_chat_id("chat-2"))
            .await
            .unwrap();

        let files = service.get_files_by_chat_id("chat-1").await.unwrap();
        assert_eq!(files.len(), 2);
        let ids: Vec<FileId> = files.iter().map(|f| f.id).collect();
        assert!(ids.contains(&first.id));
        assert!(ids.contains(&second.id));
        assert!(files[0].upload_date >= files[1].upload_date);

        assert!(service
            .get_files_by_chat_id("nobody")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_upload_request_builder() {
        let request = UploadRequest::new("a.bin", "application/octet-stream", vec![1, 2, 3])
            .with_chat_id("c")
            .with_user_id("u")
            .with_field("k", "v");

        assert_eq!(request.size, 3);
        assert_eq!(request.chat_id.as_deref(), Some("c"));
        assert_eq!(request.user_id.as_deref(), Some("u"));
        assert_eq!(request.metadata["k"], json!("v"));
    }
}
