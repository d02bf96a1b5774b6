//! Response DTOs for Web API.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::file::{format_timestamp, ListResult, StoredFile, UploadedFile};

// ============================================================================
// Generic Response Wrappers
// ============================================================================

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new API response.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

// ============================================================================
// File Responses
// ============================================================================

/// Stored file metadata.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResponse {
    pub id: String,
    pub filename: String,
    pub size: i64,
    pub mimetype: String,
    pub upload_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    pub hash: String,
    pub metadata: Map<String, Value>,
}

impl From<StoredFile> for FileResponse {
    fn from(file: StoredFile) -> Self {
        Self {
            id: file.id.to_string(),
            updated_at: file.updated_at().as_ref().map(format_timestamp),
            filename: file.filename,
            size: file.size,
            mimetype: file.mimetype,
            upload_date: format_timestamp(&file.upload_date),
            hash: file.content_hash,
            metadata: file.metadata,
        }
    }
}

/// Result of an upload or replace.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub id: String,
    pub filename: String,
    pub size: i64,
    pub mimetype: String,
    pub upload_date: String,
    /// True if an identical file was already stored under this name.
    pub deduplicated: bool,
}

impl From<UploadedFile> for UploadResponse {
    fn from(file: UploadedFile) -> Self {
        Self {
            id: file.id.to_string(),
            filename: file.filename,
            size: file.size,
            mimetype: file.mimetype,
            upload_date: format_timestamp(&file.upload_date),
            deduplicated: file.deduplicated,
        }
    }
}

/// File listing, tagged by pagination mode.
#[derive(Debug, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum FileListResponse {
    /// Offset pagination.
    Page {
        items: Vec<FileResponse>,
        total: i64,
        page: i64,
        limit: i64,
    },
    /// Cursor pagination.
    #[serde(rename_all = "camelCase")]
    Cursor {
        items: Vec<FileResponse>,
        next_cursor: Option<String>,
    },
}

impl From<ListResult> for FileListResponse {
    fn from(result: ListResult) -> Self {
        match result {
            ListResult::Page {
                items,
                total,
                page,
                limit,
            } => FileListResponse::Page {
                items: items.into_iter().map(FileResponse::from).collect(),
                total,
                page,
                limit,
            },
            ListResult::Cursor { items, next_cursor } => FileListResponse::Cursor {
                items: items.into_iter().map(FileResponse::from).collect(),
                next_cursor,
            },
        }
    }
}

/// Total file count.
#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

/// Acknowledgement of a delete.
#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub id: String,
    pub deleted: bool,
}
