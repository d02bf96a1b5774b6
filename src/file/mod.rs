//! File storage module for FileVault.
//!
//! This module provides the file store including:
//! - A chunked object bucket on SQLite
//! - Typed query filters and sort keys
//! - Upload with content-hash deduplication
//! - Page and cursor listing, rename and replace

mod bucket;
mod filter;
mod metadata;
mod service;

pub use bucket::{Bucket, DownloadStream, FindOptions, UploadStream};
pub use filter::{escape_like, FileFilter, SortBy, SortOrder, SortValue};
pub use metadata::{
    content_hash, format_timestamp, keys, now, parse_timestamp, FileId, StoredFile,
    DEFAULT_MIMETYPE,
};
pub use service::{FileService, ListQuery, ListResult, UploadRequest, UploadedFile};

/// Default maximum file size (10MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default chunk size (255KB).
pub const DEFAULT_CHUNK_SIZE: usize = 255 * 1024;

/// Default number of items per listing page.
pub const DEFAULT_PAGE_SIZE: i64 = 50;
