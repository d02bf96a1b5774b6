//! FileVault - chunked file storage service
//!
//! Upload, list, search, rename, replace and download files stored as
//! chunked objects in SQLite, served over a JSON HTTP API.

pub mod config;
pub mod db;
pub mod error;
pub mod file;
pub mod logging;
pub mod web;

pub use config::Config;
pub use db::Database;
pub use error::{Result, VaultError};
pub use file::{
    FileId, FileService, ListQuery, ListResult, SortBy, SortOrder, StoredFile, UploadRequest,
    UploadedFile,
};
pub use web::WebServer;
