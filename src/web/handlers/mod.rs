//! API handlers for the FileVault HTTP API.

pub mod file;

pub use file::*;

use crate::file::FileService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// File store service.
    pub files: FileService,
}

impl AppState {
    /// Create a new application state.
    pub fn new(files: FileService) -> Self {
        Self { files }
    }
}
