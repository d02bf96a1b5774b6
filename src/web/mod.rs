//! Web API module for FileVault.
//!
//! This module provides the JSON HTTP API over the file store: multipart
//! uploads, listing, metadata updates and streamed downloads.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use router::create_router;
pub use server::WebServer;
