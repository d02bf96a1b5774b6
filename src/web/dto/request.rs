//! Request DTOs for Web API.

use serde::Deserialize;
use serde_json::{Map, Value};
use validator::Validate;

use crate::file::{ListQuery, SortBy, SortOrder};

/// Query parameters for `GET /api/files`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesQuery {
    /// Substring search over filename, original name and description.
    pub q: Option<String>,
    /// Exact mimetype.
    pub mimetype: Option<String>,
    /// Sort key (`size`, `createdAt`, `updatedAt`).
    #[serde(default)]
    pub sort_by: SortBy,
    /// Sort direction (`asc`, `desc`).
    #[serde(default)]
    pub sort_order: SortOrder,
    /// Page number (1-based).
    pub page: Option<i64>,
    /// Id of the last item of the previous page.
    pub cursor: Option<String>,
    /// Items per page.
    pub limit: Option<i64>,
}

impl From<ListFilesQuery> for ListQuery {
    fn from(query: ListFilesQuery) -> Self {
        ListQuery {
            q: query.q,
            mimetype: query.mimetype,
            sort_by: query.sort_by,
            sort_order: query.sort_order,
            page: query.page,
            cursor: query.cursor,
            limit: query.limit,
        }
    }
}

/// Body of `PATCH /api/files/:id`.
#[derive(Debug, Deserialize, Validate)]
pub struct RenameRequest {
    /// New display name.
    #[validate(length(min = 1, max = 255, message = "Filename must be 1-255 characters"))]
    pub filename: Option<String>,
    /// Metadata patch merged over the existing metadata.
    pub metadata: Option<Map<String, Value>>,
}

impl RenameRequest {
    /// True if the request names neither a new filename nor a metadata patch.
    pub fn is_empty(&self) -> bool {
        self.filename
            .as_deref()
            .map_or(true, |name| name.trim().is_empty())
            && self.metadata.is_none()
    }
}
