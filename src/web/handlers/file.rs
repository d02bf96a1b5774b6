//! File handlers for Web API.

use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
    Json,
};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::file::{keys, UploadRequest, DEFAULT_MIMETYPE};
use crate::web::dto::validation::{no_control_chars, sanitize_string};
use crate::web::dto::{
    ApiResponse, CountResponse, DeletedResponse, FileListResponse, FileResponse, ListFilesQuery,
    RenameRequest, UploadResponse, ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// Generate a safe Content-Disposition header value for file downloads.
///
/// This function sanitizes the filename to prevent header injection attacks
/// and uses RFC 5987 encoding for non-ASCII filenames.
///
/// # Security
///
/// The function:
/// - Removes control characters (including CR, LF which could cause header injection)
/// - Escapes double quotes and backslashes
/// - Uses RFC 5987 filename* parameter for proper Unicode support
fn content_disposition_header(filename: &str) -> String {
    // Sanitize filename for the basic filename parameter (ASCII fallback)
    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control()) // Remove control characters (CR, LF, etc.)
        .map(|c| match c {
            '"' => '_',  // Replace double quotes
            '\\' => '_', // Replace backslashes
            _ => c,
        })
        .collect();

    // For ASCII-only filenames, use simple format
    if filename.is_ascii() && !filename.chars().any(|c| c.is_control() || c == '"' || c == '\\') {
        return format!("attachment; filename=\"{}\"", filename);
    }

    // Use RFC 5987 encoding for non-ASCII or special characters
    let encoded = urlencoding::encode(filename);

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    )
}

fn multipart_error(e: MultipartError) -> ApiError {
    tracing::warn!("Failed to read multipart field: {}", e);
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large("Request body is too large")
    } else {
        ApiError::bad_request("Invalid multipart data")
    }
}

/// Read an upload form into an [`UploadRequest`].
///
/// Fields: `file` (required for a valid upload), `metadata` (JSON object),
/// `chatId`, `userId` and `description`. A missing file yields an empty
/// request, which the service rejects.
async fn read_upload_form(mut multipart: Multipart) -> Result<UploadRequest, ApiError> {
    let mut filename = String::new();
    let mut mimetype: Option<String> = None;
    let mut content: Vec<u8> = Vec::new();
    let mut metadata: Map<String, Value> = Map::new();
    let mut chat_id: Option<String> = None;
    let mut user_id: Option<String> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                filename = field.file_name().unwrap_or("").to_string();
                mimetype = field.content_type().map(|s| s.to_string());
                content = field.bytes().await.map_err(multipart_error)?.to_vec();
            }
            "metadata" => {
                let text = field.text().await.map_err(multipart_error)?;
                if !text.trim().is_empty() {
                    metadata = serde_json::from_str(&text).map_err(|_| {
                        ApiError::bad_request("metadata must be a JSON object")
                    })?;
                }
            }
            "chatId" => {
                chat_id = Some(field.text().await.map_err(multipart_error)?);
            }
            "userId" => {
                user_id = Some(field.text().await.map_err(multipart_error)?);
            }
            "description" => {
                description = Some(sanitize_string(
                    &field.text().await.map_err(multipart_error)?,
                ));
            }
            _ => {}
        }
    }

    let mimetype = mimetype.unwrap_or_else(|| DEFAULT_MIMETYPE.to_string());
    let mut request = UploadRequest::new(filename, mimetype, content).with_metadata(metadata);

    if let Some(chat_id) = chat_id.filter(|s| !s.trim().is_empty()) {
        request = request.with_chat_id(chat_id);
    }
    if let Some(user_id) = user_id.filter(|s| !s.trim().is_empty()) {
        request = request.with_user_id(user_id);
    }
    if let Some(description) = description.filter(|s| !s.trim().is_empty()) {
        request = request.with_field(keys::DESCRIPTION, description);
    }

    Ok(request)
}

/// POST /api/files - Upload a file.
///
/// Returns 201 for a new file, 200 when an identical file already existed.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<UploadResponse>>), ApiError> {
    let request = read_upload_form(multipart).await?;
    let uploaded = state.files.upload(&request).await?;

    let status = if uploaded.deduplicated {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((status, Json(ApiResponse::new(uploaded.into()))))
}

/// GET /api/files - List files.
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<ApiResponse<FileListResponse>>, ApiError> {
    let result = state.files.list_files(&query.into()).await?;
    Ok(Json(ApiResponse::new(result.into())))
}

/// GET /api/files/count - Total number of files.
pub async fn count_files(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<CountResponse>>, ApiError> {
    let count = state.files.get_file_count().await?;
    Ok(Json(ApiResponse::new(CountResponse { count })))
}

/// GET /api/files/:id - Get file metadata.
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<FileResponse>>, ApiError> {
    let file = state.files.get_file_info(&id).await?;
    Ok(Json(ApiResponse::new(file.into())))
}

/// GET /api/files/:id/download - Stream file content.
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response<Body>, ApiError> {
    let (stream, file) = state.files.get_file_stream(&id).await?;

    // Mimetypes are caller-declared and may not be valid header values
    let content_type = HeaderValue::from_str(&file.mimetype)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_MIMETYPE));

    let response = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(&file.filename),
        )
        .header(header::CONTENT_LENGTH, file.size)
        .body(Body::from_stream(stream.into_stream()))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })?;

    Ok(response)
}

/// PATCH /api/files/:id - Rename a file and/or patch its metadata.
pub async fn rename_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<RenameRequest>,
) -> Result<Json<ApiResponse<FileResponse>>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("missing rename target name"));
    }
    if let Some(ref filename) = body.filename {
        no_control_chars(filename)
            .map_err(|_| ApiError::bad_request("Filename must not contain control characters"))?;
    }

    let file = state
        .files
        .rename(&id, body.filename.as_deref(), body.metadata)
        .await?;

    Ok(Json(ApiResponse::new(file.into())))
}

/// PUT /api/files/:id - Replace a file's content.
pub async fn replace_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<UploadResponse>>, ApiError> {
    let request = read_upload_form(multipart).await?;
    let uploaded = state.files.replace(&id, &request).await?;
    Ok(Json(ApiResponse::new(uploaded.into())))
}

/// DELETE /api/files/:id - Delete a file.
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DeletedResponse>>, ApiError> {
    state.files.delete_file(&id).await?;
    Ok(Json(ApiResponse::new(DeletedResponse { id, deleted: true })))
}

/// GET /api/chats/:chat_id/files - All files of a chat, newest first.
pub async fn list_chat_files(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<FileResponse>>>, ApiError> {
    let files = state.files.get_files_by_chat_id(&chat_id).await?;
    Ok(Json(ApiResponse::new(
        files.into_iter().map(FileResponse::from).collect(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_header_simple_ascii() {
        let result = content_disposition_header("document.txt");
        assert_eq!(result, "attachment; filename=\"document.txt\"");
    }

    #[test]
    fn test_content_disposition_header_with_spaces() {
        let result = content_disposition_header("my document.txt");
        assert_eq!(result, "attachment; filename=\"my document.txt\"");
    }

    #[test]
    fn test_content_disposition_header_non_ascii() {
        let result = content_disposition_header("日本語ファイル.txt");
        assert!(result.starts_with("attachment; filename=\""));
        assert!(result.contains("filename*=UTF-8''"));
        assert!(result.contains("%E6%97%A5%E6%9C%AC%E8%AA%9E"));
    }

    #[test]
    fn test_content_disposition_header_double_quote() {
        let result = content_disposition_header("test\"file.txt");
        assert!(result.contains("filename=\"test_file.txt\""));
        assert!(result.contains("%22"));
    }

    #[test]
    fn test_content_disposition_header_control_characters() {
        // Header injection attempt
        let result = content_disposition_header("test\r\nX-Injected: bad.txt");
        assert!(!result.contains('\r'));
        assert!(!result.contains('\n'));
        assert!(result.starts_with("attachment; filename="));
    }
}
