//! Validation utilities for Web API DTOs.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::web::error::ApiError;

/// A JSON extractor that validates the request body.
///
/// This extractor deserializes the request body as JSON and then validates it
/// using the `validator` crate. If validation fails, it returns a detailed
/// error response with field-level error information.
///
/// # Example
///
/// ```ignore
/// use filevault::web::dto::ValidatedJson;
///
/// async fn rename_file(
///     ValidatedJson(payload): ValidatedJson<RenameRequest>,
/// ) -> Result<Json<FileResponse>, ApiError> {
///     // payload is already validated
///     // ...
/// }
/// ```
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        // First, extract the JSON body
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e)))?;

        // Then, validate the deserialized value
        value.validate().map_err(ApiError::from_validation_errors)?;

        Ok(ValidatedJson(value))
    }
}

/// Validate that a string does not contain control characters or NULL bytes.
pub fn no_control_chars(value: &str) -> Result<(), validator::ValidationError> {
    if value.chars().any(char::is_control) {
        return Err(validator::ValidationError::new("no_control_chars")
            .with_message("Must not contain control characters".into()));
    }
    Ok(())
}

/// Sanitize a string by removing control characters except newlines, carriage returns, and tabs.
pub fn sanitize_string(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\r' || *c == '\t')
        .collect()
}
