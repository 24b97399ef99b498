//! Error types for the photo_fetch crate.

use reqwest::Response;
use thiserror::Error;

use crate::models::ApiErrorResponse;

/// Errors that can occur when talking to Google Photos.
#[derive(Error, Debug)]
pub enum PhotosError {
    #[error("Authorization failed: {0}")]
    AuthorizationError(String),

    #[error("File I/O failed: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Token refresh failed: {0}")]
    TokenRefreshError(String),

    #[error("OAuth callback state did not match the authorization request")]
    StateMismatch,

    #[error("Credentials file has neither an \"installed\" nor a \"web\" client")]
    MissingClientSecrets,

    #[error("Picker session {session_id} timed out before media was selected")]
    PickerTimeout { session_id: String },

    #[error("Picker session {session_id} expired before media was selected")]
    SessionExpired { session_id: String },

    #[error("Invalid media filename: {0:?}")]
    InvalidFilename(String),

    #[error("Invalid duration: {0:?}")]
    InvalidDuration(String),
}

/// Result type alias for PhotosError.
pub type Result<T> = std::result::Result<T, PhotosError>;

/// Pass a successful response through, or turn it into an `ApiError`.
///
/// Google wraps errors as `{"error": {"code": .., "message": ..}}`; when the
/// body has that shape its code and message win over the raw status.
pub(crate) async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
        return Err(PhotosError::ApiError {
            status: api_error.error.code,
            message: api_error.error.message,
        });
    }
    Err(PhotosError::ApiError {
        status: status.as_u16(),
        message: error_body,
    })
}
