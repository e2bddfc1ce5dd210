use common::RemoteError;
use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum DriveApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid field {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

impl From<DriveApiError> for RemoteError {
    fn from(err: DriveApiError) -> Self {
        match err {
            DriveApiError::HttpStatus(status, message) if status == StatusCode::NOT_FOUND => {
                RemoteError::NotFound(message)
            }
            DriveApiError::HttpStatus(status, message) => RemoteError::Status {
                status: status.as_u16(),
                message,
            },
            DriveApiError::Http(e) if e.is_decode() => RemoteError::Decode(e.to_string()),
            DriveApiError::Http(e) => RemoteError::Transport(e.to_string()),
            DriveApiError::Url(e) => RemoteError::Transport(e.to_string()),
            DriveApiError::Json(e) => RemoteError::Decode(e.to_string()),
            e @ DriveApiError::InvalidField { .. } => RemoteError::Decode(e.to_string()),
        }
    }
}
