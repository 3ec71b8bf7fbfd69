use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum AppError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("Filesystem I/O error: {0}")]
    Io(String),
    #[error("JSON serialization error: {0}")]
    SerdeSerialize(String),
    #[error("JSON parsing error: {0}")]
    SerdeParse(String),
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("API response structure invalid: {0}")]
    ResponseInvalid(String),
    #[error("Local store error: {0}")]
    Store(String),
    #[error("Invalid argument provided: {0}")]
    Argument(String),
    #[error("Timeout during operation: {0}")]
    Timeout(String),
    #[error("Unexpected internal error: {0}")]
    Unexpected(String),
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::Timeout(e.to_string())
        } else {
            AppError::Http(e.to_string())
        }
    }
}
impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}
impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() || e.is_eof() || e.is_syntax() || e.is_data() {
            AppError::SerdeParse(e.to_string())
        } else {
            AppError::SerdeSerialize(e.to_string())
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn api<S: Into<String>>(status: u16, message: S) -> AppError {
        AppError::Api {
            status,
            message: message.into(),
        }
    }

    pub fn store<S: Into<String>>(message: S) -> AppError {
        AppError::Store(message.into())
    }
}
