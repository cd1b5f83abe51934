use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseError {
    /// Connection, pool or lock timeout, serialization failure, deadlock.
    Transient,
    /// Another transaction created the row this one planned to create.
    Conflict,
    ServerError,
}

impl DatabaseError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::Conflict)
    }
}

/// Classifies a sqlx error and logs it with `context`.
pub fn from_sqlx(context: &'static str) -> impl FnOnce(sqlx::Error) -> DatabaseError {
    move |e| {
        let kind = match &e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseError::Transient
            }
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some("40001") | Some("40P01") | Some("55P03") => DatabaseError::Transient,
                Some("23505") => DatabaseError::Conflict,
                _ => DatabaseError::ServerError,
            },
            _ => DatabaseError::ServerError,
        };
        tracing::error!("{} failed >>> {} ({:?})", context, e, kind);
        kind
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    Store(DatabaseError),
    TimedOut,
}

impl ProcessError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            Self::TimedOut => true,
        }
    }
}

impl From<DatabaseError> for ProcessError {
    fn from(value: DatabaseError) -> Self {
        Self::Store(value)
    }
}

#[derive(Debug)]
pub enum PlatformError {
    Request(String),
    Api(String),
}

impl From<reqwest::Error> for PlatformError {
    fn from(value: reqwest::Error) -> Self {
        Self::Request(value.to_string())
    }
}

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(e) => write!(f, "request failed: {}", e),
            Self::Api(e) => write!(f, "platform rejected call: {}", e),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    ServerError,
    Unavailable,
    AuthenticationError,
    BadRequest(&'static str),
    NotFound,
}

impl From<DatabaseError> for ApiError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::Transient | DatabaseError::Conflict => Self::Unavailable,
            DatabaseError::ServerError => Self::ServerError,
        }
    }
}

impl From<ProcessError> for ApiError {
    fn from(value: ProcessError) -> Self {
        if value.is_retryable() {
            Self::Unavailable
        } else {
            Self::ServerError
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message) = match self {
            Self::ServerError => (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong"),
            Self::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "Try again later"),
            Self::AuthenticationError => (StatusCode::UNAUTHORIZED, "Authentication failed"),
            Self::BadRequest(reason) => (StatusCode::BAD_REQUEST, reason),
            Self::NotFound => (StatusCode::NOT_FOUND, "Not found"),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}
