//! Error taxonomy shared by the translator, the pagination links and the
//! backend client.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    /// The request breaks a structural requirement of the active dialect.
    #[error("invalid query parameter: {0}")]
    InvalidQueryParameter(String),
    /// The requested collection does not exist in the backend.
    #[error("not found: {0}")]
    NotFound(String),
    /// The backend answered with something we cannot interpret.
    #[error("backend error: {0}")]
    Backend(String),
}

impl SearchError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        SearchError::InvalidQueryParameter(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        SearchError::Backend(msg.into())
    }

    /// Short machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            SearchError::InvalidQueryParameter(_) => "BadRequest",
            SearchError::NotFound(_) => "NotFound",
            SearchError::Backend(_) => "BackendError",
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        SearchError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Backend(format!("malformed backend response: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
