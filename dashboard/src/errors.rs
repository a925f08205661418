use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("No site selected")]
    NoSiteSelected,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Network or credential failures the UI shows as a banner.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Error::Unauthenticated | Error::Auth(_) => true,
            Error::Status { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
