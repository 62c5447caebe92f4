use thiserror::Error;

use unifex_core::ExtractError;

#[derive(Error, Debug)]
pub enum GoogleError {
    #[error("missing credential {0}")]
    MissingCredential(&'static str),
    #[error("invalid processor name '{0}' (expected projects/<project>/locations/<location>/processors/<id>)")]
    InvalidProcessorName(String),
    #[error("unusable credentials file: {0}")]
    Credentials(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Google returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("token exchange failed: {0}")]
    Token(String),
    #[error("process response carried no document")]
    MissingDocument,
    #[error("cannot parse Google response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<GoogleError> for ExtractError {
    fn from(e: GoogleError) -> Self {
        match e {
            setup @ (GoogleError::MissingCredential(_)
            | GoogleError::InvalidProcessorName(_)
            | GoogleError::Credentials(_)) => ExtractError::BackendInit(setup.to_string()),
            other => ExtractError::page(0, other.to_string()),
        }
    }
}
