use thiserror::Error;

use unifex_core::ExtractError;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("missing credential {0}")]
    MissingCredential(&'static str),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Azure returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("analyze response carried no operation-location header")]
    MissingOperationLocation,
    #[error("analysis failed: {0}")]
    Analysis(String),
    #[error("analysis still running after {0} polls")]
    Timeout(u32),
    #[error("cannot parse Azure response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<AzureError> for ExtractError {
    fn from(e: AzureError) -> Self {
        match e {
            AzureError::MissingCredential(name) => {
                ExtractError::BackendInit(format!("missing credential {name}"))
            }
            other => ExtractError::page(0, other.to_string()),
        }
    }
}
