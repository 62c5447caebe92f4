use std::path::Path;
use std::time::Duration;

use base64::Engine;
use serde::Deserialize;

use unifex_core::ExtractorOptions;

use crate::auth::Credentials;
use crate::error::GoogleError;
use crate::response::Document;

pub const PROCESSOR_NAME_ENV: &str = "GOOGLE_DOCAI_PROCESSOR_NAME";
pub const CREDENTIALS_PATH_ENV: &str = "GOOGLE_DOCAI_CREDENTIALS_PATH";
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_DOCAI_ACCESS_TOKEN";
/// Overrides the regional `https://<location>-documentai.googleapis.com`.
pub const ENDPOINT_ENV: &str = "GOOGLE_DOCAI_ENDPOINT";

#[derive(Deserialize)]
struct ProcessResponse {
    document: Option<Document>,
}

/// Blocking client for the Document AI `:process` method.
#[derive(Clone)]
pub struct GoogleClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    processor_name: String,
    credentials: Credentials,
}

impl std::fmt::Debug for GoogleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleClient")
            .field("endpoint", &self.endpoint)
            .field("processor_name", &self.processor_name)
            .finish_non_exhaustive()
    }
}

/// The `<location>` segment of a processor resource name.
fn processor_location(name: &str) -> Result<&str, GoogleError> {
    let parts: Vec<&str> = name.split('/').collect();
    match parts.as_slice() {
        ["projects", project, "locations", location, "processors", id, rest @ ..]
            if !project.is_empty()
                && !location.is_empty()
                && !id.is_empty()
                && matches!(rest, [] | ["processorVersions", _]) =>
        {
            Ok(*location)
        }
        _ => Err(GoogleError::InvalidProcessorName(name.to_string())),
    }
}

impl GoogleClient {
    /// Resolve processor, credentials and endpoint from the options.
    ///
    /// An explicit access token wins over a credentials file.
    pub fn from_options(options: &ExtractorOptions) -> Result<Self, GoogleError> {
        let processor_name = options
            .credential(PROCESSOR_NAME_ENV)
            .ok_or(GoogleError::MissingCredential(PROCESSOR_NAME_ENV))?;
        let credentials = match options.credential(ACCESS_TOKEN_ENV) {
            Some(token) => Credentials::AccessToken(token),
            None => {
                let path = options
                    .credential(CREDENTIALS_PATH_ENV)
                    .ok_or(GoogleError::MissingCredential(CREDENTIALS_PATH_ENV))?;
                Credentials::from_file(Path::new(&path))?
            }
        };
        let client = Self::new(processor_name, credentials)?;
        Ok(match options.credential(ENDPOINT_ENV) {
            Some(endpoint) => client.with_endpoint(&endpoint),
            None => client,
        })
    }

    pub fn new(processor_name: String, credentials: Credentials) -> Result<Self, GoogleError> {
        let location = processor_location(&processor_name)?;
        let endpoint = format!("https://{location}-documentai.googleapis.com");
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            http,
            endpoint,
            processor_name,
            credentials,
        })
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    pub fn processor_name(&self) -> &str {
        &self.processor_name
    }

    fn process_url(&self) -> String {
        format!("{}/v1/{}:process", self.endpoint, self.processor_name)
    }

    /// Run the processor over a whole document.
    pub fn process(&self, bytes: &[u8], mime_type: &str) -> Result<Document, GoogleError> {
        let token = self.credentials.bearer(&self.http)?;
        let content = base64::engine::general_purpose::STANDARD.encode(bytes);
        let resp = self
            .http
            .post(self.process_url())
            .bearer_auth(token)
            .json(&serde_json::json!({
                "rawDocument": { "content": content, "mimeType": mime_type },
            }))
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GoogleError::Status {
                status: status.as_u16(),
                body: resp.text().unwrap_or_default(),
            });
        }
        let response: ProcessResponse = serde_json::from_str(&resp.text()?)?;
        let document = response.document.ok_or(GoogleError::MissingDocument)?;
        tracing::debug!(
            processor = %self.processor_name,
            bytes = bytes.len(),
            pages = document.pages.len(),
            "document processed"
        );
        Ok(document)
    }
}
