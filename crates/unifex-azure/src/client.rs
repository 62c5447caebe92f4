use std::time::Duration;

use serde::Deserialize;

use unifex_core::ExtractorOptions;

use crate::error::AzureError;
use crate::response::AnalyzeResult;

pub const ENDPOINT_ENV: &str = "AZURE_DI_ENDPOINT";
pub const KEY_ENV: &str = "AZURE_DI_KEY";
pub const MODEL_ENV: &str = "AZURE_DI_MODEL";

pub const DEFAULT_MODEL: &str = "prebuilt-read";
const API_VERSION: &str = "2024-11-30";
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Operation {
    status: String,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Blocking client for the Document Intelligence analyze API.
#[derive(Clone)]
pub struct AzureClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    key: String,
    model: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl std::fmt::Debug for AzureClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl AzureClient {
    /// Resolve endpoint, key and model from the options' credentials.
    pub fn from_options(options: &ExtractorOptions) -> Result<Self, AzureError> {
        let endpoint = options
            .credential(ENDPOINT_ENV)
            .ok_or(AzureError::MissingCredential(ENDPOINT_ENV))?;
        let key = options
            .credential(KEY_ENV)
            .ok_or(AzureError::MissingCredential(KEY_ENV))?;
        let model = options
            .credential(MODEL_ENV)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Self::new(&endpoint, key, model)
    }

    pub fn new(endpoint: &str, key: String, model: String) -> Result<Self, AzureError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            key,
            model,
            poll_interval: Duration::from_secs(1),
            max_polls: 300,
        })
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/documentintelligence/documentModels/{}:analyze?api-version={API_VERSION}",
            self.endpoint, self.model
        )
    }

    /// Submit a document and wait for the analysis to finish.
    pub fn analyze(&self, bytes: &[u8], mime_type: &str) -> Result<AnalyzeResult, AzureError> {
        let resp = self
            .http
            .post(self.analyze_url())
            .header(KEY_HEADER, &self.key)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes.to_vec())
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AzureError::Status {
                status: status.as_u16(),
                body: resp.text().unwrap_or_default(),
            });
        }
        let operation_url = resp
            .headers()
            .get("operation-location")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or(AzureError::MissingOperationLocation)?;
        tracing::debug!(model = %self.model, bytes = bytes.len(), "analysis submitted");

        for poll in 0..self.max_polls {
            let resp = self.http.get(&operation_url).header(KEY_HEADER, &self.key).send()?;
            let status = resp.status();
            if !status.is_success() {
                return Err(AzureError::Status {
                    status: status.as_u16(),
                    body: resp.text().unwrap_or_default(),
                });
            }
            let operation: Operation = serde_json::from_str(&resp.text()?)?;
            match operation.status.as_str() {
                "succeeded" => {
                    tracing::debug!(polls = poll + 1, "analysis finished");
                    return operation
                        .analyze_result
                        .ok_or_else(|| AzureError::Analysis("succeeded without a result".into()));
                }
                "failed" | "canceled" => {
                    let detail = operation
                        .error
                        .map(|e| e["message"].as_str().unwrap_or("unknown error").to_string())
                        .unwrap_or_else(|| operation.status.clone());
                    return Err(AzureError::Analysis(detail));
                }
                _ => std::thread::sleep(self.poll_interval),
            }
        }
        Err(AzureError::Timeout(self.max_polls))
    }
}
