//! OAuth bearer tokens for the Document AI API.

use std::path::Path;

use serde::Deserialize;

use crate::error::GoogleError;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Where the bearer token for each request comes from.
#[derive(Clone)]
pub enum Credentials {
    /// A ready-made access token, e.g. from `gcloud auth print-access-token`.
    AccessToken(String),
    /// An `authorized_user` credentials file; its refresh token is exchanged
    /// for an access token on each request.
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        token_uri: String,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessToken(_) => f.write_str("AccessToken(..)"),
            Self::AuthorizedUser { client_id, token_uri, .. } => f
                .debug_struct("AuthorizedUser")
                .field("client_id", client_id)
                .field("token_uri", token_uri)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Deserialize)]
struct CredentialsFile {
    #[serde(rename = "type")]
    kind: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
    token_uri: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl Credentials {
    /// Read a credentials JSON file.
    ///
    /// Service-account keys need an RS256-signed assertion, which this
    /// backend does not produce; pass an access token for those accounts.
    pub fn from_file(path: &Path) -> Result<Self, GoogleError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GoogleError::Credentials(format!("{}: {e}", path.display())))?;
        let file: CredentialsFile = serde_json::from_str(&content)
            .map_err(|e| GoogleError::Credentials(format!("{}: {e}", path.display())))?;

        match file.kind.as_str() {
            "authorized_user" => {
                let field = |value: Option<String>, name: &str| {
                    value.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
                        GoogleError::Credentials(format!("{} has no {name}", path.display()))
                    })
                };
                Ok(Self::AuthorizedUser {
                    client_id: field(file.client_id, "client_id")?,
                    client_secret: field(file.client_secret, "client_secret")?,
                    refresh_token: field(file.refresh_token, "refresh_token")?,
                    token_uri: file
                        .token_uri
                        .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
                })
            }
            "service_account" => Err(GoogleError::Credentials(format!(
                "{} is a service-account key; set GOOGLE_DOCAI_ACCESS_TOKEN instead",
                path.display()
            ))),
            other => Err(GoogleError::Credentials(format!(
                "{} has unsupported credential type '{other}'",
                path.display()
            ))),
        }
    }

    /// Bearer token for the next request.
    pub fn bearer(&self, http: &reqwest::blocking::Client) -> Result<String, GoogleError> {
        match self {
            Self::AccessToken(token) => Ok(token.clone()),
            Self::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
            } => {
                let resp = http
                    .post(token_uri)
                    .json(&serde_json::json!({
                        "grant_type": "refresh_token",
                        "client_id": client_id,
                        "client_secret": client_secret,
                        "refresh_token": refresh_token,
                    }))
                    .send()?;
                let status = resp.status();
                let body: TokenResponse = serde_json::from_str(&resp.text()?)?;
                match body.access_token {
                    Some(token) if status.is_success() => {
                        tracing::debug!(%token_uri, "refreshed access token");
                        Ok(token)
                    }
                    _ => Err(GoogleError::Token(
                        body.error_description
                            .or(body.error)
                            .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
                    )),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("creds.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn authorized_user_file_defaults_token_uri() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"{"type": "authorized_user", "client_id": "id", "client_secret": "s", "refresh_token": "r"}"#,
        );
        match Credentials::from_file(&path).unwrap() {
            Credentials::AuthorizedUser { token_uri, refresh_token, .. } => {
                assert_eq!(token_uri, DEFAULT_TOKEN_URI);
                assert_eq!(refresh_token, "r");
            }
            other => panic!("unexpected credentials: {other:?}"),
        }
    }

    #[test]
    fn service_account_key_points_at_access_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, r#"{"type": "service_account", "private_key": "-----BEGIN"}"#);
        let err = Credentials::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("GOOGLE_DOCAI_ACCESS_TOKEN"), "{err}");
    }

    #[test]
    fn missing_refresh_token_is_named() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, r#"{"type": "authorized_user", "client_id": "id", "client_secret": "s"}"#);
        let err = Credentials::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("refresh_token"), "{err}");
    }

    #[test]
    fn debug_hides_secrets() {
        let creds = Credentials::AccessToken("ya29.secret".into());
        assert!(!format!("{creds:?}").contains("secret"));
    }
}
