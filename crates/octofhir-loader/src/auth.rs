//! Upstream credentials.
//!
//! Credentials are resolved once before the first publish. A failure here is a
//! configuration error and aborts the run.

use serde::Deserialize;

use crate::config::{AuthMethod, AuthSettings};
use crate::error::{ClientError, LoaderError};

/// What FhirClient needs to set the Authorization header
#[derive(Clone, PartialEq, Eq)]
pub enum AuthHeader {
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl std::fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::Bearer { .. } => f.debug_struct("Bearer").finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

/// Turns the `[auth]` settings into a ready-to-use header.
///
/// # Errors
///
/// Returns `LoaderError::Configuration` when required settings are missing or
/// the client-credentials token request fails.
pub async fn resolve_auth(
    settings: &AuthSettings,
    http: &reqwest::Client,
) -> Result<Option<AuthHeader>, LoaderError> {
    settings.validate().map_err(LoaderError::configuration)?;

    match settings.method {
        AuthMethod::None => Ok(None),
        AuthMethod::Bearer => Ok(Some(AuthHeader::Bearer {
            token: settings.token.clone().unwrap_or_default(),
        })),
        AuthMethod::Basic => Ok(Some(AuthHeader::Basic {
            username: settings.username.clone().unwrap_or_default(),
            password: settings.password.clone().unwrap_or_default(),
        })),
        AuthMethod::ClientCredentials => {
            let token = oauth_client_credentials(
                http,
                settings.token_url.as_deref().unwrap_or_default(),
                settings.client_id.as_deref().unwrap_or_default(),
                settings.client_secret.as_deref().unwrap_or_default(),
                settings.scope.as_deref(),
            )
            .await
            .map_err(|e| LoaderError::configuration(format!("authentication failed: {e}")))?;
            tracing::info!("Acquired upstream access token");
            Ok(Some(AuthHeader::Bearer {
                token: token.access_token,
            }))
        }
    }
}

pub async fn oauth_client_credentials(
    http: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    scope: Option<&str>,
) -> Result<TokenResponse, ClientError> {
    let mut body = format!(
        "grant_type=client_credentials&client_id={}&client_secret={}",
        urlencoding(client_id),
        urlencoding(client_secret),
    );
    if let Some(scope) = scope.filter(|s| !s.is_empty()) {
        body.push_str("&scope=");
        body.push_str(&urlencoding(scope));
    }

    let resp = http
        .post(token_url)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(body)
        .send()
        .await
        .map_err(|e| ClientError::transport(token_url, e))?;

    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(ClientError::TokenRequest {
            status: status.as_u16(),
            body: text,
        });
    }

    serde_json::from_str(&text).map_err(|e| ClientError::TokenResponse(e.to_string()))
}

fn urlencoding(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
