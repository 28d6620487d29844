//! HTTP client for the token endpoint.
//!
//! Issues access tokens with the client-credentials grant:
//! `POST {base_url}/oauth2/token` with `{"grant_type", "appkey", "secretkey"}`.

use crate::error::{AuthError, AuthResult};
use crate::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info};
use zeroize::Zeroizing;

/// Token endpoint path, relative to the REST base URL.
pub const TOKEN_PATH: &str = "/oauth2/token";

/// Production REST base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.kiwoom.com";

const GRANT_TYPE: &str = "client_credentials";

/// Default timeout for token requests.
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Token request body.
#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    appkey: &'a str,
    secretkey: &'a str,
}

/// Token endpoint response.
///
/// Every field is optional on the wire; the authority decides which
/// omissions are fatal.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    /// Upstream result code (0 = success).
    #[serde(default)]
    pub return_code: Option<i64>,
    /// Upstream result message.
    #[serde(default)]
    pub return_msg: Option<String>,
    /// Access token.
    #[serde(default)]
    pub token: Option<String>,
    /// Token type (e.g., "bearer").
    #[serde(default)]
    pub token_type: Option<String>,
    /// Expiry as `yyyyMMddHHmmss`, Korea Standard Time.
    #[serde(default)]
    pub expires_dt: Option<String>,
}

/// Source of freshly issued tokens.
///
/// Implemented by [`AuthClient`]; the seam lets the authority be exercised
/// without a live endpoint.
pub trait TokenIssuer: Send + Sync {
    /// Request a new token from upstream. One call = one upstream request.
    fn issue(&self) -> BoxFuture<'_, AuthResult<TokenResponse>>;
}

/// Token endpoint configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// REST base URL (e.g., "https://api.kiwoom.com").
    pub base_url: String,
    /// Application key.
    pub appkey: String,
    /// Secret key. Wiped from memory on drop.
    pub secretkey: Zeroizing<String>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl AuthConfig {
    pub fn new(appkey: impl Into<String>, secretkey: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            appkey: appkey.into(),
            secretkey: Zeroizing::new(secretkey.into()),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    /// Full token endpoint URL.
    pub fn token_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), TOKEN_PATH)
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("base_url", &self.base_url)
            .field("appkey", &self.appkey)
            .field("secretkey", &"<redacted>")
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Client for the token endpoint.
pub struct AuthClient {
    client: Client,
    config: AuthConfig,
}

impl AuthClient {
    /// Create a new auth client.
    pub fn new(config: AuthConfig) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AuthError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Issue a new access token.
    ///
    /// Non-2xx responses are hard failures. A 2xx response is returned as-is;
    /// validation of its fields happens in the authority.
    pub async fn issue_access_token(&self) -> AuthResult<TokenResponse> {
        let url = self.config.token_url();
        info!(url = %url, "Issuing access token");

        let request = TokenRequest {
            grant_type: GRANT_TYPE,
            appkey: &self.config.appkey,
            secretkey: &self.config.secretkey,
        };

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AuthError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Token endpoint returned error status");
            return Err(AuthError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| AuthError::HttpClient(format!("Failed to read response: {e}")))?;
        let parsed: TokenResponse = serde_json::from_str(&body)?;

        debug!(
            code = ?parsed.return_code,
            msg = ?parsed.return_msg,
            token_type = ?parsed.token_type,
            "Token response received"
        );

        Ok(parsed)
    }
}

impl TokenIssuer for AuthClient {
    fn issue(&self) -> BoxFuture<'_, AuthResult<TokenResponse>> {
        Box::pin(self.issue_access_token())
    }
}

impl<T: TokenIssuer + ?Sized> TokenIssuer for std::sync::Arc<T> {
    fn issue(&self) -> BoxFuture<'_, AuthResult<TokenResponse>> {
        (**self).issue()
    }
}
