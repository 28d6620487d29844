//! Token authority.
//!
//! Owns the single cached [`Credential`] for a process and hands out
//! access tokens, refreshing transparently once the credential expires.
//!
//! The cache sits behind one async mutex that is held across the whole
//! check-and-refresh sequence. Concurrent callers that find the credential
//! expired therefore queue behind the first refresh and observe its result
//! instead of issuing their own.

use crate::client::TokenIssuer;
use crate::credential::Credential;
use crate::error::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Access token authority. Create one per process and share it by `Arc`.
pub struct TokenAuthority<I> {
    issuer: I,
    cached: Mutex<Option<Credential>>,
}

impl<I: TokenIssuer> TokenAuthority<I> {
    /// Create an authority with an empty cache.
    pub fn new(issuer: I) -> Self {
        Self {
            issuer,
            cached: Mutex::new(None),
        }
    }

    /// Create an authority seeded with a previously issued credential.
    pub fn with_credential(issuer: I, credential: Credential) -> Self {
        Self {
            issuer,
            cached: Mutex::new(Some(credential)),
        }
    }

    /// Return a valid access token, issuing a new one if needed.
    ///
    /// Never returns a token at or past its expiry. No retries: an upstream
    /// failure is returned to the caller and nothing is cached.
    pub async fn get_access_token(&self) -> AuthResult<String> {
        let mut cached = self.cached.lock().await;

        if let Some(credential) = cached.as_ref() {
            if !credential.is_expired_at(Utc::now()) {
                return Ok(credential.token().to_string());
            }
            info!(expired_at = %credential.expires_at(), "Access token expired");
        }

        let credential = self.issue_new_token().await?;
        let token = credential.token().to_string();
        *cached = Some(credential);
        Ok(token)
    }

    /// Expiry of the cached credential, without refreshing.
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.cached.lock().await.as_ref().map(Credential::expires_at)
    }

    /// Drop the cached credential so the next call issues a new one.
    pub async fn invalidate(&self) {
        if self.cached.lock().await.take().is_some() {
            info!("Cached access token invalidated");
        }
    }

    async fn issue_new_token(&self) -> AuthResult<Credential> {
        info!("Issuing new access token");

        let response = self.issuer.issue().await?;
        info!(
            code = ?response.return_code,
            msg = ?response.return_msg,
            "Token endpoint responded"
        );

        let credential = Credential::from_response(&response).map_err(|e| {
            warn!(error = %e, "Token response unusable");
            e
        })?;

        if credential.is_expired_at(Utc::now()) {
            warn!(expires_at = %credential.expires_at(), "Issued token is already expired");
            return Err(AuthError::AlreadyExpired(credential.expires_at()));
        }

        info!(expires_at = %credential.expires_at(), "Access token issued");
        Ok(credential)
    }
}
