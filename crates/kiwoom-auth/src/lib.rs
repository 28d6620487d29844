//! Access token lifecycle for the Kiwoom REST API.
//!
//! - `AuthClient`: POSTs client credentials to `/oauth2/token`
//! - `Credential`: an issued token plus its absolute expiry
//! - `TokenAuthority`: caches one credential and refreshes it under a lock

pub mod authority;
pub mod client;
pub mod credential;
pub mod error;

pub use authority::TokenAuthority;
pub use client::{AuthClient, AuthConfig, TokenIssuer, TokenResponse};
pub use credential::{parse_expires_dt, Credential};
pub use error::{AuthError, AuthResult};

use std::pin::Pin;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
