//! Bearer credential providers.
//!
//! The authentication flow itself lives outside this crate; all the sync
//! layer needs is a way to obtain the current bearer token on demand.

use std::future::Future;
use std::pin::Pin;

use crate::config::load_credential;
use crate::{AppError, Result};

/// Supplies the bearer credential for REST calls and the push channel.
pub trait Authenticator: Send + Sync {
    /// Fetch the current access token.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Credential`] when no token is available.
    fn access_token(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;
}

/// A fixed token, e.g. loaded once at startup.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl Authenticator for StaticToken {
    fn access_token(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move {
            if self.0.is_empty() {
                Err(AppError::Credential("static token is empty".into()))
            } else {
                Ok(self.0.clone())
            }
        })
    }
}

/// Reads the token from the OS keychain (env-var fallback) on every call,
/// so a token refreshed by an external login flow is picked up on the next
/// reconnect.
#[derive(Debug, Clone, Default)]
pub struct KeyringAuthenticator;

impl Authenticator for KeyringAuthenticator {
    fn access_token(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(load_credential("api_token", "TASKSYNC_API_TOKEN"))
    }
}
