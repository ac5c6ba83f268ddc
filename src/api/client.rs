//! Authenticated JSON-over-HTTP client for the task service.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::Authenticator;
use crate::config::ApiConfig;
use crate::{AppError, Result};

/// Longest response body excerpt carried in an error message.
const ERROR_BODY_LIMIT: usize = 512;

/// The signed-in user as known to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    /// Backend user id (not the identity-provider subject).
    pub id: i64,
    /// Display name, if the server provides one.
    #[serde(default)]
    pub name: Option<String>,
    /// Email address, if the server provides one.
    #[serde(default)]
    pub email: Option<String>,
}

/// REST client shared by the task and notification APIs.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth: Arc<dyn Authenticator>,
}

impl ApiClient {
    /// Build a client for `config`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be constructed.
    pub fn new(config: &ApiConfig, auth: Arc<dyn Authenticator>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            auth,
        })
    }

    /// Base URL without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` or `AppError::Decode` on failure.
    pub async fn current_user(&self) -> Result<CurrentUser> {
        self.get_json("/api/users/me").await
    }

    /// `GET path` and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` on transport failure or non-success status,
    /// `AppError::Decode` if the body is not the expected shape.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.execute(self.request(Method::GET, path).await?, path).await?;
        Ok(response.json::<T>().await?)
    }

    /// Send `body` as JSON and decode the JSON response.
    ///
    /// # Errors
    ///
    /// Same as [`get_json`](Self::get_json).
    pub async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(method, path).await?.json(body);
        let response = self.execute(request, path).await?;
        Ok(response.json::<T>().await?)
    }

    /// Send a request without a body and discard the response body.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` on transport failure or non-success status.
    pub async fn send_empty(&self, method: Method, path: &str) -> Result<()> {
        self.execute(self.request(method, path).await?, path).await?;
        Ok(())
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = format!("{}{path}", self.base_url);
        let builder = self.http.request(method, url);
        match self.auth.access_token().await {
            Ok(token) => Ok(builder.bearer_auth(token)),
            Err(err) => {
                warn!(%err, path, "no bearer credential; sending unauthenticated request");
                Ok(builder)
            }
        }
    }

    async fn execute(&self, request: RequestBuilder, path: &str) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        debug!(path, %status, "api response");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
        Err(match status {
            StatusCode::NOT_FOUND => AppError::NotFound(format!("{path}: {excerpt}")),
            _ => AppError::Http(format!("{path} returned {status}: {excerpt}")),
        })
    }
}
