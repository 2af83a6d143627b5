//! Authenticated client for the MyWallet REST API.
//!
//! Every call goes through [`ApiClient::send`], which attaches the current
//! bearer token and recovers from a 401 at most once: refresh, retry, and
//! sign the session out if that doesn't work.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::{header, Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::request::{ApiRequest, ApiResponse};
use super::ApiError;
use crate::auth::{Credential, SessionStore};
use crate::config::Config;

/// API client for MyWallet.
/// Clone is cheap - reqwest::Client and the session store are both behind Arcs.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Arc<SessionStore>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout_secs: u64, session: Arc<SessionStore>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn from_config(config: &Config, session: Arc<SessionStore>) -> Result<Self> {
        Self::new(&config.api_base_url, config.request_timeout_secs, session)
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Build and send one HTTP request. `Err` only when no response arrived.
    async fn dispatch(
        &self,
        request: &ApiRequest,
        credential: Option<&Credential>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.url(&request.path);
        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header(header::ACCEPT, "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }
        if let Some(credential) = credential {
            builder = builder.bearer_auth(&credential.token);
        }

        builder.send().await.map_err(|e| {
            warn!(method = %request.method, url = %url, error = %e, "Request failed without a response");
            ApiError::Transport(e)
        })
    }

    /// Read the body and map non-2xx statuses to errors.
    async fn finish(response: reqwest::Response) -> Result<ApiResponse, ApiError> {
        let status = response.status();
        let response = ApiResponse {
            status,
            body: response.bytes().await?.to_vec(),
        };

        if status.is_success() {
            return Ok(response);
        }

        if status.is_server_error() {
            warn!(status = %status, "Server error");
        }
        Err(ApiError::from_status(status, &response.text()))
    }

    /// Send a request with the session's credential.
    ///
    /// Transport failures and non-401 statuses are returned as they are. A 401
    /// triggers one refresh and one retry; if the refresh yields nothing, or the
    /// retry is rejected too, the session is signed out and `Unauthorized`
    /// is returned. Dropping the future before the first response arrives
    /// leaves the session untouched.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let credential = self.session.current_token();
        let response = self.dispatch(&request, credential.as_ref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::finish(response).await;
        }

        debug!(method = %request.method, path = %request.path, "Unauthorized, trying to refresh");
        let stale = credential.map(|c| c.token);
        let Some(fresh) = self.recover(stale).await else {
            return Err(ApiError::Unauthorized);
        };

        let retry = self.dispatch(&request, Some(&fresh)).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            let session = self.session.clone();
            let rejected = fresh.token.clone();
            let outcome = tokio::spawn(async move { session.invalidate(&rejected).await }).await;
            if let Err(e) = outcome {
                warn!(error = %e, "Session invalidation task failed");
            }
            return Err(ApiError::Unauthorized);
        }
        Self::finish(retry).await
    }

    /// Refresh or sign out after a 401, on its own task: once started, the
    /// recovery runs to completion even if the caller stops waiting, so memory
    /// and storage are never left half updated.
    async fn recover(&self, stale: Option<String>) -> Option<Credential> {
        let session = self.session.clone();
        let task = tokio::spawn(async move { session.refresh_or_invalidate(stale.as_deref()).await });
        match task.await {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(error = %e, "Session recovery task failed");
                None
            }
        }
    }

    // ===== Typed helpers =====

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Vec<(String, String)>,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path).query(query)).await?.json()
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send(ApiRequest::post(path).json(body)?).await?.json()
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send(ApiRequest::put(path).json(body)?).await?.json()
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send(ApiRequest::patch(path).json(body)?).await?.json()
    }

    /// DELETE, ignoring whatever body the server returns.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(path)).await?;
        Ok(())
    }
}
