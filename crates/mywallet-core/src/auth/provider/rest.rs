//! Sign-in against the wallet API's own `/auth/*` endpoints.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{snippet, IdentityProvider};
use crate::auth::credential::{Credential, Grant, Identity, LoginCredentials};
use crate::auth::error::AuthError;

const DEFAULT_LOGIN_ERROR: &str = "Invalid credentials";
const DEFAULT_REFRESH_ERROR: &str = "Session could not be renewed";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Every `/auth/*` response is wrapped in this envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    data: Option<TokenData>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    token: String,
    #[serde(rename = "type")]
    #[allow(dead_code)]
    token_type: Option<String>,
    username: Option<String>,
    #[serde(rename = "expiresIn")]
    expires_in: Option<i64>,
}

pub struct RestProvider {
    client: Client,
    base_url: String,
}

impl RestProvider {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/{}", self.base_url, path)
    }

    /// Unwrap the envelope, mapping rejections to `InvalidCredentials` with
    /// the server's own message when it sent one.
    async fn token_data(response: Response, rejected: &str) -> Result<TokenData, AuthError> {
        let status = response.status();
        let body = response.text().await?;

        let envelope: Envelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if status.is_client_error() => {
                return Err(AuthError::InvalidCredentials(rejected.to_string()))
            }
            Err(e) if status.is_success() => {
                return Err(AuthError::MalformedResponse(format!("{} ({})", e, snippet(&body))))
            }
            Err(_) => return Err(Self::unavailable(status, &body)),
        };

        if status.is_server_error() {
            return Err(Self::unavailable(status, envelope.error.as_deref().unwrap_or(&body)));
        }

        match envelope {
            Envelope {
                success: true,
                data: Some(data),
                ..
            } if status.is_success() => Ok(data),
            Envelope { error, .. } => Err(AuthError::InvalidCredentials(
                error.unwrap_or_else(|| rejected.to_string()),
            )),
        }
    }

    fn unavailable(status: StatusCode, body: &str) -> AuthError {
        AuthError::Unavailable(format!("status {}: {}", status, snippet(body)))
    }
}

#[async_trait]
impl IdentityProvider for RestProvider {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn login(&self, credentials: &LoginCredentials) -> Result<Grant, AuthError> {
        debug!(username = %credentials.username, "Sending login request");
        let response = self
            .client
            .post(self.url("login"))
            .json(&LoginRequest {
                username: &credentials.username,
                password: &credentials.password,
            })
            .send()
            .await?;

        let data = Self::token_data(response, DEFAULT_LOGIN_ERROR).await?;
        let username = data
            .username
            .unwrap_or_else(|| credentials.username.clone());

        Ok(Grant::new(
            Credential::with_lifetime(data.token, data.expires_in),
            Identity::new(username),
        ))
    }

    async fn refresh(&self, identity: &Identity, current: &Credential) -> Result<Credential, AuthError> {
        debug!(username = %identity.username, "Requesting token refresh");
        let response = self
            .client
            .post(self.url("refresh"))
            .bearer_auth(&current.token)
            .send()
            .await?;

        let data = Self::token_data(response, DEFAULT_REFRESH_ERROR).await?;
        Ok(Credential::with_lifetime(data.token, data.expires_in))
    }

    async fn sign_out(&self, current: Option<&Credential>) -> Result<(), AuthError> {
        let Some(current) = current else {
            return Ok(());
        };
        let response = self
            .client
            .post(self.url("logout"))
            .bearer_auth(&current.token)
            .send()
            .await?;
        debug!(status = %response.status(), "Logout acknowledged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_parses_login_payload() {
        let json = r#"{"success":true,"data":{"token":"T1","type":"Bearer","username":"alice","expiresIn":3600},"error":null}"#;
        let envelope: Envelope = serde_json::from_str(json).unwrap();
        assert!(envelope.success);
        let data = envelope.data.unwrap();
        assert_eq!(data.token, "T1");
        assert_eq!(data.username.as_deref(), Some("alice"));
        assert_eq!(data.expires_in, Some(3600));
    }

    #[test]
    fn test_envelope_parses_failure_payload() {
        let json = r#"{"success":false,"data":null,"error":"Bad password"}"#;
        let envelope: Envelope = serde_json::from_str(json).unwrap();
        assert!(!envelope.success);
        assert!(envelope.data.is_none());
        assert_eq!(envelope.error.as_deref(), Some("Bad password"));
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let provider = RestProvider::new(Client::new(), "http://localhost:3000/api/");
        assert_eq!(provider.url("login"), "http://localhost:3000/api/auth/login");
    }
}
