//! Hosted identity service speaking the identity-toolkit REST dialect
//! (`accounts:signInWithPassword`, `accounts:signUp`, secure-token refresh).

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{snippet, IdentityProvider};
use crate::auth::credential::{Credential, Grant, Identity, LoginCredentials};
use crate::auth::error::AuthError;

#[derive(Debug, Serialize)]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(rename = "returnSecureToken")]
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    #[serde(rename = "idToken")]
    id_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: Option<String>,
    #[serde(rename = "expiresIn")]
    expires_in: Option<String>,
    email: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    #[serde(rename = "profilePicture")]
    profile_picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: String,
    refresh_token: Option<String>,
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct ManagedIdentityProvider {
    client: Client,
    identity_url: String,
    token_url: String,
    api_key: String,
    // Long-lived token the service uses to mint new id tokens; memory only
    refresh_token: Mutex<Option<String>>,
}

impl ManagedIdentityProvider {
    pub fn new(client: Client, identity_url: &str, token_url: &str, api_key: String) -> Self {
        Self {
            client,
            identity_url: identity_url.trim_end_matches('/').to_string(),
            token_url: token_url.trim_end_matches('/').to_string(),
            api_key,
            refresh_token: Mutex::new(None),
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.lock().is_some()
    }

    async fn password_call(&self, endpoint: &str, credentials: &LoginCredentials) -> Result<Grant, AuthError> {
        let url = format!("{}/v1/accounts:{}", self.identity_url, endpoint);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&PasswordRequest {
                email: &credentials.username,
                password: &credentials.password,
                return_secure_token: true,
            })
            .send()
            .await?;

        let account: AccountResponse = Self::parse(response).await?;
        let identity = Identity {
            username: account.email.unwrap_or_else(|| credentials.username.clone()),
            display_name: account.display_name.filter(|n| !n.is_empty()),
            avatar_url: account.profile_picture.filter(|p| !p.is_empty()),
        };

        // The refresh token is only held once the session store adopts the grant
        Ok(Grant::new(
            Credential::with_lifetime(account.id_token, parse_seconds(account.expires_in)),
            identity,
        )
        .with_refresh_token(account.refresh_token))
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, AuthError> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| AuthError::MalformedResponse(format!("{} ({})", e, snippet(&body))));
        }
        if status.is_server_error() {
            return Err(AuthError::Unavailable(format!("status {}: {}", status, snippet(&body))));
        }
        match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => Err(AuthError::InvalidCredentials(describe_error(&envelope.error.message))),
            Err(_) => Err(AuthError::InvalidCredentials(describe_error(""))),
        }
    }
}

/// `expiresIn` arrives as a decimal string of seconds.
fn parse_seconds(value: Option<String>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

/// Turn the service's error codes into something a user can act on.
/// Codes may carry a suffix such as `"TOO_MANY_ATTEMPTS_TRY_LATER : ..."`.
fn describe_error(message: &str) -> String {
    let code = message.split(':').next().unwrap_or_default().trim();
    match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_EMAIL" => {
            "Invalid credentials".to_string()
        }
        "USER_DISABLED" => "This account has been disabled".to_string(),
        "EMAIL_EXISTS" => "An account with this email already exists".to_string(),
        "TOO_MANY_ATTEMPTS_TRY_LATER" => "Too many attempts, try again later".to_string(),
        "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "USER_NOT_FOUND" => {
            "Session could not be renewed".to_string()
        }
        c if c.starts_with("WEAK_PASSWORD") => "Password is too weak".to_string(),
        "" => "Invalid credentials".to_string(),
        other => other.to_string(),
    }
}

#[async_trait]
impl IdentityProvider for ManagedIdentityProvider {
    fn name(&self) -> &'static str {
        "managed"
    }

    async fn login(&self, credentials: &LoginCredentials) -> Result<Grant, AuthError> {
        debug!(email = %credentials.username, "Signing in with managed identity");
        self.password_call("signInWithPassword", credentials).await
    }

    async fn sign_up(&self, credentials: &LoginCredentials) -> Result<Grant, AuthError> {
        debug!(email = %credentials.username, "Creating managed identity account");
        self.password_call("signUp", credentials).await
    }

    fn adopt(&self, grant: &Grant) {
        *self.refresh_token.lock() = grant.refresh_token.clone();
    }

    async fn refresh(&self, identity: &Identity, _current: &Credential) -> Result<Credential, AuthError> {
        let held = self.refresh_token.lock().clone();
        let Some(refresh_token) = held else {
            warn!(username = %identity.username, "No refresh token held for this session");
            return Err(AuthError::NotSignedIn);
        };

        let url = format!("{}/v1/token", self.token_url);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await?;

        let token: TokenResponse = Self::parse(response).await?;
        if let Some(rotated) = token.refresh_token {
            *self.refresh_token.lock() = Some(rotated);
        }
        Ok(Credential::with_lifetime(token.id_token, parse_seconds(token.expires_in)))
    }

    async fn sign_out(&self, _current: Option<&Credential>) -> Result<(), AuthError> {
        self.refresh_token.lock().take();
        Ok(())
    }
}
