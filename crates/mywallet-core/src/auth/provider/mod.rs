//! Identity providers: who mints and renews credentials.
//!
//! Two interchangeable implementations are available and selected from the
//! config: [`RestProvider`] talks to the wallet API's own auth endpoints,
//! [`ManagedIdentityProvider`] to a hosted identity service.

pub mod managed;
pub mod rest;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;

pub use managed::ManagedIdentityProvider;
pub use rest::RestProvider;

use super::credential::{Credential, Grant, Identity, LoginCredentials};
use super::error::AuthError;
use crate::config::{Config, ProviderKind};

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn login(&self, credentials: &LoginCredentials) -> Result<Grant, AuthError>;

    /// Called once the session store has committed `grant`. Providers that
    /// keep renewal state take it from here, never from `login` itself.
    fn adopt(&self, _grant: &Grant) {}

    /// Mint a new credential for an already signed-in identity.
    async fn refresh(&self, identity: &Identity, current: &Credential) -> Result<Credential, AuthError>;

    /// Tell the provider the session is over. Callers treat failures as non-fatal.
    async fn sign_out(&self, current: Option<&Credential>) -> Result<(), AuthError>;

    async fn sign_up(&self, _credentials: &LoginCredentials) -> Result<Grant, AuthError> {
        Err(AuthError::Unsupported("account registration"))
    }
}

/// HTTP client shared by the providers.
pub(crate) fn http_client(timeout_secs: u64) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Build the provider selected in the config.
pub fn from_config(config: &Config) -> Result<Arc<dyn IdentityProvider>> {
    let client = http_client(config.request_timeout_secs)?;
    Ok(match config.provider {
        ProviderKind::Rest => Arc::new(RestProvider::new(client, &config.api_base_url)),
        ProviderKind::Managed => {
            let api_key = config
                .managed
                .api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("Managed identity provider needs an API key"))?;
            Arc::new(ManagedIdentityProvider::new(
                client,
                &config.managed.identity_url,
                &config.managed.token_url,
                api_key,
            ))
        }
    })
}

/// Truncate a provider body before it goes into an error message.
pub(crate) fn snippet(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
