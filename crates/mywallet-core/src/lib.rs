//! Core library for the MyWallet client.
//!
//! - [`auth`]: session store, identity providers, persisted session record
//! - [`api`]: authenticated request pipeline and wallet resources
//! - [`models`]: API data types
//! - [`config`]: configuration file and environment overrides

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

use anyhow::Result;

pub use api::{ApiClient, ApiError, ApiRequest, ApiResponse};
pub use auth::{AuthError, AuthEvent, Identity, LoginCredentials, SessionStatus, SessionStore};
pub use config::Config;

/// Build the session store and API client described by `config`, with the
/// session already rehydrated from storage.
pub async fn connect(config: &Config) -> Result<ApiClient> {
    let provider = auth::provider::from_config(config)?;
    let storage = auth::storage::from_config(config)?;
    let session = SessionStore::open(provider, storage).await;
    ApiClient::from_config(config, session)
}
