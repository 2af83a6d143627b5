//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `SessionStore`: the single source of truth for who is signed in
//! - `IdentityProvider`: the REST and managed sign-in backends
//! - `KeyValueStore`: durable storage for the two-key session record
//!
//! A session is persisted as a token entry and an identity entry; one is
//! never kept without the other.

pub mod credential;
pub mod error;
pub mod provider;
pub mod record;
pub mod session;
pub mod storage;

pub use credential::{Credential, Grant, Identity, LoginCredentials};
pub use error::AuthError;
pub use provider::{IdentityProvider, ManagedIdentityProvider, RestProvider};
pub use session::{AuthEvent, SessionData, SessionStatus, SessionStore};
pub use storage::{FileStore, KeyValueStore, KeyringStore, MemoryStore};
