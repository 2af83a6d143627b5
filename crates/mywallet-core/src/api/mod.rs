//! REST API client module for the MyWallet service.
//!
//! This module provides the `ApiClient`: the authenticated request pipeline
//! plus typed wrappers for the wallet resources.
//!
//! The API uses JWT bearer token authentication obtained through the
//! configured identity provider.

pub mod client;
pub mod error;
pub mod request;
pub mod wallet;

pub use client::ApiClient;
pub use error::ApiError;
pub use request::{ApiRequest, ApiResponse};
