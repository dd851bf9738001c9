//! # opsinbox-oauth
//!
//! Google `OAuth2` authentication for the `OpsInbox` triage backend.
//!
//! ## Features
//!
//! - **Authorization Code Flow** with PKCE (S256)
//! - **Token management**: expiration checking, refresh with refresh-token
//!   preservation, and merge semantics for persistence
//! - **Token storage** in the platform keyring (Secret Service, Keychain,
//!   Credential Manager)
//!
//! ## Quick Start
//!
//! ```ignore
//! use opsinbox_oauth::{AuthorizationCodeFlow, OAuthClient, Provider, TokenStore};
//!
//! let client = OAuthClient::new("client_id", Provider::google()?)
//!     .with_client_secret("client_secret")
//!     .with_redirect_uri("http://localhost:8085");
//! let flow = AuthorizationCodeFlow::new(client).with_pkce();
//!
//! println!("Visit: {}", flow.authorization_url(Some("state"))?);
//! let token = flow.exchange_code("code-from-redirect").await?;
//!
//! let store = TokenStore::new();
//! store.save(&token)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod flow;
pub mod provider;
pub mod store;
pub mod token;

pub use error::{Error, Result};
pub use flow::{AuthorizationCodeFlow, OAuthClient, PkceChallenge};
pub use provider::Provider;
pub use store::TokenStore;
pub use token::Token;
