//! # opsinbox-gmail
//!
//! Minimal Gmail REST API (v1) client for the `OpsInbox` triage backend.
//!
//! Covers exactly what triage needs: paged listing of message metadata
//! (`From`, `Subject`, `Date`, snippet) and fetching a single message with
//! its decoded plain-text body. Authentication is a bearer access token
//! obtained elsewhere (see `opsinbox-oauth`).
//!
//! ## Quick Start
//!
//! ```ignore
//! use opsinbox_gmail::GmailClient;
//!
//! let client = GmailClient::new(access_token);
//! let page = client.list_messages(10, None).await?;
//! for meta in &page.items {
//!     println!("{}: {}", meta.from, meta.subject);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod model;

pub use client::GmailClient;
pub use error::{Error, Result};
pub use model::{MessageDetail, MessageMeta, MessagePage};
