//! Core services for email triage.
//!
//! This module provides the service layer that bridges front-ends with the
//! mail-listing collaborator, the triage engine, and local storage.

mod triage;

pub use opsinbox_gmail::{MessageMeta, MessagePage};
pub use triage::{
    MailSource, TRIAGE_CACHE_TTL, TriageItem, TriagePage, TriageService, TriageServiceError,
};
