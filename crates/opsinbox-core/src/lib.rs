//! # opsinbox-core
//!
//! Core business logic for the `OpsInbox` triage backend.
//!
//! This crate provides:
//! - **Triage engine** - deterministic multi-signal email classification
//! - **Triage service** - page pipeline: list, classify, persist, cache
//! - **Local storage** (`SQLite`) - messages, results, overrides, rules,
//!   flags, activity log
//! - **Page cache** - short-TTL cache for assembled triage pages

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cache;
mod error;
pub mod service;
pub mod triage;

pub use cache::PageCache;
pub use error::{Error, Result};
pub use service::{
    MailSource, MessageMeta, MessagePage, TRIAGE_CACHE_TTL, TriageItem, TriagePage, TriageService,
    TriageServiceError,
};
pub use triage::{
    AiMode, EmailForTriage, FeatureFlags, Priority, RuleConfig, RuleConfigError, TeamInboxItem,
    TriageOverride, TriageRepository, TriageResult, engine,
};
