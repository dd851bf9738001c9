//! Email triage: a deterministic classifier plus the state around it.
//!
//! The heart of this module is [`engine::classify`], a pure scoring pass
//! that maps a message's sender, subject, snippet, and date onto a priority,
//! category, and confidence. Everything else is supporting state: stored
//! results, per-message user overrides, admin-configurable rules, and the
//! feature flags gating the optional AI shadow mode.
//!
//! # Example
//!
//! ```ignore
//! use opsinbox_core::triage::{EmailForTriage, engine};
//!
//! let result = engine::classify(&EmailForTriage {
//!     from: "GitHub <notifications@github.com>".into(),
//!     subject: "CI failed on main".into(),
//!     snippet: "build failed and failing checks".into(),
//!     date: "Mon, 17 Feb 2026 09:00:00 +0000".into(),
//! });
//! assert_eq!(result.category, "operations");
//! ```

pub mod engine;
mod model;
mod repository;

pub use model::{
    AiMode, EmailForTriage, FeatureFlags, Priority, RuleConfig, RuleConfigError, TriageOverride,
    TriageResult,
};
pub use repository::{TeamInboxItem, TriageRepository};
