//! Triage service: list a page of mail, classify it, persist what we saw.
//!
//! The pipeline per page is fixed: list metadata from the mail source,
//! classify each message in listing order, store the metadata and result,
//! attach any user override, and cache the assembled page for a short TTL so
//! a polling dashboard does not re-classify on every refresh.

use std::time::Duration;

use opsinbox_gmail::{MessageMeta, MessagePage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::PageCache;
use crate::triage::{EmailForTriage, TriageOverride, TriageRepository, TriageResult, engine};

/// How long an assembled triage page stays served from cache.
pub const TRIAGE_CACHE_TTL: Duration = Duration::from_secs(30);

/// A mail-listing collaborator.
///
/// Implemented by the Gmail client; tests substitute a fake. Pages are
/// identified by an opaque continuation token.
pub trait MailSource {
    /// Error type produced by the source.
    type Error: std::fmt::Display;

    /// Lists one page of message metadata.
    fn list_page(
        &self,
        limit: u32,
        page_token: Option<&str>,
    ) -> impl std::future::Future<Output = std::result::Result<MessagePage, Self::Error>> + Send;
}

impl MailSource for opsinbox_gmail::GmailClient {
    type Error = opsinbox_gmail::Error;

    async fn list_page(
        &self,
        limit: u32,
        page_token: Option<&str>,
    ) -> std::result::Result<MessagePage, Self::Error> {
        self.list_messages(limit, page_token).await
    }
}

/// One triaged message: the listed metadata, the engine's verdict, and any
/// user override on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageItem {
    /// Listed message metadata.
    pub email: MessageMeta,
    /// Engine classification.
    pub triage: TriageResult,
    /// User override, when one has been recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#override: Option<TriageOverride>,
}

/// A triaged page, in listing order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriagePage {
    /// Items in the same order the source listed them.
    pub items: Vec<TriageItem>,
    /// Continuation token for the next page, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Errors from the triage pipeline.
#[derive(Debug, thiserror::Error)]
pub enum TriageServiceError {
    /// The mail source failed to list the page.
    #[error("mail source error: {0}")]
    Source(String),

    /// Local storage failed.
    #[error(transparent)]
    Storage(#[from] crate::Error),
}

/// Classifies pages of mail and records what it saw.
pub struct TriageService {
    repository: TriageRepository,
    cache: PageCache<TriagePage>,
}

impl TriageService {
    /// Creates a service with the default page-cache TTL.
    #[must_use]
    pub fn new(repository: TriageRepository) -> Self {
        Self::with_cache_ttl(repository, TRIAGE_CACHE_TTL)
    }

    /// Creates a service with an explicit page-cache TTL.
    #[must_use]
    pub fn with_cache_ttl(repository: TriageRepository, ttl: Duration) -> Self {
        Self {
            repository,
            cache: PageCache::new(ttl),
        }
    }

    /// The underlying repository, for callers that also manage overrides,
    /// rules, or flags.
    #[must_use]
    pub const fn repository(&self) -> &TriageRepository {
        &self.repository
    }

    /// Triage one page of mail.
    ///
    /// Results follow the order of the source's listing. Pages are cached
    /// by `(limit, page_token)`; a cached page is returned as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails to list the page or storage
    /// fails.
    pub async fn triage_page<S: MailSource>(
        &self,
        source: &S,
        limit: u32,
        page_token: Option<&str>,
    ) -> std::result::Result<TriagePage, TriageServiceError> {
        let key = cache_key(limit, page_token);
        if let Some(page) = self.cache.get(&key).await {
            debug!(key, "Serving triage page from cache");
            return Ok(page);
        }

        let listing = source
            .list_page(limit, page_token)
            .await
            .map_err(|e| TriageServiceError::Source(e.to_string()))?;

        let mut items = Vec::with_capacity(listing.items.len());
        for email in listing.items {
            let triage = engine::classify(&email_for_triage(&email));
            self.repository.save_message_meta(&email).await?;
            self.repository.save_triage_result(&email.id, &triage).await?;
            let user_override = self.repository.get_override(&email.id).await?;
            items.push(TriageItem {
                email,
                triage,
                r#override: user_override,
            });
        }

        debug!(key, count = items.len(), "Classified triage page");
        let page = TriagePage {
            items,
            next_page_token: listing.next_page_token,
        };
        self.cache.insert(key, page.clone()).await;
        Ok(page)
    }

    /// Drops every cached page. Call after override writes or auth changes
    /// so stale annotations are not served.
    pub async fn invalidate(&self) {
        self.cache.clear().await;
    }
}

fn cache_key(limit: u32, page_token: Option<&str>) -> String {
    format!("{limit}:{}", page_token.unwrap_or(""))
}

fn email_for_triage(meta: &MessageMeta) -> EmailForTriage {
    EmailForTriage {
        from: meta.from.clone(),
        subject: meta.subject.clone(),
        snippet: meta.snippet.clone(),
        date: meta.date.clone(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::triage::Priority;

    struct FakeSource {
        calls: AtomicU32,
        fail: bool,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail: true,
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn meta(id: &str, from: &str, subject: &str, snippet: &str) -> MessageMeta {
        MessageMeta {
            id: id.to_string(),
            thread_id: format!("thread-{id}"),
            from: from.to_string(),
            subject: subject.to_string(),
            snippet: snippet.to_string(),
            date: "Mon, 17 Feb 2026 09:00:00 +0000".to_string(),
        }
    }

    impl MailSource for FakeSource {
        type Error = String;

        async fn list_page(
            &self,
            _limit: u32,
            _page_token: Option<&str>,
        ) -> std::result::Result<MessagePage, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err("listing failed".to_string());
            }
            Ok(MessagePage {
                items: vec![
                    meta(
                        "m1",
                        "alerts@example.com",
                        "Security alert",
                        "suspicious sign-in detected",
                    ),
                    meta("m2", "friend@example.com", "Lunch?", "Want to catch up"),
                ],
                next_page_token: Some("next-token".to_string()),
            })
        }
    }

    async fn service() -> TriageService {
        TriageService::new(TriageRepository::in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_page_is_classified_in_listing_order() {
        let service = service().await;
        let source = FakeSource::new();

        let page = service.triage_page(&source, 10, None).await.unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].email.id, "m1");
        assert_eq!(page.items[0].triage.category, "security");
        assert_eq!(page.items[0].triage.priority, Priority::P0);
        assert_eq!(page.items[1].email.id, "m2");
        assert_eq!(page.items[1].triage.category, "general");
        assert_eq!(page.next_page_token.as_deref(), Some("next-token"));
    }

    #[tokio::test]
    async fn test_results_are_persisted() {
        let service = service().await;
        let source = FakeSource::new();

        service.triage_page(&source, 10, None).await.unwrap();

        let stored = service
            .repository()
            .get_triage_result("m1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.category, "security");
    }

    #[tokio::test]
    async fn test_cache_hit_skips_the_source() {
        let service = service().await;
        let source = FakeSource::new();

        service.triage_page(&source, 10, None).await.unwrap();
        service.triage_page(&source, 10, None).await.unwrap();
        assert_eq!(source.call_count(), 1);

        // A different key is a different page.
        service.triage_page(&source, 25, None).await.unwrap();
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_a_refetch() {
        let service = service().await;
        let source = FakeSource::new();

        service.triage_page(&source, 10, None).await.unwrap();
        service.invalidate().await;
        service.triage_page(&source, 10, None).await.unwrap();

        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn test_override_is_attached() {
        let service = service().await;
        let source = FakeSource::new();

        service
            .repository()
            .upsert_override("m1", true, "handled", &[])
            .await
            .unwrap();

        let page = service.triage_page(&source, 10, None).await.unwrap();
        let item = &page.items[0];
        assert!(item.r#override.as_ref().unwrap().done);
        assert!(page.items[1].r#override.is_none());
    }

    #[tokio::test]
    async fn test_source_failure_surfaces_as_source_error() {
        let service = service().await;
        let source = FakeSource::failing();

        let err = service.triage_page(&source, 10, None).await.unwrap_err();
        assert!(matches!(err, TriageServiceError::Source(_)));
        assert!(err.to_string().contains("listing failed"));
    }

    #[tokio::test]
    async fn test_zero_ttl_cache_never_hits() {
        let repository = TriageRepository::in_memory().await.unwrap();
        let service = TriageService::with_cache_ttl(repository, Duration::ZERO);
        let source = FakeSource::new();

        service.triage_page(&source, 10, None).await.unwrap();
        service.triage_page(&source, 10, None).await.unwrap();

        assert_eq!(source.call_count(), 2);
    }
}
