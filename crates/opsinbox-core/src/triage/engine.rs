//! Deterministic triage engine.
//!
//! A pure scoring pass over static rule tables: sender-domain rules and
//! keyword rules accumulate per-bucket scores, the winning bucket gets a
//! recency boost, and a bounded confidence is derived from signal volume and
//! the winner's margin over the runner-up. Total over arbitrary string
//! inputs; a date that fails to parse simply means no recency boost.

use chrono::{DateTime, Duration, Utc};

use super::model::{EmailForTriage, Priority, TriageResult};

/// Internal scoring bucket. Mapped to a public category label on output
/// (`Jobs` surfaces as `career`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScoreKey {
    Security,
    Billing,
    Operations,
    Jobs,
    Learning,
    Low,
    General,
}

/// Fixed bucket order. Scores are sorted with a stable sort, so this order
/// is also the tie-break order when two buckets score exactly the same.
const SCORE_KEYS: [ScoreKey; 7] = [
    ScoreKey::Security,
    ScoreKey::Billing,
    ScoreKey::Operations,
    ScoreKey::Jobs,
    ScoreKey::Learning,
    ScoreKey::Low,
    ScoreKey::General,
];

/// Baseline for the `general` bucket so a zero-signal email still has a
/// deterministic winner.
const GENERAL_BASELINE: f64 = 0.25;

/// Per-extra-keyword bonus within a single rule, and its cap.
const STACKED_MATCH_BONUS: f64 = 0.05;
const STACKED_MATCH_CAP: f64 = 0.15;

/// Messages older than this get no recency boost.
const RECENCY_WINDOW_HOURS: i64 = 48;

/// Confidence formula constants.
const CONFIDENCE_BASE: f64 = 0.55;
const CONFIDENCE_PER_SIGNAL: f64 = 0.05;
const CONFIDENCE_SIGNAL_CAP: u32 = 5;
const CONFIDENCE_MARGIN_SCALE: f64 = 0.25;
const CONFIDENCE_MIN: f64 = 0.60;
const CONFIDENCE_MAX: f64 = 0.98;

/// Fixed presentation data for a bucket.
struct CategoryProfile {
    priority: Priority,
    category: &'static str,
    summary: &'static str,
    action: &'static str,
}

const fn profile(key: ScoreKey) -> CategoryProfile {
    match key {
        ScoreKey::Security => CategoryProfile {
            priority: Priority::P0,
            category: "security",
            summary: "Security-related email. Review immediately.",
            action: "Open and verify account activity.",
        },
        ScoreKey::Billing => CategoryProfile {
            priority: Priority::P1,
            category: "billing",
            summary: "Billing-related email needs prompt review.",
            action: "Check charges, invoice, and payment status.",
        },
        ScoreKey::Operations => CategoryProfile {
            priority: Priority::P1,
            category: "operations",
            summary: "Operational alert likely requiring quick action.",
            action: "Review logs or system status and resolve failures.",
        },
        ScoreKey::Jobs => CategoryProfile {
            priority: Priority::P2,
            category: "career",
            summary: "Career-related email requiring normal follow-up.",
            action: "Review opportunity details and respond if relevant.",
        },
        ScoreKey::Learning => CategoryProfile {
            priority: Priority::P2,
            category: "learning",
            summary: "Learning content or course update.",
            action: "Schedule review when available.",
        },
        ScoreKey::Low => CategoryProfile {
            priority: Priority::P3,
            category: "low",
            summary: "Low-priority informational or promotional email.",
            action: "Archive, unsubscribe, or read later.",
        },
        ScoreKey::General => CategoryProfile {
            priority: Priority::P2,
            category: "general",
            summary: "General email requiring normal attention.",
            action: "Review and respond as appropriate.",
        },
    }
}

/// Sender-domain rule, matched by suffix against the extracted domain.
struct DomainRule {
    domains: &'static [&'static str],
    score_key: ScoreKey,
    weight: f64,
}

/// Keyword rule, matched case-insensitively as substrings of
/// `subject + " " + snippet`.
struct KeywordRule {
    keywords: &'static [&'static str],
    score_key: ScoreKey,
    weight: f64,
}

const DOMAIN_RULES: &[DomainRule] = &[
    DomainRule {
        domains: &["github.com"],
        score_key: ScoreKey::Operations,
        weight: 0.45,
    },
    DomainRule {
        domains: &["linkedin.com", "cvkeskus.ee", "cv.ee"],
        score_key: ScoreKey::Jobs,
        weight: 0.4,
    },
    DomainRule {
        domains: &["coursera.org", "udemy.com"],
        score_key: ScoreKey::Learning,
        weight: 0.35,
    },
];

const KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule {
        keywords: &[
            "verification code",
            "verify",
            "2fa",
            "security alert",
            "suspicious",
            "password reset",
        ],
        score_key: ScoreKey::Security,
        weight: 0.5,
    },
    KeywordRule {
        keywords: &[
            "invoice",
            "receipt",
            "payment failed",
            "subscription canceled",
            "charge",
            "billing",
        ],
        score_key: ScoreKey::Billing,
        weight: 0.45,
    },
    KeywordRule {
        keywords: &[
            "ci failed",
            "build failed",
            "incident",
            "outage",
            "failing checks",
        ],
        score_key: ScoreKey::Operations,
        weight: 0.45,
    },
    KeywordRule {
        keywords: &["job alert", "interview", "application", "bonus", "offer"],
        score_key: ScoreKey::Jobs,
        weight: 0.35,
    },
    KeywordRule {
        keywords: &["course", "learning path", "assignment due", "certificate"],
        score_key: ScoreKey::Learning,
        weight: 0.3,
    },
    KeywordRule {
        keywords: &["newsletter", "unsubscribe", "digest", "no-reply"],
        score_key: ScoreKey::Low,
        weight: 0.35,
    },
];

/// Classifies an email against the static rule tables.
///
/// Never fails: every combination of string fields (including empty and
/// malformed ones) produces a well-formed [`TriageResult`].
#[must_use]
pub fn classify(email: &EmailForTriage) -> TriageResult {
    classify_at(email, Utc::now())
}

/// Classifies with an explicit "now", so recency behavior is testable.
#[must_use]
pub fn classify_at(email: &EmailForTriage, now: DateTime<Utc>) -> TriageResult {
    let text = format!("{} {}", email.subject, email.snippet).to_lowercase();
    let domain = extract_domain(&email.from);

    let mut scores: Vec<(ScoreKey, f64)> = SCORE_KEYS
        .iter()
        .map(|&key| {
            let baseline = if key == ScoreKey::General {
                GENERAL_BASELINE
            } else {
                0.0
            };
            (key, baseline)
        })
        .collect();
    let mut signal_count: u32 = 0;

    for rule in DOMAIN_RULES {
        if rule.domains.iter().any(|known| domain.ends_with(known)) {
            add_score(&mut scores, rule.score_key, rule.weight);
            signal_count += 1;
        }
    }

    for rule in KEYWORD_RULES {
        let matches = rule
            .keywords
            .iter()
            .filter(|keyword| text.contains(**keyword))
            .count();
        if matches > 0 {
            #[allow(clippy::cast_precision_loss)]
            let stacked = ((matches - 1) as f64 * STACKED_MATCH_BONUS).min(STACKED_MATCH_CAP);
            add_score(&mut scores, rule.score_key, rule.weight + stacked);
            #[allow(clippy::cast_possible_truncation)]
            {
                signal_count += matches as u32;
            }
        }
    }

    // Stable sort: exact ties keep the SCORE_KEYS declaration order.
    scores.sort_by(|a, b| b.1.total_cmp(&a.1));

    let (top_key, top_score) = scores[0];
    let second_score = scores[1].1;
    let boosted_top = top_score + recency_boost(&email.date, top_key, now);

    let confidence = (CONFIDENCE_BASE
        + f64::from(signal_count.min(CONFIDENCE_SIGNAL_CAP)) * CONFIDENCE_PER_SIGNAL
        + (boosted_top - second_score).max(0.0) * CONFIDENCE_MARGIN_SCALE)
        .clamp(CONFIDENCE_MIN, CONFIDENCE_MAX);

    let profile = profile(top_key);
    TriageResult {
        priority: profile.priority,
        category: profile.category.to_string(),
        summary: profile.summary.to_string(),
        action: profile.action.to_string(),
        confidence: round_to_hundredths(confidence),
    }
}

fn add_score(scores: &mut [(ScoreKey, f64)], key: ScoreKey, amount: f64) {
    if let Some(entry) = scores.iter_mut().find(|(k, _)| *k == key) {
        entry.1 += amount;
    }
}

/// Fixed additive boost for the winning bucket, based on message age.
/// Unparseable, future-dated, or stale (>48h) messages get no boost.
fn recency_boost(date: &str, key: ScoreKey, now: DateTime<Utc>) -> f64 {
    let Some(parsed) = parse_message_date(date) else {
        return 0.0;
    };

    let age = now.signed_duration_since(parsed);
    if age < Duration::zero() || age > Duration::hours(RECENCY_WINDOW_HOURS) {
        return 0.0;
    }

    match key {
        ScoreKey::Security | ScoreKey::Billing | ScoreKey::Operations => 0.12,
        ScoreKey::Jobs | ScoreKey::Learning => 0.08,
        ScoreKey::Low | ScoreKey::General => 0.04,
    }
}

/// Parses a message `Date:` value. RFC 2822 first (the header format),
/// RFC 3339 as a fallback for sources that hand us ISO timestamps.
fn parse_message_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(trimmed)
        .or_else(|_| DateTime::parse_from_rfc3339(trimmed))
    {
        return Some(parsed.with_timezone(&Utc));
    }

    // Real-world Date: headers sometimes carry a weekday name that does not
    // match the date, which strict RFC 2822 parsing rejects. Drop the
    // weekday and take the rest.
    let (_, rest) = trimmed.split_once(',')?;
    DateTime::parse_from_rfc2822(rest.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Derives a comparable sender domain from a raw `From:` header.
///
/// Lowercases the header, prefers the contents of an angle-bracket address,
/// falls back to the first bare address anywhere in the string, and returns
/// `""` when neither is present. The empty domain then fails every
/// suffix check safely.
#[must_use]
pub fn extract_domain(from: &str) -> String {
    let lower = from.to_lowercase();
    let address = angle_bracket_address(&lower).or_else(|| bare_address(&lower));
    let Some(address) = address else {
        return String::new();
    };
    address
        .split('@')
        .nth(1)
        .map_or_else(String::new, ToString::to_string)
}

/// Non-empty contents of the first `<...>` pair, if any.
fn angle_bracket_address(lower: &str) -> Option<&str> {
    let start = lower.find('<')?;
    let rest = &lower[start + 1..];
    let end = rest.find('>')?;
    let inner = &rest[..end];
    if inner.is_empty() { None } else { Some(inner) }
}

fn is_local_char(byte: u8) -> bool {
    byte.is_ascii_lowercase() || byte.is_ascii_digit() || matches!(byte, b'.' | b'_' | b'%' | b'+' | b'-')
}

fn is_domain_char(byte: u8) -> bool {
    byte.is_ascii_lowercase() || byte.is_ascii_digit() || matches!(byte, b'.' | b'-')
}

/// First bare address in an already-lowercased string: a run of local-part
/// characters, `@`, and a dotted domain ending in an alphabetic label of at
/// least two characters.
fn bare_address(lower: &str) -> Option<&str> {
    let bytes = lower.as_bytes();
    for (at, &byte) in bytes.iter().enumerate() {
        if byte != b'@' {
            continue;
        }

        let mut start = at;
        while start > 0 && is_local_char(bytes[start - 1]) {
            start -= 1;
        }
        if start == at {
            continue;
        }

        let mut end = at + 1;
        while end < bytes.len() && is_domain_char(bytes[end]) {
            end += 1;
        }

        // Trim the domain run back to the longest prefix that still ends in
        // a dot followed by two or more letters.
        let mut domain_end = end;
        while domain_end > at + 1 {
            if has_alphabetic_tld(&lower[at + 1..domain_end]) {
                return Some(&lower[start..domain_end]);
            }
            domain_end -= 1;
        }
    }
    None
}

fn has_alphabetic_tld(domain: &str) -> bool {
    let Some(dot) = domain.rfind('.') else {
        return false;
    };
    let label = &domain[dot + 1..];
    label.len() >= 2 && label.bytes().all(|byte| byte.is_ascii_lowercase())
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const KNOWN_CATEGORIES: [&str; 7] = [
        "security",
        "billing",
        "operations",
        "career",
        "learning",
        "low",
        "general",
    ];

    fn email(from: &str, subject: &str, snippet: &str, date: &str) -> EmailForTriage {
        EmailForTriage {
            from: from.to_string(),
            subject: subject.to_string(),
            snippet: snippet.to_string(),
            date: date.to_string(),
        }
    }

    /// One hour after the fixed date used by most test emails.
    fn reference_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-17T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_security_keywords_escalate_to_p0() {
        let result = classify_at(
            &email(
                "alerts@example.com",
                "SECURITY ALERT",
                "suspicious sign-in detected",
                "Mon, 17 Feb 2026 09:00:00 +0000",
            ),
            reference_now(),
        );

        assert_eq!(result.priority, Priority::P0);
        assert_eq!(result.category, "security");
    }

    #[test]
    fn test_billing_keywords_rank_p1() {
        let result = classify_at(
            &email(
                "billing@example.com",
                "Invoice available",
                "payment failed on your card",
                "Mon, 17 Feb 2026 09:00:00 +0000",
            ),
            reference_now(),
        );

        assert_eq!(result.priority, Priority::P1);
        assert_eq!(result.category, "billing");
    }

    #[test]
    fn test_github_domain_routes_to_operations() {
        let result = classify_at(
            &email(
                "GitHub <notifications@github.com>",
                "Repository notification",
                "CI checks finished",
                "Mon, 17 Feb 2026 09:00:00 +0000",
            ),
            reference_now(),
        );

        assert_eq!(result.category, "operations");
        assert_eq!(result.priority, Priority::P1);
    }

    #[test]
    fn test_linkedin_domain_routes_to_career() {
        let result = classify_at(
            &email(
                "LinkedIn <jobs-noreply@linkedin.com>",
                "Your weekly opportunities",
                "New roles and bonus information",
                "Mon, 17 Feb 2026 09:00:00 +0000",
            ),
            reference_now(),
        );

        assert_eq!(result.category, "career");
        assert_eq!(result.priority, Priority::P2);
    }

    #[test]
    fn test_unmatched_email_falls_back_to_general() {
        let result = classify_at(
            &email(
                "friend@example.com",
                "Lunch?",
                "Want to catch up",
                "Mon, 17 Feb 2026 09:00:00 +0000",
            ),
            reference_now(),
        );

        assert_eq!(result.priority, Priority::P2);
        assert_eq!(result.category, "general");
    }

    #[test]
    fn test_recent_message_confidence_is_monotone() {
        let now = reference_now();
        let recent = classify_at(
            &email(
                "alerts@example.com",
                "Security alert",
                "suspicious sign-in detected",
                "Mon, 17 Feb 2026 09:00:00 +0000",
            ),
            now,
        );
        let stale = classify_at(
            &email(
                "alerts@example.com",
                "Security alert",
                "suspicious sign-in detected",
                "Sat, 1 Feb 2025 09:00:00 +0000",
            ),
            now,
        );

        assert!(recent.confidence >= stale.confidence);
        assert!(recent.confidence > stale.confidence);
    }

    #[test]
    fn test_overlapping_signals_push_confidence_up() {
        let result = classify_at(
            &email(
                "alerts@github.com",
                "CI failed on main",
                "build failed and failing checks",
                "Mon, 17 Feb 2026 09:00:00 +0000",
            ),
            reference_now(),
        );

        assert_eq!(result.category, "operations");
        assert!(result.confidence >= 0.8);
    }

    #[test]
    fn test_stacked_keywords_within_one_rule_are_capped() {
        // All six billing keywords present: weight 0.45 + capped bonus 0.15.
        let result = classify_at(
            &email(
                "billing@example.com",
                "invoice receipt charge",
                "payment failed, subscription canceled, billing",
                "Mon, 17 Feb 2026 09:00:00 +0000",
            ),
            reference_now(),
        );

        assert_eq!(result.category, "billing");
        // 0.45 + 0.15 + 0.12 boost = 0.72 over general 0.25; six signals cap
        // at five. 0.55 + 0.25 + 0.47 * 0.25 = 0.9175.
        assert_eq!(result.confidence, 0.92);
    }

    #[test]
    fn test_exact_tie_resolves_in_declaration_order() {
        // "invoice" (billing, 0.45) against "outage" (operations, 0.45):
        // billing is declared first, so it must win the tie.
        let result = classify_at(
            &email(
                "someone@example.com",
                "invoice outage",
                "",
                "Mon, 17 Feb 2026 09:00:00 +0000",
            ),
            reference_now(),
        );

        assert_eq!(result.category, "billing");
    }

    #[test]
    fn test_boost_cannot_change_the_winner() {
        // Jobs wins pre-boost; a recent date boosts jobs, not the runner-up.
        let result = classify_at(
            &email(
                "jobs-noreply@linkedin.com",
                "interview",
                "newsletter digest",
                "Mon, 17 Feb 2026 09:00:00 +0000",
            ),
            reference_now(),
        );

        assert_eq!(result.category, "career");
    }

    #[test]
    fn test_future_dated_message_gets_no_boost() {
        let now = reference_now();
        let future = classify_at(
            &email(
                "alerts@example.com",
                "Security alert",
                "suspicious",
                "Wed, 17 Feb 2027 09:00:00 +0000",
            ),
            now,
        );
        let stale = classify_at(
            &email(
                "alerts@example.com",
                "Security alert",
                "suspicious",
                "Sat, 1 Feb 2025 09:00:00 +0000",
            ),
            now,
        );

        assert_eq!(future.confidence, stale.confidence);
    }

    #[test]
    fn test_garbage_date_degrades_to_no_boost() {
        let result = classify_at(
            &email("a@b.com", "security alert", "", "not a date at all"),
            reference_now(),
        );

        assert_eq!(result.category, "security");
        assert!(result.confidence >= 0.60);
    }

    #[test]
    fn test_empty_email_is_general_with_floor_confidence() {
        let result = classify_at(&email("", "", "", ""), reference_now());

        assert_eq!(result.category, "general");
        assert_eq!(result.priority, Priority::P2);
        // Zero signals, no boost: 0.55 + 0.25 * 0.25 = 0.6125.
        assert_eq!(result.confidence, 0.61);
    }

    #[test]
    fn test_mismatched_weekday_still_parses() {
        // 2026-02-17 is a Tuesday; a "Mon," prefix must not lose the boost.
        let now = reference_now();
        let mismatched = classify_at(
            &email(
                "alerts@example.com",
                "security alert",
                "",
                "Mon, 17 Feb 2026 09:00:00 +0000",
            ),
            now,
        );
        let correct = classify_at(
            &email(
                "alerts@example.com",
                "security alert",
                "",
                "Tue, 17 Feb 2026 09:00:00 +0000",
            ),
            now,
        );

        assert_eq!(mismatched.confidence, correct.confidence);
    }

    #[test]
    fn test_rfc3339_dates_also_get_the_boost() {
        let now = reference_now();
        let rfc3339 = classify_at(
            &email(
                "alerts@example.com",
                "security alert",
                "",
                "2026-02-17T09:00:00Z",
            ),
            now,
        );
        let unparsed = classify_at(
            &email("alerts@example.com", "security alert", "", "yesterday-ish"),
            now,
        );

        assert!(rfc3339.confidence > unparsed.confidence);
    }

    #[test]
    fn test_extract_domain_prefers_angle_bracket_address() {
        assert_eq!(
            extract_domain("GitHub <notifications@github.com>"),
            "github.com"
        );
        assert_eq!(
            extract_domain("\"Billing Team\" <BILLING@Stripe.Com>"),
            "stripe.com"
        );
    }

    #[test]
    fn test_extract_domain_falls_back_to_bare_address() {
        assert_eq!(extract_domain("alerts@example.com"), "example.com");
        assert_eq!(
            extract_domain("reply to jobs-noreply@linkedin.com please"),
            "linkedin.com"
        );
    }

    #[test]
    fn test_extract_domain_handles_malformed_input() {
        assert_eq!(extract_domain(""), "");
        assert_eq!(extract_domain("no address here"), "");
        assert_eq!(extract_domain("<>"), "");
        assert_eq!(extract_domain("<no-at-sign>"), "");
        assert_eq!(extract_domain("trailing-dot@mail.example.com."), "mail.example.com");
    }

    #[test]
    fn test_domain_match_is_suffix_based() {
        let result = classify_at(
            &email(
                "ci@mail.github.com",
                "Weekly summary",
                "",
                "Mon, 17 Feb 2026 09:00:00 +0000",
            ),
            reference_now(),
        );

        assert_eq!(result.category, "operations");
    }

    proptest! {
        #[test]
        fn prop_classify_is_total_and_well_formed(
            from in ".*",
            subject in ".*",
            snippet in ".*",
            date in ".*",
        ) {
            let result = classify_at(
                &EmailForTriage { from, subject, snippet, date },
                Utc::now(),
            );

            prop_assert!(result.confidence >= 0.60);
            prop_assert!(result.confidence <= 0.98);
            // Rounded to exactly two decimal places.
            prop_assert!((result.confidence * 100.0 - (result.confidence * 100.0).round()).abs() < 1e-9);
            prop_assert!(KNOWN_CATEGORIES.contains(&result.category.as_str()));
            prop_assert!(!result.summary.is_empty());
            prop_assert!(!result.action.is_empty());
        }
    }
}
