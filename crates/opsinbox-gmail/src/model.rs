//! Gmail message models.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata of one listed message.
///
/// All fields are plain strings straight from the API; a header the message
/// lacks comes back as `""`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMeta {
    /// Gmail message id.
    pub id: String,
    /// Gmail thread id.
    pub thread_id: String,
    /// Raw `From:` header.
    pub from: String,
    /// Raw subject line.
    pub subject: String,
    /// Short preview of the body text.
    pub snippet: String,
    /// Raw `Date:` header.
    pub date: String,
}

/// One page of listed messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    /// Messages in listing order.
    pub items: Vec<MessageMeta>,
    /// Opaque continuation token, absent on the last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Full detail of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDetail {
    /// Gmail message id.
    pub id: String,
    /// Gmail thread id.
    pub thread_id: String,
    /// Short preview of the body text.
    pub snippet: String,
    /// All headers, name to value.
    pub headers: BTreeMap<String, String>,
    /// Decoded `text/plain` body, when the message has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plain_text_body: Option<String>,
}
