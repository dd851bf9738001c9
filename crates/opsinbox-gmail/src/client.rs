//! Gmail REST API client.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{MessageDetail, MessageMeta, MessagePage};

const API_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Headers requested when listing message metadata.
const METADATA_HEADERS: [&str; 3] = ["Subject", "From", "Date"];

/// Client for the Gmail REST API, scoped to the authenticated user.
#[derive(Debug, Clone)]
pub struct GmailClient {
    http: Client,
    access_token: String,
}

impl GmailClient {
    /// Creates a client around a bearer access token.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            access_token: access_token.into(),
        }
    }

    /// Lists one page of message metadata, in the API's listing order.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` on a 401, `Api` on other failure statuses,
    /// and transport/JSON errors as-is.
    pub async fn list_messages(
        &self,
        limit: u32,
        page_token: Option<&str>,
    ) -> Result<MessagePage> {
        let mut request = self
            .http
            .get(format!("{API_BASE_URL}/messages"))
            .bearer_auth(&self.access_token)
            .query(&[("maxResults", limit.to_string())]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = check_status(request.send().await?, None)?;
        let listing: ListMessagesResponse = response.json().await?;

        let refs = listing.messages.unwrap_or_default();
        debug!(count = refs.len(), "Listed Gmail message page");

        let mut items = Vec::with_capacity(refs.len());
        for message_ref in refs {
            items.push(self.fetch_meta(&message_ref.id).await?);
        }

        Ok(MessagePage {
            items,
            next_page_token: listing.next_page_token,
        })
    }

    /// Fetches a single message in full, with its decoded plain-text body.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, `Unauthorized` on a 401, and
    /// transport/JSON/decode errors as-is.
    pub async fn get_message(&self, id: &str) -> Result<MessageDetail> {
        let request = self
            .http
            .get(format!("{API_BASE_URL}/messages/{id}"))
            .bearer_auth(&self.access_token)
            .query(&[("format", "full")]);

        let response = check_status(request.send().await?, Some(id))?;
        let message: RawMessage = response.json().await?;

        let headers = message
            .payload
            .as_ref()
            .map(|payload| header_map(&payload.headers))
            .unwrap_or_default();
        let plain_text_body = match message.payload.as_ref().and_then(find_plain_text) {
            Some(data) => Some(decode_base64url(data)?),
            None => None,
        };

        Ok(MessageDetail {
            id: message.id.unwrap_or_else(|| id.to_string()),
            thread_id: message.thread_id.unwrap_or_default(),
            snippet: message.snippet.unwrap_or_default(),
            headers,
            plain_text_body,
        })
    }

    async fn fetch_meta(&self, id: &str) -> Result<MessageMeta> {
        let mut request = self
            .http
            .get(format!("{API_BASE_URL}/messages/{id}"))
            .bearer_auth(&self.access_token)
            .query(&[("format", "metadata")]);
        for header in METADATA_HEADERS {
            request = request.query(&[("metadataHeaders", header)]);
        }

        let response = check_status(request.send().await?, Some(id))?;
        let message: RawMessage = response.json().await?;
        Ok(message_meta(id, message))
    }
}

/// Maps failure statuses onto typed errors.
fn check_status(response: Response, message_id: Option<&str>) -> Result<Response> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        Err(Error::Unauthorized)
    } else if status == StatusCode::NOT_FOUND {
        Err(Error::NotFound(message_id.unwrap_or("unknown").to_string()))
    } else if !status.is_success() {
        Err(Error::Api {
            status: status.as_u16(),
        })
    } else {
        Ok(response)
    }
}

fn message_meta(requested_id: &str, message: RawMessage) -> MessageMeta {
    let headers = message.payload.map(|payload| payload.headers).unwrap_or_default();

    MessageMeta {
        id: message.id.unwrap_or_else(|| requested_id.to_string()),
        thread_id: message.thread_id.unwrap_or_default(),
        from: header_value(&headers, "From"),
        subject: header_value(&headers, "Subject"),
        snippet: message.snippet.unwrap_or_default(),
        date: header_value(&headers, "Date"),
    }
}

/// Case-insensitive header lookup; missing headers come back empty.
fn header_value(headers: &[RawHeader], name: &str) -> String {
    headers
        .iter()
        .find(|header| {
            header
                .name
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|header| header.value.clone())
        .unwrap_or_default()
}

/// All named headers as a map, skipping nameless or valueless entries.
fn header_map(headers: &[RawHeader]) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|header| match (&header.name, &header.value) {
            (Some(name), Some(value)) => Some((name.clone(), value.clone())),
            _ => None,
        })
        .collect()
}

/// Finds the base64url payload of the first `text/plain` part.
///
/// A body directly on the payload wins; otherwise parts are searched
/// depth-first, matching how multipart messages nest alternatives.
fn find_plain_text(payload: &RawPayload) -> Option<&str> {
    if let Some(data) = payload.body.as_ref().and_then(|body| body.data.as_deref()) {
        if !data.is_empty() {
            return Some(data);
        }
    }
    find_plain_text_part(&payload.parts)
}

fn find_plain_text_part(parts: &[RawPayload]) -> Option<&str> {
    for part in parts {
        if part.mime_type.as_deref() == Some("text/plain") {
            if let Some(data) = part.body.as_ref().and_then(|body| body.data.as_deref()) {
                if !data.is_empty() {
                    return Some(data);
                }
            }
        }
        if let Some(nested) = find_plain_text_part(&part.parts) {
            return Some(nested);
        }
    }
    None
}

/// Decodes Gmail's base64url body data (padding optional) into text.
fn decode_base64url(data: &str) -> Result<String> {
    let bytes = URL_SAFE_NO_PAD.decode(data.trim_end_matches('='))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Option<Vec<MessageRef>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawMessage {
    id: Option<String>,
    thread_id: Option<String>,
    snippet: Option<String>,
    payload: Option<RawPayload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawPayload {
    mime_type: Option<String>,
    headers: Vec<RawHeader>,
    body: Option<RawBody>,
    parts: Vec<RawPayload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHeader {
    name: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBody {
    data: Option<String>,
}
