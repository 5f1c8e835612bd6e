//! Mailbox REST client: list unread mail, fetch full messages, decode
//! transport-encoded bodies, and clear the unread label.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::{GmailAuth, GmailAuthError};

const DEFAULT_API_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Fixed delay before the single retry of a transient transport failure.
const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum GmailError {
    #[error(transparent)]
    Auth(#[from] GmailAuthError),
    #[error("http error: {0}")]
    Http(String),
    #[error("mailbox API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("json error: {0}")]
    Json(String),
}

/// One entry from the list-unread response.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: String,
}

#[derive(Debug, Deserialize)]
struct ListMessagesResponse {
    messages: Option<Vec<MessageRef>>,
}

/// A full message with its header/part tree.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: String,
    pub payload: Option<MessagePayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagePayload {
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    pub headers: Option<Vec<MessageHeader>>,
    pub body: Option<MessagePartBody>,
    pub parts: Option<Vec<MessagePart>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    pub body: Option<MessagePartBody>,
    pub parts: Option<Vec<MessagePart>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagePartBody {
    #[serde(rename = "attachmentId")]
    pub attachment_id: Option<String>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

impl Message {
    /// Look up a header by case-insensitive name.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()
            .and_then(|payload| payload.headers.as_ref())
            .and_then(|headers| {
                headers
                    .iter()
                    .find(|header| header.name.eq_ignore_ascii_case(name))
                    .map(|header| header.value.as_str())
            })
    }

    /// Decode the message body, preferring the first `text/plain` leaf of the
    /// part tree, then `text/html`, then the top-level body.
    pub fn body_text(&self) -> Option<String> {
        let payload = self.payload.as_ref()?;

        if let Some(parts) = &payload.parts {
            for mime_type in ["text/plain", "text/html"] {
                if let Some(part) = find_part(parts, mime_type) {
                    if let Some(data) = part.body.as_ref().and_then(|body| body.data.as_deref()) {
                        return decode_base64url(data);
                    }
                }
            }
        }

        payload
            .body
            .as_ref()
            .and_then(|body| body.data.as_deref())
            .and_then(decode_base64url)
    }
}

/// Depth-first search for the first non-attachment part of the given MIME
/// type that actually carries data.
fn find_part<'a>(parts: &'a [MessagePart], mime_type: &str) -> Option<&'a MessagePart> {
    for part in parts {
        if part.mime_type.eq_ignore_ascii_case(mime_type) {
            if let Some(body) = &part.body {
                let has_data = body.data.as_deref().map_or(false, |data| !data.is_empty());
                if body.attachment_id.is_none() && has_data {
                    return Some(part);
                }
            }
        }
        if let Some(nested) = &part.parts {
            if let Some(found) = find_part(nested, mime_type) {
                return Some(found);
            }
        }
    }
    None
}

/// Decode base64url transport data. The provider omits padding, so pad to a
/// multiple of four before decoding.
pub fn decode_base64url(data: &str) -> Option<String> {
    let mut padded = data.trim_end_matches('=').to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    URL_SAFE
        .decode(padded.as_bytes())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
}

/// Client for the mailbox REST API.
#[derive(Debug, Clone)]
pub struct GmailClient {
    pub(crate) auth: GmailAuth,
    pub(crate) base_url: String,
    pub(crate) http: reqwest::blocking::Client,
}

impl GmailClient {
    pub fn new(auth: GmailAuth) -> Self {
        let base_url = std::env::var("GMAIL_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
        Self::with_base_url(auth, base_url)
    }

    pub fn with_base_url(auth: GmailAuth, base_url: impl Into<String>) -> Self {
        Self {
            auth,
            base_url: base_url.into(),
            http: reqwest::blocking::Client::new(),
        }
    }

    /// List unread message references.
    pub fn list_unread(&self) -> Result<Vec<MessageRef>, GmailError> {
        let url = format!("{}/messages?labelIds=UNREAD&q=is:unread", self.base_url);
        let response = self.send_with_auth(|http, token| http.get(&url).bearer_auth(token))?;
        let list: ListMessagesResponse =
            response.json().map_err(|e| GmailError::Json(e.to_string()))?;
        Ok(list.messages.unwrap_or_default())
    }

    /// Fetch a full message including its header/part tree.
    pub fn get_message(&self, id: &str) -> Result<Message, GmailError> {
        let url = format!("{}/messages/{}?format=full", self.base_url, id);
        let response = self.send_with_auth(|http, token| http.get(&url).bearer_auth(token))?;
        response.json().map_err(|e| GmailError::Json(e.to_string()))
    }

    /// Remove the unread label from a message.
    pub fn mark_read(&self, id: &str) -> Result<(), GmailError> {
        let url = format!("{}/messages/{}/modify", self.base_url, id);
        let body = serde_json::json!({ "removeLabelIds": ["UNREAD"] });
        self.send_with_auth(|http, token| http.post(&url).bearer_auth(token).json(&body))?;
        debug!("marked message {} as read", id);
        Ok(())
    }

    /// Issue an authenticated request with one fixed-delay retry on a
    /// transport failure and one refresh-and-retry on a 401.
    pub(crate) fn send_with_auth<F>(&self, build: F) -> Result<reqwest::blocking::Response, GmailError>
    where
        F: Fn(&reqwest::blocking::Client, &str) -> reqwest::blocking::RequestBuilder,
    {
        let token = self.auth.get_access_token()?;
        let response = match build(&self.http, &token).send() {
            Ok(response) => response,
            Err(err) => {
                warn!("mailbox request failed ({}), retrying once", err);
                std::thread::sleep(RETRY_DELAY);
                build(&self.http, &token)
                    .send()
                    .map_err(|e| GmailError::Http(e.to_string()))?
            }
        };

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("mailbox API returned 401, refreshing token and retrying");
            let token = self.auth.force_refresh()?;
            let response = build(&self.http, &token)
                .send()
                .map_err(|e| GmailError::Http(e.to_string()))?;
            return check_status(response);
        }
        check_status(response)
    }
}

fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, GmailError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(GmailError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::GmailAuthConfig;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn test_auth(token: &str) -> GmailAuth {
        GmailAuth::new(GmailAuthConfig {
            access_token: Some(token.to_string()),
            ..Default::default()
        })
        .expect("auth")
    }

    #[test]
    fn base64url_roundtrip_without_padding() {
        // Bodies whose encoded length is not a multiple of four.
        for original in ["a", "ab", "abcd", "hello world", "Grüße", "invoice #777, 25% deposit"] {
            let encoded = URL_SAFE_NO_PAD.encode(original.as_bytes());
            assert_eq!(decode_base64url(&encoded).as_deref(), Some(original));
        }
    }

    #[test]
    fn base64url_accepts_padded_input() {
        let encoded = URL_SAFE.encode("padded body".as_bytes());
        assert_eq!(decode_base64url(&encoded).as_deref(), Some("padded body"));
    }

    #[test]
    fn base64url_rejects_garbage() {
        assert_eq!(decode_base64url("!!!not base64!!!"), None);
    }

    fn message_from_json(json: serde_json::Value) -> Message {
        serde_json::from_value(json).expect("message")
    }

    #[test]
    fn body_prefers_plain_text_leaf_in_nested_multipart() {
        let plain = URL_SAFE_NO_PAD.encode("plain body");
        let html = URL_SAFE_NO_PAD.encode("<p>html body</p>");
        let message = message_from_json(serde_json::json!({
            "id": "m1",
            "threadId": "t1",
            "payload": {
                "mimeType": "multipart/mixed",
                "parts": [
                    {
                        "mimeType": "multipart/alternative",
                        "parts": [
                            { "mimeType": "text/html", "body": { "data": html } },
                            { "mimeType": "text/plain", "body": { "data": plain } }
                        ]
                    }
                ]
            }
        }));
        assert_eq!(message.body_text().as_deref(), Some("plain body"));
    }

    #[test]
    fn body_falls_back_to_html_then_top_level() {
        let html = URL_SAFE_NO_PAD.encode("<p>html only</p>");
        let message = message_from_json(serde_json::json!({
            "id": "m1",
            "threadId": "t1",
            "payload": {
                "mimeType": "multipart/alternative",
                "parts": [
                    { "mimeType": "text/html", "body": { "data": html } }
                ]
            }
        }));
        assert_eq!(message.body_text().as_deref(), Some("<p>html only</p>"));

        let top = URL_SAFE_NO_PAD.encode("top-level body");
        let message = message_from_json(serde_json::json!({
            "id": "m2",
            "threadId": "t1",
            "payload": {
                "mimeType": "text/plain",
                "body": { "data": top }
            }
        }));
        assert_eq!(message.body_text().as_deref(), Some("top-level body"));
    }

    #[test]
    fn body_skips_attachment_parts() {
        let plain = URL_SAFE_NO_PAD.encode("real body");
        let message = message_from_json(serde_json::json!({
            "id": "m1",
            "threadId": "t1",
            "payload": {
                "mimeType": "multipart/mixed",
                "parts": [
                    {
                        "mimeType": "text/plain",
                        "body": { "attachmentId": "att-1", "data": "aWdub3JlZA" }
                    },
                    { "mimeType": "text/plain", "body": { "data": plain } }
                ]
            }
        }));
        assert_eq!(message.body_text().as_deref(), Some("real body"));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let message = message_from_json(serde_json::json!({
            "id": "m1",
            "threadId": "t1",
            "payload": {
                "mimeType": "text/plain",
                "headers": [
                    { "name": "From", "value": "Alice <alice@example.com>" },
                    { "name": "Message-ID", "value": "<abc@mail.example.com>" }
                ]
            }
        }));
        assert_eq!(
            message.header_value("from"),
            Some("Alice <alice@example.com>")
        );
        assert_eq!(
            message.header_value("message-id"),
            Some("<abc@mail.example.com>")
        );
        assert_eq!(message.header_value("subject"), None);
    }

    #[test]
    fn list_unread_parses_refs() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/messages")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"messages":[{"id":"m1","threadId":"t1"},{"id":"m2","threadId":"t2"}]}"#)
            .expect(1)
            .create();

        let client = GmailClient::with_base_url(test_auth("tok"), server.url());
        let refs = client.list_unread().expect("list");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].id, "m1");
        assert_eq!(refs[1].thread_id, "t2");
        mock.assert();
    }

    #[test]
    fn list_unread_handles_empty_mailbox() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/messages")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"resultSizeEstimate":0}"#)
            .create();

        let client = GmailClient::with_base_url(test_auth("tok"), server.url());
        assert!(client.list_unread().expect("list").is_empty());
    }

    #[test]
    fn api_error_is_surfaced_with_status_and_body() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/messages")
            .match_query(mockito::Matcher::Any)
            .with_status(403)
            .with_body("forbidden")
            .create();

        let client = GmailClient::with_base_url(test_auth("tok"), server.url());
        match client.list_unread() {
            Err(GmailError::Api { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "forbidden");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn mark_read_posts_modify() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/messages/m1/modify")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"removeLabelIds":["UNREAD"]}"#.to_string(),
            ))
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create();

        let client = GmailClient::with_base_url(test_auth("tok"), server.url());
        client.mark_read("m1").expect("mark read");
        mock.assert();
    }
}
