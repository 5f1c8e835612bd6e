//! Outbound reply assembly and sending.
//!
//! Replies are rendered as RFC 2822 text, base64url-encoded, and submitted
//! to the provider's send endpoint with the original thread id so the
//! conversation stays threaded.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::Deserialize;
use tracing::info;

use crate::messages::{GmailClient, GmailError};

/// A reply to an inbound message.
#[derive(Debug, Clone)]
pub struct OutboundReply {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub thread_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendResponse {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: Option<String>,
}

/// Render the reply as an RFC 2822 message.
pub fn render_rfc2822(reply: &OutboundReply) -> String {
    let mut message = String::new();
    message.push_str(&format!("From: {}\r\n", reply.from));
    message.push_str(&format!("To: {}\r\n", reply.to));
    message.push_str(&format!("Subject: {}\r\n", reply.subject));
    if let Some(in_reply_to) = &reply.in_reply_to {
        message.push_str(&format!("In-Reply-To: {}\r\n", in_reply_to));
    }
    if let Some(references) = &reply.references {
        message.push_str(&format!("References: {}\r\n", references));
    }
    message.push_str("MIME-Version: 1.0\r\n");
    message.push_str("Content-Type: text/plain; charset=utf-8\r\n");
    message.push_str("\r\n");
    message.push_str(&reply.body);
    message
}

impl GmailClient {
    /// Send a reply via the provider's send endpoint.
    pub fn send_reply(&self, reply: &OutboundReply) -> Result<SendResponse, GmailError> {
        let raw = URL_SAFE.encode(render_rfc2822(reply).as_bytes());
        let mut payload = serde_json::json!({ "raw": raw });
        if let Some(thread_id) = &reply.thread_id {
            payload["threadId"] = serde_json::Value::String(thread_id.clone());
        }

        let url = format!("{}/messages/send", self.base_url);
        let response =
            self.send_with_auth(|http, token| http.post(&url).bearer_auth(token).json(&payload))?;
        let sent: SendResponse = response.json().map_err(|e| GmailError::Json(e.to_string()))?;
        info!("sent reply to {} (message id {})", reply.to, sent.id);
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{GmailAuth, GmailAuthConfig};

    fn sample_reply() -> OutboundReply {
        OutboundReply {
            from: "agent@example.com".to_string(),
            to: "Alice <alice@example.com>".to_string(),
            subject: "Re: Invoice please - Success".to_string(),
            body: "Invoice 1042 created.".to_string(),
            thread_id: Some("t1".to_string()),
            in_reply_to: Some("<orig@mail.example.com>".to_string()),
            references: Some("<root@mail.example.com> <orig@mail.example.com>".to_string()),
        }
    }

    #[test]
    fn rendered_reply_carries_threading_headers() {
        let rendered = render_rfc2822(&sample_reply());
        assert!(rendered.starts_with("From: agent@example.com\r\n"));
        assert!(rendered.contains("Subject: Re: Invoice please - Success\r\n"));
        assert!(rendered.contains("In-Reply-To: <orig@mail.example.com>\r\n"));
        assert!(rendered
            .contains("References: <root@mail.example.com> <orig@mail.example.com>\r\n"));
        assert!(rendered.ends_with("\r\n\r\nInvoice 1042 created."));
    }

    #[test]
    fn rendered_reply_omits_absent_threading_headers() {
        let mut reply = sample_reply();
        reply.in_reply_to = None;
        reply.references = None;
        let rendered = render_rfc2822(&reply);
        assert!(!rendered.contains("In-Reply-To:"));
        assert!(!rendered.contains("References:"));
    }

    #[test]
    fn send_posts_raw_payload_with_thread_id() {
        let mut server = mockito::Server::new();
        let reply = sample_reply();
        let expected_raw = URL_SAFE.encode(render_rfc2822(&reply).as_bytes());
        let mock = server
            .mock("POST", "/messages/send")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "raw": expected_raw,
                "threadId": "t1",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"sent-1","threadId":"t1"}"#)
            .expect(1)
            .create();

        let auth = GmailAuth::new(GmailAuthConfig {
            access_token: Some("tok".to_string()),
            ..Default::default()
        })
        .expect("auth");
        let client = GmailClient::with_base_url(auth, server.url());
        let sent = client.send_reply(&reply).expect("send");
        assert_eq!(sent.id, "sent-1");
        mock.assert();
    }
}
