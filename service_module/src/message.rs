use gmail_module::Message;

/// A fully decoded inbound message, immutable once built and discarded
/// after dispatch.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub id: String,
    pub thread_id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    /// The `Message-ID` header, carried so the reply can thread.
    pub message_id: Option<String>,
    /// The `References` header chain, if the message is itself a reply.
    pub references: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("message {0} has no From header")]
    MissingFrom(String),
    #[error("message {0} has no decodable text body")]
    MissingBody(String),
}

impl ParsedMessage {
    /// Build from a full provider message. Subject may legitimately be
    /// absent; a missing sender or body makes the message undispatchable.
    pub fn from_full(message: &Message) -> Result<Self, ParseError> {
        let from = message
            .header_value("From")
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ParseError::MissingFrom(message.id.clone()))?
            .to_string();
        let body = message
            .body_text()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ParseError::MissingBody(message.id.clone()))?;

        Ok(Self {
            id: message.id.clone(),
            thread_id: message.thread_id.clone(),
            from,
            to: message.header_value("To").unwrap_or_default().to_string(),
            subject: message
                .header_value("Subject")
                .unwrap_or_default()
                .trim()
                .to_string(),
            body,
            message_id: message
                .header_value("Message-ID")
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            references: message
                .header_value("References")
                .or_else(|| message.header_value("In-Reply-To"))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    fn full_message(headers: &[(&str, &str)], body: &str) -> Message {
        let headers: Vec<serde_json::Value> = headers
            .iter()
            .map(|(name, value)| serde_json::json!({ "name": name, "value": value }))
            .collect();
        serde_json::from_value(serde_json::json!({
            "id": "m1",
            "threadId": "t1",
            "payload": {
                "mimeType": "text/plain",
                "headers": headers,
                "body": { "data": URL_SAFE_NO_PAD.encode(body.as_bytes()) }
            }
        }))
        .expect("message")
    }

    #[test]
    fn parses_headers_and_body() {
        let message = full_message(
            &[
                ("From", "Alice <alice@example.com>"),
                ("To", "agent@example.com"),
                ("Subject", "Generate invoice"),
                ("Message-ID", "<abc@mail.example.com>"),
            ],
            "please and thank you",
        );
        let parsed = ParsedMessage::from_full(&message).expect("parsed");
        assert_eq!(parsed.from, "Alice <alice@example.com>");
        assert_eq!(parsed.subject, "Generate invoice");
        assert_eq!(parsed.body, "please and thank you");
        assert_eq!(parsed.message_id.as_deref(), Some("<abc@mail.example.com>"));
        assert!(parsed.references.is_none());
    }

    #[test]
    fn missing_from_is_a_parse_error() {
        let message = full_message(&[("Subject", "hi")], "body");
        assert!(matches!(
            ParsedMessage::from_full(&message),
            Err(ParseError::MissingFrom(_))
        ));
    }

    #[test]
    fn missing_body_is_a_parse_error() {
        let message: Message = serde_json::from_value(serde_json::json!({
            "id": "m1",
            "threadId": "t1",
            "payload": {
                "mimeType": "text/plain",
                "headers": [{ "name": "From", "value": "a@example.com" }]
            }
        }))
        .expect("message");
        assert!(matches!(
            ParsedMessage::from_full(&message),
            Err(ParseError::MissingBody(_))
        ));
    }

    #[test]
    fn in_reply_to_backfills_references() {
        let message = full_message(
            &[
                ("From", "a@example.com"),
                ("In-Reply-To", "<root@mail.example.com>"),
            ],
            "body",
        );
        let parsed = ParsedMessage::from_full(&message).expect("parsed");
        assert_eq!(parsed.references.as_deref(), Some("<root@mail.example.com>"));
    }
}
