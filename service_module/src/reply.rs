use qbo_module::ActionResult;

/// `"Re: {original subject} - Success"` or `"... - Failed"`. An existing
/// `Re:` prefix is kept rather than stacked.
pub fn reply_subject(original: &str, success: bool) -> String {
    let trimmed = original.trim();
    let base = if trimmed.is_empty() {
        "Re: (no subject)".to_string()
    } else if trimmed.to_lowercase().starts_with("re:") {
        trimmed.to_string()
    } else {
        format!("Re: {}", trimmed)
    };
    let status = if success { "Success" } else { "Failed" };
    format!("{} - {}", base, status)
}

/// The reply body: the result message, then one `key: value` line per
/// identifier the handler produced.
pub fn reply_body(result: &ActionResult) -> String {
    let mut body = result.message.clone();
    if !result.identifiers.is_empty() {
        body.push_str("\n");
        for (key, value) in &result.identifiers {
            body.push_str(&format!("\n{}: {}", key, value));
        }
    }
    body
}

/// Build the outgoing `References` chain: the original chain with the
/// replied-to message id appended when it is not already present.
pub fn reply_references(
    original_references: Option<&str>,
    message_id: Option<&str>,
) -> Option<String> {
    let mut references = original_references
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    if let Some(msg_id) = message_id.map(str::trim).filter(|value| !value.is_empty()) {
        references = match references {
            Some(existing) => {
                if references_contains(&existing, msg_id) {
                    Some(existing)
                } else {
                    Some(format!("{} {}", existing, msg_id))
                }
            }
            None => Some(msg_id.to_string()),
        };
    }

    references
}

fn references_contains(references: &str, message_id: &str) -> bool {
    references
        .split_whitespace()
        .any(|entry| entry == message_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_carries_status_suffix() {
        assert_eq!(
            reply_subject("What is this?", false),
            "Re: What is this? - Failed"
        );
        assert_eq!(
            reply_subject("Generate invoice for estimate #777", true),
            "Re: Generate invoice for estimate #777 - Success"
        );
    }

    #[test]
    fn existing_re_prefix_is_not_stacked() {
        assert_eq!(reply_subject("Re: ping", false), "Re: ping - Failed");
        assert_eq!(reply_subject("RE: ping", true), "RE: ping - Success");
    }

    #[test]
    fn empty_subject_gets_a_placeholder() {
        assert_eq!(reply_subject("  ", false), "Re: (no subject) - Failed");
    }

    #[test]
    fn body_lists_identifiers_after_message() {
        let result = ActionResult::success("Generated invoice 1042 from Estimate 777.")
            .with_identifier("invoiceId", "321")
            .with_identifier("url", "https://app.example.com/app/invoice?txnId=321");
        let body = reply_body(&result);
        assert!(body.starts_with("Generated invoice 1042 from Estimate 777.\n"));
        assert!(body.contains("\ninvoiceId: 321"));
        assert!(body.ends_with("url: https://app.example.com/app/invoice?txnId=321"));
    }

    #[test]
    fn body_without_identifiers_is_just_the_message() {
        let result = ActionResult::failure("Unrecognized command.");
        assert_eq!(reply_body(&result), "Unrecognized command.");
    }

    #[test]
    fn references_chain_appends_message_id_once() {
        assert_eq!(
            reply_references(Some("<a@x> <b@x>"), Some("<c@x>")).as_deref(),
            Some("<a@x> <b@x> <c@x>")
        );
        assert_eq!(
            reply_references(Some("<a@x> <b@x>"), Some("<b@x>")).as_deref(),
            Some("<a@x> <b@x>")
        );
        assert_eq!(reply_references(None, Some("<c@x>")).as_deref(), Some("<c@x>"));
        assert_eq!(reply_references(None, None), None);
    }
}
