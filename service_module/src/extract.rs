//! Keyword/pattern command extraction.
//!
//! A fixed, ordered list of trigger phrases is scanned against the subject
//! first, then the body; the first match selects the command kind. Secondary
//! patterns then pull the parameters relevant to that kind out of both
//! fields. A parameter absent from both fields stays unset — handlers
//! validate their own required parameters.

use regex::Regex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    GenerateInvoice,
    RecordPayment,
    GetReport,
    Unrecognized,
}

/// A command derived deterministically from one inbound message.
#[derive(Debug, Clone)]
pub struct Command {
    pub kind: CommandKind,
    pub parameters: HashMap<String, String>,
    pub source_subject: String,
    pub source_body: String,
    pub error: Option<String>,
}

impl Command {
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}

pub struct CommandExtractor {
    triggers: Vec<(CommandKind, Regex)>,
    estimate_id: Regex,
    deposit_before: Regex,
    deposit_after: Regex,
    send_method: Regex,
    amount: Vec<Regex>,
    invoice_ref: Regex,
    customer: Regex,
    report_keyword: Regex,
    pnl_phrase: Regex,
    period: Regex,
}

impl CommandExtractor {
    pub fn new() -> Self {
        let triggers = vec![
            (
                CommandKind::GenerateInvoice,
                Regex::new(r"(?i)\b(?:generate|create|make|prepare)\s+(?:a\s+|an\s+)?(?:new\s+)?invoice\b").unwrap(),
            ),
            (CommandKind::GenerateInvoice, Regex::new(r"(?i)\bnew\s+invoice\b").unwrap()),
            (
                CommandKind::RecordPayment,
                Regex::new(r"(?i)\b(?:record|log)\s+(?:a\s+)?payment\b").unwrap(),
            ),
            (CommandKind::RecordPayment, Regex::new(r"(?i)\bpayment\s+received\b").unwrap()),
            (
                CommandKind::GetReport,
                Regex::new(r"(?i)\b(?:run|get|send|generate)\s+(?:a\s+|the\s+)?(?:[\w&]+\s+)?report\b").unwrap(),
            ),
            (
                CommandKind::GetReport,
                Regex::new(r"(?i)\bprofit\s*(?:and|&)\s*loss\b").unwrap(),
            ),
            (CommandKind::GetReport, Regex::new(r"(?i)\bp\s*&\s*l\b").unwrap()),
        ];

        Self {
            triggers,
            estimate_id: Regex::new(r"(?i)estimate\s*#?\s*(\d+)").unwrap(),
            deposit_before: Regex::new(r"(?i)(\d{1,3})\s*%\s*deposit").unwrap(),
            deposit_after: Regex::new(r"(?i)deposit\s+(?:of\s+)?(\d{1,3})\s*%").unwrap(),
            send_method: Regex::new(r"(?i)send\s+(?:via|through|by)\s+(qbo|email)").unwrap(),
            amount: vec![
                Regex::new(r"\$\s*([\d,]+(?:\.\d+)?)").unwrap(),
                Regex::new(r"(?i)([\d,]+(?:\.\d+)?)\s*dollars").unwrap(),
                Regex::new(r"(?i)amount\s*(?:of|is|:)?\s*([\d,]+(?:\.\d+)?)").unwrap(),
            ],
            invoice_ref: Regex::new(r"(?i)invoice\s*#?\s*(\d[-\w]*)").unwrap(),
            customer: Regex::new(r"(?:from|From|by|By)\s+([A-Z][\w']*(?:\s+[A-Z][\w']*)*)").unwrap(),
            report_keyword: Regex::new(r"(?i)\b(?:run|get|send|generate)\s+(?:a\s+|the\s+)?([\w&]+)\s+report\b").unwrap(),
            pnl_phrase: Regex::new(r"(?i)\bprofit\s*(?:and|&)\s*loss\b|\bp\s*&\s*l\b").unwrap(),
            period: Regex::new(r"(?i)\b(last\s+month|this\s+month|this\s+year)\b").unwrap(),
        }
    }

    pub fn extract(&self, subject: &str, body: &str) -> Command {
        let kind = self.match_trigger(subject, body);
        let content = format!("{}\n{}", subject, body);

        let mut parameters = HashMap::new();
        match kind {
            Some(CommandKind::GenerateInvoice) => {
                if let Some(id) = self.capture(&self.estimate_id, &content) {
                    parameters.insert("estimate_id".to_string(), id);
                }
                if let Some(pct) = self
                    .capture(&self.deposit_before, &content)
                    .or_else(|| self.capture(&self.deposit_after, &content))
                {
                    parameters.insert("deposit_percent".to_string(), pct);
                }
                if let Some(method) = self.capture(&self.send_method, &content) {
                    parameters.insert("send_method".to_string(), method);
                }
            }
            Some(CommandKind::RecordPayment) => {
                if let Some(amount) = self
                    .amount
                    .iter()
                    .find_map(|pattern| self.capture(pattern, &content))
                {
                    parameters.insert("amount".to_string(), amount);
                }
                if let Some(invoice) = self.capture(&self.invoice_ref, &content) {
                    parameters.insert("invoice".to_string(), invoice);
                }
                if let Some(customer) = self.capture(&self.customer, &content) {
                    parameters.insert("customer".to_string(), customer);
                }
            }
            Some(CommandKind::GetReport) => {
                if self.pnl_phrase.is_match(&content) {
                    parameters.insert("report".to_string(), "ProfitAndLoss".to_string());
                } else if let Some(name) = self.capture(&self.report_keyword, &content) {
                    if !matches!(name.to_ascii_lowercase().as_str(), "a" | "the") {
                        parameters.insert("report".to_string(), name);
                    }
                }
                if let Some(period) = self.capture(&self.period, &content) {
                    parameters.insert("period".to_string(), period.to_ascii_lowercase());
                }
            }
            Some(CommandKind::Unrecognized) | None => {}
        }

        match kind {
            Some(kind) => Command {
                kind,
                parameters,
                source_subject: subject.to_string(),
                source_body: body.to_string(),
                error: None,
            },
            None => Command {
                kind: CommandKind::Unrecognized,
                parameters,
                source_subject: subject.to_string(),
                source_body: body.to_string(),
                error: Some(
                    "Unrecognized command: no known trigger phrase in subject or body."
                        .to_string(),
                ),
            },
        }
    }

    /// Subject is scanned before body; within a field the trigger list order
    /// decides ties. No scoring.
    fn match_trigger(&self, subject: &str, body: &str) -> Option<CommandKind> {
        for field in [subject, body] {
            for (kind, pattern) in &self.triggers {
                if pattern.is_match(field) {
                    return Some(*kind);
                }
            }
        }
        None
    }

    fn capture(&self, pattern: &Regex, content: &str) -> Option<String> {
        pattern
            .captures(content)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

impl Default for CommandExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> CommandExtractor {
        CommandExtractor::new()
    }

    #[test]
    fn trigger_in_subject_selects_kind() {
        let command = extractor().extract("Generate invoice for estimate #777", "see subject");
        assert_eq!(command.kind, CommandKind::GenerateInvoice);
    }

    #[test]
    fn trigger_in_body_selects_kind() {
        let command = extractor().extract(
            "Monday follow-up",
            "When you get a chance, please create an invoice from estimate #12.",
        );
        assert_eq!(command.kind, CommandKind::GenerateInvoice);
        assert_eq!(command.parameter("estimate_id"), Some("12"));
    }

    #[test]
    fn subject_trigger_wins_over_body_trigger() {
        let command = extractor().extract(
            "Record payment for invoice #1042",
            "...then generate invoice for estimate #5",
        );
        assert_eq!(command.kind, CommandKind::RecordPayment);
    }

    #[test]
    fn invoice_parameters_are_extracted() {
        let command = extractor().extract(
            "Generate invoice for estimate #777 deposit 25%",
            "Please send via QBO when it's ready.",
        );
        assert_eq!(command.kind, CommandKind::GenerateInvoice);
        assert_eq!(command.parameter("estimate_id"), Some("777"));
        assert_eq!(command.parameter("deposit_percent"), Some("25"));
        assert_eq!(command.parameter("send_method"), Some("QBO"));
    }

    #[test]
    fn deposit_accepts_both_word_orders() {
        let before = extractor().extract("Generate invoice for estimate #1, 30% deposit", "");
        assert_eq!(before.parameter("deposit_percent"), Some("30"));
        let after = extractor().extract("Generate invoice for estimate #1 deposit of 40%", "");
        assert_eq!(after.parameter("deposit_percent"), Some("40"));
    }

    #[test]
    fn absent_numeric_parameter_stays_unset() {
        let command = extractor().extract("Please generate invoice", "for the usual customer");
        assert_eq!(command.kind, CommandKind::GenerateInvoice);
        assert_eq!(command.parameter("estimate_id"), None);
        assert_eq!(command.parameter("deposit_percent"), None);
    }

    #[test]
    fn payment_parameters_are_extracted() {
        let command = extractor().extract(
            "Record payment",
            "Payment of $1,250.00 from Angie Hutchins against invoice #1042.",
        );
        assert_eq!(command.kind, CommandKind::RecordPayment);
        assert_eq!(command.parameter("amount"), Some("1,250.00"));
        assert_eq!(command.parameter("invoice"), Some("1042"));
        assert_eq!(command.parameter("customer"), Some("Angie Hutchins"));
    }

    #[test]
    fn report_trigger_and_period() {
        let command = extractor().extract("Run the P&L report for last month", "");
        assert_eq!(command.kind, CommandKind::GetReport);
        assert_eq!(command.parameter("period"), Some("last month"));
    }

    #[test]
    fn profit_and_loss_phrase_sets_report_name() {
        let command = extractor().extract("", "Could you send the profit and loss for this year?");
        assert_eq!(command.kind, CommandKind::GetReport);
        assert_eq!(command.parameter("report"), Some("ProfitAndLoss"));
        assert_eq!(command.parameter("period"), Some("this year"));
    }

    #[test]
    fn no_trigger_yields_unrecognized_with_error() {
        let command = extractor().extract("What is this?", "Just checking in about lunch.");
        assert_eq!(command.kind, CommandKind::Unrecognized);
        let error = command.error.expect("error message");
        assert!(error.contains("Unrecognized command"));
    }

    #[test]
    fn recognized_triggers_are_never_unrecognized() {
        let cases = [
            ("generate invoice", CommandKind::GenerateInvoice),
            ("please CREATE AN INVOICE", CommandKind::GenerateInvoice),
            ("record a payment", CommandKind::RecordPayment),
            ("payment received today", CommandKind::RecordPayment),
            ("run the quarterly report", CommandKind::GetReport),
            ("profit & loss please", CommandKind::GetReport),
        ];
        for (text, expected) in cases {
            let in_subject = extractor().extract(text, "nothing here");
            assert_eq!(in_subject.kind, expected, "subject: {}", text);
            let in_body = extractor().extract("hello", text);
            assert_eq!(in_body.kind, expected, "body: {}", text);
        }
    }
}
