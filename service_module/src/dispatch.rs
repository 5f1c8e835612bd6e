//! Per-message dispatch: parse, authorize, extract, invoke, reply.
//!
//! Each message makes a single pass through the pipeline. Undecodable
//! messages and unauthorized senders are suppressed with no reply so
//! automated senders cannot set up feedback loops; everything else —
//! including unrecognized commands and handler failures — produces exactly
//! one reply telling the sender what happened. Marking the message read is
//! attempted exactly once per dispatch regardless of the outcome, so a
//! poisoned message cannot be reprocessed forever.

use gmail_module::{GmailClient, OutboundReply};
use qbo_module::{
    generate_invoice, get_report, record_payment, ActionResult, InvoiceParams, PaymentParams,
    QboClient, ReportParams,
};
use tracing::{error, info, warn};

use crate::authorize;
use crate::config::ServiceConfig;
use crate::extract::{Command, CommandExtractor, CommandKind};
use crate::message::ParsedMessage;
use crate::reply;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    ParseFailure,
    UnauthorizedSender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler ran (successfully or not) and the sender was told.
    Replied { success: bool },
    /// The handler ran but the reply could not be delivered.
    ReplyFailed,
    /// No reply, deliberately.
    Suppressed(SuppressReason),
}

pub struct Dispatcher<'a> {
    config: &'a ServiceConfig,
    gmail: &'a GmailClient,
    qbo: &'a QboClient,
    extractor: CommandExtractor,
}

impl<'a> Dispatcher<'a> {
    pub fn new(config: &'a ServiceConfig, gmail: &'a GmailClient, qbo: &'a QboClient) -> Self {
        Self {
            config,
            gmail,
            qbo,
            extractor: CommandExtractor::new(),
        }
    }

    /// Dispatch one message, then mark it read whatever happened.
    pub fn dispatch(&self, message_id: &str) -> DispatchOutcome {
        let outcome = self.run(message_id);
        if let Err(err) = self.gmail.mark_read(message_id) {
            error!("failed to mark message {} as read: {}", message_id, err);
        }
        outcome
    }

    fn run(&self, message_id: &str) -> DispatchOutcome {
        let message = match self.gmail.get_message(message_id) {
            Ok(message) => message,
            Err(err) => {
                warn!("failed to fetch message {}: {}", message_id, err);
                return DispatchOutcome::Suppressed(SuppressReason::ParseFailure);
            }
        };
        let parsed = match ParsedMessage::from_full(&message) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("suppressing undecodable message {}: {}", message_id, err);
                return DispatchOutcome::Suppressed(SuppressReason::ParseFailure);
            }
        };

        if !authorize::is_authorized(&self.config.authorized_senders, &parsed.from) {
            warn!(
                "suppressing message {} from unauthorized sender {}",
                parsed.id, parsed.from
            );
            return DispatchOutcome::Suppressed(SuppressReason::UnauthorizedSender);
        }

        let command = self.extractor.extract(&parsed.subject, &parsed.body);
        info!("message {}: extracted {:?}", parsed.id, command.kind);

        let result = self.invoke_handler(&command);

        let outbound = OutboundReply {
            from: self.config.agent_email.clone(),
            to: parsed.from.clone(),
            subject: reply::reply_subject(&parsed.subject, result.success),
            body: reply::reply_body(&result),
            thread_id: Some(parsed.thread_id.clone()),
            in_reply_to: parsed.message_id.clone(),
            references: reply::reply_references(
                parsed.references.as_deref(),
                parsed.message_id.as_deref(),
            ),
        };
        match self.gmail.send_reply(&outbound) {
            Ok(_) => DispatchOutcome::Replied {
                success: result.success,
            },
            Err(err) => {
                error!("failed to send reply for message {}: {}", parsed.id, err);
                DispatchOutcome::ReplyFailed
            }
        }
    }

    /// Route the command to its handler. An unrecognized command becomes a
    /// synthetic failure result so the sender is told why nothing happened;
    /// a handler error never escapes past this boundary.
    fn invoke_handler(&self, command: &Command) -> ActionResult {
        match command.kind {
            CommandKind::Unrecognized => ActionResult::failure(
                command
                    .error
                    .clone()
                    .unwrap_or_else(|| "Unrecognized command.".to_string()),
            ),
            CommandKind::GenerateInvoice => generate_invoice(self.qbo, &invoice_params(command)),
            CommandKind::RecordPayment => record_payment(self.qbo, &payment_params(command))
                .unwrap_or_else(internal_error),
            CommandKind::GetReport => {
                get_report(self.qbo, &report_params(command)).unwrap_or_else(internal_error)
            }
        }
    }
}

fn internal_error(err: impl std::fmt::Display) -> ActionResult {
    ActionResult::failure(format!("Internal error processing command: {}", err))
}

fn invoice_params(command: &Command) -> InvoiceParams {
    InvoiceParams {
        estimate_id: command.parameter("estimate_id").map(str::to_string),
        deposit_percent: command
            .parameter("deposit_percent")
            .and_then(|value| value.parse().ok()),
        send_method: command.parameter("send_method").map(str::to_string),
    }
}

fn payment_params(command: &Command) -> PaymentParams {
    PaymentParams {
        amount: command.parameter("amount").map(str::to_string),
        invoice: command.parameter("invoice").map(str::to_string),
        customer: command.parameter("customer").map(str::to_string),
    }
}

fn report_params(command: &Command) -> ReportParams {
    ReportParams {
        report: command.parameter("report").map(str::to_string),
        period: command.parameter("period").map(str::to_string),
    }
}
