use std::fmt;

use gmail_module::{GmailClient, GmailError};
use qbo_module::QboClient;
use tracing::info;

use crate::config::ServiceConfig;
use crate::dispatch::{DispatchOutcome, Dispatcher};

/// Counters for one trigger invocation over the unread batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub replied: usize,
    pub suppressed: usize,
    pub errors: usize,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Email processing cycle finished. Processed: {}, Replied: {}, Suppressed: {}, Errors: {}.",
            self.processed, self.replied, self.suppressed, self.errors
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("failed to list unread messages: {0}")]
    List(#[from] GmailError),
}

/// Process the full unread batch serially: for each message, fetch, dispatch
/// through reply-send, and mark read before the next one begins. Messages
/// left unread by a killed invocation are simply retried on the next poll.
pub fn process_mailbox(
    config: &ServiceConfig,
    gmail: &GmailClient,
    qbo: &QboClient,
) -> Result<BatchSummary, BatchError> {
    let unread = gmail.list_unread()?;
    let mut summary = BatchSummary::default();
    if unread.is_empty() {
        info!("no unread messages to process");
        return Ok(summary);
    }

    info!("processing {} unread messages", unread.len());
    let dispatcher = Dispatcher::new(config, gmail, qbo);
    for message_ref in &unread {
        summary.processed += 1;
        match dispatcher.dispatch(&message_ref.id) {
            DispatchOutcome::Replied { .. } => summary.replied += 1,
            DispatchOutcome::ReplyFailed => summary.errors += 1,
            DispatchOutcome::Suppressed(_) => summary.suppressed += 1,
        }
    }

    info!("{}", summary);
    Ok(summary)
}
