pub mod authorize;
pub mod batch;
pub mod config;
pub mod dispatch;
pub mod extract;
pub mod message;
pub mod reply;
pub mod server;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use batch::{process_mailbox, BatchError, BatchSummary};
pub use config::ServiceConfig;
pub use dispatch::{DispatchOutcome, Dispatcher, SuppressReason};
pub use extract::{Command, CommandExtractor, CommandKind};
pub use message::ParsedMessage;
pub use server::run_server;
