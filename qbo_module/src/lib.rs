pub mod auth;
pub mod client;
pub mod handlers;
pub mod types;

pub use auth::{QboAuth, QboAuthConfig, QboAuthError};
pub use client::{QboClient, QboEnvironment, QboError};
pub use handlers::{
    generate_invoice, get_report, record_payment, ActionResult, InvoiceParams, PaymentParams,
    ReportParams,
};
