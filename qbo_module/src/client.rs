//! REST client for the accounting service. Every request is realm-scoped,
//! bearer-authenticated, retried once after a forced token refresh on 401,
//! and retried once with a fixed delay on a transport failure.

use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::{QboAuth, QboAuthError};
use crate::types::{
    Customer, Estimate, Invoice, InvoicePayload, Payment, PaymentPayload, Report,
};

const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QboEnvironment {
    Sandbox,
    Production,
}

impl QboEnvironment {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Some(Self::Sandbox),
            "production" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn api_base_url(&self) -> &'static str {
        match self {
            Self::Production => "https://quickbooks.api.intuit.com",
            Self::Sandbox => "https://sandbox-quickbooks.api.intuit.com",
        }
    }

    pub fn app_base_url(&self) -> &'static str {
        match self {
            Self::Production => "https://app.qbo.intuit.com",
            Self::Sandbox => "https://app.sandbox.qbo.intuit.com",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QboError {
    #[error(transparent)]
    Auth(#[from] QboAuthError),
    #[error("http error: {0}")]
    Http(String),
    #[error("accounting API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("json error: {0}")]
    Json(String),
    #[error("estimate {0} not found")]
    EstimateNotFound(String),
}

#[derive(Debug, Clone)]
pub struct QboClient {
    auth: QboAuth,
    realm_id: String,
    base_url: String,
    app_base_url: String,
    http: reqwest::blocking::Client,
}

impl QboClient {
    pub fn new(auth: QboAuth, realm_id: impl Into<String>, environment: QboEnvironment) -> Self {
        let base_url = std::env::var("QBO_API_BASE_URL")
            .unwrap_or_else(|_| environment.api_base_url().to_string());
        Self {
            auth,
            realm_id: realm_id.into(),
            base_url,
            app_base_url: environment.app_base_url().to_string(),
            http: reqwest::blocking::Client::new(),
        }
    }

    pub fn with_base_url(
        auth: QboAuth,
        realm_id: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            auth,
            realm_id: realm_id.into(),
            base_url: base_url.into(),
            app_base_url: QboEnvironment::Production.app_base_url().to_string(),
            http: reqwest::blocking::Client::new(),
        }
    }

    /// Viewer URL for an invoice in the service's web UI.
    pub fn invoice_url(&self, invoice_id: &str) -> String {
        format!("{}/app/invoice?txnId={}", self.app_base_url, invoice_id)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v3/company/{}/{}", self.base_url, self.realm_id, path)
    }

    pub fn get_estimate(&self, estimate_id: &str) -> Result<Estimate, QboError> {
        let url = self.url(&format!("estimate/{}", estimate_id));
        let response = self.send_with_auth(|http, token| http.get(&url).bearer_auth(token));
        let response = match response {
            Err(QboError::Api { status: 404, .. }) => {
                return Err(QboError::EstimateNotFound(estimate_id.to_string()))
            }
            other => other?,
        };
        let envelope: EstimateEnvelope =
            response.json().map_err(|e| QboError::Json(e.to_string()))?;
        envelope
            .estimate
            .ok_or_else(|| QboError::EstimateNotFound(estimate_id.to_string()))
    }

    pub fn create_invoice(&self, payload: &InvoicePayload) -> Result<Invoice, QboError> {
        let url = self.url("invoice");
        let response =
            self.send_with_auth(|http, token| http.post(&url).bearer_auth(token).json(payload))?;
        let envelope: InvoiceEnvelope =
            response.json().map_err(|e| QboError::Json(e.to_string()))?;
        envelope.invoice.ok_or_else(|| QboError::Json(
            "invoice create response carried no Invoice".to_string(),
        ))
    }

    /// Ask the service to email the invoice to the customer itself.
    pub fn send_invoice(&self, invoice_id: &str) -> Result<(), QboError> {
        let url = self.url(&format!("invoice/{}/send", invoice_id));
        self.send_with_auth(|http, token| http.post(&url).bearer_auth(token))?;
        debug!("requested invoice {} delivery via the accounting service", invoice_id);
        Ok(())
    }

    pub fn query_customer(&self, display_name: &str) -> Result<Option<Customer>, QboError> {
        let sql = format!(
            "SELECT * FROM Customer WHERE DisplayName = '{}' MAXRESULTS 1",
            escape_quotes(display_name)
        );
        let envelope = self.query(&sql)?;
        Ok(envelope.query_response.customer.unwrap_or_default().into_iter().next())
    }

    /// Find an invoice by document number, falling back to a direct id fetch
    /// for purely numeric references.
    pub fn find_invoice(&self, reference: &str) -> Result<Option<Invoice>, QboError> {
        let sql = format!(
            "SELECT * FROM Invoice WHERE DocNumber = '{}' MAXRESULTS 1",
            escape_quotes(reference)
        );
        let envelope = self.query(&sql)?;
        if let Some(invoice) = envelope.query_response.invoice.unwrap_or_default().into_iter().next() {
            return Ok(Some(invoice));
        }
        if !reference.chars().all(|ch| ch.is_ascii_digit()) {
            return Ok(None);
        }
        let url = self.url(&format!("invoice/{}", reference));
        let response = self.send_with_auth(|http, token| http.get(&url).bearer_auth(token));
        match response {
            Err(QboError::Api { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
            Ok(response) => {
                let envelope: InvoiceEnvelope =
                    response.json().map_err(|e| QboError::Json(e.to_string()))?;
                Ok(envelope.invoice)
            }
        }
    }

    /// The customer's most recent invoice with an outstanding balance.
    pub fn latest_open_invoice(&self, customer_id: &str) -> Result<Option<Invoice>, QboError> {
        let sql = format!(
            "SELECT * FROM Invoice WHERE CustomerRef = '{}' AND Balance > '0' ORDERBY TxnDate DESC MAXRESULTS 1",
            escape_quotes(customer_id)
        );
        let envelope = self.query(&sql)?;
        Ok(envelope.query_response.invoice.unwrap_or_default().into_iter().next())
    }

    pub fn create_payment(&self, payload: &PaymentPayload) -> Result<Payment, QboError> {
        let url = self.url("payment");
        let response =
            self.send_with_auth(|http, token| http.post(&url).bearer_auth(token).json(payload))?;
        let envelope: PaymentEnvelope =
            response.json().map_err(|e| QboError::Json(e.to_string()))?;
        envelope.payment.ok_or_else(|| QboError::Json(
            "payment create response carried no Payment".to_string(),
        ))
    }

    pub fn profit_and_loss(&self, start_date: &str, end_date: &str) -> Result<Report, QboError> {
        let url = self.url("reports/ProfitAndLoss");
        let response = self.send_with_auth(|http, token| {
            http.get(&url)
                .query(&[("start_date", start_date), ("end_date", end_date)])
                .bearer_auth(token)
        })?;
        response.json().map_err(|e| QboError::Json(e.to_string()))
    }

    fn query(&self, sql: &str) -> Result<QueryEnvelope, QboError> {
        let url = self.url("query");
        let response = self.send_with_auth(|http, token| {
            http.get(&url).query(&[("query", sql)]).bearer_auth(token)
        })?;
        response.json().map_err(|e| QboError::Json(e.to_string()))
    }

    fn send_with_auth<F>(&self, build: F) -> Result<reqwest::blocking::Response, QboError>
    where
        F: Fn(&reqwest::blocking::Client, &str) -> reqwest::blocking::RequestBuilder,
    {
        let token = self.auth.get_access_token()?;
        let response = match build(&self.http, &token).send() {
            Ok(response) => response,
            Err(err) => {
                warn!("accounting request failed ({}), retrying once", err);
                std::thread::sleep(RETRY_DELAY);
                build(&self.http, &token)
                    .send()
                    .map_err(|e| QboError::Http(e.to_string()))?
            }
        };

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("accounting API returned 401, refreshing token and retrying");
            let token = self.auth.force_refresh()?;
            let response = build(&self.http, &token)
                .send()
                .map_err(|e| QboError::Http(e.to_string()))?;
            return check_status(response);
        }
        check_status(response)
    }
}

fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, QboError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(QboError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

fn escape_quotes(value: &str) -> String {
    value.replace('\'', "\\'")
}

#[derive(Debug, Deserialize)]
struct EstimateEnvelope {
    #[serde(rename = "Estimate")]
    estimate: Option<Estimate>,
}

#[derive(Debug, Deserialize)]
struct InvoiceEnvelope {
    #[serde(rename = "Invoice")]
    invoice: Option<Invoice>,
}

#[derive(Debug, Deserialize)]
struct PaymentEnvelope {
    #[serde(rename = "Payment")]
    payment: Option<Payment>,
}

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    #[serde(rename = "QueryResponse", default)]
    query_response: QueryResponse,
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(rename = "Customer")]
    customer: Option<Vec<Customer>>,
    #[serde(rename = "Invoice")]
    invoice: Option<Vec<Invoice>>,
}
