//! The bookkeeping actions the service can perform. Each handler takes the
//! parameters its command extracted, validates them itself, and produces an
//! `ActionResult` for the reply formatter.

use chrono::{Datelike, Months, NaiveDate, Utc};
use tracing::{info, warn};

use crate::client::{QboClient, QboError};
use crate::types::{
    ColData, Estimate, InvoicePayload, Line, LinkedTxn, PaymentLine, PaymentPayload, Report, Rows,
};

/// Outcome of one action, consumed once by the reply formatter.
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    pub identifiers: Vec<(String, String)>,
}

impl ActionResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            identifiers: Vec::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            identifiers: Vec::new(),
        }
    }

    pub fn with_identifier(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.identifiers.push((key.into(), value.into()));
        self
    }
}

// --- Invoice generation -------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct InvoiceParams {
    pub estimate_id: Option<String>,
    pub deposit_percent: Option<u32>,
    pub send_method: Option<String>,
}

/// Convert an accepted estimate into an invoice, optionally carving out a
/// fixed-amount deposit, optionally asking the service to email it.
pub fn generate_invoice(client: &QboClient, params: &InvoiceParams) -> ActionResult {
    let Some(estimate_id) = params.estimate_id.as_deref() else {
        return ActionResult::failure(
            "Cannot generate an invoice: no estimate number was found in the request.",
        );
    };
    match try_generate_invoice(client, estimate_id, params) {
        Ok(result) => result,
        Err(err) => ActionResult::failure(format!(
            "Failed to generate invoice from Estimate {}: {}",
            estimate_id, err
        )),
    }
}

fn try_generate_invoice(
    client: &QboClient,
    estimate_id: &str,
    params: &InvoiceParams,
) -> Result<ActionResult, QboError> {
    let estimate = client.get_estimate(estimate_id)?;
    let payload = build_invoice_payload(&estimate, params.deposit_percent);
    let invoice = client.create_invoice(&payload)?;
    let url = client.invoice_url(&invoice.id);

    let send_via_service = params
        .send_method
        .as_deref()
        .map_or(false, |method| method.eq_ignore_ascii_case("qbo"));
    if send_via_service {
        client.send_invoice(&invoice.id)?;
    }

    info!(
        "generated invoice {} from estimate {} (total {})",
        invoice.id, estimate_id, invoice.total_amt
    );

    let customer = estimate
        .customer_ref
        .name
        .clone()
        .unwrap_or_else(|| format!("customer {}", estimate.customer_ref.value));
    let mut message = format!(
        "Generated invoice {} from Estimate {} for {}.",
        invoice.doc_number.as_deref().unwrap_or(&invoice.id),
        estimate_id,
        customer
    );
    if let Some(pct) = effective_deposit(params.deposit_percent) {
        message.push_str(&format!(
            " Includes a {}% deposit line of ${:.2}.",
            pct,
            round_cents(estimate.total_amt * f64::from(pct) / 100.0)
        ));
    }
    if send_via_service {
        message.push_str(" The accounting service will email it to the customer.");
    }

    Ok(ActionResult::success(message)
        .with_identifier("invoiceId", invoice.id.clone())
        .with_identifier("url", url))
}

/// Copy the estimate's item lines onto an invoice payload, appending a
/// fixed-amount deposit discount when the percentage is inside (0, 100).
/// Values outside that range skip the deposit line rather than erroring.
pub fn build_invoice_payload(estimate: &Estimate, deposit_percent: Option<u32>) -> InvoicePayload {
    let mut line: Vec<Line> = estimate
        .line
        .iter()
        .filter(|line| line.is_sales_item())
        .cloned()
        .collect();
    if let Some(pct) = effective_deposit(deposit_percent) {
        let amount = round_cents(estimate.total_amt * f64::from(pct) / 100.0);
        line.push(Line::fixed_discount(amount, format!("{}% deposit", pct)));
    }
    InvoicePayload {
        customer_ref: estimate.customer_ref.clone(),
        line,
    }
}

fn effective_deposit(deposit_percent: Option<u32>) -> Option<u32> {
    deposit_percent.filter(|pct| (1..=99).contains(pct))
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// --- Payment recording --------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct PaymentParams {
    pub amount: Option<String>,
    pub invoice: Option<String>,
    pub customer: Option<String>,
}

/// Record a payment against an invoice: the one named in the request, or
/// the customer's most recent open invoice.
pub fn record_payment(
    client: &QboClient,
    params: &PaymentParams,
) -> Result<ActionResult, QboError> {
    let amount = match params.amount.as_deref().and_then(parse_amount) {
        Some(amount) if amount > 0.0 => amount,
        _ => {
            return Ok(ActionResult::failure(
                "Cannot record a payment: no payment amount was found in the request.",
            ))
        }
    };

    let invoice = if let Some(reference) = params.invoice.as_deref() {
        match client.find_invoice(reference)? {
            Some(invoice) => invoice,
            None => {
                return Ok(ActionResult::failure(format!(
                    "Cannot record a payment: invoice {} was not found.",
                    reference
                )))
            }
        }
    } else if let Some(name) = params.customer.as_deref() {
        let Some(customer) = client.query_customer(name)? else {
            return Ok(ActionResult::failure(format!(
                "Cannot record a payment: customer '{}' was not found.",
                name
            )));
        };
        match client.latest_open_invoice(&customer.id)? {
            Some(invoice) => invoice,
            None => {
                return Ok(ActionResult::failure(format!(
                    "Cannot record a payment: {} has no open invoices.",
                    customer.display_name
                )))
            }
        }
    } else {
        return Ok(ActionResult::failure(
            "Cannot record a payment: name an invoice number or a customer.",
        ));
    };

    let Some(customer_ref) = invoice.customer_ref.clone() else {
        return Ok(ActionResult::failure(format!(
            "Cannot record a payment: invoice {} carries no customer reference.",
            invoice.id
        )));
    };

    let payload = PaymentPayload {
        total_amt: amount,
        customer_ref,
        line: vec![PaymentLine {
            amount,
            linked_txn: vec![LinkedTxn {
                txn_id: invoice.id.clone(),
                txn_type: "Invoice".to_string(),
            }],
        }],
    };
    let payment = client.create_payment(&payload)?;
    info!("recorded payment {} against invoice {}", payment.id, invoice.id);

    let invoice_label = invoice.doc_number.as_deref().unwrap_or(&invoice.id);
    let mut message = format!(
        "Recorded a ${:.2} payment against invoice {}.",
        amount, invoice_label
    );
    if let Some(balance) = invoice.balance {
        message.push_str(&format!(
            " Remaining balance: ${:.2}.",
            round_cents(balance - amount)
        ));
    }

    Ok(ActionResult::success(message)
        .with_identifier("paymentId", payment.id.clone())
        .with_identifier("invoiceId", invoice.id.clone()))
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.trim().replace(',', "").parse::<f64>().ok()
}

// --- Reporting ----------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ReportParams {
    pub report: Option<String>,
    pub period: Option<String>,
}

/// Run a financial report and summarize it for the reply body. Only the
/// profit and loss report is wired up.
pub fn get_report(client: &QboClient, params: &ReportParams) -> Result<ActionResult, QboError> {
    let name = params.report.as_deref().unwrap_or("ProfitAndLoss");
    if !is_profit_and_loss(name) {
        return Ok(ActionResult::failure(format!(
            "Unsupported report '{}'. Only the profit and loss report is available.",
            name
        )));
    }

    let today = Utc::now().date_naive();
    let (start, end) = parse_period(params.period.as_deref(), today);
    let start = start.to_string();
    let end = end.to_string();
    let report = client.profit_and_loss(&start, &end)?;
    let summary = format_report(&report, &start, &end);

    Ok(ActionResult::success(summary).with_identifier("period", format!("{} to {}", start, end)))
}

fn is_profit_and_loss(name: &str) -> bool {
    let folded: String = name
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    matches!(folded.as_str(), "profitandloss" | "profitloss" | "pl" | "pnl")
}

/// Resolve a period phrase into a date range. Unrecognized phrases fall back
/// to the current month.
pub fn parse_period(period: Option<&str>, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let normalized = period.map(|value| value.trim().to_ascii_lowercase());
    match normalized.as_deref() {
        Some("last month") => {
            let first_of_current = today.with_day(1).unwrap();
            let end = first_of_current.pred_opt().unwrap();
            (end.with_day(1).unwrap(), end)
        }
        Some("this year") => (
            NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(today.year(), 12, 31).unwrap(),
        ),
        Some("this month") | None => this_month(today),
        Some(other) => {
            warn!("unrecognized report period '{}', defaulting to this month", other);
            this_month(today)
        }
    }
}

fn this_month(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = today.with_day(1).unwrap();
    let end = first
        .checked_add_months(Months::new(1))
        .unwrap()
        .pred_opt()
        .unwrap();
    (first, end)
}

/// Flatten the service's nested report rows into a plain-text summary.
pub fn format_report(report: &Report, start: &str, end: &str) -> String {
    let title = report
        .header
        .as_ref()
        .and_then(|header| header.report_name.clone())
        .unwrap_or_else(|| "ProfitAndLoss".to_string());
    let mut summary = format!("{} ({} to {})\n", title, start, end);
    summary.push_str(&"=".repeat(40));
    summary.push('\n');
    if let Some(rows) = &report.rows {
        append_rows(&mut summary, rows, 0);
    }
    summary
}

fn append_rows(out: &mut String, rows: &Rows, depth: usize) {
    for row in &rows.row {
        if let Some(header) = &row.header {
            if let Some(line) = col_line(&header.col_data, depth) {
                out.push_str(&line);
                out.push('\n');
            }
        }
        if let Some(line) = col_line(&row.col_data, depth) {
            out.push_str(&line);
            out.push('\n');
        }
        if let Some(nested) = &row.rows {
            append_rows(out, nested, depth + 1);
        }
        if let Some(section_summary) = &row.summary {
            if let Some(line) = col_line(&section_summary.col_data, depth) {
                out.push_str(&"-".repeat(20));
                out.push('\n');
                out.push_str(&line);
                out.push('\n');
            }
        }
    }
}

fn col_line(cols: &[ColData], depth: usize) -> Option<String> {
    let title = cols.first().map(|col| col.value.trim()).filter(|v| !v.is_empty())?;
    let indent = "  ".repeat(depth);
    match cols.last().filter(|_| cols.len() > 1) {
        Some(amount) if !amount.value.trim().is_empty() => {
            Some(format!("{}{}: {}", indent, title, amount.value.trim()))
        }
        _ => Some(format!("{}{}", indent, title)),
    }
}
