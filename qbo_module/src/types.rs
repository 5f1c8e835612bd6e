//! Wire types for the accounting API. Field names follow the service's
//! PascalCase JSON; entity responses arrive wrapped in a single-key envelope
//! (`{"Invoice": {...}}`), query results under `QueryResponse`.

use serde::{Deserialize, Serialize};

/// A `{value, name}` reference to another entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRef {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    #[serde(rename = "Amount")]
    pub amount: f64,
    #[serde(rename = "DetailType")]
    pub detail_type: String,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    /// Item detail copied verbatim from the source transaction; the exact
    /// shape is the service's concern, not ours.
    #[serde(
        rename = "SalesItemLineDetail",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub sales_item_line_detail: Option<serde_json::Value>,
    #[serde(
        rename = "DiscountLineDetail",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub discount_line_detail: Option<DiscountLineDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountLineDetail {
    #[serde(rename = "PercentBased")]
    pub percent_based: bool,
}

impl Line {
    /// A fixed-amount discount line. `PercentBased` stays false so the
    /// service cannot recompute the amount against a different total.
    pub fn fixed_discount(amount: f64, description: impl Into<String>) -> Self {
        Self {
            amount,
            detail_type: "DiscountLineDetail".to_string(),
            description: Some(description.into()),
            sales_item_line_detail: None,
            discount_line_detail: Some(DiscountLineDetail {
                percent_based: false,
            }),
        }
    }

    pub fn is_sales_item(&self) -> bool {
        self.detail_type == "SalesItemLineDetail"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Estimate {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "DocNumber", default)]
    pub doc_number: Option<String>,
    #[serde(rename = "TotalAmt", default)]
    pub total_amt: f64,
    #[serde(rename = "CustomerRef")]
    pub customer_ref: EntityRef,
    #[serde(rename = "Line", default)]
    pub line: Vec<Line>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoicePayload {
    #[serde(rename = "CustomerRef")]
    pub customer_ref: EntityRef,
    #[serde(rename = "Line")]
    pub line: Vec<Line>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Invoice {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "DocNumber", default)]
    pub doc_number: Option<String>,
    #[serde(rename = "TotalAmt", default)]
    pub total_amt: f64,
    #[serde(rename = "Balance", default)]
    pub balance: Option<f64>,
    #[serde(rename = "CustomerRef", default)]
    pub customer_ref: Option<EntityRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "DisplayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentPayload {
    #[serde(rename = "TotalAmt")]
    pub total_amt: f64,
    #[serde(rename = "CustomerRef")]
    pub customer_ref: EntityRef,
    #[serde(rename = "Line")]
    pub line: Vec<PaymentLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentLine {
    #[serde(rename = "Amount")]
    pub amount: f64,
    #[serde(rename = "LinkedTxn")]
    pub linked_txn: Vec<LinkedTxn>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkedTxn {
    #[serde(rename = "TxnId")]
    pub txn_id: String,
    #[serde(rename = "TxnType")]
    pub txn_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Payment {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "TotalAmt", default)]
    pub total_amt: f64,
}

// Report shapes: rows either carry column data directly, group nested rows
// under a Header/Summary pair, or close a section with a Summary only.

#[derive(Debug, Clone, Deserialize)]
pub struct Report {
    #[serde(rename = "Header", default)]
    pub header: Option<ReportHeader>,
    #[serde(rename = "Rows", default)]
    pub rows: Option<Rows>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportHeader {
    #[serde(rename = "ReportName", default)]
    pub report_name: Option<String>,
    #[serde(rename = "StartPeriod", default)]
    pub start_period: Option<String>,
    #[serde(rename = "EndPeriod", default)]
    pub end_period: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rows {
    #[serde(rename = "Row", default)]
    pub row: Vec<Row>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Row {
    #[serde(rename = "ColData", default)]
    pub col_data: Vec<ColData>,
    #[serde(rename = "Header", default)]
    pub header: Option<RowColData>,
    #[serde(rename = "Summary", default)]
    pub summary: Option<RowColData>,
    #[serde(rename = "Rows", default)]
    pub rows: Option<Box<Rows>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RowColData {
    #[serde(rename = "ColData", default)]
    pub col_data: Vec<ColData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColData {
    #[serde(default)]
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_deserializes_service_shape() {
        let raw = r#"{
            "Id": "777",
            "DocNumber": "E-777",
            "TotalAmt": 1000.0,
            "CustomerRef": {"value": "42", "name": "Angie Hutchins"},
            "Line": [
                {
                    "Amount": 1000.0,
                    "DetailType": "SalesItemLineDetail",
                    "Description": "Carpet tiles",
                    "SalesItemLineDetail": {"ItemRef": {"value": "9"}}
                },
                {"Amount": 1000.0, "DetailType": "SubTotalLineDetail"}
            ]
        }"#;
        let estimate: Estimate = serde_json::from_str(raw).expect("estimate");
        assert_eq!(estimate.id, "777");
        assert_eq!(estimate.total_amt, 1000.0);
        assert_eq!(estimate.customer_ref.value, "42");
        assert_eq!(estimate.line.iter().filter(|l| l.is_sales_item()).count(), 1);
    }

    #[test]
    fn discount_line_serializes_fixed_amount() {
        let line = Line::fixed_discount(250.0, "25% deposit");
        let json = serde_json::to_value(&line).expect("json");
        assert_eq!(json["Amount"], 250.0);
        assert_eq!(json["DetailType"], "DiscountLineDetail");
        assert_eq!(json["DiscountLineDetail"]["PercentBased"], false);
        assert!(json.get("SalesItemLineDetail").is_none());
    }
}
