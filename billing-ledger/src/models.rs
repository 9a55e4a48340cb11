use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Bill status lifecycle
///
/// Stored as snake_case text. Legacy clients encoded bill statuses as
/// integer codes; `from_legacy_code` / `legacy_code` adapt that encoding at
/// the API boundary so the core only ever sees the enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Pending,
    Approved,
    PartiallyPaid,
    Paid,
    Cancelled,
}

impl BillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Pending => "pending",
            BillStatus::Approved => "approved",
            BillStatus::PartiallyPaid => "partially_paid",
            BillStatus::Paid => "paid",
            BillStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> BillingResult<Self> {
        match value {
            "pending" => Ok(BillStatus::Pending),
            "approved" => Ok(BillStatus::Approved),
            "partially_paid" => Ok(BillStatus::PartiallyPaid),
            "paid" => Ok(BillStatus::Paid),
            "cancelled" => Ok(BillStatus::Cancelled),
            other => Err(BillingError::validation(format!(
                "unknown bill status: {}",
                other
            ))),
        }
    }

    pub fn from_legacy_code(code: i16) -> BillingResult<Self> {
        match code {
            0 => Ok(BillStatus::Pending),
            1 => Ok(BillStatus::Approved),
            2 => Ok(BillStatus::PartiallyPaid),
            3 => Ok(BillStatus::Paid),
            4 => Ok(BillStatus::Cancelled),
            other => Err(BillingError::validation(format!(
                "unknown bill status code: {}",
                other
            ))),
        }
    }

    pub fn legacy_code(&self) -> i16 {
        match self {
            BillStatus::Pending => 0,
            BillStatus::Approved => 1,
            BillStatus::PartiallyPaid => 2,
            BillStatus::Paid => 3,
            BillStatus::Cancelled => 4,
        }
    }
}

/// Bill status as received from clients: either the snake_case name or the
/// legacy integer code.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum BillStatusParam {
    Code(i16),
    Name(String),
}

impl BillStatusParam {
    pub fn resolve(&self) -> BillingResult<BillStatus> {
        match self {
            BillStatusParam::Code(code) => BillStatus::from_legacy_code(*code),
            BillStatusParam::Name(name) => BillStatus::parse(name),
        }
    }
}

/// Invoice status lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    PartiallyPaid,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> BillingResult<Self> {
        match value {
            "pending" => Ok(InvoiceStatus::Pending),
            "partially_paid" => Ok(InvoiceStatus::PartiallyPaid),
            "paid" => Ok(InvoiceStatus::Paid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            "cancelled" => Ok(InvoiceStatus::Cancelled),
            other => Err(BillingError::validation(format!(
                "unknown invoice status: {}",
                other
            ))),
        }
    }
}

/// Payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Check,
    BankTransfer,
    Insurance,
    Online,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Check => "check",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Insurance => "insurance",
            PaymentMethod::Online => "online",
        }
    }
}

/// Payment gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentGateway {
    Stripe,
    Square,
    Paypal,
    AuthorizeNet,
    Manual,
}

impl PaymentGateway {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentGateway::Stripe => "stripe",
            PaymentGateway::Square => "square",
            PaymentGateway::Paypal => "paypal",
            PaymentGateway::AuthorizeNet => "authorize_net",
            PaymentGateway::Manual => "manual",
        }
    }
}

/// Bill row: mutable draft of services rendered to a patient, pre-invoicing
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct Bill {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub status: String,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    /// Set when the bill was finalized into an invoice; finalized bills are
    /// immutable.
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bill {
    pub fn status(&self) -> BillingResult<BillStatus> {
        BillStatus::parse(&self.status)
            .map_err(|_| BillingError::Internal(format!("stored bill status: {}", self.status)))
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized_at.is_some()
    }
}

/// Bill line item; line total is quantity × unit_price, derived, never stored
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct BillItem {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub service_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl BillItem {
    pub fn line_total(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_price
    }
}

/// Invoice row: finalized, numbered financial document derived from a bill
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub bill_id: Option<Uuid>,
    pub patient_id: Uuid,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub due_date: DateTime<Utc>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn status(&self) -> BillingResult<InvoiceStatus> {
        InvoiceStatus::parse(&self.status)
            .map_err(|_| BillingError::Internal(format!("stored invoice status: {}", self.status)))
    }

    pub fn remaining_balance(&self) -> Decimal {
        self.total_amount - self.amount_paid
    }
}

/// Invoice line item: a snapshot of the service catalog at invoicing time
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub service_id: i64,
    pub service_name: String,
    pub service_code: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Payment row: one discrete monetary application against a bill or invoice
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub bill_id: Option<Uuid>,
    pub amount_paid: Decimal,
    pub payment_method: String,
    pub payment_gateway: Option<String>,
    pub transaction_id: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub paid_at: DateTime<Utc>,
}

/// New bill input
#[derive(Debug, Clone, Deserialize)]
pub struct NewBill {
    pub patient_id: Uuid,
    pub items: Vec<NewBillItem>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
}

/// New bill item input; quantity defaults to 1
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewBillItem {
    pub service_id: i64,
    pub quantity: Option<i32>,
    pub unit_price: Decimal,
}

impl NewBillItem {
    pub fn quantity(&self) -> i32 {
        self.quantity.unwrap_or(1)
    }
}

/// New payment input, shared by the invoice- and bill-scoped paths
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub amount_paid: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_gateway: Option<PaymentGateway>,
    pub transaction_id: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
}

/// Invoice list filter
#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub patient_id: Option<Uuid>,
    pub overdue_only: bool,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

/// Aging report row: outstanding balance per patient, bucketed by days past
/// due
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct PatientAging {
    pub patient_id: Uuid,
    pub outstanding: Decimal,
    /// Not yet due.
    pub current: Decimal,
    pub age_0_30: Decimal,
    pub age_31_60: Decimal,
    pub age_61_90: Decimal,
    pub age_91_plus: Decimal,
    pub open_invoices: i64,
    pub last_payment_date: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bill_status_round_trips_through_names() {
        for status in [
            BillStatus::Pending,
            BillStatus::Approved,
            BillStatus::PartiallyPaid,
            BillStatus::Paid,
            BillStatus::Cancelled,
        ] {
            assert_eq!(BillStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn bill_status_round_trips_through_legacy_codes() {
        for code in 0..=4 {
            let status = BillStatus::from_legacy_code(code).unwrap();
            assert_eq!(status.legacy_code(), code);
        }
        assert!(BillStatus::from_legacy_code(5).is_err());
        assert!(BillStatus::from_legacy_code(-1).is_err());
    }

    #[test]
    fn bill_status_param_accepts_both_encodings() {
        let by_name: BillStatusParam = serde_json::from_str("\"approved\"").unwrap();
        assert_eq!(by_name.resolve().unwrap(), BillStatus::Approved);

        let by_code: BillStatusParam = serde_json::from_str("1").unwrap();
        assert_eq!(by_code.resolve().unwrap(), BillStatus::Approved);

        let bad: BillStatusParam = serde_json::from_str("\"archived\"").unwrap();
        assert!(bad.resolve().is_err());
    }

    #[test]
    fn invoice_status_rejects_unknown_names() {
        assert!(InvoiceStatus::parse("void").is_err());
        assert_eq!(
            InvoiceStatus::parse("partially_paid").unwrap(),
            InvoiceStatus::PartiallyPaid
        );
    }

    #[test]
    fn payment_method_serde_uses_snake_case() {
        let method: PaymentMethod = serde_json::from_str("\"bank_transfer\"").unwrap();
        assert_eq!(method, PaymentMethod::BankTransfer);
        assert_eq!(method.as_str(), "bank_transfer");

        let gateway: PaymentGateway = serde_json::from_str("\"authorize_net\"").unwrap();
        assert_eq!(gateway, PaymentGateway::AuthorizeNet);
    }

    #[test]
    fn line_total_is_quantity_times_unit_price() {
        let item = BillItem {
            id: Uuid::new_v4(),
            bill_id: Uuid::new_v4(),
            service_id: 1,
            quantity: 3,
            unit_price: Decimal::new(2550, 2),
        };
        assert_eq!(item.line_total(), Decimal::new(7650, 2));
    }

    #[test]
    fn new_bill_item_quantity_defaults_to_one() {
        let item = NewBillItem {
            service_id: 7,
            quantity: None,
            unit_price: Decimal::ONE,
        };
        assert_eq!(item.quantity(), 1);
    }
}
