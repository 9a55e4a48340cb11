//! Centralized API route path constants
//!
//! utoipa `#[path(...)]` attributes require string literals and cannot use
//! these constants directly; runtime route definitions use the constants and
//! the utoipa paths must match them exactly.

/// Health check endpoints
pub mod health {
    pub const HEALTH: &str = "/health";
    pub const VERSION: &str = "/version";
}

/// Billing ledger endpoints
pub mod billing {
    pub const BILLS: &str = "/api/v1/billing/bills";
    pub const BILL_BY_ID: &str = "/api/v1/billing/bills/:bill_id";
    pub const BILL_STATUS: &str = "/api/v1/billing/bills/:bill_id/status";
    pub const BILL_ITEMS: &str = "/api/v1/billing/bills/:bill_id/items";
    pub const BILL_AMOUNT_PAID: &str = "/api/v1/billing/bills/:bill_id/amount-paid";
    pub const BILL_PAYMENTS: &str = "/api/v1/billing/bills/:bill_id/payments";
    pub const BILL_INVOICE: &str = "/api/v1/billing/bills/:bill_id/invoice";

    pub const INVOICES: &str = "/api/v1/billing/invoices";
    pub const INVOICE_BY_ID: &str = "/api/v1/billing/invoices/:invoice_id";
    pub const INVOICE_STATUS: &str = "/api/v1/billing/invoices/:invoice_id/status";
    pub const INVOICE_CANCEL: &str = "/api/v1/billing/invoices/:invoice_id/cancel";
    pub const INVOICE_PAYMENTS: &str = "/api/v1/billing/invoices/:invoice_id/payments";

    pub const PAYMENT_VOID: &str = "/api/v1/billing/payments/:payment_id/void";

    pub const REPORTS_AGING: &str = "/api/v1/billing/reports/aging";
}
