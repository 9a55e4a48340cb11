//! Billing ledger core for the CarePoint platform
//!
//! Implements the bill → invoice → payment lifecycle:
//! - Draft bills with line items and computed totals
//! - One-way finalization of a bill into a numbered, immutable invoice
//!   (year-scoped sequencing under a per-year row lock)
//! - Payment posting with a hard overpayment guard, voiding with an audit
//!   trail, and explicit in-transaction balance/status recomputation
//! - Read-time overdue derivation and patient aging aggregation
//!
//! All mutating operations run inside one ACID transaction per call;
//! concurrency safety comes entirely from row-level locks on the specific
//! invoice, bill, payment, or sequence row being mutated.

pub mod bills;
pub mod error;
pub mod invoices;
pub mod models;
pub mod payments;
pub mod reporting;
pub mod sequence;
pub mod status;

pub use bills::BillManager;
pub use error::{BillingError, BillingResult};
pub use invoices::{InvoiceGenerator, DEFAULT_DUE_IN_DAYS};
pub use models::*;
pub use payments::{PaymentLedger, VoidResult};
pub use reporting::BillingReports;
pub use sequence::{format_invoice_number, InvoiceSequencer};
pub use status::{derive_bill_status, derive_invoice_status, effective_invoice_status};
