pub mod paths;

use axum::{
    routing::{get, patch, post, put},
    Router,
};

use crate::{
    handlers::{billing, health},
    server::CarePointServer,
};

/// Create health check routes
pub fn health_routes() -> Router<CarePointServer> {
    Router::new()
        .route(paths::health::HEALTH, get(health::health_check))
        .route(paths::health::VERSION, get(health::version_info))
}

/// Create billing ledger routes
pub fn billing_routes() -> Router<CarePointServer> {
    Router::new()
        // Bills
        .route(paths::billing::BILLS, post(billing::create_bill))
        .route(paths::billing::BILLS, get(billing::list_bills))
        .route(paths::billing::BILL_BY_ID, get(billing::get_bill))
        .route(paths::billing::BILL_STATUS, patch(billing::update_bill_status))
        .route(paths::billing::BILL_ITEMS, put(billing::update_bill_items))
        .route(
            paths::billing::BILL_AMOUNT_PAID,
            patch(billing::update_bill_amount_paid),
        )
        .route(paths::billing::BILL_PAYMENTS, post(billing::record_bill_payment))
        // Invoicing
        .route(paths::billing::BILL_INVOICE, post(billing::generate_invoice))
        .route(paths::billing::INVOICES, get(billing::list_invoices))
        .route(paths::billing::INVOICE_BY_ID, get(billing::get_invoice))
        .route(
            paths::billing::INVOICE_STATUS,
            patch(billing::update_invoice_status),
        )
        .route(paths::billing::INVOICE_CANCEL, post(billing::cancel_invoice))
        // Payments
        .route(paths::billing::INVOICE_PAYMENTS, post(billing::record_payment))
        .route(paths::billing::PAYMENT_VOID, post(billing::void_payment))
        // Reporting
        .route(paths::billing::REPORTS_AGING, get(billing::aging_report))
}

/// Assemble all route groups
pub fn create_routes() -> Router<CarePointServer> {
    Router::new().merge(health_routes()).merge(billing_routes())
}
