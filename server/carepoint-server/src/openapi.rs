use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::server::CarePointServer;

/// Main OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        // Health endpoints
        crate::handlers::health::health_check,
        crate::handlers::health::version_info,

        // Billing endpoints
        crate::handlers::billing::create_bill,
        crate::handlers::billing::list_bills,
        crate::handlers::billing::get_bill,
        crate::handlers::billing::update_bill_status,
        crate::handlers::billing::update_bill_items,
        crate::handlers::billing::update_bill_amount_paid,
        crate::handlers::billing::record_bill_payment,
        crate::handlers::billing::generate_invoice,
        crate::handlers::billing::get_invoice,
        crate::handlers::billing::list_invoices,
        crate::handlers::billing::update_invoice_status,
        crate::handlers::billing::cancel_invoice,
        crate::handlers::billing::record_payment,
        crate::handlers::billing::void_payment,
        crate::handlers::billing::aging_report,
    ),
    components(
        schemas(
            // Health schemas
            crate::handlers::health::HealthResponse,
            crate::handlers::health::VersionResponse,

            // Billing request schemas
            crate::handlers::billing::CreateBillRequest,
            crate::handlers::billing::UpdateBillStatusRequest,
            crate::handlers::billing::UpdateBillItemsRequest,
            crate::handlers::billing::UpdateBillAmountPaidRequest,
            crate::handlers::billing::GenerateInvoiceRequest,
            crate::handlers::billing::RecordPaymentRequest,
            crate::handlers::billing::UpdateInvoiceStatusRequest,
            crate::handlers::billing::CancelInvoiceRequest,
            crate::handlers::billing::VoidPaymentRequest,

            // Billing response schemas
            crate::handlers::billing::BillDetail,
            crate::handlers::billing::InvoiceDetail,
            crate::handlers::billing::InvoicePaymentOutcome,
            crate::handlers::billing::BillPaymentOutcome,
            crate::handlers::billing::VoidPaymentOutcome,

            // Ledger schemas
            billing_ledger::Bill,
            billing_ledger::BillItem,
            billing_ledger::NewBillItem,
            billing_ledger::Invoice,
            billing_ledger::InvoiceItem,
            billing_ledger::Payment,
            billing_ledger::PatientAging,
            billing_ledger::BillStatus,
            billing_ledger::BillStatusParam,
            billing_ledger::InvoiceStatus,
            billing_ledger::PaymentMethod,
            billing_ledger::PaymentGateway,
        )
    ),
    tags(
        (name = "health", description = "System health and status endpoints"),
        (name = "billing", description = "Billing ledger: bills, invoices, payments, aging"),
    ),
    info(
        title = "CarePoint Platform API",
        version = "1.0.0",
        description = "Clinic practice-management platform API. This server exposes the billing ledger: the bill → invoice → payment lifecycle with invoice numbering, overpayment prevention, and void/cancel reconciliation.",
        contact(
            name = "CarePoint Team",
            email = "api@carepoint.health",
            url = "https://carepoint.health"
        ),
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
        (url = "https://api.carepoint.health", description = "Production server"),
    ),
)]
pub struct ApiDoc;

/// Mount the Swagger UI with the generated OpenAPI document
pub fn swagger_routes() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}

/// Attach API documentation routes to the router
pub fn with_docs(router: Router<CarePointServer>) -> Router<CarePointServer> {
    router.merge(swagger_routes())
}
