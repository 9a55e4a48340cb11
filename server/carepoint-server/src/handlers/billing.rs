use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use billing_ledger::{
    Bill, BillItem, BillStatusParam, Invoice, InvoiceFilter, InvoiceGenerator, InvoiceItem,
    InvoiceStatus, NewBill, NewBillItem, NewPayment, PatientAging, Payment, PaymentGateway,
    PaymentMethod, DEFAULT_DUE_IN_DAYS,
};

use crate::error::{api_success, api_success_with_meta, ApiError, ApiResponse};
use crate::server::CarePointServer;
use crate::types::pagination::PaginationParams;
use crate::validation::RequestValidation;
use crate::{validate_field, validate_required};

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

/// Create Bill Request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBillRequest {
    pub patient_id: Uuid,
    pub items: Vec<NewBillItem>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
}

impl RequestValidation for CreateBillRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validate_field!(self.items, !self.items.is_empty(), "At least one item is required");
        for item in &self.items {
            validate_field!(item.service_id, item.service_id > 0, "service_id must be positive");
            if let Some(quantity) = item.quantity {
                validate_field!(quantity, quantity >= 1, "quantity must be at least 1");
            }
            validate_field!(
                item.unit_price,
                item.unit_price > Decimal::ZERO,
                "unit_price must be positive"
            );
        }
        Ok(())
    }
}

/// Update Bill Status Request; accepts the snake_case name or the legacy
/// integer code
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateBillStatusRequest {
    pub status: BillStatusParam,
}

/// Update Bill Items Request: replaces the entire item set
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateBillItemsRequest {
    pub items: Vec<NewBillItem>,
}

impl RequestValidation for UpdateBillItemsRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validate_field!(self.items, !self.items.is_empty(), "At least one item is required");
        Ok(())
    }
}

/// Update Bill Amount Paid Request (manual override)
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateBillAmountPaidRequest {
    pub amount_paid: Decimal,
}

/// Generate Invoice Request
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct GenerateInvoiceRequest {
    pub due_in_days: Option<i64>,
}

/// Record Payment Request, shared by the bill- and invoice-scoped endpoints
#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordPaymentRequest {
    pub amount_paid: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_gateway: Option<PaymentGateway>,
    pub transaction_id: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
}

impl RequestValidation for RecordPaymentRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validate_field!(
            self.amount_paid,
            self.amount_paid > Decimal::ZERO,
            "amount_paid must be positive"
        );
        Ok(())
    }
}

impl RecordPaymentRequest {
    fn into_new_payment(self) -> NewPayment {
        NewPayment {
            amount_paid: self.amount_paid,
            payment_method: self.payment_method,
            payment_gateway: self.payment_gateway,
            transaction_id: self.transaction_id,
            reference_number: self.reference_number,
            notes: self.notes,
            created_by: self.created_by,
        }
    }
}

/// Update Invoice Status Request
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateInvoiceStatusRequest {
    pub status: String,
}

/// Cancel Invoice Request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelInvoiceRequest {
    pub reason: String,
}

impl RequestValidation for CancelInvoiceRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validate_required!(self.reason, "Cancellation reason is required");
        Ok(())
    }
}

/// Void Payment Request
#[derive(Debug, Deserialize, ToSchema)]
pub struct VoidPaymentRequest {
    pub reason: String,
    pub voided_by: Option<Uuid>,
}

impl RequestValidation for VoidPaymentRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validate_required!(self.reason, "Void reason is required");
        Ok(())
    }
}

/// List Invoices Query Parameters
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListInvoicesParams {
    pub status: Option<String>,
    pub patient_id: Option<Uuid>,
    pub overdue_only: Option<bool>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ListInvoicesParams {
    fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page,
            limit: self.limit,
        }
    }
}

/// Aging Report Query Parameters
#[derive(Debug, Deserialize, IntoParams)]
pub struct AgingReportParams {
    pub patient_id: Option<Uuid>,
}

/// Bill with its line items
#[derive(Debug, Serialize, ToSchema)]
pub struct BillDetail {
    pub bill: Bill,
    pub items: Vec<BillItem>,
}

/// Invoice with its item snapshots and the read-time effective status
#[derive(Debug, Serialize, ToSchema)]
pub struct InvoiceDetail {
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
    /// Stored status with the read-time overdue derivation applied.
    pub effective_status: String,
}

/// Payment outcome against an invoice: the recorded payment plus the
/// recomputed invoice, so clients need no follow-up read
#[derive(Debug, Serialize, ToSchema)]
pub struct InvoicePaymentOutcome {
    pub payment: Payment,
    pub invoice: Invoice,
}

/// Payment outcome against a draft bill
#[derive(Debug, Serialize, ToSchema)]
pub struct BillPaymentOutcome {
    pub payment: Payment,
    pub bill: Bill,
}

/// Void outcome: the removed payment and the recomputed parent
#[derive(Debug, Serialize, ToSchema)]
pub struct VoidPaymentOutcome {
    pub payment: Payment,
    pub invoice: Option<Invoice>,
    pub bill: Option<Bill>,
}

fn invoice_detail(invoice: Invoice, items: Vec<InvoiceItem>) -> Result<InvoiceDetail, ApiError> {
    let effective_status = InvoiceGenerator::effective_status(&invoice)?;
    Ok(InvoiceDetail {
        invoice,
        items,
        effective_status: effective_status.as_str().to_string(),
    })
}

// ============================================================================
// BILL HANDLERS
// ============================================================================

/// Create a new draft bill with line items
#[utoipa::path(
    post,
    path = "/api/v1/billing/bills",
    request_body = CreateBillRequest,
    responses(
        (status = 201, description = "Bill created successfully", body = BillDetail),
        (status = 400, description = "Invalid request"),
        (status = 500, description = "Internal server error")
    ),
    tag = "billing"
)]
pub async fn create_bill(
    State(server): State<CarePointServer>,
    Json(request): Json<CreateBillRequest>,
) -> Result<(StatusCode, Json<ApiResponse<BillDetail>>), ApiError> {
    request.validate()?;

    let (bill, items) = server
        .bills
        .create_bill(NewBill {
            patient_id: request.patient_id,
            items: request.items,
            notes: request.notes,
            created_by: request.created_by,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(api_success(BillDetail { bill, items })),
    ))
}

/// List bills, newest first
#[utoipa::path(
    get,
    path = "/api/v1/billing/bills",
    responses(
        (status = 200, description = "Bills retrieved successfully", body = Vec<Bill>),
        (status = 500, description = "Internal server error")
    ),
    params(PaginationParams),
    tag = "billing"
)]
pub async fn list_bills(
    State(server): State<CarePointServer>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<Vec<Bill>>>, ApiError> {
    let (bills, total_count) = server
        .bills
        .list_bills(pagination.limit() as i64, pagination.offset())
        .await?;

    let metadata = pagination.to_metadata(total_count);
    Ok(Json(api_success_with_meta(bills, metadata)))
}

/// Get a bill with its line items
#[utoipa::path(
    get,
    path = "/api/v1/billing/bills/{bill_id}",
    params(
        ("bill_id" = Uuid, Path, description = "Bill ID")
    ),
    responses(
        (status = 200, description = "Bill retrieved successfully", body = BillDetail),
        (status = 404, description = "Bill not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "billing"
)]
pub async fn get_bill(
    State(server): State<CarePointServer>,
    Path(bill_id): Path<Uuid>,
) -> Result<Json<ApiResponse<BillDetail>>, ApiError> {
    let (bill, items) = server.bills.get_bill(bill_id).await?;
    Ok(Json(api_success(BillDetail { bill, items })))
}

/// Apply a manual bill status override
#[utoipa::path(
    patch,
    path = "/api/v1/billing/bills/{bill_id}/status",
    request_body = UpdateBillStatusRequest,
    params(
        ("bill_id" = Uuid, Path, description = "Bill ID")
    ),
    responses(
        (status = 200, description = "Bill status updated", body = Bill),
        (status = 400, description = "Invalid status or conflict"),
        (status = 404, description = "Bill not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "billing"
)]
pub async fn update_bill_status(
    State(server): State<CarePointServer>,
    Path(bill_id): Path<Uuid>,
    Json(request): Json<UpdateBillStatusRequest>,
) -> Result<Json<ApiResponse<Bill>>, ApiError> {
    let status = request.status.resolve()?;
    let bill = server.bills.update_bill_status(bill_id, status).await?;
    Ok(Json(api_success(bill)))
}

/// Replace a bill's item set and recompute its total
#[utoipa::path(
    put,
    path = "/api/v1/billing/bills/{bill_id}/items",
    request_body = UpdateBillItemsRequest,
    params(
        ("bill_id" = Uuid, Path, description = "Bill ID")
    ),
    responses(
        (status = 200, description = "Bill items replaced", body = BillDetail),
        (status = 400, description = "Invalid items or finalized bill"),
        (status = 404, description = "Bill not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "billing"
)]
pub async fn update_bill_items(
    State(server): State<CarePointServer>,
    Path(bill_id): Path<Uuid>,
    Json(request): Json<UpdateBillItemsRequest>,
) -> Result<Json<ApiResponse<BillDetail>>, ApiError> {
    request.validate()?;
    let (bill, items) = server.bills.update_bill_items(bill_id, request.items).await?;
    Ok(Json(api_success(BillDetail { bill, items })))
}

/// Apply a manual paid-amount override to a draft bill
#[utoipa::path(
    patch,
    path = "/api/v1/billing/bills/{bill_id}/amount-paid",
    request_body = UpdateBillAmountPaidRequest,
    params(
        ("bill_id" = Uuid, Path, description = "Bill ID")
    ),
    responses(
        (status = 200, description = "Bill amount updated", body = Bill),
        (status = 400, description = "Out-of-range amount or ledger-managed balance"),
        (status = 404, description = "Bill not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "billing"
)]
pub async fn update_bill_amount_paid(
    State(server): State<CarePointServer>,
    Path(bill_id): Path<Uuid>,
    Json(request): Json<UpdateBillAmountPaidRequest>,
) -> Result<Json<ApiResponse<Bill>>, ApiError> {
    let bill = server
        .bills
        .update_bill_amount_paid(bill_id, request.amount_paid)
        .await?;
    Ok(Json(api_success(bill)))
}

/// Record a payment against a draft bill
#[utoipa::path(
    post,
    path = "/api/v1/billing/bills/{bill_id}/payments",
    request_body = RecordPaymentRequest,
    params(
        ("bill_id" = Uuid, Path, description = "Bill ID")
    ),
    responses(
        (status = 201, description = "Payment recorded", body = BillPaymentOutcome),
        (status = 400, description = "Invalid amount or overpayment"),
        (status = 404, description = "Bill not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "billing"
)]
pub async fn record_bill_payment(
    State(server): State<CarePointServer>,
    Path(bill_id): Path<Uuid>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<BillPaymentOutcome>>), ApiError> {
    request.validate()?;
    let (payment, bill) = server
        .payments
        .record_bill_payment(bill_id, request.into_new_payment())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(api_success(BillPaymentOutcome { payment, bill })),
    ))
}

// ============================================================================
// INVOICE HANDLERS
// ============================================================================

/// Finalize a bill into an invoice
#[utoipa::path(
    post,
    path = "/api/v1/billing/bills/{bill_id}/invoice",
    request_body = GenerateInvoiceRequest,
    params(
        ("bill_id" = Uuid, Path, description = "Bill ID")
    ),
    responses(
        (status = 201, description = "Invoice generated", body = InvoiceDetail),
        (status = 400, description = "Bill already invoiced or cancelled"),
        (status = 404, description = "Bill not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "billing"
)]
pub async fn generate_invoice(
    State(server): State<CarePointServer>,
    Path(bill_id): Path<Uuid>,
    request: Option<Json<GenerateInvoiceRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<InvoiceDetail>>), ApiError> {
    let due_in_days = request
        .map(|Json(r)| r.due_in_days.unwrap_or(DEFAULT_DUE_IN_DAYS))
        .unwrap_or(DEFAULT_DUE_IN_DAYS);

    let (invoice, items) = server.invoices.generate_invoice(bill_id, due_in_days).await?;
    Ok((
        StatusCode::CREATED,
        Json(api_success(invoice_detail(invoice, items)?)),
    ))
}

/// Get an invoice with its item snapshots
#[utoipa::path(
    get,
    path = "/api/v1/billing/invoices/{invoice_id}",
    params(
        ("invoice_id" = Uuid, Path, description = "Invoice ID")
    ),
    responses(
        (status = 200, description = "Invoice retrieved successfully", body = InvoiceDetail),
        (status = 404, description = "Invoice not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "billing"
)]
pub async fn get_invoice(
    State(server): State<CarePointServer>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<ApiResponse<InvoiceDetail>>, ApiError> {
    let (invoice, items) = server.invoices.get_invoice(invoice_id).await?;
    Ok(Json(api_success(invoice_detail(invoice, items)?)))
}

/// List invoices with filters
#[utoipa::path(
    get,
    path = "/api/v1/billing/invoices",
    responses(
        (status = 200, description = "Invoices retrieved successfully", body = Vec<Invoice>),
        (status = 400, description = "Invalid filter"),
        (status = 500, description = "Internal server error")
    ),
    params(ListInvoicesParams),
    tag = "billing"
)]
pub async fn list_invoices(
    State(server): State<CarePointServer>,
    Query(params): Query<ListInvoicesParams>,
) -> Result<Json<ApiResponse<Vec<Invoice>>>, ApiError> {
    let status = params
        .status
        .as_deref()
        .map(InvoiceStatus::parse)
        .transpose()?;

    let pagination = params.pagination();
    let filter = InvoiceFilter {
        status,
        patient_id: params.patient_id,
        overdue_only: params.overdue_only.unwrap_or(false),
        from_date: params.from_date,
        to_date: params.to_date,
        limit: pagination.limit() as i64,
        offset: pagination.offset(),
    };

    let (invoices, total_count) = server.invoices.list_invoices(&filter).await?;
    let metadata = pagination.to_metadata(total_count);
    Ok(Json(api_success_with_meta(invoices, metadata)))
}

/// Apply a manual invoice status override
///
/// Cancellation is not accepted here; use the cancel endpoint.
#[utoipa::path(
    patch,
    path = "/api/v1/billing/invoices/{invoice_id}/status",
    request_body = UpdateInvoiceStatusRequest,
    params(
        ("invoice_id" = Uuid, Path, description = "Invoice ID")
    ),
    responses(
        (status = 200, description = "Invoice status updated", body = Invoice),
        (status = 400, description = "Invalid or inconsistent status"),
        (status = 404, description = "Invoice not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "billing"
)]
pub async fn update_invoice_status(
    State(server): State<CarePointServer>,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<UpdateInvoiceStatusRequest>,
) -> Result<Json<ApiResponse<Invoice>>, ApiError> {
    let status = InvoiceStatus::parse(&request.status)?;
    let invoice = server
        .invoices
        .update_invoice_status(invoice_id, status)
        .await?;
    Ok(Json(api_success(invoice)))
}

/// Cancel an invoice
///
/// Succeeds only while nothing has been paid; refunds go void-then-cancel.
#[utoipa::path(
    post,
    path = "/api/v1/billing/invoices/{invoice_id}/cancel",
    request_body = CancelInvoiceRequest,
    params(
        ("invoice_id" = Uuid, Path, description = "Invoice ID")
    ),
    responses(
        (status = 200, description = "Invoice cancelled", body = Invoice),
        (status = 400, description = "Invoice is paid or has payments"),
        (status = 404, description = "Invoice not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "billing"
)]
pub async fn cancel_invoice(
    State(server): State<CarePointServer>,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<CancelInvoiceRequest>,
) -> Result<Json<ApiResponse<Invoice>>, ApiError> {
    request.validate()?;
    let invoice = server
        .invoices
        .cancel_invoice(invoice_id, &request.reason)
        .await?;
    Ok(Json(api_success(invoice)))
}

// ============================================================================
// PAYMENT HANDLERS
// ============================================================================

/// Record a payment against an invoice
#[utoipa::path(
    post,
    path = "/api/v1/billing/invoices/{invoice_id}/payments",
    request_body = RecordPaymentRequest,
    params(
        ("invoice_id" = Uuid, Path, description = "Invoice ID")
    ),
    responses(
        (status = 201, description = "Payment recorded", body = InvoicePaymentOutcome),
        (status = 400, description = "Overpayment, paid, or cancelled invoice"),
        (status = 404, description = "Invoice not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "billing"
)]
pub async fn record_payment(
    State(server): State<CarePointServer>,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<InvoicePaymentOutcome>>), ApiError> {
    request.validate()?;
    let (payment, invoice) = server
        .payments
        .record_payment(invoice_id, request.into_new_payment())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(api_success(InvoicePaymentOutcome { payment, invoice })),
    ))
}

/// Void a payment
///
/// Deletes the payment with an audit trail and recomputes the parent's
/// balance and status in the same transaction.
#[utoipa::path(
    post,
    path = "/api/v1/billing/payments/{payment_id}/void",
    request_body = VoidPaymentRequest,
    params(
        ("payment_id" = Uuid, Path, description = "Payment ID")
    ),
    responses(
        (status = 200, description = "Payment voided", body = VoidPaymentOutcome),
        (status = 400, description = "Missing reason"),
        (status = 404, description = "Payment not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "billing"
)]
pub async fn void_payment(
    State(server): State<CarePointServer>,
    Path(payment_id): Path<Uuid>,
    Json(request): Json<VoidPaymentRequest>,
) -> Result<Json<ApiResponse<VoidPaymentOutcome>>, ApiError> {
    request.validate()?;
    let result = server
        .payments
        .void_payment(payment_id, &request.reason, request.voided_by)
        .await?;
    Ok(Json(api_success(VoidPaymentOutcome {
        payment: result.payment,
        invoice: result.invoice,
        bill: result.bill,
    })))
}

// ============================================================================
// REPORTING HANDLERS
// ============================================================================

/// Aging report: outstanding balance per patient, bucketed by days past due
#[utoipa::path(
    get,
    path = "/api/v1/billing/reports/aging",
    responses(
        (status = 200, description = "Aging report", body = Vec<PatientAging>),
        (status = 500, description = "Internal server error")
    ),
    params(AgingReportParams),
    tag = "billing"
)]
pub async fn aging_report(
    State(server): State<CarePointServer>,
    Query(params): Query<AgingReportParams>,
) -> Result<Json<ApiResponse<Vec<PatientAging>>>, ApiError> {
    let rows = server.reports.aging_report(params.patient_id).await?;
    Ok(Json(api_success(rows)))
}
