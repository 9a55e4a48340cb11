//! Payment posting and voiding
//!
//! Every mutation runs in one transaction and takes a row lock on the
//! payment's parent (invoice or bill), which serializes concurrent postings
//! against the same parent. Balances are recomputed explicitly inside the
//! same transaction as the payment insert/delete; there is no trigger and
//! no deferred reconciliation, so no reader ever observes a stale balance.

use rust_decimal::{Decimal, RoundingStrategy};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::bills::lock_bill;
use crate::error::{BillingError, BillingResult};
use crate::invoices::lock_invoice;
use crate::models::{Bill, BillStatus, Invoice, InvoiceStatus, NewPayment, Payment};
use crate::status::{derive_bill_status, derive_invoice_status};

/// Monetary amounts are posted at cent precision.
pub fn round_to_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Clone)]
pub struct PaymentLedger {
    pool: PgPool,
}

/// Post-void state returned to the caller: the removed payment plus the
/// recomputed parent.
#[derive(Debug)]
pub struct VoidResult {
    pub payment: Payment,
    pub invoice: Option<Invoice>,
    pub bill: Option<Bill>,
}

impl PaymentLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Post a payment against an invoice.
    ///
    /// Rejects paid or cancelled invoices, and any amount exceeding the
    /// remaining balance. Returns the payment together with the recomputed
    /// invoice so the caller needs no follow-up read.
    pub async fn record_payment(
        &self,
        invoice_id: Uuid,
        new_payment: NewPayment,
    ) -> BillingResult<(Payment, Invoice)> {
        let amount = validate_amount(new_payment.amount_paid)?;

        let mut tx = self.pool.begin().await?;

        let invoice = lock_invoice(&mut tx, invoice_id).await?;
        match invoice.status()? {
            InvoiceStatus::Cancelled => {
                return Err(BillingError::conflict("invoice is cancelled"));
            }
            InvoiceStatus::Paid => {
                return Err(BillingError::conflict("invoice is already fully paid"));
            }
            _ => {}
        }

        let remaining = invoice.remaining_balance();
        if amount > remaining {
            return Err(BillingError::conflict(format!(
                "payment {} exceeds remaining balance {}",
                amount, remaining
            )));
        }

        let payment = insert_payment(&mut tx, Some(invoice_id), None, amount, &new_payment).await?;
        let invoice = recompute_invoice_balance_and_status(&mut tx, invoice_id).await?;

        tx.commit().await?;

        info!(
            payment_id = %payment.id,
            invoice_id = %invoice_id,
            amount = %amount,
            status = %invoice.status,
            "payment recorded"
        );
        Ok((payment, invoice))
    }

    /// Post a payment against a draft bill (pre-invoicing).
    ///
    /// The overpayment cap applies exactly as on the invoice path. The
    /// bill's balance is maintained incrementally under the bill lock, so a
    /// manually recorded base amount (`update_bill_amount_paid`) is
    /// preserved.
    pub async fn record_bill_payment(
        &self,
        bill_id: Uuid,
        new_payment: NewPayment,
    ) -> BillingResult<(Payment, Bill)> {
        let amount = validate_amount(new_payment.amount_paid)?;

        let mut tx = self.pool.begin().await?;

        let bill = lock_bill(&mut tx, bill_id).await?;
        if bill.is_finalized() {
            return Err(BillingError::conflict(
                "bill has been invoiced; post the payment against the invoice",
            ));
        }
        match bill.status()? {
            BillStatus::Cancelled => {
                return Err(BillingError::conflict("bill is cancelled"));
            }
            BillStatus::Paid => {
                return Err(BillingError::conflict("bill is already fully paid"));
            }
            _ => {}
        }

        let remaining = bill.total_amount - bill.amount_paid;
        if amount > remaining {
            return Err(BillingError::conflict(format!(
                "payment {} exceeds remaining balance {}",
                amount, remaining
            )));
        }

        let payment = insert_payment(&mut tx, None, Some(bill_id), amount, &new_payment).await?;

        let new_amount_paid = round_to_cents(bill.amount_paid + amount);
        let status = derive_bill_status(bill.status()?, new_amount_paid, bill.total_amount);
        let bill = sqlx::query_as::<_, Bill>(
            "UPDATE bills SET amount_paid = $1, status = $2, updated_at = now() WHERE id = $3 RETURNING *",
        )
        .bind(new_amount_paid)
        .bind(status.as_str())
        .bind(bill_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            payment_id = %payment.id,
            bill_id = %bill_id,
            amount = %amount,
            status = %bill.status,
            "bill payment recorded"
        );
        Ok((payment, bill))
    }

    /// Void a payment: write the audit row, delete the payment, and
    /// recompute the parent's balance and status in one transaction, so no
    /// reader observes the balance without the void applied.
    pub async fn void_payment(
        &self,
        payment_id: Uuid,
        reason: &str,
        voided_by: Option<Uuid>,
    ) -> BillingResult<VoidResult> {
        if reason.trim().is_empty() {
            return Err(BillingError::validation("void reason is required"));
        }

        let mut tx = self.pool.begin().await?;

        let payment =
            sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
                .bind(payment_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(BillingError::NotFound("payment"))?;

        sqlx::query(
            r#"
            INSERT INTO payment_void_log (id, payment_id, invoice_id, bill_id, amount_paid, payment_method, transaction_id, reason, voided_by, voided_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(payment.id)
        .bind(payment.invoice_id)
        .bind(payment.bill_id)
        .bind(payment.amount_paid)
        .bind(&payment.payment_method)
        .bind(&payment.transaction_id)
        .bind(reason.trim())
        .bind(voided_by)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(payment.id)
            .execute(&mut *tx)
            .await?;

        let mut result = VoidResult {
            payment,
            invoice: None,
            bill: None,
        };

        if let Some(invoice_id) = result.payment.invoice_id {
            lock_invoice(&mut tx, invoice_id).await?;
            result.invoice = Some(recompute_invoice_balance_and_status(&mut tx, invoice_id).await?);
        } else if let Some(bill_id) = result.payment.bill_id {
            let bill = lock_bill(&mut tx, bill_id).await?;
            let new_amount_paid = round_to_cents(
                (bill.amount_paid - result.payment.amount_paid).max(Decimal::ZERO),
            );
            let status = derive_bill_status(bill.status()?, new_amount_paid, bill.total_amount);
            let bill = sqlx::query_as::<_, Bill>(
                "UPDATE bills SET amount_paid = $1, status = $2, updated_at = now() WHERE id = $3 RETURNING *",
            )
            .bind(new_amount_paid)
            .bind(status.as_str())
            .bind(bill_id)
            .fetch_one(&mut *tx)
            .await?;
            result.bill = Some(bill);
        }

        tx.commit().await?;

        info!(payment_id = %result.payment.id, "payment voided");
        Ok(result)
    }

    /// Payments recorded against an invoice, newest first.
    pub async fn list_invoice_payments(&self, invoice_id: Uuid) -> BillingResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE invoice_id = $1 ORDER BY paid_at DESC",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }
}

fn validate_amount(amount: Decimal) -> BillingResult<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(BillingError::validation("payment amount must be positive"));
    }
    Ok(round_to_cents(amount))
}

async fn insert_payment(
    tx: &mut Transaction<'_, Postgres>,
    invoice_id: Option<Uuid>,
    bill_id: Option<Uuid>,
    amount: Decimal,
    new_payment: &NewPayment,
) -> BillingResult<Payment> {
    let payment = sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments (id, invoice_id, bill_id, amount_paid, payment_method, payment_gateway, transaction_id, reference_number, notes, created_by, paid_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(invoice_id)
    .bind(bill_id)
    .bind(amount)
    .bind(new_payment.payment_method.as_str())
    .bind(new_payment.payment_gateway.map(|g| g.as_str()))
    .bind(&new_payment.transaction_id)
    .bind(&new_payment.reference_number)
    .bind(&new_payment.notes)
    .bind(new_payment.created_by)
    .fetch_one(&mut **tx)
    .await?;
    Ok(payment)
}

/// Recompute an invoice's balance from the payments table and re-derive its
/// status. Must run with the invoice row locked, inside the transaction
/// that mutated the payments.
pub(crate) async fn recompute_invoice_balance_and_status(
    tx: &mut Transaction<'_, Postgres>,
    invoice_id: Uuid,
) -> BillingResult<Invoice> {
    let amount_paid: Decimal = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount_paid), 0) FROM payments WHERE invoice_id = $1",
    )
    .bind(invoice_id)
    .fetch_one(&mut **tx)
    .await?;
    let amount_paid = round_to_cents(amount_paid);

    let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1")
        .bind(invoice_id)
        .fetch_one(&mut **tx)
        .await?;

    let status = derive_invoice_status(invoice.status()?, amount_paid, invoice.total_amount);

    let invoice = sqlx::query_as::<_, Invoice>(
        "UPDATE invoices SET amount_paid = $1, status = $2, updated_at = now() WHERE id = $3 RETURNING *",
    )
    .bind(amount_paid)
    .bind(status.as_str())
    .bind(invoice_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(invoice)
}
