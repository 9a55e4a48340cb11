//! Invoice generation and lifecycle
//!
//! `generate_invoice` is the one-way finalization boundary: it snapshots the
//! bill's items, reserves a year-scoped invoice number, re-parents existing
//! payments onto the invoice, and marks the bill finalized, all in a single
//! transaction, so a failure at any step leaves no trace.

use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::bills::lock_bill;
use crate::error::{BillingError, BillingResult};
use crate::models::{BillItem, BillStatus, Invoice, InvoiceFilter, InvoiceItem, InvoiceStatus};
use crate::sequence::InvoiceSequencer;
use crate::status::{derive_invoice_status, effective_invoice_status};

pub const DEFAULT_DUE_IN_DAYS: i64 = 30;

#[derive(Clone)]
pub struct InvoiceGenerator {
    pool: PgPool,
}

impl InvoiceGenerator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Finalize a bill into an immutable invoice.
    ///
    /// Preconditions checked under the bill's row lock, before any write:
    /// the bill exists, is not cancelled, and has not been finalized. The
    /// sequence increment runs inside this same transaction, so a rollback
    /// burns no invoice number.
    pub async fn generate_invoice(
        &self,
        bill_id: Uuid,
        due_in_days: i64,
    ) -> BillingResult<(Invoice, Vec<InvoiceItem>)> {
        if !(0..=3650).contains(&due_in_days) {
            return Err(BillingError::validation(
                "due_in_days must be between 0 and 3650",
            ));
        }

        let mut tx = self.pool.begin().await?;

        let bill = lock_bill(&mut tx, bill_id).await?;
        if bill.is_finalized() {
            return Err(BillingError::conflict("bill has already been invoiced"));
        }
        if bill.status()? == BillStatus::Cancelled {
            return Err(BillingError::conflict("cannot invoice a cancelled bill"));
        }

        // Backstop behind the finalized_at marker; the UNIQUE constraint on
        // invoices.bill_id closes the remaining race.
        let existing: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM invoices WHERE bill_id = $1")
                .bind(bill_id)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Err(BillingError::conflict("an invoice already exists for this bill"));
        }

        let bill_items = sqlx::query_as::<_, BillItem>(
            "SELECT * FROM bill_items WHERE bill_id = $1 ORDER BY service_id",
        )
        .bind(bill_id)
        .fetch_all(&mut *tx)
        .await?;
        if bill_items.is_empty() {
            return Err(BillingError::conflict("cannot invoice a bill without items"));
        }

        let invoice_number =
            InvoiceSequencer::next_invoice_number(&mut tx, Utc::now().year()).await?;

        let status = derive_invoice_status(InvoiceStatus::Pending, bill.amount_paid, bill.total_amount);
        // due_date derives from the same clock as created_at:
        // due_date = created_at + due_in_days.
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (id, invoice_number, bill_id, patient_id, total_amount, amount_paid, due_date, status, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, now() + make_interval(days => $7::int), $8, $9, now(), now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&invoice_number)
        .bind(bill_id)
        .bind(bill.patient_id)
        .bind(bill.total_amount)
        .bind(bill.amount_paid)
        .bind(due_in_days as i32)
        .bind(status.as_str())
        .bind(&bill.notes)
        .fetch_one(&mut *tx)
        .await?;

        let items = snapshot_invoice_items(&mut tx, invoice.id, &bill_items).await?;

        // Ownership transfer, not a copy: existing bill payments become
        // invoice payments.
        sqlx::query("UPDATE payments SET invoice_id = $1, bill_id = NULL WHERE bill_id = $2")
            .bind(invoice.id)
            .bind(bill_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE bills SET finalized_at = now(), updated_at = now() WHERE id = $1")
            .bind(bill_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            bill_id = %bill_id,
            total = %invoice.total_amount,
            "invoice generated"
        );
        Ok((invoice, items))
    }

    pub async fn get_invoice(&self, invoice_id: Uuid) -> BillingResult<(Invoice, Vec<InvoiceItem>)> {
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1")
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(BillingError::NotFound("invoice"))?;

        let items = sqlx::query_as::<_, InvoiceItem>(
            "SELECT * FROM invoice_items WHERE invoice_id = $1 ORDER BY service_id",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;

        Ok((invoice, items))
    }

    pub async fn list_invoices(&self, filter: &InvoiceFilter) -> BillingResult<(Vec<Invoice>, i64)> {
        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT * FROM invoices
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR patient_id = $2)
              AND (NOT $3 OR (status IN ('pending', 'partially_paid')
                              AND due_date < now()
                              AND amount_paid < total_amount))
              AND ($4::timestamptz IS NULL OR created_at >= $4)
              AND ($5::timestamptz IS NULL OR created_at <= $5)
            ORDER BY created_at DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.patient_id)
        .bind(filter.overdue_only)
        .bind(filter.from_date)
        .bind(filter.to_date)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        let total_count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM invoices
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR patient_id = $2)
              AND (NOT $3 OR (status IN ('pending', 'partially_paid')
                              AND due_date < now()
                              AND amount_paid < total_amount))
              AND ($4::timestamptz IS NULL OR created_at >= $4)
              AND ($5::timestamptz IS NULL OR created_at <= $5)
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.patient_id)
        .bind(filter.overdue_only)
        .bind(filter.from_date)
        .bind(filter.to_date)
        .fetch_one(&self.pool)
        .await?;

        Ok((invoices, total_count))
    }

    /// Apply a manual status override.
    ///
    /// `cancelled` is never accepted here; cancellation has its own
    /// operation with the payment-history guard. The requested status must
    /// agree with the invoice's monetary state.
    pub async fn update_invoice_status(
        &self,
        invoice_id: Uuid,
        new_status: InvoiceStatus,
    ) -> BillingResult<Invoice> {
        if new_status == InvoiceStatus::Cancelled {
            return Err(BillingError::conflict(
                "invoices are cancelled through the cancel operation",
            ));
        }

        let mut tx = self.pool.begin().await?;

        let invoice = lock_invoice(&mut tx, invoice_id).await?;
        if invoice.status()? == InvoiceStatus::Cancelled {
            return Err(BillingError::conflict("cancelled invoice is terminal"));
        }

        ensure_status_consistent(&invoice, new_status)?;

        let invoice = sqlx::query_as::<_, Invoice>(
            "UPDATE invoices SET status = $1, updated_at = now() WHERE id = $2 RETURNING *",
        )
        .bind(new_status.as_str())
        .bind(invoice_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(invoice_id = %invoice.id, status = %invoice.status, "invoice status updated");
        Ok(invoice)
    }

    /// Cancel an invoice.
    ///
    /// Succeeds iff nothing has been paid and the invoice is not `paid`;
    /// refunds must go void-then-cancel. The reason is appended to the
    /// invoice notes.
    pub async fn cancel_invoice(&self, invoice_id: Uuid, reason: &str) -> BillingResult<Invoice> {
        if reason.trim().is_empty() {
            return Err(BillingError::validation("cancellation reason is required"));
        }

        let mut tx = self.pool.begin().await?;

        let invoice = lock_invoice(&mut tx, invoice_id).await?;
        let status = invoice.status()?;
        if status == InvoiceStatus::Cancelled {
            return Err(BillingError::conflict("invoice is already cancelled"));
        }
        if status == InvoiceStatus::Paid {
            return Err(BillingError::conflict("cannot cancel a paid invoice"));
        }
        if invoice.amount_paid > Decimal::ZERO {
            return Err(BillingError::conflict(
                "invoice has payments; void them before cancelling",
            ));
        }

        let notes = match &invoice.notes {
            Some(existing) => format!("{}\nCancelled: {}", existing, reason.trim()),
            None => format!("Cancelled: {}", reason.trim()),
        };

        let invoice = sqlx::query_as::<_, Invoice>(
            "UPDATE invoices SET status = 'cancelled', notes = $1, updated_at = now() WHERE id = $2 RETURNING *",
        )
        .bind(notes)
        .bind(invoice_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(invoice_id = %invoice.id, invoice_number = %invoice.invoice_number, "invoice cancelled");
        Ok(invoice)
    }

    /// The stored status with read-time overdue derivation applied.
    pub fn effective_status(invoice: &Invoice) -> BillingResult<InvoiceStatus> {
        Ok(effective_invoice_status(
            invoice.status()?,
            invoice.amount_paid,
            invoice.total_amount,
            invoice.due_date,
            Utc::now(),
        ))
    }
}

pub(crate) async fn lock_invoice(
    tx: &mut Transaction<'_, Postgres>,
    invoice_id: Uuid,
) -> BillingResult<Invoice> {
    sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1 FOR UPDATE")
        .bind(invoice_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(BillingError::NotFound("invoice"))
}

fn ensure_status_consistent(invoice: &Invoice, new_status: InvoiceStatus) -> BillingResult<()> {
    let consistent = match new_status {
        InvoiceStatus::Paid => invoice.amount_paid >= invoice.total_amount,
        InvoiceStatus::PartiallyPaid => {
            invoice.amount_paid > Decimal::ZERO && invoice.amount_paid < invoice.total_amount
        }
        InvoiceStatus::Pending => invoice.amount_paid == Decimal::ZERO,
        InvoiceStatus::Overdue => {
            invoice.due_date < Utc::now() && invoice.amount_paid < invoice.total_amount
        }
        InvoiceStatus::Cancelled => false,
    };

    if consistent {
        Ok(())
    } else {
        Err(BillingError::conflict(format!(
            "status {} does not match the invoice balance ({} of {} paid)",
            new_status.as_str(),
            invoice.amount_paid,
            invoice.total_amount
        )))
    }
}

/// Copy service name/code by value so later catalog edits never change
/// historical invoices.
async fn snapshot_invoice_items(
    tx: &mut Transaction<'_, Postgres>,
    invoice_id: Uuid,
    bill_items: &[BillItem],
) -> BillingResult<Vec<InvoiceItem>> {
    let mut items = Vec::with_capacity(bill_items.len());
    for bill_item in bill_items {
        let catalog: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT name, code FROM services WHERE id = $1")
                .bind(bill_item.service_id)
                .fetch_optional(&mut **tx)
                .await?;
        let (service_name, service_code) = match catalog {
            Some((name, code)) => (name, code),
            None => (format!("Service #{}", bill_item.service_id), None),
        };

        let item = sqlx::query_as::<_, InvoiceItem>(
            r#"
            INSERT INTO invoice_items (id, invoice_id, service_id, service_name, service_code, quantity, unit_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(invoice_id)
        .bind(bill_item.service_id)
        .bind(service_name)
        .bind(service_code)
        .bind(bill_item.quantity)
        .bind(bill_item.unit_price)
        .fetch_one(&mut **tx)
        .await?;
        items.push(item);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn invoice_with(paid_cents: i64, total_cents: i64, status: &str) -> Invoice {
        Invoice {
            id: Uuid::new_v4(),
            invoice_number: "INV-2025-0001".to_string(),
            bill_id: None,
            patient_id: Uuid::new_v4(),
            total_amount: Decimal::new(total_cents, 2),
            amount_paid: Decimal::new(paid_cents, 2),
            due_date: Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap(),
            status: status.to_string(),
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn manual_status_must_match_balance() {
        let unpaid = invoice_with(0, 12_500, "pending");
        assert!(ensure_status_consistent(&unpaid, InvoiceStatus::Pending).is_ok());
        assert!(ensure_status_consistent(&unpaid, InvoiceStatus::Paid).is_err());
        assert!(ensure_status_consistent(&unpaid, InvoiceStatus::PartiallyPaid).is_err());

        let partial = invoice_with(2_500, 12_500, "partially_paid");
        assert!(ensure_status_consistent(&partial, InvoiceStatus::PartiallyPaid).is_ok());
        assert!(ensure_status_consistent(&partial, InvoiceStatus::Pending).is_err());

        let paid = invoice_with(12_500, 12_500, "paid");
        assert!(ensure_status_consistent(&paid, InvoiceStatus::Paid).is_ok());
    }

    #[test]
    fn overdue_override_requires_passed_due_date() {
        let mut invoice = invoice_with(0, 12_500, "pending");
        assert!(ensure_status_consistent(&invoice, InvoiceStatus::Overdue).is_err());

        invoice.due_date = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert!(ensure_status_consistent(&invoice, InvoiceStatus::Overdue).is_ok());
    }

    #[test]
    fn cancellation_never_passes_the_consistency_gate() {
        let invoice = invoice_with(0, 12_500, "pending");
        assert!(ensure_status_consistent(&invoice, InvoiceStatus::Cancelled).is_err());
    }
}
