//! Bill management: draft bills and their line items
//!
//! Bills are mutable until finalized into an invoice. Item replacement is
//! last-writer-wins: there is no version column, and concurrent editors of
//! the same bill overwrite each other. The row lock taken here only
//! serializes item edits against finalization and payment posting.

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::models::{Bill, BillItem, BillStatus, NewBill, NewBillItem};
use crate::status::derive_bill_status;

#[derive(Clone)]
pub struct BillManager {
    pool: PgPool,
}

impl BillManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a draft bill with its line items, all-or-nothing.
    pub async fn create_bill(&self, new_bill: NewBill) -> BillingResult<(Bill, Vec<BillItem>)> {
        let total_amount = compute_items_total(&new_bill.items)?;

        let mut tx = self.pool.begin().await?;

        let bill = sqlx::query_as::<_, Bill>(
            r#"
            INSERT INTO bills (id, patient_id, total_amount, amount_paid, status, notes, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, 0, 'pending', $4, $5, now(), now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new_bill.patient_id)
        .bind(total_amount)
        .bind(&new_bill.notes)
        .bind(new_bill.created_by)
        .fetch_one(&mut *tx)
        .await?;

        let items = insert_bill_items(&mut tx, bill.id, &new_bill.items).await?;

        tx.commit().await?;

        info!(bill_id = %bill.id, patient_id = %bill.patient_id, total = %bill.total_amount, "bill created");
        Ok((bill, items))
    }

    pub async fn get_bill(&self, bill_id: Uuid) -> BillingResult<(Bill, Vec<BillItem>)> {
        let bill = sqlx::query_as::<_, Bill>("SELECT * FROM bills WHERE id = $1")
            .bind(bill_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(BillingError::NotFound("bill"))?;

        let items = sqlx::query_as::<_, BillItem>(
            "SELECT * FROM bill_items WHERE bill_id = $1 ORDER BY service_id",
        )
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;

        Ok((bill, items))
    }

    pub async fn list_bills(&self, limit: i64, offset: i64) -> BillingResult<(Vec<Bill>, i64)> {
        let bills = sqlx::query_as::<_, Bill>(
            "SELECT * FROM bills ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM bills")
            .fetch_one(&self.pool)
            .await?;

        Ok((bills, total_count))
    }

    /// Replace the entire item set and recompute the total.
    ///
    /// Delete-then-reinsert; the last writer wins. Rejected once the bill is
    /// finalized, and when the new total would fall below the amount already
    /// paid.
    pub async fn update_bill_items(
        &self,
        bill_id: Uuid,
        items: Vec<NewBillItem>,
    ) -> BillingResult<(Bill, Vec<BillItem>)> {
        let total_amount = compute_items_total(&items)?;

        let mut tx = self.pool.begin().await?;

        let bill = lock_bill(&mut tx, bill_id).await?;
        ensure_editable(&bill)?;

        if total_amount < bill.amount_paid {
            return Err(BillingError::conflict(format!(
                "new total {} is below the amount already paid {}",
                total_amount, bill.amount_paid
            )));
        }

        sqlx::query("DELETE FROM bill_items WHERE bill_id = $1")
            .bind(bill_id)
            .execute(&mut *tx)
            .await?;

        let inserted = insert_bill_items(&mut tx, bill_id, &items).await?;

        let status = derive_bill_status(bill.status()?, bill.amount_paid, total_amount);
        let bill = sqlx::query_as::<_, Bill>(
            "UPDATE bills SET total_amount = $1, status = $2, updated_at = now() WHERE id = $3 RETURNING *",
        )
        .bind(total_amount)
        .bind(status.as_str())
        .bind(bill_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(bill_id = %bill.id, total = %bill.total_amount, "bill items replaced");
        Ok((bill, inserted))
    }

    /// Apply a manual status override.
    ///
    /// Cancellation follows the ledger-wide rule: nothing with a recorded
    /// payment amount can be cancelled; void the payments first.
    pub async fn update_bill_status(
        &self,
        bill_id: Uuid,
        new_status: BillStatus,
    ) -> BillingResult<Bill> {
        let mut tx = self.pool.begin().await?;

        let bill = lock_bill(&mut tx, bill_id).await?;
        ensure_editable(&bill)?;

        if new_status == BillStatus::Cancelled && bill.amount_paid > Decimal::ZERO {
            return Err(BillingError::conflict(
                "bill has recorded payments; void them before cancelling",
            ));
        }

        let bill = sqlx::query_as::<_, Bill>(
            "UPDATE bills SET status = $1, updated_at = now() WHERE id = $2 RETURNING *",
        )
        .bind(new_status.as_str())
        .bind(bill_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(bill_id = %bill.id, status = %bill.status, "bill status updated");
        Ok(bill)
    }

    /// Apply a manual paid-amount override, range-checked against the total.
    ///
    /// Only legal while no Payment rows exist for the bill; once real
    /// payment events are recorded, the ledger owns the balance.
    pub async fn update_bill_amount_paid(
        &self,
        bill_id: Uuid,
        amount_paid: Decimal,
    ) -> BillingResult<Bill> {
        if amount_paid < Decimal::ZERO {
            return Err(BillingError::validation("amount_paid cannot be negative"));
        }
        let amount_paid = crate::payments::round_to_cents(amount_paid);

        let mut tx = self.pool.begin().await?;

        let bill = lock_bill(&mut tx, bill_id).await?;
        ensure_editable(&bill)?;

        if amount_paid > bill.total_amount {
            return Err(BillingError::conflict(format!(
                "amount_paid {} exceeds bill total {}",
                amount_paid, bill.total_amount
            )));
        }

        let payment_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE bill_id = $1")
                .bind(bill_id)
                .fetch_one(&mut *tx)
                .await?;
        if payment_count > 0 {
            return Err(BillingError::conflict(
                "bill has recorded payments; the balance is ledger-managed",
            ));
        }

        let status = derive_bill_status(bill.status()?, amount_paid, bill.total_amount);
        let bill = sqlx::query_as::<_, Bill>(
            "UPDATE bills SET amount_paid = $1, status = $2, updated_at = now() WHERE id = $3 RETURNING *",
        )
        .bind(amount_paid)
        .bind(status.as_str())
        .bind(bill_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(bill_id = %bill.id, amount_paid = %bill.amount_paid, "bill amount_paid overridden");
        Ok(bill)
    }
}

pub(crate) async fn lock_bill(
    tx: &mut Transaction<'_, Postgres>,
    bill_id: Uuid,
) -> BillingResult<Bill> {
    sqlx::query_as::<_, Bill>("SELECT * FROM bills WHERE id = $1 FOR UPDATE")
        .bind(bill_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(BillingError::NotFound("bill"))
}

fn ensure_editable(bill: &Bill) -> BillingResult<()> {
    if bill.is_finalized() {
        return Err(BillingError::conflict(
            "bill has been finalized into an invoice and is immutable",
        ));
    }
    if bill.status()? == BillStatus::Cancelled {
        return Err(BillingError::conflict("cancelled bill is terminal"));
    }
    Ok(())
}

/// Validate the item set and compute the bill total.
pub(crate) fn compute_items_total(items: &[NewBillItem]) -> BillingResult<Decimal> {
    if items.is_empty() {
        return Err(BillingError::validation("bill requires at least one item"));
    }

    let mut total = Decimal::ZERO;
    for item in items {
        if item.service_id <= 0 {
            return Err(BillingError::validation("service_id must be positive"));
        }
        let quantity = item.quantity();
        if quantity < 1 {
            return Err(BillingError::validation("quantity must be at least 1"));
        }
        if item.unit_price <= Decimal::ZERO {
            return Err(BillingError::validation("unit_price must be positive"));
        }
        let line_total = Decimal::from(quantity)
            .checked_mul(item.unit_price)
            .ok_or_else(|| BillingError::validation("line total overflow"))?;
        total = total
            .checked_add(line_total)
            .ok_or_else(|| BillingError::validation("bill total overflow"))?;
    }

    Ok(crate::payments::round_to_cents(total))
}

async fn insert_bill_items(
    tx: &mut Transaction<'_, Postgres>,
    bill_id: Uuid,
    items: &[NewBillItem],
) -> BillingResult<Vec<BillItem>> {
    let mut inserted = Vec::with_capacity(items.len());
    for item in items {
        let row = sqlx::query_as::<_, BillItem>(
            r#"
            INSERT INTO bill_items (id, bill_id, service_id, quantity, unit_price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bill_id)
        .bind(item.service_id)
        .bind(item.quantity())
        .bind(item.unit_price)
        .fetch_one(&mut **tx)
        .await?;
        inserted.push(row);
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(service_id: i64, quantity: Option<i32>, cents: i64) -> NewBillItem {
        NewBillItem {
            service_id,
            quantity,
            unit_price: Decimal::new(cents, 2),
        }
    }

    #[test]
    fn total_is_sum_of_line_totals() {
        // 2 x 50.00 + 1 x 25.00 = 125.00
        let total =
            compute_items_total(&[item(1, Some(2), 5_000), item(2, Some(1), 2_500)]).unwrap();
        assert_eq!(total, Decimal::new(12_500, 2));
    }

    #[test]
    fn quantity_defaults_to_one() {
        let total = compute_items_total(&[item(1, None, 5_000)]).unwrap();
        assert_eq!(total, Decimal::new(5_000, 2));
    }

    #[test]
    fn rejects_empty_item_set() {
        assert!(matches!(
            compute_items_total(&[]),
            Err(BillingError::Validation(_))
        ));
    }

    #[test]
    fn rejects_invalid_items() {
        assert!(compute_items_total(&[item(0, Some(1), 5_000)]).is_err());
        assert!(compute_items_total(&[item(1, Some(0), 5_000)]).is_err());
        assert!(compute_items_total(&[item(1, Some(1), 0)]).is_err());
        assert!(compute_items_total(&[item(1, Some(1), -100)]).is_err());
    }
}
