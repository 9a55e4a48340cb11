//! Status derivation for bills and invoices
//!
//! Status is a pure function of monetary state plus two sticky overrides:
//! `cancelled` is terminal, and a manually `approved` bill keeps its approval
//! while nothing has been paid. Every payment mutation re-derives status
//! inside the same transaction as the monetary write. `overdue` is not
//! derived here: it is a read-time property of the due date (see
//! [`effective_invoice_status`]) and never persisted by the payment path.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::models::{BillStatus, InvoiceStatus};

/// Derive a bill's status from its monetary state.
pub fn derive_bill_status(
    current: BillStatus,
    amount_paid: Decimal,
    total_amount: Decimal,
) -> BillStatus {
    if current == BillStatus::Cancelled {
        return BillStatus::Cancelled;
    }
    if amount_paid >= total_amount {
        return BillStatus::Paid;
    }
    if amount_paid > Decimal::ZERO {
        return BillStatus::PartiallyPaid;
    }
    // Approval is a manual override; an unpaid approved bill stays approved.
    if current == BillStatus::Approved {
        BillStatus::Approved
    } else {
        BillStatus::Pending
    }
}

/// Derive an invoice's status from its monetary state.
pub fn derive_invoice_status(
    current: InvoiceStatus,
    amount_paid: Decimal,
    total_amount: Decimal,
) -> InvoiceStatus {
    if current == InvoiceStatus::Cancelled {
        return InvoiceStatus::Cancelled;
    }
    if amount_paid >= total_amount {
        return InvoiceStatus::Paid;
    }
    if amount_paid > Decimal::ZERO {
        return InvoiceStatus::PartiallyPaid;
    }
    InvoiceStatus::Pending
}

/// Read-time status: an unpaid invoice past its due date reports as overdue.
pub fn effective_invoice_status(
    stored: InvoiceStatus,
    amount_paid: Decimal,
    total_amount: Decimal,
    due_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> InvoiceStatus {
    match stored {
        InvoiceStatus::Pending | InvoiceStatus::PartiallyPaid
            if due_date < now && amount_paid < total_amount =>
        {
            InvoiceStatus::Overdue
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn dec(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    #[test]
    fn cancelled_bill_stays_cancelled() {
        assert_eq!(
            derive_bill_status(BillStatus::Cancelled, dec(10_000), dec(10_000)),
            BillStatus::Cancelled
        );
        assert_eq!(
            derive_bill_status(BillStatus::Cancelled, Decimal::ZERO, dec(10_000)),
            BillStatus::Cancelled
        );
    }

    #[test]
    fn unpaid_approved_bill_keeps_approval() {
        assert_eq!(
            derive_bill_status(BillStatus::Approved, Decimal::ZERO, dec(10_000)),
            BillStatus::Approved
        );
    }

    #[test]
    fn payment_branches_downgrade_approval() {
        assert_eq!(
            derive_bill_status(BillStatus::Approved, dec(5_000), dec(10_000)),
            BillStatus::PartiallyPaid
        );
        assert_eq!(
            derive_bill_status(BillStatus::Approved, dec(10_000), dec(10_000)),
            BillStatus::Paid
        );
    }

    #[test]
    fn invoice_status_follows_balance() {
        assert_eq!(
            derive_invoice_status(InvoiceStatus::Pending, Decimal::ZERO, dec(12_500)),
            InvoiceStatus::Pending
        );
        assert_eq!(
            derive_invoice_status(InvoiceStatus::Pending, dec(2_500), dec(12_500)),
            InvoiceStatus::PartiallyPaid
        );
        assert_eq!(
            derive_invoice_status(InvoiceStatus::PartiallyPaid, dec(12_500), dec(12_500)),
            InvoiceStatus::Paid
        );
    }

    #[test]
    fn voiding_all_payments_returns_invoice_to_pending() {
        // Overdue is read-derived; after recompute the stored status drops
        // back to pending, not overdue.
        assert_eq!(
            derive_invoice_status(InvoiceStatus::Overdue, Decimal::ZERO, dec(12_500)),
            InvoiceStatus::Pending
        );
    }

    #[test]
    fn overdue_is_derived_at_read_time() {
        let now = Utc::now();
        let past = now - Duration::days(3);
        let future = now + Duration::days(3);

        assert_eq!(
            effective_invoice_status(InvoiceStatus::Pending, Decimal::ZERO, dec(100), past, now),
            InvoiceStatus::Overdue
        );
        assert_eq!(
            effective_invoice_status(InvoiceStatus::Pending, Decimal::ZERO, dec(100), future, now),
            InvoiceStatus::Pending
        );
        // Fully paid invoices never report overdue.
        assert_eq!(
            effective_invoice_status(InvoiceStatus::Paid, dec(100), dec(100), past, now),
            InvoiceStatus::Paid
        );
        // Cancellation wins over the due date.
        assert_eq!(
            effective_invoice_status(InvoiceStatus::Cancelled, Decimal::ZERO, dec(100), past, now),
            InvoiceStatus::Cancelled
        );
    }

    fn any_bill_status() -> impl Strategy<Value = BillStatus> {
        prop_oneof![
            Just(BillStatus::Pending),
            Just(BillStatus::Approved),
            Just(BillStatus::PartiallyPaid),
            Just(BillStatus::Paid),
            Just(BillStatus::Cancelled),
        ]
    }

    proptest! {
        #[test]
        fn bill_derivation_is_total_and_sticky(
            current in any_bill_status(),
            paid_cents in 0i64..=1_000_000,
            total_cents in 1i64..=1_000_000,
        ) {
            let paid = dec(paid_cents);
            let total = dec(total_cents);
            let derived = derive_bill_status(current, paid, total);

            if current == BillStatus::Cancelled {
                prop_assert_eq!(derived, BillStatus::Cancelled);
            } else if paid >= total {
                prop_assert_eq!(derived, BillStatus::Paid);
            } else if paid > Decimal::ZERO {
                prop_assert_eq!(derived, BillStatus::PartiallyPaid);
            } else {
                prop_assert!(
                    derived == BillStatus::Pending || derived == BillStatus::Approved
                );
            }
        }

        #[test]
        fn invoice_derivation_matches_balance(
            paid_cents in 0i64..=1_000_000,
            total_cents in 1i64..=1_000_000,
        ) {
            let paid = dec(paid_cents);
            let total = dec(total_cents);
            let derived = derive_invoice_status(InvoiceStatus::Pending, paid, total);

            prop_assert_eq!(derived == InvoiceStatus::Paid, paid >= total);
            prop_assert_eq!(
                derived == InvoiceStatus::PartiallyPaid,
                paid > Decimal::ZERO && paid < total
            );
        }
    }
}
