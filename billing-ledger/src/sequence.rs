//! Year-scoped invoice numbering
//!
//! One `invoice_sequences` row per calendar year is the sole serialization
//! point for numbering. The caller's transaction takes a pessimistic lock on
//! that row, so the number is only consumed if the surrounding invoice
//! creation commits; a rollback burns no numbers.

use sqlx::{Postgres, Transaction};

use crate::error::BillingResult;

pub struct InvoiceSequencer;

impl InvoiceSequencer {
    /// Reserve the next invoice number for `year` inside the caller's
    /// transaction.
    ///
    /// The insert-if-absent handles the first invoice of a year; when two
    /// transactions race to create the same year row, the primary key on
    /// `year` settles the race and the loser proceeds to the lock below.
    pub async fn next_invoice_number(
        tx: &mut Transaction<'_, Postgres>,
        year: i32,
    ) -> BillingResult<String> {
        sqlx::query(
            "INSERT INTO invoice_sequences (year, last_sequence) VALUES ($1, 0) \
             ON CONFLICT (year) DO NOTHING",
        )
        .bind(year)
        .execute(&mut **tx)
        .await?;

        let last_sequence: i32 = sqlx::query_scalar(
            "SELECT last_sequence FROM invoice_sequences WHERE year = $1 FOR UPDATE",
        )
        .bind(year)
        .fetch_one(&mut **tx)
        .await?;

        let sequence = last_sequence + 1;

        sqlx::query("UPDATE invoice_sequences SET last_sequence = $1 WHERE year = $2")
            .bind(sequence)
            .bind(year)
            .execute(&mut **tx)
            .await?;

        Ok(format_invoice_number(year, sequence))
    }
}

/// `INV-{year}-{seq:04}`; the sequence pads to four digits and widens beyond
/// 9999.
pub fn format_invoice_number(year: i32, sequence: i32) -> String {
    format!("INV-{}-{:04}", year, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_four_digit_padding() {
        assert_eq!(format_invoice_number(2025, 1), "INV-2025-0001");
        assert_eq!(format_invoice_number(2025, 42), "INV-2025-0042");
        assert_eq!(format_invoice_number(2026, 9999), "INV-2026-9999");
    }

    #[test]
    fn widens_past_four_digits() {
        assert_eq!(format_invoice_number(2025, 12345), "INV-2025-12345");
    }
}
