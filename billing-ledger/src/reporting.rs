//! Read-only aggregation over the invoice and payment tables
//!
//! Not part of the transactional core: aging numbers are computed per
//! request, so they are always consistent with the last committed state.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;
use crate::models::PatientAging;

#[derive(Clone)]
pub struct BillingReports {
    pool: PgPool,
}

impl BillingReports {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Outstanding balance per patient, bucketed by days past due, sorted
    /// descending by outstanding amount.
    pub async fn aging_report(
        &self,
        patient_id: Option<Uuid>,
    ) -> BillingResult<Vec<PatientAging>> {
        let rows = sqlx::query_as::<_, PatientAging>(
            r#"
            SELECT
                i.patient_id,
                COALESCE(SUM(i.total_amount - i.amount_paid), 0) AS outstanding,
                COALESCE(SUM(CASE WHEN i.due_date >= now()
                    THEN i.total_amount - i.amount_paid ELSE 0 END), 0) AS "current",
                COALESCE(SUM(CASE WHEN i.due_date < now()
                    AND i.due_date >= now() - INTERVAL '30 days'
                    THEN i.total_amount - i.amount_paid ELSE 0 END), 0) AS age_0_30,
                COALESCE(SUM(CASE WHEN i.due_date < now() - INTERVAL '30 days'
                    AND i.due_date >= now() - INTERVAL '60 days'
                    THEN i.total_amount - i.amount_paid ELSE 0 END), 0) AS age_31_60,
                COALESCE(SUM(CASE WHEN i.due_date < now() - INTERVAL '60 days'
                    AND i.due_date >= now() - INTERVAL '90 days'
                    THEN i.total_amount - i.amount_paid ELSE 0 END), 0) AS age_61_90,
                COALESCE(SUM(CASE WHEN i.due_date < now() - INTERVAL '90 days'
                    THEN i.total_amount - i.amount_paid ELSE 0 END), 0) AS age_91_plus,
                COUNT(*) AS open_invoices,
                (SELECT MAX(p.paid_at)
                   FROM payments p
                   JOIN invoices i2 ON p.invoice_id = i2.id
                  WHERE i2.patient_id = i.patient_id) AS last_payment_date
            FROM invoices i
            WHERE i.status NOT IN ('paid', 'cancelled')
              AND i.amount_paid < i.total_amount
              AND ($1::uuid IS NULL OR i.patient_id = $1)
            GROUP BY i.patient_id
            ORDER BY outstanding DESC
            "#,
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
