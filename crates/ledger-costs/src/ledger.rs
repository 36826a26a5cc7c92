use chrono::{DateTime, Duration, Utc};
use ledger_core::model::CostStatus;
use ledger_core::{Error, Result};
use sqlx::PgPool;
use uuid::Uuid;

pub fn estimate(pages: i32, per_page_cents: i64) -> i64 {
    pages as i64 * per_page_cents
}

pub struct CostLedger {
    pool: PgPool,
}

#[derive(Debug, Clone)]
pub struct StaleRecord {
    pub record_id: Uuid,
    pub job_id: Uuid,
    pub age_minutes: f64,
}

impl CostLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `estimate(pages, per_page_cents) -> cents` (spec §4.7).
    pub fn estimate(&self, pages: i32, per_page_cents: i64) -> i64 {
        estimate(pages, per_page_cents)
    }

    /// `record(...)`: rejects with `BudgetExceeded` when the estimate
    /// exceeds the configured ceiling; `max_job_cost_cents <= 0` disables
    /// the gate. Otherwise inserts a PENDING record.
    pub async fn record(
        &self,
        job_id: Uuid,
        user_id: Option<&str>,
        provider: &str,
        pages: i32,
        per_page_cents: i64,
        max_job_cost_cents: i64,
    ) -> Result<Uuid> {
        let estimate = self.estimate(pages, per_page_cents);
        if max_job_cost_cents > 0 && estimate > max_job_cost_cents {
            return Err(Error::BudgetExceeded {
                estimate_cents: estimate,
                ceiling_cents: max_job_cost_cents,
            });
        }

        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO cost_records (id, job_id, user_id, provider, pages, cost_cents, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', $7)",
        )
        .bind(id)
        .bind(job_id)
        .bind(user_id)
        .bind(provider)
        .bind(pages)
        .bind(estimate)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Transient(format!("cost record insert failed: {e}")))?;

        Ok(id)
    }

    /// `complete(record_id, success)`: flips PENDING to COMPLETED or FAILED.
    pub async fn complete(&self, record_id: Uuid, success: bool) -> Result<()> {
        let status = if success { CostStatus::Completed } else { CostStatus::Failed };
        let status_str = match status {
            CostStatus::Completed => "COMPLETED",
            CostStatus::Failed => "FAILED",
            CostStatus::Pending => "PENDING",
        };
        sqlx::query(
            "UPDATE cost_records SET status = $1, completed_at = $2 WHERE id = $3",
        )
        .bind(status_str)
        .bind(Utc::now())
        .bind(record_id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Transient(format!("cost complete failed: {e}")))?;
        Ok(())
    }

    /// `reconcile()`: report-only. Returns records still PENDING after the
    /// cutoff; per the preserved Open Question (spec §9) this never flips
    /// stale records, it only reports them — remediation stays out of core
    /// scope.
    pub async fn reconcile(&self, cutoff_minutes: i64) -> Result<Vec<StaleRecord>> {
        let cutoff: DateTime<Utc> = Utc::now() - Duration::minutes(cutoff_minutes);
        let rows: Vec<(Uuid, Uuid, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, job_id, created_at FROM cost_records WHERE status = 'PENDING' AND created_at < $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Transient(format!("reconcile query failed: {e}")))?;

        let now = Utc::now();
        Ok(rows
            .into_iter()
            .map(|(record_id, job_id, created_at)| StaleRecord {
                record_id,
                job_id,
                age_minutes: (now - created_at).num_seconds() as f64 / 60.0,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_multiplies_pages_by_rate() {
        assert_eq!(estimate(10, 2), 20);
        assert_eq!(estimate(0, 500), 0);
    }
}
