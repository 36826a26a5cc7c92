use ledger_core::{Error, Result};
use sqlx::{PgPool, Postgres, Transaction};

/// A scoped transactional handle. Dropping it without calling `commit`
/// rolls back (sqlx's `Transaction::drop` does this automatically), matching
/// the original's `get_db_session` context manager.
pub struct Session {
    tx: Transaction<'static, Postgres>,
}

impl Session {
    pub async fn begin(pool: &PgPool) -> Result<Session> {
        let tx = pool
            .begin()
            .await
            .map_err(|e| Error::Transient(format!("begin transaction failed: {e}")))?;
        Ok(Session { tx })
    }

    pub fn as_mut(&mut self) -> &mut Transaction<'static, Postgres> {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| Error::Transient(format!("commit failed: {e}")))
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| Error::Transient(format!("rollback failed: {e}")))
    }
}
