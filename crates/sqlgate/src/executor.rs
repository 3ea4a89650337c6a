//! Rollback-always query execution.
//!
//! Every authorized query runs as one cycle: acquire, begin, fetch, roll
//! back, release. The cycle runs on its own task, so a caller that stops
//! waiting does not interrupt the rollback or the release.

use std::sync::Arc;
use std::time::Duration;

use sqlgate_core::AuthorizedQuery;
use tracing::{debug, error, warn};

use crate::error::{GatewayError, Result};
use crate::pool::{Session, SessionPool};
use crate::result::ExecutionResult;

/// Executes authorized queries inside transactions that are always rolled back.
pub struct TransactionalExecutor<P: SessionPool> {
    pool: Arc<P>,
    execute_timeout: Option<Duration>,
}

impl<P: SessionPool> TransactionalExecutor<P> {
    /// Creates an executor without an execution timeout.
    pub fn new(pool: P) -> Self {
        Self {
            pool: Arc::new(pool),
            execute_timeout: None,
        }
    }

    /// Bounds how long a single query may run.
    #[must_use]
    pub const fn execute_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.execute_timeout = timeout;
        self
    }

    /// Returns the pool.
    #[must_use]
    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Runs the query and rolls it back, whatever the outcome.
    pub async fn execute(&self, query: &AuthorizedQuery) -> Result<ExecutionResult> {
        let pool = Arc::clone(&self.pool);
        let sql = query.sql();
        let timeout = self.execute_timeout;

        tokio::spawn(async move { run_cycle(pool.as_ref(), &sql, timeout).await })
            .await
            .map_err(|e| GatewayError::Task(e.to_string()))?
    }
}

async fn run_cycle<P: SessionPool>(
    pool: &P,
    sql: &str,
    timeout: Option<Duration>,
) -> Result<ExecutionResult> {
    let mut session = pool.acquire().await?;
    debug!("Connection acquired");

    if let Err(e) = session.begin().await {
        warn!(error = %e, "Could not open transaction, discarding connection");
        session.discard();
        return Err(e);
    }

    debug!(sql = %sql, "Executing query");
    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, session.fetch(sql))
            .await
            .unwrap_or_else(|_| Err(GatewayError::ExecutionTimeout(limit))),
        None => session.fetch(sql).await,
    };
    let timed_out = matches!(outcome, Err(GatewayError::ExecutionTimeout(_)));

    let rollback = match timeout {
        Some(limit) => tokio::time::timeout(limit, session.rollback())
            .await
            .unwrap_or_else(|_| Err(GatewayError::ExecutionTimeout(limit))),
        None => session.rollback().await,
    };

    match rollback {
        Ok(()) if !timed_out => {
            debug!("Transaction rolled back, connection released");
            session.release();
        }
        Ok(()) => {
            warn!("Query timed out, discarding connection");
            session.discard();
        }
        Err(e) => {
            let failure = GatewayError::RollbackFailure(Box::new(e));
            error!(error = %failure, "Discarding connection");
            session.discard();
        }
    }

    outcome
}
