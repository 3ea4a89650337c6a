//! The gateway facade: policy checks followed by rollback-always execution.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use sqlgate_core::{AuthorizedQuery, QueryPolicy, Rejection};
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::executor::TransactionalExecutor;
use crate::pool::{SessionPool, SqliteSessionPool};
use crate::result::ExecutionResult;

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPhase {
    /// Received, not yet inspected.
    Idle,
    /// Parsing the text.
    Parsing,
    /// Checking command kinds and constructs.
    Validating,
    /// Checking relations against the allow-list.
    Authorizing,
    /// Running inside the transaction.
    Executing,
    /// The transaction was rolled back.
    RolledBack,
    /// Finished with a result.
    Succeeded,
    /// Finished with an error.
    Failed,
}

impl QueryPhase {
    /// The phase in which a rejection is raised.
    #[must_use]
    pub const fn of(rejection: &Rejection) -> Self {
        match rejection {
            Rejection::EmptyQuery | Rejection::Syntax { .. } => Self::Parsing,
            Rejection::ForbiddenCommand { .. } | Rejection::ForbiddenConstruct { .. } => {
                Self::Validating
            }
            Rejection::UnauthorizedRelation { .. } => Self::Authorizing,
        }
    }

    /// Returns the phase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Parsing => "parsing",
            Self::Validating => "validating",
            Self::Authorizing => "authorizing",
            Self::Executing => "executing",
            Self::RolledBack => "rolled_back",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for QueryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts untrusted SQL and returns results without ever persisting a change.
///
/// Shareable across tasks; the only shared state is the connection pool.
pub struct QueryGateway<P: SessionPool = SqliteSessionPool> {
    policy: QueryPolicy,
    executor: TransactionalExecutor<P>,
    requests: AtomicU64,
}

impl QueryGateway<SqliteSessionPool> {
    /// Builds the policy and connects to the configured SQLite database.
    pub async fn connect(config: GatewayConfig) -> Result<Self> {
        let policy = QueryPolicy::new(config.policy)?;
        let pool = SqliteSessionPool::connect(&config.pool).await?;
        let executor =
            TransactionalExecutor::new(pool).execute_timeout(config.pool.execute_timeout());
        Ok(Self::new(policy, executor))
    }
}

impl<P: SessionPool> QueryGateway<P> {
    /// Creates a gateway from its parts.
    pub const fn new(policy: QueryPolicy, executor: TransactionalExecutor<P>) -> Self {
        Self {
            policy,
            executor,
            requests: AtomicU64::new(0),
        }
    }

    /// Returns the policy.
    #[must_use]
    pub const fn policy(&self) -> &QueryPolicy {
        &self.policy
    }

    /// Returns the executor.
    #[must_use]
    pub const fn executor(&self) -> &TransactionalExecutor<P> {
        &self.executor
    }

    /// Runs the policy checks only. Never touches the database.
    pub fn check(&self, text: &str) -> std::result::Result<AuthorizedQuery, Rejection> {
        self.policy.authorize(text)
    }

    /// Checks and executes a query, returning its rolled-back result.
    pub async fn execute_query(&self, text: &str) -> Result<ExecutionResult> {
        let request = self.requests.fetch_add(1, Ordering::Relaxed);
        debug!(request, phase = %QueryPhase::Idle, "Query received");

        let query = match self.policy.authorize(text) {
            Ok(query) => query,
            Err(rejection) => {
                warn!(
                    request,
                    phase = %QueryPhase::of(&rejection),
                    code = rejection.code(),
                    reason = %rejection,
                    "Query rejected"
                );
                return Err(GatewayError::Rejected(rejection));
            }
        };

        debug!(
            request,
            phase = %QueryPhase::Executing,
            relations = ?query.relation_names(),
            "Query authorized"
        );
        match self.executor.execute(&query).await {
            Ok(result) => {
                info!(
                    request,
                    phase = %QueryPhase::Succeeded,
                    rows = result.row_count,
                    "Query executed and rolled back"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(
                    request,
                    phase = %QueryPhase::Failed,
                    code = e.code(),
                    error = %e,
                    "Query failed"
                );
                Err(e)
            }
        }
    }
}
