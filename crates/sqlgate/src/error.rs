//! Error types for the gateway.

use std::time::Duration;

use sqlgate_core::{PolicyError, Rejection};

/// Whose fault a failure is, for callers mapping errors to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The query itself is at fault; resubmitting it unchanged fails again.
    Client,
    /// The environment is at fault.
    Server,
}

/// Errors that can occur while checking or executing a query.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The query was refused before reaching the database.
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// No pooled connection became free within the acquire timeout.
    #[error("No database connection available within {0:?}")]
    PoolExhausted(Duration),

    /// The database failed while running the query.
    #[error("Database error: {0}")]
    Execution(#[from] sqlx::Error),

    /// The query ran longer than the execution timeout.
    #[error("Query exceeded the execution timeout of {0:?}")]
    ExecutionTimeout(Duration),

    /// Rolling back failed. Logged and the connection discarded; never
    /// returned in place of the query's own outcome.
    #[error("Rollback failed: {0}")]
    RollbackFailure(Box<GatewayError>),

    /// The execution task panicked or was cancelled by the runtime.
    #[error("Execution task failed: {0}")]
    Task(String),

    /// Invalid policy settings.
    #[error("Invalid policy: {0}")]
    Policy(#[from] PolicyError),

    /// Invalid configuration file.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error (reading configuration).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Classifies the error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Rejected(_) | Self::Execution(sqlx::Error::Database(_)) => ErrorClass::Client,
            _ => ErrorClass::Server,
        }
    }

    /// HTTP-style status code for the error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Rejected(Rejection::UnauthorizedRelation { .. }) => 403,
            Self::Rejected(_) | Self::Execution(sqlx::Error::Database(_)) => 400,
            Self::PoolExhausted(_) => 503,
            _ => 500,
        }
    }

    /// Short machine-readable code for the error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Rejected(rejection) => rejection.code(),
            Self::PoolExhausted(_) => "pool_exhausted",
            Self::Execution(_) => "execution_error",
            Self::ExecutionTimeout(_) => "execution_timeout",
            Self::RollbackFailure(_) => "rollback_failure",
            Self::Task(_) => "task_failure",
            Self::Policy(_) | Self::Config(_) => "invalid_config",
            Self::Io(_) => "io_error",
        }
    }
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
