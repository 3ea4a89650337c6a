//! Read-only SQL gateway.
//!
//! `sqlgate` lets untrusted callers run free-text SQL against a shared
//! database without being able to change it or read outside an allow-list:
//!
//! - **Policy** - parsing, command and construct checks, relation
//!   authorization (from `sqlgate-core`)
//! - **Executor** - runs authorized queries inside a transaction that is
//!   always rolled back
//! - **Pool** - the connection seam, with a `sqlx` SQLite implementation
//! - **Gateway** - ties the two together and maps failures to error classes
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlgate::prelude::*;
//!
//! let config = GatewayConfig::default();
//! let gateway = QueryGateway::connect(config).await?;
//!
//! let result = gateway.execute_query("SELECT * FROM users").await?;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//!
//! match gateway.execute_query("DELETE FROM users").await {
//!     Err(e) => assert_eq!(e.status_code(), 400),
//!     Ok(_) => unreachable!(),
//! }
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Run a query and print the result as JSON
//! sqlgate --database sqlite:shop.db query "SELECT * FROM orders"
//!
//! # Check a query without running it
//! sqlgate check "SELECT * FROM secrets; DELETE FROM users"
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod pool;
pub mod result;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{GatewayConfig, PoolConfig};
    pub use crate::error::{ErrorClass, GatewayError, Result};
    pub use crate::executor::TransactionalExecutor;
    pub use crate::gateway::{QueryGateway, QueryPhase};
    pub use crate::pool::{Session, SessionPool, SqliteSession, SqliteSessionPool};
    pub use crate::result::{ExecutionResult, FieldDescriptor, Row};
    pub use sqlgate_core::{
        AuthorizedQuery, ForbiddenConstruct, PolicyConfig, QueryPolicy, Rejection, SqlDialect,
        StatementKind,
    };
}
