//! # sqlgate-core
//!
//! The I/O-free half of the query gateway: everything that decides whether a
//! piece of untrusted SQL may run, without ever touching a database.
//!
//! This crate provides:
//! - Parser integration on top of [`sqlparser`], lowering each statement into a
//!   [`StatementNode`] with a generic structural tree
//! - A structural validator enforcing a command whitelist and a list of
//!   forbidden select-shaped write constructs
//! - A relation extractor that walks the whole tree with an explicit work-stack
//! - A relation authorizer backed by an immutable allow-list
//!
//! ## Checking a query
//!
//! ```rust
//! use sqlgate_core::{PolicyConfig, QueryPolicy, Rejection};
//!
//! let policy = QueryPolicy::new(PolicyConfig::default()).unwrap();
//!
//! let authorized = policy
//!     .authorize("SELECT o.id FROM orders o JOIN customers c ON o.customer_id = c.customer_id")
//!     .unwrap();
//! assert_eq!(authorized.relation_names(), vec!["customers", "orders"]);
//!
//! let rejected = policy.authorize("DELETE FROM users").unwrap_err();
//! assert!(matches!(rejected, Rejection::ForbiddenCommand { .. }));
//! ```
//!
//! ## Custom allow-lists
//!
//! Configuration is passed in explicitly, so differently scoped policies can
//! live side by side:
//!
//! ```rust
//! use sqlgate_core::{PolicyConfig, QueryPolicy, Rejection};
//!
//! let config = PolicyConfig::default().allowed_relations(["inventory"]);
//! let policy = QueryPolicy::new(config).unwrap();
//! assert!(policy.authorize("SELECT * FROM inventory").is_ok());
//!
//! let err = policy.authorize("SELECT * FROM users").unwrap_err();
//! assert!(matches!(err, Rejection::UnauthorizedRelation { .. }));
//! ```

pub mod authorizer;
pub mod error;
pub mod extractor;
pub mod parser;
pub mod policy;
mod tree;
pub mod validator;

pub use authorizer::RelationAuthorizer;
pub use error::{PolicyError, Rejection};
pub use extractor::{RelationName, extract_relations};
pub use parser::{SqlDialect, StatementKind, StatementNode, StatementParser};
pub use policy::{AuthorizedQuery, DEFAULT_ALLOWED_RELATIONS, PolicyConfig, QueryPolicy};
pub use validator::{ForbiddenConstruct, StructuralValidator};
