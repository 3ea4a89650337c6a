//! Error types for query policy checks.

use crate::parser::StatementKind;
use crate::validator::ForbiddenConstruct;

/// Reasons a submitted query is refused before it reaches the database.
///
/// Every variant is a deterministic function of the query text and the policy
/// configuration, so callers should surface the message as-is rather than retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// The query was empty, whitespace, or contained no statements.
    #[error("Query cannot be empty")]
    EmptyQuery,

    /// The parser could not make sense of the text.
    #[error("SQL syntax error: {message}")]
    Syntax {
        /// Diagnostic from the underlying grammar.
        message: String,
    },

    /// A statement kind outside the command whitelist.
    #[error(
        "Forbidden command: {}. Only {} statements are allowed",
        .kind.to_string().to_uppercase(),
        join_upper(.allowed)
    )]
    ForbiddenCommand {
        /// The offending command kind.
        kind: StatementKind,
        /// The command whitelist in effect.
        allowed: Vec<StatementKind>,
    },

    /// A select-shaped statement with a write side channel.
    #[error("Construct \"{construct}\" is forbidden. Use a plain SELECT for data retrieval")]
    ForbiddenConstruct {
        /// The construct that was found.
        construct: ForbiddenConstruct,
    },

    /// One or more relations outside the allow-list.
    #[error(
        "Unauthorized table access: {}. You can only query these tables: {}",
        .relations.join(", "),
        .allowed.join(", ")
    )]
    UnauthorizedRelation {
        /// Every offending relation, sorted.
        relations: Vec<String>,
        /// The allow-list in configured order.
        allowed: Vec<String>,
    },
}

impl Rejection {
    /// Short machine-readable code for this rejection.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "empty_query",
            Self::Syntax { .. } => "syntax_error",
            Self::ForbiddenCommand { .. } => "forbidden_command",
            Self::ForbiddenConstruct { .. } => "forbidden_construct",
            Self::UnauthorizedRelation { .. } => "unauthorized_relation",
        }
    }
}

fn join_upper(kinds: &[StatementKind]) -> String {
    kinds
        .iter()
        .map(|k| k.to_string().to_uppercase())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Invalid policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// The requested SQL dialect is not supported.
    #[error("unknown SQL dialect: {0}")]
    UnknownDialect(String),

    /// The command whitelist is empty, so nothing could ever run.
    #[error("command whitelist is empty")]
    NoAllowedCommands,

    /// The nesting limit must allow at least one level.
    #[error("max_nesting_depth must be at least 1")]
    InvalidNestingDepth,

    /// The token limit must allow at least one token.
    #[error("max_query_tokens must be at least 1")]
    InvalidTokenLimit,
}

/// Result type for policy checks.
pub type Result<T> = std::result::Result<T, Rejection>;
