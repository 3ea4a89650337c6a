//! Statement parser.
//!
//! Wraps the [`sqlparser`] grammar and lowers every parsed statement into a
//! [`StatementNode`]: its command kind, the canonical SQL that will be executed,
//! and a generic structural tree (every child collection and child object of the
//! syntax tree) for the validator and the relation extractor to walk.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, TokenWithSpan, Tokenizer};
use tracing::debug;

use crate::error::{PolicyError, Rejection, Result};
use crate::tree;

/// Stack reserved for parsing and lowering one submission: a fixed base plus
/// one syntax-tree level per token.
const STACK_BASE: usize = 256 * 1024;
const STACK_PER_TOKEN: usize = 16 * 1024;

/// Grammar used to parse submitted SQL.
///
/// This should match the database the gateway executes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// SQLite (default).
    #[default]
    Sqlite,
    /// PostgreSQL.
    #[serde(alias = "postgresql")]
    Postgres,
    /// MySQL.
    Mysql,
    /// ANSI-ish generic grammar.
    Generic,
}

impl SqlDialect {
    /// Returns the dialect name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Generic => "generic",
        }
    }

    fn grammar(self) -> Box<dyn Dialect> {
        match self {
            Self::Sqlite => Box::new(SQLiteDialect {}),
            Self::Postgres => Box::new(PostgreSqlDialect {}),
            Self::Mysql => Box::new(MySqlDialect {}),
            Self::Generic => Box::new(GenericDialect {}),
        }
    }
}

impl FromStr for SqlDialect {
    type Err = PolicyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::Mysql),
            "generic" => Ok(Self::Generic),
            other => Err(PolicyError::UnknownDialect(other.to_string())),
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Command kind of a parsed statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatementKind {
    /// Any query statement (SELECT, VALUES, set operations, WITH ... SELECT).
    Select,
    /// INSERT.
    Insert,
    /// UPDATE.
    Update,
    /// DELETE.
    Delete,
    /// Anything else, labelled by its statement tag (`create table`, `drop`, ...).
    Other(String),
}

impl StatementKind {
    /// Classifies a parsed statement. `tree` is the statement's structural tree,
    /// used to label statements outside the four well-known kinds.
    #[must_use]
    pub fn classify(statement: &Statement, tree: &Value) -> Self {
        match statement {
            Statement::Query(_) => Self::Select,
            Statement::Insert { .. } => Self::Insert,
            Statement::Update { .. } => Self::Update,
            Statement::Delete { .. } => Self::Delete,
            _ => Self::Other(tag_label(tree)),
        }
    }

    /// Returns the lower-case command name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Other(label) => label,
        }
    }
}

impl From<&str> for StatementKind {
    fn from(s: &str) -> Self {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "select" => Self::Select,
            "insert" => Self::Insert,
            "update" => Self::Update,
            "delete" => Self::Delete,
            _ => Self::Other(normalized),
        }
    }
}

impl From<String> for StatementKind {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<StatementKind> for String {
    fn from(kind: StatementKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns the externally tagged variant name of a serialized statement
/// (`CreateTable`) into a command label (`create table`).
fn tag_label(tree: &Value) -> String {
    let tag = match tree {
        Value::Object(map) => map.keys().next().map(String::as_str),
        Value::String(s) => Some(s.as_str()),
        _ => None,
    };
    let Some(tag) = tag else {
        return "unknown".to_string();
    };

    let mut label = String::with_capacity(tag.len() + 4);
    for (i, ch) in tag.chars().enumerate() {
        if ch.is_ascii_uppercase() && i > 0 {
            label.push(' ');
        }
        label.push(ch.to_ascii_lowercase());
    }
    label
}

/// One parsed statement, owned by a single request.
///
/// The typed syntax tree is consumed by lowering; only the command kind, the
/// canonical SQL and the generic tree are kept.
#[derive(Debug, Clone)]
pub struct StatementNode {
    kind: StatementKind,
    sql: String,
    tree: Value,
}

impl StatementNode {
    /// Lowers a parsed statement into a node.
    ///
    /// Serializing and dropping `statement` recurse once per syntax-tree
    /// level. [`StatementParser::parse`] bounds the input size and lowers on a
    /// stack sized for it.
    pub fn from_statement(statement: Statement) -> Result<Self> {
        let tree = serde_json::to_value(&statement).map_err(|e| Rejection::Syntax {
            message: format!("statement could not be inspected: {e}"),
        })?;
        let kind = StatementKind::classify(&statement, &tree);
        let sql = statement.to_string();
        Ok(Self { kind, sql, tree })
    }

    /// The command kind.
    #[must_use]
    pub const fn kind(&self) -> &StatementKind {
        &self.kind
    }

    /// Canonical SQL rendering of the statement; this is what gets executed.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The generic structural tree.
    #[must_use]
    pub const fn tree(&self) -> &Value {
        &self.tree
    }
}

impl Drop for StatementNode {
    fn drop(&mut self) {
        tree::dismantle(self.tree.take());
    }
}

/// Parses submitted SQL text into statement nodes.
#[derive(Debug, Clone, Copy)]
pub struct StatementParser {
    dialect: SqlDialect,
    max_nesting_depth: usize,
    max_query_tokens: usize,
}

impl Default for StatementParser {
    fn default() -> Self {
        Self::new(SqlDialect::default())
    }
}

impl StatementParser {
    /// Default bound on parser recursion.
    pub const DEFAULT_MAX_NESTING_DEPTH: usize = 64;

    /// Default bound on the tokens of one submission, whitespace and
    /// comments excluded.
    pub const DEFAULT_MAX_QUERY_TOKENS: usize = 8_192;

    /// Creates a parser for the given dialect.
    #[must_use]
    pub const fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            max_nesting_depth: Self::DEFAULT_MAX_NESTING_DEPTH,
            max_query_tokens: Self::DEFAULT_MAX_QUERY_TOKENS,
        }
    }

    /// Sets the recursion bound. Deeper input is rejected as a syntax error.
    #[must_use]
    pub const fn max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// Sets the token bound. Longer input is rejected as a syntax error.
    ///
    /// Operator chains such as `a OR b OR c` are parsed in a loop, not by
    /// recursion, so this is what bounds their depth.
    #[must_use]
    pub const fn max_query_tokens(mut self, tokens: usize) -> Self {
        self.max_query_tokens = tokens;
        self
    }

    /// Returns the dialect.
    #[must_use]
    pub const fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Parses `text` into statements, in submission order.
    ///
    /// Blank input is rejected before the grammar is consulted, and input
    /// over the token bound before anything is built from it.
    pub fn parse(&self, text: &str) -> Result<Vec<StatementNode>> {
        if text.trim().is_empty() {
            return Err(Rejection::EmptyQuery);
        }

        let grammar = self.dialect.grammar();
        let tokens = Tokenizer::new(grammar.as_ref(), text)
            .tokenize_with_location()
            .map_err(|e| Rejection::Syntax {
                message: e.to_string(),
            })?;

        let size = tokens
            .iter()
            .filter(|t| !matches!(t.token, Token::Whitespace(_)))
            .count();
        if size > self.max_query_tokens {
            debug!(size, limit = self.max_query_tokens, "Query over token limit");
            return Err(Rejection::Syntax {
                message: format!(
                    "query has {size} tokens, more than the limit of {}",
                    self.max_query_tokens
                ),
            });
        }

        let stack = STACK_BASE.saturating_add(size.saturating_mul(STACK_PER_TOKEN));
        stacker::maybe_grow(stack, stack, || self.build(grammar.as_ref(), tokens))
    }

    fn build(
        &self,
        grammar: &dyn Dialect,
        tokens: Vec<TokenWithSpan>,
    ) -> Result<Vec<StatementNode>> {
        let statements = Parser::new(grammar)
            .with_recursion_limit(self.max_nesting_depth)
            .with_tokens_with_locations(tokens)
            .parse_statements()
            .map_err(|e| Rejection::Syntax {
                message: e.to_string(),
            })?;

        if statements.is_empty() {
            return Err(Rejection::EmptyQuery);
        }
        debug!(
            dialect = %self.dialect,
            count = statements.len(),
            "Parsed statements"
        );

        statements
            .into_iter()
            .map(StatementNode::from_statement)
            .collect()
    }
}
