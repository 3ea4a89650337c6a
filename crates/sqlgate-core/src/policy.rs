//! The complete pre-execution policy: parse, validate, extract, authorize.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::authorizer::RelationAuthorizer;
use crate::error::{PolicyError, Rejection, Result};
use crate::extractor::{RelationName, extract_relations};
use crate::parser::{SqlDialect, StatementKind, StatementNode, StatementParser};
use crate::validator::{ForbiddenConstruct, StructuralValidator};

/// Relations readable by default.
pub const DEFAULT_ALLOWED_RELATIONS: &[&str] = &[
    "users",
    "customers",
    "orders",
    "sales",
    "employees",
    "products",
    "departments",
];

/// Policy configuration. Read once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Relations callers may reference.
    pub allowed_relations: Vec<String>,
    /// Command kinds callers may run.
    pub allowed_commands: Vec<StatementKind>,
    /// Select-shaped constructs that are refused.
    pub forbidden_constructs: Vec<ForbiddenConstruct>,
    /// Grammar used for parsing.
    pub dialect: SqlDialect,
    /// Parser recursion bound.
    pub max_nesting_depth: usize,
    /// Bound on the tokens of one submission.
    pub max_query_tokens: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_relations: DEFAULT_ALLOWED_RELATIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
            allowed_commands: vec![StatementKind::Select],
            forbidden_constructs: ForbiddenConstruct::ALL.to_vec(),
            dialect: SqlDialect::default(),
            max_nesting_depth: StatementParser::DEFAULT_MAX_NESTING_DEPTH,
            max_query_tokens: StatementParser::DEFAULT_MAX_QUERY_TOKENS,
        }
    }
}

impl PolicyConfig {
    /// Replaces the relation allow-list.
    #[must_use]
    pub fn allowed_relations<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_relations = relations.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the command whitelist.
    #[must_use]
    pub fn allowed_commands(mut self, commands: Vec<StatementKind>) -> Self {
        self.allowed_commands = commands;
        self
    }

    /// Replaces the forbidden-construct list.
    #[must_use]
    pub fn forbidden_constructs(mut self, constructs: Vec<ForbiddenConstruct>) -> Self {
        self.forbidden_constructs = constructs;
        self
    }

    /// Sets the grammar.
    #[must_use]
    pub const fn dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Sets the parser recursion bound.
    #[must_use]
    pub const fn max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// Sets the token bound.
    #[must_use]
    pub const fn max_query_tokens(mut self, tokens: usize) -> Self {
        self.max_query_tokens = tokens;
        self
    }
}

/// A query that passed every check and may be executed.
#[derive(Debug, Clone)]
pub struct AuthorizedQuery {
    statements: Vec<StatementNode>,
    relations: BTreeSet<RelationName>,
}

impl AuthorizedQuery {
    /// The parsed statements, in submission order.
    #[must_use]
    pub fn statements(&self) -> &[StatementNode] {
        &self.statements
    }

    /// The referenced relations.
    #[must_use]
    pub const fn relations(&self) -> &BTreeSet<RelationName> {
        &self.relations
    }

    /// The referenced relation names, sorted.
    #[must_use]
    pub fn relation_names(&self) -> Vec<&str> {
        self.relations.iter().map(RelationName::as_str).collect()
    }

    /// The SQL to execute: the canonical rendering of what was validated.
    #[must_use]
    pub fn sql(&self) -> String {
        self.statements
            .iter()
            .map(StatementNode::sql)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Runs the pre-execution pipeline on submitted SQL.
///
/// Holds no per-request state; one instance serves concurrent requests.
#[derive(Debug, Clone)]
pub struct QueryPolicy {
    parser: StatementParser,
    validator: StructuralValidator,
    authorizer: RelationAuthorizer,
}

impl QueryPolicy {
    /// Builds a policy from configuration.
    pub fn new(config: PolicyConfig) -> std::result::Result<Self, PolicyError> {
        if config.allowed_commands.is_empty() {
            return Err(PolicyError::NoAllowedCommands);
        }
        if config.max_nesting_depth == 0 {
            return Err(PolicyError::InvalidNestingDepth);
        }
        if config.max_query_tokens == 0 {
            return Err(PolicyError::InvalidTokenLimit);
        }

        info!(
            dialect = %config.dialect,
            relations = ?config.allowed_relations,
            commands = ?config.allowed_commands,
            "Query policy configured"
        );

        Ok(Self {
            parser: StatementParser::new(config.dialect)
                .max_nesting_depth(config.max_nesting_depth)
                .max_query_tokens(config.max_query_tokens),
            validator: StructuralValidator::new(
                config.allowed_commands,
                config.forbidden_constructs,
            ),
            authorizer: RelationAuthorizer::new(config.allowed_relations),
        })
    }

    /// Returns the parser.
    #[must_use]
    pub const fn parser(&self) -> &StatementParser {
        &self.parser
    }

    /// Returns the structural validator.
    #[must_use]
    pub const fn validator(&self) -> &StructuralValidator {
        &self.validator
    }

    /// Returns the relation authorizer.
    #[must_use]
    pub const fn authorizer(&self) -> &RelationAuthorizer {
        &self.authorizer
    }

    /// Parses the text and runs every structural check.
    pub fn validate(&self, text: &str) -> Result<Vec<StatementNode>> {
        let statements = self.parser.parse(text)?;
        self.validator.validate(&statements)?;
        Ok(statements)
    }

    /// Runs the whole pipeline, stopping at the first failing stage.
    pub fn authorize(&self, text: &str) -> Result<AuthorizedQuery> {
        let statements = self.validate(text)?;

        let relations = extract_relations(&statements);
        debug!(relations = ?relations, "Extracted relations");
        self.authorizer.authorize(&relations)?;

        Ok(AuthorizedQuery {
            statements,
            relations,
        })
    }

    /// Collects every violation instead of stopping at the first.
    ///
    /// Syntax and emptiness errors are still terminal. Relation checks are
    /// only made on statements that passed structural validation.
    pub fn diagnose(&self, text: &str) -> Result<Vec<Rejection>> {
        let statements = self.parser.parse(text)?;
        let mut violations = self.validator.violations(&statements);

        let clean: Vec<StatementNode> = statements
            .into_iter()
            .filter(|node| self.validator.violations(std::slice::from_ref(node)).is_empty())
            .collect();
        if let Err(rejection) = self.authorizer.authorize(&extract_relations(&clean)) {
            violations.push(rejection);
        }
        Ok(violations)
    }
}
