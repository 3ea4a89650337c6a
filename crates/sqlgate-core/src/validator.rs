//! Structural validation.
//!
//! Command-kind filtering is the primary defense. The forbidden-construct list
//! catches statements that are select-shaped but still write, such as
//! `SELECT ... INTO new_table`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Rejection, Result};
use crate::parser::{StatementKind, StatementNode};
use crate::tree::{self, Objects};

/// A select-shaped construct that is refused even when the command kind is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForbiddenConstruct {
    /// `SELECT ... INTO target`, at any nesting level.
    SelectInto,
    /// INSERT/UPDATE/DELETE/MERGE nested inside a query, e.g. a data-modifying CTE.
    DataModifyingQuery,
    /// More than one statement in a single submission.
    MultipleStatements,
}

impl ForbiddenConstruct {
    /// Every known construct, in evaluation order.
    pub const ALL: [Self; 3] = [
        Self::SelectInto,
        Self::DataModifyingQuery,
        Self::MultipleStatements,
    ];

    /// Returns the display name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SelectInto => "SELECT INTO",
            Self::DataModifyingQuery => "data-modifying subquery",
            Self::MultipleStatements => "multiple statements",
        }
    }

    /// Whether this construct is judged on the whole submission rather than
    /// per statement.
    #[must_use]
    pub const fn is_submission_level(&self) -> bool {
        matches!(self, Self::MultipleStatements)
    }

    /// Checks a single statement for this construct.
    #[must_use]
    pub fn found_in(&self, node: &StatementNode) -> bool {
        match self {
            Self::SelectInto => Objects::new(node.tree()).any(is_select_into),
            // The root is the statement itself; only nested writes count.
            Self::DataModifyingQuery => Objects::new(node.tree()).skip(1).any(is_write_body),
            Self::MultipleStatements => false,
        }
    }
}

impl fmt::Display for ForbiddenConstruct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_select_into(map: &Map<String, Value>) -> bool {
    map.contains_key("projection") && map.get("into").is_some_and(|into| !into.is_null())
}

fn is_write_body(map: &Map<String, Value>) -> bool {
    tree::variant(map).is_some_and(|(tag, payload)| {
        matches!(tag, "Insert" | "Update" | "Delete" | "Merge") && !payload.is_string()
    })
}

/// Checks statement kinds and forbidden constructs.
#[derive(Debug, Clone)]
pub struct StructuralValidator {
    allowed_commands: Vec<StatementKind>,
    forbidden: Vec<ForbiddenConstruct>,
}

impl Default for StructuralValidator {
    fn default() -> Self {
        Self::new(vec![StatementKind::Select], ForbiddenConstruct::ALL.to_vec())
    }
}

impl StructuralValidator {
    /// Creates a validator with the given command whitelist and forbidden constructs.
    #[must_use]
    pub fn new(allowed_commands: Vec<StatementKind>, forbidden: Vec<ForbiddenConstruct>) -> Self {
        Self {
            allowed_commands,
            forbidden,
        }
    }

    /// Returns the command whitelist.
    #[must_use]
    pub fn allowed_commands(&self) -> &[StatementKind] {
        &self.allowed_commands
    }

    /// Returns the forbidden constructs.
    #[must_use]
    pub fn forbidden_constructs(&self) -> &[ForbiddenConstruct] {
        &self.forbidden
    }

    /// Validates every statement and reports the first violation in submission order.
    pub fn validate(&self, statements: &[StatementNode]) -> Result<()> {
        match self.violations(statements).into_iter().next() {
            Some(rejection) => Err(rejection),
            None => Ok(()),
        }
    }

    /// Returns every violation, in submission order.
    ///
    /// Per-statement violations come first; submission-level ones last.
    #[must_use]
    pub fn violations(&self, statements: &[StatementNode]) -> Vec<Rejection> {
        let mut violations = Vec::new();

        for (index, node) in statements.iter().enumerate() {
            match self.check_statement(node) {
                Ok(()) => debug!(index, kind = %node.kind(), "Statement passed structural checks"),
                Err(rejection) => {
                    warn!(index, kind = %node.kind(), reason = %rejection, "Statement rejected");
                    violations.push(rejection);
                }
            }
        }

        if statements.len() > 1 && self.forbids(ForbiddenConstruct::MultipleStatements) {
            warn!(count = statements.len(), "Multiple statements submitted");
            violations.push(Rejection::ForbiddenConstruct {
                construct: ForbiddenConstruct::MultipleStatements,
            });
        }

        violations
    }

    fn check_statement(&self, node: &StatementNode) -> Result<()> {
        if !self.allowed_commands.contains(node.kind()) {
            return Err(Rejection::ForbiddenCommand {
                kind: node.kind().clone(),
                allowed: self.allowed_commands.clone(),
            });
        }

        let found = self
            .forbidden
            .iter()
            .filter(|c| !c.is_submission_level())
            .find(|c| c.found_in(node));
        match found {
            Some(construct) => Err(Rejection::ForbiddenConstruct {
                construct: *construct,
            }),
            None => Ok(()),
        }
    }

    fn forbids(&self, construct: ForbiddenConstruct) -> bool {
        self.forbidden.contains(&construct)
    }
}
