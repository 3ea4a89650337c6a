//! Relation allow-list enforcement.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, warn};

use crate::error::{Rejection, Result};
use crate::extractor::RelationName;

/// Checks relation names against a fixed allow-list.
///
/// The allow-list is normalized and frozen at construction.
#[derive(Debug, Clone)]
pub struct RelationAuthorizer {
    ordered: Vec<RelationName>,
    allowed: HashSet<RelationName>,
}

impl RelationAuthorizer {
    /// Creates an authorizer. Configured names are trimmed and lower-cased;
    /// duplicates are dropped while the first-seen order is kept for error
    /// messages.
    #[must_use]
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ordered = Vec::new();
        let mut set = HashSet::new();
        for name in allowed {
            let name = RelationName::new(name.as_ref().trim());
            if !name.as_str().is_empty() && set.insert(name.clone()) {
                ordered.push(name);
            }
        }
        Self {
            ordered,
            allowed: set,
        }
    }

    /// Returns the allow-list in configured order.
    #[must_use]
    pub fn allowed(&self) -> &[RelationName] {
        &self.ordered
    }

    /// Whether a single relation is allowed.
    #[must_use]
    pub fn is_allowed(&self, relation: &RelationName) -> bool {
        self.allowed.contains(relation)
    }

    /// Rejects if any relation is outside the allow-list, naming all of them.
    pub fn authorize(&self, relations: &BTreeSet<RelationName>) -> Result<()> {
        let denied: Vec<String> = relations
            .iter()
            .filter(|r| !self.is_allowed(r))
            .map(ToString::to_string)
            .collect();

        if denied.is_empty() {
            debug!(count = relations.len(), "All relations authorized");
            return Ok(());
        }

        warn!(denied = ?denied, "Unauthorized relations referenced");
        Err(Rejection::UnauthorizedRelation {
            relations: denied,
            allowed: self.ordered.iter().map(ToString::to_string).collect(),
        })
    }
}
