#![allow(dead_code)]

use sqlgate_core::{AuthorizedQuery, PolicyConfig, QueryPolicy, Rejection, SqlDialect};

pub fn policy() -> QueryPolicy {
    QueryPolicy::new(PolicyConfig::default())
        .unwrap_or_else(|e| panic!("Default policy must build: {e}"))
}

pub fn policy_for(dialect: SqlDialect) -> QueryPolicy {
    QueryPolicy::new(PolicyConfig::default().dialect(dialect))
        .unwrap_or_else(|e| panic!("Policy for {dialect} must build: {e}"))
}

pub fn allow(sql: &str) -> AuthorizedQuery {
    policy()
        .authorize(sql)
        .unwrap_or_else(|e| panic!("Expected query to be allowed: {sql}\nRejection: {e}"))
}

pub fn reject(sql: &str) -> Rejection {
    match policy().authorize(sql) {
        Ok(query) => panic!(
            "Expected rejection for: {sql}\nRelations: {:?}",
            query.relation_names()
        ),
        Err(rejection) => rejection,
    }
}

pub fn denied_relations(sql: &str) -> Vec<String> {
    match reject(sql) {
        Rejection::UnauthorizedRelation { relations, .. } => relations,
        other => panic!("Expected unauthorized relation for: {sql}, got {other:?}"),
    }
}

/// Wraps `inner` in `depth` derived tables.
pub fn nest(inner: &str, depth: usize) -> String {
    (0..depth).fold(inner.to_string(), |sql, level| {
        format!("SELECT * FROM ({sql}) AS n{level}")
    })
}

/// Appends ` id = 0 OR id = 1 ... OR id = {terms - 1}` to `prefix`.
pub fn or_chain(prefix: &str, terms: usize) -> String {
    let chain = (0..terms)
        .map(|i| format!("id = {i}"))
        .collect::<Vec<_>>()
        .join(" OR ");
    format!("{prefix} {chain}")
}
