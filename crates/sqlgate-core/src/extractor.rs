//! Relation extraction.
//!
//! Walks the structural tree of each statement and collects every named
//! relation access: FROM and JOIN table factors, derived tables, CTE bodies,
//! subqueries inside expressions and function arguments, and `TABLE x` bodies.
//! Column references and aliases never match the relation shapes.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::parser::StatementNode;
use crate::tree;

/// A lower-cased relation name, schema-qualified when the query qualified it.
///
/// Whitespace is significant: `"users "` and `users` are different tables.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RelationName(String);

impl RelationName {
    /// Creates a normalized relation name. Only case is folded.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().to_lowercase())
    }

    /// Returns the name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RelationName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for RelationName {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Collects the deduplicated relation names referenced by `statements`.
#[must_use]
pub fn extract_relations(statements: &[StatementNode]) -> BTreeSet<RelationName> {
    let mut relations = BTreeSet::new();
    for node in statements {
        collect(node.tree(), &mut relations);
    }
    relations
}

/// CTE names visible at some point of the walk.
struct CteScope {
    names: HashSet<String>,
    parent: Option<Rc<CteScope>>,
}

impl CteScope {
    fn shadows(&self, name: &str) -> bool {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if current.names.contains(name) {
                return true;
            }
            scope = current.parent.as_deref();
        }
        false
    }
}

/// A relation access found in the tree.
struct Reference {
    name: RelationName,
    qualified: bool,
}

fn collect(root: &Value, relations: &mut BTreeSet<RelationName>) {
    let mut stack: Vec<(&Value, Option<Rc<CteScope>>)> = vec![(root, None)];

    while let Some((value, scope)) = stack.pop() {
        match value {
            Value::Array(items) => {
                stack.extend(items.iter().map(|item| (item, scope.clone())));
            }
            Value::Object(map) => {
                if let Some(reference) = relation_at(map) {
                    let is_cte = !reference.qualified
                        && scope
                            .as_deref()
                            .is_some_and(|s| s.shadows(reference.name.as_str()));
                    if !is_cte {
                        relations.insert(reference.name);
                    }
                }

                let scope = match cte_names(map) {
                    Some(names) if !names.is_empty() => Some(Rc::new(CteScope {
                        names,
                        parent: scope,
                    })),
                    _ => scope,
                };
                stack.extend(map.values().map(|child| (child, scope.clone())));
            }
            _ => {}
        }
    }
}

/// Recognizes the named-relation shapes: a table factor
/// (`{"Table": {"name": [...]}}`), a `TABLE x` query body
/// (`{"Table": {"table_name": "x", "schema_name": ...}}`) and an INSERT
/// target (`{"TableName": [...]}`).
fn relation_at(map: &Map<String, Value>) -> Option<Reference> {
    let (tag, payload) = tree::variant(map)?;
    match tag {
        "Table" => {}
        "TableName" => return Some(object_name(payload)),
        _ => return None,
    }
    let payload = payload.as_object()?;

    if let Some(name) = payload.get("name") {
        return Some(object_name(name));
    }

    let table = payload.get("table_name")?.as_str()?;
    match payload.get("schema_name").and_then(Value::as_str) {
        Some(schema) => Some(Reference {
            name: RelationName::new(format!("{schema}.{table}")),
            qualified: true,
        }),
        None => Some(Reference {
            name: RelationName::new(table),
            qualified: false,
        }),
    }
}

/// Reads a possibly qualified object name. Parts that are not plain
/// identifiers make the whole name unresolvable; it is then kept verbatim so
/// it can never match an allow-list entry.
fn object_name(name: &Value) -> Reference {
    let parts: Option<Vec<&str>> = match name {
        Value::Array(parts) => parts.iter().map(ident_value).collect(),
        _ => None,
    };

    match parts {
        Some(parts) if !parts.is_empty() => Reference {
            qualified: parts.len() > 1,
            name: RelationName::new(parts.join(".")),
        },
        _ => Reference {
            name: RelationName(name.to_string()),
            qualified: true,
        },
    }
}

fn ident_value(part: &Value) -> Option<&str> {
    let part = part.as_object()?;
    let ident = match tree::variant(part) {
        Some(("Identifier", ident)) => ident.as_object()?,
        _ => part,
    };
    ident.get("value")?.as_str()
}

/// If `map` is a query with a WITH clause, returns the lower-cased CTE names.
fn cte_names(map: &Map<String, Value>) -> Option<HashSet<String>> {
    if !map.contains_key("body") {
        return None;
    }
    let ctes = map.get("with")?.get("cte_tables")?.as_array()?;
    Some(
        ctes.iter()
            .filter_map(|cte| cte.get("alias")?.get("name")?.get("value")?.as_str())
            .map(str::to_lowercase)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{SqlDialect, StatementParser};

    fn relations(sql: &str) -> Vec<String> {
        relations_in(SqlDialect::Sqlite, sql)
    }

    fn relations_in(dialect: SqlDialect, sql: &str) -> Vec<String> {
        let nodes = StatementParser::new(dialect).parse(sql).unwrap();
        extract_relations(&nodes)
            .into_iter()
            .map(|r| r.to_string())
            .collect()
    }

    #[test]
    fn test_single_table() {
        assert_eq!(relations("SELECT * FROM users"), vec!["users"]);
    }

    #[test]
    fn test_aliases_and_columns_are_not_relations() {
        assert_eq!(
            relations("SELECT u.name AS customers FROM users AS u WHERE u.orders > 1"),
            vec!["users"]
        );
    }

    #[test]
    fn test_join_with_derived_table() {
        assert_eq!(
            relations(
                "SELECT * FROM orders o JOIN (SELECT * FROM customers) c \
                 ON o.customer_id = c.customer_id"
            ),
            vec!["customers", "orders"]
        );
    }

    #[test]
    fn test_expression_subqueries() {
        assert_eq!(
            relations(
                "SELECT name, (SELECT COUNT(*) FROM orders) AS total FROM users \
                 WHERE id IN (SELECT user_id FROM sales) \
                 AND EXISTS (SELECT 1 FROM secrets WHERE secrets.id = users.id)"
            ),
            vec!["orders", "sales", "secrets", "users"]
        );
    }

    #[test]
    fn test_function_argument_subquery() {
        assert_eq!(
            relations("SELECT COALESCE((SELECT MAX(price) FROM products), 0)"),
            vec!["products"]
        );
    }

    #[test]
    fn test_set_operations() {
        assert_eq!(
            relations(
                "SELECT id FROM users UNION SELECT id FROM employees \
                 EXCEPT SELECT id FROM secrets"
            ),
            vec!["employees", "secrets", "users"]
        );
    }

    #[test]
    fn test_case_is_normalized_and_deduplicated() {
        assert_eq!(
            relations("SELECT * FROM Users JOIN USERS u2 ON 1 = 1 JOIN \"users\" u3 ON 1 = 1"),
            vec!["users"]
        );
    }

    #[test]
    fn test_quoted_whitespace_is_part_of_the_name() {
        assert_eq!(
            relations("SELECT * FROM \"users \" JOIN \" Users\" ON 1 = 1"),
            vec![" users", "users "]
        );
    }

    #[test]
    fn test_qualified_names_stay_qualified() {
        assert_eq!(relations("SELECT * FROM main.Users"), vec!["main.users"]);
    }

    #[test]
    fn test_cte_names_are_not_relations() {
        assert_eq!(
            relations(
                "WITH big AS (SELECT * FROM orders WHERE amount > 100) \
                 SELECT * FROM big JOIN customers ON big.customer_id = customers.customer_id"
            ),
            vec!["customers", "orders"]
        );
    }

    #[test]
    fn test_recursive_cte() {
        assert_eq!(
            relations(
                "WITH RECURSIVE chain(id, manager_id) AS ( \
                   SELECT id, manager_id FROM employees WHERE manager_id IS NULL \
                   UNION ALL \
                   SELECT e.id, e.manager_id FROM employees e \
                   JOIN chain ON e.manager_id = chain.id) \
                 SELECT * FROM chain"
            ),
            vec!["employees"]
        );
    }

    #[test]
    fn test_cte_shadowing_is_scoped() {
        // The outer `secrets` is the real table, not the CTE in the derived table.
        assert_eq!(
            relations(
                "SELECT * FROM (WITH secrets AS (SELECT 1 AS id) SELECT * FROM secrets) s, secrets"
            ),
            vec!["secrets"]
        );
        assert_eq!(
            relations("SELECT * FROM (WITH secrets AS (SELECT 1 AS id) SELECT * FROM secrets) s"),
            Vec::<String>::new()
        );
    }

    #[test]
    fn test_qualified_reference_is_never_a_cte() {
        assert_eq!(
            relations("WITH users AS (SELECT 1) SELECT * FROM main.users"),
            vec!["main.users"]
        );
    }

    #[test]
    fn test_table_body() {
        assert_eq!(relations_in(SqlDialect::Postgres, "TABLE secrets"), vec!["secrets"]);
    }

    #[test]
    fn test_insert_target_and_source() {
        assert_eq!(
            relations("INSERT INTO orders (id) SELECT id FROM customers"),
            vec!["customers", "orders"]
        );
    }

    #[test]
    fn test_no_relations() {
        assert!(relations("SELECT 1 + 1").is_empty());
    }

    #[test]
    fn test_deep_nesting_and_many_joins() {
        let mut sql = String::from("SELECT * FROM users");
        for depth in 0..12 {
            sql = format!("SELECT * FROM ({sql}) AS d{depth}");
        }
        for join in 0..30 {
            sql.push_str(&format!(" JOIN orders o{join} ON o{join}.id = d11.id"));
        }
        sql.push_str(" WHERE EXISTS (SELECT 1 FROM (SELECT * FROM (SELECT * FROM secrets) a) b)");
        assert_eq!(relations(&sql), vec!["orders", "secrets", "users"]);
    }

    #[test]
    fn test_unresolvable_name_fails_closed() {
        let reference = object_name(&serde_json::json!([{"Function": {"name": "x"}}]));
        assert!(reference.qualified);
        assert!(reference.name.as_str().contains("Function"));
    }
}
