//! MongoDB-style tag query objects (spec §4.5): `{"tag": "prod"}`,
//! `{"$or": [...]}`, `{"$and": [...]}`, `{"$advanced": "prod AND NOT beta"}`.
//!
//! This is the JSON-native sibling of [`super::dsl`] — HTTP clients that
//! would rather POST a structured query than URL-encode a DSL string use
//! this; `$advanced` is the escape hatch back into the DSL for expressions
//! the structured form can't express concisely.

use super::dsl::{self, TagExpr};
use crate::error::{ProxyError, ProxyResult};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterQuery {
    /// A bare tag requirement: `{"prod": true}` requires it, `{"beta": false}` excludes it.
    Tag { name: String, required: bool },
    And(Vec<FilterQuery>),
    Or(Vec<FilterQuery>),
    Not(Box<FilterQuery>),
    Advanced(TagExpr),
}

impl FilterQuery {
    pub fn matches(&self, tags: &HashSet<String>) -> bool {
        match self {
            FilterQuery::Tag { name, required } => tags.contains(name) == *required,
            FilterQuery::And(parts) => parts.iter().all(|p| p.matches(tags)),
            FilterQuery::Or(parts) => parts.iter().any(|p| p.matches(tags)),
            FilterQuery::Not(inner) => !inner.matches(tags),
            FilterQuery::Advanced(expr) => expr.matches(tags),
        }
    }
}

/// Parse a JSON query document into a [`FilterQuery`] tree.
pub fn parse_query(value: &serde_json::Value) -> ProxyResult<FilterQuery> {
    let obj = value
        .as_object()
        .ok_or_else(|| ProxyError::InvalidFilter("tag query must be a JSON object".to_string()))?;

    if obj.is_empty() {
        return Err(ProxyError::InvalidFilter("tag query must not be empty".to_string()));
    }

    // A query object may mix `$and`/`$or`/`$not`/`$advanced` operators with
    // bare tag keys; when more than one key is present, the whole object is
    // an implicit AND, matching the teacher pack's Mongo-query conventions.
    let mut clauses = Vec::new();

    for (key, val) in obj {
        let clause = match key.as_str() {
            "$and" => {
                let items = val
                    .as_array()
                    .ok_or_else(|| ProxyError::InvalidFilter("$and requires an array".to_string()))?;
                FilterQuery::And(items.iter().map(parse_query).collect::<ProxyResult<_>>()?)
            }
            "$or" => {
                let items = val
                    .as_array()
                    .ok_or_else(|| ProxyError::InvalidFilter("$or requires an array".to_string()))?;
                FilterQuery::Or(items.iter().map(parse_query).collect::<ProxyResult<_>>()?)
            }
            "$not" => FilterQuery::Not(Box::new(parse_query(val)?)),
            "$advanced" => {
                let expr_str = val
                    .as_str()
                    .ok_or_else(|| ProxyError::InvalidFilter("$advanced requires a string".to_string()))?;
                FilterQuery::Advanced(dsl::parse(expr_str).map_err(|e| ProxyError::InvalidFilter(e.to_string()))?)
            }
            tag_name => match val {
                serde_json::Value::Bool(b) => FilterQuery::Tag { name: tag_name.to_lowercase(), required: *b },
                serde_json::Value::String(s) => {
                    // `{"environment": "prod"}` is sugar for requiring the
                    // composite tag "environment:prod".
                    FilterQuery::Tag {
                        name: format!("{}:{}", tag_name.to_lowercase(), s.to_lowercase()),
                        required: true,
                    }
                }
                _ => {
                    return Err(ProxyError::InvalidFilter(format!(
                        "tag query value for '{}' must be a bool or string",
                        tag_name
                    )))
                }
            },
        };
        clauses.push(clause);
    }

    Ok(if clauses.len() == 1 { clauses.remove(0) } else { FilterQuery::And(clauses) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tags(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_tag_true_requires_presence() {
        let q = parse_query(&json!({"prod": true})).unwrap();
        assert!(q.matches(&tags(&["prod"])));
        assert!(!q.matches(&tags(&["staging"])));
    }

    #[test]
    fn bare_tag_false_requires_absence() {
        let q = parse_query(&json!({"beta": false})).unwrap();
        assert!(q.matches(&tags(&["prod"])));
        assert!(!q.matches(&tags(&["beta"])));
    }

    #[test]
    fn or_and_and_combinators() {
        let q = parse_query(&json!({"$or": [{"prod": true}, {"staging": true}]})).unwrap();
        assert!(q.matches(&tags(&["staging"])));
        assert!(!q.matches(&tags(&["dev"])));

        let q = parse_query(&json!({"$and": [{"prod": true}, {"beta": false}]})).unwrap();
        assert!(q.matches(&tags(&["prod"])));
        assert!(!q.matches(&tags(&["prod", "beta"])));
    }

    #[test]
    fn advanced_falls_back_to_dsl() {
        let q = parse_query(&json!({"$advanced": "prod AND NOT beta"})).unwrap();
        assert!(q.matches(&tags(&["prod"])));
        assert!(!q.matches(&tags(&["prod", "beta"])));
    }

    #[test]
    fn rejects_non_object_query() {
        assert!(parse_query(&json!("prod")).is_err());
        assert!(parse_query(&json!({})).is_err());
    }

    #[test]
    fn key_value_tag_sugar_builds_composite_tag() {
        let q = parse_query(&json!({"environment": "prod"})).unwrap();
        assert!(q.matches(&tags(&["environment:prod"])));
        assert!(!q.matches(&tags(&["environment:staging"])));
    }
}
