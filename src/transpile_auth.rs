//! Authorization predicates.
//!
//! Filter rules narrow what a statement matches. Allow and bind rules become
//! guards that abort the statement with [`FORBIDDEN_MARKER`] when they fail.
//! Rules inside one group are alternatives, separate groups all have to pass.

use crate::auth::{AuthOperation, AuthPredicate, AuthRule, AuthRules, AuthValue};
use crate::entity::Node;
use crate::error::{GraphQLResult, FORBIDDEN_MARKER};
use crate::scope::Scope;
use crate::transpile::{and_join, or_join, TranslationContext};
use crate::transpile_filter::{comparison, negate, property_comparison, property_predicate, quantified_pattern, PatternBranch};

/// Aborts the statement unless `predicate` holds for every row
pub fn guard_predicate(predicate: &str) -> String {
    format!(
        "WITH *\nWHERE apoc.util.validatePredicate(NOT ({}), \"{}\", [0])",
        predicate, FORBIDDEN_MARKER
    )
}

/// Procedure form of [`guard_predicate`], used ahead of writes
pub fn guard_call(predicate: &str) -> String {
    format!(
        "WITH *\nCALL apoc.util.validate(NOT ({}), \"{}\", [0])",
        predicate, FORBIDDEN_MARKER
    )
}

fn compile_predicate(
    predicate: &AuthPredicate,
    var: &str,
    ctx: &TranslationContext,
    scope: &mut Scope,
) -> GraphQLResult<String> {
    Ok(match predicate {
        AuthPredicate::True => "true".to_string(),
        AuthPredicate::Authenticated => format!(
            "{} = true",
            scope.named("isAuthenticated", serde_json::json!(ctx.auth.is_authenticated()))
        ),
        AuthPredicate::And(items) | AuthPredicate::Or(items) => {
            let mut parts = vec![];
            for item in items {
                parts.push(compile_predicate(item, var, ctx, scope)?);
            }
            match predicate {
                AuthPredicate::And(_) => and_join(parts).unwrap_or_else(|| "true".to_string()),
                _ => or_join(parts).unwrap_or_else(|| "false".to_string()),
            }
        }
        AuthPredicate::Not(item) => negate(compile_predicate(item, var, ctx, scope)?, true),
        AuthPredicate::Property {
            field,
            op,
            negated,
            value,
        } => match value {
            AuthValue::Literal(value) => property_predicate(var, field, *op, *negated, value, scope),
            AuthValue::Claim(path) => {
                let param = scope.claim(path, ctx.auth.claim(path));
                let compared = negate(property_comparison(var, field, *op, &param), *negated);
                format!("({} IS NOT NULL AND {})", param, compared)
            }
        },
        AuthPredicate::Relationship {
            field,
            quantifier,
            branches,
        } => quantified_pattern(var, field, *quantifier, branches, scope, |(label, inner), node, _, scope| {
            Ok(PatternBranch {
                labels: vec![label.clone()],
                predicate: Some(compile_predicate(inner, node, ctx, scope)?),
            })
        })?,
        AuthPredicate::Claim {
            path,
            op,
            negated,
            value,
        } => {
            let param = scope.claim(path, ctx.auth.claim(path));
            let rhs = match value {
                AuthValue::Literal(x) => scope.clause_for(x.clone()),
                AuthValue::Claim(other) => scope.claim(other, ctx.auth.claim(other)),
            };
            let compared = negate(comparison(&param, *op, &rhs), *negated);
            format!("({} IS NOT NULL AND {})", param, compared)
        }
    })
}

fn roles_predicate(rule: &AuthRule, ctx: &TranslationContext, scope: &mut Scope) -> String {
    let required = scope.clause_for(serde_json::json!(rule.roles));
    let roles = scope.named("jwtRoles", ctx.auth.roles());
    format!("any(role IN {} WHERE role IN {})", required, roles)
}

fn groups_predicate<F>(
    groups: &[&AuthRules],
    op: AuthOperation,
    var: &str,
    ctx: &TranslationContext,
    scope: &mut Scope,
    rule_predicate: F,
) -> GraphQLResult<Option<String>>
where
    F: Fn(&AuthRule) -> Option<&AuthPredicate>,
{
    let mut conjuncts = vec![];
    for group in groups {
        let mut alternatives = vec![];
        for rule in group.for_operation(op) {
            let predicate = match rule_predicate(rule) {
                Some(x) => x,
                None => continue,
            };
            alternatives.push(compile_predicate(predicate, var, ctx, scope)?);
        }
        conjuncts.extend(or_join(alternatives));
    }
    Ok(and_join(conjuncts))
}

/// Rows the caller is permitted to see
pub fn auth_filter(
    groups: &[AuthRules],
    op: AuthOperation,
    var: &str,
    ctx: &TranslationContext,
    scope: &mut Scope,
) -> GraphQLResult<Option<String>> {
    let groups: Vec<&AuthRules> = groups.iter().collect();
    groups_predicate(&groups, op, var, ctx, scope, |rule| rule.filter.as_ref())
}

fn allow_predicate(
    groups: &[&AuthRules],
    op: AuthOperation,
    var: &str,
    ctx: &TranslationContext,
    scope: &mut Scope,
) -> GraphQLResult<Option<String>> {
    let mut conjuncts = vec![];
    for group in groups {
        let mut alternatives = vec![];
        for rule in group.for_operation(op).filter(|x| x.has_allow()) {
            let mut parts = vec![];
            if rule.is_authenticated {
                parts.push(compile_predicate(&AuthPredicate::Authenticated, var, ctx, scope)?);
            }
            if !rule.roles.is_empty() {
                parts.push(roles_predicate(rule, ctx, scope));
            }
            if let Some(allow) = &rule.allow {
                parts.push(compile_predicate(allow, var, ctx, scope)?);
            }
            alternatives.push(and_join(parts).unwrap_or_else(|| "true".to_string()));
        }
        conjuncts.extend(or_join(alternatives));
    }
    Ok(and_join(conjuncts))
}

fn node_groups<'n>(node: &'n Node, fields: &[&str]) -> Vec<&'n AuthRules> {
    let mut groups: Vec<&AuthRules> = node.auth.iter().collect();
    for field in fields {
        groups.extend(node.field_auth(field));
    }
    groups
}

/// Type level and field level allow rules for the fields an operation touches
pub fn node_allow(
    node: &Node,
    fields: &[&str],
    op: AuthOperation,
    var: &str,
    ctx: &TranslationContext,
    scope: &mut Scope,
) -> GraphQLResult<Option<String>> {
    allow_predicate(&node_groups(node, fields), op, var, ctx, scope)
}

/// Bind rules, checked after the write against the resulting state
pub fn node_bind(
    node: &Node,
    fields: &[&str],
    op: AuthOperation,
    var: &str,
    ctx: &TranslationContext,
    scope: &mut Scope,
) -> GraphQLResult<Option<String>> {
    groups_predicate(&node_groups(node, fields), op, var, ctx, scope, |rule| rule.bind.as_ref())
}

#[cfg(test)]
mod tests {
    use crate::context::Config;
    use crate::GraphQLSchema;
    use serde_json::json;

    const TYPE_DEFS: &str = r#"
        type User {
            id: ID!
            name: String!
            posts: [Post!]! @relationship(type: "HAS_POST", direction: OUT)
        }
        type Post @auth(rules: [
            { operations: [READ], where: { author: { id: "$jwt.sub" } } }
            { operations: [READ], allow: { author: { id: "$jwt.sub" } } }
            { operations: [CREATE], bind: { author: { id: "$jwt.sub" } } }
            { operations: [DELETE], roles: ["admin"] }
        ]) {
            title: String!
            secret: String @auth(rules: [{ operations: [READ], isAuthenticated: true }])
            author: User! @relationship(type: "HAS_POST", direction: IN)
        }
    "#;

    fn translate(query: &str, claims: Option<serde_json::Value>) -> crate::resolve::RootTranslation {
        let schema = GraphQLSchema::new(TYPE_DEFS, Config::default()).unwrap();
        schema.translate(query, None, None, claims).unwrap().remove(0)
    }

    #[test]
    fn unprotected_types_carry_no_guards() {
        let translation = translate("{ users { name } }", None);
        assert!(!translation.cypher.contains("apoc.util"));
        assert!(translation.params.is_empty());
    }

    #[test]
    fn filters_and_allow_rules_share_one_claim_parameter() {
        let translation = translate("{ posts { title } }", Some(json!({"sub": "user-1"})));
        let cypher = &translation.cypher;
        assert!(cypher.contains(
            "WHERE EXISTS { MATCH (this)<-[edge1:HAS_POST]-(this0) WHERE (this0:User) AND (($param0 IS NOT NULL AND this0.id = $param0)) }"
        ));
        assert!(cypher.contains("WHERE apoc.util.validatePredicate(NOT (EXISTS { MATCH (this)<-[edge3:HAS_POST]-(this2)"));
        assert!(cypher.contains("\"@neo4j/graphql/FORBIDDEN\", [0])"));
        assert_eq!(translation.params["param0"], json!("user-1"));
        assert_eq!(translation.params.len(), 1);
    }

    #[test]
    fn missing_claims_bind_null() {
        let translation = translate("{ posts { title } }", None);
        assert_eq!(translation.params["param0"], json!(null));
    }

    #[test]
    fn field_rules_apply_only_when_selected() {
        let without = translate("{ posts { title } }", None);
        assert!(!without.params.contains_key("isAuthenticated"));
        let with = translate("{ posts { title secret } }", None);
        assert_eq!(with.params["isAuthenticated"], json!(false));
        assert!(with.cypher.contains("$isAuthenticated = true"));
    }

    #[test]
    fn nested_create_checks_bind_rules_after_connecting_to_the_parent() {
        let translation = translate(
            r#"mutation { createUsers(input: [{id: "u1", name: "Ann", posts: {create: [{node: {title: "x"}}]}}]) { users { name } } }"#,
            Some(json!({"sub": "u1"})),
        );
        let cypher = &translation.cypher;
        let edge = cypher.find("CREATE (this0)-[edge2:HAS_POST]->(this1)").unwrap();
        let bind = cypher.find("CALL apoc.util.validate(NOT (EXISTS { MATCH (this1)<-[").unwrap();
        let cardinality = cypher.find("Post.author required exactly once").unwrap();
        assert!(edge < bind);
        assert!(edge < cardinality);
        assert!(cypher.contains("\"@neo4j/graphql/FORBIDDEN\", [0])"));
    }

    #[test]
    fn roles_are_checked_against_the_claims() {
        let translation = translate(
            "mutation { deletePosts { nodesDeleted } }",
            Some(json!({"sub": "user-1", "roles": ["editor"]})),
        );
        assert!(translation.cypher.contains("CALL apoc.util.validate(NOT (any(role IN $param"));
        assert_eq!(translation.params["jwtRoles"], json!(["editor"]));
    }
}
