//! Authorization rule model.
//!
//! `@auth(rules)` and `@authorization(filter, validate)` arguments are resolved
//! into [`AuthRule`]s while the entity model is built. Field names inside rule
//! predicates are checked at that point, so translation never sees an unknown
//! field.

use crate::directives::RawAuth;
use crate::entity::{PrimitiveField, RelationField};
use crate::error::{GraphQLError, GraphQLResult};
use crate::filter::{FilterOp, Quantifier};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuthOperation {
    Read,
    Create,
    Update,
    Delete,
    Connect,
    Disconnect,
}

impl AuthOperation {
    pub fn all() -> BTreeSet<Self> {
        [
            Self::Read,
            Self::Create,
            Self::Update,
            Self::Delete,
            Self::Connect,
            Self::Disconnect,
        ]
        .into_iter()
        .collect()
    }

    /// Names accepted by `@auth(rules: [{operations}])`
    fn from_rule_name(name: &str) -> Option<Self> {
        Some(match name {
            "READ" => Self::Read,
            "CREATE" => Self::Create,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "CONNECT" => Self::Connect,
            "DISCONNECT" => Self::Disconnect,
            _ => return None,
        })
    }

    /// Names accepted by `@authorization`. `SUBSCRIBE` has no statement to guard
    /// and maps to nothing.
    fn from_authorization_name(name: &str) -> GraphQLResult<Option<Self>> {
        Ok(Some(match name {
            "READ" | "AGGREGATE" => Self::Read,
            "CREATE" => Self::Create,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "CREATE_RELATIONSHIP" => Self::Connect,
            "DELETE_RELATIONSHIP" => Self::Disconnect,
            "SUBSCRIBE" => return Ok(None),
            other => {
                return Err(GraphQLError::schema_validation(format!(
                    "Unknown authorization operation \"{}\"",
                    other
                )))
            }
        }))
    }
}

/// Right hand side of a rule comparison
#[derive(Clone, Debug, PartialEq)]
pub enum AuthValue {
    Literal(serde_json::Value),
    /// `$jwt.<path>`, bound as a parameter at translation time
    Claim(String),
}

impl AuthValue {
    fn parse(value: &serde_json::Value) -> Self {
        match value.as_str().and_then(|x| x.strip_prefix("$jwt.")) {
            Some(path) => Self::Claim(path.to_string()),
            None => Self::Literal(value.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AuthPredicate {
    /// `allow: "*"`
    True,
    /// The request carries claims
    Authenticated,
    And(Vec<AuthPredicate>),
    Or(Vec<AuthPredicate>),
    Not(Box<AuthPredicate>),
    Property {
        field: Arc<PrimitiveField>,
        op: FilterOp,
        negated: bool,
        value: AuthValue,
    },
    Relationship {
        field: Arc<RelationField>,
        quantifier: Quantifier,
        /// One predicate per concrete target type, keyed by label
        branches: Vec<(String, AuthPredicate)>,
    },
    /// Comparison evaluated purely against the claims
    Claim {
        path: String,
        op: FilterOp,
        negated: bool,
        value: AuthValue,
    },
}

impl AuthPredicate {
    fn and(mut items: Vec<AuthPredicate>) -> Self {
        match items.len() {
            1 => items.remove(0),
            _ => Self::And(items),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AuthRule {
    pub operations: BTreeSet<AuthOperation>,
    pub is_authenticated: bool,
    pub roles: Vec<String>,
    /// Checked against the current state: pre-guards on writes, validated on reads
    pub allow: Option<AuthPredicate>,
    /// Checked against the resulting state after a write
    pub bind: Option<AuthPredicate>,
    /// Narrows the matched nodes instead of failing the statement
    pub filter: Option<AuthPredicate>,
}

impl AuthRule {
    fn empty(operations: BTreeSet<AuthOperation>) -> Self {
        Self {
            operations,
            is_authenticated: false,
            roles: vec![],
            allow: None,
            bind: None,
            filter: None,
        }
    }

    pub fn applies_to(&self, op: AuthOperation) -> bool {
        self.operations.contains(&op)
    }

    /// Whether the rule contributes to the guard checked before the operation
    pub fn has_allow(&self) -> bool {
        self.is_authenticated || !self.roles.is_empty() || self.allow.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthSource {
    Type(String),
    Interface(String),
    Field { type_name: String, field: String },
}

/// The rules declared by one directive site. Rules in a group combine with OR,
/// groups combine with AND.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthRules {
    pub source: AuthSource,
    pub rules: Vec<AuthRule>,
}

impl AuthRules {
    pub fn for_operation(&self, op: AuthOperation) -> impl Iterator<Item = &AuthRule> {
        self.rules.iter().filter(move |r| r.applies_to(op))
    }
}

/// Field resolution used while rules are parsed; implemented by the entity
/// model builder over its partially built tables
pub trait AuthFieldLookup {
    fn primitive(&self, type_name: &str, field: &str) -> Option<Arc<PrimitiveField>>;
    fn relation(&self, type_name: &str, field: &str) -> Option<Arc<RelationField>>;
    /// Concrete node names a relationship target resolves to
    fn concrete_targets(&self, relation: &RelationField) -> Vec<String>;
}

const RELATION_SUFFIXES: &[(&str, Quantifier)] = &[
    ("_SOME", Quantifier::Some),
    ("_ALL", Quantifier::All),
    ("_NONE", Quantifier::None),
    ("_SINGLE", Quantifier::Single),
];

/// Splits a comparison key such as `id_NOT_IN` into the field name, operator
/// and negation. Keys without a recognised suffix are equality comparisons.
pub fn split_comparison_key(key: &str) -> (&str, FilterOp, bool) {
    for (suffix, op, negated) in FilterOp::SUFFIXES {
        if let Some(field) = key.strip_suffix(suffix) {
            if !field.is_empty() {
                return (field, *op, *negated);
            }
        }
    }
    (key, FilterOp::Equal, false)
}

fn as_object<'a>(
    value: &'a serde_json::Value,
    context: &str,
) -> GraphQLResult<&'a serde_json::Map<String, serde_json::Value>> {
    value
        .as_object()
        .ok_or_else(|| GraphQLError::schema_validation(format!("{} must be an object", context)))
}

fn as_list(value: &serde_json::Value) -> Vec<&serde_json::Value> {
    match value {
        serde_json::Value::Array(x) => x.iter().collect(),
        serde_json::Value::Null => vec![],
        other => vec![other],
    }
}

/// Parses a node predicate, e.g. `{ id: "$jwt.sub", creator: { name: "x" } }`
fn parse_node_predicate(
    type_name: &str,
    value: &serde_json::Value,
    lookup: &dyn AuthFieldLookup,
) -> GraphQLResult<AuthPredicate> {
    let obj = as_object(value, "Authorization predicate")?;
    let mut items = vec![];

    for (key, v) in obj {
        match key.as_str() {
            "AND" | "OR" => {
                let inner = as_list(v)
                    .into_iter()
                    .map(|x| parse_node_predicate(type_name, x, lookup))
                    .collect::<GraphQLResult<Vec<_>>>()?;
                items.push(match key.as_str() {
                    "AND" => AuthPredicate::And(inner),
                    _ => AuthPredicate::Or(inner),
                });
            }
            "NOT" => items.push(AuthPredicate::Not(Box::new(parse_node_predicate(
                type_name, v, lookup,
            )?))),
            _ => items.push(parse_field_predicate(type_name, key, v, lookup)?),
        }
    }
    Ok(AuthPredicate::and(items))
}

fn parse_field_predicate(
    type_name: &str,
    key: &str,
    value: &serde_json::Value,
    lookup: &dyn AuthFieldLookup,
) -> GraphQLResult<AuthPredicate> {
    let (rel_name, quantifier) = RELATION_SUFFIXES
        .iter()
        .find_map(|(suffix, q)| key.strip_suffix(suffix).map(|name| (name, *q)))
        .unwrap_or((key, Quantifier::Some));

    if let Some(field) = lookup.relation(type_name, rel_name) {
        let targets = lookup.concrete_targets(&field);
        let obj = as_object(value, "Relationship predicate")?;
        let mut branches = vec![];
        for target in &targets {
            // union predicates are keyed by member, other targets share one predicate
            let inner = match obj.get(target.as_str()) {
                Some(member) if field.target.is_union() => member,
                None if field.target.is_union() => continue,
                _ => value,
            };
            branches.push((target.clone(), parse_node_predicate(target, inner, lookup)?));
        }
        return Ok(AuthPredicate::Relationship {
            field,
            quantifier,
            branches,
        });
    }

    let (field_name, op, negated) = split_comparison_key(key);
    match lookup.primitive(type_name, field_name) {
        Some(field) => Ok(AuthPredicate::Property {
            field,
            op,
            negated,
            value: AuthValue::parse(value),
        }),
        None => Err(GraphQLError::schema_validation(format!(
            "Authorization rule on type \"{}\" references unknown field \"{}\"",
            type_name, key
        ))),
    }
}

fn parse_claim_predicate(value: &serde_json::Value) -> GraphQLResult<AuthPredicate> {
    let obj = as_object(value, "Claims predicate")?;
    let mut items = vec![];
    for (key, v) in obj {
        match key.as_str() {
            "AND" | "OR" => {
                let inner = as_list(v)
                    .into_iter()
                    .map(parse_claim_predicate)
                    .collect::<GraphQLResult<Vec<_>>>()?;
                items.push(match key.as_str() {
                    "AND" => AuthPredicate::And(inner),
                    _ => AuthPredicate::Or(inner),
                });
            }
            "NOT" => items.push(AuthPredicate::Not(Box::new(parse_claim_predicate(v)?))),
            _ => {
                let (path, op, negated) = split_comparison_key(key);
                items.push(AuthPredicate::Claim {
                    path: path.to_string(),
                    op,
                    negated,
                    value: AuthValue::parse(v),
                });
            }
        }
    }
    Ok(AuthPredicate::and(items))
}

/// `@authorization` where clauses: `{ node, jwt, AND, OR, NOT }`
fn parse_authorization_where(
    type_name: &str,
    value: &serde_json::Value,
    lookup: &dyn AuthFieldLookup,
) -> GraphQLResult<AuthPredicate> {
    let obj = as_object(value, "Authorization where")?;
    let mut items = vec![];
    for (key, v) in obj {
        match key.as_str() {
            "node" => items.push(parse_node_predicate(type_name, v, lookup)?),
            "jwt" => items.push(parse_claim_predicate(v)?),
            "AND" | "OR" => {
                let inner = as_list(v)
                    .into_iter()
                    .map(|x| parse_authorization_where(type_name, x, lookup))
                    .collect::<GraphQLResult<Vec<_>>>()?;
                items.push(match key.as_str() {
                    "AND" => AuthPredicate::And(inner),
                    _ => AuthPredicate::Or(inner),
                });
            }
            "NOT" => items.push(AuthPredicate::Not(Box::new(parse_authorization_where(
                type_name, v, lookup,
            )?))),
            other => {
                return Err(GraphQLError::schema_validation(format!(
                    "Unknown key \"{}\" in authorization where",
                    other
                )))
            }
        }
    }
    Ok(AuthPredicate::and(items))
}

fn parse_operations<F>(
    value: Option<&serde_json::Value>,
    default: BTreeSet<AuthOperation>,
    mut parse: F,
) -> GraphQLResult<BTreeSet<AuthOperation>>
where
    F: FnMut(&str) -> GraphQLResult<Option<AuthOperation>>,
{
    let value = match value {
        None | Some(serde_json::Value::Null) => return Ok(default),
        Some(x) => x,
    };
    let mut ops = BTreeSet::new();
    for item in as_list(value) {
        let name = item
            .as_str()
            .ok_or_else(|| GraphQLError::schema_validation("Operations must be enum values"))?;
        if let Some(op) = parse(name)? {
            ops.insert(op);
        }
    }
    Ok(ops)
}

fn parse_auth_rule(
    type_name: &str,
    value: &serde_json::Value,
    lookup: &dyn AuthFieldLookup,
) -> GraphQLResult<AuthRule> {
    let obj = as_object(value, "Auth rule")?;
    let operations = parse_operations(obj.get("operations"), AuthOperation::all(), |x| {
        AuthOperation::from_rule_name(x)
            .map(Some)
            .ok_or_else(|| GraphQLError::schema_validation(format!("Unknown auth operation \"{}\"", x)))
    })?;
    let mut rule = AuthRule::empty(operations);

    for (key, v) in obj {
        match key.as_str() {
            "operations" => (),
            "isAuthenticated" => rule.is_authenticated = v.as_bool().unwrap_or(false),
            "roles" => {
                rule.roles = as_list(v)
                    .into_iter()
                    .filter_map(|x| x.as_str().map(str::to_string))
                    .collect()
            }
            "allow" => {
                rule.allow = Some(match v.as_str() {
                    Some("*") => AuthPredicate::True,
                    _ => parse_node_predicate(type_name, v, lookup)?,
                })
            }
            "bind" => rule.bind = Some(parse_node_predicate(type_name, v, lookup)?),
            "where" => rule.filter = Some(parse_node_predicate(type_name, v, lookup)?),
            other => {
                return Err(GraphQLError::schema_validation(format!(
                    "Unsupported key \"{}\" in @auth rule on type \"{}\"",
                    other, type_name
                )))
            }
        }
    }
    Ok(rule)
}

fn default_filter_operations() -> BTreeSet<AuthOperation> {
    AuthOperation::all()
        .into_iter()
        .filter(|x| *x != AuthOperation::Create)
        .collect()
}

fn parse_authorization_rule(
    type_name: &str,
    value: &serde_json::Value,
    is_validate: bool,
    lookup: &dyn AuthFieldLookup,
) -> GraphQLResult<Vec<AuthRule>> {
    let obj = as_object(value, "Authorization rule")?;
    let default_ops = match is_validate {
        true => AuthOperation::all(),
        false => default_filter_operations(),
    };
    let operations = parse_operations(obj.get("operations"), default_ops, AuthOperation::from_authorization_name)?;
    let require_authentication = obj
        .get("requireAuthentication")
        .and_then(|x| x.as_bool())
        .unwrap_or(true);

    let predicate = match obj.get("where") {
        Some(w) => parse_authorization_where(type_name, w, lookup)?,
        None => AuthPredicate::True,
    };

    for key in obj.keys() {
        if !["operations", "requireAuthentication", "where", "when"].contains(&key.as_str()) {
            return Err(GraphQLError::schema_validation(format!(
                "Unsupported key \"{}\" in @authorization rule on type \"{}\"",
                key, type_name
            )));
        }
    }

    let mut rules = vec![];
    if !is_validate {
        let mut rule = AuthRule::empty(operations);
        rule.filter = Some(match require_authentication {
            true => AuthPredicate::And(vec![AuthPredicate::Authenticated, predicate]),
            false => predicate,
        });
        rules.push(rule);
        return Ok(rules);
    }

    let when: Vec<String> = match obj.get("when") {
        None => vec!["BEFORE".to_string(), "AFTER".to_string()],
        Some(w) => as_list(w)
            .into_iter()
            .filter_map(|x| x.as_str().map(str::to_string))
            .collect(),
    };
    for phase in when {
        let mut rule = AuthRule::empty(operations.clone());
        rule.is_authenticated = require_authentication;
        match phase.as_str() {
            "BEFORE" => rule.allow = Some(predicate.clone()),
            "AFTER" => rule.bind = Some(predicate.clone()),
            other => {
                return Err(GraphQLError::schema_validation(format!(
                    "Unknown validation phase \"{}\"",
                    other
                )))
            }
        }
        rules.push(rule);
    }
    Ok(rules)
}

/// Resolves the raw directive arguments declared on `type_name`
pub fn parse_auth(
    raw: &RawAuth,
    type_name: &str,
    lookup: &dyn AuthFieldLookup,
) -> GraphQLResult<Vec<AuthRule>> {
    let mut rules = vec![];
    for rule in &raw.rules {
        rules.push(parse_auth_rule(type_name, rule, lookup)?);
    }
    for rule in &raw.filter {
        rules.extend(parse_authorization_rule(type_name, rule, false, lookup)?);
    }
    for rule in &raw.validate {
        rules.extend(parse_authorization_rule(type_name, rule, true, lookup)?);
    }
    Ok(rules)
}

/// Claims of the current request
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AuthContext {
    pub claims: Option<serde_json::Value>,
    pub roles_path: String,
}

impl AuthContext {
    pub fn new(claims: Option<serde_json::Value>, roles_path: &str) -> Self {
        Self {
            claims: claims.filter(|x| !x.is_null()),
            roles_path: roles_path.to_string(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.claims.is_some()
    }

    /// Looks up a dotted claim path. `\.` escapes a literal dot, so
    /// `https://example\.com/roles` names a single key.
    pub fn claim(&self, path: &str) -> serde_json::Value {
        let mut current = match &self.claims {
            Some(x) => x,
            None => return serde_json::Value::Null,
        };
        for segment in split_claim_path(path) {
            match current.get(segment.as_str()) {
                Some(x) => current = x,
                None => return serde_json::Value::Null,
            }
        }
        current.clone()
    }

    pub fn roles(&self) -> serde_json::Value {
        match self.claim(&self.roles_path) {
            serde_json::Value::Null => serde_json::json!([]),
            serde_json::Value::String(x) => serde_json::json!([x]),
            other => other,
        }
    }
}

fn split_claim_path(path: &str) -> Vec<String> {
    let mut segments = vec![String::new()];
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                chars.next();
                if let Some(last) = segments.last_mut() {
                    last.push('.');
                }
            }
            '.' => segments.push(String::new()),
            _ => {
                if let Some(last) = segments.last_mut() {
                    last.push(c);
                }
            }
        }
    }
    segments.into_iter().filter(|x| !x.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn claim_paths_support_escaped_dots() {
        let ctx = AuthContext::new(
            Some(json!({"sub": "u1", "https://example.com/roles": ["admin"], "org": {"id": 7}})),
            "https://example\\.com/roles",
        );
        assert!(ctx.is_authenticated());
        assert_eq!(ctx.claim("sub"), json!("u1"));
        assert_eq!(ctx.claim("org.id"), json!(7));
        assert_eq!(ctx.claim("missing.path"), json!(null));
        assert_eq!(ctx.roles(), json!(["admin"]));
    }

    #[test]
    fn unauthenticated_context_has_no_roles() {
        let ctx = AuthContext::new(None, "roles");
        assert!(!ctx.is_authenticated());
        assert_eq!(ctx.roles(), json!([]));
    }

    #[test]
    fn comparison_keys_split_on_known_suffixes() {
        assert_eq!(split_comparison_key("id"), ("id", FilterOp::Equal, false));
        assert_eq!(split_comparison_key("id_NOT"), ("id", FilterOp::Equal, true));
        assert_eq!(split_comparison_key("id_NOT_IN"), ("id", FilterOp::In, true));
        assert_eq!(split_comparison_key("roles_INCLUDES"), ("roles", FilterOp::Includes, false));
        assert_eq!(split_comparison_key("age_GTE"), ("age", FilterOp::GreaterThanEqualTo, false));
    }

    #[test]
    fn jwt_placeholders_become_claims() {
        assert_eq!(AuthValue::parse(&json!("$jwt.sub")), AuthValue::Claim("sub".to_string()));
        assert_eq!(AuthValue::parse(&json!("sub")), AuthValue::Literal(json!("sub")));
    }
}
