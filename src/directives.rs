//! Typed views over the directives recognised on type definitions.
//!
//! Everything here runs once at schema construction; the entity model only ever
//! sees the typed structs, never directive names.

use crate::constants::directives as names;
use crate::error::{GraphQLError, GraphQLResult};
use graphql_parser::schema::{Directive, Value};
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelationshipDirection {
    In,
    Out,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryDirection {
    DefaultDirected,
    DefaultUndirected,
    DirectedOnly,
    UndirectedOnly,
}

impl QueryDirection {
    /// Default of the `directed` argument, `None` when the argument is not exposed
    pub fn directed_argument_default(&self) -> Option<bool> {
        match self {
            Self::DefaultDirected => Some(true),
            Self::DefaultUndirected => Some(false),
            Self::DirectedOnly | Self::UndirectedOnly => None,
        }
    }

    pub fn is_directed(&self, requested: Option<bool>) -> bool {
        match self {
            Self::DirectedOnly => true,
            Self::UndirectedOnly => false,
            Self::DefaultDirected => requested.unwrap_or(true),
            Self::DefaultUndirected => requested.unwrap_or(false),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NestedOperation {
    Create,
    Update,
    Delete,
    Connect,
    Disconnect,
    ConnectOrCreate,
}

impl NestedOperation {
    pub fn all() -> BTreeSet<NestedOperation> {
        [
            Self::Create,
            Self::Update,
            Self::Delete,
            Self::Connect,
            Self::Disconnect,
            Self::ConnectOrCreate,
        ]
        .into_iter()
        .collect()
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "CREATE" => Self::Create,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "CONNECT" => Self::Connect,
            "DISCONNECT" => Self::Disconnect,
            "CONNECT_OR_CREATE" => Self::ConnectOrCreate,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WriteOperation {
    Create,
    Update,
}

impl WriteOperation {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "CREATE" => Some(Self::Create),
            "UPDATE" => Some(Self::Update),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MutationOperation {
    Create,
    Update,
    Delete,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RelationshipDirective {
    pub rel_type: String,
    pub direction: RelationshipDirection,
    pub properties: Option<String>,
    pub query_direction: QueryDirection,
    pub nested_operations: BTreeSet<NestedOperation>,
    pub aggregate: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CypherDirective {
    pub statement: String,
    pub column_name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PopulatedByDirective {
    pub callback: String,
    pub operations: BTreeSet<WriteOperation>,
}

/// Raw authorization arguments, resolved against the entity model once every
/// type is known
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawAuth {
    /// `@auth(rules: [...])`
    pub rules: Vec<serde_json::Value>,
    /// `@authorization(filter: [...])`
    pub filter: Vec<serde_json::Value>,
    /// `@authorization(validate: [...])`
    pub validate: Vec<serde_json::Value>,
}

impl RawAuth {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.filter.is_empty() && self.validate.is_empty()
    }

    pub fn uses_authorization(&self) -> bool {
        !self.filter.is_empty() || !self.validate.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldDirectives {
    pub relationship: Option<RelationshipDirective>,
    pub declare_relationship: bool,
    pub alias: Option<String>,
    pub unique: bool,
    pub id: Option<bool>,
    pub timestamp: Option<BTreeSet<WriteOperation>>,
    pub default: Option<serde_json::Value>,
    pub cypher: Option<CypherDirective>,
    pub populated_by: Option<PopulatedByDirective>,
    pub auth: Option<RawAuth>,
    /// User directives, re-exposed verbatim on the generated object type
    pub other: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypeDirectives {
    pub relationship_properties: bool,
    pub auth: Option<RawAuth>,
    pub mutation: Option<BTreeSet<MutationOperation>>,
    pub plural: Option<String>,
    pub other: Vec<String>,
}

pub fn value_to_json(value: &Value<'_, String>) -> serde_json::Value {
    use serde_json::Value as JsonValue;
    match value {
        Value::Variable(x) => JsonValue::String(format!("${x}")),
        Value::Int(x) => x.as_i64().map(JsonValue::from).unwrap_or(JsonValue::Null),
        Value::Float(x) => serde_json::json!(x),
        Value::String(x) => JsonValue::String(x.clone()),
        Value::Boolean(x) => JsonValue::Bool(*x),
        Value::Null => JsonValue::Null,
        Value::Enum(x) => JsonValue::String(x.clone()),
        Value::List(x) => JsonValue::Array(x.iter().map(value_to_json).collect()),
        Value::Object(x) => JsonValue::Object(
            x.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}

/// Renders a GraphQL literal the way it reads in SDL
pub fn format_value(value: &Value<'_, String>) -> String {
    match value {
        Value::Variable(x) => format!("${x}"),
        Value::Int(x) => x.as_i64().map(|x| x.to_string()).unwrap_or_default(),
        Value::Float(x) => x.to_string(),
        Value::String(x) => format!("{:?}", x),
        Value::Boolean(x) => x.to_string(),
        Value::Null => "null".to_string(),
        Value::Enum(x) => x.clone(),
        Value::List(x) => format!("[{}]", x.iter().map(format_value).collect::<Vec<_>>().join(", ")),
        Value::Object(x) => format!(
            "{{{}}}",
            x.iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

pub fn format_directive(directive: &Directive<'_, String>) -> String {
    if directive.arguments.is_empty() {
        return format!("@{}", directive.name);
    }
    let args = directive
        .arguments
        .iter()
        .map(|(k, v)| format!("{}: {}", k, format_value(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("@{}({})", directive.name, args)
}

fn restrict_arguments(directive: &Directive<'_, String>, allowed: &[&str]) -> GraphQLResult<()> {
    let extra: Vec<&str> = directive
        .arguments
        .iter()
        .map(|(k, _)| k.as_str())
        .filter(|k| !allowed.contains(k))
        .collect();
    match extra.is_empty() {
        true => Ok(()),
        false => Err(GraphQLError::schema_validation(format!(
            "Directive @{} does not accept arguments {:?}",
            directive.name, extra
        ))),
    }
}

fn argument<'b, 'a>(directive: &'b Directive<'a, String>, name: &str) -> Option<&'b Value<'a, String>> {
    directive
        .arguments
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v)
}

fn string_argument(directive: &Directive<'_, String>, name: &str) -> GraphQLResult<Option<String>> {
    match argument(directive, name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(x)) | Some(Value::Enum(x)) => Ok(Some(x.clone())),
        Some(_) => Err(GraphQLError::schema_validation(format!(
            "Argument \"{}\" of @{} must be a string",
            name, directive.name
        ))),
    }
}

fn required_string_argument(directive: &Directive<'_, String>, name: &str) -> GraphQLResult<String> {
    string_argument(directive, name)?.ok_or_else(|| {
        GraphQLError::schema_validation(format!(
            "Directive @{} requires argument \"{}\"",
            directive.name, name
        ))
    })
}

fn bool_argument(directive: &Directive<'_, String>, name: &str, default: bool) -> GraphQLResult<bool> {
    match argument(directive, name) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Boolean(x)) => Ok(*x),
        Some(_) => Err(GraphQLError::schema_validation(format!(
            "Argument \"{}\" of @{} must be a Boolean",
            name, directive.name
        ))),
    }
}

fn enum_list_argument(directive: &Directive<'_, String>, name: &str) -> GraphQLResult<Option<Vec<String>>> {
    match argument(directive, name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::List(items)) => items
            .iter()
            .map(|x| match x {
                Value::Enum(v) | Value::String(v) => Ok(v.clone()),
                _ => Err(GraphQLError::schema_validation(format!(
                    "Argument \"{}\" of @{} must be a list of enum values",
                    name, directive.name
                ))),
            })
            .collect::<GraphQLResult<Vec<_>>>()
            .map(Some),
        // single values coerce to a one element list
        Some(Value::Enum(v)) | Some(Value::String(v)) => Ok(Some(vec![v.clone()])),
        Some(_) => Err(GraphQLError::schema_validation(format!(
            "Argument \"{}\" of @{} must be a list of enum values",
            name, directive.name
        ))),
    }
}

fn json_list_argument(directive: &Directive<'_, String>, name: &str) -> Vec<serde_json::Value> {
    match argument(directive, name).map(value_to_json) {
        Some(serde_json::Value::Array(x)) => x,
        Some(serde_json::Value::Null) | None => vec![],
        Some(other) => vec![other],
    }
}

fn parse_relationship(directive: &Directive<'_, String>) -> GraphQLResult<RelationshipDirective> {
    restrict_arguments(
        directive,
        &["type", "direction", "properties", "queryDirection", "nestedOperations", "aggregate"],
    )?;

    let rel_type = required_string_argument(directive, "type")?;
    let direction = match required_string_argument(directive, "direction")?.as_str() {
        "IN" => RelationshipDirection::In,
        "OUT" => RelationshipDirection::Out,
        other => {
            return Err(GraphQLError::schema_validation(format!(
                "Invalid relationship direction \"{}\", expected IN or OUT",
                other
            )))
        }
    };

    let query_direction = match string_argument(directive, "queryDirection")?.as_deref() {
        None | Some("DEFAULT_DIRECTED") => QueryDirection::DefaultDirected,
        Some("DEFAULT_UNDIRECTED") => QueryDirection::DefaultUndirected,
        Some("DIRECTED_ONLY") | Some("DIRECTED") => QueryDirection::DirectedOnly,
        Some("UNDIRECTED_ONLY") | Some("UNDIRECTED") => QueryDirection::UndirectedOnly,
        Some(other) => {
            return Err(GraphQLError::schema_validation(format!(
                "Invalid queryDirection \"{}\"",
                other
            )))
        }
    };

    let nested_operations = match enum_list_argument(directive, "nestedOperations")? {
        None => NestedOperation::all(),
        Some(ops) => ops
            .iter()
            .map(|x| {
                NestedOperation::from_name(x).ok_or_else(|| {
                    GraphQLError::schema_validation(format!("Invalid nested operation \"{}\"", x))
                })
            })
            .collect::<GraphQLResult<BTreeSet<_>>>()?,
    };

    Ok(RelationshipDirective {
        rel_type,
        direction,
        properties: string_argument(directive, "properties")?,
        query_direction,
        nested_operations,
        aggregate: bool_argument(directive, "aggregate", true)?,
    })
}

fn parse_write_operations(
    directive: &Directive<'_, String>,
    name: &str,
) -> GraphQLResult<BTreeSet<WriteOperation>> {
    match enum_list_argument(directive, name)? {
        None => Ok([WriteOperation::Create, WriteOperation::Update].into_iter().collect()),
        Some(ops) => ops
            .iter()
            .map(|x| {
                WriteOperation::from_name(x).ok_or_else(|| {
                    GraphQLError::schema_validation(format!(
                        "Invalid operation \"{}\" on @{}",
                        x, directive.name
                    ))
                })
            })
            .collect(),
    }
}

fn merge_auth(target: &mut Option<RawAuth>, directive: &Directive<'_, String>) -> GraphQLResult<()> {
    let auth = target.get_or_insert_with(RawAuth::default);
    if directive.name == names::AUTH {
        restrict_arguments(directive, &["rules"])?;
        auth.rules.extend(json_list_argument(directive, "rules"));
    } else {
        restrict_arguments(directive, &["filter", "validate"])?;
        auth.filter.extend(json_list_argument(directive, "filter"));
        auth.validate.extend(json_list_argument(directive, "validate"));
    }
    Ok(())
}

impl FieldDirectives {
    pub fn parse(directives: &[Directive<'_, String>]) -> GraphQLResult<Self> {
        let mut res = Self::default();

        for directive in directives {
            match directive.name.as_str() {
                names::RELATIONSHIP => res.relationship = Some(parse_relationship(directive)?),
                names::DECLARE_RELATIONSHIP => {
                    restrict_arguments(directive, &["nestedOperations", "aggregate"])?;
                    res.declare_relationship = true;
                }
                names::ALIAS => {
                    restrict_arguments(directive, &["property"])?;
                    res.alias = Some(required_string_argument(directive, "property")?);
                }
                names::UNIQUE => {
                    restrict_arguments(directive, &["constraintName"])?;
                    if res.unique {
                        return Err(GraphQLError::schema_validation(
                            "Directive @unique declared more than once",
                        ));
                    }
                    res.unique = true;
                }
                names::ID => {
                    restrict_arguments(directive, &["autogenerate", "unique"])?;
                    if bool_argument(directive, "unique", false)? && res.unique {
                        return Err(GraphQLError::schema_validation(
                            "Conflicting uniqueness: @id(unique: true) combined with @unique",
                        ));
                    }
                    res.id = Some(bool_argument(directive, "autogenerate", true)?);
                }
                names::TIMESTAMP => {
                    restrict_arguments(directive, &["operations"])?;
                    res.timestamp = Some(parse_write_operations(directive, "operations")?);
                }
                names::DEFAULT => {
                    restrict_arguments(directive, &["value"])?;
                    let value = argument(directive, "value").ok_or_else(|| {
                        GraphQLError::schema_validation("Directive @default requires argument \"value\"")
                    })?;
                    res.default = Some(value_to_json(value));
                }
                names::CYPHER => {
                    restrict_arguments(directive, &["statement", "columnName"])?;
                    res.cypher = Some(CypherDirective {
                        statement: required_string_argument(directive, "statement")?,
                        column_name: required_string_argument(directive, "columnName")?,
                    });
                }
                names::POPULATED_BY => {
                    restrict_arguments(directive, &["callback", "operations"])?;
                    res.populated_by = Some(PopulatedByDirective {
                        callback: required_string_argument(directive, "callback")?,
                        operations: parse_write_operations(directive, "operations")?,
                    });
                }
                names::AUTH | names::AUTHORIZATION => merge_auth(&mut res.auth, directive)?,
                _ => res.other.push(format_directive(directive)),
            }
        }

        if res.unique && res.id.is_some() && directives.iter().any(|d| {
            d.name == names::ID && matches!(argument(d, "unique"), Some(Value::Boolean(true)))
        }) {
            return Err(GraphQLError::schema_validation(
                "Conflicting uniqueness: @id(unique: true) combined with @unique",
            ));
        }
        Ok(res)
    }
}

impl TypeDirectives {
    pub fn parse(directives: &[Directive<'_, String>]) -> GraphQLResult<Self> {
        let mut res = Self::default();

        for directive in directives {
            match directive.name.as_str() {
                names::RELATIONSHIP_PROPERTIES => res.relationship_properties = true,
                names::AUTH | names::AUTHORIZATION => merge_auth(&mut res.auth, directive)?,
                names::MUTATION => {
                    restrict_arguments(directive, &["operations"])?;
                    let ops = enum_list_argument(directive, "operations")?.unwrap_or_default();
                    let ops = ops
                        .iter()
                        .map(|x| match x.as_str() {
                            "CREATE" => Ok(MutationOperation::Create),
                            "UPDATE" => Ok(MutationOperation::Update),
                            "DELETE" => Ok(MutationOperation::Delete),
                            other => Err(GraphQLError::schema_validation(format!(
                                "Invalid operation \"{}\" on @mutation",
                                other
                            ))),
                        })
                        .collect::<GraphQLResult<BTreeSet<_>>>()?;
                    res.mutation = Some(ops);
                }
                names::PLURAL => {
                    restrict_arguments(directive, &["value"])?;
                    res.plural = Some(required_string_argument(directive, "value")?);
                }
                _ => res.other.push(format_directive(directive)),
            }
        }
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphql_parser::schema::{parse_schema, Definition, TypeDefinition};

    fn field_directives(sdl: &str) -> GraphQLResult<FieldDirectives> {
        let doc = parse_schema::<String>(sdl).unwrap();
        match &doc.definitions[0] {
            Definition::TypeDefinition(TypeDefinition::Object(obj)) => {
                FieldDirectives::parse(&obj.fields[0].directives)
            }
            _ => panic!("expected object type"),
        }
    }

    #[test]
    fn parses_relationship_arguments() {
        let parsed = field_directives(
            r#"type Movie { actors: [Actor!]! @relationship(type: "ACTED_IN", direction: IN, properties: "ActedIn", queryDirection: UNDIRECTED_ONLY, nestedOperations: [CREATE, CONNECT]) }"#,
        )
        .unwrap();
        let rel = parsed.relationship.unwrap();
        assert_eq!(rel.rel_type, "ACTED_IN");
        assert_eq!(rel.direction, RelationshipDirection::In);
        assert_eq!(rel.properties.as_deref(), Some("ActedIn"));
        assert_eq!(rel.query_direction, QueryDirection::UndirectedOnly);
        assert_eq!(
            rel.nested_operations,
            [NestedOperation::Create, NestedOperation::Connect].into_iter().collect()
        );
        assert!(rel.aggregate);
    }

    #[test]
    fn empty_nested_operations_are_kept_empty() {
        let parsed = field_directives(
            r#"type Movie { actors: [Actor!]! @relationship(type: "ACTED_IN", direction: IN, nestedOperations: []) }"#,
        )
        .unwrap();
        assert!(parsed.relationship.unwrap().nested_operations.is_empty());
    }

    #[test]
    fn rejects_invalid_direction() {
        let parsed = field_directives(
            r#"type Movie { actors: [Actor!]! @relationship(type: "ACTED_IN", direction: SIDEWAYS) }"#,
        );
        assert!(matches!(parsed, Err(GraphQLError::SchemaValidation { .. })));
    }

    #[test]
    fn rejects_conflicting_uniqueness() {
        let parsed = field_directives(r#"type Movie { id: ID! @unique @id(unique: true) }"#);
        assert!(matches!(parsed, Err(GraphQLError::SchemaValidation { .. })));
    }

    #[test]
    fn keeps_user_directives_for_re_exposure() {
        let parsed =
            field_directives(r#"type Movie { title: String @alias(property: "name") @cacheControl(maxAge: 30) }"#)
                .unwrap();
        assert_eq!(parsed.alias.as_deref(), Some("name"));
        assert_eq!(parsed.other, vec!["@cacheControl(maxAge: 30)".to_string()]);
    }

    #[test]
    fn directed_argument_defaults_follow_policy() {
        assert_eq!(QueryDirection::DefaultDirected.directed_argument_default(), Some(true));
        assert_eq!(QueryDirection::DefaultUndirected.directed_argument_default(), Some(false));
        assert_eq!(QueryDirection::DirectedOnly.directed_argument_default(), None);
        assert!(!QueryDirection::UndirectedOnly.is_directed(Some(true)));
        assert!(!QueryDirection::DefaultDirected.is_directed(Some(false)));
    }
}
