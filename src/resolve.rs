use crate::builder::*;
use crate::directives::value_to_json;
use crate::entity::ScalarKind;
use crate::error::{GraphQLError, GraphQLResult};
use crate::events::{events_from_meta, EventSink, SubscriptionEvent};
use crate::graphql::*;
use crate::gson::int64_from_pair;
use crate::omit::*;
use crate::parser_util::*;
use crate::transpile::{QueryEntrypoint, Statement, TranslationContext};
use crate::transpile_mutation::MutationEntrypoint;
use graphql_parser::query::{parse_query, Definition, FragmentDefinition, OperationDefinition, SelectionSet, VariableDefinition};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RootKind {
    Read,
    Connection,
    Aggregate,
    Create,
    Update,
    Delete,
    /// `__typename`, answered without a statement
    Typename,
}

/// One root field of an operation compiled into a single Cypher statement
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RootTranslation {
    pub response_key: String,
    pub field_name: String,
    pub kind: RootKind,
    /// Empty for [`RootKind::Typename`]
    pub cypher: String,
    pub params: IndexMap<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Counters {
    pub nodes_created: i64,
    pub nodes_deleted: i64,
    pub relationships_created: i64,
    pub relationships_deleted: i64,
}

impl Counters {
    fn get(&self, name: &str) -> Option<i64> {
        match name {
            "nodesCreated" => Some(self.nodes_created),
            "nodesDeleted" => Some(self.nodes_deleted),
            "relationshipsCreated" => Some(self.relationships_created),
            "relationshipsDeleted" => Some(self.relationships_deleted),
            _ => None,
        }
    }
}

/// Rows and statistics of one committed statement
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryResult {
    pub rows: Vec<serde_json::Map<String, Value>>,
    pub counters: Counters,
    pub bookmark: Option<String>,
}

#[derive(thiserror::Error, Clone, Debug, PartialEq)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Runs one statement with its parameters in its own transaction
pub trait GraphDriver {
    fn run(&self, statement: &RootTranslation) -> Result<QueryResult, DriverError>;
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ErrorExtensions {
    pub code: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ErrorMessage {
    pub message: String,
    pub extensions: ErrorExtensions,
}

impl From<&GraphQLError> for ErrorMessage {
    fn from(err: &GraphQLError) -> Self {
        Self {
            message: err.to_string(),
            extensions: ErrorExtensions {
                code: err.code().to_string(),
            },
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct GraphQLResponse {
    #[serde(skip_serializing_if = "Omit::is_omit")]
    pub data: Omit<Value>,
    #[serde(skip_serializing_if = "Omit::is_omit")]
    pub errors: Omit<Vec<ErrorMessage>>,
}

impl GraphQLResponse {
    pub fn from_error(err: &GraphQLError) -> Self {
        Self {
            data: Omit::Omitted,
            errors: Omit::Present(vec![err.into()]),
        }
    }
}

/// A root field together with the builder its response is shaped from
pub struct PlannedRoot {
    pub builder: RootBuilder,
    pub translation: RootTranslation,
}

enum OperationKind {
    Query,
    Mutation,
}

fn merge_variable_defaults(definitions: &[VariableDefinition<'_, String>], variables: Option<Value>) -> GraphQLResult<Value> {
    let mut merged = match variables {
        None | Some(Value::Null) => serde_json::Map::new(),
        Some(Value::Object(x)) => x,
        Some(_) => return Err(GraphQLError::translation("variables must be an object")),
    };
    for definition in definitions {
        if merged.contains_key(&definition.name) {
            continue;
        }
        if let Some(default) = &definition.default_value {
            merged.insert(definition.name.clone(), value_to_json(default));
        }
    }
    Ok(Value::Object(merged))
}

fn operation_name_of(def: &OperationDefinition<'_, String>) -> Option<String> {
    match def {
        OperationDefinition::Query(q) => q.name.clone(),
        OperationDefinition::Mutation(m) => m.name.clone(),
        OperationDefinition::Subscription(s) => s.name.clone(),
        OperationDefinition::SelectionSet(_) => None,
    }
}

fn compile(builder: &RootBuilder, ctx: &TranslationContext) -> GraphQLResult<Option<Statement>> {
    Ok(Some(match builder {
        RootBuilder::Read(x) => QueryEntrypoint::translate(x, ctx)?,
        RootBuilder::Connection(x) => QueryEntrypoint::translate(x, ctx)?,
        RootBuilder::Aggregate(x) => QueryEntrypoint::translate(x, ctx)?,
        RootBuilder::Create(x) => MutationEntrypoint::translate(x, ctx)?,
        RootBuilder::Update(x) => MutationEntrypoint::translate(x, ctx)?,
        RootBuilder::Delete(x) => MutationEntrypoint::translate(x, ctx)?,
        RootBuilder::Typename { .. } => return Ok(None),
    }))
}

fn root_kind(builder: &RootBuilder) -> RootKind {
    match builder {
        RootBuilder::Read(_) => RootKind::Read,
        RootBuilder::Connection(_) => RootKind::Connection,
        RootBuilder::Aggregate(_) => RootKind::Aggregate,
        RootBuilder::Create(_) => RootKind::Create,
        RootBuilder::Update(_) => RootKind::Update,
        RootBuilder::Delete(_) => RootKind::Delete,
        RootBuilder::Typename { .. } => RootKind::Typename,
    }
}

/// Selects the requested operation and compiles each of its root fields
pub fn plan_operation(
    query: &str,
    variables: Option<Value>,
    operation_name: Option<&str>,
    schema: &__Schema,
    ctx: &TranslationContext,
) -> GraphQLResult<Vec<PlannedRoot>> {
    let document = parse_query::<String>(query)?;

    let mut operation_defs: Vec<OperationDefinition<String>> = vec![];
    let mut fragment_defs: Vec<FragmentDefinition<String>> = vec![];
    for def in document.definitions {
        match def {
            Definition::Operation(v) => operation_defs.push(v),
            Definition::Fragment(v) => fragment_defs.push(v),
        }
    }

    let operation_names: Vec<Option<String>> = operation_defs.iter().map(operation_name_of).collect();
    if operation_names.iter().any(|x| x.is_none()) && operation_names.len() > 1 {
        return Err(GraphQLError::translation(
            "Anonymous operations must be the only defined operation",
        ));
    }
    if operation_names.iter().unique().count() != operation_names.len() {
        return Err(GraphQLError::translation("Operation names must be unique"));
    }

    let requested = operation_name.map(str::to_string);
    let op = operation_defs
        .into_iter()
        .zip(&operation_names)
        .find(|x| *x.1 == requested || (operation_names.len() == 1 && requested.is_none()))
        .map(|x| x.0)
        .ok_or_else(|| GraphQLError::translation("Operation not found"))?;

    let (kind, variable_defs, selection_set): (OperationKind, Vec<VariableDefinition<String>>, SelectionSet<String>) = match op {
        OperationDefinition::Query(q) => (OperationKind::Query, q.variable_definitions, q.selection_set),
        OperationDefinition::SelectionSet(s) => (OperationKind::Query, vec![], s),
        OperationDefinition::Mutation(m) => (OperationKind::Mutation, m.variable_definitions, m.selection_set),
        OperationDefinition::Subscription(_) => {
            return Err(GraphQLError::translation("Subscriptions are not supported"))
        }
    };
    let variables = merge_variable_defaults(&variable_defs, variables)?;

    let root_type = match kind {
        OperationKind::Query => schema.query_type(),
        OperationKind::Mutation => schema
            .mutation_type()
            .ok_or_else(|| GraphQLError::translation("Unknown type Mutation"))?,
    };
    let root_name = root_type.name().unwrap_or_default();
    let selections = normalize_selection_set(&selection_set, &fragment_defs, &[root_name])
        .map_err(GraphQLError::translation)?;
    if selections.is_empty() {
        return Err(GraphQLError::translation("Selection set must not be empty"));
    }

    let mut res = vec![];
    for selection in selections {
        let builder = to_root_builder(&schema.model, &root_type, selection, &variables, &fragment_defs)?;
        let statement = compile(&builder, ctx)?;
        let field_name = selection.name.clone();
        let (cypher, params) = match statement {
            Some(x) => (x.cypher, x.params),
            None => (String::new(), IndexMap::new()),
        };
        tracing::debug!(
            root_field = %field_name,
            statement_length = cypher.len(),
            params = params.len(),
            "translated root field"
        );
        tracing::trace!(cypher = %cypher, "emitted cypher");
        res.push(PlannedRoot {
            translation: RootTranslation {
                response_key: builder.alias().to_string(),
                field_name,
                kind: root_kind(&builder),
                cypher,
                params,
            },
            builder,
        });
    }
    Ok(res)
}

/// Runs every planned root field in order. The first failure discards the
/// data of the whole operation.
pub fn execute_plan(
    plan: Vec<PlannedRoot>,
    driver: &dyn GraphDriver,
    sink: Option<&dyn EventSink>,
) -> GraphQLResponse {
    let mut data = serde_json::Map::new();
    for planned in plan {
        match execute_root(&planned, driver, sink) {
            Ok(value) => {
                data.insert(planned.translation.response_key.clone(), value);
            }
            Err(err) => {
                tracing::debug!(root_field = %planned.translation.field_name, error = %err, "root field failed");
                return GraphQLResponse {
                    data: Omit::Present(Value::Null),
                    errors: Omit::Present(vec![(&err).into()]),
                };
            }
        }
    }
    GraphQLResponse {
        data: Omit::Present(Value::Object(data)),
        errors: Omit::Omitted,
    }
}

fn execute_root(planned: &PlannedRoot, driver: &dyn GraphDriver, sink: Option<&dyn EventSink>) -> GraphQLResult<Value> {
    if let RootBuilder::Typename { typename, .. } = &planned.builder {
        return Ok(json!(typename));
    }
    let result = driver
        .run(&planned.translation)
        .map_err(|e| GraphQLError::from_driver_message(&e.message))?;
    let first = result.rows.first();
    let column = |name: &str| first.and_then(|row| row.get(name)).cloned().unwrap_or(Value::Null);

    let value = match &planned.builder {
        RootBuilder::Read(x) => Value::Array(
            result
                .rows
                .iter()
                .map(|row| shape_node(&x.selection, row.get("this").unwrap_or(&Value::Null)))
                .collect(),
        ),
        RootBuilder::Connection(x) => shape_connection(x, &column("this")),
        RootBuilder::Aggregate(x) => shape_aggregate(&x.selections, &column("this")),
        RootBuilder::Create(x) => shape_mutation_response(&x.selections, &column("data"), &result),
        RootBuilder::Update(x) => shape_mutation_response(&x.selections, &column("data"), &result),
        RootBuilder::Delete(x) => shape_info(&x.selections, &result),
        RootBuilder::Typename { .. } => Value::Null,
    };

    if let Some(sink) = sink {
        for event in events_from_meta(&column("meta")).map_err(GraphQLError::driver)? {
            publish(sink, &event);
        }
    }
    Ok(value)
}

fn publish(sink: &dyn EventSink, event: &SubscriptionEvent) {
    tracing::trace!(?event, "publishing subscription event");
    sink.publish(event);
}

/// Converts driver integers for the response. BigInt values are rendered as
/// strings, `{low, high}` pairs are folded into plain numbers.
fn normalize(value: &Value, scalar: Option<ScalarKind>) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(|x| normalize(x, scalar)).collect()),
        Value::Object(kv) if kv.len() == 2 => match (kv.get("low").and_then(Value::as_i64), kv.get("high").and_then(Value::as_i64)) {
            (Some(low), Some(high)) => integer_value(int64_from_pair(low as i32, high as i32), scalar),
            _ => value.clone(),
        },
        Value::Number(x) if scalar == Some(ScalarKind::BigInt) => match x.as_i64() {
            Some(x) => json!(x.to_string()),
            None => value.clone(),
        },
        _ => value.clone(),
    }
}

fn integer_value(value: i64, scalar: Option<ScalarKind>) -> Value {
    match scalar {
        Some(ScalarKind::BigInt) => json!(value.to_string()),
        _ => json!(value),
    }
}

fn shape_target(targets: &[NodeBuilder], value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    let resolved = value
        .get("__resolveType")
        .and_then(Value::as_str)
        .and_then(|name| targets.iter().find(|x| x.node.name == name));
    match resolved.or_else(|| targets.first()) {
        Some(target) => shape_node(target, value),
        None => Value::Null,
    }
}

fn shape_node(builder: &NodeBuilder, value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    let mut res = serde_json::Map::new();
    for selection in &builder.selections {
        let alias = selection.alias();
        let field_value = value.get(alias).unwrap_or(&Value::Null);
        let shaped = match selection {
            NodeSelection::Primitive { field, .. } => normalize(field_value, field.scalar()),
            NodeSelection::Typename { typename, .. } => json!(typename),
            NodeSelection::Relation(x) => match field_value {
                Value::Array(items) => Value::Array(items.iter().map(|item| shape_target(&x.targets, item)).collect()),
                other => shape_target(&x.targets, other),
            },
            NodeSelection::RelationAggregate(x) => shape_aggregate(&x.selections, field_value),
            NodeSelection::RelationConnection(x) => shape_connection(x, field_value),
        };
        res.insert(alias.to_string(), shaped);
    }
    Value::Object(res)
}

fn shape_aggregate(selections: &[AggregateSelection], value: &Value) -> Value {
    let mut res = serde_json::Map::new();
    for selection in selections {
        match selection {
            AggregateSelection::Count { alias } => {
                res.insert(alias.clone(), normalize(value.get(alias).unwrap_or(&Value::Null), Some(ScalarKind::Int)));
            }
            AggregateSelection::Typename { alias, typename } => {
                res.insert(alias.clone(), json!(typename));
            }
            AggregateSelection::Field {
                alias,
                field,
                functions,
                ..
            } => {
                let inner = value.get(alias).unwrap_or(&Value::Null);
                let mut shaped = serde_json::Map::new();
                for function in functions {
                    match function {
                        AggregateFunctionSelection::Function { alias, function } => {
                            let scalar = match function {
                                AggregateFunction::Average => Some(ScalarKind::Float),
                                _ => field.scalar(),
                            };
                            shaped.insert(alias.clone(), normalize(inner.get(alias).unwrap_or(&Value::Null), scalar));
                        }
                        AggregateFunctionSelection::Typename { alias, typename } => {
                            shaped.insert(alias.clone(), json!(typename));
                        }
                    }
                }
                res.insert(alias.clone(), Value::Object(shaped));
            }
            AggregateSelection::Node { alias, selections } | AggregateSelection::Edge { alias, selections } => {
                res.insert(alias.clone(), shape_aggregate(selections, value.get(alias).unwrap_or(&Value::Null)));
            }
        }
    }
    Value::Object(res)
}

/// Fills cursors and page info around the page of edges the statement returned.
/// `totalCount` counts every edge, the page starts at `builder.offset`.
fn shape_connection(builder: &ConnectionBuilder, value: &Value) -> Value {
    let edges: Vec<Value> = value
        .get("edges")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let total_count = match normalize(value.get("totalCount").unwrap_or(&Value::Null), Some(ScalarKind::Int)) {
        Value::Number(x) => x.as_i64().unwrap_or_default(),
        _ => 0,
    };
    let page_len = edges.len() as i64;

    let mut res = serde_json::Map::new();
    for selection in &builder.selections {
        match selection {
            ConnectionSelection::TotalCount { alias } => {
                res.insert(alias.clone(), json!(total_count));
            }
            ConnectionSelection::Typename { alias, typename } => {
                res.insert(alias.clone(), json!(typename));
            }
            ConnectionSelection::Edges { alias, selections } => {
                let shaped = edges
                    .iter()
                    .enumerate()
                    .map(|(ix, edge)| shape_edge(selections, edge, builder.offset + ix as i64))
                    .collect();
                res.insert(alias.clone(), Value::Array(shaped));
            }
            ConnectionSelection::PageInfo { alias, selections } => {
                let mut page_info = serde_json::Map::new();
                for selection in selections {
                    let (key, value) = match selection {
                        PageInfoSelection::HasNextPage { alias } => (alias, json!(builder.offset + page_len < total_count)),
                        PageInfoSelection::HasPreviousPage { alias } => (alias, json!(builder.offset > 0)),
                        PageInfoSelection::StartCursor { alias } => match page_len {
                            0 => (alias, Value::Null),
                            _ => (alias, json!(encode_cursor(builder.offset))),
                        },
                        PageInfoSelection::EndCursor { alias } => match page_len {
                            0 => (alias, Value::Null),
                            _ => (alias, json!(encode_cursor(builder.offset + page_len - 1))),
                        },
                        PageInfoSelection::Typename { alias, typename } => (alias, json!(typename)),
                    };
                    page_info.insert(key.clone(), value);
                }
                res.insert(alias.clone(), Value::Object(page_info));
            }
        }
    }
    Value::Object(res)
}

fn shape_edge(selections: &[EdgeSelection], edge: &Value, index: i64) -> Value {
    let mut res = serde_json::Map::new();
    for selection in selections {
        match selection {
            EdgeSelection::Cursor { alias } => {
                res.insert(alias.clone(), json!(encode_cursor(index)));
            }
            EdgeSelection::Node { alias, targets } => {
                res.insert(alias.clone(), shape_target(targets, edge.get("node").unwrap_or(&Value::Null)));
            }
            EdgeSelection::Property { alias, field } => {
                let value = edge
                    .get("properties")
                    .and_then(|x| x.get(&field.name))
                    .unwrap_or(&Value::Null);
                res.insert(alias.clone(), normalize(value, field.scalar()));
            }
            EdgeSelection::Typename { alias, typename } => {
                res.insert(alias.clone(), json!(typename));
            }
        }
    }
    Value::Object(res)
}

fn shape_info(selections: &[InfoSelection], result: &QueryResult) -> Value {
    let mut res = serde_json::Map::new();
    for selection in selections {
        match selection {
            InfoSelection::Bookmark { alias } => {
                res.insert(alias.clone(), json!(result.bookmark));
            }
            InfoSelection::Counter { alias, counter } => {
                res.insert(alias.clone(), json!(result.counters.get(counter).unwrap_or_default()));
            }
            InfoSelection::Typename { alias, typename } => {
                res.insert(alias.clone(), json!(typename));
            }
        }
    }
    Value::Object(res)
}

fn shape_mutation_response(selections: &[MutationResponseSelection], data: &Value, result: &QueryResult) -> Value {
    let nodes: &[Value] = data.as_array().map(Vec::as_slice).unwrap_or_default();
    let mut res = serde_json::Map::new();
    for selection in selections {
        match selection {
            MutationResponseSelection::Info { alias, selections } => {
                res.insert(alias.clone(), shape_info(selections, result));
            }
            MutationResponseSelection::Nodes { alias, selection } => {
                let shaped = nodes.iter().map(|x| shape_node(selection, x)).collect();
                res.insert(alias.clone(), Value::Array(shaped));
            }
            MutationResponseSelection::Typename { alias, typename } => {
                res.insert(alias.clone(), json!(typename));
            }
        }
    }
    Value::Object(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_pairs_fold_into_numbers() {
        let pair = json!({"low": 1, "high": 2097152});
        assert_eq!(normalize(&pair, Some(ScalarKind::BigInt)), json!("9007199254740993"));
        assert_eq!(normalize(&json!({"low": 5, "high": 0}), Some(ScalarKind::Int)), json!(5));
        assert_eq!(normalize(&json!([{"low": 1, "high": 0}, 2]), Some(ScalarKind::BigInt)), json!(["1", "2"]));
        assert_eq!(normalize(&json!({"low": 1, "other": 0}), None), json!({"low": 1, "other": 0}));
    }

    #[test]
    fn variable_defaults_fill_missing_values() {
        let document = parse_query::<String>("query Q($title: String = \"Matrix\", $limit: Int) { movies { title } }").unwrap();
        let definitions = match &document.definitions[0] {
            Definition::Operation(OperationDefinition::Query(q)) => q.variable_definitions.clone(),
            _ => unreachable!(),
        };
        let merged = merge_variable_defaults(&definitions, Some(json!({"limit": 3}))).unwrap();
        assert_eq!(merged, json!({"limit": 3, "title": "Matrix"}));
        assert!(merge_variable_defaults(&definitions, Some(json!([1]))).is_err());
    }

    #[test]
    fn counters_are_looked_up_by_field_name() {
        let counters = Counters {
            nodes_created: 2,
            relationships_deleted: 1,
            ..Default::default()
        };
        assert_eq!(counters.get("nodesCreated"), Some(2));
        assert_eq!(counters.get("relationshipsDeleted"), Some(1));
        assert_eq!(counters.get("bookmark"), None);
    }
}
