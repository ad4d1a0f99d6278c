use crate::constants::{aggregate, args, connection, introspection, mutation as mutation_names, page_info};
use crate::entity::*;
use crate::error::{GraphQLError, GraphQLResult};
use crate::filter::*;
use crate::graphql::*;
use crate::gson;
use crate::inputs::*;
use crate::mutation::*;
use crate::parser_util::*;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use graphql_parser::query::*;
use indexmap::IndexMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn cypher(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SortItem {
    pub field: Arc<PrimitiveField>,
    pub direction: SortDirection,
    /// Sorts on a relationship property rather than the node
    pub edge: bool,
}

#[derive(Clone, Debug, Default)]
pub struct OptionsBuilder {
    pub sort: Vec<SortItem>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Filter on a relationship target. Union filters are keyed by member and
/// only the members they name are traversed.
#[derive(Clone, Debug, Default)]
pub struct TargetFilter {
    pub common: FilterBuilder,
    pub members: Option<IndexMap<String, FilterBuilder>>,
}

impl TargetFilter {
    pub fn includes(&self, node: &str) -> bool {
        match &self.members {
            Some(members) => members.contains_key(node),
            None => true,
        }
    }

    pub fn for_target(&self, node: &str) -> &FilterBuilder {
        match &self.members {
            Some(members) => members.get(node).unwrap_or(&self.common),
            None => &self.common,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeBuilder {
    pub node: Arc<Node>,
    pub selections: Vec<NodeSelection>,
}

#[derive(Clone, Debug)]
pub enum NodeSelection {
    Primitive {
        alias: String,
        field: Arc<PrimitiveField>,
    },
    Typename {
        alias: String,
        typename: String,
    },
    Relation(RelationBuilder),
    RelationAggregate(RelationAggregateBuilder),
    RelationConnection(ConnectionBuilder),
}

impl NodeSelection {
    pub fn alias(&self) -> &str {
        match self {
            Self::Primitive { alias, .. } | Self::Typename { alias, .. } => alias,
            Self::Relation(x) => &x.alias,
            Self::RelationAggregate(x) => &x.alias,
            Self::RelationConnection(x) => &x.alias,
        }
    }
}

impl NodeBuilder {
    /// Names of the entity fields read by this selection
    pub fn selected_fields(&self) -> Vec<&str> {
        let mut names: Vec<&str> = vec![];
        for selection in &self.selections {
            let name = match selection {
                NodeSelection::Primitive { field, .. } => field.name.as_str(),
                NodeSelection::Typename { .. } => continue,
                NodeSelection::Relation(x) => x.field.name.as_str(),
                NodeSelection::RelationAggregate(x) => x.field.name.as_str(),
                NodeSelection::RelationConnection(x) => match &x.source {
                    ConnectionBuilderSource::Relation { field, .. } => field.name.as_str(),
                    ConnectionBuilderSource::Root(_) => continue,
                },
            };
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Combines two selections of the same node, keeping the first selection
    /// made under each response key
    pub fn merge(&mut self, other: &NodeBuilder) {
        for selection in &other.selections {
            if !self.selections.iter().any(|x| x.alias() == selection.alias()) {
                self.selections.push(selection.clone());
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct RelationBuilder {
    pub alias: String,
    pub field: Arc<RelationField>,
    pub directed: bool,
    pub filter: TargetFilter,
    pub options: OptionsBuilder,
    /// One selection per concrete target type
    pub targets: Vec<NodeBuilder>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateFunction {
    Min,
    Max,
    Average,
    Sum,
    Shortest,
    Longest,
}

impl AggregateFunction {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            aggregate::MIN => Some(Self::Min),
            aggregate::MAX => Some(Self::Max),
            aggregate::AVERAGE => Some(Self::Average),
            aggregate::SUM => Some(Self::Sum),
            aggregate::SHORTEST => Some(Self::Shortest),
            aggregate::LONGEST => Some(Self::Longest),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum AggregateFunctionSelection {
    Function {
        alias: String,
        function: AggregateFunction,
    },
    Typename {
        alias: String,
        typename: String,
    },
}

#[derive(Clone, Debug)]
pub enum AggregateSelection {
    Count {
        alias: String,
    },
    Typename {
        alias: String,
        typename: String,
    },
    Field {
        alias: String,
        field: Arc<PrimitiveField>,
        edge: bool,
        functions: Vec<AggregateFunctionSelection>,
    },
    Node {
        alias: String,
        selections: Vec<AggregateSelection>,
    },
    Edge {
        alias: String,
        selections: Vec<AggregateSelection>,
    },
}

#[derive(Clone, Debug)]
pub struct RelationAggregateBuilder {
    pub alias: String,
    pub field: Arc<RelationField>,
    pub target: Arc<Node>,
    pub directed: bool,
    pub filter: FilterBuilder,
    pub selections: Vec<AggregateSelection>,
}

#[derive(Clone, Debug)]
pub enum ConnectionBuilderSource {
    Root(Arc<Node>),
    Relation {
        field: Arc<RelationField>,
        directed: bool,
    },
}

#[derive(Clone, Debug)]
pub enum PageInfoSelection {
    HasNextPage { alias: String },
    HasPreviousPage { alias: String },
    StartCursor { alias: String },
    EndCursor { alias: String },
    Typename { alias: String, typename: String },
}

#[derive(Clone, Debug)]
pub enum EdgeSelection {
    Cursor {
        alias: String,
    },
    Node {
        alias: String,
        targets: Vec<NodeBuilder>,
    },
    Property {
        alias: String,
        field: Arc<PrimitiveField>,
    },
    Typename {
        alias: String,
        typename: String,
    },
}

#[derive(Clone, Debug)]
pub enum ConnectionSelection {
    TotalCount {
        alias: String,
    },
    Edges {
        alias: String,
        selections: Vec<EdgeSelection>,
    },
    PageInfo {
        alias: String,
        selections: Vec<PageInfoSelection>,
    },
    Typename {
        alias: String,
        typename: String,
    },
}

#[derive(Clone, Debug)]
pub struct ConnectionBuilder {
    pub alias: String,
    pub source: ConnectionBuilderSource,
    pub filter: TargetFilter,
    pub sort: Vec<SortItem>,
    pub first: Option<i64>,
    /// Edges skipped ahead of the page, derived from `after`
    pub offset: i64,
    pub targets: Vec<Arc<Node>>,
    pub selections: Vec<ConnectionSelection>,
}

impl ConnectionBuilder {
    /// Every selection made on `node` across all `edges` selections
    pub fn node_selection(&self, node: &Arc<Node>) -> NodeBuilder {
        let mut res = NodeBuilder {
            node: Arc::clone(node),
            selections: vec![],
        };
        for selection in &self.selections {
            if let ConnectionSelection::Edges { selections, .. } = selection {
                for edge_selection in selections {
                    if let EdgeSelection::Node { targets, .. } = edge_selection {
                        for target in targets.iter().filter(|x| x.node.name == node.name) {
                            res.merge(target);
                        }
                    }
                }
            }
        }
        res
    }

    /// Relationship properties read by any `edges` selection
    pub fn edge_fields(&self) -> Vec<Arc<PrimitiveField>> {
        let mut res: Vec<Arc<PrimitiveField>> = vec![];
        for selection in &self.selections {
            if let ConnectionSelection::Edges { selections, .. } = selection {
                for edge_selection in selections {
                    if let EdgeSelection::Property { field, .. } = edge_selection {
                        if !res.iter().any(|x| x.name == field.name) {
                            res.push(Arc::clone(field));
                        }
                    }
                }
            }
        }
        res
    }
}

#[derive(Clone, Debug)]
pub struct ReadBuilder {
    pub alias: String,
    pub node: Arc<Node>,
    pub filter: FilterBuilder,
    pub options: OptionsBuilder,
    pub selection: NodeBuilder,
}

#[derive(Clone, Debug)]
pub struct AggregateBuilder {
    pub alias: String,
    pub node: Arc<Node>,
    pub filter: FilterBuilder,
    pub selections: Vec<AggregateSelection>,
}

#[derive(Clone, Debug)]
pub enum InfoSelection {
    Bookmark { alias: String },
    Counter { alias: String, counter: String },
    Typename { alias: String, typename: String },
}

#[derive(Clone, Debug)]
pub enum MutationResponseSelection {
    Info {
        alias: String,
        selections: Vec<InfoSelection>,
    },
    Nodes {
        alias: String,
        selection: NodeBuilder,
    },
    Typename {
        alias: String,
        typename: String,
    },
}

#[derive(Clone, Debug)]
pub struct CreateBuilder {
    pub alias: String,
    pub node: Arc<Node>,
    pub inputs: Vec<CreateInput>,
    pub selections: Vec<MutationResponseSelection>,
}

#[derive(Clone, Debug)]
pub struct UpdateBuilder {
    pub alias: String,
    pub node: Arc<Node>,
    pub filter: FilterBuilder,
    pub update: UpdateInput,
    pub selections: Vec<MutationResponseSelection>,
}

#[derive(Clone, Debug)]
pub struct DeleteBuilder {
    pub alias: String,
    pub node: Arc<Node>,
    pub filter: FilterBuilder,
    pub nested: Vec<NestedMutation>,
    pub selections: Vec<InfoSelection>,
}

/// Node selection merged across every `{plural}` selection of a mutation response
pub fn response_node_selection(node: &Arc<Node>, selections: &[MutationResponseSelection]) -> NodeBuilder {
    let mut res = NodeBuilder {
        node: Arc::clone(node),
        selections: vec![],
    };
    for selection in selections {
        if let MutationResponseSelection::Nodes { selection, .. } = selection {
            res.merge(selection);
        }
    }
    res
}

#[derive(Clone, Debug)]
pub enum RootBuilder {
    Read(ReadBuilder),
    Connection(ConnectionBuilder),
    Aggregate(AggregateBuilder),
    Create(CreateBuilder),
    Update(UpdateBuilder),
    Delete(DeleteBuilder),
    Typename { alias: String, typename: String },
}

impl RootBuilder {
    pub fn alias(&self) -> &str {
        match self {
            Self::Read(x) => &x.alias,
            Self::Connection(x) => &x.alias,
            Self::Aggregate(x) => &x.alias,
            Self::Create(x) => &x.alias,
            Self::Update(x) => &x.alias,
            Self::Delete(x) => &x.alias,
            Self::Typename { alias, .. } => alias,
        }
    }
}

pub fn encode_cursor(index: i64) -> String {
    BASE64.encode(format!("{}{}", connection::CURSOR_PREFIX, index))
}

pub fn decode_cursor(cursor: &str) -> GraphQLResult<i64> {
    let invalid = || GraphQLError::translation(format!("Invalid cursor \"{}\"", cursor));
    let bytes = BASE64.decode(cursor).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    text.strip_prefix(connection::CURSOR_PREFIX)
        .and_then(|x| x.parse::<i64>().ok())
        .filter(|x| *x >= 0)
        .ok_or_else(invalid)
}

fn restrict_allowed_arguments<'a, T>(
    field: &__Field,
    query_field: &graphql_parser::query::Field<'a, T>,
) -> GraphQLResult<()>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    let extra_keys: Vec<&str> = query_field
        .arguments
        .iter()
        .map(|(name, _)| name.as_ref())
        .filter(|name| !field.args.iter().any(|arg| arg.name_ == *name))
        .collect();
    match extra_keys.is_empty() {
        true => Ok(()),
        false => Err(GraphQLError::translation(format!(
            "Input contains extra keys {:?}",
            extra_keys
        ))),
    }
}

fn read_argument<'a, T>(
    arg_name: &str,
    field: &__Field,
    query_field: &graphql_parser::query::Field<'a, T>,
    variables: &serde_json::Value,
) -> GraphQLResult<gson::Value>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    let input_value: __InputValue = match field.get_arg(arg_name) {
        Some(arg) => arg,
        // arguments the generated field doesn't declare read as absent
        None => return Ok(gson::Value::Absent),
    };

    let user_input: Option<&graphql_parser::query::Value<'a, T>> = query_field
        .arguments
        .iter()
        .filter(|(input_arg_name, _)| input_arg_name.as_ref() == arg_name)
        .map(|(_, v)| v)
        .next();

    let user_json_unvalidated = match user_input {
        None => gson::Value::Absent,
        Some(val) => to_gson(val, variables).map_err(GraphQLError::translation)?,
    };

    validate_arg_from_type(&input_value.type_(), &user_json_unvalidated).map_err(GraphQLError::translation)
}

fn arg_type(field: &__Field, arg_name: &str) -> GraphQLResult<__Type> {
    field
        .get_arg(arg_name)
        .map(|x| x.type_().unmodified_type())
        .ok_or_else(|| GraphQLError::translation(format!("Internal error: missing argument {}", arg_name)))
}

fn read_non_negative(value: &gson::Value, arg_name: &str) -> GraphQLResult<Option<i64>> {
    match value {
        gson::Value::Absent | gson::Value::Null => Ok(None),
        _ => match value.as_i64() {
            Some(x) if x >= 0 => Ok(Some(x)),
            _ => Err(GraphQLError::translation(format!(
                "Argument \"{}\" must be a non-negative integer",
                arg_name
            ))),
        },
    }
}

fn read_directed<'a, T>(
    field: &__Field,
    rel: &RelationField,
    query_field: &graphql_parser::query::Field<'a, T>,
    variables: &serde_json::Value,
) -> GraphQLResult<bool>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    let requested = read_argument(args::DIRECTED, field, query_field, variables)?;
    Ok(rel.query_direction.is_directed(requested.as_bool()))
}

fn read_filter<'a, T>(
    field: &__Field,
    query_field: &graphql_parser::query::Field<'a, T>,
    variables: &serde_json::Value,
) -> GraphQLResult<FilterBuilder>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    let validated = read_argument(args::WHERE, field, query_field, variables)?;
    Ok(FilterBuilder {
        elems: create_filters(&validated, &arg_type(field, args::WHERE)?)?,
    })
}

fn read_target_filter<'a, T>(
    field: &__Field,
    target: &RelationTarget,
    query_field: &graphql_parser::query::Field<'a, T>,
    variables: &serde_json::Value,
) -> GraphQLResult<TargetFilter>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    if !target.is_union() {
        return Ok(TargetFilter {
            common: read_filter(field, query_field, variables)?,
            members: None,
        });
    }
    let validated = read_argument(args::WHERE, field, query_field, variables)?;
    let branches = create_union_filters(&validated, &arg_type(field, args::WHERE)?)?;
    if branches.is_empty() {
        return Ok(TargetFilter::default());
    }
    let mut members = IndexMap::new();
    for branch in branches {
        if let Some(label) = branch.labels.into_iter().next() {
            members.insert(label, FilterBuilder { elems: branch.filters });
        }
    }
    Ok(TargetFilter {
        common: FilterBuilder::default(),
        members: Some(members),
    })
}

fn read_sort_object(
    value: &gson::Value,
    fields: &[Arc<PrimitiveField>],
    edge: bool,
) -> GraphQLResult<Vec<SortItem>> {
    let mut res = vec![];
    if let Some(kv) = value.as_object() {
        for (k, v) in kv {
            if v.is_unset() {
                continue;
            }
            let field = fields
                .iter()
                .find(|x| &x.name == k)
                .ok_or_else(|| GraphQLError::translation(format!("Invalid sort field \"{}\"", k)))?;
            let direction = match v.as_str() {
                Some("ASC") => SortDirection::Asc,
                Some("DESC") => SortDirection::Desc,
                _ => return Err(GraphQLError::translation("Invalid sort direction")),
            };
            res.push(SortItem {
                field: Arc::clone(field),
                direction,
                edge,
            });
        }
    }
    Ok(res)
}

fn read_sort(value: &gson::Value, fields: &[Arc<PrimitiveField>]) -> GraphQLResult<Vec<SortItem>> {
    let mut res = vec![];
    for item in value.iter_list() {
        res.extend(read_sort_object(item, fields, false)?);
    }
    Ok(res)
}

fn read_options(value: &gson::Value, fields: &[Arc<PrimitiveField>]) -> GraphQLResult<OptionsBuilder> {
    Ok(OptionsBuilder {
        sort: read_sort(value.get(args::SORT), fields)?,
        limit: read_non_negative(value.get(args::LIMIT), args::LIMIT)?,
        offset: read_non_negative(value.get(args::OFFSET), args::OFFSET)?,
    })
}

fn target_primitives(model: &EntityModel, target: &RelationTarget) -> Vec<Arc<PrimitiveField>> {
    entity_of(model, target).map(|x| x.primitives()).unwrap_or_default()
}

/// The type itself followed by the abstract types fragments may be spread on
fn type_names_of(model: &EntityModel, node: &Node) -> Vec<String> {
    let mut names = vec![node.name.clone()];
    names.extend(node.interfaces.iter().cloned());
    names.extend(
        model
            .unions
            .values()
            .filter(|x| x.members.contains(&node.name))
            .map(|x| x.name.clone()),
    );
    names
}

pub fn to_node_builder<'a, T>(
    model: &Arc<EntityModel>,
    node: &Arc<Node>,
    query_field: &graphql_parser::query::Field<'a, T>,
    variables: &serde_json::Value,
    fragment_definitions: &Vec<FragmentDefinition<'a, T>>,
) -> GraphQLResult<NodeBuilder>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    let type_ = node_type(model, node);
    let field_map = type_.field_map();
    let type_names = type_names_of(model, node);

    let selection_fields = normalize_selection_set(&query_field.selection_set, fragment_definitions, &type_names)
        .map_err(GraphQLError::translation)?;

    let mut selections = vec![];
    for selection_field in selection_fields {
        let field_name = selection_field.name.as_ref();
        let alias = alias_or_name(selection_field);
        let field = field_map
            .get(field_name)
            .ok_or_else(|| GraphQLError::field_not_found(field_name, node.name.as_str()))?;

        let selection = match &field.source {
            Some(FieldSource::Primitive(p)) => {
                restrict_allowed_arguments(field, selection_field)?;
                NodeSelection::Primitive {
                    alias,
                    field: Arc::clone(p),
                }
            }
            Some(FieldSource::Relation(rel)) => NodeSelection::Relation(to_relation_builder(
                model,
                field,
                rel,
                selection_field,
                variables,
                fragment_definitions,
            )?),
            Some(FieldSource::RelationAggregate(rel)) => NodeSelection::RelationAggregate(
                to_relation_aggregate_builder(model, field, rel, selection_field, variables, fragment_definitions)?,
            ),
            Some(FieldSource::RelationConnection(rel)) => {
                let directed = read_directed(field, rel, selection_field, variables)?;
                NodeSelection::RelationConnection(to_connection_builder(
                    model,
                    field,
                    ConnectionBuilderSource::Relation {
                        field: Arc::clone(rel),
                        directed,
                    },
                    selection_field,
                    variables,
                    fragment_definitions,
                )?)
            }
            None if field_name == introspection::TYPENAME => NodeSelection::Typename {
                alias,
                typename: node.name.clone(),
            },
            _ => {
                return Err(GraphQLError::translation(format!(
                    "Field \"{}\" can not be selected on {}",
                    field_name, node.name
                )))
            }
        };
        selections.push(selection);
    }
    Ok(NodeBuilder {
        node: Arc::clone(node),
        selections,
    })
}

fn to_relation_builder<'a, T>(
    model: &Arc<EntityModel>,
    field: &__Field,
    rel: &Arc<RelationField>,
    query_field: &graphql_parser::query::Field<'a, T>,
    variables: &serde_json::Value,
    fragment_definitions: &Vec<FragmentDefinition<'a, T>>,
) -> GraphQLResult<RelationBuilder>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    restrict_allowed_arguments(field, query_field)?;
    let directed = read_directed(field, rel, query_field, variables)?;
    let filter = read_target_filter(field, &rel.target, query_field, variables)?;
    let options_value = read_argument(args::OPTIONS, field, query_field, variables)?;
    let options = read_options(&options_value, &target_primitives(model, &rel.target))?;

    let mut targets = vec![];
    for node in model.concrete_nodes(&rel.target) {
        if filter.includes(&node.name) {
            targets.push(to_node_builder(model, &node, query_field, variables, fragment_definitions)?);
        }
    }

    Ok(RelationBuilder {
        alias: alias_or_name(query_field),
        field: Arc::clone(rel),
        directed,
        filter,
        options,
        targets,
    })
}

fn to_relation_aggregate_builder<'a, T>(
    model: &Arc<EntityModel>,
    field: &__Field,
    rel: &Arc<RelationField>,
    query_field: &graphql_parser::query::Field<'a, T>,
    variables: &serde_json::Value,
    fragment_definitions: &Vec<FragmentDefinition<'a, T>>,
) -> GraphQLResult<RelationAggregateBuilder>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    restrict_allowed_arguments(field, query_field)?;
    let target = match &rel.target {
        RelationTarget::Node(name) => Arc::clone(model.node(name)?),
        _ => {
            return Err(GraphQLError::translation(format!(
                "Aggregations are not available on {}",
                rel.name
            )))
        }
    };
    Ok(RelationAggregateBuilder {
        alias: alias_or_name(query_field),
        field: Arc::clone(rel),
        target,
        directed: read_directed(field, rel, query_field, variables)?,
        filter: read_filter(field, query_field, variables)?,
        selections: to_aggregate_selections(
            &field.type_().unmodified_type(),
            query_field,
            fragment_definitions,
            false,
        )?,
    })
}

fn to_aggregate_selections<'a, T>(
    type_: &__Type,
    query_field: &graphql_parser::query::Field<'a, T>,
    fragment_definitions: &Vec<FragmentDefinition<'a, T>>,
    edge: bool,
) -> GraphQLResult<Vec<AggregateSelection>>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    let type_name = type_.name().unwrap_or_default();
    let field_map = type_.field_map();
    let selection_fields = normalize_selection_set(
        &query_field.selection_set,
        fragment_definitions,
        &[type_name.clone()],
    )
    .map_err(GraphQLError::translation)?;

    let mut selections = vec![];
    for selection_field in selection_fields {
        let field_name = selection_field.name.as_ref();
        let alias = alias_or_name(selection_field);
        let field = field_map
            .get(field_name)
            .ok_or_else(|| GraphQLError::field_not_found(field_name, type_name.as_str()))?;
        restrict_allowed_arguments(field, selection_field)?;

        let selection = match (&field.source, field_name) {
            (Some(FieldSource::Primitive(p)), _) => AggregateSelection::Field {
                alias,
                field: Arc::clone(p),
                edge,
                functions: to_aggregate_functions(&field.type_().unmodified_type(), selection_field, fragment_definitions)?,
            },
            (None, introspection::TYPENAME) => AggregateSelection::Typename {
                alias,
                typename: type_name.clone(),
            },
            (None, aggregate::COUNT) => AggregateSelection::Count { alias },
            (None, connection::NODE) => AggregateSelection::Node {
                alias,
                selections: to_aggregate_selections(
                    &field.type_().unmodified_type(),
                    selection_field,
                    fragment_definitions,
                    false,
                )?,
            },
            (None, connection::EDGE) => AggregateSelection::Edge {
                alias,
                selections: to_aggregate_selections(
                    &field.type_().unmodified_type(),
                    selection_field,
                    fragment_definitions,
                    true,
                )?,
            },
            _ => {
                return Err(GraphQLError::translation(format!(
                    "unexpected field {} on {}",
                    field_name, type_name
                )))
            }
        };
        selections.push(selection);
    }
    Ok(selections)
}

fn to_aggregate_functions<'a, T>(
    type_: &__Type,
    query_field: &graphql_parser::query::Field<'a, T>,
    fragment_definitions: &Vec<FragmentDefinition<'a, T>>,
) -> GraphQLResult<Vec<AggregateFunctionSelection>>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    let type_name = type_.name().unwrap_or_default();
    let field_map = type_.field_map();
    let selection_fields = normalize_selection_set(
        &query_field.selection_set,
        fragment_definitions,
        &[type_name.clone()],
    )
    .map_err(GraphQLError::translation)?;

    let mut res = vec![];
    for selection_field in selection_fields {
        let field_name = selection_field.name.as_ref();
        let alias = alias_or_name(selection_field);
        if !field_map.contains_key(field_name) {
            return Err(GraphQLError::field_not_found(field_name, type_name.as_str()));
        }
        res.push(match AggregateFunction::from_name(field_name) {
            Some(function) => AggregateFunctionSelection::Function { alias, function },
            None => AggregateFunctionSelection::Typename {
                alias,
                typename: type_name.clone(),
            },
        });
    }
    Ok(res)
}

fn to_connection_builder<'a, T>(
    model: &Arc<EntityModel>,
    field: &__Field,
    source: ConnectionBuilderSource,
    query_field: &graphql_parser::query::Field<'a, T>,
    variables: &serde_json::Value,
    fragment_definitions: &Vec<FragmentDefinition<'a, T>>,
) -> GraphQLResult<ConnectionBuilder>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    restrict_allowed_arguments(field, query_field)?;

    let sort_value = read_argument(args::SORT, field, query_field, variables)?;
    let (filter, sort, targets) = match &source {
        ConnectionBuilderSource::Root(node) => (
            TargetFilter {
                common: read_filter(field, query_field, variables)?,
                members: None,
            },
            read_sort(&sort_value, &node.primitives().cloned().collect::<Vec<_>>())?,
            vec![Arc::clone(node)],
        ),
        ConnectionBuilderSource::Relation { field: rel, .. } => {
            let filter = read_target_filter(field, &rel.target, query_field, variables)?;
            let node_fields = target_primitives(model, &rel.target);
            let edge_fields: Vec<Arc<PrimitiveField>> = model
                .properties_of(rel)
                .map(|x| x.fields.clone())
                .unwrap_or_default();
            let mut sort = vec![];
            for item in sort_value.iter_list() {
                if let Some(kv) = item.as_object() {
                    for (k, v) in kv {
                        match k.as_str() {
                            connection::NODE => sort.extend(read_sort_object(v, &node_fields, false)?),
                            connection::EDGE => sort.extend(read_sort_object(v, &edge_fields, true)?),
                            _ => return Err(GraphQLError::translation(format!("Invalid sort field \"{}\"", k))),
                        }
                    }
                }
            }
            let targets = model
                .concrete_nodes(&rel.target)
                .into_iter()
                .filter(|x| filter.includes(&x.name))
                .collect();
            (filter, sort, targets)
        }
    };

    let first = read_non_negative(&read_argument(args::FIRST, field, query_field, variables)?, args::FIRST)?;
    let offset = match read_argument(args::AFTER, field, query_field, variables)? {
        gson::Value::String(cursor) => decode_cursor(&cursor)? + 1,
        _ => 0,
    };

    let connection_type = field.type_().unmodified_type();
    let type_name = connection_type.name().unwrap_or_default();
    let field_map = connection_type.field_map();
    let selection_fields = normalize_selection_set(
        &query_field.selection_set,
        fragment_definitions,
        &[type_name.clone()],
    )
    .map_err(GraphQLError::translation)?;

    let mut selections = vec![];
    for selection_field in selection_fields {
        let field_name = selection_field.name.as_ref();
        let alias = alias_or_name(selection_field);
        let sub_field = field_map
            .get(field_name)
            .ok_or_else(|| GraphQLError::field_not_found(field_name, type_name.as_str()))?;
        restrict_allowed_arguments(sub_field, selection_field)?;

        selections.push(match field_name {
            connection::TOTAL_COUNT => ConnectionSelection::TotalCount { alias },
            connection::EDGES => ConnectionSelection::Edges {
                alias,
                selections: to_edge_selections(
                    model,
                    &sub_field.type_().unmodified_type(),
                    &targets,
                    selection_field,
                    variables,
                    fragment_definitions,
                )?,
            },
            connection::PAGE_INFO => ConnectionSelection::PageInfo {
                alias,
                selections: to_page_info_selections(selection_field, fragment_definitions)?,
            },
            _ => ConnectionSelection::Typename {
                alias,
                typename: type_name.clone(),
            },
        });
    }

    Ok(ConnectionBuilder {
        alias: alias_or_name(query_field),
        source,
        filter,
        sort,
        first,
        offset,
        targets,
        selections,
    })
}

fn to_edge_selections<'a, T>(
    model: &Arc<EntityModel>,
    edge_type: &__Type,
    targets: &[Arc<Node>],
    query_field: &graphql_parser::query::Field<'a, T>,
    variables: &serde_json::Value,
    fragment_definitions: &Vec<FragmentDefinition<'a, T>>,
) -> GraphQLResult<Vec<EdgeSelection>>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    let type_name = edge_type.name().unwrap_or_default();
    let field_map = edge_type.field_map();
    let selection_fields = normalize_selection_set(
        &query_field.selection_set,
        fragment_definitions,
        &[type_name.clone()],
    )
    .map_err(GraphQLError::translation)?;

    let mut selections = vec![];
    for selection_field in selection_fields {
        let field_name = selection_field.name.as_ref();
        let alias = alias_or_name(selection_field);
        let field = field_map
            .get(field_name)
            .ok_or_else(|| GraphQLError::field_not_found(field_name, type_name.as_str()))?;
        restrict_allowed_arguments(field, selection_field)?;

        selections.push(match (&field.source, field_name) {
            (Some(FieldSource::Primitive(p)), _) => EdgeSelection::Property {
                alias,
                field: Arc::clone(p),
            },
            (None, connection::CURSOR) => EdgeSelection::Cursor { alias },
            (None, connection::NODE) => {
                let mut node_builders = vec![];
                for target in targets {
                    node_builders.push(to_node_builder(
                        model,
                        target,
                        selection_field,
                        variables,
                        fragment_definitions,
                    )?);
                }
                EdgeSelection::Node {
                    alias,
                    targets: node_builders,
                }
            }
            _ => EdgeSelection::Typename {
                alias,
                typename: type_name.clone(),
            },
        });
    }
    Ok(selections)
}

fn to_page_info_selections<'a, T>(
    query_field: &graphql_parser::query::Field<'a, T>,
    fragment_definitions: &Vec<FragmentDefinition<'a, T>>,
) -> GraphQLResult<Vec<PageInfoSelection>>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    let type_ = __Type::PageInfo(PageInfoType);
    let type_name = type_.name().unwrap_or_default();
    let field_map = type_.field_map();
    let selection_fields = normalize_selection_set(
        &query_field.selection_set,
        fragment_definitions,
        &[type_name.clone()],
    )
    .map_err(GraphQLError::translation)?;

    let mut selections = vec![];
    for selection_field in selection_fields {
        let field_name = selection_field.name.as_ref();
        let alias = alias_or_name(selection_field);
        if !field_map.contains_key(field_name) {
            return Err(GraphQLError::field_not_found(field_name, type_name.as_str()));
        }
        selections.push(match field_name {
            page_info::HAS_NEXT_PAGE => PageInfoSelection::HasNextPage { alias },
            page_info::HAS_PREVIOUS_PAGE => PageInfoSelection::HasPreviousPage { alias },
            page_info::START_CURSOR => PageInfoSelection::StartCursor { alias },
            page_info::END_CURSOR => PageInfoSelection::EndCursor { alias },
            _ => PageInfoSelection::Typename {
                alias,
                typename: type_name.clone(),
            },
        });
    }
    Ok(selections)
}

fn to_info_selections<'a, T>(
    info_type: &__Type,
    query_field: &graphql_parser::query::Field<'a, T>,
    fragment_definitions: &Vec<FragmentDefinition<'a, T>>,
) -> GraphQLResult<Vec<InfoSelection>>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    let type_name = info_type.name().unwrap_or_default();
    let field_map = info_type.field_map();
    let selection_fields = normalize_selection_set(
        &query_field.selection_set,
        fragment_definitions,
        &[type_name.clone()],
    )
    .map_err(GraphQLError::translation)?;

    let mut selections = vec![];
    for selection_field in selection_fields {
        let field_name = selection_field.name.as_ref();
        let alias = alias_or_name(selection_field);
        if !field_map.contains_key(field_name) {
            return Err(GraphQLError::field_not_found(field_name, type_name.as_str()));
        }
        selections.push(match field_name {
            mutation_names::BOOKMARK => InfoSelection::Bookmark { alias },
            introspection::TYPENAME => InfoSelection::Typename {
                alias,
                typename: type_name.clone(),
            },
            counter => InfoSelection::Counter {
                alias,
                counter: counter.to_string(),
            },
        });
    }
    Ok(selections)
}

fn to_mutation_response_selections<'a, T>(
    model: &Arc<EntityModel>,
    node: &Arc<Node>,
    field: &__Field,
    query_field: &graphql_parser::query::Field<'a, T>,
    variables: &serde_json::Value,
    fragment_definitions: &Vec<FragmentDefinition<'a, T>>,
) -> GraphQLResult<Vec<MutationResponseSelection>>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    let response_type = field.type_().unmodified_type();
    let type_name = response_type.name().unwrap_or_default();
    let field_map = response_type.field_map();
    let selection_fields = normalize_selection_set(
        &query_field.selection_set,
        fragment_definitions,
        &[type_name.clone()],
    )
    .map_err(GraphQLError::translation)?;

    let mut selections = vec![];
    for selection_field in selection_fields {
        let field_name = selection_field.name.as_ref();
        let alias = alias_or_name(selection_field);
        let sub_field = field_map
            .get(field_name)
            .ok_or_else(|| GraphQLError::field_not_found(field_name, type_name.as_str()))?;
        restrict_allowed_arguments(sub_field, selection_field)?;

        selections.push(match (&sub_field.source, field_name) {
            (Some(FieldSource::Read(_)), _) => MutationResponseSelection::Nodes {
                alias,
                selection: to_node_builder(model, node, selection_field, variables, fragment_definitions)?,
            },
            (None, mutation_names::INFO) => MutationResponseSelection::Info {
                alias,
                selections: to_info_selections(
                    &sub_field.type_().unmodified_type(),
                    selection_field,
                    fragment_definitions,
                )?,
            },
            _ => MutationResponseSelection::Typename {
                alias,
                typename: type_name.clone(),
            },
        });
    }
    Ok(selections)
}

/// Resolves one root field of an operation. `root_type` is `Query` or `Mutation`.
pub fn to_root_builder<'a, T>(
    model: &Arc<EntityModel>,
    root_type: &__Type,
    query_field: &graphql_parser::query::Field<'a, T>,
    variables: &serde_json::Value,
    fragment_definitions: &Vec<FragmentDefinition<'a, T>>,
) -> GraphQLResult<RootBuilder>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    let root_name = root_type.name().unwrap_or_default();
    let field_name = query_field.name.as_ref();
    let alias = alias_or_name(query_field);
    let field_map = root_type.field_map();
    let field = field_map
        .get(field_name)
        .ok_or_else(|| GraphQLError::field_not_found(field_name, root_name.as_str()))?;
    restrict_allowed_arguments(field, query_field)?;

    let builder = match &field.source {
        Some(FieldSource::Read(node)) => {
            let options_value = read_argument(args::OPTIONS, field, query_field, variables)?;
            RootBuilder::Read(ReadBuilder {
                alias,
                node: Arc::clone(node),
                filter: read_filter(field, query_field, variables)?,
                options: read_options(&options_value, &node.primitives().cloned().collect::<Vec<_>>())?,
                selection: to_node_builder(model, node, query_field, variables, fragment_definitions)?,
            })
        }
        Some(FieldSource::Connection(node)) => RootBuilder::Connection(to_connection_builder(
            model,
            field,
            ConnectionBuilderSource::Root(Arc::clone(node)),
            query_field,
            variables,
            fragment_definitions,
        )?),
        Some(FieldSource::Aggregate(node)) => RootBuilder::Aggregate(AggregateBuilder {
            alias,
            node: Arc::clone(node),
            filter: read_filter(field, query_field, variables)?,
            selections: to_aggregate_selections(
                &field.type_().unmodified_type(),
                query_field,
                fragment_definitions,
                false,
            )?,
        }),
        Some(FieldSource::Create(node)) => {
            let input = read_argument(args::INPUT, field, query_field, variables)?;
            let entity = Entity::Node(Arc::clone(node));
            let mut inputs = vec![];
            for item in input.iter_list() {
                inputs.push(read_create(model, &entity, item)?);
            }
            RootBuilder::Create(CreateBuilder {
                alias,
                node: Arc::clone(node),
                inputs,
                selections: to_mutation_response_selections(
                    model,
                    node,
                    field,
                    query_field,
                    variables,
                    fragment_definitions,
                )?,
            })
        }
        Some(FieldSource::Update(node)) => {
            let entity = Entity::Node(Arc::clone(node));
            let update_value = read_argument(args::UPDATE, field, query_field, variables)?;
            let mut update = read_update(model, &entity, &update_value)?;
            for (arg_name, kind) in [
                (args::DISCONNECT, NestedInput::Disconnect),
                (args::DELETE, NestedInput::Delete),
                (args::CREATE, NestedInput::Create),
                (args::CONNECT, NestedInput::Connect),
                (args::CONNECT_OR_CREATE, NestedInput::ConnectOrCreate),
            ] {
                let value = read_argument(arg_name, field, query_field, variables)?;
                update.nested.extend(read_node_relations(model, node, &value, kind)?);
            }
            order_nested(&mut update.nested);
            RootBuilder::Update(UpdateBuilder {
                alias,
                node: Arc::clone(node),
                filter: read_filter(field, query_field, variables)?,
                update,
                selections: to_mutation_response_selections(
                    model,
                    node,
                    field,
                    query_field,
                    variables,
                    fragment_definitions,
                )?,
            })
        }
        Some(FieldSource::Delete(node)) => {
            let delete_value = read_argument(args::DELETE, field, query_field, variables)?;
            let mut nested = read_node_relations(model, node, &delete_value, NestedInput::Delete)?;
            order_nested(&mut nested);
            RootBuilder::Delete(DeleteBuilder {
                alias,
                node: Arc::clone(node),
                filter: read_filter(field, query_field, variables)?,
                nested,
                selections: to_info_selections(
                    &field.type_().unmodified_type(),
                    query_field,
                    fragment_definitions,
                )?,
            })
        }
        None if field_name == introspection::TYPENAME => RootBuilder::Typename {
            alias,
            typename: root_name,
        },
        _ => {
            return Err(GraphQLError::translation(format!(
                "Field \"{}\" can not be selected on {}",
                field_name, root_name
            )))
        }
    };
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Config;
    use graphql_parser::query::parse_query;
    use graphql_parser::schema::parse_schema;
    use serde_json::json;
    use test_case::test_case;

    const TYPE_DEFS: &str = r#"
        type Movie {
            title: String!
            released: Int
            actors: [Actor!]! @relationship(type: "ACTED_IN", direction: IN, properties: "ActedIn")
            search: [Search!]! @relationship(type: "SEARCH", direction: OUT)
        }
        type Actor { name: String! }
        type Genre { name: String }
        union Search = Movie | Genre
        type ActedIn @relationshipProperties { role: String, screenTime: Int }
    "#;

    fn model() -> Arc<EntityModel> {
        let doc = parse_schema::<String>(TYPE_DEFS).unwrap();
        Arc::new(EntityModel::build(&doc, &Config::default()).unwrap())
    }

    fn build(query: &str, variables: serde_json::Value) -> GraphQLResult<Vec<RootBuilder>> {
        let model = model();
        let document = parse_query::<&str>(query).unwrap();
        let schema = __Schema::new(Arc::clone(&model));
        let mut fragments = vec![];
        let mut operation = None;
        for def in &document.definitions {
            match def {
                Definition::Fragment(x) => fragments.push(x.clone()),
                Definition::Operation(x) => operation = Some(x.clone()),
            }
        }
        let (root_type, selection_set) = match operation.unwrap() {
            OperationDefinition::Query(q) => (schema.query_type(), q.selection_set),
            OperationDefinition::SelectionSet(s) => (schema.query_type(), s),
            OperationDefinition::Mutation(m) => (schema.mutation_type().unwrap(), m.selection_set),
            OperationDefinition::Subscription(_) => unreachable!(),
        };
        let fields = normalize_selection_set(&selection_set, &fragments, &[root_type.name().unwrap()]).unwrap();
        fields
            .into_iter()
            .map(|f| to_root_builder(&model, &root_type, f, &variables, &fragments))
            .collect()
    }

    #[test]
    fn cursors_encode_array_offsets() {
        assert_eq!(encode_cursor(0), "YXJyYXljb25uZWN0aW9uOjA=");
        assert_eq!(decode_cursor("YXJyYXljb25uZWN0aW9uOjA=").unwrap(), 0);
        assert!(decode_cursor("bm90LWEtY3Vyc29y").is_err());
    }

    #[test]
    fn read_collects_filter_options_and_selection() {
        let roots = build(
            r#"{ movies(where: {title: "Heat"}, options: {sort: [{released: DESC}], limit: 5}) { title t: title } }"#,
            json!({}),
        )
        .unwrap();
        match &roots[0] {
            RootBuilder::Read(read) => {
                assert_eq!(read.filter.elems.len(), 1);
                assert_eq!(read.options.limit, Some(5));
                assert_eq!(read.options.sort[0].direction, SortDirection::Desc);
                assert_eq!(read.selection.selections.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn union_filters_restrict_traversed_members() {
        let roots = build(
            r#"{ movies { search(where: {Genre: {name: "Action"}}) { ... on Genre { name } ... on Movie { title } } } }"#,
            json!({}),
        )
        .unwrap();
        let read = match &roots[0] {
            RootBuilder::Read(x) => x,
            other => panic!("unexpected {:?}", other),
        };
        match &read.selection.selections[0] {
            NodeSelection::Relation(rel) => {
                assert_eq!(rel.targets.len(), 1);
                assert_eq!(rel.targets[0].node.name, "Genre");
                assert_eq!(rel.targets[0].selections.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn connection_reads_after_cursor_and_edge_sort() {
        let roots = build(
            r#"query($after: String) { movies { actorsConnection(first: 2, after: $after, sort: [{edge: {role: ASC}}]) {
                totalCount edges { cursor role node { name } } pageInfo { hasNextPage }
            } } }"#,
            json!({"after": encode_cursor(3)}),
        )
        .unwrap();
        let read = match &roots[0] {
            RootBuilder::Read(x) => x,
            other => panic!("unexpected {:?}", other),
        };
        match &read.selection.selections[0] {
            NodeSelection::RelationConnection(conn) => {
                assert_eq!(conn.first, Some(2));
                assert_eq!(conn.offset, 4);
                assert!(conn.sort[0].edge);
                assert_eq!(conn.edge_fields()[0].name, "role");
                assert_eq!(conn.node_selection(&conn.targets[0]).selections.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn relation_aggregates_split_node_and_edge() {
        let roots = build(
            r#"{ movies { actorsAggregate { count node { name { shortest } } edge { screenTime { sum } } } } }"#,
            json!({}),
        )
        .unwrap();
        let read = match &roots[0] {
            RootBuilder::Read(x) => x,
            other => panic!("unexpected {:?}", other),
        };
        match &read.selection.selections[0] {
            NodeSelection::RelationAggregate(agg) => {
                assert_eq!(agg.selections.len(), 3);
                match &agg.selections[2] {
                    AggregateSelection::Edge { selections, .. } => match &selections[0] {
                        AggregateSelection::Field { edge, functions, .. } => {
                            assert!(*edge);
                            assert!(matches!(
                                functions[0],
                                AggregateFunctionSelection::Function {
                                    function: AggregateFunction::Sum,
                                    ..
                                }
                            ));
                        }
                        other => panic!("unexpected {:?}", other),
                    },
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn update_merges_root_relationship_arguments() {
        let roots = build(
            r#"mutation { updateMovies(
                update: {title: "Heat"},
                connect: {actors: [{where: {node: {name: "Al"}}}]},
                disconnect: {actors: [{where: {node: {name: "Bob"}}}]}
            ) { info { nodesCreated } movies { title } } }"#,
            json!({}),
        )
        .unwrap();
        match &roots[0] {
            RootBuilder::Update(update) => {
                assert_eq!(update.update.properties.len(), 1);
                assert!(matches!(update.update.nested[0].node, MutationNode::Disconnect { .. }));
                assert!(matches!(update.update.nested[1].node, MutationNode::Connect { .. }));
                assert_eq!(update.selections.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test_case(r#"{ movies { rating } }"#, "Unknown field \"rating\" on type \"Movie\""; "unknown field")]
    #[test_case(r#"{ movies(first: 1) { title } }"#, "Input contains extra keys [\"first\"]"; "extra argument")]
    #[test_case(r#"{ moviesConnection(after: "bad") { totalCount } }"#, "Invalid cursor \"bad\""; "bad cursor")]
    #[test_case(r#"{ movies(options: {limit: -1}) { title } }"#, "Argument \"limit\" must be a non-negative integer"; "negative limit")]
    fn invalid_selections_are_rejected(query: &str, message: &str) {
        let err = build(query, json!({})).unwrap_err();
        assert_eq!(err.to_string(), message);
    }
}
