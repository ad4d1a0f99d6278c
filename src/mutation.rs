//! Mutation input trees.
//!
//! Validated `input`, `update`, `connect`, `disconnect`, `create`, `delete` and
//! `connectOrCreate` arguments are read into [`MutationNode`]s. Each node knows
//! its target types and carries its own children, so the statement compiler is
//! a plain recursive descent over this tree.

use crate::constants::{args, mutation as mutation_names};
use crate::entity::*;
use crate::error::{GraphQLError, GraphQLResult};
use crate::filter::{create_filters, primitive_value, FilterBuilder};
use crate::graphql::*;
use crate::gson;
use crate::inputs::*;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Increment,
    Decrement,
    Add,
    Subtract,
    Multiply,
    Divide,
    Push,
    Pop,
}

impl AssignOp {
    const SUFFIXES: &'static [(&'static str, AssignOp)] = &[
        ("_INCREMENT", AssignOp::Increment),
        ("_DECREMENT", AssignOp::Decrement),
        ("_ADD", AssignOp::Add),
        ("_SUBTRACT", AssignOp::Subtract),
        ("_MULTIPLY", AssignOp::Multiply),
        ("_DIVIDE", AssignOp::Divide),
        ("_PUSH", AssignOp::Push),
        ("_POP", AssignOp::Pop),
    ];

    /// Splits `views_INCREMENT` into `("views", Increment)`
    pub fn split_key(key: &str) -> (&str, AssignOp) {
        for (suffix, op) in Self::SUFFIXES {
            if let Some(field) = key.strip_suffix(suffix) {
                if !field.is_empty() {
                    return (field, *op);
                }
            }
        }
        (key, AssignOp::Set)
    }
}

#[derive(Clone, Debug)]
pub struct PropertyAssignment {
    pub field: Arc<PrimitiveField>,
    pub op: AssignOp,
    pub value: serde_json::Value,
}

#[derive(Clone, Debug)]
pub struct CreateInput {
    pub node: Arc<Node>,
    pub properties: Vec<PropertyAssignment>,
    pub nested: Vec<NestedMutation>,
}

#[derive(Clone, Debug, Default)]
pub struct UpdateInput {
    pub properties: Vec<PropertyAssignment>,
    pub nested: Vec<NestedMutation>,
}

/// One operation through a relationship field of the parent
#[derive(Clone, Debug)]
pub struct NestedMutation {
    pub field: Arc<RelationField>,
    pub node: MutationNode,
}

#[derive(Clone, Debug)]
pub enum MutationNode {
    Create {
        input: CreateInput,
        edge: Vec<PropertyAssignment>,
    },
    Connect {
        targets: Vec<Arc<Node>>,
        filter: FilterBuilder,
        edge: Vec<PropertyAssignment>,
        nested: Vec<NestedMutation>,
        overwrite: bool,
    },
    ConnectOrCreate {
        target: Arc<Node>,
        unique: Vec<PropertyAssignment>,
        on_create: Vec<PropertyAssignment>,
        edge: Vec<PropertyAssignment>,
    },
    Update {
        targets: Vec<Arc<Node>>,
        /// Connection filter with `node` and `edge` members
        filter: FilterBuilder,
        update: UpdateInput,
        edge: Vec<PropertyAssignment>,
    },
    Delete {
        targets: Vec<Arc<Node>>,
        filter: FilterBuilder,
        nested: Vec<NestedMutation>,
    },
    Disconnect {
        targets: Vec<Arc<Node>>,
        filter: FilterBuilder,
        nested: Vec<NestedMutation>,
    },
}

impl MutationNode {
    /// Removals run before additions so cardinality checks observe the final state
    pub fn rank(&self) -> u8 {
        match self {
            Self::Disconnect { .. } => 0,
            Self::Delete { .. } => 1,
            Self::Update { .. } => 2,
            Self::Create { .. } => 3,
            Self::Connect { .. } => 4,
            Self::ConnectOrCreate { .. } => 5,
        }
    }
}

/// Stable sort by [`MutationNode::rank`], keeping input order within a rank
pub fn order_nested(nested: &mut [NestedMutation]) {
    nested.sort_by_key(|x| x.node.rank());
}

fn translation_err(e: String) -> GraphQLError {
    GraphQLError::translation(e)
}

fn object<'v>(value: &'v gson::Value, context: &str) -> GraphQLResult<Option<&'v indexmap::IndexMap<String, gson::Value>>> {
    match value {
        gson::Value::Absent | gson::Value::Null => Ok(None),
        gson::Value::Object(x) => Ok(Some(x)),
        _ => Err(GraphQLError::translation(format!("Expected an object for {}", context))),
    }
}

fn concrete_targets(model: &EntityModel, entity: &Entity) -> Vec<Arc<Node>> {
    match entity {
        Entity::Node(x) => vec![Arc::clone(x)],
        Entity::Interface(x) => x
            .implementations
            .iter()
            .filter_map(|n| model.nodes.get(n).cloned())
            .collect(),
        Entity::Union(x) => x
            .members
            .iter()
            .filter_map(|n| model.nodes.get(n).cloned())
            .collect(),
        Entity::Properties(_) => vec![],
    }
}

/// Pairs each union member with its part of a member keyed value. Other
/// relationships have a single member and take the value as is.
fn member_values<'v>(
    model: &EntityModel,
    relation: &RelationRef,
    value: &'v gson::Value,
) -> GraphQLResult<Vec<(MemberRef, &'v gson::Value)>> {
    let all = members(model, relation);
    if !relation.field.target.is_union() {
        return Ok(all.into_iter().map(|m| (m, value)).collect());
    }
    let mut res = vec![];
    if let Some(kv) = object(value, &relation.field.name)? {
        for (k, v) in kv {
            if v.is_unset() {
                continue;
            }
            let member = all
                .iter()
                .find(|m| m.target.name() == k)
                .ok_or_else(|| GraphQLError::translation(format!("Unknown union member \"{}\"", k)))?;
            res.push((member.clone(), v));
        }
    }
    Ok(res)
}

fn field_lookup(entity: &Entity, name: &str) -> GraphQLResult<Arc<PrimitiveField>> {
    entity
        .primitives()
        .into_iter()
        .find(|x| x.name == name)
        .ok_or_else(|| GraphQLError::field_not_found(name, entity.name()))
}

/// Reads plain property values, e.g. edge properties or `onCreate` nodes
pub fn read_assignments(entity: &Entity, value: &gson::Value) -> GraphQLResult<Vec<PropertyAssignment>> {
    let mut res = vec![];
    if let Some(kv) = object(value, entity.name())? {
        for (k, v) in kv {
            if v.is_absent() || k == mutation_names::EMPTY_INPUT {
                continue;
            }
            let (name, op) = AssignOp::split_key(k);
            let field = field_lookup(entity, name)?;
            let value = match op {
                // list lengths are plain integers
                AssignOp::Pop => gson::gson_to_json(v).map_err(translation_err)?,
                _ => primitive_value(&field, v)?,
            };
            res.push(PropertyAssignment { field, op, value });
        }
    }
    Ok(res)
}

/// `XCreateInput`
pub fn read_create(model: &Arc<EntityModel>, entity: &Entity, value: &gson::Value) -> GraphQLResult<CreateInput> {
    let node = match entity {
        Entity::Node(node) => Arc::clone(node),
        // interface creates are keyed by the implementation to create
        Entity::Interface(_) => {
            let kv = object(value, entity.name())?.ok_or_else(|| {
                GraphQLError::translation(format!("Missing input for {}", entity.name()))
            })?;
            let (name, inner) = kv
                .iter()
                .find(|(_, v)| !v.is_unset())
                .ok_or_else(|| GraphQLError::translation(format!("Missing input for {}", entity.name())))?;
            if kv.values().filter(|v| !v.is_unset()).count() > 1 {
                return Err(GraphQLError::translation(format!(
                    "Exactly one implementation of {} may be created per input",
                    entity.name()
                )));
            }
            let node = model.node(name)?;
            return read_create(model, &Entity::Node(Arc::clone(node)), inner);
        }
        _ => {
            return Err(GraphQLError::translation(format!(
                "Cannot create {}",
                entity.name()
            )))
        }
    };

    let mut properties = vec![];
    let mut nested = vec![];
    if let Some(kv) = object(value, &node.name)? {
        for (k, v) in kv {
            if v.is_absent() || k == mutation_names::EMPTY_INPUT {
                continue;
            }
            if let Some(rel) = node.relation(k) {
                let relation = RelationRef::new(&node.name, rel);
                for (member, member_value) in member_values(model, &relation, v)? {
                    nested.extend(read_field_input(model, &member, member_value)?);
                }
                continue;
            }
            let field = node
                .primitive(k)
                .ok_or_else(|| GraphQLError::field_not_found(k.as_str(), node.name.as_str()))?;
            properties.push(PropertyAssignment {
                field: Arc::clone(field),
                op: AssignOp::Set,
                value: primitive_value(field, v)?,
            });
        }
    }
    order_nested(&mut nested);
    Ok(CreateInput {
        node,
        properties,
        nested,
    })
}

fn edge_entity(model: &EntityModel, member: &MemberRef) -> Option<Entity> {
    model
        .properties_of(&member.relation.field)
        .map(|p| Entity::Properties(Arc::clone(p)))
}

fn read_edge(model: &EntityModel, member: &MemberRef, value: &gson::Value) -> GraphQLResult<Vec<PropertyAssignment>> {
    match edge_entity(model, member) {
        Some(entity) => read_assignments(&entity, value),
        None => Ok(vec![]),
    }
}

/// `XRelFieldInput`: `{ create, connect, connectOrCreate }`
fn read_field_input(model: &Arc<EntityModel>, member: &MemberRef, value: &gson::Value) -> GraphQLResult<Vec<NestedMutation>> {
    let mut res = vec![];
    res.extend(read_creates(model, member, value.get(args::CREATE))?);
    res.extend(read_connects(model, member, value.get(args::CONNECT))?);
    res.extend(read_connect_or_creates(model, member, value.get(args::CONNECT_OR_CREATE))?);
    Ok(res)
}

fn nested(member: &MemberRef, node: MutationNode) -> NestedMutation {
    NestedMutation {
        field: Arc::clone(&member.relation.field),
        node,
    }
}

/// `[XRelCreateFieldInput!]`: `{ node, edge }`
fn read_creates(model: &Arc<EntityModel>, member: &MemberRef, value: &gson::Value) -> GraphQLResult<Vec<NestedMutation>> {
    let mut res = vec![];
    for item in value.iter_list() {
        let input = read_create(model, &member.target, item.get(args::NODE))?;
        let edge = read_edge(model, member, item.get(args::EDGE))?;
        res.push(nested(member, MutationNode::Create { input, edge }));
    }
    Ok(res)
}

/// `[XRelConnectFieldInput!]`: `{ where: { node }, connect, edge, overwrite }`
fn read_connects(model: &Arc<EntityModel>, member: &MemberRef, value: &gson::Value) -> GraphQLResult<Vec<NestedMutation>> {
    let mut res = vec![];
    let where_type = input_type(model, InputKind::Where(member.target.clone()));
    for item in value.iter_list() {
        let filter = FilterBuilder {
            elems: create_filters(item.get(args::WHERE).get(args::NODE), &where_type)?,
        };
        let mut inner = vec![];
        if let Some(target) = member.target_node() {
            for connect in item.get(args::CONNECT).iter_list() {
                inner.extend(read_node_relations(model, target, connect, NestedInput::Connect)?);
            }
        }
        order_nested(&mut inner);
        res.push(nested(
            member,
            MutationNode::Connect {
                targets: concrete_targets(model, &member.target),
                filter,
                edge: read_edge(model, member, item.get(args::EDGE))?,
                nested: inner,
                overwrite: item.get(args::OVERWRITE).as_bool().unwrap_or(true),
            },
        ));
    }
    Ok(res)
}

/// `[XRelConnectOrCreateFieldInput!]`: `{ where: { node }, onCreate: { node, edge } }`
fn read_connect_or_creates(
    model: &Arc<EntityModel>,
    member: &MemberRef,
    value: &gson::Value,
) -> GraphQLResult<Vec<NestedMutation>> {
    let mut res = vec![];
    for item in value.iter_list() {
        let target = member.target_node().ok_or_else(|| {
            GraphQLError::translation(format!(
                "connectOrCreate is not supported on {}",
                member.target.name()
            ))
        })?;
        let entity = Entity::Node(Arc::clone(target));
        let unique = read_assignments(&entity, item.get(args::WHERE).get(args::NODE))?;
        if unique.is_empty() {
            return Err(GraphQLError::translation(format!(
                "connectOrCreate on {} requires a unique field in where",
                target.name
            )));
        }
        let on_create = item.get(args::ON_CREATE);
        res.push(nested(
            member,
            MutationNode::ConnectOrCreate {
                target: Arc::clone(target),
                unique,
                on_create: read_assignments(&entity, on_create.get(args::NODE))?,
                edge: read_edge(model, member, on_create.get(args::EDGE))?,
            },
        ));
    }
    Ok(res)
}

fn connection_where_type(model: &Arc<EntityModel>, member: &MemberRef) -> __Type {
    match member.union_member {
        true => input_type(model, InputKind::MemberConnectionWhere(member.clone())),
        false => input_type(model, InputKind::ConnectionWhere(member.relation.clone())),
    }
}

fn read_connection_filter(model: &Arc<EntityModel>, member: &MemberRef, value: &gson::Value) -> GraphQLResult<FilterBuilder> {
    Ok(FilterBuilder {
        elems: create_filters(value, &connection_where_type(model, member))?,
    })
}

/// `[XRelDisconnectFieldInput!]`: `{ where, disconnect }`
fn read_disconnects(model: &Arc<EntityModel>, member: &MemberRef, value: &gson::Value) -> GraphQLResult<Vec<NestedMutation>> {
    let mut res = vec![];
    for item in value.iter_list() {
        let mut inner = vec![];
        if let Some(target) = member.target_node() {
            for disconnect in item.get(args::DISCONNECT).iter_list() {
                inner.extend(read_node_relations(model, target, disconnect, NestedInput::Disconnect)?);
            }
        }
        order_nested(&mut inner);
        res.push(nested(
            member,
            MutationNode::Disconnect {
                targets: concrete_targets(model, &member.target),
                filter: read_connection_filter(model, member, item.get(args::WHERE))?,
                nested: inner,
            },
        ));
    }
    Ok(res)
}

/// `[XRelDeleteFieldInput!]`: `{ where, delete }`
fn read_deletes(model: &Arc<EntityModel>, member: &MemberRef, value: &gson::Value) -> GraphQLResult<Vec<NestedMutation>> {
    let mut res = vec![];
    for item in value.iter_list() {
        let mut inner = vec![];
        if let Some(target) = member.target_node() {
            for delete in item.get(args::DELETE).iter_list() {
                inner.extend(read_node_relations(model, target, delete, NestedInput::Delete)?);
            }
        }
        order_nested(&mut inner);
        res.push(nested(
            member,
            MutationNode::Delete {
                targets: concrete_targets(model, &member.target),
                filter: read_connection_filter(model, member, item.get(args::WHERE))?,
                nested: inner,
            },
        ));
    }
    Ok(res)
}

/// `[XRelUpdateFieldInput!]`: `{ where, update: { node, edge }, connect, disconnect, create, delete, connectOrCreate }`
fn read_update_fields(model: &Arc<EntityModel>, member: &MemberRef, value: &gson::Value) -> GraphQLResult<Vec<NestedMutation>> {
    let mut res = vec![];
    for item in value.iter_list() {
        let update = item.get(args::UPDATE);
        if !update.is_unset() {
            let node_update = read_update(model, &member.target, update.get(args::NODE))?;
            let edge = match edge_entity(model, member) {
                Some(entity) => read_assignments(&entity, update.get(args::EDGE))?,
                None => vec![],
            };
            res.push(nested(
                member,
                MutationNode::Update {
                    targets: concrete_targets(model, &member.target),
                    filter: read_connection_filter(model, member, item.get(args::WHERE))?,
                    update: node_update,
                    edge,
                },
            ));
        }
        res.extend(read_disconnects(model, member, item.get(args::DISCONNECT))?);
        res.extend(read_deletes(model, member, item.get(args::DELETE))?);
        res.extend(read_creates(model, member, item.get(args::CREATE))?);
        res.extend(read_connects(model, member, item.get(args::CONNECT))?);
        res.extend(read_connect_or_creates(model, member, item.get(args::CONNECT_OR_CREATE))?);
    }
    Ok(res)
}

/// `XUpdateInput`: properties with operators and relationship update fields
pub fn read_update(model: &Arc<EntityModel>, entity: &Entity, value: &gson::Value) -> GraphQLResult<UpdateInput> {
    let mut res = UpdateInput::default();
    let kv = match object(value, entity.name())? {
        Some(kv) => kv,
        None => return Ok(res),
    };
    for (k, v) in kv {
        if v.is_absent() || k == mutation_names::EMPTY_INPUT {
            continue;
        }
        let relation = entity.fields().into_iter().find_map(|f| match f {
            EntityField::Relation(r) if r.name == *k => Some(r),
            _ => None,
        });
        match relation {
            Some(rel) => {
                let relation = RelationRef::new(entity.name(), &rel);
                for (member, member_value) in member_values(model, &relation, v)? {
                    res.nested.extend(read_update_fields(model, &member, member_value)?);
                }
            }
            None => {
                let (name, op) = AssignOp::split_key(k);
                let field = field_lookup(entity, name)?;
                let value = match op {
                    AssignOp::Pop => gson::gson_to_json(v).map_err(translation_err)?,
                    _ => primitive_value(&field, v)?,
                };
                res.properties.push(PropertyAssignment { field, op, value });
            }
        }
    }
    order_nested(&mut res.nested);
    Ok(res)
}

/// Node level inputs keyed by relationship name: the root `connect`,
/// `disconnect`, `create`, `delete` and `connectOrCreate` arguments and their
/// nested counterparts
pub fn read_node_relations(
    model: &Arc<EntityModel>,
    node: &Arc<Node>,
    value: &gson::Value,
    kind: NestedInput,
) -> GraphQLResult<Vec<NestedMutation>> {
    let mut res = vec![];
    let kv = match object(value, &node.name)? {
        Some(kv) => kv,
        None => return Ok(res),
    };
    for (k, v) in kv {
        if v.is_unset() {
            continue;
        }
        let rel = node
            .relation(k)
            .ok_or_else(|| GraphQLError::field_not_found(k.as_str(), node.name.as_str()))?;
        let relation = RelationRef::new(&node.name, rel);
        for (member, member_value) in member_values(model, &relation, v)? {
            res.extend(match kind {
                NestedInput::Create => read_creates(model, &member, member_value)?,
                NestedInput::Connect => read_connects(model, &member, member_value)?,
                NestedInput::Disconnect => read_disconnects(model, &member, member_value)?,
                NestedInput::Delete => read_deletes(model, &member, member_value)?,
                NestedInput::ConnectOrCreate => read_connect_or_creates(model, &member, member_value)?,
            });
        }
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Config;
    use graphql_parser::schema::parse_schema;
    use serde_json::json;

    fn model() -> Arc<EntityModel> {
        let doc = parse_schema::<String>(
            r#"
            type Movie {
                title: String!
                views: Int
                actors: [Actor!]! @relationship(type: "ACTED_IN", direction: IN, properties: "ActedIn")
                director: Person @relationship(type: "DIRECTED", direction: IN)
            }
            type Actor { name: String! @unique }
            type Person { name: String }
            type ActedIn @relationshipProperties { role: String }
            "#,
        )
        .unwrap();
        Arc::new(EntityModel::build(&doc, &Config::default()).unwrap())
    }

    fn gson(value: serde_json::Value) -> gson::Value {
        gson::json_to_gson(&value).unwrap()
    }

    fn movie(model: &Arc<EntityModel>) -> Entity {
        Entity::Node(Arc::clone(&model.nodes["Movie"]))
    }

    #[test]
    fn operator_suffixes_are_split() {
        assert_eq!(AssignOp::split_key("views_INCREMENT"), ("views", AssignOp::Increment));
        assert_eq!(AssignOp::split_key("tags_POP"), ("tags", AssignOp::Pop));
        assert_eq!(AssignOp::split_key("title"), ("title", AssignOp::Set));
    }

    #[test]
    fn create_inputs_split_properties_and_relationships() {
        let model = model();
        let input = read_create(
            &model,
            &movie(&model),
            &gson(json!({
                "title": "Heat",
                "actors": {
                    "connect": [{"where": {"node": {"name": "Al"}}, "edge": {"role": "Vincent"}}],
                    "create": [{"node": {"name": "Bob"}}]
                }
            })),
        )
        .unwrap();
        assert_eq!(input.properties.len(), 1);
        assert_eq!(input.properties[0].value, json!("Heat"));
        // creates are ordered before connects
        assert!(matches!(input.nested[0].node, MutationNode::Create { .. }));
        match &input.nested[1].node {
            MutationNode::Connect { edge, overwrite, .. } => {
                assert_eq!(edge[0].value, json!("Vincent"));
                assert!(*overwrite);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn update_inputs_order_removals_first() {
        let model = model();
        let update = read_update(
            &model,
            &movie(&model),
            &gson(json!({
                "views_INCREMENT": 1,
                "actors": [{
                    "connect": [{"where": {"node": {"name": "Al"}}}],
                    "disconnect": [{"where": {"node": {"name": "Bob"}}}],
                    "update": {"node": {"name": "Carl"}}
                }]
            })),
        )
        .unwrap();
        assert_eq!(update.properties[0].op, AssignOp::Increment);
        let ranks: Vec<u8> = update.nested.iter().map(|x| x.node.rank()).collect();
        assert_eq!(ranks, vec![0, 2, 4]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let model = model();
        let err = read_update(&model, &movie(&model), &gson(json!({"rating": 1}))).unwrap_err();
        assert_eq!(err, GraphQLError::field_not_found("rating", "Movie"));
    }
}
