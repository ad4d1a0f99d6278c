//! Generated input object families.
//!
//! Every input type is identified by an [`InputKind`] and rendered lazily, so
//! only the inputs reachable from a root field argument ever appear in the
//! schema.

use crate::constants::{args, deprecation, logical, mutation as mutation_names};
use crate::directives::NestedOperation;
use crate::entity::*;
use crate::filter::{AggregationFunction, CompareOp, FilterOp, LogicalOp, Quantifier};
use crate::graphql::*;
use std::sync::Arc;

/// A relationship field together with the type declaring it
#[derive(Clone, Debug)]
pub struct RelationRef {
    pub owner: String,
    pub field: Arc<RelationField>,
}

impl RelationRef {
    pub fn new(owner: &str, field: &Arc<RelationField>) -> Self {
        Self {
            owner: owner.to_string(),
            field: Arc::clone(field),
        }
    }

    /// `MovieActors` for `Movie.actors`
    pub fn prefix(&self) -> String {
        format!("{}{}", self.owner, upper_first(&self.field.name))
    }

    /// `MovieActorActors` for `Movie.actors: [Actor!]!`
    pub fn aggregation_prefix(&self) -> String {
        format!(
            "{}{}{}",
            self.owner,
            self.field.target.name(),
            upper_first(&self.field.name)
        )
    }
}

#[derive(Clone, Debug)]
pub enum Entity {
    Node(Arc<Node>),
    Interface(Arc<Interface>),
    Union(Arc<Union>),
    Properties(Arc<RelationshipProperties>),
}

impl Entity {
    pub fn name(&self) -> &str {
        match self {
            Self::Node(x) => &x.name,
            Self::Interface(x) => &x.name,
            Self::Union(x) => &x.name,
            Self::Properties(x) => &x.name,
        }
    }

    /// Entity fields in declaration order
    pub fn fields(&self) -> Vec<EntityField> {
        match self {
            Self::Node(x) => x.fields.clone(),
            Self::Interface(x) => x.fields.clone(),
            Self::Union(_) => vec![],
            Self::Properties(x) => x
                .fields
                .iter()
                .map(|f| EntityField::Primitive(Arc::clone(f)))
                .collect(),
        }
    }

    pub fn primitives(&self) -> Vec<Arc<PrimitiveField>> {
        self.fields()
            .into_iter()
            .filter_map(|x| match x {
                EntityField::Primitive(p) => Some(p),
                _ => None,
            })
            .collect()
    }
}

/// Resolves the entity a relationship field points at
pub fn entity_of(model: &EntityModel, target: &RelationTarget) -> Option<Entity> {
    match target {
        RelationTarget::Node(x) => model.nodes.get(x).cloned().map(Entity::Node),
        RelationTarget::Union { name, .. } => model.unions.get(name).cloned().map(Entity::Union),
        RelationTarget::Interface { name, .. } => {
            model.interfaces.get(name).cloned().map(Entity::Interface)
        }
    }
}

/// One concrete target of a relationship input. Union relationships have one
/// member per union member, named after it.
#[derive(Clone, Debug)]
pub struct MemberRef {
    pub relation: RelationRef,
    pub target: Entity,
    pub union_member: bool,
}

impl MemberRef {
    pub fn prefix(&self) -> String {
        match self.union_member {
            true => format!("{}{}", self.relation.prefix(), self.target.name()),
            false => self.relation.prefix(),
        }
    }

    pub fn target_node(&self) -> Option<&Arc<Node>> {
        match &self.target {
            Entity::Node(x) => Some(x),
            _ => None,
        }
    }

    pub fn supports(&self, op: NestedOperation) -> bool {
        let field = &self.relation.field;
        match op {
            NestedOperation::ConnectOrCreate => {
                field.allows(op)
                    && self
                        .target_node()
                        .map(|x| x.has_unique_fields())
                        .unwrap_or(false)
            }
            _ => field.allows(op),
        }
    }

    /// Create, connect or connectOrCreate, available while creating the owner
    pub fn has_field_input(&self) -> bool {
        self.supports(NestedOperation::Create)
            || self.supports(NestedOperation::Connect)
            || self.supports(NestedOperation::ConnectOrCreate)
    }

    pub fn has_update_field_input(&self) -> bool {
        NestedOperation::all().into_iter().any(|op| self.supports(op))
    }
}

pub fn members(model: &EntityModel, relation: &RelationRef) -> Vec<MemberRef> {
    match entity_of(model, &relation.field.target) {
        Some(Entity::Union(union)) => union
            .members
            .iter()
            .filter_map(|x| model.nodes.get(x))
            .map(|node| MemberRef {
                relation: relation.clone(),
                target: Entity::Node(Arc::clone(node)),
                union_member: true,
            })
            .collect(),
        Some(target) => vec![MemberRef {
            relation: relation.clone(),
            target,
            union_member: false,
        }],
        None => vec![],
    }
}

/// Node level relationship inputs of update mutations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NestedInput {
    Create,
    Connect,
    Disconnect,
    Delete,
    ConnectOrCreate,
}

impl NestedInput {
    fn operation(&self) -> NestedOperation {
        match self {
            Self::Create => NestedOperation::Create,
            Self::Connect => NestedOperation::Connect,
            Self::Disconnect => NestedOperation::Disconnect,
            Self::Delete => NestedOperation::Delete,
            Self::ConnectOrCreate => NestedOperation::ConnectOrCreate,
        }
    }

    fn union_group(&self) -> UnionGroup {
        match self {
            Self::Create => UnionGroup::CreateField,
            Self::Connect => UnionGroup::Connect,
            Self::Disconnect => UnionGroup::Disconnect,
            Self::Delete => UnionGroup::Delete,
            Self::ConnectOrCreate => UnionGroup::ConnectOrCreate,
        }
    }

    fn member_kind(&self, member: MemberRef) -> InputKind {
        match self {
            Self::Create => InputKind::CreateField(member),
            Self::Connect => InputKind::ConnectField(member),
            Self::Disconnect => InputKind::DisconnectField(member),
            Self::Delete => InputKind::DeleteField(member),
            Self::ConnectOrCreate => InputKind::ConnectOrCreateField(member),
        }
    }
}

pub fn has_nested(node: &Node, nested: NestedInput, model: &EntityModel) -> bool {
    node.relations().any(|rel| {
        members(model, &RelationRef::new(&node.name, rel))
            .iter()
            .any(|m| m.supports(nested.operation()))
    })
}

/// Inputs keyed by union member name
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnionGroup {
    Create,
    Update,
    Connect,
    Disconnect,
    Delete,
    CreateField,
    ConnectOrCreate,
}

impl UnionGroup {
    fn suffix(&self) -> &'static str {
        match self {
            Self::Create => "CreateInput",
            Self::Update => "UpdateInput",
            Self::Connect => "ConnectInput",
            Self::Disconnect => "DisconnectInput",
            Self::Delete => "DeleteInput",
            Self::CreateField => "CreateFieldInput",
            Self::ConnectOrCreate => "ConnectOrCreateInput",
        }
    }
}

#[derive(Clone, Debug)]
pub enum InputKind {
    Where(Entity),
    Sort(Entity),
    Options(Entity),
    QueryOptions,
    ConnectionWhere(RelationRef),
    MemberConnectionWhere(MemberRef),
    ConnectionSort(RelationRef),
    AggregateInput(RelationRef),
    NodeAggregationWhere(RelationRef),
    EdgeAggregationWhere(RelationRef),
    Create(Entity),
    Update(Entity),
    OnCreate(Arc<Node>),
    UniqueWhere(Arc<Node>),
    ConnectWhere(Entity),
    ConnectOrCreateWhere(Arc<Node>),
    NodeConnect(Arc<Node>),
    NodeDisconnect(Arc<Node>),
    NodeDelete(Arc<Node>),
    NodeRelation(Arc<Node>),
    NodeConnectOrCreate(Arc<Node>),
    FieldInput(MemberRef),
    CreateField(MemberRef),
    ConnectField(MemberRef),
    ConnectOrCreateField(MemberRef),
    ConnectOrCreateOnCreate(MemberRef),
    UpdateField(MemberRef),
    UpdateConnection(MemberRef),
    DisconnectField(MemberRef),
    DeleteField(MemberRef),
    UnionGroup(RelationRef, UnionGroup),
}

#[derive(Clone, Debug)]
pub struct InputType {
    pub model: Arc<EntityModel>,
    pub kind: InputKind,
}

pub fn input_type(model: &Arc<EntityModel>, kind: InputKind) -> __Type {
    __Type::Input(InputType {
        model: Arc::clone(model),
        kind,
    })
}

pub fn node_where_type(model: &Arc<EntityModel>, node: &Arc<Node>) -> __Type {
    input_type(model, InputKind::Where(Entity::Node(Arc::clone(node))))
}

pub fn where_type(model: &Arc<EntityModel>, target: &RelationTarget) -> __Type {
    match entity_of(model, target) {
        Some(entity) => input_type(model, InputKind::Where(entity)),
        None => __Type::Scalar(Scalar::Custom(format!("{}Where", target.name()))),
    }
}

pub fn options_type(model: &Arc<EntityModel>, target: &RelationTarget) -> __Type {
    match entity_of(model, target) {
        Some(Entity::Union(_)) | None => input_type(model, InputKind::QueryOptions),
        Some(entity) => input_type(model, InputKind::Options(entity)),
    }
}

fn is_sortable(field: &PrimitiveField) -> bool {
    !field.is_list() && field.is_filterable()
}

pub fn sort_exists(entity: &Entity) -> bool {
    entity.primitives().iter().any(|x| is_sortable(x))
}

pub fn connection_sort_exists(model: &EntityModel, relation: &RelationRef) -> bool {
    match entity_of(model, &relation.field.target) {
        Some(Entity::Union(_)) | None => false,
        Some(target) => {
            sort_exists(&target)
                || model
                    .properties_of(&relation.field)
                    .map(|p| sort_exists(&Entity::Properties(Arc::clone(p))))
                    .unwrap_or(false)
        }
    }
}

/// Wraps `type_` in `[T!]` for list relationships
fn by_cardinality(field: &RelationField, type_: __Type) -> __Type {
    match field.is_list() {
        true => list_of_non_null(type_),
        false => type_,
    }
}

fn edge_required(model: &EntityModel, field: &RelationField) -> bool {
    model
        .properties_of(field)
        .map(|p| {
            p.fields
                .iter()
                .any(|f| f.is_creatable() && f.type_meta.required && f.default_value.is_none())
        })
        .unwrap_or(false)
}

fn logical_members(self_type: &__Type) -> Vec<__InputValue> {
    vec![
        __InputValue::new(logical::OR, list_of_non_null(self_type.clone()))
            .with_meta(InputMeta::Logical(LogicalOp::Or)),
        __InputValue::new(logical::AND, list_of_non_null(self_type.clone()))
            .with_meta(InputMeta::Logical(LogicalOp::And)),
        __InputValue::new(logical::NOT, self_type.clone()).with_meta(InputMeta::Logical(LogicalOp::Not)),
    ]
}

fn empty_input() -> __InputValue {
    __InputValue::new(mutation_names::EMPTY_INPUT, boolean_type())
}

fn primitive_filters(model: &Arc<EntityModel>, field: &Arc<PrimitiveField>) -> Vec<__InputValue> {
    let base = primitive_type(model, &field.field_type);
    let member = |op: FilterOp, negated: bool, type_: __Type| {
        let iv = __InputValue::new(&op.key(&field.name, negated), type_).with_meta(InputMeta::Property {
            field: Arc::clone(field),
            op,
            negated,
        });
        match negated {
            true => iv.deprecated(deprecation::NEGATION),
            false => iv,
        }
    };

    if field.is_list() {
        let list_type = wrap(&field.type_meta, base.clone(), false);
        return vec![
            member(FilterOp::Equal, false, list_type.clone()),
            member(FilterOp::Equal, true, list_type),
            member(FilterOp::Includes, false, base.clone()),
            member(FilterOp::Includes, true, base),
        ];
    }

    let mut res = vec![
        member(FilterOp::Equal, false, base.clone()),
        member(FilterOp::Equal, true, base.clone()),
    ];
    let kind = field.scalar();
    if kind == Some(ScalarKind::Boolean) {
        return res;
    }
    let in_type = match field.type_meta.required {
        true => list_of_non_null(base.clone()),
        false => list(base.clone()),
    };
    res.push(member(FilterOp::In, false, in_type.clone()));
    res.push(member(FilterOp::In, true, in_type));

    match kind {
        Some(k) if k.is_comparable() => {
            for op in [
                FilterOp::LessThan,
                FilterOp::LessThanEqualTo,
                FilterOp::GreaterThan,
                FilterOp::GreaterThanEqualTo,
            ] {
                res.push(member(op, false, base.clone()));
            }
        }
        Some(k) if k.is_string_like() => {
            if model.enable_regex {
                res.push(member(FilterOp::Matches, false, base.clone()));
            }
            for op in [FilterOp::Contains, FilterOp::StartsWith, FilterOp::EndsWith] {
                res.push(member(op, false, base.clone()));
                res.push(member(op, true, base.clone()));
            }
        }
        _ => {}
    }
    res
}

fn relation_filters(model: &Arc<EntityModel>, owner: &str, rel: &Arc<RelationField>) -> Vec<__InputValue> {
    let relation = RelationRef::new(owner, rel);
    let where_ = where_type(model, &rel.target);
    let connection_where = input_type(model, InputKind::ConnectionWhere(relation.clone()));

    let direct = |suffix: &str, quantifier: Quantifier| {
        __InputValue::new(&format!("{}{}", rel.name, suffix), where_.clone()).with_meta(
            InputMeta::Relationship {
                field: Arc::clone(rel),
                quantifier,
            },
        )
    };
    let connection = |suffix: &str, quantifier: Quantifier| {
        __InputValue::new(
            &format!("{}Connection{}", rel.name, suffix),
            connection_where.clone(),
        )
        .with_meta(InputMeta::Connection {
            field: Arc::clone(rel),
            quantifier,
        })
    };

    let mut res = vec![];
    match rel.is_list() {
        true => {
            res.push(direct("", Quantifier::Some).deprecated(format!("Use `{}_SOME` instead.", rel.name)));
            res.push(direct("_NOT", Quantifier::None).deprecated(format!("Use `{}_NONE` instead.", rel.name)));
            for q in [Quantifier::All, Quantifier::None, Quantifier::Single, Quantifier::Some] {
                res.push(direct(q.suffix(), q));
            }
            res.push(
                connection("", Quantifier::Some)
                    .deprecated(format!("Use `{}Connection_SOME` instead.", rel.name)),
            );
            res.push(
                connection("_NOT", Quantifier::None)
                    .deprecated(format!("Use `{}Connection_NONE` instead.", rel.name)),
            );
            for q in [Quantifier::All, Quantifier::None, Quantifier::Single, Quantifier::Some] {
                res.push(connection(q.suffix(), q));
            }
        }
        false => {
            res.push(direct("", Quantifier::Some));
            res.push(direct("_NOT", Quantifier::None).deprecated(deprecation::NEGATION));
            res.push(connection("", Quantifier::Some));
            res.push(connection("_NOT", Quantifier::None).deprecated(deprecation::NEGATION));
        }
    }

    if rel.aggregate && matches!(rel.target, RelationTarget::Node(_)) {
        res.push(
            __InputValue::new(
                &format!("{}Aggregate", rel.name),
                input_type(model, InputKind::AggregateInput(relation)),
            )
            .with_meta(InputMeta::Aggregate {
                field: Arc::clone(rel),
            }),
        );
    }
    res
}

fn aggregation_filters(
    model: &Arc<EntityModel>,
    fields: &[Arc<PrimitiveField>],
    self_type: &__Type,
) -> Vec<__InputValue> {
    let mut res = logical_members(self_type);
    for field in fields {
        let kind = match aggregable_kind(field) {
            Some(kind) => kind,
            None => continue,
        };
        let own = primitive_type(model, &field.field_type);
        for (function, deprecated) in AggregationFunction::for_kind(kind) {
            for op in CompareOp::ALL {
                let type_ = match function {
                    AggregationFunction::Legacy if kind.is_string_like() && op != CompareOp::Equal => {
                        int_type()
                    }
                    AggregationFunction::Legacy => own.clone(),
                    AggregationFunction::Average
                    | AggregationFunction::AverageLength => scalar(ScalarKind::Float),
                    AggregationFunction::Shortest
                    | AggregationFunction::Longest
                    | AggregationFunction::ShortestLength
                    | AggregationFunction::LongestLength => int_type(),
                    AggregationFunction::Min | AggregationFunction::Max | AggregationFunction::Sum => {
                        own.clone()
                    }
                };
                let iv = __InputValue::new(
                    &format!("{}{}_{}", field.name, function.infix(), op.suffix()),
                    type_,
                )
                .with_meta(InputMeta::Aggregation {
                    field: Arc::clone(field),
                    function,
                    op,
                });
                res.push(match deprecated {
                    Some(reason) => iv.deprecated(reason),
                    None => iv,
                });
            }
        }
    }
    res
}

fn aggregable_fields(fields: &[Arc<PrimitiveField>]) -> bool {
    fields.iter().any(|f| aggregable_kind(f).is_some())
}

/// Update operators offered next to the plain setter
fn update_operators(model: &Arc<EntityModel>, field: &Arc<PrimitiveField>) -> Vec<__InputValue> {
    let base = primitive_type(model, &field.field_type);
    let named = |suffix: &str, type_: __Type| __InputValue::new(&format!("{}_{}", field.name, suffix), type_);
    if field.is_list() {
        let push_type = match field.type_meta.list_item_required {
            true => list_of_non_null(base),
            false => list(base),
        };
        return vec![named("POP", int_type()), named("PUSH", push_type)];
    }
    match field.scalar() {
        Some(ScalarKind::Int) | Some(ScalarKind::BigInt) => {
            vec![named("INCREMENT", base.clone()), named("DECREMENT", base)]
        }
        Some(ScalarKind::Float) => vec![
            named("ADD", base.clone()),
            named("SUBTRACT", base.clone()),
            named("DIVIDE", base.clone()),
            named("MULTIPLY", base),
        ],
        _ => vec![],
    }
}

fn union_group_exists(model: &EntityModel, relation: &RelationRef, group: UnionGroup) -> bool {
    members(model, relation).iter().any(|m| member_in_group(m, group))
}

fn member_in_group(member: &MemberRef, group: UnionGroup) -> bool {
    match group {
        UnionGroup::Create => member.has_field_input(),
        UnionGroup::Update => member.has_update_field_input(),
        UnionGroup::Connect => member.supports(NestedOperation::Connect),
        UnionGroup::Disconnect => member.supports(NestedOperation::Disconnect),
        UnionGroup::Delete => member.supports(NestedOperation::Delete),
        UnionGroup::CreateField => member.supports(NestedOperation::Create),
        UnionGroup::ConnectOrCreate => member.supports(NestedOperation::ConnectOrCreate),
    }
}

impl InputType {
    fn input(&self, kind: InputKind) -> __Type {
        input_type(&self.model, kind)
    }

    fn self_type(&self) -> __Type {
        __Type::Input(self.clone())
    }

    fn where_fields(&self, entity: &Entity) -> Vec<__InputValue> {
        if let Entity::Union(union) = entity {
            return union
                .members
                .iter()
                .filter_map(|x| self.model.nodes.get(x))
                .map(|node| {
                    __InputValue::new(&node.name, node_where_type(&self.model, node))
                        .with_meta(InputMeta::UnionMember(Arc::clone(node)))
                })
                .collect();
        }

        let mut res = logical_members(&self.self_type());
        for field in entity.fields() {
            match field {
                EntityField::Primitive(p) if p.is_filterable() => {
                    res.extend(primitive_filters(&self.model, &p))
                }
                EntityField::Primitive(_) => {}
                EntityField::Relation(r) => res.extend(relation_filters(&self.model, entity.name(), &r)),
            }
        }
        if let Entity::Interface(interface) = entity {
            res.push(
                __InputValue::new(
                    logical::TYPENAME_IN,
                    list_of_non_null(__Type::Enum(EnumType {
                        kind: EnumKind::Implementation(Arc::clone(interface)),
                    })),
                )
                .with_meta(InputMeta::Typename),
            );
        }
        res
    }

    fn connection_where_fields(&self, relation: &RelationRef, node_where: __Type) -> Vec<__InputValue> {
        let mut res = logical_members(&self.self_type());
        res.push(
            __InputValue::new(args::NODE, node_where.clone())
                .with_meta(InputMeta::ConnectionNode { negated: false }),
        );
        res.push(
            __InputValue::new("node_NOT", node_where)
                .with_meta(InputMeta::ConnectionNode { negated: true })
                .deprecated(deprecation::NEGATION),
        );
        if let Some(props) = self.model.properties_of(&relation.field) {
            let edge_where = self.input(InputKind::Where(Entity::Properties(Arc::clone(props))));
            res.push(
                __InputValue::new(args::EDGE, edge_where.clone())
                    .with_meta(InputMeta::ConnectionEdge { negated: false }),
            );
            res.push(
                __InputValue::new("edge_NOT", edge_where)
                    .with_meta(InputMeta::ConnectionEdge { negated: true })
                    .deprecated(deprecation::NEGATION),
            );
        }
        res
    }

    fn create_fields(&self, entity: &Entity) -> Vec<__InputValue> {
        if let Entity::Interface(interface) = entity {
            return interface
                .implementations
                .iter()
                .filter_map(|x| self.model.nodes.get(x))
                .map(|node| {
                    __InputValue::new(
                        &node.name,
                        self.input(InputKind::Create(Entity::Node(Arc::clone(node)))),
                    )
                })
                .collect();
        }

        let mut res = vec![];
        for field in entity.fields() {
            match field {
                EntityField::Primitive(p) if p.is_creatable() => {
                    let required = p.type_meta.required && p.default_value.is_none();
                    let mut iv = __InputValue::new(
                        &p.name,
                        wrap(&p.type_meta, primitive_type(&self.model, &p.field_type), required),
                    )
                    .with_description(p.description.clone());
                    if let Some(default) = &p.default_value {
                        iv = iv.with_default(crate::sdl::format_json_value(default));
                    }
                    res.push(iv);
                }
                EntityField::Primitive(_) => {}
                EntityField::Relation(r) => {
                    let relation = RelationRef::new(entity.name(), &r);
                    if r.target.is_union() {
                        if union_group_exists(&self.model, &relation, UnionGroup::Create) {
                            res.push(__InputValue::new(
                                &r.name,
                                self.input(InputKind::UnionGroup(relation, UnionGroup::Create)),
                            ));
                        }
                    } else if let Some(member) = members(&self.model, &relation).pop() {
                        if member.has_field_input() {
                            res.push(__InputValue::new(&r.name, self.input(InputKind::FieldInput(member))));
                        }
                    }
                }
            }
        }
        if res.is_empty() {
            res.push(empty_input());
        }
        res
    }

    fn update_fields(&self, entity: &Entity) -> Vec<__InputValue> {
        let mut res = vec![];
        for field in entity.fields() {
            match field {
                EntityField::Primitive(p) if p.is_updatable() => {
                    res.push(
                        __InputValue::new(
                            &p.name,
                            wrap(&p.type_meta, primitive_type(&self.model, &p.field_type), false),
                        )
                        .with_description(p.description.clone()),
                    );
                    res.extend(update_operators(&self.model, &p));
                }
                EntityField::Primitive(_) => {}
                // interface updates only carry the shared properties
                EntityField::Relation(_) if matches!(entity, Entity::Interface(_)) => {}
                EntityField::Relation(r) => {
                    let relation = RelationRef::new(entity.name(), &r);
                    if r.target.is_union() {
                        if union_group_exists(&self.model, &relation, UnionGroup::Update) {
                            res.push(__InputValue::new(
                                &r.name,
                                self.input(InputKind::UnionGroup(relation, UnionGroup::Update)),
                            ));
                        }
                    } else if let Some(member) = members(&self.model, &relation).pop() {
                        if member.has_update_field_input() {
                            res.push(__InputValue::new(
                                &r.name,
                                by_cardinality(&r, self.input(InputKind::UpdateField(member))),
                            ));
                        }
                    }
                }
            }
        }
        if res.is_empty() {
            res.push(empty_input());
        }
        res
    }

    /// Node level connect, disconnect, delete, create and connectOrCreate inputs
    fn nested_fields(&self, node: &Arc<Node>, nested: NestedInput) -> Vec<__InputValue> {
        let mut res = vec![];
        for rel in node.relations() {
            let relation = RelationRef::new(&node.name, rel);
            if rel.target.is_union() {
                if union_group_exists(&self.model, &relation, nested.union_group()) {
                    res.push(__InputValue::new(
                        &rel.name,
                        self.input(InputKind::UnionGroup(relation, nested.union_group())),
                    ));
                }
            } else if let Some(member) = members(&self.model, &relation).pop() {
                if member.supports(nested.operation()) {
                    res.push(__InputValue::new(
                        &rel.name,
                        by_cardinality(rel, self.input(nested.member_kind(member))),
                    ));
                }
            }
        }
        res
    }

    /// Nested input of the target node, e.g. `connect: [ActorConnectInput!]`
    fn target_nested(&self, member: &MemberRef, name: &str, nested: NestedInput) -> Option<__InputValue> {
        let node = member.target_node()?;
        if !has_nested(node, nested, &self.model) {
            return None;
        }
        let kind = match nested {
            NestedInput::Connect => InputKind::NodeConnect(Arc::clone(node)),
            NestedInput::Disconnect => InputKind::NodeDisconnect(Arc::clone(node)),
            NestedInput::Delete => InputKind::NodeDelete(Arc::clone(node)),
            NestedInput::Create => InputKind::NodeRelation(Arc::clone(node)),
            NestedInput::ConnectOrCreate => InputKind::NodeConnectOrCreate(Arc::clone(node)),
        };
        Some(__InputValue::new(
            name,
            by_cardinality(&member.relation.field, self.input(kind)),
        ))
    }

    fn member_connection_where(&self, member: &MemberRef) -> __Type {
        match member.union_member {
            true => self.input(InputKind::MemberConnectionWhere(member.clone())),
            false => self.input(InputKind::ConnectionWhere(member.relation.clone())),
        }
    }

    fn edge_create(&self, member: &MemberRef) -> Option<__InputValue> {
        let props = self.model.properties_of(&member.relation.field)?;
        let type_ = self.input(InputKind::Create(Entity::Properties(Arc::clone(props))));
        Some(__InputValue::new(
            args::EDGE,
            match edge_required(&self.model, &member.relation.field) {
                true => non_null(type_),
                false => type_,
            },
        ))
    }

    fn relation_member_fields(&self, kind: &InputKind) -> Vec<__InputValue> {
        match kind {
            InputKind::FieldInput(member) => {
                let field = &member.relation.field;
                let mut res = vec![];
                if member.supports(NestedOperation::Create) {
                    res.push(__InputValue::new(
                        args::CREATE,
                        by_cardinality(field, self.input(InputKind::CreateField(member.clone()))),
                    ));
                }
                if member.supports(NestedOperation::Connect) {
                    res.push(__InputValue::new(
                        args::CONNECT,
                        by_cardinality(field, self.input(InputKind::ConnectField(member.clone()))),
                    ));
                }
                if member.supports(NestedOperation::ConnectOrCreate) {
                    res.push(__InputValue::new(
                        args::CONNECT_OR_CREATE,
                        by_cardinality(field, self.input(InputKind::ConnectOrCreateField(member.clone()))),
                    ));
                }
                res
            }
            InputKind::CreateField(member) => {
                let mut res = vec![__InputValue::new(
                    args::NODE,
                    non_null(self.input(InputKind::Create(member.target.clone()))),
                )];
                res.extend(self.edge_create(member));
                res
            }
            InputKind::ConnectField(member) => {
                let mut res = vec![__InputValue::new(
                    args::WHERE,
                    self.input(InputKind::ConnectWhere(member.target.clone())),
                )];
                res.extend(self.target_nested(member, args::CONNECT, NestedInput::Connect));
                res.extend(self.edge_create(member));
                if !member.relation.field.is_list() {
                    res.push(
                        __InputValue::new(args::OVERWRITE, non_null(boolean_type())).with_default("true"),
                    );
                }
                res
            }
            InputKind::ConnectOrCreateField(member) => match member.target_node() {
                Some(node) => vec![
                    __InputValue::new(
                        args::WHERE,
                        non_null(self.input(InputKind::ConnectOrCreateWhere(Arc::clone(node)))),
                    ),
                    __InputValue::new(
                        args::ON_CREATE,
                        non_null(self.input(InputKind::ConnectOrCreateOnCreate(member.clone()))),
                    ),
                ],
                None => vec![],
            },
            InputKind::ConnectOrCreateOnCreate(member) => match member.target_node() {
                Some(node) => {
                    let mut res = vec![__InputValue::new(
                        args::NODE,
                        non_null(self.input(InputKind::OnCreate(Arc::clone(node)))),
                    )];
                    res.extend(self.edge_create(member));
                    res
                }
                None => vec![],
            },
            InputKind::UpdateField(member) => {
                let field = &member.relation.field;
                let mut res = vec![__InputValue::new(args::WHERE, self.member_connection_where(member))];
                if member.supports(NestedOperation::Update) {
                    res.push(__InputValue::new(
                        args::UPDATE,
                        self.input(InputKind::UpdateConnection(member.clone())),
                    ));
                }
                for (name, op, kind) in [
                    (args::CONNECT, NestedOperation::Connect, InputKind::ConnectField(member.clone())),
                    (args::DISCONNECT, NestedOperation::Disconnect, InputKind::DisconnectField(member.clone())),
                    (args::CREATE, NestedOperation::Create, InputKind::CreateField(member.clone())),
                    (args::DELETE, NestedOperation::Delete, InputKind::DeleteField(member.clone())),
                    (
                        args::CONNECT_OR_CREATE,
                        NestedOperation::ConnectOrCreate,
                        InputKind::ConnectOrCreateField(member.clone()),
                    ),
                ] {
                    if member.supports(op) {
                        res.push(__InputValue::new(name, by_cardinality(field, self.input(kind))));
                    }
                }
                res
            }
            InputKind::UpdateConnection(member) => {
                let mut res = vec![__InputValue::new(
                    args::NODE,
                    self.input(InputKind::Update(member.target.clone())),
                )];
                if let Some(props) = self.model.properties_of(&member.relation.field) {
                    res.push(__InputValue::new(
                        args::EDGE,
                        self.input(InputKind::Update(Entity::Properties(Arc::clone(props)))),
                    ));
                }
                res
            }
            InputKind::DisconnectField(member) => {
                let mut res = vec![__InputValue::new(args::WHERE, self.member_connection_where(member))];
                res.extend(self.target_nested(member, args::DISCONNECT, NestedInput::Disconnect));
                res
            }
            InputKind::DeleteField(member) => {
                let mut res = vec![__InputValue::new(args::WHERE, self.member_connection_where(member))];
                res.extend(self.target_nested(member, args::DELETE, NestedInput::Delete));
                res
            }
            _ => vec![],
        }
    }

    fn union_group_fields(&self, relation: &RelationRef, group: UnionGroup) -> Vec<__InputValue> {
        let field = &relation.field;
        members(&self.model, relation)
            .into_iter()
            .filter(|m| member_in_group(m, group))
            .map(|member| {
                let name = member.target.name().to_string();
                let type_ = match group {
                    UnionGroup::Create => self.input(InputKind::FieldInput(member)),
                    UnionGroup::Update => by_cardinality(field, self.input(InputKind::UpdateField(member))),
                    UnionGroup::Connect => by_cardinality(field, self.input(InputKind::ConnectField(member))),
                    UnionGroup::Disconnect => {
                        by_cardinality(field, self.input(InputKind::DisconnectField(member)))
                    }
                    UnionGroup::Delete => by_cardinality(field, self.input(InputKind::DeleteField(member))),
                    UnionGroup::CreateField => {
                        by_cardinality(field, self.input(InputKind::CreateField(member)))
                    }
                    UnionGroup::ConnectOrCreate => {
                        by_cardinality(field, self.input(InputKind::ConnectOrCreateField(member)))
                    }
                };
                __InputValue::new(&name, type_)
            })
            .collect()
    }
}

impl ___Type for InputType {
    fn kind(&self) -> __TypeKind {
        __TypeKind::INPUT_OBJECT
    }

    fn name(&self) -> Option<String> {
        Some(match &self.kind {
            InputKind::Where(e) => format!("{}Where", e.name()),
            InputKind::Sort(e) => format!("{}Sort", e.name()),
            InputKind::Options(e) => format!("{}Options", e.name()),
            InputKind::QueryOptions => "QueryOptions".to_string(),
            InputKind::ConnectionWhere(r) => format!("{}ConnectionWhere", r.prefix()),
            InputKind::MemberConnectionWhere(m) => format!("{}ConnectionWhere", m.prefix()),
            InputKind::ConnectionSort(r) => format!("{}ConnectionSort", r.prefix()),
            InputKind::AggregateInput(r) => format!("{}AggregateInput", r.aggregation_prefix()),
            InputKind::NodeAggregationWhere(r) => {
                format!("{}NodeAggregationWhereInput", r.aggregation_prefix())
            }
            InputKind::EdgeAggregationWhere(r) => {
                format!("{}EdgeAggregationWhereInput", r.aggregation_prefix())
            }
            InputKind::Create(e) => format!("{}CreateInput", e.name()),
            InputKind::Update(e) => format!("{}UpdateInput", e.name()),
            InputKind::OnCreate(n) => format!("{}OnCreateInput", n.name),
            InputKind::UniqueWhere(n) => format!("{}UniqueWhere", n.name),
            InputKind::ConnectWhere(e) => format!("{}ConnectWhere", e.name()),
            InputKind::ConnectOrCreateWhere(n) => format!("{}ConnectOrCreateWhere", n.name),
            InputKind::NodeConnect(n) => format!("{}ConnectInput", n.name),
            InputKind::NodeDisconnect(n) => format!("{}DisconnectInput", n.name),
            InputKind::NodeDelete(n) => format!("{}DeleteInput", n.name),
            InputKind::NodeRelation(n) => format!("{}RelationInput", n.name),
            InputKind::NodeConnectOrCreate(n) => format!("{}ConnectOrCreateInput", n.name),
            InputKind::FieldInput(m) => format!("{}FieldInput", m.prefix()),
            InputKind::CreateField(m) => format!("{}CreateFieldInput", m.prefix()),
            InputKind::ConnectField(m) => format!("{}ConnectFieldInput", m.prefix()),
            InputKind::ConnectOrCreateField(m) => format!("{}ConnectOrCreateFieldInput", m.prefix()),
            InputKind::ConnectOrCreateOnCreate(m) => {
                format!("{}ConnectOrCreateFieldInputOnCreate", m.prefix())
            }
            InputKind::UpdateField(m) => format!("{}UpdateFieldInput", m.prefix()),
            InputKind::UpdateConnection(m) => format!("{}UpdateConnectionInput", m.prefix()),
            InputKind::DisconnectField(m) => format!("{}DisconnectFieldInput", m.prefix()),
            InputKind::DeleteField(m) => format!("{}DeleteFieldInput", m.prefix()),
            InputKind::UnionGroup(r, g) => format!("{}{}", r.prefix(), g.suffix()),
        })
    }

    fn input_fields(&self) -> Option<Vec<__InputValue>> {
        let fields = match &self.kind {
            InputKind::Where(entity) => self.where_fields(entity),
            InputKind::Sort(entity) => entity
                .primitives()
                .iter()
                .filter(|x| is_sortable(x))
                .map(|x| __InputValue::new(&x.name, EnumType::sort_direction()))
                .collect(),
            InputKind::Options(entity) => {
                let mut res = vec![];
                if sort_exists(entity) {
                    res.push(
                        __InputValue::new(
                            args::SORT,
                            list_of_non_null(self.input(InputKind::Sort(entity.clone()))),
                        ),
                    );
                }
                res.push(__InputValue::new(args::LIMIT, int_type()));
                res.push(__InputValue::new(args::OFFSET, int_type()));
                res
            }
            InputKind::QueryOptions => vec![
                __InputValue::new(args::LIMIT, int_type()),
                __InputValue::new(args::OFFSET, int_type()),
            ],
            InputKind::ConnectionWhere(relation) => match entity_of(&self.model, &relation.field.target) {
                Some(Entity::Union(_)) => members(&self.model, relation)
                    .into_iter()
                    .filter_map(|m| {
                        let node = Arc::clone(m.target_node()?);
                        Some(
                            __InputValue::new(
                                &node.name,
                                self.input(InputKind::MemberConnectionWhere(m)),
                            )
                            .with_meta(InputMeta::UnionMember(node)),
                        )
                    })
                    .collect(),
                Some(target) => {
                    self.connection_where_fields(relation, self.input(InputKind::Where(target)))
                }
                None => vec![],
            },
            InputKind::MemberConnectionWhere(member) => self.connection_where_fields(
                &member.relation,
                self.input(InputKind::Where(member.target.clone())),
            ),
            InputKind::ConnectionSort(relation) => {
                let mut res = vec![];
                if let Some(target) = entity_of(&self.model, &relation.field.target) {
                    if sort_exists(&target) {
                        res.push(__InputValue::new(args::NODE, self.input(InputKind::Sort(target))));
                    }
                }
                if let Some(props) = self.model.properties_of(&relation.field) {
                    let props = Entity::Properties(Arc::clone(props));
                    if sort_exists(&props) {
                        res.push(__InputValue::new(args::EDGE, self.input(InputKind::Sort(props))));
                    }
                }
                res
            }
            InputKind::AggregateInput(relation) => {
                let mut res = vec![__InputValue::new(
                    crate::constants::aggregate::COUNT,
                    int_type(),
                )
                .with_meta(InputMeta::Count(CompareOp::Equal))];
                for op in [
                    CompareOp::LessThan,
                    CompareOp::LessThanEqualTo,
                    CompareOp::GreaterThan,
                    CompareOp::GreaterThanEqualTo,
                ] {
                    res.push(
                        __InputValue::new(&format!("count_{}", op.suffix()), int_type())
                            .with_meta(InputMeta::Count(op)),
                    );
                }
                res.extend(logical_members(&self.self_type()));
                let target_fields = self
                    .model
                    .concrete_nodes(&relation.field.target)
                    .first()
                    .map(|n| n.primitives().cloned().collect::<Vec<_>>())
                    .unwrap_or_default();
                if aggregable_fields(&target_fields) {
                    res.push(
                        __InputValue::new(
                            args::NODE,
                            self.input(InputKind::NodeAggregationWhere(relation.clone())),
                        )
                        .with_meta(InputMeta::ConnectionNode { negated: false }),
                    );
                }
                if let Some(props) = self.model.properties_of(&relation.field) {
                    if aggregable_fields(&props.fields) {
                        res.push(
                            __InputValue::new(
                                args::EDGE,
                                self.input(InputKind::EdgeAggregationWhere(relation.clone())),
                            )
                            .with_meta(InputMeta::ConnectionEdge { negated: false }),
                        );
                    }
                }
                res
            }
            InputKind::NodeAggregationWhere(relation) => {
                let fields = self
                    .model
                    .concrete_nodes(&relation.field.target)
                    .first()
                    .map(|n| n.primitives().cloned().collect::<Vec<_>>())
                    .unwrap_or_default();
                aggregation_filters(&self.model, &fields, &self.self_type())
            }
            InputKind::EdgeAggregationWhere(relation) => {
                let fields = self
                    .model
                    .properties_of(&relation.field)
                    .map(|p| p.fields.clone())
                    .unwrap_or_default();
                aggregation_filters(&self.model, &fields, &self.self_type())
            }
            InputKind::Create(entity) => self.create_fields(entity),
            InputKind::Update(entity) => self.update_fields(entity),
            InputKind::OnCreate(node) => {
                let mut res: Vec<__InputValue> = node
                    .primitives()
                    .filter(|p| p.is_creatable())
                    .map(|p| {
                        let required = p.type_meta.required && p.default_value.is_none();
                        __InputValue::new(
                            &p.name,
                            wrap(&p.type_meta, primitive_type(&self.model, &p.field_type), required),
                        )
                    })
                    .collect();
                if res.is_empty() {
                    res.push(empty_input());
                }
                res
            }
            InputKind::UniqueWhere(node) => node
                .unique_fields()
                .map(|p| __InputValue::new(&p.name, primitive_type(&self.model, &p.field_type)))
                .collect(),
            InputKind::ConnectWhere(entity) => vec![__InputValue::new(
                args::NODE,
                non_null(self.input(InputKind::Where(entity.clone()))),
            )],
            InputKind::ConnectOrCreateWhere(node) => vec![__InputValue::new(
                args::NODE,
                non_null(self.input(InputKind::UniqueWhere(Arc::clone(node)))),
            )],
            InputKind::NodeConnect(node) => self.nested_fields(node, NestedInput::Connect),
            InputKind::NodeDisconnect(node) => self.nested_fields(node, NestedInput::Disconnect),
            InputKind::NodeDelete(node) => self.nested_fields(node, NestedInput::Delete),
            InputKind::NodeRelation(node) => self.nested_fields(node, NestedInput::Create),
            InputKind::NodeConnectOrCreate(node) => self.nested_fields(node, NestedInput::ConnectOrCreate),
            InputKind::UnionGroup(relation, group) => self.union_group_fields(relation, *group),
            other => self.relation_member_fields(other),
        };
        Some(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Config;
    use graphql_parser::schema::parse_schema;
    use std::collections::HashMap;

    fn types(sdl: &str) -> HashMap<String, __Type> {
        let doc = parse_schema::<String>(sdl).unwrap();
        let model = Arc::new(EntityModel::build(&doc, &Config::default()).unwrap());
        __Schema::new(model).type_map()
    }

    fn input_names(types: &HashMap<String, __Type>, name: &str) -> Vec<String> {
        types[name]
            .input_fields()
            .unwrap()
            .iter()
            .map(|x| x.name())
            .collect()
    }

    #[test]
    fn where_inputs_list_operators_in_order() {
        let types = types("type Movie { title: String! runtime: Int released: Boolean }");
        let names = input_names(&types, "MovieWhere");
        assert_eq!(
            names,
            vec![
                "OR",
                "AND",
                "NOT",
                "title",
                "title_NOT",
                "title_IN",
                "title_NOT_IN",
                "title_CONTAINS",
                "title_NOT_CONTAINS",
                "title_STARTS_WITH",
                "title_NOT_STARTS_WITH",
                "title_ENDS_WITH",
                "title_NOT_ENDS_WITH",
                "runtime",
                "runtime_NOT",
                "runtime_IN",
                "runtime_NOT_IN",
                "runtime_LT",
                "runtime_LTE",
                "runtime_GT",
                "runtime_GTE",
                "released",
                "released_NOT",
            ]
        );
        let fields = types["MovieWhere"].input_field_map();
        assert_eq!(fields["title_IN"].type_().render(), "[String!]");
        assert_eq!(fields["runtime_IN"].type_().render(), "[Int]");
        assert!(fields["title_NOT"].is_deprecated());
        assert!(!fields["title_CONTAINS"].is_deprecated());
    }

    #[test]
    fn create_inputs_without_settable_fields_get_an_empty_marker() {
        let types = types(
            r#"
            type Movie {
                id: ID! @id
                actors: [Actor!]! @relationship(type: "ACTED_IN", direction: IN, nestedOperations: [])
            }
            type Actor { name: String }
            "#,
        );
        assert_eq!(input_names(&types, "MovieCreateInput"), vec!["_emptyInput"]);
        assert!(!types.contains_key("MovieActorsFieldInput"));
        assert!(!types.contains_key("MovieActorsConnectFieldInput"));
        assert!(!types.contains_key("MovieConnectInput"));
        assert!(types.contains_key("MovieActorsConnectionWhere"));
    }

    #[test]
    fn list_relationship_filters_deprecate_legacy_forms() {
        let types = types(
            r#"
            type Movie { actors: [Actor!]! @relationship(type: "ACTED_IN", direction: IN) }
            type Actor { name: String }
            "#,
        );
        let fields = types["MovieWhere"].input_field_map();
        assert_eq!(
            fields["actors"].deprecation_reason.as_deref(),
            Some("Use `actors_SOME` instead.")
        );
        assert_eq!(
            fields["actors_NOT"].deprecation_reason.as_deref(),
            Some("Use `actors_NONE` instead.")
        );
        for key in ["actors_ALL", "actors_NONE", "actors_SINGLE", "actors_SOME", "actorsConnection_ALL"] {
            assert!(!fields[key].is_deprecated(), "{key}");
        }
        assert_eq!(fields["actorsAggregate"].type_().render(), "MovieActorActorsAggregateInput");
    }

    #[test]
    fn union_relationships_generate_member_keyed_inputs() {
        let types = types(
            r#"
            union Search = Genre | Movie
            type Genre { name: String @unique }
            type Movie { title: String search: [Search!]! @relationship(type: "SEARCH", direction: OUT) }
            "#,
        );
        assert_eq!(input_names(&types, "SearchWhere"), vec!["Genre", "Movie"]);
        assert_eq!(input_names(&types, "MovieSearchConnectionWhere"), vec!["Genre", "Movie"]);
        assert_eq!(input_names(&types, "MovieSearchCreateInput"), vec!["Genre", "Movie"]);
        assert!(types.contains_key("MovieSearchGenreConnectionWhere"));
        assert!(types.contains_key("MovieSearchGenreConnectOrCreateFieldInput"));
        assert!(!types.contains_key("MovieSearchMovieConnectOrCreateFieldInput"));
        assert_eq!(
            types["MovieUpdateInput"].input_field_map()["search"].type_().render(),
            "MovieSearchUpdateInput"
        );
    }

    #[test]
    fn interface_filters_carry_a_discriminator() {
        let types = types(
            r#"
            interface Production { title: String }
            type Movie implements Production { title: String }
            type Series implements Production { title: String }
            type Actor { actedIn: [Production!]! @relationship(type: "ACTED_IN", direction: OUT) }
            "#,
        );
        let fields = types["ProductionWhere"].input_field_map();
        assert_eq!(fields["typename_IN"].type_().render(), "[ProductionImplementation!]");
        assert_eq!(input_names(&types, "ProductionCreateInput"), vec!["Movie", "Series"]);
        assert!(!types.contains_key("ActorActedInConnectOrCreateFieldInput"));
    }

    #[test]
    fn aggregation_filters_cover_length_and_numeric_functions() {
        let types = types(
            r#"
            type Movie { actors: [Actor!]! @relationship(type: "ACTED_IN", direction: IN) }
            type Actor { name: String age: Int }
            "#,
        );
        let fields = types["MovieActorActorsNodeAggregationWhereInput"].input_field_map();
        assert!(fields["name_EQUAL"].is_deprecated());
        assert!(fields["name_AVERAGE_EQUAL"].is_deprecated());
        assert!(!fields["name_AVERAGE_LENGTH_EQUAL"].is_deprecated());
        assert_eq!(fields["name_LONGEST_LENGTH_GT"].type_().render(), "Int");
        assert_eq!(fields["age_AVERAGE_GT"].type_().render(), "Float");
        assert_eq!(fields["age_SUM_LT"].type_().render(), "Int");
    }

    #[test]
    fn update_inputs_offer_mathematical_and_list_operators() {
        let types = types("type Movie { views: Int rating: Float tags: [String!] }");
        assert_eq!(
            input_names(&types, "MovieUpdateInput"),
            vec![
                "views",
                "views_INCREMENT",
                "views_DECREMENT",
                "rating",
                "rating_ADD",
                "rating_SUBTRACT",
                "rating_DIVIDE",
                "rating_MULTIPLY",
                "tags",
                "tags_POP",
                "tags_PUSH",
            ]
        );
    }
}
