use crate::constants::{aggregate, connection, mutation as mutation_names, page_info};
use crate::directives::MutationOperation;
use crate::entity::*;
use crate::filter::{AggregationFunction, CompareOp, FilterOp, LogicalOp, Quantifier};
use crate::inputs::*;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

pub trait ___Type {
    // kind: __TypeKind!
    fn kind(&self) -> __TypeKind;

    // name: String
    fn name(&self) -> Option<String> {
        None
    }

    // description: String
    fn description(&self) -> Option<String> {
        None
    }

    // # OBJECT and INTERFACE only
    // fields(includeDeprecated: Boolean = false): [__Field!]
    fn fields(&self, _include_deprecated: bool) -> Option<Vec<__Field>> {
        None
    }

    // # OBJECT only
    // interfaces: [__Type!]
    fn interfaces(&self) -> Option<Vec<__Type>> {
        None
    }

    // # INTERFACE and UNION only
    // possibleTypes: [__Type!]
    fn possible_types(&self) -> Option<Vec<__Type>> {
        None
    }

    // # ENUM only
    // enumValues(includeDeprecated: Boolean = false): [__EnumValue!]
    fn enum_values(&self, _include_deprecated: bool) -> Option<Vec<__EnumValue>> {
        None
    }

    // # INPUT_OBJECT only
    // inputFields: [__InputValue!]
    fn input_fields(&self) -> Option<Vec<__InputValue>> {
        None
    }

    /// Directives re-exposed from the type definitions
    fn directives(&self) -> Vec<String> {
        vec![]
    }

    fn field_map(&self) -> HashMap<String, __Field> {
        let mut hmap = HashMap::new();
        let fields = self.fields(true).unwrap_or_default();
        for field in fields {
            hmap.insert(field.name(), field);
        }
        hmap.insert(
            "__typename".to_string(),
            __Field::new("__typename", non_null(__Type::Scalar(Scalar::Builtin(ScalarKind::String)))),
        );
        hmap
    }

    fn input_field_map(&self) -> HashMap<String, __InputValue> {
        let mut hmap = HashMap::new();
        let fields = self.input_fields().unwrap_or_default();
        for field in fields {
            hmap.insert(field.name(), field);
        }
        hmap
    }
}

/// Where a selectable field's data comes from
#[derive(Clone, Debug)]
pub enum FieldSource {
    Primitive(Arc<PrimitiveField>),
    Relation(Arc<RelationField>),
    RelationAggregate(Arc<RelationField>),
    RelationConnection(Arc<RelationField>),
    Read(Arc<Node>),
    Connection(Arc<Node>),
    Aggregate(Arc<Node>),
    Create(Arc<Node>),
    Update(Arc<Node>),
    Delete(Arc<Node>),
}

/// How a `where` input member compiles
#[derive(Clone, Debug)]
pub enum InputMeta {
    Logical(LogicalOp),
    Typename,
    Property {
        field: Arc<PrimitiveField>,
        op: FilterOp,
        negated: bool,
    },
    Relationship {
        field: Arc<RelationField>,
        quantifier: Quantifier,
    },
    Connection {
        field: Arc<RelationField>,
        quantifier: Quantifier,
    },
    Aggregate {
        field: Arc<RelationField>,
    },
    Count(CompareOp),
    Aggregation {
        field: Arc<PrimitiveField>,
        function: AggregationFunction,
        op: CompareOp,
    },
    UnionMember(Arc<Node>),
    ConnectionNode {
        negated: bool,
    },
    ConnectionEdge {
        negated: bool,
    },
}

#[derive(Clone, Debug)]
pub struct __Field {
    pub name_: String,
    pub description: Option<String>,
    pub type_: __Type,
    pub args: Vec<__InputValue>,
    pub deprecation_reason: Option<String>,
    pub directives: Vec<String>,

    // Only set for fields backed by the entity model
    pub source: Option<FieldSource>,
}

impl __Field {
    pub fn new(name: &str, type_: __Type) -> Self {
        Self {
            name_: name.to_string(),
            description: None,
            type_,
            args: vec![],
            deprecation_reason: None,
            directives: vec![],
            source: None,
        }
    }

    pub fn with_args(mut self, args: Vec<__InputValue>) -> Self {
        self.args = args;
        self
    }

    pub fn with_source(mut self, source: FieldSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_directives(mut self, directives: Vec<String>) -> Self {
        self.directives = directives;
        self
    }

    pub fn name(&self) -> String {
        self.name_.clone()
    }

    pub fn type_(&self) -> __Type {
        self.type_.clone()
    }

    pub fn get_arg(&self, name: &str) -> Option<__InputValue> {
        self.args.iter().find(|x| x.name_ == name).cloned()
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecation_reason.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct __InputValue {
    pub name_: String,
    pub type_: __Type,
    pub description: Option<String>,
    pub default_value: Option<String>,
    pub deprecation_reason: Option<String>,
    pub meta: Option<InputMeta>,
}

impl __InputValue {
    pub fn new(name: &str, type_: __Type) -> Self {
        Self {
            name_: name.to_string(),
            type_,
            description: None,
            default_value: None,
            deprecation_reason: None,
            meta: None,
        }
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    pub fn with_meta(mut self, meta: InputMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn deprecated(mut self, reason: impl Into<String>) -> Self {
        self.deprecation_reason = Some(reason.into());
        self
    }

    // name: String!
    pub fn name(&self) -> String {
        self.name_.clone()
    }

    // type: __Type!
    pub fn type_(&self) -> __Type {
        self.type_.clone()
    }

    // isDeprecated: Boolean!
    pub fn is_deprecated(&self) -> bool {
        self.deprecation_reason.is_some()
    }
}

#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum __TypeKind {
    SCALAR,
    OBJECT,
    INTERFACE,
    UNION,
    ENUM,
    INPUT_OBJECT,
    LIST,
    NON_NULL,
}

#[derive(Clone, Debug)]
pub struct __EnumValue {
    pub name: String,
    pub description: Option<String>,
}

impl __EnumValue {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
        }
    }

    // name: String!
    pub fn name(&self) -> String {
        self.name.clone()
    }
}

#[derive(Clone, Debug)]
pub enum __Type {
    Scalar(Scalar),
    Enum(EnumType),
    // Query
    Query(QueryType),
    Node(NodeType),
    Interface(InterfaceType),
    Union(UnionType),
    Connection(ConnectionType),
    Edge(EdgeType),
    AggregateSelection(AggregateSelectionType),
    // Mutation
    Mutation(MutationType),
    MutationResponse(MutationResponseType),
    Info(InfoType),
    Input(InputType),
    // Constant
    PageInfo(PageInfoType),
    // Modifiers
    List(ListType),
    NonNull(NonNullType),
}

impl ___Type for __Type {
    // kind: __TypeKind!
    fn kind(&self) -> __TypeKind {
        match self {
            Self::Scalar(x) => x.kind(),
            Self::Enum(x) => x.kind(),
            Self::Query(x) => x.kind(),
            Self::Node(x) => x.kind(),
            Self::Interface(x) => x.kind(),
            Self::Union(x) => x.kind(),
            Self::Connection(x) => x.kind(),
            Self::Edge(x) => x.kind(),
            Self::AggregateSelection(x) => x.kind(),
            Self::Mutation(x) => x.kind(),
            Self::MutationResponse(x) => x.kind(),
            Self::Info(x) => x.kind(),
            Self::Input(x) => x.kind(),
            Self::PageInfo(x) => x.kind(),
            Self::List(x) => x.kind(),
            Self::NonNull(x) => x.kind(),
        }
    }

    // name: String
    fn name(&self) -> Option<String> {
        match self {
            Self::Scalar(x) => x.name(),
            Self::Enum(x) => x.name(),
            Self::Query(x) => x.name(),
            Self::Node(x) => x.name(),
            Self::Interface(x) => x.name(),
            Self::Union(x) => x.name(),
            Self::Connection(x) => x.name(),
            Self::Edge(x) => x.name(),
            Self::AggregateSelection(x) => x.name(),
            Self::Mutation(x) => x.name(),
            Self::MutationResponse(x) => x.name(),
            Self::Info(x) => x.name(),
            Self::Input(x) => x.name(),
            Self::PageInfo(x) => x.name(),
            Self::List(x) => x.name(),
            Self::NonNull(x) => x.name(),
        }
    }

    // description: String
    fn description(&self) -> Option<String> {
        match self {
            Self::Enum(x) => x.description(),
            Self::Node(x) => x.description(),
            Self::Interface(x) => x.description(),
            Self::Union(x) => x.description(),
            Self::Input(x) => x.description(),
            _ => None,
        }
    }

    fn fields(&self, include_deprecated: bool) -> Option<Vec<__Field>> {
        match self {
            Self::Query(x) => x.fields(include_deprecated),
            Self::Node(x) => x.fields(include_deprecated),
            Self::Interface(x) => x.fields(include_deprecated),
            Self::Connection(x) => x.fields(include_deprecated),
            Self::Edge(x) => x.fields(include_deprecated),
            Self::AggregateSelection(x) => x.fields(include_deprecated),
            Self::Mutation(x) => x.fields(include_deprecated),
            Self::MutationResponse(x) => x.fields(include_deprecated),
            Self::Info(x) => x.fields(include_deprecated),
            Self::PageInfo(x) => x.fields(include_deprecated),
            _ => None,
        }
    }

    fn interfaces(&self) -> Option<Vec<__Type>> {
        match self {
            Self::Node(x) => x.interfaces(),
            _ => None,
        }
    }

    fn possible_types(&self) -> Option<Vec<__Type>> {
        match self {
            Self::Interface(x) => x.possible_types(),
            Self::Union(x) => x.possible_types(),
            _ => None,
        }
    }

    fn enum_values(&self, include_deprecated: bool) -> Option<Vec<__EnumValue>> {
        match self {
            Self::Enum(x) => x.enum_values(include_deprecated),
            _ => None,
        }
    }

    fn input_fields(&self) -> Option<Vec<__InputValue>> {
        match self {
            Self::Input(x) => x.input_fields(),
            _ => None,
        }
    }

    fn directives(&self) -> Vec<String> {
        match self {
            Self::Node(x) => x.directives(),
            Self::Interface(x) => x.directives(),
            _ => vec![],
        }
    }
}

impl __Type {
    /// Uwraps the List and NonNull modifiers to return a concrete __Type
    pub fn unmodified_type(&self) -> Self {
        match self {
            __Type::List(x) => x.type_.unmodified_type(),
            __Type::NonNull(x) => x.type_.unmodified_type(),
            _ => self.clone(),
        }
    }

    /// Type reference as written in SDL, e.g. `[Movie!]!`
    pub fn render(&self) -> String {
        match self {
            __Type::List(x) => format!("[{}]", x.type_.render()),
            __Type::NonNull(x) => format!("{}!", x.type_.render()),
            other => other.name().unwrap_or_default(),
        }
    }
}

pub fn non_null(type_: __Type) -> __Type {
    __Type::NonNull(NonNullType {
        type_: Box::new(type_),
    })
}

pub fn list(type_: __Type) -> __Type {
    __Type::List(ListType {
        type_: Box::new(type_),
    })
}

/// `[T!]`
pub fn list_of_non_null(type_: __Type) -> __Type {
    list(non_null(type_))
}

/// Applies the list and nullability wrappers of a declared field
pub fn wrap(meta: &TypeMeta, inner: __Type, required: bool) -> __Type {
    let wrapped = match meta.list {
        true => match meta.list_item_required {
            true => list_of_non_null(inner),
            false => list(inner),
        },
        false => inner,
    };
    match required {
        true => non_null(wrapped),
        false => wrapped,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scalar {
    Builtin(ScalarKind),
    Custom(String),
}

impl ___Type for Scalar {
    fn kind(&self) -> __TypeKind {
        __TypeKind::SCALAR
    }

    fn name(&self) -> Option<String> {
        Some(match self {
            Self::Builtin(x) => x.name().to_string(),
            Self::Custom(x) => x.clone(),
        })
    }
}

pub fn scalar(kind: ScalarKind) -> __Type {
    __Type::Scalar(Scalar::Builtin(kind))
}

pub fn int_type() -> __Type {
    scalar(ScalarKind::Int)
}

pub fn string_type() -> __Type {
    scalar(ScalarKind::String)
}

pub fn boolean_type() -> __Type {
    scalar(ScalarKind::Boolean)
}

/// The unwrapped GraphQL type of a primitive field
pub fn primitive_type(model: &Arc<EntityModel>, field_type: &FieldType) -> __Type {
    match field_type {
        FieldType::Scalar(x) => scalar(*x),
        FieldType::CustomScalar(x) => __Type::Scalar(Scalar::Custom(x.clone())),
        FieldType::Enum(x) => match model.enums.get(x) {
            Some(def) => __Type::Enum(EnumType {
                kind: EnumKind::User(Arc::clone(def)),
            }),
            None => __Type::Scalar(Scalar::Custom(x.clone())),
        },
    }
}

#[derive(Clone, Debug)]
pub enum EnumKind {
    User(Arc<EnumDef>),
    SortDirection,
    Implementation(Arc<Interface>),
}

#[derive(Clone, Debug)]
pub struct EnumType {
    pub kind: EnumKind,
}

impl EnumType {
    pub fn sort_direction() -> __Type {
        __Type::Enum(EnumType {
            kind: EnumKind::SortDirection,
        })
    }
}

impl ___Type for EnumType {
    fn kind(&self) -> __TypeKind {
        __TypeKind::ENUM
    }

    fn name(&self) -> Option<String> {
        Some(match &self.kind {
            EnumKind::User(x) => x.name.clone(),
            EnumKind::SortDirection => "SortDirection".to_string(),
            EnumKind::Implementation(x) => format!("{}Implementation", x.name),
        })
    }

    fn description(&self) -> Option<String> {
        match &self.kind {
            EnumKind::User(x) => x.description.clone(),
            EnumKind::SortDirection => None,
            EnumKind::Implementation(_) => None,
        }
    }

    fn enum_values(&self, _include_deprecated: bool) -> Option<Vec<__EnumValue>> {
        Some(match &self.kind {
            EnumKind::User(x) => x.values.iter().map(|v| __EnumValue::new(v)).collect(),
            EnumKind::SortDirection => vec![
                __EnumValue {
                    name: "ASC".to_string(),
                    description: Some("Sort by field values in ascending order.".to_string()),
                },
                __EnumValue {
                    name: "DESC".to_string(),
                    description: Some("Sort by field values in descending order.".to_string()),
                },
            ],
            EnumKind::Implementation(x) => x
                .implementations
                .iter()
                .map(|v| __EnumValue::new(v))
                .collect(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct ListType {
    pub type_: Box<__Type>,
}

impl ___Type for ListType {
    fn kind(&self) -> __TypeKind {
        __TypeKind::LIST
    }
}

#[derive(Clone, Debug)]
pub struct NonNullType {
    pub type_: Box<__Type>,
}

impl ___Type for NonNullType {
    fn kind(&self) -> __TypeKind {
        __TypeKind::NON_NULL
    }
}

/// Output type of a relationship target
pub fn target_type(model: &Arc<EntityModel>, target: &RelationTarget) -> __Type {
    match target {
        RelationTarget::Node(name) => match model.nodes.get(name) {
            Some(node) => __Type::Node(NodeType {
                model: Arc::clone(model),
                node: Arc::clone(node),
            }),
            None => __Type::Scalar(Scalar::Custom(name.clone())),
        },
        RelationTarget::Union { name, .. } => match model.unions.get(name) {
            Some(union) => __Type::Union(UnionType {
                model: Arc::clone(model),
                union: Arc::clone(union),
            }),
            None => __Type::Scalar(Scalar::Custom(name.clone())),
        },
        RelationTarget::Interface { name, .. } => match model.interfaces.get(name) {
            Some(interface) => __Type::Interface(InterfaceType {
                model: Arc::clone(model),
                interface: Arc::clone(interface),
            }),
            None => __Type::Scalar(Scalar::Custom(name.clone())),
        },
    }
}

pub fn node_type(model: &Arc<EntityModel>, node: &Arc<Node>) -> __Type {
    __Type::Node(NodeType {
        model: Arc::clone(model),
        node: Arc::clone(node),
    })
}

/// Directed argument for traversal fields whose direction is a default
fn directed_arg(field: &RelationField) -> Option<__InputValue> {
    field
        .query_direction
        .directed_argument_default()
        .map(|default| __InputValue::new("directed", boolean_type()).with_default(default.to_string()))
}

/// Fields of an object or interface type built from entity fields
fn entity_object_fields(model: &Arc<EntityModel>, owner: &str, fields: &[EntityField]) -> Vec<__Field> {
    let mut res = vec![];
    for field in fields {
        match field {
            EntityField::Primitive(p) => res.push(
                __Field::new(
                    &p.name,
                    wrap(&p.type_meta, primitive_type(model, &p.field_type), p.type_meta.required),
                )
                .with_description(p.description.clone())
                .with_directives(p.directives.clone())
                .with_source(FieldSource::Primitive(Arc::clone(p))),
            ),
            EntityField::Relation(r) => res.extend(relation_object_fields(model, owner, r)),
        }
    }
    res
}

fn relation_object_fields(model: &Arc<EntityModel>, owner: &str, rel: &Arc<RelationField>) -> Vec<__Field> {
    let relation = RelationRef::new(owner, rel);
    let mut res = vec![];

    let mut args = vec![
        __InputValue::new("where", where_type(model, &rel.target)),
        __InputValue::new("options", options_type(model, &rel.target)),
    ];
    args.extend(directed_arg(rel));
    res.push(
        __Field::new(
            &rel.name,
            wrap(&rel.type_meta, target_type(model, &rel.target), rel.type_meta.required),
        )
        .with_args(args)
        .with_description(rel.description.clone())
        .with_directives(rel.directives.clone())
        .with_source(FieldSource::Relation(Arc::clone(rel))),
    );

    if rel.aggregate {
        if let RelationTarget::Node(target) = &rel.target {
            if let Some(target) = model.nodes.get(target) {
                let mut args = vec![__InputValue::new("where", node_where_type(model, target))];
                args.extend(directed_arg(rel));
                res.push(
                    __Field::new(
                        &format!("{}Aggregate", rel.name),
                        __Type::AggregateSelection(AggregateSelectionType {
                            model: Arc::clone(model),
                            kind: AggregateSelectionKind::Relation(relation.clone()),
                        }),
                    )
                    .with_args(args)
                    .with_source(FieldSource::RelationAggregate(Arc::clone(rel))),
                );
            }
        }
    }

    let mut args = vec![
        __InputValue::new("where", input_type(model, InputKind::ConnectionWhere(relation.clone()))),
        __InputValue::new("first", int_type()),
        __InputValue::new("after", string_type()),
    ];
    args.extend(directed_arg(rel));
    if connection_sort_exists(model, &relation) {
        args.push(__InputValue::new(
            "sort",
            list_of_non_null(input_type(model, InputKind::ConnectionSort(relation.clone()))),
        ));
    }
    res.push(
        __Field::new(
            &format!("{}Connection", rel.name),
            non_null(__Type::Connection(ConnectionType {
                model: Arc::clone(model),
                source: ConnectionSource::Relation(relation),
            })),
        )
        .with_args(args)
        .with_source(FieldSource::RelationConnection(Arc::clone(rel))),
    );
    res
}

#[derive(Clone, Debug)]
pub struct NodeType {
    pub model: Arc<EntityModel>,
    pub node: Arc<Node>,
}

impl ___Type for NodeType {
    fn kind(&self) -> __TypeKind {
        __TypeKind::OBJECT
    }

    fn name(&self) -> Option<String> {
        Some(self.node.name.clone())
    }

    fn description(&self) -> Option<String> {
        self.node.description.clone()
    }

    fn fields(&self, _include_deprecated: bool) -> Option<Vec<__Field>> {
        Some(entity_object_fields(&self.model, &self.node.name, &self.node.fields))
    }

    fn interfaces(&self) -> Option<Vec<__Type>> {
        Some(
            self.node
                .interfaces
                .iter()
                .filter_map(|x| self.model.interfaces.get(x))
                .map(|x| {
                    __Type::Interface(InterfaceType {
                        model: Arc::clone(&self.model),
                        interface: Arc::clone(x),
                    })
                })
                .collect(),
        )
    }

    fn directives(&self) -> Vec<String> {
        self.node.directives.clone()
    }
}

#[derive(Clone, Debug)]
pub struct InterfaceType {
    pub model: Arc<EntityModel>,
    pub interface: Arc<Interface>,
}

impl ___Type for InterfaceType {
    fn kind(&self) -> __TypeKind {
        __TypeKind::INTERFACE
    }

    fn name(&self) -> Option<String> {
        Some(self.interface.name.clone())
    }

    fn description(&self) -> Option<String> {
        self.interface.description.clone()
    }

    fn fields(&self, _include_deprecated: bool) -> Option<Vec<__Field>> {
        Some(entity_object_fields(
            &self.model,
            &self.interface.name,
            &self.interface.fields,
        ))
    }

    fn possible_types(&self) -> Option<Vec<__Type>> {
        Some(
            self.interface
                .implementations
                .iter()
                .filter_map(|x| self.model.nodes.get(x))
                .map(|x| node_type(&self.model, x))
                .collect(),
        )
    }

    fn directives(&self) -> Vec<String> {
        self.interface.directives.clone()
    }
}

#[derive(Clone, Debug)]
pub struct UnionType {
    pub model: Arc<EntityModel>,
    pub union: Arc<Union>,
}

impl ___Type for UnionType {
    fn kind(&self) -> __TypeKind {
        __TypeKind::UNION
    }

    fn name(&self) -> Option<String> {
        Some(self.union.name.clone())
    }

    fn description(&self) -> Option<String> {
        self.union.description.clone()
    }

    fn possible_types(&self) -> Option<Vec<__Type>> {
        Some(
            self.union
                .members
                .iter()
                .filter_map(|x| self.model.nodes.get(x))
                .map(|x| node_type(&self.model, x))
                .collect(),
        )
    }
}

#[derive(Clone, Debug)]
pub enum ConnectionSource {
    Root(Arc<Node>),
    Relation(RelationRef),
}

#[derive(Clone, Debug)]
pub struct ConnectionType {
    pub model: Arc<EntityModel>,
    pub source: ConnectionSource,
}

impl ___Type for ConnectionType {
    fn kind(&self) -> __TypeKind {
        __TypeKind::OBJECT
    }

    fn name(&self) -> Option<String> {
        Some(match &self.source {
            ConnectionSource::Root(node) => format!("{}Connection", node.pascal_plural),
            ConnectionSource::Relation(rel) => format!("{}Connection", rel.prefix()),
        })
    }

    fn fields(&self, _include_deprecated: bool) -> Option<Vec<__Field>> {
        Some(vec![
            __Field::new(
                connection::EDGES,
                non_null(list_of_non_null(__Type::Edge(EdgeType {
                    model: Arc::clone(&self.model),
                    source: self.source.clone(),
                }))),
            ),
            __Field::new(connection::TOTAL_COUNT, non_null(int_type())),
            __Field::new(connection::PAGE_INFO, non_null(__Type::PageInfo(PageInfoType))),
        ])
    }
}

#[derive(Clone, Debug)]
pub struct EdgeType {
    pub model: Arc<EntityModel>,
    pub source: ConnectionSource,
}

impl ___Type for EdgeType {
    fn kind(&self) -> __TypeKind {
        __TypeKind::OBJECT
    }

    fn name(&self) -> Option<String> {
        Some(match &self.source {
            ConnectionSource::Root(node) => format!("{}Edge", node.name),
            ConnectionSource::Relation(rel) => format!("{}Relationship", rel.prefix()),
        })
    }

    fn fields(&self, _include_deprecated: bool) -> Option<Vec<__Field>> {
        let mut fields = vec![__Field::new(connection::CURSOR, non_null(string_type()))];
        match &self.source {
            ConnectionSource::Root(node) => {
                fields.push(__Field::new(connection::NODE, non_null(node_type(&self.model, node))))
            }
            ConnectionSource::Relation(rel) => {
                fields.push(__Field::new(
                    connection::NODE,
                    non_null(target_type(&self.model, &rel.field.target)),
                ));
                if let Some(props) = self.model.properties_of(&rel.field) {
                    for p in &props.fields {
                        fields.push(
                            __Field::new(
                                &p.name,
                                wrap(&p.type_meta, primitive_type(&self.model, &p.field_type), p.type_meta.required),
                            )
                            .with_description(p.description.clone())
                            .with_source(FieldSource::Primitive(Arc::clone(p))),
                        );
                    }
                }
            }
        }
        Some(fields)
    }
}

#[derive(Clone, Debug)]
pub struct PageInfoType;

impl ___Type for PageInfoType {
    fn kind(&self) -> __TypeKind {
        __TypeKind::OBJECT
    }

    fn name(&self) -> Option<String> {
        Some("PageInfo".to_string())
    }

    fn fields(&self, _include_deprecated: bool) -> Option<Vec<__Field>> {
        Some(vec![
            __Field::new(page_info::HAS_NEXT_PAGE, non_null(boolean_type())),
            __Field::new(page_info::HAS_PREVIOUS_PAGE, non_null(boolean_type())),
            __Field::new(page_info::START_CURSOR, string_type()),
            __Field::new(page_info::END_CURSOR, string_type()),
        ])
    }
}

/// Whether a field contributes to aggregate selections and filters
pub fn aggregable_kind(field: &PrimitiveField) -> Option<ScalarKind> {
    if field.is_list() || field.is_cypher() {
        return None;
    }
    field
        .scalar()
        .filter(|x| x.is_string_like() || x.is_numeric() || x.is_temporal())
}

#[derive(Clone, Debug)]
pub enum AggregateSelectionKind {
    Scalar(ScalarKind),
    Root(Arc<Node>),
    Relation(RelationRef),
    RelationNode(RelationRef),
    RelationEdge(RelationRef),
}

#[derive(Clone, Debug)]
pub struct AggregateSelectionType {
    pub model: Arc<EntityModel>,
    pub kind: AggregateSelectionKind,
}

impl AggregateSelectionType {
    fn scalar_field(&self, field: &Arc<PrimitiveField>) -> Option<__Field> {
        aggregable_kind(field).map(|kind| {
            __Field::new(
                &field.name,
                non_null(__Type::AggregateSelection(AggregateSelectionType {
                    model: Arc::clone(&self.model),
                    kind: AggregateSelectionKind::Scalar(kind),
                })),
            )
            .with_source(FieldSource::Primitive(Arc::clone(field)))
        })
    }

    fn relation_target(&self, rel: &RelationRef) -> Option<Arc<Node>> {
        match &rel.field.target {
            RelationTarget::Node(x) => self.model.nodes.get(x).cloned(),
            _ => None,
        }
    }
}

impl ___Type for AggregateSelectionType {
    fn kind(&self) -> __TypeKind {
        __TypeKind::OBJECT
    }

    fn name(&self) -> Option<String> {
        Some(match &self.kind {
            AggregateSelectionKind::Scalar(kind) => format!("{}AggregateSelection", kind.name()),
            AggregateSelectionKind::Root(node) => format!("{}AggregateSelection", node.name),
            AggregateSelectionKind::Relation(rel) => {
                format!("{}AggregationSelection", rel.aggregation_prefix())
            }
            AggregateSelectionKind::RelationNode(rel) => {
                format!("{}NodeAggregateSelection", rel.aggregation_prefix())
            }
            AggregateSelectionKind::RelationEdge(rel) => {
                format!("{}EdgeAggregateSelection", rel.aggregation_prefix())
            }
        })
    }

    fn fields(&self, _include_deprecated: bool) -> Option<Vec<__Field>> {
        let fields = match &self.kind {
            AggregateSelectionKind::Scalar(kind) => {
                let own = scalar(*kind);
                match kind {
                    k if k.is_string_like() => vec![
                        __Field::new(aggregate::SHORTEST, own.clone()),
                        __Field::new(aggregate::LONGEST, own),
                    ],
                    ScalarKind::Int => vec![
                        __Field::new(aggregate::MAX, own.clone()),
                        __Field::new(aggregate::MIN, own.clone()),
                        __Field::new(aggregate::AVERAGE, scalar(ScalarKind::Float)),
                        __Field::new(aggregate::SUM, own),
                    ],
                    k if k.is_numeric() => vec![
                        __Field::new(aggregate::MAX, own.clone()),
                        __Field::new(aggregate::MIN, own.clone()),
                        __Field::new(aggregate::AVERAGE, own.clone()),
                        __Field::new(aggregate::SUM, own),
                    ],
                    _ => vec![
                        __Field::new(aggregate::MIN, own.clone()),
                        __Field::new(aggregate::MAX, own),
                    ],
                }
            }
            AggregateSelectionKind::Root(node) => {
                let mut fields = vec![__Field::new(aggregate::COUNT, non_null(int_type()))];
                fields.extend(node.primitives().filter_map(|f| self.scalar_field(f)));
                fields
            }
            AggregateSelectionKind::Relation(rel) => {
                let mut fields = vec![__Field::new(aggregate::COUNT, non_null(int_type()))];
                let node_fields = self
                    .relation_target(rel)
                    .map(|t| t.primitives().filter(|f| aggregable_kind(f).is_some()).count())
                    .unwrap_or(0);
                if node_fields > 0 {
                    fields.push(__Field::new(
                        connection::NODE,
                        __Type::AggregateSelection(AggregateSelectionType {
                            model: Arc::clone(&self.model),
                            kind: AggregateSelectionKind::RelationNode(rel.clone()),
                        }),
                    ));
                }
                let edge_fields = self
                    .model
                    .properties_of(&rel.field)
                    .map(|p| p.fields.iter().filter(|f| aggregable_kind(f).is_some()).count())
                    .unwrap_or(0);
                if edge_fields > 0 {
                    fields.push(__Field::new(
                        connection::EDGE,
                        __Type::AggregateSelection(AggregateSelectionType {
                            model: Arc::clone(&self.model),
                            kind: AggregateSelectionKind::RelationEdge(rel.clone()),
                        }),
                    ));
                }
                fields
            }
            AggregateSelectionKind::RelationNode(rel) => match self.relation_target(rel) {
                Some(target) => target
                    .primitives()
                    .filter_map(|f| self.scalar_field(f))
                    .collect(),
                None => vec![],
            },
            AggregateSelectionKind::RelationEdge(rel) => match self.model.properties_of(&rel.field) {
                Some(props) => props
                    .fields
                    .iter()
                    .filter_map(|f| self.scalar_field(f))
                    .collect(),
                None => vec![],
            },
        };
        Some(fields)
    }
}

#[derive(Clone, Debug)]
pub struct QueryType {
    pub model: Arc<EntityModel>,
}

impl ___Type for QueryType {
    fn kind(&self) -> __TypeKind {
        __TypeKind::OBJECT
    }

    fn name(&self) -> Option<String> {
        Some("Query".to_string())
    }

    fn fields(&self, _include_deprecated: bool) -> Option<Vec<__Field>> {
        let mut fields = vec![];

        for node in self.model.nodes.values() {
            let where_ = __InputValue::new("where", node_where_type(&self.model, node));

            fields.push(
                __Field::new(&node.plural, non_null(list_of_non_null(node_type(&self.model, node))))
                    .with_args(vec![
                        where_.clone(),
                        __InputValue::new(
                            "options",
                            input_type(&self.model, InputKind::Options(Entity::Node(Arc::clone(node)))),
                        ),
                    ])
                    .with_source(FieldSource::Read(Arc::clone(node))),
            );

            let mut connection_args = vec![where_.clone()];
            if sort_exists(&Entity::Node(Arc::clone(node))) {
                connection_args.push(__InputValue::new(
                    "sort",
                    list(input_type(&self.model, InputKind::Sort(Entity::Node(Arc::clone(node))))),
                ));
            }
            connection_args.push(__InputValue::new("first", int_type()));
            connection_args.push(__InputValue::new("after", string_type()));
            fields.push(
                __Field::new(
                    &format!("{}Connection", node.plural),
                    non_null(__Type::Connection(ConnectionType {
                        model: Arc::clone(&self.model),
                        source: ConnectionSource::Root(Arc::clone(node)),
                    })),
                )
                .with_args(connection_args)
                .with_source(FieldSource::Connection(Arc::clone(node))),
            );

            fields.push(
                __Field::new(
                    &format!("{}Aggregate", node.plural),
                    non_null(__Type::AggregateSelection(AggregateSelectionType {
                        model: Arc::clone(&self.model),
                        kind: AggregateSelectionKind::Root(Arc::clone(node)),
                    })),
                )
                .with_args(vec![where_])
                .with_source(FieldSource::Aggregate(Arc::clone(node))),
            );
        }
        Some(fields)
    }
}

#[derive(Clone, Debug)]
pub struct MutationType {
    pub model: Arc<EntityModel>,
}

impl ___Type for MutationType {
    fn kind(&self) -> __TypeKind {
        __TypeKind::OBJECT
    }

    fn name(&self) -> Option<String> {
        Some("Mutation".to_string())
    }

    fn fields(&self, _include_deprecated: bool) -> Option<Vec<__Field>> {
        let mut fields = vec![];

        for node in self.model.nodes.values() {
            let entity = Entity::Node(Arc::clone(node));

            if node.allows_mutation(MutationOperation::Create) {
                fields.push(
                    __Field::new(
                        &format!("create{}", node.pascal_plural),
                        non_null(__Type::MutationResponse(MutationResponseType {
                            model: Arc::clone(&self.model),
                            node: Arc::clone(node),
                            operation: MutationOperation::Create,
                        })),
                    )
                    .with_args(vec![__InputValue::new(
                        "input",
                        non_null(list_of_non_null(input_type(
                            &self.model,
                            InputKind::Create(entity.clone()),
                        ))),
                    )])
                    .with_source(FieldSource::Create(Arc::clone(node))),
                );
            }

            if node.allows_mutation(MutationOperation::Update) {
                let mut args = vec![
                    __InputValue::new("where", node_where_type(&self.model, node)),
                    __InputValue::new("update", input_type(&self.model, InputKind::Update(entity.clone()))),
                ];
                for (name, kind, exists) in [
                    ("connect", InputKind::NodeConnect(Arc::clone(node)), has_nested(node, NestedInput::Connect, &self.model)),
                    ("disconnect", InputKind::NodeDisconnect(Arc::clone(node)), has_nested(node, NestedInput::Disconnect, &self.model)),
                    ("create", InputKind::NodeRelation(Arc::clone(node)), has_nested(node, NestedInput::Create, &self.model)),
                    ("delete", InputKind::NodeDelete(Arc::clone(node)), has_nested(node, NestedInput::Delete, &self.model)),
                    ("connectOrCreate", InputKind::NodeConnectOrCreate(Arc::clone(node)), has_nested(node, NestedInput::ConnectOrCreate, &self.model)),
                ] {
                    if exists {
                        args.push(__InputValue::new(name, input_type(&self.model, kind)));
                    }
                }
                fields.push(
                    __Field::new(
                        &format!("update{}", node.pascal_plural),
                        non_null(__Type::MutationResponse(MutationResponseType {
                            model: Arc::clone(&self.model),
                            node: Arc::clone(node),
                            operation: MutationOperation::Update,
                        })),
                    )
                    .with_args(args)
                    .with_source(FieldSource::Update(Arc::clone(node))),
                );
            }

            if node.allows_mutation(MutationOperation::Delete) {
                let mut args = vec![__InputValue::new("where", node_where_type(&self.model, node))];
                if has_nested(node, NestedInput::Delete, &self.model) {
                    args.push(__InputValue::new(
                        "delete",
                        input_type(&self.model, InputKind::NodeDelete(Arc::clone(node))),
                    ));
                }
                fields.push(
                    __Field::new(
                        &format!("delete{}", node.pascal_plural),
                        non_null(__Type::Info(InfoType {
                            operation: MutationOperation::Delete,
                        })),
                    )
                    .with_args(args)
                    .with_source(FieldSource::Delete(Arc::clone(node))),
                );
            }
        }
        Some(fields)
    }
}

#[derive(Clone, Debug)]
pub struct MutationResponseType {
    pub model: Arc<EntityModel>,
    pub node: Arc<Node>,
    pub operation: MutationOperation,
}

impl ___Type for MutationResponseType {
    fn kind(&self) -> __TypeKind {
        __TypeKind::OBJECT
    }

    fn name(&self) -> Option<String> {
        let verb = match self.operation {
            MutationOperation::Create => "Create",
            MutationOperation::Update => "Update",
            MutationOperation::Delete => "Delete",
        };
        Some(format!("{}{}MutationResponse", verb, self.node.pascal_plural))
    }

    fn fields(&self, _include_deprecated: bool) -> Option<Vec<__Field>> {
        Some(vec![
            __Field::new(
                mutation_names::INFO,
                non_null(__Type::Info(InfoType {
                    operation: self.operation,
                })),
            ),
            __Field::new(
                &self.node.plural,
                non_null(list_of_non_null(node_type(&self.model, &self.node))),
            )
            .with_source(FieldSource::Read(Arc::clone(&self.node))),
        ])
    }
}

/// `CreateInfo`, `UpdateInfo` and `DeleteInfo`
#[derive(Clone, Debug)]
pub struct InfoType {
    pub operation: MutationOperation,
}

impl ___Type for InfoType {
    fn kind(&self) -> __TypeKind {
        __TypeKind::OBJECT
    }

    fn name(&self) -> Option<String> {
        Some(
            match self.operation {
                MutationOperation::Create => "CreateInfo",
                MutationOperation::Update => "UpdateInfo",
                MutationOperation::Delete => "DeleteInfo",
            }
            .to_string(),
        )
    }

    fn fields(&self, _include_deprecated: bool) -> Option<Vec<__Field>> {
        let counter = |name: &str| __Field::new(name, non_null(int_type()));
        let mut fields = vec![__Field::new(mutation_names::BOOKMARK, string_type())];
        match self.operation {
            MutationOperation::Create => {
                fields.push(counter(mutation_names::NODES_CREATED));
                fields.push(counter(mutation_names::RELATIONSHIPS_CREATED));
            }
            MutationOperation::Update => {
                fields.push(counter(mutation_names::NODES_CREATED));
                fields.push(counter(mutation_names::NODES_DELETED));
                fields.push(counter(mutation_names::RELATIONSHIPS_CREATED));
                fields.push(counter(mutation_names::RELATIONSHIPS_DELETED));
            }
            MutationOperation::Delete => {
                fields.push(counter(mutation_names::NODES_DELETED));
                fields.push(counter(mutation_names::RELATIONSHIPS_DELETED));
            }
        }
        Some(fields)
    }
}

/// Input objects reachable from the arguments of the given output types
fn reachable_input_types(output_types: &[__Type]) -> Vec<__Type> {
    let mut queue: VecDeque<__Type> = VecDeque::new();
    for type_ in output_types {
        for field in type_.fields(true).unwrap_or_default() {
            queue.extend(field.args.iter().map(|arg| arg.type_().unmodified_type()));
        }
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut res = vec![];
    while let Some(type_) = queue.pop_front() {
        if !matches!(type_, __Type::Input(_)) {
            continue;
        }
        let name = match type_.name() {
            Some(name) => name,
            None => continue,
        };
        if !seen.insert(name) {
            continue;
        }
        for field in type_.input_fields().unwrap_or_default() {
            queue.push_back(field.type_().unmodified_type());
        }
        res.push(type_);
    }
    res
}

#[derive(Clone, Debug)]
pub struct __Schema {
    pub model: Arc<EntityModel>,
}

impl __Schema {
    pub fn new(model: Arc<EntityModel>) -> Self {
        Self { model }
    }

    // types: [__Type!]!
    pub fn types(&self) -> Vec<__Type> {
        let model = &self.model;
        let mut types_: Vec<__Type> = vec![
            __Type::PageInfo(PageInfoType),
            EnumType::sort_direction(),
            __Type::Query(QueryType {
                model: Arc::clone(model),
            }),
        ];

        if self.mutations_exist() {
            types_.push(__Type::Mutation(MutationType {
                model: Arc::clone(model),
            }));
            for operation in [
                MutationOperation::Create,
                MutationOperation::Update,
                MutationOperation::Delete,
            ] {
                types_.push(__Type::Info(InfoType { operation }));
            }
        }

        let mut scalar_kinds = vec![];
        let mut aggregate_kinds = vec![];
        let mut primitive_fields: Vec<&Arc<PrimitiveField>> = vec![];
        for node in model.nodes.values() {
            primitive_fields.extend(node.primitives());
        }
        for props in model.relationship_properties.values() {
            primitive_fields.extend(props.fields.iter());
        }
        for field in primitive_fields {
            if let Some(kind) = field.scalar() {
                if !kind.is_builtin_graphql() && !scalar_kinds.contains(&kind) {
                    scalar_kinds.push(kind);
                }
            }
            if let Some(kind) = aggregable_kind(field) {
                if !aggregate_kinds.contains(&kind) {
                    aggregate_kinds.push(kind);
                }
            }
        }
        for kind in scalar_kinds {
            types_.push(scalar(kind));
        }
        for name in &model.scalars {
            types_.push(__Type::Scalar(Scalar::Custom(name.clone())));
        }
        for kind in aggregate_kinds {
            types_.push(__Type::AggregateSelection(AggregateSelectionType {
                model: Arc::clone(model),
                kind: AggregateSelectionKind::Scalar(kind),
            }));
        }

        for enum_ in model.enums.values() {
            types_.push(__Type::Enum(EnumType {
                kind: EnumKind::User(Arc::clone(enum_)),
            }));
        }

        for union in model.unions.values() {
            types_.push(__Type::Union(UnionType {
                model: Arc::clone(model),
                union: Arc::clone(union),
            }));
        }

        for interface in model.interfaces.values() {
            types_.push(__Type::Interface(InterfaceType {
                model: Arc::clone(model),
                interface: Arc::clone(interface),
            }));
            types_.push(__Type::Enum(EnumType {
                kind: EnumKind::Implementation(Arc::clone(interface)),
            }));
            for rel in interface.relations() {
                self.push_relation_output_types(&mut types_, &RelationRef::new(&interface.name, rel));
            }
        }

        for node in model.nodes.values() {
            types_.push(node_type(model, node));
            types_.push(__Type::Connection(ConnectionType {
                model: Arc::clone(model),
                source: ConnectionSource::Root(Arc::clone(node)),
            }));
            types_.push(__Type::Edge(EdgeType {
                model: Arc::clone(model),
                source: ConnectionSource::Root(Arc::clone(node)),
            }));
            types_.push(__Type::AggregateSelection(AggregateSelectionType {
                model: Arc::clone(model),
                kind: AggregateSelectionKind::Root(Arc::clone(node)),
            }));
            for operation in [MutationOperation::Create, MutationOperation::Update] {
                if node.allows_mutation(operation) {
                    types_.push(__Type::MutationResponse(MutationResponseType {
                        model: Arc::clone(model),
                        node: Arc::clone(node),
                        operation,
                    }));
                }
            }
            for rel in node.relations() {
                let relation = RelationRef::new(&node.name, rel);
                self.push_relation_output_types(&mut types_, &relation);
                if rel.aggregate {
                    if let RelationTarget::Node(_) = &rel.target {
                        let aggregate = AggregateSelectionType {
                            model: Arc::clone(model),
                            kind: AggregateSelectionKind::Relation(relation.clone()),
                        };
                        for field in aggregate.fields(true).unwrap_or_default() {
                            types_.push(field.type_().unmodified_type());
                        }
                        types_.push(__Type::AggregateSelection(aggregate));
                    }
                }
            }
        }

        let inputs = reachable_input_types(&types_);
        types_.extend(inputs);

        types_.sort_by_key(|a| a.name());
        types_.dedup_by_key(|a| a.name());
        types_
    }

    fn push_relation_output_types(&self, types_: &mut Vec<__Type>, relation: &RelationRef) {
        types_.push(__Type::Connection(ConnectionType {
            model: Arc::clone(&self.model),
            source: ConnectionSource::Relation(relation.clone()),
        }));
        types_.push(__Type::Edge(EdgeType {
            model: Arc::clone(&self.model),
            source: ConnectionSource::Relation(relation.clone()),
        }));
    }

    #[cfg(test)]
    pub fn type_map(&self) -> HashMap<String, __Type> {
        self.types()
            .into_iter()
            .filter_map(|x| x.name().map(|name| (name, x)))
            .collect()
    }

    pub fn mutations_exist(&self) -> bool {
        self.model.nodes.values().any(|x| !x.mutations.is_empty())
    }

    // queryType: __Type!
    pub fn query_type(&self) -> __Type {
        __Type::Query(QueryType {
            model: Arc::clone(&self.model),
        })
    }

    // mutationType: __Type
    pub fn mutation_type(&self) -> Option<__Type> {
        match self.mutations_exist() {
            true => Some(__Type::Mutation(MutationType {
                model: Arc::clone(&self.model),
            })),
            false => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Config;
    use graphql_parser::schema::parse_schema;

    pub fn schema(sdl: &str) -> __Schema {
        let doc = parse_schema::<String>(sdl).unwrap();
        __Schema::new(Arc::new(EntityModel::build(&doc, &Config::default()).unwrap()))
    }

    const MOVIES: &str = r#"
        type Movie {
            title: String!
            runtime: Int
            actors: [Actor!]! @relationship(type: "ACTED_IN", direction: IN, properties: "ActedIn")
        }
        type Actor { name: String! }
        type ActedIn @relationshipProperties { screenTime: Int }
    "#;

    #[test]
    fn root_fields_follow_naming_convention() {
        let schema = schema(MOVIES);
        let query = schema.query_type().field_map();
        assert_eq!(query["movies"].type_().render(), "[Movie!]!");
        assert_eq!(query["moviesConnection"].type_().render(), "MoviesConnection!");
        assert_eq!(query["moviesAggregate"].type_().render(), "MovieAggregateSelection!");

        let mutation = schema.mutation_type().unwrap().field_map();
        assert_eq!(mutation["createMovies"].type_().render(), "CreateMoviesMutationResponse!");
        assert_eq!(mutation["updateMovies"].type_().render(), "UpdateMoviesMutationResponse!");
        assert_eq!(mutation["deleteMovies"].type_().render(), "DeleteInfo!");
        let update_args: Vec<String> = mutation["updateMovies"].args.iter().map(|x| x.name()).collect();
        assert_eq!(
            update_args,
            vec!["where", "update", "connect", "disconnect", "create", "delete"]
        );
    }

    #[test]
    fn relationship_fields_expose_aggregate_and_connection() {
        let schema = schema(MOVIES);
        let movie = schema.type_map()["Movie"].field_map();
        assert_eq!(movie["actors"].type_().render(), "[Actor!]!");
        assert_eq!(
            movie["actorsAggregate"].type_().render(),
            "MovieActorActorsAggregationSelection"
        );
        assert_eq!(movie["actorsConnection"].type_().render(), "MovieActorsConnection!");
        assert_eq!(
            movie["actors"].get_arg("directed").unwrap().default_value.as_deref(),
            Some("true")
        );
    }

    #[test]
    fn relationship_edges_carry_properties() {
        let schema = schema(MOVIES);
        let types = schema.type_map();
        let edge = types["MovieActorsRelationship"].field_map();
        assert_eq!(edge["cursor"].type_().render(), "String!");
        assert_eq!(edge["node"].type_().render(), "Actor!");
        assert_eq!(edge["screenTime"].type_().render(), "Int");
        let aggregation = types["MovieActorActorsAggregationSelection"].field_map();
        assert!(aggregation.contains_key("node"));
        assert!(aggregation.contains_key("edge"));
    }

    #[test]
    fn type_listing_is_sorted_and_unique() {
        let schema = schema(MOVIES);
        let names: Vec<String> = schema.types().iter().filter_map(|x| x.name()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
        assert!(names.contains(&"IntAggregateSelection".to_string()));
        assert!(names.contains(&"StringAggregateSelection".to_string()));
    }

    #[test]
    fn mutation_directive_limits_root_fields() {
        let schema = schema(r#"type Log @mutation(operations: [CREATE]) { message: String }"#);
        let mutation = schema.mutation_type().unwrap().field_map();
        assert!(mutation.contains_key("createLogs"));
        assert!(!mutation.contains_key("updateLogs"));
        assert!(!mutation.contains_key("deleteLogs"));
    }
}
