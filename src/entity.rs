//! The directive-free model every later stage works from.
//!
//! Built once per type definition document. Generated type names, filters and
//! statements are all derived from the structures here.

use crate::auth::{parse_auth, AuthFieldLookup, AuthRules, AuthSource};
use crate::context::Config;
use crate::directives::{
    CypherDirective, FieldDirectives, MutationOperation, NestedOperation, PopulatedByDirective,
    QueryDirection, RawAuth, RelationshipDirection, TypeDirectives, WriteOperation,
};
use crate::error::{GraphQLError, GraphQLResult};
use graphql_parser::schema::{Definition, Document, Field, Type, TypeDefinition};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    ID,
    String,
    Int,
    Float,
    Boolean,
    BigInt,
    DateTime,
    Date,
    Time,
    LocalTime,
    LocalDateTime,
    Duration,
}

impl ScalarKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "ID" => Self::ID,
            "String" => Self::String,
            "Int" => Self::Int,
            "Float" => Self::Float,
            "Boolean" => Self::Boolean,
            "BigInt" => Self::BigInt,
            "DateTime" => Self::DateTime,
            "Date" => Self::Date,
            "Time" => Self::Time,
            "LocalTime" => Self::LocalTime,
            "LocalDateTime" => Self::LocalDateTime,
            "Duration" => Self::Duration,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ID => "ID",
            Self::String => "String",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::Boolean => "Boolean",
            Self::BigInt => "BigInt",
            Self::DateTime => "DateTime",
            Self::Date => "Date",
            Self::Time => "Time",
            Self::LocalTime => "LocalTime",
            Self::LocalDateTime => "LocalDateTime",
            Self::Duration => "Duration",
        }
    }

    pub fn is_builtin_graphql(&self) -> bool {
        matches!(
            self,
            Self::ID | Self::String | Self::Int | Self::Float | Self::Boolean
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float | Self::BigInt)
    }

    pub fn is_string_like(&self) -> bool {
        matches!(self, Self::ID | Self::String)
    }

    pub fn is_temporal(&self) -> bool {
        self.cypher_constructor().is_some()
    }

    /// Supports `_LT`, `_GT` and friends
    pub fn is_comparable(&self) -> bool {
        self.is_numeric() || self.is_temporal()
    }

    /// Cypher function wrapping parameters of this type
    pub fn cypher_constructor(&self) -> Option<&'static str> {
        match self {
            Self::DateTime => Some("datetime"),
            Self::Date => Some("date"),
            Self::Time => Some("time"),
            Self::LocalTime => Some("localtime"),
            Self::LocalDateTime => Some("localdatetime"),
            Self::Duration => Some("duration"),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    Scalar(ScalarKind),
    Enum(String),
    CustomScalar(String),
}

impl FieldType {
    pub fn scalar(&self) -> Option<ScalarKind> {
        match self {
            Self::Scalar(x) => Some(*x),
            _ => None,
        }
    }
}

/// Nullability and list wrapping of a declared field type
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeMeta {
    pub name: String,
    pub required: bool,
    pub list: bool,
    pub list_item_required: bool,
}

impl TypeMeta {
    pub fn from_type(type_: &Type<'_, String>) -> GraphQLResult<Self> {
        let (inner, required) = match type_ {
            Type::NonNullType(x) => (x.as_ref(), true),
            other => (other, false),
        };
        match inner {
            Type::NamedType(name) => Ok(Self {
                name: name.clone(),
                required,
                list: false,
                list_item_required: false,
            }),
            Type::ListType(item) => {
                let (item, list_item_required) = match item.as_ref() {
                    Type::NonNullType(x) => (x.as_ref(), true),
                    other => (other, false),
                };
                match item {
                    Type::NamedType(name) => Ok(Self {
                        name: name.clone(),
                        required,
                        list: true,
                        list_item_required,
                    }),
                    _ => Err(GraphQLError::schema_validation(
                        "Nested list types are not supported",
                    )),
                }
            }
            Type::NonNullType(_) => Err(GraphQLError::schema_validation("Invalid type")),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IdField {
    pub autogenerate: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PrimitiveField {
    pub name: String,
    pub description: Option<String>,
    pub type_meta: TypeMeta,
    pub field_type: FieldType,
    /// Property name in the database, differs from `name` under `@alias`
    pub db_property: String,
    pub unique: bool,
    pub id: Option<IdField>,
    pub timestamps: BTreeSet<WriteOperation>,
    pub default_value: Option<serde_json::Value>,
    pub populated_by: Option<PopulatedByDirective>,
    pub cypher: Option<CypherDirective>,
    /// User directives re-exposed on the generated object type
    pub directives: Vec<String>,
}

impl PrimitiveField {
    pub fn is_list(&self) -> bool {
        self.type_meta.list
    }

    pub fn scalar(&self) -> Option<ScalarKind> {
        self.field_type.scalar()
    }

    pub fn is_cypher(&self) -> bool {
        self.cypher.is_some()
    }

    pub fn is_unique(&self) -> bool {
        self.unique || self.id.is_some()
    }

    pub fn is_autogenerated_id(&self) -> bool {
        self.id.as_ref().map(|x| x.autogenerate).unwrap_or(false)
    }

    /// Fields accepted in create inputs
    pub fn is_creatable(&self) -> bool {
        !self.is_cypher()
            && !self.is_autogenerated_id()
            && self.timestamps.is_empty()
            && self
                .populated_by
                .as_ref()
                .map(|x| !x.operations.contains(&WriteOperation::Create))
                .unwrap_or(true)
    }

    /// Fields accepted in update inputs
    pub fn is_updatable(&self) -> bool {
        !self.is_cypher()
            && !self.is_autogenerated_id()
            && self.timestamps.is_empty()
            && self
                .populated_by
                .as_ref()
                .map(|x| !x.operations.contains(&WriteOperation::Update))
                .unwrap_or(true)
    }

    /// Fields usable in filters and sorts
    pub fn is_filterable(&self) -> bool {
        !self.is_cypher()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RelationTarget {
    Node(String),
    Union { name: String, members: Vec<String> },
    Interface { name: String, implementations: Vec<String> },
}

impl RelationTarget {
    pub fn name(&self) -> &str {
        match self {
            Self::Node(x) => x,
            Self::Union { name, .. } | Self::Interface { name, .. } => name,
        }
    }

    pub fn is_union(&self) -> bool {
        matches!(self, Self::Union { .. })
    }

    pub fn is_abstract(&self) -> bool {
        !matches!(self, Self::Node(_))
    }

    /// Concrete node types reachable through the target
    pub fn concrete(&self) -> Vec<&str> {
        match self {
            Self::Node(x) => vec![x.as_str()],
            Self::Union { members, .. } => members.iter().map(String::as_str).collect(),
            Self::Interface {
                implementations, ..
            } => implementations.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RelationField {
    pub name: String,
    pub description: Option<String>,
    pub type_meta: TypeMeta,
    pub rel_type: String,
    pub direction: RelationshipDirection,
    pub query_direction: QueryDirection,
    pub properties: Option<String>,
    pub nested_operations: BTreeSet<NestedOperation>,
    pub aggregate: bool,
    pub target: RelationTarget,
    /// Declared with `@declareRelationship`, concrete types carry the pattern
    pub declared: bool,
    pub directives: Vec<String>,
}

impl RelationField {
    pub fn is_list(&self) -> bool {
        self.type_meta.list
    }

    pub fn allows(&self, op: NestedOperation) -> bool {
        self.nested_operations.contains(&op)
    }

    /// Arrow ends for a pattern starting at the owning node
    pub fn arrows(&self, directed: bool) -> (&'static str, &'static str) {
        match (directed, self.direction) {
            (false, _) => ("-", "-"),
            (true, RelationshipDirection::In) => ("<-", "-"),
            (true, RelationshipDirection::Out) => ("-", "->"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EntityField {
    Primitive(Arc<PrimitiveField>),
    Relation(Arc<RelationField>),
}

impl EntityField {
    pub fn name(&self) -> &str {
        match self {
            Self::Primitive(x) => &x.name,
            Self::Relation(x) => &x.name,
        }
    }
}

fn primitives_of(fields: &[EntityField]) -> impl Iterator<Item = &Arc<PrimitiveField>> {
    fields.iter().filter_map(|x| match x {
        EntityField::Primitive(p) => Some(p),
        _ => None,
    })
}

fn relations_of(fields: &[EntityField]) -> impl Iterator<Item = &Arc<RelationField>> {
    fields.iter().filter_map(|x| match x {
        EntityField::Relation(r) => Some(r),
        _ => None,
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub name: String,
    pub description: Option<String>,
    /// Root query field name, e.g. `movies`
    pub plural: String,
    /// Used in mutation names, e.g. `Movies` in `createMovies`
    pub pascal_plural: String,
    pub fields: Vec<EntityField>,
    pub interfaces: Vec<String>,
    /// Interface groups first, then the type's own
    pub auth: Vec<AuthRules>,
    pub field_auth: IndexMap<String, Vec<AuthRules>>,
    pub mutations: BTreeSet<MutationOperation>,
    pub directives: Vec<String>,
}

impl Node {
    pub fn primitives(&self) -> impl Iterator<Item = &Arc<PrimitiveField>> {
        primitives_of(&self.fields)
    }

    pub fn relations(&self) -> impl Iterator<Item = &Arc<RelationField>> {
        relations_of(&self.fields)
    }

    pub fn primitive(&self, name: &str) -> Option<&Arc<PrimitiveField>> {
        self.primitives().find(|x| x.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&Arc<RelationField>> {
        self.relations().find(|x| x.name == name)
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &Arc<PrimitiveField>> {
        self.primitives().filter(|x| x.is_unique() && !x.is_cypher())
    }

    pub fn has_unique_fields(&self) -> bool {
        self.unique_fields().next().is_some()
    }

    pub fn field_auth(&self, field: &str) -> &[AuthRules] {
        self.field_auth.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn allows_mutation(&self, op: MutationOperation) -> bool {
        self.mutations.contains(&op)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Interface {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<EntityField>,
    pub implementations: Vec<String>,
    pub directives: Vec<String>,
}

impl Interface {
    pub fn relations(&self) -> impl Iterator<Item = &Arc<RelationField>> {
        relations_of(&self.fields)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Union {
    pub name: String,
    pub description: Option<String>,
    pub members: Vec<String>,
}

/// Edge payload declared with `@relationshipProperties`
#[derive(Clone, Debug, PartialEq)]
pub struct RelationshipProperties {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<Arc<PrimitiveField>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumDef {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityModel {
    pub nodes: IndexMap<String, Arc<Node>>,
    pub interfaces: IndexMap<String, Arc<Interface>>,
    pub unions: IndexMap<String, Arc<Union>>,
    pub relationship_properties: IndexMap<String, Arc<RelationshipProperties>>,
    pub enums: IndexMap<String, Arc<EnumDef>>,
    pub scalars: Vec<String>,
    pub enable_regex: bool,
    pub subscriptions: bool,
}

impl EntityModel {
    pub fn node(&self, name: &str) -> GraphQLResult<&Arc<Node>> {
        self.nodes
            .get(name)
            .ok_or_else(|| GraphQLError::translation(format!("Unknown node type \"{}\"", name)))
    }

    pub fn properties_of(&self, relation: &RelationField) -> Option<&Arc<RelationshipProperties>> {
        relation
            .properties
            .as_ref()
            .and_then(|x| self.relationship_properties.get(x))
    }

    pub fn concrete_nodes(&self, target: &RelationTarget) -> Vec<Arc<Node>> {
        target
            .concrete()
            .into_iter()
            .filter_map(|x| self.nodes.get(x).cloned())
            .collect()
    }
}

const UNCOUNTABLE: &[&str] = &[
    "series",
    "species",
    "sheep",
    "fish",
    "news",
    "information",
    "equipment",
    "data",
];

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("mouse", "mice"),
];

pub fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

pub fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Pluralizes the last word of a PascalCase or camelCase name
pub fn pluralize(name: &str) -> String {
    let split = name
        .char_indices()
        .filter(|(ix, c)| *ix > 0 && c.is_uppercase())
        .map(|(ix, _)| ix)
        .last()
        .unwrap_or(0);
    let (head, word) = name.split_at(split);
    let lower = word.to_lowercase();

    if UNCOUNTABLE.contains(&lower.as_str()) {
        return name.to_string();
    }
    if let Some((_, plural)) = IRREGULAR.iter().find(|(single, _)| *single == lower) {
        let plural = match word.chars().next().map(|c| c.is_uppercase()) {
            Some(true) => upper_first(plural),
            _ => plural.to_string(),
        };
        return format!("{head}{plural}");
    }

    let consonant_y = lower.ends_with('y')
        && lower
            .chars()
            .rev()
            .nth(1)
            .map(|c| !"aeiou".contains(c))
            .unwrap_or(false);

    if consonant_y {
        format!("{}ies", &name[..name.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|x| lower.ends_with(x)) {
        format!("{name}es")
    } else {
        format!("{name}s")
    }
}

fn is_root_type(name: &str) -> bool {
    matches!(name, "Query" | "Mutation" | "Subscription")
}

/// Names of every type declared in the document, grouped by role
#[derive(Default)]
struct Declared {
    nodes: HashSet<String>,
    interfaces: HashSet<String>,
    unions: HashMap<String, Vec<String>>,
    properties: HashSet<String>,
    enums: HashSet<String>,
    scalars: HashSet<String>,
    implementations: HashMap<String, Vec<String>>,
}

impl Declared {
    fn target(&self, name: &str) -> Option<RelationTarget> {
        if self.nodes.contains(name) {
            Some(RelationTarget::Node(name.to_string()))
        } else if let Some(members) = self.unions.get(name) {
            Some(RelationTarget::Union {
                name: name.to_string(),
                members: members.clone(),
            })
        } else if self.interfaces.contains(name) {
            Some(RelationTarget::Interface {
                name: name.to_string(),
                implementations: self.implementations.get(name).cloned().unwrap_or_default(),
            })
        } else {
            None
        }
    }

    fn field_type(&self, name: &str) -> Option<FieldType> {
        if let Some(x) = ScalarKind::from_name(name) {
            Some(FieldType::Scalar(x))
        } else if self.enums.contains(name) {
            Some(FieldType::Enum(name.to_string()))
        } else if self.scalars.contains(name) {
            Some(FieldType::CustomScalar(name.to_string()))
        } else {
            None
        }
    }
}

fn has_own_metadata(d: &FieldDirectives) -> bool {
    d.alias.is_some()
        || d.unique
        || d.id.is_some()
        || d.timestamp.is_some()
        || d.default.is_some()
        || d.cypher.is_some()
        || d.populated_by.is_some()
}

fn build_primitive(
    owner: &str,
    field: &Field<'_, String>,
    field_type: FieldType,
    directives: FieldDirectives,
) -> GraphQLResult<PrimitiveField> {
    let type_meta = TypeMeta::from_type(&field.field_type)?;
    if directives.unique && type_meta.list {
        return Err(GraphQLError::schema_validation(format!(
            "@unique is not supported on list field {}.{}",
            owner, field.name
        )));
    }
    if directives.cypher.is_some() && (directives.unique || directives.id.is_some()) {
        return Err(GraphQLError::schema_validation(format!(
            "@cypher field {}.{} cannot be unique",
            owner, field.name
        )));
    }

    Ok(PrimitiveField {
        name: field.name.clone(),
        description: field.description.clone(),
        type_meta,
        field_type,
        db_property: directives.alias.unwrap_or_else(|| field.name.clone()),
        unique: directives.unique,
        id: directives.id.map(|autogenerate| IdField { autogenerate }),
        timestamps: directives.timestamp.unwrap_or_default(),
        default_value: directives.default,
        populated_by: directives.populated_by,
        cypher: directives.cypher,
        directives: directives.other,
    })
}

struct FieldBuild {
    fields: Vec<EntityField>,
    raw_auth: Vec<(String, RawAuth)>,
}

/// Builds the fields of a node or interface. `inherited` holds the fields of
/// implemented interfaces, whose metadata applies where the type declares none.
fn build_fields(
    owner: &str,
    declared_fields: &[Field<'_, String>],
    declared: &Declared,
    inherited: &[(EntityField, Option<RawAuth>)],
    is_interface: bool,
) -> GraphQLResult<FieldBuild> {
    let mut fields = vec![];
    let mut raw_auth = vec![];

    for field in declared_fields {
        if !field.arguments.is_empty() {
            return Err(GraphQLError::schema_validation(format!(
                "Field arguments are not supported on {}.{}",
                owner, field.name
            )));
        }
        let directives = FieldDirectives::parse(&field.directives)?;
        let type_meta = TypeMeta::from_type(&field.field_type)?;
        let from_interface = inherited.iter().find(|(x, _)| x.name() == field.name);

        match directives.auth.as_ref().filter(|x| !x.is_empty()) {
            Some(auth) => raw_auth.push((field.name.clone(), auth.clone())),
            None => {
                if let Some((_, Some(auth))) = from_interface {
                    raw_auth.push((field.name.clone(), auth.clone()));
                }
            }
        }

        if let Some(target) = declared.target(&type_meta.name) {
            let relation = match (&directives.relationship, from_interface) {
                (Some(rel), _) => {
                    if let Some(properties) = &rel.properties {
                        if !declared.properties.contains(properties) {
                            return Err(GraphQLError::schema_validation(format!(
                                "The relationship properties type \"{}\" of {}.{} is not declared with @relationshipProperties",
                                properties, owner, field.name
                            )));
                        }
                    }
                    RelationField {
                        name: field.name.clone(),
                        description: field.description.clone(),
                        type_meta,
                        rel_type: rel.rel_type.clone(),
                        direction: rel.direction,
                        query_direction: rel.query_direction,
                        properties: rel.properties.clone(),
                        nested_operations: rel.nested_operations.clone(),
                        aggregate: rel.aggregate,
                        target,
                        declared: false,
                        directives: directives.other.clone(),
                    }
                }
                (None, _) if directives.declare_relationship && is_interface => RelationField {
                    name: field.name.clone(),
                    description: field.description.clone(),
                    type_meta,
                    rel_type: String::new(),
                    direction: RelationshipDirection::Out,
                    query_direction: QueryDirection::DefaultDirected,
                    properties: None,
                    nested_operations: NestedOperation::all(),
                    aggregate: true,
                    target,
                    declared: true,
                    directives: directives.other.clone(),
                },
                (None, Some((EntityField::Relation(inherited), _))) if !inherited.declared => {
                    RelationField {
                        name: field.name.clone(),
                        description: field.description.clone().or(inherited.description.clone()),
                        type_meta,
                        target,
                        ..inherited.as_ref().clone()
                    }
                }
                (None, Some((EntityField::Relation(_), _))) => {
                    return Err(GraphQLError::schema_validation(format!(
                        "Field {}.{} must declare a @relationship, it is declared with @declareRelationship on an interface",
                        owner, field.name
                    )))
                }
                (None, _) if directives.cypher.is_some() => {
                    return Err(GraphQLError::schema_validation(format!(
                        "@cypher field {}.{} must return a scalar or enum type",
                        owner, field.name
                    )))
                }
                (None, _) => {
                    return Err(GraphQLError::schema_validation(format!(
                        "Field {}.{} of type {} requires a @relationship directive",
                        owner, field.name, type_meta.name
                    )))
                }
            };
            fields.push(EntityField::Relation(Arc::new(relation)));
            continue;
        }

        if directives.relationship.is_some() {
            return Err(GraphQLError::schema_validation(format!(
                "@relationship on {}.{} must target a node, union or interface type",
                owner, field.name
            )));
        }
        if declared.properties.contains(&type_meta.name) {
            return Err(GraphQLError::schema_validation(format!(
                "Field {}.{} cannot reference relationship properties type {}",
                owner, field.name, type_meta.name
            )));
        }

        let field_type = declared.field_type(&type_meta.name).ok_or_else(|| {
            GraphQLError::schema_validation(format!(
                "Unknown type \"{}\" on field {}.{}",
                type_meta.name, owner, field.name
            ))
        })?;

        let primitive = match from_interface {
            Some((EntityField::Primitive(base), _)) if !has_own_metadata(&directives) => {
                PrimitiveField {
                    name: field.name.clone(),
                    description: field.description.clone().or(base.description.clone()),
                    type_meta,
                    field_type,
                    directives: directives.other,
                    ..base.as_ref().clone()
                }
            }
            _ => build_primitive(owner, field, field_type, directives)?,
        };
        fields.push(EntityField::Primitive(Arc::new(primitive)));
    }

    for (inherited_field, _) in inherited {
        if let EntityField::Relation(rel) = inherited_field {
            if rel.declared && !fields.iter().any(|x| x.name() == rel.name) {
                return Err(GraphQLError::schema_validation(format!(
                    "Type {} must implement the declared relationship field {}",
                    owner, rel.name
                )));
            }
        }
    }

    Ok(FieldBuild { fields, raw_auth })
}

struct FieldTables<'a> {
    fields: HashMap<String, &'a [EntityField]>,
    declared: &'a Declared,
}

impl AuthFieldLookup for FieldTables<'_> {
    fn primitive(&self, type_name: &str, field: &str) -> Option<Arc<PrimitiveField>> {
        self.fields
            .get(type_name)
            .and_then(|fields| primitives_of(fields).find(|x| x.name == field).cloned())
    }

    fn relation(&self, type_name: &str, field: &str) -> Option<Arc<RelationField>> {
        self.fields
            .get(type_name)
            .and_then(|fields| relations_of(fields).find(|x| x.name == field).cloned())
    }

    fn concrete_targets(&self, relation: &RelationField) -> Vec<String> {
        match self.declared.target(relation.target.name()) {
            Some(target) => target.concrete().into_iter().map(str::to_string).collect(),
            None => vec![],
        }
    }
}

impl EntityModel {
    pub fn build(document: &Document<'_, String>, config: &Config) -> GraphQLResult<Self> {
        let mut declared = Declared::default();
        let mut objects = vec![];
        let mut interfaces = vec![];
        let mut unions = vec![];
        let mut properties = vec![];
        let mut enums = vec![];
        let mut scalars = vec![];

        for definition in &document.definitions {
            let type_def = match definition {
                Definition::TypeDefinition(x) => x,
                Definition::DirectiveDefinition(_) => continue,
                Definition::SchemaDefinition(_) => {
                    return Err(GraphQLError::schema_validation(
                        "Schema definitions are not supported",
                    ))
                }
                Definition::TypeExtension(_) => {
                    return Err(GraphQLError::schema_validation(
                        "Type extensions are not supported",
                    ))
                }
            };
            match type_def {
                TypeDefinition::Object(obj) => {
                    if is_root_type(&obj.name) {
                        return Err(GraphQLError::schema_validation(format!(
                            "Custom root type {} is not supported",
                            obj.name
                        )));
                    }
                    let type_directives = TypeDirectives::parse(&obj.directives)?;
                    if type_directives.relationship_properties {
                        declared.properties.insert(obj.name.clone());
                        properties.push((obj.name.clone(), obj.description.clone(), &obj.fields));
                    } else {
                        declared.nodes.insert(obj.name.clone());
                        for iface in &obj.implements_interfaces {
                            declared
                                .implementations
                                .entry(iface.clone())
                                .or_default()
                                .push(obj.name.clone());
                        }
                        objects.push((obj, type_directives));
                    }
                }
                TypeDefinition::Interface(iface) => {
                    let type_directives = TypeDirectives::parse(&iface.directives)?;
                    if type_directives.relationship_properties {
                        declared.properties.insert(iface.name.clone());
                        properties.push((iface.name.clone(), iface.description.clone(), &iface.fields));
                    } else {
                        declared.interfaces.insert(iface.name.clone());
                        interfaces.push((iface, type_directives));
                    }
                }
                TypeDefinition::Union(union) => {
                    declared
                        .unions
                        .insert(union.name.clone(), union.types.clone());
                    unions.push(union);
                }
                TypeDefinition::Enum(enum_) => {
                    declared.enums.insert(enum_.name.clone());
                    enums.push(EnumDef {
                        name: enum_.name.clone(),
                        description: enum_.description.clone(),
                        values: enum_.values.iter().map(|x| x.name.clone()).collect(),
                    });
                }
                TypeDefinition::Scalar(scalar) => {
                    if ScalarKind::from_name(&scalar.name).is_none() {
                        declared.scalars.insert(scalar.name.clone());
                        scalars.push(scalar.name.clone());
                    }
                }
                TypeDefinition::InputObject(input) => {
                    return Err(GraphQLError::schema_validation(format!(
                        "Input type {} is not supported in type definitions",
                        input.name
                    )))
                }
            }
        }

        for union in &unions {
            for member in &union.types {
                if !declared.nodes.contains(member) {
                    return Err(GraphQLError::schema_validation(format!(
                        "Union {} member {} is not a node type",
                        union.name, member
                    )));
                }
            }
        }

        let mut model = EntityModel {
            enable_regex: config.enable_regex,
            subscriptions: config.subscriptions_enabled(),
            scalars,
            ..Default::default()
        };

        for (name, description, fields) in properties {
            let built = build_fields(&name, fields, &declared, &[], false)?;
            let mut props = vec![];
            for field in built.fields {
                match field {
                    EntityField::Primitive(p) => props.push(p),
                    EntityField::Relation(r) => {
                        return Err(GraphQLError::schema_validation(format!(
                            "Relationship properties type {} cannot declare relationship field {}",
                            name, r.name
                        )))
                    }
                }
            }
            model.relationship_properties.insert(
                name.clone(),
                Arc::new(RelationshipProperties {
                    name,
                    description,
                    fields: props,
                }),
            );
        }

        let mut interface_fields: HashMap<String, FieldBuild> = HashMap::new();
        for (iface, _) in &interfaces {
            let built = build_fields(&iface.name, &iface.fields, &declared, &[], true)?;
            interface_fields.insert(iface.name.clone(), built);
        }

        let mut node_fields: IndexMap<String, FieldBuild> = IndexMap::new();
        for (obj, _) in &objects {
            let mut inherited = vec![];
            for iface in &obj.implements_interfaces {
                let built = interface_fields.get(iface).ok_or_else(|| {
                    GraphQLError::schema_validation(format!(
                        "Type {} implements unknown interface {}",
                        obj.name, iface
                    ))
                })?;
                for field in &built.fields {
                    let auth = built
                        .raw_auth
                        .iter()
                        .find(|(n, _)| n == field.name())
                        .map(|(_, a)| a.clone());
                    inherited.push((field.clone(), auth));
                }
            }
            let built = build_fields(&obj.name, &obj.fields, &declared, &inherited, false)?;
            node_fields.insert(obj.name.clone(), built);
        }

        // declared interface relationships take their pattern from an implementation
        let mut resolved_interface_fields: HashMap<String, Vec<EntityField>> = HashMap::new();
        for (iface, _) in &interfaces {
            let implementations = declared
                .implementations
                .get(&iface.name)
                .cloned()
                .unwrap_or_default();
            let built = &interface_fields[&iface.name];
            let fields = built
                .fields
                .iter()
                .map(|field| match field {
                    EntityField::Relation(rel) if rel.declared => {
                        let concrete = implementations.iter().find_map(|x| {
                            node_fields
                                .get(x)
                                .and_then(|b| relations_of(&b.fields).find(|r| r.name == rel.name))
                        });
                        match concrete {
                            Some(c) => EntityField::Relation(Arc::new(RelationField {
                                name: rel.name.clone(),
                                description: rel.description.clone(),
                                type_meta: rel.type_meta.clone(),
                                target: rel.target.clone(),
                                declared: true,
                                directives: rel.directives.clone(),
                                ..c.as_ref().clone()
                            })),
                            None => field.clone(),
                        }
                    }
                    _ => field.clone(),
                })
                .collect();
            resolved_interface_fields.insert(iface.name.clone(), fields);
        }

        let tables = FieldTables {
            fields: node_fields
                .iter()
                .map(|(k, v)| (k.clone(), v.fields.as_slice()))
                .collect(),
            declared: &declared,
        };

        let authorization_configured = config.features.authorization.is_some();
        let interface_auth: HashMap<&str, Option<&RawAuth>> = interfaces
            .iter()
            .map(|(i, d)| (i.name.as_str(), d.auth.as_ref()))
            .collect();

        for (obj, type_directives) in &objects {
            let built = &node_fields[&obj.name];
            let mut auth = vec![];

            for iface in &obj.implements_interfaces {
                if let Some(Some(raw)) = interface_auth.get(iface.as_str()) {
                    warn_unconfigured(raw, authorization_configured, iface);
                    let rules = parse_auth(raw, &obj.name, &tables)?;
                    if !rules.is_empty() {
                        auth.push(AuthRules {
                            source: AuthSource::Interface(iface.clone()),
                            rules,
                        });
                    }
                }
            }
            let interface_groups = auth.len();
            if let Some(raw) = &type_directives.auth {
                warn_unconfigured(raw, authorization_configured, &obj.name);
                let rules = parse_auth(raw, &obj.name, &tables)?;
                if !rules.is_empty() {
                    auth.push(AuthRules {
                        source: AuthSource::Type(obj.name.clone()),
                        rules,
                    });
                }
            }
            if interface_groups > 0 && auth.len() > interface_groups {
                tracing::warn!(
                    type_name = %obj.name,
                    "interface and type authorization rules both apply; all of them must hold"
                );
            }

            let mut field_auth = IndexMap::new();
            for (field_name, raw) in &built.raw_auth {
                warn_unconfigured(raw, authorization_configured, &obj.name);
                let rules = parse_auth(raw, &obj.name, &tables)?;
                if !rules.is_empty() {
                    field_auth.insert(
                        field_name.clone(),
                        vec![AuthRules {
                            source: AuthSource::Field {
                                type_name: obj.name.clone(),
                                field: field_name.clone(),
                            },
                            rules,
                        }],
                    );
                }
            }

            let plural = type_directives
                .plural
                .clone()
                .unwrap_or_else(|| pluralize(&obj.name));

            model.nodes.insert(
                obj.name.clone(),
                Arc::new(Node {
                    name: obj.name.clone(),
                    description: obj.description.clone(),
                    plural: lower_first(&plural),
                    pascal_plural: upper_first(&plural),
                    fields: built.fields.clone(),
                    interfaces: obj.implements_interfaces.clone(),
                    auth,
                    field_auth,
                    mutations: type_directives.mutation.clone().unwrap_or_else(|| {
                        [
                            MutationOperation::Create,
                            MutationOperation::Update,
                            MutationOperation::Delete,
                        ]
                        .into_iter()
                        .collect()
                    }),
                    directives: type_directives.other.clone(),
                }),
            );
        }

        for (iface, type_directives) in &interfaces {
            model.interfaces.insert(
                iface.name.clone(),
                Arc::new(Interface {
                    name: iface.name.clone(),
                    description: iface.description.clone(),
                    fields: resolved_interface_fields
                        .remove(&iface.name)
                        .unwrap_or_default(),
                    implementations: declared
                        .implementations
                        .get(&iface.name)
                        .cloned()
                        .unwrap_or_default(),
                    directives: type_directives.other.clone(),
                }),
            );
        }

        for union in unions {
            model.unions.insert(
                union.name.clone(),
                Arc::new(Union {
                    name: union.name.clone(),
                    description: union.description.clone(),
                    members: union.types.clone(),
                }),
            );
        }

        for enum_ in enums {
            model.enums.insert(enum_.name.clone(), Arc::new(enum_));
        }

        Ok(model)
    }
}

fn warn_unconfigured(raw: &RawAuth, configured: bool, type_name: &str) {
    if raw.uses_authorization() && !configured {
        tracing::warn!(
            type_name,
            "@authorization used without features.authorization configured"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthOperation, AuthPredicate};
    use graphql_parser::schema::parse_schema;
    use test_case::test_case;

    fn build(sdl: &str) -> GraphQLResult<EntityModel> {
        let doc = parse_schema::<String>(sdl).unwrap();
        EntityModel::build(&doc, &Config::default())
    }

    #[test_case("Movie", "Movies")]
    #[test_case("Actor", "Actors")]
    #[test_case("Category", "Categories")]
    #[test_case("Day", "Days")]
    #[test_case("Box", "Boxes")]
    #[test_case("Match", "Matches")]
    #[test_case("Person", "People")]
    #[test_case("SalesPerson", "SalesPeople")]
    #[test_case("Series", "Series")]
    #[test_case("Address", "Addresses")]
    fn pluralizes_type_names(single: &str, plural: &str) {
        assert_eq!(pluralize(single), plural);
    }

    #[test]
    fn builds_nodes_relationships_and_aliases() {
        let model = build(
            r#"
            type Movie {
                id: ID! @id
                title: String @alias(property: "name")
                actors: [Actor!]! @relationship(type: "ACTED_IN", direction: IN, properties: "ActedIn")
            }
            type Actor { name: String! movies: [Movie!]! @relationship(type: "ACTED_IN", direction: OUT) }
            type ActedIn @relationshipProperties { screenTime: Int }
            "#,
        )
        .unwrap();

        let movie = model.node("Movie").unwrap();
        assert_eq!(movie.plural, "movies");
        assert_eq!(movie.pascal_plural, "Movies");
        assert_eq!(movie.primitive("title").unwrap().db_property, "name");
        assert!(movie.primitive("id").unwrap().is_autogenerated_id());
        assert!(!movie.primitive("id").unwrap().is_creatable());

        let actors = movie.relation("actors").unwrap();
        assert_eq!(actors.rel_type, "ACTED_IN");
        assert_eq!(actors.direction, RelationshipDirection::In);
        assert_eq!(actors.properties.as_deref(), Some("ActedIn"));
        assert_eq!(actors.target, RelationTarget::Node("Actor".to_string()));
        assert!(model.relationship_properties.contains_key("ActedIn"));
    }

    #[test]
    fn unknown_properties_type_is_rejected() {
        let res = build(
            r#"
            type Movie { actors: [Actor!]! @relationship(type: "ACTED_IN", direction: IN, properties: "Missing") }
            type Actor { name: String }
            "#,
        );
        assert!(matches!(res, Err(GraphQLError::SchemaValidation { .. })));
    }

    #[test]
    fn union_members_must_be_nodes() {
        let res = build(
            r#"
            type Movie { title: String }
            union Search = Movie | Genre
            "#,
        );
        assert!(matches!(res, Err(GraphQLError::SchemaValidation { .. })));
    }

    #[test]
    fn object_fields_require_a_relationship() {
        let res = build("type Movie { director: Person } type Person { name: String }");
        assert!(matches!(res, Err(GraphQLError::SchemaValidation { .. })));
    }

    #[test]
    fn unique_list_fields_are_rejected() {
        let res = build("type Movie { tags: [String!]! @unique }");
        assert!(matches!(res, Err(GraphQLError::SchemaValidation { .. })));
    }

    #[test]
    fn declared_relationships_must_be_implemented() {
        let res = build(
            r#"
            interface Production { actors: [Actor!]! @declareRelationship }
            type Movie implements Production { title: String actors: [Actor!]! }
            type Actor { name: String }
            "#,
        );
        assert!(matches!(res, Err(GraphQLError::SchemaValidation { .. })));

        let model = build(
            r#"
            interface Production { actors: [Actor!]! @declareRelationship }
            type Movie implements Production { actors: [Actor!]! @relationship(type: "ACTED_IN", direction: IN) }
            type Actor { name: String }
            "#,
        )
        .unwrap();
        let iface = &model.interfaces["Production"];
        let actors = iface.relations().next().unwrap();
        assert_eq!(actors.rel_type, "ACTED_IN");
        assert!(actors.declared);
    }

    #[test]
    fn interface_relationships_are_inherited_unless_redeclared() {
        let model = build(
            r#"
            interface Production { actors: [Actor!]! @relationship(type: "ACTED_IN", direction: IN) }
            type Movie implements Production { actors: [Actor!]! }
            type Series implements Production { actors: [Actor!]! @relationship(type: "STARRED_IN", direction: IN) }
            type Actor { name: String }
            "#,
        )
        .unwrap();
        assert_eq!(model.node("Movie").unwrap().relation("actors").unwrap().rel_type, "ACTED_IN");
        assert_eq!(model.node("Series").unwrap().relation("actors").unwrap().rel_type, "STARRED_IN");
        assert_eq!(
            model.interfaces["Production"].implementations,
            vec!["Movie".to_string(), "Series".to_string()]
        );
    }

    #[test]
    fn interface_and_type_auth_rules_are_both_kept() {
        let model = build(
            r#"
            interface Owned @auth(rules: [{ operations: [READ], allow: { owner: "$jwt.sub" } }]) { owner: String }
            type Post implements Owned @auth(rules: [{ operations: [DELETE], roles: ["admin"] }]) { owner: String }
            "#,
        )
        .unwrap();
        let post = model.node("Post").unwrap();
        assert_eq!(post.auth.len(), 2);
        assert_eq!(post.auth[0].source, AuthSource::Interface("Owned".to_string()));
        assert!(post.auth[0].rules[0].applies_to(AuthOperation::Read));
        assert!(!post.auth[0].rules[0].applies_to(AuthOperation::Delete));
        assert_eq!(post.auth[1].rules[0].roles, vec!["admin".to_string()]);
    }

    #[test]
    fn auth_rules_referencing_unknown_fields_are_rejected() {
        let res = build(
            r#"type Post @auth(rules: [{ allow: { author: "$jwt.sub" } }]) { owner: String }"#,
        );
        assert!(matches!(res, Err(GraphQLError::SchemaValidation { .. })));
    }

    #[test]
    fn nested_auth_predicates_resolve_relationships() {
        let model = build(
            r#"
            type Post @auth(rules: [{ operations: [UPDATE], bind: { creator: { id: "$jwt.sub" } } }]) {
                title: String
                creator: User! @relationship(type: "HAS_POST", direction: IN)
            }
            type User { id: ID! }
            "#,
        )
        .unwrap();
        let rule = &model.node("Post").unwrap().auth[0].rules[0];
        match rule.bind.as_ref().unwrap() {
            AuthPredicate::Relationship { field, branches, .. } => {
                assert_eq!(field.name, "creator");
                assert_eq!(branches[0].0, "User");
            }
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn plural_directive_overrides_root_names() {
        let model = build(r#"type Tech @plural(value: "Techies") { name: String }"#).unwrap();
        let tech = model.node("Tech").unwrap();
        assert_eq!(tech.plural, "techies");
        assert_eq!(tech.pascal_plural, "Techies");
    }

    #[test]
    fn type_meta_reads_wrappers() {
        let doc = parse_schema::<String>("type A { a: [String!]! b: Int c: [Int] }").unwrap();
        let fields = match &doc.definitions[0] {
            Definition::TypeDefinition(TypeDefinition::Object(o)) => &o.fields,
            _ => unreachable!(),
        };
        let wrappers: Vec<(String, bool, bool, bool)> = fields
            .iter()
            .map(|f| {
                let meta = TypeMeta::from_type(&f.field_type).unwrap();
                (meta.name, meta.required, meta.list, meta.list_item_required)
            })
            .collect();
        assert_eq!(
            wrappers,
            vec![
                ("String".to_string(), true, true, true),
                ("Int".to_string(), false, false, false),
                ("Int".to_string(), false, true, false),
            ]
        );
    }
}
