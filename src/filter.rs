//! Filter operators and the builders produced from validated `where` inputs.

use crate::entity::{PrimitiveField, RelationField, ScalarKind};
use crate::error::{GraphQLError, GraphQLResult};
use crate::graphql::*;
use crate::gson;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Equal,
    In,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
    LessThan,
    LessThanEqualTo,
    GreaterThan,
    GreaterThanEqualTo,
    Includes,
}

impl FilterOp {
    /// Key suffixes, longest match first. The flag marks negated forms.
    pub const SUFFIXES: &'static [(&'static str, FilterOp, bool)] = &[
        ("_NOT_INCLUDES", FilterOp::Includes, true),
        ("_NOT_CONTAINS", FilterOp::Contains, true),
        ("_NOT_STARTS_WITH", FilterOp::StartsWith, true),
        ("_NOT_ENDS_WITH", FilterOp::EndsWith, true),
        ("_NOT_IN", FilterOp::In, true),
        ("_NOT", FilterOp::Equal, true),
        ("_INCLUDES", FilterOp::Includes, false),
        ("_CONTAINS", FilterOp::Contains, false),
        ("_STARTS_WITH", FilterOp::StartsWith, false),
        ("_ENDS_WITH", FilterOp::EndsWith, false),
        ("_MATCHES", FilterOp::Matches, false),
        ("_IN", FilterOp::In, false),
        ("_LTE", FilterOp::LessThanEqualTo, false),
        ("_LT", FilterOp::LessThan, false),
        ("_GTE", FilterOp::GreaterThanEqualTo, false),
        ("_GT", FilterOp::GreaterThan, false),
    ];

    /// Generated input member name for a field
    pub fn key(&self, field: &str, negated: bool) -> String {
        let suffix = match self {
            Self::Equal => "",
            Self::In => "_IN",
            Self::Contains => "_CONTAINS",
            Self::StartsWith => "_STARTS_WITH",
            Self::EndsWith => "_ENDS_WITH",
            Self::Matches => "_MATCHES",
            Self::LessThan => "_LT",
            Self::LessThanEqualTo => "_LTE",
            Self::GreaterThan => "_GT",
            Self::GreaterThanEqualTo => "_GTE",
            Self::Includes => "_INCLUDES",
        };
        match (negated, self) {
            (false, _) => format!("{}{}", field, suffix),
            (true, Self::Equal) => format!("{}_NOT", field),
            (true, _) => format!("{}_NOT{}", field, suffix),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quantifier {
    Some,
    All,
    None,
    Single,
}

impl Quantifier {
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Some => "_SOME",
            Self::All => "_ALL",
            Self::None => "_NONE",
            Self::Single => "_SINGLE",
        }
    }

    /// Quantifier matching "no related node" when a relationship filter is null
    pub fn for_null(&self) -> Self {
        match self {
            Self::None => Self::Some,
            _ => Self::None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

/// Operators accepted by aggregation filters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    LessThan,
    LessThanEqualTo,
    GreaterThan,
    GreaterThanEqualTo,
}

impl CompareOp {
    pub const ALL: [CompareOp; 5] = [
        Self::Equal,
        Self::GreaterThan,
        Self::GreaterThanEqualTo,
        Self::LessThan,
        Self::LessThanEqualTo,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Equal => "EQUAL",
            Self::LessThan => "LT",
            Self::LessThanEqualTo => "LTE",
            Self::GreaterThan => "GT",
            Self::GreaterThanEqualTo => "GTE",
        }
    }

    pub fn cypher(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::LessThan => "<",
            Self::LessThanEqualTo => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanEqualTo => ">=",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregationFunction {
    /// `name_GT` and friends, compared against every related value
    Legacy,
    Average,
    Min,
    Max,
    Sum,
    Shortest,
    Longest,
    AverageLength,
    ShortestLength,
    LongestLength,
}

impl AggregationFunction {
    pub fn infix(&self) -> &'static str {
        match self {
            Self::Legacy => "",
            Self::Average => "_AVERAGE",
            Self::Min => "_MIN",
            Self::Max => "_MAX",
            Self::Sum => "_SUM",
            Self::Shortest => "_SHORTEST",
            Self::Longest => "_LONGEST",
            Self::AverageLength => "_AVERAGE_LENGTH",
            Self::ShortestLength => "_SHORTEST_LENGTH",
            Self::LongestLength => "_LONGEST_LENGTH",
        }
    }

    /// Functions offered for a field of `kind`, with their deprecation notice
    pub fn for_kind(kind: ScalarKind) -> Vec<(Self, Option<&'static str>)> {
        use crate::constants::deprecation::{AGGREGATION, LENGTH};
        if kind.is_string_like() {
            vec![
                (Self::Legacy, Some(AGGREGATION)),
                (Self::Average, Some(LENGTH)),
                (Self::Longest, Some(LENGTH)),
                (Self::Shortest, Some(LENGTH)),
                (Self::AverageLength, None),
                (Self::LongestLength, None),
                (Self::ShortestLength, None),
            ]
        } else if kind.is_numeric() {
            vec![
                (Self::Legacy, Some(AGGREGATION)),
                (Self::Average, None),
                (Self::Max, None),
                (Self::Min, None),
                (Self::Sum, None),
            ]
        } else {
            vec![
                (Self::Legacy, Some(AGGREGATION)),
                (Self::Min, None),
                (Self::Max, None),
            ]
        }
    }
}

#[derive(Clone, Debug)]
pub enum CompoundFilterBuilder {
    And(Vec<FilterBuilderElem>),
    Or(Vec<FilterBuilderElem>),
    Not(FilterBuilderElem),
}

/// Filters applied to the nodes reached by one label set
#[derive(Clone, Debug)]
pub struct RelationBranch {
    pub labels: Vec<String>,
    pub filters: Vec<FilterBuilderElem>,
}

#[derive(Clone, Debug)]
pub enum FilterBuilderElem {
    Property {
        field: Arc<PrimitiveField>,
        op: FilterOp,
        negated: bool,
        value: serde_json::Value,
    },
    /// `typename_IN` on interface filters
    Typename(Vec<String>),
    Relationship {
        field: Arc<RelationField>,
        quantifier: Quantifier,
        branches: Vec<RelationBranch>,
    },
    Connection {
        field: Arc<RelationField>,
        quantifier: Quantifier,
        branches: Vec<RelationBranch>,
    },
    Aggregate {
        field: Arc<RelationField>,
        predicates: Vec<AggregationPredicate>,
    },
    /// `node` member of a connection filter
    OnNode {
        negated: bool,
        filters: Vec<FilterBuilderElem>,
    },
    /// `edge` member of a connection filter
    OnEdge {
        negated: bool,
        filters: Vec<FilterBuilderElem>,
    },
    Compound(Box<CompoundFilterBuilder>),
}

#[derive(Clone, Debug)]
pub enum AggregationPredicate {
    Count {
        op: CompareOp,
        value: serde_json::Value,
    },
    Field {
        edge: bool,
        field: Arc<PrimitiveField>,
        function: AggregationFunction,
        op: CompareOp,
        value: serde_json::Value,
    },
    And(Vec<AggregationPredicate>),
    Or(Vec<AggregationPredicate>),
    Not(Box<AggregationPredicate>),
}

#[derive(Clone, Debug, Default)]
pub struct FilterBuilder {
    pub elems: Vec<FilterBuilderElem>,
}

/// Converts a validated input value for storage or comparison against `field`
pub fn primitive_value(field: &PrimitiveField, value: &gson::Value) -> GraphQLResult<serde_json::Value> {
    let res = match field.scalar() {
        Some(ScalarKind::BigInt) => gson::bigint_to_json(value),
        _ => gson::gson_to_json(value),
    };
    res.map_err(GraphQLError::translation)
}

fn and_of(filters: Vec<FilterBuilderElem>) -> FilterBuilderElem {
    FilterBuilderElem::Compound(Box::new(CompoundFilterBuilder::And(filters)))
}

/// Builds filters from a validated `where` value against its input type
pub fn create_filters(validated: &gson::Value, type_: &__Type) -> GraphQLResult<Vec<FilterBuilderElem>> {
    let mut filters = vec![];
    let kv_map = match validated {
        gson::Value::Absent | gson::Value::Null => return Ok(filters),
        gson::Value::Object(kv) => kv,
        _ => return Err(GraphQLError::translation("Filter re-validation error")),
    };
    let field_map = type_.input_field_map();

    for (k, v) in kv_map {
        if v.is_absent() {
            continue;
        }
        let iv: &__InputValue = field_map.get(k).ok_or_else(|| {
            GraphQLError::translation(format!(
                "Unknown filter \"{}\" on {}",
                k,
                type_.name().unwrap_or_default()
            ))
        })?;
        let member_type = iv.type_().unmodified_type();

        let meta = match &iv.meta {
            Some(meta) => meta,
            None => return Err(GraphQLError::translation(format!("Filter \"{}\" is not supported", k))),
        };

        match meta {
            InputMeta::Logical(LogicalOp::Not) => {
                let inner = create_filters(v, type_)?;
                // avoid an argumentless `NOT`
                if !inner.is_empty() {
                    filters.push(FilterBuilderElem::Compound(Box::new(CompoundFilterBuilder::Not(
                        and_of(inner),
                    ))));
                }
            }
            InputMeta::Logical(op) => {
                let mut compound_filters = vec![];
                for value in v.iter_list() {
                    let inner = create_filters(value, type_)?;
                    if !inner.is_empty() {
                        // Multiple inner filters are implicitly `and`ed together
                        compound_filters.push(and_of(inner));
                    }
                }
                if !compound_filters.is_empty() {
                    filters.push(FilterBuilderElem::Compound(Box::new(match op {
                        LogicalOp::Or => CompoundFilterBuilder::Or(compound_filters),
                        _ => CompoundFilterBuilder::And(compound_filters),
                    })));
                }
            }
            InputMeta::Typename => {
                let names = v
                    .iter_list()
                    .into_iter()
                    .filter_map(|x| x.as_str().map(str::to_string))
                    .collect();
                filters.push(FilterBuilderElem::Typename(names));
            }
            InputMeta::Property { field, op, negated } => {
                filters.push(FilterBuilderElem::Property {
                    field: Arc::clone(field),
                    op: *op,
                    negated: *negated,
                    value: primitive_value(field, v)?,
                });
            }
            InputMeta::Relationship { field, quantifier } => {
                let (quantifier, branches) = relation_branches(field, *quantifier, v, &member_type)?;
                filters.push(FilterBuilderElem::Relationship {
                    field: Arc::clone(field),
                    quantifier,
                    branches,
                });
            }
            InputMeta::Connection { field, quantifier } => {
                let (quantifier, branches) = relation_branches(field, *quantifier, v, &member_type)?;
                filters.push(FilterBuilderElem::Connection {
                    field: Arc::clone(field),
                    quantifier,
                    branches,
                });
            }
            InputMeta::Aggregate { field } => {
                let predicates = create_aggregation_predicates(v, &member_type, false)?;
                if !predicates.is_empty() {
                    filters.push(FilterBuilderElem::Aggregate {
                        field: Arc::clone(field),
                        predicates,
                    });
                }
            }
            InputMeta::ConnectionNode { negated } => {
                if !v.is_unset() {
                    filters.push(FilterBuilderElem::OnNode {
                        negated: *negated,
                        filters: create_filters(v, &member_type)?,
                    });
                }
            }
            InputMeta::ConnectionEdge { negated } => {
                if !v.is_unset() {
                    filters.push(FilterBuilderElem::OnEdge {
                        negated: *negated,
                        filters: create_filters(v, &member_type)?,
                    });
                }
            }
            InputMeta::UnionMember(_) | InputMeta::Count(_) | InputMeta::Aggregation { .. } => {
                return Err(GraphQLError::translation(format!(
                    "Filter \"{}\" is not valid here",
                    k
                )))
            }
        }
    }
    Ok(filters)
}

/// Splits a relationship filter value into one branch per label set. A null
/// value matches nodes without such a relationship.
fn relation_branches(
    field: &RelationField,
    quantifier: Quantifier,
    value: &gson::Value,
    where_type: &__Type,
) -> GraphQLResult<(Quantifier, Vec<RelationBranch>)> {
    if matches!(value, gson::Value::Null) {
        let labels: Vec<String> = field.target.concrete().into_iter().map(str::to_string).collect();
        return Ok((
            quantifier.for_null(),
            vec![RelationBranch {
                labels,
                filters: vec![],
            }],
        ));
    }

    match field.target.is_union() {
        false => Ok((
            quantifier,
            vec![RelationBranch {
                labels: field.target.concrete().into_iter().map(str::to_string).collect(),
                filters: create_filters(value, where_type)?,
            }],
        )),
        true => Ok((quantifier, create_union_filters(value, where_type)?)),
    }
}

/// Reads a union keyed input (`{ Movie: {...}, Genre: {...} }`) into branches
pub fn create_union_filters(validated: &gson::Value, type_: &__Type) -> GraphQLResult<Vec<RelationBranch>> {
    let field_map = type_.input_field_map();
    let mut branches = vec![];
    if let gson::Value::Object(kv) = validated {
        for (k, v) in kv {
            if v.is_unset() {
                continue;
            }
            match field_map.get(k).and_then(|x| x.meta.clone().map(|m| (x, m))) {
                Some((iv, InputMeta::UnionMember(node))) => branches.push(RelationBranch {
                    labels: vec![node.name.clone()],
                    filters: create_filters(v, &iv.type_().unmodified_type())?,
                }),
                _ => {
                    return Err(GraphQLError::translation(format!(
                        "Unknown union member \"{}\"",
                        k
                    )))
                }
            }
        }
    }
    Ok(branches)
}

pub fn create_aggregation_predicates(
    validated: &gson::Value,
    type_: &__Type,
    edge: bool,
) -> GraphQLResult<Vec<AggregationPredicate>> {
    let mut predicates = vec![];
    let kv_map = match validated {
        gson::Value::Object(kv) => kv,
        _ => return Ok(predicates),
    };
    let field_map = type_.input_field_map();

    for (k, v) in kv_map {
        if v.is_absent() {
            continue;
        }
        let iv = field_map
            .get(k)
            .ok_or_else(|| GraphQLError::translation(format!("Unknown aggregation filter \"{}\"", k)))?;
        match &iv.meta {
            Some(InputMeta::Count(op)) => predicates.push(AggregationPredicate::Count {
                op: *op,
                value: gson::gson_to_json(v).map_err(GraphQLError::translation)?,
            }),
            Some(InputMeta::Aggregation { field, function, op }) => {
                // lengths and counts are plain integers even on BigInt fields
                let value = match function {
                    AggregationFunction::AverageLength
                    | AggregationFunction::ShortestLength
                    | AggregationFunction::LongestLength => {
                        gson::gson_to_json(v).map_err(GraphQLError::translation)?
                    }
                    _ => primitive_value(field, v)?,
                };
                predicates.push(AggregationPredicate::Field {
                    edge,
                    field: Arc::clone(field),
                    function: *function,
                    op: *op,
                    value,
                })
            }
            Some(InputMeta::ConnectionNode { .. }) => predicates.extend(create_aggregation_predicates(
                v,
                &iv.type_().unmodified_type(),
                false,
            )?),
            Some(InputMeta::ConnectionEdge { .. }) => predicates.extend(create_aggregation_predicates(
                v,
                &iv.type_().unmodified_type(),
                true,
            )?),
            Some(InputMeta::Logical(LogicalOp::Not)) => {
                let inner = create_aggregation_predicates(v, type_, edge)?;
                if !inner.is_empty() {
                    predicates.push(AggregationPredicate::Not(Box::new(AggregationPredicate::And(inner))));
                }
            }
            Some(InputMeta::Logical(op)) => {
                let mut items = vec![];
                for value in v.iter_list() {
                    let inner = create_aggregation_predicates(value, type_, edge)?;
                    if !inner.is_empty() {
                        items.push(AggregationPredicate::And(inner));
                    }
                }
                if !items.is_empty() {
                    predicates.push(match op {
                        LogicalOp::Or => AggregationPredicate::Or(items),
                        _ => AggregationPredicate::And(items),
                    });
                }
            }
            _ => {
                return Err(GraphQLError::translation(format!(
                    "Aggregation filter \"{}\" is not supported",
                    k
                )))
            }
        }
    }
    Ok(predicates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("title", FilterOp::Equal, false, "title")]
    #[test_case("title", FilterOp::Equal, true, "title_NOT")]
    #[test_case("title", FilterOp::In, true, "title_NOT_IN")]
    #[test_case("title", FilterOp::StartsWith, false, "title_STARTS_WITH")]
    #[test_case("tags", FilterOp::Includes, true, "tags_NOT_INCLUDES")]
    #[test_case("runtime", FilterOp::LessThanEqualTo, false, "runtime_LTE")]
    fn filter_keys_round_trip_through_suffixes(field: &str, op: FilterOp, negated: bool, key: &str) {
        assert_eq!(op.key(field, negated), key);
        assert_eq!(crate::auth::split_comparison_key(key), (field, op, negated));
    }

    #[test]
    fn null_relationship_filters_flip_the_quantifier() {
        assert_eq!(Quantifier::Some.for_null(), Quantifier::None);
        assert_eq!(Quantifier::None.for_null(), Quantifier::Some);
        assert_eq!(Quantifier::All.for_null(), Quantifier::None);
    }

    #[test]
    fn string_aggregations_mark_legacy_forms() {
        let functions = AggregationFunction::for_kind(ScalarKind::String);
        let deprecated: Vec<_> = functions
            .iter()
            .filter(|(_, d)| d.is_some())
            .map(|(f, _)| *f)
            .collect();
        assert_eq!(
            deprecated,
            vec![
                AggregationFunction::Legacy,
                AggregationFunction::Average,
                AggregationFunction::Longest,
                AggregationFunction::Shortest
            ]
        );
    }
}
