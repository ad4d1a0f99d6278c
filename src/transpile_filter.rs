//! Compiles filter builders into `WHERE` predicates.

use crate::entity::{PrimitiveField, RelationField};
use crate::error::{GraphQLError, GraphQLResult};
use crate::filter::*;
use crate::scope::Scope;
use crate::transpile::{and_join, label_predicate, or_join, param_expr, property_of, quote_ident};

/// Variables a filter is evaluated against. `edge` is bound when the filter
/// sits inside a connection and may address relationship properties.
#[derive(Clone, Copy, Debug)]
pub struct FilterTarget<'t> {
    pub node: &'t str,
    pub edge: Option<&'t str>,
}

impl<'t> FilterTarget<'t> {
    pub fn node(node: &'t str) -> Self {
        Self { node, edge: None }
    }
}

/// Left hand side compared against `rhs` with a filter operator
pub fn comparison(lhs: &str, op: FilterOp, rhs: &str) -> String {
    match op {
        FilterOp::Equal => format!("{} = {}", lhs, rhs),
        FilterOp::In => format!("{} IN {}", lhs, rhs),
        FilterOp::Contains => format!("{} CONTAINS {}", lhs, rhs),
        FilterOp::StartsWith => format!("{} STARTS WITH {}", lhs, rhs),
        FilterOp::EndsWith => format!("{} ENDS WITH {}", lhs, rhs),
        FilterOp::Matches => format!("{} =~ {}", lhs, rhs),
        FilterOp::LessThan => format!("{} < {}", lhs, rhs),
        FilterOp::LessThanEqualTo => format!("{} <= {}", lhs, rhs),
        FilterOp::GreaterThan => format!("{} > {}", lhs, rhs),
        FilterOp::GreaterThanEqualTo => format!("{} >= {}", lhs, rhs),
        FilterOp::Includes => format!("{} IN {}", rhs, lhs),
    }
}

pub fn negate(predicate: String, negated: bool) -> String {
    match negated {
        true => format!("NOT ({})", predicate),
        false => predicate,
    }
}

/// Compares a property with an already bound parameter
pub fn property_comparison(var: &str, field: &PrimitiveField, op: FilterOp, param: &str) -> String {
    let list = match op {
        FilterOp::In => true,
        FilterOp::Includes => false,
        _ => field.is_list(),
    };
    comparison(&property_of(var, field), op, &param_expr(field, param, list))
}

pub fn property_predicate(
    var: &str,
    field: &PrimitiveField,
    op: FilterOp,
    negated: bool,
    value: &serde_json::Value,
    scope: &mut Scope,
) -> String {
    let predicate = match (op, value) {
        (FilterOp::Equal, serde_json::Value::Null) => format!("{} IS NULL", property_of(var, field)),
        _ => {
            let param = scope.clause_for(value.clone());
            property_comparison(var, field, op, &param)
        }
    };
    negate(predicate, negated)
}

/// One traversal branch of a quantified pattern: the labels reached and a
/// predicate over the bound variables
pub struct PatternBranch {
    pub labels: Vec<String>,
    pub predicate: Option<String>,
}

/// Quantifies `(parent)-[:TYPE]-(n)` patterns with existential subqueries.
/// `branch` is called once per target with the node and edge variables.
pub fn quantified_pattern<B, F>(
    parent: &str,
    field: &RelationField,
    quantifier: Quantifier,
    branches: &[B],
    scope: &mut Scope,
    mut branch: F,
) -> GraphQLResult<String>
where
    F: FnMut(&B, &str, &str, &mut Scope) -> GraphQLResult<PatternBranch>,
{
    let (left, right) = field.arrows(field.query_direction.is_directed(None));
    let mut parts = vec![];
    for item in branches {
        let node_var = scope.allocate("this");
        let edge_var = scope.allocate("edge");
        let compiled = branch(item, &node_var, &edge_var, scope)?;
        let pattern = format!(
            "({}){}[{}:{}]{}({})",
            parent,
            left,
            edge_var,
            quote_ident(&field.rel_type),
            right,
            node_var
        );
        let labels = label_predicate(&node_var, &compiled.labels);
        let matched = and_join(vec![labels.clone()].into_iter().chain(compiled.predicate.clone()).collect())
            .unwrap_or(labels.clone());
        parts.push(match quantifier {
            Quantifier::Some => format!("EXISTS {{ MATCH {} WHERE {} }}", pattern, matched),
            Quantifier::None => format!("NOT EXISTS {{ MATCH {} WHERE {} }}", pattern, matched),
            Quantifier::Single => format!("COUNT {{ MATCH {} WHERE {} }}", pattern, matched),
            Quantifier::All => match &compiled.predicate {
                Some(predicate) => format!(
                    "EXISTS {{ MATCH {pattern} WHERE {labels} }} AND NOT EXISTS {{ MATCH {pattern} WHERE {labels} AND NOT ({predicate}) }}"
                ),
                None => format!("EXISTS {{ MATCH {} WHERE {} }}", pattern, labels),
            },
        });
    }
    let combined = match quantifier {
        Quantifier::Some => or_join(parts),
        Quantifier::None | Quantifier::All => and_join(parts),
        Quantifier::Single => match parts.is_empty() {
            true => None,
            false => Some(format!("{} = 1", parts.join(" + "))),
        },
    };
    Ok(combined.unwrap_or_else(|| "false".to_string()))
}

fn compile_elems(elems: &[FilterBuilderElem], target: &FilterTarget, scope: &mut Scope) -> GraphQLResult<Option<String>> {
    let mut parts = vec![];
    for elem in elems {
        parts.push(elem.to_cypher(target, scope)?);
    }
    Ok(and_join(parts))
}

impl FilterBuilder {
    /// `None` when nothing is filtered
    pub fn to_cypher(&self, target: &FilterTarget, scope: &mut Scope) -> GraphQLResult<Option<String>> {
        compile_elems(&self.elems, target, scope)
    }
}

impl FilterBuilderElem {
    pub fn to_cypher(&self, target: &FilterTarget, scope: &mut Scope) -> GraphQLResult<String> {
        Ok(match self {
            Self::Property {
                field,
                op,
                negated,
                value,
            } => property_predicate(target.node, field, *op, *negated, value, scope),
            Self::Typename(names) => label_predicate(target.node, names),
            Self::Relationship {
                field,
                quantifier,
                branches,
            } => quantified_pattern(target.node, field, *quantifier, branches, scope, |branch, node, _, scope| {
                Ok(PatternBranch {
                    labels: branch.labels.clone(),
                    predicate: compile_elems(&branch.filters, &FilterTarget::node(node), scope)?,
                })
            })?,
            Self::Connection {
                field,
                quantifier,
                branches,
            } => quantified_pattern(target.node, field, *quantifier, branches, scope, |branch, node, edge, scope| {
                let inner = FilterTarget {
                    node,
                    edge: Some(edge),
                };
                Ok(PatternBranch {
                    labels: branch.labels.clone(),
                    predicate: compile_elems(&branch.filters, &inner, scope)?,
                })
            })?,
            Self::Aggregate { field, predicates } => aggregate_filter(target.node, field, predicates, scope)?,
            Self::OnNode { negated, filters } => {
                let inner = FilterTarget::node(target.node);
                negate(compile_elems(filters, &inner, scope)?.unwrap_or_else(|| "true".to_string()), *negated)
            }
            Self::OnEdge { negated, filters } => {
                let edge = target
                    .edge
                    .ok_or_else(|| GraphQLError::translation("Relationship properties are not available here"))?;
                let inner = FilterTarget::node(edge);
                negate(compile_elems(filters, &inner, scope)?.unwrap_or_else(|| "true".to_string()), *negated)
            }
            Self::Compound(compound) => match compound.as_ref() {
                CompoundFilterBuilder::And(elems) => {
                    compile_elems(elems, target, scope)?.unwrap_or_else(|| "true".to_string())
                }
                CompoundFilterBuilder::Or(elems) => {
                    let mut parts = vec![];
                    for elem in elems {
                        parts.push(elem.to_cypher(target, scope)?);
                    }
                    or_join(parts).unwrap_or_else(|| "false".to_string())
                }
                CompoundFilterBuilder::Not(elem) => negate(elem.to_cypher(target, scope)?, true),
            },
        })
    }
}

/// Aggregations over the related nodes, compared inside a single subquery
fn aggregate_filter(
    parent: &str,
    field: &RelationField,
    predicates: &[AggregationPredicate],
    scope: &mut Scope,
) -> GraphQLResult<String> {
    let (left, right) = field.arrows(field.query_direction.is_directed(None));
    let node_var = scope.allocate("this");
    let edge_var = scope.allocate("edge");
    let labels = field.target.concrete().into_iter().map(String::from).collect::<Vec<_>>();
    let pattern = format!(
        "({}){}[{}:{}]{}({})",
        parent,
        left,
        edge_var,
        quote_ident(&field.rel_type),
        right,
        node_var
    );

    let mut projections = vec![];
    let mut conditions = vec![];
    for predicate in predicates {
        conditions.push(aggregation_condition(predicate, &node_var, &edge_var, &mut projections, scope)?);
    }
    let condition = and_join(conditions).unwrap_or_else(|| "true".to_string());
    Ok(format!(
        "EXISTS {{ MATCH {} WHERE {} WITH {} WHERE {} }}",
        pattern,
        label_predicate(&node_var, &labels),
        projections.join(", "),
        condition
    ))
}

fn project_aggregate(projections: &mut Vec<String>, expr: String, scope: &mut Scope) -> String {
    let var = scope.allocate("var");
    projections.push(format!("{} AS {}", expr, var));
    var
}

fn aggregation_condition(
    predicate: &AggregationPredicate,
    node_var: &str,
    edge_var: &str,
    projections: &mut Vec<String>,
    scope: &mut Scope,
) -> GraphQLResult<String> {
    Ok(match predicate {
        AggregationPredicate::Count { op, value } => {
            let var = project_aggregate(projections, format!("count({})", node_var), scope);
            let param = scope.clause_for(value.clone());
            format!("{} {} {}", var, op.cypher(), param)
        }
        AggregationPredicate::Field {
            edge,
            field,
            function,
            op,
            value,
        } => {
            let owner = if *edge { edge_var } else { node_var };
            let property = property_of(owner, field);
            let string_like = field.scalar().map(|x| x.is_string_like()).unwrap_or(false);
            let param = scope.clause_for(value.clone());
            match function {
                AggregationFunction::Legacy => {
                    let var = project_aggregate(projections, format!("collect({})", property), scope);
                    let element = match string_like && *op != CompareOp::Equal {
                        true => "size(x)",
                        false => "x",
                    };
                    format!(
                        "any(x IN {} WHERE {} {} {})",
                        var,
                        element,
                        op.cypher(),
                        param_expr(field, &param, false)
                    )
                }
                AggregationFunction::Average if !string_like => {
                    let var = project_aggregate(projections, format!("avg({})", property), scope);
                    format!("{} {} toFloat({})", var, op.cypher(), param)
                }
                AggregationFunction::Sum => {
                    let var = project_aggregate(projections, format!("sum({})", property), scope);
                    format!("{} {} toFloat({})", var, op.cypher(), param)
                }
                AggregationFunction::Min | AggregationFunction::Max => {
                    let name = match function {
                        AggregationFunction::Min => "min",
                        _ => "max",
                    };
                    let var = project_aggregate(projections, format!("{}({})", name, property), scope);
                    format!("{} {} {}", var, op.cypher(), param_expr(field, &param, false))
                }
                AggregationFunction::Shortest | AggregationFunction::ShortestLength => {
                    let var = project_aggregate(projections, format!("min(size({}))", property), scope);
                    format!("{} {} {}", var, op.cypher(), param)
                }
                AggregationFunction::Longest | AggregationFunction::LongestLength => {
                    let var = project_aggregate(projections, format!("max(size({}))", property), scope);
                    format!("{} {} {}", var, op.cypher(), param)
                }
                AggregationFunction::Average | AggregationFunction::AverageLength => {
                    let var = project_aggregate(projections, format!("avg(size({}))", property), scope);
                    format!("{} {} {}", var, op.cypher(), param)
                }
            }
        }
        AggregationPredicate::And(items) | AggregationPredicate::Or(items) => {
            let mut parts = vec![];
            for item in items {
                parts.push(aggregation_condition(item, node_var, edge_var, projections, scope)?);
            }
            let joined = match predicate {
                AggregationPredicate::And(_) => and_join(parts),
                _ => or_join(parts),
            };
            joined.unwrap_or_else(|| "true".to_string())
        }
        AggregationPredicate::Not(item) => negate(
            aggregation_condition(item, node_var, edge_var, projections, scope)?,
            true,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Config;
    use crate::GraphQLSchema;
    use serde_json::json;
    use test_case::test_case;

    const TYPE_DEFS: &str = r#"
        type Movie {
            title: String!
            tags: [String!]
            released: DateTime
            budget: BigInt
            actors: [Actor!]! @relationship(type: "ACTED_IN", direction: IN, properties: "ActedIn")
        }
        type Actor {
            name: String!
            movies: [Movie!]! @relationship(type: "ACTED_IN", direction: OUT, properties: "ActedIn")
        }
        type ActedIn @relationshipProperties {
            screenTime: Int
        }
    "#;

    fn where_of(filter: &str) -> (String, indexmap::IndexMap<String, serde_json::Value>) {
        let schema = GraphQLSchema::new(TYPE_DEFS, Config::default()).unwrap();
        let query = format!("{{ movies(where: {}) {{ title }} }}", filter);
        let translation = schema.translate(&query, None, None, None).unwrap().remove(0);
        let clause = translation
            .cypher
            .lines()
            .find_map(|x| x.strip_prefix("WHERE "))
            .unwrap_or_default()
            .to_string();
        (clause, translation.params)
    }

    #[test_case(r#"{title: "Matrix"}"#, "this.title = $param0"; "equality")]
    #[test_case(r#"{title_NOT: "Matrix"}"#, "NOT (this.title = $param0)"; "negated equality")]
    #[test_case(r#"{title: null}"#, "this.title IS NULL"; "null equality")]
    #[test_case(r#"{title_IN: ["A", "B"]}"#, "this.title IN $param0"; "membership")]
    #[test_case(r#"{title_CONTAINS: "at"}"#, "this.title CONTAINS $param0"; "contains")]
    #[test_case(r#"{tags_INCLUDES: "scifi"}"#, "$param0 IN this.tags"; "list includes")]
    #[test_case(r#"{released_GT: "1999-03-31T00:00:00Z"}"#, "this.released > datetime($param0)"; "temporal comparison")]
    #[test_case(r#"{OR: [{title: "A"}, {title: "B"}]}"#, "(this.title = $param0) OR (this.title = $param1)"; "disjunction")]
    fn property_filters(filter: &str, expected: &str) {
        assert_eq!(where_of(filter).0, expected);
    }

    #[test]
    fn big_integers_are_bound_as_pairs() {
        let (clause, params) = where_of(r#"{budget_GT: "9007199254740993"}"#);
        assert_eq!(clause, "this.budget > $param0");
        assert_eq!(params["param0"], json!({"low": 1, "high": 2097152}));
    }

    #[test]
    fn relationship_filters_are_existential() {
        let (clause, _) = where_of(r#"{actors_SOME: {name: "Keanu"}}"#);
        assert_eq!(
            clause,
            "EXISTS { MATCH (this)<-[edge1:ACTED_IN]-(this0) WHERE (this0:Actor) AND (this0.name = $param0) }"
        );
        let (clause, _) = where_of(r#"{actors_ALL: {name: "Keanu"}}"#);
        assert!(clause.starts_with("EXISTS { MATCH (this)<-[edge1:ACTED_IN]-(this0) WHERE this0:Actor } AND NOT EXISTS"));
        let (clause, _) = where_of(r#"{actors_SINGLE: {name: "Keanu"}}"#);
        assert!(clause.starts_with("COUNT { MATCH") && clause.ends_with("} = 1"));
    }

    #[test]
    fn connection_filters_address_edges() {
        let (clause, _) = where_of(r#"{actorsConnection_NONE: {edge: {screenTime_GT: 10}}}"#);
        assert_eq!(
            clause,
            "NOT EXISTS { MATCH (this)<-[edge1:ACTED_IN]-(this0) WHERE (this0:Actor) AND (edge1.screenTime > $param0) }"
        );
    }

    #[test]
    fn aggregate_filters_compare_in_one_subquery() {
        let (clause, params) = where_of(r#"{actorsAggregate: {count_GT: 2, edge: {screenTime_SUM_LT: 100}}}"#);
        assert!(clause.starts_with("EXISTS { MATCH (this)<-[edge1:ACTED_IN]-(this0) WHERE this0:Actor WITH count(this0) AS var2"));
        assert!(clause.contains("sum(edge1.screenTime) AS var3"));
        assert!(clause.contains("(var2 > $param0) AND (var3 < toFloat($param1))"));
        assert_eq!(params.len(), 2);
    }
}
