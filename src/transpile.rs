//! Compiles read builders into Cypher.
//!
//! Every statement is assembled from nested `CALL { ... }` subqueries, one per
//! traversal, and returns a single column per root field. Values are never
//! interpolated: they are bound through [`Scope`] and referenced as `$paramN`.

use crate::auth::{AuthContext, AuthOperation};
use crate::builder::*;
use crate::context::Callbacks;
use crate::entity::*;
use crate::error::GraphQLResult;
use crate::filter::FilterBuilder;
use crate::gson::int64_to_json;
use crate::scope::{Scope, ROOT};
use crate::transpile_auth::{auth_filter, guard_predicate, node_allow};
use crate::transpile_filter::FilterTarget;
use indexmap::IndexMap;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

lazy_static! {
    static ref IDENTIFIER_RE: Regex = Regex::new("^[_A-Za-z][_0-9A-Za-z]*$").unwrap();
}

/// Everything a translation reads besides the builders themselves
pub struct TranslationContext<'c> {
    pub model: &'c Arc<EntityModel>,
    pub auth: &'c AuthContext,
    pub callbacks: &'c Callbacks,
    /// Mutations additionally return event metadata
    pub subscriptions: bool,
}

/// A compiled statement and the parameters it references
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub cypher: String,
    pub params: IndexMap<String, serde_json::Value>,
}

pub trait QueryEntrypoint {
    fn to_cypher_entrypoint(&self, ctx: &TranslationContext, scope: &mut Scope) -> GraphQLResult<String>;

    fn translate(&self, ctx: &TranslationContext) -> GraphQLResult<Statement> {
        let mut scope = Scope::new();
        let cypher = self.to_cypher_entrypoint(ctx, &mut scope)?;
        Ok(Statement {
            cypher,
            params: scope.into_params(),
        })
    }
}

/// Backtick quotes labels, relationship types and keys that are not plain identifiers
pub fn quote_ident(ident: &str) -> String {
    match IDENTIFIER_RE.is_match(ident) {
        true => ident.to_string(),
        false => format!("`{}`", ident.replace('`', "``")),
    }
}

pub fn property_of(var: &str, field: &PrimitiveField) -> String {
    format!("{}.{}", var, quote_ident(&field.db_property))
}

/// `(this0:A OR this0:B)`, or `this0:A` for a single label
pub fn label_predicate(var: &str, labels: &[String]) -> String {
    match labels.len() {
        0 => "false".to_string(),
        1 => format!("{}:{}", var, quote_ident(&labels[0])),
        _ => format!(
            "({})",
            labels
                .iter()
                .map(|x| format!("{}:{}", var, quote_ident(x)))
                .join(" OR ")
        ),
    }
}

/// Wraps a parameter reference in the constructor of a temporal field
pub fn param_expr(field: &PrimitiveField, param: &str, list: bool) -> String {
    match field.scalar().and_then(|x| x.cypher_constructor()) {
        Some(ctor) if list => format!("[x IN {} | {}(x)]", param, ctor),
        Some(ctor) => format!("{}({})", ctor, param),
        None => param.to_string(),
    }
}

/// Reads a property for the response. Temporal values are returned as strings.
fn projected_property(var: &str, field: &PrimitiveField) -> String {
    let property = property_of(var, field);
    match field.scalar().map(|x| x.is_temporal()).unwrap_or(false) {
        true if field.is_list() => format!("[x IN {} | toString(x)]", property),
        true => format!("toString({})", property),
        false => property,
    }
}

fn join_with(parts: Vec<String>, op: &str) -> Option<String> {
    let parts: Vec<String> = parts.into_iter().filter(|x| !x.is_empty()).collect();
    match parts.len() {
        0 => None,
        1 => parts.into_iter().next(),
        _ => Some(parts.iter().map(|x| format!("({})", x)).join(op)),
    }
}

pub fn and_join(parts: Vec<String>) -> Option<String> {
    join_with(parts, " AND ")
}

pub fn or_join(parts: Vec<String>) -> Option<String> {
    join_with(parts, " OR ")
}

/// Indents every line by four spaces per level
pub fn indent(text: &str, depth: usize) -> String {
    let pad = "    ".repeat(depth);
    text.lines()
        .map(|line| match line.is_empty() {
            true => String::new(),
            false => format!("{}{}", pad, line),
        })
        .join("\n")
}

pub fn call_subquery(lines: &[String]) -> String {
    format!("CALL {{\n{}\n}}", indent(&lines.join("\n"), 1))
}

pub fn where_clause(parts: Vec<String>) -> Option<String> {
    and_join(parts).map(|x| format!("WHERE {}", x))
}

/// `ORDER BY`, `SKIP` and `LIMIT`, omitting whatever is unset
fn paging_clauses<F>(
    sort: &[SortItem],
    limit: Option<i64>,
    offset: Option<i64>,
    key: F,
    scope: &mut Scope,
) -> Vec<String>
where
    F: Fn(usize, &SortItem) -> String,
{
    let mut res = vec![];
    if !sort.is_empty() {
        res.push(format!(
            "ORDER BY {}",
            sort.iter()
                .enumerate()
                .map(|(ix, item)| format!("{} {}", key(ix, item), item.direction.cypher()))
                .join(", ")
        ));
    }
    if let Some(offset) = offset {
        res.push(format!("SKIP {}", scope.clause_for(int64_to_json(offset))));
    }
    if let Some(limit) = limit {
        res.push(format!("LIMIT {}", scope.clause_for(int64_to_json(limit))));
    }
    res
}

fn node_filter(
    filter: &FilterBuilder,
    node: &Node,
    target: &FilterTarget,
    ctx: &TranslationContext,
    scope: &mut Scope,
) -> GraphQLResult<Vec<String>> {
    let mut parts = vec![];
    parts.extend(filter.to_cypher(target, scope)?);
    parts.extend(auth_filter(&node.auth, AuthOperation::Read, target.node, ctx, scope)?);
    Ok(parts)
}

/// Map projection for a node along with the subqueries it reads from
#[derive(Clone, Debug, Default)]
pub struct Projection {
    pub subqueries: Vec<String>,
    pub map: String,
}

impl NodeBuilder {
    /// `extra` entries are appended verbatim, e.g. hidden sort keys
    pub fn to_projection(
        &self,
        var: &str,
        extra: &[String],
        ctx: &TranslationContext,
        scope: &mut Scope,
    ) -> GraphQLResult<Projection> {
        let mut subqueries = vec![];
        let mut items: Vec<String> = vec![];
        let mut seen: Vec<&str> = vec![];

        for selection in &self.selections {
            let alias = selection.alias();
            if seen.contains(&alias) {
                continue;
            }
            seen.push(alias);
            let item = match selection {
                NodeSelection::Typename { .. } => continue,
                NodeSelection::Primitive { alias, field } if field.is_cypher() => {
                    let (subquery, out) = cypher_field_subquery(field, var, ctx, scope);
                    subqueries.push(subquery);
                    format!("{}: {}", quote_ident(alias), out)
                }
                NodeSelection::Primitive { alias, field } => {
                    let expr = projected_property(var, field);
                    match *alias == field.name && expr == property_of(var, field) && field.name == field.db_property {
                        true => format!(".{}", quote_ident(&field.name)),
                        false => format!("{}: {}", quote_ident(alias), expr),
                    }
                }
                NodeSelection::Relation(relation) => {
                    let (subquery, out) = relation.to_cypher_subquery(var, ctx, scope)?;
                    subqueries.push(subquery);
                    format!("{}: {}", quote_ident(alias), out)
                }
                NodeSelection::RelationAggregate(aggregate) => {
                    let (subquery, out) = aggregate.to_cypher_subquery(var, ctx, scope)?;
                    subqueries.push(subquery);
                    format!("{}: {}", quote_ident(alias), out)
                }
                NodeSelection::RelationConnection(connection) => {
                    let out = scope.allocate("var");
                    let lines = connection.to_cypher_lines(Some(var), &out, ctx, scope)?;
                    subqueries.push(call_subquery(&lines));
                    format!("{}: {}", quote_ident(alias), out)
                }
            };
            items.push(item);
        }
        items.extend(extra.iter().cloned());

        let map = match items.is_empty() {
            true => "{ }".to_string(),
            false => format!("{{ {} }}", items.join(", ")),
        };
        Ok(Projection { subqueries, map })
    }
}

/// Runs a `@cypher` statement with `this` bound to the current node
fn cypher_field_subquery(
    field: &PrimitiveField,
    var: &str,
    ctx: &TranslationContext,
    scope: &mut Scope,
) -> (String, String) {
    let out = scope.allocate("var");
    let column = scope.allocate("this");
    let (statement, column_name) = match &field.cypher {
        Some(directive) => (directive.statement.trim(), directive.column_name.as_str()),
        None => ("RETURN null AS value", "value"),
    };
    if statement.contains("$jwt") {
        scope.named("jwt", ctx.auth.claims.clone().unwrap_or_else(|| serde_json::json!({})));
    }
    let inner = vec![
        format!("WITH {}", var),
        format!("WITH {} AS this", var),
        statement.to_string(),
    ];
    let collect = match field.is_list() {
        true => format!("collect({})", column),
        false => format!("head(collect({}))", column),
    };
    let lines = vec![
        format!("WITH {}", var),
        call_subquery(&inner),
        format!("WITH {} AS {}", quote_ident(column_name), column),
        format!("RETURN {} AS {}", collect, out),
    ];
    (call_subquery(&lines), out)
}

impl RelationBuilder {
    fn to_cypher_subquery(
        &self,
        parent: &str,
        ctx: &TranslationContext,
        scope: &mut Scope,
    ) -> GraphQLResult<(String, String)> {
        let out = scope.allocate("var");
        let item = scope.allocate("var");
        let (left, right) = self.field.arrows(self.directed);

        let mut branches = vec![];
        for target in self.targets.iter().filter(|x| self.filter.includes(&x.node.name)) {
            let node_var = scope.allocate("this");
            let mut lines = vec![
                format!("WITH {}", parent),
                format!(
                    "MATCH ({}){}[:{}]{}({}:{})",
                    parent,
                    left,
                    quote_ident(&self.field.rel_type),
                    right,
                    node_var,
                    quote_ident(&target.node.name)
                ),
            ];
            let filter = self.filter.for_target(&target.node.name);
            let conditions = node_filter(filter, &target.node, &FilterTarget::node(&node_var), ctx, scope)?;
            lines.extend(where_clause(conditions));
            let fields = target.selected_fields();
            if let Some(allow) = node_allow(&target.node, &fields, AuthOperation::Read, &node_var, ctx, scope)? {
                lines.push(guard_predicate(&allow));
            }

            let mut extra: Vec<String> = self
                .options
                .sort
                .iter()
                .enumerate()
                .map(|(ix, item)| format!("__sort{}: {}", ix, property_of(&node_var, &item.field)))
                .collect();
            if self.field.target.is_abstract() {
                extra.push(format!("__resolveType: \"{}\"", target.node.name));
            }
            let projection = target.to_projection(&node_var, &extra, ctx, scope)?;
            lines.extend(projection.subqueries);
            lines.push(format!("WITH {} {} AS {}", node_var, projection.map, node_var));
            lines.push(format!("RETURN {} AS {}", node_var, item));
            branches.push(lines.join("\n"));
        }

        let mut lines = vec![format!("WITH {}", parent)];
        if branches.is_empty() {
            let empty = if self.field.is_list() { "[]" } else { "null" };
            lines.push(format!("RETURN {} AS {}", empty, out));
            return Ok((call_subquery(&lines), out));
        }
        lines.push(format!("CALL {{\n{}\n}}", indent(&branches.join("\nUNION\n"), 1)));
        lines.push(format!("WITH {}", item));
        lines.extend(paging_clauses(
            &self.options.sort,
            self.options.limit,
            self.options.offset,
            |ix, _| format!("{}.__sort{}", item, ix),
            scope,
        ));
        let collect = match self.field.is_list() {
            true => format!("collect({})", item),
            false => format!("head(collect({}))", item),
        };
        lines.push(format!("RETURN {} AS {}", collect, out));
        Ok((call_subquery(&lines), out))
    }
}

fn aggregate_expr(function: AggregateFunction, field: &PrimitiveField, property: &str) -> String {
    let temporal = field.scalar().map(|x| x.is_temporal()).unwrap_or(false);
    let reduce = |name: &str, cmp: &str| {
        format!(
            "reduce({name} = null, current IN collect({property}) | CASE WHEN {name} IS NULL OR size(current) {cmp} size({name}) THEN current ELSE {name} END)"
        )
    };
    match function {
        AggregateFunction::Min if temporal => format!("toString(min({}))", property),
        AggregateFunction::Max if temporal => format!("toString(max({}))", property),
        AggregateFunction::Min => format!("min({})", property),
        AggregateFunction::Max => format!("max({})", property),
        AggregateFunction::Average => format!("avg({})", property),
        AggregateFunction::Sum => format!("sum({})", property),
        AggregateFunction::Shortest => reduce("shortest", "<"),
        AggregateFunction::Longest => reduce("longest", ">"),
    }
}

/// Result map of an aggregate selection. Edge fields read `edge_var`.
pub fn aggregate_map(selections: &[AggregateSelection], node_var: &str, edge_var: Option<&str>) -> String {
    let mut items = vec![];
    for selection in selections {
        match selection {
            AggregateSelection::Typename { .. } => continue,
            AggregateSelection::Count { alias } => {
                items.push(format!("{}: count({})", quote_ident(alias), node_var))
            }
            AggregateSelection::Field {
                alias,
                field,
                edge,
                functions,
            } => {
                let var = match edge {
                    true => edge_var.unwrap_or(node_var),
                    false => node_var,
                };
                let property = property_of(var, field);
                let entries = functions
                    .iter()
                    .filter_map(|x| match x {
                        AggregateFunctionSelection::Function { alias, function } => Some(format!(
                            "{}: {}",
                            quote_ident(alias),
                            aggregate_expr(*function, field, &property)
                        )),
                        AggregateFunctionSelection::Typename { .. } => None,
                    })
                    .join(", ");
                items.push(format!("{}: {{ {} }}", quote_ident(alias), entries))
            }
            AggregateSelection::Node { alias, selections } | AggregateSelection::Edge { alias, selections } => {
                items.push(format!(
                    "{}: {}",
                    quote_ident(alias),
                    aggregate_map(selections, node_var, edge_var)
                ))
            }
        }
    }
    match items.is_empty() {
        true => "{ }".to_string(),
        false => format!("{{ {} }}", items.join(", ")),
    }
}

impl RelationAggregateBuilder {
    fn to_cypher_subquery(
        &self,
        parent: &str,
        ctx: &TranslationContext,
        scope: &mut Scope,
    ) -> GraphQLResult<(String, String)> {
        let out = scope.allocate("var");
        let node_var = scope.allocate("this");
        let edge_var = scope.allocate("edge");
        let (left, right) = self.field.arrows(self.directed);
        let mut lines = vec![
            format!("WITH {}", parent),
            format!(
                "MATCH ({}){}[{}:{}]{}({}:{})",
                parent,
                left,
                edge_var,
                quote_ident(&self.field.rel_type),
                right,
                node_var,
                quote_ident(&self.target.name)
            ),
        ];
        let conditions = node_filter(&self.filter, &self.target, &FilterTarget::node(&node_var), ctx, scope)?;
        lines.extend(where_clause(conditions));
        lines.push(format!(
            "RETURN {} AS {}",
            aggregate_map(&self.selections, &node_var, Some(&edge_var)),
            out
        ));
        Ok((call_subquery(&lines), out))
    }
}

impl ConnectionBuilder {
    /// Collects every matching edge, counts them, then slices the page.
    /// The final clause returns `{edges, totalCount}` as `out`.
    pub fn to_cypher_lines(
        &self,
        parent: Option<&str>,
        out: &str,
        ctx: &TranslationContext,
        scope: &mut Scope,
    ) -> GraphQLResult<Vec<String>> {
        let edge_item = scope.allocate("edge");
        let abstract_target = match &self.source {
            ConnectionBuilderSource::Root(_) => false,
            ConnectionBuilderSource::Relation { field, .. } => field.target.is_abstract(),
        };
        let edge_fields = self.edge_fields();

        let mut branches = vec![];
        for target in self.targets.iter().filter(|x| self.filter.includes(&x.name)) {
            let node_var = scope.allocate("this");
            let mut lines = vec![];
            let rel_var = match (&self.source, parent) {
                (ConnectionBuilderSource::Relation { field, directed }, Some(parent)) => {
                    let rel_var = scope.allocate("edge");
                    let (left, right) = field.arrows(*directed);
                    lines.push(format!("WITH {}", parent));
                    lines.push(format!(
                        "MATCH ({}){}[{}:{}]{}({}:{})",
                        parent,
                        left,
                        rel_var,
                        quote_ident(&field.rel_type),
                        right,
                        node_var,
                        quote_ident(&target.name)
                    ));
                    Some(rel_var)
                }
                _ => {
                    lines.push(format!("MATCH ({}:{})", node_var, quote_ident(&target.name)));
                    None
                }
            };
            let filter_target = FilterTarget {
                node: &node_var,
                edge: rel_var.as_deref(),
            };
            let conditions = node_filter(self.filter.for_target(&target.name), target, &filter_target, ctx, scope)?;
            lines.extend(where_clause(conditions));

            let selection = self.node_selection(target);
            let fields = selection.selected_fields();
            if let Some(allow) = node_allow(target, &fields, AuthOperation::Read, &node_var, ctx, scope)? {
                lines.push(guard_predicate(&allow));
            }
            let mut extra = vec![];
            if abstract_target {
                extra.push(format!("__resolveType: \"{}\"", target.name));
            }
            let projection = selection.to_projection(&node_var, &extra, ctx, scope)?;
            lines.extend(projection.subqueries);

            let mut entries = vec![format!("node: {} {}", node_var, projection.map)];
            if let Some(rel_var) = &rel_var {
                let properties = edge_fields
                    .iter()
                    .map(|field| format!("{}: {}", quote_ident(&field.name), projected_property(rel_var, field)))
                    .join(", ");
                entries.push(format!("properties: {{ {} }}", properties));
            }
            for (ix, item) in self.sort.iter().enumerate() {
                let var = match (item.edge, &rel_var) {
                    (true, Some(rel_var)) => rel_var.as_str(),
                    _ => node_var.as_str(),
                };
                entries.push(format!("__sort{}: {}", ix, property_of(var, &item.field)));
            }
            lines.push(format!("WITH {{ {} }} AS {}", entries.join(", "), edge_item));
            lines.push(format!("RETURN {}", edge_item));
            branches.push(lines.join("\n"));
        }

        let mut lines = vec![];
        if let Some(parent) = parent {
            lines.push(format!("WITH {}", parent));
        }
        match branches.is_empty() {
            true => lines.push("WITH [] AS edges".to_string()),
            false => {
                lines.push(format!("CALL {{\n{}\n}}", indent(&branches.join("\nUNION\n"), 1)));
                lines.push(format!("WITH collect({}) AS edges", edge_item));
            }
        }
        lines.push("WITH edges, size(edges) AS totalCount".to_string());

        let page = scope.allocate("var");
        let mut page_lines = vec![
            "WITH edges".to_string(),
            format!("UNWIND edges AS {}", edge_item),
            format!("WITH {}", edge_item),
        ];
        page_lines.extend(paging_clauses(
            &self.sort,
            self.first,
            Some(self.offset).filter(|x| *x > 0),
            |ix, _| format!("{}.__sort{}", edge_item, ix),
            scope,
        ));
        page_lines.push(format!("RETURN collect({}) AS {}", edge_item, page));
        lines.push(call_subquery(&page_lines));
        lines.push(format!(
            "RETURN {{ edges: {}, totalCount: totalCount }} AS {}",
            page, out
        ));
        Ok(lines)
    }
}

impl QueryEntrypoint for ConnectionBuilder {
    fn to_cypher_entrypoint(&self, ctx: &TranslationContext, scope: &mut Scope) -> GraphQLResult<String> {
        Ok(self.to_cypher_lines(None, ROOT, ctx, scope)?.join("\n"))
    }
}

impl QueryEntrypoint for ReadBuilder {
    fn to_cypher_entrypoint(&self, ctx: &TranslationContext, scope: &mut Scope) -> GraphQLResult<String> {
        let mut lines = vec![format!("MATCH ({}:{})", ROOT, quote_ident(&self.node.name))];
        let conditions = node_filter(&self.filter, &self.node, &FilterTarget::node(ROOT), ctx, scope)?;
        lines.extend(where_clause(conditions));
        let fields = self.selection.selected_fields();
        if let Some(allow) = node_allow(&self.node, &fields, AuthOperation::Read, ROOT, ctx, scope)? {
            lines.push(guard_predicate(&allow));
        }
        let paging = paging_clauses(
            &self.options.sort,
            self.options.limit,
            self.options.offset,
            |_, item| property_of(ROOT, &item.field),
            scope,
        );
        if !paging.is_empty() {
            lines.push("WITH *".to_string());
            lines.extend(paging);
        }
        let projection = self.selection.to_projection(ROOT, &[], ctx, scope)?;
        lines.extend(projection.subqueries);
        lines.push(format!("RETURN {} {} AS {}", ROOT, projection.map, ROOT));
        Ok(lines.join("\n"))
    }
}

impl QueryEntrypoint for AggregateBuilder {
    fn to_cypher_entrypoint(&self, ctx: &TranslationContext, scope: &mut Scope) -> GraphQLResult<String> {
        let mut lines = vec![format!("MATCH ({}:{})", ROOT, quote_ident(&self.node.name))];
        let conditions = node_filter(&self.filter, &self.node, &FilterTarget::node(ROOT), ctx, scope)?;
        lines.extend(where_clause(conditions));
        let fields: Vec<&str> = self
            .selections
            .iter()
            .filter_map(|x| match x {
                AggregateSelection::Field { field, .. } => Some(field.name.as_str()),
                _ => None,
            })
            .collect();
        if let Some(allow) = node_allow(&self.node, &fields, AuthOperation::Read, ROOT, ctx, scope)? {
            lines.push(guard_predicate(&allow));
        }
        lines.push(format!("RETURN {} AS {}", aggregate_map(&self.selections, ROOT, None), ROOT));
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Config;
    use crate::resolve::RootTranslation;
    use crate::GraphQLSchema;
    use serde_json::json;

    const TYPE_DEFS: &str = r#"
        type Movie {
            title: String!
            released: DateTime
            runtime: Int
            budget: BigInt
            actors: [Actor!]! @relationship(type: "ACTED_IN", direction: IN, properties: "ActedIn")
            director: Person @relationship(type: "DIRECTED", direction: IN)
            similarTitles: [String!]! @cypher(statement: "MATCH (this)-[:SIMILAR]->(m:Movie) RETURN m.title AS title", columnName: "title")
        }
        type Actor {
            name: String!
            movies: [Movie!]! @relationship(type: "ACTED_IN", direction: OUT, properties: "ActedIn")
        }
        type Person {
            name: String!
        }
        type ActedIn @relationshipProperties {
            role: String
            screenTime: Int
        }
    "#;

    fn translate_with(type_defs: &str, query: &str, claims: Option<serde_json::Value>) -> RootTranslation {
        let schema = GraphQLSchema::new(type_defs, Config::default()).unwrap();
        schema.translate(query, None, None, claims).unwrap().remove(0)
    }

    fn translate(query: &str) -> RootTranslation {
        translate_with(TYPE_DEFS, query, None)
    }

    #[test]
    fn identifiers_are_quoted_when_needed() {
        assert_eq!(quote_ident("Movie"), "Movie");
        assert_eq!(quote_ident("ACTED IN"), "`ACTED IN`");
        assert_eq!(quote_ident("a`b"), "`a``b`");
    }

    #[test]
    fn root_read_projects_and_paginates() {
        let statement = translate(
            r#"{ movies(where: {title: "Matrix"}, options: {sort: [{title: DESC}], limit: 20, offset: 5}) { title released } }"#,
        );
        assert_eq!(
            statement.cypher,
            "MATCH (this:Movie)\nWHERE this.title = $param0\nWITH *\nORDER BY this.title DESC\nSKIP $param1\nLIMIT $param2\nRETURN this { .title, released: toString(this.released) } AS this"
        );
        assert_eq!(statement.params["param0"], json!("Matrix"));
        assert_eq!(statement.params["param1"], json!({"low": 5, "high": 0}));
        assert_eq!(statement.params["param2"], json!({"low": 20, "high": 0}));
    }

    #[test]
    fn reads_without_options_have_no_paging() {
        let statement = translate("{ movies { title } }");
        assert_eq!(statement.cypher, "MATCH (this:Movie)\nRETURN this { .title } AS this");
        assert!(statement.params.is_empty());
    }

    #[test]
    fn nested_relations_are_subqueries() {
        let statement = translate(
            r#"{ movies { title actors(where: {name_STARTS_WITH: "K"}, options: {limit: 2}) { name } director { name } } }"#,
        );
        let cypher = &statement.cypher;
        assert!(cypher.contains("MATCH (this)<-[:ACTED_IN]-(this2:Actor)"));
        assert!(cypher.contains("WHERE this2.name STARTS WITH $param0"));
        assert!(cypher.contains("RETURN collect(var1) AS var0"));
        assert!(cypher.contains("MATCH (this)<-[:DIRECTED]-(this5:Person)"));
        assert!(cypher.contains("RETURN head(collect(var4)) AS var3"));
        assert!(cypher.ends_with("RETURN this { .title, actors: var0, director: var3 } AS this"));
        assert_eq!(statement.params["param1"], json!({"low": 2, "high": 0}));
    }

    #[test]
    fn cypher_fields_run_in_their_own_scope() {
        let statement = translate("{ movies { similarTitles } }");
        assert!(statement
            .cypher
            .contains("WITH this AS this\n        MATCH (this)-[:SIMILAR]->(m:Movie) RETURN m.title AS title"));
        assert!(statement.cypher.contains("WITH title AS this1"));
        assert!(statement.cypher.contains("RETURN collect(this1) AS var0"));
    }

    #[test]
    fn connections_count_before_slicing() {
        let statement = translate(
            r#"{ moviesConnection(first: 10, sort: [{title: ASC}]) { totalCount edges { node { title } } } }"#,
        );
        let cypher = &statement.cypher;
        assert!(cypher.starts_with("CALL {\n    MATCH (this1:Movie)"));
        assert!(cypher.contains("WITH { node: this1 { .title }, __sort0: this1.title } AS edge0"));
        assert!(cypher.contains("WITH edges, size(edges) AS totalCount"));
        assert!(cypher.contains("ORDER BY edge0.__sort0 ASC\n    LIMIT $param0"));
        assert!(cypher.ends_with("RETURN { edges: var2, totalCount: totalCount } AS this"));
    }

    #[test]
    fn relation_connections_project_edge_properties() {
        let statement = translate(
            r#"{ movies { actorsConnection(where: {edge: {role: "Neo"}}) { edges { role node { name } } } } }"#,
        );
        let cypher = &statement.cypher;
        assert!(cypher.contains("MATCH (this)<-[edge3:ACTED_IN]-(this2:Actor)"));
        assert!(cypher.contains("WHERE edge3.role = $param0"));
        assert!(cypher.contains("properties: { role: edge3.role }"));
    }

    #[test]
    fn aggregates_return_one_map() {
        let statement = translate("{ moviesAggregate(where: {runtime_GT: 90}) { count title { shortest longest } released { min } } }");
        assert!(statement.cypher.starts_with("MATCH (this:Movie)\nWHERE this.runtime > $param0\nRETURN { count: count(this), title: { shortest: reduce(shortest = null"));
        assert!(statement.cypher.contains("released: { min: toString(min(this.released)) }"));
    }

    #[test]
    fn relation_aggregates_read_edges() {
        let statement = translate("{ movies { actorsAggregate { count edge { screenTime { sum average } } } } }");
        assert!(statement.cypher.contains("MATCH (this)<-[edge2:ACTED_IN]-(this1:Actor)"));
        assert!(statement.cypher.contains(
            "RETURN { count: count(this1), edge: { screenTime: { sum: sum(edge2.screenTime), average: avg(edge2.screenTime) } } } AS var0"
        ));
    }
}
