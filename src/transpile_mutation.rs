//! Compiles create, update and delete builders into Cypher.
//!
//! A write walks Match, Pre-Guard, Apply, Post-Guard and Project in that order.
//! Every nested operation is its own `CALL { ... }` block importing the parent
//! variable, so sibling blocks never see each other's bindings. With
//! subscriptions enabled each block returns the event maps it produced and
//! the root returns them all in a `meta` column.

use crate::auth::AuthOperation;
use crate::builder::*;
use crate::directives::{RelationshipDirection, WriteOperation};
use crate::entity::*;
use crate::error::{GraphQLResult, RELATIONSHIP_REQUIRED_MARKER};
use crate::mutation::*;
use crate::scope::{Scope, ROOT};
use crate::transpile::*;
use crate::transpile_auth::{auth_filter, guard_call, guard_predicate, node_allow, node_bind};
use crate::transpile_filter::FilterTarget;
use itertools::Itertools;
use std::sync::Arc;

pub trait MutationEntrypoint {
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

/// The node a nested block hangs off
struct Parent<'p> {
    var: &'p str,
    node: &'p Arc<Node>,
    /// Created by this statement, so it has no prior relationships
    fresh: bool,
}

/// Variables holding lists of event maps, in the order they were produced
#[derive(Default)]
struct Events {
    lists: Vec<String>,
}

impl Events {
    fn capture(&mut self, event: String, lines: &mut Vec<String>, ctx: &TranslationContext, scope: &mut Scope) {
        if !ctx.subscriptions {
            return;
        }
        let var = scope.allocate("event");
        lines.push(format!("WITH *, [{}] AS {}", event, var));
        self.lists.push(var);
    }

    fn concatenated(&self) -> String {
        match self.lists.is_empty() {
            true => "[]".to_string(),
            false => self.lists.join(" + "),
        }
    }

    /// Aggregates the events of every row into one list
    fn collected(&self) -> String {
        format!("reduce(acc = [], x IN collect({}) | acc + x)", self.concatenated())
    }
}

fn node_event(event: &str, var: &str, node: &Node, old: &str, new: &str) -> String {
    format!(
        "{{ event: \"{}\", id: id({}), typename: \"{}\", timestamp: timestamp(), properties: {{ old: {}, new: {} }} }}",
        event, var, node.name, old, new
    )
}

fn relationship_event(event: &str, field: &RelationField, rel_var: &str, parent: (&str, &str), child: (&str, &str)) -> String {
    let (from, to) = match field.direction {
        RelationshipDirection::Out => (parent, child),
        RelationshipDirection::In => (child, parent),
    };
    format!(
        "{{ event: \"{}\", id: id({}), id_from: id({}), id_to: id({}), relationshipName: \"{}\", fromTypename: \"{}\", toTypename: \"{}\", timestamp: timestamp(), properties: {{ from: {} {{ .* }}, to: {} {{ .* }}, relationship: {} {{ .* }} }} }}",
        event, rel_var, from.0, to.0, field.rel_type, from.1, to.1, from.0, to.0, rel_var
    )
}

fn assignment(var: &str, item: &PropertyAssignment, scope: &mut Scope) -> String {
    let property = property_of(var, &item.field);
    let param = scope.clause_for(item.value.clone());
    let arithmetic = |op: &str| format!("{p} = {p} {} {}", op, param, p = property);
    match item.op {
        AssignOp::Set => format!("{} = {}", property, param_expr(&item.field, &param, item.field.is_list())),
        AssignOp::Increment | AssignOp::Add => arithmetic("+"),
        AssignOp::Decrement | AssignOp::Subtract => arithmetic("-"),
        AssignOp::Multiply => arithmetic("*"),
        AssignOp::Divide => arithmetic("/"),
        AssignOp::Push => format!("{p} = {p} + {}", param_expr(&item.field, &param, true), p = property),
        AssignOp::Pop => format!("{p} = {p}[0..-{}]", param, p = property),
    }
}

/// Input properties as the callbacks of `@populatedBy` receive them
fn callback_input(assignments: &[PropertyAssignment]) -> serde_json::Value {
    serde_json::Value::Object(
        assignments
            .iter()
            .map(|x| (x.field.name.clone(), x.value.clone()))
            .collect(),
    )
}

/// Values the statement sets without them being part of the input
fn generated_assignments<'f, I>(
    fields: I,
    provided: &[PropertyAssignment],
    op: WriteOperation,
    var: &str,
    ctx: &TranslationContext,
    scope: &mut Scope,
) -> GraphQLResult<Vec<String>>
where
    I: IntoIterator<Item = &'f Arc<PrimitiveField>>,
{
    let mut res = vec![];
    for field in fields {
        let property = property_of(var, field);
        if op == WriteOperation::Create && field.is_autogenerated_id() {
            res.push(format!("{} = randomUUID()", property));
        } else if field.timestamps.contains(&op) {
            let ctor = field.scalar().and_then(|x| x.cypher_constructor()).unwrap_or("datetime");
            res.push(format!("{} = {}()", property, ctor));
        } else if let Some(populated_by) = field.populated_by.as_ref().filter(|x| x.operations.contains(&op)) {
            let value = ctx.callbacks.call(&populated_by.callback, &callback_input(provided))?;
            let param = scope.clause_for(value);
            res.push(format!("{} = {}", property, param_expr(field, &param, field.is_list())));
        } else if op == WriteOperation::Create && !provided.iter().any(|x| x.field.name == field.name) {
            if let Some(default) = &field.default_value {
                let param = scope.clause_for(default.clone());
                res.push(format!("{} = {}", property, param_expr(field, &param, field.is_list())));
            }
        }
    }
    Ok(res)
}

fn set_clause(items: Vec<String>) -> Option<String> {
    match items.is_empty() {
        true => None,
        false => Some(format!("SET {}", items.join(", "))),
    }
}

fn edge_assignments(
    field: &RelationField,
    edge: &[PropertyAssignment],
    op: WriteOperation,
    rel_var: &str,
    ctx: &TranslationContext,
    scope: &mut Scope,
) -> GraphQLResult<Vec<String>> {
    let mut items: Vec<String> = edge.iter().map(|x| assignment(rel_var, x, scope)).collect();
    if let Some(properties) = ctx.model.properties_of(field) {
        items.extend(generated_assignments(properties.fields.iter(), edge, op, rel_var, ctx, scope)?);
    }
    Ok(items)
}

/// Relationship cardinality checks for the single relationships of `node`.
/// `fields` limits the check to the relationships a write touched.
fn cardinality_guards(node: &Node, var: &str, fields: Option<&[&str]>, scope: &mut Scope) -> Vec<String> {
    let mut res = vec![];
    for relation in node.relations().filter(|x| !x.is_list()) {
        if let Some(fields) = fields {
            if !fields.contains(&relation.name.as_str()) {
                continue;
            }
        }
        let other = scope.allocate("this");
        let labels: Vec<String> = relation.target.concrete().into_iter().map(String::from).collect();
        let (left, right) = relation.arrows(true);
        let count = format!(
            "COUNT {{ MATCH ({}){}[:{}]{}({}) WHERE {} }}",
            var,
            left,
            quote_ident(&relation.rel_type),
            right,
            other,
            label_predicate(&other, &labels)
        );
        let (predicate, message) = match relation.type_meta.required {
            true => (
                format!("{} = 1", count),
                format!("{}.{} required exactly once", node.name, relation.name),
            ),
            false => (
                format!("{} <= 1", count),
                format!("{}.{} must not occur more than once", node.name, relation.name),
            ),
        };
        res.push(format!(
            "WITH *\nWHERE apoc.util.validatePredicate(NOT ({}), \"{}{}\", [0])",
            predicate, RELATIONSHIP_REQUIRED_MARKER, message
        ));
    }
    res
}

fn assigned_fields(assignments: &[PropertyAssignment]) -> Vec<&str> {
    assignments.iter().map(|x| x.field.name.as_str()).unique().collect()
}

/// `CREATE` and `SET` for one node along with its allow guard and nested writes
fn create_node(
    input: &CreateInput,
    var: &str,
    ctx: &TranslationContext,
    scope: &mut Scope,
    events: &mut Events,
) -> GraphQLResult<Vec<String>> {
    let node = &input.node;
    let mut lines = vec![format!("CREATE ({}:{})", var, quote_ident(&node.name))];
    let mut items: Vec<String> = input.properties.iter().map(|x| assignment(var, x, scope)).collect();
    items.extend(generated_assignments(
        node.primitives(),
        &input.properties,
        WriteOperation::Create,
        var,
        ctx,
        scope,
    )?);
    lines.extend(set_clause(items));

    let fields = assigned_fields(&input.properties);
    if let Some(allow) = node_allow(node, &fields, AuthOperation::Create, var, ctx, scope)? {
        lines.push(guard_call(&allow));
    }
    let parent = Parent { var, node, fresh: true };
    lines.extend(nested_blocks(&input.nested, &parent, ctx, scope, events)?);
    Ok(lines)
}

/// Bind and cardinality guards of a created node. Runs once every edge
/// the node takes part in exists, the one to its parent included.
fn finish_create(
    input: &CreateInput,
    var: &str,
    ctx: &TranslationContext,
    scope: &mut Scope,
    events: &mut Events,
) -> GraphQLResult<Vec<String>> {
    let node = &input.node;
    let mut lines = vec![];
    let fields = assigned_fields(&input.properties);
    if let Some(bind) = node_bind(node, &fields, AuthOperation::Create, var, ctx, scope)? {
        lines.push(guard_call(&bind));
    }
    lines.extend(cardinality_guards(node, var, None, scope));
    events.capture(node_event("create", var, node, "null", &format!("{} {{ .* }}", var)), &mut lines, ctx, scope);
    Ok(lines)
}

/// Wraps the body of a nested block and records its event list with the parent
fn close_block(
    mut lines: Vec<String>,
    inner: &Events,
    outer: &mut Events,
    ctx: &TranslationContext,
    scope: &mut Scope,
) -> Vec<String> {
    let out = scope.allocate("var");
    match ctx.subscriptions {
        true => {
            lines.push(format!("RETURN {} AS {}", inner.collected(), out));
            outer.lists.push(out);
        }
        false => lines.push(format!("RETURN count(*) AS {}", out)),
    }
    vec!["WITH *".to_string(), call_subquery(&lines)]
}

fn nested_blocks(
    nested: &[NestedMutation],
    parent: &Parent,
    ctx: &TranslationContext,
    scope: &mut Scope,
    events: &mut Events,
) -> GraphQLResult<Vec<String>> {
    let mut res = vec![];
    for item in nested {
        match &item.node {
            MutationNode::Create { input, edge } => {
                res.extend(create_block(&item.field, input, edge, parent, ctx, scope, events)?)
            }
            MutationNode::Connect {
                targets,
                filter,
                edge,
                nested,
                overwrite,
            } => {
                for target in targets {
                    let connect = Connect {
                        field: &item.field,
                        target,
                        filter,
                        edge,
                        nested,
                        overwrite: *overwrite,
                    };
                    res.extend(connect.to_block(parent, ctx, scope, events)?);
                }
            }
            MutationNode::ConnectOrCreate {
                target,
                unique,
                on_create,
                edge,
            } => res.extend(connect_or_create_block(
                &item.field,
                target,
                unique,
                on_create,
                edge,
                parent,
                ctx,
                scope,
                events,
            )?),
            MutationNode::Update {
                targets,
                filter,
                update,
                edge,
            } => {
                for target in targets {
                    res.extend(update_block(&item.field, target, filter, update, edge, parent, ctx, scope, events)?);
                }
            }
            MutationNode::Delete {
                targets,
                filter,
                nested,
            } => {
                for target in targets {
                    res.extend(delete_block(&item.field, target, filter, nested, parent, ctx, scope, events)?);
                }
            }
            MutationNode::Disconnect {
                targets,
                filter,
                nested,
            } => {
                for target in targets {
                    res.extend(disconnect_block(&item.field, target, filter, nested, parent, ctx, scope, events)?);
                }
            }
        }
    }
    Ok(res)
}

/// `(parent)<-[rel:TYPE]-(child)` oriented by the relationship direction
fn pattern(field: &RelationField, parent: &str, rel_var: &str, child: &str) -> String {
    let (left, right) = field.arrows(true);
    format!(
        "({}){}[{}:{}]{}({})",
        parent,
        left,
        rel_var,
        quote_ident(&field.rel_type),
        right,
        child
    )
}

#[allow(clippy::too_many_arguments)]
fn create_block(
    field: &RelationField,
    input: &CreateInput,
    edge: &[PropertyAssignment],
    parent: &Parent,
    ctx: &TranslationContext,
    scope: &mut Scope,
    outer: &mut Events,
) -> GraphQLResult<Vec<String>> {
    let mut events = Events::default();
    let child = scope.allocate("this");
    let rel_var = scope.allocate("edge");
    let mut lines = vec![format!("WITH {}", parent.var)];
    lines.extend(create_node(input, &child, ctx, scope, &mut events)?);
    lines.push(format!("CREATE {}", pattern(field, parent.var, &rel_var, &child)));
    lines.extend(set_clause(edge_assignments(field, edge, WriteOperation::Create, &rel_var, ctx, scope)?));
    lines.extend(finish_create(input, &child, ctx, scope, &mut events)?);
    events.capture(
        relationship_event(
            "create_relationship",
            field,
            &rel_var,
            (parent.var, &parent.node.name),
            (&child, &input.node.name),
        ),
        &mut lines,
        ctx,
        scope,
    );
    Ok(close_block(lines, &events, outer, ctx, scope))
}

struct Connect<'a> {
    field: &'a Arc<RelationField>,
    target: &'a Arc<Node>,
    filter: &'a crate::filter::FilterBuilder,
    edge: &'a [PropertyAssignment],
    nested: &'a [NestedMutation],
    overwrite: bool,
}

impl Connect<'_> {
    fn to_block(
        &self,
        parent: &Parent,
        ctx: &TranslationContext,
        scope: &mut Scope,
        outer: &mut Events,
    ) -> GraphQLResult<Vec<String>> {
        let mut events = Events::default();
        let child = scope.allocate("this");
        let rel_var = scope.allocate("edge");
        let mut lines = vec![
            format!("WITH {}", parent.var),
            format!("MATCH ({}:{})", child, quote_ident(&self.target.name)),
        ];
        let mut conditions = vec![];
        conditions.extend(self.filter.to_cypher(&FilterTarget::node(&child), scope)?);
        conditions.extend(auth_filter(&self.target.auth, AuthOperation::Read, &child, ctx, scope)?);
        lines.extend(where_clause(conditions));

        let mut allow = vec![];
        allow.extend(node_allow(parent.node, &[], AuthOperation::Connect, parent.var, ctx, scope)?);
        allow.extend(node_allow(self.target, &[], AuthOperation::Connect, &child, ctx, scope)?);
        if let Some(allow) = and_join(allow) {
            lines.push(guard_call(&allow));
        }

        if self.overwrite && !self.field.is_list() && !parent.fresh {
            let existing = scope.allocate("edge");
            let other = scope.allocate("this");
            let out = scope.allocate("var");
            lines.push(call_subquery(&[
                format!("WITH {}, {}", parent.var, child),
                format!("OPTIONAL MATCH {}", pattern(self.field, parent.var, &existing, &other)),
                format!("WHERE {} <> {}", other, child),
                format!("DELETE {}", existing),
                format!("RETURN count(*) AS {}", out),
            ]));
        }

        lines.push(format!("MERGE {}", pattern(self.field, parent.var, &rel_var, &child)));
        lines.extend(set_clause(edge_assignments(
            self.field,
            self.edge,
            WriteOperation::Create,
            &rel_var,
            ctx,
            scope,
        )?));
        let connected = Parent {
            var: &child,
            node: self.target,
            fresh: false,
        };
        lines.extend(nested_blocks(self.nested, &connected, ctx, scope, &mut events)?);
        events.capture(
            relationship_event(
                "create_relationship",
                self.field,
                &rel_var,
                (parent.var, &parent.node.name),
                (&child, &self.target.name),
            ),
            &mut lines,
            ctx,
            scope,
        );
        Ok(close_block(lines, &events, outer, ctx, scope))
    }
}

#[allow(clippy::too_many_arguments)]
fn connect_or_create_block(
    field: &RelationField,
    target: &Arc<Node>,
    unique: &[PropertyAssignment],
    on_create: &[PropertyAssignment],
    edge: &[PropertyAssignment],
    parent: &Parent,
    ctx: &TranslationContext,
    scope: &mut Scope,
    outer: &mut Events,
) -> GraphQLResult<Vec<String>> {
    let events = Events::default();
    let child = scope.allocate("this");
    let rel_var = scope.allocate("edge");
    let keys = unique
        .iter()
        .map(|x| {
            let param = scope.clause_for(x.value.clone());
            format!("{}: {}", quote_ident(&x.field.db_property), param_expr(&x.field, &param, x.field.is_list()))
        })
        .join(", ");
    let mut lines = vec![
        format!("WITH {}", parent.var),
        format!("MERGE ({}:{} {{ {} }})", child, quote_ident(&target.name), keys),
    ];

    let mut created: Vec<String> = on_create.iter().map(|x| assignment(&child, x, scope)).collect();
    let provided: Vec<PropertyAssignment> = unique.iter().chain(on_create.iter()).cloned().collect();
    created.extend(generated_assignments(
        target.primitives(),
        &provided,
        WriteOperation::Create,
        &child,
        ctx,
        scope,
    )?);
    if let Some(set) = set_clause(created) {
        lines.push(format!("ON CREATE {}", set));
    }

    let mut allow = vec![];
    allow.extend(node_allow(parent.node, &[], AuthOperation::Connect, parent.var, ctx, scope)?);
    allow.extend(node_allow(target, &[], AuthOperation::Connect, &child, ctx, scope)?);
    if let Some(allow) = and_join(allow) {
        lines.push(guard_call(&allow));
    }

    lines.push(format!("MERGE {}", pattern(field, parent.var, &rel_var, &child)));
    if let Some(set) = set_clause(edge_assignments(field, edge, WriteOperation::Create, &rel_var, ctx, scope)?) {
        lines.push(format!("ON CREATE {}", set));
    }
    Ok(close_block(lines, &events, outer, ctx, scope))
}

/// `MATCH` of the related nodes addressed by a connection filter
fn match_related(
    field: &RelationField,
    target: &Node,
    filter: &crate::filter::FilterBuilder,
    parent: &Parent,
    child: &str,
    rel_var: &str,
    ctx: &TranslationContext,
    scope: &mut Scope,
) -> GraphQLResult<Vec<String>> {
    let mut lines = vec![
        format!("WITH {}", parent.var),
        format!(
            "MATCH {}",
            pattern(field, parent.var, rel_var, &format!("{}:{}", child, quote_ident(&target.name)))
        ),
    ];
    let filter_target = FilterTarget {
        node: child,
        edge: Some(rel_var),
    };
    let mut conditions = vec![];
    conditions.extend(filter.to_cypher(&filter_target, scope)?);
    conditions.extend(auth_filter(&target.auth, AuthOperation::Read, child, ctx, scope)?);
    lines.extend(where_clause(conditions));
    Ok(lines)
}

#[allow(clippy::too_many_arguments)]
fn update_block(
    field: &RelationField,
    target: &Arc<Node>,
    filter: &crate::filter::FilterBuilder,
    update: &UpdateInput,
    edge: &[PropertyAssignment],
    parent: &Parent,
    ctx: &TranslationContext,
    scope: &mut Scope,
    outer: &mut Events,
) -> GraphQLResult<Vec<String>> {
    let mut events = Events::default();
    let child = scope.allocate("this");
    let rel_var = scope.allocate("edge");
    let mut lines = match_related(field, target, filter, parent, &child, &rel_var, ctx, scope)?;
    let updated = Parent {
        var: &child,
        node: target,
        fresh: false,
    };
    lines.extend(update_node(update, &updated, ctx, scope, &mut events)?);
    lines.extend(set_clause(edge_assignments(field, edge, WriteOperation::Update, &rel_var, ctx, scope)?));
    Ok(close_block(lines, &events, outer, ctx, scope))
}

#[allow(clippy::too_many_arguments)]
fn delete_block(
    field: &RelationField,
    target: &Arc<Node>,
    filter: &crate::filter::FilterBuilder,
    nested: &[NestedMutation],
    parent: &Parent,
    ctx: &TranslationContext,
    scope: &mut Scope,
    outer: &mut Events,
) -> GraphQLResult<Vec<String>> {
    let mut events = Events::default();
    let child = scope.allocate("this");
    let rel_var = scope.allocate("edge");
    let mut lines = match_related(field, target, filter, parent, &child, &rel_var, ctx, scope)?;
    if let Some(allow) = node_allow(target, &[], AuthOperation::Delete, &child, ctx, scope)? {
        lines.push(guard_call(&allow));
    }
    let deleted = Parent {
        var: &child,
        node: target,
        fresh: false,
    };
    lines.extend(nested_blocks(nested, &deleted, ctx, scope, &mut events)?);
    events.capture(
        node_event("delete", &child, target, &format!("{} {{ .* }}", child), "null"),
        &mut lines,
        ctx,
        scope,
    );
    lines.push(format!("DETACH DELETE {}", child));
    Ok(close_block(lines, &events, outer, ctx, scope))
}

#[allow(clippy::too_many_arguments)]
fn disconnect_block(
    field: &RelationField,
    target: &Arc<Node>,
    filter: &crate::filter::FilterBuilder,
    nested: &[NestedMutation],
    parent: &Parent,
    ctx: &TranslationContext,
    scope: &mut Scope,
    outer: &mut Events,
) -> GraphQLResult<Vec<String>> {
    let mut events = Events::default();
    let child = scope.allocate("this");
    let rel_var = scope.allocate("edge");
    let mut lines = match_related(field, target, filter, parent, &child, &rel_var, ctx, scope)?;
    let mut allow = vec![];
    allow.extend(node_allow(parent.node, &[], AuthOperation::Disconnect, parent.var, ctx, scope)?);
    allow.extend(node_allow(target, &[], AuthOperation::Disconnect, &child, ctx, scope)?);
    if let Some(allow) = and_join(allow) {
        lines.push(guard_call(&allow));
    }
    let disconnected = Parent {
        var: &child,
        node: target,
        fresh: false,
    };
    lines.extend(nested_blocks(nested, &disconnected, ctx, scope, &mut events)?);
    events.capture(
        relationship_event(
            "delete_relationship",
            field,
            &rel_var,
            (parent.var, &parent.node.name),
            (&child, &target.name),
        ),
        &mut lines,
        ctx,
        scope,
    );
    lines.push(format!("DELETE {}", rel_var));
    Ok(close_block(lines, &events, outer, ctx, scope))
}

/// Pre-guard, `SET`, nested writes and post-guards of an update
fn update_node(
    update: &UpdateInput,
    target: &Parent,
    ctx: &TranslationContext,
    scope: &mut Scope,
    events: &mut Events,
) -> GraphQLResult<Vec<String>> {
    let node = target.node;
    let var = target.var;
    let mut lines = vec![];
    let fields = assigned_fields(&update.properties);
    if let Some(allow) = node_allow(node, &fields, AuthOperation::Update, var, ctx, scope)? {
        lines.push(guard_call(&allow));
    }

    let changes_properties = !update.properties.is_empty();
    let old = match ctx.subscriptions && changes_properties {
        true => {
            let old = scope.allocate("old");
            lines.push(format!("WITH *, {} {{ .* }} AS {}", var, old));
            old
        }
        false => "null".to_string(),
    };
    let mut items: Vec<String> = update.properties.iter().map(|x| assignment(var, x, scope)).collect();
    if changes_properties {
        items.extend(generated_assignments(
            node.primitives(),
            &update.properties,
            WriteOperation::Update,
            var,
            ctx,
            scope,
        )?);
    }
    lines.extend(set_clause(items));

    lines.extend(nested_blocks(&update.nested, target, ctx, scope, events)?);
    if let Some(bind) = node_bind(node, &fields, AuthOperation::Update, var, ctx, scope)? {
        lines.push(guard_call(&bind));
    }
    let touched: Vec<&str> = update.nested.iter().map(|x| x.field.name.as_str()).unique().collect();
    if !touched.is_empty() {
        lines.extend(cardinality_guards(node, var, Some(&touched), scope));
    }
    if changes_properties {
        events.capture(
            node_event("update", var, node, &old, &format!("{} {{ .* }}", var)),
            &mut lines,
            ctx,
            scope,
        );
    }
    Ok(lines)
}

/// Read guard and projection of the nodes returned by a mutation
fn project_response(
    node: &Arc<Node>,
    selections: &[MutationResponseSelection],
    ctx: &TranslationContext,
    scope: &mut Scope,
) -> GraphQLResult<(Vec<String>, String)> {
    let selection = response_node_selection(node, selections);
    let mut lines = vec![];
    let fields = selection.selected_fields();
    if let Some(allow) = node_allow(node, &fields, AuthOperation::Read, ROOT, ctx, scope)? {
        lines.push(guard_predicate(&allow));
    }
    let projection = selection.to_projection(ROOT, &[], ctx, scope)?;
    lines.extend(projection.subqueries);
    Ok((lines, format!("{} {}", ROOT, projection.map)))
}

impl MutationEntrypoint for CreateBuilder {
    fn to_cypher_entrypoint(&self, ctx: &TranslationContext, scope: &mut Scope) -> GraphQLResult<String> {
        if self.inputs.is_empty() {
            let mut columns = vec!["[] AS data".to_string()];
            if ctx.subscriptions {
                columns.push("[] AS meta".to_string());
            }
            return Ok(format!("RETURN {}", columns.join(", ")));
        }

        let mut lines = vec![];
        let mut created = vec![];
        let mut metas = vec![];
        for input in &self.inputs {
            let var = scope.allocate("this");
            let mut events = Events::default();
            let mut block = create_node(input, &var, ctx, scope, &mut events)?;
            block.extend(finish_create(input, &var, ctx, scope, &mut events)?);
            let mut columns = vec![var.clone()];
            if ctx.subscriptions {
                let meta = scope.allocate("meta");
                columns.push(format!("{} AS {}", events.concatenated(), meta));
                metas.push(meta);
            }
            block.push(format!("RETURN {}", columns.join(", ")));
            lines.push(call_subquery(&block));
            created.push(var);
        }

        lines.push(format!("UNWIND [{}] AS {}", created.join(", "), ROOT));
        let (projection_lines, map) = project_response(&self.node, &self.selections, ctx, scope)?;
        lines.extend(projection_lines);
        let mut columns = vec![format!("collect({}) AS data", map)];
        if ctx.subscriptions {
            columns.push(format!("{} AS meta", metas.join(" + ")));
        }
        lines.push(format!("RETURN {}", columns.join(", ")));
        Ok(lines.join("\n"))
    }
}

impl MutationEntrypoint for UpdateBuilder {
    fn to_cypher_entrypoint(&self, ctx: &TranslationContext, scope: &mut Scope) -> GraphQLResult<String> {
        let mut lines = vec![format!("MATCH ({}:{})", ROOT, quote_ident(&self.node.name))];
        let mut conditions = vec![];
        conditions.extend(self.filter.to_cypher(&FilterTarget::node(ROOT), scope)?);
        conditions.extend(auth_filter(&self.node.auth, AuthOperation::Update, ROOT, ctx, scope)?);
        lines.extend(where_clause(conditions));

        let mut events = Events::default();
        let target = Parent {
            var: ROOT,
            node: &self.node,
            fresh: false,
        };
        lines.extend(update_node(&self.update, &target, ctx, scope, &mut events)?);
        lines.push("WITH *".to_string());
        let (projection_lines, map) = project_response(&self.node, &self.selections, ctx, scope)?;
        lines.extend(projection_lines);
        let mut columns = vec![format!("collect(DISTINCT {}) AS data", map)];
        if ctx.subscriptions {
            columns.push(format!("{} AS meta", events.collected()));
        }
        lines.push(format!("RETURN {}", columns.join(", ")));
        Ok(lines.join("\n"))
    }
}

impl MutationEntrypoint for DeleteBuilder {
    fn to_cypher_entrypoint(&self, ctx: &TranslationContext, scope: &mut Scope) -> GraphQLResult<String> {
        let mut lines = vec![format!("MATCH ({}:{})", ROOT, quote_ident(&self.node.name))];
        let mut conditions = vec![];
        conditions.extend(self.filter.to_cypher(&FilterTarget::node(ROOT), scope)?);
        conditions.extend(auth_filter(&self.node.auth, AuthOperation::Delete, ROOT, ctx, scope)?);
        lines.extend(where_clause(conditions));
        if let Some(allow) = node_allow(&self.node, &[], AuthOperation::Delete, ROOT, ctx, scope)? {
            lines.push(guard_call(&allow));
        }

        let mut events = Events::default();
        let target = Parent {
            var: ROOT,
            node: &self.node,
            fresh: false,
        };
        lines.extend(nested_blocks(&self.nested, &target, ctx, scope, &mut events)?);
        events.capture(
            node_event("delete", ROOT, &self.node, &format!("{} {{ .* }}", ROOT), "null"),
            &mut lines,
            ctx,
            scope,
        );
        lines.push(format!("DETACH DELETE {}", ROOT));
        if ctx.subscriptions {
            lines.push(format!("RETURN {} AS meta", events.collected()));
        }
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Config;
    use crate::resolve::RootTranslation;
    use crate::GraphQLSchema;
    use serde_json::json;

    const TYPE_DEFS: &str = r#"
        type Movie {
            id: ID! @id
            title: String!
            views: Int
            tags: [String!]
            createdAt: DateTime! @timestamp(operations: [CREATE])
            status: String @default(value: "draft")
            actors: [Actor!]! @relationship(type: "ACTED_IN", direction: IN, properties: "ActedIn")
            director: Person! @relationship(type: "DIRECTED", direction: IN)
        }
        type Actor {
            name: String! @unique
            movies: [Movie!]! @relationship(type: "ACTED_IN", direction: OUT, properties: "ActedIn")
        }
        type Person {
            name: String!
        }
        type ActedIn @relationshipProperties {
            role: String
        }
    "#;

    fn translate(query: &str, subscriptions: bool) -> RootTranslation {
        let mut config = Config::default();
        config.features.subscriptions = subscriptions;
        let schema = GraphQLSchema::new(TYPE_DEFS, config).unwrap();
        schema.translate(query, None, None, None).unwrap().remove(0)
    }

    #[test]
    fn creates_set_generated_values() {
        let translation = translate(
            r#"mutation { createMovies(input: [{title: "Matrix", director: {connect: {where: {node: {name: "Lana"}}}}}]) { movies { title } } }"#,
            false,
        );
        let cypher = &translation.cypher;
        assert!(cypher.starts_with(
            "CALL {\n    CREATE (this0:Movie)\n    SET this0.title = $param0, this0.id = randomUUID(), this0.createdAt = datetime(), this0.status = $param1"
        ));
        assert_eq!(translation.params["param1"], json!("draft"));
        assert!(cypher.contains("MERGE (this0)<-[edge2:DIRECTED]-(this1)"));
        assert!(cypher.contains(
            "apoc.util.validatePredicate(NOT (COUNT { MATCH (this0)<-[:DIRECTED]-(this4) WHERE this4:Person } = 1), \"@neo4j/graphql/RELATIONSHIP-REQUIREDMovie.director required exactly once\", [0])"
        ));
        assert!(cypher.contains("UNWIND [this0] AS this"));
        assert!(cypher.ends_with("RETURN collect(this { .title }) AS data"));
    }

    #[test]
    fn empty_create_input_returns_no_nodes() {
        let translation = translate("mutation { createMovies(input: []) { movies { title } } }", true);
        assert_eq!(translation.cypher, "RETURN [] AS data, [] AS meta");
    }

    #[test]
    fn update_operators_compile_to_arithmetic() {
        let translation = translate(
            r#"mutation { updateMovies(where: {title: "Matrix"}, update: {views_INCREMENT: 1, tags_POP: 2}) { movies { title } } }"#,
            false,
        );
        assert!(translation.cypher.contains("SET this.views = this.views + $param1, this.tags = this.tags[0..-$param2]"));
        assert!(translation.cypher.ends_with("RETURN collect(DISTINCT this { .title }) AS data"));
    }

    #[test]
    fn nested_operations_run_removals_first() {
        let translation = translate(
            r#"mutation {
                updateMovies(
                    update: {actors: [{
                        connect: [{where: {node: {name: "Keanu"}}, edge: {role: "Neo"}}]
                        disconnect: [{where: {node: {name: "Hugo"}}}]
                    }]}
                ) { movies { title } }
            }"#,
            false,
        );
        let cypher = &translation.cypher;
        let disconnect = cypher.find("DELETE edge").unwrap();
        let connect = cypher.find("MERGE (this)<-[").unwrap();
        assert!(disconnect < connect);
        assert!(cypher.contains("SET edge"));
    }

    #[test]
    fn connect_or_create_merges_on_unique_keys() {
        let translation = translate(
            r#"mutation { updateMovies(update: {actors: [{connectOrCreate: [{where: {node: {name: "Keanu"}}, onCreate: {node: {name: "Keanu"}, edge: {role: "Neo"}}}]}]}) { movies { title } } }"#,
            false,
        );
        assert!(translation.cypher.contains("MERGE (this0:Actor { name: $param0 })"));
        assert!(translation.cypher.contains("MERGE (this)<-[edge1:ACTED_IN]-(this0)"));
        assert!(translation.cypher.contains("ON CREATE SET edge1.role = $param"));
    }

    #[test]
    fn deletes_capture_events_before_removal() {
        let translation = translate(r#"mutation { deleteMovies(where: {title: "Matrix"}) { nodesDeleted } }"#, true);
        let cypher = &translation.cypher;
        assert!(cypher.contains(
            "WITH *, [{ event: \"delete\", id: id(this), typename: \"Movie\", timestamp: timestamp(), properties: { old: this { .* }, new: null } }] AS event0"
        ));
        assert!(cypher.contains("DETACH DELETE this\nRETURN reduce(acc = [], x IN collect(event0) | acc + x) AS meta"));
    }

    #[test]
    fn deletes_without_subscriptions_return_nothing() {
        let translation = translate(r#"mutation { deleteMovies(where: {title: "Matrix"}) { nodesDeleted } }"#, false);
        assert_eq!(translation.cypher, "MATCH (this:Movie)\nWHERE this.title = $param0\nDETACH DELETE this");
    }
}
