//! Translates GraphQL operations against a directive-annotated type
//! definition document into Cypher statements.

use crate::auth::AuthContext;
use crate::context::{load_entity_model, Callbacks};
use crate::entity::EntityModel;
use crate::graphql::__Schema;
use crate::transpile::TranslationContext;
use serde_json::Value;
use std::sync::Arc;

mod auth;
mod builder;
mod constants;
mod context;
mod directives;
mod entity;
mod error;
mod events;
mod filter;
mod graphql;
mod gson;
mod inputs;
mod mutation;
mod omit;
mod parser_util;
mod resolve;
mod scope;
mod sdl;
mod transpile;
mod transpile_auth;
mod transpile_filter;
mod transpile_mutation;

pub use context::{Config, Features, JwtConfig, AuthorizationFeature};
pub use error::{GraphQLError, GraphQLResult, FORBIDDEN_MARKER, RELATIONSHIP_REQUIRED_MARKER};
pub use events::{EventSink, NodeEvent, NodeProperties, RelationshipEvent, RelationshipProperties, SubscriptionEvent};
pub use omit::Omit;
pub use resolve::{
    Counters, DriverError, ErrorMessage, GraphDriver, GraphQLResponse, QueryResult, RootKind, RootTranslation,
};

/// An augmented schema built from type definitions
#[derive(Clone, Debug)]
pub struct GraphQLSchema {
    model: Arc<EntityModel>,
    config: Config,
    callbacks: Callbacks,
}

impl GraphQLSchema {
    pub fn new(type_defs: &str, config: Config) -> GraphQLResult<Self> {
        let model = load_entity_model(type_defs, &config)?;
        Ok(Self {
            model,
            config,
            callbacks: Callbacks::default(),
        })
    }

    /// Registers the callback `@populatedBy(callback: name)` fields are computed with
    pub fn register_callback<F>(&mut self, name: &str, callback: F)
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.callbacks.register(name, callback);
    }

    /// The generated schema as SDL, types sorted by name
    pub fn type_defs(&self) -> String {
        sdl::print_schema(&__Schema::new(Arc::clone(&self.model)))
    }

    fn plan(
        &self,
        query: &str,
        variables: Option<Value>,
        operation_name: Option<&str>,
        claims: Option<Value>,
    ) -> GraphQLResult<Vec<resolve::PlannedRoot>> {
        let auth = AuthContext::new(claims, self.config.roles_path());
        let ctx = TranslationContext {
            model: &self.model,
            auth: &auth,
            callbacks: &self.callbacks,
            subscriptions: self.config.subscriptions_enabled(),
        };
        let schema = __Schema::new(Arc::clone(&self.model));
        resolve::plan_operation(query, variables, operation_name, &schema, &ctx)
    }

    /// Compiles every root field of the selected operation into one statement each
    pub fn translate(
        &self,
        query: &str,
        variables: Option<Value>,
        operation_name: Option<&str>,
        claims: Option<Value>,
    ) -> GraphQLResult<Vec<RootTranslation>> {
        Ok(self
            .plan(query, variables, operation_name, claims)?
            .into_iter()
            .map(|x| x.translation)
            .collect())
    }

    /// Translates the operation, runs each statement through `driver` and
    /// shapes the rows into a response. Subscription events are handed to
    /// `sink` once the statement that produced them succeeded.
    pub fn execute(
        &self,
        driver: &dyn GraphDriver,
        query: &str,
        variables: Option<Value>,
        operation_name: Option<&str>,
        claims: Option<Value>,
        sink: Option<&dyn EventSink>,
    ) -> GraphQLResponse {
        match self.plan(query, variables, operation_name, claims) {
            Ok(plan) => resolve::execute_plan(plan, driver, sink),
            Err(err) => GraphQLResponse::from_error(&err),
        }
    }
}
