use crate::entity::EntityModel;
use crate::error::{GraphQLError, GraphQLResult};
use cached::proc_macro::cached;
use cached::SizedCache;
use graphql_parser::schema::parse_schema;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Schema construction options, deserialised from a camelCase JSON object
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Generates `_MATCHES` regular expression filters for String and ID fields
    pub enable_regex: bool,
    pub jwt: Option<JwtConfig>,
    pub features: Features,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase", default)]
pub struct JwtConfig {
    pub secret: Option<String>,
    /// Dotted path of the roles claim, `roles` when unset
    pub roles_path: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase", default)]
pub struct Features {
    pub authorization: Option<AuthorizationFeature>,
    /// Emits subscription event metadata from every mutation
    pub subscriptions: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthorizationFeature {
    pub key: String,
}

impl Config {
    pub fn roles_path(&self) -> &str {
        self.jwt
            .as_ref()
            .and_then(|x| x.roles_path.as_deref())
            .unwrap_or("roles")
    }

    pub fn subscriptions_enabled(&self) -> bool {
        self.features.subscriptions
    }

    pub fn from_json(value: &serde_json::Value) -> GraphQLResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| GraphQLError::schema_validation(format!("Invalid configuration: {e}")))
    }
}

pub fn calculate_hash<T: Hash>(t: &T) -> u64 {
    let mut s = DefaultHasher::new();
    t.hash(&mut s);
    s.finish()
}

/// Callback computing a `@populatedBy` value from the write's input properties
pub type Callback = Arc<dyn Fn(&serde_json::Value) -> serde_json::Value + Send + Sync>;

/// Named callbacks referenced by `@populatedBy(callback: "...")`
#[derive(Clone, Default)]
pub struct Callbacks {
    callbacks: HashMap<String, Callback>,
}

impl Callbacks {
    pub fn register<F>(&mut self, name: &str, callback: F)
    where
        F: Fn(&serde_json::Value) -> serde_json::Value + Send + Sync + 'static,
    {
        self.callbacks.insert(name.to_string(), Arc::new(callback));
    }

    pub fn call(&self, name: &str, input: &serde_json::Value) -> GraphQLResult<serde_json::Value> {
        match self.callbacks.get(name) {
            Some(callback) => Ok(callback(input)),
            None => Err(GraphQLError::translation(format!(
                "Callback \"{}\" is not registered",
                name
            ))),
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.callbacks.keys()).finish()
    }
}

/// Builds the entity model for a type definition document. Results are shared
/// process-wide, keyed by the document text and configuration.
#[cached(
    type = "SizedCache<u64, Result<Arc<EntityModel>, GraphQLError>>",
    create = "{ SizedCache::with_size(64) }",
    convert = r#"{ calculate_hash(&(type_defs, config)) }"#,
    sync_writes = true
)]
pub fn load_entity_model(type_defs: &str, config: &Config) -> Result<Arc<EntityModel>, GraphQLError> {
    let document = parse_schema::<String>(type_defs)?;
    let model = EntityModel::build(&document, config)?;
    tracing::debug!(
        nodes = model.nodes.len(),
        interfaces = model.interfaces.len(),
        unions = model.unions.len(),
        "built entity model"
    );
    Ok(Arc::new(model))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_reads_camel_case_json() {
        let config = Config::from_json(&serde_json::json!({
            "enableRegex": true,
            "jwt": {"secret": "s3cr3t", "rolesPath": "https://example\\.com/roles"},
            "features": {"authorization": {"key": "k"}, "subscriptions": true}
        }))
        .unwrap();
        assert!(config.enable_regex);
        assert!(config.subscriptions_enabled());
        assert_eq!(config.roles_path(), "https://example\\.com/roles");
        assert_eq!(config.features.authorization.unwrap().key, "k");
    }

    #[test]
    fn config_defaults() {
        let config = Config::from_json(&serde_json::json!({})).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.roles_path(), "roles");
    }

    #[test]
    fn callbacks_are_looked_up_by_name() {
        let mut callbacks = Callbacks::default();
        callbacks.register("slug", |input| {
            let title = input["title"].as_str().unwrap_or_default();
            serde_json::json!(title.to_lowercase().replace(' ', "-"))
        });
        let slug = callbacks
            .call("slug", &serde_json::json!({"title": "The Matrix"}))
            .unwrap();
        assert_eq!(slug, serde_json::json!("the-matrix"));
        assert_eq!(
            callbacks.call("missing", &serde_json::json!({})),
            Err(GraphQLError::translation("Callback \"missing\" is not registered"))
        );
    }

    #[test]
    fn entity_models_are_shared_for_identical_input() {
        let type_defs = "type Movie { title: String }";
        let first = load_entity_model(type_defs, &Config::default()).unwrap();
        let second = load_entity_model(type_defs, &Config::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
