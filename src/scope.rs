//! Identifier and parameter allocation for one translation.

use indexmap::IndexMap;
use std::collections::HashMap;

/// Root variable of every statement
pub const ROOT: &str = "this";

/// Allocates statement variables and accumulates the flat parameter map.
///
/// Variables share one counter regardless of prefix, so `this0`, `var1` and
/// `edge2` never collide across sibling, parent and child traversals.
#[derive(Debug, Default)]
pub struct Scope {
    next_variable: usize,
    params: IndexMap<String, serde_json::Value>,
    // claim path -> parameter name
    claims: HashMap<String, String>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh variable name, e.g. `this3`
    pub fn allocate(&mut self, prefix: &str) -> String {
        let name = format!("{}{}", prefix, self.next_variable);
        self.next_variable += 1;
        name
    }

    /// Binds `value` to a fresh parameter and returns a reference to it
    pub fn clause_for(&mut self, value: serde_json::Value) -> String {
        let name = format!("param{}", self.params.len());
        self.params.insert(name.clone(), value);
        format!("${}", name)
    }

    /// Binds `value` under a fixed name, reusing it if already bound
    pub fn named(&mut self, name: &str, value: serde_json::Value) -> String {
        self.params.entry(name.to_string()).or_insert(value);
        format!("${}", name)
    }

    /// Claims are bound once per path and shared by every predicate using them
    pub fn claim(&mut self, path: &str, value: serde_json::Value) -> String {
        if let Some(name) = self.claims.get(path) {
            return format!("${}", name);
        }
        let clause = self.clause_for(value);
        self.claims
            .insert(path.to_string(), clause.trim_start_matches('$').to_string());
        clause
    }

    #[cfg(test)]
    pub fn params(&self) -> &IndexMap<String, serde_json::Value> {
        &self.params
    }

    pub fn into_params(self) -> IndexMap<String, serde_json::Value> {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn variables_never_collide_across_prefixes() {
        let mut scope = Scope::new();
        assert_eq!(scope.allocate("this"), "this0");
        assert_eq!(scope.allocate("var"), "var1");
        assert_eq!(scope.allocate("this"), "this2");
    }

    #[test]
    fn parameters_are_numbered_in_binding_order() {
        let mut scope = Scope::new();
        assert_eq!(scope.clause_for(json!(1)), "$param0");
        assert_eq!(scope.clause_for(json!("a")), "$param1");
        assert_eq!(scope.params()["param1"], json!("a"));
    }

    #[test]
    fn claims_are_bound_once_per_path() {
        let mut scope = Scope::new();
        let first = scope.claim("sub", json!("user-1"));
        let second = scope.claim("sub", json!("user-1"));
        assert_eq!(first, second);
        assert_eq!(scope.params().len(), 1);
        assert_eq!(scope.named("isAuthenticated", json!(true)), "$isAuthenticated");
        assert_eq!(scope.params().len(), 2);
    }
}
