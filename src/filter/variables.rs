//! Scratch cache the Sender populates before running the filter chain and
//! the Postpone filter reads from when it needs to re-enqueue a delayed
//! send. Keyed `"{phone}:{template}"`, matching the original's string-
//! concatenation cache key in `filter/postpone.go`.
//!
//! REDESIGN FLAGS §10 notes this cross-cutting coupling (Sender populating
//! a cache a specific filter reads) as an accepted trade-off rather than a
//! cleaned-up design — see DESIGN.md.

use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct VariableCache {
    entries: RwLock<HashMap<String, HashMap<String, String>>>,
}

fn cache_key(phone: &str, template: &str) -> String {
    format!("{phone}:{template}")
}

impl VariableCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_variables(&self, phone: &str, template: &str, variables: HashMap<String, String>) {
        self.entries.write().unwrap().insert(cache_key(phone, template), variables);
    }

    /// Parity with the original's per-batch variant: stores the same
    /// variables under every phone in `phones` for one template.
    pub fn store_variable_array(&self, phones: &[String], template: &str, variables: HashMap<String, String>) {
        let mut entries = self.entries.write().unwrap();
        for phone in phones {
            entries.insert(cache_key(phone, template), variables.clone());
        }
    }

    pub fn lookup(&self, phone: &str, template: &str) -> Option<HashMap<String, String>> {
        self.entries.read().unwrap().get(&cache_key(phone, template)).cloned()
    }

    pub fn clear_variables(&self, phone: &str, template: &str) {
        self.entries.write().unwrap().remove(&cache_key(phone, template));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_variables_round_trip() {
        let cache = VariableCache::new();
        let vars = HashMap::from([("code".to_string(), "1234".to_string())]);
        cache.store_variables("+1000", "welcome", vars.clone());
        assert_eq!(cache.lookup("+1000", "welcome"), Some(vars));
    }

    #[test]
    fn cleared_variables_are_gone() {
        let cache = VariableCache::new();
        cache.store_variables("+1000", "welcome", HashMap::new());
        cache.clear_variables("+1000", "welcome");
        assert_eq!(cache.lookup("+1000", "welcome"), None);
    }

    #[test]
    fn array_store_fans_out_to_every_phone() {
        let cache = VariableCache::new();
        let phones = vec!["+1".to_string(), "+2".to_string()];
        let vars = HashMap::from([("k".to_string(), "v".to_string())]);
        cache.store_variable_array(&phones, "welcome", vars.clone());
        assert_eq!(cache.lookup("+1", "welcome"), Some(vars.clone()));
        assert_eq!(cache.lookup("+2", "welcome"), Some(vars));
    }
}
