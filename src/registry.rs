use std::collections::HashMap;

/// Compiled schemas of a session, keyed by the caller's name for them.
#[derive(Debug)]
pub struct SchemaRegistry<S> {
    schemas: HashMap<String, S>,
}

impl<S> SchemaRegistry<S> {
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    /// Register `schema` under `name`, returning the schema it replaces.
    pub fn insert(&mut self, name: &str, schema: S) -> Option<S> {
        self.schemas.insert(name.to_string(), schema)
    }

    pub fn remove(&mut self, name: &str) -> Option<S> {
        self.schemas.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&S> {
        self.schemas.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl<S> Default for SchemaRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
