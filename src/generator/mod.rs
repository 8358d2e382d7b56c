pub mod plan;
pub mod template;

use convert_case::{Case, Casing};
use std::collections::HashMap;

use crate::models::Stack;

/// Naming state shared by the renderers
pub struct GeneratorContext {
    /// Prefix prepended to every logical ID
    prefix: String,
    /// Declared resource name -> logical ID
    logical_ids: HashMap<String, String>,
}

impl GeneratorContext {
    pub fn new(prefix: impl Into<String>) -> Self {
        GeneratorContext {
            prefix: prefix.into(),
            logical_ids: HashMap::new(),
        }
    }

    /// Register every resource of a stack
    pub fn register_stack(&mut self, stack: &Stack) {
        for resource in stack.resources() {
            self.register(&resource.name);
        }
    }

    pub fn register(&mut self, name: &str) {
        let id = self.format_logical_id(name);
        self.logical_ids.insert(name.to_string(), id);
    }

    /// `efs-mount-target-2` -> `<prefix>EfsMountTarget2`
    pub fn format_logical_id(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name.to_case(Case::Pascal))
    }

    /// Logical ID of a registered resource, or the formatted name otherwise
    pub fn logical_id(&self, name: &str) -> String {
        self.logical_ids
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.format_logical_id(name))
    }

    /// Logical IDs claimed by more than one resource name, sorted
    pub fn collisions(&self) -> Vec<(String, Vec<String>)> {
        let mut by_id: HashMap<&str, Vec<String>> = HashMap::new();
        for (name, id) in &self.logical_ids {
            by_id.entry(id.as_str()).or_default().push(name.clone());
        }

        let mut collisions: Vec<(String, Vec<String>)> = by_id
            .into_iter()
            .filter(|(_, names)| names.len() > 1)
            .map(|(id, mut names)| {
                names.sort();
                (id.to_string(), names)
            })
            .collect();
        collisions.sort();
        collisions
    }
}
