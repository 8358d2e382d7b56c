use std::collections::HashMap;
use thiserror::Error;

use super::reference::Reference;
use super::resource::{Resource, ResourceKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    #[error("resource '{0}' is declared more than once")]
    DuplicateResource(String),
}

/// A stack output: `prefix` followed by the value of `reference`
#[derive(Debug, Clone)]
pub struct Output {
    pub name: String,
    pub description: String,
    pub prefix: String,
    pub reference: Reference,
}

/// The full set of declared resources, in declaration order
#[derive(Debug, Clone, Default)]
pub struct Stack {
    pub name: String,
    pub description: String,
    resources: Vec<Resource>,
    index: HashMap<String, usize>,
    pub outputs: Vec<Output>,
}

impl Stack {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Stack {
            name: name.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    /// Declare a resource. Names must be unique within the stack.
    pub fn add(&mut self, resource: Resource) -> Result<(), StackError> {
        if self.index.contains_key(&resource.name) {
            return Err(StackError::DuplicateResource(resource.name));
        }
        self.index.insert(resource.name.clone(), self.resources.len());
        self.resources.push(resource);
        Ok(())
    }

    pub fn add_output(&mut self, output: Output) {
        self.outputs.push(output);
    }

    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.index.get(name).map(|&i| &self.resources[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Resource> {
        let index = *self.index.get(name)?;
        self.resources.get_mut(index)
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources of one kind, selected by a matcher returning the payload
    pub fn filter<'a, T: 'a>(
        &'a self,
        select: impl Fn(&'a ResourceKind) -> Option<&'a T> + 'a,
    ) -> impl Iterator<Item = (&'a str, &'a T)> + 'a {
        self.resources
            .iter()
            .filter_map(move |r| select(&r.kind).map(|payload| (r.name.as_str(), payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resource::{Cluster, FileSystem};

    #[test]
    fn test_add_rejects_duplicates() {
        let mut stack = Stack::new("test", "");
        stack
            .add(Resource::new("cluster", ResourceKind::Cluster(Cluster::default())))
            .unwrap();
        let err = stack
            .add(Resource::new("cluster", ResourceKind::Cluster(Cluster::default())))
            .unwrap_err();
        assert_eq!(err, StackError::DuplicateResource("cluster".to_string()));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_filter_by_kind() {
        let mut stack = Stack::new("test", "");
        stack
            .add(Resource::new("cluster", ResourceKind::Cluster(Cluster::default())))
            .unwrap();
        stack
            .add(Resource::new(
                "postgres-efs",
                ResourceKind::FileSystem(FileSystem { encrypted: true }),
            ))
            .unwrap();

        let file_systems: Vec<_> = stack
            .filter(|k| match k {
                ResourceKind::FileSystem(fs) => Some(fs),
                _ => None,
            })
            .collect();
        assert_eq!(file_systems.len(), 1);
        assert_eq!(file_systems[0].0, "postgres-efs");
        assert!(file_systems[0].1.encrypted);
        assert_eq!(stack.resources()[1].name, "postgres-efs");
    }
}
