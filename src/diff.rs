//! Compare a freshly rendered template against the one on disk

use serde_json::Value;
use std::fmt;

/// Per-resource changes between two templates, by logical ID
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
    pub unchanged: usize,
    /// Anything outside `Resources` changed (outputs, metadata, description)
    pub header_changed: bool,
}

impl TemplateDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.modified.is_empty()
            && !self.header_changed
    }
}

impl fmt::Display for TemplateDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "no changes ({} unchanged)", self.unchanged);
        }
        write!(
            f,
            "{} to add, {} to change, {} to remove, {} unchanged",
            self.added.len(),
            self.modified.len(),
            self.removed.len(),
            self.unchanged
        )?;
        for id in &self.added {
            write!(f, "\n  + {}", id)?;
        }
        for id in &self.modified {
            write!(f, "\n  ~ {}", id)?;
        }
        for id in &self.removed {
            write!(f, "\n  - {}", id)?;
        }
        if self.header_changed {
            write!(f, "\n  ~ (outputs or metadata)")?;
        }
        Ok(())
    }
}

/// Diff two rendered templates. `old` is `None` when nothing was deployed.
pub fn diff_templates(old: Option<&Value>, new: &Value) -> TemplateDiff {
    let empty = serde_json::Map::new();
    let new_resources = new["Resources"].as_object().unwrap_or(&empty);
    let old_resources = old
        .and_then(|o| o["Resources"].as_object())
        .unwrap_or(&empty);

    let mut diff = TemplateDiff::default();

    for (id, resource) in new_resources {
        match old_resources.get(id) {
            None => diff.added.push(id.clone()),
            Some(previous) if previous != resource => diff.modified.push(id.clone()),
            Some(_) => diff.unchanged += 1,
        }
    }
    diff.removed = old_resources
        .keys()
        .filter(|id| !new_resources.contains_key(*id))
        .cloned()
        .collect();

    diff.header_changed = match old {
        None => false,
        Some(old) => ["Description", "Metadata", "Outputs"]
            .iter()
            .any(|key| old.get(*key) != new.get(*key)),
    };

    diff.added.sort();
    diff.removed.sort();
    diff.modified.sort();
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_render_adds_everything() {
        let new = json!({ "Resources": { "Vpc": {}, "Cluster": {} } });
        let diff = diff_templates(None, &new);
        assert_eq!(diff.added, vec!["Cluster", "Vpc"]);
        assert!(!diff.is_empty());
    }

    #[test]
    fn test_identical_templates() {
        let t = json!({ "Resources": { "Vpc": { "Type": "AWS::EC2::VPC" } }, "Outputs": {} });
        let diff = diff_templates(Some(&t), &t);
        assert!(diff.is_empty());
        assert_eq!(diff.unchanged, 1);
        assert_eq!(diff.to_string(), "no changes (1 unchanged)");
    }

    #[test]
    fn test_added_removed_modified() {
        let old = json!({ "Resources": {
            "Vpc": { "Properties": { "CidrBlock": "10.0.0.0/16" } },
            "OldBucket": {},
            "Cluster": {},
        }});
        let new = json!({ "Resources": {
            "Vpc": { "Properties": { "CidrBlock": "10.1.0.0/16" } },
            "Cluster": {},
            "Alb": {},
        }});

        let diff = diff_templates(Some(&old), &new);
        assert_eq!(diff.added, vec!["Alb"]);
        assert_eq!(diff.removed, vec!["OldBucket"]);
        assert_eq!(diff.modified, vec!["Vpc"]);
        assert_eq!(diff.unchanged, 1);
        assert!(!diff.header_changed);
    }

    #[test]
    fn test_output_change_is_detected() {
        let old = json!({ "Resources": {}, "Outputs": { "Url": { "Value": "a" } } });
        let new = json!({ "Resources": {}, "Outputs": { "Url": { "Value": "b" } } });
        let diff = diff_templates(Some(&old), &new);
        assert!(diff.header_changed);
        assert!(!diff.is_empty());
    }
}
