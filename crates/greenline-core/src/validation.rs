//! Nested validation errors keyed by configuration path segment.

use std::collections::BTreeMap;
use std::fmt;

/// Message used for every missing required field.
pub const REQUIRED: &str = "required";

/// A tree of validation failures.
///
/// Each node is keyed by one configuration path segment (e.g. `resources`,
/// `cloudProvider`) and holds the errors for its direct fields plus any
/// nested children. Empty children are never attached, so an error tree is
/// "present" exactly when some node in it carries a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    key: String,
    errors: BTreeMap<String, Vec<String>>,
    children: Vec<ValidationErrors>,
}

impl ValidationErrors {
    /// Create an empty error node for the given path segment.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            errors: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether this node or any descendant carries an error.
    pub fn is_present(&self) -> bool {
        !self.errors.is_empty() || self.children.iter().any(|c| c.is_present())
    }

    /// Record an error against a field of this node.
    pub fn put(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }

    /// Record a missing required field.
    pub fn require(self, field: impl Into<String>) -> Self {
        self.put(field, REQUIRED)
    }

    /// Attach a child node; ignored when the child carries no errors.
    pub fn put_child(mut self, child: ValidationErrors) -> Self {
        if child.is_present() {
            self.children.push(child);
        }
        self
    }

    /// Fold the errors and children of `other` into this node, ignoring its key.
    pub fn merge(mut self, other: ValidationErrors) -> Self {
        for (field, messages) in other.errors {
            self.errors.entry(field).or_default().extend(messages);
        }
        for child in other.children {
            self = self.put_child(child);
        }
        self
    }

    /// Errors recorded directly against `field` on this node.
    pub fn errors_for(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Find a direct child by key.
    pub fn child(&self, key: &str) -> Option<&ValidationErrors> {
        self.children.iter().find(|c| c.key == key)
    }

    /// Follow a path of child keys from this node.
    pub fn find(&self, path: &[&str]) -> Option<&ValidationErrors> {
        path.iter().try_fold(self, |node, key| node.child(key))
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, indent: &str) -> fmt::Result {
        if !self.is_present() {
            return Ok(());
        }
        let mut indent = indent.to_string();
        if !self.key.is_empty() {
            writeln!(f, "{}{}:", indent, self.key)?;
            indent.push_str("  ");
        }
        for (field, messages) in &self.errors {
            writeln!(f, "{}{}: {}", indent, field, messages.join(", "))?;
        }
        for child in &self.children {
            child.write_tree(f, &indent)?;
        }
        Ok(())
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Validation errors")?;
        self.write_tree(f, "")
    }
}

impl std::error::Error for ValidationErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_children_are_dropped() {
        let errors = ValidationErrors::new("").put_child(ValidationErrors::new("resources"));
        assert!(!errors.is_present());
        assert!(errors.child("resources").is_none());
    }

    #[test]
    fn test_nested_lookup() {
        let errors = ValidationErrors::new("").put_child(
            ValidationErrors::new("resources").put_child(
                ValidationErrors::new("cloudProvider").require("type"),
            ),
        );

        let node = errors.find(&["resources", "cloudProvider"]).unwrap();
        assert_eq!(node.errors_for("type"), ["required"]);
        assert!(errors.is_present());
    }

    #[test]
    fn test_render_tree() {
        let errors = ValidationErrors::new("")
            .require("name")
            .put_child(
                ValidationErrors::new("applications").put_child(
                    ValidationErrors::new("db")
                        .put("secrets.password", "unknown secret provider 'vault'"),
                ),
            );

        let rendered = errors.to_string();
        assert_eq!(
            rendered,
            "--- Validation errors\n\
             name: required\n\
             applications:\n  \
             db:\n    \
             secrets.password: unknown secret provider 'vault'\n"
        );
    }

    #[test]
    fn test_merge_same_unit() {
        let fields = ValidationErrors::new("db").require("namespace");
        let secrets = ValidationErrors::new("db")
            .put_child(ValidationErrors::new("secrets").put("password", "unknown"));

        let merged = fields.merge(secrets);
        assert_eq!(merged.key(), "db");
        assert_eq!(merged.errors_for("namespace"), ["required"]);
        assert!(merged.child("secrets").is_some());
    }

    #[test]
    fn test_multiple_messages_joined() {
        let errors = ValidationErrors::new("unit")
            .put("path", "required")
            .put("path", "must be relative");
        assert_eq!(errors.errors_for("path").len(), 2);
        assert!(errors.to_string().contains("path: required, must be relative"));
    }
}
