//! Skill registry seam.
//!
//! The dispatch core consumes skills through the [`SkillRegistry`] trait and
//! never depends on how they are registered or validated. A registry entry is
//! either a single callable or an explicit ordered list of overloads; when
//! overloads exist, resolution always picks the first entry in registration
//! order.
//!
//! [`InMemoryRegistry`] is a minimal implementation used by the reference
//! binary and the test suite.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// JSON object carrying keyword-style arguments for a skill invocation.
pub type Arguments = Map<String, Value>;

/// A callable skill. Arguments are bound by name from a JSON object.
pub type SkillFn = Arc<dyn Fn(&Arguments) -> Result<Value, SkillError> + Send + Sync>;

/// Errors raised by skill invocations.
#[derive(Error, Debug)]
pub enum SkillError {
    /// A required argument was not supplied.
    #[error("missing required argument '{name}'")]
    MissingArgument {
        /// The argument name.
        name: String,
    },

    /// An argument had the wrong type.
    #[error("argument '{name}' is not a valid {expected}")]
    InvalidArgument {
        /// The argument name.
        name: String,
        /// Description of the expected type.
        expected: String,
    },

    /// The skill itself failed.
    #[error("{0}")]
    Failed(String),
}

/// Declared metadata for one skill parameter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Semantic type token, e.g. `"str"`, `"int"`, `"List[str]"`,
    /// `"Optional[int]"`.
    #[serde(rename = "type", default)]
    pub type_name: String,

    /// Human-readable parameter description.
    #[serde(default)]
    pub description: String,
}

/// Metadata describing one registered skill.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillMetadata {
    /// Human-readable skill description.
    #[serde(default)]
    pub description: String,

    /// Parameters in declaration order.
    #[serde(default)]
    pub parameters: IndexMap<String, ParamSpec>,

    /// Names of required parameters.
    #[serde(default)]
    pub required: Vec<String>,

    /// Free-form tags; `read_only`, `idempotent` and `destructive` map to
    /// tool annotation hints.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SkillMetadata {
    /// Creates metadata with just a description.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    /// Adds a parameter declaration.
    #[must_use]
    pub fn with_param(
        mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.parameters.insert(
            name.into(),
            ParamSpec {
                type_name: type_name.into(),
                description: description.into(),
            },
        );
        self
    }

    /// Marks parameters as required.
    #[must_use]
    pub fn with_required(mut self, names: &[&str]) -> Self {
        self.required = names.iter().map(ToString::to_string).collect();
        self
    }

    /// Adds tags.
    #[must_use]
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(ToString::to_string).collect();
        self
    }
}

/// A registry entry: one callable, or an explicit ordered overload list.
#[derive(Clone)]
pub enum SkillEntry {
    /// A single callable.
    Single(SkillFn),
    /// Intentionally duplicated names, resolved first-match.
    Overloaded(Vec<SkillFn>),
}

impl SkillEntry {
    /// Resolves the entry to a concrete callable.
    ///
    /// For overloaded entries this is the first callable in registration
    /// order. Returns `None` for an empty overload list.
    #[must_use]
    pub fn resolve(&self) -> Option<&SkillFn> {
        match self {
            Self::Single(f) => Some(f),
            Self::Overloaded(fns) => fns.first(),
        }
    }
}

impl fmt::Debug for SkillEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(_) => write!(f, "SkillEntry::Single"),
            Self::Overloaded(fns) => write!(f, "SkillEntry::Overloaded({})", fns.len()),
        }
    }
}

/// The collaborator surface the dispatch core depends on.
pub trait SkillRegistry: Send + Sync {
    /// Names of all registered skills, in registration order.
    fn skill_names(&self) -> Vec<String>;

    /// Metadata for one skill, if present.
    fn metadata(&self, name: &str) -> Option<SkillMetadata>;

    /// The callable entry for one skill, if present.
    fn entry(&self, name: &str) -> Option<SkillEntry>;
}

/// A simple in-process registry.
#[derive(Default)]
pub struct InMemoryRegistry {
    skills: IndexMap<String, (SkillMetadata, SkillEntry)>,
}

impl InMemoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a skill. A duplicate name converts the entry into an
    /// explicit overload list, preserving registration order; the metadata of
    /// the first registration wins.
    pub fn register<F>(&mut self, name: impl Into<String>, metadata: SkillMetadata, callable: F)
    where
        F: Fn(&Arguments) -> Result<Value, SkillError> + Send + Sync + 'static,
    {
        let name = name.into();
        let callable: SkillFn = Arc::new(callable);

        if let Some((_, entry)) = self.skills.get_mut(&name) {
            match entry {
                SkillEntry::Single(existing) => {
                    let first = Arc::clone(existing);
                    *entry = SkillEntry::Overloaded(vec![first, callable]);
                }
                SkillEntry::Overloaded(fns) => fns.push(callable),
            }
        } else {
            self.skills
                .insert(name, (metadata, SkillEntry::Single(callable)));
        }
    }

    /// Number of registered skill names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

impl SkillRegistry for InMemoryRegistry {
    fn skill_names(&self) -> Vec<String> {
        self.skills.keys().cloned().collect()
    }

    fn metadata(&self, name: &str) -> Option<SkillMetadata> {
        self.skills.get(name).map(|(meta, _)| meta.clone())
    }

    fn entry(&self, name: &str) -> Option<SkillEntry> {
        self.skills.get(name).map(|(_, entry)| entry.clone())
    }
}

/// Fetches a required argument, raising [`SkillError::MissingArgument`].
///
/// Convenience for hand-written skills; keeps the keyword-binding failure
/// shape consistent.
///
/// # Errors
///
/// Returns an error if the argument is absent.
pub fn require_arg<'a>(args: &'a Arguments, name: &str) -> Result<&'a Value, SkillError> {
    args.get(name).ok_or_else(|| SkillError::MissingArgument {
        name: name.to_string(),
    })
}

/// Fetches a required integer argument.
///
/// # Errors
///
/// Returns an error if the argument is absent or not an integer.
pub fn require_i64(args: &Arguments, name: &str) -> Result<i64, SkillError> {
    require_arg(args, name)?
        .as_i64()
        .ok_or_else(|| SkillError::InvalidArgument {
            name: name.to_string(),
            expected: "integer".to_string(),
        })
}

/// Fetches a required string argument.
///
/// # Errors
///
/// Returns an error if the argument is absent or not a string.
pub fn require_str<'a>(args: &'a Arguments, name: &str) -> Result<&'a str, SkillError> {
    require_arg(args, name)?
        .as_str()
        .ok_or_else(|| SkillError::InvalidArgument {
            name: name.to_string(),
            expected: "string".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn args(value: Value) -> Arguments {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn register_and_resolve() {
        let mut registry = InMemoryRegistry::new();
        registry.register(
            "echo",
            SkillMetadata::new("Echoes input").with_param("text", "str", "Text to echo"),
            |args| Ok(Value::String(require_str(args, "text")?.to_string())),
        );

        assert_eq!(registry.skill_names(), vec!["echo".to_string()]);
        let entry = registry.entry("echo").unwrap();
        let f = entry.resolve().unwrap();
        let result = f(&args(json!({"text": "hi"}))).unwrap();
        assert_eq!(result, json!("hi"));
    }

    #[test]
    fn missing_argument_raises() {
        let mut registry = InMemoryRegistry::new();
        registry.register("echo", SkillMetadata::default(), |args| {
            Ok(Value::String(require_str(args, "text")?.to_string()))
        });

        let entry = registry.entry("echo").unwrap();
        let f = entry.resolve().unwrap();
        let err = f(&args(json!({}))).unwrap_err();
        assert!(matches!(err, SkillError::MissingArgument { .. }));
    }

    #[test]
    fn duplicate_name_becomes_overload_resolved_first_match() {
        let mut registry = InMemoryRegistry::new();
        registry.register("dup", SkillMetadata::default(), |_| Ok(json!("first")));
        registry.register("dup", SkillMetadata::default(), |_| Ok(json!("second")));

        assert_eq!(registry.len(), 1);
        let entry = registry.entry("dup").unwrap();
        assert!(matches!(entry, SkillEntry::Overloaded(ref fns) if fns.len() == 2));
        let f = entry.resolve().unwrap();
        assert_eq!(f(&Arguments::new()).unwrap(), json!("first"));
    }

    #[test]
    fn unknown_skill_is_none() {
        let registry = InMemoryRegistry::new();
        assert!(registry.metadata("nope").is_none());
        assert!(registry.entry("nope").is_none());
    }
}
