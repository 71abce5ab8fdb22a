//! Configuration specification types for the deployment system.
//!
//! This module defines the structs that map to the `stackctl.yaml` file.
//! They describe the raw, unresolved desired state: parameter values may
//! still reference other stacks and tags are not yet layered.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// The root configuration structure for a stackctl project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Project name.
    pub project: String,
    /// Default region for contexts that do not declare one.
    #[serde(default)]
    pub region: Option<String>,
    /// Tags applied to every stack in every context.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Deployment contexts (environments) by name.
    #[serde(default)]
    pub contexts: BTreeMap<String, ContextConfig>,
    /// Stacks by name.
    #[serde(default)]
    pub stacks: BTreeMap<String, StackConfig>,
}

/// A named deployment environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextConfig {
    /// Target account identifier.
    #[serde(default)]
    pub account: Option<String>,
    /// Target region (inherits the project region when absent).
    #[serde(default)]
    pub region: Option<String>,
    /// Context-level tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Raw settings for a single stack.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackConfig {
    /// Template location (a path relative to the config file, or a `file://` URI).
    #[serde(default)]
    pub template: String,
    /// Template parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterValue>,
    /// Stack-level tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Capabilities to acknowledge (e.g. `CAPABILITY_IAM`).
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Stacks that must be deployed before this one.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Per-context overrides.
    #[serde(default)]
    pub contexts: BTreeMap<String, StackOverride>,
}

/// Per-context override block of a stack.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackOverride {
    /// Replacement template location.
    #[serde(default)]
    pub template: Option<String>,
    /// Parameters merged over the base parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterValue>,
    /// Tags merged over the base tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Replacement capabilities.
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
    /// Replacement dependency list.
    #[serde(default)]
    pub depends_on: Option<Vec<String>>,
}

/// A declarative parameter value.
///
/// Parsed from a bare scalar (literal), a mapping with a `type` key
/// (resolver) or a sequence of either (list).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterValue {
    /// A literal value.
    Literal(String),
    /// A value fetched at resolution time.
    Resolver(ResolverSpec),
    /// An ordered list, joined with commas once resolved.
    List(Vec<ListItem>),
}

/// An element of a list parameter. Lists cannot nest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListItem {
    /// A literal value.
    Literal(String),
    /// A value fetched at resolution time.
    Resolver(ResolverSpec),
}

/// A resolver declaration: its kind and its configuration fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverSpec {
    /// Resolver kind, e.g. `stack-output`.
    pub kind: String,
    /// Remaining fields of the mapping.
    pub config: BTreeMap<String, String>,
}

/// Resolver kind that reads an output of another stack.
pub const RESOLVER_STACK_OUTPUT: &str = "stack-output";

/// Resolver kind that yields its `value` field.
pub const RESOLVER_LITERAL: &str = "literal";

impl ResolverSpec {
    /// Creates a resolver spec from a kind and field pairs.
    #[must_use]
    pub fn new<'a>(kind: &str, fields: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            kind: kind.to_string(),
            config: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Creates a `stack-output` resolver.
    #[must_use]
    pub fn stack_output(stack_name: &str, output_key: &str) -> Self {
        Self::new(
            RESOLVER_STACK_OUTPUT,
            [("stack_name", stack_name), ("output_key", output_key)],
        )
    }

    /// Returns a configuration field, treating empty strings as absent.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.config
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn from_mapping(mapping: &serde_yaml::Mapping) -> Result<Self, String> {
        let mut kind = None;
        let mut config = BTreeMap::new();

        for (key, value) in mapping {
            let key = scalar_to_string(key)
                .ok_or_else(|| String::from("resolver keys must be scalars"))?;
            if key == "type" {
                kind = scalar_to_string(value);
                continue;
            }
            let value = match value {
                Value::Null => String::new(),
                other => scalar_to_string(other)
                    .ok_or_else(|| format!("resolver field '{key}' must be a scalar"))?,
            };
            config.insert(key, value);
        }

        let kind = kind
            .filter(|k| !k.is_empty())
            .ok_or_else(|| String::from("resolver mapping requires a 'type' field"))?;

        Ok(Self { kind, config })
    }

    fn to_mapping(&self) -> serde_yaml::Mapping {
        let mut mapping = serde_yaml::Mapping::new();
        mapping.insert(Value::from("type"), Value::from(self.kind.clone()));
        for (key, value) in &self.config {
            mapping.insert(Value::from(key.clone()), Value::from(value.clone()));
        }
        mapping
    }
}

/// Converts a YAML scalar to its string form.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl TryFrom<Value> for ParameterValue {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(Self::Literal(String::new())),
            Value::Mapping(mapping) => ResolverSpec::from_mapping(&mapping).map(Self::Resolver),
            Value::Sequence(items) => items
                .into_iter()
                .map(ListItem::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            Value::Tagged(_) => Err(String::from("tagged YAML values are not supported")),
            scalar => scalar_to_string(&scalar)
                .map(Self::Literal)
                .ok_or_else(|| String::from("unsupported parameter value")),
        }
    }
}

impl TryFrom<Value> for ListItem {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match ParameterValue::try_from(value)? {
            ParameterValue::Literal(s) => Ok(Self::Literal(s)),
            ParameterValue::Resolver(spec) => Ok(Self::Resolver(spec)),
            ParameterValue::List(_) => Err(String::from("nested lists are not supported")),
        }
    }
}

impl From<ListItem> for Value {
    fn from(item: ListItem) -> Self {
        match item {
            ListItem::Literal(s) => Self::String(s),
            ListItem::Resolver(spec) => Self::Mapping(spec.to_mapping()),
        }
    }
}

impl From<ParameterValue> for Value {
    fn from(param: ParameterValue) -> Self {
        match param {
            ParameterValue::Literal(s) => Self::String(s),
            ParameterValue::Resolver(spec) => Self::Mapping(spec.to_mapping()),
            ParameterValue::List(items) => Self::Sequence(items.into_iter().map(Self::from).collect()),
        }
    }
}

impl<'de> Deserialize<'de> for ParameterValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::try_from(value).map_err(serde::de::Error::custom)
    }
}

impl Serialize for ParameterValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        Value::from(self.clone()).serialize(serializer)
    }
}

impl ParameterValue {
    /// Creates a literal value.
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }
}

impl ProjectConfig {
    /// Returns context names in sorted order.
    #[must_use]
    pub fn context_names(&self) -> Vec<&str> {
        self.contexts.keys().map(String::as_str).collect()
    }

    /// Returns stack names in sorted order.
    #[must_use]
    pub fn stack_names(&self) -> Vec<&str> {
        self.stacks.keys().map(String::as_str).collect()
    }

    /// Returns the region a context deploys to, inheriting the project region.
    #[must_use]
    pub fn region_for<'a>(&'a self, context: &'a ContextConfig) -> Option<&'a str> {
        context
            .region
            .as_deref()
            .or(self.region.as_deref())
            .filter(|r| !r.is_empty())
    }
}

impl StackConfig {
    /// Returns a copy with the override for `context` applied.
    ///
    /// Scalar and list fields of the override replace the base when present;
    /// parameters and tags merge key-wise with the override winning.
    #[must_use]
    pub fn with_override(&self, context: &str) -> Self {
        let mut merged = self.clone();
        merged.contexts = BTreeMap::new();

        let Some(over) = self.contexts.get(context) else {
            return merged;
        };

        if let Some(template) = over.template.as_ref().filter(|t| !t.is_empty()) {
            merged.template.clone_from(template);
        }
        if let Some(capabilities) = &over.capabilities {
            merged.capabilities.clone_from(capabilities);
        }
        if let Some(depends_on) = &over.depends_on {
            merged.depends_on.clone_from(depends_on);
        }
        for (key, value) in &over.parameters {
            merged.parameters.insert(key.clone(), value.clone());
        }
        for (key, value) in &over.tags {
            merged.tags.insert(key.clone(), value.clone());
        }

        merged
    }
}
