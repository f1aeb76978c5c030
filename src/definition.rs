//! Named predicate and filter definitions.
//!
//! # Responsibilities
//! - Model `{ name, args }` definitions shared by predicates and filters
//! - Parse the `Name=arg1,arg2` shortcut form
//! - Bind arguments against a factory's declared fields
//! - Look factories up by name in an explicit registry
//!
//! # Design Decisions
//! - A registry maps a name to a constructor plus its field schema; nothing is
//!   discovered at runtime
//! - Definitions are bound and validated when routes are built, never per request
//! - Shortcut values bind to fields positionally, or all into the first field
//!   for list-valued factories

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Argument value in the table form: a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    One(String),
    Many(Vec<String>),
}

impl ArgValue {
    /// Values as a list; a single string is split on commas.
    pub fn to_list(&self) -> Vec<String> {
        match self {
            ArgValue::One(value) => split_values(value),
            ArgValue::Many(values) => values.iter().map(|v| v.trim().to_string()).collect(),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::One(value.to_string())
    }
}

/// Arguments of a definition before they are bound to a factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Args {
    Positional(Vec<String>),
    Named(BTreeMap<String, ArgValue>),
}

/// A named predicate or filter definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DefinitionRepr", into = "DefinitionRepr")]
pub struct Definition {
    pub name: String,
    pub args: Args,
}

impl Definition {
    /// Definition with named arguments.
    pub fn named<I, K, V>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ArgValue>,
    {
        Self {
            name: name.into(),
            args: Args::Named(args.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }
}

impl FromStr for Definition {
    type Err = ConfigurationError;

    /// Parses `Name=value1,value2`. A bare `Name` has no arguments.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (name, rest) = match text.split_once('=') {
            Some((name, rest)) => (name.trim(), Some(rest)),
            None => (text.trim(), None),
        };
        if name.is_empty() {
            return Err(ConfigurationError::InvalidShortcut(text.to_string()));
        }
        let values = rest.map(split_values).unwrap_or_default();
        Ok(Self {
            name: name.to_string(),
            args: Args::Positional(values),
        })
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.args {
            Args::Positional(values) if values.is_empty() => write!(f, "{}", self.name),
            Args::Positional(values) => write!(f, "{}={}", self.name, values.join(",")),
            Args::Named(args) => write!(f, "{} {:?}", self.name, args),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum DefinitionRepr {
    Shortcut(String),
    Table {
        name: String,
        #[serde(default)]
        args: BTreeMap<String, ArgValue>,
    },
}

impl TryFrom<DefinitionRepr> for Definition {
    type Error = ConfigurationError;

    fn try_from(repr: DefinitionRepr) -> Result<Self, Self::Error> {
        match repr {
            DefinitionRepr::Shortcut(text) => text.parse(),
            DefinitionRepr::Table { name, args } => Ok(Definition {
                name,
                args: Args::Named(args),
            }),
        }
    }
}

impl From<Definition> for DefinitionRepr {
    fn from(definition: Definition) -> Self {
        match definition.args {
            Args::Positional(values) if values.is_empty() => DefinitionRepr::Shortcut(definition.name),
            Args::Positional(values) => {
                DefinitionRepr::Shortcut(format!("{}={}", definition.name, values.join(",")))
            }
            Args::Named(args) => DefinitionRepr::Table {
                name: definition.name,
                args,
            },
        }
    }
}

fn split_values(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// How positional shortcut values bind to fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutType {
    /// One value per declared field, in order.
    Default,
    /// Every value goes into the first field as a list.
    GatherList,
}

/// A field a factory accepts.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub required: bool,
}

impl Field {
    pub const fn required(name: &'static str) -> Self {
        Self { name, required: true }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self { name, required: false }
    }
}

/// Schema of a factory: its name, fields, and shortcut binding.
#[derive(Debug, Clone, Copy)]
pub struct FactorySpec {
    pub name: &'static str,
    pub fields: &'static [Field],
    pub shortcut: ShortcutType,
}

/// Arguments bound to a factory's fields.
#[derive(Debug, Clone)]
pub struct BoundArgs {
    factory: &'static str,
    values: BTreeMap<String, ArgValue>,
}

impl BoundArgs {
    /// Binds a definition's arguments against `spec`.
    pub fn bind(spec: &FactorySpec, args: &Args) -> Result<Self, ConfigurationError> {
        let mut values = BTreeMap::new();
        match args {
            Args::Positional(positional) => match spec.shortcut {
                ShortcutType::GatherList => {
                    if let Some(field) = spec.fields.first() {
                        if !positional.is_empty() {
                            values.insert(field.name.to_string(), ArgValue::Many(positional.clone()));
                        }
                    } else if !positional.is_empty() {
                        return Err(too_many_values(spec, positional));
                    }
                }
                ShortcutType::Default => {
                    if positional.len() > spec.fields.len() {
                        return Err(too_many_values(spec, positional));
                    }
                    for (field, value) in spec.fields.iter().zip(positional) {
                        values.insert(field.name.to_string(), ArgValue::One(value.clone()));
                    }
                }
            },
            Args::Named(named) => {
                for (key, value) in named {
                    if !spec.fields.iter().any(|f| f.name == key) {
                        return Err(ConfigurationError::InvalidArgument {
                            factory: spec.name.to_string(),
                            argument: key.clone(),
                            reason: "unknown argument".to_string(),
                        });
                    }
                    values.insert(key.clone(), value.clone());
                }
            }
        }

        for field in spec.fields.iter().filter(|f| f.required) {
            if !values.contains_key(field.name) {
                return Err(ConfigurationError::MissingArgument {
                    factory: spec.name.to_string(),
                    argument: field.name.to_string(),
                });
            }
        }

        Ok(Self {
            factory: spec.name,
            values,
        })
    }

    pub fn factory(&self) -> &'static str {
        self.factory
    }

    /// Single string value of a field, if present.
    pub fn optional_str(&self, name: &str) -> Option<String> {
        self.values.get(name).map(|value| match value {
            ArgValue::One(v) => v.trim().to_string(),
            ArgValue::Many(vs) => vs.join(","),
        })
    }

    pub fn required_str(&self, name: &str) -> Result<String, ConfigurationError> {
        self.optional_str(name)
            .ok_or_else(|| ConfigurationError::MissingArgument {
                factory: self.factory.to_string(),
                argument: name.to_string(),
            })
    }

    /// List value of a field; must contain at least one entry.
    pub fn required_list(&self, name: &str) -> Result<Vec<String>, ConfigurationError> {
        let list = self.values.get(name).map(ArgValue::to_list).unwrap_or_default();
        if list.is_empty() {
            return Err(ConfigurationError::MissingArgument {
                factory: self.factory.to_string(),
                argument: name.to_string(),
            });
        }
        Ok(list)
    }

    /// Parses an optional field, falling back to `default` when absent.
    pub fn parse_or<T>(&self, name: &str, default: T) -> Result<T, ConfigurationError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.optional_str(name) {
            Some(raw) => raw.parse().map_err(|e: T::Err| self.invalid(name, e.to_string())),
            None => Ok(default),
        }
    }

    /// Parses a required field.
    pub fn parse<T>(&self, name: &str) -> Result<T, ConfigurationError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let raw = self.required_str(name)?;
        raw.parse().map_err(|e: T::Err| self.invalid(name, e.to_string()))
    }

    /// Error for a field whose value cannot be used.
    pub fn invalid(&self, name: &str, reason: impl Into<String>) -> ConfigurationError {
        ConfigurationError::InvalidArgument {
            factory: self.factory.to_string(),
            argument: name.to_string(),
            reason: reason.into(),
        }
    }
}

fn too_many_values(spec: &FactorySpec, values: &[String]) -> ConfigurationError {
    ConfigurationError::InvalidShortcut(format!(
        "{} accepts {} value(s), got {}",
        spec.name,
        spec.fields.len(),
        values.len()
    ))
}

/// Which kind of factory a registry builds; selects the unknown-name error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryKind {
    Predicate,
    Filter,
}

/// Constructor registered for a factory name.
pub type Builder<T> = fn(&BoundArgs) -> Result<T, ConfigurationError>;

/// Name → (schema, constructor) registry. Names match case-insensitively.
pub struct Registry<T> {
    kind: FactoryKind,
    factories: HashMap<String, (FactorySpec, Builder<T>)>,
}

impl<T> Registry<T> {
    pub fn new(kind: FactoryKind) -> Self {
        Self {
            kind,
            factories: HashMap::new(),
        }
    }

    /// Registers a factory, replacing any previous one with the same name.
    pub fn register(&mut self, spec: FactorySpec, build: Builder<T>) -> &mut Self {
        self.factories
            .insert(spec.name.to_ascii_lowercase(), (spec, build));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_ascii_lowercase())
    }

    pub fn spec(&self, name: &str) -> Option<&FactorySpec> {
        self.factories.get(&name.to_ascii_lowercase()).map(|(spec, _)| spec)
    }

    /// Validates a definition against its factory and constructs it.
    pub fn build(&self, definition: &Definition) -> Result<T, ConfigurationError> {
        let (spec, build) = self
            .factories
            .get(&definition.name.to_ascii_lowercase())
            .ok_or_else(|| match self.kind {
                FactoryKind::Predicate => ConfigurationError::UnknownPredicate(definition.name.clone()),
                FactoryKind::Filter => ConfigurationError::UnknownFilter(definition.name.clone()),
            })?;
        let args = BoundArgs::bind(spec, &definition.args)?;
        build(&args)
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.values().map(|(spec, _)| spec.name).collect();
        names.sort_unstable();
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("factories", &names)
            .finish()
    }
}
