//! Declared pipeline variables
//!
//! Variables keep declaration order. A run works on its own copy, which
//! handlers can extend through exported values.

use crate::pipeline::params::scalar_text;
use serde::{Deserialize, Deserializer, Serialize};

/// A named string value shared by the steps of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Variable name, referenced as `${name}`
    pub name: String,

    /// Current value
    #[serde(default, deserialize_with = "plain_string")]
    pub value: String,
}

impl Variable {
    /// Creates a new variable
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered set of variables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableSet {
    vars: Vec<Variable>,
}

impl VariableSet {
    /// Creates an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the current value of a variable
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value.as_str())
    }

    /// Updates a variable in place, or appends it when it is new
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.vars.iter_mut().find(|v| v.name == name) {
            Some(existing) => existing.value = value,
            None => self.vars.push(Variable { name, value }),
        }
    }

    /// Builder form of [`VariableSet::set`]
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Returns true if a variable with this name exists
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of variables
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns true when no variables are declared
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterates in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter()
    }

    /// Finds the first name declared more than once
    #[must_use]
    pub fn first_duplicate(&self) -> Option<&str> {
        self.vars.iter().enumerate().find_map(|(i, v)| {
            self.vars[..i]
                .iter()
                .any(|earlier| earlier.name == v.name)
                .then_some(v.name.as_str())
        })
    }
}

impl FromIterator<Variable> for VariableSet {
    fn from_iter<T: IntoIterator<Item = Variable>>(iter: T) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

/// Accepts any YAML scalar (`8080`, `true`) as a string
fn plain_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_yaml::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(String::new());
    }
    scalar_text(&value).ok_or_else(|| serde::de::Error::custom("variable value must be a plain value"))
}
