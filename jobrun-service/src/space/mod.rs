// Task Parameter Space
// Task parameter sets, selection modes and cross-product expansion

pub mod builder;
pub mod range;
pub mod selection;

pub use builder::TaskSpaceBuilder;
pub use range::IntRangeExpr;
pub use selection::{SelectionFlags, TaskSelection};

use crate::model::ParameterValue;

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

/// One concrete value per declared task parameter, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TaskParameterSet(IndexMap<String, ParameterValue>);

impl TaskParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParameterValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, ParameterValue> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a TaskParameterSet {
    type Item = (&'a String, &'a ParameterValue);
    type IntoIter = indexmap::map::Iter<'a, String, ParameterValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for TaskParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .0
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        f.write_str(&pairs.join(", "))
    }
}
