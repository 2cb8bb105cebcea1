//! Row filters — a process-name predicate and a machine-name predicate.
//!
//! Outside regex mode the user's text is escaped, so `a.b` only matches the
//! literal substring. Matching is a search anywhere in the string; an empty
//! pattern matches everything.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Raw filter text as entered by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterInput {
    #[serde(default)]
    pub name_filter_text: String,
    #[serde(default)]
    pub machine_filter_text: String,
    #[serde(default, deserialize_with = "bool_or_int")]
    pub is_regex: bool,
}

/// Which of the two filter fields a pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Name,
    Machine,
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::Machine => write!(f, "machine"),
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid {field} filter: {source}")]
pub struct CompileError {
    pub field: FilterField,
    pub source: regex::Error,
}

/// A compiled pair of predicates. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct FilterSpec {
    name_pattern: Regex,
    machine_pattern: Regex,
    input: FilterInput,
}

impl FilterSpec {
    pub fn compile(
        name_text: &str,
        machine_text: &str,
        regex_mode: bool,
    ) -> Result<Self, CompileError> {
        let name_pattern = compile_one(name_text, regex_mode, FilterField::Name)?;
        let machine_pattern = compile_one(machine_text, regex_mode, FilterField::Machine)?;
        Ok(Self {
            name_pattern,
            machine_pattern,
            input: FilterInput {
                name_filter_text: name_text.to_string(),
                machine_filter_text: machine_text.to_string(),
                is_regex: regex_mode,
            },
        })
    }

    pub fn from_input(input: &FilterInput) -> Result<Self, CompileError> {
        Self::compile(
            &input.name_filter_text,
            &input.machine_filter_text,
            input.is_regex,
        )
    }

    /// A row is visible only if both its node name and machine match.
    pub fn matches(&self, node_name: &str, machine: &str) -> bool {
        self.name_pattern.is_match(node_name) && self.machine_pattern.is_match(machine)
    }

    /// The text this spec was compiled from.
    pub fn input(&self) -> &FilterInput {
        &self.input
    }
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self::compile("", "", false).expect("empty filter patterns always compile")
    }
}

fn compile_one(text: &str, regex_mode: bool, field: FilterField) -> Result<Regex, CompileError> {
    let pattern = if regex_mode {
        text.to_string()
    } else {
        regex::escape(text)
    };
    Regex::new(&pattern).map_err(|source| CompileError { field, source })
}

/// Persisted settings may store the regex toggle as a checkbox state integer.
fn bool_or_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        State(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Flag(b) => b,
        Raw::State(n) => n != 0,
    })
}
