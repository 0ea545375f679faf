//! precedence aware variable store
//!
//! Every value is stored together with its [VariableSource]. A value only replaces another one of equal or higher
//! precedence, objects are merged recursively instead of being replaced.
//!
//! ```
//! use tfprep::value::Value;
//! use tfprep::variables::{SetOutcome, VariableSource, Variables};
//!
//! let mut variables = Variables::default();
//! variables.set("region", Value::from("us-east-1"), VariableSource::VariableFile);
//! variables.set("region", Value::from("eu-west-1"), VariableSource::Default);
//! assert_eq!(variables.get_path("region"), Some(&Value::from("us-east-1")));
//!
//! // dotted keys address nested objects
//! let outcome = variables.set("tags.team", Value::from("infra"), VariableSource::CommandLineVariableExplicit);
//! assert_eq!(outcome, SetOutcome::Created);
//! assert_eq!(variables.get_path("tags.team"), Some(&Value::from("infra")));
//! ```
mod file;
mod source;

pub use file::{load_default_values, load_variables_file, parse_variables, FileFormat, LoadError};
pub use source::VariableSource;

use crate::value::{Object, Value};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Variable {
    pub source: VariableSource,
    pub value: Value,
}

/// Result of [Variables::set]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Created,
    /// null value, malformed key, lower precedence or type mismatch
    Ignored,
    /// replaced or merged
    Overwritten,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variables {
    entries: indexmap::IndexMap<String, Variable>,
}

impl Variables {
    /// Set `key` to `value` if `source` is allowed to
    ///
    /// - `None` is ignored
    /// - `a.b.c` sets `a` to `{ b = { c = value } }`
    /// - object + object: merged, the side with higher precedence wins conflicting keys. At equal precedence the
    ///   incoming object wins unless both come from [VariableSource::ConfigFile].
    /// - object + non-object: ignored with a warning
    /// - otherwise replaced when `source` is at least the existing source, except that a
    ///   [VariableSource::ConfigFile] value never replaces another one
    pub fn set(
        &mut self,
        key: &str,
        value: impl Into<Option<Value>>,
        source: VariableSource,
    ) -> SetOutcome {
        let Some(value) = value.into() else {
            tracing::debug!(key, "null value ignored");
            return SetOutcome::Ignored;
        };

        let mut segments = key.split('.');
        let root = segments.next().unwrap_or_default();
        let rest: Vec<&str> = segments.collect();
        if root.is_empty() || rest.iter().any(|segment| segment.is_empty()) {
            tracing::warn!(key, "malformed variable name ignored");
            return SetOutcome::Ignored;
        }
        let value = value.nest(rest);

        let Some(existing) = self.entries.get_mut(root) else {
            tracing::trace!(key = root, %source, "new variable");
            self.entries
                .insert(root.to_string(), Variable { source, value });
            return SetOutcome::Created;
        };

        match (existing.value.is_object(), value.is_object()) {
            (true, true) => {
                let incoming_wins = source > existing.source
                    || (source == existing.source && source != VariableSource::ConfigFile);

                let previous = std::mem::replace(&mut existing.value, Value::Object(Object::new()));
                existing.value = if incoming_wins {
                    merge(value, previous)
                } else {
                    merge(previous, value)
                };
                existing.source = existing.source.max(source);
                tracing::debug!(key = root, %source, "merged object");
                SetOutcome::Overwritten
            }
            (true, false) | (false, true) => {
                tracing::warn!(
                    key = root,
                    existing = %existing.value,
                    incoming = %value,
                    "different types, keeping existing value"
                );
                SetOutcome::Ignored
            }
            (false, false) => {
                let both_config = source == VariableSource::ConfigFile
                    && existing.source == VariableSource::ConfigFile;
                if source < existing.source || both_config {
                    tracing::trace!(
                        key = root,
                        %source,
                        existing = %existing.source,
                        "lower precedence ignored"
                    );
                    return SetOutcome::Ignored;
                }

                tracing::info!(key = root, %value, %source, "overwriting value");
                *existing = Variable { source, value };
                SetOutcome::Overwritten
            }
        }
    }

    /// [Variables::set] every entry of `values`
    pub fn import(&mut self, values: Object, source: VariableSource) {
        for (key, value) in values {
            self.set(&key, value, source);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Variable> {
        self.entries.get(key)
    }

    /// Look up a value by dotted path
    pub fn get_path(&self, key: &str) -> Option<&Value> {
        let mut segments = key.split('.');
        let root = self.entries.get(segments.next()?)?;
        root.value.get_path(segments)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.entries.iter().map(|(key, variable)| (key.as_str(), variable))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys whose current value comes from `-var` on the command line
    pub fn explicitly_provided(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, variable)| variable.source == VariableSource::CommandLineVariableExplicit)
            .map(|(key, _)| key)
            .collect()
    }

    /// Values without their sources
    pub fn to_object(&self) -> Object {
        self.entries
            .iter()
            .map(|(key, variable)| (key.clone(), variable.value.clone()))
            .collect()
    }

    /// Write all values to `path`, format by extension
    ///
    /// `.yml`/`.yaml` as yaml, `.hcl`/`.tfvars` as hcl, everything else as json.
    pub fn save(&self, path: &Path) -> Result<(), SaveError> {
        let values = self.to_object();
        let mut content = match FileFormat::from_path(path) {
            Some(FileFormat::Yaml) => serde_yaml::to_string(&values)?,
            Some(FileFormat::Hcl) => hcl::to_string(&values)?,
            _ => serde_json::to_string_pretty(&values)?,
        };
        if !content.ends_with('\n') {
            content.push('\n');
        }

        tracing::debug!(path=%path.display(), "saving variables");
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl serde::Serialize for Variables {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

/// Recursively merge two values, `winner` takes priority on conflicting keys
fn merge(winner: Value, loser: Value) -> Value {
    match (winner, loser) {
        (Value::Object(mut winner), Value::Object(loser)) => {
            for (key, losing_value) in loser {
                match winner.get_mut(&key) {
                    Some(winning_value) => {
                        let current =
                            std::mem::replace(winning_value, Value::Object(Object::new()));
                        *winning_value = merge(current, losing_value);
                    }
                    None => {
                        winner.insert(key, losing_value);
                    }
                }
            }

            Value::Object(winner)
        }
        // conflicting leaf
        (winner, _) => winner,
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SaveError {
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to serialize as json")]
    Json(#[from] serde_json::Error),
    #[error("Unable to serialize as yaml")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Unable to serialize as hcl")]
    Hcl(#[from] hcl::Error),
}
