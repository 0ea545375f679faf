//! resolved execution context
//!
//! A [ContextBuilder] collects every input and [ContextBuilder::build] applies them in a fixed order:
//!
//! | pass | input                                | source                          |
//! |------|--------------------------------------|---------------------------------|
//! | 1    | terraform `variable` defaults        | `Default`                       |
//! | 2    | values from the tool's configuration | `ConfigFile`                    |
//! | 3    | configured variable files            | `VariableFile`                  |
//! | 4    | configured `-var` arguments          | `CommandLineVariable`           |
//! | 5    | `TF_VAR_*` environment variables     | `EnvironmentVariable`           |
//! | 6    | command line `-var-file` and `-var`  | `*Explicit`                     |
//! | 7    | computed values                      | `ComputedOverride`              |
//!
//! The result is a read-only [ResolvedContext]. Modules of a stack each get their own copy through
//! [ResolvedContext::derive_for].
use crate::args::{extract, ArgsError, ArgumentPlan};
use crate::coerce::coerce;
use crate::value::{Object, Value};
use crate::variables::{
    load_default_values, load_variables_file, LoadError, VariableSource, Variables,
};
use std::path::{Path, PathBuf};

/// Environment variables with this prefix are terraform variables
pub const TF_VAR_PREFIX: &str = "TF_VAR_";

#[derive(Debug, derive_new::new)]
pub struct ContextBuilder {
    working_dir: PathBuf,
    #[new(default)]
    defaults_folder: Option<PathBuf>,
    #[new(default)]
    config_values: Vec<Object>,
    #[new(default)]
    var_files: Vec<PathBuf>,
    #[new(default)]
    config_variables: Vec<(String, String)>,
    #[new(default)]
    environment: Vec<(String, String)>,
    #[new(default)]
    args: Vec<String>,
    #[new(default)]
    overrides: Vec<(String, Value)>,
}

impl ContextBuilder {
    /// Read variable defaults from the terraform files in `folder`
    pub fn defaults_from(mut self, folder: impl Into<PathBuf>) -> Self {
        self.defaults_folder = Some(folder.into());
        self
    }

    /// Values declared by configuration, earlier calls win on conflicts
    pub fn config_values(mut self, values: Object) -> Self {
        self.config_values.push(values);
        self
    }

    /// Variable file declared by configuration, relative to the working directory
    pub fn var_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.var_files.push(path.into());
        self
    }

    /// `-var key=value` declared by configuration
    pub fn config_variable(mut self, key: impl Into<String>, raw_value: impl Into<String>) -> Self {
        self.config_variables.push((key.into(), raw_value.into()));
        self
    }

    pub fn environment<I, K, V>(mut self, environment: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.environment
            .extend(environment.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Command line of the wrapped tool
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Value computed by the tool, beats every other source
    pub fn computed(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.overrides.push((key.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<ResolvedContext, ContextError> {
        let mut variables = Variables::default();

        if let Some(folder) = &self.defaults_folder {
            variables.import(load_default_values(folder)?, VariableSource::Default);
        }

        for values in self.config_values {
            variables.import(values, VariableSource::ConfigFile);
        }

        for path in &self.var_files {
            let values = load_variables_file(&self.working_dir.join(path))?;
            variables.import(values, VariableSource::VariableFile);
        }

        for (key, raw_value) in &self.config_variables {
            variables.set(key, coerce(raw_value), VariableSource::CommandLineVariable);
        }

        let mut env = indexmap::IndexMap::with_capacity(self.environment.len());
        for (key, value) in self.environment {
            if let Some(name) = key.strip_prefix(TF_VAR_PREFIX) {
                variables.set(
                    name,
                    Value::from(value.as_str()),
                    VariableSource::EnvironmentVariable,
                );
            }
            env.insert(key, value);
        }

        let plan = extract(&self.args, &self.working_dir, &mut variables)?;

        for (key, value) in self.overrides {
            variables.set(&key, value, VariableSource::ComputedOverride);
        }

        let args = plan.render(&variables);
        tracing::debug!(variables = variables.len(), ?args, "context resolved");

        Ok(ResolvedContext {
            working_dir: self.working_dir,
            plan,
            args,
            variables,
            env,
        })
    }
}

/// Read-only result of [ContextBuilder::build]
#[derive(Debug, Clone)]
pub struct ResolvedContext {
    working_dir: PathBuf,
    plan: ArgumentPlan,
    args: Vec<String>,
    variables: Variables,
    env: indexmap::IndexMap<String, String>,
}

impl ResolvedContext {
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Terraform command, without the multi module suffix
    pub fn command(&self) -> Option<&str> {
        self.plan.command()
    }

    /// Arguments to forward to terraform
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn env(&self) -> &indexmap::IndexMap<String, String> {
        &self.env
    }

    /// `KEY=VALUE` pairs for a child process
    pub fn environment_pairs(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect()
    }

    /// Independent copy for a module located in `working_dir`
    pub fn derive_for(&self, working_dir: impl Into<PathBuf>) -> ResolvedContext {
        ResolvedContext {
            working_dir: working_dir.into(),
            ..self.clone()
        }
    }

    /// Same context running in another directory, e.g. a prepared source folder
    pub fn with_working_dir(self, working_dir: impl Into<PathBuf>) -> ResolvedContext {
        ResolvedContext {
            working_dir: working_dir.into(),
            ..self
        }
    }
}

impl serde::Serialize for ResolvedContext {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("ResolvedContext", 4)?;
        ser.serialize_field("working_dir", &self.working_dir)?;
        ser.serialize_field("command", &self.command())?;
        ser.serialize_field("args", &self.args)?;
        ser.serialize_field("variables", &self.variables.to_object())?;
        ser.end()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ContextError {
    #[error("Unable to load variables")]
    Load(#[from] LoadError),
    #[error("Invalid command line")]
    Args(#[from] ArgsError),
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn environment_variables() {
        let context = ContextBuilder::new(PathBuf::from("."))
            .environment([("TF_VAR_region", "eu-west-1"), ("HOME", "/home/user")])
            .build()
            .unwrap();

        let region = context.variables().get("region").unwrap();
        assert_eq!(region.value, Value::from("eu-west-1"));
        assert_eq!(region.source, VariableSource::EnvironmentVariable);
        assert!(context.variables().get("HOME").is_none());
        assert_eq!(
            context.environment_pairs(),
            vec!["TF_VAR_region=eu-west-1", "HOME=/home/user"]
        );
    }

    #[test]
    fn pass_order() {
        let config: Object = [("a", Value::from("config")), ("b", Value::from("config"))]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        let context = ContextBuilder::new(PathBuf::from("."))
            .config_values(config)
            .config_variable("b", "configured")
            .environment([("TF_VAR_c", "env")])
            .args(["plan", "-var", "c=cli", "-var", "d=cli"])
            .computed("d", "computed")
            .build()
            .unwrap();

        let variables = context.variables();
        assert_eq!(variables.get_path("a"), Some(&Value::from("config")));
        assert_eq!(variables.get_path("b"), Some(&Value::from("configured")));
        assert_eq!(variables.get_path("c"), Some(&Value::from("cli")));
        assert_eq!(variables.get_path("d"), Some(&Value::from("computed")));
        assert_eq!(context.command(), Some("plan"));
        assert_eq!(context.args(), &["plan", "-var", "c=cli", "-var", "d=computed"]);
    }

    #[test]
    fn derived_contexts_do_not_share_state() {
        let context = ContextBuilder::new(PathBuf::from("root"))
            .environment([("TF_VAR_x", "1")])
            .build()
            .unwrap();

        let module = context.derive_for("root/module");
        assert_eq!(module.working_dir(), Path::new("root/module"));
        assert_eq!(context.working_dir(), Path::new("root"));
        assert_eq!(module.variables(), context.variables());
    }

    #[test]
    fn unreadable_variable_file() {
        let working_dir = tempfile::tempdir().unwrap();
        let result = ContextBuilder::new(working_dir.path().to_path_buf())
            .var_file("missing.tfvars")
            .build();

        assert!(matches!(result, Err(ContextError::Load(LoadError::Io { .. }))));
    }
}
