//! `-var` / `-var-file` extraction from the wrapped command line
//!
//! Extraction happens in two phases:
//! 1. [extract] scans the tokens, sets every variable in the store and records where the flags were as an
//!    [ArgumentPlan]
//! 2. once the store is final, [ArgumentPlan::render] produces the arguments for terraform
//!
//! Rendering reads the final value of each forwarded `-var` from the store, so a value that was overridden by a
//! source above [VariableSource::CommandLineVariableExplicit] is forwarded with its new value.
//!
//! Terraform only accepts variable flags on some commands ([COMMANDS_WITH_VARIABLES]). For all other commands the
//! flags are consumed and removed from the plan.
use crate::coerce::coerce;
use crate::variables::{load_variables_file, LoadError, VariableSource, Variables};
use std::path::Path;

/// Terraform commands accepting `-var` and `-var-file`
pub const COMMANDS_WITH_VARIABLES: &[&str] = &[
    "apply", "console", "destroy", "import", "plan", "push", "refresh", "validate",
];

/// Suffix of commands applied to every module of a stack (`plan-all`)
pub const MULTI_MODULE_SUFFIX: &str = "-all";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    Var,
    VarFile,
}

impl Flag {
    /// Match `-var`, `--var`, `-var-file`, `--var-file`, each optionally followed by `=value`
    fn parse(token: &str) -> Option<(Flag, Option<&str>)> {
        let name = token
            .strip_prefix("--")
            .or_else(|| token.strip_prefix('-'))?;

        let (name, value) = match name.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (name, None),
        };

        match name {
            "var" => Some((Flag::Var, value)),
            "var-file" => Some((Flag::VarFile, value)),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Flag::Var => "-var",
            Flag::VarFile => "-var-file",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Raw(String),
    Variable { key: String, raw_value: String },
    VariableFile(String),
}

/// Forwarded command line, waiting for the final variables
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArgumentPlan {
    command: Option<String>,
    segments: Vec<Segment>,
}

impl ArgumentPlan {
    /// Terraform command with the multi module suffix removed
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Render the arguments, variable flags use their normalized spelling
    pub fn render(&self, variables: &Variables) -> Vec<String> {
        let mut rendered = Vec::with_capacity(self.segments.len());

        for segment in &self.segments {
            match segment {
                Segment::Raw(token) => rendered.push(token.clone()),
                Segment::Variable { key, raw_value } => {
                    let value = variables
                        .get_path(key)
                        .map(ToString::to_string)
                        .unwrap_or_else(|| raw_value.clone());
                    rendered.push(Flag::Var.as_str().to_string());
                    rendered.push(format!("{key}={value}"));
                }
                Segment::VariableFile(path) => {
                    rendered.push(Flag::VarFile.as_str().to_string());
                    rendered.push(path.clone());
                }
            }
        }

        rendered
    }
}

/// Target command of a command line
pub fn target_command(tokens: &[String]) -> Option<&str> {
    let first = tokens.first()?;
    Some(first.strip_suffix(MULTI_MODULE_SUFFIX).unwrap_or(first))
}

/// Consume variable flags from `tokens` into `variables`
///
/// `-var` values are coerced and set as [VariableSource::CommandLineVariableExplicit]. `-var-file` paths are relative
/// to `working_dir` and their content is set as [VariableSource::VariableFileExplicit].
pub fn extract(
    tokens: &[String],
    working_dir: &Path,
    variables: &mut Variables,
) -> Result<ArgumentPlan, ArgsError> {
    let command = target_command(tokens).map(str::to_string);
    let forward = command
        .as_deref()
        .is_some_and(|command| COMMANDS_WITH_VARIABLES.contains(&command));
    tracing::debug!(?command, forward, "extracting variables");

    let mut segments = Vec::with_capacity(tokens.len());
    let mut tokens = tokens.iter();

    while let Some(token) = tokens.next() {
        let Some((flag, inline_value)) = Flag::parse(token) else {
            segments.push(Segment::Raw(token.clone()));
            continue;
        };

        let value = match inline_value {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => tokens
                .next()
                .cloned()
                .ok_or(ArgsError::MissingValue(flag.as_str()))?,
        };

        let segment = match flag {
            Flag::Var => {
                let (key, raw_value) = value
                    .split_once('=')
                    .ok_or_else(|| ArgsError::InvalidVariable(value.clone()))?;
                let key = key.trim();
                variables.set(key, coerce(raw_value), VariableSource::CommandLineVariableExplicit);

                Segment::Variable {
                    key: key.to_string(),
                    raw_value: raw_value.to_string(),
                }
            }
            Flag::VarFile => {
                let values = load_variables_file(&working_dir.join(&value))?;
                variables.import(values, VariableSource::VariableFileExplicit);

                Segment::VariableFile(value)
            }
        };

        if forward {
            segments.push(segment);
        }
    }

    Ok(ArgumentPlan { command, segments })
}

#[derive(thiserror::Error, Debug)]
pub enum ArgsError {
    #[error("You must specify a value for the {0} option")]
    MissingValue(&'static str),
    #[error("Invalid variable format {0}, should be name=value")]
    InvalidVariable(String),
    #[error("Unable to load variable file")]
    LoadFile(#[from] LoadError),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn tokens(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    fn extract_tokens(args: &[&str]) -> (ArgumentPlan, Variables) {
        let mut variables = Variables::default();
        let plan = extract(&tokens(args), Path::new("."), &mut variables).expect("valid args");
        (plan, variables)
    }

    #[test]
    fn flag_spellings() {
        assert_eq!(Flag::parse("-var"), Some((Flag::Var, None)));
        assert_eq!(Flag::parse("--var=a=1"), Some((Flag::Var, Some("a=1"))));
        assert_eq!(Flag::parse("-var-file=x.json"), Some((Flag::VarFile, Some("x.json"))));
        assert_eq!(Flag::parse("--var-file"), Some((Flag::VarFile, None)));
        assert_eq!(Flag::parse("---var"), None);
        assert_eq!(Flag::parse("-variable"), None);
        assert_eq!(Flag::parse("var"), None);
    }

    #[test]
    fn variables_are_coerced_and_explicit() {
        let (_, variables) = extract_tokens(&["plan", "-var", "count=3", "--var=name='web'"]);

        let count = variables.get("count").unwrap();
        assert_eq!(count.value, Value::Integer(3));
        assert_eq!(count.source, VariableSource::CommandLineVariableExplicit);
        assert_eq!(variables.get_path("name"), Some(&Value::from("web")));
    }

    #[test]
    fn value_keeps_everything_after_first_equal_sign() {
        let (_, variables) = extract_tokens(&["init", "-var", "query=a=b"]);
        assert_eq!(variables.get_path("query"), Some(&Value::from("a=b")));
    }

    #[test]
    fn flags_removed_for_commands_without_variables() {
        let (plan, variables) =
            extract_tokens(&["init", "-var", "a=1", "-upgrade", "--var=b=2", "dir"]);

        assert_eq!(plan.command(), Some("init"));
        assert_eq!(plan.render(&variables), tokens(&["init", "-upgrade", "dir"]));
    }

    #[test]
    fn flags_kept_for_commands_with_variables() {
        let (plan, variables) = extract_tokens(&["plan-all", "--var", "a=1", "-out=plan.out"]);

        assert_eq!(plan.command(), Some("plan"));
        assert_eq!(
            plan.render(&variables),
            tokens(&["plan-all", "-var", "a=1", "-out=plan.out"])
        );
    }

    #[test]
    fn rendering_reflects_overrides() {
        let (plan, mut variables) = extract_tokens(&["apply", "-var", "region=us-east-1"]);
        variables.set("region", Value::from("eu-west-1"), VariableSource::ComputedOverride);

        assert_eq!(
            plan.render(&variables),
            tokens(&["apply", "-var", "region=eu-west-1"])
        );
    }

    #[test]
    fn extraction_is_idempotent() {
        let (plan, variables) = extract_tokens(&["output", "-var", "a=1", "-json"]);
        let filtered = plan.render(&variables);

        let (second_plan, second_variables) =
            extract_tokens(&filtered.iter().map(String::as_str).collect::<Vec<_>>());

        assert!(second_variables.is_empty());
        assert_eq!(second_plan.render(&second_variables), filtered);
    }

    #[test]
    fn missing_equal_sign_is_fatal() {
        let mut variables = Variables::default();
        let error = extract(&tokens(&["plan", "-var", "novalue"]), Path::new("."), &mut variables)
            .expect_err("must fail");

        assert!(matches!(error, ArgsError::InvalidVariable(token) if token == "novalue"));
    }

    #[test]
    fn missing_value_is_fatal() {
        for args in [&["plan", "-var"][..], &["plan", "-var-file="][..]] {
            let mut variables = Variables::default();
            let error =
                extract(&tokens(args), Path::new("."), &mut variables).expect_err("must fail");
            assert!(matches!(error, ArgsError::MissingValue(_)), "{args:?}");
        }
    }

    #[test]
    fn missing_variable_file_is_fatal() {
        let working_dir = tempfile::tempdir().unwrap();
        let mut variables = Variables::default();
        let args = tokens(&["plan", "-var-file", "missing.tfvars"]);

        let error = extract(&args, working_dir.path(), &mut variables).expect_err("must fail");
        assert!(matches!(
            error,
            ArgsError::LoadFile(LoadError::Io { ref path, .. }) if path.ends_with("missing.tfvars")
        ));
        assert!(variables.is_empty());
    }

    #[test]
    fn malformed_variable_file_is_fatal() {
        let working_dir = tempfile::tempdir().unwrap();
        std::fs::write(working_dir.path().join("bad.tfvars"), "foo = = [").unwrap();
        let mut variables = Variables::default();
        let args = tokens(&["plan", "-var", "a=1", "-var-file", "bad.tfvars"]);

        let error = extract(&args, working_dir.path(), &mut variables).expect_err("must fail");
        assert!(matches!(error, ArgsError::LoadFile(LoadError::Parse { .. })));
        assert!(variables.get("foo").is_none());
    }
}
