//! loading variables from files
//!
//! Two kinds of files feed the store:
//! - variable files (`-var-file`, configured files): hcl, json or yaml documents with one entry per variable
//! - terraform sources: the `default` of each `variable "<name>" { ... }` declaration
use crate::value::{Object, Value};
use hcl::eval::Evaluate;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Hcl,
    Json,
    Yaml,
}

impl FileFormat {
    /// Detect format by extension
    pub fn from_path(path: &Path) -> Option<FileFormat> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".json") {
            Some(FileFormat::Json)
        } else if name.ends_with(".yaml") || name.ends_with(".yml") {
            Some(FileFormat::Yaml)
        } else if name.ends_with(".hcl") || name.ends_with(".tfvars") || name.ends_with(".tf") {
            Some(FileFormat::Hcl)
        } else {
            None
        }
    }
}

/// Load a variable file
///
/// Json and yaml files are parsed as such. Everything else is parsed as hcl first; when that fails the content is
/// retried as yaml (which also accepts json) and the hcl error is reported if both fail.
pub fn load_variables_file(path: &Path) -> Result<Object, LoadError> {
    tracing::info!(path=%path.display(), "loading variable file");

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_owned(),
        source,
    })?;

    parse_variables(&content, FileFormat::from_path(path)).map_err(|kind| LoadError::Parse {
        path: path.to_owned(),
        kind,
    })
}

/// Parse variable file content, `None` tries all formats
pub fn parse_variables(content: &str, format: Option<FileFormat>) -> Result<Object, ParseError> {
    let value = match format {
        Some(FileFormat::Json) => Value::from_json(serde_json::from_str(content)?),
        Some(FileFormat::Yaml) => Value::from_yaml(serde_yaml::from_str(content)?),
        Some(FileFormat::Hcl) | None => match hcl::from_str::<hcl::Value>(content) {
            Ok(value) => Value::from_hcl(value),
            Err(hcl_error) => {
                tracing::debug!(%hcl_error, "not hcl, trying other formats");
                // plain text is valid yaml, only accept the fallback if it produced an object
                match serde_yaml::from_str(content).map(Value::from_yaml) {
                    Ok(Some(Value::Object(object))) => return Ok(object),
                    _ => return Err(hcl_error.into()),
                }
            }
        },
    };

    match value {
        Some(Value::Object(object)) => Ok(object),
        // an empty yaml document
        None => Ok(Object::new()),
        Some(_) => Err(ParseError::NotAnObject),
    }
}

/// Collect the `default` of every variable declared in the terraform files of `folder`
///
/// Files are read in terraform's order: regular files alphabetically, then override files alphabetically. Later
/// files replace defaults of earlier files.
pub fn load_default_values(folder: &Path) -> Result<Object, LoadError> {
    let mut defaults = Object::new();

    for file_path in terraform_files(folder)? {
        let content = std::fs::read_to_string(&file_path).map_err(|source| LoadError::Io {
            path: file_path.clone(),
            source,
        })?;

        let is_json = file_path.to_string_lossy().ends_with(".json");
        let file_defaults = if is_json {
            json_defaults(&content)
        } else {
            hcl_defaults(&content)
        }
        .map_err(|kind| LoadError::Parse {
            path: file_path.clone(),
            kind,
        })?;

        tracing::debug!(path=%file_path.display(), count=file_defaults.len(), "variable defaults");
        defaults.extend(file_defaults);
    }

    Ok(defaults)
}

fn terraform_files(folder: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let io_error = |source| LoadError::Io {
        path: folder.to_owned(),
        source,
    };

    let mut regular_files = vec![];
    let mut override_files = vec![];

    for dir_entry in std::fs::read_dir(folder).map_err(io_error)? {
        let dir_entry = dir_entry.map_err(io_error)?;
        if !dir_entry.file_type().map_err(io_error)?.is_file() {
            continue;
        }

        let name = dir_entry.file_name().to_string_lossy().into_owned();
        let Some(stem) = name
            .strip_suffix(".tf")
            .or_else(|| name.strip_suffix(".tf.json"))
        else {
            continue;
        };

        if stem == "override" || stem.ends_with("_override") {
            override_files.push(dir_entry.path());
        } else {
            regular_files.push(dir_entry.path());
        }
    }

    regular_files.sort();
    override_files.sort();
    regular_files.extend(override_files);
    Ok(regular_files)
}

fn hcl_defaults(content: &str) -> Result<Object, ParseError> {
    let body: hcl::Body = hcl::parse(content)?;
    let context = hcl::eval::Context::new();
    let mut defaults = Object::new();

    for block in body.blocks().filter(|block| block.identifier() == "variable") {
        let Some(name) = block.labels().first() else {
            continue;
        };

        let Some(default) = block
            .body()
            .attributes()
            .find(|attribute| attribute.key() == "default")
        else {
            continue;
        };

        let value = default
            .expr()
            .evaluate(&context)
            .map_err(|err| ParseError::Evaluate(err.to_string()))?;

        if let Some(value) = Value::from_hcl(value) {
            defaults.insert(name.as_str().to_string(), value);
        }
    }

    Ok(defaults)
}

fn json_defaults(content: &str) -> Result<Object, ParseError> {
    let document: serde_json::Value = serde_json::from_str(content)?;
    let Some(variables) = document.get("variable").and_then(|v| v.as_object()) else {
        return Ok(Object::new());
    };

    Ok(variables
        .iter()
        .filter_map(|(name, declaration)| {
            let default = declaration.get("default")?.clone();
            Value::from_json(default).map(|value| (name.clone(), value))
        })
        .collect())
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("Unable to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to parse {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        kind: ParseError,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("Unable to parse hcl: {0}")]
    Hcl(#[from] hcl::Error),
    #[error("Unable to parse json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unable to parse yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Unable to evaluate default value: {0}")]
    Evaluate(String),
    #[error("Document must contain an object at the top level")]
    NotAnObject,
}
