//! tfprep cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; tfprep ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve variables and prepare the module source for a terraform command
    ///
    /// Everything after the options (or after `--`) is the terraform command line.
    Resolve(ResolveCommand),

    /// Print the canonical url of a source and its place in the download cache
    Source(SourceCommand),
}

#[derive(Parser, Debug)]
pub struct ResolveCommand {
    #[clap(flatten)]
    pub source: SourceArgs,

    /// Variable file declared by configuration
    ///
    /// Relative to the work directory. Can be specified multiple times,
    /// later files win.
    #[clap(long = "var-file-config")]
    pub var_files: Vec<PathBuf>,

    /// Skip reading `variable` defaults from the terraform files of the work directory
    #[clap(long = "no-defaults")]
    pub no_defaults: bool,

    /// Write the resolved variables to a file (.json, .yaml, .hcl or .tfvars)
    #[clap(long = "save-variables")]
    pub save_variables: Option<PathBuf>,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Terraform command line
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub terraform_args: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct SourceCommand {
    #[clap(flatten)]
    pub source: SourceArgs,

    /// Also download the source
    #[clap(long = "fetch")]
    pub fetch: bool,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct SourceArgs {
    /// Module source to download and run terraform in
    #[clap(long = "source", env = "TFPREP_SOURCE")]
    pub source: Option<String>,

    /// Delete the download of the source and fetch it again
    #[clap(long = "source-update", env = "TFPREP_SOURCE_UPDATE")]
    pub source_update: bool,

    /// Root folder of the download cache [default: <tmp>/tfprep]
    #[clap(long = "cache-dir", env = "TFPREP_CACHE_FOLDER")]
    pub cache_dir: Option<PathBuf>,

    /// Separates the download cache of otherwise identical work directories
    #[clap(long = "uniqueness", env = "TFPREP_UNIQUENESS", default_value = "")]
    pub uniqueness: String,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}
