//! # tfprep - prepare terraform runs
//!
//! `tfprep` does the work a terraform wrapper has to do before terraform itself is started:
//! 1. collect the input variables of a module from every place they can come from
//! 2. make sure the source code of the module is downloaded and up to date
//!
//! ## Introduction for developers
//!
//! ### Variables
//!
//! Variables are stored in [variables::Variables]. Each entry remembers the [variables::VariableSource] it came
//! from. Sources are totally ordered (see [variables::VariableSource::precedence]), a value only replaces another
//! value when its source ranks at least as high:
//!
//! ```text
//! Default < ConfigFile < VariableFile < VariableFileExplicit < CommandLineVariable
//!         < EnvironmentVariable < CommandLineVariableExplicit < ComputedOverride
//! ```
//!
//! Two rules refine this:
//! - values from the configuration file never replace each other, the first one wins
//! - objects are merged key by key instead of being replaced, conflicting keys are decided by precedence
//!
//! Keys may contain dots (`tags.team`), they address a value nested in objects.
//!
//! Values are [value::Value]s. Strings from the command line are turned into typed values by [coerce::coerce], so
//! `-var count=3` stores an integer.
//!
//! ### Command line
//!
//! [args::extract] takes `-var` and `-var-file` flags out of the command line of terraform and puts them into the
//! store. It returns an [args::ArgumentPlan] which renders the arguments for terraform once all variables are known.
//! Flags are only forwarded to commands that accept them ([args::COMMANDS_WITH_VARIABLES]).
//!
//! ### Context
//!
//! [context::ContextBuilder] runs all of the above in a fixed order and returns a [context::ResolvedContext]. Each
//! module of a stack gets its own copy of it.
//!
//! ### Sources
//!
//! A module source like `github.com/org/infra//vpc?ref=v1.2.0` is turned into a canonical url
//! ([source::to_canonical_url]) and split at the `//` into the part that is downloaded and the folder in it that
//! terraform runs in.
//!
//! [source::DownloadCache] places downloads in a folder derived from the working directory and the source, so
//! repeated runs reuse them. The query string of the source is stored next to the download to detect when a new
//! version has to be fetched.
pub mod args;
pub mod coerce;
pub mod context;
pub mod source;
pub mod value;
pub mod variables;
