mod cli;

use anyhow::Context;
use std::path::{Path, PathBuf};
use tfprep::context::ContextBuilder;
use tfprep::source::DownloadCache;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("TFPREP_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Resolve(resolve_cli) => resolve(resolve_cli),
        cli::Command::Source(source_cli) => source(source_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn resolve(cli: cli::ResolveCommand) -> anyhow::Result<()> {
    let working_dir = std::env::current_dir()?;

    let effective_dir = match &cli.source.source {
        Some(source_ref) => prepare_source(&cli.source, source_ref, &working_dir)?,
        None => working_dir.clone(),
    };

    let mut builder = ContextBuilder::new(working_dir)
        .environment(environment())
        .args(cli.terraform_args);

    if !cli.no_defaults {
        builder = builder.defaults_from(&effective_dir);
    }

    for var_file in cli.var_files {
        builder = builder.var_file(var_file);
    }

    let context = builder.build()?.with_working_dir(effective_dir);

    if let Some(path) = &cli.save_variables {
        context
            .variables()
            .save(path)
            .with_context(|| format!("Unable to save variables to {}", path.display()))?;
    }

    output(&cli.output, &context)
}

pub fn source(cli: cli::SourceCommand) -> anyhow::Result<()> {
    let working_dir = std::env::current_dir()?;
    let source_ref = cli
        .source
        .source
        .as_deref()
        .context("No source given, use --source or TFPREP_SOURCE")?;

    let cache = download_cache(&cli.source);
    let source = cache.resolve(source_ref, &working_dir, &cli.source.uniqueness)?;

    if cli.fetch {
        let freshness = cache
            .ensure_fresh(&source, cli.source.source_update)
            .with_context(|| format!("Unable to download {}", source.canonical_url))?;
        tracing::info!(?freshness, "source checked");
    }

    output(&cli.output, &source)
}

fn download_cache(args: &cli::SourceArgs) -> DownloadCache {
    let root = args
        .cache_dir
        .clone()
        .unwrap_or_else(DownloadCache::default_root);
    DownloadCache::with_default_fetcher(root)
}

fn prepare_source(
    args: &cli::SourceArgs,
    source_ref: &str,
    working_dir: &Path,
) -> anyhow::Result<PathBuf> {
    let cache = download_cache(args);
    let source = cache.resolve(source_ref, working_dir, &args.uniqueness)?;

    let effective_dir = cache
        .prepare(&source, working_dir, args.source_update)
        .with_context(|| format!("Unable to prepare source {}", source.canonical_url))?;

    tracing::info!(directory=%effective_dir.display(), "Running in downloaded source");
    Ok(effective_dir)
}

/// Process environment, entries that are not valid unicode are skipped
fn environment() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
}

fn output(output: &cli::OutputArgs, value: &impl serde::Serialize) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}
