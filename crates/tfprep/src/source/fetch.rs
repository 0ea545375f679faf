//! fetching sources into a download folder
use crate::source::canonical::SourceUrl;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Download `source` into `destination`
///
/// `destination` exists when this is called. Implemented for closures, which is handy in tests.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, source: &SourceUrl, destination: &Path) -> Result<(), FetchError>;
}

impl<F> Fetcher for F
where
    F: Fn(&SourceUrl, &Path) -> Result<(), FetchError> + Send + Sync,
{
    fn fetch(&self, source: &SourceUrl, destination: &Path) -> Result<(), FetchError> {
        self(source, destination)
    }
}

/// Copies local folders and clones git repositories
///
/// Git sources accept the `ref` (branch, tag or commit) and `depth` query parameters.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFetcher;

impl Fetcher for DefaultFetcher {
    fn fetch(&self, source: &SourceUrl, destination: &Path) -> Result<(), FetchError> {
        if let Some(path) = source.to_file_path() {
            tracing::debug!(
                from=%path.display(),
                to=%destination.display(),
                "copying local source"
            );
            return copy_tree(&path, destination, &[]);
        }

        if source.is_git() {
            return git_clone(source, destination);
        }

        Err(FetchError::Unsupported(source.to_string()))
    }
}

fn git_clone(source: &SourceUrl, destination: &Path) -> Result<(), FetchError> {
    let reference = source.query_param("ref");
    let depth = source
        .query_param("depth")
        .map(|depth| {
            depth
                .parse::<u32>()
                .map_err(|_| FetchError::InvalidDepth(depth.clone()))
        })
        .transpose()?;

    let repository = source.without_query().url().to_string();
    let checkout = tempfile::tempdir()?;
    let clone_dir = checkout.path().join("repository");

    let mut clone = Command::new("git");
    clone.arg("clone");
    if let Some(depth) = depth {
        clone.arg("--depth").arg(depth.to_string());
        // a shallow clone has to start at the reference
        if let Some(reference) = &reference {
            clone.arg("--branch").arg(reference);
        }
    }
    clone.arg(&repository).arg(&clone_dir);
    run_git(clone, &repository)?;

    if let (Some(reference), None) = (&reference, depth) {
        let mut checkout = Command::new("git");
        checkout.arg("checkout").arg(reference).current_dir(&clone_dir);
        run_git(checkout, &repository)?;
    }

    copy_tree(&clone_dir, destination, &[])
}

fn run_git(mut command: Command, repository: &str) -> Result<(), FetchError> {
    tracing::debug!(?command, "running git");

    let output = command.output().map_err(FetchError::GitNotFound)?;
    if output.status.success() {
        return Ok(());
    }

    Err(FetchError::Git {
        repository: repository.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Copy the content of `source` into `destination`
///
/// Entries whose name starts with a `.` are skipped, as are the paths in `excluded` and `destination` itself when it
/// lives inside of `source`.
pub fn copy_tree(
    source: &Path,
    destination: &Path,
    excluded: &[PathBuf],
) -> Result<(), FetchError> {
    std::fs::create_dir_all(destination)?;

    let entries = walkdir::WalkDir::new(source)
        .min_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || (!is_hidden(entry.file_name())
                    && entry.path() != destination
                    && !excluded.iter().any(|excluded| entry.path() == excluded))
        });

    for entry in entries {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to walk source folder")]
    Walk(#[from] walkdir::Error),
    #[error("Unable to run git")]
    GitNotFound(#[source] std::io::Error),
    #[error("Unable to clone {repository}: {stderr}")]
    Git { repository: String, stderr: String },
    #[error("Invalid clone depth {0}")]
    InvalidDepth(String),
    #[error("No getter available for {0}")]
    Unsupported(String),
}
