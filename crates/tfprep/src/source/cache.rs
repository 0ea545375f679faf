//! download cache for module sources
//!
//! Every source gets a folder below the cache root:
//!
//! ```text
//! <cache root>/<hash(working dir + uniqueness)>/<hash(root url without query)>/
//!     .source-version     hash of the query string of the downloaded source
//!     <subdir>/           working directory of terraform
//! <cache root>/<hash(working dir + uniqueness)>/<hash(root url without query)>.lock
//! ```
//!
//! The query string (`?ref=v1.2.0`) is not part of the folder name, so a new version of a source replaces the
//! previous download instead of adding a folder. The version file detects that the download is outdated.
//!
//! Processes sharing a cache root coordinate through the `.lock` file next to each download folder. Within a
//! process, a [DownloadCache] remembers which folders it already verified and skips the file system checks for
//! them.
use crate::source::canonical::{
    canonical_path, normalize_path, slash_path, to_canonical_url, SourceError, SourceUrl,
};
use crate::source::fetch::{copy_tree, DefaultFetcher, FetchError, Fetcher};
use fs4::fs_std::FileExt;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Name of the file holding the fingerprint of a download
pub const VERSION_FILE: &str = ".source-version";

/// Module cache of terraform, kept when a download is refreshed
pub const MODULE_CACHE_DIR: &str = ".terraform";

const TERRAFORM_EXTENSIONS: &[&str] = &[".tf", ".tf.json", ".tf.yaml"];
const TEMPLATE_SUFFIXES: &[&str] = &["", ".gt", ".template"];

/// Number of hash bytes used in folder names
const HASH_LENGTH: usize = 16;

/// A source resolved to its place in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerraformSource {
    /// Root of the source, including the query string
    pub canonical_url: SourceUrl,
    pub download_dir: PathBuf,
    /// Folder inside of `download_dir` where terraform runs
    pub working_dir: PathBuf,
    pub version_file: PathBuf,
}

impl TerraformSource {
    pub fn is_local(&self) -> bool {
        self.canonical_url.is_local()
    }

    /// Hash of the query string of the source
    pub fn fingerprint(&self) -> String {
        hash(&self.canonical_url.query())
    }

    /// Whether the download matches this source
    ///
    /// Local sources are never up to date, their content may change at any time.
    pub fn is_up_to_date(&self) -> Result<bool, CacheError> {
        if self.is_local() {
            return Ok(false);
        }

        for path in [&self.download_dir, &self.working_dir, &self.version_file] {
            if !path.exists() {
                tracing::debug!(path=%path.display(), "missing in download");
                return Ok(false);
            }
        }

        let stored =
            std::fs::read_to_string(&self.version_file).map_err(io_error(&self.version_file))?;
        Ok(stored.trim() == self.fingerprint())
    }

    fn lock_file(&self) -> PathBuf {
        let mut name = self
            .download_dir
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.download_dir.with_file_name(name)
    }
}

impl Display for TerraformSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (download: {}, working dir: {})",
            self.canonical_url,
            self.download_dir.display(),
            self.working_dir.display()
        )
    }
}

impl serde::Serialize for TerraformSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("TerraformSource", 5)?;
        ser.serialize_field("canonical_url", &self.canonical_url.to_string())?;
        ser.serialize_field("download_dir", &self.download_dir)?;
        ser.serialize_field("working_dir", &self.working_dir)?;
        ser.serialize_field("version_file", &self.version_file)?;
        ser.serialize_field("fingerprint", &self.fingerprint())?;
        ser.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    UpToDate,
    Fetched,
}

pub struct DownloadCache {
    root: PathBuf,
    fetcher: Box<dyn Fetcher>,
    /// download dir to the fingerprint verified during this run
    verified: Mutex<HashMap<PathBuf, String>>,
}

impl std::fmt::Debug for DownloadCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCache")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl DownloadCache {
    pub fn new(root: impl Into<PathBuf>, fetcher: impl Fetcher + 'static) -> DownloadCache {
        DownloadCache {
            root: root.into(),
            fetcher: Box::new(fetcher),
            verified: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default_fetcher(root: impl Into<PathBuf>) -> DownloadCache {
        DownloadCache::new(root, DefaultFetcher)
    }

    /// `tfprep` in the temporary directory of the system
    pub fn default_root() -> PathBuf {
        std::env::temp_dir().join("tfprep")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Locate `source_ref` in the cache
    ///
    /// The result only depends on the arguments and the cache root. `uniqueness` separates caches of otherwise
    /// identical working directories.
    pub fn resolve(
        &self,
        source_ref: &str,
        working_dir: &Path,
        uniqueness: &str,
    ) -> Result<TerraformSource, CacheError> {
        let working_dir = canonical_path(working_dir).map_err(io_error(working_dir))?;
        let canonical = to_canonical_url(source_ref, &working_dir)?;
        let (mut root, subdir) = canonical.split();

        if let Some(path) = root.to_file_path() {
            root = root.with_file_path(&normalize_path(&path));
        }

        let namespace = hash(&format!("{}{uniqueness}", slash_path(&working_dir)));
        let download_dir = self
            .root
            .join(namespace)
            .join(hash(&root.without_query().to_string()));

        let source = TerraformSource {
            working_dir: normalize_path(&download_dir.join(&subdir)),
            version_file: download_dir.join(VERSION_FILE),
            download_dir,
            canonical_url: root,
        };
        tracing::debug!(%source, "resolved source");
        Ok(source)
    }

    /// Download `source` unless the cache already holds it
    ///
    /// `force_update` deletes the download first.
    pub fn ensure_fresh(
        &self,
        source: &TerraformSource,
        force_update: bool,
    ) -> Result<Freshness, CacheError> {
        if self.is_verified(source, force_update) {
            return Ok(Freshness::UpToDate);
        }

        let _lock = CacheLock::acquire(&source.lock_file())?;
        self.refresh(source, force_update)
    }

    /// Download `source` if needed and copy the files of `working_dir` into its working directory
    ///
    /// Hidden files and a local source folder inside of `working_dir` are not copied. Returns the working directory
    /// terraform has to run in.
    pub fn prepare(
        &self,
        source: &TerraformSource,
        working_dir: &Path,
        force_update: bool,
    ) -> Result<PathBuf, CacheError> {
        let working_dir = canonical_path(working_dir).map_err(io_error(working_dir))?;
        let _lock = CacheLock::acquire(&source.lock_file())?;

        if !self.is_verified(source, force_update) {
            self.refresh(source, force_update)?;
        }

        let excluded: Vec<PathBuf> = source.canonical_url.to_file_path().into_iter().collect();
        tracing::debug!(
            from=%working_dir.display(),
            to=%source.working_dir.display(),
            "copying working directory"
        );
        copy_tree(&working_dir, &source.working_dir, &excluded)?;

        Ok(source.working_dir.clone())
    }

    fn is_verified(&self, source: &TerraformSource, force_update: bool) -> bool {
        if force_update || source.is_local() {
            return false;
        }

        let verified = self.verified.lock().unwrap_or_else(PoisonError::into_inner);
        let hit = verified
            .get(&source.download_dir)
            .is_some_and(|fingerprint| *fingerprint == source.fingerprint());
        if hit {
            tracing::debug!(source=%source.canonical_url, "already verified");
        }
        hit
    }

    fn mark_verified(&self, source: &TerraformSource, fingerprint: String) {
        if source.is_local() {
            return;
        }
        self.verified
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source.download_dir.clone(), fingerprint);
    }

    /// Check and download, the lock of the download folder must be held
    fn refresh(
        &self,
        source: &TerraformSource,
        force_update: bool,
    ) -> Result<Freshness, CacheError> {
        let fingerprint = source.fingerprint();

        if force_update && source.download_dir.exists() {
            tracing::info!(
                path=%source.download_dir.display(),
                "source update forced, removing download"
            );
            std::fs::remove_dir_all(&source.download_dir).map_err(io_error(&source.download_dir))?;
        }

        if source.is_up_to_date()? {
            tracing::debug!(source=%source.canonical_url, "cache hit");
            self.mark_verified(source, fingerprint);
            return Ok(Freshness::UpToDate);
        }

        tracing::info!(
            source=%source.canonical_url,
            path=%source.download_dir.display(),
            "downloading source"
        );

        // an interrupted download must not look complete
        if source.version_file.exists() {
            std::fs::remove_file(&source.version_file).map_err(io_error(&source.version_file))?;
        }
        cleanup_terraform_files(&source.download_dir)?;
        std::fs::create_dir_all(&source.download_dir).map_err(io_error(&source.download_dir))?;

        self.fetcher
            .fetch(&source.canonical_url, &source.download_dir)
            .map_err(|error| CacheError::Fetch {
                source_url: source.canonical_url.to_string(),
                error,
            })?;

        std::fs::create_dir_all(&source.working_dir).map_err(io_error(&source.working_dir))?;
        std::fs::write(&source.version_file, &fingerprint).map_err(io_error(&source.version_file))?;
        self.mark_verified(source, fingerprint);

        Ok(Freshness::Fetched)
    }
}

/// Remove terraform files of a previous download, the module cache of terraform is kept
#[tracing::instrument(level = "trace", skip_all)]
fn cleanup_terraform_files(download_dir: &Path) -> Result<(), CacheError> {
    if !download_dir.exists() {
        return Ok(());
    }

    let entries = walkdir::WalkDir::new(download_dir)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != MODULE_CACHE_DIR);

    for entry in entries {
        let entry = entry?;
        if entry.file_type().is_file() && is_terraform_file(&entry.file_name().to_string_lossy()) {
            tracing::trace!(path=%entry.path().display(), "removing");
            std::fs::remove_file(entry.path()).map_err(io_error(entry.path()))?;
        }
    }

    Ok(())
}

fn is_terraform_file(name: &str) -> bool {
    TERRAFORM_EXTENSIONS.iter().any(|extension| {
        TEMPLATE_SUFFIXES
            .iter()
            .any(|suffix| name.ends_with(&format!("{extension}{suffix}")))
    })
}

fn hash(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(&digest[..HASH_LENGTH])
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_owned(),
        source,
    }
}

/// Exclusive lock on a download folder, released on drop
#[derive(Debug)]
struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    fn acquire(path: &Path) -> Result<CacheLock, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(io_error(path))?;

        tracing::trace!(path=%path.display(), "waiting for lock");
        FileExt::lock_exclusive(&file).map_err(io_error(path))?;

        Ok(CacheLock {
            file,
            path: path.to_owned(),
        })
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(error) = FileExt::unlock(&self.file) {
            tracing::warn!(path=%self.path.display(), %error, "unable to release lock");
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("Invalid source")]
    Source(#[from] SourceError),
    #[error("IO error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to walk download folder")]
    Walk(#[from] walkdir::Error),
    #[error("Unable to download {source_url}")]
    Fetch {
        source_url: String,
        #[source]
        error: FetchError,
    },
    #[error("Unable to copy working directory")]
    Copy(#[from] FetchError),
}
