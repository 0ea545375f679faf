//! canonical source urls
//!
//! A source reference as written by a user (`github.com/org/repo//app?ref=v1`, `../modules/app`,
//! `git::ssh://...`) is turned into a [SourceUrl]: a parsed url plus an optional forced getter. The forced getter is
//! the `git` in `git::https://...` and decides how the source is fetched.
//!
//! The path of a source url may contain a `//`. Everything before it is the root that gets downloaded, everything
//! after it is the folder inside that download where terraform runs.
use std::fmt::{Display, Formatter};
use std::path::{Component, Path, PathBuf};
use url::Url;

const SUBDIR_SEPARATOR: &str = "//";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrl {
    forced: Option<String>,
    url: Url,
}

impl SourceUrl {
    /// Parse an already detected source, see [to_canonical_url] for user input
    pub fn parse(source: &str) -> Result<SourceUrl, SourceError> {
        let (forced, rest) = match split_forced(source) {
            Some((forced, rest)) => (Some(forced.to_string()), rest),
            None => (None, source),
        };

        let url = Url::parse(rest).map_err(|error| SourceError::InvalidUrl {
            source_ref: source.to_string(),
            error,
        })?;

        Ok(SourceUrl { forced, url })
    }

    /// Getter forced with a `getter::` prefix
    pub fn forced(&self) -> Option<&str> {
        self.forced.as_deref()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_local(&self) -> bool {
        self.url.scheme() == "file"
            && self.forced.as_deref().map_or(true, |forced| forced == "file")
    }

    pub fn is_git(&self) -> bool {
        match self.forced.as_deref() {
            Some(forced) => forced == "git",
            None => match self.url.scheme() {
                "git" | "ssh" => true,
                "http" | "https" => self.url.path().ends_with(".git"),
                _ => false,
            },
        }
    }

    /// Query string normalized to sorted `key=value` pairs
    ///
    /// Two urls that only differ in the order of their query parameters have the same query.
    pub fn query(&self) -> String {
        let mut pairs: Vec<(String, String)> = self
            .url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        pairs.sort();

        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish()
    }

    /// Value of a single query parameter
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    pub fn without_query(&self) -> SourceUrl {
        let mut url = self.url.clone();
        url.set_query(None);
        SourceUrl {
            forced: self.forced.clone(),
            url,
        }
    }

    /// Local folder of a `file` url
    pub fn to_file_path(&self) -> Option<PathBuf> {
        if !self.is_local() {
            return None;
        }
        self.url.to_file_path().ok()
    }

    /// Split into the root to download and the folder inside of it
    ///
    /// The subdirectory is empty when the path has no `//`, the whole source is downloaded then and terraform runs
    /// in its top level folder.
    pub fn split(&self) -> (SourceUrl, String) {
        let path = self.url.path();

        let Some((root_path, subdir)) = path.split_once(SUBDIR_SEPARATOR) else {
            tracing::info!(
                source = %self,
                "no double-slash (//) found in source url, the whole source is used as module, \
                 use `//` to point at a folder inside of it"
            );
            return (self.clone(), String::new());
        };

        let mut root = self.clone();
        root.url.set_path(root_path);
        (root, subdir.trim_matches('/').to_string())
    }

    /// Replace the path of a local url
    pub(crate) fn with_file_path(&self, path: &Path) -> SourceUrl {
        let mut url = self.url.clone();
        url.set_path(&slash_path(path));
        SourceUrl {
            forced: self.forced.clone(),
            url,
        }
    }
}

impl Display for SourceUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.forced {
            Some(forced) => write!(f, "{forced}::{}", self.url),
            None => write!(f, "{}", self.url),
        }
    }
}

/// Turn a user provided source reference into a [SourceUrl]
///
/// Relative local paths are resolved against `working_dir`. Shorthands for github, bitbucket, ssh, s3 and gcs are
/// expanded to the urls their getters use.
pub fn to_canonical_url(source_ref: &str, working_dir: &Path) -> Result<SourceUrl, SourceError> {
    let detected = detect(source_ref.trim(), working_dir)?;
    tracing::debug!(source_ref, %detected, "detected source");
    SourceUrl::parse(&detected)
}

fn detect(source: &str, working_dir: &Path) -> Result<String, SourceError> {
    if source.is_empty() {
        return Err(SourceError::Empty);
    }

    let (forced, source) = match split_forced(source) {
        Some((forced, rest)) => (Some(forced), rest),
        None => (None, source),
    };

    let detected = detect_getter(source, working_dir)?;

    // an explicitly forced getter beats the detected one
    Ok(match (forced, split_forced(&detected)) {
        (Some(forced), Some((_, rest))) => format!("{forced}::{rest}"),
        (Some(forced), None) => format!("{forced}::{detected}"),
        (None, _) => detected,
    })
}

fn detect_getter(source: &str, working_dir: &Path) -> Result<String, SourceError> {
    if has_scheme(source) {
        return Ok(source.to_string());
    }

    if let Some(rest) = source.strip_prefix("github.com/") {
        return git_shorthand("github.com", rest, source);
    }

    if let Some(rest) = source.strip_prefix("bitbucket.org/") {
        return git_shorthand("bitbucket.org", rest, source);
    }

    if let Some(ssh) = ssh_shorthand(source) {
        return Ok(ssh);
    }

    if source.contains(".amazonaws.com/") {
        return Ok(format!("s3::https://{source}"));
    }

    if source.contains("googleapis.com/") {
        return Ok(format!("gcs::https://{source}"));
    }

    Ok(file_url(source, working_dir))
}

/// `host/owner/repo//subdir?query` to `git::https://host/owner/repo.git//subdir?query`
fn git_shorthand(host: &str, rest: &str, source: &str) -> Result<String, SourceError> {
    let (path, query) = split_query(rest);

    let mut parts = path.splitn(3, '/');
    let (Some(owner), Some(repo)) = (parts.next(), parts.next()) else {
        return Err(SourceError::InvalidShorthand(source.to_string()));
    };
    if owner.is_empty() || repo.is_empty() {
        return Err(SourceError::InvalidShorthand(source.to_string()));
    }

    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    let mut url = format!("git::https://{host}/{owner}/{repo}.git");

    if let Some(subdir) = parts.next() {
        let subdir = subdir.trim_start_matches('/');
        if !subdir.is_empty() {
            url.push_str(SUBDIR_SEPARATOR);
            url.push_str(subdir);
        }
    }

    url.push_str(query);
    Ok(url)
}

/// `git@host:owner/repo.git` to `git::ssh://git@host/owner/repo.git`
fn ssh_shorthand(source: &str) -> Option<String> {
    let (user_host, path) = source.split_once(':')?;
    let (user, host) = user_host.split_once('@')?;

    if user.is_empty() || host.is_empty() || path.starts_with('/') || host.contains('/') {
        return None;
    }

    Some(format!("git::ssh://{user}@{host}/{path}"))
}

fn file_url(source: &str, working_dir: &Path) -> String {
    let (path, query) = split_query(source);

    // `//` after the first character marks the subdirectory, a leading `//` is a unc path
    let (root, subdir) = match path.get(1..).and_then(|rest| rest.find(SUBDIR_SEPARATOR)) {
        Some(index) => (&path[..=index], Some(&path[index + 1 + SUBDIR_SEPARATOR.len()..])),
        None => (path, None),
    };

    let root = normalize_path(&working_dir.join(root));
    let mut url = format!("file://{}", slash_path(&root));

    if let Some(subdir) = subdir {
        url.push_str(SUBDIR_SEPARATOR);
        url.push_str(subdir);
    }

    url.push_str(query);
    url
}

/// `forced::rest`, the getter name is alphanumeric
fn split_forced(source: &str) -> Option<(&str, &str)> {
    let (forced, rest) = source.split_once("::")?;
    if forced.is_empty() || !forced.chars().all(|c| c.is_ascii_alphanumeric()) || rest.is_empty() {
        return None;
    }
    Some((forced, rest))
}

fn split_query(source: &str) -> (&str, &str) {
    match source.find('?') {
        Some(index) => source.split_at(index),
        None => (source, ""),
    }
}

fn has_scheme(source: &str) -> bool {
    // single letter schemes are windows drive letters
    Url::parse(source).is_ok_and(|url| url.scheme().len() > 1)
}

/// Path as a string with `/` separators and a leading `/`
pub(crate) fn slash_path(path: &Path) -> String {
    let slashed = path.to_string_lossy().replace('\\', "/");
    if slashed.starts_with('/') {
        slashed
    } else {
        format!("/{slashed}")
    }
}

/// Lexically resolve `.` and `..` without touching the file system
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            component => normalized.push(component),
        }
    }

    normalized
}

/// Absolute and lexically normalized path, relative paths are resolved against the current directory
pub fn canonical_path(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(normalize_path(&absolute))
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("Source must not be empty")]
    Empty,
    #[error("Invalid source url {source_ref}: {error}")]
    InvalidUrl {
        source_ref: String,
        #[source]
        error: url::ParseError,
    },
    #[error("Invalid source {0}, expected host/owner/repository")]
    InvalidShorthand(String),
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn canonical(source: &str) -> String {
        to_canonical_url(source, Path::new("/work/live/app"))
            .unwrap()
            .to_string()
    }

    #[test]
    fn urls_are_kept() {
        assert_eq!(
            canonical("git::https://example.com/repo//modules/app?ref=v1.0.0"),
            "git::https://example.com/repo//modules/app?ref=v1.0.0"
        );
        assert_eq!(
            canonical("https://example.com/module.zip"),
            "https://example.com/module.zip"
        );
    }

    #[test]
    fn local_paths() {
        assert_eq!(canonical("../../modules/app"), "file:///work/modules/app");
        assert_eq!(canonical("./modules//app"), "file:///work/live/app/modules//app");
        assert_eq!(canonical("/abs/path"), "file:///abs/path");
    }

    #[test]
    fn shorthands() {
        assert_eq!(
            canonical("github.com/org/infra//vpc?ref=v2"),
            "git::https://github.com/org/infra.git//vpc?ref=v2"
        );
        assert_eq!(
            canonical("git@github.com:org/infra.git//vpc"),
            "git::ssh://git@github.com/org/infra.git//vpc"
        );
        assert_eq!(
            canonical("bucket.s3.amazonaws.com/modules/vpc.zip"),
            "s3::https://bucket.s3.amazonaws.com/modules/vpc.zip"
        );
        assert_eq!(
            canonical("git::git@github.com:org/infra.git"),
            "git::ssh://git@github.com/org/infra.git"
        );
    }

    #[test]
    fn invalid_sources() {
        assert!(matches!(
            to_canonical_url("", Path::new("/")),
            Err(SourceError::Empty)
        ));
        assert!(matches!(
            to_canonical_url("github.com/org", Path::new("/")),
            Err(SourceError::InvalidShorthand(_))
        ));
    }

    #[test]
    fn split_at_double_slash() {
        let url =
            SourceUrl::parse("git::https://example.com/repo//modules/app?ref=v1.0.0").unwrap();
        let (root, subdir) = url.split();

        assert_eq!(root.to_string(), "git::https://example.com/repo?ref=v1.0.0");
        assert_eq!(root.without_query().to_string(), "git::https://example.com/repo");
        assert_eq!(subdir, "modules/app");
        assert_eq!(root.query(), "ref=v1.0.0");
    }

    #[test]
    fn split_without_double_slash() {
        let url = SourceUrl::parse("https://example.com/module.zip").unwrap();
        let (root, subdir) = url.split();

        assert_eq!(root, url);
        assert_eq!(subdir, "");
    }

    #[test]
    fn query_is_order_independent() {
        let a = SourceUrl::parse("git::https://example.com/repo?ref=v1&depth=1").unwrap();
        let b = SourceUrl::parse("git::https://example.com/repo?depth=1&ref=v1").unwrap();

        assert_eq!(a.query(), b.query());
        assert_eq!(a.query_param("ref").as_deref(), Some("v1"));
    }

    #[test]
    fn getter_detection() {
        let git = SourceUrl::parse("git::https://example.com/repo").unwrap();
        assert!(git.is_git());
        assert!(!git.is_local());

        let local = to_canonical_url("modules", Path::new("/work")).unwrap();
        assert!(local.is_local());
        assert!(!local.is_git());
        assert_eq!(local.to_file_path(), Some(PathBuf::from("/work/modules")));

        assert!(SourceUrl::parse("https://example.com/repo.git").unwrap().is_git());
        assert!(!SourceUrl::parse("https://example.com/a.zip").unwrap().is_git());
    }

    #[test]
    fn lexical_normalization() {
        assert_eq!(normalize_path(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize_path(Path::new("a/../../b")), PathBuf::from("../b"));
    }
}
