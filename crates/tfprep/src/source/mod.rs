//! module sources: canonical urls, fetching and the download cache
mod cache;
mod canonical;
mod fetch;

pub use cache::{
    CacheError, DownloadCache, Freshness, TerraformSource, MODULE_CACHE_DIR, VERSION_FILE,
};
pub use canonical::{canonical_path, normalize_path, to_canonical_url, SourceError, SourceUrl};
pub use fetch::{copy_tree, DefaultFetcher, FetchError, Fetcher};
