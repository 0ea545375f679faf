//! Download cache with local module sources

use std::path::Path;
use tfprep::context::ContextBuilder;
use tfprep::source::{DownloadCache, Freshness, VERSION_FILE};
use tfprep::value::Value;

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn listing(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|entry| entry.unwrap())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

#[test]
fn module_from_sibling_folder() {
    let repository = tempfile::tempdir().unwrap();
    let cache_root = tempfile::tempdir().unwrap();

    write(
        &repository.path().join("modules/app/main.tf"),
        "variable \"size\" {\n  default = \"small\"\n}\n",
    );
    let live = repository.path().join("live/app");
    write(&live.join("terraform.tfvars"), "size = \"large\"\n");
    write(&live.join(".terraform.lock.hcl"), "");

    let cache = DownloadCache::with_default_fetcher(cache_root.path());
    let source = cache.resolve("../../modules/app", &live, "").unwrap();
    assert!(source.is_local());

    let effective = cache.prepare(&source, &live, false).unwrap();
    assert_eq!(listing(&effective), vec![VERSION_FILE, "main.tf", "terraform.tfvars"]);

    let context = ContextBuilder::new(live.clone())
        .defaults_from(&effective)
        .var_file("terraform.tfvars")
        .build()
        .unwrap()
        .with_working_dir(&effective);

    assert_eq!(context.working_dir(), effective);
    assert_eq!(context.variables().get_path("size"), Some(&Value::from("large")));
}

#[test]
fn local_changes_are_picked_up() {
    let module = tempfile::tempdir().unwrap();
    let working_dir = tempfile::tempdir().unwrap();
    let cache_root = tempfile::tempdir().unwrap();
    write(&module.path().join("main.tf"), "# first\n");

    let cache = DownloadCache::with_default_fetcher(cache_root.path());
    let source = cache
        .resolve(&module.path().to_string_lossy(), working_dir.path(), "")
        .unwrap();

    assert_eq!(cache.ensure_fresh(&source, false).unwrap(), Freshness::Fetched);
    write(&module.path().join("main.tf"), "# second\n");
    assert_eq!(cache.ensure_fresh(&source, false).unwrap(), Freshness::Fetched);

    assert_eq!(
        std::fs::read_to_string(source.download_dir.join("main.tf")).unwrap(),
        "# second\n"
    );
}

#[test]
fn removed_files_disappear_from_download() {
    let module = tempfile::tempdir().unwrap();
    let working_dir = tempfile::tempdir().unwrap();
    let cache_root = tempfile::tempdir().unwrap();
    write(&module.path().join("main.tf"), "");
    write(&module.path().join("outputs.tf"), "");

    let cache = DownloadCache::with_default_fetcher(cache_root.path());
    let source = cache
        .resolve(&module.path().to_string_lossy(), working_dir.path(), "")
        .unwrap();
    cache.ensure_fresh(&source, false).unwrap();

    // terraform's module cache survives a refresh
    write(&source.download_dir.join(".terraform/modules/modules.json"), "{}");
    std::fs::remove_file(module.path().join("outputs.tf")).unwrap();
    cache.ensure_fresh(&source, false).unwrap();

    assert_eq!(
        listing(&source.download_dir),
        vec![VERSION_FILE, ".terraform/modules/modules.json", "main.tf"]
    );
}

#[test]
fn source_inside_working_dir_is_not_copied_twice() {
    let working_dir = tempfile::tempdir().unwrap();
    let cache_root = tempfile::tempdir().unwrap();
    write(&working_dir.path().join("modules/vpc/main.tf"), "");
    write(&working_dir.path().join("inputs.tfvars"), "");

    let cache = DownloadCache::with_default_fetcher(cache_root.path());
    let source = cache.resolve("./modules/vpc", working_dir.path(), "").unwrap();
    let effective = cache.prepare(&source, working_dir.path(), false).unwrap();

    assert_eq!(listing(&effective), vec![VERSION_FILE, "inputs.tfvars", "main.tf"]);
}

#[test]
fn resolved_source_report() {
    let cache = DownloadCache::with_default_fetcher("/cache");
    let source = cache
        .resolve(
            "git::https://example.com/repo//modules/app?ref=v1.0.0",
            Path::new("/work/live"),
            "",
        )
        .unwrap();

    let report = serde_json::to_value(&source).unwrap();
    let canonical_url = report["canonical_url"].as_str().unwrap();
    insta::assert_snapshot!(canonical_url, @"git::https://example.com/repo?ref=v1.0.0");
    assert_eq!(report["fingerprint"], source.fingerprint());
    assert!(source.working_dir.ends_with("modules/app"));
}
