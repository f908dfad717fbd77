use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use zuul_index::{FileDiscovery, IndexConfig};

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("workspace")
}

fn copy_fixture() -> tempfile::TempDir {
    let src_root = fixture_root();
    let temp = tempfile::tempdir().expect("tempdir");

    for entry in walkdir::WalkDir::new(&src_root) {
        let entry = entry.expect("walkdir entry");
        let path = entry.path();
        let rel = path.strip_prefix(&src_root).expect("strip prefix");
        let dest = temp.path().join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).expect("create dir");
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).expect("create parent");
            }
            fs::copy(path, &dest).expect("copy file");
        }
    }

    temp
}

fn rels(root: &Path, files: Vec<PathBuf>) -> HashSet<String> {
    files
        .into_iter()
        .filter_map(|p| {
            p.strip_prefix(root)
                .ok()
                .map(|r| r.to_string_lossy().replace('\\', "/"))
        })
        .collect()
}

#[test]
fn discovers_only_zuul_config_files() {
    let temp = copy_fixture();
    let discovery = FileDiscovery::new(temp.path(), &IndexConfig::default()).unwrap();
    let files = rels(temp.path(), discovery.discover().unwrap());

    let expected: HashSet<String> = ["zuul.d/jobs.yaml", "zuul.d/templates.yaml"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(files, expected);
}

#[test]
fn respects_gitignore() {
    let temp = copy_fixture();
    fs::write(temp.path().join("zuul.d/local.yaml"), "- job:\n    name: local\n").unwrap();
    fs::write(temp.path().join(".gitignore"), "zuul.d/local.yaml\n").unwrap();

    let discovery = FileDiscovery::new(temp.path(), &IndexConfig::default()).unwrap();
    let files = rels(temp.path(), discovery.discover().unwrap());
    assert!(!files.contains("zuul.d/local.yaml"));
    assert!(files.contains("zuul.d/jobs.yaml"));
}

#[test]
fn custom_patterns_replace_defaults() {
    let temp = copy_fixture();
    let config = IndexConfig {
        file_patterns: vec!["playbooks/*.yaml".into()],
        ..IndexConfig::default()
    };
    let discovery = FileDiscovery::new(temp.path(), &config).unwrap();
    let files = rels(temp.path(), discovery.discover().unwrap());
    assert_eq!(files, HashSet::from(["playbooks/run.yaml".to_string()]));
}

#[test]
fn skips_cache_directory() {
    let temp = copy_fixture();
    let cached = temp.path().join(".zuul-index/zuul.d");
    fs::create_dir_all(&cached).unwrap();
    fs::write(cached.join("stale.yaml"), "- job:\n    name: stale\n").unwrap();

    let discovery = FileDiscovery::new(temp.path(), &IndexConfig::default()).unwrap();
    let files = rels(temp.path(), discovery.discover().unwrap());
    assert_eq!(files.len(), 2);
}
