use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use arxiv_harvester::error::HarvestError;
use arxiv_harvester::paths::{
    ARCHIVE_CONFIG_FILE, AppDirs, PathResolver, RunMode, normalize,
};

struct Layout {
    _temp: tempfile::TempDir,
    root: Utf8PathBuf,
}

impl Layout {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        Self { _temp: temp, root }
    }

    fn dirs(&self) -> AppDirs {
        AppDirs::new_with_paths(
            self.root.join("config"),
            self.root.join("app"),
            self.root.join("documents").join("arxiv-harvester"),
        )
    }
}

#[test]
fn fallback_depends_on_run_mode() {
    let layout = Layout::new();
    let dirs = layout.dirs();

    let dev = PathResolver::archive(&dirs, RunMode::Unpackaged).resolve().unwrap();
    assert_eq!(dev, normalize(layout.root.join("app").as_str(), "data").unwrap());
    assert!(dev.as_std_path().is_dir());

    let packaged = PathResolver::download(&dirs, RunMode::Packaged)
        .resolve()
        .unwrap();
    assert!(packaged.as_str().contains("arxiv-harvester"));
    assert!(packaged.as_str().ends_with("downloads"));
}

#[test]
fn fallback_is_persisted() {
    let layout = Layout::new();
    let resolver = PathResolver::archive(&layout.dirs(), RunMode::Unpackaged);

    let resolved = resolver.resolve().unwrap();

    let stored = fs::read_to_string(layout.root.join("config").join(ARCHIVE_CONFIG_FILE)).unwrap();
    assert_eq!(stored, resolved.as_str());
    assert_eq!(resolver.current(), Some(resolved));
}

#[test]
fn configured_path_is_normalized_and_rewritten() {
    let layout = Layout::new();
    let resolver = PathResolver::archive(&layout.dirs(), RunMode::Unpackaged);
    let custom = layout.root.join("custom");
    fs::create_dir_all(layout.root.join("config")).unwrap();
    fs::write(resolver.config_file(), format!("  {custom}//  \n")).unwrap();

    let resolved = resolver.resolve().unwrap();

    assert_eq!(resolved, normalize(custom.as_str(), "data").unwrap());
    assert!(resolved.as_std_path().is_dir());
    let stored = fs::read_to_string(resolver.config_file()).unwrap();
    assert_eq!(stored, resolved.as_str());
}

#[test]
fn invalid_config_falls_back() {
    let layout = Layout::new();
    let resolver = PathResolver::archive(&layout.dirs(), RunMode::Unpackaged);
    fs::create_dir_all(layout.root.join("config")).unwrap();
    fs::write(resolver.config_file(), "relative/path").unwrap();

    let resolved = resolver.resolve().unwrap();

    assert_eq!(resolved, normalize(layout.root.join("app").as_str(), "data").unwrap());
}

#[test]
fn update_writes_config_and_creates_directory() {
    let layout = Layout::new();
    let resolver = PathResolver::download(&layout.dirs(), RunMode::Unpackaged);
    let target = layout.root.join("pdfs");

    let updated = resolver.update(target.as_str()).unwrap();

    assert_eq!(updated, normalize(target.as_str(), "downloads").unwrap());
    assert!(updated.as_std_path().is_dir());
    assert_eq!(resolver.resolve().unwrap(), updated);

    let again = resolver.update(updated.as_str()).unwrap();
    assert_eq!(again, updated);
}

#[test]
fn update_rejects_unusable_paths() {
    let layout = Layout::new();
    let resolver = PathResolver::download(&layout.dirs(), RunMode::Unpackaged);

    assert_matches!(resolver.update("   "), Err(HarvestError::InvalidPath(_)));
    assert_matches!(resolver.update("not/absolute"), Err(HarvestError::InvalidPath(_)));
    assert!(!resolver.config_file().as_std_path().exists());
}

#[test]
fn current_does_not_create_anything() {
    let layout = Layout::new();
    let resolver = PathResolver::archive(&layout.dirs(), RunMode::Unpackaged);

    assert_eq!(resolver.current(), None);
    assert!(!layout.root.join("app").as_std_path().exists());
}

#[test]
fn uncreatable_configured_path_is_an_error() {
    let layout = Layout::new();
    let resolver = PathResolver::archive(&layout.dirs(), RunMode::Unpackaged);
    fs::write(layout.root.join("blocker"), b"not a directory").unwrap();
    let configured = layout.root.join("blocker").join("sub").join("data");
    fs::create_dir_all(layout.root.join("config")).unwrap();
    fs::write(resolver.config_file(), configured.as_str()).unwrap();

    assert_matches!(resolver.resolve(), Err(HarvestError::Persistence(_)));

    let stored = fs::read_to_string(resolver.config_file()).unwrap();
    assert_eq!(stored, configured.as_str());
    assert!(!layout.root.join("app").as_std_path().exists());
}

#[test]
fn failed_config_write_is_not_fatal() {
    let layout = Layout::new();
    fs::write(layout.root.join("config"), b"not a directory").unwrap();
    let resolver = PathResolver::archive(&layout.dirs(), RunMode::Unpackaged);

    let resolved = resolver.resolve().unwrap();

    assert_eq!(resolved, normalize(layout.root.join("app").as_str(), "data").unwrap());
    assert!(resolved.as_std_path().is_dir());
    assert!(!resolver.config_file().as_std_path().exists());
}
