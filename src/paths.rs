use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;
use crate::fs_util::{ensure_dir, write_bytes_atomic};

pub const ARCHIVE_CONFIG_FILE: &str = "archive-dir.txt";
pub const DOWNLOAD_CONFIG_FILE: &str = "download-dir.txt";
pub const ARCHIVE_SUFFIX: &str = "data";
pub const DOWNLOAD_SUFFIX: &str = "downloads";
const APP_NAME: &str = "arxiv-harvester";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Packaged,
    Unpackaged,
}

impl RunMode {
    pub fn detect() -> Self {
        if cfg!(debug_assertions) {
            RunMode::Unpackaged
        } else {
            RunMode::Packaged
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppDirs {
    config_dir: Utf8PathBuf,
    app_dir: Utf8PathBuf,
    documents_dir: Utf8PathBuf,
}

impl AppDirs {
    pub fn discover() -> Result<Self, HarvestError> {
        let config_dir = ProjectDirs::from("org", APP_NAME, APP_NAME)
            .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.config_dir().to_path_buf()).ok())
            .ok_or_else(|| {
                HarvestError::Persistence("unable to resolve config directory".to_string())
            })?;

        let cwd = std::env::current_dir().map_err(|err| HarvestError::Persistence(err.to_string()))?;
        let app_dir = Utf8PathBuf::from_path_buf(cwd)
            .map_err(|_| HarvestError::Persistence("invalid working directory".to_string()))?;

        let documents_dir = UserDirs::new()
            .and_then(|dirs| {
                let base = dirs
                    .document_dir()
                    .map(|dir| dir.to_path_buf())
                    .unwrap_or_else(|| dirs.home_dir().join("Documents"));
                Utf8PathBuf::from_path_buf(base.join(APP_NAME)).ok()
            })
            .ok_or_else(|| {
                HarvestError::Persistence("unable to resolve documents directory".to_string())
            })?;

        Ok(Self {
            config_dir,
            app_dir,
            documents_dir,
        })
    }

    pub fn new_with_paths(
        config_dir: Utf8PathBuf,
        app_dir: Utf8PathBuf,
        documents_dir: Utf8PathBuf,
    ) -> Self {
        Self {
            config_dir,
            app_dir,
            documents_dir,
        }
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn fallback_base(&self, mode: RunMode) -> &Utf8Path {
        match mode {
            RunMode::Packaged => &self.documents_dir,
            RunMode::Unpackaged => &self.app_dir,
        }
    }
}

/// A configurable directory persisted as a one-line text file.
#[derive(Debug, Clone)]
pub struct PathResolver {
    config_file: Utf8PathBuf,
    suffix: &'static str,
    fallback_base: Utf8PathBuf,
}

impl PathResolver {
    pub fn new(config_file: Utf8PathBuf, suffix: &'static str, fallback_base: Utf8PathBuf) -> Self {
        Self {
            config_file,
            suffix,
            fallback_base,
        }
    }

    pub fn archive(dirs: &AppDirs, mode: RunMode) -> Self {
        Self::new(
            dirs.config_dir().join(ARCHIVE_CONFIG_FILE),
            ARCHIVE_SUFFIX,
            dirs.fallback_base(mode).to_path_buf(),
        )
    }

    pub fn download(dirs: &AppDirs, mode: RunMode) -> Self {
        Self::new(
            dirs.config_dir().join(DOWNLOAD_CONFIG_FILE),
            DOWNLOAD_SUFFIX,
            dirs.fallback_base(mode).to_path_buf(),
        )
    }

    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    pub fn suffix(&self) -> &'static str {
        self.suffix
    }

    pub fn current(&self) -> Option<Utf8PathBuf> {
        self.read_config()
            .and_then(|stored| normalize(&stored, self.suffix))
    }

    pub fn resolve(&self) -> Result<Utf8PathBuf, HarvestError> {
        if let Some(stored) = self.read_config() {
            match normalize(&stored, self.suffix) {
                Some(normalized) => {
                    // no fallback here: the stored setting must survive a failed mkdir
                    ensure_dir(&normalized)?;
                    if normalized.as_str() != stored.trim() {
                        self.persist_best_effort(&normalized);
                    }
                    return Ok(normalized);
                }
                None => {
                    tracing::warn!(config = %self.config_file, "ignoring invalid directory config");
                }
            }
        }

        let fallback = normalize(self.fallback_base.as_str(), self.suffix)
            .ok_or_else(|| HarvestError::InvalidPath(self.fallback_base.to_string()))?;
        ensure_dir(&fallback)?;
        self.persist_best_effort(&fallback);
        Ok(fallback)
    }

    pub fn update(&self, new_path: &str) -> Result<Utf8PathBuf, HarvestError> {
        let normalized =
            normalize(new_path, self.suffix).ok_or_else(|| HarvestError::InvalidPath(new_path.to_string()))?;
        ensure_dir(&normalized)?;
        write_bytes_atomic(&self.config_file, normalized.as_str().as_bytes())?;
        tracing::info!(path = %normalized, config = %self.config_file, "directory updated");
        Ok(normalized)
    }

    fn read_config(&self) -> Option<String> {
        match fs::read_to_string(self.config_file.as_std_path()) {
            Ok(content) => Some(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                tracing::warn!(config = %self.config_file, error = %err, "unreadable directory config");
                None
            }
        }
    }

    fn persist_best_effort(&self, path: &Utf8Path) {
        if let Err(err) = write_bytes_atomic(&self.config_file, path.as_str().as_bytes()) {
            tracing::warn!(config = %self.config_file, error = %err, "failed to persist directory config");
        }
    }
}

pub fn normalize(path: &str, suffix: &str) -> Option<Utf8PathBuf> {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed.contains('\0') {
        return None;
    }

    let unified = trimmed.replace('\\', "/");
    let (root, rest) = split_root(&unified)?;

    let mut parts: Vec<&str> = rest
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();
    let has_suffix = parts
        .last()
        .is_some_and(|last| last.eq_ignore_ascii_case(suffix));
    if !has_suffix {
        parts.push(suffix);
    }

    let separator = std::path::MAIN_SEPARATOR_STR;
    Some(Utf8PathBuf::from(format!("{root}{}", parts.join(separator))))
}

fn split_root(path: &str) -> Option<(String, &str)> {
    if let Some(rest) = path.strip_prefix('/') {
        return Some((std::path::MAIN_SEPARATOR_STR.to_string(), rest));
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/' {
        let drive = path[..2].to_ascii_uppercase();
        return Some((format!("{drive}{}", std::path::MAIN_SEPARATOR), &path[3..]));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_appends_suffix() {
        let sep = std::path::MAIN_SEPARATOR;
        let normalized = normalize("  /home/ada/papers/ ", "data").unwrap();
        assert_eq!(normalized.as_str(), format!("{sep}home{sep}ada{sep}papers{sep}data"));
    }

    #[test]
    fn normalize_keeps_existing_suffix_case_insensitively() {
        let sep = std::path::MAIN_SEPARATOR;
        let normalized = normalize("/srv//archive/DATA///", "data").unwrap();
        assert_eq!(normalized.as_str(), format!("{sep}srv{sep}archive{sep}DATA"));
    }

    #[test]
    fn normalize_handles_backslashes_and_drives() {
        let sep = std::path::MAIN_SEPARATOR;
        let normalized = normalize(r"c:\Users\ada\.\downloads\", "downloads").unwrap();
        assert_eq!(normalized.as_str(), format!("C:{sep}Users{sep}ada{sep}downloads"));
    }

    #[test]
    fn normalize_rejects_unusable_input() {
        assert_eq!(normalize("", "data"), None);
        assert_eq!(normalize("   ", "data"), None);
        assert_eq!(normalize("relative/dir", "data"), None);
        assert_eq!(normalize("/tmp/\0bad", "data"), None);
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in ["/a/b", "/a/b/data", "/a//b/./", "/", r"D:\x\y"] {
            let once = normalize(input, "data").unwrap();
            let twice = normalize(once.as_str(), "data").unwrap();
            assert_eq!(once, twice, "input {input}");
        }
    }
}
