use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::HarvestError;

// Leaves room under the 255-byte name limit for a `-N` counter and extension.
const MAX_STEM_BYTES: usize = 200;
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

pub fn sanitize_file_name(name: &str) -> String {
    let stripped: String = name
        .chars()
        .filter(|ch| !ILLEGAL_CHARS.contains(ch) && !ch.is_control())
        .collect();
    let trimmed = stripped.trim().trim_end_matches(['.', ' ']);
    let mut end = trimmed.len().min(MAX_STEM_BYTES);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].trim_end_matches(['.', ' ']).to_string()
}

pub fn with_extension(name: &str, extension: &str) -> String {
    let suffix = format!(".{extension}");
    if name.to_ascii_lowercase().ends_with(&suffix.to_ascii_lowercase()) {
        name.to_string()
    } else {
        format!("{name}{suffix}")
    }
}

pub fn unique_path(dir: &Utf8Path, file_name: &str) -> Utf8PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.as_std_path().exists() {
        return candidate;
    }

    let (stem, extension) = match file_name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => (stem, Some(extension)),
        _ => (file_name, None),
    };
    let mut counter = 1usize;
    loop {
        let name = match extension {
            Some(extension) => format!("{stem}-{counter}.{extension}"),
            None => format!("{stem}-{counter}"),
        };
        let candidate = dir.join(name);
        if !candidate.as_std_path().exists() {
            return candidate;
        }
        counter += 1;
    }
}

pub fn ensure_dir(path: &Utf8Path) -> Result<(), HarvestError> {
    fs::create_dir_all(path.as_std_path())
        .map_err(|err| HarvestError::Persistence(format!("create {path}: {err}")))
}

/// Replaces `path` with `content` through a temp file in the same directory.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), HarvestError> {
    let parent = path
        .parent()
        .ok_or_else(|| HarvestError::Persistence(format!("invalid destination path: {path}")))?;
    ensure_dir(parent)?;
    let mut temp = tempfile::Builder::new()
        .prefix(".axh-write")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| HarvestError::Persistence(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| HarvestError::Persistence(format!("write {path}: {err}")))?;
    temp.persist(path.as_std_path())
        .map_err(|err| HarvestError::Persistence(format!("write {path}: {}", err.error)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, path)
    }

    #[test]
    fn sanitize_strips_illegal_characters() {
        assert_eq!(sanitize_file_name("a/b\\c:d*e?f\"g<h>i|j"), "abcdefghij");
        assert_eq!(sanitize_file_name("  tab\there\n "), "tabhere");
        assert_eq!(sanitize_file_name("trailing dots..."), "trailing dots");
        assert_eq!(sanitize_file_name("???"), "");
    }

    #[test]
    fn long_multibyte_names_fit_the_byte_limit() {
        let name = sanitize_file_name(&"深".repeat(200));
        assert!(name.len() <= MAX_STEM_BYTES);
        assert!(name.chars().all(|ch| ch == '深'));
        assert_eq!(name.chars().count(), MAX_STEM_BYTES / 3);

        let emoji = sanitize_file_name(&"🦀".repeat(100));
        assert!(emoji.len() <= MAX_STEM_BYTES);
        assert!(!emoji.is_empty());
    }

    #[test]
    fn long_multibyte_names_can_be_written() {
        let (_temp, dir) = temp_dir();
        let name = with_extension(&sanitize_file_name(&"深".repeat(200)), "pdf");
        let path = unique_path(&dir, &name);
        fs::write(path.as_std_path(), b"%PDF").unwrap();
        let second = unique_path(&dir, &name);
        fs::write(second.as_std_path(), b"%PDF").unwrap();
        assert!(second.as_str().ends_with("-1.pdf"));
    }

    #[test]
    fn extension_is_forced_once() {
        assert_eq!(with_extension("paper", "pdf"), "paper.pdf");
        assert_eq!(with_extension("paper.PDF", "pdf"), "paper.PDF");
    }

    #[test]
    fn unique_path_counts_up() {
        let (_temp, dir) = temp_dir();
        assert_eq!(unique_path(&dir, "paper.pdf"), dir.join("paper.pdf"));

        fs::write(dir.join("paper.pdf"), b"x").unwrap();
        assert_eq!(unique_path(&dir, "paper.pdf"), dir.join("paper-1.pdf"));
        assert_eq!(unique_path(&dir, "paper.pdf"), dir.join("paper-1.pdf"));

        fs::write(dir.join("paper-1.pdf"), b"x").unwrap();
        assert_eq!(unique_path(&dir, "paper.pdf"), dir.join("paper-2.pdf"));
    }

    #[test]
    fn atomic_write_replaces_content() {
        let (_temp, dir) = temp_dir();
        let path = dir.join("nested").join("file.json");
        write_bytes_atomic(&path, b"one").unwrap();
        write_bytes_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read_to_string(path.as_std_path()).unwrap(), "two");
    }
}
