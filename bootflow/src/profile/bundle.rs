//! Raw profile fragment discovery.

use crate::core::PROFRAW_EXTENSION;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Every `*.profraw` file under `bundle`, sorted by path.
///
/// A missing or unreadable directory yields an empty list.
#[must_use]
pub fn discover_fragments(bundle: &Path) -> Vec<PathBuf> {
    let mut fragments: Vec<PathBuf> = WalkDir::new(bundle)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext == PROFRAW_EXTENSION)
        })
        .map(walkdir::DirEntry::into_path)
        .collect();
    fragments.sort();
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_finds_nested_fragments_only() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::write(root.join("200.profraw"), b"b").unwrap();
        fs::write(root.join("nested/100.profraw"), b"a").unwrap();
        fs::write(root.join("notes.txt"), b"x").unwrap();

        let fragments = discover_fragments(root);
        assert_eq!(
            fragments,
            vec![root.join("200.profraw"), root.join("nested/100.profraw")]
        );
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(discover_fragments(&tmp.path().join("profiles")).is_empty());
    }
}
