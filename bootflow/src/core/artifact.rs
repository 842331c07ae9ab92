//! Artifacts: named, filesystem-resident stage outputs.

use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Extension of raw profile fragments.
pub const PROFRAW_EXTENSION: &str = "profraw";

/// What shape an artifact must have on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A regular file (binary, profile).
    #[default]
    File,
    /// A directory (tool directory, install tree).
    Directory,
    /// A directory holding at least one raw profile fragment.
    ProfileBundle,
}

impl ArtifactKind {
    /// Checks whether `path` currently satisfies this kind.
    #[must_use]
    pub fn is_satisfied_by(self, path: &Path) -> bool {
        match self {
            Self::File => path.is_file(),
            Self::Directory => path.is_dir(),
            Self::ProfileBundle => {
                path.is_dir() && !crate::profile::discover_fragments(path).is_empty()
            }
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Directory => write!(f, "directory"),
            Self::ProfileBundle => write!(f, "profile_bundle"),
        }
    }
}

/// A registered artifact. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Logical name other stages refer to.
    pub logical_name: String,
    /// Absolute location on disk.
    pub path: PathBuf,
    /// Name of the stage that produced it.
    pub producing_stage: String,
    /// Shape on disk.
    pub kind: ArtifactKind,
    /// When it was registered.
    pub registered_at: Timestamp,
}

impl Artifact {
    /// Creates a new artifact record.
    #[must_use]
    pub fn new(
        logical_name: impl Into<String>,
        path: impl Into<PathBuf>,
        producing_stage: impl Into<String>,
        kind: ArtifactKind,
    ) -> Self {
        Self {
            logical_name: logical_name.into(),
            path: path.into(),
            producing_stage: producing_stage.into(),
            kind,
            registered_at: crate::utils::now_utc(),
        }
    }

    /// The path rendered for command lines.
    #[must_use]
    pub fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

/// An artifact a stage promises to produce, relative to its working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducedArtifact {
    /// Logical name to register.
    pub logical_name: String,
    /// Path relative to the stage working directory (absolute paths are kept).
    pub relative_path: PathBuf,
    /// Expected shape.
    pub kind: ArtifactKind,
}

impl ProducedArtifact {
    /// Declares a produced file.
    #[must_use]
    pub fn file(logical_name: impl Into<String>, relative_path: impl Into<PathBuf>) -> Self {
        Self::new(logical_name, relative_path, ArtifactKind::File)
    }

    /// Declares a produced directory.
    #[must_use]
    pub fn directory(logical_name: impl Into<String>, relative_path: impl Into<PathBuf>) -> Self {
        Self::new(logical_name, relative_path, ArtifactKind::Directory)
    }

    /// Declares a produced raw-profile bundle.
    #[must_use]
    pub fn profile_bundle(logical_name: impl Into<String>, relative_path: impl Into<PathBuf>) -> Self {
        Self::new(logical_name, relative_path, ArtifactKind::ProfileBundle)
    }

    /// Creates a declaration of any kind.
    #[must_use]
    pub fn new(
        logical_name: impl Into<String>,
        relative_path: impl Into<PathBuf>,
        kind: ArtifactKind,
    ) -> Self {
        Self {
            logical_name: logical_name.into(),
            relative_path: relative_path.into(),
            kind,
        }
    }

    /// Resolves the declared location against a working directory.
    #[must_use]
    pub fn resolve(&self, working_dir: &Path) -> PathBuf {
        if self.relative_path.is_absolute() {
            self.relative_path.clone()
        } else {
            working_dir.join(&self.relative_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_and_absolute() {
        let dir = Path::new("/work/stage1");
        let rel = ProducedArtifact::file("bootstrapCompiler", "bin/clang");
        assert_eq!(rel.resolve(dir), PathBuf::from("/work/stage1/bin/clang"));

        let abs = ProducedArtifact::directory("installTree", "/opt/llvm");
        assert_eq!(abs.resolve(dir), PathBuf::from("/opt/llvm"));
    }

    #[test]
    fn test_kind_satisfaction() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("clang");
        std::fs::write(&file, b"").unwrap();

        assert!(ArtifactKind::File.is_satisfied_by(&file));
        assert!(!ArtifactKind::Directory.is_satisfied_by(&file));
        assert!(ArtifactKind::Directory.is_satisfied_by(tmp.path()));
        assert!(!ArtifactKind::File.is_satisfied_by(&tmp.path().join("missing")));
    }

    #[test]
    fn test_profile_bundle_requires_fragment() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(!ArtifactKind::ProfileBundle.is_satisfied_by(tmp.path()));

        std::fs::write(tmp.path().join("notes.txt"), b"x").unwrap();
        assert!(!ArtifactKind::ProfileBundle.is_satisfied_by(tmp.path()));

        std::fs::write(tmp.path().join("1234.profraw"), b"raw").unwrap();
        assert!(ArtifactKind::ProfileBundle.is_satisfied_by(tmp.path()));
    }

    #[test]
    fn test_artifact_serialization() {
        let artifact = Artifact::new("mergedProfile", "/w/pgo.prof", "profile-merge", ArtifactKind::File);
        let json = serde_json::to_string(&artifact).unwrap();
        let back: Artifact = serde_json::from_str(&json).unwrap();
        assert_eq!(back.logical_name, "mergedProfile");
        assert_eq!(back.kind, ArtifactKind::File);
    }
}
