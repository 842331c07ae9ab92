//! Bound inputs handed to a stage builder.

use crate::config::OverlaySnapshot;
use crate::core::Artifact;
use crate::errors::{MissingArtifactError, Result, UndeclaredArtifactError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Artifacts and configuration bound for one stage, right before it is built.
///
/// Only declared artifacts are visible; reading anything else is an
/// `UndeclaredArtifact` error.
#[derive(Debug, Clone)]
pub struct StageInputs {
    stage: String,
    working_dir: PathBuf,
    overlay: OverlaySnapshot,
    required: HashMap<String, Artifact>,
    optional: HashMap<String, Option<Artifact>>,
}

impl StageInputs {
    /// Creates bound inputs.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        overlay: OverlaySnapshot,
        required: Vec<Artifact>,
        optional: HashMap<String, Option<Artifact>>,
    ) -> Self {
        Self {
            stage: stage.into(),
            working_dir: working_dir.into(),
            overlay,
            required: required
                .into_iter()
                .map(|a| (a.logical_name.clone(), a))
                .collect(),
            optional,
        }
    }

    /// The stage being built.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// The stage's isolated working directory.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// The configuration snapshot for this stage.
    #[must_use]
    pub fn overlay(&self) -> &OverlaySnapshot {
        &self.overlay
    }

    /// A required artifact.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredArtifact` if the name was not declared, and
    /// `MissingArtifact` for a declared optional input that is absent.
    pub fn artifact(&self, name: &str) -> Result<&Artifact> {
        if let Some(artifact) = self.required.get(name) {
            return Ok(artifact);
        }
        match self.optional.get(name) {
            Some(Some(artifact)) => Ok(artifact),
            Some(None) => Err(MissingArtifactError::new(&self.stage, name).into()),
            None => Err(UndeclaredArtifactError::new(&self.stage, name).into()),
        }
    }

    /// A required artifact's path.
    ///
    /// # Errors
    ///
    /// See [`Self::artifact`].
    pub fn path(&self, name: &str) -> Result<&Path> {
        self.artifact(name).map(|a| a.path.as_path())
    }

    /// An optional artifact, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredArtifact` if the name was not declared optional.
    pub fn optional(&self, name: &str) -> Result<Option<&Artifact>> {
        match self.optional.get(name) {
            Some(artifact) => Ok(artifact.as_ref()),
            None => Err(UndeclaredArtifactError::new(&self.stage, name).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ArtifactKind;
    use crate::errors::BootflowError;

    fn inputs() -> StageInputs {
        let compiler = Artifact::new("bootstrapCompiler", "/w/stage1/bin/clang", "bootstrap", ArtifactKind::File);
        let mut optional = HashMap::new();
        optional.insert("mergedProfile".to_string(), None);
        StageInputs::new("final-build", "/w/build", OverlaySnapshot::default(), vec![compiler], optional)
    }

    #[test]
    fn test_required_lookup() {
        let inputs = inputs();
        assert_eq!(inputs.path("bootstrapCompiler").unwrap(), Path::new("/w/stage1/bin/clang"));
        assert_eq!(inputs.working_dir(), Path::new("/w/build"));
        assert_eq!(inputs.stage(), "final-build");
    }

    #[test]
    fn test_absent_optional() {
        let inputs = inputs();
        assert!(inputs.optional("mergedProfile").unwrap().is_none());
        assert!(matches!(
            inputs.artifact("mergedProfile"),
            Err(BootflowError::MissingArtifact(_))
        ));
    }

    #[test]
    fn test_undeclared_access() {
        let inputs = inputs();
        assert!(matches!(
            inputs.artifact("instrumentedCompiler"),
            Err(BootflowError::UndeclaredArtifact(_))
        ));
        assert!(matches!(
            inputs.optional("bootstrapCompiler"),
            Err(BootflowError::UndeclaredArtifact(_))
        ));
    }
}
