//! The artifact registry shared across one pipeline run.

use crate::core::Artifact;
use crate::errors::{ArtifactConflictError, MissingArtifactError, Result};
use std::collections::HashMap;
use std::path::Path;

/// Logical name → artifact, written once per name.
///
/// Owned exclusively by the pipeline run and mutated only between stages.
#[derive(Debug, Clone, Default)]
pub struct ArtifactRegistry {
    artifacts: Vec<Artifact>,
    index: HashMap<String, usize>,
}

impl ArtifactRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an artifact.
    ///
    /// # Errors
    ///
    /// Returns `ArtifactConflict` if the logical name is already registered.
    pub fn register(&mut self, artifact: Artifact) -> Result<()> {
        if let Some(existing) = self.get(&artifact.logical_name) {
            return Err(ArtifactConflictError::new(
                &artifact.logical_name,
                &existing.producing_stage,
                &artifact.producing_stage,
            )
            .into());
        }
        self.index
            .insert(artifact.logical_name.clone(), self.artifacts.len());
        self.artifacts.push(artifact);
        Ok(())
    }

    /// Looks up an artifact.
    #[must_use]
    pub fn get(&self, logical_name: &str) -> Option<&Artifact> {
        self.index.get(logical_name).map(|&i| &self.artifacts[i])
    }

    /// Returns true if the name is registered.
    #[must_use]
    pub fn contains(&self, logical_name: &str) -> bool {
        self.index.contains_key(logical_name)
    }

    /// The registered path for a name.
    #[must_use]
    pub fn path(&self, logical_name: &str) -> Option<&Path> {
        self.get(logical_name).map(|a| a.path.as_path())
    }

    /// Resolves every name on behalf of `stage`.
    ///
    /// # Errors
    ///
    /// Returns `MissingArtifact` for the first unregistered name.
    pub fn resolve<'a, I>(&self, stage: &str, names: I) -> Result<Vec<Artifact>, MissingArtifactError>
    where
        I: IntoIterator<Item = &'a String>,
    {
        names
            .into_iter()
            .map(|name| {
                self.get(name)
                    .cloned()
                    .ok_or_else(|| MissingArtifactError::new(stage, name))
            })
            .collect()
    }

    /// Artifacts registered by one stage.
    #[must_use]
    pub fn by_stage(&self, stage: &str) -> Vec<&Artifact> {
        self.artifacts
            .iter()
            .filter(|a| a.producing_stage == stage)
            .collect()
    }

    /// All artifacts in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter()
    }

    /// Number of registered artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ArtifactKind;
    use crate::errors::BootflowError;

    fn artifact(name: &str, stage: &str) -> Artifact {
        Artifact::new(name, format!("/w/{stage}/{name}"), stage, ArtifactKind::File)
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ArtifactRegistry::new();
        registry.register(artifact("bootstrapCompiler", "bootstrap")).unwrap();

        assert!(registry.contains("bootstrapCompiler"));
        assert_eq!(
            registry.path("bootstrapCompiler"),
            Some(Path::new("/w/bootstrap/bootstrapCompiler"))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reregistration_is_an_error() {
        let mut registry = ArtifactRegistry::new();
        registry.register(artifact("mergedProfile", "profile-merge")).unwrap();

        let err = registry
            .register(artifact("mergedProfile", "final-build"))
            .unwrap_err();
        assert!(matches!(err, BootflowError::ArtifactConflict(_)));
        assert_eq!(
            registry.get("mergedProfile").unwrap().producing_stage,
            "profile-merge"
        );
    }

    #[test]
    fn test_resolve_reports_first_missing() {
        let mut registry = ArtifactRegistry::new();
        registry.register(artifact("bootstrapCompiler", "bootstrap")).unwrap();

        let names = vec!["bootstrapCompiler".to_string(), "instrumentedCompiler".to_string()];
        let err = registry.resolve("profiling-run", &names).unwrap_err();
        assert_eq!(err.artifact, "instrumentedCompiler");
        assert_eq!(err.stage, "profiling-run");

        let ok = registry.resolve("x", &names[..1]).unwrap();
        assert_eq!(ok.len(), 1);
    }

    #[test]
    fn test_by_stage_preserves_order() {
        let mut registry = ArtifactRegistry::new();
        registry.register(artifact("a", "bootstrap")).unwrap();
        registry.register(artifact("b", "instrumented")).unwrap();
        registry.register(artifact("c", "bootstrap")).unwrap();

        let names: Vec<_> = registry
            .by_stage("bootstrap")
            .into_iter()
            .map(|a| a.logical_name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }
}
