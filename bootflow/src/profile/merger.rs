//! Consolidates raw profile fragments into one profile.

use super::discover_fragments;
use crate::errors::{BootflowError, Result};
use crate::stages::StageCommand;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// File name of the merged profile inside the merge stage directory.
pub const MERGED_PROFILE_FILE: &str = "pgo_profile.prof";

/// What went into a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    /// Distinct fragments merged.
    pub fragment_count: usize,
    /// Combined fragment size.
    pub total_bytes: u64,
    /// SHA-256 over fragment contents in path order, hex encoded.
    pub digest: String,
}

/// A prepared merge: the invocation plus what it consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    /// Canonical, de-duplicated, sorted fragments.
    pub fragments: Vec<PathBuf>,
    /// Where the merged profile is written.
    pub output: PathBuf,
    /// The merge invocation.
    pub command: StageCommand,
    /// Fragment summary.
    pub summary: ProfileSummary,
}

/// Builds `llvm-profdata merge` invocations.
#[derive(Debug, Clone)]
pub struct ProfileMerger {
    tool: PathBuf,
    output: PathBuf,
}

impl ProfileMerger {
    /// Creates a merger using `tool` and writing to `output`.
    #[must_use]
    pub fn new(tool: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            output: output.into(),
        }
    }

    /// The merged profile location.
    #[must_use]
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Prepares a merge of an explicit fragment set.
    ///
    /// Paths naming the same file are merged once; order is by canonical path.
    ///
    /// # Errors
    ///
    /// Returns `EmptyProfileSet` for zero fragments and `Io` if a fragment
    /// cannot be resolved or read.
    pub fn plan<I, P>(&self, fragments: I) -> Result<MergePlan>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let fragments = normalize(fragments)?;
        if fragments.is_empty() {
            return Err(BootflowError::EmptyProfileSet {
                bundle: "<explicit fragment set>".to_string(),
            });
        }
        self.plan_normalized(fragments)
    }

    /// Prepares a merge of every fragment found under `bundle`.
    ///
    /// # Errors
    ///
    /// Returns `EmptyProfileSet` if the bundle holds no fragments.
    pub fn plan_bundle(&self, bundle: &Path) -> Result<MergePlan> {
        let fragments = normalize(discover_fragments(bundle))?;
        if fragments.is_empty() {
            return Err(BootflowError::EmptyProfileSet {
                bundle: bundle.display().to_string(),
            });
        }
        self.plan_normalized(fragments)
    }

    fn plan_normalized(&self, fragments: Vec<PathBuf>) -> Result<MergePlan> {
        let summary = summarize(&fragments)?;
        let command = StageCommand::new(self.tool.display().to_string())
            .arg("merge")
            .arg(format!("-output={}", self.output.display()))
            .args(fragments.iter().map(|f| f.display().to_string()));

        Ok(MergePlan {
            fragments,
            output: self.output.clone(),
            command,
            summary,
        })
    }
}

/// Canonicalises, de-duplicates and sorts fragment paths.
///
/// # Errors
///
/// Returns `Io` if a path does not exist.
pub fn normalize<I, P>(fragments: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let unique = fragments
        .into_iter()
        .map(|p| std::fs::canonicalize(p.as_ref()))
        .collect::<io::Result<BTreeSet<_>>>()?;
    Ok(unique.into_iter().collect())
}

/// Summarises an already normalized fragment list.
///
/// # Errors
///
/// Returns `Io` if a fragment cannot be read.
pub fn summarize(fragments: &[PathBuf]) -> Result<ProfileSummary> {
    let mut hasher = Sha256::new();
    let mut total_bytes = 0;
    for fragment in fragments {
        let mut file = File::open(fragment)?;
        total_bytes += io::copy(&mut file, &mut hasher)?;
    }
    Ok(ProfileSummary {
        fragment_count: fragments.len(),
        total_bytes,
        digest: hex::encode(hasher.finalize()),
    })
}
