//! Profile fragment discovery and merging.

mod bundle;
mod merger;

pub use bundle::discover_fragments;
pub use merger::{normalize, summarize, MergePlan, ProfileMerger, ProfileSummary, MERGED_PROFILE_FILE};
