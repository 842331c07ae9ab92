//! Run-scoped state: the artifact registry and per-stage bound inputs.

mod inputs;
mod registry;

pub use inputs::StageInputs;
pub use registry::ArtifactRegistry;
