//! Settings fixtures for pipeline tests.

use crate::config::{BootflowSettings, Platform, PlatformFacts};
use std::path::Path;

/// Linux settings rooted at `work_root`, installing into `prefix`.
///
/// Uses a pinned GCC 13 toolchain and a package prefix so the platform
/// policy emits its full set of discovery flags.
#[must_use]
pub fn linux_settings(work_root: &Path, prefix: &Path) -> BootflowSettings {
    let mut settings = BootflowSettings::default();
    settings.pipeline.name = "llvm-test".into();
    settings.pipeline.source_dir = work_root.join("src");
    settings.pipeline.work_root = work_root.to_path_buf();
    settings.pipeline.prefix = prefix.to_path_buf();
    settings.platform.name = Some(Platform::Linux);
    settings.platform.facts = PlatformFacts {
        gcc_prefix: Some("/opt/gcc".into()),
        gcc_major_version: Some(13),
        package_prefix: Some("/opt/pkg".into()),
        ..PlatformFacts::default()
    };
    settings
}

/// Like [`linux_settings`] with the profile-guided path turned off.
#[must_use]
pub fn standard_settings(work_root: &Path, prefix: &Path) -> BootflowSettings {
    let mut settings = linux_settings(work_root, prefix);
    settings.pipeline.pgo = false;
    settings
}
