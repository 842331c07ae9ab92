//! Build configuration: flag overlays, platform policy and run settings.

mod overlay;
mod platform;
mod settings;

pub use overlay::{ConfigurationOverlay, FlagCategory, FlagEntry, OverlaySnapshot};
pub use platform::{Platform, PlatformFacts, PlatformPolicy, StdlibLinkage};
pub use settings::{
    BootflowSettings, FlagSettings, GeneratorSettings, PipelineSettings, PlatformSettings,
    TargetSpec, CONFIG_FILE_NAME,
};
