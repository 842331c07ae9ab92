//! Platform policy: one branch per run, resolved from explicit facts.

use super::overlay::FlagEntry;
use crate::errors::{BootflowError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

/// A supported target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// macOS hosts.
    #[serde(alias = "darwin")]
    MacOs,
    /// Linux hosts.
    Linux,
}

impl Platform {
    /// Detects the platform of the running process.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedPlatform` on any other host.
    pub fn detect() -> Result<Self> {
        std::env::consts::OS.parse()
    }
}

impl FromStr for Platform {
    type Err = BootflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "macos" | "darwin" => Ok(Self::MacOs),
            "linux" => Ok(Self::Linux),
            other => Err(BootflowError::UnsupportedPlatform(other.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MacOs => write!(f, "macos"),
            Self::Linux => write!(f, "linux"),
        }
    }
}

/// Which C++ standard library the built toolchain links against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdlibLinkage {
    /// LLVM's libc++.
    Libcxx,
    /// GCC's libstdc++.
    Libstdcxx,
}

impl fmt::Display for StdlibLinkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Libcxx => write!(f, "libc++"),
            Self::Libstdcxx => write!(f, "libstdc++"),
        }
    }
}

/// Host facts the policy is computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformFacts {
    /// SDK root (macOS).
    #[serde(default)]
    pub sdk_path: Option<PathBuf>,
    /// Command-line tools or Xcode toolchain root (macOS).
    #[serde(default)]
    pub toolchain_path: Option<PathBuf>,
    /// The SDK lacks C++ headers such as `<atomic>` (macOS 10.15 and older).
    #[serde(default)]
    pub legacy_sdk: bool,
    /// Prefix of the GCC whose libstdc++ the bootstrap compiler uses (Linux).
    #[serde(default)]
    pub gcc_prefix: Option<PathBuf>,
    /// Major version of that GCC.
    #[serde(default)]
    pub gcc_major_version: Option<u32>,
    /// Binutils include directory for the gold plugin (Linux).
    #[serde(default)]
    pub binutils_include: Option<PathBuf>,
    /// Prefix other installed packages live under.
    #[serde(default)]
    pub package_prefix: Option<PathBuf>,
    /// Host target triple.
    #[serde(default = "default_host_triple")]
    pub host_triple: String,
    /// Host C compiler used for the first stage.
    #[serde(default = "default_host_cc")]
    pub host_cc: String,
    /// Host C++ compiler used for the first stage.
    #[serde(default = "default_host_cxx")]
    pub host_cxx: String,
    /// Oldest CPU to target on x86 hosts.
    #[serde(default)]
    pub march: Option<String>,
}

impl Default for PlatformFacts {
    fn default() -> Self {
        Self {
            sdk_path: None,
            toolchain_path: None,
            legacy_sdk: false,
            gcc_prefix: None,
            gcc_major_version: None,
            binutils_include: None,
            package_prefix: None,
            host_triple: default_host_triple(),
            host_cc: default_host_cc(),
            host_cxx: default_host_cxx(),
            march: None,
        }
    }
}

fn default_host_triple() -> String {
    "x86_64-pc-linux-gnu".into()
}
fn default_host_cc() -> String {
    "cc".into()
}
fn default_host_cxx() -> String {
    "c++".into()
}

/// The resolved, immutable policy for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformPolicy {
    platform: Platform,
    stdlib: StdlibLinkage,
    base_flags: Vec<FlagEntry>,
    final_delta: Vec<FlagEntry>,
    runtimes_args: Vec<String>,
    builtins_args: Vec<String>,
    bootstrap_delta: Vec<FlagEntry>,
    discovery: Vec<FlagEntry>,
    final_discovery: Vec<FlagEntry>,
}

impl PlatformPolicy {
    /// Resolves the policy for the running host.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedPlatform` on hosts with no branch.
    pub fn detect(facts: &PlatformFacts) -> Result<Self> {
        Ok(Self::resolve(Platform::detect()?, facts))
    }

    /// Resolves the policy for an explicit platform.
    #[must_use]
    pub fn resolve(platform: Platform, facts: &PlatformFacts) -> Self {
        let mut base_flags = Vec::new();
        if let Some(march) = &facts.march {
            base_flags.push(FlagEntry::cflag(format!("-march={march}")));
            base_flags.push(FlagEntry::cxxflag(format!("-march={march}")));
        }

        match platform {
            Platform::MacOs => Self::macos(facts, base_flags),
            Platform::Linux => Self::linux(facts, base_flags),
        }
    }

    fn macos(facts: &PlatformFacts, base_flags: Vec<FlagEntry>) -> Self {
        let mut final_delta = vec![
            FlagEntry::define("LLVM_BUILD_LLVM_C_DYLIB", "ON"),
            FlagEntry::define("LLVM_ENABLE_LIBCXX", "ON"),
        ];
        let mut bootstrap_delta = vec![FlagEntry::define("LLVM_ENABLE_LIBCXX", "ON")];
        if let Some(sdk) = &facts.sdk_path {
            let sdk = sdk.display();
            final_delta.push(FlagEntry::define("DEFAULT_SYSROOT", &sdk));
            final_delta.push(FlagEntry::define("FFI_INCLUDE_DIR", format!("{sdk}/usr/include/ffi")));
            final_delta.push(FlagEntry::define("FFI_LIBRARY_DIR", format!("{sdk}/usr/lib")));
            bootstrap_delta.push(FlagEntry::define("DEFAULT_SYSROOT", &sdk));
        }

        let mut discovery = Vec::new();
        if facts.legacy_sdk {
            match (&facts.toolchain_path, &facts.sdk_path) {
                (Some(toolchain), Some(sdk)) => {
                    let toolchain = toolchain.display();
                    discovery.push(FlagEntry::cxxflag(format!("-isystem{toolchain}/usr/include/c++/v1")));
                    discovery.push(FlagEntry::cxxflag(format!("-isystem{toolchain}/usr/include")));
                    discovery.push(FlagEntry::cxxflag(format!("-isystem{}/usr/include", sdk.display())));
                }
                _ => warn!("legacy SDK declared without toolchain and SDK paths; header discovery skipped"),
            }
        }

        Self {
            platform: Platform::MacOs,
            stdlib: StdlibLinkage::Libcxx,
            base_flags,
            final_delta,
            runtimes_args: vec!["-DCMAKE_INSTALL_RPATH=@loader_path/../lib".to_string()],
            builtins_args: Vec::new(),
            bootstrap_delta,
            discovery,
            final_discovery: Vec::new(),
        }
    }

    fn linux(facts: &PlatformFacts, mut base_flags: Vec<FlagEntry>) -> Self {
        for flag in ["-fpermissive", "-Wno-free-nonheap-object"] {
            base_flags.push(FlagEntry::cflag(flag));
            base_flags.push(FlagEntry::cxxflag(flag));
        }

        let mut final_delta = vec![
            FlagEntry::define("LLVM_ENABLE_LIBCXX", "OFF"),
            FlagEntry::define("CLANG_DEFAULT_CXX_STDLIB", StdlibLinkage::Libstdcxx),
        ];
        if let Some(incdir) = &facts.binutils_include {
            final_delta.push(FlagEntry::define("LLVM_BINUTILS_INCDIR", incdir.display()));
        }
        final_delta.push(FlagEntry::define("CMAKE_POSITION_INDEPENDENT_CODE", "ON"));

        let bootstrap_delta = vec![
            FlagEntry::define("CMAKE_C_COMPILER", &facts.host_cc),
            FlagEntry::define("CMAKE_CXX_COMPILER", &facts.host_cxx),
        ];

        let mut discovery = Vec::new();
        match (&facts.gcc_prefix, facts.gcc_major_version) {
            (Some(gcc), Some(version)) => {
                let gcc = gcc.display();
                let triple = &facts.host_triple;
                discovery.push(FlagEntry::cxxflag(format!("-isystem{gcc}/include/c++/{version}")));
                discovery.push(FlagEntry::cxxflag(format!(
                    "-isystem{gcc}/include/c++/{version}/{triple}"
                )));
                discovery.push(FlagEntry::cxxflag("-nostdinc++"));
                let libdir = format!("{gcc}/lib/gcc/{version}");
                discovery.push(FlagEntry::ldflag(format!("-L{libdir}")));
                discovery.push(FlagEntry::ldflag(format!("-Wl,-rpath,{libdir}")));
            }
            _ => warn!("no GCC prefix/version configured; libstdc++ discovery flags skipped"),
        }

        let mut final_discovery = Vec::new();
        if let Some(prefix) = &facts.package_prefix {
            let prefix = prefix.display();
            final_discovery.push(FlagEntry::cxxflag(format!("-isystem{prefix}/include")));
            final_discovery.push(FlagEntry::ldflag(format!("-L{prefix}/lib")));
            final_discovery.push(FlagEntry::ldflag(format!("-Wl,-rpath,{prefix}/lib")));
        }

        let runtimes_args = [
            "-DLLVM_ENABLE_PER_TARGET_RUNTIME_DIR=OFF",
            "-DCMAKE_POSITION_INDEPENDENT_CODE=ON",
            "-DLIBCXX_ENABLE_STATIC_ABI_LIBRARY=ON",
            "-DLIBCXX_STATICALLY_LINK_ABI_IN_SHARED_LIBRARY=OFF",
            "-DLIBCXX_STATICALLY_LINK_ABI_IN_STATIC_LIBRARY=ON",
            "-DLIBCXX_USE_COMPILER_RT=ON",
            "-DLIBCXX_HAS_ATOMIC_LIB=OFF",
            "-DLIBCXXABI_ENABLE_STATIC_UNWINDER=ON",
            "-DLIBCXXABI_STATICALLY_LINK_UNWINDER_IN_SHARED_LIBRARY=OFF",
            "-DLIBCXXABI_STATICALLY_LINK_UNWINDER_IN_STATIC_LIBRARY=ON",
            "-DLIBCXXABI_USE_COMPILER_RT=ON",
            "-DLIBCXXABI_USE_LLVM_UNWINDER=ON",
            "-DLIBUNWIND_USE_COMPILER_RT=ON",
            "-DCOMPILER_RT_USE_BUILTINS_LIBRARY=ON",
            "-DSANITIZER_CXX_ABI=libc++",
            "-DSANITIZER_TEST_CXX=libc++",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        Self {
            platform: Platform::Linux,
            stdlib: StdlibLinkage::Libstdcxx,
            base_flags,
            final_delta,
            runtimes_args,
            // i386 runtimes are not portable.
            builtins_args: vec!["-DCOMPILER_RT_DEFAULT_TARGET_ONLY=ON".to_string()],
            bootstrap_delta,
            discovery,
            final_discovery,
        }
    }

    /// The selected platform.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Preferred C++ standard-library linkage.
    #[must_use]
    pub fn stdlib(&self) -> StdlibLinkage {
        self.stdlib
    }

    /// Compiler flags applied to every stage.
    #[must_use]
    pub fn base_flags(&self) -> &[FlagEntry] {
        &self.base_flags
    }

    /// Generator arguments for the full production configuration.
    #[must_use]
    pub fn final_delta(&self) -> &[FlagEntry] {
        &self.final_delta
    }

    /// Sub-configure arguments for the runtimes build.
    #[must_use]
    pub fn runtimes_args(&self) -> &[String] {
        &self.runtimes_args
    }

    /// Sub-configure arguments for the builtins build.
    #[must_use]
    pub fn builtins_args(&self) -> &[String] {
        &self.builtins_args
    }

    /// Generator arguments for the reduced bootstrap configuration.
    #[must_use]
    pub fn bootstrap_delta(&self) -> &[FlagEntry] {
        &self.bootstrap_delta
    }

    /// Header/library discovery flags once the bootstrap compiler takes over.
    #[must_use]
    pub fn discovery(&self) -> &[FlagEntry] {
        &self.discovery
    }

    /// Additional discovery flags for the production build.
    #[must_use]
    pub fn final_discovery(&self) -> &[FlagEntry] {
        &self.final_discovery
    }
}
