//! Toolchain selection.
//!
//! A firmware names a default toolchain; the user may request another one
//! by name or pin a toolchain file outright. Toolchain files live next to
//! the firmware descriptor as `Toolchain-<name>.toml`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::options::{encode_bool, parse_bool};
use crate::process::{Cmd, ToolRunner};
use crate::state::BuildState;

/// Build-state key of the pinned toolchain file.
pub const STATE_TOOLCHAIN_FILE: &str = "TOOLCHAIN_FILE";
/// Build-state key of the selected compiler family.
pub const STATE_TOOLCHAIN_COMPILER: &str = "TOOLCHAIN_COMPILER";
/// Build-state key of the IPO decision.
pub const STATE_TOOLCHAIN_IPO: &str = "TOOLCHAIN_IPO";

/// File name of the toolchain file for toolchain `name`.
pub fn toolchain_file_name(name: &str) -> String {
    format!("Toolchain-{}.toml", name)
}

/// Compiler family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum CompilerId {
    /// GNU Arm Embedded GCC.
    #[serde(rename = "GNU")]
    Gnu,
    /// Arm Compiler 6 (armclang / armlink / fromelf).
    ArmClang,
    /// Upstream LLVM Clang.
    Clang,
}

impl CompilerId {
    /// Name as written in toolchain files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gnu => "GNU",
            Self::ArmClang => "ArmClang",
            Self::Clang => "Clang",
        }
    }

    /// Whether the family links through a vendor linker with its own map syntax.
    pub fn uses_vendor_linker(self) -> bool {
        self == Self::ArmClang
    }
}

impl fmt::Display for CompilerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolOverrides {
    prefix: Option<String>,
    cc: Option<String>,
    ar: Option<String>,
    linker: Option<String>,
    objcopy: Option<String>,
    fromelf: Option<String>,
}

fn yes() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolchainFile {
    compiler: CompilerId,
    #[serde(default)]
    target: Option<String>,
    #[serde(default = "yes")]
    cross_compiling: bool,
    #[serde(default = "yes")]
    extensions: bool,
    #[serde(default = "yes")]
    ipo_supported: bool,
    #[serde(default)]
    sysroot: Option<PathBuf>,
    #[serde(default)]
    tools: ToolOverrides,
}

/// Executables of a toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommands {
    /// C compiler driver.
    pub cc: String,
    /// Archiver.
    pub ar: String,
    /// Linker (the compiler driver for GNU and Clang).
    pub linker: String,
    /// Generic binary-copy tool.
    pub objcopy: String,
    /// Vendor flat-binary extractor, if the family has one.
    pub fromelf: Option<String>,
}

impl ToolCommands {
    /// Default executables of `compiler`, with `prefix` applied to GNU tools.
    pub fn defaults(compiler: CompilerId, prefix: &str) -> Self {
        match compiler {
            CompilerId::Gnu => Self {
                cc: format!("{}gcc", prefix),
                ar: format!("{}ar", prefix),
                linker: format!("{}gcc", prefix),
                objcopy: format!("{}objcopy", prefix),
                fromelf: None,
            },
            CompilerId::ArmClang => Self {
                cc: "armclang".into(),
                ar: "armar".into(),
                linker: "armlink".into(),
                objcopy: "llvm-objcopy".into(),
                fromelf: Some("fromelf".into()),
            },
            CompilerId::Clang => Self {
                cc: "clang".into(),
                ar: "llvm-ar".into(),
                linker: "clang".into(),
                objcopy: "llvm-objcopy".into(),
                fromelf: None,
            },
        }
    }

    fn apply(mut self, overrides: ToolOverrides) -> Self {
        if let Some(cc) = overrides.cc {
            self.cc = cc;
        }
        if let Some(ar) = overrides.ar {
            self.ar = ar;
        }
        if let Some(linker) = overrides.linker {
            self.linker = linker;
        }
        if let Some(objcopy) = overrides.objcopy {
            self.objcopy = objcopy;
        }
        if overrides.fromelf.is_some() {
            self.fromelf = overrides.fromelf;
        }
        self
    }

    /// Every executable name, for probing.
    pub fn all(&self) -> Vec<&str> {
        let mut names = vec![
            self.cc.as_str(),
            self.ar.as_str(),
            self.linker.as_str(),
            self.objcopy.as_str(),
        ];
        if let Some(fromelf) = &self.fromelf {
            names.push(fromelf);
        }
        names.dedup();
        names
    }
}

/// The active compiler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainProfile {
    /// Compiler family.
    pub compiler: CompilerId,
    /// C language standard.
    pub standard: String,
    /// Whether compiler extensions are enabled (`gnu11` instead of `c11`).
    pub extensions: bool,
    /// Whether the host differs from the target.
    pub cross_compiling: bool,
    /// System root for Clang.
    pub sysroot: Option<PathBuf>,
    /// Target triple passed to Clang-based drivers.
    pub target: Option<String>,
    /// Whether the toolchain can do inter-procedural optimization.
    pub ipo_supported: bool,
    /// Executables.
    pub tools: ToolCommands,
}

impl ToolchainProfile {
    /// Profile with the family defaults and no sysroot.
    pub fn new(compiler: CompilerId) -> Self {
        let prefix = if compiler == CompilerId::Gnu {
            "arm-none-eabi-"
        } else {
            ""
        };
        Self {
            compiler,
            standard: "C11".into(),
            extensions: true,
            cross_compiling: true,
            sysroot: None,
            target: None,
            ipo_supported: true,
            tools: ToolCommands::defaults(compiler, prefix),
        }
    }

    /// Load a profile from a toolchain file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::config(format!(
                "toolchain file not found: {}",
                path.display()
            )));
        }
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let file: ToolchainFile = toml::from_str(&text).map_err(|source| Error::Toml {
            path: path.to_path_buf(),
            source,
        })?;

        let prefix = file.tools.prefix.clone().unwrap_or_else(|| {
            if file.compiler == CompilerId::Gnu {
                "arm-none-eabi-".into()
            } else {
                String::new()
            }
        });
        let tools = ToolCommands::defaults(file.compiler, &prefix).apply(file.tools);

        Ok(Self {
            compiler: file.compiler,
            standard: "C11".into(),
            extensions: file.extensions,
            cross_compiling: file.cross_compiling,
            sysroot: file.sysroot,
            target: file.target,
            ipo_supported: file.ipo_supported,
            tools,
        })
    }

    /// `-std=` flag for the configured standard.
    pub fn std_flag(&self) -> String {
        let base = self.standard.to_ascii_lowercase();
        if self.extensions {
            format!("-std={}", base.replacen('c', "gnu", 1))
        } else {
            format!("-std={}", base)
        }
    }
}

/// When whole-program optimization may be turned on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpoPolicy {
    /// Families whose cross-compilation IPO output is trusted.
    pub first_party: Vec<CompilerId>,
    /// Whether cross-compiling with any other family needs explicit opt-in.
    pub untested_requires_opt_in: bool,
}

impl Default for IpoPolicy {
    fn default() -> Self {
        Self {
            first_party: vec![CompilerId::Gnu, CompilerId::ArmClang],
            untested_requires_opt_in: true,
        }
    }
}

impl IpoPolicy {
    /// Decide IPO for `profile` given the user's explicit request, if any.
    pub fn decide(&self, profile: &ToolchainProfile, requested: Option<bool>) -> bool {
        if requested == Some(false) {
            return false;
        }
        if !profile.ipo_supported {
            if requested == Some(true) {
                warn!(compiler = %profile.compiler, "IPO requested but not supported by the toolchain");
            }
            return false;
        }
        let untested =
            profile.cross_compiling && !self.first_party.contains(&profile.compiler);
        if untested && self.untested_requires_opt_in {
            if requested == Some(true) {
                warn!(compiler = %profile.compiler, "enabling IPO for an untested cross-compiler");
                return true;
            }
            return false;
        }
        true
    }
}

/// Inputs to toolchain selection.
#[derive(Debug, Clone, Default)]
pub struct ToolchainRequest {
    /// Firmware-supplied default toolchain name.
    pub hint: Option<String>,
    /// Explicitly pinned toolchain file.
    pub explicit_file: Option<PathBuf>,
    /// User-requested toolchain name.
    pub requested_name: Option<String>,
    /// User-supplied sysroot, overriding the toolchain file's.
    pub sysroot: Option<PathBuf>,
    /// Explicit IPO request.
    pub ipo: Option<bool>,
}

/// Outcome of toolchain selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainSelection {
    /// Toolchain file the profile was loaded from.
    pub file: PathBuf,
    /// Active profile.
    pub profile: ToolchainProfile,
    /// Whether IPO is enabled.
    pub ipo: bool,
}

/// Picks the active toolchain for one firmware.
#[derive(Debug, Clone)]
pub struct ToolchainSelector {
    firmware_dir: PathBuf,
    policy: IpoPolicy,
}

impl ToolchainSelector {
    /// Selector resolving toolchain names against `firmware_dir`.
    pub fn new(firmware_dir: impl Into<PathBuf>) -> Self {
        Self {
            firmware_dir: firmware_dir.into(),
            policy: IpoPolicy::default(),
        }
    }

    /// Use a custom IPO policy.
    pub fn with_policy(mut self, policy: IpoPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Toolchain file for the request, without loading it.
    pub fn toolchain_file(&self, request: &ToolchainRequest) -> Result<PathBuf> {
        if let Some(file) = &request.explicit_file {
            return Ok(file.clone());
        }
        let name = request
            .requested_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(request.hint.as_deref())
            .ok_or_else(|| {
                Error::config(
                    "no toolchain: the firmware has no default and none was requested",
                )
            })?;
        Ok(self.firmware_dir.join(toolchain_file_name(name)))
    }

    /// Load and validate the toolchain for `request`.
    pub fn select(&self, request: &ToolchainRequest) -> Result<ToolchainSelection> {
        let file = self.toolchain_file(request)?;
        let mut profile = ToolchainProfile::load(&file)?;
        if let Some(sysroot) = &request.sysroot {
            profile.sysroot = Some(sysroot.clone());
        }
        self.finish(file, profile, request.ipo)
    }

    /// Validate an already-loaded profile and decide IPO.
    pub fn finish(
        &self,
        file: PathBuf,
        mut profile: ToolchainProfile,
        ipo: Option<bool>,
    ) -> Result<ToolchainSelection> {
        profile.sysroot = profile
            .sysroot
            .filter(|p| !p.as_os_str().is_empty());
        if profile.compiler == CompilerId::Clang && profile.sysroot.is_none() {
            return Err(Error::ClangWithoutSysroot);
        }
        let ipo = self.policy.decide(&profile, ipo);
        debug!(file = %file.display(), compiler = %profile.compiler, ipo, "selected toolchain");
        Ok(ToolchainSelection { file, profile, ipo })
    }

    /// Select, honoring and updating the toolchain pinned in `state`.
    ///
    /// A toolchain file pinned by a previous invocation is used verbatim
    /// unless the request pins one explicitly.
    pub fn select_pinned(
        &self,
        state: &dyn BuildState,
        mut request: ToolchainRequest,
    ) -> Result<ToolchainSelection> {
        let _guard = state.lock(STATE_TOOLCHAIN_FILE);
        if request.explicit_file.is_none() {
            request.explicit_file = state.get(STATE_TOOLCHAIN_FILE).map(PathBuf::from);
        }
        if request.ipo.is_none() {
            request.ipo = state.get(STATE_TOOLCHAIN_IPO).as_deref().and_then(parse_bool);
        }
        let selection = self.select(&request)?;
        state.set(
            STATE_TOOLCHAIN_FILE,
            &selection.file.to_string_lossy(),
        );
        state.set(STATE_TOOLCHAIN_COMPILER, selection.profile.compiler.as_str());
        if let Some(ipo) = request.ipo {
            state.set(STATE_TOOLCHAIN_IPO, encode_bool(ipo));
        }
        info!(
            toolchain = %selection.profile.compiler,
            file = %selection.file.display(),
            "toolchain selected"
        );
        Ok(selection)
    }
}

/// Ask a GCC driver for its sysroot (`<cc> -print-sysroot`).
///
/// An empty answer means the driver has none.
pub fn query_sysroot(runner: &dyn ToolRunner, cc: &str) -> Result<Option<PathBuf>> {
    let result = runner.run(&Cmd::new(cc).arg("-print-sysroot"))?;
    let sysroot = result.stdout_trimmed();
    Ok((!sysroot.is_empty()).then(|| PathBuf::from(sysroot)))
}
