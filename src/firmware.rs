//! Firmware descriptors (`firmware.toml`).

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Component as PathPart, Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::component::{Component, ComponentKind, Define};
use crate::error::{Error, Result};
use crate::options::OptionHint;

/// Descriptor file name inside a firmware directory.
pub const DESCRIPTOR: &str = "firmware.toml";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDescriptor {
    firmware_name: String,
    firmware_target: String,
    architecture: String,
    #[serde(default)]
    binary_output_dir: Option<PathBuf>,
    #[serde(default)]
    binary_name: Option<String>,
    #[serde(default)]
    toolchain: Option<String>,
    #[serde(default)]
    modules: Vec<String>,
    #[serde(default)]
    sources: Vec<PathBuf>,
    #[serde(default)]
    include_dirs: Vec<PathBuf>,
    #[serde(default)]
    defines: Vec<Define>,
    #[serde(default)]
    options: BTreeMap<String, OptionHint>,
}

/// Validated description of one firmware image.
#[derive(Debug, Clone)]
pub struct FirmwareDescriptor {
    /// Firmware name.
    pub name: String,
    /// Id of the firmware executable component.
    pub target: String,
    /// Architecture library id.
    pub architecture: String,
    /// Output directory relative to the project root, if pinned.
    pub binary_output_dir: Option<PathBuf>,
    /// Base name of the produced executable, overriding `target`.
    pub binary_name: Option<String>,
    /// Default toolchain hint.
    pub toolchain: Option<String>,
    /// Selected module ids in declaration order (duplicates allowed).
    pub modules: Vec<String>,
    /// Directory holding the descriptor.
    pub dir: PathBuf,
    /// Firmware-local sources relative to `dir`.
    pub sources: Vec<PathBuf>,
    /// Firmware-local include directories relative to `dir`.
    pub include_dirs: Vec<PathBuf>,
    /// Firmware-local defines.
    pub defines: Vec<Define>,
    /// Per-flag initial value hints.
    pub options: BTreeMap<String, OptionHint>,
}

impl FirmwareDescriptor {
    /// Load `firmware.toml` from `firmware_dir`.
    pub fn load(firmware_dir: &Path) -> Result<Self> {
        let path = firmware_dir.join(DESCRIPTOR);
        let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        Self::parse(&text, firmware_dir, &path)
    }

    /// Parse descriptor text. `dir` anchors relative paths, `origin` is used
    /// in diagnostics.
    pub fn parse(text: &str, dir: &Path, origin: &Path) -> Result<Self> {
        let raw: RawDescriptor = toml::from_str(text).map_err(|source| Error::Toml {
            path: origin.to_path_buf(),
            source,
        })?;

        let required = [
            ("firmware_name", &raw.firmware_name),
            ("firmware_target", &raw.firmware_target),
            ("architecture", &raw.architecture),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::MissingField {
                    field,
                    path: origin.to_path_buf(),
                });
            }
        }

        if let Some(out) = &raw.binary_output_dir {
            ensure_within_root(out)?;
        }

        Ok(Self {
            name: raw.firmware_name,
            target: raw.firmware_target,
            architecture: raw.architecture,
            binary_output_dir: raw.binary_output_dir,
            binary_name: raw.binary_name.filter(|n| !n.trim().is_empty()),
            toolchain: raw.toolchain.filter(|t| !t.trim().is_empty()),
            modules: raw.modules,
            dir: dir.to_path_buf(),
            sources: raw.sources,
            include_dirs: raw.include_dirs,
            defines: raw.defines,
            options: raw.options,
        })
    }

    /// Base name of the produced executable.
    pub fn binary_base_name(&self) -> &str {
        self.binary_name.as_deref().unwrap_or(&self.target)
    }

    /// Name of the merged-archive target.
    pub fn merged_target(&self) -> String {
        format!("{}-all", self.target)
    }

    /// Where binaries land: the pinned output dir under the project root,
    /// or `<build_dir>/bin`.
    pub fn output_dir(&self, project_root: &Path, build_dir: &Path) -> PathBuf {
        match &self.binary_output_dir {
            Some(dir) => project_root.join(dir),
            None => build_dir.join("bin"),
        }
    }

    /// The firmware executable component.
    pub fn component(&self) -> Component {
        let mut component = Component::new(&self.target, ComponentKind::Firmware, &self.dir);
        for source in &self.sources {
            component = component.source(source);
        }
        for dir in &self.include_dirs {
            component = component.include_dir(dir);
        }
        for define in &self.defines {
            component = component.define(define.clone());
        }
        component
    }
}

/// Reject absolute paths and paths whose `..` components climb above the root.
pub fn ensure_within_root(dir: &Path) -> Result<()> {
    let escape = || Error::OutputDirEscapesRoot {
        dir: dir.to_path_buf(),
    };
    let mut depth: usize = 0;
    for part in dir.components() {
        match part {
            PathPart::Normal(_) => depth += 1,
            PathPart::CurDir => {}
            PathPart::ParentDir => depth = depth.checked_sub(1).ok_or_else(escape)?,
            PathPart::RootDir | PathPart::Prefix(_) => return Err(escape()),
        }
    }
    Ok(())
}

/// Optimization profile of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    /// `-O0 -g`, defines `BUILD_MODE_DEBUG`.
    #[default]
    Debug,
    /// `-Os`.
    Release,
}

impl BuildMode {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    /// Compiler optimization flags.
    pub fn compile_flags(self) -> &'static [&'static str] {
        match self {
            Self::Debug => &["-O0", "-g"],
            Self::Release => &["-Os"],
        }
    }

    /// Defines contributed to the framework scope.
    pub fn defines(self) -> Vec<Define> {
        match self {
            Self::Debug => vec![Define::flag("BUILD_MODE_DEBUG")],
            Self::Release => Vec::new(),
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "release" => Ok(Self::Release),
            other => Err(Error::config(format!(
                "unknown build mode `{}` (expected debug or release)",
                other
            ))),
        }
    }
}

/// Framework log level compiled into the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Everything, including framework tracing.
    Trace,
    /// Informational messages and above.
    Info,
    /// Warnings and above.
    Warn,
    /// Errors and critical messages.
    Error,
    /// Critical messages only.
    Crit,
    /// No logging compiled in.
    Disabled,
}

impl LogLevel {
    const ALL: [LogLevel; 6] = [
        Self::Trace,
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Crit,
        Self::Disabled,
    ];

    /// Uppercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Crit => "CRIT",
            Self::Disabled => "DISABLED",
        }
    }

    /// `FWK_LOG_LEVEL=<n>`.
    pub fn define(self) -> Define {
        Define::value("FWK_LOG_LEVEL", (self as u8).to_string())
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|l| l.as_str() == upper)
            .ok_or_else(|| Error::config(format!("unknown log level `{}`", s)))
    }
}
