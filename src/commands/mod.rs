//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Build a firmware target or run a QA meta-target
//! - `clean` - Remove the build directory
//! - `show` - Display configuration, graph, options or inventory
//! - `matrix` - List or run a product build matrix
//! - `preflight` - Check host tools

pub mod build;
pub mod clean;
pub mod matrix;
pub mod preflight;
pub mod show;

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use matrix::cmd_matrix;
pub use preflight::cmd_preflight;
pub use show::cmd_show;

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};

use fwbuild::build::{
    configure, configure_with_sysroot_query, BuildLayout, BuildSession, BuildSettings,
};
use fwbuild::config::Config;
use fwbuild::firmware::{BuildMode, LogLevel};
use fwbuild::options::parse_override;
use fwbuild::process::ToolRunner;
use fwbuild::toolchain::ToolchainRequest;

/// Firmware selection and build options shared by several commands.
#[derive(Debug, Clone, Default)]
pub struct FirmwareOpts {
    /// Firmware directory holding `firmware.toml`.
    pub firmware: Option<PathBuf>,
    /// Build directory override.
    pub build_dir: Option<PathBuf>,
    /// Toolchain name (`Toolchain-<NAME>.toml`).
    pub toolchain: Option<String>,
    /// Toolchain file used verbatim.
    pub toolchain_file: Option<PathBuf>,
    /// Clang system root.
    pub sysroot: Option<PathBuf>,
    /// GCC driver to ask for a sysroot.
    pub sysroot_cc: Option<String>,
    /// Explicit IPO request; None leaves it to the policy.
    pub ipo: Option<bool>,
    /// Build mode.
    pub mode: BuildMode,
    /// Framework log level, `INFO` if unset.
    pub log_level: Option<LogLevel>,
    /// Platform variant.
    pub variant: Option<String>,
    /// `KEY=VALUE` option overrides.
    pub options: Vec<String>,
    /// Extract a flat binary after linking.
    pub binary: bool,
    /// Parallel steps, `config.jobs` if unset.
    pub jobs: Option<usize>,
}

impl FirmwareOpts {
    /// Build directory layout under `config`.
    pub fn layout(&self, config: &Config) -> BuildLayout {
        let build_dir = self.build_dir.clone().unwrap_or_else(|| config.build_dir.clone());
        BuildLayout::new(&config.project_root, &build_dir)
    }

    /// The firmware directory, relative paths taken from the project root.
    pub fn firmware_dir(&self, config: &Config) -> Result<PathBuf> {
        let dir = self
            .firmware
            .as_ref()
            .context("no firmware selected (pass --firmware <dir>)")?;
        Ok(if dir.is_absolute() {
            dir.clone()
        } else {
            config.project_root.join(dir)
        })
    }

    /// Settings for this invocation. Flags win over `config`.
    ///
    /// With `--sysroot-cc`, the configured sysroot is ignored; the driver is
    /// queried later, and only if the selected toolchain needs a sysroot.
    pub fn settings(&self, config: &Config) -> Result<BuildSettings> {
        let mut overrides = BTreeMap::new();
        for raw in &self.options {
            let (key, value) = parse_override(raw)?;
            overrides.insert(key, value);
        }

        let sysroot = match (&self.sysroot, &self.sysroot_cc) {
            (Some(sysroot), _) => Some(sysroot.clone()),
            (None, Some(_)) => None,
            (None, None) => config.sysroot.clone(),
        };

        Ok(BuildSettings {
            mode: self.mode,
            log_level: self.log_level.unwrap_or(LogLevel::Info),
            variant: self.variant.clone(),
            binary: self.binary,
            jobs: self.jobs.unwrap_or(config.jobs),
            overrides,
            toolchain: ToolchainRequest {
                hint: None,
                explicit_file: self.toolchain_file.clone(),
                requested_name: self.toolchain.clone().or_else(|| config.toolchain.clone()),
                sysroot,
                ipo: self.ipo,
            },
            ..Default::default()
        })
    }

    /// Configure the selected firmware.
    pub fn configure(&self, config: &Config, runner: &dyn ToolRunner) -> Result<BuildSession> {
        let firmware_dir = self.firmware_dir(config)?;
        let settings = self.settings(config)?;
        let layout = self.layout(config);
        let session = match &self.sysroot_cc {
            Some(cc) => configure_with_sysroot_query(layout, &firmware_dir, settings, cc, runner),
            None => configure(layout, &firmware_dir, settings),
        }
        .with_context(|| format!("configuring {}", firmware_dir.display()))?;
        Ok(session)
    }
}
