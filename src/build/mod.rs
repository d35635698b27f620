//! Configuring and running a firmware build.
//!
//! [`configure`] turns a firmware directory and the invocation settings into
//! a [`BuildSession`]: resolved options, the selected toolchain and the
//! finalized module graph. It never spawns a process, so every configuration
//! and resolution error surfaces before the first tool runs.
//! [`configure_with_sysroot_query`] additionally asks a GCC driver for the
//! Clang sysroot, and only when the selected toolchain lacks one.
//!
//! [`executor::Executor`] then drives the toolchain over the session's graph.

pub mod compile;
pub mod context;
pub mod executor;

pub use context::BuildLayout;
pub use executor::{BuildOutcome, Executor, StepStatus};

use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use crate::component::{BuildGraph, ComponentRegistry, Define, GraphBuilder};
use crate::error::{Error, Result};
use crate::firmware::{BuildMode, FirmwareDescriptor, LogLevel};
use crate::options::{catalogue, OptionResolver, ResolvedOptions};
use crate::process::ToolRunner;
use crate::state::StateStore;
use crate::toolchain::{
    query_sysroot, IpoPolicy, ToolchainRequest, ToolchainSelection, ToolchainSelector,
};

/// Per-invocation build settings.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// Optimization profile.
    pub mode: BuildMode,
    /// Framework log level.
    pub log_level: LogLevel,
    /// Platform variant, defines `PLATFORM_VARIANT=<v>`.
    pub variant: Option<String>,
    /// Extract a flat binary after linking.
    pub binary: bool,
    /// Maximum concurrent steps.
    pub jobs: usize,
    /// Explicit option overrides by flag id.
    pub overrides: BTreeMap<String, bool>,
    /// Toolchain request. The firmware's hint is filled in by [`configure`].
    pub toolchain: ToolchainRequest,
    /// IPO policy.
    pub ipo_policy: IpoPolicy,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            mode: BuildMode::default(),
            log_level: LogLevel::Info,
            variant: None,
            binary: false,
            jobs: 1,
            overrides: BTreeMap::new(),
            toolchain: ToolchainRequest::default(),
            ipo_policy: IpoPolicy::default(),
        }
    }
}

impl BuildSettings {
    /// Defines contributed to the framework scope besides the options.
    pub fn scope_defines(&self) -> Vec<Define> {
        let mut defines = self.mode.defines();
        defines.push(self.log_level.define());
        if let Some(variant) = &self.variant {
            defines.push(Define::value("PLATFORM_VARIANT", variant));
        }
        defines
    }
}

/// Everything one build needs, resolved up front.
#[derive(Debug)]
pub struct BuildSession {
    /// Directory layout.
    pub layout: BuildLayout,
    /// Invocation settings.
    pub settings: BuildSettings,
    /// The firmware being built.
    pub descriptor: FirmwareDescriptor,
    /// Persistent build state.
    pub state: StateStore,
    /// Effective option values.
    pub options: ResolvedOptions,
    /// Active toolchain.
    pub toolchain: ToolchainSelection,
    /// Registered components.
    pub registry: ComponentRegistry,
    /// Finalized composition.
    pub graph: BuildGraph,
}

/// Resolve the configuration of the firmware in `firmware_dir`.
///
/// Order: descriptor, options, component references, toolchain, graph.
/// The state store is written back only if every step succeeded.
pub fn configure(
    layout: BuildLayout,
    firmware_dir: &Path,
    mut settings: BuildSettings,
) -> Result<BuildSession> {
    let descriptor = FirmwareDescriptor::load(firmware_dir)?;
    info!(firmware = %descriptor.name, target = %descriptor.target, "configuring");

    let state = StateStore::open(&layout.build_dir)?;

    let flags = catalogue(&descriptor.options);
    let options = OptionResolver::new(&state).resolve_all(&flags, &settings.overrides);

    let registry = ComponentRegistry::discover(&layout.project_root)?;
    GraphBuilder::new(&registry).check(&descriptor)?;

    if settings.toolchain.hint.is_none() {
        settings.toolchain.hint = descriptor.toolchain.clone();
    }
    let toolchain = ToolchainSelector::new(&descriptor.dir)
        .with_policy(settings.ipo_policy.clone())
        .select_pinned(&state, settings.toolchain.clone())?;

    let mut defines = options.defines();
    defines.extend(settings.scope_defines());
    let graph = GraphBuilder::new(&registry)
        .with_defines(defines)
        .build(&descriptor)?;
    info!(components = graph.nodes().len(), order = ?graph.order(), "module graph");

    state.save()?;

    Ok(BuildSession {
        layout,
        settings,
        descriptor,
        state,
        options,
        toolchain,
        registry,
        graph,
    })
}

/// [`configure`], taking a missing Clang sysroot from `<sysroot_cc>
/// -print-sysroot`.
///
/// The query runs only after descriptor and component references resolved
/// and the selected toolchain turned out to be Clang without a sysroot.
pub fn configure_with_sysroot_query(
    layout: BuildLayout,
    firmware_dir: &Path,
    settings: BuildSettings,
    sysroot_cc: &str,
    runner: &dyn ToolRunner,
) -> Result<BuildSession> {
    match configure(layout.clone(), firmware_dir, settings.clone()) {
        Err(Error::ClangWithoutSysroot) => {
            let sysroot = query_sysroot(runner, sysroot_cc)?.ok_or(Error::ClangWithoutSysroot)?;
            info!(cc = sysroot_cc, sysroot = %sysroot.display(), "sysroot from compiler driver");
            let mut settings = settings;
            settings.toolchain.sysroot = Some(sysroot);
            configure(layout, firmware_dir, settings)
        }
        other => other,
    }
}
