//! Build command - builds a firmware target or runs a QA meta-target.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};

use fwbuild::build::{BuildSession, Executor};
use fwbuild::config::Config;
use fwbuild::firmware::FirmwareDescriptor;
use fwbuild::inventory::{default_excludes, default_types, inventory};
use fwbuild::probe::HostTools;
use fwbuild::process::ToolRunner;
use fwbuild::qa::{self, Category, QaPipeline};

use super::FirmwareOpts;

/// Firmware target `fwbuild build [TARGET]` was asked for. QA meta-targets
/// are dispatched before configuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTarget {
    /// Build and link the firmware.
    Default,
    /// Build, then regenerate `<target>-all`.
    Merged,
}

impl BuildTarget {
    /// The QA category `name` selects, if it is a QA meta-target.
    fn qa(name: Option<&str>) -> Option<Category> {
        name.and_then(Category::from_target)
    }

    /// Interpret a firmware target name against the configured session.
    pub fn for_firmware(descriptor: &FirmwareDescriptor, name: Option<&str>) -> Result<Self> {
        match name {
            None => Ok(Self::Default),
            Some(name) if name == descriptor.target => Ok(Self::Default),
            Some(name) if name == descriptor.merged_target() => Ok(Self::Merged),
            Some(name) => bail!(
                "unknown target `{}` (expected {}, {}, format, format-diff, lint or check)",
                name,
                descriptor.target,
                descriptor.merged_target()
            ),
        }
    }
}

/// Execute the build command.
pub fn cmd_build(
    config: &Config,
    opts: &FirmwareOpts,
    target: Option<&str>,
    runner: Arc<dyn ToolRunner>,
) -> Result<()> {
    let start = Instant::now();
    match BuildTarget::qa(target) {
        Some(category) => run_qa(config, opts, category, runner)?,
        None => {
            let session = opts.configure(config, &*runner)?;
            let kind = BuildTarget::for_firmware(&session.descriptor, target)?;
            build_firmware(&session, kind == BuildTarget::Merged, runner)?;
        }
    }
    println!("\nDone in {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn build_firmware(session: &BuildSession, merged: bool, runner: Arc<dyn ToolRunner>) -> Result<()> {
    let profile = &session.toolchain.profile;
    println!(
        "=== Building {} ({}, {}, {}) ===\n",
        session.descriptor.target, profile.compiler, session.settings.mode, session.settings.log_level
    );

    let tools = HostTools::probe_all(profile.tools.all());
    let executor = Executor::new(runner, tools);
    let outcome = if merged {
        let (outcome, archive) = executor.build_merged(session)?;
        println!("  Merged archive: {}", archive.display());
        outcome
    } else {
        executor.build(session)?
    };

    let rebuilt = outcome.rebuilt();
    println!(
        "  Components: {} ({} rebuilt)",
        outcome.steps.len(),
        rebuilt.len()
    );
    println!("  Executable:  {}", outcome.executable.elf().display());
    println!("  Map:         {}", outcome.post.map.display());
    match &outcome.post.binary {
        Some(bin) => println!("  Binary:      {}", bin.display()),
        None if session.settings.binary => {
            println!("  Binary:      skipped (no extractor on this host)")
        }
        None => {}
    }
    Ok(())
}

fn run_qa(
    config: &Config,
    opts: &FirmwareOpts,
    category: Category,
    runner: Arc<dyn ToolRunner>,
) -> Result<()> {
    let layout = opts.layout(config);
    let mut excludes = default_excludes(&layout.build_dir);
    excludes.extend(config.exclude.iter().cloned());
    let files = inventory(
        &[config.project_root.clone()],
        &excludes,
        &default_types(),
    )?;

    let tools = HostTools::probe_all(qa::tool_names());
    let pipeline = QaPipeline::new(&tools, &files);
    println!("=== QA: {} ===\n", category.target());

    let ran = pipeline.run(
        category.target(),
        runner,
        opts.jobs.unwrap_or(config.jobs),
    )?;
    if ran.is_empty() {
        println!("  No QA tools available for `{}`; nothing to do.", category.target());
    } else {
        for id in ran {
            println!("  ✓ {}", id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn descriptor(target: &str) -> FirmwareDescriptor {
        let text = format!(
            "firmware_name = \"fw\"\nfirmware_target = \"{}\"\narchitecture = \"armv7-m\"\n",
            target
        );
        FirmwareDescriptor::parse(&text, Path::new("/p/fw"), Path::new("/p/fw/firmware.toml"))
            .unwrap()
    }

    #[test]
    fn test_qa_targets() {
        assert_eq!(BuildTarget::qa(None), None);
        assert_eq!(BuildTarget::qa(Some("lint")), Some(Category::Lint));
        assert_eq!(BuildTarget::qa(Some("format-diff")), Some(Category::FormatDiff));
        assert_eq!(BuildTarget::qa(Some("juno-bl1-all")), None);
    }

    #[test]
    fn test_firmware_targets() {
        let juno = descriptor("juno-bl1");
        assert_eq!(BuildTarget::for_firmware(&juno, None).unwrap(), BuildTarget::Default);
        assert_eq!(
            BuildTarget::for_firmware(&juno, Some("juno-bl1")).unwrap(),
            BuildTarget::Default
        );
        assert_eq!(
            BuildTarget::for_firmware(&juno, Some("juno-bl1-all")).unwrap(),
            BuildTarget::Merged
        );
        assert!(BuildTarget::for_firmware(&juno, Some("n1sdp-all")).is_err());
        assert!(BuildTarget::for_firmware(&juno, Some("n1sdp")).is_err());
    }

    #[test]
    fn test_target_ending_in_all_builds_the_firmware() {
        let fw = descriptor("scp-all");
        assert_eq!(BuildTarget::for_firmware(&fw, Some("scp-all")).unwrap(), BuildTarget::Default);
        assert_eq!(
            BuildTarget::for_firmware(&fw, Some("scp-all-all")).unwrap(),
            BuildTarget::Merged
        );
    }
}
