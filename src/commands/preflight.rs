//! Preflight command - runs preflight checks.

use anyhow::{Context, Result};

use fwbuild::config::Config;
use fwbuild::firmware::FirmwareDescriptor;
use fwbuild::preflight;
use fwbuild::probe::HostTools;
use fwbuild::process::ToolRunner;
use fwbuild::toolchain::{query_sysroot, ToolchainSelector};
use fwbuild::Error;

use super::FirmwareOpts;

/// Execute the preflight command.
///
/// With a firmware selected, its toolchain is checked as well. The
/// toolchain is selected without touching the build state.
pub fn cmd_preflight(
    config: &Config,
    opts: &FirmwareOpts,
    strict: bool,
    runner: &dyn ToolRunner,
) -> Result<()> {
    let profile = match &opts.firmware {
        Some(_) => {
            let dir = opts.firmware_dir(config)?;
            let descriptor = FirmwareDescriptor::load(&dir)?;
            let mut request = opts.settings(config)?.toolchain;
            request.hint = descriptor.toolchain.clone();
            let selector = ToolchainSelector::new(&descriptor.dir);
            let selection = match (selector.select(&request), &opts.sysroot_cc) {
                (Err(Error::ClangWithoutSysroot), Some(cc)) => {
                    request.sysroot = query_sysroot(runner, cc)?;
                    selector.select(&request)
                }
                (result, _) => result,
            }
            .context("selecting the toolchain")?;
            Some(selection.profile)
        }
        None => None,
    };

    println!("Running preflight checks...\n");
    let tools = HostTools::probe_all(preflight::tool_names(profile.as_ref()));

    if strict {
        preflight::run_preflight_or_fail(profile.as_ref(), &tools)?;
    } else {
        let report = preflight::run_preflight(profile.as_ref(), &tools);
        report.print();
        if !report.all_passed() {
            println!("Some checks failed. Use --strict to fail the build.");
        }
    }
    Ok(())
}
