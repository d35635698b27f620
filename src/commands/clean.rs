//! Clean command - removes build artifacts.

use anyhow::Result;

use fwbuild::build::executor::clean;
use fwbuild::config::Config;

use super::FirmwareOpts;

/// Execute the clean command.
///
/// Removes the whole build directory, including the pinned toolchain and
/// cached option values.
pub fn cmd_clean(config: &Config, opts: &FirmwareOpts) -> Result<()> {
    let layout = opts.layout(config);
    if clean(&layout.build_dir)? {
        println!("Removed {}", layout.build_dir.display());
    } else {
        println!("Nothing to clean ({} does not exist)", layout.build_dir.display());
    }
    Ok(())
}
