//! Matrix command - lists or runs every build of a product.

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context, Result};

use fwbuild::config::Config;
use fwbuild::matrix::Product;
use fwbuild::process::{Cmd, ToolRunner};

/// Execute the matrix command.
///
/// Without `run`, prints each combination and its command line. With `run`,
/// performs the builds one after another, writing each build's output to
/// `<build_dir>/matrix/<log file>`.
pub fn cmd_matrix(config: &Config, product: &Path, run: bool, runner: &dyn ToolRunner) -> Result<()> {
    let product = Product::load(product)?;
    let builds = product.builds();
    let root = config.build_dir.join("matrix");

    if !run {
        for build in &builds {
            println!("{}", build.tag());
            println!("  fwbuild {}", build.command(&root).join(" "));
        }
        println!("\n{} build(s)", builds.len());
        return Ok(());
    }

    fs::create_dir_all(&root).with_context(|| format!("creating {}", root.display()))?;
    let exe = std::env::current_exe().context("locating the fwbuild executable")?;
    let exe = exe.to_string_lossy();

    let mut failed = 0;
    for build in &builds {
        let start = Instant::now();
        let cmd = Cmd::new(&*exe)
            .args(build.command(&root))
            .dir(&config.project_root)
            .allow_fail();
        let result = runner.run(&cmd)?;

        let log = root.join(build.file_name());
        fs::write(&log, format!("{}\n{}", result.stdout, result.stderr))
            .with_context(|| format!("writing {}", log.display()))?;

        let status = if result.success() {
            "PASS"
        } else {
            failed += 1;
            "FAIL"
        };
        println!(
            "[{}] {} ({:.1}s, log: {})",
            status,
            build.tag(),
            start.elapsed().as_secs_f64(),
            log.display()
        );
    }

    if failed > 0 {
        bail!("{} of {} matrix build(s) failed", failed, builds.len());
    }
    println!("\nAll {} matrix build(s) passed", builds.len());
    Ok(())
}
