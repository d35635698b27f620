//! Show command - displays information.

use anyhow::Result;

use fwbuild::build::BuildSession;
use fwbuild::config::Config;
use fwbuild::inventory::{default_excludes, default_types, inventory};
use fwbuild::options::encode_bool;
use fwbuild::process::ToolRunner;

use super::FirmwareOpts;

/// Show target for the show command.
pub enum ShowTarget {
    /// Show configuration
    Config,
    /// Show the resolved module graph
    Graph,
    /// Show effective option values
    Options,
    /// Show the source inventory
    Inventory {
        /// List every file, not just counts
        files: bool,
    },
}

/// Execute the show command.
pub fn cmd_show(
    config: &Config,
    opts: &FirmwareOpts,
    target: ShowTarget,
    runner: &dyn ToolRunner,
) -> Result<()> {
    match target {
        ShowTarget::Config => config.print(),
        ShowTarget::Graph => print_graph(&opts.configure(config, runner)?),
        ShowTarget::Options => print_options(&opts.configure(config, runner)?),
        ShowTarget::Inventory { files } => {
            let layout = opts.layout(config);
            let mut excludes = default_excludes(&layout.build_dir);
            excludes.extend(config.exclude.iter().cloned());
            let types = default_types();
            let inv = inventory(&[config.project_root.clone()], &excludes, &types)?;

            println!("Source inventory of {}:", config.project_root.display());
            for (tag, count) in inv.counts() {
                println!("  {:<6} {} file(s)", tag, count);
                if files {
                    for path in inv.files(tag) {
                        println!("         {}", path.display());
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_graph(session: &BuildSession) {
    let toolchain = &session.toolchain;
    println!("Firmware {} ({})", session.descriptor.name, session.descriptor.target);
    println!(
        "Toolchain: {} from {} (IPO {})",
        toolchain.profile.compiler,
        toolchain.file.display(),
        if toolchain.ipo { "on" } else { "off" }
    );
    println!();

    for (n, node) in session.graph.nodes().iter().enumerate() {
        let deps = if node.depends_on.is_empty() {
            "-".to_string()
        } else {
            node.depends_on.join(", ")
        };
        println!(
            "  {:>2}. {:<24} {:<12} sources: {:<3} depends on: {}",
            n + 1,
            node.id(),
            node.kind().as_str(),
            node.component.inputs.sources.len(),
            deps
        );
    }

    println!("\nFramework scope defines:");
    for define in session.graph.framework().inputs.defines.iter() {
        println!("  {}", define);
    }
}

fn print_options(session: &BuildSession) {
    println!("Options for {}:", session.descriptor.target);
    for (flag, value) in session.options.iter() {
        println!("  {:<32} {:<3}  {}", flag.id, encode_bool(value), flag.description);
    }
    if let Some(path) = session.state.path() {
        println!("\nCached in {}", path.display());
    }
}
