//! fwbuild - firmware build orchestrator.
//!
//! Composes a firmware image from the framework, an architecture library
//! and the modules a firmware selects:
//! - resolves feature options and the toolchain (pinned in the build state)
//! - builds the module graph and drives the external toolchain over it
//! - runs formatting, lint and static-analysis tools over the tree

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use commands::FirmwareOpts;
use fwbuild::config::Config;
use fwbuild::firmware::{BuildMode, LogLevel};
use fwbuild::process::{SystemRunner, ToolRunner};

#[derive(Parser)]
#[command(name = "fwbuild")]
#[command(about = "Firmware build orchestrator")]
#[command(
    after_help = "QUICK START:\n  fwbuild preflight --firmware product/juno/scp_romfw   Check host tools\n  fwbuild build --firmware product/juno/scp_romfw       Build the firmware\n  fwbuild build check                                   Run lint and static analysis\n  fwbuild clean                                         Remove the build directory"
)]
struct Cli {
    /// Project root (default: current directory)
    #[arg(short = 'C', long, global = true)]
    project_root: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct FirmwareArgs {
    /// Firmware directory containing firmware.toml
    #[arg(short, long)]
    firmware: Option<PathBuf>,

    /// Build directory (default: FWBUILD_BUILD_DIR or build)
    #[arg(long)]
    build_dir: Option<PathBuf>,

    /// Toolchain name, selects Toolchain-<NAME>.toml in the firmware directory
    #[arg(long)]
    toolchain: Option<String>,

    /// Explicit toolchain file, used verbatim
    #[arg(long)]
    toolchain_file: Option<PathBuf>,

    /// System root for Clang
    #[arg(long)]
    sysroot: Option<PathBuf>,

    /// Take the sysroot from this GCC driver (`<cc> -print-sysroot`)
    #[arg(long)]
    sysroot_cc: Option<String>,

    /// Force inter-procedural optimization on
    #[arg(long, conflicts_with = "no_ipo")]
    ipo: bool,

    /// Force inter-procedural optimization off
    #[arg(long)]
    no_ipo: bool,

    /// Build mode: debug or release
    #[arg(long, default_value = "debug")]
    mode: BuildMode,

    /// Framework log level: TRACE, INFO, WARN, ERROR, CRIT or DISABLED
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Platform variant
    #[arg(long)]
    variant: Option<String>,

    /// Option override, e.g. ENABLE_FAST_CHANNELS=ON (repeatable)
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,

    /// Extract a flat binary image after linking
    #[arg(long)]
    binary: bool,

    /// Parallel build steps (default: FWBUILD_JOBS or CPU count)
    #[arg(short, long)]
    jobs: Option<usize>,
}

impl From<FirmwareArgs> for FirmwareOpts {
    fn from(args: FirmwareArgs) -> Self {
        let ipo = match (args.ipo, args.no_ipo) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        Self {
            firmware: args.firmware,
            build_dir: args.build_dir,
            toolchain: args.toolchain,
            toolchain_file: args.toolchain_file,
            sysroot: args.sysroot,
            sysroot_cc: args.sysroot_cc,
            ipo,
            mode: args.mode,
            log_level: args.log_level,
            variant: args.variant,
            options: args.options,
            binary: args.binary,
            jobs: args.jobs,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the firmware (default), `<target>-all`, or a QA target
    /// (format, format-diff, lint, check)
    Build {
        /// Target to build
        target: Option<String>,

        #[command(flatten)]
        firmware: FirmwareArgs,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,

        #[command(flatten)]
        firmware: FirmwareArgs,
    },

    /// List or run the build matrix of a product
    Matrix {
        /// Path to product.toml
        product: PathBuf,

        /// Run every build instead of listing them
        #[arg(long)]
        run: bool,
    },

    /// Run preflight checks (verify host tools before a build)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,

        #[command(flatten)]
        firmware: FirmwareArgs,
    },

    /// Remove the build directory (outputs, pinned toolchain, cached options)
    Clean {
        /// Build directory (default: FWBUILD_BUILD_DIR or build)
        #[arg(long)]
        build_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
    /// Show the resolved module graph
    Graph,
    /// Show effective option values
    Options,
    /// Show the typed source inventory
    Inventory {
        /// List files, not just counts
        #[arg(long)]
        files: bool,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "fwbuild=debug" } else { "fwbuild=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let project_root = match cli.project_root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let config = Config::load(&project_root)?;
    let runner: Arc<dyn ToolRunner> = Arc::new(SystemRunner);

    match cli.command {
        Commands::Build { target, firmware } => {
            commands::cmd_build(&config, &firmware.into(), target.as_deref(), runner)?;
        }

        Commands::Show { what, firmware } => {
            let show_target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
                ShowTarget::Graph => commands::show::ShowTarget::Graph,
                ShowTarget::Options => commands::show::ShowTarget::Options,
                ShowTarget::Inventory { files } => commands::show::ShowTarget::Inventory { files },
            };
            commands::cmd_show(&config, &firmware.into(), show_target, &*runner)?;
        }

        Commands::Matrix { product, run } => {
            commands::cmd_matrix(&config, &product, run, &*runner)?;
        }

        Commands::Preflight { strict, firmware } => {
            commands::cmd_preflight(&config, &firmware.into(), strict, &*runner)?;
        }

        Commands::Clean { build_dir } => {
            let opts = FirmwareOpts {
                build_dir,
                ..Default::default()
            };
            commands::cmd_clean(&config, &opts)?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<fwbuild::Error>()
                .map_or(1, fwbuild::Error::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
