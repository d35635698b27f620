//! Shared test utilities for fwbuild tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fwbuild::build::{configure, BuildLayout, BuildSession, BuildSettings};
use fwbuild::process::{Cmd, CommandResult, ToolRunner};
use fwbuild::Result;
use tempfile::TempDir;

/// Firmware directory of the fixture, relative to the project root.
pub const FIRMWARE: &str = "product/juno/scp_romfw";

/// A temporary project tree with a framework, an architecture, two modules
/// and one firmware using GNU by default.
pub struct TestProject {
    /// Temporary directory (kept alive for lifetime of TestProject)
    pub _temp_dir: TempDir,
    /// Project root
    pub root: PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let project = Self {
            root: temp_dir.path().to_path_buf(),
            _temp_dir: temp_dir,
        };

        project.write(
            "framework/component.toml",
            r#"
id = "framework"
kind = "framework"
sources = ["src/fwk_module.c", "src/fwk_core.c"]
include_dirs = ["include"]
defines = ["FWK_CORE"]
"#,
        );
        project.write("framework/src/fwk_module.c", "int fwk_module;\n");
        project.write("framework/src/fwk_core.c", "int fwk_core;\n");
        project.write("framework/include/fwk_module.h", "#pragma once\n");

        project.write(
            "arch/armv7-m/component.toml",
            r#"
id = "armv7-m"
kind = "architecture"
sources = ["src/arch_main.c"]
include_dirs = ["include"]
"#,
        );
        project.write("arch/armv7-m/src/arch_main.c", "int arch;\n");

        for module in ["clock", "scmi"] {
            project.write(
                &format!("module/{}/component.toml", module),
                &format!(
                    "id = \"{m}\"\nkind = \"module\"\nsources = [\"src/mod_{m}.c\"]\ninclude_dirs = [\"include\"]\n",
                    m = module
                ),
            );
            project.write(
                &format!("module/{m}/src/mod_{m}.c", m = module),
                &format!("int {};\n", module),
            );
            project.write(&format!("module/{m}/include/mod_{m}.h", m = module), "#pragma once\n");
        }

        project.write_firmware(&["scmi", "clock"], "");
        project.write(&format!("{}/config_clock.c", FIRMWARE), "int config;\n");
        project.write(
            &format!("{}/Toolchain-GNU.toml", FIRMWARE),
            "compiler = \"GNU\"\n",
        );
        project.write(
            &format!("{}/Toolchain-ArmClang.toml", FIRMWARE),
            "compiler = \"ArmClang\"\ntarget = \"arm-arm-none-eabi\"\n",
        );
        project.write(
            &format!("{}/Toolchain-Clang.toml", FIRMWARE),
            "compiler = \"Clang\"\ntarget = \"arm-arm-none-eabi\"\nsysroot = \"\"\n",
        );
        project
    }

    /// Write `content` to `rel`, creating parents.
    pub fn write(&self, rel: &str, content: &str) {
        let path = self.root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).expect("Failed to create parent dir");
        fs::write(&path, content).expect("Failed to write fixture file");
    }

    /// Rewrite the fixture's firmware.toml with `modules` and `extra` lines.
    pub fn write_firmware(&self, modules: &[&str], extra: &str) {
        let modules: Vec<String> = modules.iter().map(|m| format!("\"{}\"", m)).collect();
        self.write(
            &format!("{}/firmware.toml", FIRMWARE),
            &format!(
                "firmware_name = \"juno-scp-romfw\"\nfirmware_target = \"juno-bl1\"\narchitecture = \"armv7-m\"\ntoolchain = \"GNU\"\nsources = [\"config_clock.c\"]\nmodules = [{}]\n{}",
                modules.join(", "),
                extra
            ),
        );
    }

    pub fn firmware_dir(&self) -> PathBuf {
        self.root.join(FIRMWARE)
    }

    pub fn layout(&self) -> BuildLayout {
        BuildLayout::new(&self.root, Path::new("build"))
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join("build").join(fwbuild::state::STATE_FILE)
    }

    /// Configure the fixture firmware.
    pub fn configure(&self, settings: BuildSettings) -> Result<BuildSession> {
        configure(self.layout(), &self.firmware_dir(), settings)
    }
}

/// Runner that records commands instead of spawning them.
///
/// Output files named on a command line (`-o`, `--output`, map flags,
/// archives, objcopy destinations) are created holding the call number, so
/// later steps find them and see new content after every rerun.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Cmd>>,
    failure: Mutex<Option<(String, i32)>>,
    response: Mutex<Option<(String, String)>>,
}

impl RecordingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every command whose program contains `program` exit with `code`.
    pub fn fail_on(&self, program: &str, code: i32) {
        *self.failure.lock().unwrap() = Some((program.to_string(), code));
    }

    /// Make every command whose program contains `program` print `stdout`.
    pub fn respond(&self, program: &str, stdout: &str) {
        *self.response.lock().unwrap() = Some((program.to_string(), stdout.to_string()));
    }

    pub fn calls(&self) -> Vec<Cmd> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Recorded commands whose program contains `program`.
    pub fn calls_to(&self, program: &str) -> Vec<Cmd> {
        self.calls()
            .into_iter()
            .filter(|c| c.program().contains(program))
            .collect()
    }

    fn produce(cmd: &Cmd, seq: usize) {
        let args = cmd.get_args();
        let mut outputs: Vec<PathBuf> = Vec::new();
        for (i, arg) in args.iter().enumerate() {
            if (arg == "-o" || arg == "--output") && i + 1 < args.len() {
                outputs.push(PathBuf::from(&args[i + 1]));
            }
            for prefix in ["--output=", "-Wl,-Map=", "--list="] {
                if let Some(path) = arg.strip_prefix(prefix) {
                    outputs.push(PathBuf::from(path));
                }
            }
        }
        let program = cmd.program();
        if program.ends_with("ar") && args.first().is_some_and(|a| a.starts_with("rcs")) {
            outputs.push(PathBuf::from(&args[1]));
        }
        if program.contains("objcopy") {
            if let Some(last) = args.last() {
                outputs.push(PathBuf::from(last));
            }
        }
        for output in outputs {
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&output, format!("{}\n", seq)).unwrap();
        }
    }
}

impl ToolRunner for RecordingRunner {
    fn run(&self, cmd: &Cmd) -> Result<CommandResult> {
        let seq = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(cmd.clone());
            calls.len()
        };
        if let Some((program, code)) = self.failure.lock().unwrap().clone() {
            if cmd.program().contains(&program) {
                return cmd.check(CommandResult {
                    code,
                    stdout: String::new(),
                    stderr: format!("{}: simulated failure", cmd.program()),
                });
            }
        }
        Self::produce(cmd, seq);
        match self.response.lock().unwrap().clone() {
            Some((program, stdout)) if cmd.program().contains(&program) => {
                Ok(CommandResult::ok(stdout))
            }
            _ => Ok(CommandResult::ok("")),
        }
    }
}

/// Position of the first argument ending with `suffix`.
pub fn arg_position(cmd: &Cmd, suffix: &str) -> Option<usize> {
    cmd.get_args().iter().position(|a| a.ends_with(suffix))
}
