//! Link map verification and flat-binary extraction.

use std::path::PathBuf;

use tracing::{debug, info};

use super::ExecutableHandle;
use crate::error::{Error, Result};
use crate::probe::HostTools;
use crate::process::{Cmd, ToolRunner};

/// What post-processing produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostProcessReport {
    /// The link map.
    pub map: PathBuf,
    /// The flat binary, if one was extracted.
    pub binary: Option<PathBuf>,
    /// Tool used for extraction.
    pub extractor: Option<String>,
}

/// Runs the post-link steps of a firmware executable.
pub struct PostProcessor<'a> {
    runner: &'a dyn ToolRunner,
    tools: &'a HostTools,
}

impl<'a> PostProcessor<'a> {
    /// Post-processor running tools through `runner`, choosing among `tools`.
    pub fn new(runner: &'a dyn ToolRunner, tools: &'a HostTools) -> Self {
        Self { runner, tools }
    }

    /// Extraction command for `handle`, or None if no extractor is present.
    pub fn extraction_command(&self, handle: &ExecutableHandle) -> Option<Cmd> {
        let elf = handle.elf();
        let bin = handle.binary();

        if let Some(vendor) = &handle.tools().fromelf {
            if self.tools.has(vendor) {
                return Some(
                    Cmd::new(vendor)
                        .arg("--bin")
                        .arg("--output")
                        .arg_path(&bin)
                        .arg_path(&elf),
                );
            }
        }
        let generic = &handle.tools().objcopy;
        if self.tools.has(generic) {
            return Some(
                Cmd::new(generic)
                    .arg("-O")
                    .arg("binary")
                    .arg_path(&elf)
                    .arg_path(&bin),
            );
        }
        None
    }

    /// Verify the link map and, if `flat_binary`, extract the binary image.
    ///
    /// A missing extractor skips extraction silently. A missing map after a
    /// successful link is an error, reported after extraction was attempted.
    pub fn post_process(
        &self,
        handle: &ExecutableHandle,
        flat_binary: bool,
    ) -> Result<PostProcessReport> {
        let mut report = PostProcessReport {
            map: handle.map(),
            binary: None,
            extractor: None,
        };

        if flat_binary {
            match self.extraction_command(handle) {
                Some(cmd) => {
                    info!(tool = cmd.program(), "extracting flat binary");
                    self.runner.run(&cmd)?;
                    report.extractor = Some(cmd.program().to_string());
                    report.binary = Some(handle.binary());
                }
                None => debug!(
                    candidates = ?handle.extractor_candidates(),
                    "no binary extractor on the host; skipping flat binary"
                ),
            }
        }

        if !report.map.exists() {
            return Err(Error::MissingArtifact {
                step: format!("linking {}", handle.id()),
                path: report.map,
            });
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::create_executable;
    use crate::component::{ComponentKind, ComponentRegistry, GraphBuilder};
    use crate::component::Component;
    use crate::firmware::FirmwareDescriptor;
    use crate::process::CommandResult;
    use crate::toolchain::{CompilerId, ToolchainProfile};
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Cmd>>);

    impl ToolRunner for Recorder {
        fn run(&self, cmd: &Cmd) -> Result<CommandResult> {
            self.0.lock().unwrap().push(cmd.clone());
            Ok(CommandResult::ok(""))
        }
    }

    fn handle(out: &Path, compiler: CompilerId) -> ExecutableHandle {
        let mut registry = ComponentRegistry::new();
        registry
            .register(Component::new("framework", ComponentKind::Framework, "/f"), "/f")
            .unwrap();
        registry
            .register(Component::new("armv7-m", ComponentKind::Architecture, "/a"), "/a")
            .unwrap();
        let fw = FirmwareDescriptor::parse(
            "firmware_name = \"n\"\nfirmware_target = \"juno-bl1\"\narchitecture = \"armv7-m\"\n",
            Path::new("/fw"),
            Path::new("/fw/firmware.toml"),
        )
        .unwrap();
        let graph = GraphBuilder::new(&registry).build(&fw).unwrap();
        create_executable(&graph, out, fw.binary_base_name(), &ToolchainProfile::new(compiler))
    }

    #[test]
    fn test_vendor_extractor_preferred() {
        let temp = TempDir::new().unwrap();
        let h = handle(temp.path(), CompilerId::ArmClang);
        let tools = HostTools::with_present(["fromelf", "llvm-objcopy"]);
        let runner = Recorder::default();
        let cmd = PostProcessor::new(&runner, &tools).extraction_command(&h).unwrap();
        assert_eq!(cmd.program(), "fromelf");
        assert_eq!(cmd.get_args()[0], "--bin");
    }

    #[test]
    fn test_generic_fallback() {
        let temp = TempDir::new().unwrap();
        let h = handle(temp.path(), CompilerId::ArmClang);
        let tools = HostTools::with_present(["llvm-objcopy"]);
        let runner = Recorder::default();
        let cmd = PostProcessor::new(&runner, &tools).extraction_command(&h).unwrap();
        assert_eq!(cmd.program(), "llvm-objcopy");
        assert_eq!(&cmd.get_args()[..2], &["-O".to_string(), "binary".to_string()]);
    }

    #[test]
    fn test_no_extractor_skips_silently() {
        let temp = TempDir::new().unwrap();
        let h = handle(temp.path(), CompilerId::Gnu);
        fs::write(h.map(), "").unwrap();
        let tools = HostTools::default();
        let runner = Recorder::default();

        let report = PostProcessor::new(&runner, &tools).post_process(&h, true).unwrap();
        assert_eq!(report.binary, None);
        assert!(runner.0.lock().unwrap().is_empty());
        assert!(!h.binary().exists());
    }

    #[test]
    fn test_extraction_disabled_runs_nothing() {
        let temp = TempDir::new().unwrap();
        let h = handle(temp.path(), CompilerId::Gnu);
        fs::write(h.map(), "").unwrap();
        let tools = HostTools::with_present(["arm-none-eabi-objcopy"]);
        let runner = Recorder::default();

        let report = PostProcessor::new(&runner, &tools).post_process(&h, false).unwrap();
        assert_eq!(report.extractor, None);
        assert!(runner.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_missing_map_is_error() {
        let temp = TempDir::new().unwrap();
        let h = handle(temp.path(), CompilerId::Gnu);
        let tools = HostTools::default();
        let runner = Recorder::default();
        let err = PostProcessor::new(&runner, &tools).post_process(&h, false).unwrap_err();
        assert!(matches!(err, Error::MissingArtifact { .. }));
        assert!(err.to_string().contains("juno-bl1.map"));
    }
}
