//! The `<target>-all` merged archive.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use super::ExecutableHandle;
use crate::component::BuildGraph;
use crate::error::{Error, Result};
use crate::process::{Cmd, ToolRunner};

/// Every component archive of a graph, merged into one thin archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedArchive {
    output: PathBuf,
    members: Vec<PathBuf>,
}

impl MergedArchive {
    /// View over `graph`'s archives in `lib_dir`, in build order.
    pub fn from_graph(graph: &BuildGraph, lib_dir: &Path, merged_target: &str) -> Self {
        Self {
            output: lib_dir.join(format!("lib{}.a", merged_target)),
            members: graph.archives(lib_dir),
        }
    }

    /// Path of the merged archive.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Member archives in build order.
    pub fn members(&self) -> &[PathBuf] {
        &self.members
    }

    /// `<ar> rcsT <output> <members…>`.
    pub fn command(&self, ar: &str) -> Cmd {
        Cmd::new(ar)
            .arg("rcsT")
            .arg_path(&self.output)
            .arg_paths(&self.members)
    }

    /// Regenerate the archive. The firmware executable must already exist.
    pub fn merge(
        &self,
        runner: &dyn ToolRunner,
        ar: &str,
        executable: &ExecutableHandle,
    ) -> Result<PathBuf> {
        let elf = executable.elf();
        if !elf.exists() {
            return Err(Error::MissingArtifact {
                step: "merging archives".into(),
                path: elf,
            });
        }
        if let Some(missing) = self.members.iter().find(|m| !m.exists()) {
            return Err(Error::MissingArtifact {
                step: "merging archives".into(),
                path: missing.clone(),
            });
        }

        // ar appends to an existing archive; start over so removed
        // components don't linger.
        if self.output.exists() {
            fs::remove_file(&self.output).map_err(|e| Error::io(&self.output, e))?;
        }

        info!(output = %self.output.display(), members = self.members.len(), "merging archives");
        runner.run(&self.command(ar))?;
        Ok(self.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::create_executable;
    use crate::component::{Component, ComponentKind, ComponentRegistry, GraphBuilder};
    use crate::firmware::FirmwareDescriptor;
    use crate::process::CommandResult;
    use crate::toolchain::{CompilerId, ToolchainProfile};
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

    fn graph() -> (BuildGraph, FirmwareDescriptor) {
        let mut registry = ComponentRegistry::new();
        for (id, kind) in [
            ("framework", ComponentKind::Framework),
            ("armv7-m", ComponentKind::Architecture),
            ("clock", ComponentKind::Module),
            ("scmi", ComponentKind::Module),
        ] {
            registry.register(Component::new(id, kind, "/src"), "/src").unwrap();
        }
        let fw = FirmwareDescriptor::parse(
            "firmware_name = \"n\"\nfirmware_target = \"juno-bl2\"\narchitecture = \"armv7-m\"\nmodules = [\"scmi\", \"clock\"]\n",
            Path::new("/fw"),
            Path::new("/fw/firmware.toml"),
        )
        .unwrap();
        (GraphBuilder::new(&registry).build(&fw).unwrap(), fw)
    }

    #[test]
    fn test_members_in_build_order() {
        let (graph, fw) = graph();
        let merged = MergedArchive::from_graph(&graph, Path::new("/b/lib"), &fw.merged_target());
        assert_eq!(merged.output(), Path::new("/b/lib/libjuno-bl2-all.a"));
        let names: Vec<_> = merged
            .members()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["libframework.a", "libarmv7-m.a", "libscmi.a", "libclock.a"]);

        let cmd = merged.command("arm-none-eabi-ar");
        assert_eq!(cmd.get_args()[0], "rcsT");
        assert_eq!(cmd.get_args().len(), 2 + 4);
    }

    #[test]
    fn test_merge_requires_executable() {
        let temp = TempDir::new().unwrap();
        let (graph, fw) = graph();
        let handle = create_executable(
            &graph,
            temp.path(),
            fw.binary_base_name(),
            &ToolchainProfile::new(CompilerId::Gnu),
        );
        let merged = MergedArchive::from_graph(&graph, temp.path(), &fw.merged_target());
        let runner = Recorder::default();

        let err = merged.merge(&runner, "ar", &handle).unwrap_err();
        assert!(matches!(err, Error::MissingArtifact { .. }));
        assert!(runner.0.lock().unwrap().is_empty());

        fs::write(handle.elf(), "").unwrap();
        for member in merged.members() {
            fs::write(member, "!<arch>\n").unwrap();
        }
        fs::write(merged.output(), "stale").unwrap();
        merged.merge(&runner, "ar", &handle).unwrap();
        assert!(!merged.output().exists());
        assert_eq!(runner.0.lock().unwrap().len(), 1);
    }
}
