//! Post-link artifacts of the firmware executable.
//!
//! The executable is described by an [`ExecutableHandle`] before it is
//! linked; the link step takes its output paths and map flags from the
//! handle, and [`postprocess::PostProcessor`] is invoked on the same handle
//! once the link succeeded.

pub mod archive;
pub mod postprocess;

pub use archive::MergedArchive;
pub use postprocess::{PostProcessReport, PostProcessor};

use std::path::{Path, PathBuf};

use crate::component::{BuildGraph, ComponentKind};
use crate::toolchain::{CompilerId, ToolCommands, ToolchainProfile};

/// The firmware executable and the files derived from it.
///
/// Only obtainable for the firmware component of a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableHandle {
    id: String,
    dir: PathBuf,
    base_name: String,
    compiler: CompilerId,
    tools: ToolCommands,
}

/// Describe the executable of `graph`'s firmware component.
pub fn create_executable(
    graph: &BuildGraph,
    output_dir: &Path,
    base_name: &str,
    profile: &ToolchainProfile,
) -> ExecutableHandle {
    let firmware = graph.firmware();
    debug_assert_eq!(firmware.kind(), ComponentKind::Firmware);
    ExecutableHandle {
        id: firmware.id().to_string(),
        dir: output_dir.to_path_buf(),
        base_name: base_name.to_string(),
        compiler: profile.compiler,
        tools: profile.tools.clone(),
    }
}

impl ExecutableHandle {
    /// Id of the firmware component.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The linked executable, `<base>.elf`.
    pub fn elf(&self) -> PathBuf {
        self.dir.join(format!("{}.elf", self.base_name))
    }

    /// The link map, `<base>.map`.
    pub fn map(&self) -> PathBuf {
        self.dir.join(format!("{}.map", self.base_name))
    }

    /// The flat binary image, `<base>.bin`.
    pub fn binary(&self) -> PathBuf {
        self.dir.join(format!("{}.bin", self.base_name))
    }

    /// Toolchain executables.
    pub fn tools(&self) -> &ToolCommands {
        &self.tools
    }

    /// Linker arguments that make the link emit [`Self::map`].
    pub fn map_flags(&self) -> Vec<String> {
        map_flags(self.compiler, &self.map())
    }

    /// Flat-binary extractors in priority order: vendor first, then generic.
    pub fn extractor_candidates(&self) -> Vec<&str> {
        let mut candidates = Vec::new();
        if let Some(fromelf) = &self.tools.fromelf {
            candidates.push(fromelf.as_str());
        }
        candidates.push(self.tools.objcopy.as_str());
        candidates
    }
}

/// Map-file flags in the syntax of `compiler`'s linker.
pub fn map_flags(compiler: CompilerId, map: &Path) -> Vec<String> {
    if compiler.uses_vendor_linker() {
        vec!["--map".into(), format!("--list={}", map.display())]
    } else {
        vec![format!("-Wl,-Map={}", map.display())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_flag_syntax_per_family() {
        let map = Path::new("/out/juno-bl1.map");
        assert_eq!(
            map_flags(CompilerId::ArmClang, map),
            vec!["--map".to_string(), "--list=/out/juno-bl1.map".to_string()]
        );
        assert_eq!(
            map_flags(CompilerId::Gnu, map),
            vec!["-Wl,-Map=/out/juno-bl1.map".to_string()]
        );
        assert_eq!(map_flags(CompilerId::Clang, map), map_flags(CompilerId::Gnu, map));
    }
}
