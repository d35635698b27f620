//! Build directory layout shared across all build steps.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::firmware::FirmwareDescriptor;

/// Where a build reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
    /// Project root holding the component trees.
    pub project_root: PathBuf,
    /// Build directory (state store, objects, archives).
    pub build_dir: PathBuf,
    /// Object files, one directory per component.
    pub obj_dir: PathBuf,
    /// Component archives and the merged archive.
    pub lib_dir: PathBuf,
    /// Default executable output directory.
    pub bin_dir: PathBuf,
}

impl BuildLayout {
    /// Layout rooted at `project_root`. A relative `build_dir` is taken
    /// relative to the project root.
    pub fn new(project_root: &Path, build_dir: &Path) -> Self {
        let build_dir = if build_dir.is_absolute() {
            build_dir.to_path_buf()
        } else {
            project_root.join(build_dir)
        };
        Self {
            project_root: project_root.to_path_buf(),
            obj_dir: build_dir.join("obj"),
            lib_dir: build_dir.join("lib"),
            bin_dir: build_dir.join("bin"),
            build_dir,
        }
    }

    /// Object directory of component `id`.
    pub fn object_dir(&self, id: &str) -> PathBuf {
        self.obj_dir.join(id)
    }

    /// Rebuild stamp of component `id`.
    pub fn stamp(&self, id: &str) -> PathBuf {
        self.object_dir(id).join(".inputs.hash")
    }

    /// Executable output directory of `firmware`.
    pub fn output_dir(&self, firmware: &FirmwareDescriptor) -> PathBuf {
        firmware.output_dir(&self.project_root, &self.build_dir)
    }

    /// Create the build directories and `firmware`'s output directory.
    pub fn create_dirs(&self, firmware: &FirmwareDescriptor) -> Result<()> {
        for dir in [
            &self.obj_dir,
            &self.lib_dir,
            &self.output_dir(firmware),
        ] {
            fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }
        Ok(())
    }
}
