//! Configuration management for fwbuild.
//!
//! Reads configuration from the project's `.env` file and the process
//! environment. Environment variables take precedence over `.env`; command
//! line flags take precedence over both.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Prefix of every recognized variable.
pub const ENV_PREFIX: &str = "FWBUILD_";

/// Default build directory, relative to the project root.
pub const DEFAULT_BUILD_DIR: &str = "build";

/// fwbuild configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Project root.
    pub project_root: PathBuf,
    /// Build directory (`FWBUILD_BUILD_DIR`, default `build`).
    pub build_dir: PathBuf,
    /// Requested toolchain name (`FWBUILD_TOOLCHAIN`).
    pub toolchain: Option<String>,
    /// Sysroot override (`FWBUILD_SYSROOT`).
    pub sysroot: Option<PathBuf>,
    /// Extra inventory exclude regexes (`FWBUILD_EXCLUDE`, comma-separated).
    pub exclude: Vec<String>,
    /// Parallel steps (`FWBUILD_JOBS`, default: available parallelism).
    pub jobs: usize,
}

impl Config {
    /// Load configuration for `project_root` from `.env` and the environment.
    pub fn load(project_root: &Path) -> Result<Self> {
        let mut vars = HashMap::new();

        let env_path = project_root.join(".env");
        if env_path.exists() {
            let entries = dotenvy::from_path_iter(&env_path)
                .map_err(|e| Error::config(format!("{}: {}", env_path.display(), e)))?;
            for entry in entries {
                let (key, value) =
                    entry.map_err(|e| Error::config(format!("{}: {}", env_path.display(), e)))?;
                vars.insert(key, value);
            }
        }

        // Environment variables override .env file
        for (key, value) in std::env::vars() {
            if key.starts_with(ENV_PREFIX) {
                vars.insert(key, value);
            }
        }

        Self::from_vars(project_root, &vars)
    }

    /// Build the configuration from already collected variables.
    pub fn from_vars(project_root: &Path, vars: &HashMap<String, String>) -> Result<Self> {
        let get = |name: &str| {
            vars.get(&format!("{}{}", ENV_PREFIX, name))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let build_dir = get("BUILD_DIR")
            .map(|s| {
                let path = PathBuf::from(s);
                if path.is_absolute() {
                    path
                } else {
                    project_root.join(path)
                }
            })
            .unwrap_or_else(|| project_root.join(DEFAULT_BUILD_DIR));

        let jobs = match get("JOBS") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|&n| n > 0)
                .ok_or_else(|| Error::config(format!("FWBUILD_JOBS must be a positive number, got `{}`", raw)))?,
            None => std::thread::available_parallelism().map_or(1, |n| n.get()),
        };

        let exclude = get("EXCLUDE")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            project_root: project_root.to_path_buf(),
            build_dir,
            toolchain: get("TOOLCHAIN").map(str::to_string),
            sysroot: get("SYSROOT").map(PathBuf::from),
            exclude,
            jobs,
        })
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  PROJECT_ROOT: {}", self.project_root.display());
        println!("  FWBUILD_BUILD_DIR: {}", self.build_dir.display());
        println!(
            "  FWBUILD_TOOLCHAIN: {}",
            self.toolchain.as_deref().unwrap_or("(firmware default)")
        );
        match &self.sysroot {
            Some(s) => println!("  FWBUILD_SYSROOT: {}", s.display()),
            None => println!("  FWBUILD_SYSROOT: (none)"),
        }
        if self.exclude.is_empty() {
            println!("  FWBUILD_EXCLUDE: (none)");
        } else {
            println!("  FWBUILD_EXCLUDE: {}", self.exclude.join(", "));
        }
        println!("  FWBUILD_JOBS: {}", self.jobs);
    }
}
