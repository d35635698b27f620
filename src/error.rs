//! Error types for fwbuild.
//!
//! Variants follow the failure classes of an invocation: configuration and
//! resolution errors are raised before any subprocess is spawned, subprocess
//! failures carry the exit code and captured output of the failing tool.

use std::path::PathBuf;

/// Errors that can occur while configuring or driving a firmware build.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required field of a manifest is missing or empty.
    #[error("configuration error: missing or empty field `{field}` in {}", path.display())]
    MissingField {
        /// Name of the offending field.
        field: &'static str,
        /// Manifest the field belongs to.
        path: PathBuf,
    },

    /// The binary output directory is absolute or climbs out of the project root.
    #[error("configuration error: binary_output_dir `{}` escapes the project root", dir.display())]
    OutputDirEscapesRoot {
        /// The offending directory as written in the descriptor.
        dir: PathBuf,
    },

    /// Clang was selected but no system root is known.
    #[error("configuration error: the Clang toolchain requires a sysroot (set --sysroot, --sysroot-cc or FWBUILD_SYSROOT)")]
    ClangWithoutSysroot,

    /// Any other invalid configuration value.
    #[error("configuration error: {detail}")]
    Config {
        /// Description of the problem.
        detail: String,
    },

    /// A component id referenced by the descriptor was never registered.
    #[error("resolution error: {kind} `{id}` is not registered")]
    UnknownComponent {
        /// Expected kind ("module", "architecture", "framework").
        kind: &'static str,
        /// The referenced id.
        id: String,
    },

    /// Two manifests register the same component id.
    #[error("resolution error: component `{id}` registered twice ({} and {})", first.display(), second.display())]
    DuplicateComponent {
        /// The duplicated id.
        id: String,
        /// Manifest that registered it first.
        first: PathBuf,
        /// Manifest that registered it again.
        second: PathBuf,
    },

    /// A component id resolved to a component of another kind.
    #[error("resolution error: `{id}` is a {actual}, expected a {expected}")]
    WrongKind {
        /// The referenced id.
        id: String,
        /// Kind the reference required.
        expected: &'static str,
        /// Kind the component was registered with.
        actual: &'static str,
    },

    /// An external tool exited unsuccessfully.
    #[error("{program} failed (exit code {code}){}", format_output(stdout, stderr))]
    Subprocess {
        /// Program that was run.
        program: String,
        /// Exit code, or -1 when terminated by a signal.
        code: i32,
        /// Captured stdout.
        stdout: String,
        /// Captured stderr.
        stderr: String,
    },

    /// An external tool could not be started at all.
    #[error("failed to execute `{program}`: {source}")]
    Spawn {
        /// Program that was run.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A build step finished without producing its declared artifact.
    #[error("artifact missing after {step}: {}", path.display())]
    MissingArtifact {
        /// The step that should have produced it.
        step: String,
        /// The expected artifact.
        path: PathBuf,
    },

    /// Malformed TOML manifest.
    #[error("failed to parse {}: {source}", path.display())]
    Toml {
        /// Manifest path.
        path: PathBuf,
        /// Parser diagnostic (names the missing or invalid field).
        #[source]
        source: toml::de::Error,
    },

    /// Malformed build-state file.
    #[error("failed to parse build state {}: {source}", path.display())]
    Json {
        /// State file path.
        path: PathBuf,
        /// Parser diagnostic.
        #[source]
        source: serde_json::Error,
    },

    /// I/O error on a specific path.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid glob or exclude pattern.
    #[error("invalid pattern `{pattern}`: {source}")]
    Pattern {
        /// The pattern as given.
        pattern: String,
        /// Regex compiler diagnostic.
        #[source]
        source: regex::Error,
    },
}

impl Error {
    /// Shorthand for [`Error::Config`].
    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config {
            detail: detail.into(),
        }
    }

    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors raised before any subprocess could have run.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingField { .. }
                | Self::OutputDirEscapesRoot { .. }
                | Self::ClangWithoutSysroot
                | Self::Config { .. }
                | Self::Toml { .. }
        )
    }

    /// True for component resolution failures.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Self::UnknownComponent { .. } | Self::DuplicateComponent { .. } | Self::WrongKind { .. }
        )
    }

    /// Exit code the invocation should terminate with.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Subprocess { code, .. } if *code > 0 => *code,
            _ => 1,
        }
    }
}

fn format_output(stdout: &str, stderr: &str) -> String {
    let mut out = String::new();
    for stream in [stdout.trim(), stderr.trim()] {
        if !stream.is_empty() {
            out.push_str(":\n");
            out.push_str(stream);
        }
    }
    out
}

/// Result type for fwbuild operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subprocess_error_includes_output() {
        let err = Error::Subprocess {
            program: "arm-none-eabi-gcc".into(),
            code: 1,
            stdout: String::new(),
            stderr: "mod_scmi.c:12: error: unknown type\n".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("unknown type"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_signal_exit_maps_to_one() {
        let err = Error::Subprocess {
            program: "ar".into(),
            code: -1,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.to_string(), "ar failed (exit code -1)");
    }

    #[test]
    fn test_classification() {
        assert!(Error::ClangWithoutSysroot.is_configuration());
        let unknown = Error::UnknownComponent {
            kind: "module",
            id: "sensor".into(),
        };
        assert!(unknown.is_resolution());
        assert!(!unknown.is_configuration());
        assert!(unknown.to_string().contains("`sensor`"));
    }
}
