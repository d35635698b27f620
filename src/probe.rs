//! Host tool availability probing.
//!
//! Probing is a pure PATH lookup. Results are collected once per invocation
//! into a [`HostTools`] snapshot which is passed explicitly to whatever needs
//! to decide on tool presence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Outcome of looking up one executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolProbe {
    /// Name that was looked up.
    pub name: String,
    /// Resolved location, if found.
    pub path: Option<PathBuf>,
}

impl ToolProbe {
    /// Whether the tool was found.
    pub fn found(&self) -> bool {
        self.path.is_some()
    }
}

/// Check if a program exists in PATH.
///
/// Names containing a path separator are checked as paths directly.
pub fn probe(name: &str) -> ToolProbe {
    let path = which::which(name).ok();
    debug!(tool = name, found = path.is_some(), "probed");
    ToolProbe {
        name: name.to_string(),
        path,
    }
}

/// Snapshot of tool availability for one invocation.
#[derive(Debug, Clone, Default)]
pub struct HostTools {
    tools: BTreeMap<String, Option<PathBuf>>,
}

impl HostTools {
    /// Probe each named tool once.
    pub fn probe_all<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tools = BTreeMap::new();
        for name in names {
            let name = name.as_ref();
            if !tools.contains_key(name) {
                tools.insert(name.to_string(), probe(name).path);
            }
        }
        Self { tools }
    }

    /// Snapshot from a known set of present tools (each at `/usr/bin/<name>`).
    pub fn with_present<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tools = names
            .into_iter()
            .map(|n| {
                let n = n.as_ref().to_string();
                let path = PathBuf::from("/usr/bin").join(&n);
                (n, Some(path))
            })
            .collect();
        Self { tools }
    }

    /// Record a probe result.
    pub fn insert(&mut self, probe: ToolProbe) {
        self.tools.insert(probe.name, probe.path);
    }

    /// Whether `name` was probed and found.
    pub fn has(&self, name: &str) -> bool {
        self.path(name).is_some()
    }

    /// Location of `name` if it was probed and found.
    pub fn path(&self, name: &str) -> Option<&Path> {
        self.tools.get(name).and_then(|p| p.as_deref())
    }

    /// All probe results in name order.
    pub fn iter(&self) -> impl Iterator<Item = ToolProbe> + '_ {
        self.tools.iter().map(|(name, path)| ToolProbe {
            name: name.clone(),
            path: path.clone(),
        })
    }
}
