//! Buildable components and their input sets.
//!
//! A firmware image is composed of four kinds of component:
//!
//! ```text
//! framework      foundational runtime, linked first, visible to everyone
//! architecture   CPU/arch support library
//! module         optional, independently developed feature
//! firmware       the executable tying everything together
//! ```
//!
//! Each [`Component`] owns its own sources, include directories and
//! defines. Components are registered once into a
//! [`ComponentRegistry`](registry::ComponentRegistry) and never mutated
//! afterwards; the graph builder only aggregates references to them.

pub mod graph;
pub mod registry;

pub use graph::{BuildGraph, GraphBuilder, GraphNode};
pub use registry::ComponentRegistry;

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::path::PathBuf;

use serde::Deserialize;

/// Kind of a component. Declaration order is link order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// Foundational runtime.
    Framework,
    /// Architecture support library.
    Architecture,
    /// Optional firmware module.
    Module,
    /// Firmware executable.
    Firmware,
}

impl ComponentKind {
    /// Lowercase name used in messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Framework => "framework",
            Self::Architecture => "architecture",
            Self::Module => "module",
            Self::Firmware => "firmware",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A preprocessor definition, `KEY` or `KEY=VALUE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Define {
    /// Macro name.
    pub key: String,
    /// Optional value.
    pub value: Option<String>,
}

impl Define {
    /// Define without a value.
    pub fn flag(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// Define with a value.
    pub fn value(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Parse `KEY` or `KEY=VALUE`.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('=') {
            Some((k, v)) => Self::value(k.trim(), v.trim()),
            None => Self::flag(raw.trim()),
        }
    }
}

impl fmt::Display for Define {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}={}", self.key, v),
            None => f.write_str(&self.key),
        }
    }
}

impl<'de> Deserialize<'de> for Define {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(Self::parse(&raw))
    }
}

/// Insertion-ordered set; duplicates collapse onto their first occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedSet<T: Eq + Hash + Clone> {
    items: Vec<T>,
    seen: HashSet<T>,
}

impl<T: Eq + Hash + Clone> Default for OrderedSet<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            seen: HashSet::new(),
        }
    }
}

impl<T: Eq + Hash + Clone> OrderedSet<T> {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `item`; returns false if it was already present.
    pub fn insert(&mut self, item: T) -> bool {
        if self.seen.contains(&item) {
            return false;
        }
        self.seen.insert(item.clone());
        self.items.push(item);
        true
    }

    /// Insert every item of `iter` in order.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.insert(item);
        }
    }

    /// Whether `item` is present.
    pub fn contains(&self, item: &T) -> bool {
        self.seen.contains(item)
    }

    /// Number of distinct items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in first-insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Items as a slice.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T: Eq + Hash + Clone> FromIterator<T> for OrderedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<'a, T: Eq + Hash + Clone> IntoIterator for &'a OrderedSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Sources, include directories and defines of one compilation scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildInputs {
    /// Source files.
    pub sources: OrderedSet<PathBuf>,
    /// Include directories.
    pub include_dirs: OrderedSet<PathBuf>,
    /// Preprocessor definitions.
    pub defines: OrderedSet<Define>,
}

impl BuildInputs {
    /// Merge include dirs and defines (not sources) of `other` into `self`.
    pub fn absorb_interface(&mut self, other: &BuildInputs) {
        self.include_dirs.extend(other.include_dirs.iter().cloned());
        self.defines.extend(other.defines.iter().cloned());
    }

    /// Merge everything of `other` into `self`.
    pub fn absorb(&mut self, other: &BuildInputs) {
        self.sources.extend(other.sources.iter().cloned());
        self.absorb_interface(other);
    }
}

/// A buildable unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Unique id.
    pub id: String,
    /// What role the component plays.
    pub kind: ComponentKind,
    /// Directory the component was declared in.
    pub root: PathBuf,
    /// Own inputs.
    pub inputs: BuildInputs,
}

impl Component {
    /// Component with no inputs rooted at `root`.
    pub fn new(id: impl Into<String>, kind: ComponentKind, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            kind,
            root: root.into(),
            inputs: BuildInputs::default(),
        }
    }

    /// Add a source file (relative paths resolve against the root).
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        let path = self.resolve(path.into());
        self.inputs.sources.insert(path);
        self
    }

    /// Add an include directory (relative paths resolve against the root).
    pub fn include_dir(mut self, path: impl Into<PathBuf>) -> Self {
        let path = self.resolve(path.into());
        self.inputs.include_dirs.insert(path);
        self
    }

    /// Add a preprocessor define.
    pub fn define(mut self, define: Define) -> Self {
        self.inputs.defines.insert(define);
        self
    }

    /// File name of the static archive the component compiles into.
    ///
    /// Firmware components link into an executable and have none.
    pub fn archive_name(&self) -> Option<String> {
        match self.kind {
            ComponentKind::Firmware => None,
            _ => Some(format!("lib{}.a", self.id)),
        }
    }

    /// Define announcing the module to the framework.
    pub fn presence_define(&self) -> Define {
        let id: String = self
            .id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        Define::flag(format!("BUILD_HAS_MOD_{}", id))
    }

    fn resolve(&self, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            path
        } else {
            self.root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_set_keeps_first_occurrence() {
        let set: OrderedSet<&str> = ["b", "a", "b", "c", "a"].into_iter().collect();
        assert_eq!(set.as_slice(), &["b", "a", "c"]);
    }

    #[test]
    fn test_define_parse_and_display() {
        assert_eq!(Define::parse("FWK_LOG_LEVEL=2").to_string(), "FWK_LOG_LEVEL=2");
        assert_eq!(Define::parse(" BUILD_HAS_DEBUGGER ").value, None);
    }

    #[test]
    fn test_component_paths_resolve_against_root() {
        let c = Component::new("scmi", ComponentKind::Module, "/proj/module/scmi")
            .source("src/mod_scmi.c")
            .include_dir("/abs/include");
        assert_eq!(
            c.inputs.sources.as_slice(),
            &[PathBuf::from("/proj/module/scmi/src/mod_scmi.c")]
        );
        assert_eq!(c.inputs.include_dirs.as_slice(), &[PathBuf::from("/abs/include")]);
    }

    #[test]
    fn test_presence_define_sanitizes_id() {
        let c = Component::new("juno-ppu", ComponentKind::Module, "/");
        assert_eq!(c.presence_define().to_string(), "BUILD_HAS_MOD_JUNO_PPU");
    }

    #[test]
    fn test_firmware_has_no_archive() {
        let fw = Component::new("juno-bl1", ComponentKind::Firmware, "/");
        assert_eq!(fw.archive_name(), None);
        let fwk = Component::new("framework", ComponentKind::Framework, "/");
        assert_eq!(fwk.archive_name().as_deref(), Some("libframework.a"));
    }

    #[test]
    fn test_kinds_sort_in_link_order() {
        let mut kinds = vec![
            ComponentKind::Firmware,
            ComponentKind::Module,
            ComponentKind::Framework,
            ComponentKind::Architecture,
        ];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                ComponentKind::Framework,
                ComponentKind::Architecture,
                ComponentKind::Module,
                ComponentKind::Firmware
            ]
        );
    }
}
