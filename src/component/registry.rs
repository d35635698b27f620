//! Component registration and manifest discovery.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use super::{Component, ComponentKind, Define};
use crate::error::{Error, Result};

/// Manifest file name declaring a component.
pub const MANIFEST: &str = "component.toml";

/// Directories under the project root searched for component manifests.
pub const COMPONENT_ROOTS: &[&str] = &["framework", "arch", "module", "product"];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ComponentManifest {
    id: String,
    kind: ComponentKind,
    #[serde(default)]
    sources: Vec<PathBuf>,
    #[serde(default)]
    include_dirs: Vec<PathBuf>,
    #[serde(default)]
    defines: Vec<Define>,
}

/// Every component known to this invocation, by id.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    components: Vec<Arc<Component>>,
    index: HashMap<String, (usize, PathBuf)>,
}

impl ComponentRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component declared at `origin`.
    ///
    /// Registering an id twice is an error.
    pub fn register(&mut self, component: Component, origin: impl Into<PathBuf>) -> Result<()> {
        let origin = origin.into();
        if let Some((_, first)) = self.index.get(&component.id) {
            return Err(Error::DuplicateComponent {
                id: component.id,
                first: first.clone(),
                second: origin,
            });
        }
        debug!(id = %component.id, kind = %component.kind, "registered component");
        self.index
            .insert(component.id.clone(), (self.components.len(), origin));
        self.components.push(Arc::new(component));
        Ok(())
    }

    /// Load and register one manifest file.
    pub fn register_manifest(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let manifest: ComponentManifest = toml::from_str(&text).map_err(|source| Error::Toml {
            path: path.to_path_buf(),
            source,
        })?;

        if manifest.id.trim().is_empty() {
            return Err(Error::MissingField {
                field: "id",
                path: path.to_path_buf(),
            });
        }
        if manifest.kind == ComponentKind::Firmware {
            return Err(Error::config(format!(
                "{}: firmware components are declared by firmware.toml, not {}",
                path.display(),
                MANIFEST
            )));
        }

        let root = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let mut component = Component::new(manifest.id, manifest.kind, root);
        for source in manifest.sources {
            component = component.source(source);
        }
        for dir in manifest.include_dirs {
            component = component.include_dir(dir);
        }
        for define in manifest.defines {
            component = component.define(define);
        }
        self.register(component, path)
    }

    /// Discover every manifest under the component roots of `project_root`.
    ///
    /// Roots that don't exist are skipped. Discovery order is file-name order
    /// within each root.
    pub fn discover(project_root: &Path) -> Result<Self> {
        let mut registry = Self::new();
        for root in COMPONENT_ROOTS {
            let dir = project_root.join(root);
            if !dir.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&dir).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    let path = e.path().unwrap_or(&dir).to_path_buf();
                    Error::io(path, e.into())
                })?;
                if entry.file_type().is_file() && entry.file_name() == MANIFEST {
                    registry.register_manifest(entry.path())?;
                }
            }
        }
        debug!(count = registry.len(), "component discovery finished");
        Ok(registry)
    }

    /// Look up a component by id.
    pub fn get(&self, id: &str) -> Option<&Arc<Component>> {
        self.index.get(id).map(|(i, _)| &self.components[*i])
    }

    /// Look up a component by id, requiring `kind`.
    pub fn require(&self, id: &str, kind: ComponentKind) -> Result<Arc<Component>> {
        let component = self.get(id).ok_or_else(|| Error::UnknownComponent {
            kind: kind.as_str(),
            id: id.to_string(),
        })?;
        if component.kind != kind {
            return Err(Error::WrongKind {
                id: id.to_string(),
                expected: kind.as_str(),
                actual: component.kind.as_str(),
            });
        }
        Ok(Arc::clone(component))
    }

    /// All components of `kind`, in registration order.
    pub fn of_kind(&self, kind: ComponentKind) -> impl Iterator<Item = &Arc<Component>> {
        self.components.iter().filter(move |c| c.kind == kind)
    }

    /// Number of registered components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_discover_reads_manifests() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "module/scmi/component.toml",
            r#"
            id = "scmi"
            kind = "module"
            sources = ["src/mod_scmi.c"]
            include_dirs = ["include"]
            defines = ["SCMI_PROTOCOL_VERSION=2"]
            "#,
        );
        write(
            temp.path(),
            "framework/component.toml",
            "id = \"framework\"\nkind = \"framework\"\n",
        );

        let registry = ComponentRegistry::discover(temp.path()).unwrap();
        assert_eq!(registry.len(), 2);
        let scmi = registry.require("scmi", ComponentKind::Module).unwrap();
        assert_eq!(
            scmi.inputs.include_dirs.as_slice(),
            &[temp.path().join("module/scmi/include")]
        );
        assert_eq!(
            scmi.inputs.defines.as_slice(),
            &[Define::value("SCMI_PROTOCOL_VERSION", "2")]
        );
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let mut registry = ComponentRegistry::new();
        registry
            .register(Component::new("clock", ComponentKind::Module, "/a"), "/a/component.toml")
            .unwrap();
        let err = registry
            .register(Component::new("clock", ComponentKind::Module, "/b"), "/b/component.toml")
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateComponent { .. }));
    }

    #[test]
    fn test_require_checks_kind() {
        let mut registry = ComponentRegistry::new();
        registry
            .register(Component::new("armv7-m", ComponentKind::Architecture, "/"), "/x")
            .unwrap();
        let err = registry.require("armv7-m", ComponentKind::Module).unwrap_err();
        assert!(matches!(err, Error::WrongKind { .. }));
        let err = registry.require("sensor", ComponentKind::Module).unwrap_err();
        assert!(err.to_string().contains("sensor"));
    }

    #[test]
    fn test_manifest_schema_error_names_field() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "module/bad/component.toml", "kind = \"module\"\n");
        let err = ComponentRegistry::discover(temp.path()).unwrap_err();
        assert!(err.to_string().contains("id"), "{err}");
    }

    #[test]
    fn test_firmware_manifest_is_rejected() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "module/fw/component.toml",
            "id = \"fw\"\nkind = \"firmware\"\n",
        );
        let err = ComponentRegistry::discover(temp.path()).unwrap_err();
        assert!(err.is_configuration());
    }
}
