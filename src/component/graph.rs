//! Module graph construction.
//!
//! Turns a firmware descriptor and the component registry into the ordered
//! composition that gets built and linked:
//!
//! ```text
//! framework → architecture → module… → firmware
//! ```
//!
//! The framework comes first in link order but its scope is resolved last:
//! it announces every selected module (`BUILD_HAS_MOD_<ID>`) and carries the
//! option, mode and log-level defines, so it can only be finished once the
//! module set is known. Its include dirs and defines are visible to every
//! other component.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::{BuildInputs, Component, ComponentKind, ComponentRegistry, Define, OrderedSet};
use crate::error::{Error, Result};
use crate::firmware::FirmwareDescriptor;

/// One component in the graph with its effective inputs.
#[derive(Debug, Clone)]
pub struct GraphNode {
    /// The registered component.
    pub component: Arc<Component>,
    /// Own sources plus every include dir and define visible to it.
    pub inputs: BuildInputs,
    /// Ids of the components that must be built first.
    pub depends_on: Vec<String>,
}

impl GraphNode {
    /// Component id.
    pub fn id(&self) -> &str {
        &self.component.id
    }

    /// Component kind.
    pub fn kind(&self) -> ComponentKind {
        self.component.kind
    }
}

/// The finalized composition of one firmware.
#[derive(Debug, Clone)]
pub struct BuildGraph {
    nodes: Vec<GraphNode>,
}

impl BuildGraph {
    /// Nodes in link order.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Component ids in link order.
    pub fn order(&self) -> Vec<&str> {
        self.nodes.iter().map(GraphNode::id).collect()
    }

    /// Node by id.
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    /// The framework node.
    pub fn framework(&self) -> &GraphNode {
        &self.nodes[0]
    }

    /// The architecture node.
    pub fn architecture(&self) -> &GraphNode {
        &self.nodes[1]
    }

    /// Module nodes in selection order.
    pub fn modules(&self) -> &[GraphNode] {
        &self.nodes[2..self.nodes.len() - 1]
    }

    /// The firmware executable node.
    pub fn firmware(&self) -> &GraphNode {
        &self.nodes[self.nodes.len() - 1]
    }

    /// Union of every node's effective inputs, in link order.
    pub fn aggregate(&self) -> BuildInputs {
        let mut all = BuildInputs::default();
        for node in &self.nodes {
            all.absorb(&node.inputs);
        }
        all
    }

    /// Archives of every archive-producing component, in build order.
    pub fn archives(&self, archive_dir: &Path) -> Vec<PathBuf> {
        self.nodes
            .iter()
            .filter_map(|n| n.component.archive_name())
            .map(|name| archive_dir.join(name))
            .collect()
    }

    /// Dependency edges as `(id, depends_on)` pairs, for scheduling.
    pub fn edges(&self) -> Vec<(String, Vec<String>)> {
        self.nodes
            .iter()
            .map(|n| (n.id().to_string(), n.depends_on.clone()))
            .collect()
    }
}

/// Framework, architecture and modules of one descriptor.
type Resolved = (Arc<Component>, Arc<Component>, Vec<Arc<Component>>);

/// Builds a [`BuildGraph`] from registered components.
pub struct GraphBuilder<'r> {
    registry: &'r ComponentRegistry,
    scope_defines: Vec<Define>,
}

impl<'r> GraphBuilder<'r> {
    /// Builder over `registry`.
    pub fn new(registry: &'r ComponentRegistry) -> Self {
        Self {
            registry,
            scope_defines: Vec::new(),
        }
    }

    /// Extra defines for the framework scope (options, mode, log level).
    pub fn with_defines(mut self, defines: impl IntoIterator<Item = Define>) -> Self {
        self.scope_defines.extend(defines);
        self
    }

    /// Resolve the composition of `descriptor`.
    ///
    /// Fails on the first unregistered or mistyped reference. Duplicate
    /// module references collapse onto their first occurrence.
    pub fn build(&self, descriptor: &FirmwareDescriptor) -> Result<BuildGraph> {
        let (framework, architecture, modules) = self.resolve(descriptor)?;
        let firmware = Arc::new(descriptor.component());

        // The framework scope is finished only now that the modules are known.
        let mut scope = BuildInputs::default();
        scope.absorb_interface(&framework.inputs);
        scope
            .defines
            .extend(modules.iter().map(|m| m.presence_define()));
        scope.defines.extend(self.scope_defines.iter().cloned());

        let framework_id = framework.id.clone();
        let arch_id = architecture.id.clone();

        let mut nodes = Vec::with_capacity(modules.len() + 3);
        nodes.push(GraphNode {
            inputs: node_inputs(&framework, &[&scope]),
            component: framework,
            depends_on: Vec::new(),
        });
        nodes.push(GraphNode {
            inputs: node_inputs(&architecture, &[&scope]),
            component: Arc::clone(&architecture),
            depends_on: vec![framework_id.clone()],
        });
        for module in &modules {
            nodes.push(GraphNode {
                inputs: node_inputs(module, &[&scope, &architecture.inputs]),
                component: Arc::clone(module),
                depends_on: vec![framework_id.clone(), arch_id.clone()],
            });
        }

        let mut visible: Vec<&BuildInputs> = vec![&scope, &architecture.inputs];
        visible.extend(modules.iter().map(|m| &m.inputs));
        let mut firmware_deps = vec![framework_id, arch_id];
        firmware_deps.extend(modules.iter().map(|m| m.id.clone()));
        nodes.push(GraphNode {
            inputs: node_inputs(&firmware, &visible),
            component: firmware,
            depends_on: firmware_deps,
        });

        let graph = BuildGraph { nodes };
        debug!(order = ?graph.order(), "module graph resolved");
        Ok(graph)
    }

    /// Check every reference of `descriptor` without building the graph.
    pub fn check(&self, descriptor: &FirmwareDescriptor) -> Result<()> {
        self.resolve(descriptor).map(|_| ())
    }

    fn resolve(&self, descriptor: &FirmwareDescriptor) -> Result<Resolved> {
        let framework = self.single_framework()?;
        let architecture = self
            .registry
            .require(&descriptor.architecture, ComponentKind::Architecture)?;

        let module_ids: OrderedSet<&str> =
            descriptor.modules.iter().map(String::as_str).collect();
        let modules = module_ids
            .iter()
            .map(|id| self.registry.require(id, ComponentKind::Module))
            .collect::<Result<Vec<_>>>()?;

        if let Some(clash) = self.registry.get(&descriptor.target) {
            return Err(Error::DuplicateComponent {
                id: descriptor.target.clone(),
                first: clash.root.clone(),
                second: descriptor.dir.clone(),
            });
        }
        Ok((framework, architecture, modules))
    }

    fn single_framework(&self) -> Result<Arc<Component>> {
        let mut frameworks = self.registry.of_kind(ComponentKind::Framework);
        let framework = frameworks.next().ok_or_else(|| Error::UnknownComponent {
            kind: "framework",
            id: "framework".into(),
        })?;
        if let Some(other) = frameworks.next() {
            return Err(Error::config(format!(
                "more than one framework registered (`{}` and `{}`)",
                framework.id, other.id
            )));
        }
        Ok(Arc::clone(framework))
    }
}

/// Own sources, then visible interfaces, then own interface.
fn node_inputs(component: &Component, visible: &[&BuildInputs]) -> BuildInputs {
    let mut inputs = BuildInputs::default();
    inputs
        .sources
        .extend(component.inputs.sources.iter().cloned());
    for scope in visible {
        inputs.absorb_interface(scope);
    }
    inputs.absorb_interface(&component.inputs);
    inputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn registry() -> ComponentRegistry {
        let mut r = ComponentRegistry::new();
        r.register(
            Component::new("framework", ComponentKind::Framework, "/p/framework")
                .source("src/fwk_module.c")
                .include_dir("include")
                .define(Define::flag("FWK_CORE")),
            "/p/framework/component.toml",
        )
        .unwrap();
        r.register(
            Component::new("armv7-m", ComponentKind::Architecture, "/p/arch/armv7-m")
                .source("src/arch_handlers.c")
                .include_dir("include"),
            "/p/arch/armv7-m/component.toml",
        )
        .unwrap();
        for id in ["clock", "scmi", "power-domain"] {
            r.register(
                Component::new(id, ComponentKind::Module, format!("/p/module/{id}"))
                    .source(format!("src/mod_{id}.c"))
                    .include_dir("include")
                    .include_dir("/p/shared/include"),
                format!("/p/module/{id}/component.toml"),
            )
            .unwrap();
        }
        r
    }

    fn descriptor(modules: &[&str]) -> FirmwareDescriptor {
        let text = format!(
            "firmware_name = \"fw\"\nfirmware_target = \"fw-bl1\"\narchitecture = \"armv7-m\"\nmodules = [{}]\nsources = [\"config_clock.c\"]\n",
            modules
                .iter()
                .map(|m| format!("\"{m}\""))
                .collect::<Vec<_>>()
                .join(", ")
        );
        FirmwareDescriptor::parse(&text, Path::new("/p/product/fw"), Path::new("/p/product/fw/firmware.toml"))
            .unwrap()
    }

    #[test]
    fn test_order_is_framework_arch_modules_firmware() {
        let registry = registry();
        let graph = GraphBuilder::new(&registry)
            .build(&descriptor(&["scmi", "clock"]))
            .unwrap();
        assert_eq!(graph.order(), vec!["framework", "armv7-m", "scmi", "clock", "fw-bl1"]);
        assert_eq!(graph.firmware().kind(), ComponentKind::Firmware);
        assert_eq!(graph.modules().len(), 2);
    }

    #[test]
    fn test_unknown_module_is_named() {
        let registry = registry();
        let err = GraphBuilder::new(&registry)
            .build(&descriptor(&["clock", "sensor"]))
            .unwrap_err();
        match err {
            Error::UnknownComponent { kind, id } => {
                assert_eq!(kind, "module");
                assert_eq!(id, "sensor");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_check_resolves_without_building() {
        let registry = registry();
        let builder = GraphBuilder::new(&registry);
        assert!(builder.check(&descriptor(&["scmi", "clock"])).is_ok());
        let err = builder.check(&descriptor(&["sensor"])).unwrap_err();
        assert!(err.is_resolution());
    }

    #[test]
    fn test_duplicate_module_reference_collapses() {
        let registry = registry();
        let graph = GraphBuilder::new(&registry)
            .build(&descriptor(&["clock", "scmi", "clock"]))
            .unwrap();
        assert_eq!(graph.order(), vec!["framework", "armv7-m", "clock", "scmi", "fw-bl1"]);
    }

    #[test]
    fn test_framework_scope_visible_everywhere() {
        let registry = registry();
        let graph = GraphBuilder::new(&registry)
            .with_defines([Define::flag("BUILD_HAS_FAST_CHANNELS")])
            .build(&descriptor(&["clock", "scmi"]))
            .unwrap();

        let fwk_include = PathBuf::from("/p/framework/include");
        for node in graph.nodes() {
            assert!(node.inputs.include_dirs.contains(&fwk_include), "{}", node.id());
            assert!(node.inputs.defines.contains(&Define::flag("FWK_CORE")));
            assert!(node.inputs.defines.contains(&Define::flag("BUILD_HAS_MOD_CLOCK")));
            assert!(node
                .inputs
                .defines
                .contains(&Define::flag("BUILD_HAS_FAST_CHANNELS")));
        }
        assert!(graph
            .framework()
            .inputs
            .defines
            .contains(&Define::flag("BUILD_HAS_MOD_SCMI")));
    }

    #[test]
    fn test_shared_include_dir_is_deduplicated() {
        let registry = registry();
        let graph = GraphBuilder::new(&registry)
            .build(&descriptor(&["clock", "scmi", "power-domain"]))
            .unwrap();
        let shared = PathBuf::from("/p/shared/include");

        let firmware = &graph.firmware().inputs.include_dirs;
        assert_eq!(firmware.iter().filter(|p| **p == shared).count(), 1);
        let all = graph.aggregate();
        assert_eq!(all.include_dirs.iter().filter(|p| **p == shared).count(), 1);
        assert_eq!(all.sources.len(), 6);
    }

    #[test]
    fn test_modules_see_architecture_but_not_each_other() {
        let registry = registry();
        let graph = GraphBuilder::new(&registry)
            .build(&descriptor(&["clock", "scmi"]))
            .unwrap();
        let clock = graph.node("clock").unwrap();
        assert!(clock
            .inputs
            .include_dirs
            .contains(&PathBuf::from("/p/arch/armv7-m/include")));
        assert!(!clock
            .inputs
            .include_dirs
            .contains(&PathBuf::from("/p/module/scmi/include")));
        assert!(graph
            .firmware()
            .inputs
            .include_dirs
            .contains(&PathBuf::from("/p/module/scmi/include")));
    }

    #[test]
    fn test_dependency_edges() {
        let registry = registry();
        let graph = GraphBuilder::new(&registry)
            .build(&descriptor(&["clock"]))
            .unwrap();
        assert!(graph.framework().depends_on.is_empty());
        assert_eq!(graph.architecture().depends_on, vec!["framework"]);
        assert_eq!(graph.node("clock").unwrap().depends_on, vec!["framework", "armv7-m"]);
        assert_eq!(graph.firmware().depends_on, vec!["framework", "armv7-m", "clock"]);
    }

    #[test]
    fn test_archives_follow_build_order() {
        let registry = registry();
        let graph = GraphBuilder::new(&registry)
            .build(&descriptor(&["scmi", "clock"]))
            .unwrap();
        let names: Vec<String> = graph
            .archives(Path::new("/b/lib"))
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["libframework.a", "libarmv7-m.a", "libscmi.a", "libclock.a"]
        );
    }

    #[test]
    fn test_missing_architecture() {
        let mut registry = ComponentRegistry::new();
        registry
            .register(Component::new("framework", ComponentKind::Framework, "/"), "/f")
            .unwrap();
        let err = GraphBuilder::new(&registry)
            .build(&descriptor(&[]))
            .unwrap_err();
        assert!(err.to_string().contains("armv7-m"));
    }

    #[test]
    fn test_missing_framework() {
        let registry = ComponentRegistry::new();
        let err = GraphBuilder::new(&registry)
            .build(&descriptor(&[]))
            .unwrap_err();
        assert!(err.is_resolution());
    }
}
