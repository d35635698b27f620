//! Drives the toolchain over a configured build.
//!
//! Every graph node becomes one step: compile its sources, then archive
//! (libraries) or link (firmware). Steps are scheduled in dependency waves.
//! A step whose input hash matches its stamp and whose artifact exists is
//! skipped.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::compile::{archive_cmd, compile_cmd, link_cmd, object_path};
use super::BuildSession;
use crate::artifact::{
    create_executable, ExecutableHandle, MergedArchive, PostProcessReport, PostProcessor,
};
use crate::cache;
use crate::component::GraphNode;
use crate::error::{Error, Result};
use crate::probe::HostTools;
use crate::process::{Cmd, ToolRunner};
use crate::schedule;

/// What happened to one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Commands ran.
    Built,
    /// Inputs unchanged; nothing ran.
    Fresh,
}

/// Result of a successful build.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// The linked executable.
    pub executable: ExecutableHandle,
    /// Step status per component, in completion order.
    pub steps: Vec<(String, StepStatus)>,
    /// Post-link artifacts.
    pub post: PostProcessReport,
}

impl BuildOutcome {
    /// Ids of the components that were rebuilt.
    pub fn rebuilt(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|(_, s)| *s == StepStatus::Built)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

/// Commands of one graph node.
#[derive(Debug, Clone)]
struct Step {
    id: String,
    object_dir: PathBuf,
    compiles: Vec<(Cmd, PathBuf)>,
    finish: Cmd,
    artifact: PathBuf,
    /// Files written alongside the artifact, required for freshness too.
    side_outputs: Vec<PathBuf>,
    stamp: PathBuf,
    inputs: Vec<PathBuf>,
}

impl Step {
    fn fingerprint(&self) -> Vec<String> {
        self.compiles
            .iter()
            .map(|(cmd, _)| cmd.to_string())
            .chain(std::iter::once(self.finish.to_string()))
            .collect()
    }

    fn run(&self, runner: &dyn ToolRunner) -> Result<StepStatus> {
        let hash = cache::hash_inputs(self.inputs.iter().map(PathBuf::as_path), &self.fingerprint());
        let complete = self.side_outputs.iter().all(|p| p.exists());
        if complete && cache::is_fresh(hash.as_deref(), &self.stamp, &self.artifact) {
            debug!(component = %self.id, "up to date");
            return Ok(StepStatus::Fresh);
        }

        info!(component = %self.id, sources = self.compiles.len(), "building");
        fs::create_dir_all(&self.object_dir).map_err(|e| Error::io(&self.object_dir, e))?;
        for (cmd, object) in &self.compiles {
            if let Some(parent) = object.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
            runner.run(cmd)?;
        }
        // ar only ever adds members; a stale archive would keep removed objects.
        if self.artifact.exists() {
            fs::remove_file(&self.artifact).map_err(|e| Error::io(&self.artifact, e))?;
        }
        runner.run(&self.finish)?;

        if let Some(hash) = hash {
            cache::write_stamp(&self.stamp, &hash)?;
        }
        Ok(StepStatus::Built)
    }
}

/// Runs builds through a [`ToolRunner`].
pub struct Executor {
    runner: Arc<dyn ToolRunner>,
    tools: HostTools,
}

impl Executor {
    /// Executor spawning through `runner`; `tools` decides which optional
    /// post-processing tools are used.
    pub fn new(runner: Arc<dyn ToolRunner>, tools: HostTools) -> Self {
        Self { runner, tools }
    }

    /// The executable `session` produces, without building it.
    pub fn executable(&self, session: &BuildSession) -> ExecutableHandle {
        create_executable(
            &session.graph,
            &session.layout.output_dir(&session.descriptor),
            session.descriptor.binary_base_name(),
            &session.toolchain.profile,
        )
    }

    /// Every step of `session`, keyed by component id.
    fn plan(&self, session: &BuildSession, executable: &ExecutableHandle) -> HashMap<String, Step> {
        let layout = &session.layout;
        let archives = session.graph.archives(&layout.lib_dir);
        session
            .graph
            .nodes()
            .iter()
            .map(|node| {
                let step = self.step(session, node, executable, &archives);
                (step.id.clone(), step)
            })
            .collect()
    }

    fn step(
        &self,
        session: &BuildSession,
        node: &GraphNode,
        executable: &ExecutableHandle,
        archives: &[PathBuf],
    ) -> Step {
        let layout = &session.layout;
        let toolchain = &session.toolchain;
        let object_dir = layout.object_dir(node.id());

        let compiles: Vec<(Cmd, PathBuf)> = node
            .component
            .inputs
            .sources
            .iter()
            .map(|source| {
                let object = object_path(&object_dir, &node.component, source);
                let cmd = compile_cmd(toolchain, session.settings.mode, &node.inputs, source, &object);
                (cmd, object)
            })
            .collect();
        let objects: Vec<PathBuf> = compiles.iter().map(|(_, o)| o.clone()).collect();

        let mut inputs: Vec<PathBuf> = node.component.inputs.sources.iter().cloned().collect();
        inputs.extend(cache::files_under(node.component.inputs.include_dirs.iter()));

        let (finish, artifact, side_outputs) = match node.component.archive_name() {
            Some(name) => {
                let archive = layout.lib_dir.join(name);
                (archive_cmd(&toolchain.profile.tools.ar, &archive, &objects), archive, Vec::new())
            }
            None => {
                inputs.extend(archives.iter().cloned());
                (
                    link_cmd(toolchain, executable, &objects, archives),
                    executable.elf(),
                    vec![executable.map()],
                )
            }
        };

        Step {
            id: node.id().to_string(),
            stamp: layout.stamp(node.id()),
            object_dir,
            compiles,
            finish,
            artifact,
            side_outputs,
            inputs,
        }
    }

    /// Build `session`'s firmware and post-process the executable.
    pub fn build(&self, session: &BuildSession) -> Result<BuildOutcome> {
        session.layout.create_dirs(&session.descriptor)?;
        let executable = self.executable(session);
        let plan = Arc::new(self.plan(session, &executable));
        let waves = schedule::waves(&session.graph.edges())?;

        let runner = Arc::clone(&self.runner);
        let steps = schedule::execute(&waves, session.settings.jobs, move |id| {
            let step = plan
                .get(id)
                .ok_or_else(|| Error::config(format!("no build step for `{}`", id)))?;
            step.run(&*runner)
        })?;

        let post = PostProcessor::new(&*self.runner, &self.tools)
            .post_process(&executable, session.settings.binary)?;
        Ok(BuildOutcome {
            executable,
            steps,
            post,
        })
    }

    /// Build, then regenerate the `<target>-all` merged archive.
    pub fn build_merged(&self, session: &BuildSession) -> Result<(BuildOutcome, PathBuf)> {
        let outcome = self.build(session)?;
        let merged = self.merge(session, &outcome.executable)?;
        Ok((outcome, merged))
    }

    /// Regenerate the merged archive of an already built `session`.
    pub fn merge(&self, session: &BuildSession, executable: &ExecutableHandle) -> Result<PathBuf> {
        MergedArchive::from_graph(
            &session.graph,
            &session.layout.lib_dir,
            &session.descriptor.merged_target(),
        )
        .merge(&*self.runner, &session.toolchain.profile.tools.ar, executable)
    }
}

/// Remove every build product below `build_dir`, including the state store.
pub fn clean(build_dir: &Path) -> Result<bool> {
    if !build_dir.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(build_dir).map_err(|e| Error::io(build_dir, e))?;
    Ok(true)
}
