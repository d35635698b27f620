//! Formatting, linting and static-analysis tasks.
//!
//! Each QA tool is probed once. A task exists only if its tool is present;
//! the `format`, `format-diff`, `lint` and `check` meta-targets depend on
//! whatever tasks of their category were created, so a host with no tools
//! still has four valid (empty) targets. `check` always runs after `lint`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::inventory::SourceInventory;
use crate::probe::HostTools;
use crate::process::{Cmd, ToolRunner};
use crate::schedule;

/// Meta-target a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Rewrite files in place.
    Format,
    /// Report formatting differences without touching files.
    FormatDiff,
    /// Documentation and data linters.
    Lint,
    /// Static analysis.
    Check,
}

impl Category {
    /// Every category in meta-target declaration order.
    pub const ALL: [Category; 4] = [Self::Format, Self::FormatDiff, Self::Lint, Self::Check];

    /// Name of the meta-target.
    pub fn target(self) -> &'static str {
        match self {
            Self::Format => "format",
            Self::FormatDiff => "format-diff",
            Self::Lint => "lint",
            Self::Check => "check",
        }
    }

    /// Category of meta-target `name`.
    pub fn from_target(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.target() == name)
    }
}

/// A known QA tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskKind {
    /// Task id.
    pub id: &'static str,
    /// Meta-target it belongs to.
    pub category: Category,
    /// Executable.
    pub tool: &'static str,
    /// Arguments before the file list.
    pub args: &'static [&'static str],
    /// Inventory tag of the files it processes.
    pub file_type: &'static str,
    /// Whether the tool takes one file per invocation.
    pub per_file: bool,
}

/// Every QA task the pipeline knows about.
pub const TASK_KINDS: &[TaskKind] = &[
    TaskKind {
        id: "format-code",
        category: Category::Format,
        tool: "clang-format",
        args: &["-i"],
        file_type: "code",
        per_file: false,
    },
    TaskKind {
        id: "format-build",
        category: Category::Format,
        tool: "taplo",
        args: &["fmt"],
        file_type: "build",
        per_file: false,
    },
    TaskKind {
        id: "format-diff-code",
        category: Category::FormatDiff,
        tool: "clang-format",
        args: &["--dry-run", "--Werror"],
        file_type: "code",
        per_file: false,
    },
    TaskKind {
        id: "format-diff-build",
        category: Category::FormatDiff,
        tool: "taplo",
        args: &["fmt", "--check"],
        file_type: "build",
        per_file: false,
    },
    TaskKind {
        id: "lint-docs",
        category: Category::Lint,
        tool: "markdownlint",
        args: &[],
        file_type: "docs",
        per_file: false,
    },
    TaskKind {
        id: "lint-data",
        category: Category::Lint,
        tool: "yamllint",
        args: &["--strict"],
        file_type: "data",
        per_file: false,
    },
    TaskKind {
        id: "check-code",
        category: Category::Check,
        tool: "cppcheck",
        args: &["--error-exitcode=1", "--quiet"],
        file_type: "code",
        per_file: false,
    },
    TaskKind {
        id: "check-includes",
        category: Category::Check,
        tool: "include-what-you-use",
        args: &["-Xiwyu", "--error"],
        file_type: "code",
        per_file: true,
    },
];

/// Executables the pipeline probes for.
pub fn tool_names() -> Vec<&'static str> {
    let mut names: Vec<&str> = Vec::new();
    for kind in TASK_KINDS {
        if !names.contains(&kind.tool) {
            names.push(kind.tool);
        }
    }
    names
}

/// One node of the QA pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaTask {
    /// Task or meta-target id.
    pub id: String,
    /// Required tool; None for meta-targets.
    pub tool: Option<String>,
    /// Nodes that must complete first.
    pub depends_on: Vec<String>,
    /// Files processed; empty for meta-targets.
    pub files: Vec<PathBuf>,
    args: Vec<String>,
    per_file: bool,
}

impl QaTask {
    /// Whether this node is a meta-target.
    pub fn is_meta(&self) -> bool {
        self.tool.is_none()
    }

    /// Commands that perform the task. Empty if there is nothing to process.
    pub fn commands(&self) -> Vec<Cmd> {
        let Some(tool) = &self.tool else {
            return Vec::new();
        };
        if self.files.is_empty() {
            return Vec::new();
        }
        let base = Cmd::new(tool).args(&self.args);
        if self.per_file {
            self.files
                .iter()
                .map(|f| base.clone().arg_path(f))
                .collect()
        } else {
            vec![base.arg_paths(&self.files)]
        }
    }
}

/// The QA tasks available on this host plus the four meta-targets.
#[derive(Debug, Clone, Default)]
pub struct QaPipeline {
    tasks: Vec<QaTask>,
}

impl QaPipeline {
    /// Create the tasks whose tool is in `tools`, over `inventory`.
    pub fn new(tools: &HostTools, inventory: &SourceInventory) -> Self {
        let mut tasks = Vec::new();
        let mut created: HashMap<Category, Vec<String>> = HashMap::new();

        for kind in TASK_KINDS {
            if !tools.has(kind.tool) {
                debug!(task = kind.id, tool = kind.tool, "tool absent; task omitted");
                continue;
            }
            tasks.push(QaTask {
                id: kind.id.to_string(),
                tool: Some(kind.tool.to_string()),
                depends_on: Vec::new(),
                files: inventory
                    .files(kind.file_type)
                    .into_iter()
                    .map(PathBuf::from)
                    .collect(),
                args: kind.args.iter().map(|a| a.to_string()).collect(),
                per_file: kind.per_file,
            });
            created
                .entry(kind.category)
                .or_default()
                .push(kind.id.to_string());
        }

        for category in Category::ALL {
            let mut depends_on = created.remove(&category).unwrap_or_default();
            if category == Category::Check {
                depends_on.push(Category::Lint.target().to_string());
            }
            tasks.push(QaTask {
                id: category.target().to_string(),
                tool: None,
                depends_on,
                files: Vec::new(),
                args: Vec::new(),
                per_file: false,
            });
        }
        Self { tasks }
    }

    /// All nodes, tasks first then meta-targets.
    pub fn tasks(&self) -> &[QaTask] {
        &self.tasks
    }

    /// Node by id.
    pub fn task(&self, id: &str) -> Option<&QaTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// `target` and everything it transitively depends on, as scheduling
    /// edges in declaration order.
    pub fn closure(&self, target: &str) -> Result<Vec<(String, Vec<String>)>> {
        if self.task(target).is_none() {
            return Err(Error::config(format!("unknown QA target `{}`", target)));
        }
        let mut needed: HashSet<&str> = HashSet::new();
        let mut stack = vec![target];
        while let Some(id) = stack.pop() {
            if !needed.insert(id) {
                continue;
            }
            if let Some(task) = self.task(id) {
                stack.extend(task.depends_on.iter().map(String::as_str));
            }
        }
        Ok(self
            .tasks
            .iter()
            .filter(|t| needed.contains(t.id.as_str()))
            .map(|t| (t.id.clone(), t.depends_on.clone()))
            .collect())
    }

    /// Run `target` with its dependencies. Returns the ids of the tool tasks
    /// that ran, in completion order.
    pub fn run(&self, target: &str, runner: Arc<dyn ToolRunner>, jobs: usize) -> Result<Vec<String>> {
        let edges = self.closure(target)?;
        let waves = schedule::waves(&edges)?;
        let commands: Arc<HashMap<String, Vec<Cmd>>> = Arc::new(
            edges
                .iter()
                .filter_map(|(id, _)| self.task(id))
                .map(|t| (t.id.clone(), t.commands()))
                .collect(),
        );

        info!(target, tasks = edges.len(), "running QA target");
        let done = schedule::execute(&waves, jobs, move |id| {
            let cmds = commands.get(id).map(Vec::as_slice).unwrap_or_default();
            for cmd in cmds {
                runner.run(cmd)?;
            }
            Ok(())
        })?;

        Ok(done
            .into_iter()
            .map(|(id, ())| id)
            .filter(|id| self.task(id).is_some_and(|t| !t.is_meta()))
            .collect())
    }
}
