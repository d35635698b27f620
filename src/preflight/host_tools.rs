//! Host tool availability checks.

use crate::probe::HostTools;
use crate::qa::TASK_KINDS;
use crate::toolchain::ToolCommands;

use super::types::CheckResult;

fn found(tools: &HostTools, tool: &str) -> Option<String> {
    tools.path(tool).map(|p| p.display().to_string())
}

/// Check the active toolchain's executables.
///
/// Compiler, archiver and linker are required; binary extractors only
/// degrade the optional flat-binary step.
pub fn check_toolchain(commands: &ToolCommands, tools: &HostTools) -> Vec<CheckResult> {
    let mut results = Vec::new();
    let mut seen: Vec<&str> = Vec::new();

    for tool in [&commands.cc, &commands.ar, &commands.linker] {
        if seen.contains(&tool.as_str()) {
            continue;
        }
        seen.push(tool.as_str());
        results.push(match found(tools, tool) {
            Some(path) => CheckResult::pass_with(tool, &path),
            None => CheckResult::fail(tool, "Not found in PATH. Required to build."),
        });
    }

    let extractors = commands.fromelf.iter().chain(std::iter::once(&commands.objcopy));
    for tool in extractors {
        results.push(match found(tools, tool) {
            Some(path) => CheckResult::pass_with(tool, &path),
            None => CheckResult::warn(tool, "Not found. Flat binary extraction may be skipped."),
        });
    }
    results
}

/// Check the QA tools. A missing tool only omits its tasks.
pub fn check_qa_tools(tools: &HostTools) -> Vec<CheckResult> {
    let mut results: Vec<CheckResult> = Vec::new();
    for kind in TASK_KINDS {
        if results.iter().any(|r| r.name == kind.tool) {
            continue;
        }
        let tasks: Vec<&str> = TASK_KINDS
            .iter()
            .filter(|k| k.tool == kind.tool)
            .map(|k| k.id)
            .collect();
        results.push(match found(tools, kind.tool) {
            Some(path) => CheckResult::pass_with(kind.tool, &path),
            None => CheckResult::warn(
                kind.tool,
                &format!("Not found. Omitted: {}", tasks.join(", ")),
            ),
        });
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preflight::types::CheckStatus;
    use crate::toolchain::CompilerId;

    #[test]
    fn test_missing_compiler_fails_missing_extractor_warns() {
        let commands = ToolCommands::defaults(CompilerId::Gnu, "arm-none-eabi-");
        let tools = HostTools::with_present(["arm-none-eabi-ar"]);
        let results = check_toolchain(&commands, &tools);

        // gcc doubles as the linker and is reported once.
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].status, CheckStatus::Fail);
        assert_eq!(results[1].status, CheckStatus::Pass);
        assert_eq!(results[2].name, "arm-none-eabi-objcopy");
        assert_eq!(results[2].status, CheckStatus::Warn);
    }

    #[test]
    fn test_qa_tools_name_omitted_tasks() {
        let results = check_qa_tools(&HostTools::default());
        assert_eq!(results.len(), 6);
        let clang_format = results.iter().find(|r| r.name == "clang-format").unwrap();
        assert_eq!(
            clang_format.details.as_deref(),
            Some("Not found. Omitted: format-code, format-diff-code")
        );
        assert!(results.iter().all(|r| r.status == CheckStatus::Warn));
    }
}
