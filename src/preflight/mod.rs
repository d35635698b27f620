//! Preflight checks for a firmware build.
//!
//! Reports which toolchain and QA tools the host provides before a build
//! starts. Run with `fwbuild preflight`.

mod host_tools;
pub mod types;

use thiserror::Error as ThisError;

use crate::probe::HostTools;
use crate::qa;
use crate::toolchain::ToolchainProfile;

pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Preflight found blocking problems.
#[derive(Debug, ThisError)]
#[error("preflight failed: {failed} check(s) failed. Fix the issues above before building.")]
pub struct PreflightFailed {
    pub failed: usize,
}

/// Every tool name preflight looks at for `toolchain`.
pub fn tool_names(toolchain: Option<&ToolchainProfile>) -> Vec<String> {
    let mut names: Vec<String> = toolchain
        .map(|t| t.tools.all().into_iter().map(str::to_string).collect())
        .unwrap_or_default();
    names.extend(qa::tool_names().into_iter().map(str::to_string));
    names
}

/// Run all preflight checks against the probed `tools`.
pub fn run_preflight(toolchain: Option<&ToolchainProfile>, tools: &HostTools) -> PreflightReport {
    let mut report = PreflightReport::default();
    if let Some(profile) = toolchain {
        report.section(
            &format!("Toolchain ({})", profile.compiler),
            host_tools::check_toolchain(&profile.tools, tools),
        );
    }
    report.section("QA tools", host_tools::check_qa_tools(tools));
    report
}

/// Run preflight, print the report and fail if any check failed.
pub fn run_preflight_or_fail(
    toolchain: Option<&ToolchainProfile>,
    tools: &HostTools,
) -> Result<PreflightReport, PreflightFailed> {
    let report = run_preflight(toolchain, tools);
    report.print();
    if !report.all_passed() {
        return Err(PreflightFailed {
            failed: report.count(CheckStatus::Fail),
        });
    }
    println!("All preflight checks passed!\n");
    Ok(report)
}
