//! Preflight check types and report.

use std::fmt::Write as _;

/// Result of a single preflight check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    /// Check passed.
    Pass,
    /// Check failed - build will fail.
    Fail,
    /// Tool missing but the build degrades gracefully.
    Warn,
}

impl CheckStatus {
    fn label(self) -> (&'static str, &'static str) {
        match self {
            Self::Pass => ("✓", "PASS"),
            Self::Fail => ("✗", "FAIL"),
            Self::Warn => ("⚠", "WARN"),
        }
    }
}

impl CheckResult {
    pub fn pass_with(name: &str, details: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Pass,
            details: Some(details.to_string()),
        }
    }

    pub fn fail(name: &str, details: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Fail,
            details: Some(details.to_string()),
        }
    }

    pub fn warn(name: &str, details: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warn,
            details: Some(details.to_string()),
        }
    }
}

/// A titled group of checks.
#[derive(Debug, Clone, Default)]
pub struct Section {
    pub title: String,
    pub checks: Vec<CheckResult>,
}

/// Results of all preflight checks.
#[derive(Debug, Clone, Default)]
pub struct PreflightReport {
    pub sections: Vec<Section>,
}

impl PreflightReport {
    /// Append a section.
    pub fn section(&mut self, title: &str, checks: Vec<CheckResult>) {
        self.sections.push(Section {
            title: title.to_string(),
            checks,
        });
    }

    /// Every check across sections.
    pub fn checks(&self) -> impl Iterator<Item = &CheckResult> {
        self.sections.iter().flat_map(|s| s.checks.iter())
    }

    /// Returns true if no check failed.
    pub fn all_passed(&self) -> bool {
        !self.checks().any(|c| c.status == CheckStatus::Fail)
    }

    /// Count of checks with `status`.
    pub fn count(&self, status: CheckStatus) -> usize {
        self.checks().filter(|c| c.status == status).count()
    }

    /// Render the report as text.
    pub fn render(&self) -> String {
        let mut out = String::from("=== Preflight Check Results ===\n");
        for section in &self.sections {
            let _ = writeln!(out, "\n{}:", section.title);
            for check in &section.checks {
                let (icon, label) = check.status.label();
                let _ = write!(out, "  {} [{}] {}", icon, label, check.name);
                match &check.details {
                    Some(details) => {
                        let _ = writeln!(out, ": {}", details);
                    }
                    None => out.push('\n'),
                }
            }
        }

        let total = self.checks().count();
        let failed = self.count(CheckStatus::Fail);
        let warned = self.count(CheckStatus::Warn);
        let _ = writeln!(
            out,
            "\nSummary: {}/{} passed",
            self.count(CheckStatus::Pass),
            total
        );
        if failed > 0 {
            let _ = writeln!(out, "         {} FAILED - build will not succeed", failed);
        }
        if warned > 0 {
            let _ = writeln!(out, "         {} warnings", warned);
        }
        out
    }

    /// Print the report to stdout.
    pub fn print(&self) {
        print!("{}", self.render());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_and_counts() {
        let mut report = PreflightReport::default();
        report.section(
            "Toolchain (GNU)",
            vec![
                CheckResult::pass_with("arm-none-eabi-gcc", "/usr/bin/arm-none-eabi-gcc"),
                CheckResult::fail("arm-none-eabi-ar", "not found"),
            ],
        );
        report.section("QA tools", vec![CheckResult::warn("cppcheck", "check-code omitted")]);

        assert!(!report.all_passed());
        assert_eq!(report.count(CheckStatus::Warn), 1);

        let text = report.render();
        assert!(text.contains("Toolchain (GNU):"));
        assert!(text.contains("[FAIL] arm-none-eabi-ar: not found"));
        assert!(text.contains("Summary: 1/3 passed"));
        assert!(text.contains("1 FAILED"));
    }
}
