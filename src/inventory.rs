//! Typed source inventory.
//!
//! Files below the include roots are tagged by type glob (matched against
//! the root-relative path) and dropped if an exclude regex matches their
//! absolute path. Recomputed on every invocation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// A file-type tag and the globs selecting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileType {
    /// Tag, e.g. `code`.
    pub tag: String,
    /// Root-relative globs.
    pub globs: Vec<String>,
}

impl FileType {
    /// Type `tag` matching any of `globs`.
    pub fn new(tag: &str, globs: &[&str]) -> Self {
        Self {
            tag: tag.to_string(),
            globs: globs.iter().map(|g| g.to_string()).collect(),
        }
    }
}

/// The built-in file types.
pub fn default_types() -> Vec<FileType> {
    vec![
        FileType::new(
            "build",
            &[
                "**/component.toml",
                "**/firmware.toml",
                "**/product.toml",
                "**/Toolchain-*.toml",
            ],
        ),
        FileType::new("docs", &["**/*.md"]),
        FileType::new("data", &["**/*.yml", "**/*.yaml"]),
        FileType::new("code", &["**/*.c", "**/*.h"]),
    ]
}

/// Default exclude regexes: the build directory, VCS metadata and
/// third-party code.
pub fn default_excludes(build_dir: &Path) -> Vec<String> {
    vec![
        format!("^{}(/|$)", regex::escape(&build_dir.to_string_lossy())),
        r"/\.git/".to_string(),
        r"/contrib/".to_string(),
    ]
}

/// Translate a glob into an anchored regex.
///
/// Supports `*` (within one path segment), `**` (any depth), `?` and
/// `{a,b}` alternation.
pub fn glob_to_regex(glob: &str) -> Result<Regex> {
    let mut out = String::from("^");
    let chars: Vec<char> = glob.chars().collect();
    let mut depth = 0usize;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '{' => {
                depth += 1;
                out.push_str("(?:");
            }
            '}' if depth > 0 => {
                depth -= 1;
                out.push(')');
            }
            ',' if depth > 0 => out.push('|'),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    if depth > 0 {
        return Err(Error::config(format!("unbalanced `{{` in glob `{}`", glob)));
    }
    out.push('$');
    Regex::new(&out).map_err(|source| Error::Pattern {
        pattern: glob.to_string(),
        source,
    })
}

fn compile_excludes(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|source| Error::Pattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

/// File-type tag → absolute paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceInventory {
    files: BTreeMap<String, BTreeSet<PathBuf>>,
}

impl SourceInventory {
    /// Files tagged `tag`, sorted. Unknown tags are empty.
    pub fn files(&self, tag: &str) -> Vec<&Path> {
        self.files
            .get(tag)
            .map(|set| set.iter().map(PathBuf::as_path).collect())
            .unwrap_or_default()
    }

    /// Every tag with its file count.
    pub fn counts(&self) -> impl Iterator<Item = (&str, usize)> {
        self.files.iter().map(|(tag, set)| (tag.as_str(), set.len()))
    }

    /// Total number of tagged files (a file may carry several tags).
    pub fn len(&self) -> usize {
        self.files.values().map(BTreeSet::len).sum()
    }

    /// Whether nothing was found.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Walk `roots` and collect files per type.
///
/// Excluded directories are pruned. Every type tag is present in the
/// result, possibly empty.
pub fn inventory(roots: &[PathBuf], excludes: &[String], types: &[FileType]) -> Result<SourceInventory> {
    let excludes = compile_excludes(excludes)?;
    let matchers: Vec<(&str, Vec<Regex>)> = types
        .iter()
        .map(|t| {
            let globs = t.globs.iter().map(|g| glob_to_regex(g)).collect::<Result<Vec<_>>>()?;
            Ok((t.tag.as_str(), globs))
        })
        .collect::<Result<_>>()?;

    let excluded = |path: &Path, is_dir: bool| {
        let mut text = path.to_string_lossy().into_owned();
        if is_dir {
            text.push('/');
        }
        excludes.iter().any(|re| re.is_match(&text))
    };

    let mut result = SourceInventory::default();
    for (tag, _) in &matchers {
        result.files.entry(tag.to_string()).or_default();
    }

    for root in roots {
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !excluded(e.path(), e.file_type().is_dir()));
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(root) else {
                continue;
            };
            let rel = rel.to_string_lossy().replace('\\', "/");
            for (tag, globs) in &matchers {
                if globs.iter().any(|g| g.is_match(&rel)) {
                    result
                        .files
                        .entry(tag.to_string())
                        .or_default()
                        .insert(entry.path().to_path_buf());
                }
            }
        }
    }

    debug!(files = result.len(), "source inventory");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_glob_translation() {
        let re = glob_to_regex("**/*.c").unwrap();
        assert!(re.is_match("mod_clock.c"));
        assert!(re.is_match("module/clock/src/mod_clock.c"));
        assert!(!re.is_match("module/clock/src/mod_clock.cpp"));

        let re = glob_to_regex("**/Toolchain-*.toml").unwrap();
        assert!(re.is_match("product/juno/scp_romfw/Toolchain-GNU.toml"));
        assert!(!re.is_match("product/juno/Toolchain/GNU.toml"));

        let re = glob_to_regex("doc/*.{md,txt}").unwrap();
        assert!(re.is_match("doc/readme.md"));
        assert!(re.is_match("doc/notes.txt"));
        assert!(!re.is_match("doc/sub/readme.md"));

        let re = glob_to_regex("a?.h").unwrap();
        assert!(re.is_match("ab.h"));
        assert!(!re.is_match("a/.h"));

        assert!(glob_to_regex("{a,b").is_err());
    }

    #[test]
    fn test_inventory_tags_and_excludes() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        for file in [
            "module/clock/src/mod_clock.c",
            "module/clock/include/mod_clock.h",
            "module/clock/component.toml",
            "doc/user_guide.md",
            ".github/workflows/ci.yml",
            "contrib/cmsis/core.h",
            "build/obj/generated.c",
            ".git/HEAD",
        ] {
            let path = root.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, "").unwrap();
        }

        let inv = inventory(
            &[root.to_path_buf()],
            &default_excludes(&root.join("build")),
            &default_types(),
        )
        .unwrap();

        assert_eq!(
            inv.files("code"),
            vec![
                root.join("module/clock/include/mod_clock.h").as_path(),
                root.join("module/clock/src/mod_clock.c").as_path(),
            ]
        );
        assert_eq!(inv.files("build").len(), 1);
        assert_eq!(inv.files("docs").len(), 1);
        assert_eq!(inv.files("data").len(), 1);
        assert!(inv.files("nonsense").is_empty());
    }

    #[test]
    fn test_empty_types_still_listed() {
        let temp = TempDir::new().unwrap();
        let inv = inventory(&[temp.path().to_path_buf()], &[], &default_types()).unwrap();
        assert!(inv.is_empty());
        assert_eq!(inv.counts().count(), 4);
    }

    #[test]
    fn test_bad_exclude_is_error() {
        let err = inventory(&[], &["(".to_string()], &[]).unwrap_err();
        assert!(matches!(err, Error::Pattern { .. }));
    }
}
