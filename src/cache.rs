//! Input-hash rebuild stamps.
//!
//! Uses SHA256 hashes to detect actual content changes, not just mtimes.
//! A component step is skipped when its artifact exists and the hash of its
//! inputs matches the stamp written by the last successful run.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use tracing::warn;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Hash the contents of `files` followed by `extra` strings (command lines).
///
/// Returns None if any file can't be read, which forces a rebuild.
pub fn hash_inputs<'a, I>(files: I, extra: &[String]) -> Option<String>
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut hasher = Sha256::new();
    for path in files {
        match fs::read(path) {
            Ok(content) => {
                hasher.update(path.to_string_lossy().as_bytes());
                hasher.update(&content);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "input unreadable; stamp invalidated");
                return None;
            }
        }
    }
    for item in extra {
        hasher.update(item.as_bytes());
        hasher.update([0u8]);
    }
    Some(format!("{:x}", hasher.finalize()))
}

/// Every regular file below `dirs`, in walk order. Missing dirs are skipped.
pub fn files_under<'a, I>(dirs: I) -> Vec<std::path::PathBuf>
where
    I: IntoIterator<Item = &'a std::path::PathBuf>,
{
    dirs.into_iter()
        .filter(|d| d.is_dir())
        .flat_map(|d| WalkDir::new(d).sort_by_file_name())
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

/// Read a stamp file. Returns None if it doesn't exist or can't be read.
pub fn read_stamp(stamp: &Path) -> Option<String> {
    if !stamp.exists() {
        return None;
    }
    match fs::read_to_string(stamp) {
        Ok(s) => Some(s.trim().to_string()),
        Err(e) => {
            warn!(path = %stamp.display(), error = %e, "failed to read stamp; will rebuild");
            None
        }
    }
}

/// Write `hash` to a stamp file.
pub fn write_stamp(stamp: &Path, hash: &str) -> Result<()> {
    if let Some(parent) = stamp.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::write(stamp, hash).map_err(|e| Error::io(stamp, e))
}

/// Whether `artifact` is up to date with respect to `hash`.
///
/// Fresh only if the artifact exists and the stamp matches. A missing stamp
/// means the artifact is of unknown provenance and must be rebuilt.
pub fn is_fresh(hash: Option<&str>, stamp: &Path, artifact: &Path) -> bool {
    let Some(hash) = hash else {
        return false;
    };
    artifact.exists() && read_stamp(stamp).as_deref() == Some(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hash_changes_with_content_and_commands() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("mod_clock.c");
        fs::write(&src, "int clock;").unwrap();

        let a = hash_inputs([src.as_path()], &["gcc -O0".into()]).unwrap();
        let b = hash_inputs([src.as_path()], &["gcc -Os".into()]).unwrap();
        assert_ne!(a, b);

        fs::write(&src, "int clock = 1;").unwrap();
        let c = hash_inputs([src.as_path()], &["gcc -O0".into()]).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_missing_input_forces_rebuild() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("gone.c");
        assert!(hash_inputs([missing.as_path()], &[]).is_none());
        assert!(!is_fresh(None, &temp.path().join("s"), temp.path()));
    }

    #[test]
    fn test_fresh_requires_artifact_and_matching_stamp() {
        let temp = TempDir::new().unwrap();
        let stamp = temp.path().join("obj/clock/.inputs.hash");
        let artifact = temp.path().join("lib/libclock.a");

        assert!(!is_fresh(Some("abc"), &stamp, &artifact));
        write_stamp(&stamp, "abc").unwrap();
        assert!(!is_fresh(Some("abc"), &stamp, &artifact));

        fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        fs::write(&artifact, "!<arch>\n").unwrap();
        assert!(is_fresh(Some("abc"), &stamp, &artifact));
        assert!(!is_fresh(Some("def"), &stamp, &artifact));
    }

    #[test]
    fn test_files_under_skips_missing_dirs() {
        let temp = TempDir::new().unwrap();
        let inc = temp.path().join("include");
        fs::create_dir_all(inc.join("sub")).unwrap();
        fs::write(inc.join("a.h"), "").unwrap();
        fs::write(inc.join("sub/b.h"), "").unwrap();
        let dirs = vec![inc.clone(), temp.path().join("nope")];
        let files = files_under(&dirs);
        assert_eq!(files, vec![inc.join("a.h"), inc.join("sub/b.h")]);
    }
}
