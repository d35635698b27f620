//! Toolchain command lines.
//!
//! Pure construction: nothing here spawns a process.

use std::path::{Path, PathBuf};

use crate::artifact::ExecutableHandle;
use crate::component::{BuildInputs, Component};
use crate::firmware::BuildMode;
use crate::process::Cmd;
use crate::toolchain::{CompilerId, ToolchainSelection};

/// Object file for `source` of `component` inside `object_dir`.
///
/// Sources below the component root keep their relative layout; others are
/// flattened to their file name.
pub fn object_path(object_dir: &Path, component: &Component, source: &Path) -> PathBuf {
    let rel = source
        .strip_prefix(&component.root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| source.file_name().map(PathBuf::from).unwrap_or_default());
    object_dir.join(format!("{}.o", rel.display()))
}

/// Driver flags selecting target and sysroot for Clang-based families.
fn target_flags(selection: &ToolchainSelection) -> Vec<String> {
    let profile = &selection.profile;
    let mut flags = Vec::new();
    if profile.compiler != CompilerId::Gnu {
        if let Some(target) = &profile.target {
            flags.push(format!("--target={}", target));
        }
    }
    if profile.compiler == CompilerId::Clang {
        if let Some(sysroot) = &profile.sysroot {
            flags.push(format!("--sysroot={}", sysroot.display()));
        }
    }
    flags
}

/// `<cc> … -c <source> -o <object>`.
pub fn compile_cmd(
    selection: &ToolchainSelection,
    mode: BuildMode,
    inputs: &BuildInputs,
    source: &Path,
    object: &Path,
) -> Cmd {
    let profile = &selection.profile;
    let mut cmd = Cmd::new(&profile.tools.cc)
        .args(target_flags(selection))
        .arg(profile.std_flag())
        .args(mode.compile_flags());
    if selection.ipo {
        cmd = cmd.arg("-flto");
    }
    for dir in inputs.include_dirs.iter() {
        cmd = cmd.arg(format!("-I{}", dir.display()));
    }
    for define in inputs.defines.iter() {
        cmd = cmd.arg(format!("-D{}", define));
    }
    cmd.arg("-c").arg_path(source).arg("-o").arg_path(object)
}

/// `<ar> rcs <archive> <objects…>`.
pub fn archive_cmd(ar: &str, archive: &Path, objects: &[PathBuf]) -> Cmd {
    Cmd::new(ar).arg("rcs").arg_path(archive).arg_paths(objects)
}

/// Link the firmware executable described by `handle`.
///
/// The family's map flag is always present. GNU-style links wrap the
/// archives in a group so inter-archive references resolve regardless of
/// order.
pub fn link_cmd(
    selection: &ToolchainSelection,
    handle: &ExecutableHandle,
    objects: &[PathBuf],
    archives: &[PathBuf],
) -> Cmd {
    let profile = &selection.profile;
    let elf = handle.elf();

    if profile.compiler.uses_vendor_linker() {
        let mut cmd = Cmd::new(&profile.tools.linker).args(handle.map_flags());
        // Objects compiled with -flto are bitcode; armlink only accepts them with --lto.
        if selection.ipo {
            cmd = cmd.arg("--lto");
        }
        return cmd
            .arg(format!("--output={}", elf.display()))
            .arg_paths(objects)
            .arg_paths(archives);
    }

    let mut cmd = Cmd::new(&profile.tools.linker).args(target_flags(selection));
    if selection.ipo {
        cmd = cmd.arg("-flto");
    }
    cmd.arg("-o")
        .arg_path(&elf)
        .arg_paths(objects)
        .arg("-Wl,--start-group")
        .arg_paths(archives)
        .arg("-Wl,--end-group")
        .args(handle.map_flags())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentKind, Define};
    use crate::toolchain::ToolchainProfile;

    fn selection(compiler: CompilerId, ipo: bool) -> ToolchainSelection {
        let mut profile = ToolchainProfile::new(compiler);
        if compiler == CompilerId::Clang {
            profile.target = Some("arm-arm-none-eabi".into());
            profile.sysroot = Some(PathBuf::from("/opt/gcc-arm/arm-none-eabi"));
        }
        ToolchainSelection {
            file: PathBuf::from("Toolchain.toml"),
            profile,
            ipo,
        }
    }

    #[test]
    fn test_object_path_mirrors_component_tree() {
        let component = Component::new("clock", ComponentKind::Module, "/scp/module/clock");
        assert_eq!(
            object_path(
                Path::new("/b/obj/clock"),
                &component,
                Path::new("/scp/module/clock/src/mod_clock.c")
            ),
            PathBuf::from("/b/obj/clock/src/mod_clock.c.o")
        );
        assert_eq!(
            object_path(Path::new("/b/obj/clock"), &component, Path::new("/elsewhere/x.c")),
            PathBuf::from("/b/obj/clock/x.c.o")
        );
    }

    #[test]
    fn test_compile_command_carries_inputs() {
        let mut inputs = BuildInputs::default();
        inputs.include_dirs.insert(PathBuf::from("/scp/framework/include"));
        inputs.defines.insert(Define::flag("BUILD_HAS_MOD_CLOCK"));
        inputs.defines.insert(Define::value("FWK_LOG_LEVEL", "1"));

        let cmd = compile_cmd(
            &selection(CompilerId::Gnu, true),
            BuildMode::Debug,
            &inputs,
            Path::new("/s/a.c"),
            Path::new("/o/a.c.o"),
        );
        assert_eq!(cmd.program(), "arm-none-eabi-gcc");
        let args = cmd.get_args();
        for expected in [
            "-std=gnu11",
            "-O0",
            "-g",
            "-flto",
            "-I/scp/framework/include",
            "-DBUILD_HAS_MOD_CLOCK",
            "-DFWK_LOG_LEVEL=1",
        ] {
            assert!(args.iter().any(|a| a == expected), "missing {}", expected);
        }
        assert_eq!(&args[args.len() - 4..], ["-c", "/s/a.c", "-o", "/o/a.c.o"]);
    }

    #[test]
    fn test_clang_gets_target_and_sysroot() {
        let cmd = compile_cmd(
            &selection(CompilerId::Clang, false),
            BuildMode::Release,
            &BuildInputs::default(),
            Path::new("a.c"),
            Path::new("a.o"),
        );
        let args = cmd.get_args();
        assert_eq!(args[0], "--target=arm-arm-none-eabi");
        assert_eq!(args[1], "--sysroot=/opt/gcc-arm/arm-none-eabi");
        assert!(!args.iter().any(|a| a == "-flto"));
        assert!(args.iter().any(|a| a == "-Os"));
    }

    #[test]
    fn test_archive_command() {
        let cmd = archive_cmd(
            "arm-none-eabi-ar",
            Path::new("/b/lib/libclock.a"),
            &[PathBuf::from("/o/a.o"), PathBuf::from("/o/b.o")],
        );
        assert_eq!(cmd.get_args(), ["rcs", "/b/lib/libclock.a", "/o/a.o", "/o/b.o"]);
    }
}
