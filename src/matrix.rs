//! Product build matrices (`product.toml`).
//!
//! A product lists its firmware and the toolchains, build modes and platform
//! variants it is tested with. Every combination becomes one [`Build`],
//! which knows its human-readable tag, its log file name and the `fwbuild`
//! invocation that performs it.
//!
//! ```toml
//! name = "juno"
//! firmware = ["scp_romfw", "scp_ramfw"]
//! log_level = "WARN"
//! variants = ["BOARD", { name = "FVP", arguments = ["--option", "ENABLE_PLAT_FVP=ON"] }]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Product file name.
pub const PRODUCT_FILE: &str = "product.toml";

/// A matrix axis value with the extra `fwbuild` arguments it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Value passed to the matching `fwbuild` option.
    pub name: String,
    /// Extra arguments appended to the invocation.
    pub arguments: Vec<String>,
}

impl Parameter {
    /// Parameter without extra arguments.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            arguments: Vec::new(),
        }
    }

    /// Parameter with extra arguments.
    pub fn with_args(name: &str, arguments: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            arguments: arguments.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn initial(&self) -> char {
        self.name.chars().next().unwrap_or('_')
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawParameter {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        arguments: Vec<String>,
    },
}

impl From<RawParameter> for Parameter {
    fn from(raw: RawParameter) -> Self {
        match raw {
            RawParameter::Name(name) => Self {
                name,
                arguments: Vec::new(),
            },
            RawParameter::Full { name, arguments } => Self { name, arguments },
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProduct {
    name: String,
    #[serde(default)]
    group: Option<String>,
    firmware: Vec<String>,
    #[serde(default)]
    toolchains: Option<Vec<RawParameter>>,
    #[serde(default)]
    build_types: Option<Vec<RawParameter>>,
    #[serde(default)]
    variants: Vec<RawParameter>,
    #[serde(default)]
    log_level: Option<String>,
}

/// Toolchains every product is built with unless it says otherwise.
pub fn default_toolchains() -> Vec<Parameter> {
    vec![
        Parameter::new("GNU"),
        Parameter::new("ArmClang"),
        Parameter::with_args("Clang", &["--sysroot-cc=arm-none-eabi-gcc"]),
    ]
}

/// Build modes every product is built in unless it says otherwise.
pub fn default_build_types() -> Vec<Parameter> {
    vec![Parameter::new("debug"), Parameter::new("release")]
}

/// A product and its build matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    /// Product name.
    pub name: String,
    /// Optional product group (parent directory).
    pub group: Option<String>,
    /// Directory holding `product.toml`.
    pub dir: PathBuf,
    /// Firmware directory names below `dir`.
    pub firmware: Vec<String>,
    /// Toolchain axis.
    pub toolchains: Vec<Parameter>,
    /// Build mode axis.
    pub build_types: Vec<Parameter>,
    /// Variant axis; a single `None` when the product has no variants.
    pub variants: Vec<Option<Parameter>>,
    /// Log level applied to every build.
    pub log_level: Option<Parameter>,
}

impl Product {
    /// Load `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        Self::parse(&text, &dir, path)
    }

    /// Parse product text; `dir` anchors firmware directories.
    pub fn parse(text: &str, dir: &Path, origin: &Path) -> Result<Self> {
        let raw: RawProduct = toml::from_str(text).map_err(|source| Error::Toml {
            path: origin.to_path_buf(),
            source,
        })?;
        if raw.name.trim().is_empty() {
            return Err(Error::MissingField {
                field: "name",
                path: origin.to_path_buf(),
            });
        }
        if raw.firmware.is_empty() {
            return Err(Error::MissingField {
                field: "firmware",
                path: origin.to_path_buf(),
            });
        }

        let axis = |raw: Option<Vec<RawParameter>>, default: fn() -> Vec<Parameter>| {
            raw.map(|v| v.into_iter().map(Parameter::from).collect())
                .unwrap_or_else(default)
        };
        let mut variants: Vec<Option<Parameter>> =
            raw.variants.into_iter().map(|v| Some(v.into())).collect();
        if variants.is_empty() {
            variants.push(None);
        }

        Ok(Self {
            name: raw.name,
            group: raw.group.filter(|g| !g.is_empty()),
            dir: dir.to_path_buf(),
            firmware: raw.firmware,
            toolchains: axis(raw.toolchains, default_toolchains),
            build_types: axis(raw.build_types, default_build_types),
            variants,
            log_level: raw.log_level.map(|l| Parameter::new(&l)),
        })
    }

    /// Every combination: firmware × toolchain × build type × variant.
    pub fn builds(&self) -> Vec<Build> {
        let mut builds = Vec::new();
        for firmware in &self.firmware {
            for toolchain in &self.toolchains {
                for build_type in &self.build_types {
                    for variant in &self.variants {
                        builds.push(Build {
                            product: self.name.clone(),
                            group: self.group.clone(),
                            firmware: firmware.clone(),
                            firmware_dir: self.dir.join(firmware),
                            toolchain: toolchain.clone(),
                            build_type: build_type.clone(),
                            log_level: self.log_level.clone(),
                            variant: variant.clone(),
                        });
                    }
                }
            }
        }
        builds
    }
}

/// One matrix combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Build {
    /// Product name.
    pub product: String,
    /// Product group.
    pub group: Option<String>,
    /// Firmware name.
    pub firmware: String,
    /// Firmware directory.
    pub firmware_dir: PathBuf,
    /// Toolchain.
    pub toolchain: Parameter,
    /// Build mode.
    pub build_type: Parameter,
    /// Log level.
    pub log_level: Option<Parameter>,
    /// Platform variant.
    pub variant: Option<Parameter>,
}

impl Build {
    fn qualified_name(&self, sep: &str) -> String {
        match &self.group {
            Some(group) => format!("{}{}{}", group, sep, self.product),
            None => self.product.clone(),
        }
    }

    /// Human-readable description.
    pub fn tag(&self) -> String {
        let mut tag = format!(
            "Product: {} - Firmware: {} - Toolchain: {} - Mode: {}",
            self.qualified_name("/"),
            self.firmware,
            self.toolchain.name,
            self.build_type.name
        );
        if let Some(variant) = &self.variant {
            tag.push_str(&format!(" - Variant {}", variant.name));
        }
        if let Some(level) = &self.log_level {
            tag.push_str(&format!(" - Log Level {}", level.name));
        }
        tag
    }

    /// Log file name, e.g. `juno_scp_romfw_GNU_d_WARN.txt`.
    pub fn file_name(&self) -> String {
        let mut name = format!(
            "{}_{}_{}_{}",
            self.qualified_name("_"),
            self.firmware,
            self.toolchain.name,
            self.build_type.initial()
        );
        if let Some(level) = &self.log_level {
            name.push('_');
            name.push_str(&level.name);
        }
        if let Some(variant) = &self.variant {
            name.push('_');
            name.push(variant.initial());
        }
        name.push_str(".txt");
        name
    }

    /// Arguments of the `fwbuild` invocation performing this build.
    ///
    /// Each combination gets its own build directory (`<build_root>/<log
    /// stem>`) so pinned toolchain state never leaks between combinations.
    pub fn command(&self, build_root: &Path) -> Vec<String> {
        let stem = self.file_name().trim_end_matches(".txt").to_string();
        let mut args = vec![
            "build".to_string(),
            "--firmware".to_string(),
            self.firmware_dir.display().to_string(),
            "--build-dir".to_string(),
            build_root.join(stem).display().to_string(),
            "--toolchain".to_string(),
            self.toolchain.name.clone(),
            "--mode".to_string(),
            self.build_type.name.clone(),
        ];
        if let Some(level) = &self.log_level {
            args.push("--log-level".to_string());
            args.push(level.name.clone());
        }
        if let Some(variant) = &self.variant {
            args.push("--variant".to_string());
            args.push(variant.name.clone());
            args.extend(variant.arguments.iter().cloned());
        }
        args.extend(self.toolchain.arguments.iter().cloned());
        args.extend(self.build_type.arguments.iter().cloned());
        args
    }
}
