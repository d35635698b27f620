//! Feature flag resolution.
//!
//! A flag's effective value is, in order of precedence: an explicit
//! override, the value cached in the build state by a previous invocation,
//! the firmware's initial-value hint, the catalogue default. The first
//! resolution of a flag pins its value into the build state.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::component::Define;
use crate::error::{Error, Result};
use crate::state::BuildState;

/// Global flags every firmware can toggle, with their descriptions.
pub const GLOBAL_FLAGS: &[(&str, &str)] = &[
    ("ENABLE_NOTIFICATIONS", "Enable the framework notification subsystem"),
    ("ENABLE_SCMI_NOTIFICATIONS", "Enable SCMI notifications"),
    ("ENABLE_FAST_CHANNELS", "Enable SCMI fast channels"),
    (
        "ENABLE_RESOURCE_PERMISSIONS",
        "Enable SCMI resource permission checks",
    ),
    ("ENABLE_STATISTICS", "Enable performance statistics"),
    ("ENABLE_DEBUGGER", "Enable the interactive debugger CLI"),
    ("ENABLE_SCMI_RESET", "Enable the SCMI reset domain protocol"),
    ("ENABLE_PLAT_FVP", "Build for a fixed virtual platform"),
    (
        "ENABLE_OUTBAND_MSG_SUPPORT",
        "Enable out-of-band message support",
    ),
];

/// A feature flag and its non-persisted value sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionFlag {
    /// Flag id, also its build-state key.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Firmware-supplied initial value.
    pub initial: Option<bool>,
    /// Built-in default used when nothing else applies.
    pub default: bool,
}

impl OptionFlag {
    /// New flag with a `false` default and no initial value.
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            initial: None,
            default: false,
        }
    }

    /// Set the firmware-supplied initial value.
    pub fn with_initial(mut self, initial: bool) -> Self {
        self.initial = Some(initial);
        self
    }

    /// Preprocessor define contributed when the flag is enabled.
    pub fn define(&self) -> Define {
        let feature = self.id.strip_prefix("ENABLE_").unwrap_or(&self.id);
        Define::flag(format!("BUILD_HAS_{}", feature))
    }
}

/// Firmware hint for one flag, as written in `firmware.toml`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(untagged)]
pub enum OptionHint {
    /// `FLAG = true`
    Value(bool),
    /// `FLAG = { description = "...", initial = true }`
    Detailed {
        /// Description for firmware-specific flags.
        #[serde(default)]
        description: Option<String>,
        /// Initial value.
        #[serde(default)]
        initial: Option<bool>,
    },
}

impl OptionHint {
    fn initial(&self) -> Option<bool> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Detailed { initial, .. } => *initial,
        }
    }

    fn description(&self) -> Option<&str> {
        match self {
            Self::Value(_) => None,
            Self::Detailed { description, .. } => description.as_deref(),
        }
    }
}

/// Build the flag catalogue: global flags with firmware hints applied,
/// followed by firmware-only flags in id order.
pub fn catalogue(hints: &BTreeMap<String, OptionHint>) -> Vec<OptionFlag> {
    let mut flags: Vec<OptionFlag> = GLOBAL_FLAGS
        .iter()
        .map(|(id, description)| OptionFlag::new(*id, *description))
        .collect();

    for (id, hint) in hints {
        match flags.iter_mut().find(|f| &f.id == id) {
            Some(flag) => flag.initial = hint.initial(),
            None => flags.push(OptionFlag {
                id: id.clone(),
                description: hint.description().unwrap_or_default().to_string(),
                initial: hint.initial(),
                default: false,
            }),
        }
    }
    flags
}

/// Parse a boolean option value (`ON`/`OFF`, `TRUE`/`FALSE`, `YES`/`NO`, `1`/`0`).
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_uppercase().as_str() {
        "ON" | "TRUE" | "YES" | "1" => Some(true),
        "OFF" | "FALSE" | "NO" | "0" => Some(false),
        _ => None,
    }
}

/// Encode a boolean the way it is kept in the build state.
pub fn encode_bool(value: bool) -> &'static str {
    if value {
        "ON"
    } else {
        "OFF"
    }
}

/// Parse a `KEY=VALUE` override from the command line.
pub fn parse_override(raw: &str) -> Result<(String, bool)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| Error::config(format!("override `{}` is not KEY=VALUE", raw)))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::config(format!("override `{}` has an empty key", raw)));
    }
    let value = parse_bool(value).ok_or_else(|| {
        Error::config(format!(
            "override for `{}` must be ON or OFF, got `{}`",
            key,
            value.trim()
        ))
    })?;
    Ok((key.to_string(), value))
}

/// Resolves flags against a build-state store.
///
/// Values are memoized: once a flag is resolved it keeps its value for the
/// lifetime of the resolver.
pub struct OptionResolver<'s> {
    state: &'s dyn BuildState,
    resolved: Mutex<BTreeMap<String, bool>>,
}

impl<'s> OptionResolver<'s> {
    /// Resolver reading and writing `state`.
    pub fn new(state: &'s dyn BuildState) -> Self {
        Self {
            state,
            resolved: Mutex::new(BTreeMap::new()),
        }
    }

    /// Effective value of `flag`.
    pub fn resolve(&self, flag: &OptionFlag, explicit: Option<bool>) -> bool {
        if let Some(value) = self.memoized(&flag.id) {
            return value;
        }

        let _guard = self.state.lock(&flag.id);
        // Another resolution may have finished while we waited.
        if let Some(value) = self.memoized(&flag.id) {
            return value;
        }

        let cached = self.state.get(&flag.id).and_then(|raw| {
            let parsed = parse_bool(&raw);
            if parsed.is_none() {
                warn!(flag = %flag.id, value = %raw, "ignoring unreadable cached value");
            }
            parsed
        });

        let value = explicit
            .or(cached)
            .or(flag.initial)
            .unwrap_or(flag.default);

        if cached != Some(value) {
            self.state.set(&flag.id, encode_bool(value));
        }
        debug!(
            flag = %flag.id,
            value,
            explicit = ?explicit,
            cached = ?cached,
            initial = ?flag.initial,
            "resolved option"
        );

        self.resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(flag.id.clone(), value);
        value
    }

    /// Resolve every flag of `flags`, applying `overrides` by id.
    pub fn resolve_all(
        &self,
        flags: &[OptionFlag],
        overrides: &BTreeMap<String, bool>,
    ) -> ResolvedOptions {
        for key in overrides.keys() {
            if !flags.iter().any(|f| &f.id == key) {
                warn!(flag = %key, "override names an unknown option; ignored");
            }
        }

        let values = flags
            .iter()
            .map(|flag| {
                let value = self.resolve(flag, overrides.get(&flag.id).copied());
                (flag.clone(), value)
            })
            .collect();
        ResolvedOptions { values }
    }

    fn memoized(&self, id: &str) -> Option<bool> {
        self.resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .copied()
    }
}

/// Effective values of all flags in catalogue order.
#[derive(Debug, Clone, Default)]
pub struct ResolvedOptions {
    values: Vec<(OptionFlag, bool)>,
}

impl ResolvedOptions {
    /// Effective value of `id`, if it is a known flag.
    pub fn get(&self, id: &str) -> Option<bool> {
        self.values
            .iter()
            .find(|(f, _)| f.id == id)
            .map(|(_, v)| *v)
    }

    /// Flags and values in catalogue order.
    pub fn iter(&self) -> impl Iterator<Item = (&OptionFlag, bool)> {
        self.values.iter().map(|(f, v)| (f, *v))
    }

    /// Defines contributed by enabled flags.
    pub fn defines(&self) -> Vec<Define> {
        self.values
            .iter()
            .filter(|(_, enabled)| *enabled)
            .map(|(flag, _)| flag.define())
            .collect()
    }
}
