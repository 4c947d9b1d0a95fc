//! JIT phase configuration.
//!
//! Phases can be switched off or forced globally or per function. A
//! function is keyed by its source context and local function id, the same
//! pair the debug tag prints. The textual form is
//!
//! ```text
//! JITLoopBody;FullJit:3.12,3.14
//! ```
//!
//! i.e. `;`-separated entries of a phase name, optionally followed by `:`
//! and a `,`-separated list of `<source>.<local>` keys. Phase names are
//! case-insensitive. An entry without keys applies to every function.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use ori_jit_ir::{LocalFunctionId, SourceContextId};

bitflags! {
    /// Compilation phases that configuration can switch.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct Phases: u8 {
        /// Compiling hot loop bodies on their own.
        const JIT_LOOP_BODY = 1 << 0;
        /// Full-function JIT compilation.
        const FULL_JIT = 1 << 1;
    }
}

impl Default for Phases {
    fn default() -> Self {
        Self::empty()
    }
}

/// Phase names as written in configuration text, in display order.
const PHASE_NAMES: [(Phases, &str); 2] = [
    (Phases::JIT_LOOP_BODY, "JITLoopBody"),
    (Phases::FULL_JIT, "FullJit"),
];

impl Phases {
    /// Look up a single phase by name, ignoring case.
    pub fn from_config_name(name: &str) -> Option<Self> {
        PHASE_NAMES
            .iter()
            .find(|(_, known)| known.eq_ignore_ascii_case(name))
            .map(|(phase, _)| *phase)
    }
}

/// Identifies one function for per-function phase switches.
pub type FunctionKey = (SourceContextId, LocalFunctionId);

/// A configuration error.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown JIT phase `{name}`")]
    UnknownPhase { name: String },

    #[error("invalid function key `{key}`, expected `<source>.<local>`")]
    InvalidFunctionKey { key: String },

    #[error("invalid boolean `{value}`, expected `1`, `0`, `true` or `false`")]
    InvalidFlag { value: String },

    #[error("{var}: {source}")]
    Variable {
        var: &'static str,
        #[source]
        source: Box<ConfigError>,
    },
}

/// Phases enabled globally and per function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PhaseList {
    global: Phases,
    functions: FxHashMap<FunctionKey, Phases>,
}

impl PhaseList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable `phases` for every function.
    pub fn enable(&mut self, phases: Phases) {
        self.global |= phases;
    }

    /// Enable `phases` for one function.
    pub fn enable_for(&mut self, phases: Phases, key: FunctionKey) {
        *self.functions.entry(key).or_default() |= phases;
    }

    /// Whether every phase in `phases` is enabled for the function `key`.
    pub fn contains(&self, phases: Phases, key: FunctionKey) -> bool {
        let local = self.functions.get(&key).copied().unwrap_or_default();
        (self.global | local).contains(phases)
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.functions.values().all(|phases| phases.is_empty())
    }

    /// Parse the textual form described in the module docs.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut list = Self::new();
        for entry in text.split(';').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (name, keys) = match entry.split_once(':') {
                Some((name, keys)) => (name.trim(), Some(keys)),
                None => (entry, None),
            };
            let Some(phase) = Phases::from_config_name(name) else {
                return Err(ConfigError::UnknownPhase {
                    name: name.to_owned(),
                });
            };
            match keys {
                None => list.enable(phase),
                Some(keys) => {
                    for key in keys.split(',') {
                        list.enable_for(phase, parse_function_key(key.trim())?);
                    }
                }
            }
        }
        Ok(list)
    }
}

fn parse_function_key(key: &str) -> Result<FunctionKey, ConfigError> {
    let invalid = || ConfigError::InvalidFunctionKey {
        key: key.to_owned(),
    };
    let (source, local) = key.split_once('.').ok_or_else(invalid)?;
    let source = source.parse::<u32>().map_err(|_| invalid())?;
    let local = local.parse::<u32>().map_err(|_| invalid())?;
    Ok((SourceContextId::new(source), LocalFunctionId::new(local)))
}

impl FromStr for PhaseList {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

/// Canonical textual form: global entries first, then per-function entries
/// with keys sorted. Parsing the output yields an equal list.
impl fmt::Display for PhaseList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut separator = "";
        for (phase, name) in PHASE_NAMES {
            if self.global.contains(phase) {
                write!(f, "{separator}{name}")?;
                separator = ";";
            }
        }
        for (phase, name) in PHASE_NAMES {
            let mut keys: Vec<FunctionKey> = self
                .functions
                .iter()
                .filter(|(_, phases)| phases.contains(phase))
                .map(|(key, _)| *key)
                .collect();
            if keys.is_empty() {
                continue;
            }
            keys.sort_unstable();
            write!(f, "{separator}{name}:")?;
            separator = ";";
            for (i, (source, local)) in keys.iter().enumerate() {
                let comma = if i == 0 { "" } else { "," };
                write!(f, "{comma}{source}.{local}")?;
            }
        }
        Ok(())
    }
}

/// Phase switches read by compilation policy.
///
/// Built once at startup and read-only afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JitConfig {
    /// Phases switched off.
    pub off: PhaseList,
    /// Phases forced on.
    pub force: PhaseList,
    /// Compile everything ahead of first execution.
    pub prejit: bool,
}

impl JitConfig {
    pub const OFF_VAR: &'static str = "ORI_JIT_OFF";
    pub const FORCE_VAR: &'static str = "ORI_JIT_FORCE";
    pub const PREJIT_VAR: &'static str = "ORI_JIT_PREJIT";

    /// Read the configuration from `ORI_JIT_OFF`, `ORI_JIT_FORCE` and
    /// `ORI_JIT_PREJIT`. Unset variables leave the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through
    /// `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let in_var = |var: &'static str| {
            move |source: ConfigError| ConfigError::Variable {
                var,
                source: Box::new(source),
            }
        };

        let mut config = Self::default();
        if let Some(text) = lookup(Self::OFF_VAR) {
            config.off = PhaseList::parse(&text).map_err(in_var(Self::OFF_VAR))?;
        }
        if let Some(text) = lookup(Self::FORCE_VAR) {
            config.force = PhaseList::parse(&text).map_err(in_var(Self::FORCE_VAR))?;
        }
        if let Some(text) = lookup(Self::PREJIT_VAR) {
            config.prejit = parse_flag(&text).map_err(in_var(Self::PREJIT_VAR))?;
        }

        tracing::debug!(
            off = %config.off,
            force = %config.force,
            prejit = config.prejit,
            "loaded JIT phase configuration"
        );
        Ok(config)
    }

    pub fn is_phase_off(&self, phase: Phases, key: FunctionKey) -> bool {
        self.off.contains(phase, key)
    }

    pub fn is_phase_forced(&self, phase: Phases, key: FunctionKey) -> bool {
        self.force.contains(phase, key)
    }
}

fn parse_flag(text: &str) -> Result<bool, ConfigError> {
    let text = text.trim();
    if text == "1" || text.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if text.is_empty() || text == "0" || text.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(ConfigError::InvalidFlag {
            value: text.to_owned(),
        })
    }
}
