//! Per-run lowering switches

use serde::{Deserialize, Serialize};

/// Capability flags of the target runtime
///
/// Selected once per run; every operator decision consults it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RuntimeProfile {
    /// `&`, `|`, `~` exist as operators
    pub native_bitwise: bool,
    /// `<<` and `>>` exist as operators
    pub native_shift: bool,
    /// `//` may stand in for integer division
    pub floor_division: bool,
}

impl RuntimeProfile {
    /// Runtime without integer operators; everything goes through helpers
    pub const fn classic() -> Self {
        Self {
            native_bitwise: false,
            native_shift: false,
            floor_division: false,
        }
    }

    /// Runtime with native integer operators
    pub const fn newest() -> Self {
        Self {
            native_bitwise: true,
            native_shift: true,
            floor_division: true,
        }
    }
}

impl Default for RuntimeProfile {
    fn default() -> Self {
        Self::newest()
    }
}

/// Default maximum length of a constant string that is inlined at use sites
pub const DEFAULT_INLINE_STRING_LEN: usize = 15;

/// Options threaded through one lowering run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LowerOptions {
    /// Target runtime capabilities
    pub profile: RuntimeProfile,
    /// Longer constant strings are referenced by name
    pub inline_string_const_len: usize,
    /// Attribute types whose uses are exported, besides the metadata list
    pub export_attributes: Vec<String>,
    /// Export every attribute use
    pub export_all_attributes: bool,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            profile: RuntimeProfile::default(),
            inline_string_const_len: DEFAULT_INLINE_STRING_LEN,
            export_attributes: Vec::new(),
            export_all_attributes: false,
        }
    }
}

impl LowerOptions {
    /// Options for a profile, other switches at their defaults
    pub fn with_profile(profile: RuntimeProfile) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }
}
