//! CPU affinity mask codec.
//!
//! Converts between a 32-bit affinity bitmask (bit `i` = logical core `i`)
//! and the human-editable forms accepted in settings: comma-separated core
//! lists, decimal or `0x` hex integers, and a few named presets.
//!
//! The codec is forgiving about single out-of-range indices in a list (they
//! are dropped) but never reports success on garbled input. Callers use the
//! returned flag to decide whether to fall back to "affinity disabled".

use std::fmt;
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tracing::debug;

/// Highest core index representable in the mask.
pub const MAX_CORE_INDEX: u32 = 31;

/// A 32-bit CPU affinity mask.
///
/// Zero means "affinity disabled": the process keeps whatever the OS gave it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AffinityMask(u32);

impl AffinityMask {
    pub const DISABLED: Self = Self(0);
    pub const DUAL_CORE: Self = Self(0x3);
    pub const DUAL_CORE_HT: Self = Self(0x5);
    pub const QUAD_CORE: Self = Self(0xF);
    pub const QUAD_CORE_HT: Self = Self(0x55);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Clamp a raw value into `[0, 0xFFFF_FFFF]`.
    pub fn clamped(raw: i64) -> Self {
        Self(u32::try_from(raw.max(0)).unwrap_or(u32::MAX))
    }

    fn clamped_unsigned(raw: u64) -> Self {
        Self(u32::try_from(raw).unwrap_or(u32::MAX))
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_disabled(self) -> bool {
        self.0 == 0
    }

    /// Indices of enabled cores, ascending.
    pub fn cores(self) -> impl Iterator<Item = u32> {
        (0..=MAX_CORE_INDEX).filter(move |index| self.0 & (1 << index) != 0)
    }

    /// Canonical core-list form, e.g. `"0,1,2,3"`. Empty for a zero mask.
    pub fn to_core_list(self) -> String {
        self.cores()
            .map(|index| index.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Canonical numeric form, e.g. `"0xAAAA"`.
    pub fn to_hex(self) -> String {
        format!("0x{:X}", self.0)
    }
}

impl fmt::Display for AffinityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_core_list())
    }
}

/// Physical/logical core counts used by the hyperthreading-aware presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreTopology {
    pub physical: u32,
    pub logical: u32,
}

impl CoreTopology {
    pub fn new(physical: u32, logical: u32) -> Self {
        Self { physical, logical }
    }

    pub fn has_hyperthreading(&self) -> bool {
        self.logical > self.physical
    }

    /// Read the topology of the current machine.
    ///
    /// Returns `None` when the physical core count is unavailable.
    pub fn detect() -> Option<Self> {
        let system =
            System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::new()));
        let logical = u32::try_from(system.cpus().len()).ok()?;
        let physical = u32::try_from(system.physical_core_count()?).ok()?;
        Some(Self { physical, logical })
    }
}

/// One comma-separated token of a core list.
enum CoreToken {
    Index(u32),
    OutOfRange,
    Malformed,
}

fn parse_core_token(token: &str) -> CoreToken {
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return CoreToken::Malformed;
    }
    // All digits: anything that does not fit, or exceeds 31, is just a bit we can't set.
    match token.parse::<u32>() {
        Ok(index) if index <= MAX_CORE_INDEX => CoreToken::Index(index),
        _ => CoreToken::OutOfRange,
    }
}

/// Encode a raw mask as an ascending comma-separated core list.
///
/// The input is clamped to `[0, 0xFFFF_FFFF]` first, so only the low 32
/// bits are ever examined.
pub fn encode_core_list(mask: i64) -> String {
    AffinityMask::clamped(mask).to_core_list()
}

/// Decode a comma-separated list of core indices.
///
/// Indices above 31 are dropped without failing the parse. A non-numeric
/// token fails the whole parse with no partial result. The flag is true only
/// when at least one core ended up enabled.
pub fn decode_core_list(text: &str) -> (AffinityMask, bool) {
    let mut bits = 0u32;

    for token in text.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match parse_core_token(token) {
            CoreToken::Index(index) => bits |= 1 << index,
            CoreToken::OutOfRange => debug!("Dropping out-of-range core index '{}'", token),
            CoreToken::Malformed => {
                debug!("Rejecting core list '{}': malformed token '{}'", text, token);
                return (AffinityMask::DISABLED, false);
            }
        }
    }

    let mask = AffinityMask(bits);
    (mask, !mask.is_disabled())
}

/// Decode any accepted affinity expression.
///
/// Branches are tried in order and the first that parses wins:
/// 1. `DualCore` / `QuadCore` presets (hyperthreading variants when `topology`
///    reports more logical than physical cores)
/// 2. `DisableHT`: every other logical core up to `2 * physical` (needs `topology`)
/// 3. a comma-bearing core list
/// 4. a decimal integer
/// 5. a `0x`-prefixed hex integer
pub fn decode_affinity_expression(
    text: &str,
    topology: Option<CoreTopology>,
) -> (AffinityMask, bool) {
    let text = text.trim();
    if text.is_empty() {
        return (AffinityMask::DISABLED, false);
    }

    let hyperthreaded = topology.is_some_and(|t| t.has_hyperthreading());

    if text.eq_ignore_ascii_case("DualCore") {
        let mask = if hyperthreaded {
            AffinityMask::DUAL_CORE_HT
        } else {
            AffinityMask::DUAL_CORE
        };
        return (mask, true);
    }

    if text.eq_ignore_ascii_case("QuadCore") {
        let mask = if hyperthreaded {
            AffinityMask::QUAD_CORE_HT
        } else {
            AffinityMask::QUAD_CORE
        };
        return (mask, true);
    }

    if text.eq_ignore_ascii_case("DisableHT") {
        if let Some(topology) = topology {
            return (disable_ht_mask(topology.physical), true);
        }
        debug!("DisableHT requested without a core topology");
    }

    if text.contains(',') {
        let (mask, ok) = decode_core_list(text);
        if ok {
            return (mask, true);
        }
    }

    if let Ok(raw) = text.parse::<i64>() {
        return (AffinityMask::clamped(raw), true);
    }

    if let Some(digits) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        if let Ok(raw) = u64::from_str_radix(digits, 16) {
            return (AffinityMask::clamped_unsigned(raw), true);
        }
    }

    (AffinityMask::DISABLED, false)
}

/// Every other logical core, starting at 0, across `2 * physical` logical cores.
fn disable_ht_mask(physical: u32) -> AffinityMask {
    let bits = (0..physical)
        .map(|core| core * 2)
        .take_while(|&index| index <= MAX_CORE_INDEX)
        .fold(0u32, |bits, index| bits | (1 << index));
    AffinityMask(bits)
}
