//! Connect-time tuning flags.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// Bitset of transport tuning options passed to [`Stream::connect`](crate::Stream::connect).
///
/// The bit values match the ones audio servers commonly use on the wire, so a
/// transport can forward them unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamFlags(u32);

impl StreamFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Create the stream corked.
    pub const START_CORKED: Self = Self(0x0001);
    /// Interpolate latency between timing updates.
    pub const INTERPOLATE_TIMING: Self = Self(0x0002);
    /// Allow the reported time to go backwards.
    pub const NOT_MONOTONIC: Self = Self(0x0004);
    /// Request timing updates automatically.
    pub const AUTO_TIMING_UPDATE: Self = Self(0x0008);
    /// Do not remap channels by name.
    pub const NO_REMAP_CHANNELS: Self = Self(0x0010);
    /// Do not up/down-mix channels.
    pub const NO_REMIX_CHANNELS: Self = Self(0x0020);
    /// Take the sample format from the device.
    pub const FIX_FORMAT: Self = Self(0x0040);
    /// Take the sample rate from the device.
    pub const FIX_RATE: Self = Self(0x0080);
    /// Take the channel count from the device.
    pub const FIX_CHANNELS: Self = Self(0x0100);
    /// Do not allow moving the stream to another device.
    pub const DONT_MOVE: Self = Self(0x0200);
    /// Allow the sample rate to change later.
    pub const VARIABLE_RATE: Self = Self(0x0400);
    /// Peak detection stream.
    pub const PEAK_DETECT: Self = Self(0x0800);
    /// Create the stream muted.
    pub const START_MUTED: Self = Self(0x1000);
    /// Size device buffers from the requested latency.
    pub const ADJUST_LATENCY: Self = Self(0x2000);
    /// Request data in fragment sized chunks.
    pub const EARLY_REQUESTS: Self = Self(0x4000);
    /// Do not keep the device from suspending.
    pub const DONT_INHIBIT_AUTO_SUSPEND: Self = Self(0x8000);
    /// Create the stream unmuted.
    pub const START_UNMUTED: Self = Self(0x1_0000);
    /// Fail instead of waiting when the device suspends.
    pub const FAIL_ON_SUSPEND: Self = Self(0x2_0000);
    /// Interpret volumes relative to the device.
    pub const RELATIVE_VOLUME: Self = Self(0x4_0000);
    /// Pass compressed data through untouched.
    pub const PASSTHROUGH: Self = Self(0x8_0000);

    /// Every named flag with its identifier.
    pub const NAMED: [(&'static str, StreamFlags); 21] = [
        ("noflags", Self::NONE),
        ("start_corked", Self::START_CORKED),
        ("interpolate_timing", Self::INTERPOLATE_TIMING),
        ("not_monotonic", Self::NOT_MONOTONIC),
        ("auto_timing_update", Self::AUTO_TIMING_UPDATE),
        ("no_remap_channels", Self::NO_REMAP_CHANNELS),
        ("no_remix_channels", Self::NO_REMIX_CHANNELS),
        ("fix_format", Self::FIX_FORMAT),
        ("fix_rate", Self::FIX_RATE),
        ("fix_channels", Self::FIX_CHANNELS),
        ("dont_move", Self::DONT_MOVE),
        ("variable_rate", Self::VARIABLE_RATE),
        ("peak_detect", Self::PEAK_DETECT),
        ("start_muted", Self::START_MUTED),
        ("adjust_latency", Self::ADJUST_LATENCY),
        ("early_requests", Self::EARLY_REQUESTS),
        ("dont_inhibit_auto_suspend", Self::DONT_INHIBIT_AUTO_SUSPEND),
        ("start_unmuted", Self::START_UNMUTED),
        ("fail_on_suspend", Self::FAIL_ON_SUSPEND),
        ("relative_volume", Self::RELATIVE_VOLUME),
        ("passthrough", Self::PASSTHROUGH),
    ];

    /// Build from raw bits. Unknown bits are kept.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bit value.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no bit is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Look up a single flag by identifier.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        Self::NAMED
            .iter()
            .find(|(n, _)| *n == lower)
            .map(|(_, flag)| *flag)
    }

    /// Identifiers of the set flags, lowest bit first.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(_, flag)| !flag.is_empty() && self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl BitOr for StreamFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for StreamFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for StreamFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("noflags");
        }
        f.write_str(&self.names().join("|"))
    }
}

/// Parses a `|` or `,` separated list of flag identifiers.
impl FromStr for StreamFlags {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = StreamFlags::NONE;
        for part in s.split(['|', ',']).map(str::trim).filter(|p| !p.is_empty()) {
            flags |= StreamFlags::from_name(part).ok_or_else(|| format!("unknown stream flag '{part}'"))?;
        }
        Ok(flags)
    }
}
