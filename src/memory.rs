//! Memory-limit strings (`128M`, `1G`, `-1`, ...) and the headroom check.
//!
//! Parsing is deliberately lenient: the leading integer is taken the way a
//! loose integer cast would take it, and the last character selects the unit.
//! Unit multipliers are cumulative: `G` applies the `M` and `K` steps as
//! well, so `1G` is `1 * 1024 * 1024 * 1024`.

use std::fmt;

/// Fraction of the limit that usage must stay below to count as healthy.
pub const HEADROOM_RATIO: f64 = 0.9;

/// A parsed memory limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLimit {
    /// The `-1` sentinel: no ceiling.
    Unlimited,
    /// A ceiling in bytes. May be zero or negative for malformed input.
    Bytes(i64),
}

impl MemoryLimit {
    /// Parse a memory-limit string.
    ///
    /// Never fails; input without leading digits yields `Bytes(0)`.
    pub fn parse(raw: &str) -> Self {
        // Only the exact, untrimmed sentinel means unlimited.
        if raw == "-1" {
            return Self::Unlimited;
        }

        let trimmed = raw.trim();
        let Some(last) = trimmed.chars().last() else {
            return Self::Bytes(0);
        };

        let steps = match last.to_ascii_lowercase() {
            'g' => 3,
            'm' => 2,
            'k' => 1,
            _ => 0,
        };

        let value = (0..steps).fold(leading_integer(trimmed), |v, _| v.saturating_mul(1024));
        Self::Bytes(value)
    }

    /// Whether `usage` leaves at least 10% headroom under this limit.
    pub fn has_headroom(&self, usage: u64) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Bytes(limit) => (usage as f64) < (*limit as f64) * HEADROOM_RATIO,
        }
    }

    /// `true` when the raw string would parse into something meaningful:
    /// the `-1` sentinel or a value with at least one leading digit.
    pub fn is_well_formed(raw: &str) -> bool {
        if raw == "-1" {
            return true;
        }
        let t = raw.trim();
        let digits = t.strip_prefix(['+', '-']).unwrap_or(t);
        digits.starts_with(|c: char| c.is_ascii_digit())
    }
}

impl fmt::Display for MemoryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => f.write_str("unlimited"),
            Self::Bytes(b) => write!(f, "{b} bytes"),
        }
    }
}

/// Optional sign then digits; stops at the first non-digit. Saturates on overflow.
fn leading_integer(s: &str) -> i64 {
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| acc.saturating_mul(10).saturating_add(i64::from(d - b'0')));

    if negative {
        -magnitude
    } else {
        magnitude
    }
}
