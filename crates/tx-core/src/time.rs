//! Typed timestamps for block time
//!
//! Absolute block times and relative durations are separate types so the
//! compiler rejects meaningless arithmetic such as adding two absolute times.

use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Seconds since the start of a block
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TankTimestamp(pub f64);

/// Signed duration in seconds, usually relative to a trial start
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelativeTimestamp(pub f64);

impl TankTimestamp {
    pub fn seconds(self) -> f64 {
        self.0
    }
}

impl RelativeTimestamp {
    pub fn seconds(self) -> f64 {
        self.0
    }

    /// Round to a number of decimal places, for display
    pub fn rounded(self, decimals: i32) -> f64 {
        let factor = 10f64.powi(decimals);
        (self.0 * factor).round() / factor
    }
}

impl fmt::Display for TankTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RelativeTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<RelativeTimestamp> for TankTimestamp {
    type Output = TankTimestamp;

    fn add(self, rhs: RelativeTimestamp) -> TankTimestamp {
        TankTimestamp(self.0 + rhs.0)
    }
}

impl Sub<RelativeTimestamp> for TankTimestamp {
    type Output = TankTimestamp;

    fn sub(self, rhs: RelativeTimestamp) -> TankTimestamp {
        TankTimestamp(self.0 - rhs.0)
    }
}

impl Sub<TankTimestamp> for TankTimestamp {
    type Output = RelativeTimestamp;

    fn sub(self, rhs: TankTimestamp) -> RelativeTimestamp {
        RelativeTimestamp(self.0 - rhs.0)
    }
}

impl Add<RelativeTimestamp> for RelativeTimestamp {
    type Output = RelativeTimestamp;

    fn add(self, rhs: RelativeTimestamp) -> RelativeTimestamp {
        RelativeTimestamp(self.0 + rhs.0)
    }
}

impl Add<TankTimestamp> for RelativeTimestamp {
    type Output = TankTimestamp;

    fn add(self, rhs: TankTimestamp) -> TankTimestamp {
        rhs + self
    }
}

impl Sub<RelativeTimestamp> for RelativeTimestamp {
    type Output = RelativeTimestamp;

    fn sub(self, rhs: RelativeTimestamp) -> RelativeTimestamp {
        RelativeTimestamp(self.0 - rhs.0)
    }
}

impl Mul<f64> for RelativeTimestamp {
    type Output = RelativeTimestamp;

    fn mul(self, rhs: f64) -> RelativeTimestamp {
        RelativeTimestamp(self.0 * rhs)
    }
}

impl Div<f64> for RelativeTimestamp {
    type Output = RelativeTimestamp;

    fn div(self, rhs: f64) -> RelativeTimestamp {
        RelativeTimestamp(self.0 / rhs)
    }
}

/// Half-open time range `[start, end)` in block time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: TankTimestamp,
    pub end: TankTimestamp,
}

impl TimeRange {
    pub fn new(start: TankTimestamp, end: TankTimestamp) -> Self {
        Self { start, end }
    }

    /// Range starting at `anchor + from` and ending at `anchor + to`
    pub fn around(anchor: TankTimestamp, from: RelativeTimestamp, to: RelativeTimestamp) -> Self {
        Self {
            start: anchor + from,
            end: anchor + to,
        }
    }

    pub fn contains(&self, t: TankTimestamp) -> bool {
        self.start <= t && t < self.end
    }

    pub fn duration(&self) -> RelativeTimestamp {
        self.end - self.start
    }
}
