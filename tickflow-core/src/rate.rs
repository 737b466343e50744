//! Exact throughput rates.
//!
//! A `Rate` is a non-negative rational number of items per tick (one tick is
//! one microsecond). It is constructed from exactly one unit so a rate given
//! "per second" is never confused with one given "per millisecond".

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::ratio::Ratio;
use crate::types::{Tick, TICKS_PER_MS, TICKS_PER_SEC};

/// The time unit a rate is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateUnit {
    /// Items per microsecond (per tick).
    PerMicrosecond,
    /// Items per millisecond.
    PerMillisecond,
    /// Items per second.
    PerSecond,
}

impl RateUnit {
    /// Number of ticks in one unit.
    #[must_use]
    pub const fn ticks(self) -> u64 {
        match self {
            Self::PerMicrosecond => 1,
            Self::PerMillisecond => TICKS_PER_MS,
            Self::PerSecond => TICKS_PER_SEC,
        }
    }

    fn parse(unit: &str) -> Option<Self> {
        match unit {
            "us" | "µs" | "tick" => Some(Self::PerMicrosecond),
            "ms" => Some(Self::PerMillisecond),
            "s" | "sec" => Some(Self::PerSecond),
            _ => None,
        }
    }
}

/// A throughput in items per tick.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Deserialize)]
#[serde(try_from = "String")]
pub struct Rate {
    per_tick: Ratio,
}

impl Rate {
    /// The zero rate.
    pub const ZERO: Self = Self {
        per_tick: Ratio::ZERO,
    };

    /// Creates a rate of `value` items per `unit`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRate` if `value` is negative or the conversion
    /// to items per tick overflows.
    pub fn new(value: Ratio, unit: RateUnit) -> Result<Self> {
        if value.is_negative() {
            return Err(invalid(&value, "rate must not be negative"));
        }
        let per_tick = Ratio::new(1, i128::from(unit.ticks()))
            .and_then(|scale| value.checked_mul(scale))
            .ok_or_else(|| invalid(&value, "rate overflows tick granularity"))?;
        Ok(Self { per_tick })
    }

    /// Creates a rate of `num / den` items per microsecond.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRate` if `den` is zero.
    pub fn per_us(num: u64, den: u64) -> Result<Self> {
        Self::from_parts(num, den, RateUnit::PerMicrosecond)
    }

    /// Creates a rate of `num / den` items per millisecond.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRate` if `den` is zero.
    pub fn per_ms(num: u64, den: u64) -> Result<Self> {
        Self::from_parts(num, den, RateUnit::PerMillisecond)
    }

    /// Creates a rate of `num / den` items per second.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRate` if `den` is zero.
    pub fn per_sec(num: u64, den: u64) -> Result<Self> {
        Self::from_parts(num, den, RateUnit::PerSecond)
    }

    /// Creates a rate of `num / den` items per microsecond in a const
    /// context.
    ///
    /// # Panics
    ///
    /// Panics if `den` is zero. Inside a `const` item that is a compile error.
    #[must_use]
    #[allow(clippy::cast_lossless)] // `From` is not const.
    pub const fn from_fraction(num: u64, den: u64) -> Self {
        assert!(den != 0, "rate denominator must not be zero");
        Self {
            per_tick: Ratio::normalized(num as i128, den as i128),
        }
    }

    fn from_parts(num: u64, den: u64, unit: RateUnit) -> Result<Self> {
        let value = Ratio::new(i128::from(num), i128::from(den)).ok_or_else(|| {
            Error::InvalidRate {
                input: format!("{num}/{den}"),
                reason: "zero denominator",
            }
        })?;
        Self::new(value, unit)
    }

    /// Returns the rate in items per tick.
    #[must_use]
    pub const fn per_tick(&self) -> Ratio {
        self.per_tick
    }

    /// Returns true for the zero rate.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.per_tick.is_zero()
    }

    /// Returns the rate expressed in `unit`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Overflow` if the value does not fit.
    pub fn in_unit(&self, unit: RateUnit) -> Result<Ratio> {
        self.per_tick
            .checked_mul(Ratio::from(unit.ticks()))
            .ok_or(Error::Overflow {
                operation: "rate unit conversion",
            })
    }

    /// Items accumulated over `ticks` ticks.
    ///
    /// # Errors
    ///
    /// Returns `Error::Overflow` if the volume does not fit.
    pub fn volume_over(&self, ticks: Tick) -> Result<Ratio> {
        self.per_tick
            .checked_mul(Ratio::from(ticks))
            .ok_or(Error::Overflow {
                operation: "accrued volume",
            })
    }

    /// Largest rate not above this one that is a whole number of items per
    /// `unit`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Overflow` if the rounding does not fit.
    pub fn floor_to(&self, unit: RateUnit) -> Result<Self> {
        let ticks = i128::from(unit.ticks());
        let per_tick = self.per_tick.floor_to(ticks).ok_or(Error::Overflow {
            operation: "rate rounding",
        })?;
        Ok(Self { per_tick })
    }

    /// Ticks needed to accumulate `amount` items, rounded up.
    ///
    /// Returns `Some(0)` for a non-positive amount and `None` if the rate is
    /// zero and the amount can never be reached.
    #[must_use]
    pub fn ticks_to_accumulate(&self, amount: Ratio) -> Option<Tick> {
        if !amount.is_positive() {
            return Some(0);
        }
        let ticks = amount.checked_div(self.per_tick)?.ceil();
        Some(Tick::try_from(ticks).unwrap_or(Tick::MAX))
    }

    /// Sum of two rates, or `None` on overflow.
    #[must_use]
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        let per_tick = self.per_tick.checked_add(rhs.per_tick)?;
        Some(Self { per_tick })
    }

    /// Returns a copy scaled by `factor`, which must not be negative.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRate` on a negative factor or overflow.
    pub fn scaled(&self, factor: Ratio) -> Result<Self> {
        if factor.is_negative() {
            return Err(invalid(&factor, "scale factor must not be negative"));
        }
        let per_tick = self
            .per_tick
            .checked_mul(factor)
            .ok_or_else(|| invalid(&factor, "scaled rate overflows"))?;
        Ok(Self { per_tick })
    }
}

fn invalid(value: &Ratio, reason: &'static str) -> Error {
    Error::InvalidRate {
        input: value.to_string(),
        reason,
    }
}

impl FromStr for Rate {
    type Err = Error;

    /// Parses `"<value> per <unit>"`, where unit is `us`, `ms` or `s`.
    fn from_str(s: &str) -> Result<Self> {
        let err = |reason| Error::InvalidRate {
            input: s.to_string(),
            reason,
        };
        let (value, unit) = s
            .split_once(" per ")
            .ok_or_else(|| err("expected '<value> per <unit>'"))?;
        let unit = RateUnit::parse(unit.trim()).ok_or_else(|| err("unknown unit"))?;
        let value: Ratio = value.trim().parse().map_err(|_| err("not an exact number"))?;
        Self::new(value, unit).map_err(|_| err("rate must be a non-negative exact number"))
    }
}

impl TryFrom<String> for Rate {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Debug for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rate({self})")
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} per us", self.per_tick)
    }
}

impl Serialize for Rate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
