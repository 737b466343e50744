//! Exact rational numbers.
//!
//! Every quantity that can be fractional (rates, accumulated volume, capacity
//! ceilings) is a `Ratio`. Values are always kept in lowest terms with a
//! positive denominator, so derived equality and hashing are structural.
//!
//! Arithmetic is checked only: every operation that can exceed `i128`
//! returns `None`, and callers turn that into `Error::Overflow`. Comparison
//! never overflows.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::Error;

/// An exact rational number in lowest terms.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct Ratio {
    num: i128,
    den: i128,
}

const fn gcd(a: u128, b: u128) -> u128 {
    let (mut a, mut b) = (a, b);
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl Ratio {
    /// Zero.
    pub const ZERO: Self = Self { num: 0, den: 1 };

    /// One half.
    pub const HALF: Self = Self { num: 1, den: 2 };

    /// One.
    pub const ONE: Self = Self { num: 1, den: 1 };

    /// Creates a ratio `num / den`, or `None` if `den` is zero.
    #[must_use]
    pub const fn new(num: i128, den: i128) -> Option<Self> {
        if den == 0 {
            return None;
        }
        Some(Self::normalized(num, den))
    }

    /// Creates a ratio from an integer.
    #[must_use]
    pub const fn from_integer(n: i128) -> Self {
        Self { num: n, den: 1 }
    }

    // Callers guarantee `den != 0`.
    #[allow(clippy::cast_possible_wrap)] // gcd never exceeds |den|.
    pub(crate) const fn normalized(num: i128, den: i128) -> Self {
        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        if num == 0 {
            return Self::ZERO;
        }
        let g = gcd(num.unsigned_abs(), den.unsigned_abs()) as i128;
        Self {
            num: num / g,
            den: den / g,
        }
    }

    /// Returns the numerator (sign-carrying).
    #[must_use]
    pub const fn numer(&self) -> i128 {
        self.num
    }

    /// Returns the denominator (always positive).
    #[must_use]
    pub const fn denom(&self) -> i128 {
        self.den
    }

    /// Returns true if the value is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.num == 0
    }

    /// Returns true if the value is strictly negative.
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.num < 0
    }

    /// Returns true if the value is strictly positive.
    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.num > 0
    }

    /// Largest integer not greater than the value.
    #[must_use]
    pub const fn floor(&self) -> i128 {
        self.num.div_euclid(self.den)
    }

    /// Smallest integer not less than the value.
    #[must_use]
    pub const fn ceil(&self) -> i128 {
        -((-self.num).div_euclid(self.den))
    }

    /// Returns the reciprocal, or `None` for zero.
    #[must_use]
    pub fn recip(&self) -> Option<Self> {
        Self::new(self.den, self.num)
    }

    /// Checked addition over the least common denominator.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)] // gcd never exceeds either denominator.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        let g = gcd(self.den.unsigned_abs(), rhs.den.unsigned_abs()) as i128;
        let (lhs_scale, rhs_scale) = (rhs.den / g, self.den / g);
        let num = self
            .num
            .checked_mul(lhs_scale)?
            .checked_add(rhs.num.checked_mul(rhs_scale)?)?;
        let den = self.den.checked_mul(lhs_scale)?;
        Some(Self::normalized(num, den))
    }

    /// Checked subtraction.
    #[must_use]
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.checked_add(rhs.checked_neg()?)
    }

    /// Checked negation.
    #[must_use]
    pub const fn checked_neg(self) -> Option<Self> {
        match self.num.checked_neg() {
            Some(num) => Some(Self { num, den: self.den }),
            None => None,
        }
    }

    /// Checked multiplication.
    #[must_use]
    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        // Cross-reduce first to keep intermediates small.
        let g1 = gcd(self.num.unsigned_abs(), rhs.den.unsigned_abs()).max(1);
        let g2 = gcd(rhs.num.unsigned_abs(), self.den.unsigned_abs()).max(1);
        #[allow(clippy::cast_possible_wrap)]
        let (g1, g2) = (g1 as i128, g2 as i128);
        let num = (self.num / g1).checked_mul(rhs.num / g2)?;
        let den = (self.den / g2).checked_mul(rhs.den / g1)?;
        Some(Self::normalized(num, den))
    }

    /// Checked division; `None` on division by zero or overflow.
    #[must_use]
    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        self.checked_mul(rhs.recip()?)
    }

    /// Largest multiple of `1 / den` not greater than the value, or `None`
    /// if `den` is not positive or the result overflows.
    #[must_use]
    pub fn floor_to(self, den: i128) -> Option<Self> {
        if den <= 0 {
            return None;
        }
        let whole = self.num.div_euclid(self.den).checked_mul(den)?;
        let part = self.num.rem_euclid(self.den).checked_mul(den)? / self.den;
        Some(Self::normalized(whole.checked_add(part)?, den))
    }

    /// Approximate floating-point value, for human-facing summaries only.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Default for Ratio {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<u64> for Ratio {
    fn from(value: u64) -> Self {
        Self::from_integer(i128::from(value))
    }
}

impl From<i64> for Ratio {
    fn from(value: i64) -> Self {
        Self::from_integer(i128::from(value))
    }
}

impl PartialOrd for Ratio {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ratio {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_fractions(self.num, self.den, other.num, other.den)
    }
}

/// Compares `a / b` with `c / d` for positive `b` and `d` without forming
/// cross products: integer parts first, then the reciprocals of the
/// remainders, which shrink like Euclid's algorithm.
fn cmp_fractions(a: i128, b: i128, c: i128, d: i128) -> Ordering {
    if b == d {
        return a.cmp(&c);
    }
    let (whole_a, rem_a) = (a.div_euclid(b), a.rem_euclid(b));
    let (whole_c, rem_c) = (c.div_euclid(d), c.rem_euclid(d));
    match whole_a.cmp(&whole_c) {
        Ordering::Equal => match (rem_a, rem_c) {
            (0, 0) => Ordering::Equal,
            (0, _) => Ordering::Less,
            (_, 0) => Ordering::Greater,
            // rem_a / b < rem_c / d exactly when b / rem_a > d / rem_c.
            _ => cmp_fractions(b, rem_a, d, rem_c).reverse(),
        },
        unequal => unequal,
    }
}

impl fmt::Debug for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ratio({self})")
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl Serialize for Ratio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parses a decimal (`"0.25"`), an integer, or a fraction (`"1/3"`) exactly.
fn parse_exact(text: &str) -> Option<Ratio> {
    if let Some((num, den)) = text.split_once('/') {
        let num: i128 = num.trim().parse().ok()?;
        let den: i128 = den.trim().parse().ok()?;
        return Ratio::new(num, den);
    }
    if let Some((whole, frac)) = text.split_once('.') {
        if frac.is_empty() || frac.len() > 18 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let scale = 10i128.checked_pow(u32::try_from(frac.len()).ok()?)?;
        let negative = whole.starts_with('-');
        let whole: i128 = match whole {
            "" | "-" => 0,
            _ => whole.parse().ok()?,
        };
        let frac: i128 = frac.parse().ok()?;
        let magnitude = whole.checked_abs()?.checked_mul(scale)?.checked_add(frac)?;
        let num = if negative { -magnitude } else { magnitude };
        return Ratio::new(num, scale);
    }
    text.parse::<i128>().ok().map(Ratio::from_integer)
}

impl FromStr for Ratio {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        parse_exact(s.trim()).ok_or_else(|| Error::InvalidRatio {
            input: s.to_string(),
        })
    }
}

impl TryFrom<String> for Ratio {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(num: i128, den: i128) -> Ratio {
        Ratio::new(num, den).unwrap()
    }

    #[test]
    fn test_normalizes_to_lowest_terms() {
        let x = r(6, -8);
        assert_eq!(x.numer(), -3);
        assert_eq!(x.denom(), 4);
        assert_eq!(r(0, 5), Ratio::ZERO);
    }

    #[test]
    fn test_zero_denominator_rejected() {
        assert!(Ratio::new(1, 0).is_none());
        assert!(Ratio::ZERO.recip().is_none());
    }

    #[test]
    fn test_floor_and_ceil() {
        assert_eq!(r(7, 3).floor(), 2);
        assert_eq!(r(7, 3).ceil(), 3);
        assert_eq!(r(-7, 3).floor(), -3);
        assert_eq!(r(-7, 3).ceil(), -2);
        assert_eq!(r(6, 3).floor(), 2);
        assert_eq!(r(6, 3).ceil(), 2);
    }

    #[test]
    fn test_arithmetic_is_exact() {
        let third = r(1, 3);
        let mut sum = Ratio::ZERO;
        for _ in 0..3_000 {
            sum = sum.checked_add(third).unwrap();
        }
        assert_eq!(sum, Ratio::from(1_000u64));
        assert_eq!(third.checked_mul(Ratio::from(3u64)), Some(Ratio::ONE));
        assert_eq!(Ratio::ONE.checked_sub(third), Some(r(2, 3)));
        assert_eq!(Ratio::ONE.checked_div(third), Some(Ratio::from(3u64)));
        assert_eq!(Ratio::HALF, r(2, 4));
    }

    #[test]
    fn test_add_uses_common_denominator() {
        // The product of the denominators is 2^200; their lcm fits.
        let tiny = r(1, 1 << 100);
        assert_eq!(tiny.checked_add(tiny), Some(r(1, 1 << 99)));
        assert_eq!(tiny.checked_sub(tiny), Some(Ratio::ZERO));

        let big = r(i128::MAX, 1);
        assert_eq!(big.checked_add(Ratio::ONE), None);
        assert_eq!(big.checked_mul(Ratio::from(2u64)), None);
    }

    #[test]
    fn test_ordering_near_i128_limits() {
        let max = i128::MAX;
        // Cross products of these overflow i128.
        assert!(r(max - 1, max) < Ratio::ONE);
        assert!(r(max, max - 1) > Ratio::ONE);
        assert!(r(max - 2, max - 1) < r(max - 1, max));
        assert!(r(-(max - 1), max) < r(-(max - 2), max - 1));
        assert_eq!(r(1, 1 << 120).cmp(&r(1, 1 << 120)), Ordering::Equal);
        assert!(r(1, (1 << 120) + 1) < r(1, 1 << 120));
    }

    #[test]
    fn test_floor_to() {
        assert_eq!(r(7, 3).floor_to(10), Some(r(23, 10)));
        assert_eq!(r(-1, 3).floor_to(10), Some(r(-2, 5)));
        assert_eq!(r(1, 4).floor_to(4), Some(r(1, 4)));
        assert_eq!(r(1, 4).floor_to(0), None);
    }

    #[test]
    fn test_ordering() {
        assert!(r(1, 3) < r(1, 2));
        assert!(r(-1, 2) < Ratio::ZERO);
        assert_eq!(r(2, 4).cmp(&r(1, 2)), Ordering::Equal);
    }

    #[test]
    fn test_parse() {
        assert_eq!("1/3".parse::<Ratio>().unwrap(), r(1, 3));
        assert_eq!("0.5".parse::<Ratio>().unwrap(), r(1, 2));
        assert_eq!("-1.25".parse::<Ratio>().unwrap(), r(-5, 4));
        assert_eq!(" 7 ".parse::<Ratio>().unwrap(), Ratio::from(7u64));
        assert!("1/0".parse::<Ratio>().is_err());
        assert!("half".parse::<Ratio>().is_err());
        assert!("1.".parse::<Ratio>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", r(1, 3)), "1/3");
        assert_eq!(format!("{}", Ratio::from(4u64)), "4");
    }
}
