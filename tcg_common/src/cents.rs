use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;

use crate::op;

/// One hundred percent, expressed in basis points.
pub const BPS_SCALE: i64 = 10_000;

//--------------------------------------       Cents         ---------------------------------------------------------
/// An amount of money in the minor unit of a cent-denominated currency.
///
/// All checkout arithmetic is done on whole cents. Fractional results (percentages, multipliers) are rounded half away
/// from zero back to whole cents at the point they are produced.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Cents(i64);

op!(binary Cents, Add, add);
op!(binary Cents, Sub, sub);
op!(inplace Cents, AddAssign, add_assign);
op!(inplace Cents, SubAssign, sub_assign);
op!(unary Cents, Neg, neg);

impl Mul<i64> for Cents {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl From<i64> for Cents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Cents {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Cents {}

impl Display for Cents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

impl Cents {
    pub const ZERO: Cents = Cents(0);

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_dollars(dollars: i64) -> Self {
        Self(dollars * 100)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies the amount by a rate given in basis points, rounding half away from zero to the nearest cent.
    ///
    /// `Cents::from(20_000).mul_bps(1_000)` is 10% of $200.00, i.e. $20.00.
    pub fn mul_bps(self, bps: u32) -> Self {
        let product = i128::from(self.0) * i128::from(bps);
        let scale = i128::from(BPS_SCALE);
        let half = scale / 2;
        let rounded = if product >= 0 { (product + half) / scale } else { (product - half) / scale };
        #[allow(clippy::cast_possible_truncation)]
        Self(rounded as i64)
    }

    /// Scales the amount by a floating point multiplier and rounds half away from zero to the nearest cent.
    pub fn scale(self, multiplier: f64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let scaled = (self.0 as f64 * multiplier).round() as i64;
        Self(scaled)
    }
}
