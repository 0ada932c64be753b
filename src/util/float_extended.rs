use crate::util::FloatExp;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter, Result};
use std::ops::{Add, Div, Mul, MulAssign, Neg, Sub};

/// f64 with a widened binary exponent, for magnifications and pixel sizes
/// far beyond f64 range.
#[derive(Debug, Copy, Clone)]
pub struct FloatExtended {
    pub mantissa: f64,
    pub exponent: i32,
}

impl FloatExtended {
    #[inline]
    pub fn new(mantissa: f64, exponent: i32) -> Self {
        let mut output = FloatExtended { mantissa, exponent };
        output.reduce();
        output
    }

    #[inline]
    pub fn reduce(&mut self) {
        let (temp_mantissa, added_exponent) = self.mantissa.frexp();
        self.mantissa = temp_mantissa;
        self.exponent += added_exponent;
    }

    #[inline]
    pub fn to_float(&self) -> f64 {
        self.mantissa.ldexp(self.exponent)
    }

    /// Base-10 logarithm; fine for magnitude decisions, where only a few
    /// digits matter.
    #[inline]
    pub fn log10(&self) -> f64 {
        self.mantissa.abs().log10() + self.exponent as f64 * std::f64::consts::LOG10_2
    }

    pub fn sqrt(&self) -> FloatExtended {
        let mut mantissa = self.mantissa;
        let mut exponent = self.exponent;
        if exponent & 1 != 0 {
            mantissa *= 2.0;
            exponent -= 1;
        }
        FloatExtended::new(mantissa.sqrt(), exponent / 2)
    }

    #[inline]
    pub fn abs(&self) -> FloatExtended {
        FloatExtended {
            mantissa: self.mantissa.abs(),
            exponent: self.exponent,
        }
    }
}

impl PartialEq for FloatExtended {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.mantissa == other.mantissa && self.exponent == other.exponent
    }
}

impl PartialOrd for FloatExtended {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.mantissa == 0.0 {
            return self.mantissa.partial_cmp(&other.mantissa);
        }
        if other.mantissa == 0.0 {
            return other.mantissa.partial_cmp(&self.mantissa);
        }
        match self.exponent.cmp(&other.exponent) {
            Ordering::Equal => self.mantissa.partial_cmp(&other.mantissa),
            Ordering::Greater => Some(Ordering::Greater),
            Ordering::Less => Some(Ordering::Less),
        }
    }
}

impl Mul<FloatExtended> for FloatExtended {
    type Output = FloatExtended;

    #[inline]
    fn mul(self, other: Self) -> Self::Output {
        FloatExtended::new(self.mantissa * other.mantissa, self.exponent + other.exponent)
    }
}

impl Div<FloatExtended> for FloatExtended {
    type Output = FloatExtended;

    #[inline]
    fn div(self, other: Self) -> Self::Output {
        FloatExtended::new(self.mantissa / other.mantissa, self.exponent - other.exponent)
    }
}

impl Mul<f64> for FloatExtended {
    type Output = FloatExtended;

    #[inline]
    fn mul(self, other: f64) -> Self::Output {
        FloatExtended::new(self.mantissa * other, self.exponent)
    }
}

impl Div<f64> for FloatExtended {
    type Output = FloatExtended;

    #[inline]
    fn div(self, other: f64) -> Self::Output {
        FloatExtended::new(self.mantissa / other, self.exponent)
    }
}

impl MulAssign<f64> for FloatExtended {
    #[inline]
    fn mul_assign(&mut self, other: f64) {
        self.mantissa *= other;
        self.reduce();
    }
}

impl Sub<FloatExtended> for FloatExtended {
    type Output = FloatExtended;

    #[inline]
    fn sub(self, other: Self) -> Self::Output {
        if self.mantissa == 0.0 {
            FloatExtended::new(-other.mantissa, other.exponent)
        } else if other.mantissa == 0.0 {
            self
        } else {
            let (new_mantissa, new_exponent) = match self.exponent.cmp(&other.exponent) {
                Ordering::Equal => (self.mantissa - other.mantissa, self.exponent),
                Ordering::Greater => (
                    self.mantissa - other.mantissa / 2.0f64.powi(self.exponent - other.exponent),
                    self.exponent,
                ),
                Ordering::Less => (
                    -other.mantissa + self.mantissa / 2.0f64.powi(other.exponent - self.exponent),
                    other.exponent,
                ),
            };
            FloatExtended::new(new_mantissa, new_exponent)
        }
    }
}

impl Add<FloatExtended> for FloatExtended {
    type Output = FloatExtended;

    #[inline]
    fn add(self, other: Self) -> Self::Output {
        self - (-other)
    }
}

impl Neg for FloatExtended {
    type Output = FloatExtended;

    #[inline]
    fn neg(self) -> Self::Output {
        FloatExtended {
            mantissa: -self.mantissa,
            exponent: self.exponent,
        }
    }
}

impl Display for FloatExtended {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}*2^{}", self.mantissa, self.exponent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_keeps_value() {
        let v = FloatExtended::new(12.5, 3);
        assert_eq!(v.to_float(), 100.0);
        assert!(v.mantissa.abs() >= 0.5 && v.mantissa.abs() < 1.0);
    }

    #[test]
    fn mul_div_beyond_f64_range() {
        // constructors renormalize, so compare values rather than raw
        // mantissa/exponent pairs
        let huge = FloatExtended::new(1.0, 2000);
        let product = huge * huge;
        assert!((product.log10() - 2.0 * huge.log10()).abs() < 1e-9);
        let back = product / huge;
        assert_eq!(back, huge);
    }

    #[test]
    fn ordering_uses_exponent_first() {
        let a = FloatExtended::new(0.9, 10);
        let b = FloatExtended::new(0.5, 11);
        assert!(a < b);
        let zero = FloatExtended::new(0.0, 0);
        assert!(zero < a);
    }

    #[test]
    fn sqrt_of_deep_value() {
        let v = FloatExtended::new(1.0, 2001); // odd exponent path
        let r = v.sqrt();
        let squared = r * r;
        assert_eq!(squared.exponent, v.exponent);
        assert!((squared.mantissa - v.mantissa).abs() < 1e-12);
    }

    #[test]
    fn log10_of_deep_value() {
        let v = FloatExtended::new(1.0, 1000); // 2^1000 ~ 10^301
        assert!((v.log10() - 301.03).abs() < 0.1);
    }
}
