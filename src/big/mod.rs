pub mod bigfloat;
pub mod bignum;
pub mod convert;
pub mod stack;

pub use convert::max_pi_bf_length;
pub use stack::BigStack;
pub use stack::BigStackGuard;
pub use stack::BigFloatId;
pub use stack::BigNumId;

pub const STEP: usize = 4;

pub const LOG10_256: f64 = 2.4082399653118;
pub const LOG_256: f64 = 5.5451774444795;

/// Saturation exponent used for the maximum representable magnitude.
pub const MAX_EXPONENT: i32 = 16384 / 8;

/// Newton iterates whose byte-compare magnitude falls below this value are a
/// perfect or near perfect match, and the iteration stops at once.
pub const MATCH_EXACT: i32 = 4;

/// Below this value the iterates almost match; two consecutive almost matches
/// are required before the iteration stops. The value (like `MATCH_EXACT`) is
/// empirical.
pub const MATCH_ALMOST: i32 = 8;

pub const NEWTON_MAX_ROUNDS: usize = 25;

/// Decimal digits carried by an f64 seed approximation.
pub const SEED_DIGITS: usize = 18;

/// Derived mantissa/result lengths for one working precision. Byte lengths
/// move in lockstep: a big number carries `bn_length` mantissa bytes of which
/// the top `int_length` are the integer part, a big float carries `bf_length`
/// mantissa bytes plus a two byte exponent, and multiplication results are
/// padded out to `r_length`/`r_bf_length` before being shifted back down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Precision {
    pub bn_length: usize,
    pub int_length: usize,
    pub padding: usize,
    pub r_length: usize,
    pub shift_factor: usize,
    pub bf_length: usize,
    pub r_bf_length: usize,
    pub decimals: usize,
}

impl Precision {
    pub fn from_bn_length(bn_length: usize, int_length: usize) -> Precision {
        let mut bn_length = bn_length;
        if bn_length % STEP != 0 {
            bn_length = (bn_length / STEP + 1) * STEP;
        }
        let padding = if bn_length == STEP { STEP } else { 2 * STEP };
        let bf_length = bn_length + STEP;

        Precision {
            bn_length,
            int_length,
            padding,
            r_length: bn_length + padding,
            shift_factor: padding - int_length,
            bf_length,
            r_bf_length: bf_length + padding,
            decimals: ((bf_length - 2) as f64 * LOG10_256) as usize,
        }
    }

    pub fn from_decimals(decimals: usize, int_length: usize) -> Precision {
        let bn_length = int_length + (decimals as f64 / LOG10_256) as usize + 1;
        Precision::from_bn_length(bn_length, int_length)
    }

    /// Reduced precision used to seed a Newton iteration; just enough bytes
    /// to hold the decimal digits of the f64 starting approximation.
    pub fn newton_seed(&self) -> Precision {
        let mut bn_length = self.int_length + (SEED_DIGITS as f64 / LOG10_256) as usize + 1;
        if bn_length > self.bn_length {
            bn_length = self.bn_length;
        }
        Precision::from_bn_length(bn_length, self.int_length)
    }

    /// Doubled working precision for the next Newton round, capped at `self`.
    pub fn doubled_toward(&self, working: &Precision) -> Precision {
        let mut bn_length = working.bn_length << 1;
        if bn_length > self.bn_length {
            bn_length = self.bn_length;
        }
        Precision::from_bn_length(bn_length, self.int_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_derivation() {
        let p = Precision::from_bn_length(4, 1);
        assert_eq!(p.padding, 4);
        assert_eq!(p.r_length, 8);
        assert_eq!(p.bf_length, 8);
        assert_eq!(p.r_bf_length, 12);

        let p = Precision::from_bn_length(16, 2);
        assert_eq!(p.padding, 8);
        assert_eq!(p.r_length, 24);
        assert_eq!(p.shift_factor, 6);
        assert_eq!(p.bf_length, 20);
        assert_eq!(p.r_bf_length, 28);
        assert_eq!(p.decimals, (18.0 * LOG10_256) as usize);
    }

    #[test]
    fn bn_length_rounds_up_to_step() {
        let p = Precision::from_bn_length(10, 2);
        assert_eq!(p.bn_length, 12);
    }

    #[test]
    fn from_decimals_inverts_decimals() {
        for dec in [15usize, 30, 60, 120].iter().copied() {
            let p = Precision::from_decimals(dec, 1);
            assert!(p.decimals >= dec);
        }
    }

    #[test]
    fn newton_seed_is_capped() {
        let p = Precision::from_bn_length(8, 1);
        let seed = p.newton_seed();
        assert!(seed.bn_length <= p.bn_length);

        let big = Precision::from_decimals(200, 1);
        let seed = big.newton_seed();
        assert!(seed.bn_length < big.bn_length);
        assert_eq!(seed.bn_length % STEP, 0);
    }
}
