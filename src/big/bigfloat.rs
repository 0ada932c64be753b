//! Big float arithmetic layered over the mantissa routines. A value is
//! `bf_length` mantissa bytes plus a two byte signed exponent in powers of
//! 256. The "unsafe" routines mutate their operands (absolute value,
//! de-normalized alignment); the safe wrappers copy first and delegate.
//!
//! Divide, square root, ln and atan are Newton iterations seeded from an f64
//! approximation. They run at a reduced working precision that doubles each
//! round, refining the top bytes of the full width result in place, so the
//! total work is proportional to the final precision rather than to
//! (rounds x final precision).

use super::stack::{BigFloatId, BigStack};
use super::{Precision, MATCH_ALMOST, MATCH_EXACT, MAX_EXPONENT, NEWTON_MAX_ROUNDS};

impl Precision {
    /// Lengths for treating a whole bf mantissa as a bare mantissa.
    pub(crate) fn as_mantissa(&self) -> Precision {
        Precision {
            bn_length: self.bf_length,
            r_length: self.r_bf_length,
            ..*self
        }
    }

    /// Lengths for viewing an un-shifted multiplication result as a bf.
    fn as_wide(&self) -> Precision {
        Precision {
            bf_length: self.r_bf_length,
            ..*self
        }
    }
}

impl BigStack {
    /// r = 0
    pub fn clear_bf(&mut self, r: BigFloatId, prec: &Precision) {
        self.fill_bytes(r.0, prec.bf_length + 2, 0);
    }

    /// r = n
    pub fn copy_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        self.move_bytes(n.0, r.0, prec.bf_length + 2);
    }

    #[inline]
    pub fn is_bf_neg(&self, n: BigFloatId, prec: &Precision) -> bool {
        self.is_bn_neg(n.mantissa(), prec.bf_length)
    }

    #[inline]
    pub fn is_bf_not_zero(&self, n: BigFloatId, prec: &Precision) -> bool {
        self.is_bn_not_zero(n.mantissa(), prec.bf_length)
    }

    #[inline]
    pub fn is_bf_zero(&self, n: BigFloatId, prec: &Precision) -> bool {
        !self.is_bf_not_zero(n, prec)
    }

    pub fn sign_bf(&self, n: BigFloatId, prec: &Precision) -> i32 {
        if self.is_bf_neg(n, prec) {
            -1
        } else if self.is_bf_not_zero(n, prec) {
            1
        } else {
            0
        }
    }

    /// r = maximum representable positive value
    pub fn max_bf(&mut self, r: BigFloatId, prec: &Precision) {
        self.inttobf(r, 1, prec);
        self.set_bf_exp(r, MAX_EXPONENT, prec);
    }

    /// Saturation value with the given sign. Built directly rather than by
    /// negating [`max_bf`]: normalizing a negated maximum strips a sign byte
    /// and the exponent reads back one below MAX_EXPONENT.
    pub fn max_bf_signed(&mut self, r: BigFloatId, negative: bool, prec: &Precision) {
        self.inttobf(r, if negative { -1 } else { 1 }, prec);
        self.set_bf_exp(r, MAX_EXPONENT, prec);
    }

    /// Renormalize after an operation. Overflow of the top byte shifts the
    /// mantissa down one byte and bumps the exponent; redundant sign bytes
    /// shift it up and drop the exponent; an all-zero mantissa forces the
    /// exponent to 0.
    pub fn norm_bf(&mut self, r: BigFloatId, prec: &Precision) {
        let bl = prec.bf_length;
        let hi = self.byte(r.0 + bl - 1);
        if hi != 0x00 && hi != 0xFF {
            self.move_bytes(r.0 + 1, r.0, bl - 1);
            self.set_byte(r.0 + bl - 1, if hi & 0x80 != 0 { 0xFF } else { 0x00 });
            let e = self.bf_exp(r, prec);
            self.set_bf_exp(r, e + 1, prec);
        } else {
            let mut scale = 2;
            while scale < bl && self.byte(r.0 + bl - scale) == hi {
                scale += 1;
            }
            if scale == bl && hi == 0 {
                self.set_bf_exp(r, 0, prec);
            } else {
                scale -= 2;
                if scale > 0 {
                    self.move_bytes(r.0, r.0 + scale, bl - scale - 1);
                    self.fill_bytes(r.0, scale, 0);
                    let e = self.bf_exp(r, prec);
                    self.set_bf_exp(r, e - scale as i32, prec);
                }
            }
        }
    }

    /// Normalize and force the sign byte.
    pub fn norm_sign_bf(&mut self, r: BigFloatId, positive: bool, prec: &Precision) {
        self.norm_bf(r, prec);
        self.set_byte(r.0 + prec.bf_length - 1, if positive { 0x00 } else { 0xFF });
    }

    /// De-normalize the smaller-exponent operand so both exponents match,
    /// ahead of an add or subtract. Returns the matched exponent.
    pub fn adjust_bf_add(&mut self, n1: BigFloatId, n2: BigFloatId, prec: &Precision) -> i32 {
        let bl = prec.bf_length;
        let e1 = self.bf_exp(n1, prec);
        let e2 = self.bf_exp(n2, prec);
        if e1 > e2 {
            let scale = (e1 - e2) as usize;
            if scale < bl {
                let fill = if self.is_bf_neg(n2, prec) { 0xFF } else { 0x00 };
                self.move_bytes(n2.0 + scale, n2.0, bl - scale);
                self.fill_bytes(n2.0 + bl - scale, scale, fill);
            } else {
                self.clear_bf(n2, prec);
            }
            self.set_bf_exp(n2, e1, prec);
            e1
        } else if e1 < e2 {
            let scale = (e2 - e1) as usize;
            if scale < bl {
                let fill = if self.is_bf_neg(n1, prec) { 0xFF } else { 0x00 };
                self.move_bytes(n1.0 + scale, n1.0, bl - scale);
                self.fill_bytes(n1.0 + bl - scale, scale, fill);
            } else {
                self.clear_bf(n1, prec);
            }
            self.set_bf_exp(n1, e2, prec);
            e2
        } else {
            e1
        }
    }

    /// Three-way compare; the magnitude of the result is the number of
    /// mantissa bytes left when the mismatch occurred.
    pub fn cmp_bf(&self, n1: BigFloatId, n2: BigFloatId, prec: &Precision) -> i32 {
        let bl = prec.bf_length as i32;
        let sign1 = self.sign_bf(n1, prec);
        let sign2 = self.sign_bf(n2, prec);
        if sign1 > sign2 {
            return bl;
        } else if sign1 < sign2 {
            return -bl;
        }

        let e1 = self.bf_exp(n1, prec);
        let e2 = self.bf_exp(n2, prec);
        if e1 > e2 {
            return sign1 * bl;
        } else if e1 < e2 {
            return -sign1 * bl;
        }

        let mut i = bl - 2;
        while i >= 0 {
            let v1 = self.u16_at(n1.0 + i as usize);
            let v2 = self.u16_at(n2.0 + i as usize);
            if v1 > v2 {
                return if (v1 & 0xFF00) > (v2 & 0xFF00) { i + 2 } else { i + 1 };
            } else if v1 < v2 {
                return if (v1 & 0xFF00) < (v2 & 0xFF00) { -(i + 2) } else { -(i + 1) };
            }
            i -= 2;
        }
        0
    }

    /// r = n1 + n2. Side effect: the operands may be de-normalized.
    pub fn unsafe_add_bf(&mut self, r: BigFloatId, n1: BigFloatId, n2: BigFloatId, prec: &Precision) {
        if self.is_bf_zero(n1, prec) {
            self.copy_bf(r, n2, prec);
            return;
        }
        if self.is_bf_zero(n2, prec) {
            self.copy_bf(r, n1, prec);
            return;
        }
        let e = self.adjust_bf_add(n1, n2, prec);
        self.set_bf_exp(r, e, prec);
        self.add_bn(r.mantissa(), n1.mantissa(), n2.mantissa(), prec.bf_length);
        self.norm_bf(r, prec);
    }

    /// r += n
    pub fn unsafe_add_a_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        if self.is_bf_zero(r, prec) {
            self.copy_bf(r, n, prec);
            return;
        }
        if self.is_bf_zero(n, prec) {
            return;
        }
        self.adjust_bf_add(r, n, prec);
        self.add_a_bn(r.mantissa(), n.mantissa(), prec.bf_length);
        self.norm_bf(r, prec);
    }

    /// r = n1 - n2. Side effect: the operands may be de-normalized.
    pub fn unsafe_sub_bf(&mut self, r: BigFloatId, n1: BigFloatId, n2: BigFloatId, prec: &Precision) {
        if self.is_bf_zero(n1, prec) {
            self.neg_bf(r, n2, prec);
            return;
        }
        if self.is_bf_zero(n2, prec) {
            self.copy_bf(r, n1, prec);
            return;
        }
        let e = self.adjust_bf_add(n1, n2, prec);
        self.set_bf_exp(r, e, prec);
        self.sub_bn(r.mantissa(), n1.mantissa(), n2.mantissa(), prec.bf_length);
        self.norm_bf(r, prec);
    }

    /// r -= n
    pub fn unsafe_sub_a_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        if self.is_bf_zero(r, prec) {
            self.neg_bf(r, n, prec);
            return;
        }
        if self.is_bf_zero(n, prec) {
            return;
        }
        self.adjust_bf_add(r, n, prec);
        self.sub_a_bn(r.mantissa(), n.mantissa(), prec.bf_length);
        self.norm_bf(r, prec);
    }

    /// r = -n
    pub fn neg_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        let e = self.bf_exp(n, prec);
        self.set_bf_exp(r, e, prec);
        self.neg_bn(r.mantissa(), n.mantissa(), prec.bf_length);
        self.norm_bf(r, prec);
    }

    /// r = -r
    pub fn neg_a_bf(&mut self, r: BigFloatId, prec: &Precision) {
        self.neg_a_bn(r.mantissa(), prec.bf_length);
        self.norm_bf(r, prec);
    }

    /// r = |n|
    pub fn abs_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        self.copy_bf(r, n, prec);
        if self.is_bf_neg(r, prec) {
            self.neg_a_bf(r, prec);
        }
    }

    /// r = |r|
    pub fn abs_a_bf(&mut self, r: BigFloatId, prec: &Precision) {
        if self.is_bf_neg(r, prec) {
            self.neg_a_bf(r, prec);
        }
    }

    /// r = 2*n
    pub fn double_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        let e = self.bf_exp(n, prec);
        self.set_bf_exp(r, e, prec);
        self.double_bn(r.mantissa(), n.mantissa(), prec.bf_length);
        self.norm_bf(r, prec);
    }

    /// r *= 2
    pub fn double_a_bf(&mut self, r: BigFloatId, prec: &Precision) {
        self.double_a_bn(r.mantissa(), prec.bf_length);
        self.norm_bf(r, prec);
    }

    /// r = n/2
    pub fn half_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        let e = self.bf_exp(n, prec);
        self.set_bf_exp(r, e, prec);
        self.half_bn(r.mantissa(), n.mantissa(), prec.bf_length);
        self.norm_bf(r, prec);
    }

    /// r /= 2
    pub fn half_a_bf(&mut self, r: BigFloatId, prec: &Precision) {
        self.half_a_bn(r.mantissa(), prec.bf_length);
        self.norm_bf(r, prec);
    }

    /// r = n1*n2, double width result (caller allocates 2*bf_length+2).
    /// Side effect: operands are reduced to their absolute values.
    pub fn unsafe_full_mult_bf(&mut self, r: BigFloatId, n1: BigFloatId, n2: BigFloatId, prec: &Precision) {
        if self.is_bf_zero(n1, prec) || self.is_bf_zero(n2, prec) {
            self.fill_bytes(r.0, 2 * prec.bf_length + 2, 0);
            return;
        }
        let rexp = self.bf_exp(n1, prec) + self.bf_exp(n2, prec);
        self.set_i16(r.0 + 2 * prec.bf_length, rexp as i16);
        self.unsafe_full_mult_bn(r.mantissa(), n1.mantissa(), n2.mantissa(), prec.bf_length);
        // normalizing a full width product is left to the caller
    }

    /// r = n1*n2 keeping the top `bf_length` bytes. r needs room for an
    /// `r_bf_length` intermediate (see `alloc_bf_wide`).
    /// Side effect: operands are reduced to their absolute values.
    pub fn unsafe_mult_bf(&mut self, r: BigFloatId, n1: BigFloatId, n2: BigFloatId, prec: &Precision) {
        if self.is_bf_zero(n1, prec) || self.is_bf_zero(n2, prec) {
            self.clear_bf(r, prec);
            return;
        }
        let rexp = self.bf_exp(n1, prec) + self.bf_exp(n2, prec);
        let positive = self.is_bf_neg(n1, prec) == self.is_bf_neg(n2, prec);

        self.unsafe_mult_bn(r.mantissa(), n1.mantissa(), n2.mantissa(), &prec.as_mantissa());

        let wide = prec.as_wide();
        self.set_bf_exp(r, rexp + 2, &wide); // adjust after mult
        self.norm_sign_bf(r, positive, &wide);
        self.move_bytes(r.0 + prec.padding, r.0, prec.bf_length + 2); // shift back
    }

    /// r = n^2, double width result.
    /// Side effect: n is reduced to its absolute value.
    pub fn unsafe_full_square_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        if self.is_bf_zero(n, prec) {
            self.fill_bytes(r.0, 2 * prec.bf_length + 2, 0);
            return;
        }
        let rexp = 2 * self.bf_exp(n, prec);
        self.set_i16(r.0 + 2 * prec.bf_length, rexp as i16);
        self.unsafe_full_square_bn(r.mantissa(), n.mantissa(), prec.bf_length);
    }

    /// r = n^2 keeping the top `bf_length` bytes; r needs `r_bf_length` room.
    /// Side effect: n is reduced to its absolute value.
    pub fn unsafe_square_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        if self.is_bf_zero(n, prec) {
            self.clear_bf(r, prec);
            return;
        }
        let rexp = 2 * self.bf_exp(n, prec);

        self.unsafe_square_bn(r.mantissa(), n.mantissa(), &prec.as_mantissa());

        let wide = prec.as_wide();
        self.set_bf_exp(r, rexp + 2, &wide);
        self.norm_sign_bf(r, true, &wide);
        self.move_bytes(r.0 + prec.padding, r.0, prec.bf_length + 2);
    }

    /// r = n*u. Side effect: n may be de-normalized.
    pub fn unsafe_mult_bf_int(&mut self, r: BigFloatId, n: BigFloatId, u: u16, prec: &Precision) {
        let e = self.bf_exp(n, prec);
        self.set_bf_exp(r, e, prec);
        let positive = !self.is_bf_neg(n, prec);

        // u wider than one byte would overflow the integer part of the
        // mantissa, so un-normalize n first
        if u > 0x00FF {
            self.move_bytes(n.0 + 1, n.0, prec.bf_length - 1);
            self.set_bf_exp(r, e + 1, prec);
        }
        self.mult_bn_int(r.mantissa(), n.mantissa(), u, prec.bf_length);
        self.norm_sign_bf(r, positive, prec);
    }

    /// r *= u
    pub fn mult_a_bf_int(&mut self, r: BigFloatId, u: u16, prec: &Precision) {
        let positive = !self.is_bf_neg(r, prec);
        if u > 0x00FF {
            let e = self.bf_exp(r, prec);
            self.move_bytes(r.0 + 1, r.0, prec.bf_length - 1);
            self.set_bf_exp(r, e + 1, prec);
        }
        self.mult_a_bn_int(r.mantissa(), u, prec.bf_length);
        self.norm_sign_bf(r, positive, prec);
    }

    /// r = n/u. Division by zero saturates to +/- max by n's sign.
    pub fn unsafe_div_bf_int(&mut self, r: BigFloatId, n: BigFloatId, u: u16, prec: &Precision) {
        if u == 0 {
            let neg = self.is_bf_neg(n, prec);
            self.max_bf_signed(r, neg, prec);
            return;
        }
        let e = self.bf_exp(n, prec);
        self.set_bf_exp(r, e, prec);
        self.unsafe_div_bn_int(r.mantissa(), n.mantissa(), u, prec.bf_length);
        self.norm_bf(r, prec);
    }

    /// r /= u
    pub fn div_a_bf_int(&mut self, r: BigFloatId, u: u16, prec: &Precision) {
        if u == 0 {
            let neg = self.is_bf_neg(r, prec);
            self.max_bf_signed(r, neg, prec);
            return;
        }
        self.div_a_bn_int(r.mantissa(), u, prec.bf_length);
        self.norm_bf(r, prec);
    }

    /// r = 1/n by Newton's method, r = r(2 - rn).
    /// Division by zero saturates to max. Side effect: n becomes |n|.
    pub fn unsafe_inv_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        let signflag = self.is_bf_neg(n, prec);
        if signflag {
            self.neg_a_bf(n, prec);
        }

        let fexp = self.bf_exp(n, prec);
        self.set_bf_exp(n, 0, prec); // bring within f64 range

        let f = self.bftofloat(n, prec);
        if f == 0.0 {
            self.max_bf(r, prec);
            return;
        }
        let f = 1.0 / f;

        let mut working = prec.newton_seed();
        let mut r_w = r.shifted(prec.bf_length - working.bf_length);
        self.floattobf(r_w, f, &working);

        let mut s = self.guard();
        let tmp1 = s.alloc_bf_wide(prec);
        let tmp2 = s.alloc_bf(prec);
        let mut almost_match = 0;
        for _ in 0..NEWTON_MAX_ROUNDS {
            working = prec.doubled_toward(&working);
            let delta = prec.bf_length - working.bf_length;
            r_w = r.shifted(delta);
            let n_w = n.shifted(delta);

            s.unsafe_mult_bf(tmp1, r_w, n_w, &working); // rn
            s.inttobf(tmp2, 1, &working);
            // rn converges to exactly 1
            if working.bf_length == prec.bf_length && s.cmp_bf(tmp1, tmp2, &working) == 0 {
                break;
            }
            s.inttobf(tmp2, 2, &working);
            s.unsafe_sub_a_bf(tmp2, tmp1, &working); // 2-rn
            s.unsafe_mult_bf(tmp1, r_w, tmp2, &working); // r(2-rn)
            if working.bf_length == prec.bf_length {
                let comp = s.cmp_bf(tmp1, r_w, &working).abs();
                s.copy_bf(r_w, tmp1, &working);
                if comp < MATCH_ALMOST {
                    if comp < MATCH_EXACT || almost_match == 1 {
                        break;
                    }
                    almost_match += 1;
                }
            } else {
                s.copy_bf(r_w, tmp1, &working);
            }
        }
        drop(s);

        self.set_bf_exp(n, fexp, prec); // restore the operand
        if signflag {
            self.neg_a_bf(r, prec);
        }
        let e = self.bf_exp(r, prec);
        self.set_bf_exp(r, e - fexp, prec);
    }

    /// r = n1/n2 via the inverse. 0/x is 0; division by zero saturates to
    /// +/- max with the dividend's sign. Side effect: n2 becomes |n2|.
    pub fn unsafe_div_bf(&mut self, r: BigFloatId, n1: BigFloatId, n2: BigFloatId, prec: &Precision) {
        if self.is_bf_zero(n1, prec) {
            self.clear_bf(r, prec);
            return;
        }
        if self.is_bf_zero(n2, prec) {
            let a_neg = self.is_bf_neg(n1, prec);
            self.max_bf_signed(r, a_neg, prec);
            return;
        }

        self.unsafe_inv_bf(r, n2, prec);
        let mut s = self.guard();
        let tmp1 = s.alloc_bf_wide(prec);
        s.unsafe_mult_bf(tmp1, n1, r, prec);
        s.copy_bf(r, tmp1, prec);
    }

    /// r = sqrt(n) by Newton's method, r = (r + n/r)/2.
    /// Non-positive input saturates to 0. Side effect: n becomes |n|.
    pub fn unsafe_sqrt_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        if self.is_bf_neg(n, prec) {
            self.clear_bf(r, prec);
            return;
        }
        let f = self.bftofloat(n, prec);
        if f == 0.0 {
            self.clear_bf(r, prec);
            return;
        }
        let f = f.sqrt();

        let mut working = prec.newton_seed();
        let mut r_w = r.shifted(prec.bf_length - working.bf_length);
        self.floattobf(r_w, f, &working);

        let mut s = self.guard();
        let tmp3 = s.alloc_bf(prec);
        let mut almost_match = 0;
        for _ in 0..NEWTON_MAX_ROUNDS {
            working = prec.doubled_toward(&working);
            let delta = prec.bf_length - working.bf_length;
            r_w = r.shifted(delta);
            let n_w = n.shifted(delta);

            s.unsafe_div_bf(tmp3, n_w, r_w, &working);
            s.unsafe_add_a_bf(r_w, tmp3, &working);
            s.half_a_bf(r_w, &working);
            if working.bf_length == prec.bf_length {
                let comp = s.cmp_bf(r_w, tmp3, &working).abs();
                if comp < MATCH_ALMOST {
                    if comp < MATCH_EXACT || almost_match == 1 {
                        break;
                    }
                    almost_match += 1;
                }
            }
        }
    }

    /// r = e^n by Taylor series.
    pub fn exp_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        if self.is_bf_zero(n, prec) {
            self.inttobf(r, 1, prec);
            return;
        }

        self.inttobf(r, 1, prec);
        let mut s = self.guard();
        let tmp1 = s.alloc_bf(prec);
        let tmp2 = s.alloc_bf(prec);
        let tmp3 = s.alloc_bf_wide(prec);
        s.copy_bf(tmp2, r, prec);
        let mut fact: u16 = 1;
        loop {
            s.copy_bf(tmp1, n, prec);
            s.unsafe_mult_bf(tmp3, tmp2, tmp1, prec);
            s.unsafe_div_bf_int(tmp2, tmp3, fact, prec);
            // term too small to register
            if s.bf_exp(tmp2, prec) < s.bf_exp(r, prec) - (prec.bf_length as i32 - 2) {
                break;
            }
            s.unsafe_add_a_bf(r, tmp2, prec);
            fact += 1;
        }
    }

    /// r = ln(n) by Newton's method on r' = r + n*exp(-r) - 1, iterated on
    /// the negated value. Non-positive input saturates to -max.
    /// Side effect: n becomes |n|.
    pub fn unsafe_ln_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        if self.is_bf_neg(n, prec) || self.is_bf_zero(n, prec) {
            self.max_bf_signed(r, true, prec);
            return;
        }

        let f = self.bftofloat(n, prec).ln();

        let mut working = prec.newton_seed();
        let mut delta = prec.bf_length - working.bf_length;
        let mut r_w = r.shifted(delta);
        self.floattobf(r_w, f, &working);

        let mut s = self.guard();
        let tmp2 = s.alloc_bf_wide(prec);
        let tmp4 = s.alloc_bf(prec);
        let tmp5 = s.alloc_bf(prec);
        let tmp6 = s.alloc_bf(prec);

        s.neg_a_bf(r_w, &working); // iterate on -r
        s.copy_bf(tmp5.shifted(delta), r_w, &working);

        let mut almost_match = 0;
        for _ in 0..NEWTON_MAX_ROUNDS {
            working = prec.doubled_toward(&working);
            delta = prec.bf_length - working.bf_length;
            r_w = r.shifted(delta);
            let n_w = n.shifted(delta);
            let tmp5_w = tmp5.shifted(delta);

            s.exp_bf(tmp6, r_w, &working); // exp(-r)
            s.unsafe_mult_bf(tmp2, tmp6, n_w, &working); // n*exp(-r)
            s.inttobf(tmp4, 1, &working);
            s.unsafe_sub_a_bf(tmp2, tmp4, &working); // n*exp(-r) - 1
            s.unsafe_sub_a_bf(r_w, tmp2, &working); // -r - (n*exp(-r) - 1)
            if working.bf_length == prec.bf_length {
                let comp = s.cmp_bf(r_w, tmp5_w, &working).abs();
                if comp < MATCH_ALMOST {
                    if comp < MATCH_EXACT || almost_match == 1 {
                        break;
                    }
                    almost_match += 1;
                }
            }
            s.copy_bf(tmp5_w, r_w, &working);
        }
        drop(s);

        self.neg_a_bf(r, prec); // -(-r)
    }

    /// Simultaneous sine and cosine. The argument is folded into
    /// [0, pi/4) at 2pi, pi, pi/2 and pi/4 with sign/swap bookkeeping,
    /// halved once, summed as a Taylor series and reconstructed through the
    /// double angle identities.
    /// Side effect: n ends up as |n| mod pi/4.
    pub fn unsafe_sincos_bf(
        &mut self,
        s_out: BigFloatId,
        c_out: BigFloatId,
        n: BigFloatId,
        pi: BigFloatId,
        prec: &Precision,
    ) {
        let mut sign_sin = false;
        let mut sign_cos = false;
        let mut switch_sincos = false;

        if self.is_bf_zero(n, prec) {
            self.clear_bf(s_out, prec); // sin(0) = 0
            self.inttobf(c_out, 1, prec); // cos(0) = 1
            return;
        }

        let mut s = self.guard();
        let tmp1 = s.alloc_bf_wide(prec);
        let tmp2 = s.alloc_bf_wide(prec);

        if s.is_bf_neg(n, prec) {
            sign_sin = !sign_sin; // sin is odd, cos is even
            s.neg_a_bf(n, prec);
        }

        s.double_bf(tmp1, pi, prec); // 2*pi
        while s.cmp_bf(n, tmp1, prec) >= 0 {
            s.copy_bf(tmp2, tmp1, prec);
            s.unsafe_sub_a_bf(n, tmp2, prec);
        }
        // 0 <= n < 2*pi

        s.copy_bf(tmp1, pi, prec);
        if s.cmp_bf(n, tmp1, prec) >= 0 {
            s.unsafe_sub_a_bf(n, tmp1, prec);
            sign_sin = !sign_sin;
            sign_cos = !sign_cos;
        }
        // 0 <= n < pi

        s.half_bf(tmp1, pi, prec); // pi/2
        if s.cmp_bf(n, tmp1, prec) > 0 {
            s.copy_bf(tmp2, pi, prec);
            s.unsafe_sub_bf(n, tmp2, n, prec); // pi - n
            sign_cos = !sign_cos;
        }
        // 0 <= n < pi/2

        s.half_bf(tmp1, pi, prec);
        s.half_a_bf(tmp1, prec); // pi/4
        if s.cmp_bf(n, tmp1, prec) > 0 {
            s.copy_bf(tmp2, n, prec);
            s.half_bf(tmp1, pi, prec);
            s.unsafe_sub_bf(n, tmp1, tmp2, prec); // pi/2 - n
            switch_sincos = !switch_sincos;
        }
        // 0 <= n < pi/4

        // the folds may have brought n to exactly zero
        if s.is_bf_zero(n, prec) {
            s.clear_bf(s_out, prec);
            s.inttobf(c_out, 1, prec);
            if switch_sincos {
                s.copy_bf(tmp1, s_out, prec);
                s.copy_bf(s_out, c_out, prec);
                s.copy_bf(c_out, tmp1, prec);
            }
            if sign_sin {
                s.neg_a_bf(s_out, prec);
            }
            if sign_cos {
                s.neg_a_bf(c_out, prec);
            }
            return;
        }

        // halving the angle once cuts the Taylor iterations down; undone
        // below through the double angle identities
        let halves = 1;
        for _ in 0..halves {
            s.half_a_bf(n, prec);
        }

        s.copy_bf(s_out, n, prec); // sin starts with n
        s.inttobf(c_out, 1, prec); // cos starts with 1
        s.copy_bf(tmp1, n, prec); // the current x^k/k!
        let mut fact: u16 = 2;
        let mut k = false;
        let mut sin_done = false;
        let mut cos_done = false;
        loop {
            // even terms for cosine
            s.copy_bf(tmp2, tmp1, prec);
            s.unsafe_mult_bf(tmp1, tmp2, n, prec);
            s.div_a_bf_int(tmp1, fact, prec);
            fact += 1;
            if !cos_done {
                cos_done =
                    s.bf_exp(tmp1, prec) < s.bf_exp(c_out, prec) - (prec.bf_length as i32 - 2);
                if !cos_done {
                    if k {
                        s.unsafe_add_a_bf(c_out, tmp1, prec);
                    } else {
                        s.unsafe_sub_a_bf(c_out, tmp1, prec);
                    }
                }
            }

            // odd terms for sine
            s.copy_bf(tmp2, tmp1, prec);
            s.unsafe_mult_bf(tmp1, tmp2, n, prec);
            s.div_a_bf_int(tmp1, fact, prec);
            fact += 1;
            if !sin_done {
                sin_done =
                    s.bf_exp(tmp1, prec) < s.bf_exp(s_out, prec) - (prec.bf_length as i32 - 2);
                if !sin_done {
                    if k {
                        s.unsafe_add_a_bf(s_out, tmp1, prec);
                    } else {
                        s.unsafe_sub_a_bf(s_out, tmp1, prec);
                    }
                }
            }
            k = !k;
            if cos_done && sin_done {
                break;
            }
        }

        // undo the angle halving
        for _ in 0..halves {
            s.unsafe_mult_bf(tmp2, s_out, c_out, prec);
            s.double_bf(s_out, tmp2, prec); // sin(2x) = 2 sin(x) cos(x)
            s.unsafe_square_bf(tmp2, c_out, prec);
            s.double_a_bf(tmp2, prec);
            s.inttobf(tmp1, 1, prec);
            s.unsafe_sub_bf(c_out, tmp2, tmp1, prec); // cos(2x) = 2 cos(x)^2 - 1
        }

        if switch_sincos {
            s.copy_bf(tmp1, s_out, prec);
            s.copy_bf(s_out, c_out, prec);
            s.copy_bf(c_out, tmp1, prec);
        }
        if sign_sin {
            s.neg_a_bf(s_out, prec);
        }
        if sign_cos {
            s.neg_a_bf(c_out, prec);
        }
    }

    /// r = atan(n) by Newton's method, r' = r - cos(r)(sin(r) - n cos(r)).
    /// Arguments above 1 go through atan(n) = pi/2 - atan(1/n) so the f64
    /// seed keeps enough significant digits.
    /// Side effect: n ends up as |n| or 1/|n|.
    pub fn unsafe_atan_bf(&mut self, r: BigFloatId, n: BigFloatId, pi: BigFloatId, prec: &Precision) {
        let signflag = self.is_bf_neg(n, prec);
        if signflag {
            self.neg_a_bf(n, prec);
        }

        let mut s = self.guard();
        let tmp1 = s.alloc_bf_wide(prec);
        let tmp2 = s.alloc_bf_wide(prec);
        let tmp3 = s.alloc_bf(prec);
        let tmp4 = s.alloc_bf(prec);
        let tmp5 = s.alloc_bf(prec);

        let mut f = s.bftofloat(n, prec);
        let large_arg = f > 1.0;
        if large_arg {
            s.unsafe_inv_bf(tmp3, n, prec);
            s.copy_bf(n, tmp3, prec);
            f = s.bftofloat(n, prec);
        }
        s.clear_bf(tmp3, prec);

        let mut working = prec.newton_seed();
        let mut delta = prec.bf_length - working.bf_length;
        let mut r_w = r.shifted(delta);

        let f = f.atan();
        s.floattobf(r_w, f, &working);
        s.copy_bf(tmp3.shifted(delta), r_w, &working);

        let mut almost_match = 0;
        for _ in 0..NEWTON_MAX_ROUNDS {
            working = prec.doubled_toward(&working);
            delta = prec.bf_length - working.bf_length;
            r_w = r.shifted(delta);
            let n_w = n.shifted(delta);
            let pi_w = pi.shifted(delta);
            let tmp3_w = tmp3.shifted(delta);

            s.unsafe_sincos_bf(tmp4, tmp5, tmp3_w, pi_w, &working); // sin(r), cos(r)
            s.copy_bf(tmp3_w, r_w, &working); // sincos consumed its argument
            s.copy_bf(tmp1, tmp5, &working);
            s.unsafe_mult_bf(tmp2, n_w, tmp1, &working); // n cos(r)
            s.unsafe_sub_a_bf(tmp4, tmp2, &working); // sin(r) - n cos(r)
            s.unsafe_mult_bf(tmp1, tmp5, tmp4, &working); // cos(r)(sin(r) - n cos(r))
            s.copy_bf(tmp3_w, r_w, &working);
            s.unsafe_sub_a_bf(r_w, tmp1, &working);
            if working.bf_length == prec.bf_length {
                let comp = s.cmp_bf(r_w, tmp3_w, &working).abs();
                if comp < MATCH_ALMOST {
                    if comp < MATCH_EXACT || almost_match == 1 {
                        break;
                    }
                    almost_match += 1;
                }
            }
            s.copy_bf(tmp3_w, r_w, &working);
        }

        if large_arg {
            s.half_bf(tmp3, pi, prec); // pi/2
            s.sub_a_bf(tmp3, r, prec); // pi/2 - atan(1/n)
            s.copy_bf(r, tmp3, prec);
        }
        drop(s);

        if signflag {
            self.neg_a_bf(r, prec);
        }
    }

    /// r = atan2(ny, nx), quadrant-correct.
    pub fn unsafe_atan2_bf(
        &mut self,
        r: BigFloatId,
        ny: BigFloatId,
        nx: BigFloatId,
        pi: BigFloatId,
        prec: &Precision,
    ) {
        let sign_x = self.sign_bf(nx, prec);
        let sign_y = self.sign_bf(ny, prec);

        if sign_y == 0 {
            if sign_x < 0 {
                self.copy_bf(r, pi, prec); // negative x axis, 180 deg
            } else {
                self.clear_bf(r, prec); // positive x axis, 0
            }
            return;
        }
        if sign_x == 0 {
            self.copy_bf(r, pi, prec); // y axis
            self.half_a_bf(r, prec); // +90 deg
            if sign_y < 0 {
                self.neg_a_bf(r, prec); // -90 deg
            }
            return;
        }

        if sign_y < 0 {
            self.neg_a_bf(ny, prec);
        }
        if sign_x < 0 {
            self.neg_a_bf(nx, prec);
        }
        let mut s = self.guard();
        let tmp6 = s.alloc_bf(prec);
        s.unsafe_div_bf(tmp6, ny, nx, prec);
        s.unsafe_atan_bf(r, tmp6, pi, prec);
        if sign_x < 0 {
            s.sub_bf(r, pi, r, prec);
        }
        drop(s);
        if sign_y < 0 {
            self.neg_a_bf(r, prec);
        }
    }

    // ---- safe wrappers: copy operands, delegate to the unsafe versions ----

    pub fn add_bf(&mut self, r: BigFloatId, n1: BigFloatId, n2: BigFloatId, prec: &Precision) {
        let mut s = self.guard();
        let c1 = s.alloc_bf(prec);
        let c2 = s.alloc_bf(prec);
        s.copy_bf(c1, n1, prec);
        s.copy_bf(c2, n2, prec);
        s.unsafe_add_bf(r, c1, c2, prec);
    }

    pub fn add_a_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        let mut s = self.guard();
        let c = s.alloc_bf(prec);
        s.copy_bf(c, n, prec);
        s.unsafe_add_a_bf(r, c, prec);
    }

    pub fn sub_bf(&mut self, r: BigFloatId, n1: BigFloatId, n2: BigFloatId, prec: &Precision) {
        let mut s = self.guard();
        let c1 = s.alloc_bf(prec);
        let c2 = s.alloc_bf(prec);
        s.copy_bf(c1, n1, prec);
        s.copy_bf(c2, n2, prec);
        s.unsafe_sub_bf(r, c1, c2, prec);
    }

    pub fn sub_a_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        let mut s = self.guard();
        let c = s.alloc_bf(prec);
        s.copy_bf(c, n, prec);
        s.unsafe_sub_a_bf(r, c, prec);
    }

    pub fn full_mult_bf(&mut self, r: BigFloatId, n1: BigFloatId, n2: BigFloatId, prec: &Precision) {
        let mut s = self.guard();
        let c1 = s.alloc_bf(prec);
        let c2 = s.alloc_bf(prec);
        s.copy_bf(c1, n1, prec);
        s.copy_bf(c2, n2, prec);
        s.unsafe_full_mult_bf(r, c1, c2, prec);
    }

    pub fn mult_bf(&mut self, r: BigFloatId, n1: BigFloatId, n2: BigFloatId, prec: &Precision) {
        let mut s = self.guard();
        let c1 = s.alloc_bf(prec);
        let c2 = s.alloc_bf(prec);
        let t = s.alloc_bf_wide(prec);
        s.copy_bf(c1, n1, prec);
        s.copy_bf(c2, n2, prec);
        s.unsafe_mult_bf(t, c1, c2, prec);
        s.copy_bf(r, t, prec);
    }

    pub fn full_square_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        let mut s = self.guard();
        let c = s.alloc_bf(prec);
        s.copy_bf(c, n, prec);
        s.unsafe_full_square_bf(r, c, prec);
    }

    pub fn square_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        let mut s = self.guard();
        let c = s.alloc_bf(prec);
        let t = s.alloc_bf_wide(prec);
        s.copy_bf(c, n, prec);
        s.unsafe_square_bf(t, c, prec);
        s.copy_bf(r, t, prec);
    }

    pub fn mult_bf_int(&mut self, r: BigFloatId, n: BigFloatId, u: u16, prec: &Precision) {
        let mut s = self.guard();
        let c = s.alloc_bf(prec);
        s.copy_bf(c, n, prec);
        s.unsafe_mult_bf_int(r, c, u, prec);
    }

    pub fn div_bf_int(&mut self, r: BigFloatId, n: BigFloatId, u: u16, prec: &Precision) {
        let mut s = self.guard();
        let c = s.alloc_bf(prec);
        s.copy_bf(c, n, prec);
        s.unsafe_div_bf_int(r, c, u, prec);
    }

    pub fn inv_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        let mut s = self.guard();
        let c = s.alloc_bf(prec);
        s.copy_bf(c, n, prec);
        s.unsafe_inv_bf(r, c, prec);
    }

    pub fn div_bf(&mut self, r: BigFloatId, n1: BigFloatId, n2: BigFloatId, prec: &Precision) {
        let mut s = self.guard();
        let c1 = s.alloc_bf(prec);
        let c2 = s.alloc_bf(prec);
        s.copy_bf(c1, n1, prec);
        s.copy_bf(c2, n2, prec);
        s.unsafe_div_bf(r, c1, c2, prec);
    }

    pub fn sqrt_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        let mut s = self.guard();
        let c = s.alloc_bf(prec);
        s.copy_bf(c, n, prec);
        s.unsafe_sqrt_bf(r, c, prec);
    }

    pub fn ln_bf(&mut self, r: BigFloatId, n: BigFloatId, prec: &Precision) {
        let mut s = self.guard();
        let c = s.alloc_bf(prec);
        s.copy_bf(c, n, prec);
        s.unsafe_ln_bf(r, c, prec);
    }

    pub fn sincos_bf(
        &mut self,
        s_out: BigFloatId,
        c_out: BigFloatId,
        n: BigFloatId,
        pi: BigFloatId,
        prec: &Precision,
    ) {
        let mut s = self.guard();
        let c = s.alloc_bf(prec);
        s.copy_bf(c, n, prec);
        s.unsafe_sincos_bf(s_out, c_out, c, pi, prec);
    }

    pub fn atan_bf(&mut self, r: BigFloatId, n: BigFloatId, pi: BigFloatId, prec: &Precision) {
        let mut s = self.guard();
        let c = s.alloc_bf(prec);
        s.copy_bf(c, n, prec);
        s.unsafe_atan_bf(r, c, pi, prec);
    }

    pub fn atan2_bf(
        &mut self,
        r: BigFloatId,
        ny: BigFloatId,
        nx: BigFloatId,
        pi: BigFloatId,
        prec: &Precision,
    ) {
        let mut s = self.guard();
        let cy = s.alloc_bf(prec);
        let cx = s.alloc_bf(prec);
        s.copy_bf(cy, ny, prec);
        s.copy_bf(cx, nx, prec);
        s.unsafe_atan2_bf(r, cy, cx, pi, prec);
    }

    /// Re-length a big float between two precisions, aligning at the top.
    pub fn convert_bf(
        &mut self,
        new: BigFloatId,
        old: BigFloatId,
        new_prec: &Precision,
        old_prec: &Precision,
    ) {
        self.clear_bf(new, new_prec);
        if new_prec.bf_length > old_prec.bf_length {
            self.move_bytes(
                old.0,
                new.0 + new_prec.bf_length - old_prec.bf_length,
                old_prec.bf_length + 2,
            );
        } else {
            self.move_bytes(
                old.0 + old_prec.bf_length - new_prec.bf_length,
                new.0,
                new_prec.bf_length + 2,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::big::convert::big_pi;
    use crate::big::BigStack;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn prec() -> Precision {
        Precision::from_decimals(40, 2)
    }

    #[test]
    fn norm_overflow_shifts_right() {
        let p = prec();
        let mut stack = BigStack::new(4096);
        let mut s = stack.guard();
        let f = s.alloc_bf(&p);
        // a 0x05 in the top byte is neither 0x00 nor 0xFF: overflow
        s.set_byte(f.offset() + p.bf_length - 1, 0x05);
        s.set_byte(f.offset() + p.bf_length - 2, 0x80);
        s.set_bf_exp(f, 3, &p);
        s.norm_bf(f, &p);
        assert_eq!(s.byte(f.offset() + p.bf_length - 1), 0x00);
        assert_eq!(s.byte(f.offset() + p.bf_length - 2), 0x05);
        assert_eq!(s.bf_exp(f, &p), 4);
    }

    #[test]
    fn norm_underflow_shifts_left() {
        let p = prec();
        let mut stack = BigStack::new(4096);
        let mut s = stack.guard();
        let f = s.alloc_bf(&p);
        // redundant sign bytes at the top
        s.set_byte(f.offset() + p.bf_length - 4, 0x42);
        s.set_bf_exp(f, 5, &p);
        s.norm_bf(f, &p);
        assert_eq!(s.byte(f.offset() + p.bf_length - 2), 0x42);
        assert_eq!(s.bf_exp(f, &p), 3);
    }

    #[test]
    fn norm_zero_clears_exponent() {
        let p = prec();
        let mut stack = BigStack::new(4096);
        let mut s = stack.guard();
        let f = s.alloc_bf(&p);
        s.set_bf_exp(f, 17, &p);
        s.norm_bf(f, &p);
        assert_eq!(s.bf_exp(f, &p), 0);
        assert!(s.is_bf_zero(f, &p));
    }

    #[test]
    fn add_commutes() {
        let p = prec();
        let mut stack = BigStack::new(1 << 14);
        let mut s = stack.guard();
        let a = s.alloc_bf(&p);
        let b = s.alloc_bf(&p);
        let r1 = s.alloc_bf(&p);
        let r2 = s.alloc_bf(&p);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let x: f64 = rng.gen_range(-1.0e6..1.0e6);
            let y: f64 = rng.gen_range(-1.0e6..1.0e6);
            s.floattobf(a, x, &p);
            s.floattobf(b, y, &p);
            s.add_bf(r1, a, b, &p);
            s.add_bf(r2, b, a, &p);
            assert_eq!(s.cmp_bf(r1, r2, &p), 0);
        }
    }

    #[test]
    fn add_then_sub_restores() {
        let p = prec();
        let mut stack = BigStack::new(1 << 14);
        let mut s = stack.guard();
        let a = s.alloc_bf(&p);
        let b = s.alloc_bf(&p);
        let sum = s.alloc_bf(&p);
        let back = s.alloc_bf(&p);
        s.floattobf(a, 1.5, &p);
        s.floattobf(b, 0.25, &p);
        s.add_bf(sum, a, b, &p);
        s.sub_bf(back, sum, b, &p);
        assert_eq!(s.cmp_bf(back, a, &p), 0);
        assert!((s.bftofloat(sum, &p) - 1.75).abs() < 1e-15);
    }

    #[test]
    fn mult_matches_f64() {
        let p = prec();
        let mut stack = BigStack::new(1 << 14);
        let mut s = stack.guard();
        let a = s.alloc_bf(&p);
        let b = s.alloc_bf(&p);
        let r = s.alloc_bf_wide(&p);
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let x: f64 = rng.gen_range(-100.0..100.0);
            let y: f64 = rng.gen_range(-100.0..100.0);
            s.floattobf(a, x, &p);
            s.floattobf(b, y, &p);
            s.mult_bf(r, a, b, &p);
            let got = s.bftofloat(r, &p);
            assert!(
                (got - x * y).abs() <= (x * y).abs() * 1e-14 + 1e-14,
                "{} * {} = {} (got {})",
                x,
                y,
                x * y,
                got
            );
        }
    }

    #[test]
    fn square_matches_mult() {
        let p = prec();
        let mut stack = BigStack::new(1 << 14);
        let mut s = stack.guard();
        let a = s.alloc_bf(&p);
        let r1 = s.alloc_bf_wide(&p);
        let r2 = s.alloc_bf_wide(&p);
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..20 {
            let x: f64 = rng.gen_range(-50.0..50.0);
            s.floattobf(a, x, &p);
            s.square_bf(r1, a, &p);
            s.mult_bf(r2, a, a, &p);
            assert_eq!(s.cmp_bf(r1, r2, &p), 0, "x={}", x);
        }
    }

    #[test]
    fn div_of_product_recovers_factor() {
        let p = prec();
        let mut stack = BigStack::new(1 << 15);
        let mut s = stack.guard();
        let a = s.alloc_bf(&p);
        let b = s.alloc_bf(&p);
        let ab = s.alloc_bf_wide(&p);
        let q = s.alloc_bf(&p);
        let diff = s.alloc_bf(&p);
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..20 {
            let x: f64 = rng.gen_range(0.5..800.0);
            let y: f64 = rng.gen_range(0.5..800.0);
            s.floattobf(a, x, &p);
            s.floattobf(b, y, &p);
            s.mult_bf(ab, a, b, &p);
            s.div_bf(q, ab, b, &p);
            s.sub_bf(diff, q, a, &p);
            s.abs_a_bf(diff, &p);
            // |q - a| must be far below one unit in the last mantissa byte
            if s.is_bf_not_zero(diff, &p) {
                let mag = s.bf_exp(diff, &p);
                assert!(mag < s.bf_exp(a, &p) - (p.bf_length as i32 - 3));
            }
        }
    }

    #[test]
    fn div_by_zero_saturates_with_dividend_sign() {
        let p = prec();
        let mut stack = BigStack::new(1 << 14);
        let mut s = stack.guard();
        let a = s.alloc_bf(&p);
        let z = s.alloc_bf(&p);
        let r = s.alloc_bf(&p);
        s.floattobf(a, -3.0, &p);
        s.clear_bf(z, &p);
        s.div_bf(r, a, z, &p);
        assert!(s.is_bf_neg(r, &p));
        assert_eq!(s.bf_exp(r, &p), MAX_EXPONENT);
    }

    #[test]
    fn zero_over_anything_is_zero() {
        let p = prec();
        let mut stack = BigStack::new(1 << 14);
        let mut s = stack.guard();
        let a = s.alloc_bf(&p);
        let z = s.alloc_bf(&p);
        let r = s.alloc_bf(&p);
        s.clear_bf(z, &p);
        s.floattobf(a, 42.0, &p);
        s.div_bf(r, z, a, &p);
        assert!(s.is_bf_zero(r, &p));
    }

    #[test]
    fn sqrt_matches_f64() {
        let p = prec();
        let mut stack = BigStack::new(1 << 15);
        let mut s = stack.guard();
        let a = s.alloc_bf(&p);
        let r = s.alloc_bf(&p);
        for x in [2.0f64, 10.0, 0.5, 123456.789].iter().copied() {
            s.floattobf(a, x, &p);
            s.sqrt_bf(r, a, &p);
            let got = s.bftofloat(r, &p);
            assert!((got - x.sqrt()).abs() < x.sqrt() * 1e-14, "sqrt({})", x);
        }
    }

    #[test]
    fn sqrt_of_negative_saturates_to_zero() {
        let p = prec();
        let mut stack = BigStack::new(1 << 14);
        let mut s = stack.guard();
        let a = s.alloc_bf(&p);
        let r = s.alloc_bf(&p);
        s.floattobf(a, -4.0, &p);
        s.sqrt_bf(r, a, &p);
        assert!(s.is_bf_zero(r, &p));
    }

    #[test]
    fn ln_and_exp_match_f64() {
        let p = prec();
        let mut stack = BigStack::new(1 << 16);
        let mut s = stack.guard();
        let a = s.alloc_bf(&p);
        let r = s.alloc_bf(&p);
        for x in [2.0f64, 0.7, 10.0].iter().copied() {
            s.floattobf(a, x, &p);
            s.ln_bf(r, a, &p);
            assert!((s.bftofloat(r, &p) - x.ln()).abs() < 1e-13, "ln({})", x);
        }
        for x in [1.0f64, -0.5, 2.5].iter().copied() {
            s.floattobf(a, x, &p);
            s.exp_bf(r, a, &p);
            assert!((s.bftofloat(r, &p) - x.exp()).abs() < x.exp() * 1e-13, "exp({})", x);
        }
    }

    #[test]
    fn ln_of_non_positive_saturates_negative() {
        let p = prec();
        let mut stack = BigStack::new(1 << 14);
        let mut s = stack.guard();
        let a = s.alloc_bf(&p);
        let r = s.alloc_bf(&p);
        s.clear_bf(a, &p);
        s.ln_bf(r, a, &p);
        assert!(s.is_bf_neg(r, &p));
        assert_eq!(s.bf_exp(r, &p), MAX_EXPONENT);
    }

    #[test]
    fn sincos_matches_f64() {
        let p = prec();
        let mut stack = BigStack::new(1 << 16);
        let mut s = stack.guard();
        let pi = big_pi(&mut s, &p);
        let a = s.alloc_bf(&p);
        let sn = s.alloc_bf(&p);
        let cs = s.alloc_bf(&p);
        for x in [0.3f64, 1.0, 2.5, 4.0, -1.2, 7.9].iter().copied() {
            s.floattobf(a, x, &p);
            s.sincos_bf(sn, cs, a, pi, &p);
            assert!((s.bftofloat(sn, &p) - x.sin()).abs() < 1e-13, "sin({})", x);
            assert!((s.bftofloat(cs, &p) - x.cos()).abs() < 1e-13, "cos({})", x);
        }
    }

    #[test]
    fn atan_and_atan2_match_f64() {
        let p = prec();
        let mut stack = BigStack::new(1 << 16);
        let mut s = stack.guard();
        let pi = big_pi(&mut s, &p);
        let a = s.alloc_bf(&p);
        let b = s.alloc_bf(&p);
        let r = s.alloc_bf(&p);
        for x in [0.5f64, 1.5, -2.0, 0.1].iter().copied() {
            s.floattobf(a, x, &p);
            s.atan_bf(r, a, pi, &p);
            assert!((s.bftofloat(r, &p) - x.atan()).abs() < 1e-13, "atan({})", x);
        }
        for (y, x) in [(1.0f64, 1.0f64), (1.0, -1.0), (-1.0, -1.0), (0.0, -2.0), (3.0, 0.0)]
            .iter()
            .copied()
        {
            s.floattobf(a, y, &p);
            s.floattobf(b, x, &p);
            s.atan2_bf(r, a, b, pi, &p);
            assert!(
                (s.bftofloat(r, &p) - y.atan2(x)).abs() < 1e-13,
                "atan2({}, {})",
                y,
                x
            );
        }
    }

    #[test]
    fn convert_bf_between_lengths() {
        let p_big = Precision::from_decimals(60, 2);
        let p_small = Precision::from_decimals(20, 2);
        let mut stack = BigStack::new(1 << 14);
        let mut s = stack.guard();
        let big = s.alloc_bf(&p_big);
        let small = s.alloc_bf(&p_small);
        let back = s.alloc_bf(&p_big);
        s.floattobf(big, 3.0625, &p_big);
        s.convert_bf(small, big, &p_small, &p_big);
        assert!((s.bftofloat(small, &p_small) - 3.0625).abs() < 1e-12);
        s.convert_bf(back, small, &p_big, &p_small);
        assert!((s.bftofloat(back, &p_big) - 3.0625).abs() < 1e-12);
    }
}
