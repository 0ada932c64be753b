//! Fixed point mantissa arithmetic. All routines work two bytes at a time in
//! 32 bit intermediates so carries and borrows are visible; a value is
//! `len` bytes of two's complement mantissa, least significant byte first.

use super::stack::{BigNumId, BigStack};
use super::Precision;

impl BigStack {
    /// r = 0
    pub fn clear_bn(&mut self, r: BigNumId, len: usize) {
        self.fill_bytes(r.0, len, 0);
    }

    /// r = maximum positive value
    pub fn max_bn(&mut self, r: BigNumId, len: usize) {
        self.fill_bytes(r.0, len - 1, 0xFF);
        self.set_byte(r.0 + len - 1, 0x7F);
    }

    /// r = n
    pub fn copy_bn(&mut self, r: BigNumId, n: BigNumId, len: usize) {
        self.move_bytes(n.0, r.0, len);
    }

    /// Three-way compare. Returns 0 on equality, otherwise +/- the number of
    /// bytes left to go when the mismatch occurred, signed by which operand
    /// was larger.
    pub fn cmp_bn(&self, n1: BigNumId, n2: BigNumId, len: usize) -> i32 {
        // signed comparison for the top word
        let v1 = self.i16_at(n1.0 + len - 2);
        let v2 = self.i16_at(n2.0 + len - 2);
        let h1 = (v1 as u16 & 0xFF00) as i16;
        let h2 = (v2 as u16 & 0xFF00) as i16;
        if v1 > v2 {
            return if h1 > h2 { len as i32 } else { len as i32 - 1 };
        } else if v1 < v2 {
            return if h1 < h2 { -(len as i32) } else { -(len as i32 - 1) };
        }

        // unsigned comparison for the rest
        let mut i = len as i32 - 4;
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

    /// n < 0 ?
    #[inline]
    pub fn is_bn_neg(&self, n: BigNumId, len: usize) -> bool {
        (self.byte(n.0 + len - 1) as i8) < 0
    }

    /// n != 0 ?
    pub fn is_bn_not_zero(&self, n: BigNumId, len: usize) -> bool {
        for i in (0..len).step_by(2) {
            if self.u16_at(n.0 + i) != 0 {
                return true;
            }
        }
        false
    }

    /// r = n1 + n2
    pub fn add_bn(&mut self, r: BigNumId, n1: BigNumId, n2: BigNumId, len: usize) {
        let mut sum: u32 = 0;
        for i in (0..len).step_by(2) {
            sum += self.u16_at(n1.0 + i) as u32 + self.u16_at(n2.0 + i) as u32;
            self.set_u16(r.0 + i, sum as u16);
            sum >>= 16;
        }
    }

    /// r += n
    pub fn add_a_bn(&mut self, r: BigNumId, n: BigNumId, len: usize) {
        self.add_bn(r, r, n, len);
    }

    /// r = n1 - n2
    pub fn sub_bn(&mut self, r: BigNumId, n1: BigNumId, n2: BigNumId, len: usize) {
        let mut diff: u32 = 0;
        for i in (0..len).step_by(2) {
            let borrow = (diff as u16 as i16) as i32 as u32; // 0 or -1
            diff = (self.u16_at(n1.0 + i) as u32)
                .wrapping_sub((self.u16_at(n2.0 + i) as u32).wrapping_sub(borrow));
            self.set_u16(r.0 + i, diff as u16);
            diff >>= 16;
        }
    }

    /// r -= n
    pub fn sub_a_bn(&mut self, r: BigNumId, n: BigNumId, len: usize) {
        self.sub_bn(r, r, n, len);
    }

    /// r = -n
    pub fn neg_bn(&mut self, r: BigNumId, n: BigNumId, len: usize) {
        let mut neg: u32 = 1; // to get the two's complement started
        let mut i = 0;
        while neg != 0 && i < len {
            neg += !self.u16_at(n.0 + i) as u32;
            self.set_u16(r.0 + i, neg as u16);
            neg >>= 16;
            i += 2;
        }
        // carry is spent, just invert the rest
        while i < len {
            let v = !self.u16_at(n.0 + i);
            self.set_u16(r.0 + i, v);
            i += 2;
        }
    }

    /// r = -r
    pub fn neg_a_bn(&mut self, r: BigNumId, len: usize) {
        self.neg_bn(r, r, len);
    }

    /// r = |n|
    pub fn abs_bn(&mut self, r: BigNumId, n: BigNumId, len: usize) {
        self.copy_bn(r, n, len);
        if self.is_bn_neg(r, len) {
            self.neg_a_bn(r, len);
        }
    }

    /// r = |r|
    pub fn abs_a_bn(&mut self, r: BigNumId, len: usize) {
        if self.is_bn_neg(r, len) {
            self.neg_a_bn(r, len);
        }
    }

    pub fn sign_bn(&self, n: BigNumId, len: usize) -> i32 {
        if self.is_bn_neg(n, len) {
            -1
        } else if self.is_bn_not_zero(n, len) {
            1
        } else {
            0
        }
    }

    /// r = 2*n
    pub fn double_bn(&mut self, r: BigNumId, n: BigNumId, len: usize) {
        let mut prod: u32 = 0;
        for i in (0..len).step_by(2) {
            prod += (self.u16_at(n.0 + i) as u32) << 1;
            self.set_u16(r.0 + i, prod as u16);
            prod >>= 16;
        }
    }

    /// r *= 2
    pub fn double_a_bn(&mut self, r: BigNumId, len: usize) {
        self.double_bn(r, r, len);
    }

    /// r = n/2, arithmetic shift preserving the sign
    pub fn half_bn(&mut self, r: BigNumId, n: BigNumId, len: usize) {
        // top word shifts in the sign bit
        let mut i = len - 2;
        let mut quot: u32 = (((self.i16_at(n.0 + i) as i32) << 16) >> 1) as u32;
        self.set_u16(r.0 + i, (quot >> 16) as u16);
        quot <<= 16;
        while i >= 2 {
            i -= 2;
            quot = quot.wrapping_add(((self.u16_at(n.0 + i) as u32) << 16) >> 1);
            self.set_u16(r.0 + i, (quot >> 16) as u16);
            quot <<= 16;
        }
    }

    /// r /= 2
    pub fn half_a_bn(&mut self, r: BigNumId, len: usize) {
        self.half_bn(r, r, len);
    }

    // one partial product added into the accumulator, with carry run-out
    #[inline]
    fn add_prod(&mut self, rp2: usize, prod: u32, carry_steps: i32) {
        let mut sum = self.u16_at(rp2) as u32 + prod;
        self.set_u16(rp2, sum as u16);
        sum >>= 16;
        let mut rp3 = rp2 + 2;
        sum += self.u16_at(rp3) as u32;
        self.set_u16(rp3, sum as u16);
        sum >>= 16;
        let mut k = 0;
        while sum != 0 && k < carry_steps {
            rp3 += 2;
            sum += self.u16_at(rp3) as u32;
            self.set_u16(rp3, sum as u16);
            sum >>= 16;
            k += 1;
        }
    }

    /// r = n1*n2, double width result of 2*len bytes.
    /// Side effect: n1 and n2 are reduced to their absolute values.
    pub fn unsafe_full_mult_bn(&mut self, r: BigNumId, n1: BigNumId, n2: BigNumId, len: usize) {
        let sign1 = self.is_bn_neg(n1, len);
        if sign1 {
            self.neg_a_bn(n1, len);
        }
        let same_var = n1 == n2;
        let mut sign2 = false;
        if !same_var {
            sign2 = self.is_bn_neg(n2, len);
            if sign2 {
                self.neg_a_bn(n2, len);
            }
        }

        let steps = (len >> 1) as i32;
        let mut double_steps = (steps << 1) - 2;
        let mut carry_steps = double_steps;
        self.clear_bn(r, len << 1);
        let mut n1p = n1.0;
        let mut rp1 = r.0;
        let mut rp2 = r.0;
        for _ in 0..steps {
            let mut n2p = n2.0;
            for _ in 0..steps {
                let prod = self.u16_at(n1p) as u32 * self.u16_at(n2p) as u32;
                self.add_prod(rp2, prod, carry_steps);
                n2p += 2;
                rp2 += 2;
                carry_steps -= 1;
            }
            n1p += 2;
            rp1 += 2;
            rp2 = rp1;
            double_steps -= 1;
            carry_steps = double_steps;
        }

        if !same_var && sign1 != sign2 {
            self.neg_a_bn(r, len << 1);
        }
    }

    /// r = n1*n2 keeping only the top `r_length` bytes of the product.
    /// Side effect: n1 and n2 are reduced to their absolute values.
    pub fn unsafe_mult_bn(&mut self, r: BigNumId, n1: BigNumId, n2: BigNumId, prec: &Precision) {
        let len = prec.bn_length;
        let r_len = prec.r_length;

        let sign1 = self.is_bn_neg(n1, len);
        if sign1 {
            self.neg_a_bn(n1, len);
        }
        let same_var = n1 == n2;
        let mut sign2 = false;
        if !same_var {
            sign2 = self.is_bn_neg(n2, len);
            if sign2 {
                self.neg_a_bn(n2, len);
            }
        }

        // low order words of n2 whose products fall entirely below the kept
        // portion are skipped
        let mut n2_base = n2.0 + (len << 1) - r_len;
        self.clear_bn(r, r_len);

        let mut steps = ((r_len - len) >> 1) as i32;
        let mut skips = (len >> 1) as i32 - steps;
        let mut double_steps = (r_len >> 1) as i32 - 2;
        let mut carry_steps = double_steps;
        let mut n1p = n1.0;
        let mut rp1 = r.0;
        let mut rp2 = r.0;
        for _ in 0..(len >> 1) {
            let mut n2p = n2_base;
            for _ in 0..steps {
                let prod = self.u16_at(n1p) as u32 * self.u16_at(n2p) as u32;
                self.add_prod(rp2, prod, carry_steps);
                n2p += 2;
                rp2 += 2;
                carry_steps -= 1;
            }
            n1p += 2;
            if skips != 0 {
                n2_base -= 2;
                steps += 1;
                skips -= 1;
            } else {
                rp1 += 2;
                double_steps -= 1;
            }
            rp2 = rp1;
            carry_steps = double_steps;
        }

        if !same_var && sign1 != sign2 {
            self.neg_a_bn(r, r_len);
        }
    }

    /// r = n^2, double width result. Exploits symmetry of the cross terms.
    /// Side effect: n is reduced to its absolute value.
    pub fn unsafe_full_square_bn(&mut self, r: BigNumId, n: BigNumId, len: usize) {
        if self.is_bn_neg(n, len) {
            self.neg_a_bn(n, len);
        }

        self.clear_bn(r, len << 1);

        let mut steps = (len >> 1) as i32 - 1;
        let mut double_steps = (steps << 1) - 1;
        let mut carry_steps = double_steps;
        let mut rp1 = r.0 + 2;
        let mut rp2 = rp1;
        let mut n1p = n.0;
        if steps != 0 {
            while steps > 0 {
                let mut n2p = n1p + 2;
                for _ in 0..steps {
                    let prod = self.u16_at(n1p) as u32 * self.u16_at(n2p) as u32;
                    self.add_prod(rp2, prod, carry_steps);
                    n2p += 2;
                    rp2 += 2;
                    carry_steps -= 1;
                }
                n1p += 2;
                rp1 += 4;
                rp2 = rp1;
                double_steps -= 2;
                carry_steps = double_steps;
                steps -= 1;
            }
            // cross terms done, double them
            self.double_a_bn(r, len << 1);
        }

        // add in the squared terms
        let mut n1p = n.0;
        let steps = (len >> 1) as i32;
        let mut double_steps = (steps << 1) - 2;
        let mut carry_steps = double_steps;
        let mut rp1 = r.0;
        for _ in 0..steps {
            let prod = self.u16_at(n1p) as u32 * self.u16_at(n1p) as u32;
            self.add_prod(rp1, prod, carry_steps);
            n1p += 2;
            rp1 += 4;
            double_steps -= 2;
            carry_steps = double_steps;
        }
    }

    /// r = n^2 keeping only the top `r_length` bytes.
    /// Side effect: n is reduced to its absolute value.
    pub fn unsafe_square_bn(&mut self, r: BigNumId, n: BigNumId, prec: &Precision) {
        let len = prec.bn_length;
        let r_len = prec.r_length;

        // a full width result avoids the boundary bookkeeping below
        if r_len == len << 1 {
            self.unsafe_full_square_bn(r, n, len);
            return;
        }

        if self.is_bn_neg(n, len) {
            self.neg_a_bn(n, len);
        }

        self.clear_bn(r, r_len);

        // whether the result starts on an odd word of the full product
        let rodd = ((((len << 1) - r_len) >> 1) & 1) as i32;
        let mut i = (len >> 1) as i32 - 1;
        let mut steps = ((r_len - len) >> 1) as i32;
        let mut double_steps = (len >> 1) as i32 + steps - 2;
        let mut carry_steps = double_steps;
        let mut skips = (i - steps) >> 1;
        let mut rp1 = r.0;
        let mut rp2 = r.0;
        let mut n1p = n.0;
        let mut n3p = n1p + (((len >> 1) - steps as usize) << 1);
        let mut n2p = n3p;
        if i != 0 {
            while i > 0 {
                for _ in 0..steps {
                    let prod = self.u16_at(n1p) as u32 * self.u16_at(n2p) as u32;
                    self.add_prod(rp2, prod, carry_steps);
                    n2p += 2;
                    rp2 += 2;
                    carry_steps -= 1;
                }
                n1p += 2;
                if skips > 0 {
                    n3p -= 2;
                    n2p = n3p;
                    steps += 1;
                    skips -= 1;
                } else if skips == 0 {
                    // only taken once
                    steps -= rodd;
                    double_steps -= rodd + 1;
                    rp1 += ((rodd + 1) << 1) as usize;
                    n2p = n1p + 2;
                    skips -= 1;
                } else {
                    steps -= 1;
                    double_steps -= 2;
                    rp1 += 4;
                    n2p = n1p + 2;
                }
                rp2 = rp1;
                carry_steps = double_steps;
                i -= 1;
            }
            // cross terms done, double them
            self.double_a_bn(r, r_len);
        }

        // add in the squared terms
        let i = (len << 1) - r_len;
        let mut rp1 = r.0 + (i & 0x2);
        let i = ((i >> 1) + 1) & !1usize;
        let mut n1p = n.0 + i;
        let steps = ((len - i) >> 1) as i32;
        let mut double_steps = (steps << 1) - 2;
        let mut carry_steps = double_steps;
        for _ in 0..steps {
            let prod = self.u16_at(n1p) as u32 * self.u16_at(n1p) as u32;
            self.add_prod(rp1, prod, carry_steps);
            n1p += 2;
            rp1 += 4;
            double_steps -= 2;
            carry_steps = double_steps;
        }
    }

    /// r = n*u
    pub fn mult_bn_int(&mut self, r: BigNumId, n: BigNumId, u: u16, len: usize) {
        let mut prod: u32 = 0;
        for i in (0..len).step_by(2) {
            prod += self.u16_at(n.0 + i) as u32 * u as u32;
            self.set_u16(r.0 + i, prod as u16);
            prod >>= 16;
        }
    }

    /// r *= u
    pub fn mult_a_bn_int(&mut self, r: BigNumId, u: u16, len: usize) {
        self.mult_bn_int(r, r, u, len);
    }

    /// r = n/u. Division by zero saturates to the signed maximum.
    /// Side effect: n is reduced to its absolute value.
    pub fn unsafe_div_bn_int(&mut self, r: BigNumId, n: BigNumId, u: u16, len: usize) {
        let sign = self.is_bn_neg(n, len);
        if sign {
            self.neg_a_bn(n, len);
        }

        if u == 0 {
            self.max_bn(r, len);
            if sign {
                self.neg_a_bn(r, len);
            }
            return;
        }

        let mut rem: u16 = 0;
        let mut i = len as i32 - 2;
        while i >= 0 {
            let full = ((rem as u32) << 16) + self.u16_at(n.0 + i as usize) as u32;
            self.set_u16(r.0 + i as usize, (full / u as u32) as u16);
            rem = (full % u as u32) as u16;
            i -= 2;
        }

        // round the bottom word to nearest from the remainder. A carry out
        // of the top word would need u == 1, which leaves no remainder.
        if rem as u32 * 2 >= u as u32 {
            let mut i = 0;
            loop {
                let v = self.u16_at(r.0 + i) as u32 + 1;
                self.set_u16(r.0 + i, v as u16);
                if v <= 0xFFFF || i + 2 >= len {
                    break;
                }
                i += 2;
            }
        }

        if sign {
            self.neg_a_bn(r, len);
        }
    }

    /// r /= u. Division by zero saturates to the signed maximum.
    pub fn div_a_bn_int(&mut self, r: BigNumId, u: u16, len: usize) {
        self.unsafe_div_bn_int(r, r, u, len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::big::BigStack;

    fn stack() -> BigStack {
        BigStack::new(1024)
    }

    fn set_bytes(s: &mut BigStack, n: BigNumId, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            s.set_byte(n.offset() + i, *b);
        }
    }

    fn get_bytes(s: &BigStack, n: BigNumId, len: usize) -> Vec<u8> {
        (0..len).map(|i| s.byte(n.offset() + i)).collect()
    }

    #[test]
    fn add_with_carry_across_words() {
        let mut s = stack();
        let mut g = s.guard();
        let a = g.alloc_bn(8);
        let b = g.alloc_bn(8);
        let r = g.alloc_bn(8);
        set_bytes(&mut g, a, &[0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]);
        set_bytes(&mut g, b, &[0x01, 0, 0, 0, 0, 0, 0, 0]);
        g.add_bn(r, a, b, 8);
        assert_eq!(get_bytes(&g, r, 8), vec![0, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn sub_borrows() {
        let mut s = stack();
        let mut g = s.guard();
        let a = g.alloc_bn(8);
        let b = g.alloc_bn(8);
        let r = g.alloc_bn(8);
        set_bytes(&mut g, a, &[0, 0, 0, 0, 1, 0, 0, 0]);
        set_bytes(&mut g, b, &[1, 0, 0, 0, 0, 0, 0, 0]);
        g.sub_bn(r, a, b, 8);
        assert_eq!(get_bytes(&g, r, 8), vec![0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]);
    }

    #[test]
    fn neg_is_twos_complement() {
        let mut s = stack();
        let mut g = s.guard();
        let a = g.alloc_bn(4);
        set_bytes(&mut g, a, &[1, 0, 0, 0]);
        g.neg_a_bn(a, 4);
        assert_eq!(get_bytes(&g, a, 4), vec![0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(g.is_bn_neg(a, 4));
        g.neg_a_bn(a, 4);
        assert_eq!(get_bytes(&g, a, 4), vec![1, 0, 0, 0]);
    }

    #[test]
    fn half_is_arithmetic_shift() {
        let mut s = stack();
        let mut g = s.guard();
        let a = g.alloc_bn(4);
        set_bytes(&mut g, a, &[0xFE, 0xFF, 0xFF, 0xFF]); // -2
        g.half_a_bn(a, 4);
        assert_eq!(get_bytes(&g, a, 4), vec![0xFF, 0xFF, 0xFF, 0xFF]); // -1
    }

    #[test]
    fn cmp_signs_and_magnitude() {
        let mut s = stack();
        let mut g = s.guard();
        let a = g.alloc_bn(4);
        let b = g.alloc_bn(4);
        set_bytes(&mut g, a, &[5, 0, 0, 0]);
        set_bytes(&mut g, b, &[9, 0, 0, 0]);
        assert!(g.cmp_bn(a, b, 4) < 0);
        assert!(g.cmp_bn(b, a, 4) > 0);
        assert_eq!(g.cmp_bn(a, a, 4), 0);
        g.neg_a_bn(b, 4);
        assert!(g.cmp_bn(a, b, 4) > 0); // positive > negative
    }

    #[test]
    fn full_mult_small_values() {
        // 0x0102 * 0x0003 == 0x0306 in the low bytes of a double wide result
        let mut s = stack();
        let mut g = s.guard();
        let a = g.alloc_bn(4);
        let b = g.alloc_bn(4);
        let r = g.alloc_bn(8);
        set_bytes(&mut g, a, &[0x02, 0x01, 0, 0]);
        set_bytes(&mut g, b, &[0x03, 0, 0, 0]);
        g.unsafe_full_mult_bn(r, a, b, 4);
        assert_eq!(get_bytes(&g, r, 8), vec![0x06, 0x03, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn full_mult_applies_sign() {
        let mut s = stack();
        let mut g = s.guard();
        let a = g.alloc_bn(4);
        let b = g.alloc_bn(4);
        let r = g.alloc_bn(8);
        set_bytes(&mut g, a, &[2, 0, 0, 0]);
        set_bytes(&mut g, b, &[3, 0, 0, 0]);
        g.neg_a_bn(b, 4);
        g.unsafe_full_mult_bn(r, a, b, 4);
        assert!(g.is_bn_neg(r, 8));
        g.neg_a_bn(r, 8);
        assert_eq!(get_bytes(&g, r, 8), vec![6, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn full_square_matches_mult() {
        let mut s = stack();
        let mut g = s.guard();
        let a = g.alloc_bn(8);
        let b = g.alloc_bn(8);
        let r1 = g.alloc_bn(16);
        let r2 = g.alloc_bn(16);
        set_bytes(&mut g, a, &[0x37, 0xA2, 0x11, 0x05, 0xC3, 0x00, 0x00, 0x00]);
        g.copy_bn(b, a, 8);
        g.unsafe_full_square_bn(r1, a, 8);
        let b2 = g.alloc_bn(8);
        g.copy_bn(b2, b, 8);
        g.unsafe_full_mult_bn(r2, b, b2, 8);
        assert_eq!(get_bytes(&g, r1, 16), get_bytes(&g, r2, 16));
    }

    #[test]
    fn mult_int_and_div_int_round_trip() {
        let mut s = stack();
        let mut g = s.guard();
        let a = g.alloc_bn(8);
        set_bytes(&mut g, a, &[0x40, 0x12, 0x9A, 0x03, 0x00, 0x00, 0x00, 0x00]);
        let before = get_bytes(&g, a, 8);
        g.mult_a_bn_int(a, 77, 8);
        g.div_a_bn_int(a, 77, 8);
        assert_eq!(get_bytes(&g, a, 8), before);
    }

    #[test]
    fn div_int_rounds_to_nearest() {
        let mut s = stack();
        let mut g = s.guard();
        let a = g.alloc_bn(4);
        set_bytes(&mut g, a, &[0x02, 0, 0, 0]);
        g.div_a_bn_int(a, 3, 4);
        // two thirds of a unit rounds up, not down to zero
        assert_eq!(get_bytes(&g, a, 4), vec![0x01, 0, 0, 0]);
    }

    #[test]
    fn div_by_zero_saturates() {
        let mut s = stack();
        let mut g = s.guard();
        let a = g.alloc_bn(4);
        set_bytes(&mut g, a, &[7, 0, 0, 0]);
        g.div_a_bn_int(a, 0, 4);
        assert_eq!(get_bytes(&g, a, 4), vec![0xFF, 0xFF, 0xFF, 0x7F]);
    }
}
