//! Conversions in and out of the big number formats: integers, f64, strings
//! and the intermediate base-10 digit form used for exact decimal output.

use super::stack::{BigFloatId, BigNumId, BigStack, BigStackGuard};
use super::Precision;

/// The first 700 digits of pi in base 256, least significant byte first.
/// The last four bytes are the integer part (up to four integer bytes for a
/// fixed point view, or two mantissa bytes plus a zero exponent for a big
/// float view). The table length caps the usable precision.
static PI_BYTES: &[u8] = &[
    0x44, 0xD5, 0xDB, 0x69, 0x17, 0xDF, 0x2E, 0x56, 0x87, 0x1A,
    0xA0, 0x8C, 0x6F, 0xCA, 0xBB, 0x57, 0x5C, 0x9E, 0x82, 0xDF,
    0x00, 0x3E, 0x48, 0x7B, 0x31, 0x53, 0x60, 0x87, 0x23, 0xFD,
    0xFA, 0xB5, 0x3D, 0x32, 0xAB, 0x52, 0x05, 0xAD, 0xC8, 0x1E,
    0x50, 0x2F, 0x15, 0x6B, 0x61, 0xFD, 0xDF, 0x16, 0x75, 0x3C,
    0xF8, 0x22, 0x32, 0xDB, 0xF8, 0xE9, 0xA5, 0x8E, 0xCC, 0xA3,
    0x1F, 0xFB, 0xFE, 0x25, 0x9F, 0x67, 0x79, 0x72, 0x2C, 0x40,
    0xC6, 0x00, 0xA1, 0xD6, 0x0A, 0x32, 0x60, 0x1A, 0xBD, 0xC0,
    0x79, 0x55, 0xDB, 0xFB, 0xD3, 0xB9, 0x39, 0x5F, 0x0B, 0xD2,
    0x0F, 0x74, 0xC8, 0x45, 0x57, 0xA8, 0xCB, 0xC0, 0xB3, 0x4B,
    0x2E, 0x19, 0x07, 0x28, 0x0F, 0x66, 0xFD, 0x4A, 0x33, 0xDE,
    0x04, 0xD0, 0xE3, 0xBE, 0x09, 0xBD, 0x5E, 0xAF, 0x44, 0x45,
    0x81, 0xCC, 0x2C, 0x95, 0x30, 0x9B, 0x1F, 0x51, 0xFC, 0x6D,
    0x6F, 0xEC, 0x52, 0x3B, 0xEB, 0xB2, 0x39, 0x13, 0xB5, 0x53,
    0x6C, 0x3E, 0xAF, 0x6F, 0xFB, 0x68, 0x63, 0x24, 0x6A, 0x19,
    0xC2, 0x9E, 0x5C, 0x5E, 0xC4, 0x60, 0x9F, 0x40, 0xB6, 0x4F,
    0xA9, 0xC1, 0xBA, 0x06, 0xC0, 0x04, 0xBD, 0xE0, 0x6C, 0x97,
    0x3B, 0x4C, 0x79, 0xB6, 0x1A, 0x50, 0xFE, 0xE3, 0xF7, 0xDE,
    0xE8, 0xF6, 0xD8, 0x79, 0xD4, 0x25, 0x7B, 0x1B, 0x99, 0x80,
    0xC9, 0x72, 0x53, 0x07, 0x9B, 0xC0, 0xF1, 0x49, 0xD3, 0xEA,
    0x0F, 0xDB, 0x48, 0x12, 0x0A, 0xD0, 0x24, 0xD7, 0xD0, 0x37,
    0x3D, 0x02, 0x9B, 0x42, 0x72, 0xDF, 0xFE, 0x1B, 0x06, 0x77,
    0x3F, 0x36, 0x62, 0xAA, 0xD3, 0x4E, 0xA6, 0x6A, 0xC1, 0x56,
    0x9F, 0x44, 0x1A, 0x40, 0x73, 0x20, 0xC1, 0x85, 0xD8, 0x75,
    0x6F, 0xE0, 0xBE, 0x5E, 0x8B, 0x3B, 0xC3, 0xA5, 0x84, 0x7D,
    0xB4, 0x9F, 0x6F, 0x45, 0x19, 0x86, 0xEE, 0x8C, 0x88, 0x0E,
    0x43, 0x82, 0x3E, 0x59, 0xCA, 0x66, 0x76, 0x01, 0xAF, 0x39,
    0x1D, 0x65, 0xF1, 0xA1, 0x98, 0x2A, 0xFB, 0x7E, 0x50, 0xF0,
    0x3B, 0xBA, 0xE4, 0x3B, 0x7A, 0x13, 0x6C, 0x0B, 0xEF, 0x6E,
    0xA3, 0x33, 0x51, 0xAB, 0x28, 0xA7, 0x0F, 0x96, 0x68, 0x2F,
    0x54, 0xD8, 0xD2, 0xA0, 0x51, 0x6A, 0xF0, 0x88, 0xD3, 0xAB,
    0x61, 0x9C, 0x0C, 0x67, 0x9A, 0x6C, 0xE9, 0xF6, 0x42, 0x68,
    0xC6, 0x21, 0x5E, 0x9B, 0x1F, 0x9E, 0x4A, 0xF0, 0xC8, 0x69,
    0x04, 0x20, 0x84, 0xA4, 0x82, 0x44, 0x0B, 0x2E, 0x39, 0x42,
    0xF4, 0x83, 0xF3, 0x6F, 0x6D, 0x0F, 0xC5, 0xAC, 0x96, 0xD3,
    0x81, 0x3E, 0x89, 0x23, 0x88, 0x1B, 0x65, 0xEB, 0x02, 0x23,
    0x26, 0xDC, 0xB1, 0x75, 0x85, 0xE9, 0x5D, 0x5D, 0x84, 0xEF,
    0x32, 0x80, 0xEC, 0x5D, 0x60, 0xAC, 0x7C, 0x48, 0x91, 0xA9,
    0x21, 0xFB, 0xCC, 0x09, 0xD8, 0x61, 0x93, 0x21, 0x28, 0x66,
    0x1B, 0xE8, 0xBF, 0xC4, 0xAF, 0xB9, 0x4B, 0x6B, 0x98, 0x48,
    0x8F, 0x3B, 0x77, 0x86, 0x95, 0x28, 0x81, 0x53, 0x32, 0x7A,
    0x5C, 0xCF, 0x24, 0x6C, 0x33, 0xBA, 0xD6, 0xAF, 0x1E, 0x93,
    0x87, 0x9B, 0x16, 0x3E, 0x5C, 0xCE, 0xF6, 0x31, 0x18, 0x74,
    0x5D, 0xC5, 0xA9, 0x2B, 0x2A, 0xBC, 0x6F, 0x63, 0x11, 0x14,
    0xEE, 0xB3, 0x93, 0xE9, 0x72, 0x7C, 0xAF, 0x86, 0x54, 0xA1,
    0xCE, 0xE8, 0x41, 0x11, 0x34, 0x5C, 0xCC, 0xB4, 0xB6, 0x10,
    0xAB, 0x2A, 0x6A, 0x39, 0xCA, 0x55, 0x40, 0x14, 0xE8, 0x63,
    0x62, 0x98, 0x48, 0x57, 0x94, 0xAB, 0x55, 0xAA, 0xF3, 0x25,
    0x55, 0xE6, 0x60, 0x5C, 0x60, 0x55, 0xDA, 0x2F, 0xAF, 0x78,
    0x27, 0x4B, 0x31, 0xBD, 0xC1, 0x77, 0x15, 0xD7, 0x3E, 0x8A,
    0x1E, 0xB0, 0x8B, 0x0E, 0x9E, 0x6C, 0x0E, 0x18, 0x3A, 0x60,
    0xB0, 0xDC, 0x79, 0x8E, 0xEF, 0x38, 0xDB, 0xB8, 0x18, 0x79,
    0x41, 0xCA, 0xF0, 0x85, 0x60, 0x28, 0x23, 0xB0, 0xD1, 0xC5,
    0x13, 0x60, 0xF2, 0x2A, 0x39, 0xD5, 0x30, 0x9C, 0xB5, 0x59,
    0x5A, 0xC2, 0x1D, 0xA4, 0x54, 0x7B, 0xEE, 0x4A, 0x15, 0x82,
    0x58, 0xCD, 0x8B, 0x71, 0x58, 0xB6, 0x8E, 0x72, 0x8F, 0x74,
    0x95, 0x0D, 0x7E, 0x3D, 0x93, 0xF4, 0xA3, 0xFE, 0x58, 0xA4,
    0x69, 0x4E, 0x57, 0x71, 0xD8, 0x20, 0x69, 0x63, 0x16, 0xFC,
    0x8E, 0x85, 0xE2, 0xF2, 0x01, 0x08, 0xF7, 0x6C, 0x91, 0xB3,
    0x47, 0x99, 0xA1, 0x24, 0x99, 0x7F, 0x2C, 0xF1, 0x45, 0x90,
    0x7C, 0xBA, 0x96, 0x7E, 0x26, 0x6A, 0xED, 0xAF, 0xE1, 0xB8,
    0xB7, 0xDF, 0x1A, 0xD0, 0xDB, 0x72, 0xFD, 0x2F, 0xAC, 0xB5,
    0xDF, 0x98, 0xA6, 0x0B, 0x31, 0xD1, 0x1B, 0xFB, 0x79, 0x89,
    0xD9, 0xD5, 0x16, 0x92, 0x17, 0x09, 0x47, 0xB5, 0xB5, 0xD5,
    0x84, 0x3F, 0xDD, 0x50, 0x7C, 0xC9, 0xB7, 0x29, 0xAC, 0xC0,
    0x6C, 0x0C, 0xE9, 0x34, 0xCF, 0x66, 0x54, 0xBE, 0x77, 0x13,
    0xD0, 0x38, 0xE6, 0x21, 0x28, 0x45, 0x89, 0x6C, 0x4E, 0xEC,
    0x98, 0xFA, 0x2E, 0x08, 0xD0, 0x31, 0x9F, 0x29, 0x22, 0x38,
    0x09, 0xA4, 0x44, 0x73, 0x70, 0x03, 0x2E, 0x8A, 0x19, 0x13,
    0xD3, 0x08, 0xA3, 0x85, 0x88, 0x6A, 0x3F, 0x24,
    0x03, 0x00, 0x00, 0x00,
];

/// Highest precision for which a full-width pi constant is available.
pub fn max_pi_bf_length() -> usize {
    PI_BYTES.len() - 2
}

/// Allocate pi at the given precision from the byte table. The caller's
/// precision must not exceed the table (see [`max_pi_bf_length`]).
pub fn big_pi(s: &mut BigStackGuard<'_>, prec: &Precision) -> BigFloatId {
    let len = prec.bf_length + 2;
    assert!(len <= PI_BYTES.len(), "precision exceeds the pi table");
    let f = s.alloc_bf(prec);
    let off = PI_BYTES.len() - len;
    s.copy_slice_in(f.offset(), &PI_BYTES[off..]);
    f
}

/// Mantissa and exponent of f such that 1 <= |m| < b and f = m*b^n, found
/// with a repeated-squaring ladder so huge exponents stay cheap.
fn extract_value(f: f64, b: f64, exp_ptr: &mut i32) -> f64 {
    if b <= 0.0 || f == 0.0 {
        *exp_ptr = 0;
        return 0.0;
    }

    let orig_b = b;
    let af = f.abs();
    let mut ff = if af > 1.0 { af } else { 1.0 / af };
    let mut value = [0.0f64; 15];
    let mut n = 0;
    let mut powertwo: u32 = 1;
    let mut b = b;
    while b < ff {
        value[n] = b;
        n += 1;
        powertwo <<= 1;
        b *= b;
    }

    *exp_ptr = 0;
    while n > 0 {
        powertwo >>= 1;
        if value[n - 1] < ff {
            ff /= value[n - 1];
            *exp_ptr += powertwo as i32;
        }
        n -= 1;
    }
    if f < 0.0 {
        ff = -ff;
    }
    if af < 1.0 {
        ff = orig_b / ff;
        *exp_ptr = -*exp_ptr - 1;
    }
    ff
}

/// f*b^n by binary exponentiation.
fn scale_value(f: f64, b: f64, n: i32) -> f64 {
    if b == 0.0 || f == 0.0 {
        return 0.0;
    }
    if n == 0 {
        return f;
    }

    let mut total = 1.0;
    let mut b = b;
    let mut an = n.abs();
    while an != 0 {
        if an & 1 != 0 {
            total *= b;
        }
        b *= b;
        an >>= 1;
    }
    if n > 0 {
        f * total
    } else {
        f / total
    }
}

/// m and n with 1 <= |m| < 256 and f = m*256^n; like frexp in base 256.
pub fn extract_256(f: f64, exp_ptr: &mut i32) -> f64 {
    extract_value(f, 256.0, exp_ptr)
}

/// f*256^n; like ldexp in base 256.
pub fn scale_256(f: f64, n: i32) -> f64 {
    scale_value(f, 256.0, n)
}

impl BigStack {
    /// r = v as a big float.
    pub fn inttobf(&mut self, r: BigFloatId, v: i64, prec: &Precision) {
        self.clear_bf(r, prec);
        self.set_u32(r.0 + prec.bf_length - 4, v as i32 as u32);
        self.set_bf_exp(r, 2, prec);
        self.norm_bf(r, prec);
    }

    /// floor(f) as an integer; 2.999... gives 2. Saturates when the
    /// exponent carries the value out of 32-bit range.
    pub fn bftoint(&self, f: BigFloatId, prec: &Precision) -> i64 {
        let fexp = self.bf_exp(f, prec);
        if fexp > 3 {
            return if self.is_bf_neg(f, prec) {
                -0x7FFF_FFFF
            } else {
                0x7FFF_FFFF
            };
        }
        // top five mantissa bytes, sign byte included, so negatives keep
        // their sign through the arithmetic shift below
        let mut v: i64 = if self.is_bf_neg(f, prec) { -1 } else { 0 };
        for i in (0..5).rev() {
            v = (v << 8) | self.byte(f.0 + prec.bf_length - 5 + i) as i64;
        }
        let shift = (8 * (3 - fexp)).min(62);
        v >> shift
    }

    /// n = floor(f) in fixed point. Requires bf_length >= bn_length+2.
    pub fn bftobn(&mut self, n: BigNumId, f: BigFloatId, prec: &Precision) {
        let fexp = self.bf_exp(f, prec);
        if fexp >= prec.int_length as i32 {
            // too big, saturate
            self.max_bn(n, prec.bn_length);
            if self.is_bf_neg(f, prec) {
                self.neg_a_bn(n, prec.bn_length);
            }
            return;
        }
        if -fexp > (prec.bn_length - prec.int_length) as i32 {
            // too small to register
            self.clear_bn(n, prec.bn_length);
            return;
        }

        let movebytes = (prec.bn_length as i32 - prec.int_length as i32 + fexp + 1) as usize;
        self.move_bytes(f.0 + prec.bf_length - movebytes - 1, n.0, movebytes);
        let hibyte = self.byte(f.0 + prec.bf_length - 1);
        self.fill_bytes(n.0 + movebytes, prec.bn_length - movebytes, hibyte); // sign extend
    }

    /// f = n, widening a fixed point value into a big float.
    pub fn bntobf(&mut self, f: BigFloatId, n: BigNumId, prec: &Precision) {
        self.move_bytes(n.0, f.0 + prec.bf_length - prec.bn_length - 1, prec.bn_length);
        self.fill_bytes(f.0, prec.bf_length - prec.bn_length - 1, 0);
        let sign = if self.is_bn_neg(n, prec.bn_length) { 0xFF } else { 0x00 };
        self.set_byte(f.0 + prec.bf_length - 1, sign);
        self.set_bf_exp(f, prec.int_length as i32 - 1, prec);
        self.norm_bf(f, prec);
    }

    /// r = f in fixed point.
    pub fn floattobn(&mut self, r: BigNumId, f: f64, prec: &Precision) {
        self.clear_bn(r, prec.bn_length);
        let onesbyte = r.0 + prec.bn_length - prec.int_length;

        let signflag = f < 0.0;
        let mut f = f.abs();

        match prec.int_length {
            1 => self.set_byte(onesbyte, f as u8),
            2 => self.set_u16(onesbyte, f as u16),
            _ => self.set_u32(onesbyte, f as u32),
        }
        f -= f.trunc();

        let mut i = prec.bn_length as i32 - prec.int_length as i32 - 1;
        while i >= 0 && f != 0.0 {
            f *= 256.0;
            let b = f as u8;
            self.set_byte(r.0 + i as usize, b);
            f -= b as f64;
            i -= 1;
        }

        if signflag {
            self.neg_a_bn(r, prec.bn_length);
        }
    }

    /// n as an f64 approximation. Only enough top bytes to fill an f64
    /// mantissa are read.
    pub fn bntofloat(&mut self, n: BigNumId, prec: &Precision) -> f64 {
        let signflag = self.is_bn_neg(n, prec.bn_length);
        if signflag {
            self.neg_a_bn(n, prec.bn_length);
        }

        let mut expon = prec.int_length as i32 - 1;
        let mut getbyte = n.0 as i64 + prec.bn_length as i64 - 1;
        while getbyte >= n.0 as i64 && self.byte(getbyte as usize) == 0 {
            getbyte -= 1;
            expon -= 1;
        }

        let mut f = 0.0;
        let mut i = 0;
        while i < 7 && getbyte >= n.0 as i64 {
            f += scale_256(self.byte(getbyte as usize) as f64, -i);
            i += 1;
            getbyte -= 1;
        }
        f = scale_256(f, expon);

        if signflag {
            f = -f;
            self.neg_a_bn(n, prec.bn_length); // restore
        }
        f
    }

    /// r = f as a big float.
    pub fn floattobf(&mut self, r: BigFloatId, f: f64, prec: &Precision) {
        if f == 0.0 {
            self.clear_bf(r, prec);
            return;
        }

        let mut power = 0;
        let m = extract_256(f, &mut power);

        // the whole mantissa viewed as a fixed point number
        let view = Precision {
            bn_length: prec.bf_length,
            int_length: 2,
            ..*prec
        };
        self.floattobn(r.mantissa(), m, &view);
        self.set_bf_exp(r, power, prec);
    }

    /// n as an f64 approximation.
    pub fn bftofloat(&mut self, n: BigFloatId, prec: &Precision) -> f64 {
        let view = Precision {
            bn_length: prec.bf_length,
            int_length: 2,
            ..*prec
        };
        let f = self.bntofloat(n.mantissa(), &view);
        scale_256(f, self.bf_exp(n, prec))
    }

    /// Parse `[+-][digits].[digits][eE][+-]digits` into a big float. The
    /// digits are folded in back to front so every one lands at full
    /// precision.
    pub fn strtobf(&mut self, r: BigFloatId, text: &str, prec: &Precision) {
        self.clear_bf(r, prec);

        let b = text.as_bytes();
        let mut start = 0usize;
        let mut signflag = false;
        match b.first() {
            Some(&b'+') => start = 1,
            Some(&b'-') => {
                signflag = true;
                start = 1;
            }
            _ => {}
        }

        let dot = text.find('.');
        let epos = text.find('e').or_else(|| text.find('E'));
        let mut powerten: i32 = 0;
        let mut l: i64 = match epos {
            Some(e) => {
                powerten = text[e + 1..].parse().unwrap_or(0);
                e as i64 - 1
            }
            None => b.len() as i64 - 1,
        };

        let is_digit = |i: i64| i >= start as i64 && b[i as usize].is_ascii_digit();

        let mut s = self.guard();
        let tmp = s.alloc_bf(prec);

        if dot.is_some() {
            // fraction digits, right of the decimal point
            while is_digit(l) {
                let v = (b[l as usize] - b'0') as i64;
                l -= 1;
                s.inttobf(tmp, v, prec);
                s.unsafe_add_a_bf(r, tmp, prec);
                s.div_a_bf_int(r, 10, prec);
            }
            if l >= start as i64 && b[l as usize] == b'.' {
                l -= 1;
                let mut keep = is_digit(l);
                while keep {
                    let v = (b[l as usize] - b'0') as i64;
                    l -= 1;
                    s.inttobf(tmp, v, prec);
                    s.unsafe_add_a_bf(r, tmp, prec);
                    keep = is_digit(l);
                    if keep {
                        s.div_a_bf_int(r, 10, prec);
                        powerten += 1;
                    }
                }
            }
        } else {
            let mut keep = is_digit(l);
            while keep {
                let v = (b[l as usize] - b'0') as i64;
                l -= 1;
                s.inttobf(tmp, v, prec);
                s.unsafe_add_a_bf(r, tmp, prec);
                keep = is_digit(l);
                if keep {
                    s.div_a_bf_int(r, 10, prec);
                    powerten += 1;
                }
            }
        }

        while powerten > 0 {
            s.mult_a_bf_int(r, 10, prec);
            powerten -= 1;
        }
        if powerten < 0 {
            // one full precision division by the whole power; dividing a
            // digit at a time loses a low byte to normalization each step
            let p10 = s.alloc_bf(prec);
            s.inttobf(p10, 1, prec);
            for _ in 0..-powerten {
                s.mult_a_bf_int(p10, 10, prec);
            }
            s.div_bf(r, r, p10, prec);
        }
        drop(s);

        if signflag {
            self.neg_a_bf(r, prec);
        }
    }

    /// Read a big float out as base-10 digits, avoiding the rounding a
    /// detour through binary floating point would cost. The digit buffer
    /// holds [sign][dec+1 digits][2 byte power of ten]; `dec` excludes the
    /// extra rounding digit. Side effect: n is destroyed.
    fn unsafe_bftobf10(&mut self, r: &mut [u8], dec: usize, n: BigFloatId, prec: &Precision) {
        if self.is_bf_zero(n, prec) {
            // a leading digit of zero only happens for zero itself
            r[1] = 0;
            return;
        }

        let onesbyte = n.0 + prec.bf_length - 1; // one above the top value byte
        let power256 = self.bf_exp(n, prec) + 1; // so adjust the power by one

        let dec = dec + 1; // one extra digit for rounding
        if self.is_bf_neg(n, prec) {
            self.neg_a_bf(n, prec);
            r[0] = 1;
        } else {
            r[0] = 0;
        }

        let mut p: i32 = -1; // multiply by 10 right away
        let mut d = 1;
        while d <= dec {
            // run the mantissa as a bare fixed point number, leaving it
            // un-normalized on purpose
            self.mult_a_bn_int(n.mantissa(), 10, prec.bf_length);
            r[d] = self.byte(onesbyte);
            let back_up = d == 1 && r[1] == 0;
            self.set_byte(onesbyte, 0);
            if back_up {
                p -= 1; // a leading zero costs a factor of ten
            } else {
                d += 1;
            }
        }
        set_bf10_power(r, dec, p);

        // scale by 256^power256
        if power256 > 0 {
            for _ in 0..power256 {
                mult_a_bf10_int(r, dec, 256);
            }
        } else if power256 < 0 {
            // four byte steps where possible, so at most one division in
            // each loop can disturb the rounding digit
            let mut left = -power256;
            while left >= 4 {
                div_a_bf10_int(r, dec, 1 << 32);
                left -= 4;
            }
            while left > 0 {
                div_a_bf10_int(r, dec, 256);
                left -= 1;
            }
        }

        // round via the extra digit
        if r[dec] >= 5 {
            let mut d = dec as i32 - 1;
            while d > 0 {
                r[d as usize] += 1;
                if r[d as usize] < 10 {
                    d = -1;
                    break;
                }
                r[d as usize] = 0;
                d -= 1;
            }
            if d == 0 {
                // carried all the way out of the top digit
                r[1] = 0;
                r.copy_within(1..dec, 2);
                r[1] = 1;
                let p = bf10_power(r, dec);
                set_bf10_power(r, dec, p + 1);
            }
        }
        r[dec] = 0; // drop the rounding digit
    }

    /// Decimal string, %e or %f style by the size of the exponent.
    /// `dec` is the decimal place count, 0 for the full precision.
    pub fn bftostr(&mut self, dec: usize, r: BigFloatId, prec: &Precision) -> String {
        if self.bftofloat(r, prec) == 0.0 {
            return "0.0".to_string();
        }
        let dec = if dec == 0 { prec.decimals } else { dec };
        let b10 = self.to_bf10(dec, r, prec);
        let power = bf10_power(&b10, dec + 1);
        if power > -4 && power < 6 {
            bf10tostr_f(&b10, dec)
        } else {
            bf10tostr_e(&b10, dec)
        }
    }

    /// Decimal string in scientific notation, like %e.
    pub fn bftostr_e(&mut self, dec: usize, r: BigFloatId, prec: &Precision) -> String {
        if self.bftofloat(r, prec) == 0.0 {
            return "0.0".to_string();
        }
        let dec = if dec == 0 { prec.decimals } else { dec };
        let b10 = self.to_bf10(dec, r, prec);
        bf10tostr_e(&b10, dec)
    }

    /// Decimal string in plain notation, like %f.
    pub fn bftostr_f(&mut self, dec: usize, r: BigFloatId, prec: &Precision) -> String {
        if self.bftofloat(r, prec) == 0.0 {
            return "0.0".to_string();
        }
        let dec = if dec == 0 { prec.decimals } else { dec };
        let b10 = self.to_bf10(dec, r, prec);
        bf10tostr_f(&b10, dec)
    }

    fn to_bf10(&mut self, dec: usize, r: BigFloatId, prec: &Precision) -> Vec<u8> {
        let mut b10 = vec![0u8; dec + 4];
        let mut s = self.guard();
        let tmp = s.alloc_bf(prec);
        s.copy_bf(tmp, r, prec);
        s.unsafe_bftobf10(&mut b10, dec, tmp, prec);
        b10
    }
}

fn bf10_power(r: &[u8], dec: usize) -> i32 {
    i16::from_le_bytes([r[dec + 1], r[dec + 2]]) as i32
}

fn set_bf10_power(r: &mut [u8], dec: usize, p: i32) {
    let b = (p as i16).to_le_bytes();
    r[dec + 1] = b[0];
    r[dec + 2] = b[1];
}

/// r *= n on a base-10 digit array. `dec` includes the rounding digit.
fn mult_a_bf10_int(r: &mut [u8], dec: usize, n: u16) {
    if r[1] == 0 || n == 0 {
        r[1] = 0;
        return;
    }

    let mut p = bf10_power(r, dec);
    let signflag = r[0]; // r[0] doubles as carry padding below

    let mut overflow: u32 = 0;
    for d in (1..=dec).rev() {
        let value = r[d] as u32 * n as u32 + overflow;
        r[d] = (value % 10) as u8;
        overflow = value / 10;
    }
    while overflow != 0 {
        p += 1;
        r.copy_within(1..dec, 2);
        r[1] = (overflow % 10) as u8;
        overflow /= 10;
    }
    set_bf10_power(r, dec, p);
    r[0] = signflag;
}

/// r /= n on a base-10 digit array, long division with leading zero strip.
fn div_a_bf10_int(r: &mut [u8], dec: usize, n: u64) {
    if r[1] == 0 || n == 0 {
        r[1] = 0;
        return;
    }

    let mut p = bf10_power(r, dec);
    let mut remainder: u64 = 0;
    let mut dest = 1usize;
    for src in 1..=dec {
        let value = 10 * remainder + r[src] as u64;
        r[dest] = (value / n) as u8;
        remainder = value % n;
        if dest == 1 && r[1] == 0 {
            p -= 1; // leading zero, shift the whole number up a place
        } else {
            dest += 1;
        }
    }
    while dest <= dec {
        let value = 10 * remainder;
        r[dest] = (value / n) as u8;
        remainder = value % n;
        if dest == 1 && r[1] == 0 {
            p -= 1;
        } else {
            dest += 1;
        }
    }
    // round the last digit from the remainder instead of dropping it
    if 10 * remainder / n >= 5 {
        let mut d = dec;
        loop {
            r[d] += 1;
            if r[d] < 10 {
                break;
            }
            r[d] = 0;
            if d == 1 {
                p += 1;
                r.copy_within(1..dec, 2);
                r[1] = 1;
                break;
            }
            d -= 1;
        }
    }
    set_bf10_power(r, dec, p);
}

fn bf10tostr_e(n: &[u8], dec: usize) -> String {
    if n[1] == 0 {
        return "0.0".to_string();
    }

    let mut dec = (dec + 1) as i32;
    let p = bf10_power(n, dec as usize);

    // a negative power means the leading decimal places are not all needed
    if p < 0 && dec > 8 {
        dec += p;
        if dec < 8 {
            dec = 8;
        }
    }

    let mut s = String::new();
    if n[0] == 1 {
        s.push('-');
    }
    s.push((n[1] + b'0') as char);
    s.push('.');
    for d in 2..=dec as usize {
        s.push((n[d] + b'0') as char);
    }
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.push('0');
    }
    s.push_str(&format!("e{}", p));
    s
}

fn bf10tostr_f(n: &[u8], dec: usize) -> String {
    if n[1] == 0 {
        return "0.0".to_string();
    }

    let mut dec = (dec + 1) as i32;
    let p = bf10_power(n, dec as usize);

    if p < 0 && dec > 8 {
        dec += p;
        if dec < 8 {
            dec = 8;
        }
    }

    let mut s = String::new();
    if n[0] == 1 {
        s.push('-');
    }
    if p >= 0 {
        for d in 1..=(p + 1) as usize {
            s.push((n.get(d).copied().unwrap_or(0) + b'0') as char);
        }
        s.push('.');
        for d in (p + 2)..=dec {
            s.push((n[d as usize] + b'0') as char);
        }
    } else {
        s.push('0');
        s.push('.');
        for _ in 0..(-p - 1) {
            s.push('0');
        }
        for d in 1..=dec as usize {
            s.push((n[d] + b'0') as char);
        }
    }
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.push('0');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn prec() -> Precision {
        Precision::from_decimals(40, 2)
    }

    #[test]
    fn pi_from_table() {
        let p = prec();
        let mut stack = BigStack::new(4096);
        let mut s = stack.guard();
        let pi = big_pi(&mut s, &p);
        assert!((s.bftofloat(pi, &p) - std::f64::consts::PI).abs() < 1e-15);
        assert_eq!(s.bf_exp(pi, &p), 0);
    }

    #[test]
    fn pi_at_high_precision_stays_in_table() {
        let p = Precision::from_decimals(500, 2);
        assert!(p.bf_length <= max_pi_bf_length());
        let mut stack = BigStack::new(4096);
        let mut s = stack.guard();
        let pi = big_pi(&mut s, &p);
        assert!((s.bftofloat(pi, &p) - std::f64::consts::PI).abs() < 1e-15);
    }

    #[test]
    fn extract_and_scale_invert() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let f: f64 = rng.gen_range(-1.0e30..1.0e30);
            if f == 0.0 {
                continue;
            }
            let mut power = 0;
            let m = extract_256(f, &mut power);
            assert!(m.abs() >= 1.0 && m.abs() < 256.0, "m={} for f={}", m, f);
            let back = scale_256(m, power);
            assert!((back - f).abs() <= f.abs() * 1e-12);
        }
    }

    #[test]
    fn int_round_trip() {
        let p = prec();
        let mut stack = BigStack::new(4096);
        let mut s = stack.guard();
        let f = s.alloc_bf(&p);
        for v in [0i64, 1, -1, 255, 256, -300, 1 << 20].iter().copied() {
            s.inttobf(f, v, &p);
            assert_eq!(s.bftoint(f, &p), v, "v={}", v);
        }
    }

    #[test]
    fn bftoint_floors() {
        let p = prec();
        let mut stack = BigStack::new(4096);
        let mut s = stack.guard();
        let f = s.alloc_bf(&p);
        s.floattobf(f, 2.999, &p);
        assert_eq!(s.bftoint(f, &p), 2);
    }

    #[test]
    fn float_round_trip() {
        let p = prec();
        let mut stack = BigStack::new(4096);
        let mut s = stack.guard();
        let f = s.alloc_bf(&p);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..100 {
            let v: f64 = rng.gen_range(-1.0e8..1.0e8);
            s.floattobf(f, v, &p);
            let back = s.bftofloat(f, &p);
            assert!((back - v).abs() <= v.abs() * 1e-14 + 1e-14, "v={}", v);
        }
        for v in [1.0e-30f64, -2.5e20, 6.0e-15].iter().copied() {
            s.floattobf(f, v, &p);
            let back = s.bftofloat(f, &p);
            assert!((back - v).abs() <= v.abs() * 1e-12, "v={}", v);
        }
    }

    #[test]
    fn bn_bf_round_trip() {
        let p = Precision::from_bn_length(8, 2);
        let mut stack = BigStack::new(4096);
        let mut s = stack.guard();
        let n = s.alloc_bn(p.bn_length);
        let back = s.alloc_bn(p.bn_length);
        let f = s.alloc_bf(&p);
        for v in [1.5f64, -42.25, 0.0078125].iter().copied() {
            s.floattobn(n, v, &p);
            s.bntobf(f, n, &p);
            assert!((s.bftofloat(f, &p) - v).abs() < 1e-9, "v={}", v);
            s.bftobn(back, f, &p);
            assert!((s.bntofloat(back, &p) - v).abs() < 1e-9, "v={}", v);
        }
    }

    #[test]
    fn parse_plain_and_scientific() {
        let p = prec();
        let mut stack = BigStack::new(1 << 14);
        let mut s = stack.guard();
        let f = s.alloc_bf(&p);
        for (text, want) in [
            ("0.5", 0.5f64),
            ("-0.5", -0.5),
            ("123", 123.0),
            ("3.14159e2", 314.159),
            ("+1.25E-3", 0.00125),
            ("-1.75e10", -1.75e10),
        ]
        .iter()
        {
            s.strtobf(f, text, &p);
            let got = s.bftofloat(f, &p);
            assert!(
                (got - want).abs() <= want.abs() * 1e-12 + 1e-15,
                "{} -> {}",
                text,
                got
            );
        }
    }

    #[test]
    fn format_plain_values() {
        let p = prec();
        let mut stack = BigStack::new(1 << 14);
        let mut s = stack.guard();
        let f = s.alloc_bf(&p);
        s.floattobf(f, 3.25, &p);
        assert_eq!(s.bftostr(0, f, &p), "3.25");
        s.floattobf(f, -0.5, &p);
        assert_eq!(s.bftostr(0, f, &p), "-0.5");
        s.clear_bf(f, &p);
        assert_eq!(s.bftostr(0, f, &p), "0.0");
    }

    #[test]
    fn format_switches_to_scientific() {
        let p = prec();
        let mut stack = BigStack::new(1 << 14);
        let mut s = stack.guard();
        let f = s.alloc_bf(&p);
        s.strtobf(f, "1.5e-10", &p);
        let out = s.bftostr(0, f, &p);
        assert!(out.contains('e'), "got {}", out);
        assert!(out.starts_with("1.5"), "got {}", out);
    }

    #[test]
    fn format_parse_round_trip() {
        let p = prec();
        let mut stack = BigStack::new(1 << 14);
        let mut s = stack.guard();
        let f = s.alloc_bf(&p);
        let g = s.alloc_bf(&p);
        let diff = s.alloc_bf(&p);
        for text in ["2.25", "-0.125", "1.0e-12", "9.875e6"].iter() {
            s.strtobf(f, text, &p);
            let out = s.bftostr(0, f, &p);
            s.strtobf(g, &out, &p);
            s.sub_bf(diff, f, g, &p);
            assert!(s.is_bf_zero(diff, &p), "{} -> {}", text, out);
        }
    }

    #[test]
    fn deep_decimal_digits_survive_formatting() {
        // more digits than an f64 can carry
        let p = Precision::from_decimals(60, 2);
        let mut stack = BigStack::new(1 << 14);
        let mut s = stack.guard();
        let f = s.alloc_bf(&p);
        let text = "0.123456789012345678901234567890123456789012345";
        s.strtobf(f, text, &p);
        let out = s.bftostr_f(0, f, &p);
        assert!(out.starts_with("0.12345678901234567890123456789012345678901234"), "got {}", out);
    }
}
