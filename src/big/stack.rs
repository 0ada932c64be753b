use std::ops::{Deref, DerefMut};

use super::Precision;

/// Handle to a fixed point number carved from the stack arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BigNumId(pub(crate) usize);

/// Handle to a big float: mantissa bytes followed by a two byte exponent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BigFloatId(pub(crate) usize);

impl BigNumId {
    #[inline]
    pub fn offset(self) -> usize {
        self.0
    }
}

impl BigFloatId {
    #[inline]
    pub fn offset(self) -> usize {
        self.0
    }

    /// The same bytes viewed as a bare mantissa.
    #[inline]
    pub fn mantissa(self) -> BigNumId {
        BigNumId(self.0)
    }

    /// Handle moved up by `delta` bytes. A reduced working precision aliases
    /// the top bytes of a full width number this way, so Newton rounds refine
    /// the most significant part of the final result in place.
    #[inline]
    pub(crate) fn shifted(self, delta: usize) -> BigFloatId {
        BigFloatId(self.0 + delta)
    }
}

/// LIFO byte arena for big number temporaries. Scratch values are carved off
/// the top through a [`BigStackGuard`]; dropping the guard returns the stack
/// pointer to where it was, releasing everything allocated inside that scope.
pub struct BigStack {
    bytes: Vec<u8>,
    ptr: usize,
}

impl BigStack {
    pub fn new(capacity: usize) -> BigStack {
        BigStack {
            bytes: vec![0; capacity],
            ptr: 0,
        }
    }

    /// Open an allocation scope. The returned guard restores the stack
    /// pointer on drop, on every exit path.
    pub fn guard(&mut self) -> BigStackGuard<'_> {
        let saved = self.ptr;
        BigStackGuard { stack: self, saved }
    }

    /// Permanent allocation below every guard scope. Long lived values
    /// (corner coordinates, deltas) are carved off here before any scratch
    /// scope opens, so guard drops never reclaim them.
    pub fn reserve_bf(&mut self, prec: &Precision) -> BigFloatId {
        BigFloatId(self.alloc(prec.bf_length + 2))
    }

    fn alloc(&mut self, len: usize) -> usize {
        let off = self.ptr;
        self.ptr += len;
        if self.ptr > self.bytes.len() {
            self.bytes.resize(self.ptr, 0);
        }
        self.bytes[off..off + len].iter_mut().for_each(|b| *b = 0);
        off
    }

    #[inline]
    pub(crate) fn byte(&self, off: usize) -> u8 {
        self.bytes[off]
    }

    #[inline]
    pub(crate) fn set_byte(&mut self, off: usize, v: u8) {
        self.bytes[off] = v;
    }

    #[inline]
    pub(crate) fn u16_at(&self, off: usize) -> u16 {
        u16::from_le_bytes([self.bytes[off], self.bytes[off + 1]])
    }

    #[inline]
    pub(crate) fn set_u16(&mut self, off: usize, v: u16) {
        self.bytes[off..off + 2].copy_from_slice(&v.to_le_bytes());
    }

    #[inline]
    pub(crate) fn i16_at(&self, off: usize) -> i16 {
        self.u16_at(off) as i16
    }

    #[inline]
    pub(crate) fn set_i16(&mut self, off: usize, v: i16) {
        self.set_u16(off, v as u16);
    }

    #[inline]
    pub(crate) fn u32_at(&self, off: usize) -> u32 {
        u32::from_le_bytes([
            self.bytes[off],
            self.bytes[off + 1],
            self.bytes[off + 2],
            self.bytes[off + 3],
        ])
    }

    #[inline]
    pub(crate) fn set_u32(&mut self, off: usize, v: u32) {
        self.bytes[off..off + 4].copy_from_slice(&v.to_le_bytes());
    }

    #[inline]
    pub(crate) fn fill_bytes(&mut self, off: usize, len: usize, v: u8) {
        self.bytes[off..off + len].iter_mut().for_each(|b| *b = v);
    }

    /// Overlapping-safe byte move, the `memmove` of the mantissa shifts.
    #[inline]
    pub(crate) fn move_bytes(&mut self, src: usize, dst: usize, len: usize) {
        self.bytes.copy_within(src..src + len, dst);
    }

    pub(crate) fn copy_slice_in(&mut self, off: usize, src: &[u8]) {
        self.bytes[off..off + src.len()].copy_from_slice(src);
    }

    /// Signed exponent of a big float, in powers of 256.
    #[inline]
    pub fn bf_exp(&self, n: BigFloatId, prec: &Precision) -> i32 {
        self.i16_at(n.0 + prec.bf_length) as i32
    }

    #[inline]
    pub fn set_bf_exp(&mut self, n: BigFloatId, v: i32, prec: &Precision) {
        self.set_i16(n.0 + prec.bf_length, v as i16);
    }
}

pub struct BigStackGuard<'a> {
    stack: &'a mut BigStack,
    saved: usize,
}

impl<'a> BigStackGuard<'a> {
    pub fn alloc_bn(&mut self, len: usize) -> BigNumId {
        BigNumId(self.stack.alloc(len))
    }

    pub fn alloc_bf(&mut self, prec: &Precision) -> BigFloatId {
        BigFloatId(self.stack.alloc(prec.bf_length + 2))
    }

    /// Room for an un-shifted multiplication result, `r_bf_length` bytes.
    pub fn alloc_bf_wide(&mut self, prec: &Precision) -> BigFloatId {
        BigFloatId(self.stack.alloc(prec.r_bf_length + 2))
    }

    /// Room for a double width full multiplication result.
    pub fn alloc_bf_double(&mut self, prec: &Precision) -> BigFloatId {
        BigFloatId(self.stack.alloc(2 * prec.bf_length + 2))
    }
}

impl<'a> Deref for BigStackGuard<'a> {
    type Target = BigStack;

    fn deref(&self) -> &BigStack {
        self.stack
    }
}

impl<'a> DerefMut for BigStackGuard<'a> {
    fn deref_mut(&mut self) -> &mut BigStack {
        self.stack
    }
}

impl<'a> Drop for BigStackGuard<'a> {
    fn drop(&mut self) {
        self.stack.ptr = self.saved;
    }
}
