use std::f64::consts::{LOG10_2, LOG2_10};

pub mod float_extended;

pub use float_extended::FloatExtended;

use std::os::raw::{c_double, c_int};

extern "C" {
    fn frexp(x: c_double, exp: *mut c_int) -> c_double;
    fn ldexp(x: c_double, exp: c_int) -> c_double;
}

pub trait FloatExp: Sized {
    fn frexp(self) -> (Self, i32);
    fn ldexp(self, exp: i32) -> Self;
}

impl FloatExp for f64 {
    fn frexp(self) -> (Self, i32) {
        let mut exp: c_int = 0;
        let res = unsafe { frexp(self, &mut exp) };
        (res, exp)
    }

    fn ldexp(self, exp: i32) -> Self {
        unsafe { ldexp(self, exp) }
    }
}

/// Parse a magnification written as `mantissaEpower`, base 10. Values far
/// beyond f64 range survive in the binary exponent.
pub fn string_to_extended(string: &str) -> FloatExtended {
    let temp: Vec<&str> = string.split(|c| c == 'E' || c == 'e').collect();

    let first = temp[0].parse::<f64>().unwrap_or(0.0);
    let second = if temp.len() > 1 {
        temp[1].parse::<f64>().unwrap_or(0.0) * LOG2_10
    } else {
        0.0
    };

    FloatExtended::new(first * 2.0f64.powf(second.fract()), second.floor() as i32)
}

pub fn extended_to_string(value: FloatExtended) -> String {
    let first = value.mantissa;
    let second = value.exponent as f64 * LOG10_2;

    format!("{:.2}E{}", first * 10.0f64.powf(second.fract()), second.floor() as i32)
}

/// Pixel store the calculation passes read and write. Colors below zero are
/// reserved (edge sentinel for the guessing logic).
pub trait FrameBuffer {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn get_color(&self, x: usize, y: usize) -> i32;
    fn put_color(&mut self, x: usize, y: usize, color: i32);

    /// Fill `buf` with the colors of one row starting at `x_start`.
    fn read_span(&self, y: usize, x_start: usize, buf: &mut [i32]) {
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = self.get_color(x_start + i, y);
        }
    }

    /// Write one row of colors starting at `x_start`.
    fn write_span(&mut self, y: usize, x_start: usize, colors: &[i32]) {
        for (i, &c) in colors.iter().enumerate() {
            self.put_color(x_start + i, y, c);
        }
    }
}

/// Flat in-memory frame buffer.
pub struct MemoryBuffer {
    width: usize,
    height: usize,
    pixels: Vec<i32>,
}

impl MemoryBuffer {
    pub fn new(width: usize, height: usize) -> MemoryBuffer {
        MemoryBuffer {
            width,
            height,
            pixels: vec![0; width * height],
        }
    }

    pub fn pixels(&self) -> &[i32] {
        &self.pixels
    }
}

impl FrameBuffer for MemoryBuffer {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn get_color(&self, x: usize, y: usize) -> i32 {
        self.pixels[y * self.width + x]
    }

    #[inline]
    fn put_color(&mut self, x: usize, y: usize, color: i32) {
        self.pixels[y * self.width + x] = color;
    }

    fn read_span(&self, y: usize, x_start: usize, buf: &mut [i32]) {
        let off = y * self.width + x_start;
        buf.copy_from_slice(&self.pixels[off..off + buf.len()]);
    }

    fn write_span(&mut self, y: usize, x_start: usize, colors: &[i32]) {
        let off = y * self.width + x_start;
        self.pixels[off..off + colors.len()].copy_from_slice(colors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frexp_ldexp_round_trip() {
        let (m, e) = 12.5f64.frexp();
        assert!(m.abs() >= 0.5 && m.abs() < 1.0);
        assert_eq!(m.ldexp(e), 12.5);
    }

    #[test]
    fn extended_string_round_trip() {
        let v = string_to_extended("1.50E100");
        let s = extended_to_string(v);
        assert!(s.contains("E100"), "got {}", s);
    }

    #[test]
    fn span_read_write() {
        let mut fb = MemoryBuffer::new(8, 4);
        fb.write_span(2, 1, &[5, 6, 7]);
        assert_eq!(fb.get_color(1, 2), 5);
        assert_eq!(fb.get_color(3, 2), 7);
        let mut buf = [0; 3];
        fb.read_span(2, 1, &mut buf);
        assert_eq!(buf, [5, 6, 7]);
    }
}
