use num_complex::Complex;

use crate::engine::context::{CalculationContext, MathMode};

/// Result of evaluating one pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelOutcome {
    Color(i32),
    /// The kernel was asked to stop; the scan records its position and
    /// returns without plotting.
    Interrupted,
}

/// One fractal family's per-pixel iteration. The scan passes drive this
/// through the context's pixel-to-plane mapping.
pub trait FractalKernel {
    fn setup(&mut self, ctx: &mut CalculationContext);
    fn per_pixel(&mut self, col: i32, row: i32, ctx: &mut CalculationContext) -> PixelOutcome;
}

const BAILOUT: f64 = 4.0;

/// Standard double precision Mandelbrot iteration.
#[derive(Default)]
pub struct MandelbrotDouble;

impl FractalKernel for MandelbrotDouble {
    fn setup(&mut self, ctx: &mut CalculationContext) {
        ctx.calc_deltas();
    }

    fn per_pixel(&mut self, col: i32, row: i32, ctx: &mut CalculationContext) -> PixelOutcome {
        let c = Complex::new(ctx.dx_pixel(col, row), ctx.dy_pixel(col, row));
        let mut z = Complex::new(0.0, 0.0);
        for iter in 0..ctx.max_iter {
            z = z * z + c;
            if z.norm_sqr() > BAILOUT {
                return PixelOutcome::Color(iter);
            }
        }
        PixelOutcome::Color(ctx.max_iter)
    }
}

/// Mandelbrot iteration over the arbitrary precision corners. Falls back to
/// the double iteration when the context carries none.
#[derive(Default)]
pub struct MandelbrotBigFloat;

impl FractalKernel for MandelbrotBigFloat {
    fn setup(&mut self, ctx: &mut CalculationContext) {
        ctx.calc_deltas();
    }

    fn per_pixel(&mut self, col: i32, row: i32, ctx: &mut CalculationContext) -> PixelOutcome {
        if ctx.math_mode != MathMode::BigFloat {
            return MandelbrotDouble.per_pixel(col, row, ctx);
        }
        let max_iter = ctx.max_iter;
        let bf = match ctx.bf.as_mut() {
            Some(bf) => bf,
            None => return MandelbrotDouble.per_pixel(col, row, ctx),
        };
        let prec = bf.prec;
        let mut s = bf.stack.guard();

        let tmp = s.alloc_bf(&prec);
        let cx = s.alloc_bf(&prec);
        let cy = s.alloc_bf(&prec);

        // cx = x_min + col*delta_x + row*delta_x2
        s.copy_bf(tmp, bf.delta_x, &prec);
        s.mult_a_bf_int(tmp, col as u16, &prec);
        s.add_bf(cx, bf.x_min, tmp, &prec);
        s.copy_bf(tmp, bf.delta_x2, &prec);
        s.mult_a_bf_int(tmp, row as u16, &prec);
        s.add_a_bf(cx, tmp, &prec);

        // cy = y_max - row*delta_y - col*delta_y2
        s.copy_bf(tmp, bf.delta_y, &prec);
        s.mult_a_bf_int(tmp, row as u16, &prec);
        s.sub_bf(cy, bf.y_max, tmp, &prec);
        s.copy_bf(tmp, bf.delta_y2, &prec);
        s.mult_a_bf_int(tmp, col as u16, &prec);
        s.sub_a_bf(cy, tmp, &prec);

        let zx = s.alloc_bf(&prec);
        let zy = s.alloc_bf(&prec);
        let zx_sq = s.alloc_bf(&prec);
        let zy_sq = s.alloc_bf(&prec);
        let mag = s.alloc_bf(&prec);
        let four = s.alloc_bf(&prec);
        s.clear_bf(zx, &prec);
        s.clear_bf(zy, &prec);
        s.clear_bf(zx_sq, &prec);
        s.clear_bf(zy_sq, &prec);
        s.inttobf(four, BAILOUT as i64, &prec);

        // zx_sq/zy_sq always hold the squares of the current z
        for iter in 0..max_iter {
            // z = z^2 + c
            s.mult_bf(tmp, zx, zy, &prec);
            s.double_a_bf(tmp, &prec);
            s.add_bf(zy, tmp, cy, &prec);
            s.sub_bf(zx, zx_sq, zy_sq, &prec);
            s.add_a_bf(zx, cx, &prec);

            s.square_bf(zx_sq, zx, &prec);
            s.square_bf(zy_sq, zy, &prec);
            s.add_bf(mag, zx_sq, zy_sq, &prec);
            if s.cmp_bf(mag, four, &prec) > 0 {
                return PixelOutcome::Color(iter);
            }
        }
        PixelOutcome::Color(max_iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_context(x_dots: i32, y_dots: i32) -> CalculationContext {
        let mut ctx = CalculationContext::new(x_dots, y_dots);
        ctx.x_min = -2.0;
        ctx.x_3rd = -2.0;
        ctx.x_max = 2.0;
        ctx.y_min = -2.0;
        ctx.y_3rd = -2.0;
        ctx.y_max = 2.0;
        ctx.max_iter = 100;
        ctx.calc_deltas();
        ctx
    }

    #[test]
    fn origin_stays_inside() {
        let mut ctx = plain_context(5, 5);
        let mut kernel = MandelbrotDouble;
        // center pixel maps to (0, 0)
        assert_eq!(kernel.per_pixel(2, 2, &mut ctx), PixelOutcome::Color(100));
    }

    #[test]
    fn far_point_escapes_immediately() {
        let mut ctx = plain_context(5, 5);
        let mut kernel = MandelbrotDouble;
        // corner pixel maps to (2, 2), |z1| > 2 at once
        assert_eq!(kernel.per_pixel(4, 0, &mut ctx), PixelOutcome::Color(0));
    }

    #[test]
    fn bigfloat_agrees_with_double_at_shallow_zoom() {
        let mut double_ctx = plain_context(16, 16);
        let mut bf_ctx = plain_context(16, 16);
        bf_ctx.init_bf(30);

        let mut dk = MandelbrotDouble;
        let mut bk = MandelbrotBigFloat;
        for row in (0..16).step_by(3) {
            for col in (0..16).step_by(3) {
                let a = dk.per_pixel(col, row, &mut double_ctx);
                let b = bk.per_pixel(col, row, &mut bf_ctx);
                assert_eq!(a, b, "pixel ({}, {})", col, row);
            }
        }
    }

    #[test]
    fn bigfloat_kernel_without_corners_uses_doubles() {
        let mut ctx = plain_context(5, 5);
        let mut kernel = MandelbrotBigFloat;
        assert_eq!(kernel.per_pixel(2, 2, &mut ctx), PixelOutcome::Color(100));
    }
}
