use crate::big::{BigFloatId, BigStack, Precision};
use crate::engine::resume::ResumeBuffer;
use crate::engine::worklist::WorkList;

/// Where the current calculation stands; panning and resuming key off this.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalcStatus {
    /// Parameters changed since the last image; a recalculation is needed.
    ParamsChanged,
    InProgress,
    /// Interrupted with a resume blob posted.
    Resumable,
    NonResumable,
    Completed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MathMode {
    Double,
    BigFloat,
}

/// Corner coordinates and per-pixel deltas held at arbitrary precision.
/// The handles are permanent reservations at the bottom of an owned arena;
/// scratch scopes open above them and never touch them.
pub struct BfCorners {
    pub stack: BigStack,
    pub prec: Precision,
    pub x_min: BigFloatId,
    pub x_max: BigFloatId,
    pub x_3rd: BigFloatId,
    pub y_min: BigFloatId,
    pub y_max: BigFloatId,
    pub y_3rd: BigFloatId,
    // screen corners saved while a zoom box is up
    pub sx_min: BigFloatId,
    pub sx_max: BigFloatId,
    pub sx_3rd: BigFloatId,
    pub sy_min: BigFloatId,
    pub sy_max: BigFloatId,
    pub sy_3rd: BigFloatId,
    pub delta_x: BigFloatId,
    pub delta_y: BigFloatId,
    pub delta_x2: BigFloatId,
    pub delta_y2: BigFloatId,
}

impl BfCorners {
    pub fn new(decimals: usize) -> BfCorners {
        let prec = Precision::from_decimals(decimals, 2);
        let mut stack = BigStack::new(64 * (prec.r_bf_length + 2));
        let x_min = stack.reserve_bf(&prec);
        let x_max = stack.reserve_bf(&prec);
        let x_3rd = stack.reserve_bf(&prec);
        let y_min = stack.reserve_bf(&prec);
        let y_max = stack.reserve_bf(&prec);
        let y_3rd = stack.reserve_bf(&prec);
        let sx_min = stack.reserve_bf(&prec);
        let sx_max = stack.reserve_bf(&prec);
        let sx_3rd = stack.reserve_bf(&prec);
        let sy_min = stack.reserve_bf(&prec);
        let sy_max = stack.reserve_bf(&prec);
        let sy_3rd = stack.reserve_bf(&prec);
        let delta_x = stack.reserve_bf(&prec);
        let delta_y = stack.reserve_bf(&prec);
        let delta_x2 = stack.reserve_bf(&prec);
        let delta_y2 = stack.reserve_bf(&prec);
        BfCorners {
            stack,
            prec,
            x_min,
            x_max,
            x_3rd,
            y_min,
            y_max,
            y_3rd,
            sx_min,
            sx_max,
            sx_3rd,
            sy_min,
            sy_max,
            sy_3rd,
            delta_x,
            delta_y,
            delta_x2,
            delta_y2,
        }
    }

    pub fn corner_handles(&self) -> [BigFloatId; 6] {
        [
            self.x_min, self.x_max, self.x_3rd, self.y_min, self.y_max, self.y_3rd,
        ]
    }

    fn screen_handles(&self) -> [BigFloatId; 6] {
        [
            self.sx_min, self.sx_max, self.sx_3rd, self.sy_min, self.sy_max, self.sy_3rd,
        ]
    }

    /// Remember the on-screen corners before a zoom box starts rewriting the
    /// live ones.
    pub fn save_screen_corners(&mut self) {
        let prec = self.prec;
        for (dst, src) in self
            .screen_handles()
            .iter()
            .zip(self.corner_handles().iter())
        {
            self.stack.copy_bf(*dst, *src, &prec);
        }
    }
}

/// All state one calculation threads through the engine. No globals; the
/// scan passes, zoom engine and precision selector all borrow this.
pub struct CalculationContext {
    pub x_dots: i32,
    pub y_dots: i32,
    pub max_iter: i32,

    pub x_min: f64,
    pub x_max: f64,
    pub x_3rd: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub y_3rd: f64,
    // screen corners saved while a zoom box is up
    pub sx_min: f64,
    pub sx_max: f64,
    pub sx_3rd: f64,
    pub sy_min: f64,
    pub sy_max: f64,
    pub sy_3rd: f64,

    pub delta_x: f64,
    pub delta_y: f64,
    pub delta_x2: f64,
    pub delta_y2: f64,

    pub calc_status: CalcStatus,
    pub math_mode: MathMode,
    pub bf: Option<BfCorners>,

    pub work_list: WorkList,
    pub resume: Option<ResumeBuffer>,

    /// Scan mode; pan legality depends on it ('g' guessing, '1'/'2' passes).
    pub calc_mode: char,
    pub screen_aspect: f64,
}

impl CalculationContext {
    pub fn new(x_dots: i32, y_dots: i32) -> CalculationContext {
        CalculationContext {
            x_dots,
            y_dots,
            max_iter: 150,
            x_min: -2.5,
            x_max: 1.5,
            x_3rd: -2.5,
            y_min: -1.5,
            y_max: 1.5,
            y_3rd: -1.5,
            sx_min: -2.5,
            sx_max: 1.5,
            sx_3rd: -2.5,
            sy_min: -1.5,
            sy_max: 1.5,
            sy_3rd: -1.5,
            delta_x: 0.0,
            delta_y: 0.0,
            delta_x2: 0.0,
            delta_y2: 0.0,
            calc_status: CalcStatus::ParamsChanged,
            math_mode: MathMode::Double,
            bf: None,
            work_list: WorkList::new(),
            resume: None,
            calc_mode: 'g',
            screen_aspect: 0.75,
        }
    }

    /// Per-pixel deltas from the corners; the second pair carries the skew
    /// (zero for an unrotated rectangle).
    pub fn calc_deltas(&mut self) {
        self.delta_x = (self.x_max - self.x_3rd) / (self.x_dots - 1) as f64;
        self.delta_y = (self.y_max - self.y_3rd) / (self.y_dots - 1) as f64;
        self.delta_x2 = (self.x_3rd - self.x_min) / (self.y_dots - 1) as f64;
        self.delta_y2 = (self.y_3rd - self.y_min) / (self.x_dots - 1) as f64;

        if let Some(bf) = self.bf.as_mut() {
            let prec = bf.prec;
            let s = &mut bf.stack;
            s.sub_bf(bf.delta_x, bf.x_max, bf.x_3rd, &prec);
            s.div_a_bf_int(bf.delta_x, (self.x_dots - 1) as u16, &prec);
            s.sub_bf(bf.delta_y, bf.y_max, bf.y_3rd, &prec);
            s.div_a_bf_int(bf.delta_y, (self.y_dots - 1) as u16, &prec);
            s.sub_bf(bf.delta_x2, bf.x_3rd, bf.x_min, &prec);
            s.div_a_bf_int(bf.delta_x2, (self.y_dots - 1) as u16, &prec);
            s.sub_bf(bf.delta_y2, bf.y_3rd, bf.y_min, &prec);
            s.div_a_bf_int(bf.delta_y2, (self.x_dots - 1) as u16, &prec);
        }
    }

    /// Real-plane x of a pixel (double path).
    #[inline]
    pub fn dx_pixel(&self, col: i32, row: i32) -> f64 {
        self.x_min + col as f64 * self.delta_x + row as f64 * self.delta_x2
    }

    /// Real-plane y of a pixel (double path).
    #[inline]
    pub fn dy_pixel(&self, col: i32, row: i32) -> f64 {
        self.y_max - row as f64 * self.delta_y - col as f64 * self.delta_y2
    }

    /// Switch to arbitrary precision at the given decimal count, carrying the
    /// current corners over. Values transfer from the old representation at
    /// full fidelity (top-aligned re-length between precisions, or injection
    /// from the doubles when none existed).
    pub fn init_bf(&mut self, decimals: usize) {
        // the trig tables bound how long a mantissa can get
        let max_len = crate::big::max_pi_bf_length();
        let mut decimals = decimals;
        if Precision::from_decimals(decimals, 2).bf_length > max_len {
            while decimals > 17 && Precision::from_decimals(decimals, 2).bf_length > max_len {
                decimals -= 1;
            }
            log::warn!("precision capped at {} decimals", decimals);
        }
        let mut next = BfCorners::new(decimals);
        match self.bf.take() {
            Some(mut old) => {
                for (dst, src) in next
                    .corner_handles()
                    .iter()
                    .zip(old.corner_handles().iter())
                {
                    // stage through a decimal string so the transfer is exact
                    // to the smaller of the two precisions
                    let text = old.stack.bftostr_e(0, *src, &old.prec);
                    next.stack.strtobf(*dst, &text, &next.prec);
                }
            }
            None => {
                let values = [
                    self.x_min, self.x_max, self.x_3rd, self.y_min, self.y_max, self.y_3rd,
                ];
                for (dst, v) in next.corner_handles().iter().zip(values.iter()) {
                    next.stack.floattobf(*dst, *v, &next.prec);
                }
            }
        }
        self.bf = Some(next);
        self.math_mode = MathMode::BigFloat;
        self.calc_deltas();
    }

    /// Fold the arbitrary precision corners down into the doubles and leave
    /// BigFloat mode.
    pub fn drop_to_double(&mut self) {
        if let Some(mut bf) = self.bf.take() {
            let prec = bf.prec;
            self.x_min = bf.stack.bftofloat(bf.x_min, &prec);
            self.x_max = bf.stack.bftofloat(bf.x_max, &prec);
            self.x_3rd = bf.stack.bftofloat(bf.x_3rd, &prec);
            self.y_min = bf.stack.bftofloat(bf.y_min, &prec);
            self.y_max = bf.stack.bftofloat(bf.y_max, &prec);
            self.y_3rd = bf.stack.bftofloat(bf.y_3rd, &prec);
        }
        self.math_mode = MathMode::Double;
        self.calc_deltas();
    }

    /// Snapshot the current corners as the screen corners, double and bf.
    pub fn save_screen_corners(&mut self) {
        self.sx_min = self.x_min;
        self.sx_max = self.x_max;
        self.sx_3rd = self.x_3rd;
        self.sy_min = self.y_min;
        self.sy_max = self.y_max;
        self.sy_3rd = self.y_3rd;
        if let Some(bf) = self.bf.as_mut() {
            bf.save_screen_corners();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_span_the_rectangle() {
        let mut ctx = CalculationContext::new(641, 481);
        ctx.x_min = -2.0;
        ctx.x_3rd = -2.0;
        ctx.x_max = 2.0;
        ctx.y_min = -1.5;
        ctx.y_3rd = -1.5;
        ctx.y_max = 1.5;
        ctx.calc_deltas();
        assert!((ctx.delta_x - 4.0 / 640.0).abs() < 1e-15);
        assert!((ctx.delta_y - 3.0 / 480.0).abs() < 1e-15);
        assert_eq!(ctx.delta_x2, 0.0);
        assert_eq!(ctx.delta_y2, 0.0);
        // pixel mapping hits the corners
        assert!((ctx.dx_pixel(0, 0) - ctx.x_min).abs() < 1e-12);
        assert!((ctx.dx_pixel(640, 0) - ctx.x_max).abs() < 1e-12);
        assert!((ctx.dy_pixel(0, 480) - ctx.y_min).abs() < 1e-12);
    }

    #[test]
    fn bf_corners_follow_the_doubles() {
        let mut ctx = CalculationContext::new(101, 101);
        ctx.x_min = -0.75;
        ctx.x_3rd = -0.75;
        ctx.x_max = 0.25;
        ctx.y_min = -0.5;
        ctx.y_3rd = -0.5;
        ctx.y_max = 0.5;
        ctx.init_bf(40);
        assert_eq!(ctx.math_mode, MathMode::BigFloat);
        let bf = ctx.bf.as_mut().unwrap();
        let prec = bf.prec;
        assert!((bf.stack.bftofloat(bf.x_min, &prec) + 0.75).abs() < 1e-12);
        let dx = bf.stack.bftofloat(bf.delta_x, &prec);
        assert!((dx - 0.01).abs() < 1e-12);
    }

    #[test]
    fn precision_change_keeps_corner_values() {
        let mut ctx = CalculationContext::new(101, 101);
        ctx.x_min = -1.2345678901234;
        ctx.x_3rd = ctx.x_min;
        ctx.init_bf(30);
        ctx.init_bf(60);
        ctx.drop_to_double();
        assert_eq!(ctx.math_mode, MathMode::Double);
        assert!((ctx.x_min + 1.2345678901234).abs() < 1e-12);
        assert!(ctx.bf.is_none());
    }
}
