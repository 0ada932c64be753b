use std::f64::consts::PI;

use log::warn;

use crate::big::{BigFloatId, Precision};
use crate::engine::context::{BfCorners, CalcStatus, CalculationContext, MathMode};
use crate::engine::resume::{ResumeBuffer, RESUME_VERSION};
use crate::engine::solid_guess::block_size;
use crate::engine::worklist::{WorkItem, WorkList};
use crate::engine::MAX_CALC_WORK;
use crate::util::FrameBuffer;

/// Guard against truncation when converting box fractions to pixel columns.
const PIXEL_ROUND: f64 = 0.00001;

/// Selection rectangle over the current image, in screen fractions.
/// `x`/`y` are the top left corner, `width`/`depth` the extent; the full
/// screen is (0, 0, 1, 1). `rotation` counts steps of 2.5 degrees.
#[derive(Clone, Copy, Debug)]
pub struct ZoomBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub depth: f64,
    pub rotation: i32,
    pub skew: f64,
}

impl Default for ZoomBox {
    fn default() -> ZoomBox {
        ZoomBox {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            depth: 0.0,
            rotation: 0,
            skew: 0.0,
        }
    }
}

/// Screen-fraction coefficients for the three defining corners of the box,
/// after rotation and skew. Feeding a coefficient pair through the saved
/// corner frame yields the corner's position on the complex plane.
struct BoxCoeffs {
    top_left: (f64, f64),
    bottom_right: (f64, f64),
    bottom_left: (f64, f64),
}

impl ZoomBox {
    pub fn new() -> ZoomBox {
        ZoomBox::default()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.width != 0.0
    }

    /// Start with the whole screen selected.
    pub fn select_all(&mut self) {
        self.x = 0.0;
        self.y = 0.0;
        self.width = 1.0;
        self.depth = 1.0;
        self.rotation = 0;
        self.skew = 0.0;
    }

    pub fn clear(&mut self) {
        *self = ZoomBox::default();
    }

    fn coeffs(&self, screen_aspect: f64) -> BoxCoeffs {
        let theta = PI * self.rotation as f64 / 72.0;
        let rot_cos = theta.cos();
        let rot_sin = theta.sin();
        let fx_adj = self.width * self.skew;

        let tmp_x = self.width / -2.0 + fx_adj;
        let tmp_y = self.depth * screen_aspect / 2.0;
        let dx = (rot_cos * tmp_x - rot_sin * tmp_y) - tmp_x;
        let dy = tmp_y - (rot_sin * tmp_x + rot_cos * tmp_y);
        let top_left = (self.x + dx + fx_adj, self.y + dy / screen_aspect);
        let bottom_right = (
            self.x + self.width - dx - fx_adj,
            self.y - dy / screen_aspect + self.depth,
        );

        let tmp_x = self.width / -2.0 - fx_adj;
        let tmp_y = -tmp_y;
        let dx = (rot_cos * tmp_x - rot_sin * tmp_y) - tmp_x;
        let dy = tmp_y - (rot_sin * tmp_x + rot_cos * tmp_y);
        let bottom_left = (
            self.x + dx - fx_adj,
            self.y + dy / screen_aspect + self.depth,
        );

        BoxCoeffs {
            top_left,
            bottom_right,
            bottom_left,
        }
    }

    /// Map the box through the saved screen corners and make the result the
    /// current corners; this is the zoom-in target.
    pub fn project_corners(&self, ctx: &mut CalculationContext) {
        let coeffs = self.coeffs(ctx.screen_aspect);
        if ctx.math_mode == MathMode::BigFloat {
            if let Some(bf) = ctx.bf.as_mut() {
                project_corners_bf(bf, &coeffs);
                sync_doubles_from_bf(ctx);
                return;
            }
        }
        let fx_width = ctx.sx_max - ctx.sx_3rd;
        let fx_skew = ctx.sx_3rd - ctx.sx_min;
        let fy_depth = ctx.sy_3rd - ctx.sy_max;
        let fy_skew = ctx.sy_min - ctx.sy_3rd;

        let sx_min = ctx.sx_min;
        let sy_max = ctx.sy_max;
        let corner = |(c1, c2): (f64, f64)| {
            (
                sx_min + c1 * fx_width + c2 * fx_skew,
                sy_max + c2 * fy_depth + c1 * fy_skew,
            )
        };
        let (x, y) = corner(coeffs.top_left);
        ctx.x_min = x;
        ctx.y_max = y;
        let (x, y) = corner(coeffs.bottom_right);
        ctx.x_max = x;
        ctx.y_min = y;
        let (x, y) = corner(coeffs.bottom_left);
        ctx.x_3rd = x;
        ctx.y_3rd = y;
    }

    /// Nudge the box, snapping to the pan alignment when panning applies,
    /// and keeping its center on screen.
    pub fn move_by(&mut self, ctx: &mut CalculationContext, dx: f64, dy: f64) {
        let align = check_pan(ctx, self);
        if dx != 0.0 {
            self.x += dx;
            if align != 0 {
                let mut col = (self.x * (ctx.x_dots as f64 - 1.0 + PIXEL_ROUND)) as i32;
                if col & (align - 1) != 0 {
                    if dx > 0.0 {
                        col += align;
                    }
                    col &= !(align - 1);
                    self.x = col as f64 / (ctx.x_dots as f64 - 1.0);
                }
            }
        }
        if dy != 0.0 {
            self.y += dy;
            if align != 0 {
                let mut row = (self.y * (ctx.y_dots as f64 - 1.0 + PIXEL_ROUND)) as i32;
                if row & (align - 1) != 0 {
                    if dy > 0.0 {
                        row += align;
                    }
                    row &= !(align - 1);
                    self.y = row as f64 / (ctx.y_dots as f64 - 1.0);
                }
            }
        }
        // keep the center on screen
        if self.x + self.width / 2.0 < 0.0 {
            self.x = self.width / -2.0;
        }
        if self.x + self.width / 2.0 > 1.0 {
            self.x = 1.0 - self.width / 2.0;
        }
        if self.y + self.depth / 2.0 < 0.0 {
            self.y = self.depth / -2.0;
        }
        if self.y + self.depth / 2.0 > 1.0 {
            self.y = 1.0 - self.depth / 2.0;
        }
    }

    /// Grow or shrink the box around its center, keeping its aspect.
    pub fn resize(&mut self, steps: i32) {
        let (delta_x, delta_y);
        if self.depth * 0.75 > self.width {
            delta_y = steps as f64 * 0.036 / 0.75;
            delta_x = self.width * delta_y / self.depth;
        } else {
            delta_x = steps as f64 * 0.036;
            delta_y = self.depth * delta_x / self.width;
        }
        self.change_size(delta_x, delta_y);
    }

    /// Change width and depth, clamped to [0.05, 1], keeping the center.
    pub fn change_size(&mut self, d_width: f64, d_depth: f64) {
        let mut d_width = d_width;
        let mut d_depth = d_depth;
        if self.width + d_width > 1.0 {
            d_width = 1.0 - self.width;
        }
        if self.width + d_width < 0.05 {
            d_width = 0.05 - self.width;
        }
        self.width += d_width;
        self.x -= d_width / 2.0;
        if self.depth + d_depth > 1.0 {
            d_depth = 1.0 - self.depth;
        }
        if self.depth + d_depth < 0.05 {
            d_depth = 0.05 - self.depth;
        }
        self.depth += d_depth;
        self.y -= d_depth / 2.0;
    }
}

fn sync_doubles_from_bf(ctx: &mut CalculationContext) {
    if let Some(bf) = ctx.bf.as_mut() {
        let prec = bf.prec;
        ctx.x_min = bf.stack.bftofloat(bf.x_min, &prec);
        ctx.x_max = bf.stack.bftofloat(bf.x_max, &prec);
        ctx.x_3rd = bf.stack.bftofloat(bf.x_3rd, &prec);
        ctx.y_min = bf.stack.bftofloat(bf.y_min, &prec);
        ctx.y_max = bf.stack.bftofloat(bf.y_max, &prec);
        ctx.y_3rd = bf.stack.bftofloat(bf.y_3rd, &prec);
    }
}

/// target = base + p2 * vec1 + p4 * vec2, with the fractions as doubles.
#[allow(clippy::too_many_arguments)]
fn calc_corner_bf(
    s: &mut crate::big::BigStackGuard<'_>,
    prec: &Precision,
    target: BigFloatId,
    base: BigFloatId,
    p2: f64,
    vec1: BigFloatId,
    p4: f64,
    vec2: BigFloatId,
) {
    let t1 = s.alloc_bf(prec);
    let t2 = s.alloc_bf(prec);
    let p = s.alloc_bf(prec);
    s.floattobf(p, p2, prec);
    s.mult_bf(t1, p, vec1, prec);
    s.floattobf(p, p4, prec);
    s.mult_bf(t2, p, vec2, prec);
    s.add_bf(target, base, t1, prec);
    s.add_a_bf(target, t2, prec);
}

fn project_corners_bf(bf: &mut BfCorners, coeffs: &BoxCoeffs) {
    let prec = bf.prec;
    let (x_min, x_max, x_3rd) = (bf.x_min, bf.x_max, bf.x_3rd);
    let (y_min, y_max, y_3rd) = (bf.y_min, bf.y_max, bf.y_3rd);
    let (sx_min, sx_max, sx_3rd) = (bf.sx_min, bf.sx_max, bf.sx_3rd);
    let (sy_min, sy_max, sy_3rd) = (bf.sy_min, bf.sy_max, bf.sy_3rd);
    let mut s = bf.stack.guard();

    let fx_width = s.alloc_bf(&prec);
    let fx_skew = s.alloc_bf(&prec);
    let fy_depth = s.alloc_bf(&prec);
    let fy_skew = s.alloc_bf(&prec);
    s.sub_bf(fx_width, sx_max, sx_3rd, &prec);
    s.sub_bf(fx_skew, sx_3rd, sx_min, &prec);
    s.sub_bf(fy_depth, sy_3rd, sy_max, &prec);
    s.sub_bf(fy_skew, sy_min, sy_3rd, &prec);

    let (c1, c2) = coeffs.top_left;
    calc_corner_bf(&mut s, &prec, x_min, sx_min, c1, fx_width, c2, fx_skew);
    calc_corner_bf(&mut s, &prec, y_max, sy_max, c2, fy_depth, c1, fy_skew);
    let (c1, c2) = coeffs.bottom_right;
    calc_corner_bf(&mut s, &prec, x_max, sx_min, c1, fx_width, c2, fx_skew);
    calc_corner_bf(&mut s, &prec, y_min, sy_max, c2, fy_depth, c1, fy_skew);
    let (c1, c2) = coeffs.bottom_left;
    calc_corner_bf(&mut s, &prec, x_3rd, sx_min, c1, fx_width, c2, fx_skew);
    calc_corner_bf(&mut s, &prec, y_3rd, sy_max, c2, fy_depth, c1, fy_skew);
}

/// Invert the current corner frame: find the corners of a view in which the
/// saved screen rectangle occupies the region the current corners describe.
/// Projecting the same box from the result lands back on the saved corners.
pub fn zoom_out(ctx: &mut CalculationContext) {
    if ctx.math_mode == MathMode::BigFloat {
        if let Some(bf) = ctx.bf.as_mut() {
            zoom_out_bf(bf);
            sync_doubles_from_bf(ctx);
            return;
        }
    }
    let ftemp = (ctx.y_min - ctx.y_3rd) * (ctx.x_3rd - ctx.x_min)
        - (ctx.x_max - ctx.x_3rd) * (ctx.y_3rd - ctx.y_max);
    let plot_mx1 = ctx.x_3rd - ctx.x_min;
    let plot_mx2 = ctx.y_3rd - ctx.y_max;
    let plot_my1 = ctx.y_min - ctx.y_3rd;
    let plot_my2 = ctx.x_max - ctx.x_3rd;
    let sav_x_min = ctx.x_min;
    let sav_y_max = ctx.y_max;

    let calc = |dx: f64, dy: f64| {
        let temp_x = (dy * plot_mx1 - dx * plot_mx2) / ftemp;
        let temp_y = (dx * plot_my1 - dy * plot_my2) / ftemp;
        (
            ctx.sx_min + temp_x * (ctx.sx_max - ctx.sx_3rd) + temp_y * (ctx.sx_3rd - ctx.sx_min),
            ctx.sy_max + temp_y * (ctx.sy_3rd - ctx.sy_max) + temp_x * (ctx.sy_min - ctx.sy_3rd),
        )
    };
    let (x, y) = calc(ctx.sx_min - sav_x_min, ctx.sy_max - sav_y_max);
    let (x2, y2) = calc(ctx.sx_max - sav_x_min, ctx.sy_min - sav_y_max);
    let (x3, y3) = calc(ctx.sx_3rd - sav_x_min, ctx.sy_3rd - sav_y_max);
    ctx.x_min = x;
    ctx.y_max = y;
    ctx.x_max = x2;
    ctx.y_min = y2;
    ctx.x_3rd = x3;
    ctx.y_3rd = y3;
}

fn zoom_out_bf(bf: &mut BfCorners) {
    let prec = bf.prec;
    let (x_min, x_max, x_3rd) = (bf.x_min, bf.x_max, bf.x_3rd);
    let (y_min, y_max, y_3rd) = (bf.y_min, bf.y_max, bf.y_3rd);
    let (sx_min, sx_max, sx_3rd) = (bf.sx_min, bf.sx_max, bf.sx_3rd);
    let (sy_min, sy_max, sy_3rd) = (bf.sy_min, bf.sy_max, bf.sy_3rd);
    let mut s = bf.stack.guard();

    let t1 = s.alloc_bf(&prec);
    let t2 = s.alloc_bf(&prec);
    let t3 = s.alloc_bf(&prec);
    let ftemp = s.alloc_bf(&prec);
    let plot_mx1 = s.alloc_bf(&prec);
    let plot_mx2 = s.alloc_bf(&prec);
    let plot_my1 = s.alloc_bf(&prec);
    let plot_my2 = s.alloc_bf(&prec);
    let vec_x1 = s.alloc_bf(&prec);
    let vec_x2 = s.alloc_bf(&prec);
    let vec_y1 = s.alloc_bf(&prec);
    let vec_y2 = s.alloc_bf(&prec);
    let sav_x_min = s.alloc_bf(&prec);
    let sav_y_max = s.alloc_bf(&prec);
    let dx = s.alloc_bf(&prec);
    let dy = s.alloc_bf(&prec);
    let temp_x = s.alloc_bf(&prec);
    let temp_y = s.alloc_bf(&prec);

    // ftemp = (ymin-y3rd)*(x3rd-xmin) - (xmax-x3rd)*(y3rd-ymax)
    s.sub_bf(t1, y_min, y_3rd, &prec);
    s.sub_bf(t2, x_3rd, x_min, &prec);
    s.mult_bf(ftemp, t1, t2, &prec);
    s.sub_bf(t1, x_max, x_3rd, &prec);
    s.sub_bf(t2, y_3rd, y_max, &prec);
    s.mult_bf(t3, t1, t2, &prec);
    s.sub_a_bf(ftemp, t3, &prec);

    s.sub_bf(plot_mx1, x_3rd, x_min, &prec);
    s.sub_bf(plot_mx2, y_3rd, y_max, &prec);
    s.sub_bf(plot_my1, y_min, y_3rd, &prec);
    s.sub_bf(plot_my2, x_max, x_3rd, &prec);
    s.sub_bf(vec_x1, sx_max, sx_3rd, &prec);
    s.sub_bf(vec_x2, sx_3rd, sx_min, &prec);
    s.sub_bf(vec_y1, sy_3rd, sy_max, &prec);
    s.sub_bf(vec_y2, sy_min, sy_3rd, &prec);
    s.copy_bf(sav_x_min, x_min, &prec);
    s.copy_bf(sav_y_max, y_max, &prec);

    for &(sx, sy, out_x, out_y) in &[
        (sx_min, sy_max, x_min, y_max),
        (sx_max, sy_min, x_max, y_min),
        (sx_3rd, sy_3rd, x_3rd, y_3rd),
    ] {
        s.sub_bf(dx, sx, sav_x_min, &prec);
        s.sub_bf(dy, sy, sav_y_max, &prec);
        // temp_x = (dy*mx1 - dx*mx2)/ftemp, temp_y = (dx*my1 - dy*my2)/ftemp
        s.mult_bf(t1, dy, plot_mx1, &prec);
        s.mult_bf(t2, dx, plot_mx2, &prec);
        s.sub_a_bf(t1, t2, &prec);
        s.div_bf(temp_x, t1, ftemp, &prec);
        s.mult_bf(t1, dx, plot_my1, &prec);
        s.mult_bf(t2, dy, plot_my2, &prec);
        s.sub_a_bf(t1, t2, &prec);
        s.div_bf(temp_y, t1, ftemp, &prec);
        // out_x = sx_min + temp_x*vec_x1 + temp_y*vec_x2
        s.mult_bf(t1, temp_x, vec_x1, &prec);
        s.mult_bf(t2, temp_y, vec_x2, &prec);
        s.add_bf(out_x, sx_min, t1, &prec);
        s.add_a_bf(out_x, t2, &prec);
        // out_y = sy_max + temp_y*vec_y1 + temp_x*vec_y2
        s.mult_bf(t1, temp_y, vec_y1, &prec);
        s.mult_bf(t2, temp_x, vec_y2, &prec);
        s.add_bf(out_y, sy_max, t1, &prec);
        s.add_a_bf(out_y, t2, &prec);
    }
}

/// Re-crop the corner rectangle from one aspect ratio to another, keeping
/// the center.
pub fn aspect_ratio_crop(ctx: &mut CalculationContext, actual: f64, desired: f64) {
    let (x_margin, y_margin);
    if desired > actual {
        // new ratio is taller, crop x
        let ftemp = (1.0 - actual / desired) / 2.0;
        x_margin = (ctx.x_max - ctx.x_3rd) * ftemp;
        y_margin = (ctx.y_min - ctx.y_3rd) * ftemp;
        ctx.x_3rd += x_margin;
        ctx.y_3rd += y_margin;
    } else {
        // new ratio is wider, crop y
        let ftemp = (1.0 - desired / actual) / 2.0;
        x_margin = (ctx.x_3rd - ctx.x_min) * ftemp;
        y_margin = (ctx.y_3rd - ctx.y_max) * ftemp;
        ctx.x_3rd -= x_margin;
        ctx.y_3rd -= y_margin;
    }
    ctx.x_min += x_margin;
    ctx.y_max += y_margin;
    ctx.x_max -= x_margin;
    ctx.y_min -= y_margin;
}

/// Restore the current corners from the saved screen corners.
pub fn reset_zoom_corners(ctx: &mut CalculationContext) {
    ctx.x_min = ctx.sx_min;
    ctx.x_max = ctx.sx_max;
    ctx.x_3rd = ctx.sx_3rd;
    ctx.y_min = ctx.sy_min;
    ctx.y_max = ctx.sy_max;
    ctx.y_3rd = ctx.sy_3rd;
    if let Some(bf) = ctx.bf.as_mut() {
        let prec = bf.prec;
        for (dst, src) in [
            (bf.x_min, bf.sx_min),
            (bf.x_max, bf.sx_max),
            (bf.x_3rd, bf.sx_3rd),
            (bf.y_min, bf.sy_min),
            (bf.y_max, bf.sy_max),
            (bf.y_3rd, bf.sy_3rd),
        ] {
            bf.stack.copy_bf(dst, src, &prec);
        }
    }
    ctx.calc_deltas();
}

/// Pixel alignment required to pan the current image instead of
/// recalculating, or 0 when panning is impossible.
pub fn check_pan(ctx: &mut CalculationContext, zbox: &ZoomBox) -> i32 {
    if ctx.calc_status != CalcStatus::Resumable && ctx.calc_status != CalcStatus::Completed {
        return 0; // not resumable, not complete
    }
    if zbox.width != 1.0 || zbox.depth != 1.0 || zbox.rotation != 0 || zbox.skew != 0.0 {
        return 0; // not a full box
    }
    if ctx.calc_status == CalcStatus::Completed {
        return 1; // unlimited panning on a finished image
    }
    if ctx.calc_mode != 'g' {
        return 1;
    }
    // solid guessing underway: the in-progress grid sets the alignment
    let mut lowest_pass = 9;
    if let Some(resume) = ctx.resume.as_mut() {
        resume.start();
        if let Ok(list) = WorkList::read_resume(resume) {
            if let Some(pass) = list.lowest_pass() {
                lowest_pass = pass;
            }
        }
    }
    if let Some(pass) = ctx.work_list.lowest_pass() {
        lowest_pass = lowest_pass.min(pass);
    }
    block_size(ctx.x_dots, ctx.y_dots) >> lowest_pass.min(30)
}

/// Copy one screen row shifted by `col` columns; columns shifted in from
/// off screen become color 0.
pub fn move_row(fb: &mut dyn FrameBuffer, from_row: i32, to_row: i32, col: i32, x_dots: i32) {
    let mut temp = vec![0i32; x_dots as usize];
    if from_row >= 0 && from_row < fb.height() as i32 {
        let mut to_col = 0i32;
        let mut start_col = 0i32;
        let mut end_col = x_dots - 1;
        if col < 0 {
            to_col -= col;
            end_col += col;
        } else if col > 0 {
            start_col += col;
        }
        if end_col >= start_col {
            let len = (end_col - start_col + 1) as usize;
            let to = to_col as usize;
            fb.read_span(
                from_row as usize,
                start_col as usize,
                &mut temp[to..to + len],
            );
        }
    }
    fb.write_span(to_row as usize, 0, &temp);
}

/// Apply a full-size box as a pan: slide the finished pixels, queue the
/// newly exposed strips as work rectangles and leave the image resumable.
/// Falls back to `ParamsChanged` (a full recalculation) when the pan is
/// not aligned to the calculation grid or the work list would overflow.
pub fn init_pan_or_recalc(
    ctx: &mut CalculationContext,
    fb: &mut dyn FrameBuffer,
    zbox: &ZoomBox,
    do_zoom_out: bool,
) {
    if zbox.width == 0.0 {
        return; // no box active
    }
    let align_mask = check_pan(ctx, zbox) - 1;
    if align_mask < 0 {
        ctx.calc_status = CalcStatus::ParamsChanged;
        return;
    }
    if zbox.x == 0.0 && zbox.y == 0.0 {
        return; // no movement
    }
    let mut col = (zbox.x * (ctx.x_dots as f64 - 1.0 + PIXEL_ROUND)) as i32;
    let mut row = (zbox.y * (ctx.y_dots as f64 - 1.0 + PIXEL_ROUND)) as i32;
    if do_zoom_out {
        col = -col;
        row = -row;
    }
    if row & align_mask != 0 || col & align_mask != 0 {
        ctx.calc_status = CalcStatus::ParamsChanged;
        return;
    }

    if ctx.calc_status == CalcStatus::Resumable {
        if let Some(resume) = ctx.resume.as_mut() {
            resume.start();
            match WorkList::read_resume(resume) {
                Ok(list) => ctx.work_list = list,
                Err(_) => {
                    ctx.calc_status = CalcStatus::ParamsChanged;
                    return;
                }
            }
        }
    }
    ctx.work_list.offset_all(row, col);

    // queue the strips the pan exposes
    let x_dots = ctx.x_dots;
    let y_dots = ctx.y_dots;
    let mut top = 0;
    let mut bottom = y_dots - 1;
    let mut overflow = false;
    if row < 0 {
        overflow |= ctx
            .work_list
            .add(WorkItem::fresh(0, x_dots - 1, 0, -row - 1))
            .is_err();
        top = -row;
    }
    if row > 0 {
        overflow |= ctx
            .work_list
            .add(WorkItem::fresh(0, x_dots - 1, y_dots - row, y_dots - 1))
            .is_err();
        bottom = y_dots - row - 1;
    }
    if col < 0 {
        overflow |= ctx
            .work_list
            .add(WorkItem::fresh(0, -col - 1, top, bottom))
            .is_err();
    }
    if col > 0 {
        overflow |= ctx
            .work_list
            .add(WorkItem::fresh(x_dots - col, x_dots - 1, top, bottom))
            .is_err();
    }
    if overflow {
        warn!("work list full, pan falls back to a recalculation");
        ctx.work_list.clear();
        ctx.calc_status = CalcStatus::ParamsChanged;
        return;
    }
    ctx.calc_status = CalcStatus::Resumable;

    if row > 0 {
        for y in 0..y_dots {
            move_row(fb, y + row, y, col, x_dots);
        }
    } else {
        for y in (0..y_dots).rev() {
            move_row(fb, y + row, y, col, x_dots);
        }
    }
    ctx.work_list.fix(fb, x_dots, y_dots);

    let mut resume = ResumeBuffer::new(4 + 8 * 4 * (MAX_CALC_WORK + 1), RESUME_VERSION);
    ctx.work_list.write_resume(&mut resume);
    ctx.resume = Some(resume);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::MemoryBuffer;

    fn context_with_view() -> CalculationContext {
        let mut ctx = CalculationContext::new(64, 48);
        ctx.x_min = -2.0;
        ctx.x_3rd = -2.0;
        ctx.x_max = 1.0;
        ctx.y_min = -1.125;
        ctx.y_3rd = -1.125;
        ctx.y_max = 1.125;
        ctx.save_screen_corners();
        ctx
    }

    fn boxed(x: f64, y: f64, w: f64, d: f64) -> ZoomBox {
        ZoomBox {
            x,
            y,
            width: w,
            depth: d,
            rotation: 0,
            skew: 0.0,
        }
    }

    #[test]
    fn full_box_projects_to_saved_corners() {
        let mut ctx = context_with_view();
        let mut zbox = ZoomBox::new();
        zbox.select_all();
        zbox.project_corners(&mut ctx);
        assert!((ctx.x_min - ctx.sx_min).abs() < 1e-12);
        assert!((ctx.x_max - ctx.sx_max).abs() < 1e-12);
        assert!((ctx.y_min - ctx.sy_min).abs() < 1e-12);
        assert!((ctx.y_max - ctx.sy_max).abs() < 1e-12);
        assert!((ctx.x_3rd - ctx.sx_3rd).abs() < 1e-12);
        assert!((ctx.y_3rd - ctx.sy_3rd).abs() < 1e-12);
    }

    #[test]
    fn quarter_box_narrows_the_view() {
        let mut ctx = context_with_view();
        let zbox = boxed(0.25, 0.25, 0.5, 0.5);
        zbox.project_corners(&mut ctx);
        assert!(ctx.x_min > ctx.sx_min && ctx.x_max < ctx.sx_max);
        assert!(ctx.y_min > ctx.sy_min && ctx.y_max < ctx.sy_max);
        let new_width = ctx.x_max - ctx.x_min;
        let old_width = ctx.sx_max - ctx.sx_min;
        assert!((new_width - old_width / 2.0).abs() < 1e-12);
    }

    #[test]
    fn zoom_out_inverts_projection() {
        let mut ctx = context_with_view();
        let saved = (
            ctx.sx_min, ctx.sx_max, ctx.sx_3rd, ctx.sy_min, ctx.sy_max, ctx.sy_3rd,
        );
        let mut zbox = boxed(0.3, 0.2, 0.25, 0.25);
        zbox.rotation = 7;
        zbox.skew = 0.05;
        zbox.project_corners(&mut ctx);
        zoom_out(&mut ctx);
        // projecting the same box from the widened view recovers the start
        ctx.save_screen_corners();
        zbox.project_corners(&mut ctx);
        assert!((ctx.x_min - saved.0).abs() < 1e-9);
        assert!((ctx.x_max - saved.1).abs() < 1e-9);
        assert!((ctx.x_3rd - saved.2).abs() < 1e-9);
        assert!((ctx.y_min - saved.3).abs() < 1e-9);
        assert!((ctx.y_max - saved.4).abs() < 1e-9);
        assert!((ctx.y_3rd - saved.5).abs() < 1e-9);
    }

    #[test]
    fn bigfloat_projection_matches_doubles() {
        let mut double_ctx = context_with_view();
        let mut bf_ctx = context_with_view();
        bf_ctx.init_bf(30);
        bf_ctx.save_screen_corners();

        let zbox = boxed(0.25, 0.25, 0.5, 0.5);
        zbox.project_corners(&mut double_ctx);
        zbox.project_corners(&mut bf_ctx);
        assert!((double_ctx.x_min - bf_ctx.x_min).abs() < 1e-10);
        assert!((double_ctx.x_max - bf_ctx.x_max).abs() < 1e-10);
        assert!((double_ctx.y_min - bf_ctx.y_min).abs() < 1e-10);
        assert!((double_ctx.y_max - bf_ctx.y_max).abs() < 1e-10);

        zoom_out(&mut double_ctx);
        zoom_out(&mut bf_ctx);
        assert!((double_ctx.x_min - bf_ctx.x_min).abs() < 1e-10);
        assert!((double_ctx.y_max - bf_ctx.y_max).abs() < 1e-10);
    }

    #[test]
    fn aspect_crop_round_trip_keeps_center() {
        let mut ctx = context_with_view();
        let center_x = (ctx.x_min + ctx.x_max) / 2.0;
        let center_y = (ctx.y_min + ctx.y_max) / 2.0;
        aspect_ratio_crop(&mut ctx, 0.75, 1.0);
        assert!(((ctx.x_min + ctx.x_max) / 2.0 - center_x).abs() < 1e-12);
        assert!(((ctx.y_min + ctx.y_max) / 2.0 - center_y).abs() < 1e-12);
        let cropped_width = ctx.x_max - ctx.x_min;
        assert!(cropped_width < ctx.sx_max - ctx.sx_min);
    }

    #[test]
    fn move_clamps_center_on_screen() {
        let mut ctx = context_with_view();
        ctx.calc_status = CalcStatus::ParamsChanged; // no pan snapping
        let mut zbox = boxed(0.4, 0.4, 0.2, 0.2);
        zbox.move_by(&mut ctx, -5.0, 0.0);
        assert!((zbox.x - (-0.1)).abs() < 1e-12);
        zbox.move_by(&mut ctx, 5.0, 5.0);
        assert!((zbox.x - 0.9).abs() < 1e-12);
        assert!((zbox.y - 0.9).abs() < 1e-12);
    }

    #[test]
    fn resize_clamps_to_screen_and_minimum() {
        let mut zbox = boxed(0.45, 0.45, 0.1, 0.1);
        zbox.resize(100);
        assert!(zbox.width <= 1.0 && zbox.depth <= 1.0);
        zbox.resize(-100);
        assert!(zbox.width >= 0.05 && zbox.depth >= 0.05);
    }

    #[test]
    fn check_pan_requires_full_unrotated_box() {
        let mut ctx = context_with_view();
        ctx.calc_status = CalcStatus::Completed;
        let mut zbox = ZoomBox::new();
        zbox.select_all();
        assert_eq!(check_pan(&mut ctx, &zbox), 1);
        zbox.rotation = 1;
        assert_eq!(check_pan(&mut ctx, &zbox), 0);
        zbox.rotation = 0;
        zbox.width = 0.5;
        assert_eq!(check_pan(&mut ctx, &zbox), 0);
        zbox.width = 1.0;
        ctx.calc_status = CalcStatus::ParamsChanged;
        assert_eq!(check_pan(&mut ctx, &zbox), 0);
    }

    #[test]
    fn check_pan_alignment_tracks_guessing_pass() {
        let mut ctx = context_with_view();
        ctx.calc_status = CalcStatus::Resumable;
        let mut item = WorkItem::fresh(0, 63, 0, 47);
        item.pass = 1;
        ctx.work_list.add(item).unwrap();
        let mut zbox = ZoomBox::new();
        zbox.select_all();
        // block size 4 at 64x48, pass 1 halves it
        assert_eq!(check_pan(&mut ctx, &zbox), 2);
    }

    #[test]
    fn pan_moves_pixels_and_queues_edges() {
        let (w, h) = (64, 48);
        let mut ctx = context_with_view();
        ctx.calc_status = CalcStatus::Completed;
        let mut fb = MemoryBuffer::new(w as usize, h as usize);
        for y in 0..h {
            for x in 0..w {
                fb.put_color(x as usize, y as usize, y * w + x + 1);
            }
        }
        // pan 4 right, 4 down in screen fractions
        let mut zbox = ZoomBox::new();
        zbox.select_all();
        zbox.x = 4.0 / (w as f64 - 1.0);
        zbox.y = 4.0 / (h as f64 - 1.0);
        init_pan_or_recalc(&mut ctx, &mut fb, &zbox, false);

        assert_eq!(ctx.calc_status, CalcStatus::Resumable);
        assert!(!ctx.work_list.is_empty());
        assert!(ctx.resume.is_some());
        // interior pixels slid up and left by 4
        for y in 0..h - 4 {
            for x in 0..w - 4 {
                assert_eq!(
                    fb.get_color(x as usize, y as usize),
                    (y + 4) * w + (x + 4) + 1,
                    "pixel ({}, {})",
                    x,
                    y
                );
            }
        }
        // exposed strips cover the right and bottom edges
        let covers_bottom = ctx
            .work_list
            .items()
            .iter()
            .any(|i| i.y_start == h - 4 && i.y_stop == h - 1);
        let covers_right = ctx
            .work_list
            .items()
            .iter()
            .any(|i| i.x_start == w - 4 && i.x_stop == w - 1);
        assert!(covers_bottom && covers_right);
    }

    #[test]
    fn pan_there_and_back_restores_interior() {
        let (w, h) = (64, 48);
        let mut ctx = context_with_view();
        ctx.calc_status = CalcStatus::Completed;
        let mut fb = MemoryBuffer::new(w as usize, h as usize);
        for y in 0..h {
            for x in 0..w {
                fb.put_color(x as usize, y as usize, y * w + x + 1);
            }
        }
        let mut zbox = ZoomBox::new();
        zbox.select_all();
        zbox.x = 8.0 / (w as f64 - 1.0);
        zbox.y = 0.0;
        init_pan_or_recalc(&mut ctx, &mut fb, &zbox, false);
        zbox.x = -8.0 / (w as f64 - 1.0);
        init_pan_or_recalc(&mut ctx, &mut fb, &zbox, false);
        // pixels that stayed on screen both times are back in place
        for y in 0..h {
            for x in 8..w {
                assert_eq!(
                    fb.get_color(x as usize, y as usize),
                    y * w + x + 1,
                    "pixel ({}, {})",
                    x,
                    y
                );
            }
        }
    }

    #[test]
    fn misaligned_pan_forces_recalculation() {
        let mut ctx = context_with_view();
        ctx.calc_status = CalcStatus::Resumable;
        ctx.work_list.add(WorkItem::fresh(0, 63, 0, 47)).unwrap();
        let mut resume = ResumeBuffer::new(1024, RESUME_VERSION);
        ctx.work_list.write_resume(&mut resume);
        ctx.resume = Some(resume);

        let mut fb = MemoryBuffer::new(64, 48);
        let mut zbox = ZoomBox::new();
        zbox.select_all();
        // pass 0 pending: alignment 4, offset of 3 cannot pan
        zbox.x = 3.0 / 63.0;
        init_pan_or_recalc(&mut ctx, &mut fb, &zbox, false);
        assert_eq!(ctx.calc_status, CalcStatus::ParamsChanged);
    }

    #[test]
    fn reset_restores_saved_corners() {
        let mut ctx = context_with_view();
        let zbox = boxed(0.25, 0.25, 0.5, 0.5);
        zbox.project_corners(&mut ctx);
        assert!(ctx.x_min != ctx.sx_min);
        reset_zoom_corners(&mut ctx);
        assert_eq!(ctx.x_min, ctx.sx_min);
        assert_eq!(ctx.y_max, ctx.sy_max);
    }
}
