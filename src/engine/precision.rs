use log::warn;

use crate::big::{BigFloatId, BigStack, Precision};
use crate::engine::context::{BfCorners, CalcStatus, CalculationContext, MathMode};
use crate::util::FloatExtended;

/// Screen aspect the magnification factors are expressed against.
pub const DEFAULT_ASPECT: f64 = 0.75;

/// How far the x magnification factor may drift from square before the
/// corner adjuster stops snapping it back to exactly 1.
pub const ASPECT_DRIFT: f64 = 0.02;

/// Representable coordinate limit the corners are pulled back inside.
const CORNER_LIMIT: f64 = 32767.99;

const DBL_DIG: i32 = 15;

#[inline]
fn rad_to_deg(x: f64) -> f64 {
    x * (180.0 / std::f64::consts::PI)
}

#[inline]
fn deg_to_rad(x: f64) -> f64 {
    x * (std::f64::consts::PI / 180.0)
}

/// Center/magnification description of a view rectangle. Rotation and skew
/// angles say how much the image has been rotated, not the zoom box.
#[derive(Clone, Copy, Debug)]
pub struct CenterMag {
    pub x_ctr: f64,
    pub y_ctr: f64,
    pub magnification: FloatExtended,
    pub x_mag_factor: f64,
    pub rotation: f64,
    pub skew: f64,
}

/// The angles and magnification of a view whose center only exists at
/// arbitrary precision.
#[derive(Clone, Copy, Debug)]
pub struct MagInfo {
    pub magnification: FloatExtended,
    pub x_mag_factor: f64,
    pub rotation: f64,
    pub skew: f64,
}

/// Exponent of the leading decimal digit.
pub fn power10(v: FloatExtended) -> i32 {
    v.log10().floor() as i32
}

/// Digits needed to distinguish adjacent pixels at the current resolution,
/// from the double corners. An axis whose span rounds to zero in f64 is
/// already past double range and is skipped; `None` only when both axes
/// have collapsed.
pub fn precision_dbl(ctx: &CalculationContext) -> Option<i32> {
    let rez = (ctx.x_dots - 1) as f64;
    let x_del = (ctx.x_max - ctx.x_3rd) / rez;
    let y_del2 = (ctx.y_3rd - ctx.y_min) / rez;
    let rez = (ctx.y_dots - 1) as f64;
    let y_del = (ctx.y_max - ctx.y_3rd) / rez;
    let x_del2 = (ctx.x_3rd - ctx.x_min) / rez;

    let mut del1 = x_del.abs() + x_del2.abs();
    let del2 = y_del.abs() + y_del2.abs();
    if del1 == 0.0 || (del2 > 0.0 && del2 < del1) {
        del1 = del2;
    }
    if del1 == 0.0 {
        return None;
    }
    let mut digits = 1;
    while del1 < 1.0 {
        digits += 1;
        del1 *= 10.0;
    }
    Some(digits.max(3))
}

/// Digits needed to distinguish adjacent pixels, from the arbitrary
/// precision corners, combined with the digits the magnification itself
/// carries.
pub fn precision_bf(ctx: &mut CalculationContext) -> Option<i32> {
    let x_dots = ctx.x_dots;
    let y_dots = ctx.y_dots;
    let bf = ctx.bf.as_mut()?;
    let prec = bf.prec;
    let [x_min, x_max, x_3rd, y_min, y_max, y_3rd] = bf.corner_handles();

    let mut digits = 1;
    {
        let mut s = bf.stack.guard();
        let one = s.alloc_bf(&prec);
        let del1 = s.alloc_bf(&prec);
        let del2 = s.alloc_bf(&prec);
        let x_del = s.alloc_bf(&prec);
        let x_del2 = s.alloc_bf(&prec);
        let y_del = s.alloc_bf(&prec);
        let y_del2 = s.alloc_bf(&prec);
        s.floattobf(one, 1.0, &prec);

        s.sub_bf(x_del, x_max, x_3rd, &prec);
        s.div_a_bf_int(x_del, (x_dots - 1) as u16, &prec);
        s.sub_bf(y_del2, y_3rd, y_min, &prec);
        s.div_a_bf_int(y_del2, (x_dots - 1) as u16, &prec);
        s.sub_bf(y_del, y_max, y_3rd, &prec);
        s.div_a_bf_int(y_del, (y_dots - 1) as u16, &prec);
        s.sub_bf(x_del2, x_3rd, x_min, &prec);
        s.div_a_bf_int(x_del2, (y_dots - 1) as u16, &prec);

        s.add_bf(del1, x_del, x_del2, &prec);
        s.abs_a_bf(del1, &prec);
        s.add_bf(del2, y_del, y_del2, &prec);
        s.abs_a_bf(del2, &prec);
        if s.cmp_bf(del2, del1, &prec) < 0 {
            s.copy_bf(del1, del2, &prec);
        }
        if s.is_bf_zero(del1, &prec) {
            return None;
        }
        while s.cmp_bf(del1, one, &prec) < 0 {
            digits += 1;
            s.mult_a_bf_int(del1, 10, &prec);
        }
    }
    let digits = digits.max(3);

    let (info, _, _) = cvt_center_mag_bf(bf);
    let dec = power10(info.magnification) + 4;
    Some(digits.max(dec))
}

/// Pick the math mode for the next calculation from the digits the current
/// view needs. Re-run before every calculation; zooming back out drops to
/// double automatically. `force_bf` pins arbitrary precision on for testing.
pub fn select_math_mode(ctx: &mut CalculationContext, force_bf: bool) {
    match ctx.math_mode {
        MathMode::BigFloat => match precision_bf(ctx) {
            Some(digits) if force_bf || digits > DBL_DIG + 1 => {
                ctx.init_bf(digits.max(DBL_DIG + 2) as usize);
            }
            _ => ctx.drop_to_double(),
        },
        MathMode::Double => {
            // a fully collapsed rectangle means the view outgrew what f64
            // can measure, not a shallow one
            let digits = precision_dbl(ctx).unwrap_or(DBL_DIG + 2);
            if force_bf || digits > DBL_DIG + 1 {
                ctx.init_bf(digits.max(DBL_DIG + 2) as usize);
                ctx.calc_status = CalcStatus::ParamsChanged;
            }
        }
    }
}

/// Convert the double corners to center/magnification form by the triangle
/// decomposition: side a = bottom edge, b = left edge, c = the diagonal not
/// containing the 3rd corner.
pub fn cvt_center_mag(ctx: &CalculationContext) -> CenterMag {
    let mut rotation;
    let mut skew;
    let x_ctr = (ctx.x_min + ctx.x_max) / 2.0;
    let y_ctr = (ctx.y_min + ctx.y_max) / 2.0;
    let mut magnification;
    let mut x_mag_factor;

    if ctx.x_3rd == ctx.x_min && ctx.y_3rd == ctx.y_min {
        // no rotation or skewing, but stretching is allowed
        let width = ctx.x_max - ctx.x_min;
        let height = ctx.y_max - ctx.y_min;
        magnification = FloatExtended::new(2.0 / height, 0);
        x_mag_factor = height / (DEFAULT_ASPECT * width);
        rotation = 0.0;
        skew = 0.0;
    } else {
        let tmp_x1 = ctx.x_max - ctx.x_min;
        let tmp_y1 = ctx.y_max - ctx.y_min;
        let c2 = tmp_x1 * tmp_x1 + tmp_y1 * tmp_y1;

        let tmp_x1 = ctx.x_max - ctx.x_3rd;
        let tmp_y1 = ctx.y_min - ctx.y_3rd;
        let a2 = tmp_x1 * tmp_x1 + tmp_y1 * tmp_y1;
        let a = a2.sqrt();
        rotation = -rad_to_deg(tmp_y1.atan2(tmp_x1)); // negative for image rotation

        let tmp_x2 = ctx.x_min - ctx.x_3rd;
        let tmp_y2 = ctx.y_max - ctx.y_3rd;
        let b2 = tmp_x2 * tmp_x2 + tmp_y2 * tmp_y2;
        let b = b2.sqrt();

        let tmp_a = ((a2 + b2 - c2) / (2.0 * a * b)).acos();
        skew = 90.0 - rad_to_deg(tmp_a);

        let height = b * tmp_a.sin();
        magnification = FloatExtended::new(2.0 / height, 0);
        x_mag_factor = height / (DEFAULT_ASPECT * a);

        // a cross b negative means a left-handed coordinate system
        if tmp_x1 * tmp_y2 - tmp_x2 * tmp_y1 < 0.0 {
            skew = -skew;
            x_mag_factor = -x_mag_factor;
            magnification = -magnification;
        }
    }
    if magnification.mantissa < 0.0 {
        magnification = -magnification;
        rotation += 180.0;
    }
    CenterMag {
        x_ctr,
        y_ctr,
        magnification,
        x_mag_factor,
        rotation,
        skew,
    }
}

/// Convert center/magnification back to double corners.
pub fn cvt_corners(ctx: &mut CalculationContext, cm: &CenterMag) {
    let mut x_mag_factor = cm.x_mag_factor;
    if x_mag_factor == 0.0 {
        x_mag_factor = 1.0;
    }
    let h = (FloatExtended::new(1.0, 0) / cm.magnification).to_float();
    let w = h / (DEFAULT_ASPECT * x_mag_factor);

    if cm.rotation == 0.0 && cm.skew == 0.0 {
        ctx.x_min = cm.x_ctr - w;
        ctx.x_3rd = ctx.x_min;
        ctx.x_max = cm.x_ctr + w;
        ctx.y_min = cm.y_ctr - h;
        ctx.y_3rd = ctx.y_min;
        ctx.y_max = cm.y_ctr + h;
        return;
    }

    // in unrotated, untranslated coordinates
    let tan_skew = deg_to_rad(cm.skew).tan();
    let mut x_min = -w + h * tan_skew;
    let mut x_max = w - h * tan_skew;
    let mut x_3rd = -w - h * tan_skew;
    let mut y_max = h;
    let mut y_min = -h;
    let mut y_3rd = -h;

    // rotate, then translate
    let rotation = deg_to_rad(cm.rotation);
    let sin_rot = rotation.sin();
    let cos_rot = rotation.cos();

    let x = x_min * cos_rot + y_max * sin_rot;
    let y = -x_min * sin_rot + y_max * cos_rot;
    x_min = x + cm.x_ctr;
    y_max = y + cm.y_ctr;

    let x = x_max * cos_rot + y_min * sin_rot;
    let y = -x_max * sin_rot + y_min * cos_rot;
    x_max = x + cm.x_ctr;
    y_min = y + cm.y_ctr;

    let x = x_3rd * cos_rot + y_3rd * sin_rot;
    let y = -x_3rd * sin_rot + y_3rd * cos_rot;
    x_3rd = x + cm.x_ctr;
    y_3rd = y + cm.y_ctr;

    ctx.x_min = x_min;
    ctx.x_max = x_max;
    ctx.x_3rd = x_3rd;
    ctx.y_min = y_min;
    ctx.y_max = y_max;
    ctx.y_3rd = y_3rd;
}

/// Read a big float as an extended-exponent double, so magnitudes past f64
/// range survive.
fn bftofloat_x(s: &mut BigStack, n: BigFloatId, prec: &Precision) -> FloatExtended {
    let mut g = s.guard();
    let t = g.alloc_bf(prec);
    g.copy_bf(t, n, prec);
    let e = g.bf_exp(t, prec);
    g.set_bf_exp(t, 0, prec);
    let f = g.bftofloat(t, prec);
    FloatExtended::new(f, 8 * e)
}

/// Inject an extended-exponent double into a big float.
fn floattobf_x(s: &mut BigStack, r: BigFloatId, v: FloatExtended, prec: &Precision) {
    let q = v.exponent.div_euclid(8);
    let bits = v.exponent.rem_euclid(8);
    s.floattobf(r, v.mantissa * (1u32 << bits) as f64, prec);
    if s.is_bf_not_zero(r, prec) {
        let e = s.bf_exp(r, prec);
        s.set_bf_exp(r, e + q, prec);
    }
}

fn center_mag_bf_raw(
    s: &mut BigStack,
    prec: &Precision,
    corners: [BigFloatId; 6],
    x_ctr: BigFloatId,
    y_ctr: BigFloatId,
) -> MagInfo {
    let [x_min, x_max, x_3rd, y_min, y_max, y_3rd] = corners;
    let mut rotation;
    let mut skew;
    let mut magnification;
    let mut x_mag_factor;

    // differences are taken in big floats first; converting the corners
    // before subtracting would cancel every digit past f64

    if s.cmp_bf(x_3rd, x_min, prec) == 0 && s.cmp_bf(y_3rd, y_min, prec) == 0 {
        let mut g = s.guard();
        let t = g.alloc_bf(prec);
        g.sub_bf(t, x_max, x_min, prec);
        let width = bftofloat_x(&mut g, t, prec);
        g.sub_bf(t, y_max, y_min, prec);
        let height = bftofloat_x(&mut g, t, prec);

        g.add_bf(x_ctr, x_min, x_max, prec);
        g.half_a_bf(x_ctr, prec);
        g.add_bf(y_ctr, y_min, y_max, prec);
        g.half_a_bf(y_ctr, prec);

        magnification = FloatExtended::new(2.0, 0) / height;
        x_mag_factor = (height / (width * DEFAULT_ASPECT)).to_float();
        rotation = 0.0;
        skew = 0.0;
    } else {
        let mut g = s.guard();
        let tx = g.alloc_bf(prec);
        let ty = g.alloc_bf(prec);

        g.sub_bf(tx, x_max, x_min, prec);
        let tmp_x1 = bftofloat_x(&mut g, tx, prec);
        g.sub_bf(ty, y_max, y_min, prec);
        let tmp_y1 = bftofloat_x(&mut g, ty, prec);
        let c2 = tmp_x1 * tmp_x1 + tmp_y1 * tmp_y1;

        g.sub_bf(tx, x_max, x_3rd, prec);
        let tmp_x1 = bftofloat_x(&mut g, tx, prec);
        g.sub_bf(ty, y_min, y_3rd, prec);
        let tmp_y1 = bftofloat_x(&mut g, ty, prec);
        let a2 = tmp_x1 * tmp_x1 + tmp_y1 * tmp_y1;
        let a = a2.sqrt();

        // atan2 only depends on the ratio, which fits a double
        let sign_x = if tmp_x1.mantissa > 0.0 {
            1.0
        } else if tmp_x1.mantissa < 0.0 {
            -1.0
        } else {
            0.0
        };
        let tmp_y = if sign_x != 0.0 {
            (tmp_y1 / tmp_x1).to_float() * sign_x
        } else {
            0.0
        };
        rotation = -rad_to_deg(tmp_y.atan2(sign_x));

        g.sub_bf(tx, x_min, x_3rd, prec);
        let tmp_x2 = bftofloat_x(&mut g, tx, prec);
        g.sub_bf(ty, y_max, y_3rd, prec);
        let tmp_y2 = bftofloat_x(&mut g, ty, prec);
        let b2 = tmp_x2 * tmp_x2 + tmp_y2 * tmp_y2;
        let b = b2.sqrt();

        let tmp_a = ((a2 + b2 - c2) / (a * b * 2.0)).to_float().acos();
        skew = 90.0 - rad_to_deg(tmp_a);

        // the center is the only quantity that must stay at full precision
        g.add_bf(x_ctr, x_min, x_max, prec);
        g.half_a_bf(x_ctr, prec);
        g.add_bf(y_ctr, y_min, y_max, prec);
        g.half_a_bf(y_ctr, prec);

        let height = b * tmp_a.sin();
        magnification = FloatExtended::new(2.0, 0) / height;
        x_mag_factor = (height / (a * DEFAULT_ASPECT)).to_float();

        if (tmp_x1 * tmp_y2 - tmp_x2 * tmp_y1).mantissa < 0.0 {
            skew = -skew;
            x_mag_factor = -x_mag_factor;
            magnification = -magnification;
        }
    }
    if magnification.mantissa < 0.0 {
        magnification = -magnification;
        rotation += 180.0;
    }
    MagInfo {
        magnification,
        x_mag_factor,
        rotation,
        skew,
    }
}

fn corners_bf_raw(
    s: &mut BigStack,
    prec: &Precision,
    corners: [BigFloatId; 6],
    x_ctr: BigFloatId,
    y_ctr: BigFloatId,
    info: &MagInfo,
) {
    let [x_min, x_max, x_3rd, y_min, y_max, y_3rd] = corners;
    let mut x_mag_factor = info.x_mag_factor;
    if x_mag_factor == 0.0 {
        x_mag_factor = 1.0;
    }
    let h = FloatExtended::new(1.0, 0) / info.magnification;
    let w = h / (DEFAULT_ASPECT * x_mag_factor);

    let mut g = s.guard();
    let bf_h = g.alloc_bf(prec);
    let bf_w = g.alloc_bf(prec);
    floattobf_x(&mut g, bf_h, h, prec);
    floattobf_x(&mut g, bf_w, w, prec);

    if info.rotation == 0.0 && info.skew == 0.0 {
        g.sub_bf(x_min, x_ctr, bf_w, prec);
        g.copy_bf(x_3rd, x_min, prec);
        g.add_bf(x_max, x_ctr, bf_w, prec);
        g.sub_bf(y_min, y_ctr, bf_h, prec);
        g.copy_bf(y_3rd, y_min, prec);
        g.add_bf(y_max, y_ctr, bf_h, prec);
        return;
    }

    let tmp = g.alloc_bf(prec);
    let tan_skew = deg_to_rad(info.skew).tan();
    let u_x_min = -w + h * tan_skew;
    let u_x_max = w - h * tan_skew;
    let u_x_3rd = -w - h * tan_skew;
    let u_y_max = h;
    let u_y_min = -h;
    let u_y_3rd = -h;

    let rotation = deg_to_rad(info.rotation);
    let sin_rot = rotation.sin();
    let cos_rot = rotation.cos();

    // top left
    let x = u_x_min * cos_rot + u_y_max * sin_rot;
    let y = -(u_x_min * sin_rot) + u_y_max * cos_rot;
    floattobf_x(&mut g, tmp, x, prec);
    g.add_bf(x_min, tmp, x_ctr, prec);
    floattobf_x(&mut g, tmp, y, prec);
    g.add_bf(y_max, tmp, y_ctr, prec);

    // bottom right
    let x = u_x_max * cos_rot + u_y_min * sin_rot;
    let y = -(u_x_max * sin_rot) + u_y_min * cos_rot;
    floattobf_x(&mut g, tmp, x, prec);
    g.add_bf(x_max, tmp, x_ctr, prec);
    floattobf_x(&mut g, tmp, y, prec);
    g.add_bf(y_min, tmp, y_ctr, prec);

    // bottom left
    let x = u_x_3rd * cos_rot + u_y_3rd * sin_rot;
    let y = -(u_x_3rd * sin_rot) + u_y_3rd * cos_rot;
    floattobf_x(&mut g, tmp, x, prec);
    g.add_bf(x_3rd, tmp, x_ctr, prec);
    floattobf_x(&mut g, tmp, y, prec);
    g.add_bf(y_3rd, tmp, y_ctr, prec);
}

/// Center/magnification of the arbitrary precision corners. The center comes
/// back as decimal strings since it may not survive a double.
pub fn cvt_center_mag_bf(bf: &mut BfCorners) -> (MagInfo, String, String) {
    let prec = bf.prec;
    let corners = bf.corner_handles();
    let mut g = bf.stack.guard();
    let x_ctr = g.alloc_bf(&prec);
    let y_ctr = g.alloc_bf(&prec);
    let info = center_mag_bf_raw(&mut g, &prec, corners, x_ctr, y_ctr);
    let x_text = g.bftostr_e(0, x_ctr, &prec);
    let y_text = g.bftostr_e(0, y_ctr, &prec);
    (info, x_text, y_text)
}

/// Rebuild the arbitrary precision corners from a center (as decimal
/// strings) and magnification.
pub fn cvt_corners_bf(bf: &mut BfCorners, x_ctr: &str, y_ctr: &str, info: &MagInfo) {
    let prec = bf.prec;
    let corners = bf.corner_handles();
    let mut g = bf.stack.guard();
    let cx = g.alloc_bf(&prec);
    let cy = g.alloc_bf(&prec);
    g.strtobf(cx, x_ctr, &prec);
    g.strtobf(cy, y_ctr, &prec);
    corners_bf_raw(&mut g, &prec, corners, cx, cy, info);
}

fn smallest_add(num: f64) -> f64 {
    num + num * 5.0e-16
}

/// Make edges very near vertical/horizontal exact, to ditch rounding errors
/// and avoid huge per-axis delta ratios; also squares up a nearly-square x
/// magnification factor.
pub fn adjust_corner(ctx: &mut CalculationContext) {
    let mut cm = cvt_center_mag(ctx);
    let ftemp = cm.x_mag_factor.abs();
    if ftemp != 1.0 && ftemp >= 1.0 - ASPECT_DRIFT && ftemp <= 1.0 + ASPECT_DRIFT {
        cm.x_mag_factor = cm.x_mag_factor.signum();
        cvt_corners(ctx, &cm);
    }

    let ftemp = (ctx.x_3rd - ctx.x_min).abs();
    let ftemp2 = (ctx.x_max - ctx.x_3rd).abs();
    if ftemp < ftemp2 && ftemp * 10000.0 < ftemp2 && ctx.y_3rd != ctx.y_max {
        ctx.x_3rd = ctx.x_min;
    }
    if ftemp2 * 10000.0 < ftemp && ctx.y_3rd != ctx.y_min {
        ctx.x_3rd = ctx.x_max;
    }

    let ftemp = (ctx.y_3rd - ctx.y_min).abs();
    let ftemp2 = (ctx.y_max - ctx.y_3rd).abs();
    if ftemp < ftemp2 && ftemp * 10000.0 < ftemp2 && ctx.x_3rd != ctx.x_max {
        ctx.y_3rd = ctx.y_min;
    }
    if ftemp2 * 10000.0 < ftemp && ctx.x_3rd != ctx.x_min {
        ctx.y_3rd = ctx.y_max;
    }
}

/// Arbitrary precision flavor of [`adjust_corner`].
pub fn adjust_corner_bf(bf: &mut BfCorners) {
    let (mut info, cx, cy) = cvt_center_mag_bf(bf);
    let ftemp = info.x_mag_factor.abs();
    if ftemp != 1.0 && ftemp >= 1.0 - ASPECT_DRIFT && ftemp <= 1.0 + ASPECT_DRIFT {
        info.x_mag_factor = info.x_mag_factor.signum();
        cvt_corners_bf(bf, &cx, &cy, &info);
    }

    let prec = bf.prec;
    let [x_min, x_max, x_3rd, y_min, y_max, y_3rd] = bf.corner_handles();
    let mut g = bf.stack.guard();
    let ftemp = g.alloc_bf(&prec);
    let ftemp2 = g.alloc_bf(&prec);
    let t = g.alloc_bf(&prec);

    g.sub_bf(ftemp, x_3rd, x_min, &prec);
    g.abs_a_bf(ftemp, &prec);
    g.sub_bf(ftemp2, x_max, x_3rd, &prec);
    g.abs_a_bf(ftemp2, &prec);
    if g.cmp_bf(ftemp, ftemp2, &prec) < 0 {
        g.mult_bf_int(t, ftemp, 10000, &prec);
        if g.cmp_bf(t, ftemp2, &prec) < 0 && g.cmp_bf(y_3rd, y_max, &prec) != 0 {
            g.copy_bf(x_3rd, x_min, &prec);
        }
    }
    g.mult_bf_int(t, ftemp2, 10000, &prec);
    if g.cmp_bf(t, ftemp, &prec) < 0 && g.cmp_bf(y_3rd, y_min, &prec) != 0 {
        g.copy_bf(x_3rd, x_max, &prec);
    }

    g.sub_bf(ftemp, y_3rd, y_min, &prec);
    g.abs_a_bf(ftemp, &prec);
    g.sub_bf(ftemp2, y_max, y_3rd, &prec);
    g.abs_a_bf(ftemp2, &prec);
    if g.cmp_bf(ftemp, ftemp2, &prec) < 0 {
        g.mult_bf_int(t, ftemp, 10000, &prec);
        if g.cmp_bf(t, ftemp2, &prec) < 0 && g.cmp_bf(x_3rd, x_max, &prec) != 0 {
            g.copy_bf(y_3rd, y_min, &prec);
        }
    }
    g.mult_bf_int(t, ftemp2, 10000, &prec);
    if g.cmp_bf(t, ftemp, &prec) < 0 && g.cmp_bf(x_3rd, x_min, &prec) != 0 {
        g.copy_bf(y_3rd, y_max, &prec);
    }
}

/// Pull the double corners back inside the representable limit: nudge a
/// degenerate (infinitely thin) rectangle open, optionally expand about the
/// center, downsize an oversized rectangle, then translate the whole thing
/// in range. A translation of a resumable full-size image forces a recalc.
pub fn adjust_to_limits(ctx: &mut CalculationContext, expand: f64, zoom_width: f64) {
    let limit = CORNER_LIMIT;

    let center_x = (ctx.x_min + ctx.x_max) / 2.0;
    let center_y = (ctx.y_min + ctx.y_max) / 2.0;

    if ctx.x_min == center_x {
        // infinitely thin, fix it
        ctx.x_max = smallest_add(ctx.x_max);
        ctx.x_min -= ctx.x_max - center_x;
    }
    if ctx.y_min == center_y {
        ctx.y_max = smallest_add(ctx.y_max);
        ctx.y_min -= ctx.y_max - center_y;
    }
    if ctx.x_3rd == center_x {
        ctx.x_3rd = smallest_add(ctx.x_3rd);
    }
    if ctx.y_3rd == center_y {
        ctx.y_3rd = smallest_add(ctx.y_3rd);
    }

    let mut corner_x = [
        ctx.x_min,
        ctx.x_max,
        ctx.x_3rd,
        ctx.x_min + (ctx.x_max - ctx.x_3rd),
    ];
    let mut corner_y = [
        ctx.y_max,
        ctx.y_min,
        ctx.y_3rd,
        ctx.y_min + (ctx.y_max - ctx.y_3rd),
    ];

    if expand != 1.0 {
        for i in 0..4 {
            corner_x[i] = center_x + (corner_x[i] - center_x) * expand;
            corner_y[i] = center_y + (corner_y[i] - center_y) * expand;
        }
    }

    let mut low_x = corner_x[0];
    let mut high_x = corner_x[0];
    let mut low_y = corner_y[0];
    let mut high_y = corner_y[0];
    for i in 1..4 {
        low_x = low_x.min(corner_x[i]);
        high_x = high_x.max(corner_x[i]);
        low_y = low_y.min(corner_y[i]);
        high_y = high_y.max(corner_y[i]);
    }

    // too large: downsize maintaining the center
    let mut ftemp = high_x - low_x;
    if high_y - low_y > ftemp {
        ftemp = high_y - low_y;
    }
    let ftemp = limit * 2.0 / ftemp;
    if ftemp < 1.0 {
        for i in 0..4 {
            corner_x[i] = center_x + (corner_x[i] - center_x) * ftemp;
            corner_y[i] = center_y + (corner_y[i] - center_y) * ftemp;
        }
    }

    // any corner past the limit: move the whole image
    let mut adj_x = 0.0;
    let mut adj_y = 0.0;
    for i in 0..4 {
        if corner_x[i] > limit && corner_x[i] - limit > adj_x {
            adj_x = corner_x[i] - limit;
        }
        if corner_x[i] < -limit && corner_x[i] + limit < adj_x {
            adj_x = corner_x[i] + limit;
        }
        if corner_y[i] > limit && corner_y[i] - limit > adj_y {
            adj_y = corner_y[i] - limit;
        }
        if corner_y[i] < -limit && corner_y[i] + limit < adj_y {
            adj_y = corner_y[i] + limit;
        }
    }
    if ctx.calc_status == CalcStatus::Resumable
        && (adj_x != 0.0 || adj_y != 0.0)
        && zoom_width == 1.0
    {
        ctx.calc_status = CalcStatus::ParamsChanged;
    }
    ctx.x_min = corner_x[0] - adj_x;
    ctx.x_max = corner_x[1] - adj_x;
    ctx.x_3rd = corner_x[2] - adj_x;
    ctx.y_max = corner_y[0] - adj_y;
    ctx.y_min = corner_y[1] - adj_y;
    ctx.y_3rd = corner_y[2] - adj_y;

    adjust_corner(ctx); // make 3rd corner exact if very near other corners
}

/// Arbitrary precision flavor of [`adjust_to_limits`].
pub fn adjust_to_limits_bf(ctx: &mut CalculationContext, expand: f64, zoom_width: f64) {
    let bf = match ctx.bf.as_mut() {
        Some(bf) => bf,
        None => return,
    };
    let prec = bf.prec;
    let [x_min, x_max, x_3rd, y_min, y_max, y_3rd] = bf.corner_handles();
    let mut adjusted = false;
    {
        let mut g = bf.stack.guard();
        let limit = g.alloc_bf(&prec);
        let neg_limit = g.alloc_bf(&prec);
        let expand_bf = g.alloc_bf(&prec);
        let center_x = g.alloc_bf(&prec);
        let center_y = g.alloc_bf(&prec);
        let ftemp = g.alloc_bf(&prec);
        let adj_x = g.alloc_bf(&prec);
        let adj_y = g.alloc_bf(&prec);
        let t1 = g.alloc_bf(&prec);
        let t2 = g.alloc_bf(&prec);
        let corner_x: [BigFloatId; 4] = [
            g.alloc_bf(&prec),
            g.alloc_bf(&prec),
            g.alloc_bf(&prec),
            g.alloc_bf(&prec),
        ];
        let corner_y: [BigFloatId; 4] = [
            g.alloc_bf(&prec),
            g.alloc_bf(&prec),
            g.alloc_bf(&prec),
            g.alloc_bf(&prec),
        ];

        g.floattobf(limit, CORNER_LIMIT, &prec);
        g.neg_bf(neg_limit, limit, &prec);
        g.floattobf(expand_bf, expand, &prec);

        g.add_bf(center_x, x_min, x_max, &prec);
        g.half_a_bf(center_x, &prec);
        g.add_bf(center_y, y_min, y_max, &prec);
        g.half_a_bf(center_y, &prec);

        // degenerate rectangle: pry it open by the smallest representable step
        let smallest = 5.0e-16;
        if g.cmp_bf(x_min, center_x, &prec) == 0 {
            g.floattobf(t1, smallest, &prec);
            g.mult_bf(t2, t1, x_max, &prec);
            g.add_a_bf(x_max, t2, &prec);
            g.sub_bf(t1, x_max, center_x, &prec);
            g.sub_a_bf(x_min, t1, &prec);
        }
        if g.cmp_bf(y_min, center_y, &prec) == 0 {
            g.floattobf(t1, smallest, &prec);
            g.mult_bf(t2, t1, y_max, &prec);
            g.add_a_bf(y_max, t2, &prec);
            g.sub_bf(t1, y_max, center_y, &prec);
            g.sub_a_bf(y_min, t1, &prec);
        }
        if g.cmp_bf(x_3rd, center_x, &prec) == 0 {
            g.floattobf(t1, smallest, &prec);
            g.mult_bf(t2, t1, x_3rd, &prec);
            g.add_a_bf(x_3rd, t2, &prec);
        }
        if g.cmp_bf(y_3rd, center_y, &prec) == 0 {
            g.floattobf(t1, smallest, &prec);
            g.mult_bf(t2, t1, y_3rd, &prec);
            g.add_a_bf(y_3rd, t2, &prec);
        }

        g.copy_bf(corner_x[0], x_min, &prec);
        g.copy_bf(corner_x[1], x_max, &prec);
        g.copy_bf(corner_x[2], x_3rd, &prec);
        g.sub_bf(corner_x[3], x_max, x_3rd, &prec);
        g.add_a_bf(corner_x[3], x_min, &prec);

        g.copy_bf(corner_y[0], y_max, &prec);
        g.copy_bf(corner_y[1], y_min, &prec);
        g.copy_bf(corner_y[2], y_3rd, &prec);
        g.sub_bf(corner_y[3], y_max, y_3rd, &prec);
        g.add_a_bf(corner_y[3], y_min, &prec);

        if expand != 1.0 {
            for i in 0..4 {
                g.sub_bf(t1, corner_x[i], center_x, &prec);
                g.mult_bf(corner_x[i], t1, expand_bf, &prec);
                g.add_a_bf(corner_x[i], center_x, &prec);
                g.sub_bf(t1, corner_y[i], center_y, &prec);
                g.mult_bf(corner_y[i], t1, expand_bf, &prec);
                g.add_a_bf(corner_y[i], center_y, &prec);
            }
        }

        let low_x = g.alloc_bf(&prec);
        let high_x = g.alloc_bf(&prec);
        let low_y = g.alloc_bf(&prec);
        let high_y = g.alloc_bf(&prec);
        g.copy_bf(low_x, corner_x[0], &prec);
        g.copy_bf(high_x, corner_x[0], &prec);
        g.copy_bf(low_y, corner_y[0], &prec);
        g.copy_bf(high_y, corner_y[0], &prec);
        for i in 1..4 {
            if g.cmp_bf(corner_x[i], low_x, &prec) < 0 {
                g.copy_bf(low_x, corner_x[i], &prec);
            }
            if g.cmp_bf(corner_x[i], high_x, &prec) > 0 {
                g.copy_bf(high_x, corner_x[i], &prec);
            }
            if g.cmp_bf(corner_y[i], low_y, &prec) < 0 {
                g.copy_bf(low_y, corner_y[i], &prec);
            }
            if g.cmp_bf(corner_y[i], high_y, &prec) > 0 {
                g.copy_bf(high_y, corner_y[i], &prec);
            }
        }

        g.sub_bf(ftemp, high_x, low_x, &prec);
        g.sub_bf(t1, high_y, low_y, &prec);
        if g.cmp_bf(t1, ftemp, &prec) > 0 {
            g.copy_bf(ftemp, t1, &prec);
        }
        g.floattobf(t1, CORNER_LIMIT * 2.0, &prec);
        g.copy_bf(t2, ftemp, &prec);
        g.div_bf(ftemp, t1, t2, &prec);
        g.floattobf(t1, 1.0, &prec);
        if g.cmp_bf(ftemp, t1, &prec) < 0 {
            for i in 0..4 {
                g.sub_bf(t1, corner_x[i], center_x, &prec);
                g.mult_bf(corner_x[i], t1, ftemp, &prec);
                g.add_a_bf(corner_x[i], center_x, &prec);
                g.sub_bf(t1, corner_y[i], center_y, &prec);
                g.mult_bf(corner_y[i], t1, ftemp, &prec);
                g.add_a_bf(corner_y[i], center_y, &prec);
            }
        }

        g.clear_bf(adj_x, &prec);
        g.clear_bf(adj_y, &prec);
        for i in 0..4 {
            if g.cmp_bf(corner_x[i], limit, &prec) > 0 {
                g.sub_bf(ftemp, corner_x[i], limit, &prec);
                if g.cmp_bf(ftemp, adj_x, &prec) > 0 {
                    g.copy_bf(adj_x, ftemp, &prec);
                }
            }
            if g.cmp_bf(corner_x[i], neg_limit, &prec) < 0 {
                g.add_bf(ftemp, corner_x[i], limit, &prec);
                if g.cmp_bf(ftemp, adj_x, &prec) < 0 {
                    g.copy_bf(adj_x, ftemp, &prec);
                }
            }
            if g.cmp_bf(corner_y[i], limit, &prec) > 0 {
                g.sub_bf(ftemp, corner_y[i], limit, &prec);
                if g.cmp_bf(ftemp, adj_y, &prec) > 0 {
                    g.copy_bf(adj_y, ftemp, &prec);
                }
            }
            if g.cmp_bf(corner_y[i], neg_limit, &prec) < 0 {
                g.add_bf(ftemp, corner_y[i], limit, &prec);
                if g.cmp_bf(ftemp, adj_y, &prec) < 0 {
                    g.copy_bf(adj_y, ftemp, &prec);
                }
            }
        }

        if g.is_bf_not_zero(adj_x, &prec) || g.is_bf_not_zero(adj_y, &prec) {
            adjusted = true;
        }

        g.sub_bf(x_min, corner_x[0], adj_x, &prec);
        g.sub_bf(x_max, corner_x[1], adj_x, &prec);
        g.sub_bf(x_3rd, corner_x[2], adj_x, &prec);
        g.sub_bf(y_max, corner_y[0], adj_y, &prec);
        g.sub_bf(y_min, corner_y[1], adj_y, &prec);
        g.sub_bf(y_3rd, corner_y[2], adj_y, &prec);
    }
    adjust_corner_bf(bf);

    if ctx.calc_status == CalcStatus::Resumable && adjusted && zoom_width == 1.0 {
        warn!("corners moved back in range, pending image dropped");
        ctx.calc_status = CalcStatus::ParamsChanged;
    }
}

/// Fractal families that forbid rotation get an axis-aligned rectangle:
/// min/max are swapped into order on each axis and the 3rd corner is pinned
/// to `(x_min, y_min)`, discarding any rotation or skew.
pub fn force_axis_aligned(ctx: &mut CalculationContext) {
    if ctx.x_min > ctx.x_max {
        std::mem::swap(&mut ctx.x_min, &mut ctx.x_max);
    }
    if ctx.y_min > ctx.y_max {
        std::mem::swap(&mut ctx.y_min, &mut ctx.y_max);
    }
    ctx.x_3rd = ctx.x_min;
    ctx.y_3rd = ctx.y_min;
    if let Some(bf) = ctx.bf.as_mut() {
        force_axis_aligned_bf(bf);
    }
}

/// Arbitrary precision flavor of [`force_axis_aligned`].
pub fn force_axis_aligned_bf(bf: &mut BfCorners) {
    let prec = bf.prec;
    let [x_min, x_max, x_3rd, y_min, y_max, y_3rd] = bf.corner_handles();
    let mut g = bf.stack.guard();
    let t = g.alloc_bf(&prec);
    if g.cmp_bf(x_min, x_max, &prec) > 0 {
        g.copy_bf(t, x_min, &prec);
        g.copy_bf(x_min, x_max, &prec);
        g.copy_bf(x_max, t, &prec);
    }
    if g.cmp_bf(y_min, y_max, &prec) > 0 {
        g.copy_bf(t, y_min, &prec);
        g.copy_bf(y_min, y_max, &prec);
        g.copy_bf(y_max, t, &prec);
    }
    g.copy_bf(x_3rd, x_min, &prec);
    g.copy_bf(y_3rd, y_min, &prec);
}

/// True when `actual/desired` leaves `[1-tol, 1+tol]`. A non-positive
/// tolerance never accepts, a tolerance of one or more always does.
pub fn ratio_bad(actual: f64, desired: f64, tol: f64) -> bool {
    if tol <= 0.0 {
        return true;
    }
    if tol >= 1.0 {
        return false;
    }
    if desired != 0.0 {
        let ftemp = actual / desired;
        if ftemp < 1.0 - tol || ftemp > 1.0 + tol {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_view() -> CalculationContext {
        let mut ctx = CalculationContext::new(640, 480);
        ctx.x_min = -2.5;
        ctx.x_3rd = -2.5;
        ctx.x_max = 1.5;
        ctx.y_min = -1.5;
        ctx.y_3rd = -1.5;
        ctx.y_max = 1.5;
        ctx
    }

    #[test]
    fn standard_view_needs_four_digits() {
        let ctx = standard_view();
        assert_eq!(precision_dbl(&ctx), Some(4));
    }

    #[test]
    fn collapsed_view_reports_none() {
        let mut ctx = standard_view();
        ctx.x_max = ctx.x_min;
        ctx.x_3rd = ctx.x_min;
        ctx.y_max = ctx.y_min;
        ctx.y_3rd = ctx.y_min;
        assert_eq!(precision_dbl(&ctx), None);
    }

    #[test]
    fn collapsed_view_switches_up() {
        let mut ctx = standard_view();
        ctx.x_max = ctx.x_min;
        ctx.x_3rd = ctx.x_min;
        ctx.y_max = ctx.y_min;
        ctx.y_3rd = ctx.y_min;
        select_math_mode(&mut ctx, false);
        assert_eq!(ctx.math_mode, MathMode::BigFloat);
    }

    #[test]
    fn center_mag_round_trips_plain_rectangle() {
        let mut ctx = standard_view();
        let cm = cvt_center_mag(&ctx);
        assert!((cm.x_ctr + 0.5).abs() < 1e-12);
        assert!((cm.y_ctr - 0.0).abs() < 1e-12);
        assert!((cm.magnification.to_float() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(cm.rotation, 0.0);
        assert_eq!(cm.skew, 0.0);
        cvt_corners(&mut ctx, &cm);
        assert!((ctx.x_min + 2.5).abs() < 1e-10);
        assert!((ctx.x_max - 1.5).abs() < 1e-10);
        assert!((ctx.y_max - 1.5).abs() < 1e-10);
    }

    #[test]
    fn center_mag_round_trips_rotated_rectangle() {
        let mut ctx = standard_view();
        let cm = CenterMag {
            x_ctr: -0.5,
            y_ctr: 0.25,
            magnification: FloatExtended::new(4.0, 0),
            x_mag_factor: 1.0,
            rotation: 30.0,
            skew: 10.0,
        };
        cvt_corners(&mut ctx, &cm);
        let back = cvt_center_mag(&ctx);
        assert!((back.x_ctr - cm.x_ctr).abs() < 1e-9);
        assert!((back.y_ctr - cm.y_ctr).abs() < 1e-9);
        assert!((back.magnification.to_float() - 4.0).abs() < 1e-9);
        assert!((back.rotation - 30.0).abs() < 1e-6);
        assert!((back.skew - 10.0).abs() < 1e-6);
    }

    #[test]
    fn bf_center_mag_round_trips() {
        let mut ctx = standard_view();
        ctx.init_bf(30);
        let bf = ctx.bf.as_mut().unwrap();
        let (info, cx, cy) = cvt_center_mag_bf(bf);
        assert!((info.magnification.to_float() - 2.0 / 3.0).abs() < 1e-9);
        cvt_corners_bf(bf, &cx, &cy, &info);
        let prec = bf.prec;
        assert!((bf.stack.bftofloat(bf.x_min, &prec) + 2.5).abs() < 1e-9);
        assert!((bf.stack.bftofloat(bf.y_max, &prec) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn mode_switches_down_at_shallow_zoom() {
        let mut ctx = standard_view();
        ctx.init_bf(40);
        select_math_mode(&mut ctx, false);
        assert_eq!(ctx.math_mode, MathMode::Double);
        assert!(ctx.bf.is_none());
    }

    #[test]
    fn mode_switches_up_at_deep_zoom() {
        let mut ctx = standard_view();
        let span = 1e-20;
        ctx.x_min = -0.5 - span;
        ctx.x_3rd = ctx.x_min;
        ctx.x_max = -0.5 + span;
        ctx.y_min = -span;
        ctx.y_3rd = ctx.y_min;
        ctx.y_max = span;
        select_math_mode(&mut ctx, false);
        assert_eq!(ctx.math_mode, MathMode::BigFloat);
        assert_eq!(ctx.calc_status, CalcStatus::ParamsChanged);
        assert!(ctx.bf.is_some());
    }

    #[test]
    fn force_flag_pins_bigfloat_on() {
        let mut ctx = standard_view();
        select_math_mode(&mut ctx, true);
        assert_eq!(ctx.math_mode, MathMode::BigFloat);
        select_math_mode(&mut ctx, true);
        assert_eq!(ctx.math_mode, MathMode::BigFloat);
    }

    #[test]
    fn degenerate_rectangle_gets_pried_open() {
        let mut ctx = standard_view();
        ctx.x_min = 1.0;
        ctx.x_max = 1.0;
        ctx.x_3rd = 1.0;
        adjust_to_limits(&mut ctx, 1.0, 1.0);
        assert!(ctx.x_max > ctx.x_min);
    }

    #[test]
    fn oversized_rectangle_shrinks_to_limit() {
        let mut ctx = standard_view();
        ctx.x_min = -1e6;
        ctx.x_3rd = -1e6;
        ctx.x_max = 1e6;
        adjust_to_limits(&mut ctx, 1.0, 1.0);
        assert!(ctx.x_max <= 32768.0);
        assert!(ctx.x_min >= -32768.0);
    }

    #[test]
    fn third_corner_snaps_when_nearly_square() {
        let mut ctx = standard_view();
        ctx.x_3rd = ctx.x_min + 1e-9;
        adjust_corner(&mut ctx);
        assert_eq!(ctx.x_3rd, ctx.x_min);
    }

    #[test]
    fn axis_lock_swaps_and_pins_corners() {
        let mut ctx = standard_view();
        // rotated view: corners out of order, 3rd corner off-axis
        ctx.x_min = 1.5;
        ctx.x_max = -2.5;
        ctx.x_3rd = 0.25;
        ctx.y_3rd = 0.75;
        ctx.init_bf(30);
        force_axis_aligned(&mut ctx);
        assert_eq!(ctx.x_min, -2.5);
        assert_eq!(ctx.x_max, 1.5);
        assert_eq!(ctx.x_3rd, ctx.x_min);
        assert_eq!(ctx.y_3rd, ctx.y_min);
        let bf = ctx.bf.as_mut().unwrap();
        let prec = bf.prec;
        assert!((bf.stack.bftofloat(bf.x_min, &prec) + 2.5).abs() < 1e-12);
        assert!((bf.stack.bftofloat(bf.x_3rd, &prec) + 2.5).abs() < 1e-12);
        assert!((bf.stack.bftofloat(bf.y_3rd, &prec) + 1.5).abs() < 1e-12);
    }

    #[test]
    fn ratio_bad_bounds() {
        assert!(!ratio_bad(1.0, 1.0, 0.05));
        assert!(ratio_bad(1.1, 1.0, 0.05));
        assert!(ratio_bad(0.9, 1.0, 0.05));
        assert!(ratio_bad(1.0, 1.0, 0.0)); // never accepts
        assert!(!ratio_bad(5.0, 1.0, 1.0)); // always accepts
    }

    #[test]
    fn power10_of_extended_values() {
        assert_eq!(power10(FloatExtended::new(2.0 / 3.0, 0)), -1);
        assert_eq!(power10(FloatExtended::new(150.0, 0)), 2);
        let deep = FloatExtended::new(1.0, 1000); // ~1e301
        assert_eq!(power10(deep), 301);
    }
}
