use log::warn;

use crate::engine::context::{CalcStatus, CalculationContext};
use crate::engine::kernel::{FractalKernel, PixelOutcome};
use crate::engine::resume::{ResumeBuffer, RESUME_VERSION};
use crate::engine::worklist::{WorkItem, WorkList};
use crate::util::FrameBuffer;

/// Prefix bitmap bounds: one bit per block, sixteen block rows per word.
pub const MAX_Y_BLOCK: usize = 7;
pub const MAX_X_BLOCK: usize = 202;

/// Starting block side for the guessing passes: 4 below 300 rows, doubled
/// per size class, and doubled further until the prefix bitmap covers the
/// image. 640x480 gives 8.
pub fn block_size(x_dots: i32, y_dots: i32) -> i32 {
    let mut block_size = 4;
    let mut i = 300;
    while i <= y_dots {
        block_size += block_size;
        i += i;
    }
    while block_size * (MAX_X_BLOCK as i32 - 2) < x_dots
        || block_size * (MAX_Y_BLOCK as i32 - 2) * 16 < y_dots
    {
        block_size += block_size;
    }
    block_size
}

struct Interrupted;

/// Adaptive block-interpolation scan: pass 0 evaluates a sparse corner grid
/// and provisionally floods each block, later passes halve the block size
/// and revisit only blocks whose corners disagreed, guessing the new samples
/// where every known neighbor agrees and evaluating them otherwise.
pub struct SolidGuess {
    /// Plot guessed dots individually instead of through the row buffers;
    /// needed when the plot callback is not idempotent.
    pub guess_plot: bool,
    /// Allow guessing along the bottom edge. Off by default.
    pub bottom_guess: bool,
    /// Allow guessing along the right edge. Off by default.
    pub right_guess: bool,
}

impl Default for SolidGuess {
    fn default() -> SolidGuess {
        SolidGuess {
            guess_plot: false,
            bottom_guess: false,
            right_guess: false,
        }
    }
}

impl SolidGuess {
    pub fn new() -> SolidGuess {
        SolidGuess::default()
    }

    /// Run the work list to completion or interruption. On interruption the
    /// pending rectangles are posted to a fresh resume blob and the status
    /// becomes `Resumable`; running again later continues pixel-identically.
    pub fn calculate(
        &self,
        ctx: &mut CalculationContext,
        kernel: &mut dyn FractalKernel,
        fb: &mut dyn FrameBuffer,
        poll: &mut dyn FnMut() -> bool,
    ) {
        kernel.setup(ctx);

        if ctx.calc_status == CalcStatus::Resumable {
            if let Some(resume) = ctx.resume.as_mut() {
                resume.start();
                match WorkList::read_resume(resume) {
                    Ok(list) => ctx.work_list = list,
                    Err(_) => warn!("resume blob unreadable, restarting image"),
                }
            }
        }
        if ctx.work_list.is_empty() {
            let whole = WorkItem::fresh(0, ctx.x_dots - 1, 0, ctx.y_dots - 1);
            if ctx.work_list.add(whole).is_err() {
                return;
            }
        }
        ctx.calc_status = CalcStatus::InProgress;

        while let Some(item) = ctx.work_list.take_first() {
            let mut scan = Scan::new(self, ctx, item);
            if scan.run(ctx, kernel, fb, poll).is_err() {
                // interrupted; scan already queued its position
                let mut resume = ResumeBuffer::new(
                    4 + 8 * 4 * (crate::engine::MAX_CALC_WORK + 1),
                    RESUME_VERSION,
                );
                ctx.work_list.write_resume(&mut resume);
                ctx.resume = Some(resume);
                ctx.calc_status = CalcStatus::Resumable;
                return;
            }
        }
        ctx.calc_status = CalcStatus::Completed;
        ctx.resume = None;
    }
}

/// One work rectangle's scan state.
struct Scan {
    guess_plot: bool,
    bottom_guess: bool,
    right_guess: bool,

    xx_start: i32,
    xx_stop: i32,
    xx_begin: i32,
    yy_start: i32,
    yy_stop: i32,
    yy_begin: i32,
    work_pass: i32,
    work_sym: i32,

    x_stop: i32,
    y_stop: i32,
    y_dots: i32,
    ix_start: i32,
    iy_start: i32,

    max_block: i32,
    half_block: i32,

    t_prefix: [[[u16; MAX_X_BLOCK]; MAX_Y_BLOCK]; 2],
    row_top: Vec<i32>,
    row_bottom: Vec<i32>,
}

impl Scan {
    fn new(cfg: &SolidGuess, ctx: &CalculationContext, item: WorkItem) -> Scan {
        let max_block = block_size(ctx.x_dots, ctx.y_dots);
        // mirrored plotting halves the rows actually scanned
        let y_stop = if item.sym & 1 != 0 {
            (item.y_start + item.y_stop) / 2
        } else {
            item.y_stop
        };
        Scan {
            guess_plot: cfg.guess_plot,
            bottom_guess: cfg.bottom_guess,
            right_guess: cfg.right_guess,
            xx_start: item.x_start,
            xx_stop: item.x_stop,
            xx_begin: item.x_begin,
            yy_start: item.y_start,
            yy_stop: item.y_stop,
            yy_begin: item.y_begin,
            work_pass: item.pass,
            work_sym: item.sym,
            x_stop: item.x_stop,
            y_stop,
            y_dots: ctx.y_dots,
            ix_start: item.x_start & !(max_block - 1),
            iy_start: item.y_begin & !(max_block - 1),
            max_block,
            half_block: max_block >> 1,
            t_prefix: [[[0; MAX_X_BLOCK]; MAX_Y_BLOCK]; 2],
            row_top: vec![0; ctx.x_dots as usize],
            row_bottom: vec![0; ctx.x_dots as usize],
        }
    }

    fn plot(&self, fb: &mut dyn FrameBuffer, x: i32, y: i32, color: i32) {
        fb.put_color(x as usize, y as usize, color);
        if self.work_sym & 1 != 0 {
            let j = self.yy_stop - (y - self.yy_start);
            if j > self.y_stop && j < self.y_dots {
                fb.put_color(x as usize, j as usize, color);
            }
        }
    }

    fn get_color(&self, fb: &dyn FrameBuffer, x: i32, y: i32) -> i32 {
        fb.get_color(x as usize, y as usize)
    }

    /// Evaluate and plot one pixel.
    fn calc_dot(
        &mut self,
        ctx: &mut CalculationContext,
        kernel: &mut dyn FractalKernel,
        fb: &mut dyn FrameBuffer,
        poll: &mut dyn FnMut() -> bool,
        x: i32,
        y: i32,
    ) -> Result<i32, Interrupted> {
        if poll() {
            return Err(Interrupted);
        }
        match kernel.per_pixel(x, y, ctx) {
            PixelOutcome::Color(c) => {
                self.plot(fb, x, y, c);
                Ok(c)
            }
            PixelOutcome::Interrupted => Err(Interrupted),
        }
    }

    fn queue_restart(&self, ctx: &mut CalculationContext, y_begin: i32, pass: i32) {
        let item = WorkItem {
            x_start: self.xx_start,
            x_stop: self.xx_stop,
            x_begin: self.xx_start,
            y_start: self.yy_start,
            y_stop: self.yy_stop,
            y_begin,
            pass,
            sym: self.work_sym,
        };
        if ctx.work_list.add(item).is_err() {
            warn!("work list full, dropping an interrupted rectangle");
        }
    }

    fn run(
        &mut self,
        ctx: &mut CalculationContext,
        kernel: &mut dyn FractalKernel,
        fb: &mut dyn FrameBuffer,
        poll: &mut dyn FnMut() -> bool,
    ) -> Result<(), Interrupted> {
        let max_block = self.max_block;
        let mut blocksize = max_block;

        if self.work_pass == 0 {
            // first pass: calc every blocksize-spaced pixel, quarter and paint
            if self.iy_start <= self.yy_start {
                // first time for this window
                self.t_prefix[1] = [[0; MAX_X_BLOCK]; MAX_Y_BLOCK];
                let row = self.iy_start;
                let mut col = self.ix_start;
                while col <= self.x_stop {
                    if self.calc_dot(ctx, kernel, fb, poll, col, row).is_err() {
                        let item = WorkItem {
                            x_start: self.xx_start,
                            x_stop: self.xx_stop,
                            x_begin: self.xx_begin,
                            y_start: self.yy_start,
                            y_stop: self.yy_stop,
                            y_begin: self.yy_begin,
                            pass: 0,
                            sym: self.work_sym,
                        };
                        if ctx.work_list.add(item).is_err() {
                            warn!("work list full, dropping an interrupted rectangle");
                        }
                        return Err(Interrupted);
                    }
                    col += max_block;
                }
            } else {
                self.t_prefix[1] = [[0xffff; MAX_X_BLOCK]; MAX_Y_BLOCK];
            }

            let mut y = self.iy_start;
            while y <= self.y_stop {
                let mut interrupted = false;
                if y + blocksize <= self.y_stop {
                    // calc the row below
                    let row = y + blocksize;
                    let mut col = self.ix_start;
                    while col <= self.x_stop {
                        if self.calc_dot(ctx, kernel, fb, poll, col, row).is_err() {
                            interrupted = true;
                            break;
                        }
                        col += max_block;
                    }
                }
                if interrupted
                    || self
                        .guess_row(ctx, kernel, fb, poll, true, y, blocksize)
                        .is_err()
                {
                    let y_begin = y.max(self.yy_start);
                    self.queue_restart(ctx, y_begin, 0);
                    return Err(Interrupted);
                }
                y += blocksize;
            }

            if !ctx.work_list.is_empty() {
                // other rectangles pending, one pass at a time
                self.queue_restart(ctx, self.yy_start, 1);
                return Ok(());
            }
            self.work_pass += 1;
            self.iy_start = self.yy_start & !(max_block - 1);

            self.build_skip_flags();
        } else {
            // first pass already done elsewhere
            self.t_prefix[0] = [[0xffff; MAX_X_BLOCK]; MAX_Y_BLOCK];
        }

        // remaining passes: halve blocksize, quarter each block
        let mut i = self.work_pass;
        while i > 1 {
            blocksize >>= 1;
            i -= 1;
        }
        loop {
            blocksize >>= 1;
            if blocksize < 2 {
                break;
            }
            let mut y = self.iy_start;
            while y <= self.y_stop {
                if self
                    .guess_row(ctx, kernel, fb, poll, false, y, blocksize)
                    .is_err()
                {
                    let y_begin = y.max(self.yy_start);
                    self.queue_restart(ctx, y_begin, self.work_pass);
                    return Err(Interrupted);
                }
                y += blocksize;
            }
            self.work_pass += 1;
            if !ctx.work_list.is_empty() && blocksize > 2 {
                // if 2, we just did the last pass
                self.queue_restart(ctx, self.yy_start, self.work_pass);
                return Ok(());
            }
            self.iy_start = self.yy_start & !(max_block - 1);
        }
        Ok(())
    }

    /// Per-block skip flags for the later passes: a block may be skipped
    /// when neither it nor any of its eight neighbors had a corner sample
    /// disagree during pass 0.
    fn build_skip_flags(&mut self) {
        let max_block = self.max_block;
        let x_lim = ((self.x_stop + max_block) / max_block + 1) as usize;
        let y_lim = (((self.y_stop + max_block) / max_block + 15) / 16 + 1) as usize;

        if !self.right_guess {
            // no right edge guessing, zap border
            for y in 0..=y_lim {
                self.t_prefix[1][y][x_lim] = 0xffff;
            }
        }
        if !self.bottom_guess {
            let i = (self.y_stop + max_block) / max_block + 1;
            let y = (i / 16 + 1) as usize;
            let bit = 1u16 << (i & 15);
            for x in 0..=x_lim {
                self.t_prefix[1][y][x] |= bit;
            }
        }
        // each bit of [0] = OR of itself and the surrounding 8 in [1]
        for y in 1..y_lim {
            for x in 1..x_lim {
                let u = self.t_prefix[1][y][x - 1]
                    | self.t_prefix[1][y][x]
                    | self.t_prefix[1][y][x + 1];
                let above = self.t_prefix[1][y - 1][x - 1]
                    | self.t_prefix[1][y - 1][x]
                    | self.t_prefix[1][y - 1][x + 1];
                let below = self.t_prefix[1][y + 1][x - 1]
                    | self.t_prefix[1][y + 1][x]
                    | self.t_prefix[1][y + 1][x + 1];
                self.t_prefix[0][y][x] =
                    u | (u >> 1) | (u << 1) | (above >> 15) | (below << 15);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn guess_row(
        &mut self,
        ctx: &mut CalculationContext,
        kernel: &mut dyn FractalKernel,
        fb: &mut dyn FrameBuffer,
        poll: &mut dyn FnMut() -> bool,
        first_pass: bool,
        y: i32,
        blocksize: i32,
    ) -> Result<(), Interrupted> {
        self.half_block = blocksize >> 1;
        let half_block = self.half_block;
        let max_block = self.max_block;

        let block_row = y / max_block;
        let word_row = ((block_row >> 4) + 1) as usize;
        let pfx_mask = 1u16 << (block_row & 15);
        let y_less_half = y - half_block;
        let y_less_block = y - blocksize;
        let y_plus_half = y + half_block;
        let y_plus_block = y + blocksize;

        let mut prev11 = -1;
        let mut c22 = self.get_color(fb, self.ix_start, y);
        let mut c12 = c22;
        let mut c13 = c22;
        let mut c24 = c22;
        let mut c21 = self.get_color(fb, self.ix_start, if y > 0 { y_less_half } else { 0 });
        let mut c31 = c21;
        let mut c41 = 0;
        let mut c42 = 0;
        let mut c44 = 0;
        if y_plus_block <= self.y_stop {
            c24 = self.get_color(fb, self.ix_start, y_plus_block);
        } else if !self.bottom_guess {
            c24 = -1;
        }
        let mut guessed12 = 0;
        let mut guessed13 = 0;

        let mut x = self.ix_start;
        while x <= self.x_stop {
            let pfx_col = (x / max_block + 1) as usize;
            if x & (max_block - 1) == 0 && !first_pass
                && self.t_prefix[0][word_row][pfx_col] & pfx_mask == 0
            {
                // fast skip
                x += max_block;
                prev11 = c22;
                c31 = c22;
                c21 = c22;
                c24 = c22;
                c12 = c22;
                c13 = c22;
                guessed12 = 0;
                guessed13 = 0;
                continue;
            }

            if first_pass {
                // paint the top left corner
                self.plot_block(fb, 0, x, y, c22);
            }
            let x_plus_half = x + half_block;
            let x_plus_block = x_plus_half + half_block;
            if x_plus_half > self.x_stop {
                if !self.right_guess {
                    c31 = -1;
                }
            } else if y > 0 {
                c31 = self.get_color(fb, x_plus_half, y_less_half);
            }
            if x_plus_block <= self.x_stop {
                if y_plus_block <= self.y_stop {
                    c44 = self.get_color(fb, x_plus_block, y_plus_block);
                }
                c41 = self.get_color(fb, x_plus_block, if y > 0 { y_less_half } else { 0 });
                c42 = self.get_color(fb, x_plus_block, y);
            } else if !self.right_guess {
                c41 = -1;
                c42 = -1;
                c44 = -1;
            }
            if y_plus_block > self.y_stop {
                c44 = if self.bottom_guess { c42 } else { -1 };
            }

            // guess or calc the remaining three quarters of the block
            let mut guessed23 = 1;
            let mut guessed32 = 1;
            let mut guessed33 = 1;
            let mut c23 = c22;
            let mut c32 = c22;
            let mut c33 = c22;
            if y_plus_half > self.y_stop {
                if !self.bottom_guess {
                    c23 = -1;
                    c33 = -1;
                }
                guessed23 = -1;
                guessed33 = -1;
                guessed13 = 0;
            }
            if x_plus_half > self.x_stop {
                if !self.right_guess {
                    c32 = -1;
                    c33 = -1;
                }
                guessed32 = -1;
                guessed33 = -1;
            }
            // go around till none of 23, 32, 33 change anymore
            loop {
                if guessed33 > 0
                    && (c33 != c44 || c33 != c42 || c33 != c24 || c33 != c32 || c33 != c23)
                {
                    c33 = self.calc_dot(ctx, kernel, fb, poll, x_plus_half, y_plus_half)?;
                    guessed33 = 0;
                }
                if guessed32 > 0
                    && (c32 != c33
                        || c32 != c42
                        || c32 != c31
                        || c32 != c21
                        || c32 != c41
                        || c32 != c23)
                {
                    c32 = self.calc_dot(ctx, kernel, fb, poll, x_plus_half, y)?;
                    guessed32 = 0;
                    continue;
                }
                if guessed23 > 0
                    && (c23 != c33 || c23 != c24 || c23 != c13 || c23 != c12 || c23 != c32)
                {
                    c23 = self.calc_dot(ctx, kernel, fb, poll, x, y_plus_half)?;
                    guessed23 = 0;
                    continue;
                }
                break;
            }

            if first_pass && (guessed23 == 0 || guessed32 == 0 || guessed33 == 0) {
                // something in this block was calculated, note it
                self.t_prefix[1][word_row][pfx_col] |= pfx_mask;
            }

            if half_block > 1 {
                if first_pass {
                    // display guessed corners, fill in the block
                    if self.guess_plot {
                        if guessed23 > 0 {
                            self.plot(fb, x, y_plus_half, c23);
                        }
                        if guessed32 > 0 {
                            self.plot(fb, x_plus_half, y, c32);
                        }
                        if guessed33 > 0 {
                            self.plot(fb, x_plus_half, y_plus_half, c33);
                        }
                    }
                    self.plot_block(fb, 1, x, y_plus_half, c23);
                    self.plot_block(fb, 0, x_plus_half, y, c32);
                    self.plot_block(fb, 1, x_plus_half, y_plus_half, c33);
                } else {
                    // repaint changed blocks
                    if c23 != c22 {
                        self.plot_block(fb, -1, x, y_plus_half, c23);
                    }
                    if c32 != c22 {
                        self.plot_block(fb, -1, x_plus_half, y, c32);
                    }
                    if c33 != c22 {
                        self.plot_block(fb, -1, x_plus_half, y_plus_half, c33);
                    }
                }
            }

            // check if calcs in this block mean earlier guesses need fixing
            let fix21 = (c22 != c12 || c22 != c32)
                && c21 == c22
                && c21 == c31
                && c21 == prev11
                && y > 0
                && (x == self.ix_start
                    || c21 == self.get_color(fb, x - half_block, y_less_block))
                && (x_plus_half > self.x_stop
                    || c21 == self.get_color(fb, x_plus_half, y_less_block))
                && c21 == self.get_color(fb, x, y_less_block);
            let fix31 = c22 != c32
                && c31 == c22
                && c31 == c42
                && c31 == c21
                && c31 == c41
                && y > 0
                && x_plus_half <= self.x_stop
                && c31 == self.get_color(fb, x_plus_half, y_less_block)
                && (x_plus_block > self.x_stop
                    || c31 == self.get_color(fb, x_plus_block, y_less_block))
                && c31 == self.get_color(fb, x, y_less_block);
            prev11 = c31;
            if fix21 {
                c21 = self.calc_dot(ctx, kernel, fb, poll, x, y_less_half)?;
                if half_block > 1 && c21 != c22 {
                    self.plot_block(fb, -1, x, y_less_half, c21);
                }
            }
            if fix31 {
                c31 = self.calc_dot(ctx, kernel, fb, poll, x_plus_half, y_less_half)?;
                if half_block > 1 && c31 != c22 {
                    self.plot_block(fb, -1, x_plus_half, y_less_half, c31);
                }
            }
            if c23 != c22 {
                if guessed12 != 0 {
                    c12 = self.calc_dot(ctx, kernel, fb, poll, x - half_block, y)?;
                    if half_block > 1 && c12 != c22 {
                        self.plot_block(fb, -1, x - half_block, y, c12);
                    }
                }
                if guessed13 != 0 {
                    c13 = self.calc_dot(ctx, kernel, fb, poll, x - half_block, y_plus_half)?;
                    if half_block > 1 && c13 != c22 {
                        self.plot_block(fb, -1, x - half_block, y_plus_half, c13);
                    }
                }
            }
            c22 = c42;
            c24 = c44;
            c13 = c33;
            c21 = c41;
            c31 = c41;
            c12 = c32;
            guessed12 = guessed32.max(0);
            guessed13 = guessed33.max(0);
            x += blocksize;
        }

        if !first_pass || self.guess_plot {
            return Ok(());
        }

        // paint rows the fast way
        let span_start = self.xx_start as usize;
        let span_end = self.x_stop as usize + 1;
        for i in 0..half_block {
            let j = y + i;
            if j <= self.y_stop {
                fb.write_span(j as usize, span_start, &self.row_top[span_start..span_end]);
            }
            let j = y + i + half_block;
            if j <= self.y_stop {
                fb.write_span(
                    j as usize,
                    span_start,
                    &self.row_bottom[span_start..span_end],
                );
            }
            if poll() {
                return Err(Interrupted);
            }
        }
        if self.work_sym & 1 != 0 {
            // mirror the painted rows across the symmetry axis
            for i in 0..half_block {
                let j = self.yy_stop - (y + i - self.yy_start);
                if j > self.y_stop && j < self.y_dots {
                    fb.write_span(j as usize, span_start, &self.row_top[span_start..span_end]);
                }
                let j = self.yy_stop - (y + i + half_block - self.yy_start);
                if j > self.y_stop && j < self.y_dots {
                    fb.write_span(
                        j as usize,
                        span_start,
                        &self.row_bottom[span_start..span_end],
                    );
                }
                if poll() {
                    return Err(Interrupted);
                }
            }
        }
        Ok(())
    }

    /// Fill a half-block with one color, into the row buffers during pass 0
    /// (`build_row` 0 = top buffer, 1 = bottom) or straight to the screen
    /// (`build_row` -1, and for dots left of the aligned window start).
    fn plot_block(&mut self, fb: &mut dyn FrameBuffer, build_row: i32, x: i32, y: i32, color: i32) {
        let mut x_lim = x + self.half_block;
        if x_lim > self.x_stop {
            x_lim = self.x_stop + 1;
        }
        if build_row >= 0 && !self.guess_plot {
            let buf = if build_row == 0 {
                &mut self.row_top
            } else {
                &mut self.row_bottom
            };
            for i in x..x_lim {
                buf[i as usize] = color;
            }
            if x >= self.xx_start {
                // the usual case; dots left of an aligned start still paint
                return;
            }
        }
        let mut y_lim = y + self.half_block;
        if y_lim > self.y_stop {
            if y > self.y_stop {
                return;
            }
            y_lim = self.y_stop + 1;
        }
        for i in x + 1..x_lim {
            // skip the first dot of the first row
            self.plot(fb, i, y, color);
        }
        let mut y = y + 1;
        while y < y_lim {
            for i in x..x_lim {
                self.plot(fb, i, y, color);
            }
            y += 1;
        }
    }
}
