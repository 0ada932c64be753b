use std::time::Instant;

use colorgrad::{Color, CustomGradient, Gradient};
use config::Config;
use log::warn;

use crate::engine::precision::{
    adjust_to_limits, adjust_to_limits_bf, cvt_corners, cvt_corners_bf, power10, select_math_mode,
    CenterMag, MagInfo, DEFAULT_ASPECT,
};
use crate::engine::solid_guess::SolidGuess;
use crate::engine::{
    CalcStatus, CalculationContext, MandelbrotBigFloat, MandelbrotDouble, MathMode,
};
use crate::util::{string_to_extended, MemoryBuffer};

pub struct DeepZoomRenderer {
    image_width: usize,
    image_height: usize,
    center_real: String,
    center_imag: String,
    magnification: String,
    rotation: f64,
    force_bigfloat: bool,
    iteration_division: f64,
    palette: Gradient,
    output_file: String,
    ctx: CalculationContext,
}

impl DeepZoomRenderer {
    pub fn new(settings: Config) -> Self {
        let image_width = settings.get_int("image_width").unwrap_or(640) as usize;
        let image_height = settings.get_int("image_height").unwrap_or(480) as usize;
        let maximum_iteration = settings.get_int("iterations").unwrap_or(1000) as i32;
        let center_real = settings
            .get_str("real")
            .unwrap_or_else(|_| String::from("-0.75"));
        let center_imag = settings
            .get_str("imag")
            .unwrap_or_else(|_| String::from("0.0"));
        let magnification = settings
            .get_str("zoom")
            .unwrap_or_else(|_| String::from("1E0"));
        let rotation = settings.get_float("rotate").unwrap_or(0.0);
        let force_bigfloat = settings.get_bool("force_bigfloat").unwrap_or(false);
        let iteration_division = settings.get_float("iteration_division").unwrap_or(1.0);
        let output_file = settings
            .get_str("output")
            .unwrap_or_else(|_| String::from("output.png"));

        let palette = if let Ok(values) = settings.get_array("palette") {
            let colors = values
                .chunks_exact(3)
                .map(|value| {
                    Color::from_rgb_u8(
                        value[0].clone().into_int().unwrap_or(0) as u8,
                        value[1].clone().into_int().unwrap_or(0) as u8,
                        value[2].clone().into_int().unwrap_or(0) as u8,
                    )
                })
                .collect::<Vec<Color>>();
            CustomGradient::new().colors(&colors).build().unwrap()
        } else {
            colorgrad::turbo()
        };

        let mut ctx = CalculationContext::new(image_width as i32, image_height as i32);
        ctx.max_iter = maximum_iteration;

        DeepZoomRenderer {
            image_width,
            image_height,
            center_real,
            center_imag,
            magnification,
            rotation,
            force_bigfloat,
            iteration_division,
            palette,
            output_file,
            ctx,
        }
    }

    /// Turn the center and magnification into corner coordinates, choosing
    /// the math mode the depth requires.
    fn locate(&mut self) {
        let magnification = string_to_extended(&self.magnification);
        let decimals = (power10(magnification) + 10).max(0) as usize;

        if decimals > 16 || self.force_bigfloat {
            self.ctx.init_bf(decimals.max(17));
            if let Some(bf) = self.ctx.bf.as_mut() {
                let info = MagInfo {
                    magnification,
                    x_mag_factor: 1.0,
                    rotation: self.rotation,
                    skew: 0.0,
                };
                cvt_corners_bf(bf, &self.center_real, &self.center_imag, &info);
            }
            adjust_to_limits_bf(&mut self.ctx, 1.0, 1.0);
        } else {
            let cm = CenterMag {
                x_ctr: self.center_real.parse::<f64>().unwrap_or(-0.75),
                y_ctr: self.center_imag.parse::<f64>().unwrap_or(0.0),
                magnification,
                x_mag_factor: 1.0,
                rotation: self.rotation,
                skew: 0.0,
            };
            cvt_corners(&mut self.ctx, &cm);
            adjust_to_limits(&mut self.ctx, 1.0, 1.0);
        }
        self.ctx.calc_deltas();
        self.ctx.save_screen_corners();

        select_math_mode(&mut self.ctx, self.force_bigfloat);
        if (self.ctx.screen_aspect - DEFAULT_ASPECT).abs() > 1e-12 {
            warn!(
                "screen aspect {} differs from the default",
                self.ctx.screen_aspect
            );
        }
    }

    pub fn render(&mut self) {
        let time = Instant::now();
        self.locate();
        let decimals = self
            .ctx
            .bf
            .as_ref()
            .map(|bf| bf.prec.decimals)
            .unwrap_or(0);
        println!(
            "{:<14}{:>6} ms ({}, {} decimals)",
            "Setup",
            time.elapsed().as_millis(),
            match self.ctx.math_mode {
                MathMode::Double => "double",
                MathMode::BigFloat => "bigfloat",
            },
            decimals
        );

        let time = Instant::now();
        let mut buffer = MemoryBuffer::new(self.image_width, self.image_height);
        let mut poll = || false;
        match self.ctx.math_mode {
            MathMode::Double => {
                let mut kernel = MandelbrotDouble;
                SolidGuess::new().calculate(&mut self.ctx, &mut kernel, &mut buffer, &mut poll);
            }
            MathMode::BigFloat => {
                let mut kernel = MandelbrotBigFloat;
                SolidGuess::new().calculate(&mut self.ctx, &mut kernel, &mut buffer, &mut poll);
            }
        }
        assert_eq!(self.ctx.calc_status, CalcStatus::Completed);
        println!("{:<14}{:>6} ms", "Iteration", time.elapsed().as_millis());

        let time = Instant::now();
        let pixels = self.colour(&buffer);
        println!("{:<14}{:>6} ms", "Coloring", time.elapsed().as_millis());

        let time = Instant::now();
        image::save_buffer(
            &self.output_file,
            &pixels,
            self.image_width as u32,
            self.image_height as u32,
            image::ColorType::Rgb8,
        )
        .unwrap();
        println!("{:<14}{:>6} ms", "Saving", time.elapsed().as_millis());
    }

    fn colour(&self, buffer: &MemoryBuffer) -> Vec<u8> {
        let mut pixels = Vec::with_capacity(self.image_width * self.image_height * 3);
        for &iteration in buffer.pixels() {
            if iteration >= self.ctx.max_iter {
                pixels.extend_from_slice(&[0, 0, 0]);
            } else {
                let t = (iteration as f64 / self.iteration_division / 256.0).fract();
                let (r, g, b, _) = self.palette.at(t).rgba_u8();
                pixels.extend_from_slice(&[r, g, b]);
            }
        }
        pixels
    }
}
