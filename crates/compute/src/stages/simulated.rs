//! Lightweight stand-in stages.
//!
//! Trace units scatter random energy over the image, plot units
//! accumulate it, the gather unit sums the plots and the tonemap unit
//! maps the sum to 8-bit luminance. Enough real data flows through every
//! unit to exercise the scheduler end to end.

use lumen_core::ImageConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{StageError, Stages};

const DEFAULT_SAMPLES_PER_TRACE: usize = 4096;

/// One unit of energy landing on a pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Splat {
    pub pixel: usize,
    pub energy: f32,
}

#[derive(Debug)]
pub struct TraceUnit {
    rng: StdRng,
    pub splats: Vec<Splat>,
}

#[derive(Debug)]
pub struct PlotUnit {
    pub buffer: Vec<f32>,
}

#[derive(Debug)]
pub struct GatherUnit {
    pub buffer: Vec<f32>,
    /// Plot passes merged so far.
    pub plots_gathered: u64,
}

#[derive(Debug)]
pub struct TonemapUnit {
    pub width: u32,
    pub height: u32,
    /// Row-major 8-bit luminance.
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SimulatedStages {
    image: ImageConfig,
    samples_per_trace: usize,
}

impl SimulatedStages {
    pub fn new(image: &ImageConfig) -> Self {
        Self {
            image: image.clone(),
            samples_per_trace: DEFAULT_SAMPLES_PER_TRACE,
        }
    }

    pub fn with_samples_per_trace(mut self, samples: usize) -> Self {
        self.samples_per_trace = samples;
        self
    }

    fn buffer(&self) -> Result<Vec<f32>, StageError> {
        match self.image.pixel_count() {
            0 => Err(StageError::new(format!(
                "image {}x{} has no pixels",
                self.image.width, self.image.height
            ))),
            n => Ok(vec![0.0; n]),
        }
    }
}

impl Stages for SimulatedStages {
    type TraceUnit = TraceUnit;
    type PlotUnit = PlotUnit;
    type GatherUnit = GatherUnit;
    type TonemapUnit = TonemapUnit;

    fn trace_unit(&self, seed: u64) -> Result<TraceUnit, StageError> {
        if self.image.pixel_count() == 0 {
            return Err(StageError::new("cannot trace an empty image"));
        }
        Ok(TraceUnit {
            rng: StdRng::seed_from_u64(seed),
            splats: Vec::with_capacity(self.samples_per_trace),
        })
    }

    fn next_seed(&self, unit: &mut TraceUnit) -> u64 {
        unit.rng.gen()
    }

    fn plot_unit(&self) -> Result<PlotUnit, StageError> {
        Ok(PlotUnit {
            buffer: self.buffer()?,
        })
    }

    fn gather_unit(&self) -> Result<GatherUnit, StageError> {
        Ok(GatherUnit {
            buffer: self.buffer()?,
            plots_gathered: 0,
        })
    }

    fn tonemap_unit(&self) -> Result<TonemapUnit, StageError> {
        Ok(TonemapUnit {
            width: self.image.width,
            height: self.image.height,
            pixels: vec![0; self.image.pixel_count()],
        })
    }

    fn trace(&self, unit: &mut TraceUnit) -> Result<(), StageError> {
        let pixels = self.image.pixel_count();
        unit.splats.clear();
        for _ in 0..self.samples_per_trace {
            let pixel = unit.rng.gen_range(0..pixels);
            let energy = unit.rng.gen::<f32>();
            unit.splats.push(Splat { pixel, energy });
        }
        Ok(())
    }

    fn plot(&self, unit: &mut PlotUnit, traces: &[&TraceUnit]) -> Result<(), StageError> {
        for trace in traces {
            for splat in &trace.splats {
                let slot = unit.buffer.get_mut(splat.pixel).ok_or_else(|| {
                    StageError::new(format!("splat outside image: pixel {}", splat.pixel))
                })?;
                *slot += splat.energy;
            }
        }
        Ok(())
    }

    fn gather(&self, unit: &mut GatherUnit, plots: &mut [&mut PlotUnit]) -> Result<(), StageError> {
        for plot in plots.iter_mut() {
            if plot.buffer.len() != unit.buffer.len() {
                return Err(StageError::new(format!(
                    "plot buffer has {} pixels, gather buffer has {}",
                    plot.buffer.len(),
                    unit.buffer.len()
                )));
            }
            for (acc, value) in unit.buffer.iter_mut().zip(plot.buffer.iter_mut()) {
                *acc += *value;
                *value = 0.0;
            }
            unit.plots_gathered += 1;
        }
        Ok(())
    }

    fn tonemap(&self, unit: &mut TonemapUnit, gathered: &GatherUnit) -> Result<(), StageError> {
        let peak = gathered.buffer.iter().copied().fold(0.0f32, f32::max);
        if peak <= 0.0 {
            unit.pixels.fill(0);
            return Ok(());
        }
        for (out, &value) in unit.pixels.iter_mut().zip(&gathered.buffer) {
            // Square root as a cheap gamma curve
            *out = ((value / peak).sqrt() * 255.0).round() as u8;
        }
        Ok(())
    }
}
