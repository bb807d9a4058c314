//! Simulated user clicks.
//!
//! Every click goes to the interior of the largest error region: the pixel farthest from
//! the region boundary among false negatives (positive click) or false positives
//! (negative click), whichever region reaches further.

use image::{GrayImage, Luma};
use imageproc::distance_transform::euclidean_squared_distance_transform;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::args::SamplingArgs;
use crate::dataset::{DataSample, FloatMap, IGNORE_LABEL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Click {
    pub is_positive: bool,
    pub y: u32,
    pub x: u32,
    /// Position of the click in its trajectory.
    pub index: usize,
}

impl Click {
    pub fn new(is_positive: bool, y: u32, x: u32, index: usize) -> Self {
        Self {
            is_positive,
            y,
            x,
            index,
        }
    }
}

/// Draws clicks at random among the pixels whose click-map value lies in a window.
#[derive(Debug, Clone)]
pub struct TrajectorySampler {
    rng: StdRng,
    low: f32,
    high: f32,
    clickability: Option<FloatMap>,
}

impl TrajectorySampler {
    pub fn new(seed: u64, low: f32, high: f32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            low,
            high,
            clickability: None,
        }
    }

    /// Sample from a clickability map instead of the normalized distance map.
    pub fn with_clickability(mut self, clickability: FloatMap) -> Self {
        self.clickability = Some(clickability);
        self
    }

    fn pick(&mut self, region: &[bool], distances: &[f32], max_distance: f32) -> Option<usize> {
        let candidates: Vec<usize> = region
            .iter()
            .enumerate()
            .filter(|(_, inside)| **inside)
            .map(|(index, _)| index)
            .filter(|&index| {
                let value = match &self.clickability {
                    Some(map) => map.as_raw()[index],
                    None => distances[index] / max_distance,
                };
                value >= self.low && value <= self.high
            })
            .collect();
        candidates.choose(&mut self.rng).copied()
    }
}

/// Produces the click trajectory of one sample.
#[derive(Debug, Clone)]
pub struct Clicker {
    gt_mask: GrayImage,
    clicks: Vec<Click>,
    recorded: Option<Vec<Click>>,
    sampler: Option<TrajectorySampler>,
}

impl Clicker {
    /// A clicker for a ground truth mask labelled 0 (background), 1 (object) or
    /// [`IGNORE_LABEL`].
    pub fn new(gt_mask: GrayImage) -> Self {
        Self {
            gt_mask,
            clicks: Vec::new(),
            recorded: None,
            sampler: None,
        }
    }

    /// Build the clicker for a dataset sample according to the sampling settings.
    ///
    /// Recorded user clicks are replayed unless a clickability map is available, in which
    /// case clicks are sampled from the map (the caller keeps the recorded click count).
    pub fn for_sample(sample: &DataSample, sampling: &SamplingArgs) -> Self {
        let mut clicker = Self::new(sample.gt_mask.clone());
        if sampling.samples_trajectories() || sample.clickability.is_some() {
            let seed = sampling.seed.wrapping_add(sample.id as u64);
            let mut sampler = TrajectorySampler::new(seed, sampling.prob_low, sampling.prob_high);
            if let Some(map) = &sample.clickability {
                sampler = sampler.with_clickability(map.clone());
            }
            clicker = clicker.with_sampler(sampler);
        }
        if let (Some(clicks), None) = (&sample.user_clicks, &sample.clickability) {
            clicker = clicker.with_recorded_clicks(clicks.clone());
        }
        clicker
    }

    /// Replay these clicks before simulating any.
    pub fn with_recorded_clicks(mut self, clicks: Vec<Click>) -> Self {
        self.recorded = Some(clicks);
        self
    }

    pub fn with_sampler(mut self, sampler: TrajectorySampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// The clicks made so far.
    pub fn clicks(&self) -> &[Click] {
        &self.clicks
    }

    /// Add the click that best corrects `pred_mask` (non-zero pixels are predicted object).
    pub fn make_next_click(&mut self, pred_mask: &GrayImage) -> Click {
        let index = self.clicks.len();
        let click = match self.recorded.as_ref().and_then(|clicks| clicks.get(index)) {
            Some(recorded) => Click { index, ..*recorded },
            None => self.simulate_click(pred_mask, index),
        };
        tracing::trace!(?click, "new click");
        self.clicks.push(click);
        click
    }

    fn simulate_click(&mut self, pred_mask: &GrayImage, index: usize) -> Click {
        let (width, height) = self.gt_mask.dimensions();
        let (false_negatives, false_positives): (Vec<bool>, Vec<bool>) = self
            .gt_mask
            .as_raw()
            .iter()
            .zip(pred_mask.as_raw())
            .map(|(&gt, &pred)| match gt {
                IGNORE_LABEL => (false, false),
                0 => (false, pred != 0),
                _ => (pred == 0, false),
            })
            .unzip();

        let fn_distances = distance_transform(&false_negatives, width as usize, height as usize);
        let fp_distances = distance_transform(&false_positives, width as usize, height as usize);
        let fn_max = fn_distances.iter().copied().fold(0.0f32, f32::max);
        let fp_max = fp_distances.iter().copied().fold(0.0f32, f32::max);

        let is_positive = fn_max > fp_max;
        let (region, distances, max_distance) = if is_positive {
            (&false_negatives, &fn_distances, fn_max)
        } else {
            (&false_positives, &fp_distances, fp_max)
        };

        let sampled = match &mut self.sampler {
            Some(sampler) if max_distance > 0.0 => sampler.pick(region, distances, max_distance),
            _ => None,
        };
        let pixel = sampled.unwrap_or_else(|| {
            distances
                .iter()
                .position(|&distance| distance == max_distance)
                .unwrap_or(0)
        });

        let width = width as usize;
        Click::new(is_positive, (pixel / width) as u32, (pixel % width) as u32, index)
    }
}

/// Euclidean distance of every pixel inside `mask` to the nearest pixel outside of it.
/// The image border counts as outside.
pub fn distance_transform(mask: &[bool], width: usize, height: usize) -> Vec<f32> {
    // Outside pixels (and a one pixel frame) are the seeds of the transform.
    let padded = GrayImage::from_fn(width as u32 + 2, height as u32 + 2, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let inside = x >= 1 && y >= 1 && x <= width && y <= height && mask[(y - 1) * width + x - 1];
        Luma([if inside { 0 } else { u8::MAX }])
    });
    let squared = euclidean_squared_distance_transform(&padded);

    let mut output = Vec::with_capacity(width * height);
    for y in 1..=height as u32 {
        for x in 1..=width as u32 {
            output.push(squared.get_pixel(x, y).0[0].sqrt() as f32);
        }
    }
    output
}
