use std::time::{Duration, Instant};

use image::{GrayImage, Luma, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};

use crate::args::SamplingArgs;
use crate::clicker::{Click, Clicker};
use crate::dataset::{Dataset, FloatMap};
use crate::error::Result;
use crate::metrics::get_iou;
use crate::predictor::Predictor;

/// Called after every prediction with the image, the ground truth, the probabilities, the
/// sample index, the click index and the clicks so far.
pub type VisCallback<'a> =
    dyn FnMut(&RgbImage, &GrayImage, &FloatMap, usize, usize, &[Click]) -> Result<()> + 'a;

/// When a trajectory stops.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSettings {
    /// Probabilities above this are object.
    pub pred_thr: f32,
    /// Stop once this IoU is reached (after `min_clicks`).
    pub max_iou_thr: f64,
    pub min_clicks: usize,
    pub max_clicks: usize,
}

/// The IoU curve of every sample and the wall time of the whole dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetResults {
    pub all_ious: Vec<Vec<f64>>,
    pub elapsed: Duration,
}

/// The result of one click trajectory.
#[derive(Debug, Clone)]
pub struct SampleResult {
    pub clicks: Vec<Click>,
    pub ious: Vec<f64>,
}

/// Threshold probabilities into a 0/1 mask (strictly greater than `threshold`).
pub fn threshold_probs(probs: &FloatMap, threshold: f32) -> GrayImage {
    let (width, height) = probs.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        Luma([(probs.get_pixel(x, y).0[0] > threshold) as u8])
    })
}

/// Click until the target IoU is reached or the click budget runs out.
pub fn evaluate_sample(
    image: &RgbImage,
    gt_mask: &GrayImage,
    clicker: &mut Clicker,
    predictor: &mut dyn Predictor,
    settings: &SampleSettings,
    sample_id: usize,
    mut callback: Option<&mut VisCallback<'_>>,
) -> Result<SampleResult> {
    let (width, height) = gt_mask.dimensions();
    let mut pred_mask = GrayImage::new(width, height);
    let mut ious = Vec::with_capacity(settings.max_clicks);

    predictor.set_input_image(image)?;
    for click_index in 0..settings.max_clicks {
        clicker.make_next_click(&pred_mask);
        let probs = predictor.get_prediction(clicker)?;
        pred_mask = threshold_probs(&probs, settings.pred_thr);

        if let Some(callback) = callback.as_mut() {
            callback(image, gt_mask, &probs, sample_id, click_index, clicker.clicks())?;
        }

        let iou = get_iou(gt_mask, &pred_mask);
        tracing::trace!(sample_id, click_index, iou, "prediction scored");
        ious.push(iou);

        if iou >= settings.max_iou_thr && click_index + 1 >= settings.min_clicks {
            break;
        }
    }

    Ok(SampleResult {
        clicks: clicker.clicks().to_vec(),
        ious,
    })
}

/// Run every sample of a dataset through the predictor.
pub fn evaluate_dataset(
    dataset: &Dataset,
    predictor: &mut dyn Predictor,
    settings: &SampleSettings,
    sampling: &SamplingArgs,
    mut callback: Option<&mut VisCallback<'_>>,
) -> Result<DatasetResults> {
    let progress = ProgressBar::new(dataset.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})") {
        progress.set_style(style);
    }
    progress.set_message(dataset.name().to_string());

    let mut all_ious = Vec::with_capacity(dataset.len());
    let start = Instant::now();
    for index in 0..dataset.len() {
        let sample = dataset.get_sample(index)?;
        let mut clicker = Clicker::for_sample(&sample, sampling);
        let mut sample_settings = settings.clone();
        if let Some(user_clicks) = &sample.user_clicks {
            // Never ask for more clicks than the user made.
            sample_settings.max_clicks = sample_settings.max_clicks.min(user_clicks.len());
        }
        let result = evaluate_sample(
            &sample.image,
            &sample.gt_mask,
            &mut clicker,
            predictor,
            &sample_settings,
            index,
            callback.as_deref_mut(),
        )?;
        tracing::debug!(
            sample = %sample.name,
            clicks = result.ious.len(),
            final_iou = result.ious.last().copied().unwrap_or_default(),
            "sample evaluated"
        );
        all_ious.push(result.ious);
        progress.inc(1);
    }
    let elapsed = start.elapsed();
    progress.finish_and_clear();

    Ok(DatasetResults { all_ious, elapsed })
}
