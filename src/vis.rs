use std::path::{Path, PathBuf};

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut};

use crate::clicker::Click;
use crate::dataset::FloatMap;
use crate::error::{EvalError, Result};
use crate::evaluation::VisCallback;

const MASK_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const POSITIVE_CLICK: Rgb<u8> = Rgb([0, 255, 0]);
const NEGATIVE_CLICK: Rgb<u8> = Rgb([255, 0, 0]);
const MASK_ALPHA: f32 = 0.6;
const CLICK_RADIUS: i32 = 5;

/// Render probabilities with the "hot" colormap (black, red, yellow, white).
pub fn draw_probmap(probs: &FloatMap) -> RgbImage {
    let (width, height) = probs.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let value = probs.get_pixel(x, y).0[0].clamp(0.0, 1.0);
        let channel = |offset: f32| ((value * 3.0 - offset).clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgb([channel(0.0), channel(1.0), channel(2.0)])
    })
}

/// Blend the mask into the image and draw the clicks on top.
pub fn draw_with_blend_and_clicks(image: &RgbImage, mask: &GrayImage, clicks: &[Click]) -> RgbImage {
    let mut output = image.clone();
    for (x, y, pixel) in output.enumerate_pixels_mut() {
        if mask.get_pixel(x, y).0[0] != 0 {
            for (channel, color) in pixel.0.iter_mut().zip(MASK_COLOR.0) {
                *channel = (*channel as f32 * (1.0 - MASK_ALPHA) + color as f32 * MASK_ALPHA).round() as u8;
            }
        }
    }
    for click in clicks {
        let color = if click.is_positive {
            POSITIVE_CLICK
        } else {
            NEGATIVE_CLICK
        };
        let center = (click.x as i32, click.y as i32);
        draw_filled_circle_mut(&mut output, center, CLICK_RADIUS, color);
        draw_hollow_circle_mut(&mut output, center, CLICK_RADIUS, Rgb([255, 255, 255]));
    }
    output
}

/// Side by side: the blended prediction with clicks, and the probability map.
pub fn render_prediction(
    image: &RgbImage,
    probs: &FloatMap,
    prob_thresh: f32,
    clicks: &[Click],
) -> RgbImage {
    let mask = crate::evaluation::threshold_probs(probs, prob_thresh);
    let blended = draw_with_blend_and_clicks(image, &mask, clicks);
    let probmap = draw_probmap(probs);
    let (width, height) = image.dimensions();
    let mut canvas = RgbImage::new(width * 2, height);
    image::imageops::replace(&mut canvas, &blended, 0, 0);
    image::imageops::replace(&mut canvas, &probmap, width as i64, 0);
    canvas
}

/// A callback that saves `<sample>_<click>.jpg` for every prediction under
/// `<logs>/predictions_vis/<dataset>`.
pub fn get_prediction_vis_callback(
    logs_path: &Path,
    dataset_name: &str,
    prob_thresh: f32,
) -> Result<Box<VisCallback<'static>>> {
    let save_path: PathBuf = logs_path.join("predictions_vis").join(dataset_name);
    std::fs::create_dir_all(&save_path)?;

    Ok(Box::new(
        move |image: &RgbImage,
              _gt_mask: &GrayImage,
              probs: &FloatMap,
              sample_id: usize,
              click_index: usize,
              clicks: &[Click]| {
            let sample_path = save_path.join(format!("{sample_id}_{click_index}.jpg"));
            render_prediction(image, probs, prob_thresh, clicks)
                .save(&sample_path)
                .map_err(|err| EvalError::ImageWrite(sample_path, err))
        },
    ))
}
