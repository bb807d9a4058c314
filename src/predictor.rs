use image::RgbImage;

use crate::args::{EvalArgs, EvalMode};
use crate::clicker::{Click, Clicker};
use crate::dataset::FloatMap;
use crate::error::{EvalError, Result};

/// A click driven segmentation model.
pub trait ClickModel {
    /// Whatever the model computes once per image.
    type Embedding;

    fn embed(&self, image: &RgbImage) -> Result<Self::Embedding>;

    /// Foreground probabilities for the image behind `embedding`, given the clicks so far.
    fn predict(&self, embedding: &Self::Embedding, clicks: &[Click]) -> Result<FloatMap>;
}

/// Turns the clicks of a [`Clicker`] into a probability map.
pub trait Predictor {
    fn set_input_image(&mut self, image: &RgbImage) -> Result<()>;

    fn get_prediction(&mut self, clicker: &Clicker) -> Result<FloatMap>;
}

/// Options forwarded to the predictor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredictorParams {
    /// Only the first `net_clicks_limit` clicks are shown to the network.
    pub net_clicks_limit: Option<i64>,
}

/// Progressive region-of-interest cropping used by some predictors. Segment Anything sees
/// the whole image on every click, so it never gets these.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomInParams {
    pub skip_clicks: usize,
    pub target_size: u32,
    pub expansion_ratio: f32,
}

/// `--clicks-limit -1` stands for `--n-clicks`, any other limit is passed through.
pub fn get_predictor_and_zoomin_params(
    args: &EvalArgs,
    _dataset_name: &str,
) -> (PredictorParams, Option<ZoomInParams>) {
    let net_clicks_limit = args.clicks_limit.map(|limit| {
        if limit == -1 {
            args.n_clicks as i64
        } else {
            limit
        }
    });

    // SAM does not zoom in
    (PredictorParams { net_clicks_limit }, None)
}

/// Predictor without any backpropagating refinement: every prediction is a single forward
/// pass over the cached image embedding.
pub struct NoBrsPredictor<M: ClickModel> {
    model: M,
    net_clicks_limit: Option<usize>,
    embedding: Option<M::Embedding>,
}

/// Wrap a model into the predictor for `mode`. The predictor returns probabilities,
/// `prob_thresh` is applied by the caller.
pub fn get_predictor<M: ClickModel>(
    model: M,
    mode: EvalMode,
    prob_thresh: f32,
    predictor_params: PredictorParams,
    zoom_in_params: Option<ZoomInParams>,
    with_flip: bool,
) -> Result<NoBrsPredictor<M>> {
    match mode {
        EvalMode::NoBrs => {}
    }
    if zoom_in_params.is_some() {
        return Err(EvalError::Invariant(
            "zoom-in is not supported by the Segment Anything predictor".to_string(),
        ));
    }
    if with_flip {
        return Err(EvalError::Invariant(
            "flip augmentation is not supported by the Segment Anything predictor".to_string(),
        ));
    }
    let net_clicks_limit = match predictor_params.net_clicks_limit {
        Some(limit) if limit < 1 => {
            return Err(EvalError::InvalidArgument(format!(
                "the clicks limit must be positive or -1, got {limit}"
            )))
        }
        Some(limit) => Some(limit as usize),
        None => None,
    };
    tracing::debug!(%mode, prob_thresh, ?net_clicks_limit, "predictor ready");

    Ok(NoBrsPredictor {
        model,
        net_clicks_limit,
        embedding: None,
    })
}

impl<M: ClickModel> Predictor for NoBrsPredictor<M> {
    fn set_input_image(&mut self, image: &RgbImage) -> Result<()> {
        self.embedding = Some(self.model.embed(image)?);
        Ok(())
    }

    fn get_prediction(&mut self, clicker: &Clicker) -> Result<FloatMap> {
        let embedding = self
            .embedding
            .as_ref()
            .ok_or_else(|| EvalError::Invariant("no input image was set".to_string()))?;
        let clicks = clicker.clicks();
        let clicks = match self.net_clicks_limit {
            Some(limit) => &clicks[..clicks.len().min(limit)],
            None => clicks,
        };
        self.model.predict(embedding, clicks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{CheckpointSelection, DeviceSpec, SamplingArgs};
    use image::{GrayImage, Luma};
    use std::cell::Cell;
    use std::path::PathBuf;
    use std::rc::Rc;

    fn args(clicks_limit: Option<i64>) -> EvalArgs {
        EvalArgs {
            mode: EvalMode::NoBrs,
            checkpoint: CheckpointSelection::Single("sam".to_string()),
            datasets: vec!["GrabCut".to_string()],
            device: DeviceSpec::Cpu,
            target_iou: 0.9,
            iou_analysis: false,
            n_clicks: 20,
            min_n_clicks: 1,
            thresh: 0.49,
            clicks_limit,
            eval_mode: "cvpr".to_string(),
            save_ious: false,
            print_ious: false,
            vis_preds: false,
            model_name: None,
            config_path: PathBuf::from("config.yml"),
            logs_path: PathBuf::from("logs"),
            sampling: SamplingArgs {
                minimize: false,
                n_workers: 1,
                n_samples: 0,
                clickability_model_pth: None,
                user_inputs: false,
                seed: 42,
                prob_low: 0.0,
                prob_high: 1.0,
            },
        }
    }

    #[test]
    fn clicks_limit_resolution() {
        let (params, zoom_in) = get_predictor_and_zoomin_params(&args(Some(-1)), "GrabCut");
        assert_eq!(params.net_clicks_limit, Some(20));
        assert!(zoom_in.is_none());

        let (params, zoom_in) = get_predictor_and_zoomin_params(&args(Some(5)), "DAVIS");
        assert_eq!(params.net_clicks_limit, Some(5));
        assert!(zoom_in.is_none());

        let (params, zoom_in) = get_predictor_and_zoomin_params(&args(None), "Berkeley");
        assert_eq!(params, PredictorParams::default());
        assert!(zoom_in.is_none());
    }

    /// Records how many clicks every prediction saw.
    struct CountingModel {
        seen: Rc<Cell<usize>>,
    }

    impl ClickModel for CountingModel {
        type Embedding = (u32, u32);

        fn embed(&self, image: &RgbImage) -> Result<Self::Embedding> {
            Ok(image.dimensions())
        }

        fn predict(&self, (width, height): &Self::Embedding, clicks: &[Click]) -> Result<FloatMap> {
            self.seen.set(clicks.len());
            Ok(FloatMap::from_pixel(*width, *height, Luma([0.0])))
        }
    }

    #[test]
    fn predictor_truncates_clicks() {
        let seen = Rc::new(Cell::new(0));
        let model = CountingModel { seen: seen.clone() };
        let params = PredictorParams {
            net_clicks_limit: Some(2),
        };
        let mut predictor = get_predictor(model, EvalMode::NoBrs, 0.49, params, None, false).unwrap();
        let mut clicker = Clicker::new(GrayImage::from_pixel(4, 4, Luma([1])));
        assert!(predictor.get_prediction(&clicker).is_err());

        predictor.set_input_image(&RgbImage::new(4, 4)).unwrap();
        let empty = GrayImage::new(4, 4);
        for _ in 0..3 {
            clicker.make_next_click(&empty);
        }
        predictor.get_prediction(&clicker).unwrap();
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn zoom_in_and_flip_are_rejected() {
        let zoom_in = ZoomInParams {
            skip_clicks: 1,
            target_size: 400,
            expansion_ratio: 1.4,
        };
        let model = CountingModel { seen: Rc::default() };
        assert!(get_predictor(model, EvalMode::NoBrs, 0.49, PredictorParams::default(), Some(zoom_in), false).is_err());
        let model = CountingModel { seen: Rc::default() };
        assert!(get_predictor(model, EvalMode::NoBrs, 0.49, PredictorParams::default(), None, true).is_err());
        let model = CountingModel { seen: Rc::default() };
        let params = PredictorParams {
            net_clicks_limit: Some(-3),
        };
        assert!(get_predictor(model, EvalMode::NoBrs, 0.49, params, None, false).is_err());
    }
}
