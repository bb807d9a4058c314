use std::path::Path;

use candle_core::Device;
use image::{DynamicImage, RgbImage};
use segment_anything_rs::{
    ImageEmbedding, PromptPoint, SamVariant, SegmentAnything, SegmentAnythingSource,
};

use crate::args::DeviceSpec;
use crate::clicker::Click;
use crate::config::Config;
use crate::dataset::FloatMap;
use crate::error::{EvalError, Result};
use crate::predictor::ClickModel;

impl ClickModel for SegmentAnything {
    type Embedding = ImageEmbedding;

    fn embed(&self, image: &RgbImage) -> Result<Self::Embedding> {
        Ok(self.embed_image(&DynamicImage::ImageRgb8(image.clone()))?)
    }

    fn predict(&self, embedding: &Self::Embedding, clicks: &[Click]) -> Result<FloatMap> {
        // Clicks land on pixel centers.
        let points: Vec<PromptPoint> = clicks
            .iter()
            .map(|click| PromptPoint {
                x: click.x as f64 + 0.5,
                y: click.y as f64 + 0.5,
                positive: click.is_positive,
            })
            .collect();
        let prediction = SegmentAnything::predict(self, embedding, &points)?;
        tracing::trace!(predicted_iou = prediction.predicted_iou, "mask decoded");
        Ok(prediction.probabilities)
    }
}

/// Builds one model per checkpoint.
pub trait ModelLoader {
    type Model: ClickModel;

    fn load(&mut self, checkpoint: &Path) -> Result<Self::Model>;
}

/// Loads Segment Anything checkpoints onto the device chosen on the command line.
pub struct SamLoader {
    device_spec: DeviceSpec,
    device: Option<Device>,
    variant: Option<SamVariant>,
}

impl SamLoader {
    pub fn new(device_spec: DeviceSpec, config: &Config) -> Result<Self> {
        let variant = match config.sam_variant.as_deref() {
            Some(name) => Some(SamVariant::from_name(name).ok_or_else(|| {
                EvalError::InvalidArgument(format!("unknown SAM_VARIANT {name:?}"))
            })?),
            None => None,
        };
        Ok(Self {
            device_spec,
            device: None,
            variant,
        })
    }

    fn device(&mut self) -> Result<Device> {
        if let Some(device) = &self.device {
            return Ok(device.clone());
        }
        let device = self.device_spec.to_device()?;
        tracing::info!("running on {}", self.device_spec);
        self.device = Some(device.clone());
        Ok(device)
    }
}

impl ModelLoader for SamLoader {
    type Model = SegmentAnything;

    fn load(&mut self, checkpoint: &Path) -> Result<Self::Model> {
        let variant = self.variant.unwrap_or_else(|| {
            SamVariant::from_checkpoint_name(&checkpoint.file_name().unwrap_or_default().to_string_lossy())
        });
        tracing::info!("loading {variant:?} checkpoint {}", checkpoint.display());
        let device = self.device()?;
        let model = SegmentAnything::builder()
            .source(SegmentAnythingSource::local(checkpoint, variant))
            .device(device)
            .build()?;
        Ok(model)
    }
}
