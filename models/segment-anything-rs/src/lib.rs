//! # Segment Anything RS
//! A rust wrapper for [Segment Anything](https://segment-anything.com/) that exposes the
//! model as an interactive, click driven predictor.
//!
//! The image encoder runs once per image ([`SegmentAnything::embed_image`]) and every new
//! set of clicks only runs the prompt encoder and the mask decoder
//! ([`SegmentAnything::predict`]).
//!
//! ## Usage
//!
//! ```rust, no_run
//! use segment_anything_rs::*;
//!
//! let model = SegmentAnything::builder().build().unwrap();
//! let image = image::open("landscape.jpg").unwrap();
//! let embedding = model.embed_image(&image).unwrap();
//! let x = image.width() as f64 / 2.;
//! let y = image.height() as f64 / 4.;
//! let prediction = model
//!     .predict(&embedding, &[PromptPoint::positive(x, y)])
//!     .unwrap();
//! prediction.to_mask(0.5).save("out.png").unwrap();
//! ```

#![warn(missing_docs)]

#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

#[cfg(feature = "accelerate")]
extern crate accelerate_src;

use std::path::{Path, PathBuf};

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::segment_anything::sam::{self, Sam};
use image::{DynamicImage, GenericImageView, GrayImage, ImageBuffer, Luma};

/// A builder for [`SegmentAnything`].
#[derive(Default)]
pub struct SegmentAnythingBuilder {
    source: SegmentAnythingSource,

    cpu: bool,

    device: Option<Device>,
}

impl SegmentAnythingBuilder {
    /// Sets the source of the model.
    pub fn source(mut self, source: SegmentAnythingSource) -> Self {
        self.source = source;
        self
    }

    /// Set to true to run the model on CPU.
    pub fn cpu(mut self, cpu: bool) -> Self {
        self.cpu = cpu;
        self
    }

    /// Run the model on a specific device. This takes precedence over [`Self::cpu`].
    pub fn device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    /// Builds the [`SegmentAnything`] model.
    pub fn build(self) -> anyhow::Result<SegmentAnything> {
        SegmentAnything::new(self)
    }
}

/// The image encoder architecture stored in a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamVariant {
    /// The TinyViT encoder from MobileSAM.
    Tiny,
    /// The ViT-B encoder from the original SAM release.
    VitB,
}

impl SamVariant {
    /// Guess the variant from a checkpoint file name. MobileSAM checkpoints carry `tiny` or
    /// `mobile` in their name, everything else is treated as ViT-B.
    pub fn from_checkpoint_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.contains("tiny") || name.contains("mobile") {
            Self::Tiny
        } else {
            Self::VitB
        }
    }

    /// Parse a variant name (`tiny` or `vit_b`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "tiny" | "vit_t" | "mobile" => Some(Self::Tiny),
            "vit_b" | "base" => Some(Self::VitB),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum SourceLocation {
    HuggingFace { model: String, filename: String },
    Local(PathBuf),
}

/// The source of the model.
#[derive(Debug, Clone)]
pub struct SegmentAnythingSource {
    location: SourceLocation,
    variant: SamVariant,
}

impl SegmentAnythingSource {
    /// Creates a new [`SegmentAnythingSource`] for a ViT-B model stored on the Hugging Face hub.
    pub fn new(model: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            location: SourceLocation::HuggingFace {
                model: model.into(),
                filename: filename.into(),
            },
            variant: SamVariant::VitB,
        }
    }

    /// Creates a source from a checkpoint on disk. Both `.safetensors` and `.pth` files are
    /// supported.
    pub fn local(path: impl Into<PathBuf>, variant: SamVariant) -> Self {
        Self {
            location: SourceLocation::Local(path.into()),
            variant,
        }
    }

    /// Create the tiny SAM model source.
    pub fn tiny() -> Self {
        Self::new("lmz/candle-sam", "mobile_sam-tiny-vitt.safetensors").with_variant(SamVariant::Tiny)
    }

    /// Create a normal sized model source.
    pub fn medium() -> Self {
        Self::new("lmz/candle-sam", "sam_vit_b_01ec64.safetensors")
    }

    /// Override the encoder architecture of this source.
    pub fn with_variant(mut self, variant: SamVariant) -> Self {
        self.variant = variant;
        self
    }

    /// The encoder architecture of this source.
    pub fn variant(&self) -> SamVariant {
        self.variant
    }

    fn resolve(&self) -> anyhow::Result<PathBuf> {
        match &self.location {
            SourceLocation::HuggingFace { model, filename } => {
                let api = hf_hub::api::sync::Api::new()?;
                let api = api.model(model.clone());
                Ok(api.get(filename)?)
            }
            SourceLocation::Local(path) => {
                if !path.is_file() {
                    anyhow::bail!("checkpoint {} does not exist", path.display());
                }
                Ok(path.clone())
            }
        }
    }
}

impl Default for SegmentAnythingSource {
    fn default() -> Self {
        Self::tiny()
    }
}

/// A click prompt, in pixel coordinates of the original image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromptPoint {
    /// Column of the click.
    pub x: f64,
    /// Row of the click.
    pub y: f64,
    /// Whether the click marks the object (`true`) or the background (`false`).
    pub positive: bool,
}

impl PromptPoint {
    /// A click on the object.
    pub fn positive(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            positive: true,
        }
    }

    /// A click on the background.
    pub fn negative(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            positive: false,
        }
    }
}

/// The output of the image encoder for one image, reused for every set of clicks on that
/// image.
pub struct ImageEmbedding {
    embeddings: Tensor,
    resized_width: usize,
    resized_height: usize,
    original_width: u32,
    original_height: u32,
}

/// A single mask prediction.
#[derive(Debug, Clone)]
pub struct MaskPrediction {
    /// The foreground probability of every pixel of the original image.
    pub probabilities: ImageBuffer<Luma<f32>, Vec<f32>>,
    /// The IoU the model predicts for this mask.
    pub predicted_iou: f32,
}

impl MaskPrediction {
    /// Threshold the probabilities into a black and white mask.
    pub fn to_mask(&self, threshold: f32) -> GrayImage {
        let (width, height) = self.probabilities.dimensions();
        GrayImage::from_fn(width, height, |x, y| {
            if self.probabilities.get_pixel(x, y).0[0] > threshold {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }
}

/// The [segment anything](https://segment-anything.com/) model.
pub struct SegmentAnything {
    device: Device,
    sam: Sam,
}

impl SegmentAnything {
    /// Creates a new [`SegmentAnythingBuilder`].
    pub fn builder() -> SegmentAnythingBuilder {
        SegmentAnythingBuilder::default()
    }

    fn new(settings: SegmentAnythingBuilder) -> anyhow::Result<Self> {
        let SegmentAnythingBuilder {
            source,
            cpu,
            device: requested_device,
        } = settings;
        let model = source.resolve()?;
        let device = match requested_device {
            Some(device) => device,
            None => device(cpu)?,
        };
        tracing::debug!("loading {:?} weights from {}", source.variant, model.display());
        let vb = load_weights(&model, &device)?;
        let sam = match source.variant {
            SamVariant::Tiny => sam::Sam::new_tiny(vb)?, // tiny vit_t
            SamVariant::VitB => sam::Sam::new(768, 12, 12, &[2, 5, 8, 11], vb)?, // sam_vit_b
        };
        Ok(Self { device, sam })
    }

    /// The device the model runs on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Run the image encoder on an image.
    pub fn embed_image(&self, image: &DynamicImage) -> anyhow::Result<ImageEmbedding> {
        let (original_width, original_height) = image.dimensions();
        if original_width == 0 || original_height == 0 {
            anyhow::bail!("cannot embed an empty image");
        }
        let image_tensor = self.image_to_tensor(image)?;
        let (_c, resized_height, resized_width) = image_tensor.dims3()?;
        let embeddings = self.sam.embeddings(&image_tensor)?;
        Ok(ImageEmbedding {
            embeddings,
            resized_width,
            resized_height,
            original_width,
            original_height,
        })
    }

    /// Predict a mask for an embedded image from a list of clicks.
    pub fn predict(
        &self,
        embedding: &ImageEmbedding,
        points: &[PromptPoint],
    ) -> anyhow::Result<MaskPrediction> {
        if points.is_empty() {
            anyhow::bail!("at least one click is required to predict a mask");
        }
        let ImageEmbedding {
            embeddings,
            resized_width,
            resized_height,
            original_width,
            original_height,
        } = embedding;

        // The prompt encoder expects coordinates relative to the image size.
        let points: Vec<(f64, f64, bool)> = points
            .iter()
            .map(|point| {
                (
                    point.x / *original_width as f64,
                    point.y / *original_height as f64,
                    point.positive,
                )
            })
            .collect();

        let (low_res_mask, iou_predictions) = self.sam.forward_for_embeddings(
            embeddings,
            *resized_height,
            *resized_width,
            &points,
            false,
        )?;

        let mask = low_res_mask
            .upsample_nearest2d(sam::IMAGE_SIZE, sam::IMAGE_SIZE)?
            .get(0)?
            .i((.., ..*resized_height, ..*resized_width))?
            .unsqueeze(0)?
            .upsample_nearest2d(*original_height as usize, *original_width as usize)?;
        let probabilities = candle_nn::ops::sigmoid(&mask)?
            .flatten_all()?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()?;

        let probabilities = match ImageBuffer::from_raw(*original_width, *original_height, probabilities) {
            Some(probabilities) => probabilities,
            None => anyhow::bail!("mask decoder returned an unexpected number of pixels"),
        };
        let predicted_iou = iou_predictions
            .flatten_all()?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()?
            .first()
            .copied()
            .unwrap_or_default();

        Ok(MaskPrediction {
            probabilities,
            predicted_iou,
        })
    }

    fn image_to_tensor(&self, image: &DynamicImage) -> anyhow::Result<Tensor> {
        let image = {
            let resize_longest = sam::IMAGE_SIZE;
            let (height, width) = (image.height(), image.width());
            let resize_longest = resize_longest as u32;
            let (height, width) = if height < width {
                let h = (resize_longest * height) / width;
                (h.max(1), resize_longest)
            } else {
                let w = (resize_longest * width) / height;
                (resize_longest, w.max(1))
            };
            image.resize_exact(width, height, image::imageops::FilterType::CatmullRom)
        };
        let (height, width) = (image.height() as usize, image.width() as usize);
        let img = image.to_rgb8();
        let data = img.into_raw();
        let image = Tensor::from_vec(data, (height, width, 3), &self.device)?.permute((2, 0, 1))?;

        Ok(image)
    }
}

fn load_weights(path: &Path, device: &Device) -> anyhow::Result<VarBuilder<'static>> {
    let is_pth = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("pth"));
    if is_pth {
        Ok(VarBuilder::from_pth(path, DType::F32, device)?)
    } else {
        Ok(unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)? })
    }
}

fn device(cpu: bool) -> anyhow::Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else {
        let device = Device::cuda_if_available(0)?;
        if !device.is_cuda() {
            tracing::warn!("Running on CPU, to run on GPU, build with `--features cuda`");
        }
        Ok(device)
    }
}
