//! Benchmark datasets stored as an image folder next to a mask folder.

use std::path::{Path, PathBuf};

use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use serde::Deserialize;

use crate::args::EvalArgs;
use crate::clicker::Click;
use crate::config::Config;
use crate::error::{EvalError, Result};

/// Label of ground truth pixels that count neither as object nor as background.
pub const IGNORE_LABEL: u8 = u8::MAX;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

/// A per pixel map of values in [0, 1].
pub type FloatMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Where the images and masks of a dataset live below its root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetLayout {
    pub images_dir: &'static str,
    pub masks_dir: &'static str,
    /// Masks carry this extension instead of the image's one.
    pub mask_extension: Option<&'static str>,
    /// Mid grey (128) mask pixels are ignored instead of treated as background.
    pub grey_is_ignored: bool,
}

impl DatasetLayout {
    const DEFAULT: DatasetLayout = DatasetLayout {
        images_dir: "images",
        masks_dir: "masks",
        mask_extension: None,
        grey_is_ignored: false,
    };

    /// The layout of a known benchmark, and the config key holding its root.
    pub fn for_dataset(name: &str) -> (String, DatasetLayout) {
        match name {
            "GrabCut" => (
                "GRABCUT_PATH".to_string(),
                DatasetLayout {
                    images_dir: "data_GT",
                    masks_dir: "boundary_GT",
                    mask_extension: Some("bmp"),
                    grey_is_ignored: true,
                },
            ),
            "Berkeley" => ("BERKELEY_PATH".to_string(), Self::DEFAULT),
            "DAVIS" => (
                "DAVIS_PATH".to_string(),
                DatasetLayout {
                    images_dir: "img",
                    masks_dir: "gt",
                    mask_extension: Some("png"),
                    grey_is_ignored: false,
                },
            ),
            "COCO_MVal" => (
                "COCO_MVAL_PATH".to_string(),
                DatasetLayout {
                    images_dir: "img",
                    masks_dir: "gt",
                    mask_extension: Some("png"),
                    grey_is_ignored: false,
                },
            ),
            "TETRIS" => ("TETRIS_PATH".to_string(), Self::DEFAULT),
            other => (format!("{}_PATH", other.to_ascii_uppercase()), Self::DEFAULT),
        }
    }
}

#[derive(Debug, Clone)]
struct SampleEntry {
    image_path: PathBuf,
    mask_path: PathBuf,
    clicks_path: Option<PathBuf>,
    clickability_path: Option<PathBuf>,
}

/// One benchmark image with its ground truth.
#[derive(Debug, Clone)]
pub struct DataSample {
    pub id: usize,
    pub name: String,
    pub image: RgbImage,
    /// 0 for background, 1 for the object and [`IGNORE_LABEL`] for ignored pixels.
    pub gt_mask: GrayImage,
    /// Clicks recorded from real users, only loaded with `--user_inputs`.
    pub user_clicks: Option<Vec<Click>>,
    /// How likely a user is to click each pixel.
    pub clickability: Option<FloatMap>,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    layout: DatasetLayout,
    samples: Vec<SampleEntry>,
}

#[derive(Debug, Deserialize)]
struct RecordedClick {
    x: u32,
    y: u32,
    is_positive: bool,
}

/// Open the dataset called `name` from the root configured for it.
pub fn get_dataset(name: &str, config: &Config, args: &EvalArgs) -> Result<Dataset> {
    let (key, layout) = DatasetLayout::for_dataset(name);
    let root = config
        .path(&key)
        .ok_or_else(|| EvalError::UnknownDataset(name.to_string(), key.clone()))?;
    let clickability_root = args
        .sampling
        .clickability_model_pth
        .as_ref()
        .map(|dir| dir.join(name));
    let mut dataset = Dataset::open(
        name,
        &root,
        layout,
        args.sampling.user_inputs,
        clickability_root.as_deref(),
    )?;
    if args.sampling.n_samples > 0 {
        dataset.truncate(args.sampling.n_samples);
    }
    tracing::info!("dataset {name}: {} samples from {}", dataset.len(), root.display());
    Ok(dataset)
}

impl Dataset {
    /// Index the images of a dataset. Every image needs a mask with the same stem.
    pub fn open(
        name: &str,
        root: &Path,
        layout: DatasetLayout,
        user_inputs: bool,
        clickability_root: Option<&Path>,
    ) -> Result<Self> {
        let images_dir = root.join(layout.images_dir);
        let masks_dir = root.join(layout.masks_dir);
        let clicks_dir = root.join("clicks");
        let dataset_error = |message: String| EvalError::Dataset(name.to_string(), message);

        if !images_dir.is_dir() {
            return Err(dataset_error(format!("{} is not a directory", images_dir.display())));
        }

        let mut images: Vec<PathBuf> = std::fs::read_dir(&images_dir)?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<Result<_, _>>()?;
        images.retain(|path| path.is_file() && has_extension(path, IMAGE_EXTENSIONS));
        images.sort();

        let mut samples = Vec::with_capacity(images.len());
        for image_path in images {
            let stem = stem(&image_path);
            let mask_path = match layout.mask_extension {
                Some(extension) => masks_dir.join(format!("{stem}.{extension}")),
                None => find_with_stem(&masks_dir, &stem)?.unwrap_or_else(|| masks_dir.join(&stem)),
            };
            if !mask_path.is_file() {
                return Err(dataset_error(format!(
                    "no mask for {} (expected {})",
                    image_path.display(),
                    mask_path.display()
                )));
            }
            let clicks_path = user_inputs.then(|| clicks_dir.join(format!("{stem}.json")));
            let clickability_path = clickability_root.map(|dir| dir.join(format!("{stem}.png")));
            samples.push(SampleEntry {
                image_path,
                mask_path,
                clicks_path,
                clickability_path,
            });
        }

        Ok(Self {
            name: name.to_string(),
            layout,
            samples,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Keep only the first `n` samples.
    pub fn truncate(&mut self, n: usize) {
        self.samples.truncate(n);
    }

    /// Load the image, mask and optional click data of a sample.
    pub fn get_sample(&self, index: usize) -> Result<DataSample> {
        let entry = self.samples.get(index).ok_or_else(|| {
            EvalError::Dataset(self.name.clone(), format!("sample {index} is out of range"))
        })?;

        let image = image::open(&entry.image_path)
            .map_err(|err| EvalError::Image(entry.image_path.clone(), err))?
            .to_rgb8();
        let mask = image::open(&entry.mask_path)
            .map_err(|err| EvalError::Image(entry.mask_path.clone(), err))?
            .to_luma8();
        if mask.dimensions() != image.dimensions() {
            return Err(EvalError::Dataset(
                self.name.clone(),
                format!(
                    "mask {} is {:?} but the image is {:?}",
                    entry.mask_path.display(),
                    mask.dimensions(),
                    image.dimensions()
                ),
            ));
        }
        let gt_mask = labels_from_mask(&mask, self.layout.grey_is_ignored);

        let user_clicks = match &entry.clicks_path {
            Some(path) if path.is_file() => Some(read_clicks(path)?),
            Some(path) => {
                tracing::warn!("no recorded clicks at {}, simulating clicks", path.display());
                None
            }
            None => None,
        };

        let clickability = match &entry.clickability_path {
            Some(path) if path.is_file() => Some(read_clickability(path, image.dimensions())?),
            _ => None,
        };

        Ok(DataSample {
            id: index,
            name: stem(&entry.image_path),
            image,
            gt_mask,
            user_clicks,
            clickability,
        })
    }
}

/// Convert a mask image into labels. Masks stored as 0/1 are accepted as well as 0/255.
pub fn labels_from_mask(mask: &GrayImage, grey_is_ignored: bool) -> GrayImage {
    let binary = mask.pixels().all(|pixel| pixel.0[0] <= 1);
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        let value = mask.get_pixel(x, y).0[0];
        let label = if binary {
            value
        } else if grey_is_ignored && value == 128 {
            IGNORE_LABEL
        } else if value > 128 {
            1
        } else {
            0
        };
        Luma([label])
    })
}

fn read_clicks(path: &Path) -> Result<Vec<Click>> {
    let text = std::fs::read_to_string(path)?;
    let recorded: Vec<RecordedClick> =
        serde_json::from_str(&text).map_err(|err| EvalError::Clicks(path.to_path_buf(), err))?;
    Ok(recorded
        .into_iter()
        .enumerate()
        .map(|(index, click)| Click::new(click.is_positive, click.y, click.x, index))
        .collect())
}

fn read_clickability(path: &Path, (width, height): (u32, u32)) -> Result<FloatMap> {
    let map = image::open(path)
        .map_err(|err| EvalError::Image(path.to_path_buf(), err))?
        .to_luma8();
    let map = if map.dimensions() == (width, height) {
        map
    } else {
        image::imageops::resize(&map, width, height, image::imageops::FilterType::Triangle)
    };
    Ok(FloatMap::from_fn(width, height, |x, y| {
        Luma([map.get_pixel(x, y).0[0] as f32 / 255.0])
    }))
}

fn find_with_stem(dir: &Path, stem_name: &str) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<_, _>>()?;
    candidates.retain(|path| stem(path) == stem_name && has_extension(path, IMAGE_EXTENSIONS));
    candidates.sort();
    Ok(candidates.into_iter().next())
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extensions.contains(&extension.to_ascii_lowercase().as_str()))
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
