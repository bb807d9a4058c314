#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::Parser;
use image::{GrayImage, Luma, Rgb, RgbImage};
use isegm_eval::clicker::Click;
use isegm_eval::dataset::FloatMap;
use isegm_eval::model::ModelLoader;
use isegm_eval::predictor::ClickModel;
use isegm_eval::{Cli, Config, EvalArgs, Result};

/// A scratch workspace with a config file, an experiment, a weights folder and a small
/// Berkeley-style dataset.
pub struct Fixture {
    pub dir: tempfile::TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let config = format!(
            "INTERACTIVE_MODELS_PATH: \"{}\"\nEXPS_PATH: \"{}\"\nBERKELEY_PATH: \"{}\"\nMINI_PATH: \"{}\"\n",
            root.join("weights").display(),
            root.join("exps").display(),
            root.join("berkeley").display(),
            root.join("berkeley").display(),
        );
        std::fs::write(root.join("config.yml"), config).unwrap();

        touch(&root.join("weights/sam_vit_b.safetensors"));
        touch(&root.join("exps/sam_run_2024/checkpoints/last_checkpoint.safetensors"));
        touch(&root.join("exps/sam_run_2024/checkpoints/010.safetensors"));

        std::fs::create_dir_all(root.join("berkeley/images")).unwrap();
        std::fs::create_dir_all(root.join("berkeley/masks")).unwrap();
        for (name, offset) in [("first", 2), ("second", 5)] {
            let inside = |x: u32, y: u32| (offset..offset + 8).contains(&x) && (3..11).contains(&y);
            // The object is painted red so the fake model can find it.
            RgbImage::from_fn(16, 14, |x, y| {
                if inside(x, y) {
                    Rgb([255, 0, 0])
                } else {
                    Rgb([0, 0, 0])
                }
            })
            .save(root.join(format!("berkeley/images/{name}.png")))
            .unwrap();
            GrayImage::from_fn(16, 14, |x, y| Luma([if inside(x, y) { 255 } else { 0 }]))
                .save(root.join(format!("berkeley/masks/{name}.png")))
                .unwrap();
        }

        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.root().join("config.yml")
    }

    pub fn config(&self) -> Config {
        Config::load(self.config_path()).unwrap()
    }

    pub fn args(&self, extra: &[&str]) -> EvalArgs {
        let config_path = self.config_path();
        let mut argv = vec![
            "evaluate-sam",
            "NoBRS",
            "--cpu",
            "--datasets",
            "Berkeley",
            "--config-path",
            config_path.to_str().unwrap(),
        ];
        argv.extend_from_slice(extra);
        let cli = Cli::try_parse_from(argv).unwrap();
        EvalArgs::resolve(cli, &self.config()).unwrap()
    }

    pub fn logs_root(&self) -> PathBuf {
        self.root().join("exps/evaluation_logs")
    }
}

pub fn touch(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, b"").unwrap();
}

/// Predicts the red pixels of the image as the object and logs the clicks it is given.
#[derive(Default)]
pub struct RedModel {
    pub seen: Rc<RefCell<Vec<Vec<Click>>>>,
}

impl ClickModel for RedModel {
    type Embedding = RgbImage;

    fn embed(&self, image: &RgbImage) -> Result<Self::Embedding> {
        Ok(image.clone())
    }

    fn predict(&self, image: &Self::Embedding, clicks: &[Click]) -> Result<FloatMap> {
        self.seen.borrow_mut().push(clicks.to_vec());
        Ok(FloatMap::from_fn(image.width(), image.height(), |x, y| {
            Luma([if image.get_pixel(x, y).0[0] > 128 { 1.0 } else { 0.0 }])
        }))
    }
}

/// Hands out [`RedModel`]s and remembers the checkpoints it was asked for.
#[derive(Default)]
pub struct RecordingLoader {
    pub loaded: Vec<PathBuf>,
    pub count: Rc<Cell<usize>>,
    pub seen: Rc<RefCell<Vec<Vec<Click>>>>,
}

impl ModelLoader for RecordingLoader {
    type Model = RedModel;

    fn load(&mut self, checkpoint: &Path) -> Result<Self::Model> {
        self.loaded.push(checkpoint.to_path_buf());
        self.count.set(self.count.get() + 1);
        Ok(RedModel {
            seen: self.seen.clone(),
        })
    }
}
