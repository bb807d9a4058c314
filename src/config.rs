use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{EvalError, Result};

/// The settings loaded from the YAML config file.
///
/// Only the experiment root is required. Dataset roots and any other setting live in
/// [`Config::extra`] and are looked up by key.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root directory of the training experiments.
    #[serde(rename = "EXPS_PATH")]
    pub exps_path: PathBuf,
    /// Directory searched for checkpoints passed with `--checkpoint`.
    #[serde(rename = "INTERACTIVE_MODELS_PATH", default)]
    pub interactive_models_path: Option<PathBuf>,
    /// Encoder architecture of the checkpoints (`tiny` or `vit_b`). Guessed from the
    /// checkpoint name when absent.
    #[serde(rename = "SAM_VARIANT", default)]
    pub sam_variant: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Config {
    /// Read and parse a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| EvalError::ConfigLoad(path.to_path_buf(), err))?;
        let config = Self::parse(&text).map_err(|err| EvalError::ConfigParse(path.to_path_buf(), err))?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse the YAML text of a config file.
    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// A path valued setting, if it is present.
    pub fn path(&self, key: &str) -> Option<PathBuf> {
        match self.extra.get(key)? {
            serde_yaml::Value::String(path) => Some(PathBuf::from(path)),
            _ => None,
        }
    }

    pub fn interactive_models_path(&self) -> Result<&Path> {
        self.interactive_models_path
            .as_deref()
            .ok_or_else(|| EvalError::MissingConfigKey("INTERACTIVE_MODELS_PATH".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
INTERACTIVE_MODELS_PATH: "./weights"
EXPS_PATH: "./experiments"

GRABCUT_PATH: "./datasets/GrabCut"
DAVIS_PATH: "./datasets/DAVIS"
NUM_WORKERS: 4
"#;

    #[test]
    fn parses_paths_and_extra_keys() {
        let config = Config::parse(CONFIG).unwrap();
        assert_eq!(config.exps_path, PathBuf::from("./experiments"));
        assert_eq!(
            config.interactive_models_path().unwrap(),
            Path::new("./weights")
        );
        assert_eq!(
            config.path("GRABCUT_PATH"),
            Some(PathBuf::from("./datasets/GrabCut"))
        );
        assert_eq!(config.path("NUM_WORKERS"), None);
        assert_eq!(config.path("BERKELEY_PATH"), None);
        assert_eq!(config.sam_variant, None);
    }

    #[test]
    fn missing_experiment_root_is_an_error() {
        assert!(Config::parse("INTERACTIVE_MODELS_PATH: ./weights\n").is_err());
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = Config::load("definitely/not/here/config.yml").unwrap_err();
        assert!(matches!(err, EvalError::ConfigLoad(..)));
    }
}
