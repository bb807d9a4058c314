use std::path::{Path, PathBuf};

use crate::args::{CheckpointSelection, EvalArgs};
use crate::config::Config;
use crate::error::{EvalError, Result};

/// File extensions recognized as model checkpoints.
pub const CHECKPOINT_EXTENSIONS: &[&str] = &["pth", "safetensors"];

/// The checkpoints of a run and where their logs go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPlan {
    pub checkpoints: Vec<PathBuf>,
    pub logs_path: PathBuf,
    /// Distinguishes the result files of this run, empty for a single checkpoint.
    pub logs_prefix: String,
}

impl CheckpointPlan {
    pub fn is_single_model(&self) -> bool {
        self.checkpoints.len() == 1
    }
}

/// Expand `--checkpoint` or `--exp-path` into the ordered list of checkpoints to evaluate.
pub fn get_checkpoints_list_and_logs_path(args: &EvalArgs, config: &Config) -> Result<CheckpointPlan> {
    match &args.checkpoint {
        CheckpointSelection::Experiment(exp_path) => {
            let (rel_exp_path, checkpoint_prefix) = match exp_path.split_once(':') {
                Some((path, prefix)) => (path, prefix),
                None => (exp_path.as_str(), ""),
            };

            let exp_path = find_experiment(&config.exps_path, rel_exp_path)?;
            let mut checkpoints = list_checkpoints(&exp_path.join("checkpoints"), checkpoint_prefix)?;
            checkpoints.sort_by(|a, b| b.cmp(a));
            if checkpoints.is_empty() {
                return Err(EvalError::Checkpoint(format!(
                    "Couldn't find any checkpoints in {}",
                    exp_path.display()
                )));
            }

            let logs_prefix = if checkpoint_prefix.is_empty() {
                "all_checkpoints".to_string()
            } else if checkpoints.len() == 1 {
                file_stem(&checkpoints[0])
            } else {
                format!("all_{checkpoint_prefix}")
            };

            let relative = exp_path
                .strip_prefix(&config.exps_path)
                .unwrap_or(&exp_path)
                .to_path_buf();
            Ok(CheckpointPlan {
                checkpoints,
                logs_path: args.logs_path.join(relative),
                logs_prefix,
            })
        }
        CheckpointSelection::Single(checkpoint) => {
            let checkpoint = find_checkpoint(config.interactive_models_path()?, checkpoint)?;
            let logs_path = args.logs_path.join("others").join(file_stem(&checkpoint));
            Ok(CheckpointPlan {
                checkpoints: vec![checkpoint],
                logs_path,
                logs_prefix: String::new(),
            })
        }
    }
}

/// Find a checkpoint by name. `folder:name` restricts the search to the model folder whose
/// name starts with `folder`. A name with a checkpoint extension is taken as a path,
/// otherwise the folder is searched recursively for the single `name*.{pth,safetensors}`.
pub fn find_checkpoint(weights_folder: &Path, checkpoint_name: &str) -> Result<PathBuf> {
    let (model_folder, checkpoint_name) = match checkpoint_name.split_once(':') {
        Some((model_name, checkpoint_name)) => {
            let candidates: Vec<_> = read_dir_sorted(weights_folder)?
                .into_iter()
                .filter(|path| path.is_dir() && file_name(path).starts_with(model_name))
                .collect();
            match candidates.as_slice() {
                [folder] => (folder.clone(), checkpoint_name),
                _ => {
                    return Err(EvalError::Checkpoint(format!(
                        "Expected exactly one model folder matching {model_name} in {}, found {}",
                        weights_folder.display(),
                        candidates.len()
                    )))
                }
            }
        }
        None => (weights_folder.to_path_buf(), checkpoint_name),
    };

    if has_checkpoint_extension(Path::new(checkpoint_name)) {
        let path = PathBuf::from(checkpoint_name);
        if path.exists() {
            return Ok(path);
        }
        return Ok(weights_folder.join(checkpoint_name));
    }

    let mut matches = Vec::new();
    collect_checkpoints(&model_folder, checkpoint_name, &mut matches)?;
    match <[PathBuf; 1]>::try_from(matches) {
        Ok([checkpoint]) => Ok(checkpoint),
        Err(matches) if matches.is_empty() => Err(EvalError::Checkpoint(format!(
            "Couldn't find a checkpoint named {checkpoint_name} in {}",
            model_folder.display()
        ))),
        Err(matches) => Err(EvalError::Checkpoint(format!(
            "{} checkpoints named {checkpoint_name}* in {}, expected exactly one",
            matches.len(),
            model_folder.display()
        ))),
    }
}

fn find_experiment(exps_path: &Path, rel_exp_path: &str) -> Result<PathBuf> {
    let exp_path_prefix = exps_path.join(rel_exp_path);
    let (parent, name) = match (exp_path_prefix.parent(), exp_path_prefix.file_name()) {
        (Some(parent), Some(name)) => (parent.to_path_buf(), name.to_string_lossy().into_owned()),
        _ => return Err(EvalError::Checkpoint("Invalid experiment path.".to_string())),
    };
    if !parent.is_dir() {
        return Err(EvalError::Checkpoint(format!(
            "Invalid experiment path. {} is not a directory",
            parent.display()
        )));
    }
    let candidates: Vec<_> = read_dir_sorted(&parent)?
        .into_iter()
        .filter(|path| path.is_dir() && file_name(path).starts_with(&name))
        .collect();
    match <[PathBuf; 1]>::try_from(candidates) {
        Ok([exp_path]) => Ok(exp_path),
        Err(candidates) => Err(EvalError::Checkpoint(format!(
            "Invalid experiment path. {} experiments match {}",
            candidates.len(),
            exp_path_prefix.display()
        ))),
    }
}

fn list_checkpoints(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    Ok(read_dir_sorted(dir)?
        .into_iter()
        .filter(|path| path.is_file() && has_checkpoint_extension(path))
        .filter(|path| file_name(path).starts_with(prefix))
        .collect())
}

fn collect_checkpoints(dir: &Path, prefix: &str, matches: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for path in read_dir_sorted(dir)? {
        if path.is_dir() {
            collect_checkpoints(&path, prefix, matches)?;
        } else if has_checkpoint_extension(&path) && file_name(&path).starts_with(prefix) {
            matches.push(path);
        }
    }
    Ok(())
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();
    Ok(entries)
}

pub fn has_checkpoint_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| CHECKPOINT_EXTENSIONS.contains(&extension))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
