use std::fmt::Display;
use std::path::PathBuf;

use clap::{ArgGroup, Parser, ValueEnum};

use crate::config::Config;
use crate::error::{EvalError, Result};

/// Target IoU that can never be reached, used to record the full IoU curve.
pub const UNREACHABLE_TARGET_IOU: f64 = 1.01;
/// Smallest target IoU accepted for the NoC metric.
pub const MIN_TARGET_IOU: f64 = 0.8;

/// Evaluate Segment Anything checkpoints with the number-of-clicks metric.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("checkpoints").required(true).args(["checkpoint", "exp_path"])))]
#[command(group(ArgGroup::new("device").args(["gpus", "cpu"])))]
#[command(group(ArgGroup::new("iou_thresh").args(["target_iou", "iou_analysis"])))]
pub struct Cli {
    #[arg(value_enum)]
    pub mode: EvalMode,

    /// The path to the checkpoint. This can be a relative path (relative to
    /// INTERACTIVE_MODELS_PATH) or an absolute path. The file extension can be omitted.
    #[arg(long)]
    pub checkpoint: Option<String>,

    /// The relative path to the experiment with checkpoints (relative to EXPS_PATH).
    #[arg(long)]
    pub exp_path: Option<String>,

    /// List of datasets on which the model should be tested, separated by a comma.
    #[arg(long, default_value = "GrabCut,Berkeley,DAVIS,COCO_MVal,TETRIS")]
    pub datasets: String,

    /// ID of used GPU.
    #[arg(long, default_value = "0")]
    pub gpus: String,

    /// Use only CPU for inference.
    #[arg(long)]
    pub cpu: bool,

    /// Target IoU threshold for the NoC metric. (min possible value = 0.8)
    #[arg(long, default_value_t = 0.90)]
    pub target_iou: f64,

    /// Plot mIoU(number of clicks) with target_iou=1.0.
    #[arg(long)]
    pub iou_analysis: bool,

    /// Maximum number of clicks for the NoC metric.
    #[arg(long, default_value_t = 20)]
    pub n_clicks: usize,

    /// Minimum number of clicks for the evaluation.
    #[arg(long, default_value_t = 1)]
    pub min_n_clicks: usize,

    /// The segmentation mask is obtained from the probability outputs using this threshold.
    #[arg(long, default_value_t = 0.49)]
    pub thresh: f32,

    /// Maximum number of clicks passed to the network, -1 means --n-clicks.
    #[arg(long, allow_negative_numbers = true)]
    pub clicks_limit: Option<i64>,

    /// Possible choices: cvpr, fixed<number> (e.g. fixed400, fixed600).
    #[arg(long, default_value = "cvpr")]
    pub eval_mode: String,

    #[arg(long)]
    pub save_ious: bool,

    #[arg(long)]
    pub print_ious: bool,

    #[arg(long)]
    pub vis_preds: bool,

    /// The model name that is used for making plots.
    #[arg(long)]
    pub model_name: Option<String>,

    /// The path to the config file.
    #[arg(long, default_value = "./config.yml")]
    pub config_path: PathBuf,

    /// The path to the evaluation logs. Default path: EXPS_PATH/evaluation_logs.
    #[arg(long, default_value = "")]
    pub logs_path: String,

    /// Minimization of iou during optimization
    #[arg(long)]
    pub minimize: bool,

    /// Number of parallel workers on inference
    #[arg(long = "n_workers", default_value_t = 1)]
    pub n_workers: usize,

    /// Slice only N samples from dataset (for debug only)
    #[arg(long = "n_samples", default_value_t = 0)]
    pub n_samples: usize,

    /// Path to the clickability maps
    #[arg(long = "clickability_model_pth")]
    pub clickability_model_pth: Option<PathBuf>,

    /// Use user inputs mode (with clickability maps the exact number of user clicks is
    /// sampled, otherwise the recorded user clicks are replayed)
    #[arg(long = "user_inputs")]
    pub user_inputs: bool,

    /// Set seed for sampling, keep default for reproducibility
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Sampling from clickmap with prob >=
    #[arg(long = "trajectory_sampling_prob_low", default_value_t = 0.0)]
    pub trajectory_sampling_prob_low: f32,

    /// Sampling from clickmap with prob <=
    #[arg(long = "trajectory_sampling_prob_high", default_value_t = 1.0)]
    pub trajectory_sampling_prob_high: f32,
}

/// How the predictor refines its output. Segment Anything is only evaluated without
/// backpropagating refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EvalMode {
    #[value(name = "NoBRS")]
    NoBrs,
}

impl Display for EvalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalMode::NoBrs => f.write_str("NoBRS"),
        }
    }
}

/// Where the checkpoints to evaluate come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointSelection {
    /// A single checkpoint, relative to `INTERACTIVE_MODELS_PATH` or absolute.
    Single(String),
    /// Every checkpoint of an experiment, relative to `EXPS_PATH`.
    Experiment(String),
}

/// The compute device chosen on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSpec {
    Cpu,
    Cuda(usize),
}

impl DeviceSpec {
    pub fn to_device(self) -> candle_core::Result<candle_core::Device> {
        match self {
            DeviceSpec::Cpu => Ok(candle_core::Device::Cpu),
            DeviceSpec::Cuda(ordinal) => candle_core::Device::new_cuda(ordinal),
        }
    }
}

impl Display for DeviceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceSpec::Cpu => f.write_str("cpu"),
            DeviceSpec::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
        }
    }
}

/// Settings of the click trajectory sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingArgs {
    pub minimize: bool,
    pub n_workers: usize,
    pub n_samples: usize,
    pub clickability_model_pth: Option<PathBuf>,
    pub user_inputs: bool,
    pub seed: u64,
    pub prob_low: f32,
    pub prob_high: f32,
}

impl SamplingArgs {
    /// Trajectory sampling is enabled once the probability window is narrower than [0, 1].
    pub fn samples_trajectories(&self) -> bool {
        self.prob_low > 0.0 || self.prob_high < 1.0
    }
}

/// The resolved, immutable settings of an evaluation run.
#[derive(Debug, Clone)]
pub struct EvalArgs {
    pub mode: EvalMode,
    pub checkpoint: CheckpointSelection,
    pub datasets: Vec<String>,
    pub device: DeviceSpec,
    /// Effective target IoU, see [`resolve_target_iou`].
    pub target_iou: f64,
    pub iou_analysis: bool,
    pub n_clicks: usize,
    pub min_n_clicks: usize,
    pub thresh: f32,
    /// Raw `--clicks-limit`, `-1` is resolved when the predictor is built.
    pub clicks_limit: Option<i64>,
    pub eval_mode: String,
    pub save_ious: bool,
    pub print_ious: bool,
    pub vis_preds: bool,
    pub model_name: Option<String>,
    pub config_path: PathBuf,
    /// Root of the evaluation logs.
    pub logs_path: PathBuf,
    pub sampling: SamplingArgs,
}

/// Parse the command line and load the config file it points at.
pub fn parse_args() -> Result<(EvalArgs, Config)> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config_path)?;
    let args = EvalArgs::resolve(cli, &config)?;
    Ok((args, config))
}

impl EvalArgs {
    /// Resolve the raw command line against the loaded config.
    pub fn resolve(cli: Cli, config: &Config) -> Result<Self> {
        let checkpoint = match (cli.checkpoint, cli.exp_path) {
            (Some(checkpoint), None) => CheckpointSelection::Single(checkpoint),
            (None, Some(exp_path)) => CheckpointSelection::Experiment(exp_path),
            _ => {
                return Err(EvalError::InvalidArgument(
                    "exactly one of --checkpoint and --exp-path is required".to_string(),
                ))
            }
        };

        let device = resolve_device(cli.cpu, &cli.gpus)?;
        let target_iou = resolve_target_iou(
            cli.target_iou,
            cli.iou_analysis,
            cli.print_ious,
            cli.min_n_clicks,
        );
        let logs_path = resolve_logs_path(&cli.logs_path, config);

        let datasets = cli
            .datasets
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        if cli.trajectory_sampling_prob_low > cli.trajectory_sampling_prob_high {
            return Err(EvalError::InvalidArgument(format!(
                "trajectory sampling window [{}, {}] is empty",
                cli.trajectory_sampling_prob_low, cli.trajectory_sampling_prob_high
            )));
        }

        Ok(Self {
            mode: cli.mode,
            checkpoint,
            datasets,
            device,
            target_iou,
            iou_analysis: cli.iou_analysis,
            n_clicks: cli.n_clicks,
            min_n_clicks: cli.min_n_clicks,
            thresh: cli.thresh,
            clicks_limit: cli.clicks_limit,
            eval_mode: cli.eval_mode,
            save_ious: cli.save_ious,
            print_ious: cli.print_ious,
            vis_preds: cli.vis_preds,
            model_name: cli.model_name,
            config_path: cli.config_path,
            logs_path,
            sampling: SamplingArgs {
                minimize: cli.minimize,
                n_workers: cli.n_workers,
                n_samples: cli.n_samples,
                clickability_model_pth: cli.clickability_model_pth,
                user_inputs: cli.user_inputs,
                seed: cli.seed,
                prob_low: cli.trajectory_sampling_prob_low,
                prob_high: cli.trajectory_sampling_prob_high,
            },
        })
    }
}

/// `--cpu` wins, otherwise the first id of the `--gpus` list selects the CUDA device.
pub fn resolve_device(cpu: bool, gpus: &str) -> Result<DeviceSpec> {
    if cpu {
        return Ok(DeviceSpec::Cpu);
    }
    let first = gpus.split(',').next().unwrap_or_default().trim();
    first
        .parse()
        .map(DeviceSpec::Cuda)
        .map_err(|_| EvalError::InvalidArgument(format!("invalid GPU id {first:?}")))
}

/// With an IoU analysis (or per-click IoUs) that starts from the first click the target is
/// made unreachable so the whole curve is recorded. Otherwise the target is clamped to 0.8.
pub fn resolve_target_iou(
    target_iou: f64,
    iou_analysis: bool,
    print_ious: bool,
    min_n_clicks: usize,
) -> f64 {
    if (iou_analysis || print_ious) && min_n_clicks <= 1 {
        UNREACHABLE_TARGET_IOU
    } else {
        target_iou.max(MIN_TARGET_IOU)
    }
}

/// An empty `--logs-path` means `<EXPS_PATH>/evaluation_logs`.
pub fn resolve_logs_path(logs_path: &str, config: &Config) -> PathBuf {
    if logs_path.is_empty() {
        config.exps_path.join("evaluation_logs")
    } else {
        PathBuf::from(logs_path)
    }
}
