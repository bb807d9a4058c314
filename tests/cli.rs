mod common;

use clap::Parser;
use isegm_eval::args::{CheckpointSelection, DeviceSpec};
use isegm_eval::{Cli, Config, EvalArgs, EvalMode};

fn parse(argv: &[&str]) -> Result<Cli, clap::Error> {
    Cli::try_parse_from(std::iter::once("evaluate-sam").chain(argv.iter().copied()))
}

fn config() -> Config {
    Config::parse("EXPS_PATH: /data/exps\nINTERACTIVE_MODELS_PATH: /data/weights\n").unwrap()
}

#[test]
fn defaults() {
    let cli = parse(&["NoBRS", "--checkpoint", "sam_vit_b"]).unwrap();
    assert_eq!(cli.mode, EvalMode::NoBrs);
    assert_eq!(cli.datasets, "GrabCut,Berkeley,DAVIS,COCO_MVal,TETRIS");
    assert_eq!(cli.n_clicks, 20);
    assert_eq!(cli.thresh, 0.49);
    assert_eq!(cli.eval_mode, "cvpr");
    assert_eq!(cli.n_workers, 1);
    assert_eq!(cli.seed, 42);

    let args = EvalArgs::resolve(cli, &config()).unwrap();
    assert_eq!(args.checkpoint, CheckpointSelection::Single("sam_vit_b".to_string()));
    assert_eq!(args.datasets.len(), 5);
    assert_eq!(args.device, DeviceSpec::Cuda(0));
    assert_eq!(args.target_iou, 0.9);
    assert_eq!(args.logs_path, std::path::PathBuf::from("/data/exps/evaluation_logs"));
    assert!(!args.sampling.samples_trajectories());
}

#[test]
fn checkpoint_source_is_required_and_exclusive() {
    assert!(parse(&["NoBRS"]).is_err());
    assert!(parse(&["NoBRS", "--checkpoint", "a", "--exp-path", "b"]).is_err());
    let cli = parse(&["NoBRS", "--exp-path", "sam/run:0"]).unwrap();
    let args = EvalArgs::resolve(cli, &config()).unwrap();
    assert_eq!(args.checkpoint, CheckpointSelection::Experiment("sam/run:0".to_string()));
}

#[test]
fn conflicting_flags_are_rejected() {
    assert!(parse(&["NoBRS", "--checkpoint", "a", "--target-iou", "0.85", "--iou-analysis"]).is_err());
    assert!(parse(&["NoBRS", "--checkpoint", "a", "--gpus", "1", "--cpu"]).is_err());
    assert!(parse(&["RGB-BRS", "--checkpoint", "a"]).is_err());
}

#[test]
fn target_iou_resolution() {
    let resolve = |argv: &[&str]| EvalArgs::resolve(parse(argv).unwrap(), &config()).unwrap();

    let args = resolve(&["NoBRS", "--checkpoint", "a", "--target-iou", "0.5"]);
    assert_eq!(args.target_iou, 0.8);

    let args = resolve(&["NoBRS", "--checkpoint", "a", "--iou-analysis"]);
    assert_eq!(args.target_iou, 1.01);

    let args = resolve(&["NoBRS", "--checkpoint", "a", "--print-ious", "--min-n-clicks", "3"]);
    assert_eq!(args.target_iou, 0.9);
}

#[test]
fn clicks_limit_accepts_minus_one() {
    let cli = parse(&["NoBRS", "--checkpoint", "a", "--clicks-limit", "-1"]).unwrap();
    assert_eq!(cli.clicks_limit, Some(-1));
    let cli = parse(&["NoBRS", "--checkpoint", "a"]).unwrap();
    assert_eq!(cli.clicks_limit, None);
}

#[test]
fn sampling_flags_keep_their_underscored_names() {
    let cli = parse(&[
        "NoBRS",
        "--checkpoint",
        "a",
        "--cpu",
        "--n_workers",
        "4",
        "--n_samples",
        "10",
        "--user_inputs",
        "--clickability_model_pth",
        "/maps",
        "--trajectory_sampling_prob_low",
        "0.2",
        "--trajectory_sampling_prob_high",
        "0.7",
        "--logs-path",
        "/tmp/logs",
    ])
    .unwrap();
    let args = EvalArgs::resolve(cli, &config()).unwrap();
    assert_eq!(args.device, DeviceSpec::Cpu);
    assert_eq!(args.logs_path, std::path::PathBuf::from("/tmp/logs"));
    assert_eq!(args.sampling.n_workers, 4);
    assert_eq!(args.sampling.n_samples, 10);
    assert!(args.sampling.user_inputs);
    assert!(args.sampling.samples_trajectories());
}

#[test]
fn empty_sampling_window_is_rejected() {
    let cli = parse(&[
        "NoBRS",
        "--checkpoint",
        "a",
        "--trajectory_sampling_prob_low",
        "0.8",
        "--trajectory_sampling_prob_high",
        "0.2",
    ])
    .unwrap();
    assert!(EvalArgs::resolve(cli, &config()).is_err());
}

#[test]
fn config_file_is_loaded_from_the_given_path() {
    let fixture = common::Fixture::new();
    let args = fixture.args(&["--checkpoint", "sam_vit_b"]);
    assert_eq!(args.logs_path, fixture.logs_root());
    assert_eq!(args.datasets, vec!["Berkeley".to_string()]);
}
