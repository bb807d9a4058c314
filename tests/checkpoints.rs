mod common;

use common::{touch, Fixture};
use isegm_eval::checkpoints::get_checkpoints_list_and_logs_path;
use isegm_eval::EvalError;
use pretty_assertions::assert_eq;

#[test]
fn single_checkpoint_logs_under_others() {
    let fixture = Fixture::new();
    let args = fixture.args(&["--checkpoint", "sam_vit_b"]);
    let plan = get_checkpoints_list_and_logs_path(&args, &fixture.config()).unwrap();

    assert_eq!(plan.checkpoints, vec![fixture.root().join("weights/sam_vit_b.safetensors")]);
    assert_eq!(plan.logs_path, fixture.logs_root().join("others/sam_vit_b"));
    assert_eq!(plan.logs_prefix, "");
    assert!(plan.is_single_model());
}

#[test]
fn whole_experiment_is_sorted_descending() {
    let fixture = Fixture::new();
    let args = fixture.args(&["--exp-path", "sam_run"]);
    let plan = get_checkpoints_list_and_logs_path(&args, &fixture.config()).unwrap();

    let checkpoints = fixture.root().join("exps/sam_run_2024/checkpoints");
    assert_eq!(
        plan.checkpoints,
        vec![
            checkpoints.join("last_checkpoint.safetensors"),
            checkpoints.join("010.safetensors"),
        ]
    );
    assert_eq!(plan.logs_path, fixture.logs_root().join("sam_run_2024"));
    assert_eq!(plan.logs_prefix, "all_checkpoints");
}

#[test]
fn prefix_matching_one_checkpoint_uses_its_stem() {
    let fixture = Fixture::new();
    let args = fixture.args(&["--exp-path", "sam_run:last"]);
    let plan = get_checkpoints_list_and_logs_path(&args, &fixture.config()).unwrap();

    assert_eq!(
        plan.checkpoints,
        vec![fixture
            .root()
            .join("exps/sam_run_2024/checkpoints/last_checkpoint.safetensors")]
    );
    assert_eq!(plan.logs_prefix, "last_checkpoint");
    assert!(plan.is_single_model());
}

#[test]
fn prefix_matching_several_checkpoints() {
    let fixture = Fixture::new();
    touch(&fixture.root().join("exps/sam_run_2024/checkpoints/020.pth"));
    let args = fixture.args(&["--exp-path", "sam_run:0"]);
    let plan = get_checkpoints_list_and_logs_path(&args, &fixture.config()).unwrap();

    let checkpoints = fixture.root().join("exps/sam_run_2024/checkpoints");
    assert_eq!(
        plan.checkpoints,
        vec![checkpoints.join("020.pth"), checkpoints.join("010.safetensors")]
    );
    assert_eq!(plan.logs_prefix, "all_0");
    assert_eq!(plan.logs_path, fixture.logs_root().join("sam_run_2024"));
}

#[test]
fn experiment_must_match_exactly_one_directory() {
    let fixture = Fixture::new();
    let config = fixture.config();

    let args = fixture.args(&["--exp-path", "missing_run"]);
    let err = get_checkpoints_list_and_logs_path(&args, &config).unwrap_err();
    assert!(matches!(err, EvalError::Checkpoint(_)));

    std::fs::create_dir_all(fixture.root().join("exps/sam_run_2025/checkpoints")).unwrap();
    let args = fixture.args(&["--exp-path", "sam_run"]);
    let err = get_checkpoints_list_and_logs_path(&args, &config).unwrap_err();
    assert!(matches!(err, EvalError::Checkpoint(_)));

    // The full name is still unique.
    let args = fixture.args(&["--exp-path", "sam_run_2025"]);
    let err = get_checkpoints_list_and_logs_path(&args, &config).unwrap_err();
    assert!(err.to_string().contains("Couldn't find any checkpoints"));
}

#[test]
fn ambiguous_checkpoint_name_is_rejected() {
    let fixture = Fixture::new();
    touch(&fixture.root().join("weights/sam_vit_b_finetuned.pth"));
    let args = fixture.args(&["--checkpoint", "sam_vit_b"]);
    let err = get_checkpoints_list_and_logs_path(&args, &fixture.config()).unwrap_err();
    assert!(matches!(err, EvalError::Checkpoint(_)));
}
