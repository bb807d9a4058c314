use crate::args::EvalArgs;
use crate::checkpoints::{file_stem, get_checkpoints_list_and_logs_path};
use crate::config::Config;
use crate::dataset::get_dataset;
use crate::error::{EvalError, Result};
use crate::evaluation::{evaluate_dataset, SampleSettings};
use crate::model::ModelLoader;
use crate::predictor::{get_predictor, get_predictor_and_zoomin_params};
use crate::results::ResultsWriter;
use crate::vis::get_prediction_vis_callback;

/// Evaluate every checkpoint of the run on every requested dataset.
pub fn run<L: ModelLoader>(args: &EvalArgs, config: &Config, loader: &mut L) -> Result<()> {
    let plan = get_checkpoints_list_and_logs_path(args, config)?;
    std::fs::create_dir_all(&plan.logs_path)?;

    let single_model_eval = plan.is_single_model();
    if args.iou_analysis && !single_model_eval {
        return Err(EvalError::Invariant(
            "Can't perform IoU analysis for multiple checkpoints".to_string(),
        ));
    }
    if args.sampling.n_workers > 1 {
        tracing::warn!(
            "--n_workers {} is recorded but samples are evaluated sequentially",
            args.sampling.n_workers
        );
    }
    if args.sampling.minimize {
        tracing::warn!("--minimize has no effect without backpropagating refinement");
    }
    tracing::info!(
        "evaluating {} checkpoint(s), logs in {}",
        plan.checkpoints.len(),
        plan.logs_path.display()
    );

    let writer = ResultsWriter::new(args, &plan.logs_path, &plan.logs_prefix, single_model_eval);
    let settings = SampleSettings {
        pred_thr: args.thresh,
        max_iou_thr: args.target_iou,
        min_clicks: args.min_n_clicks,
        max_clicks: args.n_clicks,
    };

    let mut print_header = single_model_eval;
    for dataset_name in &args.datasets {
        let dataset = get_dataset(dataset_name, config, args)?;

        for checkpoint_path in &plan.checkpoints {
            let model = loader.load(checkpoint_path)?;

            let (predictor_params, zoom_in_params) =
                get_predictor_and_zoomin_params(args, dataset_name);
            let mut predictor = get_predictor(
                model,
                args.mode,
                args.thresh,
                predictor_params,
                zoom_in_params,
                false,
            )?;

            let mut vis_callback = if args.vis_preds {
                Some(get_prediction_vis_callback(&plan.logs_path, dataset_name, args.thresh)?)
            } else {
                None
            };
            tracing::info!("{dataset_name}: evaluating {}", checkpoint_path.display());
            let dataset_results = evaluate_dataset(
                &dataset,
                &mut predictor,
                &settings,
                &args.sampling,
                vis_callback.as_deref_mut(),
            )?;

            let row_name = if single_model_eval {
                args.mode.to_string()
            } else {
                file_stem(checkpoint_path)
            };
            if args.iou_analysis {
                writer.save_iou_analysis_data(
                    dataset_name,
                    &dataset_results,
                    args.model_name.as_deref(),
                )?;
            }

            writer.save_results(&row_name, dataset_name, &dataset_results, print_header)?;
            print_header = false;
        }
    }

    Ok(())
}
