use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;

use crate::args::EvalArgs;
use crate::error::Result;
use crate::evaluation::DatasetResults;
use crate::metrics::{compute_noc_metric, get_results_table, get_time_metrics, report_thresholds};

/// Click counts for which the mean IoU is reported with `--print-ious`.
const MIOU_CLICKS: [usize; 5] = [1, 3, 5, 10, 20];

#[derive(Debug, Serialize)]
struct IouAnalysis<'a> {
    dataset_name: &'a str,
    model_name: String,
    all_ious: &'a [Vec<f64>],
}

/// Writes the results of every (dataset, checkpoint) pair of a run below its logs directory.
pub struct ResultsWriter<'a> {
    args: &'a EvalArgs,
    logs_path: PathBuf,
    logs_prefix: String,
    single_model_eval: bool,
}

impl<'a> ResultsWriter<'a> {
    pub fn new(
        args: &'a EvalArgs,
        logs_path: impl Into<PathBuf>,
        logs_prefix: impl Into<String>,
        single_model_eval: bool,
    ) -> Self {
        Self {
            args,
            logs_path: logs_path.into(),
            logs_prefix: logs_prefix.into(),
            single_model_eval,
        }
    }

    /// `<logs relative to the logs root>:<prefix>`, or the logs directory name without a
    /// prefix.
    pub fn default_model_name(&self) -> String {
        if self.logs_prefix.is_empty() {
            self.logs_path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            let relative = self
                .logs_path
                .strip_prefix(&self.args.logs_path)
                .unwrap_or(&self.logs_path);
            format!("{}:{}", relative.display(), self.logs_prefix)
        }
    }

    fn file_suffix(&self) -> String {
        format!(
            "{}_{}_{}",
            self.args.eval_mode, self.args.mode, self.args.n_clicks
        )
    }

    /// The table header and row for one evaluation.
    pub fn format_results(
        &self,
        row_name: &str,
        dataset_name: &str,
        results: &DatasetResults,
    ) -> (String, String) {
        let args = self.args;
        let all_ious = &results.all_ious;
        let (mean_spc, _mean_spi) = get_time_metrics(all_ious, results.elapsed);

        let iou_thrs = report_thresholds(args.target_iou);
        let (noc_list, over_max_list) = compute_noc_metric(all_ious, &iou_thrs, args.n_clicks);

        let row_name = if row_name == "last_checkpoint" {
            "last"
        } else {
            row_name
        };
        let model_name = self.default_model_name();
        let (header, mut table_row) = get_results_table(
            &noc_list,
            &over_max_list,
            row_name,
            dataset_name,
            mean_spc,
            results.elapsed,
            args.n_clicks,
            Some(&model_name),
        );

        if args.print_ious {
            if let Some(min_num_clicks) = all_ious.iter().map(Vec::len).min() {
                let miou = MIOU_CLICKS
                    .iter()
                    .filter(|&&click_id| click_id <= min_num_clicks)
                    .map(|&click_id| {
                        let mean = all_ious.iter().map(|ious| ious[click_id - 1]).sum::<f64>()
                            / all_ious.len() as f64;
                        format!("mIoU@{click_id}={mean:.4};")
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                table_row += "; ";
                table_row += &miou;
            }
        } else {
            let target_iou_int = (args.target_iou * 100.0) as i64;
            if ![80, 85, 90].contains(&target_iou_int) {
                let (noc_list, over_max_list) =
                    compute_noc_metric(all_ious, &[args.target_iou], args.n_clicks);
                let target = args.target_iou * 100.0;
                table_row += &format!(" NoC@{target:.1}% = {:.2};", noc_list[0]);
                table_row += &format!(" >={}@{target:.1}% = {}", args.n_clicks, over_max_list[0]);
            }
        }

        (header, table_row)
    }

    /// Print the row (and the header when asked), optionally pickle the IoU curves and
    /// append the row to the run's results table.
    pub fn save_results(
        &self,
        row_name: &str,
        dataset_name: &str,
        results: &DatasetResults,
        print_header: bool,
    ) -> Result<PathBuf> {
        let (header, table_row) = self.format_results(row_name, dataset_name, results);

        if print_header {
            println!("{header}");
        }
        println!("{table_row}");

        if self.single_model_eval && self.args.save_ious {
            let ious_path = self.logs_path.join("ious").join(&self.logs_prefix);
            std::fs::create_dir_all(&ious_path)?;
            let pkl_path = ious_path.join(format!("{dataset_name}_{}.pkl", self.file_suffix()));
            let mut file = std::fs::File::create(&pkl_path)?;
            serde_pickle::to_writer(&mut file, &results.all_ious, serde_pickle::SerOptions::new())?;
            tracing::debug!("saved IoU curves to {}", pkl_path.display());
        }

        let mut name_prefix = String::new();
        if !self.logs_prefix.is_empty() {
            name_prefix = format!("{}_", self.logs_prefix);
            if !self.single_model_eval {
                name_prefix += &format!("{dataset_name}_");
            }
        }

        let log_path = self
            .logs_path
            .join(format!("{name_prefix}{}.txt", self.file_suffix()));
        if log_path.exists() {
            let mut file = OpenOptions::new().append(true).open(&log_path)?;
            writeln!(file, "{table_row}")?;
        } else {
            let mut file = std::fs::File::create(&log_path)?;
            if print_header {
                writeln!(file, "{header}")?;
            }
            writeln!(file, "{table_row}")?;
        }
        Ok(log_path)
    }

    /// Pickle the IoU curves for the mIoU(number of clicks) plots.
    pub fn save_iou_analysis_data(
        &self,
        dataset_name: &str,
        results: &DatasetResults,
        model_name: Option<&str>,
    ) -> Result<PathBuf> {
        let mut name_prefix = String::new();
        if !self.logs_prefix.is_empty() {
            name_prefix = format!("{}_", self.logs_prefix);
        }
        name_prefix += &format!("{dataset_name}_");
        let model_name = match model_name {
            Some(model_name) => model_name.to_string(),
            None => self.default_model_name(),
        };

        let pkl_path = self
            .logs_path
            .join("plots")
            .join(format!("{name_prefix}{}.pickle", self.file_suffix()));
        if let Some(parent) = pkl_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let analysis = IouAnalysis {
            dataset_name,
            model_name: format!("{model_name}_{}", self.args.mode),
            all_ious: &results.all_ious,
        };
        let mut file = std::fs::File::create(&pkl_path)?;
        serde_pickle::to_writer(&mut file, &analysis, serde_pickle::SerOptions::new())?;
        tracing::info!("saved IoU analysis to {}", pkl_path.display());
        Ok(pkl_path)
    }
}
