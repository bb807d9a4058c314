//! Number-of-clicks metrics and their text table.

use std::time::Duration;

use image::GrayImage;

use crate::dataset::IGNORE_LABEL;

/// IoU between a ground truth labelling and a predicted mask (non-zero = object). Ignored
/// ground truth pixels do not count. Two empty masks match perfectly.
pub fn get_iou(gt_mask: &GrayImage, pred_mask: &GrayImage) -> f64 {
    let mut intersection = 0u64;
    let mut union = 0u64;
    for (&gt, &pred) in gt_mask.as_raw().iter().zip(pred_mask.as_raw()) {
        if gt == IGNORE_LABEL {
            continue;
        }
        let gt = gt != 0;
        let pred = pred != 0;
        intersection += (gt && pred) as u64;
        union += (gt || pred) as u64;
    }
    if union == 0 {
        1.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Mean number of clicks to reach each threshold, and how many samples never reached it.
pub fn compute_noc_metric(
    all_ious: &[Vec<f64>],
    iou_thrs: &[f64],
    max_clicks: usize,
) -> (Vec<f64>, Vec<usize>) {
    let mut noc_list = Vec::with_capacity(iou_thrs.len());
    let mut over_max_list = Vec::with_capacity(iou_thrs.len());
    for &iou_thr in iou_thrs {
        let scores: Vec<usize> = all_ious
            .iter()
            .map(|ious| {
                ious.iter()
                    .position(|&iou| iou >= iou_thr)
                    .map(|index| index + 1)
                    .unwrap_or(max_clicks)
            })
            .collect();
        let noc = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<usize>() as f64 / scores.len() as f64
        };
        noc_list.push(noc);
        over_max_list.push(scores.iter().filter(|&&score| score == max_clicks).count());
    }
    (noc_list, over_max_list)
}

/// Seconds per click and seconds per image.
pub fn get_time_metrics(all_ious: &[Vec<f64>], elapsed: Duration) -> (f64, f64) {
    let n_images = all_ious.len();
    let n_clicks: usize = all_ious.iter().map(Vec::len).sum();
    let elapsed = elapsed.as_secs_f64();
    let mean_spc = if n_clicks == 0 { 0.0 } else { elapsed / n_clicks as f64 };
    let mean_spi = if n_images == 0 { 0.0 } else { elapsed / n_images as f64 };
    (mean_spc, mean_spi)
}

/// Thresholds reported in the table: 0.80, 0.85, ... up to `min(0.95, target_iou)`.
pub fn report_thresholds(target_iou: f64) -> Vec<f64> {
    let last = target_iou.min(0.95) + 0.001;
    (0..)
        .map(|step| 0.8 + 0.05 * step as f64)
        .take_while(|&threshold| threshold < last)
        .collect()
}

/// `H:MM:SS`, the way the elapsed time is shown in the table.
pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    format!("{}:{:02}:{:02}", seconds / 3600, seconds / 60 % 60, seconds % 60)
}

/// The table header (optionally titled with the model name) and the row of one evaluation.
#[allow(clippy::too_many_arguments)]
pub fn get_results_table(
    noc_list: &[f64],
    over_max_list: &[usize],
    brs_type: &str,
    dataset_name: &str,
    mean_spc: f64,
    elapsed: Duration,
    n_clicks: usize,
    model_name: Option<&str>,
) -> (String, String) {
    let over_85 = format!(">={n_clicks}@85%");
    let over_90 = format!(">={n_clicks}@90%");
    let table_header = format!(
        "|{:^13}|{:^11}|{:^9}|{:^9}|{:^9}|{:^9}|{:^9}|{:^7}|{:^9}|",
        "BRS Type", "Dataset", "NoC@80%", "NoC@85%", "NoC@90%", over_85, over_90, "SPC,s", "Time"
    );
    let row_width = table_header.chars().count();
    let mut header = match model_name {
        Some(model_name) => format!("Eval results for model: {model_name}\n"),
        None => String::new(),
    };
    header += &"-".repeat(row_width);
    header += "\n";
    header += &table_header;
    header += "\n";
    header += &"-".repeat(row_width);

    let noc = |index: usize| match noc_list.get(index) {
        Some(noc) => format!("{:^9}", format!("{noc:.2}")),
        None => format!("{:^9}", "?"),
    };
    let over_max = |index: usize| match (noc_list.get(index), over_max_list.get(index)) {
        (Some(_), Some(over_max)) => format!("{over_max:^9}"),
        _ => format!("{:^9}", "?"),
    };

    let mut table_row = format!("|{brs_type:^13}|{dataset_name:^11}|");
    table_row += &format!("{}|{}|{}|", noc(0), noc(1), noc(2));
    table_row += &format!("{}|{}|", over_max(1), over_max(2));
    table_row += &format!(
        "{:^7}|{:^9}|",
        format!("{mean_spc:.3}"),
        format_elapsed(elapsed)
    );
    (header, table_row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use pretty_assertions::assert_eq;

    #[test]
    fn iou_skips_ignored_pixels() {
        let gt = GrayImage::from_raw(4, 1, vec![1, 1, 0, IGNORE_LABEL]).unwrap();
        let pred = GrayImage::from_raw(4, 1, vec![1, 0, 1, 1]).unwrap();
        assert_eq!(get_iou(&gt, &pred), 1.0 / 3.0);
        let empty = GrayImage::from_pixel(2, 2, Luma([0]));
        assert_eq!(get_iou(&empty, &empty), 1.0);
    }

    #[test]
    fn noc_counts_first_click_over_threshold() {
        let all_ious = vec![
            vec![0.5, 0.82, 0.91],
            vec![0.95],
            vec![0.1, 0.2, 0.3, 0.4],
        ];
        let (noc, over_max) = compute_noc_metric(&all_ious, &[0.8, 0.9], 4);
        assert_eq!(noc, vec![(2.0 + 1.0 + 4.0) / 3.0, (3.0 + 1.0 + 4.0) / 3.0]);
        assert_eq!(over_max, vec![1, 1]);
    }

    #[test]
    fn iou_on_the_threshold_counts_as_reached() {
        let gt = GrayImage::from_raw(10, 1, vec![1; 10]).unwrap();
        let mut pred = vec![1; 10];
        pred[9] = 0;
        let pred = GrayImage::from_raw(10, 1, pred).unwrap();
        assert_eq!(get_iou(&gt, &pred), 0.9);

        let (noc, over_max) = compute_noc_metric(&[vec![0.95]], &[0.95], 20);
        assert_eq!(noc, vec![1.0]);
        assert_eq!(over_max, vec![0]);
        let (noc, _) = compute_noc_metric(&[vec![0.5, 19.0 / 20.0]], &[0.95], 20);
        assert_eq!(noc, vec![2.0]);
    }

    #[test]
    fn thresholds_follow_the_target() {
        assert_eq!(report_thresholds(0.9).len(), 3);
        assert_eq!(report_thresholds(0.8).len(), 1);
        assert_eq!(report_thresholds(1.01).len(), 4);
        assert_eq!(report_thresholds(0.87).len(), 2);
    }

    #[test]
    fn time_metrics() {
        let all_ious = vec![vec![0.5; 3], vec![0.5; 1]];
        let (spc, spi) = get_time_metrics(&all_ious, Duration::from_secs(8));
        assert_eq!(spc, 2.0);
        assert_eq!(spi, 4.0);
        assert_eq!(format_elapsed(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn table_layout() {
        let (header, row) = get_results_table(
            &[1.5, 2.25],
            &[0, 3],
            "NoBRS",
            "GrabCut",
            0.1234,
            Duration::from_secs(65),
            20,
            Some("others/sam"),
        );
        let lines: Vec<&str> = header.lines().collect();
        assert_eq!(lines[0], "Eval results for model: others/sam");
        assert_eq!(
            lines[2],
            "|  BRS Type   |  Dataset  | NoC@80% | NoC@85% | NoC@90% |>=20@85% |>=20@90% | SPC,s |  Time   |"
        );
        assert_eq!(lines[1].len(), lines[2].len());
        assert_eq!(
            row,
            "|    NoBRS    |  GrabCut  |  1.50   |  2.25   |    ?    |    3    |    ?    | 0.123 | 0:01:05 |"
        );
    }
}
