//! Scoring metrics for binary classifiers

use anyhow::bail;

/// Area under the ROC curve for binary labels and positive-class scores
///
/// Computed as the Mann-Whitney rank statistic with midranks for tied scores,
/// so heavily tied score vectors are handled exactly. Both classes must be
/// present; the metric is undefined otherwise and this is an error, never a
/// silent NaN.
pub fn roc_auc(labels: &[f64], scores: &[f64]) -> crate::Result<f64> {
    if labels.len() != scores.len() {
        bail!(
            "labels and scores must have equal length ({} vs {})",
            labels.len(),
            scores.len()
        );
    }
    if labels.is_empty() {
        bail!("cannot compute ROC-AUC on empty input");
    }
    if let Some(bad) = labels.iter().find(|&&y| y != 0.0 && y != 1.0) {
        bail!("labels must be binary 0/1, found {}", bad);
    }
    if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
        bail!("scores must be finite, found {}", bad);
    }

    let n_pos = labels.iter().filter(|&&y| y == 1.0).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        bail!("ROC-AUC is undefined when only one class is present");
    }

    // Rank scores ascending, assigning the average rank within tie groups
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks are 1-based; ties share the midrank
        let midrank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = midrank;
        }
        i = j + 1;
    }

    let rank_sum_pos: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|(&y, _)| y == 1.0)
        .map(|(_, &r)| r)
        .sum();

    let n_pos_f = n_pos as f64;
    let n_neg_f = n_neg as f64;
    Ok((rank_sum_pos - n_pos_f * (n_pos_f + 1.0) / 2.0) / (n_pos_f * n_neg_f))
}
