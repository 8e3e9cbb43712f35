//! Gradient-boosted decision tree classifier
//!
//! Boosting loop: log-odds initialization, per-round pseudo-residuals under
//! log loss, a shallow `linfa_trees::DecisionTree` fitted to the residual
//! signs, and a shrinkage update. Maximum tree depth is the only tunable
//! hyperparameter; everything else stays at its default.

use anyhow::{bail, Context};
use linfa::prelude::*;
use linfa_trees::DecisionTree;
use ndarray::{Array1, Array2};

/// Boosting hyperparameters
#[derive(Debug, Clone)]
pub struct GbtParams {
    /// Number of boosting rounds (trees)
    pub n_trees: usize,
    /// Shrinkage applied to each tree's contribution
    pub learning_rate: f64,
    /// Maximum depth of each weak learner (the tunable)
    pub max_depth: usize,
}

impl Default for GbtParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            learning_rate: 0.1,
            max_depth: 3,
        }
    }
}

impl GbtParams {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_n_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }
}

/// Trained boosted ensemble; immutable after fitting
#[derive(Debug, Clone)]
pub struct GbtModel {
    init_score: f64,
    learning_rate: f64,
    trees: Vec<DecisionTree<f64, usize>>,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Fit a gradient-boosted tree classifier on a design matrix and 0/1 labels
pub fn fit_gbt(x: &Array2<f64>, y: &[f64], params: &GbtParams) -> crate::Result<GbtModel> {
    let n_samples = x.nrows();
    if n_samples != y.len() {
        bail!(
            "design matrix has {} rows but {} labels were given",
            n_samples,
            y.len()
        );
    }
    if n_samples == 0 {
        bail!("cannot fit a model on 0 samples");
    }
    if params.max_depth < 1 {
        bail!("tree depth must be at least 1, got {}", params.max_depth);
    }
    if params.n_trees < 1 {
        bail!("boosting requires at least 1 tree, got {}", params.n_trees);
    }
    if let Some(bad) = y.iter().find(|&&v| v != 0.0 && v != 1.0) {
        bail!("labels must be binary 0/1, found {}", bad);
    }

    let n_pos = y.iter().filter(|&&v| v == 1.0).count();
    if n_pos == 0 || n_pos == n_samples {
        bail!("labels contain a single class; cannot fit a binary classifier");
    }

    // Initialize with the training log-odds
    let p = n_pos as f64 / n_samples as f64;
    let init_score = (p / (1.0 - p)).ln();

    let mut raw = vec![init_score; n_samples];
    let mut trees = Vec::with_capacity(params.n_trees);

    for round in 0..params.n_trees {
        // Pseudo-residuals under log loss: y - sigmoid(raw)
        let labels: Array1<usize> = raw
            .iter()
            .zip(y.iter())
            .map(|(&r, &yi)| usize::from(yi - sigmoid(r) >= 0.0))
            .collect();

        let dataset = Dataset::new(x.clone(), labels);
        let tree = DecisionTree::<f64, usize>::params()
            .max_depth(Some(params.max_depth))
            .fit(&dataset)
            .with_context(|| format!("boosting round {} failed to fit", round))?;

        let preds = tree.predict(x);
        for (r, &pred) in raw.iter_mut().zip(preds.iter()) {
            let direction = if pred == 0 { -1.0 } else { 1.0 };
            *r += params.learning_rate * direction;
        }

        trees.push(tree);
    }

    Ok(GbtModel {
        init_score,
        learning_rate: params.learning_rate,
        trees,
    })
}

impl GbtModel {
    /// Positive-class probability estimates for each row of `x`
    pub fn predict_proba(&self, x: &Array2<f64>) -> Vec<f64> {
        let mut raw = vec![self.init_score; x.nrows()];
        for tree in &self.trees {
            let preds = tree.predict(x);
            for (r, &pred) in raw.iter_mut().zip(preds.iter()) {
                let direction = if pred == 0 { -1.0 } else { 1.0 };
                *r += self.learning_rate * direction;
            }
        }
        raw.into_iter().map(sigmoid).collect()
    }

    /// Number of trees in the fitted ensemble
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One informative feature: label is 1 exactly when it exceeds 5
    fn separable_data() -> (Array2<f64>, Vec<f64>) {
        let values: Vec<f64> = (0..20).map(|i| i as f64 * 0.5).collect();
        let y: Vec<f64> = values.iter().map(|&v| f64::from(u8::from(v > 5.0))).collect();
        let x = Array2::from_shape_vec((20, 1), values).unwrap();
        (x, y)
    }

    #[test]
    fn test_fit_separable_signal() {
        let (x, y) = separable_data();
        let model = fit_gbt(&x, &y, &GbtParams::default()).unwrap();
        assert_eq!(model.n_trees(), 100);

        let probs = model.predict_proba(&x);
        // Positive rows must score strictly above negative rows
        let max_neg = probs
            .iter()
            .zip(&y)
            .filter(|(_, &yi)| yi == 0.0)
            .map(|(&p, _)| p)
            .fold(f64::MIN, f64::max);
        let min_pos = probs
            .iter()
            .zip(&y)
            .filter(|(_, &yi)| yi == 1.0)
            .map(|(&p, _)| p)
            .fold(f64::MAX, f64::min);
        assert!(min_pos > max_neg);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = separable_data();
        let params = GbtParams::default().with_n_trees(20);
        let m1 = fit_gbt(&x, &y, &params).unwrap();
        let m2 = fit_gbt(&x, &y, &params).unwrap();
        assert_eq!(m1.predict_proba(&x), m2.predict_proba(&x));
    }

    #[test]
    fn test_single_class_labels_rejected() {
        let x = Array2::from_shape_vec((4, 1), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!(fit_gbt(&x, &[1.0, 1.0, 1.0, 1.0], &GbtParams::default()).is_err());
        assert!(fit_gbt(&x, &[0.0, 0.0, 0.0, 0.0], &GbtParams::default()).is_err());
    }

    #[test]
    fn test_non_binary_labels_rejected() {
        let x = Array2::from_shape_vec((3, 1), vec![1.0, 2.0, 3.0]).unwrap();
        assert!(fit_gbt(&x, &[0.0, 1.0, 2.0], &GbtParams::default()).is_err());
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let x = Array2::from_shape_vec((3, 1), vec![1.0, 2.0, 3.0]).unwrap();
        assert!(fit_gbt(&x, &[0.0, 1.0], &GbtParams::default()).is_err());
    }
}
