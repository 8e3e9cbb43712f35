//! Hyperparameter tuning: grid search over (tree depth x spline df) scored by
//! k-fold cross-validated ROC-AUC
//!
//! The loop is a pure function of (grid, folds, training table): no shared
//! mutable state, aggregation keyed by (fold, candidate) in a fixed
//! enumeration order. A failed (fold, candidate) fit is recorded on the
//! candidate and disqualifies it from selection; it is never silently
//! averaged away.

use crate::data::{CustomerTable, KFold};
use crate::metrics::roc_auc;
use crate::model::{fit_gbt, GbtParams};
use crate::recipe::RecipeSpec;
use anyhow::{bail, Context};

/// The hyperparameter grid: every combination of tree depth and spline
/// degrees of freedom is evaluated
#[derive(Debug, Clone)]
pub struct HyperGrid {
    pub tree_depths: Vec<usize>,
    pub spline_dfs: Vec<usize>,
}

impl Default for HyperGrid {
    fn default() -> Self {
        Self {
            tree_depths: vec![3, 5],
            spline_dfs: vec![2, 3],
        }
    }
}

impl HyperGrid {
    /// Enumerate the cross-product in a fixed, depth-major order. The
    /// tie-break rule for selection is "first candidate in this order".
    pub fn candidates(&self) -> Vec<Candidate> {
        let mut out = Vec::with_capacity(self.tree_depths.len() * self.spline_dfs.len());
        for &tree_depth in &self.tree_depths {
            for &spline_df in &self.spline_dfs {
                out.push(Candidate {
                    tree_depth,
                    spline_df,
                });
            }
        }
        out
    }
}

/// One hyperparameter combination from the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub tree_depth: usize,
    pub spline_df: usize,
}

/// Cross-validation outcome for one candidate
#[derive(Debug, Clone)]
pub struct CandidateScore {
    pub candidate: Candidate,
    /// Per-fold ROC-AUC, in fold order, for the folds that fitted
    pub fold_aucs: Vec<f64>,
    /// Per-fold failure messages; any entry disqualifies the candidate
    pub failures: Vec<String>,
    /// Mean ROC-AUC across folds, present only when every fold fitted
    pub mean_auc: Option<f64>,
}

/// Ranked tuning outcome
#[derive(Debug, Clone)]
pub struct TuneReport {
    /// One entry per grid candidate, in enumeration order
    pub scores: Vec<CandidateScore>,
    /// The selected candidate: highest mean AUC, first-in-order on ties
    pub best: Candidate,
}

/// Grid search with k-fold cross-validation over the training partition
///
/// For each candidate and each fold, the recipe and model are fitted on the
/// fold's training rows and scored on its held-out rows. The fold partition is
/// computed once, so every candidate sees identical folds.
pub fn tune(
    train: &CustomerTable,
    base_spec: &RecipeSpec,
    grid: &HyperGrid,
    n_folds: usize,
    seed: u64,
    gbt_base: &GbtParams,
) -> crate::Result<TuneReport> {
    let candidates = grid.candidates();
    if candidates.is_empty() {
        bail!("hyperparameter grid is empty");
    }

    let folds = KFold::new(n_folds, seed)
        .split(train.n_rows())
        .context("building cross-validation folds")?;

    let mut scores = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        let spec = base_spec.clone().with_spline_df(candidate.spline_df);
        let params = gbt_base.clone().with_max_depth(candidate.tree_depth);

        let mut fold_aucs = Vec::with_capacity(folds.len());
        let mut failures = Vec::new();
        for (fold_id, (train_idx, validation_idx)) in folds.iter().enumerate() {
            match score_fold(train, train_idx, validation_idx, &spec, &params) {
                Ok(auc) => fold_aucs.push(auc),
                Err(e) => failures.push(format!(
                    "fold {} (depth={}, spline_df={}): {:#}",
                    fold_id, candidate.tree_depth, candidate.spline_df, e
                )),
            }
        }

        let mean_auc = if failures.is_empty() {
            Some(fold_aucs.iter().sum::<f64>() / fold_aucs.len() as f64)
        } else {
            None
        };
        scores.push(CandidateScore {
            candidate: *candidate,
            fold_aucs,
            failures,
            mean_auc,
        });
    }

    // Strictly-greater comparison keeps the first candidate on ties
    let mut best: Option<(usize, f64)> = None;
    for (i, score) in scores.iter().enumerate() {
        if let Some(mean) = score.mean_auc {
            if best.map_or(true, |(_, b)| mean > b) {
                best = Some((i, mean));
            }
        }
    }

    let Some((best_idx, _)) = best else {
        let all_failures: Vec<String> = scores
            .iter()
            .flat_map(|s| s.failures.iter().cloned())
            .collect();
        bail!(
            "every hyperparameter candidate failed cross-validation:\n{}",
            all_failures.join("\n")
        );
    };

    Ok(TuneReport {
        best: scores[best_idx].candidate,
        scores,
    })
}

fn score_fold(
    train: &CustomerTable,
    train_idx: &[usize],
    validation_idx: &[usize],
    spec: &RecipeSpec,
    params: &GbtParams,
) -> crate::Result<f64> {
    let fold_train = train.select_rows(train_idx)?;
    let fold_validation = train.select_rows(validation_idx)?;

    let recipe = spec.fit(&fold_train)?;
    let x_train = recipe.transform(&fold_train)?;
    let y_train = recipe.outcome(&fold_train)?;
    let model = fit_gbt(&x_train, &y_train, params)?;

    let x_validation = recipe.transform(&fold_validation)?;
    let y_validation = recipe.outcome(&fold_validation)?;
    let probs = model.predict_proba(&x_validation);
    roc_auc(&y_validation, &probs)
}
