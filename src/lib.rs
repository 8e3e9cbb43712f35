//! ChurnCast: customer churn probability modeling pipeline
//!
//! This library trains a binary classifier predicting customer churn within a
//! 30-day horizon from tabular customer data: feature selection, a two-phase
//! preprocessing recipe (dummy encoding + natural-spline basis expansion), a
//! gradient-boosted-tree classifier, grid search with k-fold cross-validation
//! scored by ROC-AUC, and held-out evaluation.

pub mod cli;
pub mod data;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod recipe;
pub mod tune;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{demo_dataset, load_churn_csv, train_test_split, CustomerTable, KFold};
pub use metrics::roc_auc;
pub use model::{fit_gbt, GbtModel, GbtParams};
pub use pipeline::{run_workflow, ChurnPipeline, WorkflowConfig, WorkflowReport};
pub use recipe::{FittedRecipe, RecipeSpec};
pub use tune::{tune, Candidate, CandidateScore, HyperGrid, TuneReport};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
