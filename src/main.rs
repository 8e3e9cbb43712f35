//! ChurnCast: churn probability modeling CLI
//!
//! This is the main entrypoint that orchestrates data loading, hyperparameter
//! tuning, the final fit, and held-out evaluation.

use anyhow::Result;
use churncast::{
    demo_dataset, load_churn_csv, run_workflow, Args, GbtParams, HyperGrid, WorkflowConfig,
    WorkflowReport,
};
use clap::Parser;
use std::time::Instant;

fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        println!("ChurnCast - Customer Churn Probability Modeling");
        println!("===============================================\n");
    }

    let start_time = Instant::now();

    // Load data: CSV when given, seeded synthetic records otherwise
    let table = match &args.input {
        Some(path) => {
            if args.verbose {
                println!("Loading customer data from: {}", path);
            }
            load_churn_csv(path)?
        }
        None => {
            if args.verbose {
                println!(
                    "No input file given; generating {} synthetic customers (seed {})",
                    args.customers, args.seed
                );
            }
            demo_dataset(args.customers, args.seed)?
        }
    };

    if args.verbose {
        println!("Loaded {} customer records\n", table.n_rows());
    }

    let cfg = WorkflowConfig {
        seed: args.seed,
        test_fraction: args.test_fraction,
        n_folds: args.folds,
        grid: HyperGrid {
            tree_depths: args.parse_depths()?,
            spline_dfs: args.parse_spline_dfs()?,
        },
        gbt: GbtParams::default()
            .with_n_trees(args.trees)
            .with_learning_rate(args.learning_rate),
    };

    let report = run_workflow(&table, &cfg)?;
    let elapsed = start_time.elapsed();

    print_report(&report, args.folds);
    println!("  Processing time: {:.2}s", elapsed.as_secs_f64());

    Ok(())
}

/// Print the tuning table and the held-out result
fn print_report(report: &WorkflowReport, n_folds: usize) {
    println!("=== Cross-Validation Results ({} folds) ===", n_folds);
    println!("{:>6} {:>10} {:>10}", "depth", "spline_df", "mean_auc");
    for score in &report.tuning.scores {
        match score.mean_auc {
            Some(mean) => println!(
                "{:>6} {:>10} {:>10.4}",
                score.candidate.tree_depth, score.candidate.spline_df, mean
            ),
            None => println!(
                "{:>6} {:>10} {:>10}",
                score.candidate.tree_depth, score.candidate.spline_df, "FAILED"
            ),
        }
        for failure in &score.failures {
            println!("       ! {}", failure);
        }
    }

    println!(
        "\n✓ Best candidate: depth={}, spline_df={}",
        report.best.tree_depth, report.best.spline_df
    );
    println!(
        "  Train/test partition: {}/{} rows",
        report.n_train, report.n_test
    );
    println!("\n✓ Held-out test ROC-AUC: {:.4}", report.test_auc);
}
