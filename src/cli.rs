//! Command-line interface definitions and argument parsing

use clap::Parser;

/// Churn probability modeling: recipe + gradient-boosted trees with
/// cross-validated grid search, evaluated by held-out ROC-AUC
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input customer CSV; a seeded synthetic dataset is used
    /// when omitted
    #[arg(short, long)]
    pub input: Option<String>,

    /// Number of synthetic customers to generate when no CSV is given
    #[arg(long, default_value = "500")]
    pub customers: usize,

    /// Random seed driving the train/test split and fold shuffling
    #[arg(short, long, default_value = "42")]
    pub seed: u64,

    /// Fraction of rows held out for the test partition
    #[arg(long, default_value = "0.2")]
    pub test_fraction: f64,

    /// Number of cross-validation folds
    #[arg(short = 'k', long, default_value = "3")]
    pub folds: usize,

    /// Tree depth grid as a comma-separated list
    #[arg(long, default_value = "3,5")]
    pub depths: String,

    /// Spline degrees-of-freedom grid as a comma-separated list
    #[arg(long, default_value = "2,3")]
    pub spline_dfs: String,

    /// Number of boosting rounds
    #[arg(long, default_value = "100")]
    pub trees: usize,

    /// Boosting learning rate
    #[arg(long, default_value = "0.1")]
    pub learning_rate: f64,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse the tree depth grid
    pub fn parse_depths(&self) -> crate::Result<Vec<usize>> {
        parse_grid_values(&self.depths, "depths")
    }

    /// Parse the spline degrees-of-freedom grid
    pub fn parse_spline_dfs(&self) -> crate::Result<Vec<usize>> {
        parse_grid_values(&self.spline_dfs, "spline-dfs")
    }
}

fn parse_grid_values(raw: &str, flag: &str) -> crate::Result<Vec<usize>> {
    let values: Vec<usize> = raw
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| anyhow::anyhow!("invalid value '{}' in --{}", part, flag))
        })
        .collect::<crate::Result<_>>()?;
    if values.is_empty() || values.contains(&0) {
        anyhow::bail!("--{} requires one or more positive integers", flag);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            input: None,
            customers: 500,
            seed: 42,
            test_fraction: 0.2,
            folds: 3,
            depths: "3,5".to_string(),
            spline_dfs: "2,3".to_string(),
            trees: 100,
            learning_rate: 0.1,
            verbose: false,
        }
    }

    #[test]
    fn test_parse_grid_values() {
        let mut args = base_args();
        assert_eq!(args.parse_depths().unwrap(), vec![3, 5]);
        assert_eq!(args.parse_spline_dfs().unwrap(), vec![2, 3]);

        args.depths = " 4 , 6 ".to_string();
        assert_eq!(args.parse_depths().unwrap(), vec![4, 6]);

        args.depths = "3,x".to_string();
        assert!(args.parse_depths().is_err());

        args.depths = "0".to_string();
        assert!(args.parse_depths().is_err());
    }
}
