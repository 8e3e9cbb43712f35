//! Two-phase preprocessing recipe: a declarative `RecipeSpec` and an immutable
//! `FittedRecipe` holding frozen encoding levels and spline knots
//!
//! Fitting computes transform parameters from training rows only; applying a
//! fitted recipe never refits, so no information can leak from validation or
//! test partitions into the transform.

use crate::data::{self, ColumnValues, CustomerTable};
use anyhow::bail;
use ndarray::Array2;

/// Natural cubic spline basis with frozen knots
///
/// Boundary knots sit at the training minimum and maximum; the `df - 1`
/// interior knots sit at evenly spaced quantiles of the training values. The
/// basis has exactly `df` columns: the linear term plus the truncated-power
/// natural cubic terms.
#[derive(Debug, Clone, PartialEq)]
pub struct NaturalSpline {
    knots: Vec<f64>,
}

impl NaturalSpline {
    /// Compute knot placements from training values
    pub fn fit(values: &[f64], df: usize) -> crate::Result<Self> {
        if df < 1 {
            bail!("spline degrees of freedom must be at least 1, got {}", df);
        }
        if values.is_empty() {
            bail!("cannot fit a spline basis on an empty column");
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            bail!("spline column contains a non-finite value: {}", bad);
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let mut knots = Vec::with_capacity(df + 1);
        knots.push(sorted[0]);
        for i in 1..df {
            knots.push(quantile(&sorted, i as f64 / df as f64));
        }
        knots.push(sorted[sorted.len() - 1]);

        if knots.windows(2).any(|w| w[1] <= w[0]) {
            bail!(
                "degenerate spline basis: {} knots require at least {} distinct values",
                knots.len(),
                knots.len()
            );
        }

        Ok(Self { knots })
    }

    /// Number of basis columns produced per input value
    pub fn df(&self) -> usize {
        self.knots.len() - 1
    }

    /// Evaluate the basis at one point; output length equals `df()`
    pub fn basis(&self, x: f64) -> Vec<f64> {
        let k = &self.knots;
        let n_knots = k.len();
        let mut out = vec![0.0; n_knots - 1];
        out[0] = x;
        if n_knots <= 2 {
            return out;
        }

        let pos3 = |t: f64| if t > 0.0 { t * t * t } else { 0.0 };
        let d = |j: usize| {
            (pos3(x - k[j]) - pos3(x - k[n_knots - 1])) / (k[n_knots - 1] - k[j])
        };
        let d_last = d(n_knots - 2);
        for j in 0..n_knots - 2 {
            out[j + 1] = d(j) - d_last;
        }
        out
    }
}

/// Type-7 linear-interpolation quantile over pre-sorted values
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let h = p * (n - 1) as f64;
    let lo = h.floor() as usize;
    let frac = h - lo as f64;
    if lo + 1 >= n {
        sorted[n - 1]
    } else {
        sorted[lo] + frac * (sorted[lo + 1] - sorted[lo])
    }
}

/// One frozen transform step, applied per predictor column in table order
#[derive(Debug, Clone)]
enum Step {
    /// Numeric column passed through unchanged
    Numeric { column: String },
    /// Categorical column parsed to a numeric scalar (postal code)
    ParseNumeric { column: String },
    /// Natural-spline basis expansion of a numeric column
    Spline {
        column: String,
        spline: NaturalSpline,
    },
    /// Dummy encoding with frozen levels; `levels[0]` is the reference level
    /// and contributes no indicator column
    Dummy { column: String, levels: Vec<String> },
}

impl Step {
    fn width(&self) -> usize {
        match self {
            Step::Numeric { .. } | Step::ParseNumeric { .. } => 1,
            Step::Spline { spline, .. } => spline.df(),
            Step::Dummy { levels, .. } => levels.len().saturating_sub(1),
        }
    }
}

/// Declarative preprocessing specification
///
/// Stateless: declares which columns to drop, which column is the outcome,
/// which categorical column passes through as a numeric scalar, and which
/// numeric column receives the spline expansion. Holds no data-derived state.
#[derive(Debug, Clone)]
pub struct RecipeSpec {
    outcome: String,
    drop: Vec<String>,
    numeric_passthrough: Vec<String>,
    spline_column: String,
    spline_df: usize,
}

impl RecipeSpec {
    pub fn new(
        outcome: &str,
        drop: &[&str],
        numeric_passthrough: &[&str],
        spline_column: &str,
        spline_df: usize,
    ) -> Self {
        Self {
            outcome: outcome.to_string(),
            drop: drop.iter().map(|s| s.to_string()).collect(),
            numeric_passthrough: numeric_passthrough.iter().map(|s| s.to_string()).collect(),
            spline_column: spline_column.to_string(),
            spline_df,
        }
    }

    /// The churn modeling recipe over the Customer Record schema
    pub fn churn_defaults(spline_df: usize) -> Self {
        Self::new(
            data::OUTCOME_COL,
            data::DROPPED_COLS,
            &[data::ZIP_COL],
            data::TRAFFIC_COL,
            spline_df,
        )
    }

    /// Same recipe with a different spline degrees-of-freedom setting
    pub fn with_spline_df(mut self, spline_df: usize) -> Self {
        self.spline_df = spline_df;
        self
    }

    pub fn outcome_column(&self) -> &str {
        &self.outcome
    }

    pub fn spline_df(&self) -> usize {
        self.spline_df
    }

    /// Fit the recipe against training data, freezing encoding levels and
    /// spline knots
    ///
    /// Configuration errors are fatal here, not at scoring time: a missing or
    /// non-binary outcome, a single-class outcome (ROC-AUC would be
    /// undefined), a missing spline column, or a degenerate spline basis.
    pub fn fit(&self, table: &CustomerTable) -> crate::Result<FittedRecipe> {
        let drop_refs: Vec<&str> = self.drop.iter().map(String::as_str).collect();
        let retained = table.drop_columns(&drop_refs);

        // Outcome checks happen before any transform is fitted
        let outcome = outcome_values(&retained, &self.outcome)?;
        let n_pos = outcome.iter().filter(|&&y| y == 1.0).count();
        if n_pos == 0 || n_pos == outcome.len() {
            bail!(
                "outcome '{}' has a single class; ROC-AUC is undefined for one-class data",
                self.outcome
            );
        }

        if retained.column(&self.spline_column).is_none() {
            bail!("spline column '{}' not found in input table", self.spline_column);
        }

        let mut steps = Vec::new();
        let mut feature_names = Vec::new();
        for col in retained.columns() {
            if col.name == self.outcome {
                continue;
            }
            if col.name == self.spline_column {
                let values = match &col.values {
                    ColumnValues::Numeric(v) => v,
                    ColumnValues::Categorical(_) => {
                        bail!("spline column '{}' must be numeric", col.name)
                    }
                };
                let spline = NaturalSpline::fit(values, self.spline_df)
                    .map_err(|e| e.context(format!("fitting spline for column '{}'", col.name)))?;
                for j in 1..=spline.df() {
                    feature_names.push(format!("{}_ns{}", col.name, j));
                }
                steps.push(Step::Spline {
                    column: col.name.clone(),
                    spline,
                });
            } else if self.numeric_passthrough.contains(&col.name) {
                match &col.values {
                    ColumnValues::Numeric(_) => {
                        feature_names.push(col.name.clone());
                        steps.push(Step::Numeric {
                            column: col.name.clone(),
                        });
                    }
                    ColumnValues::Categorical(v) => {
                        // Validate up front so apply-time parsing cannot fail
                        // on rows the fit already saw
                        if let Some(bad) = v.iter().find(|s| s.trim().parse::<f64>().is_err()) {
                            bail!(
                                "column '{}' is marked numeric-passthrough but holds non-numeric value '{}'",
                                col.name,
                                bad
                            );
                        }
                        feature_names.push(col.name.clone());
                        steps.push(Step::ParseNumeric {
                            column: col.name.clone(),
                        });
                    }
                }
            } else {
                match &col.values {
                    ColumnValues::Numeric(_) => {
                        feature_names.push(col.name.clone());
                        steps.push(Step::Numeric {
                            column: col.name.clone(),
                        });
                    }
                    ColumnValues::Categorical(v) => {
                        let mut levels: Vec<String> = v.clone();
                        levels.sort();
                        levels.dedup();
                        for level in &levels[1..] {
                            feature_names.push(format!("{}_{}", col.name, level));
                        }
                        steps.push(Step::Dummy {
                            column: col.name.clone(),
                            levels,
                        });
                    }
                }
            }
        }

        Ok(FittedRecipe {
            outcome: self.outcome.clone(),
            drop: self.drop.clone(),
            steps,
            feature_names,
        })
    }
}

/// Frozen preprocessing parameters; immutable once produced
#[derive(Debug, Clone)]
pub struct FittedRecipe {
    outcome: String,
    drop: Vec<String>,
    steps: Vec<Step>,
    feature_names: Vec<String>,
}

impl FittedRecipe {
    /// Names of the design-matrix columns, in output order
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Apply the frozen transforms to a table, producing the design matrix
    ///
    /// Reuses the parameters computed at fit time; a categorical level unseen
    /// during fitting maps to the all-zero (reference) indicator row. Missing
    /// required columns are fatal.
    pub fn transform(&self, table: &CustomerTable) -> crate::Result<Array2<f64>> {
        let drop_refs: Vec<&str> = self.drop.iter().map(String::as_str).collect();
        let retained = table.drop_columns(&drop_refs);

        let n = retained.n_rows();
        let width: usize = self.steps.iter().map(Step::width).sum();
        let mut out = Array2::<f64>::zeros((n, width));

        let mut offset = 0;
        for step in &self.steps {
            match step {
                Step::Numeric { column } => {
                    let values = numeric_column(&retained, column)?;
                    for (i, &v) in values.iter().enumerate() {
                        out[[i, offset]] = v;
                    }
                }
                Step::ParseNumeric { column } => {
                    let values = categorical_column(&retained, column)?;
                    for (i, s) in values.iter().enumerate() {
                        let v: f64 = s.trim().parse().map_err(|_| {
                            anyhow::anyhow!(
                                "column '{}' holds non-numeric value '{}' at row {}",
                                column,
                                s,
                                i
                            )
                        })?;
                        out[[i, offset]] = v;
                    }
                }
                Step::Spline { column, spline } => {
                    let values = numeric_column(&retained, column)?;
                    for (i, &v) in values.iter().enumerate() {
                        for (j, b) in spline.basis(v).into_iter().enumerate() {
                            out[[i, offset + j]] = b;
                        }
                    }
                }
                Step::Dummy { column, levels } => {
                    let values = categorical_column(&retained, column)?;
                    for (i, s) in values.iter().enumerate() {
                        if let Some(idx) = levels.iter().position(|l| l == s) {
                            if idx > 0 {
                                out[[i, offset + idx - 1]] = 1.0;
                            }
                        }
                        // Unseen level: all indicators stay zero
                    }
                }
            }
            offset += step.width();
        }

        Ok(out)
    }

    /// Extract the outcome column as 0/1 labels
    pub fn outcome(&self, table: &CustomerTable) -> crate::Result<Vec<f64>> {
        outcome_values(table, &self.outcome)
    }
}

fn numeric_column<'a>(table: &'a CustomerTable, name: &str) -> crate::Result<&'a [f64]> {
    match table.column(name) {
        Some(col) => match &col.values {
            ColumnValues::Numeric(v) => Ok(v),
            ColumnValues::Categorical(_) => bail!("column '{}' must be numeric", name),
        },
        None => bail!("required column '{}' not found in input table", name),
    }
}

fn categorical_column<'a>(table: &'a CustomerTable, name: &str) -> crate::Result<&'a [String]> {
    match table.column(name) {
        Some(col) => match &col.values {
            ColumnValues::Categorical(v) => Ok(v),
            ColumnValues::Numeric(_) => bail!("column '{}' must be categorical", name),
        },
        None => bail!("required column '{}' not found in input table", name),
    }
}

fn outcome_values(table: &CustomerTable, name: &str) -> crate::Result<Vec<f64>> {
    let values = numeric_column(table, name)?;
    if let Some(bad) = values.iter().find(|&&y| y != 0.0 && y != 1.0) {
        bail!("outcome '{}' must be binary 0/1, found {}", name, bad);
    }
    Ok(values.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn toy_table() -> CustomerTable {
        CustomerTable::new(vec![
            Column::categorical("customer_id", strings(&["a", "b", "c", "d", "e", "f"])),
            Column::categorical(
                "product_cd",
                strings(&["PREPAID", "POSTPAID", "FAMILY", "PREPAID", "POSTPAID", "FAMILY"]),
            ),
            Column::categorical("zip_cd", strings(&["0100", "0200", "0300", "0400", "0500", "0600"])),
            Column::numeric("billed_amt", vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0]),
            Column::numeric("months_active", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            Column::numeric("churn", vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0]),
        ])
        .unwrap()
    }

    fn toy_spec(df: usize) -> RecipeSpec {
        RecipeSpec::new("churn", &["customer_id"], &["zip_cd"], "billed_amt", df)
    }

    #[test]
    fn test_dummy_encoding_has_k_minus_one_columns() {
        let table = toy_table();
        let fitted = toy_spec(2).fit(&table).unwrap();
        let x = fitted.transform(&table).unwrap();

        // product_cd has 3 levels -> 2 indicators; FAMILY (first sorted) is
        // the reference
        let names = fitted.feature_names();
        assert!(names.contains(&"product_cd_POSTPAID".to_string()));
        assert!(names.contains(&"product_cd_PREPAID".to_string()));
        assert!(!names.iter().any(|n| n == "product_cd_FAMILY"));

        let postpaid = names.iter().position(|n| n == "product_cd_POSTPAID").unwrap();
        let prepaid = names.iter().position(|n| n == "product_cd_PREPAID").unwrap();

        // Row 2 is FAMILY: both indicators zero
        assert_eq!(x[[2, postpaid]], 0.0);
        assert_eq!(x[[2, prepaid]], 0.0);
        // Row 0 is PREPAID: exactly one indicator active
        assert_eq!(x[[0, prepaid]], 1.0);
        assert_eq!(x[[0, postpaid]], 0.0);
    }

    #[test]
    fn test_zip_passthrough_is_numeric_scalar() {
        let table = toy_table();
        let fitted = toy_spec(2).fit(&table).unwrap();
        let x = fitted.transform(&table).unwrap();

        let zip = fitted.feature_names().iter().position(|n| n == "zip_cd").unwrap();
        assert_eq!(x[[0, zip]], 100.0);
        assert_eq!(x[[5, zip]], 600.0);
    }

    #[test]
    fn test_spline_dimensionality_matches_df() {
        let table = toy_table();
        for df in 1..=4 {
            let fitted = toy_spec(df).fit(&table).unwrap();
            let ns_cols = fitted
                .feature_names()
                .iter()
                .filter(|n| n.starts_with("billed_amt_ns"))
                .count();
            assert_eq!(ns_cols, df);
        }
    }

    #[test]
    fn test_spline_basis_is_deterministic_and_linear_at_df1() {
        let spline = NaturalSpline::fit(&[1.0, 2.0, 3.0, 4.0], 1).unwrap();
        assert_eq!(spline.df(), 1);
        assert_eq!(spline.basis(2.5), vec![2.5]);
    }

    #[test]
    fn test_degenerate_spline_is_a_fit_error() {
        let table = CustomerTable::new(vec![
            Column::numeric("billed_amt", vec![5.0; 6]),
            Column::numeric("churn", vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0]),
        ])
        .unwrap();
        let spec = RecipeSpec::new("churn", &[], &[], "billed_amt", 2);
        let err = spec.fit(&table).unwrap_err();
        assert!(format!("{:#}", err).contains("billed_amt"));
    }

    #[test]
    fn test_transform_is_idempotent() {
        let table = toy_table();
        let fitted = toy_spec(3).fit(&table).unwrap();
        let x1 = fitted.transform(&table).unwrap();
        let x2 = fitted.transform(&table).unwrap();
        assert_eq!(x1, x2);
    }

    #[test]
    fn test_frozen_parameters_do_not_refit() {
        let table = toy_table();
        let fitted = toy_spec(2).fit(&table).unwrap();

        // A shifted table must be transformed with the original knots: the
        // basis value for x=10 is the same whether or not 10 is in the new data
        let other = CustomerTable::new(vec![
            Column::categorical("customer_id", strings(&["q"])),
            Column::categorical("product_cd", strings(&["PREPAID"])),
            Column::categorical("zip_cd", strings(&["0100"])),
            Column::numeric("billed_amt", vec![10.0]),
            Column::numeric("months_active", vec![1.0]),
            Column::numeric("churn", vec![0.0]),
        ])
        .unwrap();
        let x_other = fitted.transform(&other).unwrap();
        let x_train = fitted.transform(&table).unwrap();
        let ns1 = fitted
            .feature_names()
            .iter()
            .position(|n| n == "billed_amt_ns1")
            .unwrap();
        assert_eq!(x_other[[0, ns1]], x_train[[0, ns1]]);
    }

    #[test]
    fn test_unseen_level_maps_to_reference() {
        let table = toy_table();
        let fitted = toy_spec(2).fit(&table).unwrap();

        let other = CustomerTable::new(vec![
            Column::categorical("customer_id", strings(&["q"])),
            Column::categorical("product_cd", strings(&["BUSINESS"])),
            Column::categorical("zip_cd", strings(&["0100"])),
            Column::numeric("billed_amt", vec![25.0]),
            Column::numeric("months_active", vec![2.0]),
            Column::numeric("churn", vec![1.0]),
        ])
        .unwrap();
        let x = fitted.transform(&other).unwrap();
        let names = fitted.feature_names();
        for (j, name) in names.iter().enumerate() {
            if name.starts_with("product_cd_") {
                assert_eq!(x[[0, j]], 0.0);
            }
        }
    }

    #[test]
    fn test_single_class_outcome_is_fatal_at_fit_time() {
        let table = CustomerTable::new(vec![
            Column::numeric("billed_amt", vec![1.0, 2.0, 3.0, 4.0]),
            Column::numeric("churn", vec![0.0, 0.0, 0.0, 0.0]),
        ])
        .unwrap();
        let spec = RecipeSpec::new("churn", &[], &[], "billed_amt", 2);
        let err = spec.fit(&table).unwrap_err();
        assert!(format!("{:#}", err).contains("single class"));
    }

    #[test]
    fn test_missing_outcome_is_fatal() {
        let table = CustomerTable::new(vec![Column::numeric("billed_amt", vec![1.0, 2.0])]).unwrap();
        let spec = RecipeSpec::new("churn", &[], &[], "billed_amt", 2);
        let err = spec.fit(&table).unwrap_err();
        assert!(format!("{:#}", err).contains("churn"));
    }

    #[test]
    fn test_spline_dimensionality_never_decreases_with_df() {
        let values: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let mut prev = 0;
        for df in 1..=6 {
            let spline = NaturalSpline::fit(&values, df).unwrap();
            assert!(spline.df() >= prev);
            prev = spline.df();
        }
    }
}
