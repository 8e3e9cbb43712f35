//! Customer table representation, CSV loading, and partitioning utilities

use anyhow::{bail, Context};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Identifier column, excluded from modeling
pub const ID_COL: &str = "customer_id";
/// Extraction date column, constant across rows, excluded from modeling
pub const EXTRACT_DATE_COL: &str = "extract_dt";
/// Binary churn outcome column
pub const OUTCOME_COL: &str = "churn";
/// Postal code: categorical field retained as a numeric scalar, not encoded
pub const ZIP_COL: &str = "zip_cd";
/// Traffic amount: the numeric predictor that receives the spline expansion
pub const TRAFFIC_COL: &str = "billed_amt";
/// Columns removed by the feature selector: identifier, extraction date,
/// and redundant lag duplicates
pub const DROPPED_COLS: &[&str] = &[ID_COL, EXTRACT_DATE_COL, "arpu_t2", "billed_amt_t2"];

/// Values held by one table column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Numeric(v) => v.len(),
            ColumnValues::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named column of customer attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    pub fn numeric(name: &str, values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            values: ColumnValues::Numeric(values),
        }
    }

    pub fn categorical(name: &str, values: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            values: ColumnValues::Categorical(values),
        }
    }
}

/// Column-oriented table of customer records, one row per customer
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerTable {
    columns: Vec<Column>,
    n_rows: usize,
}

impl CustomerTable {
    /// Build a table from columns, validating equal lengths and unique names
    pub fn new(columns: Vec<Column>) -> crate::Result<Self> {
        if columns.is_empty() {
            bail!("a customer table requires at least one column");
        }
        let n_rows = columns[0].values.len();
        for col in &columns {
            if col.values.len() != n_rows {
                bail!(
                    "column '{}' has {} rows, expected {}",
                    col.name,
                    col.values.len(),
                    n_rows
                );
            }
        }
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                bail!("duplicate column name '{}'", col.name);
            }
        }
        Ok(Self { columns, n_rows })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Feature selector: drop the named columns. Names that are not present
    /// are silently tolerated.
    pub fn drop_columns(&self, names: &[&str]) -> CustomerTable {
        let columns: Vec<Column> = self
            .columns
            .iter()
            .filter(|c| !names.contains(&c.name.as_str()))
            .cloned()
            .collect();
        CustomerTable {
            columns,
            n_rows: self.n_rows,
        }
    }

    /// Select the given rows, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> crate::Result<CustomerTable> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_rows) {
            bail!("row index {} out of bounds for {} rows", bad, self.n_rows);
        }
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let values = match &c.values {
                    ColumnValues::Numeric(v) => {
                        ColumnValues::Numeric(indices.iter().map(|&i| v[i]).collect())
                    }
                    ColumnValues::Categorical(v) => {
                        ColumnValues::Categorical(indices.iter().map(|&i| v[i].clone()).collect())
                    }
                };
                Column {
                    name: c.name.clone(),
                    values,
                }
            })
            .collect();
        Ok(CustomerTable {
            columns,
            n_rows: indices.len(),
        })
    }
}

/// Load a customer CSV into a `CustomerTable`
///
/// String columns become categorical, numeric columns become f64. Null values
/// and unsupported dtypes are fatal, with the offending column named.
pub fn load_churn_csv(path: &str) -> crate::Result<CustomerTable> {
    use polars::prelude::{CsvReader, DataFrame, DataType, SerReader};

    let df: DataFrame = CsvReader::from_path(path)
        .with_context(|| format!("failed to open CSV file: {}", path))?
        .has_header(true)
        .finish()
        .with_context(|| format!("failed to parse CSV file: {}", path))?;

    if df.height() == 0 {
        bail!("no rows found in CSV file: {}", path);
    }

    let mut columns = Vec::with_capacity(df.width());
    for series in df.get_columns() {
        let name = series.name().to_string();
        if series.null_count() > 0 {
            bail!(
                "column '{}' contains {} null value(s); the loader requires complete records",
                name,
                series.null_count()
            );
        }
        let values = match series.dtype() {
            DataType::Utf8 => ColumnValues::Categorical(
                series
                    .utf8()?
                    .into_no_null_iter()
                    .map(str::to_string)
                    .collect(),
            ),
            DataType::Boolean => ColumnValues::Numeric(
                series
                    .bool()?
                    .into_no_null_iter()
                    .map(|b| if b { 1.0 } else { 0.0 })
                    .collect(),
            ),
            dt if dt.is_numeric() => {
                let cast = series
                    .cast(&DataType::Float64)
                    .with_context(|| format!("failed to cast column '{}' to f64", name))?;
                ColumnValues::Numeric(cast.f64()?.into_no_null_iter().collect())
            }
            other => bail!("column '{}' has unsupported dtype {:?}", name, other),
        };
        columns.push(Column { name, values });
    }

    CustomerTable::new(columns)
}

/// Split a table into disjoint, exhaustive train/test partitions
///
/// The shuffle is driven entirely by `seed`: the same seed and the same table
/// always produce identical row membership. Row order within each partition
/// follows the original table. The test size is `n * test_fraction` rounded
/// to the nearest row.
pub fn train_test_split(
    table: &CustomerTable,
    test_fraction: f64,
    seed: u64,
) -> crate::Result<(CustomerTable, CustomerTable)> {
    if !(0.0..1.0).contains(&test_fraction) || test_fraction == 0.0 {
        bail!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        );
    }
    let n = table.n_rows();
    if n < 2 {
        bail!("cannot split a table with {} row(s)", n);
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64) * test_fraction).round() as usize;
    let n_test = n_test.clamp(1, n - 1);

    let mut test_idx: Vec<usize> = indices[..n_test].to_vec();
    let mut train_idx: Vec<usize> = indices[n_test..].to_vec();
    train_idx.sort_unstable();
    test_idx.sort_unstable();

    Ok((table.select_rows(&train_idx)?, table.select_rows(&test_idx)?))
}

/// K-fold cross-validator with seeded shuffling
///
/// Produces `n_splits` disjoint validation folds covering all rows; fold sizes
/// differ by at most one row, with the remainder spread over the leading folds.
#[derive(Debug, Clone)]
pub struct KFold {
    n_splits: usize,
    seed: u64,
}

impl KFold {
    pub fn new(n_splits: usize, seed: u64) -> Self {
        Self { n_splits, seed }
    }

    /// Generate (train_indices, validation_indices) for each fold
    pub fn split(&self, n_samples: usize) -> crate::Result<Vec<(Vec<usize>, Vec<usize>)>> {
        if self.n_splits < 2 {
            bail!("k-fold requires at least 2 folds, got {}", self.n_splits);
        }
        if n_samples < self.n_splits {
            bail!(
                "cannot split {} sample(s) into {} folds",
                n_samples,
                self.n_splits
            );
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        indices.shuffle(&mut rng);

        let fold_size = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;

        let mut result = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for i in 0..self.n_splits {
            let current = if i < remainder { fold_size + 1 } else { fold_size };
            let end = start + current;

            let validation: Vec<usize> = indices[start..end].to_vec();
            let mut train = Vec::with_capacity(n_samples - current);
            train.extend_from_slice(&indices[..start]);
            train.extend_from_slice(&indices[end..]);

            result.push((train, validation));
            start = end;
        }
        Ok(result)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Generate a synthetic customer table with the full Customer Record schema
///
/// Churn carries a plausible signal: short-tenure, high-traffic prepaid
/// customers churn more. Fully deterministic for a given seed.
pub fn demo_dataset(n_customers: usize, seed: u64) -> crate::Result<CustomerTable> {
    let mut rng = StdRng::seed_from_u64(seed);

    let products = ["PREPAID", "POSTPAID", "FAMILY"];
    let mut customer_id = Vec::with_capacity(n_customers);
    let mut extract_dt = Vec::with_capacity(n_customers);
    let mut product_cd = Vec::with_capacity(n_customers);
    let mut access_fee = Vec::with_capacity(n_customers);
    let mut arpu = Vec::with_capacity(n_customers);
    let mut arpu_t1 = Vec::with_capacity(n_customers);
    let mut arpu_t2 = Vec::with_capacity(n_customers);
    let mut billed = Vec::with_capacity(n_customers);
    let mut billed_t1 = Vec::with_capacity(n_customers);
    let mut billed_t2 = Vec::with_capacity(n_customers);
    let mut zip_cd = Vec::with_capacity(n_customers);
    let mut months_active = Vec::with_capacity(n_customers);
    let mut customer_age = Vec::with_capacity(n_customers);
    let mut churn = Vec::with_capacity(n_customers);

    for i in 0..n_customers {
        let product_idx = rng.gen_range(0..products.len());
        let tenure = rng.gen_range(1.0..120.0_f64);
        let age = rng.gen_range(18.0..85.0_f64);
        let fee = rng.gen_range(5.0..60.0_f64);
        let base_traffic = rng.gen_range(10.0..400.0_f64);

        let logit = -1.2 + 0.008 * base_traffic - 0.02 * tenure
            + if product_idx == 0 { 0.6 } else { 0.0 };
        let churned = rng.gen_bool(sigmoid(logit).clamp(0.05, 0.95));

        customer_id.push(format!("C{:06}", i + 1));
        extract_dt.push("2024-03-31".to_string());
        product_cd.push(products[product_idx].to_string());
        access_fee.push(fee);
        arpu.push(base_traffic * 0.1 + fee);
        arpu_t1.push(base_traffic * 0.1 + fee + rng.gen_range(-3.0..3.0));
        arpu_t2.push(base_traffic * 0.1 + fee + rng.gen_range(-3.0..3.0));
        billed.push(base_traffic);
        billed_t1.push(base_traffic + rng.gen_range(-20.0..20.0));
        billed_t2.push(base_traffic + rng.gen_range(-20.0..20.0));
        zip_cd.push(format!("{:04}", rng.gen_range(1000..9999)));
        months_active.push(tenure);
        customer_age.push(age);
        churn.push(if churned { 1.0 } else { 0.0 });
    }

    CustomerTable::new(vec![
        Column::categorical(ID_COL, customer_id),
        Column::categorical(EXTRACT_DATE_COL, extract_dt),
        Column::categorical("product_cd", product_cd),
        Column::numeric("access_fee_amt", access_fee),
        Column::numeric("arpu", arpu),
        Column::numeric("arpu_t1", arpu_t1),
        Column::numeric("arpu_t2", arpu_t2),
        Column::numeric(TRAFFIC_COL, billed),
        Column::numeric("billed_amt_t1", billed_t1),
        Column::numeric("billed_amt_t2", billed_t2),
        Column::categorical(ZIP_COL, zip_cd),
        Column::numeric("months_active", months_active),
        Column::numeric("customer_age", customer_age),
        Column::numeric(OUTCOME_COL, churn),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_table() -> CustomerTable {
        CustomerTable::new(vec![
            Column::numeric("a", vec![1.0, 2.0, 3.0, 4.0, 5.0]),
            Column::categorical("b", vec!["x", "y", "x", "z", "y"].iter().map(|s| s.to_string()).collect()),
        ])
        .unwrap()
    }

    #[test]
    fn test_table_rejects_ragged_columns() {
        let result = CustomerTable::new(vec![
            Column::numeric("a", vec![1.0, 2.0]),
            Column::numeric("b", vec![1.0]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_table_rejects_duplicate_names() {
        let result = CustomerTable::new(vec![
            Column::numeric("a", vec![1.0]),
            Column::numeric("a", vec![2.0]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_drop_columns_tolerates_missing() {
        let table = small_table();
        let dropped = table.drop_columns(&["b", "no_such_column"]);
        assert_eq!(dropped.column_names(), vec!["a"]);
        assert_eq!(dropped.n_rows(), 5);
    }

    #[test]
    fn test_split_is_deterministic() {
        let table = demo_dataset(50, 7).unwrap();
        let (train1, test1) = train_test_split(&table, 0.2, 42).unwrap();
        let (train2, test2) = train_test_split(&table, 0.2, 42).unwrap();
        assert_eq!(train1, train2);
        assert_eq!(test1, test2);

        let (train3, _) = train_test_split(&table, 0.2, 43).unwrap();
        assert_ne!(train1, train3);
    }

    #[test]
    fn test_split_is_disjoint_and_exhaustive() {
        let table = demo_dataset(101, 3).unwrap();
        let (train, test) = train_test_split(&table, 0.2, 1).unwrap();
        assert_eq!(train.n_rows() + test.n_rows(), 101);
        // 101 * 0.2 rounds to 20
        assert_eq!(test.n_rows(), 20);

        // Customer ids must partition the input exactly
        let ids = |t: &CustomerTable| -> Vec<String> {
            match &t.column(ID_COL).unwrap().values {
                ColumnValues::Categorical(v) => v.clone(),
                _ => panic!("expected categorical ids"),
            }
        };
        let mut all: Vec<String> = ids(&train);
        all.extend(ids(&test));
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 101);
    }

    #[test]
    fn test_kfold_covers_all_rows_once() {
        let folds = KFold::new(3, 9).split(10).unwrap();
        assert_eq!(folds.len(), 3);

        let mut seen: Vec<usize> = Vec::new();
        for (train, validation) in &folds {
            assert_eq!(train.len() + validation.len(), 10);
            for &i in validation {
                assert!(!train.contains(&i));
            }
            seen.extend(validation);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_kfold_rejects_degenerate_config() {
        assert!(KFold::new(1, 0).split(10).is_err());
        assert!(KFold::new(5, 0).split(3).is_err());
    }

    #[test]
    fn test_demo_dataset_schema_and_determinism() {
        let t1 = demo_dataset(30, 11).unwrap();
        let t2 = demo_dataset(30, 11).unwrap();
        assert_eq!(t1, t2);
        assert_eq!(t1.n_rows(), 30);
        for col in [ID_COL, EXTRACT_DATE_COL, OUTCOME_COL, ZIP_COL, TRAFFIC_COL] {
            assert!(t1.column(col).is_some(), "missing column {}", col);
        }
    }
}
