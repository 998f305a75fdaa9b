use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::Serialize;

use super::model::{AggregateTable, TreatmentIndex};

// ---------------------------------------------------------------------------
// Reducers – sequence of readings → one scalar
// ---------------------------------------------------------------------------

/// Every reducer returns `NaN` for an empty slice.
pub type Reducer = fn(&[f64]) -> f64;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    }
}

pub fn min(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::min).unwrap_or(f64::NAN)
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(f64::NAN)
}

pub fn sum(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum()
}

/// Sample standard deviation (n − 1 denominator); `NaN` below two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (values.len() as f64 - 1.0)).sqrt()
}

/// Standard error of the mean; `NaN` below two values.
pub fn sem(values: &[f64]) -> f64 {
    std_dev(values) / (values.len() as f64).sqrt()
}

// ---------------------------------------------------------------------------
// Statistic – what gets computed per bin and how the column is labelled
// ---------------------------------------------------------------------------

/// A per-bin summary: reads `source` from each input file and folds the
/// readings that fall in a bin with `reduce`. `label` goes into column names.
#[derive(Clone)]
pub struct Statistic {
    label: String,
    source: String,
    reduce: Reducer,
}

impl Statistic {
    pub fn new(label: impl Into<String>, source: impl Into<String>, reduce: Reducer) -> Self {
        Statistic {
            label: label.into(),
            source: source.into(),
            reduce,
        }
    }

    /// Built-in reducer applied to `channel`. Mean keeps the channel name as
    /// its label; other reducers are labelled `"{channel}-{reducer}"`.
    pub fn for_channel(channel: &str, kind: ReducerKind) -> Self {
        let label = match kind {
            ReducerKind::Mean => channel.to_string(),
            other => format!("{channel}-{other}"),
        };
        Statistic::new(label, channel, kind.reducer())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn apply(&self, values: &[f64]) -> f64 {
        (self.reduce)(values)
    }
}

impl Default for Statistic {
    fn default() -> Self {
        Statistic::for_channel("Mean", ReducerKind::Mean)
    }
}

impl fmt::Debug for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statistic")
            .field("label", &self.label)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Named reducers selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReducerKind {
    #[default]
    Mean,
    Median,
    Min,
    Max,
    Sum,
    Std,
}

impl ReducerKind {
    pub fn reducer(self) -> Reducer {
        match self {
            ReducerKind::Mean => mean,
            ReducerKind::Median => median,
            ReducerKind::Min => min,
            ReducerKind::Max => max,
            ReducerKind::Sum => sum,
            ReducerKind::Std => std_dev,
        }
    }
}

impl fmt::Display for ReducerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReducerKind::Mean => "mean",
            ReducerKind::Median => "median",
            ReducerKind::Min => "min",
            ReducerKind::Max => "max",
            ReducerKind::Sum => "sum",
            ReducerKind::Std => "std",
        };
        f.write_str(s)
    }
}

impl FromStr for ReducerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "mean" | "average" => ReducerKind::Mean,
            "median" => ReducerKind::Median,
            "min" => ReducerKind::Min,
            "max" => ReducerKind::Max,
            "sum" => ReducerKind::Sum,
            "std" | "stdev" => ReducerKind::Std,
            other => bail!("Unknown reducer '{other}' (expected mean, median, min, max, sum or std)"),
        })
    }
}

// ---------------------------------------------------------------------------
// Group summaries – across-replicate mean ± SEM per treatment
// ---------------------------------------------------------------------------

/// Mean, SEM and replicate count for one treatment, one entry per bin row.
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub treatment: String,
    pub columns: Vec<String>,
    pub mean: Vec<f64>,
    pub sem: Vec<f64>,
    /// Non-missing values contributing to each row.
    pub count: Vec<usize>,
}

/// Summaries for every treatment that owns at least one column, in index
/// order. Missing cells are dropped row by row, never counted as zero.
pub fn group_summaries(table: &AggregateTable, index: &TreatmentIndex) -> Vec<GroupSummary> {
    index
        .iter()
        .filter(|(_, cols)| !cols.is_empty())
        .map(|(treatment, cols)| {
            let series: Vec<&[f64]> = cols.iter().filter_map(|c| table.column(c)).collect();
            let mut summary = GroupSummary {
                treatment: treatment.to_string(),
                columns: cols.to_vec(),
                mean: Vec::with_capacity(table.n_rows()),
                sem: Vec::with_capacity(table.n_rows()),
                count: Vec::with_capacity(table.n_rows()),
            };
            let mut row = Vec::with_capacity(series.len());
            for r in 0..table.n_rows() {
                row.clear();
                row.extend(series.iter().map(|s| s[r]).filter(|v| !v.is_nan()));
                summary.mean.push(mean(&row));
                summary.sem.push(sem(&row));
                summary.count.push(row.len());
            }
            summary
        })
        .collect()
}
