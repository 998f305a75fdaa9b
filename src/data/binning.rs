use super::model::BinEdges;
use super::stats::Statistic;

// ---------------------------------------------------------------------------
// Bin membership: which rows fall inside an open time interval
// ---------------------------------------------------------------------------

/// Indices of rows whose time lies strictly between `lower` and `upper`.
///
/// Both ends are open: a row sitting exactly on an edge belongs to neither
/// neighbouring bin.
pub fn rows_in_bin(times: &[f64], lower: f64, upper: f64) -> Vec<usize> {
    times
        .iter()
        .enumerate()
        .filter(|(_, t)| **t > lower && **t < upper)
        .map(|(i, _)| i)
        .collect()
}

/// Apply `stat` to each bin's readings. Readings that are `NaN` are left
/// out; a bin with nothing left yields whatever the reducer returns for an
/// empty slice (`NaN` for every built-in).
pub fn bin_series(times: &[f64], readings: &[f64], edges: &BinEdges, stat: &Statistic) -> Vec<f64> {
    debug_assert_eq!(times.len(), readings.len());
    edges
        .bins()
        .map(|(lower, upper)| {
            let values: Vec<f64> = rows_in_bin(times, lower, upper)
                .into_iter()
                .map(|i| readings[i])
                .filter(|v| !v.is_nan())
                .collect();
            stat.apply(&values)
        })
        .collect()
}
