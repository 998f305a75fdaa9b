use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use super::model::{AggregateTable, TIME_COLUMN};
use super::stats::GroupSummary;
use crate::color::TreatmentColors;

/// Name of the wide table written after ingestion.
pub const TABLE_FILE: &str = "binned_intensity_data.csv";
pub const SUMMARY_CSV_FILE: &str = "binned_intensity_summary.csv";
pub const SUMMARY_JSON_FILE: &str = "binned_intensity_summary.json";

/// Missing values are written as empty cells, like pandas does.
fn cell(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

// ---------------------------------------------------------------------------
// Aggregate table
// ---------------------------------------------------------------------------

pub fn write_table_csv(table: &AggregateTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(table.headers())?;
    for r in 0..table.n_rows() {
        let row = std::iter::once(table.time()[r])
            .chain(table.columns().iter().map(|c| c.values[r]))
            .map(cell);
        writer.write_record(row)?;
    }
    writer.flush().with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Group summaries
// ---------------------------------------------------------------------------

/// Time column followed by `{T}_mean`, `{T}_sem`, `{T}_n` per treatment.
pub fn write_summary_csv(time: &[f64], groups: &[GroupSummary], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let mut header = vec![TIME_COLUMN.to_string()];
    for g in groups {
        header.push(format!("{}_mean", g.treatment));
        header.push(format!("{}_sem", g.treatment));
        header.push(format!("{}_n", g.treatment));
    }
    writer.write_record(&header)?;

    for (r, t) in time.iter().enumerate() {
        let mut row = vec![cell(*t)];
        for g in groups {
            row.push(cell(g.mean[r]));
            row.push(cell(g.sem[r]));
            row.push(g.count[r].to_string());
        }
        writer.write_record(&row)?;
    }
    writer.flush().with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[derive(Serialize)]
struct SummaryReport<'a> {
    time: &'a [f64],
    groups: Vec<GroupReport<'a>>,
}

#[derive(Serialize)]
struct GroupReport<'a> {
    color: String,
    #[serde(flatten)]
    summary: &'a GroupSummary,
}

/// Pretty JSON for plotting tools. Missing values come out as `null`.
pub fn write_summary_json(
    time: &[f64],
    groups: &[GroupSummary],
    colors: &TreatmentColors,
    path: &Path,
) -> Result<()> {
    let report = SummaryReport {
        time,
        groups: groups
            .iter()
            .map(|g| GroupReport {
                color: colors.hex(&g.treatment),
                summary: g,
            })
            .collect(),
    };
    let text = serde_json::to_string_pretty(&report).context("serializing summary")?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
