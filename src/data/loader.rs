use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, Float32Array, Float64Array, Int32Array, Int64Array};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{AggregateTable, SourceRecord, SourceTag, elapsed_hours};
use crate::error::BinError;

// ---------------------------------------------------------------------------
// Per-experiment intensity files
// ---------------------------------------------------------------------------

/// Read one intensity CSV (ImageJ "Results" layout) into a [`SourceRecord`].
///
/// The index column is the one with a blank header; when no such column
/// exists the 1-based row number is used instead. `channel` must be present.
pub fn load_source(
    tag: SourceTag,
    treatment: &str,
    channel: &str,
    timeframe_s: f64,
) -> Result<SourceRecord> {
    let path = tag.path.clone();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(&path)
        .with_context(|| format!("opening {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("reading headers of {}", path.display()))?
        .clone();

    let index_idx = headers.iter().position(|h| h.is_empty());
    let channel_idx = headers
        .iter()
        .position(|h| h == channel)
        .ok_or_else(|| BinError::MissingChannel {
            path: path.clone(),
            channel: channel.to_string(),
        })?;
    if index_idx.is_none() {
        log::debug!("{}: no index column, using row numbers", path.display());
    }

    let mut times = Vec::new();
    let mut readings = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("{} row {row_no}", path.display()))?;
        let index = match index_idx {
            Some(i) => {
                // A blank index gives a NaN time, which lands in no bin.
                parse_cell(record.get(i).unwrap_or("")).with_context(|| {
                    format!("{} row {row_no}: bad index", path.display())
                })?
            }
            None => (row_no + 1) as f64,
        };
        let reading = parse_cell(record.get(channel_idx).unwrap_or("")).with_context(|| {
            format!("{} row {row_no}: bad '{channel}' value", path.display())
        })?;
        times.push(elapsed_hours(index, timeframe_s));
        readings.push(reading);
    }

    Ok(SourceRecord {
        tag,
        treatment: treatment.to_string(),
        times,
        readings,
    })
}

/// Numeric cell; blank or `NaN` becomes `f64::NAN`.
fn parse_cell(s: &str) -> Result<f64> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    s.parse::<f64>()
        .with_context(|| format!("'{s}' is not a number"))
}

// ---------------------------------------------------------------------------
// Pre-built aggregate tables
// ---------------------------------------------------------------------------

/// Load a binned table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, numeric cells, blank cells are missing values
/// * `.json`    – `[{ "Time (hpf)": 4.25, "Control_Mean_…": 12.1 }, ...]`
/// * `.parquet` – one numeric column per table column, nulls are missing
pub fn load_table(path: &Path) -> Result<AggregateTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let columns = match ext.as_str() {
        "csv" => load_table_csv(path),
        "json" => load_table_json(path),
        "parquet" | "pq" => load_table_parquet(path),
        other => bail!("Unsupported file extension: .{other}"),
    }?;
    let table = AggregateTable::from_columns(columns)
        .with_context(|| format!("validating {}", path.display()))?;
    Ok(table)
}

fn load_table_csv(path: &Path) -> Result<Vec<(String, Vec<f64>)>> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let mut columns: Vec<(String, Vec<f64>)> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| (h.to_string(), Vec::new()))
        .collect();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        for (col, (name, values)) in columns.iter_mut().enumerate() {
            let value = parse_cell(record.get(col).unwrap_or(""))
                .with_context(|| format!("CSV row {row_no}, column '{name}'"))?;
            values.push(value);
        }
    }
    Ok(columns)
}

/// Records-oriented JSON, as written by `df.to_json(orient='records')`.
/// `null` or absent keys are missing values. Columns keep the order in
/// which their keys first appear.
fn load_table_json(path: &Path) -> Result<Vec<(String, Vec<f64>)>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;
    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut order: Vec<String> = Vec::new();
    let mut rows: Vec<BTreeMap<String, f64>> = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        let mut row = BTreeMap::new();
        for (key, val) in obj {
            let value = match val {
                JsonValue::Null => f64::NAN,
                JsonValue::Number(n) => n.as_f64().unwrap_or(f64::NAN),
                other => bail!("Row {i}, '{key}': expected a number, got {other}"),
            };
            if !order.contains(key) {
                order.push(key.clone());
            }
            row.insert(key.clone(), value);
        }
        rows.push(row);
    }

    Ok(order
        .into_iter()
        .map(|name| {
            let values = rows
                .iter()
                .map(|r| r.get(&name).copied().unwrap_or(f64::NAN))
                .collect();
            (name, values)
        })
        .collect())
}

fn load_table_parquet(path: &Path) -> Result<Vec<(String, Vec<f64>)>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut columns: Vec<(String, Vec<f64>)> = Vec::new();
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();
        for (i, field) in schema.fields().iter().enumerate() {
            let Some(values) = numeric_column(batch.column(i)) else {
                log::warn!(
                    "Skipping non-numeric parquet column '{}' ({:?})",
                    field.name(),
                    field.data_type()
                );
                continue;
            };
            match columns.iter_mut().find(|(name, _)| name == field.name()) {
                Some((_, existing)) => existing.extend(values),
                None => columns.push((field.name().clone(), values)),
            }
        }
    }
    Ok(columns)
}

/// Numeric Arrow column as `f64`, nulls mapped to `NaN`.
fn numeric_column(col: &Arc<dyn Array>) -> Option<Vec<f64>> {
    let any = col.as_any();
    let values = match col.data_type() {
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()?
            .iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect(),
        DataType::Float32 => any
            .downcast_ref::<Float32Array>()?
            .iter()
            .map(|v| v.map_or(f64::NAN, f64::from))
            .collect(),
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()?
            .iter()
            .map(|v| v.map_or(f64::NAN, |i| i as f64))
            .collect(),
        DataType::Int32 => any
            .downcast_ref::<Int32Array>()?
            .iter()
            .map(|v| v.map_or(f64::NAN, f64::from))
            .collect(),
        _ => return None,
    };
    Some(values)
}

// ---------------------------------------------------------------------------
// Pipette aspiration curves
// ---------------------------------------------------------------------------

/// Headerless `x,y` CSV. Rows whose first two cells are not both numbers
/// (a stray header, blank lines) are skipped.
pub fn load_curve(path: &Path) -> Result<(Vec<f64>, Vec<f64>)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut x = Vec::new();
    let mut y = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("{} row {row_no}", path.display()))?;
        let parsed = (
            record.get(0).and_then(|s| s.parse::<f64>().ok()),
            record.get(1).and_then(|s| s.parse::<f64>().ok()),
        );
        match parsed {
            (Some(a), Some(b)) => {
                x.push(a);
                y.push(b);
            }
            _ => log::debug!("{} row {row_no}: skipped", path.display()),
        }
    }
    Ok((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn source_uses_blank_index_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024-01-01_Pos003_X.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, " ,Area,Mean,IntDen").unwrap();
        writeln!(f, "1,10,100.5,5").unwrap();
        writeln!(f, "2,10,,5").unwrap();
        writeln!(f, "3,10,102,5").unwrap();
        drop(f);

        let tag = SourceTag::parse(&path).unwrap();
        let rec = load_source(tag, "Control", "Mean", 1800.0).unwrap();
        assert_eq!(rec.times, vec![4.0, 4.5, 5.0]);
        assert_eq!(rec.readings[0], 100.5);
        assert!(rec.readings[1].is_nan());
        assert_eq!(rec.treatment, "Control");
    }

    #[test]
    fn blank_index_row_falls_in_no_bin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024-01-01_Pos003_X.csv");
        std::fs::write(&path, " ,Mean\n1,10\n,99\n3,30\n").unwrap();

        let rec = load_source(SourceTag::parse(&path).unwrap(), "Control", "Mean", 1800.0).unwrap();
        assert_eq!(rec.times.len(), 3);
        assert!(rec.times[1].is_nan());

        let edges = crate::data::model::BinEdges::new(vec![3.0, 6.0]).unwrap();
        let binned = crate::data::binning::bin_series(
            &rec.times,
            &rec.readings,
            &edges,
            &crate::data::stats::Statistic::default(),
        );
        // times 4.0 and 5.0 only; the 99 reading is dropped
        assert_eq!(binned, vec![20.0]);
    }

    #[test]
    fn json_table_keeps_record_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        std::fs::write(
            &path,
            r#"[{"Time (hpf)": 4.5, "Zeta_x": 1.0, "Alpha_x": 2.0, "Mid_x": 3.0}]"#,
        )
        .unwrap();
        let table = load_table(&path).unwrap();
        assert_eq!(table.headers(), vec!["Time (hpf)", "Zeta_x", "Alpha_x", "Mid_x"]);
    }

    #[test]
    fn source_missing_channel_is_structured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d_Pos001.csv");
        std::fs::write(&path, " ,Area\n1,2\n").unwrap();
        let err = load_source(SourceTag::parse(&path).unwrap(), "A", "Mean", 60.0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BinError>(),
            Some(BinError::MissingChannel { .. })
        ));
    }

    #[test]
    fn csv_table_blank_cells_are_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(&path, "Time (hpf),Control_Mean_d_Pos001\n4.5,1.5\n5.5,\n").unwrap();
        let table = load_table(&path).unwrap();
        let col = table.column("Control_Mean_d_Pos001").unwrap();
        assert_eq!(col[0], 1.5);
        assert!(col[1].is_nan());
    }

    #[test]
    fn json_table_nulls_are_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        std::fs::write(
            &path,
            r#"[{"Time (hpf)": 4.5, "A_x": 1.0}, {"Time (hpf)": 5.5, "A_x": null}]"#,
        )
        .unwrap();
        let table = load_table(&path).unwrap();
        assert_eq!(table.time(), &[4.5, 5.5]);
        assert!(table.column("A_x").unwrap()[1].is_nan());
    }

    #[test]
    fn parquet_table_nulls_are_missing() {
        use arrow::datatypes::{Field, Schema};
        use arrow::record_batch::RecordBatch;
        use parquet::arrow::ArrowWriter;

        let schema = Arc::new(Schema::new(vec![
            Field::new("Time (hpf)", DataType::Float64, false),
            Field::new("A_x", DataType::Float64, true),
            Field::new("B_x", DataType::Int64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Float64Array::from(vec![4.5, 5.5])),
                Arc::new(Float64Array::from(vec![Some(1.0), None])),
                Arc::new(Int64Array::from(vec![None, Some(3)])),
            ],
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.parquet");
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = load_table(&path).unwrap();
        assert_eq!(table.time(), &[4.5, 5.5]);
        assert_eq!(table.headers(), vec!["Time (hpf)", "A_x", "B_x"]);
        assert!(table.column("A_x").unwrap()[1].is_nan());
        assert!(table.column("B_x").unwrap()[0].is_nan());
        assert_eq!(table.column("B_x").unwrap()[1], 3.0);
    }

    #[test]
    fn table_without_time_column_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(&path, "A_x\n1\n").unwrap();
        let err = load_table(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BinError>(),
            Some(BinError::MissingTimeColumn(_))
        ));
    }

    #[test]
    fn curve_skips_non_numeric_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Values_001.csv");
        std::fs::write(&path, "x,y\n0,1\n1,3\n\n2,5\n").unwrap();
        let (x, y) = load_curve(&path).unwrap();
        assert_eq!(x, vec![0.0, 1.0, 2.0]);
        assert_eq!(y, vec![1.0, 3.0, 5.0]);
    }
}
