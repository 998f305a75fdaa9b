use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::color::TreatmentColors;
use crate::data::binning::bin_series;
use crate::data::export::{
    SUMMARY_CSV_FILE, SUMMARY_JSON_FILE, TABLE_FILE, write_summary_csv, write_summary_json,
    write_table_csv,
};
use crate::data::loader::{load_source, load_table};
use crate::data::model::{
    AggregateTable, BinEdges, SourceRecord, SourceTag, TreatmentIndex, TreatmentMap,
};
use crate::data::stats::{GroupSummary, Statistic, group_summaries};
use crate::error::BinError;

// ---------------------------------------------------------------------------
// Per-file diagnostics
// ---------------------------------------------------------------------------

/// A file that was left out of the table; the run itself carried on.
#[derive(Debug, Clone, PartialEq)]
pub enum Skip {
    /// The file's position code is in no treatment.
    UnknownPosition { path: PathBuf, position: u32 },
    /// The derived column name was already in the table.
    DuplicateColumn { path: PathBuf, column: String },
}

/// Result of folding a single record into the table.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Added(String),
    Skipped(Skip),
}

/// Outcome of one [`Aggregator::process`] run.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Columns added, in input order.
    pub added: Vec<String>,
    pub skipped: Vec<Skip>,
    /// Where the table was written.
    pub table_path: PathBuf,
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Bins intensity files by treatment and time window into one wide table.
pub struct Aggregator {
    files: Vec<PathBuf>,
    edges: BinEdges,
    output_dir: PathBuf,
    treatments: TreatmentMap,
    timeframe_s: f64,

    table: AggregateTable,
    index: TreatmentIndex,
}

impl Aggregator {
    /// Validates the edges and timeframe before anything else; no file is
    /// touched here.
    pub fn new(
        files: Vec<PathBuf>,
        bin_edges: Vec<f64>,
        output_dir: impl Into<PathBuf>,
        treatments: TreatmentMap,
        timeframe_s: f64,
    ) -> Result<Self, BinError> {
        let edges = BinEdges::new(bin_edges)?;
        Self::with_edges(files, edges, output_dir, treatments, timeframe_s)
    }

    pub fn with_edges(
        files: Vec<PathBuf>,
        edges: BinEdges,
        output_dir: impl Into<PathBuf>,
        treatments: TreatmentMap,
        timeframe_s: f64,
    ) -> Result<Self, BinError> {
        if !(timeframe_s.is_finite() && timeframe_s > 0.0) {
            return Err(BinError::InvalidTimeframe(timeframe_s));
        }
        let table = AggregateTable::new(edges.centers());
        let index = TreatmentIndex::new(&treatments);
        Ok(Aggregator {
            files,
            edges,
            output_dir: output_dir.into(),
            treatments,
            timeframe_s,
            table,
            index,
        })
    }

    pub fn table(&self) -> &AggregateTable {
        &self.table
    }

    pub fn index(&self) -> &TreatmentIndex {
        &self.index
    }

    pub fn treatments(&self) -> &TreatmentMap {
        &self.treatments
    }

    pub fn edges(&self) -> &BinEdges {
        &self.edges
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Treatment owning `position`, if any.
    pub fn lookup(&self, position: u32) -> Option<&str> {
        self.treatments.lookup(position)
    }

    /// Ingest every file in input order, then write the table to
    /// `binned_intensity_data.csv` in the output directory.
    ///
    /// A malformed file name aborts before any file is opened. Unknown
    /// positions and duplicate columns are logged and skipped.
    pub fn process(&mut self, stat: &Statistic) -> Result<(&AggregateTable, IngestReport)> {
        let tags = self
            .files
            .iter()
            .map(|f| SourceTag::parse(f))
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = IngestReport::default();
        for tag in tags {
            let Some(treatment) = self.treatments.lookup(tag.position).map(str::to_string) else {
                log::warn!(
                    "Treatment not found for position {} in file {}. Skipping.",
                    tag.position,
                    tag.path.display()
                );
                report.skipped.push(Skip::UnknownPosition {
                    path: tag.path,
                    position: tag.position,
                });
                continue;
            };

            let record = load_source(tag, &treatment, stat.source(), self.timeframe_s)?;
            match self.ingest(&record, stat)? {
                Outcome::Added(column) => report.added.push(column),
                Outcome::Skipped(skip) => report.skipped.push(skip),
            }
        }

        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("creating {}", self.output_dir.display()))?;
        report.table_path = self.output_dir.join(TABLE_FILE);
        write_table_csv(&self.table, &report.table_path)?;
        log::info!(
            "Binned {} file(s) into {} ({} skipped)",
            report.added.len(),
            report.table_path.display(),
            report.skipped.len()
        );
        Ok((&self.table, report))
    }

    /// Fold one loaded record into the table.
    pub fn ingest(&mut self, record: &SourceRecord, stat: &Statistic) -> Result<Outcome, BinError> {
        let column = format!("{}_{}_{}", record.treatment, stat.label(), record.tag.label());
        let values = bin_series(&record.times, &record.readings, &self.edges, stat);
        if !self.table.insert(column.clone(), values)? {
            log::warn!("Column {column} already exists in binned intensity data. Skipping.");
            return Ok(Outcome::Skipped(Skip::DuplicateColumn {
                path: record.tag.path.clone(),
                column,
            }));
        }
        log::debug!("Added column {column}");
        self.index.push(&record.treatment, column.clone());
        Ok(Outcome::Added(column))
    }

    /// Replace the table with a pre-built one and rebuild the treatment index
    /// from column-name prefixes. On error nothing changes.
    pub fn import(&mut self, columns: Vec<(String, Vec<f64>)>) -> Result<(), BinError> {
        let table = AggregateTable::from_columns(columns)?;
        self.import_table(table);
        Ok(())
    }

    /// Like [`Aggregator::import`], reading the table from disk.
    pub fn import_file(&mut self, path: &Path) -> Result<()> {
        let table = load_table(path)?;
        self.import_table(table);
        Ok(())
    }

    fn import_table(&mut self, table: AggregateTable) {
        if table.n_rows() != self.edges.n_bins() {
            log::debug!(
                "Imported table has {} rows, bin edges describe {}",
                table.n_rows(),
                self.edges.n_bins()
            );
        }
        self.index = TreatmentIndex::from_prefixes(&self.treatments, &table);
        self.table = table;
    }

    /// Mean ± SEM per treatment across its replicate columns.
    pub fn summaries(&self) -> Vec<GroupSummary> {
        group_summaries(&self.table, &self.index)
    }

    /// Write the summary CSV and JSON next to the table. Returns their paths.
    pub fn write_summaries(&self, colors: &TreatmentColors) -> Result<(PathBuf, PathBuf)> {
        let groups = self.summaries();
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("creating {}", self.output_dir.display()))?;
        let csv_path = self.output_dir.join(SUMMARY_CSV_FILE);
        let json_path = self.output_dir.join(SUMMARY_JSON_FILE);
        write_summary_csv(self.table.time(), &groups, &csv_path)?;
        write_summary_json(self.table.time(), &groups, colors, &json_path)?;
        log::info!("Wrote summaries for {} treatment(s)", groups.len());
        Ok((csv_path, json_path))
    }
}
