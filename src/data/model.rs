use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::BinError;

/// Header of the leading bin-center column in every aggregate table.
pub const TIME_COLUMN: &str = "Time (hpf)";

// ---------------------------------------------------------------------------
// TreatmentMap – treatment name → embryo positions
// ---------------------------------------------------------------------------

/// Ordered treatment → position-set mapping.
///
/// Position sets are disjoint; [`TreatmentMap::new`] rejects a position that
/// appears under two different treatments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreatmentMap {
    groups: Vec<(String, BTreeSet<u32>)>,
}

impl TreatmentMap {
    /// Build a map from `(name, positions)` pairs, keeping their order.
    /// Repeated names are merged into the first entry of that name.
    pub fn new<I, S, P>(groups: I) -> Result<Self, BinError>
    where
        I: IntoIterator<Item = (S, P)>,
        S: Into<String>,
        P: IntoIterator<Item = u32>,
    {
        let mut map = TreatmentMap::default();
        for (name, positions) in groups {
            let name = name.into();
            for position in positions {
                if let Some(owner) = map.lookup(position) {
                    if owner != name {
                        return Err(BinError::OverlappingPosition {
                            position,
                            first: owner.to_string(),
                            second: name,
                        });
                    }
                }
                map.entry(&name).insert(position);
            }
            // Register treatments with no positions too, so they show up
            // (empty) in the treatment index.
            map.entry(&name);
        }
        Ok(map)
    }

    fn entry(&mut self, name: &str) -> &mut BTreeSet<u32> {
        let idx = match self.groups.iter().position(|(n, _)| n == name) {
            Some(i) => i,
            None => {
                self.groups.push((name.to_string(), BTreeSet::new()));
                self.groups.len() - 1
            }
        };
        &mut self.groups[idx].1
    }

    /// First treatment (in insertion order) whose set contains `position`.
    pub fn lookup(&self, position: u32) -> Option<&str> {
        self.groups
            .iter()
            .find(|(_, set)| set.contains(&position))
            .map(|(name, _)| name.as_str())
    }

    /// Treatment names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(name, _)| name.as_str())
    }

    pub fn positions(&self, treatment: &str) -> Option<&BTreeSet<u32>> {
        self.groups
            .iter()
            .find(|(name, _)| name == treatment)
            .map(|(_, set)| set)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

// ---------------------------------------------------------------------------
// BinEdges – validated, strictly increasing edges
// ---------------------------------------------------------------------------

/// Upper bound on the number of bins a range may expand to.
pub const MAX_BINS: usize = 1_000_000;

/// N+1 strictly increasing edges describing N time bins (hours post
/// fertilization).
#[derive(Debug, Clone, PartialEq)]
pub struct BinEdges(Vec<f64>);

impl BinEdges {
    pub fn new(edges: Vec<f64>) -> Result<Self, BinError> {
        if edges.len() < 2 {
            return Err(BinError::TooFewEdges(edges.len()));
        }
        if let Some(index) = edges.iter().position(|e| !e.is_finite()) {
            return Err(BinError::NonFiniteEdge { index });
        }
        for (i, pair) in edges.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(BinError::NonIncreasingEdges {
                    index: i + 1,
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }
        Ok(BinEdges(edges))
    }

    /// Evenly spaced edges `start, start + width, …` up to `end`.
    /// `end` itself is included when it falls on the grid.
    pub fn from_range(start: f64, end: f64, width: f64) -> Result<Self, BinError> {
        if !(width.is_finite() && width > 0.0) {
            return Err(BinError::InvalidBinWidth(width));
        }
        if !(start.is_finite() && end.is_finite()) {
            return Err(BinError::NonFiniteEdge { index: 0 });
        }
        // Small tolerance so 4.0..10.0 step 0.5 keeps the final 10.0 edge.
        let steps = ((end - start) / width + 1e-9).floor();
        if !steps.is_finite() || steps > MAX_BINS as f64 {
            return Err(BinError::TooManyBins(steps));
        }
        let steps = if steps < 0.0 { 0 } else { steps as usize };
        let edges = (0..=steps).map(|i| start + i as f64 * width).collect();
        Self::new(edges)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of bins (one less than the number of edges).
    pub fn n_bins(&self) -> usize {
        self.0.len() - 1
    }

    /// `(lower, upper)` pairs in order.
    pub fn bins(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.0.windows(2).map(|w| (w[0], w[1]))
    }

    /// Midpoint of every bin.
    pub fn centers(&self) -> Vec<f64> {
        self.bins().map(|(lo, hi)| 0.5 * (hi + lo)).collect()
    }
}

// ---------------------------------------------------------------------------
// SourceTag – metadata encoded in an intensity file's path
// ---------------------------------------------------------------------------

/// Date and stage position parsed from a path such as
/// `data/2024-01-01_Pos003_X.csv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTag {
    pub path: PathBuf,
    /// File-name segment before the first underscore.
    pub date: String,
    /// Exactly the three characters following `Pos`, e.g. `"003"`.
    pub position_token: String,
    pub position: u32,
}

impl SourceTag {
    pub fn parse(path: &Path) -> Result<Self, BinError> {
        let full = path.to_string_lossy();
        let start = full
            .find("Pos")
            .ok_or_else(|| BinError::MissingPosMarker(path.to_path_buf()))?;
        let token: String = full[start + 3..].chars().take(3).collect();
        if token.len() != 3 || !token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(BinError::BadPositionToken {
                path: path.to_path_buf(),
                token,
            });
        }
        // Three ASCII digits always fit.
        let position: u32 = token.parse().map_err(|_| BinError::BadPositionToken {
            path: path.to_path_buf(),
            token: token.clone(),
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let date = match file_name.split_once('_') {
            Some((date, _)) if !date.is_empty() => date.to_string(),
            _ => return Err(BinError::MissingDateToken(path.to_path_buf())),
        };

        Ok(SourceTag {
            path: path.to_path_buf(),
            date,
            position_token: token,
            position,
        })
    }

    /// `"{date}_Pos{token}"`, the replicate label used in column names.
    pub fn label(&self) -> String {
        format!("{}_Pos{}", self.date, self.position_token)
    }
}

// ---------------------------------------------------------------------------
// SourceRecord – one experiment file, loaded and time-transformed
// ---------------------------------------------------------------------------

/// A single replicate's readings, held only while it is being binned.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub tag: SourceTag,
    pub treatment: String,
    /// Elapsed time in hours post fertilization, one per row.
    pub times: Vec<f64>,
    /// Channel readings, same length as `times`.
    pub readings: Vec<f64>,
}

/// Fixed row-index → hpf transform: imaging starts 4 h post fertilization.
pub fn elapsed_hours(index: f64, timeframe_s: f64) -> f64 {
    (index - 1.0) * timeframe_s / 60.0 / 60.0 + 4.0
}

// ---------------------------------------------------------------------------
// AggregateTable – bin centers plus one column per replicate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    /// One value per bin; `NaN` marks an empty bin.
    pub values: Vec<f64>,
}

/// Wide table: leading [`TIME_COLUMN`] followed by named value columns.
#[derive(Debug, Clone)]
pub struct AggregateTable {
    time: Vec<f64>,
    columns: Vec<Column>,
}

impl AggregateTable {
    /// Empty table seeded with bin-center times.
    pub fn new(time: Vec<f64>) -> Self {
        AggregateTable {
            time,
            columns: Vec::new(),
        }
    }

    /// Build from arbitrary named columns; [`TIME_COLUMN`] must be among them
    /// and is moved to the front. Later duplicates of a name are dropped.
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Result<Self, BinError> {
        let time_idx = columns
            .iter()
            .position(|(name, _)| name == TIME_COLUMN)
            .ok_or_else(|| BinError::MissingTimeColumn(TIME_COLUMN.to_string()))?;
        let expected = columns[time_idx].1.len();
        if let Some((name, values)) = columns.iter().find(|(_, v)| v.len() != expected) {
            return Err(BinError::RaggedColumn {
                name: name.clone(),
                len: values.len(),
                expected,
            });
        }

        let mut columns = columns;
        let (_, time) = columns.remove(time_idx);
        let mut table = AggregateTable::new(time);
        for (name, values) in columns {
            if !table.insert(name.clone(), values)? {
                log::warn!("Duplicate column {name} in imported table. Keeping the first.");
            }
        }
        Ok(table)
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn n_rows(&self) -> usize {
        self.time.len()
    }

    /// Number of value columns (excluding the time column).
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        name == TIME_COLUMN || self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        if name == TIME_COLUMN {
            return Some(&self.time);
        }
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// All headers, time column first.
    pub fn headers(&self) -> Vec<&str> {
        std::iter::once(TIME_COLUMN)
            .chain(self.columns.iter().map(|c| c.name.as_str()))
            .collect()
    }

    /// Append a column. Returns `Ok(false)` without touching the table when
    /// the name is already present.
    pub fn insert(&mut self, name: String, values: Vec<f64>) -> Result<bool, BinError> {
        if values.len() != self.time.len() {
            return Err(BinError::RaggedColumn {
                name,
                len: values.len(),
                expected: self.time.len(),
            });
        }
        if self.contains(&name) {
            return Ok(false);
        }
        self.columns.push(Column { name, values });
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// TreatmentIndex – treatment → table columns
// ---------------------------------------------------------------------------

/// Which aggregate-table columns belong to which treatment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreatmentIndex {
    entries: Vec<(String, Vec<String>)>,
}

impl TreatmentIndex {
    /// One empty entry per treatment.
    pub fn new(map: &TreatmentMap) -> Self {
        TreatmentIndex {
            entries: map.names().map(|n| (n.to_string(), Vec::new())).collect(),
        }
    }

    /// Rebuild from column names: a column belongs to the treatment whose
    /// `"{name}_"` prefix it carries. The longest matching prefix wins, so
    /// `Control_K4_…` goes to `Control_K4` rather than `Control`.
    pub fn from_prefixes(map: &TreatmentMap, table: &AggregateTable) -> Self {
        let mut index = TreatmentIndex::new(map);
        for column in table.columns() {
            let owner = map
                .names()
                .filter(|t| {
                    column
                        .name
                        .strip_prefix(t)
                        .is_some_and(|rest| rest.starts_with('_'))
                })
                .max_by_key(|t| t.len());
            match owner {
                Some(t) => {
                    let t = t.to_string();
                    index.push(&t, column.name.clone());
                }
                None => log::debug!("Column {} matches no treatment prefix", column.name),
            }
        }
        index
    }

    pub fn push(&mut self, treatment: &str, column: String) {
        match self.entries.iter_mut().find(|(t, _)| t == treatment) {
            Some((_, cols)) => cols.push(column),
            None => self.entries.push((treatment.to_string(), vec![column])),
        }
    }

    pub fn columns(&self, treatment: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(t, _)| t == treatment)
            .map(|(_, cols)| cols.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(t, cols)| (t.as_str(), cols.as_slice()))
    }
}
