use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::color::TreatmentColors;
use crate::data::model::{BinEdges, TreatmentMap};
use crate::data::stats::{ReducerKind, Statistic};
use crate::error::BinError;

/// Evenly spaced bins, `end` inclusive when it lands on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinRange {
    pub start: f64,
    pub end: f64,
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentConfig {
    pub name: String,
    #[serde(default)]
    pub positions: Vec<u32>,
}

/// One binning run, read from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "RunConfig::default_output_dir")]
    pub output_dir: PathBuf,
    /// Seconds between consecutive samples.
    pub timeframe_s: f64,
    /// Input column that gets binned.
    #[serde(default = "RunConfig::default_channel")]
    pub channel: String,
    #[serde(default = "RunConfig::default_reducer")]
    pub reducer: String,
    /// Overrides the label that goes into column names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin_edges: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin_range: Option<BinRange>,
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default, rename = "treatment")]
    pub treatments: Vec<TreatmentConfig>,
    /// Treatment → `#rrggbb` for the summary output.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub colors: BTreeMap<String, String>,
}

impl RunConfig {
    fn default_output_dir() -> PathBuf {
        PathBuf::from("results")
    }

    fn default_channel() -> String {
        "Mean".to_string()
    }

    fn default_reducer() -> String {
        "mean".to_string()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let cfg: RunConfig = toml::from_str(text)?;
        Ok(cfg)
    }

    /// A filled-in example, used by `hpf-binner init`.
    pub fn template() -> Self {
        RunConfig {
            output_dir: Self::default_output_dir(),
            timeframe_s: 300.0,
            channel: Self::default_channel(),
            reducer: Self::default_reducer(),
            label: None,
            bin_edges: None,
            bin_range: Some(BinRange {
                start: 4.0,
                end: 10.0,
                width: 0.5,
            }),
            files: Vec::new(),
            treatments: vec![
                TreatmentConfig {
                    name: "Control".to_string(),
                    positions: vec![3, 5],
                },
                TreatmentConfig {
                    name: "K4K8MO".to_string(),
                    positions: vec![6, 7, 9],
                },
            ],
            colors: BTreeMap::from([
                ("Control".to_string(), "#83bb03".to_string()),
                ("K4K8MO".to_string(), "#ff7f00".to_string()),
            ]),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).context("serializing config")?;
        fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn edges(&self) -> Result<BinEdges> {
        match (&self.bin_edges, &self.bin_range) {
            (Some(edges), None) => Ok(BinEdges::new(edges.clone())?),
            (None, Some(r)) => Ok(BinEdges::from_range(r.start, r.end, r.width)?),
            (Some(_), Some(_)) => bail!("set either bin_edges or bin_range, not both"),
            (None, None) => bail!("one of bin_edges or bin_range is required"),
        }
    }

    pub fn treatment_map(&self) -> Result<TreatmentMap, BinError> {
        TreatmentMap::new(
            self.treatments
                .iter()
                .map(|t| (t.name.clone(), t.positions.iter().copied())),
        )
    }

    pub fn statistic(&self) -> Result<Statistic> {
        let kind: ReducerKind = self.reducer.parse()?;
        Ok(match &self.label {
            Some(label) => Statistic::new(label.clone(), &self.channel, kind.reducer()),
            None => Statistic::for_channel(&self.channel, kind),
        })
    }

    pub fn colors(&self) -> TreatmentColors {
        let mut colors = TreatmentColors::new(self.treatments.iter().map(|t| t.name.clone()));
        for (name, hex) in &self.colors {
            colors.set(name, hex);
        }
        colors
    }
}
