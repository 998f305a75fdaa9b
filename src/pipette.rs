//! Micropipette aspiration analysis.
//!
//! A tissue is sucked into a pipette and released; the tongue length over
//! time gives an aspiration slope and a retraction slope. Fitting a line over
//! a chosen span of each phase yields the two slopes, from which viscosity
//! and surface tension follow.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, bail, ensure};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Span selection and line fit
// ---------------------------------------------------------------------------

/// An x-axis interval picked on a curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub start: f64,
    pub end: f64,
}

impl FromStr for Span {
    type Err = anyhow::Error;

    /// `"start:end"`, e.g. `"12.5:40"`.
    fn from_str(s: &str) -> Result<Self> {
        let (a, b) = s
            .split_once(':')
            .with_context(|| format!("span '{s}' should look like start:end"))?;
        let start: f64 = a.trim().parse().with_context(|| format!("bad span start '{a}'"))?;
        let end: f64 = b.trim().parse().with_context(|| format!("bad span end '{b}'"))?;
        ensure!(start < end, "span start {start} must be below end {end}");
        Ok(Span { start, end })
    }
}

/// Least-squares line over the points a span selected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitResult {
    /// First x actually used.
    pub x_start: f64,
    /// x at the clamped upper index (not itself part of the fit).
    pub x_end: f64,
    pub slope: f64,
    pub intercept: f64,
}

/// Index of the first element not below `value` (`x` sorted ascending).
fn insertion_point(x: &[f64], value: f64) -> usize {
    x.partition_point(|v| *v < value)
}

/// Ordinary least squares `y = slope * x + intercept`.
pub fn linear_fit(x: &[f64], y: &[f64]) -> Result<(f64, f64)> {
    ensure!(x.len() == y.len(), "x has {} values but y has {}", x.len(), y.len());
    ensure!(x.len() >= 2, "need at least two points to fit a line, got {}", x.len());
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let sxx: f64 = x.iter().map(|v| (v - mx).powi(2)).sum();
    let sxy: f64 = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum();
    if sxx == 0.0 {
        bail!("all x values are equal; slope is undefined");
    }
    let slope = sxy / sxx;
    Ok((slope, my - slope * mx))
}

/// Holds the most recent fit for one curve phase. Each [`SpanFit::update`]
/// replaces the previous selection.
#[derive(Debug, Clone, Default)]
pub struct SpanFit {
    current: Option<FitResult>,
}

impl SpanFit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit over `x[lo..hi]`, where `lo`/`hi` are the insertion points of the
    /// span bounds and `hi` is clamped to the last index. On error the
    /// previous fit is kept.
    pub fn update(&mut self, x: &[f64], y: &[f64], span: Span) -> Result<FitResult> {
        ensure!(!x.is_empty(), "curve is empty");
        ensure!(x.len() == y.len(), "x has {} values but y has {}", x.len(), y.len());
        let lo = insertion_point(x, span.start);
        let hi = insertion_point(x, span.end).min(x.len() - 1);
        ensure!(
            hi > lo,
            "span {}..{} selects no points",
            span.start,
            span.end
        );
        let (slope, intercept) = linear_fit(&x[lo..hi], &y[lo..hi])
            .with_context(|| format!("fitting span {}..{}", span.start, span.end))?;
        let fit = FitResult {
            x_start: x[lo],
            x_end: x[hi],
            slope,
            intercept,
        };
        self.current = Some(fit);
        Ok(fit)
    }

    pub fn current(&self) -> Option<FitResult> {
        self.current
    }
}

// ---------------------------------------------------------------------------
// Rheology
// ---------------------------------------------------------------------------

/// Pipette radius and applied pressure, in the units of the fitted curves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipetteGeometry {
    pub radius: f64,
    pub pressure: f64,
}

impl Default for PipetteGeometry {
    fn default() -> Self {
        PipetteGeometry {
            radius: 65.0,
            pressure: 70.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rheology {
    pub l_asp: f64,
    pub l_ret: f64,
    /// Viscosity.
    pub eta: f64,
    /// Critical pressure.
    pub pc: f64,
    /// Surface tension.
    pub gamma: f64,
}

impl fmt::Display for Rheology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lasp={:.6} lret={:.6} eta={:.6} Pc={:.6} gamma={:.6}",
            self.l_asp, self.l_ret, self.eta, self.pc, self.gamma
        )
    }
}

impl PipetteGeometry {
    /// Derive viscosity, critical pressure and surface tension from the
    /// aspiration and retraction slopes.
    pub fn rheology(&self, l_asp: f64, l_ret: f64) -> Rheology {
        let eta = self.radius * self.pressure / (2.0 * PI * (l_asp + l_ret.abs()));
        let pc = self.pressure - (3.0 * PI * eta * l_asp) / self.radius;
        let gamma = self.radius * pc / 2.0;
        Rheology {
            l_asp,
            l_ret,
            eta,
            pc,
            gamma,
        }
    }
}

/// One row of a pipette results file.
#[derive(Debug, Serialize)]
pub struct PipetteRow<'a> {
    pub file: &'a str,
    pub lasp: f64,
    pub lret: f64,
    pub eta: f64,
    #[serde(rename = "Pc")]
    pub pc: f64,
    pub gamma: f64,
}

impl<'a> PipetteRow<'a> {
    pub fn new(file: &'a str, r: &Rheology) -> Self {
        PipetteRow {
            file,
            lasp: r.l_asp,
            lret: r.l_ret,
            eta: r.eta,
            pc: r.pc,
            gamma: r.gamma,
        }
    }
}

/// Append a row to `path`, writing the header only when the file is new.
pub fn append_result(path: &std::path::Path, row: &PipetteRow<'_>) -> Result<()> {
    let exists = path.exists() && std::fs::metadata(path)?.len() > 0;
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(!exists)
        .from_writer(file);
    writer.serialize(row)?;
    writer.flush()?;
    Ok(())
}
