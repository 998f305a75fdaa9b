use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::aggregator::{Aggregator, IngestReport};
use crate::cli::{Cli, Command};
use crate::config::RunConfig;
use crate::data::loader::load_curve;
use crate::pipette::{PipetteGeometry, PipetteRow, Rheology, Span, SpanFit, append_result};
use crate::pixels::{PixelStack, write_pixels_csv};

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Bin {
            config,
            output,
            inputs,
        } => {
            let mut cfg = RunConfig::load(&config)?;
            if let Some(dir) = output {
                cfg.output_dir = dir;
            }
            if !inputs.is_empty() {
                cfg.files = inputs;
            }
            run_bin(&cfg).map(|_| ())
        }
        Command::Summarize {
            config,
            output,
            table,
        } => {
            let mut cfg = RunConfig::load(&config)?;
            if let Some(dir) = output {
                cfg.output_dir = dir;
            }
            run_summarize(&cfg, &table)
        }
        Command::Pixels {
            stack,
            output,
            pixel_size,
            interval,
        } => run_pixels(&stack, &output, pixel_size, interval),
        Command::Pipette {
            curve,
            aspiration,
            retraction,
            radius,
            pressure,
            output,
        } => {
            let geometry = PipetteGeometry { radius, pressure };
            let r = run_pipette(&curve, aspiration, retraction, geometry)?;
            println!("{}: {r}", curve.display());
            if let Some(out) = output {
                let name = curve.to_string_lossy();
                append_result(&out, &PipetteRow::new(&name, &r))?;
            }
            Ok(())
        }
        Command::Init { path } => {
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            RunConfig::template().write(&path)?;
            log::info!("Wrote example configuration to {}", path.display());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Binning
// ---------------------------------------------------------------------------

/// Expand directories into their `.csv` files (sorted); plain files pass
/// through. Tables this tool wrote itself are left out.
pub fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }
        let mut found: Vec<PathBuf> = std::fs::read_dir(input)
            .with_context(|| format!("listing {}", input.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension().is_some_and(|e| e.eq_ignore_ascii_case("csv"))
                    && !p
                        .file_name()
                        .is_some_and(|n| n.to_string_lossy().starts_with("binned_intensity_"))
            })
            .collect();
        found.sort();
        log::debug!("{}: {} csv file(s)", input.display(), found.len());
        files.extend(found);
    }
    Ok(files)
}

pub fn run_bin(cfg: &RunConfig) -> Result<IngestReport> {
    let files = collect_inputs(&cfg.files)?;
    if files.is_empty() {
        bail!("no input files given");
    }
    let stat = cfg.statistic()?;
    let mut aggregator = Aggregator::with_edges(
        files,
        cfg.edges()?,
        &cfg.output_dir,
        cfg.treatment_map()?,
        cfg.timeframe_s,
    )?;

    let (_, report) = aggregator.process(&stat)?;
    for skip in &report.skipped {
        log::debug!("skipped: {skip:?}");
    }
    aggregator.write_summaries(&cfg.colors())?;
    Ok(report)
}

pub fn run_summarize(cfg: &RunConfig, table: &Path) -> Result<()> {
    let mut aggregator = Aggregator::with_edges(
        Vec::new(),
        cfg.edges()?,
        &cfg.output_dir,
        cfg.treatment_map()?,
        cfg.timeframe_s,
    )?;
    aggregator.import_file(table)?;
    for (treatment, cols) in aggregator.index().iter() {
        log::info!("{treatment}: {} column(s)", cols.len());
    }
    aggregator.write_summaries(&cfg.colors())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Pixels and pipette curves
// ---------------------------------------------------------------------------

pub fn run_pixels(
    stack: &Path,
    output: &Path,
    pixel_size: Option<f64>,
    interval: Option<f64>,
) -> Result<()> {
    let stack = PixelStack::open(stack)?.with_calibration(pixel_size, interval);
    let records = stack.nonzero_pixels();
    write_pixels_csv(&records, output)?;
    log::info!("Wrote {} non-zero pixel(s) to {}", records.len(), output.display());
    Ok(())
}

pub fn run_pipette(
    curve: &Path,
    aspiration: Span,
    retraction: Span,
    geometry: PipetteGeometry,
) -> Result<Rheology> {
    let (x, y) = load_curve(curve)?;
    let mut asp = SpanFit::new();
    let mut ret = SpanFit::new();
    let a = asp.update(&x, &y, aspiration).context("aspiration span")?;
    let r = ret.update(&x, &y, retraction).context("retraction span")?;
    log::debug!("aspiration fit {a:?}, retraction fit {r:?}");
    Ok(geometry.rheology(a.slope, r.slope))
}
