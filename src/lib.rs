//! Time-binned treatment aggregation for embryo fluorescence time series,
//! plus the small helpers that sit next to it in the lab workflow (non-zero
//! pixel tables from 3D stacks, pipette aspiration fits).

pub mod aggregator;
pub mod app;
pub mod cli;
pub mod color;
pub mod config;
pub mod data;
pub mod error;
pub mod pipette;
pub mod pixels;

pub use aggregator::{Aggregator, IngestReport, Outcome, Skip};
pub use data::model::{AggregateTable, BinEdges, TIME_COLUMN, TreatmentIndex, TreatmentMap};
pub use data::stats::{GroupSummary, Statistic};
pub use error::BinError;
