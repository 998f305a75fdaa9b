/// Data layer: core types, loading, binning, statistics and export.
///
/// Architecture:
/// ```text
///  2024-01-01_Pos003_X.csv …
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → SourceRecord (hpf times + readings)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  binning  │  open-interval bins → one value per bin
///   └──────────┘
///        │
///        ▼
///   ┌────────────────┐
///   │ AggregateTable  │  Time (hpf) + one column per replicate
///   └────────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  stats    │  per-treatment mean ± SEM
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  export   │  CSV / JSON
///   └──────────┘
/// ```

pub mod binning;
pub mod export;
pub mod loader;
pub mod model;
pub mod stats;
