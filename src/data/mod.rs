//! Data layer: record schema, loading, filtering and aggregation.
//!
//! Architecture:
//! ```text
//!  .csv / .json / .parquet
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  parse file → RawTable → RecordSet (schema check, dates)
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  filter   │  country / year / month selection → RecordSet
//!   └──────────┘
//!        │
//!        ▼
//!   ┌───────────┐
//!   │ aggregate  │  counts, sums, top-K, cross-tabs, correlations
//!   └───────────┘
//!
//!  Topic_TopWords.csv ──► topics (stopwords, labels, font sizes)
//!  filtered RecordSet ──► export (CSV snapshot)
//! ```

pub mod aggregate;
pub mod error;
pub mod export;
pub mod filter;
pub mod loader;
pub mod model;
pub mod topics;
