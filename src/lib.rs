//! # econ_pit
//!
//! Point-in-time analytics relating economic indicator series to forward
//! returns of market series.
//!
//! Raw observations are classified by sampling grain, averaged to months and
//! quarters, gap-filled (indicators only), and turned into 1-4 quarter
//! forward returns. Snapshots replay the whole pipeline as of an anchor date
//! using only the history visible at that date, and the correlation analyzer
//! relates indicator changes to the forward returns.
//!
//! ## Example
//!
//! ```rust,no_run
//! use econ_pit::prelude::*;
//!
//! # fn main() -> econ_pit::error::Result<()> {
//! let dataset = Dataset::from_csv_path(std::path::Path::new("observations.csv"))?;
//! let engine = SnapshotEngine::new(AnalyticsConfig::default())?;
//!
//! let anchor = chrono::NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
//! let partitions = engine.compute(&dataset, anchor);
//! let correlations = engine.correlation_snapshot(&dataset, anchor);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod calendar;
pub mod config;
pub mod data;
pub mod diagnostics;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod snapshot;
pub mod storage;
pub mod types;

pub mod prelude {
    //! Commonly used types and traits
    pub use crate::analysis::{CorrelationAnalyzer, CorrelationReport};
    pub use crate::calendar::{month_start_anchors, quarter_end_anchors, YearMonth, YearQuarter};
    pub use crate::config::{AnalyticsConfig, ChangeWindow};
    pub use crate::data::{Dataset, SamplingGrain};
    pub use crate::diagnostics::{ForwardReturnAudit, Severity};
    pub use crate::error::{AnalyticsError, Result};
    pub use crate::pipeline::{BacktestReturns, PipelineEngine, PipelineOutput};
    pub use crate::snapshot::{SnapshotEngine, SnapshotPartition, SnapshotRecord};
    pub use crate::storage::{InMemoryPartitionStore, PartitionStore};
    #[cfg(feature = "rusqlite-support")]
    pub use crate::storage::SqlitePartitionStore;
    pub use crate::types::*;
}
