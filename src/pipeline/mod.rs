//! Pipeline system: per-entity aggregation, returns and statistics

pub mod classifiers;
pub mod engine;
pub mod factors_returns;
pub mod factors_statistical;

pub use classifiers::Quantiles;
pub use engine::{EntityOutput, ExcludedEntity, MonthRow, PipelineEngine, PipelineOutput};
pub use factors_returns::{
    BacktestReturns, EconomicChange, EconomicChangeCalculator, ForwardReturnCalculator,
    ForwardReturnRecord, ForwardReturnTable, QuarterForwardReturns, RealizedReturn,
    RealizedReturnCalculator, WindowDelta,
};
pub use factors_statistical::{mean, pearson};
