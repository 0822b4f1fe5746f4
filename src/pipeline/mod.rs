pub mod orchestrator;
pub mod statistics;
pub mod triage;

pub use orchestrator::{PipelineOrchestrator, ResultSink, StageWorkers};
pub use statistics::{Statistics, StatisticsSnapshot};
