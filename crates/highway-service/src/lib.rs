// One-object facade over the session core, the highway coordinate models and
// the performance results

pub mod config;
pub mod feedback;
pub mod service;

pub use config::HighwayConfig;
pub use feedback::{ChannelSummary, FeedbackCollector, PerformanceSummary};
pub use service::NoteHighwayService;
