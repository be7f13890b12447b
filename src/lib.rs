pub mod api;
pub mod blocked_log;
pub mod cache;
pub mod clock;
pub mod config;
pub mod content_analyzer;
pub mod error;
pub mod features;
pub mod notify;
pub mod orchestrator;
pub mod request;
pub mod threat_intel;
pub mod verdict;

pub use config::Config;
pub use error::AssessError;
pub use orchestrator::{Assessment, VerdictOrchestrator};
pub use verdict::{DeepVerdict, FastVerdict, UnifiedVerdict};
