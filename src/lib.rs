// src/lib.rs
pub mod config;
pub mod discovery;
pub mod models;
pub mod prober;
pub mod protocol;
pub mod report;
pub mod sources;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use discovery::{ merge_endpoints, DiscoveryEngine };
pub use models::server::{ CycleSummary, Endpoint, PlayerEntry, ServerRecord };
pub use prober::{ ProbeSummary, StatusProber };
pub use report::{ LogReporter, MemoryReporter, Reporter };
pub use utils::DiscoveryError;
