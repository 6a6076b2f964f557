//! The retrieval pipeline's top crate: Indexer, SearchEngine, and the Facade
//! transports bind to (spec.md §4.3 - §4.6).

pub mod config;
pub mod errors;
pub mod facade;
pub mod indexer;
pub mod search;

pub use config::Config;
pub use errors::{RecallError, RecallResult};
pub use facade::{Facade, IndexDirectoryRequest, SearchRequest};
pub use indexer::Indexer;
pub use search::{HybridOptions, SearchEngine, SearchOptions, SearchResult};
