//! Filesystem side of the bridge: pattern expansion, discovery sessions and compression.

pub mod compression;
pub mod discovery;
pub mod glob;

pub use compression::Compression;
pub use discovery::{CancelToken, FileDiscovery, PollSettings, PollingDiscovery};
pub use glob::{MatchedFile, expand_pattern, validate_pattern};
