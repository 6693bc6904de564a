//! Output module: where captured pages go
//!
//! This module handles:
//! - The [`OutputSink`] seam the crawler writes snapshots through
//! - A directory sink with categorised file names and an `index.html`
//! - An in-memory sink for embedding and tests
//! - Printing crawl statistics

mod directory;
mod index;
pub mod stats;
mod traits;

pub use directory::{relative_path_for, DirectorySink};
pub use index::format_index;
pub use stats::{failures_by_kind, print_statistics};
pub use traits::{MemorySink, OutputError, OutputResult, OutputSink, StoredPage};
