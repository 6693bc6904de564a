//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlTask`: a pending unit of work with its retry counter
//! - `Frontier`: FIFO queue of pending tasks
//! - `VisitedSet`: keys that are done for this run
//! - `CrawlerState`: the three above behind one atomic membership test

mod frontier;
mod task;

// Re-export main types
pub use frontier::{CrawlerState, Frontier, KeyStatus, VisitedSet};
pub use task::CrawlTask;
