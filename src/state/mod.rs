//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlSession`: the run-scoped shared state (visited set, error log,
//!   registered datasets, page counter), each part behind its own lock
//! - `PolitenessGate`: spaces outbound requests by a minimum interval

mod politeness;
mod session;

pub use politeness::PolitenessGate;
pub use session::{CrawlSession, ErrorEntry};
