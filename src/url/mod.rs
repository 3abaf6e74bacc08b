//! URL handling module for Dataset-Harvester
//!
//! This module provides URL canonicalization (the dedup key used by the
//! visited set and link extractor) and domain comparison.

mod domain;
mod normalize;

pub use domain::{extract_domain, same_domain};
pub use normalize::{normalize_parsed, normalize_url, NormalizedUrl};
