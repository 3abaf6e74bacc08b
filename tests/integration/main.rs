//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl cycle end-to-end: fetch, extract, classify, download, register.

mod common;
mod crawl_tests;
mod gateway_tests;
