//! Integration tests for Stay-Harvest
//!
//! These tests use wiremock to stand in for the upstream site and drive
//! the fetch, bootstrap and batch paths end-to-end.

mod common;
mod fetch_tests;
mod harvest_tests;
