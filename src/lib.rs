//! Feature.fm API tester
//!
//! An authenticated, retrying HTTP client for the Feature.fm marketing API,
//! a static suite of endpoint tests with a sequential runner, and a small
//! proxy server for the browser dashboard.

pub mod cli;
pub mod client;
pub mod commands;
pub mod common;
pub mod server;
pub mod testing;

// Re-export commonly used types for tests
pub use client::{ApiClient, ExecuteRequest, HttpMethod, Outcome};
pub use common::{Config, Environment, Error, Result};
