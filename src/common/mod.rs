//! Common utilities shared between CLI and server modes

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;
pub mod redact;

pub use config::{Config, Credentials, Environment, Settings};
pub use error::{Error, Result};
