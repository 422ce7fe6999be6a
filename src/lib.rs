pub mod cli;
pub mod config;
pub mod database;
pub mod models;
pub mod services;
pub mod utils;

pub mod env;
pub mod error;
pub mod logging;

pub use error::{RagSessionError, Result};
pub use logging::{init_logging, LogRotation, LoggingConfig};
