//! # Hourglass Config
//!
//! TOML configuration for the hourglass scheduler: loop timing, worker
//! pool sizing, store backend, logging, and jobs declared up front.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
