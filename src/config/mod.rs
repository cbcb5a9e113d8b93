//! Configuration module
//!
//! Loading and validation of `Memoria` configuration files: device and
//! predictor endpoints, phase timings, scoring rules and messages.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLoader, LoadResult, LoadWarning, LoaderOptions};
pub use schema::*;
pub use validation::{ValidationResult, Validator};
