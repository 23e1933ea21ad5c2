//! scanwatch-common - Shared configuration, errors, and logging for scanwatch.
//!
//! This crate provides:
//! - Configuration types and loading (file + environment overrides)
//! - Configuration validation
//! - Startup error type
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    AppConfig, ClientConfig, ClientsConfig, ConfigSource, NotifierConfig, ObservabilityConfig,
    ScheduleConfig, ScreenerConfig,
};
pub use error::{Error, Result, ResultExt};
pub use validation::{Validate, ValidationError, ValidationResult};
