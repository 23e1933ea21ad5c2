//! Configuration validation.
//!
//! Runs once at startup; any error here is fatal.

use thiserror::Error;

use crate::config::{
    AppConfig, ClientConfig, NotifierConfig, ObservabilityConfig, ScheduleConfig, ScreenerConfig,
    MAX_DELAY_SECS,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
}

fn check_url(field: String, value: &str) -> ValidationResult<()> {
    match url::Url::parse(value) {
        Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Ok(()),
        Ok(u) => Err(invalid(field, format!("unsupported scheme '{}'", u.scheme()))),
        Err(e) => Err(invalid(field, e.to_string())),
    }
}

fn collapse(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(invalid(
                "observability.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(invalid(
                "observability.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        Ok(())
    }
}

impl Validate for ScheduleConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if !self.delay_min_secs.is_finite() || self.delay_min_secs < 0.0 {
            errors.push(invalid(
                "schedule.delay_min_secs",
                "must be a non-negative number",
            ));
        }
        if !self.delay_max_secs.is_finite() || self.delay_max_secs < self.delay_min_secs {
            errors.push(invalid(
                "schedule.delay_max_secs",
                "must be a number no smaller than delay_min_secs",
            ));
        } else if self.delay_max_secs > MAX_DELAY_SECS {
            errors.push(invalid(
                "schedule.delay_max_secs",
                format!("must be at most {} seconds", MAX_DELAY_SECS),
            ));
        }

        match (self.session_start_time(), self.session_end_time()) {
            (Some(start), Some(end)) if start > end => {
                errors.push(invalid("schedule.session_start", "must not be after session_end"));
            }
            (None, _) => errors.push(invalid("schedule.session_start", "expected HH:MM[:SS]")),
            (_, None) => errors.push(invalid("schedule.session_end", "expected HH:MM[:SS]")),
            _ => {}
        }

        if self.timezone().is_none() {
            errors.push(invalid(
                "schedule.utc_offset_minutes",
                "must be within ±24 hours",
            ));
        }

        collapse(errors)
    }
}

impl Validate for ScreenerConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = check_url("screener.process_url".into(), &self.process_url) {
            errors.push(e);
        }
        if self.max_results == 0 {
            errors.push(invalid("screener.max_results", "must be at least 1"));
        }
        if self.timeout_secs == 0 {
            errors.push(invalid("screener.timeout_secs", "must be at least 1"));
        }
        for (field, value) in [
            ("screener.price_field", &self.price_field),
            ("screener.symbol_field", &self.symbol_field),
        ] {
            if value.trim().is_empty() {
                errors.push(ValidationError::MissingField {
                    field: field.to_string(),
                });
            }
        }

        collapse(errors)
    }
}

impl Validate for NotifierConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = check_url("notifier.api_base".into(), &self.api_base) {
            errors.push(e);
        }
        if self.timeout_secs == 0 {
            errors.push(invalid("notifier.timeout_secs", "must be at least 1"));
        }

        collapse(errors)
    }
}

impl Validate for ClientConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        let prefix = format!("clients.{}", self.name);

        if self.name.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "clients.<name>".to_string(),
            });
        }
        for (key, value) in [
            ("BOT_TOKEN", &self.bot_token),
            ("CHAT_ID", &self.chat_id),
            ("PAYLOAD", &self.payload),
        ] {
            if value.trim().is_empty() {
                errors.push(ValidationError::MissingField {
                    field: format!("{}.{}", prefix, key),
                });
            }
        }
        if let Err(e) = check_url(format!("{}.SCANNER_URL", prefix), &self.scanner_url) {
            errors.push(e);
        }

        collapse(errors)
    }
}

impl AppConfig {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }
        if let Err(e) = self.schedule.validate() {
            errors.push(e);
        }
        if let Err(e) = self.screener.validate() {
            errors.push(e);
        }
        if let Err(e) = self.notifier.validate() {
            errors.push(e);
        }
        for client in &self.clients.0 {
            if let Err(e) = client.validate() {
                errors.push(e);
            }
        }

        collapse(errors)
    }
}
