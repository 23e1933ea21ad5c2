//! Screener client.
//!
//! Turns a client's scan clause into a ranked, bounded list of symbols.
//!
//! # Flow
//!
//! ```text
//! GET scanner page ──▶ csrf-token meta ──▶ POST scan_clause ──▶ JSON { data: [...] }
//!                                                                      │
//!                           ScanResult ◀── truncate ◀── strip sr ◀── sort by close
//! ```
//!
//! Implementations never fail past the [`Screener`] boundary. Every problem
//! collapses into a [`ScanOutcome`] that is either empty or failed, and is
//! logged where it happens.

pub mod chartink;
pub mod table;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use chartink::{extract_csrf_token, ChartinkScreener};
pub use table::{rank_rows, TableShape};

/// A client's query definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanQuery {
    /// Page that carries the anti-forgery token
    pub scanner_url: String,
    /// Opaque scan clause
    pub payload: String,
}

/// One matching security.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRow {
    pub symbol: String,
    /// Sort key
    pub close: f64,
    /// Remaining upstream columns, ordinal column removed
    pub fields: Map<String, Value>,
}

/// Ranked rows for one client in one cycle.
///
/// Sorted ascending by `close` and bounded by the configured maximum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanResult {
    rows: Vec<ScanRow>,
    matched: usize,
}

impl ScanResult {
    pub(crate) fn from_ranked(rows: Vec<ScanRow>, matched: usize) -> Self {
        Self { rows, matched }
    }

    /// Rows upstream returned, before truncation.
    pub fn matched(&self) -> usize {
        self.matched
    }

    pub fn rows(&self) -> &[ScanRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Symbols in ranked order.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.symbol.as_str())
    }
}

/// Why a fetch produced nothing usable.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScreenerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("{stage} returned HTTP {status}")]
    Http { stage: &'static str, status: u16 },

    #[error("anti-forgery token not found in scanner page")]
    MissingToken,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("required column '{field}' missing")]
    MissingField { field: String },
}

/// Result of one screener fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// At least one ranked row
    Rows(ScanResult),
    /// Upstream answered but matched nothing
    Empty { reason: String },
    /// Transport, protocol, or data-contract failure
    Failed(ScreenerError),
}

impl ScanOutcome {
    /// Collapse to a result; empty unless `Rows`.
    pub fn into_result(self) -> ScanResult {
        match self {
            Self::Rows(result) => result,
            Self::Empty { .. } | Self::Failed(_) => ScanResult::default(),
        }
    }

    pub fn is_rows(&self) -> bool {
        matches!(self, Self::Rows(_))
    }
}

/// Fetches ranked symbols for a query.
#[async_trait]
pub trait Screener: Send + Sync {
    /// Never panics and never errors; see [`ScanOutcome`].
    async fn fetch_ranked_symbols(&self, query: &ScanQuery) -> ScanOutcome;
}
