//! Shaping of the screener's tabular response.

use serde_json::{Map, Value};

use scanwatch_common::config::ScreenerConfig;

use super::{ScanOutcome, ScanResult, ScanRow, ScreenerError};

/// Column names and bounds used to rank a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableShape {
    pub price_field: String,
    pub symbol_field: String,
    pub ordinal_field: String,
    pub max_results: usize,
}

impl Default for TableShape {
    fn default() -> Self {
        Self::from(&ScreenerConfig::default())
    }
}

impl From<&ScreenerConfig> for TableShape {
    fn from(config: &ScreenerConfig) -> Self {
        Self {
            price_field: config.price_field.clone(),
            symbol_field: config.symbol_field.clone(),
            ordinal_field: config.ordinal_field.clone(),
            max_results: config.max_results,
        }
    }
}

fn as_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    price.is_finite().then_some(price)
}

fn as_symbol(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_row(object: &Map<String, Value>, shape: &TableShape) -> Result<ScanRow, ScreenerError> {
    let close = object
        .get(&shape.price_field)
        .and_then(as_price)
        .ok_or_else(|| ScreenerError::MissingField {
            field: shape.price_field.clone(),
        })?;
    let symbol = object
        .get(&shape.symbol_field)
        .and_then(as_symbol)
        .ok_or_else(|| ScreenerError::MissingField {
            field: shape.symbol_field.clone(),
        })?;

    let mut fields = object.clone();
    fields.remove(&shape.ordinal_field);

    Ok(ScanRow {
        symbol,
        close,
        fields,
    })
}

/// Rank a decoded `{ "data": [...] }` body.
///
/// Every row must carry both the price and the symbol column; one bad row
/// fails the whole response. Rows are sorted ascending by price (stable for
/// ties) and truncated after sorting, so the result is the cheapest
/// `max_results` matches.
pub fn rank_rows(body: &Value, shape: &TableShape) -> ScanOutcome {
    let data = match body.get("data") {
        None | Some(Value::Null) => {
            return ScanOutcome::Empty {
                reason: "response carried no data".to_string(),
            }
        }
        Some(Value::Array(rows)) => rows,
        Some(other) => {
            return ScanOutcome::Failed(ScreenerError::Malformed(format!(
                "expected data array, got {}",
                json_kind(other)
            )))
        }
    };

    if data.is_empty() {
        return ScanOutcome::Empty {
            reason: "no symbols matched".to_string(),
        };
    }

    let mut rows = Vec::with_capacity(data.len());
    for entry in data {
        let Some(object) = entry.as_object() else {
            return ScanOutcome::Failed(ScreenerError::Malformed(format!(
                "expected row object, got {}",
                json_kind(entry)
            )));
        };
        match parse_row(object, shape) {
            Ok(row) => rows.push(row),
            Err(e) => return ScanOutcome::Failed(e),
        }
    }

    let matched = rows.len();
    rows.sort_by(|a, b| a.close.total_cmp(&b.close));
    rows.truncate(shape.max_results);

    ScanOutcome::Rows(ScanResult::from_ranked(rows, matched))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
