//! Price normalization for menu payloads.
//!
//! Prices show up as JSON numbers (`25000`), decimal strings (`"25000.5"`),
//! display strings with thousands separators and a currency mark
//! (`"25,000đ"`), or objects bundling those (`{"value": 25000, "text":
//! "25,000đ", "unit": "đ"}`). All of them normalize to one `f64`.

use serde_json::Value;

/// A normalized price and the currency unit the payload named, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Price {
    pub amount: f64,
    pub unit: Option<String>,
}

/// Why a price could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceError {
    #[error("no numeric value")]
    Missing,
    #[error("not a number: {0}")]
    NotANumber(String),
    #[error("negative price")]
    Negative,
    #[error("malformed thousands grouping: {0}")]
    BadGrouping(String),
}

/// Normalize any supported price representation.
pub fn normalize(value: &Value) -> Result<Price, PriceError> {
    match value {
        Value::Number(n) => {
            let amount = n.as_f64().ok_or_else(|| PriceError::NotANumber(n.to_string()))?;
            check(amount).map(|amount| Price { amount, unit: None })
        }
        Value::String(s) => parse_text(s).map(|amount| Price { amount, unit: None }),
        Value::Object(map) => {
            let unit = map
                .get("unit")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string);
            let inner = match map.get("value") {
                Some(v) if !v.is_null() => v,
                _ => map.get("text").filter(|v| !v.is_null()).ok_or(PriceError::Missing)?,
            };
            if inner.is_object() {
                return Err(PriceError::NotANumber(inner.to_string()));
            }
            let mut price = normalize(inner)?;
            price.unit = unit;
            Ok(price)
        }
        Value::Null => Err(PriceError::Missing),
        other => Err(PriceError::NotANumber(other.to_string())),
    }
}

/// Parse a textual price such as `"1,000"`, `"25.5"` or `"45,000 đ"`.
///
/// Commas are thousands separators and must group digits by three; a dot is
/// the decimal point. A lone dot followed by exactly three digits (`"45.000đ"`)
/// reads as a dot-grouped amount and is rejected rather than guessed.
pub fn parse_text(text: &str) -> Result<f64, PriceError> {
    let trimmed = text.trim();
    if trimmed.starts_with('-') {
        return Err(PriceError::Negative);
    }

    let numeric: String = trimmed
        .trim_matches(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if numeric.is_empty() {
        return Err(if trimmed.is_empty() {
            PriceError::Missing
        } else {
            PriceError::NotANumber(trimmed.to_string())
        });
    }

    let (int_part, frac_part) = match numeric.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (numeric.as_str(), None),
    };
    if let Some(frac) = frac_part {
        if frac.is_empty() || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(PriceError::NotANumber(trimmed.to_string()));
        }
        if frac.len() == 3 && !int_part.contains(',') {
            return Err(PriceError::BadGrouping(trimmed.to_string()));
        }
    }

    let digits = strip_grouping(int_part).ok_or_else(|| PriceError::BadGrouping(trimmed.to_string()))?;
    let joined = match frac_part {
        Some(frac) => format!("{digits}.{frac}"),
        None => digits,
    };
    let amount = joined
        .parse::<f64>()
        .map_err(|_| PriceError::NotANumber(trimmed.to_string()))?;
    check(amount)
}

/// Remove comma separators, requiring groups of three after the first group.
fn strip_grouping(int_part: &str) -> Option<String> {
    if int_part.is_empty() || !int_part.chars().all(|c| c.is_ascii_digit() || c == ',') {
        return None;
    }
    if !int_part.contains(',') {
        return Some(int_part.to_string());
    }
    let mut groups = int_part.split(',');
    let head = groups.next()?;
    if head.is_empty() || head.len() > 3 {
        return None;
    }
    let mut out = head.to_string();
    for group in groups {
        if group.len() != 3 {
            return None;
        }
        out.push_str(group);
    }
    Some(out)
}

fn check(amount: f64) -> Result<f64, PriceError> {
    if !amount.is_finite() {
        return Err(PriceError::NotANumber(amount.to_string()));
    }
    if amount < 0.0 {
        return Err(PriceError::Negative);
    }
    Ok(amount)
}
