use serde_json::Value;

/// A metric value after parsing: either a finite number or nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalizedValue {
    Number(f64),
    Absent,
}

impl NormalizedValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            NormalizedValue::Number(x) => Some(*x),
            NormalizedValue::Absent => None,
        }
    }
}

impl From<f64> for NormalizedValue {
    fn from(x: f64) -> Self {
        if x.is_finite() {
            NormalizedValue::Number(x)
        } else {
            NormalizedValue::Absent
        }
    }
}

/// Parses a raw field value. Numbers pass through, strings may use a comma
/// as decimal separator ("10,50"), everything else is `Absent`.
pub fn normalize(raw: Option<&Value>) -> NormalizedValue {
    match raw {
        Some(Value::Number(n)) => n
            .as_f64()
            .map(NormalizedValue::from)
            .unwrap_or(NormalizedValue::Absent),
        Some(Value::String(s)) => parse_decimal(s),
        _ => NormalizedValue::Absent,
    }
}

/// Only the first comma is replaced; the source format has no thousands separator.
pub fn parse_decimal(s: &str) -> NormalizedValue {
    s.trim()
        .replacen(',', ".", 1)
        .parse::<f64>()
        .map(NormalizedValue::from)
        .unwrap_or(NormalizedValue::Absent)
}
