use std::{cmp::Ordering, fmt};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::dataset::DataType;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single non-null cell. NULL is modelled as `None` around it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(NaiveDateTime),
    Text(String),
}

/// One row of cells in column order; the first cell is the primary key.
pub type Row = Vec<Option<Value>>;

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Integer(_) => DataType::Integer,
            Value::Float(_) => DataType::Float,
            Value::Boolean(_) => DataType::Boolean,
            Value::Timestamp(_) => DataType::Timestamp,
            Value::Text(_) => DataType::Text,
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    pub fn is_midnight(&self) -> bool {
        match self {
            Value::Timestamp(ts) => ts.time() == NaiveTime::MIN,
            _ => false,
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            Value::Integer(_) => 0,
            Value::Float(_) => 1,
            Value::Boolean(_) => 2,
            Value::Timestamp(_) => 3,
            Value::Text(_) => 4,
        }
    }
}

// Total order so keys can live in ordered sets: floats use `total_cmp`, and
// mismatched variants fall back to a fixed rank instead of failing.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => self.variant_rank().cmp(&other.variant_rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Null-aware distinctness, the `IS DISTINCT FROM` rule: two NULLs are equal,
/// NULL against a value is distinct, values compare by their total order.
/// Floats compare numerically, so `0.0` and `-0.0` are equal, and NaN equals
/// NaN.
pub fn is_distinct(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (None, None) => false,
        (None, Some(_)) | (Some(_), None) => true,
        (Some(Value::Float(a)), Some(Value::Float(b))) => {
            !(a == b || (a.is_nan() && b.is_nan()))
        }
        (Some(a), Some(b)) => a != b,
    }
}

/// True when any cell after the primary key differs between the two rows.
pub fn rows_differ(staged: &[Option<Value>], persisted: &[Option<Value>]) -> bool {
    if staged.len() != persisted.len() {
        return true;
    }
    staged
        .iter()
        .zip(persisted.iter())
        .skip(1)
        .any(|(left, right)| is_distinct(left.as_ref(), right.as_ref()))
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

/// Parses a timestamp, accepting date-only input as midnight.
pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    parse_naive_date(value)
        .map(|date| date.and_time(NaiveTime::MIN))
        .map_err(|_| anyhow!("Failed to parse '{value}' as timestamp"))
}

pub fn parse_boolean(value: &str) -> Result<bool> {
    let lowered = value.to_ascii_lowercase();
    match lowered.as_str() {
        "true" | "t" | "yes" | "y" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "0" => Ok(false),
        _ => bail!("Failed to parse '{value}' as boolean"),
    }
}

/// Parses raw CSV text into a cell; an empty field is NULL.
pub fn parse_typed_value(value: &str, ty: DataType) -> Result<Option<Value>> {
    if value.is_empty() {
        return Ok(None);
    }
    parse_present_value(value, ty).map(Some)
}

/// Parses raw text that is known not to be NULL.
pub fn parse_present_value(value: &str, ty: DataType) -> Result<Value> {
    let parsed = match ty {
        DataType::Text => Value::Text(value.to_string()),
        DataType::Integer => {
            let parsed: i64 = value
                .trim()
                .parse()
                .with_context(|| format!("Failed to parse '{value}' as integer"))?;
            Value::Integer(parsed)
        }
        DataType::Float => {
            let parsed: f64 = value
                .trim()
                .parse()
                .with_context(|| format!("Failed to parse '{value}' as float"))?;
            Value::Float(parsed)
        }
        DataType::Boolean => Value::Boolean(parse_boolean(value.trim())?),
        DataType::Timestamp => Value::Timestamp(parse_naive_datetime(value.trim())?),
    };
    Ok(parsed)
}
