//! Typed row values and row metadata as delivered by the host pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One external row: a positional array of typed values.
pub type Row = Vec<Value>;

/// A single typed value in an external row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Absent value.
    Null,
    /// Real number.
    Number(f64),
    /// Whole number.
    Integer(i64),
    /// Boolean flag.
    Boolean(bool),
    /// Free text or a categorical label.
    String(String),
    /// Point in time.
    Date(DateTime<Utc>),
}

impl Value {
    /// True for `Null` and for the empty string, both of which count as missing.
    #[must_use]
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Numeric view of the value. Booleans map to 1/0 and dates to epoch milliseconds.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Null => None,
            Self::Number(n) => Some(*n),
            Self::Integer(i) => Some(*i as f64),
            Self::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::String(s) => s.trim().parse::<f64>().ok(),
            Self::Date(d) => Some(d.timestamp_millis() as f64),
        }
    }

    /// Textual view of the value, `None` when missing.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        if self.is_null() {
            return None;
        }
        Some(self.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::String(s) => f.write_str(s),
            Self::Date(d) => f.write_str(&d.to_rfc3339()),
        }
    }
}

/// Whole numbers print without a fractional part so that `1.0` and `"1"` name the same label.
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Declared storage type of an input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Number,
    Integer,
    Boolean,
    String,
    Date,
}

impl FieldType {
    /// Number or integer.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Number | Self::Integer)
    }
}

/// Metadata for one input field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub name: String,
    pub field_type: FieldType,
    /// Enumerated value domain when the upstream typing already fixes the legal values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Vec<String>>,
}

impl FieldMeta {
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self { name: name.into(), field_type, domain: None }
    }

    /// Attach an enumerated value domain.
    #[must_use]
    pub fn with_domain<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domain = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

/// Ordered field metadata describing the shape of every row in a stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowMeta {
    fields: Vec<FieldMeta>,
}

impl RowMeta {
    #[must_use]
    pub fn new(fields: Vec<FieldMeta>) -> Self {
        Self { fields }
    }

    pub fn push(&mut self, field: FieldMeta) {
        self.fields.push(field);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn field(&self, index: usize) -> Option<&FieldMeta> {
        self.fields.get(index)
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    /// Position of the first field with the given name.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Name to position lookup, computed once per stream.
    #[must_use]
    pub fn lookup(&self) -> HashMap<String, usize> {
        self.fields.iter().enumerate().map(|(i, f)| (f.name.clone(), i)).collect()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}
