//! Dataset schema, numeric records and in-memory datasets.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Sentinel for a missing slot in a [`Record`].
pub const MISSING: f64 = f64::NAN;

/// True when a record slot holds the missing sentinel.
#[must_use]
pub fn is_missing(value: f64) -> bool {
    value.is_nan()
}

/// Kind of a schema attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeKind {
    Numeric,
    /// Categorical attribute with a fixed, ordered legal-value list.
    Nominal { values: Vec<String> },
    /// Free text with an append-only dictionary.
    String {
        #[serde(default)]
        dictionary: Vec<String>,
    },
    Date,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(flatten)]
    pub kind: AttributeKind,
}

impl Attribute {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: AttributeKind::Numeric }
    }

    pub fn nominal<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: AttributeKind::Nominal { values: values.into_iter().map(Into::into).collect() },
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: AttributeKind::String { dictionary: Vec::new() } }
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: AttributeKind::Date }
    }

    /// Numeric and date attributes hold real values.
    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, AttributeKind::Numeric | AttributeKind::Date)
    }

    pub fn is_nominal(&self) -> bool {
        matches!(self.kind, AttributeKind::Nominal { .. })
    }

    pub fn is_string(&self) -> bool {
        matches!(self.kind, AttributeKind::String { .. })
    }

    /// Legal values for nominal attributes, the dictionary for string attributes.
    pub fn labels(&self) -> &[String] {
        match &self.kind {
            AttributeKind::Nominal { values } => values,
            AttributeKind::String { dictionary } => dictionary,
            AttributeKind::Numeric | AttributeKind::Date => &[],
        }
    }

    pub fn num_values(&self) -> usize {
        self.labels().len()
    }

    /// Position of a label among the legal values. Only nominal attributes answer.
    pub fn index_of_value(&self, label: &str) -> Option<usize> {
        match &self.kind {
            AttributeKind::Nominal { values } => values.iter().position(|v| v == label),
            _ => None,
        }
    }

    /// Intern a string into the dictionary and return its index.
    pub fn add_string_value(&mut self, value: &str) -> Option<usize> {
        match &mut self.kind {
            AttributeKind::String { dictionary } => {
                if let Some(existing) = dictionary.iter().position(|v| v == value) {
                    return Some(existing);
                }
                dictionary.push(value.to_string());
                Some(dictionary.len() - 1)
            }
            _ => None,
        }
    }

    /// Replace the dictionary with a single value, which then sits at index 0.
    pub fn set_string_value(&mut self, value: &str) -> Option<usize> {
        match &mut self.kind {
            AttributeKind::String { dictionary } => {
                dictionary.clear();
                dictionary.push(value.to_string());
                Some(0)
            }
            _ => None,
        }
    }

    /// Label for an encoded slot value of a nominal or string attribute.
    pub fn label_of(&self, encoded: f64) -> Option<&str> {
        if is_missing(encoded) || encoded < 0.0 {
            return None;
        }
        self.labels().get(encoded as usize).map(String::as_str)
    }
}

/// Ordered attribute list with an optional class attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub relation: String,
    attributes: Vec<Attribute>,
    class_index: Option<usize>,
}

impl Schema {
    /// Build a schema, rejecting duplicate names and an out-of-range class index.
    pub fn new(
        relation: impl Into<String>,
        attributes: Vec<Attribute>,
        class_index: Option<usize>,
    ) -> ModelResult<Self> {
        let mut seen = HashSet::new();
        for attribute in &attributes {
            if !seen.insert(attribute.name.as_str()) {
                return Err(ModelError::InvalidData(format!(
                    "duplicate attribute name '{}'",
                    attribute.name
                )));
            }
        }
        if let Some(idx) = class_index {
            if idx >= attributes.len() {
                return Err(ModelError::InvalidData(format!(
                    "class index {idx} out of range for {} attributes",
                    attributes.len()
                )));
            }
        }
        Ok(Self { relation: relation.into(), attributes, class_index })
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, index: usize) -> Option<&Attribute> {
        self.attributes.get(index)
    }

    pub fn attribute_mut(&mut self, index: usize) -> Option<&mut Attribute> {
        self.attributes.get_mut(index)
    }

    pub fn num_attributes(&self) -> usize {
        self.attributes.len()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    pub fn class_index(&self) -> Option<usize> {
        self.class_index
    }

    pub fn class_attribute(&self) -> Option<&Attribute> {
        self.class_index.and_then(|i| self.attributes.get(i))
    }

    pub fn is_supervised(&self) -> bool {
        self.class_index.is_some()
    }

    pub fn class_is_nominal(&self) -> bool {
        self.class_attribute().is_some_and(Attribute::is_nominal)
    }

    /// Width of a class distribution: label count for nominal classes, 1 otherwise.
    pub fn num_classes(&self) -> usize {
        match self.class_attribute() {
            Some(attr) if attr.is_nominal() => attr.num_values(),
            Some(_) => 1,
            None => 0,
        }
    }

    /// Copy with every string dictionary emptied, as stored next to a persisted model.
    #[must_use]
    pub fn without_string_values(&self) -> Self {
        let mut copy = self.clone();
        for attribute in &mut copy.attributes {
            if let AttributeKind::String { dictionary } = &mut attribute.kind {
                dictionary.clear();
            }
        }
        copy
    }
}

/// One fixed-width numeric data point aligned with a [`Schema`].
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<f64>,
    pub weight: f64,
}

impl Record {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, weight: 1.0 }
    }

    /// A record with every slot missing.
    pub fn missing(width: usize) -> Self {
        Self::new(vec![MISSING; width])
    }

    pub fn width(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn value(&self, index: usize) -> f64 {
        self.values.get(index).copied().unwrap_or(MISSING)
    }

    pub fn is_missing(&self, index: usize) -> bool {
        is_missing(self.value(index))
    }

    pub fn set(&mut self, index: usize, value: f64) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }

    pub fn set_missing(&mut self, index: usize) {
        self.set(index, MISSING);
    }

    /// Class slot value, `None` when unsupervised or missing.
    pub fn class_value(&self, schema: &Schema) -> Option<f64> {
        let idx = schema.class_index()?;
        let v = self.value(idx);
        (!is_missing(v)).then_some(v)
    }
}

/// A schema plus the records built against it.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    schema: Schema,
    records: Vec<Record>,
}

impl Dataset {
    pub fn new(schema: Schema) -> Self {
        Self { schema, records: Vec::new() }
    }

    pub fn with_records(schema: Schema, records: Vec<Record>) -> Self {
        Self { schema, records }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_mut(&mut self) -> &mut Schema {
        &mut self.schema
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Same schema, selected records.
    #[must_use]
    pub fn subset(&self, indices: &[usize]) -> Self {
        let records = indices.iter().filter_map(|&i| self.records.get(i).cloned()).collect();
        Self::with_records(self.schema.clone(), records)
    }

    pub fn into_parts(self) -> (Schema, Vec<Record>) {
        (self.schema, self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(
            "test",
            vec![
                Attribute::numeric("x"),
                Attribute::string("note"),
                Attribute::nominal("class", ["yes", "no"]),
            ],
            Some(2),
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Schema::new("t", vec![Attribute::numeric("a"), Attribute::numeric("a")], None);
        assert!(err.is_err());
    }

    #[test]
    fn test_class_index_bounds() {
        assert!(Schema::new("t", vec![Attribute::numeric("a")], Some(1)).is_err());
    }

    #[test]
    fn test_string_dictionary_is_append_only() {
        let mut s = schema();
        let attr = s.attribute_mut(1).unwrap();
        assert_eq!(attr.add_string_value("a"), Some(0));
        assert_eq!(attr.add_string_value("b"), Some(1));
        assert_eq!(attr.add_string_value("a"), Some(0));
        assert_eq!(attr.num_values(), 2);
        assert_eq!(attr.set_string_value("z"), Some(0));
        assert_eq!(attr.labels(), &["z".to_string()]);
    }

    #[test]
    fn test_nominal_lookup_and_labels() {
        let s = schema();
        let class = s.class_attribute().unwrap();
        assert_eq!(class.index_of_value("no"), Some(1));
        assert_eq!(class.index_of_value("maybe"), None);
        assert_eq!(class.label_of(0.0), Some("yes"));
        assert_eq!(class.label_of(MISSING), None);
        assert_eq!(s.num_classes(), 2);
    }

    #[test]
    fn test_without_string_values() {
        let mut s = schema();
        s.attribute_mut(1).unwrap().add_string_value("hello");
        let stripped = s.without_string_values();
        assert_eq!(stripped.attribute(1).unwrap().num_values(), 0);
        assert_eq!(s.attribute(1).unwrap().num_values(), 1);
    }

    #[test]
    fn test_record_missing_slots() {
        let mut r = Record::missing(3);
        assert!(r.is_missing(0));
        r.set(2, 1.0);
        assert_eq!(r.class_value(&schema()), Some(1.0));
        assert!(r.is_missing(7));
    }
}
