//! Row to record conversion against a fixed schema.

use strata_abstraction::{AttributeKind, Dataset, Record, Row, RowMeta, Schema, MISSING};

/// How string attributes take values from converted rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StringValues {
    /// Append to the attribute's dictionary.
    #[default]
    Intern,
    /// Replace the dictionary with the single current value.
    Replace,
}

/// Converts external rows into records for one schema and one row layout.
///
/// The attribute to row position lookup is computed once.
#[derive(Debug, Clone)]
pub struct RecordConverter {
    positions: Vec<Option<usize>>,
    strings: StringValues,
}

impl RecordConverter {
    pub fn new(schema: &Schema, meta: &RowMeta) -> Self {
        let lookup = meta.lookup();
        let positions =
            schema.attributes().iter().map(|a| lookup.get(&a.name).copied()).collect();
        Self::from_positions(positions)
    }

    /// Converter reading attribute `i` from row position `positions[i]`.
    pub fn from_positions(positions: Vec<Option<usize>>) -> Self {
        Self { positions, strings: StringValues::Intern }
    }

    #[must_use]
    pub fn with_string_values(mut self, strings: StringValues) -> Self {
        self.strings = strings;
        self
    }

    /// Build one record. Absent, null and unknown categorical values become missing.
    /// String attributes store their value in the schema's dictionary.
    pub fn convert(&self, schema: &mut Schema, row: &Row) -> Record {
        let mut values = vec![MISSING; schema.num_attributes()];
        for (i, slot) in values.iter_mut().enumerate() {
            let Some(raw) = self.positions.get(i).copied().flatten().and_then(|p| row.get(p)) else {
                continue;
            };
            if raw.is_null() {
                continue;
            }
            let Some(attribute) = schema.attribute_mut(i) else {
                continue;
            };
            *slot = match &attribute.kind {
                AttributeKind::Numeric | AttributeKind::Date => raw.as_f64().unwrap_or(MISSING),
                AttributeKind::Nominal { .. } => raw
                    .as_text()
                    .and_then(|label| attribute.index_of_value(&label))
                    .map_or(MISSING, |idx| idx as f64),
                AttributeKind::String { .. } => raw
                    .as_text()
                    .and_then(|text| match self.strings {
                        StringValues::Intern => attribute.add_string_value(&text),
                        StringValues::Replace => attribute.set_string_value(&text),
                    })
                    .map_or(MISSING, |idx| idx as f64),
            };
        }
        Record::new(values)
    }
}

/// Convert a batch of rows into a dataset over `schema`.
pub fn build_dataset(schema: Schema, meta: &RowMeta, rows: &[Row]) -> Dataset {
    let converter = RecordConverter::new(&schema, meta);
    let mut dataset = Dataset::new(schema);
    for row in rows {
        let record = converter.convert(dataset.schema_mut(), row);
        dataset.push(record);
    }
    dataset
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_abstraction::{Attribute, FieldMeta, FieldType, Value};

    fn schema() -> Schema {
        Schema::new(
            "t",
            vec![
                Attribute::numeric("temp"),
                Attribute::string("note"),
                Attribute::numeric("absent"),
                Attribute::nominal("play", ["yes", "no"]),
            ],
            Some(3),
        )
        .unwrap()
    }

    fn meta() -> RowMeta {
        RowMeta::new(vec![
            FieldMeta::new("play", FieldType::String),
            FieldMeta::new("note", FieldType::String),
            FieldMeta::new("temp", FieldType::Integer),
        ])
    }

    #[test]
    fn test_values_follow_schema_order() {
        let mut s = schema();
        let conv = RecordConverter::new(&s, &meta());
        let rec = conv.convert(&mut s, &vec!["no".into(), "hot".into(), Value::Integer(81)]);
        assert_eq!(rec.value(0), 81.0);
        assert_eq!(rec.value(1), 0.0);
        assert!(rec.is_missing(2));
        assert_eq!(rec.value(3), 1.0);
    }

    #[test]
    fn test_null_and_empty_become_missing_not_zero() {
        let mut s = schema();
        let conv = RecordConverter::new(&s, &meta());
        let rec = conv.convert(&mut s, &vec![Value::Null, "".into(), Value::Null]);
        assert!(rec.is_missing(0));
        assert!(rec.is_missing(1));
        assert!(rec.is_missing(3));
    }

    #[test]
    fn test_unknown_label_is_missing() {
        let mut s = schema();
        let conv = RecordConverter::new(&s, &meta());
        let rec = conv.convert(&mut s, &vec!["maybe".into(), Value::Null, 1.0.into()]);
        assert!(rec.is_missing(3));
    }

    #[test]
    fn test_string_dictionary_grows() {
        let rows: Vec<Row> = vec![
            vec!["yes".into(), "a".into(), 1.0.into()],
            vec!["no".into(), "b".into(), 2.0.into()],
            vec!["no".into(), "a".into(), 3.0.into()],
        ];
        let data = build_dataset(schema(), &meta(), &rows);
        assert_eq!(data.len(), 3);
        assert_eq!(data.schema().attribute(1).unwrap().num_values(), 2);
        assert_eq!(data.records()[2].value(1), 0.0);
    }

    #[test]
    fn test_replaced_strings_keep_one_value() {
        let mut s = schema();
        let conv = RecordConverter::new(&s, &meta()).with_string_values(StringValues::Replace);
        conv.convert(&mut s, &vec!["no".into(), "a".into(), 1.0.into()]);
        let rec = conv.convert(&mut s, &vec!["no".into(), "b".into(), 1.0.into()]);
        assert_eq!(rec.value(1), 0.0);
        assert_eq!(s.attribute(1).unwrap().labels(), ["b"]);
    }
}
