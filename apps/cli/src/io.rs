//! CSV row sources and CSV / JSON-lines row sinks.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use csv::StringRecord;
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use strata_abstraction::{AttributeKind, FieldMeta, FieldType, Row, RowMeta, Schema, Value};
use strata_training::FieldSpec;
use tracing::debug;

/// Column types forced by the caller; every other column is inferred from its cells.
pub type TypeHints = HashMap<String, FieldType>;

/// Hints from declared field specs.
pub fn hints_from_specs(specs: &[FieldSpec]) -> TypeHints {
    specs
        .iter()
        .filter_map(|spec| {
            let field_type = match spec.kind.to_ascii_lowercase().as_str() {
                "numeric" => FieldType::Number,
                "nominal" | "string" => FieldType::String,
                "date" => FieldType::Date,
                _ => return None,
            };
            Some((spec.name.clone(), field_type))
        })
        .collect()
}

/// Hints from the schema a saved model is bound to.
pub fn hints_from_schema(schema: &Schema) -> TypeHints {
    schema
        .attributes()
        .iter()
        .map(|attribute| {
            let field_type = match attribute.kind {
                AttributeKind::Numeric => FieldType::Number,
                AttributeKind::Date => FieldType::Date,
                AttributeKind::Nominal { .. } | AttributeKind::String { .. } => FieldType::String,
            };
            (attribute.name.clone(), field_type)
        })
        .collect()
}

/// Typed rows streamed from a CSV file with a header line.
///
/// Column types come from the hints or are inferred from the first `sample_size`
/// records. Those records are held until iteration reaches them; later records are
/// read one at a time, and a cell that does not fit its column type is an error.
pub struct RowSource<R> {
    meta: RowMeta,
    sampled: VecDeque<StringRecord>,
    records: csv::StringRecordsIntoIter<R>,
    origin: String,
    line: usize,
}

impl RowSource<File> {
    pub fn open(path: &Path, hints: &TypeHints, sample_size: usize) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        Self::from_reader(file, hints, sample_size, path.display().to_string())
    }
}

impl<R: Read> RowSource<R> {
    pub fn from_reader(
        reader: R,
        hints: &TypeHints,
        sample_size: usize,
        origin: impl Into<String>,
    ) -> Result<Self> {
        let origin = origin.into();
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("Failed to read the header line of {origin}"))?
            .iter()
            .map(str::to_string)
            .collect();
        let mut records = reader.into_records();
        let mut sampled = VecDeque::with_capacity(sample_size);
        while sampled.len() < sample_size {
            match records.next() {
                Some(record) => sampled.push_back(
                    record.with_context(|| format!("Failed to read rows from {origin}"))?,
                ),
                None => break,
            }
        }

        let fields = headers
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let field_type = hints.get(name).copied().unwrap_or_else(|| {
                    infer_type(sampled.iter().map(|record| record.get(i).unwrap_or("")))
                });
                FieldMeta::new(name, field_type)
            })
            .collect();
        debug!(origin = %origin, sampled = sampled.len(), "column types fixed");
        Ok(Self { meta: RowMeta::new(fields), sampled, records, origin, line: 0 })
    }

    pub fn meta(&self) -> &RowMeta {
        &self.meta
    }

    fn typed(&self, record: &StringRecord) -> Result<Row> {
        record
            .iter()
            .zip(self.meta.fields())
            .map(|(cell, field)| {
                parse_cell(cell, field.field_type).with_context(|| {
                    format!(
                        "{}: row {}, column '{}': cannot read '{cell}'",
                        self.origin, self.line, field.name
                    )
                })
            })
            .collect()
    }
}

impl<R: Read> Iterator for RowSource<R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.sampled.pop_front() {
            Some(record) => record,
            None => match self.records.next()? {
                Ok(record) => record,
                Err(e) => {
                    let context = format!("Failed to read rows from {}", self.origin);
                    return Some(Err(anyhow::Error::new(e).context(context)));
                }
            },
        };
        self.line += 1;
        Some(self.typed(&record))
    }
}

fn infer_type<'a>(cells: impl Iterator<Item = &'a str>) -> FieldType {
    let mut numbers = true;
    let mut booleans = true;
    let mut dates = true;
    let mut seen = false;
    for cell in cells.filter(|c| !c.is_empty()) {
        seen = true;
        numbers &= cell.parse::<f64>().is_ok();
        booleans &= cell.parse::<bool>().is_ok();
        dates &= parse_date(cell).is_some();
    }
    match (seen, numbers, booleans, dates) {
        (false, ..) => FieldType::String,
        (true, true, ..) => FieldType::Number,
        (true, _, true, _) => FieldType::Boolean,
        (true, _, _, true) => FieldType::Date,
        _ => FieldType::String,
    }
}

fn parse_date(cell: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(cell).ok().map(|d| d.with_timezone(&Utc))
}

fn parse_cell(cell: &str, field_type: FieldType) -> Result<Value> {
    if cell.is_empty() {
        return Ok(Value::Null);
    }
    Ok(match field_type {
        FieldType::Number => Value::Number(cell.parse()?),
        FieldType::Integer => Value::Integer(cell.parse()?),
        FieldType::Boolean => Value::Boolean(cell.parse()?),
        FieldType::String => Value::String(cell.to_string()),
        FieldType::Date => match parse_date(cell) {
            Some(date) => Value::Date(date),
            None => bail!("not an RFC 3339 date"),
        },
    })
}

/// Writes output rows as CSV (with a header line) or as JSON lines.
pub struct RowSink {
    names: Vec<String>,
    format: SinkFormat,
}

enum SinkFormat {
    Csv(csv::Writer<Box<dyn Write>>),
    Json(BufWriter<Box<dyn Write>>),
}

impl RowSink {
    /// Sink writing to `path`, or to stdout when no path is given.
    pub fn open(path: Option<&Path>, meta: &RowMeta, json: bool) -> Result<Self> {
        let out: Box<dyn Write> = match path {
            Some(path) => Box::new(
                File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
            ),
            None => Box::new(std::io::stdout()),
        };
        Self::new(out, meta, json)
    }

    pub fn new(out: Box<dyn Write>, meta: &RowMeta, json: bool) -> Result<Self> {
        let names: Vec<String> = meta.names().into_iter().map(str::to_string).collect();
        let format = if json {
            SinkFormat::Json(BufWriter::new(out))
        } else {
            let mut writer = csv::Writer::from_writer(out);
            writer.write_record(&names)?;
            SinkFormat::Csv(writer)
        };
        Ok(Self { names, format })
    }

    pub fn write(&mut self, row: &Row) -> Result<()> {
        match &mut self.format {
            SinkFormat::Csv(writer) => {
                writer.write_record(row.iter().map(ToString::to_string))?;
            }
            SinkFormat::Json(writer) => {
                let object: serde_json::Map<String, serde_json::Value> = self
                    .names
                    .iter()
                    .cloned()
                    .zip(row.iter().map(value_to_json))
                    .collect();
                serde_json::to_writer(&mut *writer, &object)?;
                writer.write_all(b"\n")?;
            }
        }
        Ok(())
    }

    pub fn write_all(&mut self, rows: &[Row]) -> Result<()> {
        rows.iter().try_for_each(|row| self.write(row))
    }

    pub fn finish(self) -> Result<()> {
        match self.format {
            SinkFormat::Csv(mut writer) => writer.flush()?,
            SinkFormat::Json(mut writer) => writer.flush()?,
        }
        Ok(())
    }
}

pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Number(n) => {
            serde_json::Number::from_f64(*n).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Date(d) => serde_json::Value::String(d.to_rfc3339()),
    }
}
