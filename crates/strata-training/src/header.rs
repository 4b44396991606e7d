//! Schema construction from field specs and, when needed, a sample of rows.

use crate::config::{FieldSpec, TrainingConfig};
use crate::error::{TrainingError, TrainingResult};
use std::collections::BTreeSet;
use strata_abstraction::{Attribute, FieldType, Row, RowMeta, Schema};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclaredKind {
    Numeric,
    Nominal,
    String,
    Date,
}

fn declared_kind(spec: &FieldSpec) -> TrainingResult<DeclaredKind> {
    match spec.kind.to_ascii_lowercase().as_str() {
        "numeric" => Ok(DeclaredKind::Numeric),
        "nominal" => Ok(DeclaredKind::Nominal),
        "string" => Ok(DeclaredKind::String),
        "date" => Ok(DeclaredKind::Date),
        _ => Err(TrainingError::UnsupportedAttributeKind {
            field: spec.name.clone(),
            kind: spec.kind.clone(),
        }),
    }
}

/// Default field specs for a row layout: numbers, integers and booleans become numeric,
/// strings become nominal (taking an enumerated domain as legal values), dates stay dates.
///
/// Legal values taken from a domain keep the domain's order, so label indices match the
/// upstream value indices. Only values gathered by [`SchemaBuilder::build`] for specs
/// without legal values are sorted.
pub fn field_specs_from_meta(meta: &RowMeta) -> Vec<FieldSpec> {
    meta.fields()
        .iter()
        .map(|field| match field.field_type {
            FieldType::Number | FieldType::Integer | FieldType::Boolean => {
                FieldSpec::new(&field.name, "numeric")
            }
            FieldType::String => {
                let spec = FieldSpec::new(&field.name, "nominal");
                match &field.domain {
                    Some(domain) => spec.with_legal_values(domain.iter().map(|v| v.trim())),
                    None => spec,
                }
            }
            FieldType::Date => FieldSpec::new(&field.name, "date"),
        })
        .collect()
}

/// Builds fixed schemas for one training run.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    relation: String,
    specs: Vec<FieldSpec>,
    class_field: String,
    stratify_field: Option<String>,
}

impl SchemaBuilder {
    pub fn new(config: &TrainingConfig, meta: &RowMeta) -> TrainingResult<Self> {
        let specs =
            if config.fields.is_empty() { field_specs_from_meta(meta) } else { config.fields.clone() };
        for spec in &specs {
            declared_kind(spec)?;
        }
        let stratify_field = config.row_handling.stratification_field().map(str::to_string);

        let class_field = match &config.class_field {
            Some(name) => {
                if !specs.iter().any(|s| &s.name == name) {
                    return Err(TrainingError::InvalidConfig(format!(
                        "class field '{name}' has no field spec"
                    )));
                }
                name.clone()
            }
            None => specs
                .iter()
                .rev()
                .find(|s| Some(s.name.as_str()) != stratify_field.as_deref())
                .map(|s| s.name.clone())
                .ok_or_else(|| {
                    TrainingError::InvalidConfig("no field is available as class".to_string())
                })?,
        };

        Ok(Self { relation: config.relation.clone(), specs, class_field, stratify_field })
    }

    pub fn specs(&self) -> &[FieldSpec] {
        &self.specs
    }

    pub fn class_field(&self) -> &str {
        &self.class_field
    }

    pub fn class_spec(&self) -> Option<&FieldSpec> {
        self.specs.iter().find(|s| s.name == self.class_field)
    }

    /// True when every nominal field other than the stratification field carries
    /// explicit legal values, so no rows need to be sampled first.
    pub fn determinable_immediately(&self) -> bool {
        self.specs
            .iter()
            .filter(|s| Some(s.name.as_str()) != self.stratify_field.as_deref())
            .all(|s| !s.is_nominal() || s.has_legal_values())
    }

    /// Build a schema with the class attribute last and the stratification field left out.
    pub fn build(&self, meta: &RowMeta, sample: &[Row]) -> TrainingResult<Schema> {
        let mut attributes = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            if spec.name == self.class_field
                || Some(spec.name.as_str()) == self.stratify_field.as_deref()
            {
                continue;
            }
            attributes.push(construct_attribute(spec, meta, sample)?);
        }
        let class_spec = self.class_spec().ok_or_else(|| {
            TrainingError::InvalidConfig(format!("class field '{}' has no field spec", self.class_field))
        })?;
        attributes.push(construct_attribute(class_spec, meta, sample)?);

        let class_index = attributes.len() - 1;
        let schema = Schema::new(self.relation.clone(), attributes, Some(class_index))?;
        debug!(
            attributes = schema.num_attributes(),
            sampled_rows = sample.len(),
            "schema determined"
        );
        Ok(schema)
    }
}

fn construct_attribute(spec: &FieldSpec, meta: &RowMeta, sample: &[Row]) -> TrainingResult<Attribute> {
    let attribute = match declared_kind(spec)? {
        DeclaredKind::Numeric => Attribute::numeric(&spec.name),
        DeclaredKind::Date => Attribute::date(&spec.name),
        DeclaredKind::String => Attribute::string(&spec.name),
        DeclaredKind::Nominal => {
            if let Some(values) = spec.legal_values.as_ref().filter(|v| !v.is_empty()) {
                Attribute::nominal(&spec.name, values.iter().cloned())
            } else {
                Attribute::nominal(&spec.name, nominal_values(&spec.name, meta, sample))
            }
        }
    };
    Ok(attribute)
}

/// Sorted legal values from the field's enumerated domain, else from the sampled rows.
///
/// Used only for nominal specs declared without legal values. Specs derived by
/// [`field_specs_from_meta`] already carry the domain in its own order.
fn nominal_values(name: &str, meta: &RowMeta, sample: &[Row]) -> Vec<String> {
    let Some(index) = meta.index_of(name) else {
        return Vec::new();
    };
    if let Some(domain) = meta.field(index).and_then(|f| f.domain.as_ref()) {
        return domain.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
    }
    sample
        .iter()
        .filter_map(|row| row.get(index).and_then(|v| v.as_text()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
