// src/schema.rs
//
// Destination schema derivation from a category entry. The derived schema
// covers the declared business columns plus the date columns; the loader adds
// the ingestion bookkeeping fields (`ts_ms`, `file`) on top.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

use crate::config::{CategoryEntry, DeclaredType};
use crate::normalize::{normalize_name, MARKER_COLUMN, TIMESTAMP_COLUMN};

/// Mapping from declared column types to BigQuery primitives.
static BQ_TYPES: Lazy<HashMap<DeclaredType, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (DeclaredType::Int, "INT64"),
        (DeclaredType::String, "STRING"),
        (DeclaredType::Float, "FLOAT64"),
        (DeclaredType::Bool, "BOOLEAN"),
    ])
});

/// One field of a BigQuery table schema. Serializes to the REST shape
/// (`name` / `type` / `description`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    /// Original column label, kept for lineage.
    pub description: String,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, field_type: &str, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.to_string(),
            description: description.into(),
        }
    }
}

/// Derive the destination schema for one category.
///
/// Declared columns come first in declaration order (float overrides applied
/// before type mapping), then one TIMESTAMP field per date column. Field names
/// are normalized; descriptions keep the raw label.
pub fn derive(entry: &CategoryEntry) -> Vec<SchemaField> {
    let mut fields = Vec::with_capacity(entry.columns.len() + entry.date_columns.len());

    for spec in &entry.columns {
        let dtype = entry.schema_dtype(&spec.name).unwrap_or(spec.dtype);
        fields.push(SchemaField::new(
            normalize_name(&spec.name),
            BQ_TYPES[&dtype],
            spec.name.clone(),
        ));
    }

    for date_col in &entry.date_columns {
        fields.push(SchemaField::new(
            normalize_name(date_col),
            "TIMESTAMP",
            date_col.clone(),
        ));
    }

    fields
}

/// Extend a derived schema with the ingestion bookkeeping fields: `ts_ms`
/// TIMESTAMP first, `file` marker STRING last.
pub fn with_ingestion_fields(mut schema: Vec<SchemaField>) -> Vec<SchemaField> {
    schema.insert(
        0,
        SchemaField::new(TIMESTAMP_COLUMN, "TIMESTAMP", "Ingestion wall-clock time"),
    );
    schema.push(SchemaField::new(
        MARKER_COLUMN,
        "STRING",
        "Originating source file name",
    ));
    schema
}
