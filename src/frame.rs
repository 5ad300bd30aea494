// src/frame.rs
//
// Lightweight typed table parsed from raw CSV bytes. Parsing honors the
// per-category options: leading rows to skip, text encoding, field delimiter,
// decimal marker, declared column types, and date columns. Cells keep their
// parsed type so load jobs can serialize rows as NDJSON without re-guessing.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::config::{CategoryEntry, DeclaredType};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Timestamp(DateTime<Utc>),
    Null,
}

impl Value {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Bool(v) => serde_json::Value::from(*v),
            Value::Str(v) => serde_json::Value::from(v.as_str()),
            Value::Timestamp(v) => serde_json::Value::from(v.to_rfc3339()),
            Value::Null => serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Parse raw CSV bytes using one category's parser options.
    pub fn read_csv(bytes: &[u8], entry: &CategoryEntry) -> Result<Self> {
        let encoding = match &entry.encoding {
            Some(label) => encoding_rs::Encoding::for_label(label.as_bytes())
                .with_context(|| format!("unknown encoding label {label:?}"))?,
            None => encoding_rs::UTF_8,
        };
        let (text, _, _) = encoding.decode(bytes);

        let body: String = if entry.skip_rows > 0 {
            text.split_inclusive('\n').skip(entry.skip_rows).collect()
        } else {
            text.into_owned()
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(entry.delimiter as u8)
            .from_reader(body.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .context("reading CSV header row")?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("reading CSV record {line}"))?;
            let mut row = Vec::with_capacity(headers.len());
            for (idx, header) in headers.iter().enumerate() {
                let raw = record.get(idx).unwrap_or("");
                let value = typed_cell(raw, header, entry)
                    .with_context(|| format!("column {header:?}, record {line}"))?;
                row.push(value);
            }
            rows.push(row);
        }

        Ok(Self {
            columns: headers,
            rows,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Replace a column label; no-op when the column is absent.
    pub fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(idx) = self.column_index(from) {
            self.columns[idx] = to.to_string();
        }
    }

    /// Rewrite every cell of a column; no-op when the column is absent.
    pub fn map_column<F>(&mut self, name: &str, f: F) -> Result<()>
    where
        F: Fn(&Value) -> Result<Value>,
    {
        let Some(idx) = self.column_index(name) else {
            return Ok(());
        };
        for row in &mut self.rows {
            row[idx] = f(&row[idx])?;
        }
        Ok(())
    }

    /// Append a column filled with the same value in every row.
    pub fn push_column(&mut self, name: &str, value: Value) {
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(value.clone());
        }
    }

    /// Insert a column at `idx`, filled with the same value in every row.
    pub fn insert_column(&mut self, idx: usize, name: &str, value: Value) {
        self.columns.insert(idx, name.to_string());
        for row in &mut self.rows {
            row.insert(idx, value.clone());
        }
    }

    /// Replace all column labels at once (post-normalization).
    pub fn set_columns(&mut self, columns: Vec<String>) {
        debug_assert_eq!(columns.len(), self.columns.len());
        self.columns = columns;
    }

    /// Serialize rows as newline-delimited JSON keyed by column name, the
    /// format the load job uploads.
    pub fn to_ndjson(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            let mut object = serde_json::Map::with_capacity(self.columns.len());
            for (name, value) in self.columns.iter().zip(row) {
                object.insert(name.clone(), value.to_json());
            }
            out.push_str(&serde_json::Value::Object(object).to_string());
            out.push('\n');
        }
        out
    }
}

fn typed_cell(raw: &str, column: &str, entry: &CategoryEntry) -> Result<Value> {
    if entry.is_date_column(column) {
        if raw.trim().is_empty() {
            return Ok(Value::Null);
        }
        // Unparseable dates stay as text and surface at load time, like the
        // rest of the shape mismatches.
        return Ok(parse_timestamp(raw.trim(), entry.dayfirst)
            .map(Value::Timestamp)
            .unwrap_or_else(|| Value::Str(raw.to_string())));
    }

    // Locale-number columns are read as text and converted during
    // normalization.
    if entry.is_float_override(column) {
        return Ok(if raw.is_empty() {
            Value::Null
        } else {
            Value::Str(raw.to_string())
        });
    }

    let Some(spec) = entry.columns.iter().find(|c| c.name == column) else {
        // Undeclared columns ride along as text.
        return Ok(Value::Str(raw.to_string()));
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }

    match spec.dtype {
        DeclaredType::Int => trimmed
            .parse::<i64>()
            .map(Value::Int)
            .with_context(|| format!("parsing {trimmed:?} as integer")),
        DeclaredType::Float => {
            let dotted = if entry.decimal != '.' {
                trimmed.replace(entry.decimal, ".")
            } else {
                trimmed.to_string()
            };
            dotted
                .parse::<f64>()
                .map(Value::Float)
                .with_context(|| format!("parsing {trimmed:?} as float"))
        }
        DeclaredType::Bool => match trimmed {
            "true" | "True" | "TRUE" | "1" => Ok(Value::Bool(true)),
            "false" | "False" | "FALSE" | "0" => Ok(Value::Bool(false)),
            other => bail!("parsing {other:?} as boolean"),
        },
        DeclaredType::String => Ok(Value::Str(raw.to_string())),
    }
}

fn parse_timestamp(raw: &str, dayfirst: bool) -> Option<DateTime<Utc>> {
    const DAYFIRST_FORMATS: [&str; 5] = [
        "%d.%m.%Y %H:%M:%S",
        "%d.%m.%Y %H:%M",
        "%d.%m.%Y",
        "%d/%m/%Y",
        "%d-%m-%Y",
    ];
    const ISO_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d",
        "%m/%d/%Y",
    ];
    let formats: &[&str] = if dayfirst {
        &DAYFIRST_FORMATS
    } else {
        &ISO_FORMATS
    };
    for format in formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc());
        }
        if let Ok(d) = NaiveDate::parse_from_str(raw, format) {
            return Some(d.and_hms_opt(0, 0, 0)?.and_utc());
        }
    }
    None
}
