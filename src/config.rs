//! # Category configuration
//!
//! Declarative per-category table driving CSV parsing, value normalization, and
//! schema derivation. Every component consults the same entry, so adding a
//! category is a pure data change: drop a new block into
//! `config/categories.toml` and the whole pipeline picks it up.
//!
//! - Loads from TOML (`CATEGORY_CONFIG_PATH` env var, then `config/categories.toml`).
//! - Falls back to the built-in seed mirroring the production Drive folders.
//! - Category keys double as destination table names in BigQuery.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "CATEGORY_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/categories.toml";

/// Column type as declared in the source config, before mapping to a
/// BigQuery primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclaredType {
    Int,
    String,
    Float,
    Bool,
}

/// One declared column: raw header label plus its declared type.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub dtype: DeclaredType,
}

/// Parser and normalization settings for one category (one Drive folder,
/// one destination table).
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryEntry {
    /// Declared columns, in declaration order.
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    /// Columns parsed as timestamps, appended to the schema after `columns`.
    #[serde(default)]
    pub date_columns: Vec<String>,
    /// Leading lines to drop before the header row.
    #[serde(default)]
    pub skip_rows: usize,
    /// Text encoding label (e.g. "cp1250"); UTF-8 when absent.
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Decimal marker used by float columns in the raw file.
    #[serde(default = "default_decimal")]
    pub decimal: char,
    /// Day-first date parsing (European exports).
    #[serde(default)]
    pub dayfirst: bool,
    /// Columns whose raw values carry locale decimal commas and stray spaces.
    /// Parsed as text, converted to floats during normalization, and always
    /// typed FLOAT64 in the derived schema.
    #[serde(default)]
    pub float_override_columns: Vec<String>,
    /// Raw header spellings canonicalized before any other processing.
    #[serde(default)]
    pub header_renames: HashMap<String, String>,
}

fn default_delimiter() -> char {
    ','
}

fn default_decimal() -> char {
    '.'
}

impl CategoryEntry {
    /// Declared type for a column, with the float override applied.
    pub fn schema_dtype(&self, column: &str) -> Option<DeclaredType> {
        let spec = self.columns.iter().find(|c| c.name == column)?;
        if self.float_override_columns.iter().any(|c| c == column) {
            Some(DeclaredType::Float)
        } else {
            Some(spec.dtype)
        }
    }

    pub fn is_date_column(&self, column: &str) -> bool {
        self.date_columns.iter().any(|c| c == column)
    }

    pub fn is_float_override(&self, column: &str) -> bool {
        self.float_override_columns.iter().any(|c| c == column)
    }
}

/// Full category configuration: the allow-list plus per-category entries.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryConfig {
    /// Categories eligible for ingestion; files in any other folder are dropped.
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub categories: HashMap<String, CategoryEntry>,
}

impl CategoryConfig {
    /// Load configuration using env var + fallbacks:
    /// 1) $CATEGORY_CONFIG_PATH
    /// 2) config/categories.toml
    /// 3) built-in seed
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            return Self::load_from(&pb)
                .with_context(|| format!("{ENV_PATH} points to {}", pb.display()));
        }
        let default = PathBuf::from(DEFAULT_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        Ok(Self::seed())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading category config from {}", path.display()))?;
        let cfg: CategoryConfig = toml::from_str(&content)
            .with_context(|| format!("parsing category config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn is_allowed(&self, category: &str) -> bool {
        self.allowed.iter().any(|c| c == category)
    }

    /// Entry lookup by destination table name (spaces already underscored).
    pub fn entry(&self, category: &str) -> Option<&CategoryEntry> {
        self.categories.get(category)
    }

    /// Built-in seed mirroring the three production Drive folders. Used as a
    /// fallback when no TOML config is present, and by tests.
    pub fn seed() -> Self {
        let folder12 = CategoryEntry {
            columns: vec![
                column("column_1", DeclaredType::Int),
                column("column_2", DeclaredType::String),
                column("column_3", DeclaredType::String),
                column("column_4", DeclaredType::Float),
                column("column_5", DeclaredType::Float),
                column("column_6", DeclaredType::String),
                column("column_7", DeclaredType::Float),
            ],
            date_columns: vec!["col_date".into()],
            skip_rows: 2,
            encoding: Some("cp1250".into()),
            delimiter: ',',
            decimal: '.',
            dayfirst: true,
            float_override_columns: Vec::new(),
            header_renames: HashMap::from([
                ("[-] ".to_string(), "[-]".to_string()),
                ("[+] ".to_string(), "[+]".to_string()),
            ]),
        };

        let folder3 = CategoryEntry {
            columns: vec![
                column("column_1", DeclaredType::String),
                column("column_2", DeclaredType::Int),
                column("column_3", DeclaredType::String),
                column("column_4", DeclaredType::String),
                column("column_5", DeclaredType::Float),
                column("column_6", DeclaredType::String),
                column("column_7", DeclaredType::Float),
            ],
            date_columns: vec!["date_col".into()],
            skip_rows: 0,
            encoding: None,
            delimiter: ',',
            decimal: '.',
            dayfirst: false,
            float_override_columns: vec!["column_4".into(), "column_5".into()],
            header_renames: HashMap::new(),
        };

        let mut categories = HashMap::new();
        categories.insert("folder_1".to_string(), folder12.clone());
        categories.insert("folder_2".to_string(), folder12);
        categories.insert("folder_3".to_string(), folder3);

        Self {
            allowed: vec!["folder_1".into(), "folder_2".into(), "folder_3".into()],
            categories,
        }
    }
}

fn column(name: &str, dtype: DeclaredType) -> ColumnSpec {
    ColumnSpec {
        name: name.to_string(),
        dtype,
    }
}
