// src/normalize.rs
//
// Column-name and value normalization. BigQuery restricts column names to a
// plain character set, so raw header labels go through the same cleanup
// whether they end up as schema field names or as loaded column names.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::config::CategoryEntry;
use crate::frame::{Frame, Value};

/// Characters BigQuery does not allow in column names.
const CHARS_TO_REPLACE: [char; 8] = [' ', '%', '-', '(', ')', '[', ']', '/'];

/// Fixed name of the marker column recording the originating file per row.
pub const MARKER_COLUMN: &str = "file";
/// Fixed name of the ingestion timestamp column, inserted first.
pub const TIMESTAMP_COLUMN: &str = "ts_ms";

/// Rewrite one raw column label into a BigQuery-safe identifier.
///
/// Bracket tokens become words, disallowed characters become underscores, and
/// the result is transliterated to plain ASCII. Idempotent: cleaning an
/// already-clean name is a no-op.
pub fn normalize_name(raw: &str) -> String {
    let mut name = raw.replace("[+]", "plus").replace("[-]", "minus");
    for ch in CHARS_TO_REPLACE {
        name = name.replace(ch, "_");
    }
    deunicode::deunicode(&name)
}

pub fn normalize_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names.iter().map(|n| normalize_name(n.as_ref())).collect()
}

/// Parse a locale-formatted number: decimal comma, grouping spaces, and
/// non-breaking spaces (`"1 234,56"` → `1234.56`).
pub fn decimal_comma_to_f64(raw: &str) -> Result<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != ' ' && *c != '\u{a0}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned
        .parse::<f64>()
        .with_context(|| format!("parsing locale number {raw:?}"))
}

/// Apply category-specific normalization and stamp ingestion columns.
///
/// Order matters: header respellings and locale-number conversion first, then
/// the `file` marker and `ts_ms` columns are added so they are part of the
/// final name cleanup.
pub fn prepare_for_load(
    frame: &mut Frame,
    entry: &CategoryEntry,
    file_name: &str,
    loaded_at: DateTime<Utc>,
) -> Result<()> {
    for (from, to) in &entry.header_renames {
        frame.rename_column(from, to);
    }

    for column in &entry.float_override_columns {
        frame
            .map_column(column, |value| match value {
                Value::Str(s) => decimal_comma_to_f64(s).map(Value::Float),
                Value::Null => Ok(Value::Null),
                other => Ok(other.clone()),
            })
            .with_context(|| format!("normalizing locale numbers in {column:?}"))?;
    }

    frame.push_column(MARKER_COLUMN, Value::Str(file_name.to_string()));
    frame.insert_column(0, TIMESTAMP_COLUMN, Value::Timestamp(loaded_at));

    let cleaned = normalize_names(frame.columns());
    frame.set_columns(cleaned);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracket_tokens_become_words() {
        assert_eq!(normalize_name("[+]"), "plus");
        assert_eq!(normalize_name("[-]"), "minus");
        assert_eq!(normalize_name("Margin [%]"), "Margin____");
    }

    #[test]
    fn disallowed_chars_become_underscores() {
        assert_eq!(normalize_name("a b-c/d(e)"), "a_b_c_d_e_");
    }

    #[test]
    fn diacritics_are_transliterated() {
        assert_eq!(normalize_name("Číslo měny"), "Cislo_meny");
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = ["[+] obrat", "Cena / ks", "Číslo", "already_clean_1"];
        for raw in inputs {
            let once = normalize_name(raw);
            assert_eq!(normalize_name(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn locale_numbers_parse() {
        assert_eq!(decimal_comma_to_f64("1 234,56").unwrap(), 1234.56);
        assert_eq!(decimal_comma_to_f64("1\u{a0}234,56").unwrap(), 1234.56);
        assert_eq!(decimal_comma_to_f64("42").unwrap(), 42.0);
        assert!(decimal_comma_to_f64("abc").is_err());
    }
}
