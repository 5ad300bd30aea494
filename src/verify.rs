// src/verify.rs
//
// Post-load row-count verification for the storage variant: recompute the row
// count from the raw gzip blob and compare it to what the load job reported.
// A mismatch is worth a warning, never an abort — the rows are already in the
// destination table either way.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::io::{BufRead, BufReader};
use tracing::{info, warn};

/// Count data rows in a gzip-compressed CSV blob, excluding the header line.
pub fn gzip_data_rows(bytes: &[u8]) -> Result<u64> {
    let mut reader = BufReader::new(GzDecoder::new(bytes));
    let mut lines = 0u64;
    let mut buf = String::new();
    loop {
        buf.clear();
        let read = reader
            .read_line(&mut buf)
            .context("reading decompressed blob")?;
        if read == 0 {
            break;
        }
        lines += 1;
    }
    Ok(lines.saturating_sub(1))
}

/// Compare the warehouse-reported row count against the recomputed one.
pub fn rows_match(file: &str, reported: u64, counted: u64) -> bool {
    if reported == counted {
        info!(file, rows = reported, "row count verified");
        true
    } else {
        warn!(
            file,
            reported, counted, "row count mismatch between load job and source blob"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(content: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn counts_rows_without_header() {
        let blob = gzip("id;name\n1;a\n2;b\n3;c\n");
        assert_eq!(gzip_data_rows(&blob).unwrap(), 3);
    }

    #[test]
    fn header_only_blob_has_zero_rows() {
        let blob = gzip("id;name\n");
        assert_eq!(gzip_data_rows(&blob).unwrap(), 0);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(gzip_data_rows(b"definitely not gzip").is_err());
    }

    #[test]
    fn match_and_mismatch() {
        assert!(rows_match("a.csv.gz", 3, 3));
        assert!(!rows_match("a.csv.gz", 3, 4));
    }
}
