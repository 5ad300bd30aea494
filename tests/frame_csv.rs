// tests/frame_csv.rs
// Frame parsing against the per-category parser options: encodings, skip
// rows, delimiters, decimal markers, and date columns.

use chrono::{TimeZone, Utc};

use drive_bq_connector::config::{CategoryConfig, CategoryEntry};
use drive_bq_connector::frame::{Frame, Value};

fn folder1_entry() -> CategoryEntry {
    CategoryConfig::seed().entry("folder_1").unwrap().clone()
}

#[test]
fn cp1250_headers_decode() {
    let mut entry = folder1_entry();
    entry.skip_rows = 0;
    // "Číslo,column_2\n1,a\n" with Č (0xC8) and í (0xED) in cp1250
    let mut bytes = vec![0xC8, 0xED, 0x73, 0x6C, 0x6F];
    bytes.extend_from_slice(b",column_2\n1,a\n");

    let frame = Frame::read_csv(&bytes, &entry).unwrap();
    assert_eq!(frame.columns()[0], "Číslo");
    assert_eq!(frame.rows()[0][1], Value::Str("a".into()));
}

#[test]
fn skip_rows_drop_preamble_before_the_header() {
    let entry = folder1_entry(); // skip_rows = 2
    let csv = "preamble\nexport: 2024\n\
               column_1,column_2,column_3,column_4,column_5,column_6,column_7,col_date\n\
               3,a,b,1.5,2.5,c,3.5,01.02.2024\n";
    let frame = Frame::read_csv(csv.as_bytes(), &entry).unwrap();
    assert_eq!(frame.row_count(), 1);
    assert_eq!(frame.rows()[0][0], Value::Int(3));
}

#[test]
fn dayfirst_dates_parse_into_timestamps() {
    let entry = folder1_entry();
    let csv = "x\ny\n\
               column_1,column_2,column_3,column_4,column_5,column_6,column_7,col_date\n\
               1,a,b,1.0,2.0,c,3.0,15.05.2024\n";
    let frame = Frame::read_csv(csv.as_bytes(), &entry).unwrap();
    let idx = frame.column_index("col_date").unwrap();
    assert_eq!(
        frame.rows()[0][idx],
        Value::Timestamp(Utc.with_ymd_and_hms(2024, 5, 15, 0, 0, 0).unwrap())
    );
}

#[test]
fn decimal_marker_option_is_honored_for_declared_floats() {
    let mut entry = folder1_entry();
    entry.skip_rows = 0;
    entry.delimiter = ';';
    entry.decimal = ',';
    let csv = "column_4;column_2\n12,5;a\n";
    let frame = Frame::read_csv(csv.as_bytes(), &entry).unwrap();
    assert_eq!(frame.rows()[0][0], Value::Float(12.5));
}

#[test]
fn quoted_fields_keep_embedded_delimiters() {
    let mut entry = folder1_entry();
    entry.skip_rows = 0;
    let csv = "column_2,column_3\n\"a,b\",c\n";
    let frame = Frame::read_csv(csv.as_bytes(), &entry).unwrap();
    assert_eq!(frame.rows()[0][0], Value::Str("a,b".into()));
}

#[test]
fn empty_cells_are_null() {
    let mut entry = folder1_entry();
    entry.skip_rows = 0;
    let csv = "column_1,column_2\n,a\n";
    let frame = Frame::read_csv(csv.as_bytes(), &entry).unwrap();
    assert_eq!(frame.rows()[0][0], Value::Null);
}
