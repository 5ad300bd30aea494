// tests/schema_derive.rs

use drive_bq_connector::config::{CategoryConfig, ColumnSpec, DeclaredType};
use drive_bq_connector::schema::{derive, with_ingestion_fields};

#[test]
fn length_is_columns_plus_date_columns() {
    let cfg = CategoryConfig::seed();
    for name in &cfg.allowed {
        let entry = cfg.entry(name).unwrap();
        assert_eq!(
            derive(entry).len(),
            entry.columns.len() + entry.date_columns.len()
        );
    }
}

#[test]
fn declared_types_map_to_bq_primitives() {
    let cfg = CategoryConfig::seed();
    let entry = cfg.entry("folder_1").unwrap();
    let schema = derive(entry);
    assert_eq!(schema[0].field_type, "INT64");
    assert_eq!(schema[1].field_type, "STRING");
    assert_eq!(schema[3].field_type, "FLOAT64");
}

#[test]
fn float_override_is_applied_before_mapping() {
    let cfg = CategoryConfig::seed();
    let entry = cfg.entry("folder_3").unwrap();
    let schema = derive(entry);
    // column_4 is declared string but its raw values are locale floats
    let column_4 = schema.iter().find(|f| f.description == "column_4").unwrap();
    assert_eq!(column_4.field_type, "FLOAT64");
}

#[test]
fn date_columns_come_last_as_timestamps() {
    let cfg = CategoryConfig::seed();
    let entry = cfg.entry("folder_1").unwrap();
    let schema = derive(entry);
    let last = schema.last().unwrap();
    assert_eq!(last.field_type, "TIMESTAMP");
    assert_eq!(last.description, "col_date");
}

#[test]
fn field_names_are_normalized_and_descriptions_keep_the_raw_label() {
    let mut entry = CategoryConfig::seed().entry("folder_1").unwrap().clone();
    entry.columns.push(ColumnSpec {
        name: "[+] obrat / měsíc".to_string(),
        dtype: DeclaredType::Float,
    });
    let schema = derive(&entry);
    let field = schema
        .iter()
        .find(|f| f.description == "[+] obrat / měsíc")
        .unwrap();
    assert_eq!(field.name, "plus_obrat___mesic");
}

#[test]
fn derivation_is_deterministic() {
    let cfg = CategoryConfig::seed();
    let entry = cfg.entry("folder_2").unwrap();
    assert_eq!(derive(entry), derive(entry));
}

#[test]
fn ingestion_fields_do_not_disturb_business_order() {
    let cfg = CategoryConfig::seed();
    let entry = cfg.entry("folder_1").unwrap();
    let business = derive(entry);
    let full = with_ingestion_fields(business.clone());
    assert_eq!(full.len(), business.len() + 2);
    assert_eq!(full[1..full.len() - 1], business[..]);
}
