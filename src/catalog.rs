// src/catalog.rs
//
// Source object model and the object-store trait seam. The pipeline only sees
// this trait; the Drive client implements it for production and tests plug in
// in-memory fakes.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use crate::config::CategoryConfig;

/// One candidate file as listed by the remote store. Immutable once listed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceObject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub trashed: bool,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
}

/// Listing and fetching against the remote object store.
#[async_trait]
pub trait ObjectStore {
    /// Candidate tabular files modified after `since`.
    async fn discover(&self, since: DateTime<Utc>) -> Result<Vec<SourceObject>>;

    /// Container id → category name, listed once per run.
    async fn resolve_categories(&self) -> Result<HashMap<String, String>>;

    /// Raw bytes of one object.
    async fn fetch(&self, object: &SourceObject) -> Result<Vec<u8>>;
}

/// Default discovery window start: midnight at the start of the previous day.
pub fn previous_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    (now - Duration::days(1))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc()
}

/// Category name → destination table identifier.
pub fn table_name(category: &str) -> String {
    category.replace(' ', "_")
}

/// Resolve an object's destination table, applying the drop rules: trashed
/// objects, unresolvable containers, and categories outside the allow-list
/// yield `None` and the object is never processed.
pub fn categorize(
    object: &SourceObject,
    folders: &HashMap<String, String>,
    config: &CategoryConfig,
) -> Option<String> {
    if object.trashed {
        return None;
    }
    let parent = object.parents.first()?;
    let category = folders.get(parent)?;
    if !config.is_allowed(category) {
        return None;
    }
    Some(table_name(category))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn object(parent: &str, trashed: bool) -> SourceObject {
        SourceObject {
            id: "f1".into(),
            name: "a.csv".into(),
            mime_type: "text/csv".into(),
            parents: vec![parent.into()],
            trashed,
            modified_time: None,
        }
    }

    #[test]
    fn window_starts_at_previous_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 5, 15, 13, 45, 12).unwrap();
        let since = previous_midnight(now);
        assert_eq!(
            since,
            Utc.with_ymd_and_hms(2024, 5, 14, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn spaces_become_underscores_in_table_names() {
        assert_eq!(table_name("sales reports"), "sales_reports");
        assert_eq!(table_name("folder_1"), "folder_1");
    }

    #[test]
    fn categorize_applies_drop_rules() {
        let cfg = CategoryConfig::seed();
        let folders = HashMap::from([
            ("p1".to_string(), "folder_1".to_string()),
            ("p2".to_string(), "not_allowed".to_string()),
        ]);

        assert_eq!(
            categorize(&object("p1", false), &folders, &cfg),
            Some("folder_1".to_string())
        );
        // trashed
        assert_eq!(categorize(&object("p1", true), &folders, &cfg), None);
        // unknown container
        assert_eq!(categorize(&object("p9", false), &folders, &cfg), None);
        // category outside the allow-list
        assert_eq!(categorize(&object("p2", false), &folders, &cfg), None);
    }
}
