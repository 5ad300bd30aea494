// src/dedup.rs
//
// The gate preventing a file from being loaded twice. It is advisory, not
// transactional: it observes rows committed by earlier runs at read time and
// relies on the marker column written with every load.

use tracing::debug;

use crate::bq::{Warehouse, WarehouseError};

pub struct DedupGate<'a> {
    warehouse: &'a dyn Warehouse,
    dataset: &'a str,
}

impl<'a> DedupGate<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, dataset: &'a str) -> Self {
        Self { warehouse, dataset }
    }

    /// Whether `file_name` was already loaded into `{dataset}.{category}`.
    ///
    /// A missing destination table means nothing was ever loaded there, so the
    /// file proceeds. Any other query failure is surfaced to the caller, which
    /// isolates it to this file.
    pub async fn already_ingested(
        &self,
        category: &str,
        file_name: &str,
    ) -> Result<bool, WarehouseError> {
        let table_id = format!("{}.{}", self.dataset, category);
        match self.warehouse.marker_rows(&table_id, file_name).await {
            Ok(rows) => Ok(rows > 0),
            Err(WarehouseError::TableNotFound(_)) => {
                debug!(table_id, "destination table missing, treating as new");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
