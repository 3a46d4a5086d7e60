//! SurrealDB schema initialization
//!
//! One schemaless table per collection. Rows hold the record key as
//! `path` and the record JSON as `data`. Safe to call on every start.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::storage_traits::{Collection, StorageResult};

/// Define every board table if it does not exist yet.
pub async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    info!("Initializing board SurrealDB schema");

    for collection in Collection::ALL {
        init_collection_table(db, collection).await?;
    }

    info!("Board schema initialization complete");
    Ok(())
}

/// Schema:
/// ```text
/// TABLE <collection> {
///   path: ARRAY<STRING>   (record key parts)
///   data: STRING          (record JSON)
/// }
/// ```
async fn init_collection_table(db: &Surreal<Any>, collection: Collection) -> StorageResult<()> {
    let table = table_name(collection);
    debug!(table = %table, "Initializing collection table");

    let sql = format!(
        r#"
        DEFINE TABLE IF NOT EXISTS {table} SCHEMALESS;
        DEFINE FIELD IF NOT EXISTS path ON {table} TYPE array<string>;
        DEFINE FIELD IF NOT EXISTS data ON {table} TYPE string;
        "#
    );

    db.query(sql)
        .await
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;

    Ok(())
}

/// Table identifier for a collection (`pull-requests` is not a bare ident).
pub(crate) fn table_name(collection: Collection) -> String {
    collection.as_str().replace('-', "_")
}
