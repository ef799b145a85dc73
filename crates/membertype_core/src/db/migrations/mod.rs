//! Schema migrations for member type storage.
//!
//! Each step is an embedded SQL script tagged with the schema version it
//! produces. `PRAGMA user_version` records the last applied step, so opening
//! an already migrated database is a no-op and a database written by a newer
//! build is refused instead of being downgraded.
//!
//! Steps:
//! - v1 `0001_init.sql`: `member_types`, `property_groups`, `property_types`.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;

/// One embedded schema step.
#[derive(Debug, Clone, Copy)]
struct SchemaStep {
    version: u32,
    script: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[SchemaStep {
    version: 1,
    script: include_str!("0001_init.sql"),
}];

/// Schema version produced by the newest embedded step.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Brings `conn` up to [`latest_version`] inside one transaction.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the database is ahead of this build.
/// - `Sqlite` when a step fails; no step of the batch is kept.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from_version = schema_version(conn)?;
    let to_version = latest_version();

    if from_version > to_version {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: to_version,
        });
    }
    if from_version == to_version {
        debug!(
            "event=db_migrate module=db status=skip version={}",
            from_version
        );
        return Ok(());
    }

    info!(
        "event=db_migrate module=db status=start from_version={} to_version={}",
        from_version, to_version
    );

    let tx = conn.transaction()?;
    for step in SCHEMA_STEPS.iter().filter(|step| step.version > from_version) {
        tx.execute_batch(step.script)?;
        tx.pragma_update(None, "user_version", step.version)?;
        debug!(
            "event=db_migrate_step module=db status=ok version={}",
            step.version
        );
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok version={}",
        to_version
    );
    Ok(())
}

/// Reads the schema version stored in `PRAGMA user_version`.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
