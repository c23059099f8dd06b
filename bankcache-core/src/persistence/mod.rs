pub mod load;
pub mod save;
pub mod schema;

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection as SqlConnection, Result as SqlResult};

use bankcache_types::Cache;

/// Save the cache.
///
/// Uses WAL mode and an explicit transaction so the write is atomic:
/// if the process crashes mid-save the previous data remains intact.
pub fn save_cache(path: &Path, cache: &Cache) -> SqlResult<()> {
    let conn = SqlConnection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;

    let tx = conn.unchecked_transaction()?;
    schema::create_tables(&tx)?;
    save::save_relational(&tx, cache)?;
    tx.commit()?;

    Ok(())
}

/// Load a previously saved cache.
///
/// `Ok(None)` means there is nothing usable: no file, a file from before the
/// schema existed, or a different schema version. The caller rebuilds.
pub fn load_cache(path: &Path) -> SqlResult<Option<Cache>> {
    if !path.is_file() {
        return Ok(None);
    }
    let conn = SqlConnection::open(path)?;

    let has_schema_version: bool = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get::<_, i64>(0),
    )? > 0;
    if !has_schema_version {
        log::info!(target: "bankcache::persistence", "{} has no schema version; discarding", path.display());
        return Ok(None);
    }

    let version: Option<i64> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    match version {
        Some(v) if v == schema::SCHEMA_VERSION => load::load_relational(&conn, v).map(Some),
        other => {
            log::info!(
                target: "bankcache::persistence",
                "Discarding cache {} with schema version {:?} (expected {})",
                path.display(),
                other,
                schema::SCHEMA_VERSION
            );
            Ok(None)
        }
    }
}

pub(crate) fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Signed nanoseconds from the Unix epoch.
pub(crate) fn time_to_nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_nanos()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_nanos()).map_or(i64::MIN, |n| -n),
    }
}

pub(crate) fn nanos_to_time(nanos: i64) -> SystemTime {
    if nanos >= 0 {
        UNIX_EPOCH + Duration::from_nanos(nanos as u64)
    } else {
        UNIX_EPOCH - Duration::from_nanos(nanos.unsigned_abs())
    }
}
