use rusqlite::{params, Connection, Result as SqlResult};

use bankcache_types::{Cache, LoadOutcome, ParameterRecord};

use super::schema::{self, SCHEMA_VERSION};
use super::{path_text, time_to_nanos};

/// Write the whole cache. Performs DELETE-all + INSERT-current; the caller owns the transaction.
pub fn save_relational(conn: &Connection, cache: &Cache) -> SqlResult<()> {
    schema::delete_all_data(conn)?;

    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
        params![SCHEMA_VERSION],
    )?;
    conn.execute(
        "INSERT INTO cache_meta (id, last_build_marker_time_ns, generation) VALUES (1, ?1, ?2)",
        params![
            cache.last_build_marker_time.map(time_to_nanos),
            cache.generation as i64
        ],
    )?;

    save_banks(conn, cache)?;
    save_events(conn, cache)?;
    save_parameters(conn, cache)?;

    Ok(())
}

// ============================================================
// Banks
// ============================================================

fn save_banks(conn: &Connection, cache: &Cache) -> SqlResult<()> {
    let mut bank_stmt = conn.prepare(
        "INSERT INTO banks (path, name, last_modified_ns, role, outcome, outcome_events, outcome_guid)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    let mut size_stmt = conn.prepare(
        "INSERT INTO bank_platform_sizes (bank_path, platform, size) VALUES (?1, ?2, ?3)",
    )?;
    let mut global_stmt = conn.prepare(
        "INSERT INTO bank_global_parameters (bank_path, parameter_guid) VALUES (?1, ?2)",
    )?;

    for bank in cache.all_banks() {
        let path = path_text(&bank.path);
        let (outcome, events, guid) = match bank.load_outcome {
            LoadOutcome::Pending => ("pending", None, None),
            LoadOutcome::Loaded { events } => ("loaded", Some(events), None),
            LoadOutcome::Identified { guid } => ("identified", None, Some(guid.to_string())),
        };
        bank_stmt.execute(params![
            path,
            bank.name,
            bank.last_modified.map(time_to_nanos),
            bank.role.as_str(),
            outcome,
            events,
            guid,
        ])?;
        for (platform, size) in &bank.platform_sizes {
            size_stmt.execute(params![path, platform, *size as i64])?;
        }
        for guid in &bank.global_parameters {
            global_stmt.execute(params![path, guid.to_string()])?;
        }
    }
    Ok(())
}

// ============================================================
// Events
// ============================================================

fn save_events(conn: &Connection, cache: &Cache) -> SqlResult<()> {
    let mut event_stmt = conn.prepare(
        "INSERT INTO events (path, guid, is_3d, is_one_shot, is_stream, length, min_distance, max_distance)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    let mut bank_stmt = conn.prepare(
        "INSERT INTO event_banks (event_path, bank_path) VALUES (?1, ?2)",
    )?;
    let mut param_stmt = conn.prepare(
        "INSERT INTO event_parameters (event_path, position, guid, name, min, max, default_value, kind, labels)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;

    for event in cache.all_events() {
        event_stmt.execute(params![
            event.path,
            event.guid.to_string(),
            event.is_3d as i32,
            event.is_one_shot as i32,
            event.is_stream as i32,
            event.length,
            event.min_distance,
            event.max_distance,
        ])?;
        for bank in &event.banks {
            bank_stmt.execute(params![event.path, path_text(bank)])?;
        }
        for (position, param) in event.parameters.iter().enumerate() {
            param_stmt.execute(params![
                event.path,
                position as i64,
                param.guid.map(|g| g.to_string()),
                param.name,
                param.min,
                param.max,
                param.default,
                param.kind.as_str(),
                labels_json(param)?,
            ])?;
        }
    }
    Ok(())
}

// ============================================================
// Global parameters
// ============================================================

fn save_parameters(conn: &Connection, cache: &Cache) -> SqlResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO parameters (guid, name, min, max, default_value, kind, labels)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for (guid, param) in &cache.parameters {
        stmt.execute(params![
            guid.to_string(),
            param.name,
            param.min,
            param.max,
            param.default,
            param.kind.as_str(),
            labels_json(param)?,
        ])?;
    }
    Ok(())
}

fn labels_json(param: &ParameterRecord) -> SqlResult<String> {
    serde_json::to_string(&param.labels)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}
