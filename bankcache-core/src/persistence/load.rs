use std::collections::BTreeMap;
use std::path::PathBuf;

use rusqlite::types::Type;
use rusqlite::{params, Connection, Result as SqlResult};

use bankcache_types::{
    BankRecord, BankRole, Cache, EventRecord, Guid, LoadOutcome, ParameterKind, ParameterRecord,
};

use super::nanos_to_time;

/// Load the cache from relational tables. The caller has already checked the schema version.
pub fn load_relational(conn: &Connection, version: i64) -> SqlResult<Cache> {
    let mut cache = Cache::new();
    cache.schema_version = version as u32;

    let (marker_time, generation) = conn.query_row(
        "SELECT last_build_marker_time_ns, generation FROM cache_meta WHERE id = 1",
        [],
        |row| Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, i64>(1)?)),
    )?;
    cache.last_build_marker_time = marker_time.map(nanos_to_time);
    cache.generation = generation as u64;

    load_banks(conn, &mut cache)?;
    load_events(conn, &mut cache)?;
    load_parameters(conn, &mut cache)?;

    // Derived state is not persisted
    cache.recompute_role_sets();

    Ok(cache)
}

// ============================================================
// Banks
// ============================================================

fn load_banks(conn: &Connection, cache: &mut Cache) -> SqlResult<()> {
    let mut stmt = conn.prepare(
        "SELECT path, name, last_modified_ns, role, outcome, outcome_events, outcome_guid
         FROM banks ORDER BY path",
    )?;
    let rows = stmt.query_map([], |row| {
        let path: String = row.get(0)?;
        let mut bank = BankRecord::new(PathBuf::from(path), row.get::<_, String>(1)?);
        bank.last_modified = row.get::<_, Option<i64>>(2)?.map(nanos_to_time);
        bank.role = BankRole::parse(&row.get::<_, String>(3)?).unwrap_or_default();
        bank.load_outcome = match row.get::<_, String>(4)?.as_str() {
            "loaded" => LoadOutcome::Loaded {
                events: row.get::<_, Option<u32>>(5)?.unwrap_or(0),
            },
            "identified" => match row.get::<_, Option<String>>(6)? {
                Some(text) => LoadOutcome::Identified {
                    guid: guid_column(6, &text)?,
                },
                None => LoadOutcome::Pending,
            },
            _ => LoadOutcome::Pending,
        };
        Ok(bank)
    })?;
    for bank in rows {
        let bank = bank?;
        cache.banks.insert(bank.path.clone(), bank);
    }

    let mut stmt = conn.prepare("SELECT bank_path, platform, size FROM bank_platform_sizes")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
    })?;
    for row in rows {
        let (path, platform, size) = row?;
        if let Some(bank) = cache.banks.get_mut(&PathBuf::from(path)) {
            bank.platform_sizes.insert(platform, size as u64);
        }
    }

    let mut stmt = conn.prepare("SELECT bank_path, parameter_guid FROM bank_global_parameters")?;
    let rows = stmt.query_map([], |row| {
        let guid: String = row.get(1)?;
        Ok((row.get::<_, String>(0)?, guid_column(1, &guid)?))
    })?;
    for row in rows {
        let (path, guid) = row?;
        if let Some(bank) = cache.banks.get_mut(&PathBuf::from(path)) {
            bank.global_parameters.insert(guid);
        }
    }
    Ok(())
}

// ============================================================
// Events
// ============================================================

fn load_events(conn: &Connection, cache: &mut Cache) -> SqlResult<()> {
    let mut events: BTreeMap<String, EventRecord> = BTreeMap::new();

    let mut stmt = conn.prepare(
        "SELECT path, guid, is_3d, is_one_shot, is_stream, length, min_distance, max_distance
         FROM events",
    )?;
    let rows = stmt.query_map([], |row| {
        let guid: String = row.get(1)?;
        Ok(EventRecord {
            path: row.get(0)?,
            guid: guid_column(1, &guid)?,
            is_3d: row.get::<_, i32>(2)? != 0,
            is_one_shot: row.get::<_, i32>(3)? != 0,
            is_stream: row.get::<_, i32>(4)? != 0,
            length: row.get(5)?,
            min_distance: row.get(6)?,
            max_distance: row.get(7)?,
            parameters: Vec::new(),
            banks: Default::default(),
        })
    })?;
    for event in rows {
        let event = event?;
        events.insert(event.path.clone(), event);
    }

    let mut stmt = conn.prepare("SELECT event_path, bank_path FROM event_banks")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    for row in rows {
        let (event_path, bank_path) = row?;
        if let Some(event) = events.get_mut(&event_path) {
            event.banks.insert(PathBuf::from(bank_path));
        }
    }

    let mut stmt = conn.prepare(
        "SELECT event_path, guid, name, min, max, default_value, kind, labels
         FROM event_parameters ORDER BY event_path, position",
    )?;
    let rows = stmt.query_map([], |row| {
        let event_path: String = row.get(0)?;
        let guid = match row.get::<_, Option<String>>(1)? {
            Some(text) => Some(guid_column(1, &text)?),
            None => None,
        };
        let param = parameter_columns(row, guid, 2)?;
        Ok((event_path, param))
    })?;
    for row in rows {
        let (event_path, param) = row?;
        if let Some(event) = events.get_mut(&event_path) {
            event.parameters.push(param);
        }
    }

    for event in events.into_values() {
        cache.insert_event(event);
    }
    Ok(())
}

// ============================================================
// Global parameters
// ============================================================

fn load_parameters(conn: &Connection, cache: &mut Cache) -> SqlResult<()> {
    let mut stmt = conn.prepare(
        "SELECT guid, name, min, max, default_value, kind, labels FROM parameters",
    )?;
    let rows = stmt.query_map(params![], |row| {
        let text: String = row.get(0)?;
        let guid = guid_column(0, &text)?;
        Ok((guid, parameter_columns(row, Some(guid), 1)?))
    })?;
    for row in rows {
        let (guid, param) = row?;
        cache.parameters.insert(guid, param);
    }
    Ok(())
}

/// Decode `name, min, max, default_value, kind, labels` starting at column `first`.
fn parameter_columns(
    row: &rusqlite::Row<'_>,
    guid: Option<Guid>,
    first: usize,
) -> SqlResult<ParameterRecord> {
    let labels: String = row.get(first + 5)?;
    Ok(ParameterRecord {
        guid,
        name: row.get(first)?,
        min: row.get(first + 1)?,
        max: row.get(first + 2)?,
        default: row.get(first + 3)?,
        kind: ParameterKind::parse(&row.get::<_, String>(first + 4)?).unwrap_or_default(),
        labels: serde_json::from_str(&labels).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(first + 5, Type::Text, Box::new(e))
        })?,
    })
}

fn guid_column(index: usize, text: &str) -> SqlResult<Guid> {
    Guid::parse(text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            Type::Text,
            format!("invalid guid {:?}", text).into(),
        )
    })
}
