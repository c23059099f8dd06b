use rusqlite::{Connection, Result as SqlResult};

use bankcache_types::CACHE_SCHEMA_VERSION;

/// Schema version written to `schema_version`. Tracks the cache layout version.
pub const SCHEMA_VERSION: i64 = CACHE_SCHEMA_VERSION as i64;

/// Create all tables.
pub fn create_tables(conn: &Connection) -> SqlResult<()> {
    conn.execute_batch(SCHEMA_SQL)
}

/// Delete all data from all tables (preserving schema).
pub fn delete_all_data(conn: &Connection) -> SqlResult<()> {
    conn.execute_batch(DELETE_ALL_SQL)
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cache_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last_build_marker_time_ns INTEGER,
    generation INTEGER NOT NULL
);

-- ============================================================
-- Banks
-- ============================================================

CREATE TABLE IF NOT EXISTS banks (
    path TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    last_modified_ns INTEGER,
    role TEXT NOT NULL,
    outcome TEXT NOT NULL,
    outcome_events INTEGER,
    outcome_guid TEXT
);

CREATE TABLE IF NOT EXISTS bank_platform_sizes (
    bank_path TEXT NOT NULL,
    platform TEXT NOT NULL,
    size INTEGER NOT NULL,
    PRIMARY KEY (bank_path, platform)
);

CREATE TABLE IF NOT EXISTS bank_global_parameters (
    bank_path TEXT NOT NULL,
    parameter_guid TEXT NOT NULL,
    PRIMARY KEY (bank_path, parameter_guid)
);

-- ============================================================
-- Events
-- ============================================================

CREATE TABLE IF NOT EXISTS events (
    path TEXT PRIMARY KEY,
    guid TEXT NOT NULL,
    is_3d INTEGER NOT NULL,
    is_one_shot INTEGER NOT NULL,
    is_stream INTEGER NOT NULL,
    length INTEGER NOT NULL,
    min_distance REAL NOT NULL,
    max_distance REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS event_banks (
    event_path TEXT NOT NULL,
    bank_path TEXT NOT NULL,
    PRIMARY KEY (event_path, bank_path)
);

-- guid is NULL for event-local parameters
CREATE TABLE IF NOT EXISTS event_parameters (
    event_path TEXT NOT NULL,
    position INTEGER NOT NULL,
    guid TEXT,
    name TEXT NOT NULL,
    min REAL NOT NULL,
    max REAL NOT NULL,
    default_value REAL NOT NULL,
    kind TEXT NOT NULL,
    labels TEXT NOT NULL DEFAULT '[]',
    PRIMARY KEY (event_path, position)
);

-- ============================================================
-- Global parameters
-- ============================================================

CREATE TABLE IF NOT EXISTS parameters (
    guid TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    min REAL NOT NULL,
    max REAL NOT NULL,
    default_value REAL NOT NULL,
    kind TEXT NOT NULL,
    labels TEXT NOT NULL DEFAULT '[]'
);
";

const DELETE_ALL_SQL: &str = "
DELETE FROM schema_version;
DELETE FROM cache_meta;
DELETE FROM banks;
DELETE FROM bank_platform_sizes;
DELETE FROM bank_global_parameters;
DELETE FROM events;
DELETE FROM event_banks;
DELETE FROM event_parameters;
DELETE FROM parameters;
";
