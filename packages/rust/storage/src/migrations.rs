//! SQL migration definitions for the stormtrack database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as a batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: events, nodes, tracks, buffers, ingest_runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Per-event cursor: the newest episode whose rows are stored
CREATE TABLE IF NOT EXISTS events (
    event_id   INTEGER PRIMARY KEY,
    event_name TEXT NOT NULL,
    episode_id INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

-- Point observations
CREATE TABLE IF NOT EXISTS nodes (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id      INTEGER NOT NULL,
    episode_id    INTEGER NOT NULL,
    event_name    TEXT NOT NULL,
    wind_speed    REAL NOT NULL,
    timestamp     TEXT NOT NULL,
    released_date TEXT NOT NULL,
    lon           REAL NOT NULL,
    lat           REAL NOT NULL,
    shape_wkt     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_nodes_event ON nodes(event_id);
CREATE INDEX IF NOT EXISTS idx_nodes_event_episode ON nodes(event_id, episode_id);

-- One track polyline per event
CREATE TABLE IF NOT EXISTS tracks (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id   INTEGER NOT NULL,
    episode_id INTEGER NOT NULL,
    event_name TEXT NOT NULL,
    timestamp  TEXT NOT NULL,
    shape_wkt  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tracks_event ON tracks(event_id);

-- Hazard-severity polygons
CREATE TABLE IF NOT EXISTS buffers (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id   INTEGER NOT NULL,
    episode_id INTEGER NOT NULL,
    event_name TEXT NOT NULL,
    timestamp  TEXT NOT NULL,
    severity   TEXT NOT NULL,
    label      TEXT NOT NULL,
    shape_wkt  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_buffers_event ON buffers(event_id);

-- Ingestion run history
CREATE TABLE IF NOT EXISTS ingest_runs (
    id          TEXT PRIMARY KEY,
    mode        TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
