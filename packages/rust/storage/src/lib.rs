//! libSQL storage layer for reconciled cyclone events.
//!
//! The [`Storage`] struct wraps a local libSQL database holding the canonical
//! node/track/buffer rows plus a per-event episode cursor and ingest-run
//! history.
//!
//! The one non-trivial contract here is [`Storage::replace_event`]: the
//! delete of an event's previous rows and the insert of its fresh rows run
//! inside a single transaction, so readers never observe a half-swapped
//! event and a failed insert leaves the prior state untouched.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use uuid::Uuid;

use stormtrack_shared::{Buffer, EventMeta, GeoPoint, Node, Result, StormtrackError, Track};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StormtrackError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StormtrackError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| StormtrackError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    StormtrackError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Event replacement (the atomic swap)
    // -----------------------------------------------------------------------

    /// Replace all stored rows for one event with freshly computed state,
    /// as a single transactional unit, and advance the episode cursor.
    ///
    /// Re-running with the same `(event_id, episode_id)` replaces rather
    /// than duplicates.
    pub async fn replace_event(
        &self,
        meta: &EventMeta,
        nodes: &[Node],
        track: &Track,
        buffers: &[Buffer],
    ) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| StormtrackError::Storage(e.to_string()))?;

        for table in ["nodes", "tracks", "buffers"] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE event_id = ?1"),
                params![meta.event_id],
            )
            .await
            .map_err(|e| StormtrackError::Storage(e.to_string()))?;
        }

        for node in nodes {
            tx.execute(
                "INSERT INTO nodes (event_id, episode_id, event_name, wind_speed,
                                    timestamp, released_date, lon, lat, shape_wkt)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    node.event_id,
                    node.episode_id,
                    node.event_name.as_str(),
                    node.wind_speed,
                    node.timestamp.to_rfc3339(),
                    node.released_date.to_rfc3339(),
                    node.position.lon,
                    node.position.lat,
                    node.position.to_wkt(),
                ],
            )
            .await
            .map_err(|e| StormtrackError::Storage(e.to_string()))?;
        }

        tx.execute(
            "INSERT INTO tracks (event_id, episode_id, event_name, timestamp, shape_wkt)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                track.event_id,
                track.episode_id,
                track.event_name.as_str(),
                track.timestamp.to_rfc3339(),
                track.path.to_wkt(),
            ],
        )
        .await
        .map_err(|e| StormtrackError::Storage(e.to_string()))?;

        for buffer in buffers {
            tx.execute(
                "INSERT INTO buffers (event_id, episode_id, event_name, timestamp,
                                      severity, label, shape_wkt)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    buffer.event_id,
                    buffer.episode_id,
                    buffer.event_name.as_str(),
                    buffer.timestamp.to_rfc3339(),
                    buffer.severity.as_str(),
                    buffer.label.as_str(),
                    buffer.boundary.to_wkt(),
                ],
            )
            .await
            .map_err(|e| StormtrackError::Storage(e.to_string()))?;
        }

        tx.execute(
            "INSERT INTO events (event_id, event_name, episode_id, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(event_id) DO UPDATE SET
               event_name = excluded.event_name,
               episode_id = excluded.episode_id,
               updated_at = excluded.updated_at",
            params![
                meta.event_id,
                meta.event_name.as_str(),
                meta.episode_id,
                Utc::now().to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| StormtrackError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StormtrackError::Storage(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Cursor & queries
    // -----------------------------------------------------------------------

    /// The newest episode whose rows are stored for an event, if any.
    pub async fn last_stored_episode(&self, event_id: i64) -> Result<Option<i64>> {
        let mut rows = self
            .conn
            .query(
                "SELECT episode_id FROM events WHERE event_id = ?1",
                params![event_id],
            )
            .await
            .map_err(|e| StormtrackError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row.get::<i64>(0)
                    .map_err(|e| StormtrackError::Storage(e.to_string()))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(StormtrackError::Storage(e.to_string())),
        }
    }

    /// All stored events as `(event_id, event_name, episode_id)`.
    pub async fn list_events(&self) -> Result<Vec<(i64, String, i64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT event_id, event_name, episode_id FROM events ORDER BY event_id",
                params![],
            )
            .await
            .map_err(|e| StormtrackError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push((
                row.get::<i64>(0)
                    .map_err(|e| StormtrackError::Storage(e.to_string()))?,
                row.get::<String>(1)
                    .map_err(|e| StormtrackError::Storage(e.to_string()))?,
                row.get::<i64>(2)
                    .map_err(|e| StormtrackError::Storage(e.to_string()))?,
            ));
        }
        Ok(results)
    }

    /// An event's stored nodes, in insertion (chronological) order.
    pub async fn list_nodes(&self, event_id: i64) -> Result<Vec<Node>> {
        let mut rows = self
            .conn
            .query(
                "SELECT event_id, episode_id, event_name, wind_speed,
                        timestamp, released_date, lon, lat
                 FROM nodes WHERE event_id = ?1 ORDER BY id",
                params![event_id],
            )
            .await
            .map_err(|e| StormtrackError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_node(&row)?);
        }
        Ok(results)
    }

    /// The stored track WKT for an event, if any.
    pub async fn track_wkt(&self, event_id: i64) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT shape_wkt FROM tracks WHERE event_id = ?1",
                params![event_id],
            )
            .await
            .map_err(|e| StormtrackError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row.get::<String>(0)
                    .map_err(|e| StormtrackError::Storage(e.to_string()))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(StormtrackError::Storage(e.to_string())),
        }
    }

    /// An event's stored buffers as `(severity, label)`.
    pub async fn list_buffers(&self, event_id: i64) -> Result<Vec<(String, String)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT severity, label FROM buffers WHERE event_id = ?1 ORDER BY id",
                params![event_id],
            )
            .await
            .map_err(|e| StormtrackError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push((
                row.get::<String>(0)
                    .map_err(|e| StormtrackError::Storage(e.to_string()))?,
                row.get::<String>(1)
                    .map_err(|e| StormtrackError::Storage(e.to_string()))?,
            ));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Ingest run history
    // -----------------------------------------------------------------------

    /// Record the start of an ingest run. Returns the generated run ID.
    pub async fn insert_ingest_run(&self, mode: &str) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO ingest_runs (id, mode, started_at) VALUES (?1, ?2, ?3)",
                params![id.as_str(), mode, now.as_str()],
            )
            .await
            .map_err(|e| StormtrackError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Record completion of an ingest run with its stats.
    pub async fn finish_ingest_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE ingest_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(|e| StormtrackError::Storage(e.to_string()))?;
        Ok(())
    }
}

/// Convert a database row to a [`Node`].
fn row_to_node(row: &libsql::Row) -> Result<Node> {
    Ok(Node {
        event_id: row
            .get::<i64>(0)
            .map_err(|e| StormtrackError::Storage(e.to_string()))?,
        episode_id: row
            .get::<i64>(1)
            .map_err(|e| StormtrackError::Storage(e.to_string()))?,
        event_name: row
            .get::<String>(2)
            .map_err(|e| StormtrackError::Storage(e.to_string()))?,
        wind_speed: row
            .get::<f64>(3)
            .map_err(|e| StormtrackError::Storage(e.to_string()))?,
        timestamp: rfc3339_column(row, 4)?,
        released_date: rfc3339_column(row, 5)?,
        position: GeoPoint::new(
            row.get::<f64>(6)
                .map_err(|e| StormtrackError::Storage(e.to_string()))?,
            row.get::<f64>(7)
                .map_err(|e| StormtrackError::Storage(e.to_string()))?,
        ),
    })
}

fn rfc3339_column(row: &libsql::Row, idx: i32) -> Result<DateTime<Utc>> {
    let s: String = row
        .get(idx)
        .map_err(|e| StormtrackError::Storage(e.to_string()))?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StormtrackError::Storage(format!("invalid date: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stormtrack_shared::{PolygonGeom, Polyline, Severity};

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("st_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 7, 2, h, 0, 0).unwrap()
    }

    fn sample_state(event_id: i64, episode_id: i64) -> (EventMeta, Vec<Node>, Track, Vec<Buffer>) {
        let meta = EventMeta {
            event_id,
            event_name: "ELSA-21".into(),
            episode_id,
            timestamp: ts(12),
        };
        let nodes: Vec<Node> = (0..3)
            .map(|i| Node {
                event_id,
                episode_id,
                event_name: meta.event_name.clone(),
                wind_speed: 60.0 + i as f64,
                timestamp: meta.timestamp,
                released_date: ts(i),
                position: GeoPoint::new(-61.0 + i as f64, 14.0),
            })
            .collect();
        let track = Track {
            event_id,
            episode_id,
            event_name: meta.event_name.clone(),
            timestamp: meta.timestamp,
            path: Polyline(nodes.iter().map(|n| n.position).collect()),
        };
        let buffers = vec![Buffer {
            event_id,
            episode_id,
            event_name: meta.event_name.clone(),
            timestamp: meta.timestamp,
            severity: Severity::Red,
            label: "Storm surge".into(),
            boundary: PolygonGeom {
                rings: vec![vec![
                    GeoPoint::new(0.0, 0.0),
                    GeoPoint::new(1.0, 0.0),
                    GeoPoint::new(0.0, 0.0),
                ]],
            },
        }];
        (meta, nodes, track, buffers)
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("st_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn replace_event_roundtrip() {
        let storage = test_storage().await;
        let (meta, nodes, track, buffers) = sample_state(1000132, 4);

        storage
            .replace_event(&meta, &nodes, &track, &buffers)
            .await
            .expect("replace");

        assert_eq!(
            storage.last_stored_episode(1000132).await.unwrap(),
            Some(4)
        );

        let stored = storage.list_nodes(1000132).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].released_date, ts(0));
        assert_eq!(stored[2].position.lon, -59.0);

        let wkt = storage.track_wkt(1000132).await.unwrap().unwrap();
        assert!(wkt.starts_with("LINESTRING ("));

        let buffers = storage.list_buffers(1000132).await.unwrap();
        assert_eq!(buffers, vec![("red".to_string(), "Storm surge".to_string())]);
    }

    #[tokio::test]
    async fn replace_does_not_duplicate() {
        let storage = test_storage().await;
        let (meta, nodes, track, buffers) = sample_state(7, 2);

        storage
            .replace_event(&meta, &nodes, &track, &buffers)
            .await
            .unwrap();
        storage
            .replace_event(&meta, &nodes, &track, &buffers)
            .await
            .unwrap();

        assert_eq!(storage.list_nodes(7).await.unwrap().len(), 3);
        assert_eq!(storage.list_buffers(7).await.unwrap().len(), 1);
        assert_eq!(storage.list_events().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replace_advances_cursor() {
        let storage = test_storage().await;
        let (meta, nodes, track, buffers) = sample_state(9, 1);
        storage
            .replace_event(&meta, &nodes, &track, &buffers)
            .await
            .unwrap();

        let (meta2, nodes2, track2, buffers2) = sample_state(9, 5);
        storage
            .replace_event(&meta2, &nodes2, &track2, &buffers2)
            .await
            .unwrap();

        assert_eq!(storage.last_stored_episode(9).await.unwrap(), Some(5));
        let events = storage.list_events().await.unwrap();
        assert_eq!(events, vec![(9, "ELSA-21".to_string(), 5)]);
    }

    #[tokio::test]
    async fn cursor_missing_for_unknown_event() {
        let storage = test_storage().await;
        assert_eq!(storage.last_stored_episode(404).await.unwrap(), None);
    }

    #[tokio::test]
    async fn events_are_isolated() {
        let storage = test_storage().await;
        let (m1, n1, t1, b1) = sample_state(1, 1);
        let (m2, n2, t2, b2) = sample_state(2, 3);
        storage.replace_event(&m1, &n1, &t1, &b1).await.unwrap();
        storage.replace_event(&m2, &n2, &t2, &b2).await.unwrap();

        // Replacing event 1 must not touch event 2's rows.
        storage.replace_event(&m1, &n1[..2], &t1, &[]).await.unwrap();
        assert_eq!(storage.list_nodes(1).await.unwrap().len(), 2);
        assert_eq!(storage.list_nodes(2).await.unwrap().len(), 3);
        assert_eq!(storage.list_buffers(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ingest_run_lifecycle() {
        let storage = test_storage().await;
        let run_id = storage
            .insert_ingest_run("backfill")
            .await
            .expect("insert run");
        assert!(!run_id.is_empty());

        storage
            .finish_ingest_run(&run_id, r#"{"events": 10}"#)
            .await
            .expect("finish run");
    }
}
