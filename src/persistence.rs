//! Durable storage for match results, training blobs and the versioned config.
//!
//! The league consumes storage through the [`ResultStore`] trait so tests can run
//! against in-memory fakes. [`SqliteStore`] is the production implementation: two
//! tables (`results` and `run_conf`) plus one gzip stream of training records per
//! result id on disk.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use flate2::write::GzEncoder;
use flate2::Compression;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::config::TransientConfig;

/// One persisted result row, as replayed when seeding statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    /// Opponent the reference agent played.
    pub opponent_id: String,
    /// Outcome from the reference agent's perspective.
    pub outcome: i8,
    /// Node budget the opponent played under.
    pub opponent_nodes: i64,
}

/// Durable storage capability consumed by the control server.
///
/// All operations are scoped to the run id the store was opened with.
pub trait ResultStore {
    /// Persist one result row and return its generated result id.
    fn insert_result(
        &mut self,
        net_id: &str,
        opponent_id: &str,
        opponent_nodes: i64,
        outcome: i8,
    ) -> anyhow::Result<i64>;

    /// Persist the ordered training records of one match, keyed by result id.
    fn append_training_blobs(&mut self, result_id: i64, blobs: &[Vec<u8>]) -> anyhow::Result<()>;

    /// Load the persisted live config and its version, if one exists.
    fn load_config(&mut self) -> anyhow::Result<Option<(TransientConfig, i64)>>;

    /// Insert the config at version 0, or replace it and bump the version.
    ///
    /// Returns the stored version.
    fn upsert_config(&mut self, config: &TransientConfig) -> anyhow::Result<i64>;

    /// The most recent `n` results, ordered oldest first.
    fn recent_results(&mut self, n: usize) -> anyhow::Result<Vec<ResultRow>>;
}

/// SQLite-backed [`ResultStore`].
pub struct SqliteStore {
    run_id: String,
    conn: Connection,
    data_dir: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` for `run_id`.
    ///
    /// Training blob streams are written under `data_dir`.
    pub fn open(
        db_path: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        run_id: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let conn = Connection::open(db_path.into()).context("could not open results database")?;
        Self::with_connection(conn, data_dir, run_id)
    }

    /// In-memory database, for tests.
    pub fn open_in_memory(
        data_dir: impl Into<PathBuf>,
        run_id: impl Into<String>,
    ) -> anyhow::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, data_dir, run_id)
    }

    fn with_connection(
        conn: Connection,
        data_dir: impl Into<PathBuf>,
        run_id: impl Into<String>,
    ) -> anyhow::Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS results (
                id INTEGER PRIMARY KEY ASC,
                run_id TEXT,
                net_id TEXT,
                opponent_id TEXT,
                opponent_nodes INTEGER,
                outcome INTEGER
            );
            CREATE TABLE IF NOT EXISTS run_conf (
                run_id TEXT UNIQUE,
                config TEXT,
                version INTEGER
            );
            "#,
        )
        .context("could not create schema")?;
        Ok(Self {
            run_id: run_id.into(),
            conn,
            data_dir: data_dir.into(),
        })
    }

    fn blob_path(&self, result_id: i64) -> PathBuf {
        self.data_dir.join(format!("{}_{result_id}.gz", self.run_id))
    }
}

impl ResultStore for SqliteStore {
    fn insert_result(
        &mut self,
        net_id: &str,
        opponent_id: &str,
        opponent_nodes: i64,
        outcome: i8,
    ) -> anyhow::Result<i64> {
        self.conn
            .execute(
                "INSERT INTO results (run_id, net_id, opponent_id, opponent_nodes, outcome) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![self.run_id, net_id, opponent_id, opponent_nodes, outcome as i64],
            )
            .context("could not insert result row")?;
        Ok(self.conn.last_insert_rowid())
    }

    fn append_training_blobs(&mut self, result_id: i64, blobs: &[Vec<u8>]) -> anyhow::Result<()> {
        if blobs.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.data_dir).context("could not create training data directory")?;
        let path = self.blob_path(result_id);
        let file = File::create(&path)
            .with_context(|| format!("could not create {}", path.display()))?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        for blob in blobs {
            encoder.write_all(blob)?;
        }
        encoder.finish().context("could not finish gzip stream")?;
        debug!(result_id, blobs = blobs.len(), "training blobs written");
        Ok(())
    }

    fn load_config(&mut self) -> anyhow::Result<Option<(TransientConfig, i64)>> {
        let row: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT config, version FROM run_conf WHERE run_id = ?1",
                params![self.run_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("could not load config")?;
        match row {
            Some((json, version)) => {
                let config = serde_json::from_str(&json).context("stored config is malformed")?;
                Ok(Some((config, version)))
            }
            None => Ok(None),
        }
    }

    fn upsert_config(&mut self, config: &TransientConfig) -> anyhow::Result<i64> {
        let json = serde_json::to_string(config).context("could not serialize config")?;
        self.conn
            .execute(
                "INSERT INTO run_conf (run_id, config, version) VALUES (?1, ?2, 0) \
                 ON CONFLICT(run_id) DO UPDATE SET config = excluded.config, version = version + 1",
                params![self.run_id, json],
            )
            .context("could not upsert config")?;
        let version = self.conn.query_row(
            "SELECT version FROM run_conf WHERE run_id = ?1",
            params![self.run_id],
            |row| row.get(0),
        )?;
        Ok(version)
    }

    fn recent_results(&mut self, n: usize) -> anyhow::Result<Vec<ResultRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT opponent_id, outcome, opponent_nodes FROM results \
             WHERE run_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![self.run_id, n as i64], |row| {
                Ok(ResultRow {
                    opponent_id: row.get(0)?,
                    outcome: row.get::<_, i64>(1)? as i8,
                    opponent_nodes: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("could not read recent results")?;
        // newest-first from the query; replay wants chronological order
        Ok(rows.into_iter().rev().collect())
    }
}
