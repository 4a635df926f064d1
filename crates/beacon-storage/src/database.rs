// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! Within one process all statements are serialized through tokio-rusqlite's
//! single background thread. Separate processes (several `beacon work`
//! instances) each hold their own `Database`; cross-process safety comes
//! from SQLite locking and `BEGIN IMMEDIATE` on every read-modify-write.

use std::time::Duration;

use beacon_config::model::StorageConfig;
use beacon_core::BeaconError;
use tracing::debug;

use crate::migrations;

/// Convert a tokio-rusqlite error into `BeaconError::StoreUnavailable`.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> BeaconError {
    BeaconError::StoreUnavailable {
        source: Box::new(e),
    }
}

fn unavailable(e: impl std::fmt::Display) -> BeaconError {
    BeaconError::StoreUnavailable {
        source: e.to_string().into(),
    }
}

/// Handle to the Beacon SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    path: String,
}

impl Database {
    /// Open (or create) the database at `path` with default settings and
    /// run pending migrations.
    pub async fn open(path: &str) -> Result<Self, BeaconError> {
        let config = StorageConfig {
            database_path: path.to_string(),
            ..StorageConfig::default()
        };
        Self::open_with_config(&config).await
    }

    /// Open the database described by `config` and run pending migrations.
    pub async fn open_with_config(config: &StorageConfig) -> Result<Self, BeaconError> {
        let path = config.database_path.clone();
        if let Some(parent) = std::path::Path::new(&path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| BeaconError::StoreUnavailable {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(unavailable)?;

        let wal_mode = config.wal_mode;
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        conn.call(move |conn| -> Result<Result<(), BeaconError>, rusqlite::Error> {
            conn.busy_timeout(busy_timeout)?;
            if wal_mode {
                // journal_mode returns the resulting mode as a row.
                let _mode: String =
                    conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
            }
            conn.execute_batch(
                "PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;",
            )?;
            Ok(migrations::run_migrations(conn))
        })
        .await
        .map_err(map_tr_err)??;

        debug!(path = %path, wal_mode, "database opened");
        Ok(Self { conn, path })
    }

    /// The underlying async connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Filesystem path this database was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Round-trip a trivial statement to prove the connection is alive.
    pub async fn ping(&self) -> Result<(), BeaconError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint the WAL into the main database file.
    pub async fn checkpoint(&self) -> Result<(), BeaconError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Checkpoint and close the connection.
    pub async fn close(self) -> Result<(), BeaconError> {
        self.checkpoint().await?;
        self.conn.close().await.map_err(unavailable)
    }
}
