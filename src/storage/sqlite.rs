//! SQLite Persistent Storage for the Withdrawal Queue
//!
//! Durable storage that survives service restarts. Uses connection pooling
//! via r2d2 for concurrent access.
//!
//! Wei and share amounts are u128 and the two sentinel timestamps can be
//! u64::MAX, neither of which fits SQLite's signed 64-bit INTEGER, so those
//! columns are stored as decimal TEXT and parsed on load. Request ids,
//! checkpoint indices and wall-clock timestamps stay INTEGER.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

use alloy_primitives::Address;

use super::traits::{QueueSnapshot, QueueStore, StorageError, StorageResult};
use crate::queue::QueueGlobals;
use crate::types::{Checkpoint, CheckpointIndex, RequestId, WithdrawalRequest};

/// SQLite-backed queue store with connection pooling
pub struct SqliteQueueStore {
    pool: Pool<SqliteConnectionManager>,
}

fn parse_u128(text: &str) -> Result<u128, StorageError> {
    text.parse()
        .map_err(|_| StorageError::InvalidData(format!("bad u128 column: {text}")))
}

fn parse_u64(text: &str) -> Result<u64, StorageError> {
    text.parse()
        .map_err(|_| StorageError::InvalidData(format!("bad u64 column: {text}")))
}

fn parse_addr(text: &str) -> Result<Address, StorageError> {
    text.parse()
        .map_err(|_| StorageError::InvalidData(format!("bad address column: {text}")))
}

impl SqliteQueueStore {
    /// Create a new store with the given database path
    ///
    /// Creates the database file and runs migrations if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Get a connection from the pool
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS requests (
                id INTEGER PRIMARY KEY,
                cumulative_value TEXT NOT NULL,
                cumulative_shares TEXT NOT NULL,
                owner TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                claimed INTEGER NOT NULL DEFAULT 0,
                report_timestamp INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS checkpoints (
                idx INTEGER PRIMARY KEY,
                from_request_id INTEGER NOT NULL,
                max_share_rate TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS globals (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                last_finalized_request_id INTEGER NOT NULL,
                locked_value TEXT NOT NULL,
                resume_since_timestamp TEXT NOT NULL,
                bunker_mode_since_timestamp TEXT NOT NULL,
                last_report_timestamp INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS token_approvals (
                request_id INTEGER PRIMARY KEY,
                approved TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS operator_approvals (
                owner TEXT NOT NULL,
                operator TEXT NOT NULL,
                PRIMARY KEY (owner, operator)
            );

            CREATE INDEX IF NOT EXISTS idx_requests_owner ON requests(owner);
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    // Synchronous helper methods for the trait implementation

    fn insert_request_sync(
        &self,
        id: RequestId,
        entry: &WithdrawalRequest,
    ) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO requests (
                id, cumulative_value, cumulative_shares, owner,
                created_at, claimed, report_timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                id as i64,
                entry.cumulative_value.to_string(),
                entry.cumulative_shares.to_string(),
                entry.owner.to_string(),
                entry.created_at as i64,
                entry.claimed as i64,
                entry.report_timestamp as i64,
            ],
        )
        .map_err(|e| {
            if let rusqlite::Error::SqliteFailure(ref err, _) = e {
                if err.extended_code == 1555 || err.extended_code == 2067 {
                    return StorageError::Duplicate(format!("request {id}"));
                }
            }
            StorageError::Database(e.to_string())
        })?;

        Ok(())
    }

    fn mark_claimed_sync(&self, id: RequestId) -> Result<(), StorageError> {
        let conn = self.conn()?;

        let rows_affected = conn
            .execute(
                "UPDATE requests SET claimed = 1 WHERE id = ?1",
                params![id as i64],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if rows_affected == 0 {
            return Err(StorageError::NotFound(format!("request {id}")));
        }

        Ok(())
    }

    fn set_request_owner_sync(&self, id: RequestId, owner: Address) -> Result<(), StorageError> {
        let conn = self.conn()?;

        let rows_affected = conn
            .execute(
                "UPDATE requests SET owner = ?2 WHERE id = ?1",
                params![id as i64, owner.to_string()],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if rows_affected == 0 {
            return Err(StorageError::NotFound(format!("request {id}")));
        }

        Ok(())
    }

    fn insert_checkpoint_sync(
        &self,
        index: CheckpointIndex,
        checkpoint: &Checkpoint,
    ) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO checkpoints (idx, from_request_id, max_share_rate)
            VALUES (?1, ?2, ?3)
            "#,
            params![
                index as i64,
                checkpoint.from_request_id as i64,
                checkpoint.max_share_rate.to_string(),
            ],
        )
        .map_err(|e| {
            if let rusqlite::Error::SqliteFailure(ref err, _) = e {
                if err.extended_code == 1555 || err.extended_code == 2067 {
                    return StorageError::Duplicate(format!("checkpoint {index}"));
                }
            }
            StorageError::Database(e.to_string())
        })?;

        Ok(())
    }

    fn save_globals_sync(&self, globals: &QueueGlobals) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO globals (
                id, last_finalized_request_id, locked_value,
                resume_since_timestamp, bunker_mode_since_timestamp,
                last_report_timestamp
            ) VALUES (0, ?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                last_finalized_request_id = ?1,
                locked_value = ?2,
                resume_since_timestamp = ?3,
                bunker_mode_since_timestamp = ?4,
                last_report_timestamp = ?5
            "#,
            params![
                globals.last_finalized_request_id as i64,
                globals.locked_value.to_string(),
                globals.resume_since_timestamp.to_string(),
                globals.bunker_mode_since_timestamp.to_string(),
                globals.last_report_timestamp as i64,
            ],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    fn set_token_approval_sync(&self, id: RequestId, to: Address) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO token_approvals (request_id, approved) VALUES (?1, ?2)
            ON CONFLICT(request_id) DO UPDATE SET approved = ?2
            "#,
            params![id as i64, to.to_string()],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    fn clear_token_approval_sync(&self, id: RequestId) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute(
            "DELETE FROM token_approvals WHERE request_id = ?1",
            params![id as i64],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    fn set_operator_approval_sync(
        &self,
        owner: Address,
        operator: Address,
        approved: bool,
    ) -> Result<(), StorageError> {
        let conn = self.conn()?;

        if approved {
            conn.execute(
                r#"
                INSERT OR IGNORE INTO operator_approvals (owner, operator)
                VALUES (?1, ?2)
                "#,
                params![owner.to_string(), operator.to_string()],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        } else {
            conn.execute(
                "DELETE FROM operator_approvals WHERE owner = ?1 AND operator = ?2",
                params![owner.to_string(), operator.to_string()],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        }

        Ok(())
    }

    fn load_sync(&self) -> Result<QueueSnapshot, StorageError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, cumulative_value, cumulative_shares, owner,
                       created_at, claimed, report_timestamp
                FROM requests ORDER BY id ASC
                "#,
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            })
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut requests = Vec::with_capacity(rows.len());
        for (i, (id, value, shares, owner, created_at, claimed, report)) in
            rows.into_iter().enumerate()
        {
            // request ids must be a contiguous 1.. run for the prefix sums
            // to line up
            if id as u64 != (i + 1) as u64 {
                return Err(StorageError::InvalidData(format!(
                    "request id gap: expected {}, found {id}",
                    i + 1
                )));
            }
            requests.push(WithdrawalRequest {
                cumulative_value: parse_u128(&value)?,
                cumulative_shares: parse_u128(&shares)?,
                owner: parse_addr(&owner)?,
                created_at: created_at as u64,
                claimed: claimed != 0,
                report_timestamp: report as u64,
            });
        }

        let mut stmt = conn
            .prepare(
                "SELECT idx, from_request_id, max_share_rate FROM checkpoints ORDER BY idx ASC",
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut checkpoints = Vec::with_capacity(rows.len());
        for (i, (idx, from, rate)) in rows.into_iter().enumerate() {
            if idx as u64 != (i + 1) as u64 {
                return Err(StorageError::InvalidData(format!(
                    "checkpoint index gap: expected {}, found {idx}",
                    i + 1
                )));
            }
            checkpoints.push(Checkpoint {
                from_request_id: from as u64,
                max_share_rate: parse_u128(&rate)?,
            });
        }

        let globals = conn
            .query_row(
                r#"
                SELECT last_finalized_request_id, locked_value,
                       resume_since_timestamp, bunker_mode_since_timestamp,
                       last_report_timestamp
                FROM globals WHERE id = 0
                "#,
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let globals = match globals {
            Some((finalized, locked, resume, bunker, report)) => QueueGlobals {
                last_finalized_request_id: finalized as u64,
                locked_value: parse_u128(&locked)?,
                resume_since_timestamp: parse_u64(&resume)?,
                bunker_mode_since_timestamp: parse_u64(&bunker)?,
                last_report_timestamp: report as u64,
            },
            None => QueueGlobals::default(),
        };

        let mut stmt = conn
            .prepare("SELECT request_id, approved FROM token_approvals")
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut token_approvals = Vec::with_capacity(rows.len());
        for (id, to) in rows {
            token_approvals.push((id as u64, parse_addr(&to)?));
        }

        let mut stmt = conn
            .prepare("SELECT owner, operator FROM operator_approvals")
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut operator_approvals = Vec::with_capacity(rows.len());
        for (owner, operator) in rows {
            operator_approvals.push((parse_addr(&owner)?, parse_addr(&operator)?));
        }

        Ok(QueueSnapshot {
            requests,
            checkpoints,
            globals,
            token_approvals,
            operator_approvals,
        })
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn insert_request(&self, id: RequestId, entry: &WithdrawalRequest) -> StorageResult<()> {
        self.insert_request_sync(id, entry)
    }

    async fn mark_claimed(&self, id: RequestId) -> StorageResult<()> {
        self.mark_claimed_sync(id)
    }

    async fn set_request_owner(&self, id: RequestId, owner: Address) -> StorageResult<()> {
        self.set_request_owner_sync(id, owner)
    }

    async fn insert_checkpoint(
        &self,
        index: CheckpointIndex,
        checkpoint: &Checkpoint,
    ) -> StorageResult<()> {
        self.insert_checkpoint_sync(index, checkpoint)
    }

    async fn save_globals(&self, globals: &QueueGlobals) -> StorageResult<()> {
        self.save_globals_sync(globals)
    }

    async fn set_token_approval(&self, id: RequestId, to: Address) -> StorageResult<()> {
        self.set_token_approval_sync(id, to)
    }

    async fn clear_token_approval(&self, id: RequestId) -> StorageResult<()> {
        self.clear_token_approval_sync(id)
    }

    async fn set_operator_approval(
        &self,
        owner: Address,
        operator: Address,
        approved: bool,
    ) -> StorageResult<()> {
        self.set_operator_approval_sync(owner, operator, approved)
    }

    async fn load(&self) -> StorageResult<QueueSnapshot> {
        self.load_sync()
    }
}
