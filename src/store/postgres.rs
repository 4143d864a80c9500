//! PostgreSQL transfer process store.
//!
//! Saves are compare-and-swap on the `version` column: an UPDATE only lands
//! if the row still carries the version the caller read.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use super::{StoreError, TransferProcessStore};
use crate::process::{ProcessType, TransferProcess, TransferProcessId, TransferProcessState};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transfer_processes_tb (
    id              TEXT PRIMARY KEY,
    process_type    SMALLINT NOT NULL,
    asset_id        TEXT NOT NULL,
    state           SMALLINT NOT NULL,
    state_count     INTEGER NOT NULL DEFAULT 1,
    state_timestamp BIGINT NOT NULL,
    error_detail    TEXT,
    version         BIGINT NOT NULL,
    created_at      BIGINT NOT NULL
)
"#;

const CREATE_STATE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_transfer_processes_state
    ON transfer_processes_tb (state, state_timestamp, id)
"#;

const SELECT_COLUMNS: &str = "id, process_type, asset_id, state, state_count, \
     state_timestamp, error_detail, version, created_at";

pub struct PgTransferProcessStore {
    pool: PgPool,
}

impl PgTransferProcessStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the table and the state index if they do not exist
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_STATE_INDEX).execute(&self.pool).await?;
        info!("transfer_processes_tb schema ready");
        Ok(())
    }

    async fn current_version(&self, id: TransferProcessId) -> Result<Option<u64>, StoreError> {
        let version = sqlx::query_scalar::<_, i64>(
            "SELECT version FROM transfer_processes_tb WHERE id = $1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(version.map(|v| v as u64))
    }

    async fn insert(&self, process: &mut TransferProcess) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO transfer_processes_tb
                (id, process_type, asset_id, state, state_count, state_timestamp,
                 error_detail, version, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(process.id().to_string())
        .bind(process.process_type().id())
        .bind(process.asset_id())
        .bind(process.state().code())
        .bind(encode_state_count(process)?)
        .bind(process.state_timestamp())
        .bind(process.error_detail())
        .bind(process.created_at())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let actual = self.current_version(process.id()).await?.unwrap_or(0);
            return Err(StoreError::Conflict {
                id: process.id(),
                expected: 0,
                actual,
            });
        }

        process.mark_saved(1);
        Ok(())
    }

    async fn update(&self, process: &mut TransferProcess) -> Result<(), StoreError> {
        let expected = process.version();

        let result = sqlx::query(
            r#"
            UPDATE transfer_processes_tb
            SET asset_id = $1, state = $2, state_count = $3, state_timestamp = $4,
                error_detail = $5, version = version + 1
            WHERE id = $6 AND version = $7
            "#,
        )
        .bind(process.asset_id())
        .bind(process.state().code())
        .bind(encode_state_count(process)?)
        .bind(process.state_timestamp())
        .bind(process.error_detail())
        .bind(process.id().to_string())
        .bind(expected as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.current_version(process.id()).await? {
                Some(actual) => Err(StoreError::Conflict {
                    id: process.id(),
                    expected,
                    actual,
                }),
                None => Err(StoreError::NotFound(process.id())),
            };
        }

        process.mark_saved(expected + 1);
        Ok(())
    }
}

#[async_trait]
impl TransferProcessStore for PgTransferProcessStore {
    async fn find_by_id(
        &self,
        id: TransferProcessId,
    ) -> Result<Option<TransferProcess>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transfer_processes_tb WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_process).transpose()
    }

    async fn next_for_state(
        &self,
        state: TransferProcessState,
        batch_size: usize,
    ) -> Result<Vec<TransferProcess>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transfer_processes_tb \
             WHERE state = $1 \
             ORDER BY state_timestamp ASC, id ASC \
             LIMIT $2",
            SELECT_COLUMNS
        ))
        .bind(state.code())
        .bind(i64::try_from(batch_size).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        debug!(state = %state, count = rows.len(), "Loaded transfer processes for state");

        rows.iter().map(row_to_process).collect()
    }

    async fn save(&self, process: &mut TransferProcess) -> Result<(), StoreError> {
        if process.version() == 0 {
            self.insert(process).await
        } else {
            self.update(process).await
        }
    }
}

/// Convert a database row to a TransferProcess
fn row_to_process(row: &sqlx::postgres::PgRow) -> Result<TransferProcess, StoreError> {
    let id_str: String = row.try_get("id").map_err(corrupt)?;
    let id: TransferProcessId = id_str
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("Invalid transfer process id: {}", id_str)))?;

    let process_type = decode_process_type(row.try_get("process_type").map_err(corrupt)?)?;
    let state = decode_state(row.try_get("state").map_err(corrupt)?)?;
    let state_count = decode_state_count(row.try_get("state_count").map_err(corrupt)?)?;
    let version: i64 = row.try_get("version").map_err(corrupt)?;

    Ok(TransferProcess::restore(
        id,
        process_type,
        row.try_get("asset_id").map_err(corrupt)?,
        state,
        state_count,
        row.try_get("state_timestamp").map_err(corrupt)?,
        row.try_get("error_detail").map_err(corrupt)?,
        version.max(0) as u64,
        row.try_get("created_at").map_err(corrupt)?,
    ))
}

fn decode_state(code: i16) -> Result<TransferProcessState, StoreError> {
    TransferProcessState::from_code(code)
        .ok_or_else(|| StoreError::Corrupt(format!("Invalid state code: {}", code)))
}

fn encode_state_count(process: &TransferProcess) -> Result<i32, StoreError> {
    i32::try_from(process.state_count()).map_err(|_| {
        StoreError::Corrupt(format!(
            "state_count {} of {} exceeds column range",
            process.state_count(),
            process.id()
        ))
    })
}

fn decode_state_count(count: i32) -> Result<u32, StoreError> {
    u32::try_from(count)
        .map_err(|_| StoreError::Corrupt(format!("Invalid state_count: {}", count)))
}

fn decode_process_type(id: i16) -> Result<ProcessType, StoreError> {
    ProcessType::from_id(id)
        .ok_or_else(|| StoreError::Corrupt(format!("Invalid process_type: {}", id)))
}

fn corrupt(e: sqlx::Error) -> StoreError {
    StoreError::Corrupt(e.to_string())
}
