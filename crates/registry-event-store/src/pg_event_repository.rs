//! `PostgreSQL` implementation of the `EventRepository` trait.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use registry_core::correlation::CorrelationId;
use registry_core::error::DomainError;
use registry_core::repository::{EventRepository, StoredEvent};

const LOAD_SINCE_SQL: &str = r"
SELECT event_id, aggregate_id, event_type, payload, version,
       correlation_id, causation_id, occurred_at
FROM domain_events
WHERE aggregate_id = $1 AND version > $2
ORDER BY version ASC
";

const LOAD_BY_CORRELATION_SQL: &str = r"
SELECT event_id, aggregate_id, event_type, payload, version,
       correlation_id, causation_id, occurred_at
FROM domain_events
WHERE aggregate_id = $1 AND correlation_id = $2
ORDER BY version ASC
";

// Serializes appenders of one aggregate for the rest of the transaction.
const LOCK_AGGREGATE_SQL: &str =
    "SELECT pg_advisory_xact_lock(hashtextextended(($1::uuid)::text, 0))";

const CURRENT_VERSION_SQL: &str =
    "SELECT COALESCE(MAX(version), 0) FROM domain_events WHERE aggregate_id = $1";

const INSERT_SQL: &str = r"
INSERT INTO domain_events
    (event_id, aggregate_id, event_type, payload, version,
     correlation_id, causation_id, occurred_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
";

/// PostgreSQL-backed event repository.
#[derive(Debug, Clone)]
pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    /// Creates a new `PgEventRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn infrastructure(err: &sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("event store: {err}"))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

fn to_stored_event(row: &PgRow) -> Result<StoredEvent, sqlx::Error> {
    Ok(StoredEvent {
        event_id: row.try_get("event_id")?,
        aggregate_root_id: row.try_get("aggregate_id")?,
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        version: row.try_get("version")?,
        correlation_id: CorrelationId::from_uuid(row.try_get("correlation_id")?),
        causation_id: row.try_get("causation_id")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

fn to_stored_events(rows: &[PgRow]) -> Result<Vec<StoredEvent>, DomainError> {
    rows.iter()
        .map(to_stored_event)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| infrastructure(&e))
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn load_events_since(
        &self,
        aggregate_root_id: Uuid,
        starting_version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let rows = sqlx::query(LOAD_SINCE_SQL)
            .bind(aggregate_root_id)
            .bind(starting_version)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| infrastructure(&e))?;
        to_stored_events(&rows)
    }

    async fn load_events_by_correlation_id(
        &self,
        aggregate_root_id: Uuid,
        correlation_id: CorrelationId,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let rows = sqlx::query(LOAD_BY_CORRELATION_SQL)
            .bind(aggregate_root_id)
            .bind(correlation_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| infrastructure(&e))?;
        to_stored_events(&rows)
    }

    async fn append_events(
        &self,
        aggregate_root_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(|e| infrastructure(&e))?;

        sqlx::query(LOCK_AGGREGATE_SQL)
            .bind(aggregate_root_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| infrastructure(&e))?;

        let actual: i64 = sqlx::query_scalar(CURRENT_VERSION_SQL)
            .bind(aggregate_root_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| infrastructure(&e))?;

        if actual != expected_version {
            warn!(
                aggregate_root_id = %aggregate_root_id,
                expected_version,
                actual_version = actual,
                "rejecting append with stale expected version"
            );
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: aggregate_root_id,
                expected: expected_version,
                actual,
            });
        }

        for event in events {
            let inserted = sqlx::query(INSERT_SQL)
                .bind(event.event_id)
                .bind(event.aggregate_root_id)
                .bind(&event.event_type)
                .bind(&event.payload)
                .bind(event.version)
                .bind(event.correlation_id.as_uuid())
                .bind(event.causation_id)
                .bind(event.occurred_at)
                .execute(&mut *tx)
                .await;

            if let Err(err) = inserted {
                if is_unique_violation(&err) {
                    return Err(DomainError::ConcurrencyConflict {
                        aggregate_id: aggregate_root_id,
                        expected: expected_version,
                        actual: event.version,
                    });
                }
                return Err(infrastructure(&err));
            }
        }

        tx.commit().await.map_err(|e| infrastructure(&e))?;

        debug!(
            aggregate_root_id = %aggregate_root_id,
            count = events.len(),
            "appended events"
        );
        Ok(())
    }
}
