//! Postgres-backed incident store.
//!
//! The vote path runs inside a transaction that takes `SELECT ... FOR UPDATE`
//! on the incident row, so tally recomputation is serialized per incident.
//! Every round trip is bounded by the configured timeout; a timed-out
//! transaction is dropped, which rolls it back.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use trafficwatch_common::{
    BoundingBox, GeoPoint, Incident, IncidentStatus, NewVote, Vote, VoteTally, VoteType,
};

use crate::error::{StoreError, StoreResult};
use crate::traits::{IncidentStore, VoteTransaction};

const INCIDENT_COLUMNS: &str = "id, kind, severity, status, latitude, longitude, description, \
     address, affected_lanes, estimated_duration, reported_by, created_at, updated_at, \
     votes_confirm, votes_dispute";

const VOTE_COLUMNS: &str = "id, incident_id, voter_id, vote_type, cast_at";

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct IncidentRow {
    id: String,
    kind: String,
    severity: String,
    status: String,
    latitude: f64,
    longitude: f64,
    description: String,
    address: Option<String>,
    affected_lanes: Option<String>,
    estimated_duration: Option<String>,
    reported_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    votes_confirm: i64,
    votes_dispute: i64,
}

impl TryFrom<IncidentRow> for Incident {
    type Error = StoreError;

    fn try_from(row: IncidentRow) -> StoreResult<Self> {
        let corrupt = |e: trafficwatch_common::TrafficError| StoreError::CorruptRow {
            table: "traffic_incidents",
            detail: format!("{}: {e}", row.id),
        };
        Ok(Incident {
            kind: row.kind.parse().map_err(corrupt)?,
            severity: row.severity.parse().map_err(corrupt)?,
            status: row.status.parse().map_err(corrupt)?,
            location: GeoPoint::new(row.latitude, row.longitude),
            description: row.description,
            address: row.address,
            affected_lanes: row.affected_lanes,
            estimated_duration: row.estimated_duration,
            reported_by: row.reported_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            votes_confirm: row.votes_confirm,
            votes_dispute: row.votes_dispute,
            id: row.id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VoteRow {
    id: i64,
    incident_id: String,
    voter_id: Option<String>,
    vote_type: String,
    cast_at: DateTime<Utc>,
}

impl TryFrom<VoteRow> for Vote {
    type Error = StoreError;

    fn try_from(row: VoteRow) -> StoreResult<Self> {
        let vote_type = parse_vote_type(&row.vote_type)?;
        Ok(Vote {
            id: row.id,
            incident_id: row.incident_id,
            voter_id: row.voter_id,
            vote_type,
            cast_at: row.cast_at,
        })
    }
}

fn parse_vote_type(raw: &str) -> StoreResult<VoteType> {
    raw.parse().map_err(|e| StoreError::CorruptRow {
        table: "incident_votes",
        detail: format!("{e}"),
    })
}

fn into_incidents(rows: Vec<IncidentRow>) -> StoreResult<Vec<Incident>> {
    rows.into_iter().map(Incident::try_from).collect()
}

fn status_strings(statuses: &[IncidentStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// LIMIT/OFFSET values beyond `i64::MAX` select nothing either way.
fn clamp_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Bound a store round trip by `limit`.
async fn timed<T, E, F>(limit: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<StoreError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

// ---------------------------------------------------------------------------
// PgIncidentStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgIncidentStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgIncidentStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        timeout: Duration,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool, timeout))
    }

    /// Apply the schema migrations (idempotent).
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl IncidentStore for PgIncidentStore {
    async fn insert_incident(
        &self,
        incident: &Incident,
        reporter_vote: &NewVote,
    ) -> StoreResult<()> {
        let insert = async {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r#"
                INSERT INTO traffic_incidents (
                    id, kind, severity, status, latitude, longitude, description,
                    address, affected_lanes, estimated_duration, reported_by,
                    created_at, updated_at, votes_confirm, votes_dispute
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .bind(&incident.id)
            .bind(incident.kind.as_str())
            .bind(incident.severity.as_str())
            .bind(incident.status.as_str())
            .bind(incident.location.lat)
            .bind(incident.location.lng)
            .bind(&incident.description)
            .bind(&incident.address)
            .bind(&incident.affected_lanes)
            .bind(&incident.estimated_duration)
            .bind(&incident.reported_by)
            .bind(incident.created_at)
            .bind(incident.updated_at)
            .bind(incident.votes_confirm)
            .bind(incident.votes_dispute)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO incident_votes (incident_id, voter_id, vote_type, cast_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(&incident.id)
            .bind(&reporter_vote.voter_id)
            .bind(reporter_vote.vote_type.as_str())
            .bind(reporter_vote.cast_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok::<_, sqlx::Error>(())
        };

        timed(self.timeout, insert).await
    }

    async fn get_incident(&self, id: &str) -> StoreResult<Option<Incident>> {
        let sql = format!("SELECT {INCIDENT_COLUMNS} FROM traffic_incidents WHERE id = $1");
        let row = timed(
            self.timeout,
            sqlx::query_as::<_, IncidentRow>(&sql)
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await?;

        row.map(Incident::try_from).transpose()
    }

    async fn update_status(
        &self,
        id: &str,
        status: IncidentStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Option<Incident>> {
        let sql = format!(
            "UPDATE traffic_incidents \
             SET status = $2, updated_at = GREATEST($3, updated_at + interval '1 microsecond') \
             WHERE id = $1 RETURNING {INCIDENT_COLUMNS}"
        );
        let row = timed(
            self.timeout,
            sqlx::query_as::<_, IncidentRow>(&sql)
                .bind(id)
                .bind(status.as_str())
                .bind(updated_at)
                .fetch_optional(&self.pool),
        )
        .await?;

        row.map(Incident::try_from).transpose()
    }

    async fn find_in_bounds(
        &self,
        bounds: &BoundingBox,
        statuses: &[IncidentStatus],
    ) -> StoreResult<Vec<Incident>> {
        let lng_clause = if bounds.crosses_antimeridian() {
            "(longitude >= $3 OR longitude <= $4)"
        } else {
            "longitude BETWEEN $3 AND $4"
        };
        let sql = format!(
            "SELECT {INCIDENT_COLUMNS} FROM traffic_incidents \
             WHERE latitude BETWEEN $1 AND $2 AND {lng_clause} AND status = ANY($5) \
             ORDER BY created_at DESC, id ASC"
        );
        let rows = timed(
            self.timeout,
            sqlx::query_as::<_, IncidentRow>(&sql)
                .bind(bounds.south)
                .bind(bounds.north)
                .bind(bounds.west)
                .bind(bounds.east)
                .bind(status_strings(statuses))
                .fetch_all(&self.pool),
        )
        .await?;

        debug!(candidates = rows.len(), "Bounding-box query");
        into_incidents(rows)
    }

    async fn list_incidents(
        &self,
        statuses: &[IncidentStatus],
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<Incident>> {
        let rows = if statuses.is_empty() {
            let sql = format!(
                "SELECT {INCIDENT_COLUMNS} FROM traffic_incidents \
                 ORDER BY created_at DESC, id ASC LIMIT $1 OFFSET $2"
            );
            timed(
                self.timeout,
                sqlx::query_as::<_, IncidentRow>(&sql)
                    .bind(clamp_i64(limit))
                    .bind(clamp_i64(offset))
                    .fetch_all(&self.pool),
            )
            .await?
        } else {
            let sql = format!(
                "SELECT {INCIDENT_COLUMNS} FROM traffic_incidents WHERE status = ANY($1) \
                 ORDER BY created_at DESC, id ASC LIMIT $2 OFFSET $3"
            );
            timed(
                self.timeout,
                sqlx::query_as::<_, IncidentRow>(&sql)
                    .bind(status_strings(statuses))
                    .bind(clamp_i64(limit))
                    .bind(clamp_i64(offset))
                    .fetch_all(&self.pool),
            )
            .await?
        };

        into_incidents(rows)
    }

    async fn list_votes(&self, incident_id: &str) -> StoreResult<Vec<Vote>> {
        let sql = format!(
            "SELECT {VOTE_COLUMNS} FROM incident_votes WHERE incident_id = $1 ORDER BY id ASC"
        );
        let rows = timed(
            self.timeout,
            sqlx::query_as::<_, VoteRow>(&sql)
                .bind(incident_id)
                .fetch_all(&self.pool),
        )
        .await?;

        rows.into_iter().map(Vote::try_from).collect()
    }

    async fn begin_vote(&self, incident_id: &str) -> StoreResult<Option<Box<dyn VoteTransaction>>> {
        let mut tx = timed(self.timeout, self.pool.begin()).await?;

        let sql = format!("SELECT {INCIDENT_COLUMNS} FROM traffic_incidents WHERE id = $1 FOR UPDATE");
        let locked = timed(
            self.timeout,
            sqlx::query_as::<_, IncidentRow>(&sql)
                .bind(incident_id)
                .fetch_optional(&mut *tx),
        )
        .await?;

        // Missing incident: `tx` drops here and rolls back.
        let Some(row) = locked else {
            return Ok(None);
        };

        Ok(Some(Box::new(PgVoteTransaction {
            tx,
            incident: Incident::try_from(row)?,
            timeout: self.timeout,
        })))
    }
}

// ---------------------------------------------------------------------------
// PgVoteTransaction
// ---------------------------------------------------------------------------

struct PgVoteTransaction {
    tx: Transaction<'static, Postgres>,
    incident: Incident,
    timeout: Duration,
}

#[async_trait]
impl VoteTransaction for PgVoteTransaction {
    fn incident(&self) -> &Incident {
        &self.incident
    }

    async fn find_voter_vote(&mut self, voter_id: &str) -> StoreResult<Option<Vote>> {
        let limit = self.timeout;
        let sql = format!(
            "SELECT {VOTE_COLUMNS} FROM incident_votes WHERE incident_id = $1 AND voter_id = $2"
        );
        let row = timed(
            limit,
            sqlx::query_as::<_, VoteRow>(&sql)
                .bind(&self.incident.id)
                .bind(voter_id)
                .fetch_optional(&mut *self.tx),
        )
        .await?;

        row.map(Vote::try_from).transpose()
    }

    async fn update_vote(
        &mut self,
        vote_id: i64,
        vote_type: VoteType,
        cast_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let limit = self.timeout;
        timed(
            limit,
            sqlx::query("UPDATE incident_votes SET vote_type = $2, cast_at = $3 WHERE id = $1")
                .bind(vote_id)
                .bind(vote_type.as_str())
                .bind(cast_at)
                .execute(&mut *self.tx),
        )
        .await?;
        Ok(())
    }

    async fn insert_vote(&mut self, vote: &NewVote) -> StoreResult<Vote> {
        let limit = self.timeout;
        let sql = format!(
            "INSERT INTO incident_votes (incident_id, voter_id, vote_type, cast_at) \
             VALUES ($1, $2, $3, $4) RETURNING {VOTE_COLUMNS}"
        );
        let row = timed(
            limit,
            sqlx::query_as::<_, VoteRow>(&sql)
                .bind(&self.incident.id)
                .bind(&vote.voter_id)
                .bind(vote.vote_type.as_str())
                .bind(vote.cast_at)
                .fetch_one(&mut *self.tx),
        )
        .await?;

        Vote::try_from(row)
    }

    async fn count_votes(&mut self) -> StoreResult<VoteTally> {
        let limit = self.timeout;
        let rows = timed(
            limit,
            sqlx::query_as::<_, (String, i64)>(
                r#"
                SELECT vote_type, COUNT(*)
                FROM incident_votes
                WHERE incident_id = $1
                GROUP BY vote_type
                "#,
            )
            .bind(&self.incident.id)
            .fetch_all(&mut *self.tx),
        )
        .await?;

        let mut tally = VoteTally::default();
        for (vote_type, count) in rows {
            tally.add(parse_vote_type(&vote_type)?, count);
        }
        Ok(tally)
    }

    async fn save_tally(
        &mut self,
        tally: VoteTally,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Incident> {
        let limit = self.timeout;
        let sql = format!(
            "UPDATE traffic_incidents \
             SET votes_confirm = $2, votes_dispute = $3, updated_at = $4 \
             WHERE id = $1 RETURNING {INCIDENT_COLUMNS}"
        );
        let row = timed(
            limit,
            sqlx::query_as::<_, IncidentRow>(&sql)
                .bind(&self.incident.id)
                .bind(tally.confirm)
                .bind(tally.dispute)
                .bind(updated_at)
                .fetch_one(&mut *self.tx),
        )
        .await?;

        Incident::try_from(row)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        timed(self.timeout, self.tx.commit()).await
    }
}
