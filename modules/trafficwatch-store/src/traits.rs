//! Persistence contract consumed by the incident engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use trafficwatch_common::{
    BoundingBox, Incident, IncidentStatus, NewVote, Vote, VoteTally, VoteType,
};

use crate::error::StoreResult;

/// Durable keyed storage for incidents and their votes.
///
/// Implemented by `PgIncidentStore` (postgres) and `MemoryIncidentStore`
/// (tests, local runs). Every method either commits fully or not at all.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Insert a new incident together with the reporter's confirmation vote.
    async fn insert_incident(&self, incident: &Incident, reporter_vote: &NewVote)
        -> StoreResult<()>;

    async fn get_incident(&self, id: &str) -> StoreResult<Option<Incident>>;

    /// Set `status` and advance `updated_at` to the later of `updated_at`
    /// and one microsecond past the stored value, so a concurrent write
    /// that landed first is never rolled back. `None` when the incident
    /// does not exist.
    async fn update_status(
        &self,
        id: &str,
        status: IncidentStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Option<Incident>>;

    /// Range query: incidents inside `bounds` whose status is in `statuses`,
    /// newest first.
    async fn find_in_bounds(
        &self,
        bounds: &BoundingBox,
        statuses: &[IncidentStatus],
    ) -> StoreResult<Vec<Incident>>;

    /// Paginated listing, newest first with ties broken by id. An empty
    /// `statuses` slice applies no status restriction.
    async fn list_incidents(
        &self,
        statuses: &[IncidentStatus],
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<Incident>>;

    /// All vote rows for an incident, oldest first.
    async fn list_votes(&self, incident_id: &str) -> StoreResult<Vec<Vote>>;

    /// Open a write transaction holding an exclusive lock on the incident.
    ///
    /// Returns `None` if the incident does not exist. Concurrent callers for
    /// the same incident wait until the holder commits or drops.
    async fn begin_vote(&self, incident_id: &str) -> StoreResult<Option<Box<dyn VoteTransaction>>>;
}

/// A locked, uncommitted unit of vote bookkeeping for one incident.
///
/// Dropping without [`VoteTransaction::commit`] discards every write.
#[async_trait]
pub trait VoteTransaction: Send {
    /// The incident as read when the lock was taken.
    fn incident(&self) -> &Incident;

    /// The vote previously cast by an identified voter, if any.
    async fn find_voter_vote(&mut self, voter_id: &str) -> StoreResult<Option<Vote>>;

    /// Overwrite an existing vote's type and cast time in place.
    async fn update_vote(
        &mut self,
        vote_id: i64,
        vote_type: VoteType,
        cast_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn insert_vote(&mut self, vote: &NewVote) -> StoreResult<Vote>;

    /// Count this incident's vote rows grouped by vote type.
    async fn count_votes(&mut self) -> StoreResult<VoteTally>;

    /// Persist tallies and `updated_at` onto the incident.
    async fn save_tally(
        &mut self,
        tally: VoteTally,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Incident>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
