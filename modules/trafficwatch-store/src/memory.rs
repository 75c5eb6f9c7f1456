//! In-memory incident store for tests and local runs. No database required.
//!
//! A single async mutex guards all state. A vote transaction holds the guard
//! for its whole lifetime and stages writes on copies, so commit is atomic
//! and drop discards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use trafficwatch_common::{
    newest_first, BoundingBox, Incident, IncidentStatus, NewVote, Vote, VoteTally, VoteType,
};

use crate::error::{StoreError, StoreResult};
use crate::traits::{IncidentStore, VoteTransaction};

#[derive(Default)]
struct MemoryState {
    incidents: HashMap<String, Incident>,
    votes: Vec<Vote>,
    next_vote_id: i64,
}

impl MemoryState {
    fn allocate_vote_id(&mut self) -> i64 {
        self.next_vote_id += 1;
        self.next_vote_id
    }
}

#[derive(Clone, Default)]
pub struct MemoryIncidentStore {
    state: Arc<Mutex<MemoryState>>,
    offline: Arc<AtomicBool>,
}

impl MemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail as if the database were
    /// unreachable (for failure-path tests).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Offline("memory store is offline".into()));
        }
        Ok(())
    }
}

fn status_allowed(statuses: &[IncidentStatus], status: IncidentStatus) -> bool {
    statuses.is_empty() || statuses.contains(&status)
}

#[async_trait]
impl IncidentStore for MemoryIncidentStore {
    async fn insert_incident(
        &self,
        incident: &Incident,
        reporter_vote: &NewVote,
    ) -> StoreResult<()> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        if state.incidents.contains_key(&incident.id) {
            return Err(StoreError::Duplicate(incident.id.clone()));
        }

        let id = state.allocate_vote_id();
        state.votes.push(Vote {
            id,
            incident_id: incident.id.clone(),
            voter_id: reporter_vote.voter_id.clone(),
            vote_type: reporter_vote.vote_type,
            cast_at: reporter_vote.cast_at,
        });
        state.incidents.insert(incident.id.clone(), incident.clone());
        Ok(())
    }

    async fn get_incident(&self, id: &str) -> StoreResult<Option<Incident>> {
        self.check_online()?;
        Ok(self.state.lock().await.incidents.get(id).cloned())
    }

    async fn update_status(
        &self,
        id: &str,
        status: IncidentStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Option<Incident>> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        Ok(state.incidents.get_mut(id).map(|incident| {
            incident.status = status;
            incident.updated_at = updated_at.max(incident.updated_at + Duration::microseconds(1));
            incident.clone()
        }))
    }

    async fn find_in_bounds(
        &self,
        bounds: &BoundingBox,
        statuses: &[IncidentStatus],
    ) -> StoreResult<Vec<Incident>> {
        self.check_online()?;
        let state = self.state.lock().await;
        let mut found: Vec<Incident> = state
            .incidents
            .values()
            .filter(|i| statuses.contains(&i.status) && bounds.contains(&i.location))
            .cloned()
            .collect();
        found.sort_by(newest_first);
        Ok(found)
    }

    async fn list_incidents(
        &self,
        statuses: &[IncidentStatus],
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<Incident>> {
        self.check_online()?;
        let state = self.state.lock().await;
        let mut all: Vec<Incident> = state
            .incidents
            .values()
            .filter(|i| status_allowed(statuses, i.status))
            .cloned()
            .collect();
        all.sort_by(newest_first);
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_votes(&self, incident_id: &str) -> StoreResult<Vec<Vote>> {
        self.check_online()?;
        let state = self.state.lock().await;
        Ok(state
            .votes
            .iter()
            .filter(|v| v.incident_id == incident_id)
            .cloned()
            .collect())
    }

    async fn begin_vote(&self, incident_id: &str) -> StoreResult<Option<Box<dyn VoteTransaction>>> {
        self.check_online()?;
        let guard = self.state.clone().lock_owned().await;
        let Some(incident) = guard.incidents.get(incident_id).cloned() else {
            return Ok(None);
        };
        let votes = guard
            .votes
            .iter()
            .filter(|v| v.incident_id == incident_id)
            .cloned()
            .collect();
        let next_vote_id = guard.next_vote_id;

        Ok(Some(Box::new(MemoryVoteTransaction {
            guard,
            incident,
            votes,
            next_vote_id,
            offline: self.offline.clone(),
        })))
    }
}

// ---------------------------------------------------------------------------
// MemoryVoteTransaction
// ---------------------------------------------------------------------------

struct MemoryVoteTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    incident: Incident,
    /// Staged copy of this incident's votes.
    votes: Vec<Vote>,
    next_vote_id: i64,
    offline: Arc<AtomicBool>,
}

impl MemoryVoteTransaction {
    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Offline("memory store is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl VoteTransaction for MemoryVoteTransaction {
    fn incident(&self) -> &Incident {
        &self.incident
    }

    async fn find_voter_vote(&mut self, voter_id: &str) -> StoreResult<Option<Vote>> {
        self.check_online()?;
        Ok(self
            .votes
            .iter()
            .find(|v| v.voter_id.as_deref() == Some(voter_id))
            .cloned())
    }

    async fn update_vote(
        &mut self,
        vote_id: i64,
        vote_type: VoteType,
        cast_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.check_online()?;
        if let Some(vote) = self.votes.iter_mut().find(|v| v.id == vote_id) {
            vote.vote_type = vote_type;
            vote.cast_at = cast_at;
        }
        Ok(())
    }

    async fn insert_vote(&mut self, vote: &NewVote) -> StoreResult<Vote> {
        self.check_online()?;
        self.next_vote_id += 1;
        let stored = Vote {
            id: self.next_vote_id,
            incident_id: self.incident.id.clone(),
            voter_id: vote.voter_id.clone(),
            vote_type: vote.vote_type,
            cast_at: vote.cast_at,
        };
        self.votes.push(stored.clone());
        Ok(stored)
    }

    async fn count_votes(&mut self) -> StoreResult<VoteTally> {
        self.check_online()?;
        let mut tally = VoteTally::default();
        for vote in &self.votes {
            tally.add(vote.vote_type, 1);
        }
        Ok(tally)
    }

    async fn save_tally(
        &mut self,
        tally: VoteTally,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Incident> {
        self.check_online()?;
        self.incident.votes_confirm = tally.confirm;
        self.incident.votes_dispute = tally.dispute;
        self.incident.updated_at = updated_at;
        Ok(self.incident.clone())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.check_online()?;
        let MemoryVoteTransaction {
            mut guard,
            incident,
            votes,
            next_vote_id,
            ..
        } = *self;

        guard.votes.retain(|v| v.incident_id != incident.id);
        guard.votes.extend(votes);
        guard.votes.sort_by_key(|v| v.id);
        guard.next_vote_id = next_vote_id;
        guard.incidents.insert(incident.id.clone(), incident);
        Ok(())
    }
}
