//! Vote bookkeeping.
//!
//! Identified voters hold at most one effective vote per incident: a repeat
//! vote overwrites the earlier row in place. Anonymous votes always add a
//! row. After every write the tallies are recounted from the vote rows
//! inside the same locked transaction, never incremented.

use std::sync::Arc;

use tracing::info;
use trafficwatch_common::limits::{optional_text, PRINCIPAL_ID_MAX_CHARS};
use trafficwatch_common::{Incident, NewVote, TrafficError, VoteTally, VoteType};
use trafficwatch_store::IncidentStore;

use crate::clock;

/// Result of a recorded vote.
#[derive(Debug, Clone)]
pub struct VoteOutcome {
    pub incident: Incident,
    pub tally: VoteTally,
    /// The voter already had a vote on this incident and it was overwritten.
    pub replaced: bool,
}

#[derive(Clone)]
pub struct VoteLedger {
    store: Arc<dyn IncidentStore>,
}

impl VoteLedger {
    pub fn new(store: Arc<dyn IncidentStore>) -> Self {
        Self { store }
    }

    /// Record a vote and persist the recomputed tallies.
    ///
    /// A blank `voter_id` is treated as anonymous.
    pub async fn cast_vote(
        &self,
        incident_id: &str,
        vote_type: VoteType,
        voter_id: Option<&str>,
    ) -> Result<VoteOutcome, TrafficError> {
        optional_text("voter_id", voter_id, PRINCIPAL_ID_MAX_CHARS)?;
        let voter_id = voter_id.map(str::trim).filter(|v| !v.is_empty());

        let Some(mut tx) = self.store.begin_vote(incident_id).await? else {
            return Err(TrafficError::NotFound(incident_id.to_string()));
        };

        let cast_at = clock::after(tx.incident().updated_at);
        let mut replaced = false;

        match voter_id {
            Some(voter) => match tx.find_voter_vote(voter).await? {
                Some(existing) => {
                    tx.update_vote(existing.id, vote_type, cast_at).await?;
                    replaced = true;
                }
                None => {
                    tx.insert_vote(&NewVote {
                        voter_id: Some(voter.to_string()),
                        vote_type,
                        cast_at,
                    })
                    .await?;
                }
            },
            None => {
                tx.insert_vote(&NewVote {
                    voter_id: None,
                    vote_type,
                    cast_at,
                })
                .await?;
            }
        }

        let tally = tx.count_votes().await?;
        let incident = tx.save_tally(tally, cast_at).await?;
        tx.commit().await?;

        info!(
            incident_id,
            vote_type = %vote_type,
            voter = voter_id.unwrap_or("<anonymous>"),
            replaced,
            votes_confirm = tally.confirm,
            votes_dispute = tally.dispute,
            "Vote recorded"
        );

        Ok(VoteOutcome {
            incident,
            tally,
            replaced,
        })
    }
}
