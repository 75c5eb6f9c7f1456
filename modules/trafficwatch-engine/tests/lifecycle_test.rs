//! Incident lifecycle against the in-memory store.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{report_at, service};
use tokio::sync::Mutex;
use trafficwatch_common::{
    BoundingBox, EngineSettings, ErrorKind, GeoPoint, Incident, IncidentKind, IncidentStatus,
    NewIncident, NewVote, Severity, TrafficError, Vote, VoteType,
};
use trafficwatch_engine::{IncidentService, VoteLedger};
use trafficwatch_store::{IncidentStore, MemoryIncidentStore, StoreResult, VoteTransaction};

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn report_vote_and_change_vote_scenario() {
    let (service, _store) = service();

    let incident = service
        .report(report_at(40.0, -74.0, "Multi-car pileup"))
        .await
        .unwrap();
    assert_eq!(incident.kind, IncidentKind::Accident);
    assert_eq!(incident.severity, Severity::High);
    assert_eq!(incident.status, IncidentStatus::Active);
    assert_eq!(incident.votes_confirm, 1);
    assert_eq!(incident.votes_dispute, 0);

    let after_anon = service
        .vote(&incident.id, VoteType::Dispute, None)
        .await
        .unwrap();
    assert_eq!(after_anon.votes_dispute, 1);

    let confirmed = service
        .vote(&incident.id, VoteType::Confirm, Some("driver-42"))
        .await
        .unwrap();
    assert_eq!((confirmed.votes_confirm, confirmed.votes_dispute), (2, 1));

    let changed = service
        .vote(&incident.id, VoteType::Dispute, Some("driver-42"))
        .await
        .unwrap();
    assert_eq!((changed.votes_confirm, changed.votes_dispute), (1, 2));
    assert_eq!(changed.total_votes(), 3);
}

#[tokio::test]
async fn report_stores_reporter_vote() {
    let (service, store) = service();

    let new = NewIncident::builder()
        .kind(IncidentKind::Construction)
        .severity(Severity::Low)
        .location(GeoPoint::new(51.5, -0.12))
        .description("Lane narrowing")
        .reported_by("crew-7")
        .build();
    let incident = service.report(new).await.unwrap();

    assert!(incident.id.starts_with("incident_"));
    assert_eq!(incident.created_at, incident.updated_at);

    let votes = store.list_votes(&incident.id).await.unwrap();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].voter_id.as_deref(), Some("crew-7"));
    assert_eq!(votes[0].vote_type, VoteType::Confirm);

    let fetched = service.get(&incident.id).await.unwrap().unwrap();
    assert_eq!(fetched, incident);
}

#[tokio::test]
async fn reporter_id_is_trimmed_on_incident_and_vote() {
    let (service, store) = service();

    let new = NewIncident::builder()
        .kind(IncidentKind::Hazard)
        .severity(Severity::Low)
        .location(GeoPoint::new(12.0, 12.0))
        .description("fallen tree")
        .reported_by("  bob ")
        .build();
    let incident = service.report(new).await.unwrap();
    assert_eq!(incident.reported_by.as_deref(), Some("bob"));

    let votes = store.list_votes(&incident.id).await.unwrap();
    assert_eq!(votes[0].voter_id.as_deref(), Some("bob"));

    let blank = NewIncident::builder()
        .kind(IncidentKind::Hazard)
        .severity(Severity::Low)
        .location(GeoPoint::new(12.0, 12.0))
        .description("fallen tree")
        .reported_by("   ")
        .build();
    let incident = service.report(blank).await.unwrap();
    assert!(incident.reported_by.is_none());
}

#[tokio::test]
async fn invalid_reports_are_rejected_before_writing() {
    let (service, store) = service();

    let err = service
        .report(report_at(95.0, 0.0, "off the map"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = service.report(report_at(0.0, 0.0, "   ")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert!(store.list_incidents(&[], 10, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn get_missing_incident_is_none() {
    let (service, _store) = service();
    assert!(service.get("incident_missing").await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_status_advances_updated_at() {
    let (service, _store) = service();
    let incident = service.report(report_at(1.0, 1.0, "stalled truck")).await.unwrap();

    let resolved = service
        .update_status(&incident.id, IncidentStatus::Resolved, Some("operator"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.status, IncidentStatus::Resolved);
    assert!(resolved.updated_at > incident.updated_at);
    assert_eq!(resolved.created_at, incident.created_at);

    // Same-status transitions are allowed and still advance the timestamp.
    let again = service
        .update_status(&incident.id, IncidentStatus::Resolved, None)
        .await
        .unwrap()
        .unwrap();
    assert!(again.updated_at > resolved.updated_at);
}

/// Commits a vote on the incident between the service's read and its
/// status write.
#[derive(Clone)]
struct VoteDuringStatusWrite {
    inner: MemoryIncidentStore,
    vote_updated_at: Arc<Mutex<Option<DateTime<Utc>>>>,
}

#[async_trait]
impl IncidentStore for VoteDuringStatusWrite {
    async fn insert_incident(&self, incident: &Incident, reporter_vote: &NewVote) -> StoreResult<()> {
        self.inner.insert_incident(incident, reporter_vote).await
    }

    async fn get_incident(&self, id: &str) -> StoreResult<Option<Incident>> {
        self.inner.get_incident(id).await
    }

    async fn update_status(
        &self,
        id: &str,
        status: IncidentStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Option<Incident>> {
        let ledger = VoteLedger::new(Arc::new(self.inner.clone()));
        if let Ok(outcome) = ledger.cast_vote(id, VoteType::Dispute, None).await {
            *self.vote_updated_at.lock().await = Some(outcome.incident.updated_at);
        }
        self.inner.update_status(id, status, updated_at).await
    }

    async fn find_in_bounds(
        &self,
        bounds: &BoundingBox,
        statuses: &[IncidentStatus],
    ) -> StoreResult<Vec<Incident>> {
        self.inner.find_in_bounds(bounds, statuses).await
    }

    async fn list_incidents(
        &self,
        statuses: &[IncidentStatus],
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<Incident>> {
        self.inner.list_incidents(statuses, limit, offset).await
    }

    async fn list_votes(&self, incident_id: &str) -> StoreResult<Vec<Vote>> {
        self.inner.list_votes(incident_id).await
    }

    async fn begin_vote(&self, incident_id: &str) -> StoreResult<Option<Box<dyn VoteTransaction>>> {
        self.inner.begin_vote(incident_id).await
    }
}

#[tokio::test]
async fn status_write_never_rewinds_a_concurrent_vote() {
    let store = VoteDuringStatusWrite {
        inner: MemoryIncidentStore::new(),
        vote_updated_at: Arc::new(Mutex::new(None)),
    };
    let service = IncidentService::new(Arc::new(store.clone()), EngineSettings::default());
    let incident = service.report(report_at(7.0, 7.0, "jackknifed truck")).await.unwrap();

    // Move updated_at ahead of the wall clock so both writes below derive
    // their timestamps from it.
    let ahead = incident.updated_at + chrono::Duration::seconds(30);
    store
        .inner
        .update_status(&incident.id, IncidentStatus::Active, ahead)
        .await
        .unwrap();

    let updated = service
        .update_status(&incident.id, IncidentStatus::Verified, None)
        .await
        .unwrap()
        .unwrap();

    let vote_time = (*store.vote_updated_at.lock().await).unwrap();
    assert!(vote_time > ahead);
    assert!(updated.updated_at > vote_time);
    assert_eq!(updated.status, IncidentStatus::Verified);
    assert_eq!(updated.votes_dispute, 1);
}

#[tokio::test]
async fn update_status_on_missing_incident_is_none() {
    let (service, _store) = service();
    let result = service
        .update_status("incident_nope", IncidentStatus::Verified, None)
        .await
        .unwrap();
    assert!(result.is_none());
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_near_defaults_to_active_but_list_all_does_not() {
    let (service, _store) = service();
    let open = service.report(report_at(10.0, 10.0, "open")).await.unwrap();
    let closed = service.report(report_at(10.0, 10.0, "closed")).await.unwrap();
    service
        .update_status(&closed.id, IncidentStatus::Resolved, None)
        .await
        .unwrap();

    let center = GeoPoint::new(10.0, 10.0);
    let near = service.list_near(center, 5.0, None, 100).await.unwrap();
    assert_eq!(near.iter().map(|i| &i.id).collect::<Vec<_>>(), [&open.id]);

    let near_resolved = service
        .list_near(center, 5.0, Some(&[IncidentStatus::Resolved]), 100)
        .await
        .unwrap();
    assert_eq!(near_resolved.len(), 1);
    assert_eq!(near_resolved[0].id, closed.id);

    let all = service.list_all(None, 100, 0).await.unwrap();
    assert_eq!(all.len(), 2);

    let only_resolved = service
        .list_all(Some(&[IncidentStatus::Resolved]), 100, 0)
        .await
        .unwrap();
    assert_eq!(only_resolved.len(), 1);
}

#[tokio::test]
async fn list_near_uses_great_circle_distance() {
    let (service, _store) = service();
    let near = service.report(report_at(10.0, 10.0, "near")).await.unwrap();
    let far = service.report(report_at(10.0, 10.2, "far")).await.unwrap();

    let center = GeoPoint::new(10.0, 10.0);
    let within_15 = service.list_near(center, 15.0, None, 100).await.unwrap();
    assert_eq!(within_15.iter().map(|i| &i.id).collect::<Vec<_>>(), [&near.id]);

    let within_25 = service.list_near(center, 25.0, None, 100).await.unwrap();
    let ids: Vec<_> = within_25.iter().map(|i| i.id.clone()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&far.id));
}

#[tokio::test]
async fn list_all_paginates_newest_first() {
    let (service, _store) = service();
    let mut ids = Vec::new();
    for n in 0..5 {
        let incident = service
            .report(report_at(0.0, 0.0, &format!("incident {n}")))
            .await
            .unwrap();
        ids.push(incident.id);
    }

    let first = service.list_all(None, 2, 0).await.unwrap();
    let second = service.list_all(None, 2, 2).await.unwrap();
    let rest = service.list_all(None, 2, 4).await.unwrap();
    assert_eq!(first.len() + second.len() + rest.len(), 5);

    let all = service.list_all(None, 10, 0).await.unwrap();
    for pair in all.windows(2) {
        assert!(pair[0].created_at >= pair[1].created_at);
    }
    assert_eq!(
        first.iter().chain(&second).chain(&rest).map(|i| &i.id).collect::<Vec<_>>(),
        all.iter().map(|i| &i.id).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn query_arguments_are_validated() {
    let (service, _store) = service();
    let center = GeoPoint::new(0.0, 0.0);

    for result in [
        service.list_near(center, -1.0, None, 10).await,
        service.list_near(center, f64::NAN, None, 10).await,
        service.list_near(center, 1.0, None, 0).await,
        service.list_near(center, 1.0, None, 501).await,
        service.list_near(GeoPoint::new(0.0, 181.0), 1.0, None, 10).await,
        service.list_all(None, 0, 0).await,
        service.list_all(None, 10, usize::MAX).await,
    ] {
        assert!(matches!(result, Err(TrafficError::Validation(_))));
    }
}

// ---------------------------------------------------------------------------
// Store failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_outage_surfaces_as_retryable() {
    let (service, store) = service();
    let incident = service.report(report_at(5.0, 5.0, "flooding")).await.unwrap();

    store.set_offline(true);

    let err = service.report(report_at(5.0, 5.0, "more flooding")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    assert!(err.is_retryable());

    let err = service
        .vote(&incident.id, VoteType::Confirm, None)
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    store.set_offline(false);
    let unchanged = service.get(&incident.id).await.unwrap().unwrap();
    assert_eq!(unchanged.total_votes(), 1);
}
