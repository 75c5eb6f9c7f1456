//! Incident lifecycle: reporting, lookup, proximity and route queries,
//! status changes, and voting.
//!
//! `IncidentService` is the single entry point transports call. It owns no
//! state of its own beyond handles; everything durable lives in the store.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trafficwatch_common::limits::{optional_text, PRINCIPAL_ID_MAX_CHARS};
use trafficwatch_common::{
    generate_incident_id, BoundingBox, EngineSettings, GeoPoint, Incident, IncidentStatus,
    NewIncident, NewVote, TrafficError, VoteType,
};
use trafficwatch_store::IncidentStore;

use crate::clock;
use crate::ledger::VoteLedger;
use crate::notify::{EventPublisher, IncidentReported};
use crate::spatial;

#[derive(Clone)]
pub struct IncidentService {
    store: Arc<dyn IncidentStore>,
    ledger: VoteLedger,
    publisher: Option<Arc<dyn EventPublisher>>,
    /// Report events still being published. Finished handles are pruned on
    /// every new spawn.
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
    settings: EngineSettings,
}

impl IncidentService {
    pub fn new(store: Arc<dyn IncidentStore>, settings: EngineSettings) -> Self {
        Self {
            ledger: VoteLedger::new(store.clone()),
            store,
            publisher: None,
            pending: Arc::new(Mutex::new(Vec::new())),
            settings,
        }
    }

    /// Announce new reports through `publisher`.
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // ---------------------------------------------------------------------
    // Reporting
    // ---------------------------------------------------------------------

    /// Validate and persist a new report. The incident starts active with the
    /// reporter's own confirmation recorded as its first vote.
    ///
    /// The report event is published in the background after the write
    /// commits; a publish failure is logged and does not affect the result.
    /// Use [`Self::flush_notifications`] to wait for delivery.
    pub async fn report(&self, mut new: NewIncident) -> Result<Incident, TrafficError> {
        new.reported_by = new
            .reported_by
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        new.validate()?;

        let now = clock::now();
        let id = generate_incident_id(now);
        let reporter_vote = NewVote {
            voter_id: new.reported_by.clone(),
            vote_type: VoteType::Confirm,
            cast_at: now,
        };
        let incident = new.into_incident(id, now);

        self.store.insert_incident(&incident, &reporter_vote).await?;

        info!(
            incident_id = %incident.id,
            kind = %incident.kind,
            severity = %incident.severity,
            lat = incident.location.lat,
            lng = incident.location.lng,
            "Incident reported"
        );

        self.announce(&incident);
        Ok(incident)
    }

    fn announce(&self, incident: &Incident) {
        let Some(publisher) = self.publisher.clone() else {
            return;
        };

        let payload = match serde_json::to_value(IncidentReported::from(incident)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(incident_id = %incident.id, error = %e, "Failed to encode report event");
                return;
            }
        };
        let topic = self.settings.report_topic.clone();
        let key = incident.id.clone();

        let task = async move {
            if let Err(e) = publisher.publish(&topic, &payload, Some(&key)).await {
                let err = TrafficError::Notification(format!("{e:#}"));
                warn!(incident_id = %key, topic = %topic, error = %err, "Report event not published");
            }
        };

        let handle = tokio::spawn(task);
        if let Ok(mut pending) = self.pending.lock() {
            pending.retain(|h| !h.is_finished());
            pending.push(handle);
        }
    }

    /// Number of report events still being published.
    pub fn pending_notifications(&self) -> usize {
        match self.pending.lock() {
            Ok(mut pending) => {
                pending.retain(|h| !h.is_finished());
                pending.len()
            }
            Err(_) => 0,
        }
    }

    /// Wait for every report event spawned so far to finish publishing.
    /// Deliveries are detached: dropping the service does not cancel them.
    pub async fn flush_notifications(&self) {
        let pending = match self.pending.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return,
        };
        for handle in pending {
            if let Err(e) = handle.await {
                warn!(error = %e, "Notification task panicked");
            }
        }
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub async fn get(&self, id: &str) -> Result<Option<Incident>, TrafficError> {
        Ok(self.store.get_incident(id).await?)
    }

    /// Incidents within `radius_km` of `location`, newest first.
    ///
    /// Without a status filter (or with an empty one) only active incidents
    /// are returned. `limit` is applied after the exact distance check.
    pub async fn list_near(
        &self,
        location: GeoPoint,
        radius_km: f64,
        status_filter: Option<&[IncidentStatus]>,
        limit: usize,
    ) -> Result<Vec<Incident>, TrafficError> {
        location.validate()?;
        check_radius("radius_km", radius_km)?;
        self.check_limit(limit)?;

        let statuses = spatial::effective_statuses(status_filter);
        let bounds = BoundingBox::around(location, radius_km);
        let candidates = self.store.find_in_bounds(&bounds, &statuses).await?;
        let candidate_count = candidates.len();

        let hits = spatial::find_within_radius(location, radius_km, candidates, &statuses, limit);
        debug!(
            lat = location.lat,
            lng = location.lng,
            radius_km,
            candidates = candidate_count,
            hits = hits.len(),
            "Proximity query"
        );
        Ok(hits)
    }

    /// Paginated listing, newest first. Unlike [`Self::list_near`], no
    /// default status restriction is applied.
    pub async fn list_all(
        &self,
        status_filter: Option<&[IncidentStatus]>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Incident>, TrafficError> {
        self.check_limit(limit)?;
        if i64::try_from(offset).is_err() {
            return Err(TrafficError::validation(format!(
                "offset must be at most {}, got {offset}",
                i64::MAX
            )));
        }
        let statuses = status_filter.unwrap_or(&[]);
        let incidents = self.store.list_incidents(statuses, limit, offset).await?;
        debug!(limit, offset, returned = incidents.len(), "Listed incidents");
        Ok(incidents)
    }

    /// Active incidents within `buffer_km` of any waypoint.
    ///
    /// Each incident appears once, in the order first discovered: by
    /// waypoint, then newest first within a waypoint. At most
    /// `default_limit` incidents are taken per waypoint.
    pub async fn incidents_along_route(
        &self,
        waypoints: &[GeoPoint],
        buffer_km: f64,
    ) -> Result<Vec<Incident>, TrafficError> {
        if waypoints.is_empty() {
            return Err(TrafficError::validation("route coordinates are required"));
        }
        for waypoint in waypoints {
            waypoint.validate()?;
        }
        check_radius("buffer_km", buffer_km)?;

        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for waypoint in waypoints {
            let near = self
                .list_near(*waypoint, buffer_km, None, self.settings.default_limit)
                .await?;
            for incident in near {
                if seen.insert(incident.id.clone()) {
                    found.push(incident);
                }
            }
        }

        info!(
            waypoints = waypoints.len(),
            buffer_km,
            incidents = found.len(),
            "Route query complete"
        );
        Ok(found)
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    /// Record a vote and return the incident with recomputed tallies.
    pub async fn vote(
        &self,
        incident_id: &str,
        vote_type: VoteType,
        voter_id: Option<&str>,
    ) -> Result<Incident, TrafficError> {
        let outcome = self.ledger.cast_vote(incident_id, vote_type, voter_id).await?;
        Ok(outcome.incident)
    }

    /// Move an incident to `status`. Any transition is allowed, including to
    /// the current status. `None` when the incident does not exist.
    pub async fn update_status(
        &self,
        id: &str,
        status: IncidentStatus,
        updated_by: Option<&str>,
    ) -> Result<Option<Incident>, TrafficError> {
        optional_text("updated_by", updated_by, PRINCIPAL_ID_MAX_CHARS)?;

        let Some(current) = self.store.get_incident(id).await? else {
            return Ok(None);
        };

        let updated_at = clock::after(current.updated_at);
        let updated = self.store.update_status(id, status, updated_at).await?;

        if let Some(incident) = &updated {
            info!(
                incident_id = id,
                from = %current.status,
                to = %incident.status,
                updated_by = updated_by.unwrap_or("<anonymous>"),
                "Incident status updated"
            );
        }
        Ok(updated)
    }

    fn check_limit(&self, limit: usize) -> Result<(), TrafficError> {
        if limit == 0 || limit > self.settings.max_limit {
            return Err(TrafficError::validation(format!(
                "limit must be between 1 and {}, got {limit}",
                self.settings.max_limit
            )));
        }
        Ok(())
    }
}

fn check_radius(field: &str, value: f64) -> Result<(), TrafficError> {
    if !value.is_finite() || value < 0.0 {
        return Err(TrafficError::validation(format!(
            "{field} must be a non-negative number, got {value}"
        )));
    }
    Ok(())
}
