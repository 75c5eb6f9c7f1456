use chrono::{DateTime, Utc};
use serde::Serialize;
use trafficwatch_common::{GeoPoint, Incident, IncidentKind, IncidentStatus, Severity};

/// Message published when an incident is reported.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentReported<'a> {
    pub report_id: &'a str,
    #[serde(rename = "type")]
    pub kind: IncidentKind,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub location: GeoPoint,
    pub description: &'a str,
    pub address: Option<&'a str>,
    pub affected_lanes: Option<&'a str>,
    pub estimated_duration: Option<&'a str>,
    pub reported_by: Option<&'a str>,
    pub created_at: DateTime<Utc>,
    pub votes_confirm: i64,
    pub votes_dispute: i64,
}

impl<'a> From<&'a Incident> for IncidentReported<'a> {
    fn from(incident: &'a Incident) -> Self {
        Self {
            report_id: &incident.id,
            kind: incident.kind,
            severity: incident.severity,
            status: incident.status,
            location: incident.location,
            description: &incident.description,
            address: incident.address.as_deref(),
            affected_lanes: incident.affected_lanes.as_deref(),
            estimated_duration: incident.estimated_duration.as_deref(),
            reported_by: incident.reported_by.as_deref(),
            created_at: incident.created_at,
            votes_confirm: incident.votes_confirm,
            votes_dispute: incident.votes_dispute,
        }
    }
}
