use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::error::TrafficError;
use crate::geo::GeoPoint;
use crate::limits::{
    optional_text, require_text, ADDRESS_MAX_CHARS, AFFECTED_LANES_MAX_CHARS,
    DESCRIPTION_MAX_CHARS, ESTIMATED_DURATION_MAX_CHARS, PRINCIPAL_ID_MAX_CHARS,
};

fn unknown_value(field: &str, got: &str, accepted: &[&str]) -> TrafficError {
    TrafficError::validation(format!(
        "unknown {field} '{got}', expected one of: {}",
        accepted.join(", ")
    ))
}

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    Accident,
    Construction,
    Closure,
    Congestion,
    Weather,
    Hazard,
    Other,
}

impl IncidentKind {
    pub const ALL: [IncidentKind; 7] = [
        IncidentKind::Accident,
        IncidentKind::Construction,
        IncidentKind::Closure,
        IncidentKind::Congestion,
        IncidentKind::Weather,
        IncidentKind::Hazard,
        IncidentKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentKind::Accident => "accident",
            IncidentKind::Construction => "construction",
            IncidentKind::Closure => "closure",
            IncidentKind::Congestion => "congestion",
            IncidentKind::Weather => "weather",
            IncidentKind::Hazard => "hazard",
            IncidentKind::Other => "other",
        }
    }
}

impl std::fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentKind {
    type Err = TrafficError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| unknown_value("incident type", s, &Self::ALL.map(|k| k.as_str())))
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = TrafficError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| unknown_value("severity", s, &Self::ALL.map(|v| v.as_str())))
    }
}

/// Lifecycle state. Any state may move to any other; there is no terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    #[default]
    Active,
    Resolved,
    Verified,
    Disputed,
}

impl IncidentStatus {
    pub const ALL: [IncidentStatus; 4] = [
        IncidentStatus::Active,
        IncidentStatus::Resolved,
        IncidentStatus::Verified,
        IncidentStatus::Disputed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Active => "active",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::Verified => "verified",
            IncidentStatus::Disputed => "disputed",
        }
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = TrafficError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| unknown_value("status", s, &Self::ALL.map(|v| v.as_str())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    Confirm,
    Dispute,
}

impl VoteType {
    pub const ALL: [VoteType; 2] = [VoteType::Confirm, VoteType::Dispute];

    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Confirm => "confirm",
            VoteType::Dispute => "dispute",
        }
    }
}

impl std::fmt::Display for VoteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteType {
    type Err = TrafficError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| unknown_value("vote type", s, &Self::ALL.map(|v| v.as_str())))
    }
}

// --- Incident ---

/// A reported traffic event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: IncidentKind,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub location: GeoPoint,
    pub description: String,
    pub address: Option<String>,
    pub affected_lanes: Option<String>,
    pub estimated_duration: Option<String>,
    pub reported_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Always equals the number of confirm vote rows for this incident.
    pub votes_confirm: i64,
    /// Always equals the number of dispute vote rows for this incident.
    pub votes_dispute: i64,
}

impl Incident {
    pub fn total_votes(&self) -> i64 {
        self.votes_confirm + self.votes_dispute
    }

    pub fn tally(&self) -> VoteTally {
        VoteTally {
            confirm: self.votes_confirm,
            dispute: self.votes_dispute,
        }
    }
}

/// Caller-supplied fields of a new report.
#[derive(Debug, Clone, TypedBuilder)]
pub struct NewIncident {
    pub kind: IncidentKind,
    pub severity: Severity,
    pub location: GeoPoint,
    #[builder(setter(into))]
    pub description: String,
    #[builder(default, setter(strip_option, into))]
    pub address: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub affected_lanes: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub estimated_duration: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub reported_by: Option<String>,
}

impl NewIncident {
    pub fn validate(&self) -> Result<(), TrafficError> {
        self.location.validate()?;
        require_text("description", &self.description, DESCRIPTION_MAX_CHARS)?;
        optional_text("address", self.address.as_deref(), ADDRESS_MAX_CHARS)?;
        optional_text(
            "affected_lanes",
            self.affected_lanes.as_deref(),
            AFFECTED_LANES_MAX_CHARS,
        )?;
        optional_text(
            "estimated_duration",
            self.estimated_duration.as_deref(),
            ESTIMATED_DURATION_MAX_CHARS,
        )?;
        optional_text("reported_by", self.reported_by.as_deref(), PRINCIPAL_ID_MAX_CHARS)?;
        Ok(())
    }

    /// Materialize the incident as it looks right after reporting: active,
    /// with the reporter's own confirmation counted.
    pub fn into_incident(self, id: String, now: DateTime<Utc>) -> Incident {
        Incident {
            id,
            kind: self.kind,
            severity: self.severity,
            status: IncidentStatus::Active,
            location: self.location,
            description: self.description,
            address: self.address,
            affected_lanes: self.affected_lanes,
            estimated_duration: self.estimated_duration,
            reported_by: self.reported_by,
            created_at: now,
            updated_at: now,
            votes_confirm: 1,
            votes_dispute: 0,
        }
    }
}

/// Caller-facing order: newest `created_at` first, ties broken by id.
pub fn newest_first(a: &Incident, b: &Incident) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// `incident_<8 hex>_<unix seconds>`.
pub fn generate_incident_id(now: DateTime<Utc>) -> String {
    let entropy = Uuid::new_v4().simple().to_string();
    format!("incident_{}_{}", &entropy[..8], now.timestamp())
}

// --- Votes ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: i64,
    pub incident_id: String,
    /// `None` for anonymous votes, which are never deduplicated.
    pub voter_id: Option<String>,
    pub vote_type: VoteType,
    pub cast_at: DateTime<Utc>,
}

/// A vote row about to be written; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVote {
    pub voter_id: Option<String>,
    pub vote_type: VoteType,
    pub cast_at: DateTime<Utc>,
}

/// Confirm/dispute counts derived from the current vote rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub confirm: i64,
    pub dispute: i64,
}

impl VoteTally {
    pub fn total(&self) -> i64 {
        self.confirm + self.dispute
    }

    pub fn add(&mut self, vote_type: VoteType, count: i64) {
        match vote_type {
            VoteType::Confirm => self.confirm += count,
            VoteType::Dispute => self.dispute += count,
        }
    }
}
