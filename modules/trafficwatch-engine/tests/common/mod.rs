//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use trafficwatch_common::{EngineSettings, GeoPoint, IncidentKind, NewIncident, Severity};
use trafficwatch_engine::{EventPublisher, IncidentService};
use trafficwatch_store::MemoryIncidentStore;

// ---------------------------------------------------------------------------
// Service construction
// ---------------------------------------------------------------------------

pub fn service() -> (IncidentService, MemoryIncidentStore) {
    let store = MemoryIncidentStore::new();
    let service = IncidentService::new(Arc::new(store.clone()), EngineSettings::default());
    (service, store)
}

pub fn report_at(lat: f64, lng: f64, description: &str) -> NewIncident {
    NewIncident::builder()
        .kind(IncidentKind::Accident)
        .severity(Severity::High)
        .location(GeoPoint::new(lat, lng))
        .description(description)
        .build()
}

// ---------------------------------------------------------------------------
// Publishers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Published {
    pub topic: String,
    pub key: Option<String>,
    pub payload: serde_json::Value,
}

/// Forwards every publish onto a channel.
pub struct RecordingPublisher {
    tx: mpsc::UnboundedSender<Published>,
}

impl RecordingPublisher {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Published>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(
        &self,
        topic: &str,
        payload: &serde_json::Value,
        partition_key: Option<&str>,
    ) -> anyhow::Result<()> {
        self.tx.send(Published {
            topic: topic.to_string(),
            key: partition_key.map(str::to_string),
            payload: payload.clone(),
        })?;
        Ok(())
    }
}

/// Always fails, like an unreachable broker.
pub struct FailingPublisher;

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(
        &self,
        _topic: &str,
        _payload: &serde_json::Value,
        _partition_key: Option<&str>,
    ) -> anyhow::Result<()> {
        anyhow::bail!("broker unreachable")
    }
}
