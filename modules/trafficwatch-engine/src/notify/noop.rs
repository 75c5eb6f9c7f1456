use async_trait::async_trait;

use super::backend::EventPublisher;

/// Publisher that drops every event.
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(
        &self,
        _topic: &str,
        _payload: &serde_json::Value,
        _partition_key: Option<&str>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
