use async_trait::async_trait;

/// Outbound sink for engine events.
///
/// Constructed once at startup and shared by handle. Callers log failures;
/// a publish error never fails the operation that triggered it.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        payload: &serde_json::Value,
        partition_key: Option<&str>,
    ) -> anyhow::Result<()>;
}
