use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use trafficwatch_common::Config;

use super::backend::EventPublisher;

const CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";

/// Publishes to a Kafka REST proxy: `POST {base_url}/topics/{topic}`.
pub struct RestProxyPublisher {
    base_url: String,
    http: reqwest::Client,
}

impl RestProxyPublisher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Publisher for `EVENT_PUBLISHER_URL`, or `None` when it is not set.
    pub fn from_config(config: &Config) -> anyhow::Result<Option<Self>> {
        config
            .event_publisher_url
            .as_deref()
            .map(|url| Self::new(url, config.event_publisher_timeout))
            .transpose()
    }

    fn topic_url(&self, topic: &str) -> String {
        format!("{}/topics/{}", self.base_url, topic)
    }
}

/// Request body for a single record.
fn records_body(payload: &serde_json::Value, partition_key: Option<&str>) -> serde_json::Value {
    json!({
        "records": [
            { "key": partition_key, "value": payload }
        ]
    })
}

#[async_trait]
impl EventPublisher for RestProxyPublisher {
    async fn publish(
        &self,
        topic: &str,
        payload: &serde_json::Value,
        partition_key: Option<&str>,
    ) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(self.topic_url(topic))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(records_body(payload, partition_key).to_string())
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, topic, "REST proxy returned non-success");
            anyhow::bail!("REST proxy returned {status} for topic {topic}");
        }

        debug!(topic, key = partition_key.unwrap_or(""), "Event published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_url_strips_trailing_slash() {
        let publisher =
            RestProxyPublisher::new("http://proxy:8082/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            publisher.topic_url("traffic-reports"),
            "http://proxy:8082/topics/traffic-reports"
        );
    }

    #[test]
    fn body_wraps_payload_in_records() {
        let body = records_body(&json!({"reportId": "incident_1"}), Some("incident_1"));
        assert_eq!(body["records"][0]["key"], "incident_1");
        assert_eq!(body["records"][0]["value"]["reportId"], "incident_1");

        let anonymous = records_body(&json!({}), None);
        assert!(anonymous["records"][0]["key"].is_null());
    }
}
