use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{debug, error};
use voyage_core::notify::{Notification, NotificationSink};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                debug!("Sent message to {}: partition {} offset {}", topic, delivery.partition, delivery.offset);
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

/// Hands notifications to the mail relay through a Kafka topic. Records are
/// keyed by recipient so one user's messages stay ordered on one partition.
pub struct KafkaNotificationSink {
    producer: EventProducer,
    topic: String,
}

impl KafkaNotificationSink {
    pub fn new(producer: EventProducer, topic: impl Into<String>) -> Self {
        Self { producer, topic: topic.into() }
    }
}

fn record_key(notification: &Notification) -> &str {
    notification.to.expose()
}

#[async_trait]
impl NotificationSink for KafkaNotificationSink {
    async fn send(&self, notification: &Notification) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let payload = serde_json::to_string(notification)?;
        self.producer
            .publish(&self.topic, record_key(notification), &payload)
            .await?;
        Ok(())
    }
}
