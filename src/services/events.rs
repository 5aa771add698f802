use crate::domain::events::DomainEvent;

/// Publishes domain events to NATS when a connection is configured.
#[derive(Clone, Default)]
pub struct EventBus {
    nats: Option<async_nats::Client>,
}

impl EventBus {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    pub async fn connect(url: Option<&str>) -> Self {
        let Some(url) = url else { return Self::default() };
        match async_nats::connect(url).await {
            Ok(client) => {
                tracing::info!(%url, "connected to NATS");
                Self::new(Some(client))
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "NATS unavailable, events will not be published");
                Self::default()
            }
        }
    }

    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        let Some(client) = &self.nats else { return };
        for event in events {
            let subject = event.subject();
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => { tracing::warn!(%subject, error = %e, "failed to encode event"); continue; }
            };
            if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                tracing::warn!(%subject, error = %e, "failed to publish event");
            }
        }
    }
}
