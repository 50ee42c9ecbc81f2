/*!
Mock broker pour développement sans broker

Implémente `CommandSink` comme `rumqttc::AsyncClient`, mais enregistre tout
ce qui est publié au lieu de l'envoyer. Un échec de publication peut être
programmé pour tester la remontée d'erreur.
*/

use parking_lot::Mutex;
use std::sync::Arc;
use telemon_core::{CommandSink, PublishError};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedCommand {
    pub topic: String,
    pub payload: String,
}

#[derive(Debug, Default)]
pub struct MockBroker {
    published: Mutex<Vec<PublishedCommand>>,
    subscriptions: Mutex<Vec<String>>,
    disconnects: Mutex<u32>,
    fail_next: Mutex<Option<String>>,
}

impl MockBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Next publish returns `PublishError::Rejected(reason)` and records nothing.
    pub fn fail_next_publish(&self, reason: &str) {
        *self.fail_next.lock() = Some(reason.to_string());
    }

    pub fn published(&self) -> Vec<PublishedCommand> {
        self.published.lock().clone()
    }

    pub fn published_on(&self, topic: &str) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .filter(|c| c.topic == topic)
            .map(|c| c.payload.clone())
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }

    pub fn disconnects(&self) -> u32 {
        *self.disconnects.lock()
    }

    pub fn clear(&self) {
        self.published.lock().clear();
        self.subscriptions.lock().clear();
        *self.disconnects.lock() = 0;
    }
}

impl CommandSink for MockBroker {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        if let Some(reason) = self.fail_next.lock().take() {
            return Err(PublishError::Rejected(reason));
        }
        self.published.lock().push(PublishedCommand {
            topic: topic.to_string(),
            payload: payload.to_string(),
        });
        info!("[mock] published {payload:?} on {topic}");
        Ok(())
    }

    fn subscribe(&self, filter: &str) -> Result<(), String> {
        self.subscriptions.lock().push(filter.to_string());
        info!("[mock] subscribed to {filter}");
        Ok(())
    }

    fn disconnect(&self) -> Result<(), String> {
        *self.disconnects.lock() += 1;
        Ok(())
    }
}
