//! Topic State Store: last known payload per topic.
//!
//! One guard around the whole map. Update volume is device-speed telemetry,
//! so contention is not a concern.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Value every configured topic holds before its first message.
pub const DEFAULT_VALUE: &str = "0";

#[derive(Debug, Clone)]
pub struct TopicStore {
    values: Shared<HashMap<String, String>>,
    default: String,
}

impl TopicStore {
    /// Creates a store where each of `topics` starts at `default`.
    pub fn with_defaults<I, S>(topics: I, default: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = topics
            .into_iter()
            .map(|topic| (topic.into(), default.to_string()))
            .collect();
        Self {
            values: new_state(values),
            default: default.to_string(),
        }
    }

    /// Last value seen for `topic`, or the default if nothing arrived yet.
    pub fn get(&self, topic: &str) -> String {
        self.with_value(topic, str::to_string)
    }

    /// Overwrites the value for `topic`. Unknown topics are inserted.
    pub fn set(&self, topic: &str, value: impl Into<String>) {
        self.values.lock().insert(topic.to_string(), value.into());
    }

    /// Runs `f` on the current value while the guard is held, so no write
    /// can land between the read and whatever `f` does with it.
    pub fn with_value<R>(&self, topic: &str, f: impl FnOnce(&str) -> R) -> R {
        let values = self.values.lock();
        let current = values.get(topic).map(String::as_str).unwrap_or(&self.default);
        f(current)
    }

    /// Copy of every entry, sorted by topic.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .values
            .lock()
            .iter()
            .map(|(topic, value)| (topic.clone(), value.clone()))
            .collect();
        entries.sort();
        entries
    }
}
