//! Topic layout: the fixed set of topics the bridge cares about.
//!
//! Topics follow `<namespace>/<device>/<module>/<unit>/<channel>/<metric>`.
//! The layout is computed once from configuration; inbound topics are never
//! parsed.

use std::collections::BTreeMap;

use crate::error::TopicError;

const DELIMITER: char = '/';

#[derive(Debug, Clone, PartialEq)]
pub struct TopicLayout {
    prefix: String,
    watched: Vec<String>,
    switches: BTreeMap<String, String>,
    tracked: String,
}

impl TopicLayout {
    pub fn builder(namespace: &str, device: &str, module: &str, unit: &str) -> TopicLayoutBuilder {
        TopicLayoutBuilder {
            levels: [namespace, device, module, unit].map(str::to_string).to_vec(),
            watched: Vec::new(),
            switches: Vec::new(),
            tracked: None,
        }
    }

    /// `<namespace>/<device>/<module>/<unit>/`
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Wildcard covering every channel under the prefix.
    pub fn subscribe_filter(&self) -> String {
        format!("{}#", self.prefix)
    }

    pub fn topic(&self, channel: &str, metric: &str) -> String {
        format!("{}{}{}{}", self.prefix, channel, DELIMITER, metric)
    }

    pub fn watched(&self) -> &[String] {
        &self.watched
    }

    /// Command topic paired with a status topic, if it is switchable.
    pub fn command_for(&self, status_topic: &str) -> Option<&str> {
        self.switches.get(status_topic).map(String::as_str)
    }

    /// Topic whose numeric value feeds the rolling window.
    pub fn tracked(&self) -> &str {
        &self.tracked
    }

    /// Every topic that must hold a value from startup: watched status
    /// topics plus the command topics.
    pub fn default_topics(&self) -> impl Iterator<Item = &str> {
        self.watched
            .iter()
            .map(String::as_str)
            .chain(self.switches.values().map(String::as_str))
    }
}

#[derive(Debug, Clone)]
pub struct TopicLayoutBuilder {
    levels: Vec<String>,
    watched: Vec<(String, String)>,
    switches: Vec<(String, String, String)>,
    tracked: Option<(String, String)>,
}

impl TopicLayoutBuilder {
    pub fn watch(mut self, channel: &str, metric: &str) -> Self {
        self.watched.push((channel.to_string(), metric.to_string()));
        self
    }

    /// `channel/status_metric` can be flipped by publishing on `channel/command_metric`.
    pub fn switch(mut self, channel: &str, status_metric: &str, command_metric: &str) -> Self {
        self.switches.push((
            channel.to_string(),
            status_metric.to_string(),
            command_metric.to_string(),
        ));
        self
    }

    pub fn track(mut self, channel: &str, metric: &str) -> Self {
        self.tracked = Some((channel.to_string(), metric.to_string()));
        self
    }

    pub fn build(self) -> Result<TopicLayout, TopicError> {
        for level in &self.levels {
            check_segment(level)?;
        }
        let prefix = format!("{}{}", self.levels.join("/"), DELIMITER);
        let join = |channel: &str, metric: &str| -> Result<String, TopicError> {
            check_segment(channel)?;
            check_segment(metric)?;
            Ok(format!("{prefix}{channel}{DELIMITER}{metric}"))
        };

        let mut watched = Vec::new();
        let mut push_unique = |topic: String| {
            if !watched.contains(&topic) {
                watched.push(topic);
            }
        };
        for (channel, metric) in &self.watched {
            push_unique(join(channel, metric)?);
        }

        let mut switches = BTreeMap::new();
        for (channel, status, command) in &self.switches {
            let status_topic = join(channel, status)?;
            push_unique(status_topic.clone());
            switches.insert(status_topic, join(channel, command)?);
        }

        let tracked = match &self.tracked {
            Some((channel, metric)) => join(channel, metric)?,
            None => return Err(TopicError::MissingTracked),
        };
        push_unique(tracked.clone());

        Ok(TopicLayout {
            prefix,
            watched,
            switches,
            tracked,
        })
    }
}

fn check_segment(segment: &str) -> Result<(), TopicError> {
    let bad = segment.is_empty() || segment.contains(['/', '#', '+']);
    if bad {
        Err(TopicError::InvalidSegment(segment.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn burner_layout() -> TopicLayout {
        TopicLayout::builder("gogclpba", "T_SKF", "C003", "NPB19F")
            .watch("LED1", "Status")
            .watch("LED2", "Status")
            .watch("ANA", "Level-Burner")
            .switch("LED3", "Status", "Switch")
            .track("RND", "Level-Burner")
            .build()
            .unwrap()
    }

    #[test]
    fn prefix_and_filter() {
        let layout = burner_layout();
        assert_eq!(layout.prefix(), "gogclpba/T_SKF/C003/NPB19F/");
        assert_eq!(layout.subscribe_filter(), "gogclpba/T_SKF/C003/NPB19F/#");
        assert_eq!(layout.tracked(), "gogclpba/T_SKF/C003/NPB19F/RND/Level-Burner");
    }

    #[test]
    fn switch_topics_are_watched_and_defaulted() {
        let layout = burner_layout();
        let status = layout.topic("LED3", "Status");
        assert_eq!(layout.command_for(&status), Some("gogclpba/T_SKF/C003/NPB19F/LED3/Switch"));
        assert!(layout.watched().contains(&status));

        let defaults: Vec<&str> = layout.default_topics().collect();
        assert_eq!(defaults.len(), 6);
        assert!(defaults.contains(&"gogclpba/T_SKF/C003/NPB19F/LED3/Switch"));
        assert!(defaults.contains(&"gogclpba/T_SKF/C003/NPB19F/RND/Level-Burner"));
    }

    #[test]
    fn status_topic_is_not_its_own_command() {
        let layout = burner_layout();
        assert_eq!(layout.command_for(&layout.topic("LED1", "Status")), None);
    }

    #[test]
    fn wildcard_segments_are_rejected() {
        let err = TopicLayout::builder("user", "T_SKF", "#", "NPB19F")
            .track("RND", "Level-Burner")
            .build()
            .unwrap_err();
        assert_eq!(err, TopicError::InvalidSegment("#".into()));

        assert!(TopicLayout::builder("user", "a/b", "c", "d")
            .track("RND", "Level-Burner")
            .build()
            .is_err());
    }

    #[test]
    fn tracked_channel_is_required() {
        let err = TopicLayout::builder("u", "d", "m", "n").watch("LED1", "Status").build().unwrap_err();
        assert_eq!(err, TopicError::MissingTracked);
    }
}
