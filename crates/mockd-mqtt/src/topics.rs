//! Topic filters, subscriptions, and retained messages
//!
//! Standard MQTT filter semantics: `+` matches exactly one level and
//! captures it, `#` matches the remaining levels and must come last.
//! Captures feed the `{n}` substitution in response topics.

use std::collections::HashMap;

/// Match a topic against a filter, collecting `+` captures
pub fn match_filter(topic: &str, filter: &str) -> Option<Vec<String>> {
    let mut captures = Vec::new();
    let topic_levels: Vec<&str> = topic.split('/').collect();
    let filter_levels: Vec<&str> = filter.split('/').collect();

    let mut t = 0;
    for (i, level) in filter_levels.iter().enumerate() {
        match *level {
            "#" => {
                // `#` must be the last level and matches the rest (even empty).
                if i + 1 != filter_levels.len() {
                    return None;
                }
                return Some(captures);
            }
            "+" => {
                let matched = topic_levels.get(t)?;
                captures.push((*matched).to_string());
                t += 1;
            }
            literal => {
                if topic_levels.get(t) != Some(&literal) {
                    return None;
                }
                t += 1;
            }
        }
    }
    (t == topic_levels.len()).then_some(captures)
}

/// Substitute `{1}`..`{n}` in a response-topic pattern with captures
pub fn substitute_captures(pattern: &str, captures: &[String]) -> String {
    let mut out = pattern.to_string();
    for (i, capture) in captures.iter().enumerate() {
        out = out.replace(&format!("{{{}}}", i + 1), capture);
    }
    out
}

/// One client subscription
#[derive(Debug, Clone)]
pub struct Subscription {
    pub filter: String,
    pub qos: u8,
    pub client_id: String,
}

/// A retained message kept for future subscribers
#[derive(Debug, Clone)]
pub struct RetainedMessage {
    pub payload: Vec<u8>,
    pub qos: u8,
}

/// Subscription table plus retained-message store
#[derive(Default)]
pub struct TopicTree {
    subscriptions: HashMap<String, Vec<Subscription>>,
    retained: HashMap<String, RetainedMessage>,
}

impl TopicTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription
    pub fn subscribe(&mut self, filter: &str, qos: u8, client_id: &str) {
        let entries = self.subscriptions.entry(filter.to_string()).or_default();
        // Re-subscribing replaces the granted QoS.
        entries.retain(|s| s.client_id != client_id);
        entries.push(Subscription {
            filter: filter.to_string(),
            qos,
            client_id: client_id.to_string(),
        });
    }

    /// Remove one subscription
    pub fn unsubscribe(&mut self, filter: &str, client_id: &str) {
        if let Some(entries) = self.subscriptions.get_mut(filter) {
            entries.retain(|s| s.client_id != client_id);
            if entries.is_empty() {
                self.subscriptions.remove(filter);
            }
        }
    }

    /// Drop every subscription a client holds
    pub fn remove_client(&mut self, client_id: &str) {
        self.subscriptions.retain(|_, entries| {
            entries.retain(|s| s.client_id != client_id);
            !entries.is_empty()
        });
    }

    /// All subscriptions matching a published topic
    pub fn match_topic(&self, topic: &str) -> Vec<Subscription> {
        self.subscriptions
            .values()
            .flatten()
            .filter(|s| match_filter(topic, &s.filter).is_some())
            .cloned()
            .collect()
    }

    /// Store or clear a retained message (empty payload clears)
    pub fn retain(&mut self, topic: &str, payload: Vec<u8>, qos: u8) {
        if payload.is_empty() {
            self.retained.remove(topic);
        } else {
            self.retained
                .insert(topic.to_string(), RetainedMessage { payload, qos });
        }
    }

    /// Retained messages matching a new subscription's filter
    pub fn retained_for_filter(&self, filter: &str) -> Vec<(String, RetainedMessage)> {
        self.retained
            .iter()
            .filter(|(topic, _)| match_filter(topic, filter).is_some())
            .map(|(topic, message)| (topic.clone(), message.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_and_single_level_wildcards() {
        assert_eq!(match_filter("a/b/c", "a/b/c"), Some(vec![]));
        assert_eq!(
            match_filter("devices/d1/temp", "devices/+/temp"),
            Some(vec!["d1".to_string()])
        );
        assert!(match_filter("devices/d1/humidity", "devices/+/temp").is_none());
        assert!(match_filter("devices/d1", "devices/+/temp").is_none());
    }

    #[test]
    fn multi_level_wildcard_must_be_last() {
        assert_eq!(match_filter("logs/app/error", "logs/#"), Some(vec![]));
        assert_eq!(
            match_filter("devices/d1/a/b", "devices/+/#"),
            Some(vec!["d1".to_string()])
        );
        assert!(match_filter("logs/app", "#/app").is_none());
    }

    #[test]
    fn capture_substitution_is_one_based() {
        let captures = match_filter("req/dev7/status", "req/+/+").unwrap();
        assert_eq!(
            substitute_captures("resp/{1}/{2}", &captures),
            "resp/dev7/status"
        );
    }

    #[test]
    fn subscriptions_and_retained() {
        let mut tree = TopicTree::new();
        tree.subscribe("sensors/#", 1, "c1");
        tree.subscribe("sensors/temp", 0, "c2");

        let matched = tree.match_topic("sensors/temp");
        assert_eq!(matched.len(), 2);

        tree.retain("sensors/temp", b"21.5".to_vec(), 0);
        let retained = tree.retained_for_filter("sensors/#");
        assert_eq!(retained.len(), 1);
        assert_eq!(retained[0].0, "sensors/temp");

        // Empty payload clears the retained message.
        tree.retain("sensors/temp", Vec::new(), 0);
        assert!(tree.retained_for_filter("sensors/#").is_empty());

        tree.remove_client("c1");
        assert_eq!(tree.match_topic("sensors/temp").len(), 1);
    }
}
