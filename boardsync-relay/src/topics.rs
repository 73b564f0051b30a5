//! Topic subscription registry for the relay server.
//!
//! Tracks which relay sessions are subscribed to which topics. A session may
//! hold any number of subscriptions; all of them are dropped when the
//! session disconnects.
//!
//! Entries are ephemeral, same as the session registry.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

/// Maximum number of distinct topics the registry will track.
const MAX_TOPICS: usize = 10_000;

/// Errors that can occur during topic registry operations.
#[derive(Debug, thiserror::Error)]
pub enum TopicError {
    /// The registry has reached its maximum number of topics.
    #[error("topic registry is full (max {MAX_TOPICS} topics)")]
    CapacityReached,
}

/// In-memory map from topic name to subscribed session ids.
///
/// Thread-safe via [`RwLock`].
pub struct TopicRegistry {
    topics: RwLock<HashMap<String, HashSet<String>>>,
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicRegistry {
    /// Creates a new, empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribes a session to a topic.
    ///
    /// Returns `true` if the subscription is new, `false` if the session was
    /// already subscribed.
    ///
    /// # Errors
    ///
    /// Returns [`TopicError::CapacityReached`] if the topic is new and the
    /// registry is full.
    pub async fn subscribe(&self, topic: &str, session: &str) -> Result<bool, TopicError> {
        let mut topics = self.topics.write().await;
        if topics.len() >= MAX_TOPICS && !topics.contains_key(topic) {
            return Err(TopicError::CapacityReached);
        }
        let added = topics
            .entry(topic.to_string())
            .or_default()
            .insert(session.to_string());
        drop(topics);
        Ok(added)
    }

    /// Removes a session's subscription to a topic.
    ///
    /// Returns `true` if the session was subscribed. Topics with no remaining
    /// subscribers are forgotten.
    pub async fn unsubscribe(&self, topic: &str, session: &str) -> bool {
        let mut topics = self.topics.write().await;
        let Some(sessions) = topics.get_mut(topic) else {
            return false;
        };
        let removed = sessions.remove(session);
        if sessions.is_empty() {
            topics.remove(topic);
        }
        removed
    }

    /// Removes every subscription held by a session, returning how many
    /// were dropped.
    pub async fn unsubscribe_all(&self, session: &str) -> usize {
        let mut topics = self.topics.write().await;
        let mut dropped = 0;
        topics.retain(|_, sessions| {
            if sessions.remove(session) {
                dropped += 1;
            }
            !sessions.is_empty()
        });
        dropped
    }

    /// Returns the sessions currently subscribed to a topic.
    pub async fn subscribers(&self, topic: &str) -> Vec<String> {
        let topics = self.topics.read().await;
        topics
            .get(topic)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of topics with at least one subscriber.
    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }
}
