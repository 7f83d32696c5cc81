//! The top-level directory of queues and topics.
//!
//! Grounded in `visual-queue-manager::engine::queue::QueueManager`'s
//! cache-plus-lookup shape, generalized from a Postgres-backed cache to the
//! sole source of truth: a `parking_lot::RwLock<HashMap<..>>` per
//! collection. Deliberately not `DashMap` — spec.md's lock-hierarchy note
//! calls for a single registry lock above the per-queue/per-topic locks,
//! and a plain `RwLock` makes that hierarchy explicit at each call site
//! (registry lock -> queue lock -> topic lock, top-down only).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::engine::queue::QueueHandle;
use crate::engine::topic::{self, TopicHandle};
use crate::error::{EngineError, Result};
use crate::model::{FilterPolicy, MessageAttributeValue, QueueAttributes, Subscriber, Subscription};

const ACCOUNT_ID: &str = "000000000000";

pub fn queue_arn(name: &str) -> String {
    format!("arn:aws:sqs:local:{ACCOUNT_ID}:{name}")
}

pub fn topic_arn(name: &str) -> String {
    format!("arn:aws:sns:local:{ACCOUNT_ID}:{name}")
}

/// Trailing path/ARN segment, used to resolve a queue name from either a
/// queue URL or an ARN (matches `original_source/app/gosns/publish.go`'s
/// endpoint resolution).
pub fn trailing_segment(s: &str) -> &str {
    s.rsplit(['/', ':']).next().unwrap_or(s)
}

pub struct Registry {
    queues: RwLock<HashMap<String, Arc<QueueHandle>>>,
    topics: RwLock<HashMap<String, Arc<TopicHandle>>>,
    http_client: reqwest::Client,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            topics: RwLock::new(HashMap::new()),
            http_client: reqwest::Client::new(),
        }
    }

    // ---- Queues ---------------------------------------------------------

    /// Idempotent per spec.md §4.1: creating a queue that already exists
    /// with identical attributes succeeds. A conflicting FIFO setting is a
    /// `QueueNameExists` (the name itself can't be reused across queue
    /// types); any other attribute mismatch is a `QueueAlreadyExists`.
    pub fn create_queue(&self, name: &str, attributes: QueueAttributes) -> Result<Arc<QueueHandle>> {
        let mut queues = self.queues.write();
        if let Some(existing) = queues.get(name) {
            let existing_attrs = existing.attributes();
            if existing_attrs == attributes {
                return Ok(Arc::clone(existing));
            }
            if existing_attrs.fifo_queue != attributes.fifo_queue {
                return Err(EngineError::QueueNameExists(name.to_string()));
            }
            return Err(EngineError::QueueAlreadyExists(name.to_string()));
        }
        let handle = Arc::new(QueueHandle::new(name, attributes));
        queues.insert(name.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    pub fn get_queue(&self, name: &str) -> Option<Arc<QueueHandle>> {
        self.queues.read().get(name).cloned()
    }

    pub fn get_queue_by_ref(&self, queue_ref: &str) -> Option<Arc<QueueHandle>> {
        self.get_queue(trailing_segment(queue_ref))
    }

    pub fn delete_queue(&self, name: &str) -> Result<()> {
        let mut queues = self.queues.write();
        if queues.remove(name).is_none() {
            return Err(EngineError::QueueDoesNotExist(name.to_string()));
        }
        Ok(())
    }

    pub fn list_queue_names(&self, prefix: Option<&str>) -> Vec<String> {
        let mut names: Vec<String> = self
            .queues
            .read()
            .keys()
            .filter(|n| prefix.map(|p| n.starts_with(p)).unwrap_or(true))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Resolves the registry's `name -> Arc<QueueHandle>` map for a
    /// redrive target ARN and appends the diverted message, preserving
    /// its `receive_count`. Called after the source queue's own lock has
    /// been released (see `engine::queue::QueueHandle::try_receive`).
    pub fn redrive_into(&self, dead_letter_target_arn: &str, message: crate::model::Message) {
        let name = trailing_segment(dead_letter_target_arn);
        if let Some(dlq) = self.get_queue(name) {
            dlq.append_carried_over(message, Utc::now());
        } else {
            tracing::warn!(
                target = %dead_letter_target_arn,
                "redrive target queue not found, message dropped"
            );
        }
    }

    /// ReceiveMessage including long-poll wait and redrive-at-receive-time
    /// (spec.md §4.4). Loops: scan, diverting any message crossing its
    /// redrive threshold to its DLQ; if nothing was delivered and no
    /// redrive consumed the wait budget, sleep until either new activity
    /// or the wait deadline, then retry.
    pub async fn receive_message(
        &self,
        queue_name: &str,
        max_messages: u32,
        visibility_timeout_override: Option<u32>,
        wait_time_seconds: u32,
    ) -> Result<Vec<crate::engine::queue::ReceivedMessage>> {
        let queue = self
            .get_queue(queue_name)
            .ok_or_else(|| EngineError::QueueDoesNotExist(queue_name.to_string()))?;

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(wait_time_seconds as u64);
        loop {
            let (delivered, redrives, notified) =
                queue.try_receive(max_messages, visibility_timeout_override, Utc::now());

            for redrive in redrives {
                self.redrive_into(&redrive.dead_letter_target_arn, redrive.message);
            }

            if !delivered.is_empty() || wait_time_seconds == 0 {
                return Ok(delivered);
            }

            let now = std::time::Instant::now();
            if now >= deadline {
                return Ok(delivered);
            }
            crate::engine::queue::QueueHandle::wait_for_activity(notified, deadline - now).await;
        }
    }

    pub fn tick_all(&self) {
        let now = Utc::now();
        let queues: Vec<Arc<QueueHandle>> = self.queues.read().values().cloned().collect();
        for q in queues {
            q.tick(now);
        }
    }

    // ---- Topics -----------------------------------------------------------

    pub fn create_topic(&self, name: &str) -> Arc<TopicHandle> {
        let mut topics = self.topics.write();
        if let Some(existing) = topics.get(name) {
            return Arc::clone(existing);
        }
        let handle = Arc::new(TopicHandle::new(name, topic_arn(name)));
        topics.insert(name.to_string(), Arc::clone(&handle));
        handle
    }

    pub fn get_topic(&self, name: &str) -> Option<Arc<TopicHandle>> {
        self.topics.read().get(name).cloned()
    }

    pub fn get_topic_by_arn(&self, arn: &str) -> Option<Arc<TopicHandle>> {
        self.get_topic(trailing_segment(arn))
    }

    pub fn delete_topic(&self, name: &str) -> Result<()> {
        let mut topics = self.topics.write();
        if topics.remove(name).is_none() {
            return Err(EngineError::TopicNotFound(name.to_string()));
        }
        Ok(())
    }

    pub fn list_topics(&self) -> Vec<Arc<TopicHandle>> {
        let mut topics: Vec<Arc<TopicHandle>> = self.topics.read().values().cloned().collect();
        topics.sort_by(|a, b| a.name.cmp(&b.name));
        topics
    }

    pub fn subscribe(
        &self,
        topic_name: &str,
        subscriber: Subscriber,
        filter_policy: Option<FilterPolicy>,
    ) -> Result<Subscription> {
        let topic = self
            .get_topic(topic_name)
            .ok_or_else(|| EngineError::TopicNotFound(topic_name.to_string()))?;
        Ok(topic.subscribe(subscriber, filter_policy))
    }

    /// Publishes `body` to every subscriber of `topic_name` whose filter
    /// policy (if any) is satisfied. Follows the topic -> registry ->
    /// queue lock order: the topic lock is released by
    /// `eligible_subscribers` before any queue lookup happens.
    pub async fn publish(
        &self,
        topic_name: &str,
        body: &str,
        subject: Option<&str>,
        attrs: HashMap<String, MessageAttributeValue>,
        structured: Option<HashMap<String, String>>,
        base_url: &str,
    ) -> Result<topic::PublishOutcome> {
        let handle = self
            .get_topic(topic_name)
            .ok_or_else(|| EngineError::TopicNotFound(topic_name.to_string()))?;

        let message_id = Uuid::new_v4();
        let eligible = handle.eligible_subscribers(&attrs);
        let arn = handle.arn.clone();

        let outcome = topic::deliver(
            &arn,
            message_id,
            body,
            subject,
            &attrs,
            eligible,
            structured.as_ref(),
            |queue_name| self.get_queue(queue_name),
            &self.http_client,
            base_url,
        )
        .await;

        Ok(outcome)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_queue_is_idempotent_on_identical_attributes() {
        let registry = Registry::new();
        registry.create_queue("q", QueueAttributes::default()).unwrap();
        assert!(registry.create_queue("q", QueueAttributes::default()).is_ok());
    }

    #[test]
    fn create_queue_with_conflicting_fifo_setting_is_queue_name_exists() {
        let registry = Registry::new();
        registry.create_queue("q", QueueAttributes::default()).unwrap();

        let mut fifo_attrs = QueueAttributes::default();
        fifo_attrs.fifo_queue = true;
        let err = registry.create_queue("q", fifo_attrs).unwrap_err();
        assert_eq!(err, EngineError::QueueNameExists("q".to_string()));
    }

    #[test]
    fn create_queue_with_other_attribute_mismatch_is_queue_already_exists() {
        let registry = Registry::new();
        registry.create_queue("q", QueueAttributes::default()).unwrap();

        let mut other_attrs = QueueAttributes::default();
        other_attrs.visibility_timeout = 60;
        let err = registry.create_queue("q", other_attrs).unwrap_err();
        assert_eq!(err, EngineError::QueueAlreadyExists("q".to_string()));
    }
}
