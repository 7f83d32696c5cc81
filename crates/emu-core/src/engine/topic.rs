//! Topic state machine: subscribe, unsubscribe, and publish fan-out.
//!
//! Grounded directly in `original_source/app/gosns/publish.go`'s
//! `PublishV1`/`publishSQS`/`publishHTTP` trio: filter evaluation happens
//! per-subscription before delivery, SQS-protocol subscribers are appended
//! to the target queue under the registry (never the topic's own lock), and
//! HTTP/HTTPS subscribers receive a signed JSON envelope with delivery
//! failures logged and swallowed rather than retried (spec.md §4.3).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::model::{FilterPolicy, MessageAttributeValue, Subscriber, Subscription, Topic};
use crate::signing;

/// Per-subscriber delivery outcome, surfaced for logging/metrics but never
/// fed back into the publish response (spec.md §4.3 invariant 4).
#[derive(Debug)]
pub enum DeliveryOutcome {
    Delivered,
    Filtered,
    QueueNotFound,
    HttpError(String),
}

#[derive(Debug)]
pub struct PublishOutcome {
    pub message_id: Uuid,
    pub deliveries: Vec<DeliveryOutcome>,
}

/// A live topic: name, ARN, and its subscriptions behind a single lock.
///
/// The lock covers only this topic's own subscription list; fan-out to SQS
/// queues always goes through the registry, which is acquired *after* this
/// lock is released, preserving the topic -> registry -> queue ordering
/// spec.md's lock-hierarchy note requires.
pub struct TopicHandle {
    pub name: String,
    pub arn: String,
    subscriptions: RwLock<Vec<Subscription>>,
}

impl TopicHandle {
    pub fn new(name: impl Into<String>, arn: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arn: arn.into(),
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    pub fn to_model(&self) -> Topic {
        Topic {
            name: self.name.clone(),
            arn: self.arn.clone(),
            subscriptions: self.subscriptions.read().clone(),
        }
    }

    pub fn subscribe(
        &self,
        subscriber: Subscriber,
        filter_policy: Option<FilterPolicy>,
    ) -> Subscription {
        let subscription = Subscription {
            subscription_arn: format!("{}:{}", self.arn, Uuid::new_v4()),
            topic_arn: self.arn.clone(),
            subscriber,
            filter_policy,
        };
        self.subscriptions.write().push(subscription.clone());
        subscription
    }

    pub fn unsubscribe(&self, subscription_arn: &str) -> Result<()> {
        let mut subs = self.subscriptions.write();
        let before = subs.len();
        subs.retain(|s| s.subscription_arn != subscription_arn);
        if subs.len() == before {
            return Err(EngineError::InvalidParameterValue(format!(
                "subscription not found: {subscription_arn}"
            )));
        }
        Ok(())
    }

    pub fn set_filter_policy(&self, subscription_arn: &str, policy: Option<FilterPolicy>) -> Result<()> {
        let mut subs = self.subscriptions.write();
        let sub = subs
            .iter_mut()
            .find(|s| s.subscription_arn == subscription_arn)
            .ok_or_else(|| EngineError::InvalidParameterValue(format!(
                "subscription not found: {subscription_arn}"
            )))?;
        sub.filter_policy = policy;
        Ok(())
    }

    pub fn list_subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.read().clone()
    }

    /// Returns the snapshot of subscriptions eligible to receive `attrs`,
    /// i.e. those whose filter policy (if any) is satisfied. Evaluated
    /// under the topic lock; delivery itself happens after release.
    pub(crate) fn eligible_subscribers(
        &self,
        attrs: &HashMap<String, MessageAttributeValue>,
    ) -> Vec<Subscription> {
        self.subscriptions
            .read()
            .iter()
            .filter(|s| {
                s.filter_policy
                    .as_ref()
                    .map(|p| p.is_satisfied_by(attrs))
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }
}

/// Fan out `message` (already filtered to eligible subscribers) to each
/// subscriber. SQS subscribers are appended via `find_queue`; HTTP/HTTPS
/// subscribers receive a signed envelope POST through `http_client`.
///
/// This lives outside `TopicHandle` because delivery needs the registry
/// (to resolve queue names) and an HTTP client, neither of which a topic
/// owns — keeping the lock-hierarchy rule enforceable at the call site.
pub async fn deliver<F>(
    topic_arn: &str,
    message_id: Uuid,
    body: &str,
    subject: Option<&str>,
    attrs: &HashMap<String, MessageAttributeValue>,
    subscribers: Vec<Subscription>,
    structured: Option<&HashMap<String, String>>,
    find_queue: F,
    http_client: &reqwest::Client,
    base_url: &str,
) -> PublishOutcome
where
    F: Fn(&str) -> Option<Arc<crate::engine::queue::QueueHandle>>,
{
    let mut deliveries = Vec::with_capacity(subscribers.len());

    // Per-protocol message body when `MessageStructure == "json"` (spec.md
    // §4.3): pick the entry keyed by protocol name, falling back to
    // "default".
    let body_for = |protocol: &str| -> String {
        match structured {
            Some(map) => map
                .get(protocol)
                .or_else(|| map.get("default"))
                .cloned()
                .unwrap_or_else(|| body.to_string()),
            None => body.to_string(),
        }
    };

    for sub in subscribers {
        match &sub.subscriber {
            Subscriber::Sqs { queue_name, raw } => {
                match find_queue(queue_name) {
                    Some(queue) => {
                        let effective_body = body_for(sub.subscriber.protocol());
                        let delivered_body = if *raw {
                            effective_body.clone()
                        } else {
                            signing::envelope_json(topic_arn, message_id, &effective_body, subject, attrs, base_url)
                        };
                        let now = Utc::now();
                        let forwarded_attrs = if *raw { attrs.clone() } else { HashMap::new() };
                        let _ = queue.send_message(
                            delivered_body.into_bytes(),
                            forwarded_attrs,
                            None,
                            None,
                            None,
                            now,
                        );
                        deliveries.push(DeliveryOutcome::Delivered);
                    }
                    None => {
                        tracing::warn!(queue = %queue_name, "publish target queue not found, dropping");
                        deliveries.push(DeliveryOutcome::QueueNotFound);
                    }
                }
            }
            Subscriber::Http { url, raw } | Subscriber::Https { url, raw } => {
                let effective_body = body_for(sub.subscriber.protocol());
                let payload = if *raw {
                    effective_body.clone()
                } else {
                    signing::signed_envelope_json(topic_arn, message_id, &effective_body, subject, attrs, base_url)
                };
                match http_client
                    .post(url)
                    .header("x-amz-sns-message-type", "Notification")
                    .body(payload)
                    .send()
                    .await
                {
                    Ok(resp) if resp.status().is_success() => {
                        deliveries.push(DeliveryOutcome::Delivered);
                    }
                    Ok(resp) => {
                        let status = resp.status();
                        tracing::warn!(%url, %status, "subscriber endpoint returned non-2xx, dropping");
                        deliveries.push(DeliveryOutcome::HttpError(status.to_string()));
                    }
                    Err(e) => {
                        tracing::warn!(%url, error = %e, "subscriber delivery failed, dropping");
                        deliveries.push(DeliveryOutcome::HttpError(e.to_string()));
                    }
                }
            }
        }
    }

    PublishOutcome {
        message_id,
        deliveries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_policy_blocks_subscription() {
        let topic = TopicHandle::new("t", "arn:local:sns:t");
        let mut policy = FilterPolicy::default();
        policy.0.insert("kind".into(), vec!["order".into()]);
        topic.subscribe(
            Subscriber::Http {
                url: "http://example.test".into(),
                raw: false,
            },
            Some(policy),
        );

        let mut attrs = HashMap::new();
        attrs.insert("kind".into(), MessageAttributeValue::string("String", "invoice"));
        assert!(topic.eligible_subscribers(&attrs).is_empty());

        let mut attrs2 = HashMap::new();
        attrs2.insert("kind".into(), MessageAttributeValue::string("String", "order"));
        assert_eq!(topic.eligible_subscribers(&attrs2).len(), 1);
    }

    #[test]
    fn no_filter_policy_accepts_all() {
        let topic = TopicHandle::new("t", "arn:local:sns:t");
        topic.subscribe(
            Subscriber::Sqs {
                queue_name: "q".into(),
                raw: false,
            },
            None,
        );
        assert_eq!(topic.eligible_subscribers(&HashMap::new()).len(), 1);
    }

    #[test]
    fn unsubscribe_removes_entry() {
        let topic = TopicHandle::new("t", "arn:local:sns:t");
        let sub = topic.subscribe(
            Subscriber::Sqs {
                queue_name: "q".into(),
                raw: false,
            },
            None,
        );
        topic.unsubscribe(&sub.subscription_arn).unwrap();
        assert!(topic.list_subscriptions().is_empty());
    }
}
