//! Domain types: queues, messages, topics, subscriptions.
//!
//! These are plain value types; the state machines that mutate them live in
//! `engine::queue` and `engine::topic`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single message attribute value (teacher-style single shape — no
/// parallel "old"/"new" representation, per the spec's design note).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageAttributeValue {
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_value: Option<Vec<u8>>,
}

impl MessageAttributeValue {
    pub fn string(data_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            string_value: Some(value.into()),
            binary_value: None,
        }
    }

    /// The value rendered as a UTF-8 string for filter-policy comparison,
    /// regardless of declared data type (AWS compares the string form).
    pub fn as_comparable_str(&self) -> Option<String> {
        if let Some(ref s) = self.string_value {
            return Some(s.clone());
        }
        self.binary_value
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// `{max_receive_count, dead_letter_target_arn}` — see spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedrivePolicy {
    pub max_receive_count: u32,
    pub dead_letter_target_arn: String,
}

impl RedrivePolicy {
    /// Accepts `maxReceiveCount` as either a JSON number or a numeric
    /// string; unparsable values fall back to the AWS default of 10
    /// (spec.md Design Note "Dynamic JSON attribute shapes").
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let arn = value.get("deadLetterTargetArn")?.as_str()?.to_string();
        let max_receive_count = value
            .get("maxReceiveCount")
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(10) as u32;
        Some(Self {
            max_receive_count,
            dead_letter_target_arn: arn,
        })
    }
}

/// Per-subscription attribute predicate: `{key: [permitted values]}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FilterPolicy(pub HashMap<String, Vec<String>>);

impl FilterPolicy {
    /// A message's attributes satisfy the policy iff, for every key in the
    /// policy, the message carries that attribute and its value appears in
    /// the permitted list. Missing key -> fail. (spec.md §4.3)
    pub fn is_satisfied_by(&self, attrs: &HashMap<String, MessageAttributeValue>) -> bool {
        self.0.iter().all(|(key, allowed)| {
            attrs
                .get(key)
                .and_then(|v| v.as_comparable_str())
                .map(|v| allowed.contains(&v))
                .unwrap_or(false)
        })
    }
}

/// Queue configuration attributes (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueAttributes {
    pub delay_seconds: u32,
    pub visibility_timeout: u32,
    pub maximum_message_size: u64,
    pub message_retention_period: u64,
    pub receive_message_wait_time_seconds: u32,
    pub policy: serde_json::Value,
    pub redrive_allow_policy: serde_json::Value,
    pub redrive_policy: Option<RedrivePolicy>,
    pub fifo_queue: bool,
    pub content_based_deduplication: bool,
}

impl Default for QueueAttributes {
    fn default() -> Self {
        Self {
            delay_seconds: 0,
            visibility_timeout: 30,
            maximum_message_size: 262_144,
            message_retention_period: 345_600,
            receive_message_wait_time_seconds: 0,
            policy: serde_json::json!({}),
            redrive_allow_policy: serde_json::json!({}),
            redrive_policy: None,
            fifo_queue: false,
            content_based_deduplication: false,
        }
    }
}

/// A message in flight through a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub uuid: Uuid,
    pub body: Vec<u8>,
    pub md5_of_body: String,
    pub md5_of_attributes: Option<String>,
    pub message_attributes: HashMap<String, MessageAttributeValue>,
    pub receipt_handle: Option<String>,
    pub group_id: Option<String>,
    pub deduplication_id: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub visible_at: DateTime<Utc>,
    pub receive_count: u32,
}

impl Message {
    /// A message is visible iff `now >= visible_at` and it has no active
    /// receipt lease (spec.md §3 invariants).
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.receipt_handle.is_none() && now >= self.visible_at
    }

    pub fn body_as_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A queue's delivery protocol and connection details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Subscriber {
    Sqs { queue_name: String, raw: bool },
    Http { url: String, raw: bool },
    Https { url: String, raw: bool },
}

impl Subscriber {
    pub fn protocol(&self) -> &'static str {
        match self {
            Subscriber::Sqs { .. } => "sqs",
            Subscriber::Http { .. } => "http",
            Subscriber::Https { .. } => "https",
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            Subscriber::Sqs { queue_name, .. } => queue_name,
            Subscriber::Http { url, .. } | Subscriber::Https { url, .. } => url,
        }
    }

    pub fn raw(&self) -> bool {
        match self {
            Subscriber::Sqs { raw, .. } => *raw,
            Subscriber::Http { raw, .. } => *raw,
            Subscriber::Https { raw, .. } => *raw,
        }
    }

    pub fn from_protocol_endpoint(protocol: &str, endpoint: &str, raw: bool) -> Option<Self> {
        match protocol {
            "sqs" => Some(Subscriber::Sqs {
                queue_name: endpoint.rsplit(':').next().unwrap_or(endpoint).to_string(),
                raw,
            }),
            "http" => Some(Subscriber::Http {
                url: endpoint.to_string(),
                raw,
            }),
            "https" => Some(Subscriber::Https {
                url: endpoint.to_string(),
                raw,
            }),
            _ => None,
        }
    }
}

/// A single topic subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_arn: String,
    pub topic_arn: String,
    pub subscriber: Subscriber,
    pub filter_policy: Option<FilterPolicy>,
}

/// An SNS topic and its subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub arn: String,
    pub subscriptions: Vec<Subscription>,
}

impl Topic {
    pub fn new(name: impl Into<String>, arn: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arn: arn.into(),
            subscriptions: Vec::new(),
        }
    }
}
