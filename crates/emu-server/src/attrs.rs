//! Translates the wire-level `Attribute.<N>.Name/Value` string map into
//! `emu_core::model::QueueAttributes`, applying each key AWS defines for
//! `CreateQueue`/`SetQueueAttributes`.

use std::collections::HashMap;

use emu_core::model::{QueueAttributes, RedrivePolicy};

pub fn apply(base: &mut QueueAttributes, map: &HashMap<String, String>) {
    if let Some(v) = map.get("DelaySeconds").and_then(|v| v.parse().ok()) {
        base.delay_seconds = v;
    }
    if let Some(v) = map.get("VisibilityTimeout").and_then(|v| v.parse().ok()) {
        base.visibility_timeout = v;
    }
    if let Some(v) = map.get("MaximumMessageSize").and_then(|v| v.parse().ok()) {
        base.maximum_message_size = v;
    }
    if let Some(v) = map.get("MessageRetentionPeriod").and_then(|v| v.parse().ok()) {
        base.message_retention_period = v;
    }
    if let Some(v) = map
        .get("ReceiveMessageWaitTimeSeconds")
        .and_then(|v| v.parse().ok())
    {
        base.receive_message_wait_time_seconds = v;
    }
    if let Some(v) = map.get("Policy") {
        if let Ok(json) = serde_json::from_str(v) {
            base.policy = json;
        }
    }
    if let Some(v) = map.get("RedriveAllowPolicy") {
        if let Ok(json) = serde_json::from_str(v) {
            base.redrive_allow_policy = json;
        }
    }
    if let Some(v) = map.get("RedrivePolicy") {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(v) {
            base.redrive_policy = RedrivePolicy::from_json(&json);
        }
    }
    // FifoQueue is immutable after creation; only honored on CreateQueue,
    // where `base` starts from the queue's attribute defaults.
    if let Some(v) = map.get("FifoQueue") {
        base.fifo_queue = v == "true";
    }
    if let Some(v) = map.get("ContentBasedDeduplication") {
        base.content_based_deduplication = v == "true";
    }
}

/// All attribute values `GetQueueAttributes` may return, keyed by the
/// requested names (or every key when "All" is requested).
pub fn collect(
    attrs: &QueueAttributes,
    approx_visible: u64,
    approx_in_flight: u64,
    approx_delayed: u64,
    requested: &[String],
) -> Vec<(String, String)> {
    let all: Vec<(String, String)> = vec![
        ("DelaySeconds".into(), attrs.delay_seconds.to_string()),
        ("VisibilityTimeout".into(), attrs.visibility_timeout.to_string()),
        ("MaximumMessageSize".into(), attrs.maximum_message_size.to_string()),
        (
            "MessageRetentionPeriod".into(),
            attrs.message_retention_period.to_string(),
        ),
        (
            "ReceiveMessageWaitTimeSeconds".into(),
            attrs.receive_message_wait_time_seconds.to_string(),
        ),
        ("FifoQueue".into(), attrs.fifo_queue.to_string()),
        (
            "ContentBasedDeduplication".into(),
            attrs.content_based_deduplication.to_string(),
        ),
        ("ApproximateNumberOfMessages".into(), approx_visible.to_string()),
        (
            "ApproximateNumberOfMessagesNotVisible".into(),
            approx_in_flight.to_string(),
        ),
        (
            "ApproximateNumberOfMessagesDelayed".into(),
            approx_delayed.to_string(),
        ),
        ("Policy".into(), attrs.policy.to_string()),
        ("RedriveAllowPolicy".into(), attrs.redrive_allow_policy.to_string()),
    ];

    let mut all = all;
    if let Some(ref redrive) = attrs.redrive_policy {
        all.push((
            "RedrivePolicy".into(),
            serde_json::json!({
                "maxReceiveCount": redrive.max_receive_count,
                "deadLetterTargetArn": redrive.dead_letter_target_arn,
            })
            .to_string(),
        ));
    }

    if requested.iter().any(|n| n == "All") {
        return all;
    }
    all.into_iter().filter(|(k, _)| requested.contains(k)).collect()
}
