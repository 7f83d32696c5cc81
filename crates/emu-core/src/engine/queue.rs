//! Queue state machine: enqueue, receive (with long-poll), delete,
//! change-visibility, purge, attribute access.
//!
//! Grounded in the in-memory reference SQS implementation's `Queue` (head =
//! oldest, `VecDeque` of messages, FIFO group locking) generalized to the
//! teacher's locking idiom: a single `parking_lot::Mutex` guards the message
//! list, and a `tokio::sync::Notify` wakes long-polling receivers — there is
//! no per-message timer, matching spec.md §4.4.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use md5::{Digest, Md5};
use parking_lot::Mutex;
use tokio::sync::{Notified, Notify};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::model::{Message, MessageAttributeValue, QueueAttributes};

fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// MD5 over the canonical attribute encoding, following the same
/// length-prefixed scheme the AWS wire protocol uses so the hash is stable
/// regardless of attribute insertion order.
fn md5_of_attributes(attrs: &HashMap<String, MessageAttributeValue>) -> Option<String> {
    if attrs.is_empty() {
        return None;
    }
    let mut keys: Vec<&String> = attrs.keys().collect();
    keys.sort();

    let mut buf = Vec::new();
    for key in keys {
        let attr = &attrs[key];
        for part in [key.as_bytes(), attr.data_type.as_bytes()] {
            buf.extend_from_slice(&(part.len() as u32).to_be_bytes());
            buf.extend_from_slice(part);
        }
        if let Some(ref s) = attr.string_value {
            buf.push(1);
            buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
            buf.extend_from_slice(s.as_bytes());
        } else if let Some(ref b) = attr.binary_value {
            buf.push(2);
            buf.extend_from_slice(&(b.len() as u32).to_be_bytes());
            buf.extend_from_slice(b);
        }
    }
    Some(md5_hex(&buf))
}

/// Result of a successful `SendMessage`.
#[derive(Debug, Clone)]
pub struct SendMessageOutcome {
    pub message_id: Uuid,
    pub md5_of_body: String,
    pub md5_of_attributes: Option<String>,
}

/// A message handed back from `ReceiveMessage`.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message: Message,
}

/// A message that crossed its redrive threshold during a receive attempt
/// and must be appended to the named dead-letter queue.
pub(crate) struct Redrive {
    pub dead_letter_target_arn: String,
    pub message: Message,
}

struct QueueState {
    attributes: QueueAttributes,
    messages: VecDeque<Message>,
    /// FIFO group ids with a message currently leased (spec.md §4.2).
    locked_groups: HashSet<String>,
}

/// A live queue: its configuration, message list, and the signaling
/// primitive long-polling receivers wait on.
pub struct QueueHandle {
    pub name: String,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl QueueHandle {
    pub fn new(name: impl Into<String>, attributes: QueueAttributes) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState {
                attributes,
                messages: VecDeque::new(),
                locked_groups: HashSet::new(),
            }),
            notify: Notify::new(),
        }
    }

    pub fn attributes(&self) -> QueueAttributes {
        self.state.lock().attributes.clone()
    }

    pub fn set_attributes(&self, attributes: QueueAttributes) {
        self.state.lock().attributes = attributes;
    }

    pub fn approximate_counts(&self, now: DateTime<Utc>) -> (u64, u64, u64) {
        let state = self.state.lock();
        let mut visible = 0u64;
        let mut delayed = 0u64;
        let mut in_flight = 0u64;
        for m in &state.messages {
            if m.receipt_handle.is_some() {
                in_flight += 1;
            } else if now >= m.visible_at {
                visible += 1;
            } else {
                delayed += 1;
            }
        }
        (visible, in_flight, delayed)
    }

    /// spec.md §4.2 SendMessage.
    pub fn send_message(
        &self,
        body: Vec<u8>,
        attrs: HashMap<String, MessageAttributeValue>,
        delay: Option<u32>,
        group_id: Option<String>,
        dedup_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<SendMessageOutcome> {
        let mut state = self.state.lock();
        if body.len() as u64 > state.attributes.maximum_message_size {
            return Err(EngineError::MessageTooLong {
                limit: state.attributes.maximum_message_size,
            });
        }

        let delay_secs = delay.unwrap_or(state.attributes.delay_seconds) as i64;
        let md5_of_body = md5_hex(&body);
        let md5_of_attributes = md5_of_attributes(&attrs);
        let message_id = Uuid::new_v4();

        let message = Message {
            uuid: message_id,
            body,
            md5_of_body: md5_of_body.clone(),
            md5_of_attributes: md5_of_attributes.clone(),
            message_attributes: attrs,
            receipt_handle: None,
            group_id,
            deduplication_id: dedup_id,
            enqueued_at: now,
            visible_at: now + ChronoDuration::seconds(delay_secs),
            receive_count: 0,
        };
        state.messages.push_back(message);
        drop(state);
        self.notify.notify_waiters();

        Ok(SendMessageOutcome {
            message_id,
            md5_of_body,
            md5_of_attributes,
        })
    }

    /// Appends a message carried over from another queue's redrive or
    /// publish fan-out, preserving its `receive_count` (spec.md §4.2
    /// "Key algorithm — redrive").
    pub fn append_carried_over(&self, mut message: Message, now: DateTime<Utc>) {
        message.receipt_handle = None;
        message.visible_at = now;
        let mut state = self.state.lock();
        state.messages.push_back(message);
        drop(state);
        self.notify.notify_waiters();
    }

    /// The synchronous scan portion of ReceiveMessage: pulls up to
    /// `max_messages` eligible messages, generating fresh receipt handles,
    /// and diverts any whose `receive_count` has now crossed the queue's
    /// redrive threshold. Returns `(delivered, redrives, notified)`.
    ///
    /// `notified` is a `Notified` future registered against this queue's
    /// `Notify` *before* the scan's mutex is released, so a concurrent
    /// `send_message`/`change_message_visibility`/`tick` that fires in the
    /// gap between this call returning and the caller awaiting `notified`
    /// still wakes it — `Notify::notify_waiters()` only wakes futures that
    /// existed at the time of the call, so registering after the mutex
    /// drop (as a separate `wait_for_activity` call on the next loop turn)
    /// can silently miss a wakeup and stall a long-poll receiver for the
    /// full wait timeout.
    pub(crate) fn try_receive(
        &self,
        max_messages: u32,
        visibility_timeout_override: Option<u32>,
        now: DateTime<Utc>,
    ) -> (Vec<ReceivedMessage>, Vec<Redrive>, Notified<'_>) {
        let mut state = self.state.lock();
        let effective_vt = visibility_timeout_override.unwrap_or(state.attributes.visibility_timeout);
        let fifo = state.attributes.fifo_queue;
        let redrive_policy = state.attributes.redrive_policy.clone();

        let mut delivered = Vec::new();
        let mut redrives = Vec::new();
        let mut seen_groups: HashSet<String> = HashSet::new();
        let mut indices = Vec::new();

        for (i, m) in state.messages.iter().enumerate() {
            if delivered.len() + redrives.len() >= max_messages as usize {
                break;
            }
            if !m.is_visible(now) {
                continue;
            }
            if fifo {
                if let Some(ref gid) = m.group_id {
                    if state.locked_groups.contains(gid) || seen_groups.contains(gid) {
                        continue;
                    }
                }
            }
            if let Some(ref gid) = m.group_id {
                seen_groups.insert(gid.clone());
            }
            indices.push(i);
        }

        // Remove selected messages in reverse order to keep earlier indices valid.
        let mut selected: Vec<Message> = Vec::with_capacity(indices.len());
        for &idx in indices.iter().rev() {
            selected.push(state.messages.remove(idx).expect("index from live scan"));
        }
        selected.reverse(); // restore original (head-to-tail) order

        for mut message in selected {
            message.receive_count += 1;

            if let Some(ref policy) = redrive_policy {
                if message.receive_count > policy.max_receive_count {
                    if let Some(ref gid) = message.group_id {
                        state.locked_groups.remove(gid);
                    }
                    redrives.push(Redrive {
                        dead_letter_target_arn: policy.dead_letter_target_arn.clone(),
                        message,
                    });
                    continue;
                }
            }

            let receipt_handle = Uuid::new_v4().to_string();
            message.receipt_handle = Some(receipt_handle);
            message.visible_at = now + ChronoDuration::seconds(effective_vt as i64);
            if let Some(ref gid) = message.group_id {
                state.locked_groups.insert(gid.clone());
            }
            delivered.push(ReceivedMessage { message });
        }

        // Registered while `state` is still held, so no concurrent
        // send/visibility-change can land between the scan and the
        // caller's wait and be missed.
        let notified = self.notify.notified();
        drop(state);
        (delivered, redrives, notified)
    }

    /// Awaits a `Notified` future obtained from `try_receive`, bounded by
    /// `timeout`. Used by the long-poll receive loop between scan attempts.
    pub async fn wait_for_activity(notified: Notified<'_>, timeout: std::time::Duration) {
        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep(timeout) => {}
        }
    }

    pub fn delete_message(&self, receipt_handle: &str) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(pos) = state
            .messages
            .iter()
            .position(|m| m.receipt_handle.as_deref() == Some(receipt_handle))
        {
            let message = state.messages.remove(pos).unwrap();
            if let Some(ref gid) = message.group_id {
                state.locked_groups.remove(gid);
            }
        }
        // Stale/unknown handles are a silent no-op (spec.md §4.2, invariant 5).
        Ok(())
    }

    pub fn change_message_visibility(
        &self,
        receipt_handle: &str,
        new_timeout: u32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        match state
            .messages
            .iter_mut()
            .find(|m| m.receipt_handle.as_deref() == Some(receipt_handle))
        {
            Some(message) => {
                message.visible_at = now + ChronoDuration::seconds(new_timeout as i64);
                drop(state);
                self.notify.notify_waiters();
                Ok(())
            }
            None => Err(EngineError::ReceiptHandleIsInvalid(receipt_handle.to_string())),
        }
    }

    pub fn purge(&self) {
        let mut state = self.state.lock();
        state.messages.clear();
        state.locked_groups.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    /// Periodic housekeeping: expire visibility leases and drop
    /// retention-expired messages. Retention wins over in-flight
    /// (spec.md §4.2 "Key algorithm — retention").
    pub(crate) fn tick(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        let retention = state.attributes.message_retention_period as i64;

        state
            .messages
            .retain(|m| (now - m.enqueued_at) <= ChronoDuration::seconds(retention));

        let mut woke = false;
        for message in state.messages.iter_mut() {
            if message.receipt_handle.is_some() && now >= message.visible_at {
                message.receipt_handle = None;
                woke = true;
            }
        }
        if woke {
            // Recompute locked groups from the remaining in-flight messages.
            let still_locked: HashSet<String> = state
                .messages
                .iter()
                .filter(|m| m.receipt_handle.is_some())
                .filter_map(|m| m.group_id.clone())
                .collect();
            state.locked_groups = still_locked;
        }
        drop(state);
        if woke {
            self.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn send_then_receive_returns_body() {
        let q = QueueHandle::new("q", QueueAttributes::default());
        q.send_message(b"hello".to_vec(), HashMap::new(), None, None, None, now())
            .unwrap();
        let (received, redrives, _) = q.try_receive(10, None, now());
        assert!(redrives.is_empty());
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].message.body_as_str(), "hello");
    }

    #[test]
    fn delayed_message_not_immediately_visible() {
        let q = QueueHandle::new("q", QueueAttributes::default());
        let t0 = now();
        q.send_message(b"x".to_vec(), HashMap::new(), Some(2), None, None, t0)
            .unwrap();
        let (received, _, _) = q.try_receive(10, None, t0);
        assert!(received.is_empty());
        let (received, _, _) = q.try_receive(10, None, t0 + ChronoDuration::seconds(3));
        assert_eq!(received.len(), 1);
    }

    #[test]
    fn visibility_expiry_returns_message_to_visible_set() {
        let q = QueueHandle::new("q", QueueAttributes::default());
        let t0 = now();
        q.send_message(b"y".to_vec(), HashMap::new(), None, None, None, t0)
            .unwrap();
        let (received, _, _) = q.try_receive(10, Some(1), t0);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].message.receive_count, 1);

        // Within the lease, nothing else is visible.
        let (received, _, _) = q.try_receive(10, None, t0 + ChronoDuration::milliseconds(500));
        assert!(received.is_empty());

        // After the lease expires, the same message comes back with receive_count = 2.
        let (received, _, _) = q.try_receive(10, None, t0 + ChronoDuration::milliseconds(1500));
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].message.receive_count, 2);
    }

    #[test]
    fn redrive_after_exceeding_max_receive_count() {
        let mut attrs = QueueAttributes::default();
        attrs.visibility_timeout = 0;
        attrs.redrive_policy = Some(crate::model::RedrivePolicy {
            max_receive_count: 2,
            dead_letter_target_arn: "arn:aws:sqs:local:000:dlq".into(),
        });
        let q = QueueHandle::new("q", attrs);
        let t0 = now();
        q.send_message(b"z".to_vec(), HashMap::new(), None, None, None, t0)
            .unwrap();

        let (r1, d1, _) = q.try_receive(10, None, t0);
        assert_eq!(r1.len(), 1);
        assert!(d1.is_empty());

        let (r2, d2, _) = q.try_receive(10, None, t0);
        assert_eq!(r2.len(), 1);
        assert!(d2.is_empty());

        let (r3, d3, _) = q.try_receive(10, None, t0);
        assert!(r3.is_empty());
        assert_eq!(d3.len(), 1);
        assert_eq!(d3[0].message.receive_count, 3);
    }

    #[test]
    fn delete_on_stale_handle_is_noop() {
        let q = QueueHandle::new("q", QueueAttributes::default());
        assert!(q.delete_message("no-such-handle").is_ok());
    }

    #[test]
    fn fifo_blocks_receive_of_same_group_while_in_flight() {
        let mut attrs = QueueAttributes::default();
        attrs.fifo_queue = true;
        let q = QueueHandle::new("q.fifo", attrs);
        let t0 = now();
        q.send_message(b"1".to_vec(), HashMap::new(), None, Some("A".into()), None, t0)
            .unwrap();
        q.send_message(b"2".to_vec(), HashMap::new(), None, Some("A".into()), None, t0)
            .unwrap();
        q.send_message(b"3".to_vec(), HashMap::new(), None, Some("B".into()), None, t0)
            .unwrap();

        let (received, _, _) = q.try_receive(10, None, t0);
        let bodies: Vec<String> = received.iter().map(|r| r.message.body_as_str()).collect();
        assert!(bodies == vec!["1".to_string(), "3".to_string()]);
    }
}
