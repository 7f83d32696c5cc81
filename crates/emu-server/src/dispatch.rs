//! The action dispatcher: reads the `Action` form field, routes to the
//! matching `emu-core` operation, marshals the result to XML.
//!
//! Grounded in `original_source`'s action-name-to-handler-function router
//! and the teacher's `routes.rs` (`State<AppState>` extraction via axum).
//! This is the only module in the workspace that knows both the wire
//! format and the engine API at once.

use std::collections::HashMap;

use axum::extract::State;
use axum::response::{IntoResponse, Response};

use emu_core::model::{FilterPolicy, Subscriber};
use emu_core::EngineError;

use crate::state::AppState;
use crate::wire::{form::FormParams, xml, HttpError};

fn queue_url(state: &AppState, name: &str) -> String {
    format!("http://{}/queue/{name}", state.config.server.address())
}

fn base_url(state: &AppState) -> String {
    format!("http://{}", state.config.server.address())
}

fn resolve_queue_name(params: &FormParams) -> Result<String, HttpError> {
    let raw = params
        .get("QueueUrl")
        .or_else(|| params.get("QueueName"))
        .ok_or_else(|| EngineError::InvalidParameterValue("QueueUrl".to_string()))?;
    Ok(emu_core::registry::trailing_segment(raw).to_string())
}

fn resolve_topic_name(params: &FormParams) -> Result<String, HttpError> {
    let raw = params
        .get("TopicArn")
        .or_else(|| params.get("Name"))
        .ok_or_else(|| EngineError::InvalidParameterValue("TopicArn".to_string()))?;
    Ok(emu_core::registry::trailing_segment(raw).to_string())
}

pub async fn handle(State(state): State<AppState>, body: String) -> Response {
    let params = FormParams::from_body(&body);
    match dispatch(&state, &params).await {
        Ok(xml_body) => ([("Content-Type", "text/xml")], xml_body).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn dispatch(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let action = params
        .get("Action")
        .ok_or_else(|| EngineError::InvalidAction("<missing>".to_string()))?
        .to_string();

    match action.as_str() {
        "CreateQueue" => create_queue(state, params),
        "GetQueueUrl" => get_queue_url(state, params),
        "DeleteQueue" => delete_queue(state, params),
        "ListQueues" => list_queues(state, params),
        "SendMessage" => send_message(state, params),
        "SendMessageBatch" => send_message_batch(state, params),
        "ReceiveMessage" => receive_message(state, params).await,
        "DeleteMessage" => delete_message(state, params),
        "ChangeMessageVisibility" => change_message_visibility(state, params),
        "PurgeQueue" => purge_queue(state, params),
        "GetQueueAttributes" => get_queue_attributes(state, params),
        "SetQueueAttributes" => set_queue_attributes(state, params),

        "CreateTopic" => create_topic(state, params),
        "DeleteTopic" => delete_topic(state, params),
        "ListTopics" => list_topics(state),
        "Subscribe" => subscribe(state, params),
        "Unsubscribe" => unsubscribe(state, params),
        "SetSubscriptionAttributes" => set_subscription_attributes(state, params),
        "ListSubscriptionsByTopic" => list_subscriptions_by_topic(state, params),
        "Publish" => publish(state, params).await,

        other => Err(EngineError::InvalidAction(other.to_string()).into()),
    }
}

fn create_queue(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let name = params.get_or_invalid("QueueName")?;
    let mut attrs = state.config.queue_attribute_defaults.to_queue_attributes();
    let map = params.indexed_attributes("Attribute");
    crate::attrs::apply(&mut attrs, &map);
    state.registry.create_queue(&name, attrs)?;
    Ok(xml::create_queue_response(&queue_url(state, &name)))
}

fn get_queue_url(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let name = params.get_or_invalid("QueueName")?;
    state
        .registry
        .get_queue(&name)
        .ok_or_else(|| EngineError::QueueDoesNotExist(name.clone()))?;
    Ok(xml::get_queue_url_response(&queue_url(state, &name)))
}

fn delete_queue(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let name = resolve_queue_name(params)?;
    state.registry.delete_queue(&name)?;
    Ok(xml::simple_response("DeleteQueue"))
}

fn list_queues(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let prefix = params.get("QueueNamePrefix");
    let urls = state
        .registry
        .list_queue_names(prefix)
        .into_iter()
        .map(|n| queue_url(state, &n))
        .collect::<Vec<_>>();
    Ok(xml::list_queues_response(&urls))
}

fn send_message(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let name = resolve_queue_name(params)?;
    let queue = state
        .registry
        .get_queue(&name)
        .ok_or_else(|| EngineError::QueueDoesNotExist(name.clone()))?;

    let body = params.get_or_invalid("MessageBody")?;
    let delay = params.get_u32("DelaySeconds");
    let group_id = params.get_owned("MessageGroupId");
    let dedup_id = params.get_owned("MessageDeduplicationId");
    let attrs = params.message_attributes();

    let outcome = queue.send_message(
        body.into_bytes(),
        attrs,
        delay,
        group_id,
        dedup_id,
        chrono::Utc::now(),
    )?;

    Ok(xml::send_message_response(
        &outcome.message_id.to_string(),
        &outcome.md5_of_body,
        outcome.md5_of_attributes.as_deref(),
    ))
}

fn send_message_batch(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let name = resolve_queue_name(params)?;
    let queue = state
        .registry
        .get_queue(&name)
        .ok_or_else(|| EngineError::QueueDoesNotExist(name.clone()))?;

    let mut successes = Vec::new();
    let mut failures = Vec::new();
    let now = chrono::Utc::now();

    let mut n = 1;
    loop {
        let prefix = format!("SendMessageBatchRequestEntry.{n}");
        let Some(id) = params.get_owned(&format!("{prefix}.Id")) else {
            break;
        };
        let Some(body) = params.get_owned(&format!("{prefix}.MessageBody")) else {
            failures.push(xml::BatchEntryFailure {
                id,
                code: "MissingParameter".to_string(),
                message: "MessageBody is required".to_string(),
            });
            n += 1;
            continue;
        };
        let delay = params.get_u32(&format!("{prefix}.DelaySeconds"));
        let group_id = params.get_owned(&format!("{prefix}.MessageGroupId"));
        let dedup_id = params.get_owned(&format!("{prefix}.MessageDeduplicationId"));

        match queue.send_message(body.into_bytes(), HashMap::new(), delay, group_id, dedup_id, now) {
            Ok(outcome) => successes.push(xml::BatchEntryResult {
                id,
                message_id: outcome.message_id.to_string(),
                md5_of_body: outcome.md5_of_body,
            }),
            Err(e) => failures.push(xml::BatchEntryFailure {
                id,
                code: e.code().to_string(),
                message: e.to_string(),
            }),
        }
        n += 1;
    }

    Ok(xml::send_message_batch_response(&successes, &failures))
}

async fn receive_message(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let name = resolve_queue_name(params)?;
    let queue = state
        .registry
        .get_queue(&name)
        .ok_or_else(|| EngineError::QueueDoesNotExist(name.clone()))?;
    let default_wait = queue.attributes().receive_message_wait_time_seconds;

    let max_messages = params.get_u32("MaxNumberOfMessages").unwrap_or(1).clamp(1, 10);
    let wait_time_seconds = params
        .get_u32("WaitTimeSeconds")
        .unwrap_or(default_wait)
        .min(20);
    let visibility_timeout_override = params.get_u32("VisibilityTimeout");

    let received = state
        .registry
        .receive_message(&name, max_messages, visibility_timeout_override, wait_time_seconds)
        .await?;

    Ok(xml::receive_message_response(&received))
}

fn delete_message(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let name = resolve_queue_name(params)?;
    let queue = state
        .registry
        .get_queue(&name)
        .ok_or_else(|| EngineError::QueueDoesNotExist(name.clone()))?;
    let receipt_handle = params.get_or_invalid("ReceiptHandle")?;
    queue.delete_message(&receipt_handle)?;
    Ok(xml::simple_response("DeleteMessage"))
}

fn change_message_visibility(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let name = resolve_queue_name(params)?;
    let queue = state
        .registry
        .get_queue(&name)
        .ok_or_else(|| EngineError::QueueDoesNotExist(name.clone()))?;
    let receipt_handle = params.get_or_invalid("ReceiptHandle")?;
    let timeout = params
        .get_u32("VisibilityTimeout")
        .ok_or_else(|| EngineError::InvalidParameterValue("VisibilityTimeout".to_string()))?;
    queue.change_message_visibility(&receipt_handle, timeout, chrono::Utc::now())?;
    Ok(xml::simple_response("ChangeMessageVisibility"))
}

fn purge_queue(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let name = resolve_queue_name(params)?;
    let queue = state
        .registry
        .get_queue(&name)
        .ok_or_else(|| EngineError::QueueDoesNotExist(name.clone()))?;
    queue.purge();
    Ok(xml::simple_response("PurgeQueue"))
}

fn get_queue_attributes(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let name = resolve_queue_name(params)?;
    let queue = state
        .registry
        .get_queue(&name)
        .ok_or_else(|| EngineError::QueueDoesNotExist(name.clone()))?;

    let mut requested = Vec::new();
    let mut n = 1;
    while let Some(v) = params.get_owned(&format!("AttributeName.{n}")) {
        requested.push(v);
        n += 1;
    }
    if requested.is_empty() {
        requested.push("All".to_string());
    }

    let attrs = queue.attributes();
    let (visible, in_flight, delayed) = queue.approximate_counts(chrono::Utc::now());
    let entries = crate::attrs::collect(&attrs, visible, in_flight, delayed, &requested);
    Ok(xml::get_queue_attributes_response(&entries))
}

fn set_queue_attributes(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let name = resolve_queue_name(params)?;
    let queue = state
        .registry
        .get_queue(&name)
        .ok_or_else(|| EngineError::QueueDoesNotExist(name.clone()))?;

    let mut attrs = queue.attributes();
    let map = params.indexed_attributes("Attribute");
    crate::attrs::apply(&mut attrs, &map);
    queue.set_attributes(attrs);
    Ok(xml::simple_response("SetQueueAttributes"))
}

fn create_topic(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let name = params.get_or_invalid("Name")?;
    let topic = state.registry.create_topic(&name);
    Ok(xml::create_topic_response(&topic.arn))
}

fn delete_topic(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let name = resolve_topic_name(params)?;
    state.registry.delete_topic(&name)?;
    Ok(xml::simple_sns_response("DeleteTopic"))
}

fn list_topics(state: &AppState) -> Result<String, HttpError> {
    let arns = state
        .registry
        .list_topics()
        .into_iter()
        .map(|t| t.arn.clone())
        .collect::<Vec<_>>();
    Ok(xml::list_topics_response(&arns))
}

fn subscribe(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let topic_name = resolve_topic_name(params)?;
    let protocol = params.get_or_invalid("Protocol")?;
    let endpoint = params.get_or_invalid("Endpoint")?;
    let raw = params.get_bool("RawMessageDelivery");
    let filter_policy = params
        .get("FilterPolicy")
        .and_then(|v| serde_json::from_str::<HashMap<String, Vec<String>>>(v).ok())
        .map(FilterPolicy);

    let subscriber = Subscriber::from_protocol_endpoint(&protocol, &endpoint, raw)
        .ok_or_else(|| EngineError::InvalidParameterValue(format!("unsupported protocol: {protocol}")))?;

    let subscription = state.registry.subscribe(&topic_name, subscriber, filter_policy)?;
    Ok(xml::subscribe_response(&subscription.subscription_arn))
}

fn unsubscribe(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let subscription_arn = params.get_or_invalid("SubscriptionArn")?;
    // subscription_arn is "<topic_arn>:<uuid>"; the topic name is the
    // trailing segment of everything before the last colon.
    let topic_part = subscription_arn
        .rsplit_once(':')
        .map(|(t, _)| t)
        .unwrap_or(&subscription_arn);
    let topic_name = emu_core::registry::trailing_segment(topic_part);
    let topic = state
        .registry
        .get_topic(topic_name)
        .ok_or_else(|| EngineError::TopicNotFound(topic_name.to_string()))?;
    topic.unsubscribe(&subscription_arn)?;
    Ok(xml::simple_sns_response("Unsubscribe"))
}

fn set_subscription_attributes(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let subscription_arn = params.get_or_invalid("SubscriptionArn")?;
    let attribute_name = params.get_or_invalid("AttributeName")?;
    let attribute_value = params.get_or_invalid("AttributeValue")?;

    if attribute_name != "FilterPolicy" {
        // RawMessageDelivery and other attributes are accepted but only
        // FilterPolicy requires a structural update here; raw is read
        // directly off the Subscriber variant at subscribe time.
        return Ok(xml::simple_sns_response("SetSubscriptionAttributes"));
    }

    let topic_part = subscription_arn
        .rsplit_once(':')
        .map(|(t, _)| t)
        .unwrap_or(&subscription_arn);
    let topic_name = emu_core::registry::trailing_segment(topic_part);
    let topic = state
        .registry
        .get_topic(topic_name)
        .ok_or_else(|| EngineError::TopicNotFound(topic_name.to_string()))?;

    let policy = if attribute_value.trim().is_empty() {
        None
    } else {
        Some(FilterPolicy(
            serde_json::from_str(&attribute_value)
                .map_err(|_| EngineError::InvalidParameterValue("FilterPolicy".to_string()))?,
        ))
    };
    topic.set_filter_policy(&subscription_arn, policy)?;
    Ok(xml::simple_sns_response("SetSubscriptionAttributes"))
}

fn list_subscriptions_by_topic(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let topic_name = resolve_topic_name(params)?;
    let topic = state
        .registry
        .get_topic(&topic_name)
        .ok_or_else(|| EngineError::TopicNotFound(topic_name.clone()))?;
    let rows = topic
        .list_subscriptions()
        .into_iter()
        .map(|s| {
            (
                s.subscription_arn.clone(),
                s.topic_arn.clone(),
                s.subscriber.protocol().to_string(),
            )
        })
        .collect::<Vec<_>>();
    Ok(xml::list_subscriptions_response(&rows))
}

async fn publish(state: &AppState, params: &FormParams) -> Result<String, HttpError> {
    let topic_name = resolve_topic_name(params)?;
    let message = params.get_or_invalid("Message")?;
    let subject = params.get_owned("Subject");
    let attrs = params.message_attributes();

    let structured = if params.get("MessageStructure") == Some("json") {
        Some(
            serde_json::from_str::<HashMap<String, String>>(&message)
                .map_err(|_| EngineError::InvalidParameterValue("Message".to_string()))?,
        )
    } else {
        None
    };

    let outcome = state
        .registry
        .publish(&topic_name, &message, subject.as_deref(), attrs, structured, &base_url(state))
        .await?;

    tracing::debug!(
        topic = %topic_name,
        deliveries = outcome.deliveries.len(),
        "publish fan-out complete"
    );

    Ok(xml::publish_response(&outcome.message_id.to_string()))
}
