//! XML response marshaling matching the documented cloud-service schema.
//!
//! Grounded in `other_examples/appwiz-amazon-sqs-local`'s `quick-xml`
//! usage for the same purpose; response bodies here are hand-templated
//! rather than derived, since the action set's response shapes vary too
//! much to share one `#[derive(Serialize)]` struct, but every user-supplied
//! string is escaped through `escape` before interpolation.

use emu_core::engine::queue::ReceivedMessage;
use emu_core::model::Message;

const SQS_NS: &str = "http://queue.amazonaws.com/doc/2012-11-05/";
const SNS_NS: &str = "http://sns.amazonaws.com/doc/2010-03-31/";

pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn create_queue_response(queue_url: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<CreateQueueResponse xmlns="{SQS_NS}">
  <CreateQueueResult>
    <QueueUrl>{}</QueueUrl>
  </CreateQueueResult>
  <ResponseMetadata><RequestId>{}</RequestId></ResponseMetadata>
</CreateQueueResponse>"#,
        escape(queue_url),
        request_id()
    )
}

pub fn get_queue_url_response(queue_url: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<GetQueueUrlResponse xmlns="{SQS_NS}">
  <GetQueueUrlResult>
    <QueueUrl>{}</QueueUrl>
  </GetQueueUrlResult>
  <ResponseMetadata><RequestId>{}</RequestId></ResponseMetadata>
</GetQueueUrlResponse>"#,
        escape(queue_url),
        request_id()
    )
}

pub fn simple_response(action: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<{action}Response xmlns="{SQS_NS}">
  <ResponseMetadata><RequestId>{}</RequestId></ResponseMetadata>
</{action}Response>"#,
        request_id()
    )
}

pub fn list_queues_response(urls: &[String]) -> String {
    let entries: String = urls
        .iter()
        .map(|u| format!("    <QueueUrl>{}</QueueUrl>\n", escape(u)))
        .collect();
    format!(
        r#"<?xml version="1.0"?>
<ListQueuesResponse xmlns="{SQS_NS}">
  <ListQueuesResult>
{entries}  </ListQueuesResult>
  <ResponseMetadata><RequestId>{}</RequestId></ResponseMetadata>
</ListQueuesResponse>"#,
        request_id()
    )
}

pub fn send_message_response(message_id: &str, md5_of_body: &str, md5_of_attributes: Option<&str>) -> String {
    let attrs_line = md5_of_attributes
        .map(|m| format!("    <MD5OfMessageAttributes>{m}</MD5OfMessageAttributes>\n"))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0"?>
<SendMessageResponse xmlns="{SQS_NS}">
  <SendMessageResult>
    <MessageId>{message_id}</MessageId>
    <MD5OfMessageBody>{md5_of_body}</MD5OfMessageBody>
{attrs_line}  </SendMessageResult>
  <ResponseMetadata><RequestId>{}</RequestId></ResponseMetadata>
</SendMessageResponse>"#,
        request_id()
    )
}

fn message_attributes_xml(message: &Message) -> String {
    message
        .message_attributes
        .iter()
        .map(|(name, value)| {
            let value_xml = match (&value.string_value, &value.binary_value) {
                (Some(s), _) => format!("<StringValue>{}</StringValue>", escape(s)),
                (None, Some(b)) => {
                    use base64::{engine::general_purpose::STANDARD, Engine};
                    format!("<BinaryValue>{}</BinaryValue>", STANDARD.encode(b))
                }
                (None, None) => String::new(),
            };
            format!(
                "      <MessageAttribute><Name>{}</Name><Value><DataType>{}</DataType>{value_xml}</Value></MessageAttribute>\n",
                escape(name),
                escape(&value.data_type)
            )
        })
        .collect()
}

pub fn receive_message_response(received: &[ReceivedMessage]) -> String {
    let entries: String = received
        .iter()
        .map(|r| {
            let m = &r.message;
            format!(
                r#"    <Message>
      <MessageId>{}</MessageId>
      <ReceiptHandle>{}</ReceiptHandle>
      <MD5OfBody>{}</MD5OfBody>
      <Body>{}</Body>
{}    </Message>
"#,
                m.uuid,
                m.receipt_handle.as_deref().unwrap_or_default(),
                m.md5_of_body,
                escape(&m.body_as_str()),
                message_attributes_xml(m)
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?>
<ReceiveMessageResponse xmlns="{SQS_NS}">
  <ReceiveMessageResult>
{entries}  </ReceiveMessageResult>
  <ResponseMetadata><RequestId>{}</RequestId></ResponseMetadata>
</ReceiveMessageResponse>"#,
        request_id()
    )
}

pub struct BatchEntryResult {
    pub id: String,
    pub message_id: String,
    pub md5_of_body: String,
}

pub struct BatchEntryFailure {
    pub id: String,
    pub code: String,
    pub message: String,
}

pub fn send_message_batch_response(
    successes: &[BatchEntryResult],
    failures: &[BatchEntryFailure],
) -> String {
    let success_entries: String = successes
        .iter()
        .map(|e| {
            format!(
                "    <SendMessageBatchResultEntry><Id>{}</Id><MessageId>{}</MessageId><MD5OfMessageBody>{}</MD5OfMessageBody></SendMessageBatchResultEntry>\n",
                escape(&e.id), e.message_id, e.md5_of_body
            )
        })
        .collect();
    let failure_entries: String = failures
        .iter()
        .map(|e| {
            format!(
                "    <BatchResultErrorEntry><Id>{}</Id><Code>{}</Code><Message>{}</Message><SenderFault>true</SenderFault></BatchResultErrorEntry>\n",
                escape(&e.id), escape(&e.code), escape(&e.message)
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?>
<SendMessageBatchResponse xmlns="{SQS_NS}">
  <SendMessageBatchResult>
{success_entries}{failure_entries}  </SendMessageBatchResult>
  <ResponseMetadata><RequestId>{}</RequestId></ResponseMetadata>
</SendMessageBatchResponse>"#,
        request_id()
    )
}

pub fn get_queue_attributes_response(attrs: &[(String, String)]) -> String {
    let entries: String = attrs
        .iter()
        .map(|(k, v)| format!("    <Attribute><Name>{}</Name><Value>{}</Value></Attribute>\n", k, escape(v)))
        .collect();
    format!(
        r#"<?xml version="1.0"?>
<GetQueueAttributesResponse xmlns="{SQS_NS}">
  <GetQueueAttributesResult>
{entries}  </GetQueueAttributesResult>
  <ResponseMetadata><RequestId>{}</RequestId></ResponseMetadata>
</GetQueueAttributesResponse>"#,
        request_id()
    )
}

pub fn create_topic_response(topic_arn: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<CreateTopicResponse xmlns="{SNS_NS}">
  <CreateTopicResult>
    <TopicArn>{}</TopicArn>
  </CreateTopicResult>
  <ResponseMetadata><RequestId>{}</RequestId></ResponseMetadata>
</CreateTopicResponse>"#,
        escape(topic_arn),
        request_id()
    )
}

pub fn list_topics_response(arns: &[String]) -> String {
    let entries: String = arns
        .iter()
        .map(|a| format!("      <member><TopicArn>{}</TopicArn></member>\n", escape(a)))
        .collect();
    format!(
        r#"<?xml version="1.0"?>
<ListTopicsResponse xmlns="{SNS_NS}">
  <ListTopicsResult>
    <Topics>
{entries}    </Topics>
  </ListTopicsResult>
  <ResponseMetadata><RequestId>{}</RequestId></ResponseMetadata>
</ListTopicsResponse>"#,
        request_id()
    )
}

pub fn simple_sns_response(action: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<{action}Response xmlns="{SNS_NS}">
  <ResponseMetadata><RequestId>{}</RequestId></ResponseMetadata>
</{action}Response>"#,
        request_id()
    )
}

pub fn subscribe_response(subscription_arn: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<SubscribeResponse xmlns="{SNS_NS}">
  <SubscribeResult>
    <SubscriptionArn>{}</SubscriptionArn>
  </SubscribeResult>
  <ResponseMetadata><RequestId>{}</RequestId></ResponseMetadata>
</SubscribeResponse>"#,
        escape(subscription_arn),
        request_id()
    )
}

pub fn list_subscriptions_response(arns: &[(String, String, String)]) -> String {
    let entries: String = arns
        .iter()
        .map(|(arn, topic_arn, protocol)| {
            format!(
                "      <member><SubscriptionArn>{}</SubscriptionArn><TopicArn>{}</TopicArn><Protocol>{}</Protocol></member>\n",
                escape(arn),
                escape(topic_arn),
                escape(protocol)
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?>
<ListSubscriptionsByTopicResponse xmlns="{SNS_NS}">
  <ListSubscriptionsByTopicResult>
    <Subscriptions>
{entries}    </Subscriptions>
  </ListSubscriptionsByTopicResult>
  <ResponseMetadata><RequestId>{}</RequestId></ResponseMetadata>
</ListSubscriptionsByTopicResponse>"#,
        request_id()
    )
}

pub fn publish_response(message_id: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<PublishResponse xmlns="{SNS_NS}">
  <PublishResult>
    <MessageId>{message_id}</MessageId>
  </PublishResult>
  <ResponseMetadata><RequestId>{}</RequestId></ResponseMetadata>
</PublishResponse>"#,
        request_id()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_body_text() {
        assert_eq!(escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[test]
    fn send_message_response_contains_message_id() {
        let xml = send_message_response("abc-123", "d41d8cd98f00b204e9800998ecf8427e", None);
        assert!(xml.contains("<MessageId>abc-123</MessageId>"));
    }
}
