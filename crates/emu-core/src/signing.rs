//! SNS message envelopes and their signatures.
//!
//! Grounded in `original_source/app/gosns/publish.go`'s `publishHTTP`
//! (envelope field order: Type, MessageId, TopicArn, Subject, Message,
//! Timestamp, SignatureVersion, Signature, SigningCertURL,
//! UnsubscribeURL) and `signMessage`'s canonical `field\nvalue\n...`
//! string signed with the service's RSA private key. The keypair and
//! self-signed certificate are generated once per process and cached,
//! mirroring how a real SNS endpoint serves a stable `SigningCertURL`.

use std::collections::HashMap;
use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;
use serde::Serialize;
use sha1::Sha1;
use uuid::Uuid;

use crate::model::MessageAttributeValue;

struct SigningMaterial {
    private_key: RsaPrivateKey,
    cert_pem: String,
}

static SIGNING_MATERIAL: OnceLock<SigningMaterial> = OnceLock::new();

fn material() -> &'static SigningMaterial {
    SIGNING_MATERIAL.get_or_init(|| {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("RSA key generation");

        let certified_key = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .expect("self-signed cert generation");
        let cert_pem = certified_key.cert.pem();

        SigningMaterial {
            private_key,
            cert_pem,
        }
    })
}

/// PEM text served at the envelope's `SigningCertURL`.
pub fn signing_cert_pem() -> &'static str {
    &material().cert_pem
}

/// Path the PEM is served at, relative to the configured host/port. Shared
/// by the envelope builders below and the server's GET route for it.
pub const SIGNING_CERT_PATH: &str = "/SimpleNotificationService.pem";

/// An entry of the envelope's `MessageAttributes` map, mirroring the shape
/// a real SNS notification carries: `{Type, Value}` per attribute name.
#[derive(Serialize)]
struct SnsMessageAttributeValue {
    #[serde(rename = "Type")]
    attr_type: String,
    #[serde(rename = "Value")]
    value: String,
}

fn to_sns_attrs(attrs: &HashMap<String, MessageAttributeValue>) -> HashMap<String, SnsMessageAttributeValue> {
    attrs
        .iter()
        .map(|(name, value)| {
            (
                name.clone(),
                SnsMessageAttributeValue {
                    attr_type: value.data_type.clone(),
                    value: value.as_comparable_str().unwrap_or_default(),
                },
            )
        })
        .collect()
}

#[derive(Serialize)]
struct SnsEnvelope {
    #[serde(rename = "Type")]
    type_: &'static str,
    #[serde(rename = "MessageId")]
    message_id: String,
    #[serde(rename = "TopicArn")]
    topic_arn: String,
    #[serde(skip_serializing_if = "Option::is_none", rename = "Subject")]
    subject: Option<String>,
    #[serde(rename = "Message")]
    message: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "SignatureVersion")]
    signature_version: &'static str,
    #[serde(rename = "Signature")]
    signature: String,
    #[serde(rename = "SigningCertURL")]
    signing_cert_url: String,
    #[serde(rename = "UnsubscribeURL")]
    unsubscribe_url: String,
    #[serde(rename = "MessageAttributes")]
    message_attributes: HashMap<String, SnsMessageAttributeValue>,
}

/// The canonical `field\nvalue\n...` string SNS signs over, in the fixed
/// field order the protocol defines (Message, MessageId, Subject?,
/// Timestamp, TopicArn, Type).
fn canonical_string(
    type_: &str,
    message_id: &str,
    topic_arn: &str,
    subject: Option<&str>,
    message: &str,
    timestamp: &str,
) -> String {
    let mut s = String::new();
    s.push_str("Message\n");
    s.push_str(message);
    s.push('\n');
    s.push_str("MessageId\n");
    s.push_str(message_id);
    s.push('\n');
    if let Some(subject) = subject {
        s.push_str("Subject\n");
        s.push_str(subject);
        s.push('\n');
    }
    s.push_str("Timestamp\n");
    s.push_str(timestamp);
    s.push('\n');
    s.push_str("TopicArn\n");
    s.push_str(topic_arn);
    s.push('\n');
    s.push_str("Type\n");
    s.push_str(type_);
    s.push('\n');
    s
}

fn sign(canonical: &str) -> String {
    let mat = material();
    let signing_key = SigningKey::<Sha1>::new(mat.private_key.clone());
    let mut rng = rand::thread_rng();
    let signature = signing_key.sign_with_rng(&mut rng, canonical.as_bytes());
    STANDARD.encode(signature.to_bytes())
}

/// Builds the JSON notification body for a raw-delivery-disabled HTTP/HTTPS
/// subscriber, with a valid `Signature` over the canonical string.
///
/// `base_url` is the server's own externally-reachable `http(s)://host:port`,
/// used to build `SigningCertURL`/`UnsubscribeURL` so they point somewhere
/// the recipient can actually fetch (spec.md §4.5).
pub fn signed_envelope_json(
    topic_arn: &str,
    message_id: Uuid,
    message: &str,
    subject: Option<&str>,
    attrs: &HashMap<String, MessageAttributeValue>,
    base_url: &str,
) -> String {
    let timestamp = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    let message_id = message_id.to_string();
    let canonical = canonical_string(
        "Notification",
        &message_id,
        topic_arn,
        subject,
        message,
        &timestamp,
    );
    let signature = sign(&canonical);

    let envelope = SnsEnvelope {
        type_: "Notification",
        message_id,
        topic_arn: topic_arn.to_string(),
        subject: subject.map(str::to_string),
        message: message.to_string(),
        timestamp,
        signature_version: "1",
        signature,
        signing_cert_url: format!("{base_url}{SIGNING_CERT_PATH}"),
        unsubscribe_url: format!("{base_url}/?Action=Unsubscribe&TopicArn={topic_arn}"),
        message_attributes: to_sns_attrs(attrs),
    };
    serde_json::to_string(&envelope).expect("envelope serialization")
}

/// The un-signed counterpart used for SQS-protocol, non-raw delivery
/// (SQS subscribers don't verify the signature, but the envelope shape is
/// unchanged so downstream consumers written against raw SNS-over-SQS
/// still parse it).
pub fn envelope_json(
    topic_arn: &str,
    message_id: Uuid,
    message: &str,
    subject: Option<&str>,
    attrs: &HashMap<String, MessageAttributeValue>,
    base_url: &str,
) -> String {
    signed_envelope_json(topic_arn, message_id, message, subject, attrs, base_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_json() {
        let mut attrs = HashMap::new();
        attrs.insert("kind".to_string(), MessageAttributeValue::string("String", "order"));

        let json = signed_envelope_json(
            "arn:aws:sns:local:000000000000:t",
            Uuid::new_v4(),
            "hello",
            Some("subj"),
            &attrs,
            "http://localhost:4100",
        );
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["Type"], "Notification");
        assert_eq!(value["Message"], "hello");
        assert_eq!(value["Subject"], "subj");
        assert!(value["Signature"].as_str().unwrap().len() > 0);
        assert_eq!(value["SigningCertURL"], "http://localhost:4100/SimpleNotificationService.pem");
        assert_eq!(value["MessageAttributes"]["kind"]["Type"], "String");
        assert_eq!(value["MessageAttributes"]["kind"]["Value"], "order");
    }

    #[test]
    fn signing_cert_is_stable_across_calls() {
        assert_eq!(signing_cert_pem(), signing_cert_pem());
    }
}
