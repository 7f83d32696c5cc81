//! Decoding of `application/x-www-form-urlencoded` request bodies.
//!
//! Grounded in `other_examples/appwiz-amazon-sqs-local`'s use of
//! `form_urlencoded` for the same indexed-attribute convention spec.md §6
//! describes: `Attribute.<N>.Name` / `Attribute.<N>.Value` for plain queue
//! attributes, and `MessageAttribute.<N>.Name` /
//! `MessageAttribute.<N>.Value.StringValue` /
//! `MessageAttribute.<N>.Value.DataType` for per-message attributes.

use std::collections::HashMap;

use emu_core::model::MessageAttributeValue;

/// A decoded form body: every field as a flat string map, plus the raw
/// `Action` field pulled out for dispatch.
#[derive(Debug, Clone, Default)]
pub struct FormParams(pub HashMap<String, String>);

impl FormParams {
    pub fn from_body(body: &str) -> Self {
        let map = form_urlencoded::parse(body.as_bytes())
            .into_owned()
            .collect::<HashMap<String, String>>();
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn get_owned(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }

    pub fn get_or_invalid(&self, key: &str) -> emu_core::Result<String> {
        self.get_owned(key)
            .ok_or_else(|| emu_core::EngineError::InvalidParameterValue(key.to_string()))
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some("true") | Some("True") | Some("1"))
    }

    /// Plain `Attribute.<N>.Name` / `Attribute.<N>.Value` pairs, as used by
    /// `SetQueueAttributes` and config-style attribute lists.
    pub fn indexed_attributes(&self, prefix: &str) -> HashMap<String, String> {
        let mut out = HashMap::new();
        let mut n = 1;
        loop {
            let name_key = format!("{prefix}.{n}.Name");
            let value_key = format!("{prefix}.{n}.Value");
            match (self.get(&name_key), self.get(&value_key)) {
                (Some(name), Some(value)) => {
                    out.insert(name.to_string(), value.to_string());
                    n += 1;
                }
                _ => break,
            }
        }
        out
    }

    /// `MessageAttribute.<N>.Name` / `.Value.StringValue` /
    /// `.Value.BinaryValue` (base64) / `.Value.DataType`.
    pub fn message_attributes(&self) -> HashMap<String, MessageAttributeValue> {
        let mut out = HashMap::new();
        let mut n = 1;
        loop {
            let name_key = format!("MessageAttribute.{n}.Name");
            let Some(name) = self.get(&name_key) else {
                break;
            };
            let data_type = self
                .get(&format!("MessageAttribute.{n}.Value.DataType"))
                .unwrap_or("String")
                .to_string();
            let string_value = self
                .get_owned(&format!("MessageAttribute.{n}.Value.StringValue"));
            let binary_value = self
                .get(&format!("MessageAttribute.{n}.Value.BinaryValue"))
                .and_then(|b64| {
                    use base64::{engine::general_purpose::STANDARD, Engine};
                    STANDARD.decode(b64).ok()
                });
            out.insert(
                name.to_string(),
                MessageAttributeValue {
                    data_type,
                    string_value,
                    binary_value,
                },
            );
            n += 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_indexed_attributes() {
        let body = "Attribute.1.Name=VisibilityTimeout&Attribute.1.Value=45&Attribute.2.Name=DelaySeconds&Attribute.2.Value=5";
        let params = FormParams::from_body(body);
        let attrs = params.indexed_attributes("Attribute");
        assert_eq!(attrs.get("VisibilityTimeout").map(String::as_str), Some("45"));
        assert_eq!(attrs.get("DelaySeconds").map(String::as_str), Some("5"));
    }

    #[test]
    fn decodes_message_attributes() {
        let body = "MessageAttribute.1.Name=color&MessageAttribute.1.Value.StringValue=red&MessageAttribute.1.Value.DataType=String";
        let params = FormParams::from_body(body);
        let attrs = params.message_attributes();
        assert_eq!(
            attrs.get("color").and_then(|v| v.string_value.clone()),
            Some("red".to_string())
        );
    }
}
