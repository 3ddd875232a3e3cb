use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::id::ProductId;
use crate::product::{ProductFields, ProductStatus};

/// Payload of a product-creation event on the broker.
///
/// Intake publishes one event per accepted product, keyed by the product id.
/// The `status` field is carried for compatibility with older producers; any
/// value is accepted and the verification pipeline ignores it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationEvent {
    pub id: ProductId,
    #[serde(flatten)]
    pub fields: ProductFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl CreationEvent {
    pub fn new(id: ProductId, fields: ProductFields) -> Self {
        Self {
            id,
            fields,
            status: Some(ProductStatus::Pending.to_string()),
        }
    }

    /// Decode a raw event payload.
    ///
    /// Any JSON or validation failure is reported as
    /// [`TypeError::MalformedEvent`]; such events are never retried.
    pub fn decode(payload: &[u8]) -> Result<Self, TypeError> {
        serde_json::from_slice(payload).map_err(|e| TypeError::MalformedEvent(e.to_string()))
    }

    /// Encode the event as the JSON wire payload.
    pub fn encode(&self) -> Result<Vec<u8>, TypeError> {
        serde_json::to_vec(self).map_err(|e| TypeError::MalformedEvent(e.to_string()))
    }

    /// The partition key: all events for one product share it.
    pub fn key(&self) -> &[u8] {
        self.id.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_camel_case_payload() {
        let payload = br#"{"id":"P1","name":"Coffee","producerId":"F1","manufactureDate":"2024-01-01","integrityHash":"h1","status":"PENDING"}"#;
        let event = CreationEvent::decode(payload).unwrap();
        assert_eq!(event.id.as_str(), "P1");
        assert_eq!(event.fields.integrity_hash, "h1");
    }

    #[test]
    fn decodes_legacy_snake_case_payload_with_cert_hash() {
        let payload = br#"{"id":"P2","name":"Tea","producer_id":"F2","manufacture_date":"2024-02-02","cert_hash":"h2","status":"PENDING"}"#;
        let event = CreationEvent::decode(payload).unwrap();
        assert_eq!(event.fields.producer_id, "F2");
        assert_eq!(event.fields.integrity_hash, "h2");
    }

    #[test]
    fn status_is_optional_and_free_form() {
        let payload = br#"{"id":"P3","name":"n","producerId":"p","manufactureDate":"d","integrityHash":"h"}"#;
        let event = CreationEvent::decode(payload).unwrap();
        assert!(event.status.is_none());

        let legacy = br#"{"id":"P3","name":"n","producerId":"p","manufactureDate":"d","integrityHash":"h","status":"CREATED"}"#;
        assert!(CreationEvent::decode(legacy).is_ok());
    }

    #[test]
    fn rejects_garbage_and_blank_ids() {
        assert!(matches!(
            CreationEvent::decode(b"not json"),
            Err(TypeError::MalformedEvent(_))
        ));
        let blank = br#"{"id":"","name":"n","producerId":"p","manufactureDate":"d","integrityHash":"h"}"#;
        assert!(CreationEvent::decode(blank).is_err());
        let missing = br#"{"id":"P4","name":"n"}"#;
        assert!(CreationEvent::decode(missing).is_err());
    }

    #[test]
    fn encode_then_decode_preserves_event() {
        let event = CreationEvent::new(
            ProductId::new("P5").unwrap(),
            ProductFields::new("n", "p", "d", "h"),
        );
        let bytes = event.encode().unwrap();
        assert_eq!(CreationEvent::decode(&bytes).unwrap(), event);
        assert_eq!(event.key(), b"P5");
    }
}
