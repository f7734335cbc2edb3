//! Typed chaincode events.
//!
//! Every mutation emits exactly the events listed in the contract; each
//! payload carries a UTC RFC3339 timestamp. The event name travels next to
//! the payload on the ledger event stream, so decoding dispatches on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::delivery::{DeliveryId, DeliveryStatus};
use crate::error::CustodyError;
use crate::identity::Role;

/// Event name constants as emitted by the chaincode.
pub mod event_names {
    pub const DELIVERY_CREATED: &str = "DeliveryCreated";
    pub const DELIVERY_STATUS_CHANGED: &str = "DeliveryStatusChanged";
    pub const HANDOFF_INITIATED: &str = "HandoffInitiated";
    pub const HANDOFF_CONFIRMED: &str = "HandoffConfirmed";
    pub const HANDOFF_DISPUTED: &str = "HandoffDisputed";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryCreated {
    pub delivery_id: DeliveryId,
    pub order_id: String,
    pub new_status: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatusChanged {
    pub delivery_id: DeliveryId,
    pub order_id: String,
    pub old_status: DeliveryStatus,
    pub new_status: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffInitiated {
    pub delivery_id: DeliveryId,
    pub from_user_id: String,
    pub to_user_id: String,
    pub to_role: Role,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffConfirmed {
    pub delivery_id: DeliveryId,
    pub from_user_id: String,
    pub to_user_id: String,
    pub new_custodian_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffDisputed {
    pub delivery_id: DeliveryId,
    pub disputed_by: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// A decoded chaincode event.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryEvent {
    Created(DeliveryCreated),
    StatusChanged(DeliveryStatusChanged),
    HandoffInitiated(HandoffInitiated),
    HandoffConfirmed(HandoffConfirmed),
    HandoffDisputed(HandoffDisputed),
}

impl DeliveryEvent {
    /// The on-ledger event name for this event.
    pub fn name(&self) -> &'static str {
        match self {
            DeliveryEvent::Created(_) => event_names::DELIVERY_CREATED,
            DeliveryEvent::StatusChanged(_) => event_names::DELIVERY_STATUS_CHANGED,
            DeliveryEvent::HandoffInitiated(_) => event_names::HANDOFF_INITIATED,
            DeliveryEvent::HandoffConfirmed(_) => event_names::HANDOFF_CONFIRMED,
            DeliveryEvent::HandoffDisputed(_) => event_names::HANDOFF_DISPUTED,
        }
    }

    /// The delivery this event concerns.
    pub fn delivery_id(&self) -> &DeliveryId {
        match self {
            DeliveryEvent::Created(e) => &e.delivery_id,
            DeliveryEvent::StatusChanged(e) => &e.delivery_id,
            DeliveryEvent::HandoffInitiated(e) => &e.delivery_id,
            DeliveryEvent::HandoffConfirmed(e) => &e.delivery_id,
            DeliveryEvent::HandoffDisputed(e) => &e.delivery_id,
        }
    }

    /// Serialize the payload the way the chaincode publishes it.
    pub fn payload(&self) -> Result<Vec<u8>, CustodyError> {
        let encode = |v: serde_json::Result<Vec<u8>>| {
            v.map_err(|e| CustodyError::internal(format!("event encode: {}", e)))
        };
        match self {
            DeliveryEvent::Created(e) => encode(serde_json::to_vec(e)),
            DeliveryEvent::StatusChanged(e) => encode(serde_json::to_vec(e)),
            DeliveryEvent::HandoffInitiated(e) => encode(serde_json::to_vec(e)),
            DeliveryEvent::HandoffConfirmed(e) => encode(serde_json::to_vec(e)),
            DeliveryEvent::HandoffDisputed(e) => encode(serde_json::to_vec(e)),
        }
    }

    /// Decode an event from its on-ledger name and payload bytes.
    pub fn decode(name: &str, payload: &[u8]) -> Result<Self, CustodyError> {
        let bad = |e: serde_json::Error| {
            CustodyError::internal(format!("event '{}' decode: {}", name, e))
        };
        match name {
            event_names::DELIVERY_CREATED => {
                Ok(DeliveryEvent::Created(serde_json::from_slice(payload).map_err(bad)?))
            }
            event_names::DELIVERY_STATUS_CHANGED => {
                Ok(DeliveryEvent::StatusChanged(serde_json::from_slice(payload).map_err(bad)?))
            }
            event_names::HANDOFF_INITIATED => {
                Ok(DeliveryEvent::HandoffInitiated(serde_json::from_slice(payload).map_err(bad)?))
            }
            event_names::HANDOFF_CONFIRMED => {
                Ok(DeliveryEvent::HandoffConfirmed(serde_json::from_slice(payload).map_err(bad)?))
            }
            event_names::HANDOFF_DISPUTED => {
                Ok(DeliveryEvent::HandoffDisputed(serde_json::from_slice(payload).map_err(bad)?))
            }
            other => Err(CustodyError::internal(format!("unknown event '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_roundtrip_by_name() {
        let event = DeliveryEvent::StatusChanged(DeliveryStatusChanged {
            delivery_id: DeliveryId::parse("DEL-20260101-AAAAAAAA").unwrap(),
            order_id: "order-1".to_string(),
            old_status: DeliveryStatus::PendingPickup,
            new_status: DeliveryStatus::PendingPickupHandoff,
            timestamp: Utc::now(),
        });
        let payload = event.payload().unwrap();
        let decoded = DeliveryEvent::decode(event.name(), &payload).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn payload_uses_camel_case_names() {
        let event = DeliveryEvent::Created(DeliveryCreated {
            delivery_id: DeliveryId::parse("DEL-20260101-AAAAAAAA").unwrap(),
            order_id: "order-1".to_string(),
            new_status: DeliveryStatus::PendingPickup,
            timestamp: Utc::now(),
        });
        let json: serde_json::Value = serde_json::from_slice(&event.payload().unwrap()).unwrap();
        assert!(json.get("deliveryId").is_some());
        assert!(json.get("newStatus").is_some());
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn decode_rejects_unknown_name() {
        assert!(DeliveryEvent::decode("LocationUpdated", b"{}").is_err());
    }
}
