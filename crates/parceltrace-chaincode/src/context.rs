//! Transaction context - the contract's window onto the endorsement
//! environment.
//!
//! The platform hands the contract a verified caller identity, a
//! deterministic transaction clock, and a staged view of world state.
//! Everything the contract writes goes into the staging overlay; the
//! platform commits it atomically after the operation returns Ok.

use chrono::{DateTime, Utc};
use parceltrace_types::{
    CertAttributes, CustodyError, Delivery, DeliveryEvent, DeliveryId, Result, Role,
};

/// The endorsing client, as derived from its certificate.
///
/// `attributes` is `None` when the certificate carries no custody
/// attributes (for example a pure service identity); every operation
/// rejects such callers with `NOT_AUTHORIZED`.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub msp_id: String,
    pub enrollment_id: String,
    pub attributes: Option<CertAttributes>,
}

impl ClientIdentity {
    /// The caller's custody identity, or `NOT_AUTHORIZED` if the
    /// certificate does not embed one.
    pub fn require_attributes(&self) -> Result<&CertAttributes> {
        self.attributes.as_ref().ok_or_else(|| {
            CustodyError::not_authorized("certificate carries no userId/role attributes")
        })
    }
}

/// One committed value in a key's history, as the platform stores it.
#[derive(Debug, Clone)]
pub struct RawHistoryRecord {
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: Option<Vec<u8>>,
    pub is_delete: bool,
}

/// Staged world-state access provided by the platform.
///
/// `get` reads through the staging overlay; `put` stages a write. The
/// contract never observes a partially-committed state.
pub trait StateStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()>;
    /// All live `(key, value)` pairs, staging overlay included.
    fn scan(&self) -> Result<Vec<(String, Vec<u8>)>>;
    /// The committed history of a key, oldest first.
    fn history(&self, key: &str) -> Result<Vec<RawHistoryRecord>>;
}

/// Per-transaction context threaded through every contract operation.
pub struct TransactionContext<'a> {
    identity: ClientIdentity,
    timestamp: DateTime<Utc>,
    store: &'a mut dyn StateStore,
    events: Vec<(String, Vec<u8>)>,
}

impl<'a> TransactionContext<'a> {
    pub fn new(
        identity: ClientIdentity,
        timestamp: DateTime<Utc>,
        store: &'a mut dyn StateStore,
    ) -> Self {
        Self { identity, timestamp, store, events: Vec::new() }
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// The deterministic transaction timestamp assigned by the platform.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Caller userId and role from the certificate.
    pub fn caller(&self) -> Result<(&str, Role)> {
        let attrs = self.identity.require_attributes()?;
        Ok((attrs.user_id.as_str(), attrs.role))
    }

    pub fn get_delivery(&self, id: &DeliveryId) -> Result<Option<Delivery>> {
        match self.store.get(id.as_str())? {
            Some(bytes) => {
                let delivery = serde_json::from_slice(&bytes).map_err(|e| {
                    CustodyError::internal(format!("corrupt delivery document {}: {}", id, e))
                })?;
                Ok(Some(delivery))
            }
            None => Ok(None),
        }
    }

    /// Load a delivery or fail with `NOT_FOUND`.
    pub fn require_delivery(&self, id: &DeliveryId) -> Result<Delivery> {
        self.get_delivery(id)?
            .ok_or_else(|| CustodyError::not_found("Delivery", id.as_str()))
    }

    pub fn put_delivery(&mut self, delivery: &Delivery) -> Result<()> {
        let bytes = serde_json::to_vec(delivery)
            .map_err(|e| CustodyError::internal(format!("delivery encode: {}", e)))?;
        self.store.put(delivery.delivery_id.as_str(), bytes)
    }

    /// All deliveries currently in world state.
    pub fn scan_deliveries(&self) -> Result<Vec<Delivery>> {
        let mut deliveries = Vec::new();
        for (key, bytes) in self.store.scan()? {
            let delivery: Delivery = serde_json::from_slice(&bytes).map_err(|e| {
                CustodyError::internal(format!("corrupt delivery document {}: {}", key, e))
            })?;
            deliveries.push(delivery);
        }
        Ok(deliveries)
    }

    pub fn history(&self, id: &DeliveryId) -> Result<Vec<RawHistoryRecord>> {
        self.store.history(id.as_str())
    }

    /// Queue a typed event for emission at commit.
    pub fn emit(&mut self, event: DeliveryEvent) -> Result<()> {
        let payload = event.payload()?;
        self.events.push((event.name().to_string(), payload));
        Ok(())
    }

    /// Events emitted by the operation, in emission order.
    pub fn into_events(self) -> Vec<(String, Vec<u8>)> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_without_attributes_is_rejected() {
        let identity = ClientIdentity {
            msp_id: "PlatformOrgMSP".to_string(),
            enrollment_id: "svc".to_string(),
            attributes: None,
        };
        let err = identity.require_attributes().unwrap_err();
        assert_eq!(err.error_code(), "NOT_AUTHORIZED");
    }
}
