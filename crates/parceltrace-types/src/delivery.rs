//! The on-ledger delivery record and its supporting value types.
//!
//! A `Delivery` is the sole persisted entity on the ledger, keyed by its
//! `DeliveryId`. The chaincode serializes it as a camelCase JSON document
//! with the stable field names below; field order is never significant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CustodyError;
use crate::identity::Role;

/// Maximum package weight in kilograms.
pub const MAX_PACKAGE_WEIGHT_KG: f64 = 1000.0;
/// Maximum single package dimension in centimeters.
pub const MAX_PACKAGE_DIMENSION_CM: f64 = 500.0;
/// Maximum length of a location field.
pub const MAX_LOCATION_FIELD_LEN: usize = 100;
/// Maximum length of a dispute reason.
pub const MAX_DISPUTE_REASON_LEN: usize = 1000;

/// Delivery primary key: `DEL-YYYYMMDD-XXXXXXXX` (8 hex chars).
///
/// Lowercase hex is tolerated on input and canonicalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(String);

impl DeliveryId {
    /// Parse and canonicalize a delivery id.
    pub fn parse(s: &str) -> Result<Self, CustodyError> {
        let canonical = s.to_ascii_uppercase();
        let bytes = canonical.as_bytes();
        let well_formed = bytes.len() == 21
            && canonical.starts_with("DEL-")
            && bytes[12] == b'-'
            && bytes[4..12].iter().all(|b| b.is_ascii_digit())
            && bytes[13..21].iter().all(|b| b.is_ascii_hexdigit());
        if !well_formed {
            return Err(CustodyError::invalid_argument(
                "deliveryId",
                format!("'{}' does not match DEL-YYYYMMDD-XXXXXXXX", s),
            ));
        }
        Ok(Self(canonical))
    }

    /// Mint a new id from a date stamp and an 8-hex-char suffix.
    pub fn mint(date: &DateTime<Utc>, suffix: u32) -> Self {
        Self(format!("DEL-{}-{:08X}", date.format("%Y%m%d"), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Package dimensions in centimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl PackageDimensions {
    pub fn validate(&self) -> Result<(), CustodyError> {
        for (name, value) in [
            ("length", self.length),
            ("width", self.width),
            ("height", self.height),
        ] {
            if !value.is_finite() || value <= 0.0 || value > MAX_PACKAGE_DIMENSION_CM {
                return Err(CustodyError::invalid_argument(
                    format!("packageDimensions.{}", name),
                    format!("must be > 0 and <= {} cm", MAX_PACKAGE_DIMENSION_CM),
                ));
            }
        }
        Ok(())
    }
}

/// Validate a package weight in kilograms.
pub fn validate_weight(weight: f64) -> Result<(), CustodyError> {
    if !weight.is_finite() || weight <= 0.0 || weight > MAX_PACKAGE_WEIGHT_KG {
        return Err(CustodyError::invalid_argument(
            "packageWeight",
            format!("must be > 0 and <= {} kg", MAX_PACKAGE_WEIGHT_KG),
        ));
    }
    Ok(())
}

/// A coarse location report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub city: String,
    pub state: String,
    pub country: String,
}

impl Location {
    pub fn validate(&self) -> Result<(), CustodyError> {
        for (name, value) in [
            ("city", &self.city),
            ("state", &self.state),
            ("country", &self.country),
        ] {
            if value.trim().is_empty() || value.len() > MAX_LOCATION_FIELD_LEN {
                return Err(CustodyError::invalid_argument(
                    format!("lastLocation.{}", name),
                    format!("must be non-empty and <= {} chars", MAX_LOCATION_FIELD_LEN),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.city, self.state, self.country)
    }
}

/// Lifecycle status of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    PendingPickup,
    PendingPickupHandoff,
    InTransit,
    PendingTransitHandoff,
    PendingDeliveryConfirmation,
    ConfirmedDelivery,
    Cancelled,
    DisputedPickup,
    DisputedTransitHandoff,
    DisputedDelivery,
}

impl DeliveryStatus {
    /// Statuses in which a handoff is awaiting the target's decision.
    pub fn is_pending_handoff(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::PendingPickupHandoff
                | DeliveryStatus::PendingTransitHandoff
                | DeliveryStatus::PendingDeliveryConfirmation
        )
    }

    /// Terminal statuses are read-only for any further mutation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::ConfirmedDelivery
                | DeliveryStatus::Cancelled
                | DeliveryStatus::DisputedPickup
                | DeliveryStatus::DisputedTransitHandoff
                | DeliveryStatus::DisputedDelivery
        )
    }

    /// The disputed status a dispute from this pending phase lands in.
    pub fn disputed_counterpart(&self) -> Option<DeliveryStatus> {
        match self {
            DeliveryStatus::PendingPickupHandoff => Some(DeliveryStatus::DisputedPickup),
            DeliveryStatus::PendingTransitHandoff => Some(DeliveryStatus::DisputedTransitHandoff),
            DeliveryStatus::PendingDeliveryConfirmation => Some(DeliveryStatus::DisputedDelivery),
            _ => None,
        }
    }

    /// The status a cancelled handoff from this pending phase reverts to.
    pub fn cancel_reversion(&self) -> Option<DeliveryStatus> {
        match self {
            DeliveryStatus::PendingPickupHandoff => Some(DeliveryStatus::PendingPickup),
            DeliveryStatus::PendingTransitHandoff | DeliveryStatus::PendingDeliveryConfirmation => {
                Some(DeliveryStatus::InTransit)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::PendingPickup => "PENDING_PICKUP",
            DeliveryStatus::PendingPickupHandoff => "PENDING_PICKUP_HANDOFF",
            DeliveryStatus::InTransit => "IN_TRANSIT",
            DeliveryStatus::PendingTransitHandoff => "PENDING_TRANSIT_HANDOFF",
            DeliveryStatus::PendingDeliveryConfirmation => "PENDING_DELIVERY_CONFIRMATION",
            DeliveryStatus::ConfirmedDelivery => "CONFIRMED_DELIVERY",
            DeliveryStatus::Cancelled => "CANCELLED",
            DeliveryStatus::DisputedPickup => "DISPUTED_PICKUP",
            DeliveryStatus::DisputedTransitHandoff => "DISPUTED_TRANSIT_HANDOFF",
            DeliveryStatus::DisputedDelivery => "DISPUTED_DELIVERY",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CustodyError> {
        serde_json::from_value(serde_json::Value::String(s.to_string())).map_err(|_| {
            CustodyError::invalid_argument("deliveryStatus", format!("unknown status '{}'", s))
        })
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An in-flight two-phase custody transfer.
///
/// Only the initiator may cancel; only the target may confirm or dispute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingHandoff {
    pub from_user_id: String,
    pub from_role: Role,
    pub to_user_id: String,
    pub to_role: Role,
    pub initiated_at: DateTime<Utc>,
}

/// The tracked parcel as represented on the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub delivery_id: DeliveryId,
    pub order_id: String,
    pub seller_id: String,
    pub customer_id: String,
    pub package_weight: f64,
    pub package_dimensions: PackageDimensions,
    pub delivery_status: DeliveryStatus,
    pub last_location: Location,
    pub current_custodian_id: String,
    pub current_custodian_role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_handoff: Option<PendingHandoff>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    /// Everyone with a stake in this delivery: seller, customer, custodian,
    /// and both parties of a pending handoff.
    pub fn parties(&self) -> Vec<&str> {
        let mut parties = vec![
            self.seller_id.as_str(),
            self.customer_id.as_str(),
            self.current_custodian_id.as_str(),
        ];
        if let Some(handoff) = &self.pending_handoff {
            parties.push(handoff.from_user_id.as_str());
            parties.push(handoff.to_user_id.as_str());
        }
        parties.sort_unstable();
        parties.dedup();
        parties
    }

    /// Whether the given user is a party to this delivery.
    pub fn is_party(&self, user_id: &str) -> bool {
        self.seller_id == user_id
            || self.customer_id == user_id
            || self.current_custodian_id == user_id
            || self
                .pending_handoff
                .as_ref()
                .map(|h| h.from_user_id == user_id || h.to_user_id == user_id)
                .unwrap_or(false)
    }
}
