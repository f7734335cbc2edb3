//! Chaincode operation names and argument documents.
//!
//! Operations travel as `(name, JSON argument document)` pairs through the
//! ledger client. Caller identity is deliberately absent from every
//! argument type; it is derived from the endorsing certificate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::delivery::{Delivery, DeliveryStatus, Location, PackageDimensions};

/// Operation name constants as dispatched by the contract.
pub mod op_names {
    pub const CREATE_DELIVERY: &str = "CreateDelivery";
    pub const READ_DELIVERY: &str = "ReadDelivery";
    pub const UPDATE_LOCATION: &str = "UpdateLocation";
    pub const INITIATE_HANDOFF: &str = "InitiateHandoff";
    pub const CONFIRM_HANDOFF: &str = "ConfirmHandoff";
    pub const DISPUTE_HANDOFF: &str = "DisputeHandoff";
    pub const CANCEL_HANDOFF: &str = "CancelHandoff";
    pub const CANCEL_DELIVERY: &str = "CancelDelivery";
    pub const QUERY_DELIVERIES_BY_CUSTODIAN: &str = "QueryDeliveriesByCustodian";
    pub const QUERY_DELIVERIES_BY_STATUS: &str = "QueryDeliveriesByStatus";
    pub const GET_DELIVERY_HISTORY: &str = "GetDeliveryHistory";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeliveryArgs {
    pub delivery_id: String,
    pub order_id: String,
    pub customer_id: String,
    pub package_weight: f64,
    pub package_dimensions: PackageDimensions,
    pub last_location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadDeliveryArgs {
    pub delivery_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLocationArgs {
    pub delivery_id: String,
    pub last_location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateHandoffArgs {
    pub delivery_id: String,
    pub to_user_id: String,
    pub to_role: crate::identity::Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmHandoffArgs {
    pub delivery_id: String,
    pub last_location: Location,
    pub package_weight: f64,
    pub package_dimensions: PackageDimensions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeHandoffArgs {
    pub delivery_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelHandoffArgs {
    pub delivery_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelDeliveryArgs {
    pub delivery_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryByCustodianArgs {
    pub custodian_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryByStatusArgs {
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDeliveryHistoryArgs {
    pub delivery_id: String,
}

/// One committed write in a delivery's ledger history, as surfaced by the
/// platform's history iterator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    /// Value at commit; absent for a delete record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Delivery>,
    pub is_delete: bool,
}
