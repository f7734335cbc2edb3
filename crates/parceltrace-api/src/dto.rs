//! Request/response DTOs and the success envelope.

use serde::{Deserialize, Serialize};

use parceltrace_types::Role;

/// The success envelope: `{success, data?, message?, count?}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), message: None, count: None }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self { success: true, data: Some(data), message: Some(message.into()), count: None }
    }

    pub fn list(data: T, count: usize) -> Self {
        Self { success: true, data: Some(data), message: None, count: Some(count) }
    }
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub full_name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub vehicle_info: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub organization: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub expires_at: i64,
    pub user_id: String,
    pub role: Role,
}

// ============================================================================
// Shop items
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShopItemRequest {
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub quantity_available: u32,
}

// ============================================================================
// Orders
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    pub item_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub seller_id: String,
    pub items: Vec<OrderLineRequest>,
}

/// Seller confirmation: package metrics and the origin location trigger
/// delivery creation on the ledger.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmOrderRequest {
    pub package_weight: f64,
    pub package_length: f64,
    pub package_width: f64,
    pub package_height: f64,
    pub city: String,
    pub state: String,
    pub country: String,
}

// ============================================================================
// Deliveries & handoffs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLocationRequest {
    pub city: String,
    pub state: String,
    pub country: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateHandoffRequest {
    pub to_user_id: String,
    pub to_role: Role,
}

/// Package fields are optional; absent values fall back to the delivery's
/// current metrics.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmHandoffRequest {
    pub city: String,
    pub state: String,
    pub country: String,
    #[serde(default)]
    pub package_weight: Option<f64>,
    #[serde(default)]
    pub package_length: Option<f64>,
    #[serde(default)]
    pub package_width: Option<f64>,
    #[serde(default)]
    pub package_height: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeHandoffRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerAddressResponse {
    pub customer_id: String,
    pub full_name: String,
    pub address: String,
}
