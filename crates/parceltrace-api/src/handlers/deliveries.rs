//! Delivery read and custodian handlers.
//!
//! Every ledger call goes out under the caller's own identity; the
//! role checks here are a coarse filter and the chaincode remains the
//! authority.

use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;

use parceltrace_types::{
    op_names, CancelDeliveryArgs, CustodyError, Delivery, GetDeliveryHistoryArgs, HistoryRecord,
    Location, QueryByCustodianArgs, ReadDeliveryArgs, Role, UpdateLocationArgs,
};

use crate::dto::{ApiResponse, CustomerAddressResponse, UpdateLocationRequest};
use crate::error::ApiResult;
use crate::extractors::AuthenticatedUser;
use crate::state::AppState;

/// `QueryDeliveriesByCustodian(self)`.
pub async fn my_deliveries(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<Json<ApiResponse<Vec<Delivery>>>> {
    let handle = state.gateways.handle_for(&user.user_id)?;
    let deliveries: Vec<Delivery> = handle
        .evaluate_json(
            op_names::QUERY_DELIVERIES_BY_CUSTODIAN,
            &QueryByCustodianArgs { custodian_id: user.user_id.clone() },
        )
        .await?;
    let count = deliveries.len();
    Ok(Json(ApiResponse::list(deliveries, count)))
}

pub async fn get_delivery(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(delivery_id): Path<String>,
) -> ApiResult<Json<ApiResponse<Delivery>>> {
    let handle = state.gateways.handle_for(&user.user_id)?;
    let delivery: Delivery = handle
        .evaluate_json(op_names::READ_DELIVERY, &ReadDeliveryArgs { delivery_id })
        .await?;
    Ok(Json(ApiResponse::ok(delivery)))
}

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(delivery_id): Path<String>,
) -> ApiResult<Json<ApiResponse<Vec<HistoryRecord>>>> {
    user.require_role(&[Role::Seller, Role::Customer, Role::Admin])?;
    let handle = state.gateways.handle_for(&user.user_id)?;
    let records: Vec<HistoryRecord> = handle
        .evaluate_json(op_names::GET_DELIVERY_HISTORY, &GetDeliveryHistoryArgs { delivery_id })
        .await?;
    let count = records.len();
    Ok(Json(ApiResponse::list(records, count)))
}

/// Off-ledger lookup of the customer's address, for the driver holding (or
/// about to hold) the package.
pub async fn get_customer_address(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(delivery_id): Path<String>,
) -> ApiResult<Json<ApiResponse<CustomerAddressResponse>>> {
    user.require_role(&[Role::DeliveryPerson, Role::Admin])?;

    let handle = state.gateways.handle_for(&user.user_id)?;
    let delivery: Delivery = handle
        .evaluate_json(op_names::READ_DELIVERY, &ReadDeliveryArgs { delivery_id })
        .await?;

    if user.role == Role::DeliveryPerson {
        let holds_custody = delivery.current_custodian_id == user.user_id;
        let inbound = delivery
            .pending_handoff
            .as_ref()
            .map(|h| h.to_user_id == user.user_id)
            .unwrap_or(false);
        if !holds_custody && !inbound {
            return Err(CustodyError::not_authorized(
                "address is visible to the custodian or the pending recipient only",
            )
            .into());
        }
    }

    let customer = state
        .store
        .user_by_id(&delivery.customer_id)
        .await?
        .ok_or_else(|| CustodyError::not_found("User", delivery.customer_id.clone()))?;
    let address = customer
        .address
        .ok_or_else(|| CustodyError::not_found("Address", customer.user_id.clone()))?;

    Ok(Json(ApiResponse::ok(CustomerAddressResponse {
        customer_id: customer.user_id,
        full_name: customer.full_name,
        address,
    })))
}

pub async fn update_location(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(delivery_id): Path<String>,
    Json(request): Json<UpdateLocationRequest>,
) -> ApiResult<Json<ApiResponse<Delivery>>> {
    user.require_role(&[Role::DeliveryPerson])?;
    let handle = state.gateways.handle_for(&user.user_id)?;
    let receipt = handle
        .submit(
            op_names::UPDATE_LOCATION,
            &UpdateLocationArgs {
                delivery_id,
                last_location: Location {
                    city: request.city,
                    state: request.state,
                    country: request.country,
                },
            },
        )
        .await?;
    let delivery: Delivery = serde_json::from_slice(&receipt.payload)
        .map_err(|e| CustodyError::internal(format!("delivery decode: {}", e)))?;
    Ok(Json(ApiResponse::ok(delivery)))
}

pub async fn cancel_delivery(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(delivery_id): Path<String>,
) -> ApiResult<Json<ApiResponse<Delivery>>> {
    user.require_role(&[Role::Customer])?;
    let handle = state.gateways.handle_for(&user.user_id)?;
    let receipt = handle
        .submit(op_names::CANCEL_DELIVERY, &CancelDeliveryArgs { delivery_id })
        .await?;
    let delivery: Delivery = serde_json::from_slice(&receipt.payload)
        .map_err(|e| CustodyError::internal(format!("delivery decode: {}", e)))?;
    Ok(Json(ApiResponse::ok(delivery)))
}
