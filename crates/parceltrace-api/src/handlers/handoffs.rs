//! Two-phase handoff handlers.

use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;

use parceltrace_types::{
    op_names, CancelHandoffArgs, ConfirmHandoffArgs, CustodyError, Delivery, DisputeHandoffArgs,
    InitiateHandoffArgs, Location, PackageDimensions, ReadDeliveryArgs, Role,
};

use crate::dto::{ApiResponse, ConfirmHandoffRequest, DisputeHandoffRequest, InitiateHandoffRequest};
use crate::error::ApiResult;
use crate::extractors::AuthenticatedUser;
use crate::state::AppState;

fn decode_delivery(payload: &[u8]) -> Result<Delivery, CustodyError> {
    serde_json::from_slice(payload)
        .map_err(|e| CustodyError::internal(format!("delivery decode: {}", e)))
}

pub async fn initiate(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(delivery_id): Path<String>,
    Json(request): Json<InitiateHandoffRequest>,
) -> ApiResult<Json<ApiResponse<Delivery>>> {
    user.require_role(&[Role::Seller, Role::DeliveryPerson])?;
    let handle = state.gateways.handle_for(&user.user_id)?;
    let receipt = handle
        .submit(
            op_names::INITIATE_HANDOFF,
            &InitiateHandoffArgs {
                delivery_id,
                to_user_id: request.to_user_id,
                to_role: request.to_role,
            },
        )
        .await?;
    Ok(Json(ApiResponse::ok(decode_delivery(&receipt.payload)?)))
}

/// Confirm receipt of the package. Missing package fields fall back to the
/// delivery's current metrics.
pub async fn confirm(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(delivery_id): Path<String>,
    Json(request): Json<ConfirmHandoffRequest>,
) -> ApiResult<Json<ApiResponse<Delivery>>> {
    user.require_role(&[Role::DeliveryPerson, Role::Customer])?;
    let handle = state.gateways.handle_for(&user.user_id)?;

    // The pending recipient is a party, so this read is authorized.
    let current: Delivery = handle
        .evaluate_json(
            op_names::READ_DELIVERY,
            &ReadDeliveryArgs { delivery_id: delivery_id.clone() },
        )
        .await?;

    let args = ConfirmHandoffArgs {
        delivery_id,
        last_location: Location {
            city: request.city,
            state: request.state,
            country: request.country,
        },
        package_weight: request.package_weight.unwrap_or(current.package_weight),
        package_dimensions: PackageDimensions {
            length: request.package_length.unwrap_or(current.package_dimensions.length),
            width: request.package_width.unwrap_or(current.package_dimensions.width),
            height: request.package_height.unwrap_or(current.package_dimensions.height),
        },
    };
    let receipt = handle.submit(op_names::CONFIRM_HANDOFF, &args).await?;
    Ok(Json(ApiResponse::ok(decode_delivery(&receipt.payload)?)))
}

pub async fn dispute(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(delivery_id): Path<String>,
    Json(request): Json<DisputeHandoffRequest>,
) -> ApiResult<Json<ApiResponse<Delivery>>> {
    user.require_role(&[Role::DeliveryPerson, Role::Customer])?;
    let handle = state.gateways.handle_for(&user.user_id)?;
    let receipt = handle
        .submit(
            op_names::DISPUTE_HANDOFF,
            &DisputeHandoffArgs { delivery_id, reason: request.reason },
        )
        .await?;
    Ok(Json(ApiResponse::ok(decode_delivery(&receipt.payload)?)))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(delivery_id): Path<String>,
) -> ApiResult<Json<ApiResponse<Delivery>>> {
    user.require_role(&[Role::Seller, Role::DeliveryPerson])?;
    let handle = state.gateways.handle_for(&user.user_id)?;
    let receipt = handle
        .submit(op_names::CANCEL_HANDOFF, &CancelHandoffArgs { delivery_id })
        .await?;
    Ok(Json(ApiResponse::ok(decode_delivery(&receipt.payload)?)))
}
