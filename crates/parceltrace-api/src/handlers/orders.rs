//! Order handlers.
//!
//! Orders live off-ledger; confirming one is the bridge onto the ledger:
//! the seller's confirmation submits `CreateDelivery` under the seller's
//! own identity and records the resulting delivery id on the order. The
//! order owns the order↔delivery link.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use parceltrace_store::{Order, OrderLine, OrderStatus};
use parceltrace_types::{
    op_names, CreateDeliveryArgs, CustodyError, Delivery, DeliveryId, Location,
    PackageDimensions, Role,
};

use crate::dto::{ApiResponse, ConfirmOrderRequest, CreateOrderRequest};
use crate::error::ApiResult;
use crate::extractors::AuthenticatedUser;
use crate::state::AppState;

pub async fn create_order(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(request): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Order>>)> {
    user.require_role(&[Role::Customer])?;
    if request.items.is_empty() {
        return Err(CustodyError::invalid_argument("items", "order must have items").into());
    }

    let seller = state
        .store
        .user_by_id(&request.seller_id)
        .await?
        .ok_or_else(|| CustodyError::not_found("User", request.seller_id.clone()))?;
    if seller.role != Role::Seller {
        return Err(CustodyError::invalid_argument("sellerId", "user is not a seller").into());
    }

    let mut items = Vec::with_capacity(request.items.len());
    for line in &request.items {
        if line.quantity == 0 {
            return Err(CustodyError::invalid_argument("items", "quantity must be > 0").into());
        }
        let item = state
            .store
            .item_by_id(&line.item_id)
            .await?
            .ok_or_else(|| CustodyError::not_found("ShopItem", line.item_id.clone()))?;
        if item.seller_id != request.seller_id {
            return Err(CustodyError::invalid_argument(
                "items",
                format!("item {} does not belong to the seller", line.item_id),
            )
            .into());
        }
        items.push(OrderLine { item_id: line.item_id.clone(), quantity: line.quantity });
    }

    let order = Order {
        order_id: Uuid::new_v4().to_string(),
        customer_id: user.user_id,
        seller_id: request.seller_id,
        items,
        status: OrderStatus::PendingConfirmation,
        delivery_id: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    state.store.create_order(order.clone()).await?;
    tracing::info!(order_id = %order.order_id, "order created");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(order))))
}

/// Seller confirmation: creates the on-ledger delivery.
pub async fn confirm_order(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(order_id): Path<String>,
    Json(request): Json<ConfirmOrderRequest>,
) -> ApiResult<Json<ApiResponse<Delivery>>> {
    user.require_role(&[Role::Seller])?;

    let mut order = state
        .store
        .order_by_id(&order_id)
        .await?
        .ok_or_else(|| CustodyError::not_found("Order", order_id.clone()))?;
    if order.seller_id != user.user_id {
        return Err(CustodyError::not_authorized("only the order's seller may confirm").into());
    }
    if order.status != OrderStatus::PendingConfirmation {
        return Err(CustodyError::invalid_state(format!(
            "order is {:?}, confirmation requires PENDING_CONFIRMATION",
            order.status
        ))
        .into());
    }

    let delivery_id = DeliveryId::mint(&Utc::now(), rand::random::<u32>());
    let args = CreateDeliveryArgs {
        delivery_id: delivery_id.as_str().to_string(),
        order_id: order.order_id.clone(),
        customer_id: order.customer_id.clone(),
        package_weight: request.package_weight,
        package_dimensions: PackageDimensions {
            length: request.package_length,
            width: request.package_width,
            height: request.package_height,
        },
        last_location: Location {
            city: request.city,
            state: request.state,
            country: request.country,
        },
    };

    let handle = state.gateways.handle_for(&user.user_id)?;
    let receipt = handle.submit(op_names::CREATE_DELIVERY, &args).await?;
    let delivery: Delivery = serde_json::from_slice(&receipt.payload)
        .map_err(|e| CustodyError::internal(format!("delivery decode: {}", e)))?;

    order.status = OrderStatus::Confirmed;
    order.delivery_id = Some(delivery_id.as_str().to_string());
    order.updated_at = Utc::now();
    state.store.update_order(order).await?;

    tracing::info!(order_id = %order_id, delivery_id = %delivery_id, tx_id = %receipt.tx_id, "order confirmed");
    Ok(Json(ApiResponse::ok(delivery)))
}

pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(order_id): Path<String>,
) -> ApiResult<Json<ApiResponse<Order>>> {
    user.require_role(&[Role::Customer])?;

    let mut order = state
        .store
        .order_by_id(&order_id)
        .await?
        .ok_or_else(|| CustodyError::not_found("Order", order_id.clone()))?;
    if order.customer_id != user.user_id {
        return Err(CustodyError::not_authorized("only the order's customer may cancel").into());
    }
    if order.status != OrderStatus::PendingConfirmation {
        return Err(CustodyError::invalid_state(
            "only an unconfirmed order can be cancelled here",
        )
        .into());
    }

    order.status = OrderStatus::Cancelled;
    order.updated_at = Utc::now();
    state.store.update_order(order.clone()).await?;
    Ok(Json(ApiResponse::ok(order)))
}
