//! Shop-item handlers (off-ledger catalog).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use parceltrace_store::ShopItem;
use parceltrace_types::{CustodyError, Role};

use crate::dto::{ApiResponse, CreateShopItemRequest};
use crate::error::ApiResult;
use crate::extractors::AuthenticatedUser;
use crate::state::AppState;

pub async fn create_item(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(request): Json<CreateShopItemRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<ShopItem>>)> {
    user.require_role(&[Role::Seller])?;
    if request.name.trim().is_empty() {
        return Err(CustodyError::invalid_argument("name", "must be non-empty").into());
    }
    if request.price_cents < 0 {
        return Err(CustodyError::invalid_argument("priceCents", "must be >= 0").into());
    }

    let item = ShopItem {
        item_id: Uuid::new_v4().to_string(),
        seller_id: user.user_id,
        name: request.name.trim().to_string(),
        description: request.description,
        price_cents: request.price_cents,
        quantity_available: request.quantity_available,
        created_at: Utc::now(),
    };
    state.store.create_item(item.clone()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(item))))
}

pub async fn list_items(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
) -> ApiResult<Json<ApiResponse<Vec<ShopItem>>>> {
    let items = state.store.list_items().await?;
    let count = items.len();
    Ok(Json(ApiResponse::list(items, count)))
}

pub async fn get_item(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(item_id): Path<String>,
) -> ApiResult<Json<ApiResponse<ShopItem>>> {
    let item = state
        .store
        .item_by_id(&item_id)
        .await?
        .ok_or(CustodyError::NotFound { resource: "ShopItem".to_string(), id: item_id })?;
    Ok(Json(ApiResponse::ok(item)))
}
