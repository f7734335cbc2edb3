//! Route definitions.

use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::websocket;

/// The full gateway router: `/api/v1`, the event socket, and health.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .route("/delivery-events", get(websocket::delivery_events_handler))
        .route("/health", get(handlers::health::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Auth
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        // Shop items
        .route("/shop-items", post(handlers::shop::create_item))
        .route("/shop-items", get(handlers::shop::list_items))
        .route("/shop-items/:id", get(handlers::shop::get_item))
        // Orders
        .route("/orders", post(handlers::orders::create_order))
        .route("/orders/:id/confirm", post(handlers::orders::confirm_order))
        .route("/orders/:id/cancel", put(handlers::orders::cancel_order))
        // Deliveries
        .route("/deliveries/my", get(handlers::deliveries::my_deliveries))
        .route("/deliveries/:id", get(handlers::deliveries::get_delivery))
        .route("/deliveries/:id/history", get(handlers::deliveries::get_history))
        .route("/deliveries/:id/address", get(handlers::deliveries::get_customer_address))
        .route("/deliveries/:id/location", put(handlers::deliveries::update_location))
        .route("/deliveries/:id/cancel", put(handlers::deliveries::cancel_delivery))
        // Handoffs
        .route("/deliveries/:id/handoff/initiate", post(handlers::handoffs::initiate))
        .route("/deliveries/:id/handoff/confirm", post(handlers::handoffs::confirm))
        .route("/deliveries/:id/handoff/dispute", post(handlers::handoffs::dispute))
        .route("/deliveries/:id/handoff/cancel", post(handlers::handoffs::cancel))
}
