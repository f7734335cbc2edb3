//! ParcelTrace gateway.
//!
//! The HTTP/WebSocket front-end over the delivery ledger: authenticates
//! end users, brokers CA enrolment, routes REST calls to the chaincode
//! under each caller's own identity, and fans ledger events out to
//! subscribed WebSocket clients.

pub mod dto;
pub mod error;
pub mod events;
pub mod extractors;
pub mod gateway;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use events::{event_bus, EventConsumer, RoutedEvent};
pub use gateway::{GatewayHandle, GatewayRegistry};
pub use routes::create_router;
pub use state::{ApiConfig, AppState};
