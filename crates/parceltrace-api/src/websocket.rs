//! WebSocket fan-out.
//!
//! Endpoint `/delivery-events`, JWT in the handshake (query `token` or
//! `Authorization` header). Clients subscribe per delivery or per user;
//! the gateway filters before pushing: a client only receives events for
//! deliveries where the authenticated user is a party, or anything when
//! ADMIN. Errors ride on `system:error` frames with the same shape as the
//! HTTP failure envelope.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;

use parceltrace_types::{CustodyError, DeliveryEvent, Role};

use crate::error::ApiError;
use crate::events::RoutedEvent;
use crate::state::AppState;

/// Handshake auth: `?token=<jwt>` or the `Authorization` header.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// Client→server messages.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClientMessage {
    #[serde(rename = "subscribe:delivery", rename_all = "camelCase")]
    SubscribeDelivery { delivery_id: String },
    #[serde(rename = "subscribe:user", rename_all = "camelCase")]
    SubscribeUser { user_id: String },
}

pub async fn delivery_events_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsAuthQuery>,
    headers: HeaderMap,
) -> Response {
    let token = query.token.or_else(|| {
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
    });
    let claims = match token {
        Some(token) => state.jwt.validate(&token),
        None => Err(CustodyError::unauthenticated("missing token in WebSocket handshake")),
    };
    match claims {
        Ok(claims) => {
            let role = claims.role;
            let user_id = claims.sub;
            ws.on_upgrade(move |socket| handle_socket(socket, state, user_id, role))
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_id: String, role: Role) {
    let (mut sink, mut stream) = socket.split();
    let mut bus = state.events.subscribe();
    let max_subscriptions = state.config.max_subscriptions_per_socket;

    let mut delivery_subs: HashSet<String> = HashSet::new();
    let mut user_subs: HashSet<String> = HashSet::new();

    tracing::debug!(user_id = %user_id, "WebSocket connected");

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_message(
                            &text,
                            &user_id,
                            role,
                            max_subscriptions,
                            &mut delivery_subs,
                            &mut user_subs,
                        );
                        if sink.send(Message::Text(reply)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            event = bus.recv() => {
                match event {
                    Ok(routed) => {
                        if !should_push(&routed, &user_id, role, &delivery_subs, &user_subs) {
                            continue;
                        }
                        match event_frame(&routed) {
                            Some(frame) => {
                                if sink.send(Message::Text(frame)).await.is_err() {
                                    break;
                                }
                            }
                            None => {
                                tracing::error!(tx_id = %routed.tx_id, "unencodable event frame");
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // The client missed events and must re-sync by
                        // polling; replays are already part of the contract.
                        tracing::warn!(user_id = %user_id, skipped, "WebSocket subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!(user_id = %user_id, "WebSocket disconnected");
}

fn handle_client_message(
    text: &str,
    user_id: &str,
    role: Role,
    max_subscriptions: usize,
    delivery_subs: &mut HashSet<String>,
    user_subs: &mut HashSet<String>,
) -> String {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            return error_frame("INVALID_ARGUMENT", &format!("unparseable message: {}", err));
        }
    };

    if delivery_subs.len() + user_subs.len() >= max_subscriptions {
        return error_frame(
            "SUBSCRIPTION_LIMIT",
            &format!("at most {} subscriptions per connection", max_subscriptions),
        );
    }

    match message {
        ClientMessage::SubscribeDelivery { delivery_id } => {
            delivery_subs.insert(delivery_id.clone());
            ack_frame(&format!("delivery:{}", delivery_id))
        }
        ClientMessage::SubscribeUser { user_id: target } => {
            if target != user_id && role != Role::Admin {
                return error_frame("NOT_AUTHORIZED", "user subscriptions are restricted to yourself");
            }
            user_subs.insert(target.clone());
            ack_frame(&format!("user:{}", target))
        }
    }
}

/// Visibility filter: subscription match plus involvement-or-ADMIN.
fn should_push(
    routed: &RoutedEvent,
    user_id: &str,
    role: Role,
    delivery_subs: &HashSet<String>,
    user_subs: &HashSet<String>,
) -> bool {
    let authorized = role == Role::Admin || routed.parties.iter().any(|p| p == user_id);
    if !authorized {
        return false;
    }
    let delivery_match = delivery_subs.contains(routed.event.delivery_id().as_str());
    let user_match = user_subs.iter().any(|u| routed.parties.iter().any(|p| p == u));
    delivery_match || user_match
}

fn event_frame(routed: &RoutedEvent) -> Option<String> {
    let (channel, data) = match &routed.event {
        DeliveryEvent::Created(e) => ("delivery:created", serde_json::to_value(e).ok()?),
        DeliveryEvent::StatusChanged(e) => ("delivery:statusChanged", serde_json::to_value(e).ok()?),
        DeliveryEvent::HandoffInitiated(e) => ("handoff:initiated", serde_json::to_value(e).ok()?),
        DeliveryEvent::HandoffConfirmed(e) => ("handoff:confirmed", serde_json::to_value(e).ok()?),
        DeliveryEvent::HandoffDisputed(e) => ("handoff:disputed", serde_json::to_value(e).ok()?),
    };
    serde_json::to_string(&json!({
        "type": channel,
        "data": data,
        "transactionId": routed.tx_id,
        "blockNumber": routed.block_number,
    }))
    .ok()
}

fn ack_frame(channel: &str) -> String {
    json!({ "type": "subscribed", "channel": channel }).to_string()
}

fn error_frame(code: &str, message: &str) -> String {
    json!({
        "type": "system:error",
        "success": false,
        "code": code,
        "message": message,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parceltrace_types::{DeliveryCreated, DeliveryId, DeliveryStatus};

    fn routed(parties: &[&str]) -> RoutedEvent {
        RoutedEvent {
            event: DeliveryEvent::Created(DeliveryCreated {
                delivery_id: DeliveryId::parse("DEL-20260101-AAAAAAAA").unwrap(),
                order_id: "order-1".to_string(),
                new_status: DeliveryStatus::PendingPickup,
                timestamp: Utc::now(),
            }),
            tx_id: "tx-1".to_string(),
            block_number: 7,
            parties: parties.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn push_requires_party_or_admin() {
        let event = routed(&["seller-1", "customer-1"]);
        let mut delivery_subs = HashSet::new();
        delivery_subs.insert("DEL-20260101-AAAAAAAA".to_string());
        let user_subs = HashSet::new();

        assert!(should_push(&event, "seller-1", Role::Seller, &delivery_subs, &user_subs));
        assert!(should_push(&event, "admin-1", Role::Admin, &delivery_subs, &user_subs));
        assert!(!should_push(&event, "stranger", Role::Customer, &delivery_subs, &user_subs));
    }

    #[test]
    fn push_requires_a_matching_subscription() {
        let event = routed(&["seller-1"]);
        let empty = HashSet::new();
        assert!(!should_push(&event, "seller-1", Role::Seller, &empty, &empty));

        let mut user_subs = HashSet::new();
        user_subs.insert("seller-1".to_string());
        assert!(should_push(&event, "seller-1", Role::Seller, &empty, &user_subs));
    }

    #[test]
    fn frames_carry_commit_coordinates() {
        let frame = event_frame(&routed(&["seller-1"])).unwrap();
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["type"], "delivery:created");
        assert_eq!(json["transactionId"], "tx-1");
        assert_eq!(json["blockNumber"], 7);
        assert_eq!(json["data"]["deliveryId"], "DEL-20260101-AAAAAAAA");
    }

    #[test]
    fn subscription_protocol_acks_and_limits() {
        let mut delivery_subs = HashSet::new();
        let mut user_subs = HashSet::new();

        let ack = handle_client_message(
            r#"{"type": "subscribe:delivery", "deliveryId": "DEL-20260101-AAAAAAAA"}"#,
            "user-1",
            Role::Customer,
            2,
            &mut delivery_subs,
            &mut user_subs,
        );
        assert!(ack.contains("subscribed"));
        assert!(delivery_subs.contains("DEL-20260101-AAAAAAAA"));

        // Only admin may watch someone else.
        let denied = handle_client_message(
            r#"{"type": "subscribe:user", "userId": "someone-else"}"#,
            "user-1",
            Role::Customer,
            2,
            &mut delivery_subs,
            &mut user_subs,
        );
        assert!(denied.contains("NOT_AUTHORIZED"));

        let ack = handle_client_message(
            r#"{"type": "subscribe:user", "userId": "user-1"}"#,
            "user-1",
            Role::Customer,
            2,
            &mut delivery_subs,
            &mut user_subs,
        );
        assert!(ack.contains("subscribed"));

        // Ceiling hit: the third subscription is rejected.
        let limited = handle_client_message(
            r#"{"type": "subscribe:delivery", "deliveryId": "DEL-20260101-BBBBBBBB"}"#,
            "user-1",
            Role::Customer,
            2,
            &mut delivery_subs,
            &mut user_subs,
        );
        assert!(limited.contains("SUBSCRIPTION_LIMIT"));
    }

    #[test]
    fn malformed_messages_get_error_frames() {
        let mut delivery_subs = HashSet::new();
        let mut user_subs = HashSet::new();
        let reply = handle_client_message(
            "not json",
            "user-1",
            Role::Customer,
            10,
            &mut delivery_subs,
            &mut user_subs,
        );
        assert!(reply.contains("system:error"));
        assert!(reply.contains("INVALID_ARGUMENT"));
    }
}
