//! The ledger event consumer.
//!
//! A supervised singleton task subscribes to the chaincode event stream
//! under the gateway's service identity, decodes each event, resolves the
//! delivery's party set, and republishes on the internal bus the WebSocket
//! layer fans out from. Transport loss triggers reconnection with
//! exponential backoff up to a ceiling; a dead consumer flips the health
//! flag the `/health` endpoint reports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use parceltrace_ledger::{LedgerEvent, LedgerService, Signer};
use parceltrace_types::{Delivery, DeliveryEvent};

/// Reconnect backoff base.
const BACKOFF_BASE: Duration = Duration::from_millis(500);
/// Reconnect backoff ceiling.
const BACKOFF_CAP: Duration = Duration::from_secs(30);
/// Consecutive reconnect attempts before the consumer gives up.
const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Bus capacity per subscriber.
const BUS_CAPACITY: usize = 256;

/// A decoded event plus routing metadata. Clients deduplicate on
/// `(tx_id, block_number)` after a replay.
#[derive(Debug, Clone)]
pub struct RoutedEvent {
    pub event: DeliveryEvent,
    pub tx_id: String,
    pub block_number: u64,
    /// Users that are a party to the delivery at routing time.
    pub parties: Vec<String>,
}

pub fn event_bus() -> broadcast::Sender<RoutedEvent> {
    broadcast::channel(BUS_CAPACITY).0
}

/// The singleton consumer worker.
pub struct EventConsumer {
    ledger: Arc<dyn LedgerService>,
    service_signer: Arc<Signer>,
    bus: broadcast::Sender<RoutedEvent>,
    healthy: Arc<AtomicBool>,
    /// Last known party set per delivery, used when the resolving read
    /// fails transiently.
    party_cache: DashMap<String, Vec<String>>,
}

impl EventConsumer {
    pub fn new(
        ledger: Arc<dyn LedgerService>,
        service_signer: Arc<Signer>,
        bus: broadcast::Sender<RoutedEvent>,
        healthy: Arc<AtomicBool>,
    ) -> Self {
        Self {
            ledger,
            service_signer,
            bus,
            healthy,
            party_cache: DashMap::new(),
        }
    }

    /// Spawn the consumer loop.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let mut attempts: u32 = 0;
        loop {
            let mut rx = self.ledger.subscribe_events();
            self.healthy.store(true, Ordering::Release);
            tracing::info!("event consumer subscribed");

            loop {
                match rx.recv().await {
                    Ok(event) => {
                        attempts = 0;
                        self.route(event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Subscribers re-sync by polling; events replay is
                        // tolerated, silent gaps are logged.
                        tracing::warn!(skipped, "event consumer lagged behind the stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            attempts += 1;
            if attempts > MAX_RECONNECT_ATTEMPTS {
                self.healthy.store(false, Ordering::Release);
                tracing::error!(
                    attempts,
                    "event stream lost; reconnect attempts exhausted, consumer stopping"
                );
                return;
            }
            let backoff = BACKOFF_BASE
                .saturating_mul(2u32.saturating_pow(attempts - 1))
                .min(BACKOFF_CAP);
            tracing::warn!(
                attempt = attempts,
                backoff_ms = backoff.as_millis() as u64,
                "event stream closed; reconnecting"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    async fn route(&self, raw: LedgerEvent) {
        let event = match DeliveryEvent::decode(&raw.name, &raw.payload) {
            Ok(event) => event,
            Err(err) => {
                tracing::error!(name = %raw.name, tx_id = %raw.tx_id, "undecodable event: {}", err);
                return;
            }
        };

        let delivery_id = event.delivery_id().as_str().to_string();
        let parties = self.resolve_parties(&delivery_id).await;

        // Send fails only with zero subscribers, which is fine.
        let _ = self.bus.send(RoutedEvent {
            event,
            tx_id: raw.tx_id,
            block_number: raw.block_number,
            parties,
        });
    }

    /// Resolve the delivery's party set under the service identity. Party
    /// membership changes with handoffs, so every event refreshes the
    /// cache; the cache only answers when the read fails.
    async fn resolve_parties(&self, delivery_id: &str) -> Vec<String> {
        let args = json!({ "deliveryId": delivery_id });
        let read = async {
            let bytes = self
                .ledger
                .evaluate(
                    &self.service_signer,
                    "ReadDelivery",
                    &serde_json::to_vec(&args).unwrap_or_default(),
                )
                .await?;
            serde_json::from_slice::<Delivery>(&bytes)
                .map_err(|e| parceltrace_types::CustodyError::internal(e.to_string()))
        };

        match read.await {
            Ok(delivery) => {
                let parties: Vec<String> =
                    delivery.parties().into_iter().map(str::to_string).collect();
                self.party_cache.insert(delivery_id.to_string(), parties.clone());
                parties
            }
            Err(err) => {
                tracing::warn!(delivery_id, "party resolution failed, using cache: {}", err);
                self.party_cache
                    .get(delivery_id)
                    .map(|cached| cached.value().clone())
                    .unwrap_or_default()
            }
        }
    }
}
