//! The ledger-client seam.
//!
//! One interface with three operations plus the signer factory; everything
//! platform-specific lives behind it. The gateway talks to this trait only,
//! so the embedded single-process platform and a remote multi-org network
//! are interchangeable deployments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use parceltrace_chaincode::RawHistoryRecord;
use parceltrace_types::Result;

use crate::signer::Signer;

/// Receipt for a committed transaction.
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    pub tx_id: String,
    pub block_number: u64,
    /// The operation's JSON result payload.
    pub payload: Vec<u8>,
}

/// A chaincode event as delivered on the event stream. Replays after a
/// reconnect are possible; `(tx_id, block_number)` identifies an event for
/// idempotent consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEvent {
    pub name: String,
    pub payload: Vec<u8>,
    pub tx_id: String,
    pub block_number: u64,
}

/// Contractual per-call ceilings (milliseconds). The gateway enforces
/// these even when the transport would allow longer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTimeouts {
    pub evaluate_ms: u64,
    pub endorse_ms: u64,
    pub submit_ms: u64,
    pub commit_status_ms: u64,
}

impl Default for LedgerTimeouts {
    fn default() -> Self {
        Self {
            evaluate_ms: 30_000,
            endorse_ms: 60_000,
            submit_ms: 60_000,
            commit_status_ms: 120_000,
        }
    }
}

/// The black-box ledger platform.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Endorse, order, and commit a transaction under the signer's
    /// identity. Returns once the write-set is committed.
    async fn submit(&self, signer: &Signer, fn_name: &str, args: &[u8]) -> Result<CommitReceipt>;

    /// Execute a read-only transaction under the signer's identity; no
    /// state is written regardless of what the function attempts.
    async fn evaluate(&self, signer: &Signer, fn_name: &str, args: &[u8]) -> Result<Vec<u8>>;

    /// The platform's raw history iterator for a key, oldest first.
    async fn get_history(&self, signer: &Signer, key: &str) -> Result<Vec<RawHistoryRecord>>;

    /// Subscribe to the chaincode event stream.
    fn subscribe_events(&self) -> broadcast::Receiver<LedgerEvent>;
}
