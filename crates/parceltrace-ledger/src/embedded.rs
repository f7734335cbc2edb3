//! Embedded ledger platform.
//!
//! A single-process stand-in for the multi-org ledger network: it verifies
//! the caller's certificate chain and proposal signature, executes the
//! delivery contract against a staged overlay, and commits the write-set,
//! history records, and events atomically. Writes are serialized through
//! one write lock, which is exactly the per-key conflict guarantee the
//! contract assumes.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use parceltrace_chaincode::{
    ClientIdentity, DeliveryContract, RawHistoryRecord, StateStore, TransactionContext,
};
use parceltrace_types::{CustodyError, Result};

use crate::service::{CommitReceipt, LedgerEvent, LedgerService};
use crate::signer::Signer;

/// Buffered events per subscriber before lag kicks in.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct LedgerState {
    state: HashMap<String, Vec<u8>>,
    history: HashMap<String, Vec<RawHistoryRecord>>,
    block_height: u64,
}

/// The in-process ledger.
pub struct EmbeddedLedger {
    channel_name: String,
    chaincode_name: String,
    /// Org trust roots keyed by MSP id.
    trust_roots: DashMap<String, VerifyingKey>,
    inner: RwLock<LedgerState>,
    events: broadcast::Sender<LedgerEvent>,
}

impl EmbeddedLedger {
    pub fn new(channel_name: impl Into<String>, chaincode_name: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            channel_name: channel_name.into(),
            chaincode_name: chaincode_name.into(),
            trust_roots: DashMap::new(),
            inner: RwLock::new(LedgerState::default()),
            events,
        }
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn chaincode_name(&self) -> &str {
        &self.chaincode_name
    }

    /// Register an organization CA root; certificates from unregistered
    /// MSPs are rejected at endorsement.
    pub fn register_trust_root(&self, msp_id: impl Into<String>, root_key_hex: &str) -> Result<()> {
        let bytes: [u8; 32] = hex::decode(root_key_hex)
            .ok()
            .and_then(|v| v.try_into().ok())
            .ok_or_else(|| {
                CustodyError::invalid_argument("rootKey", "expected 32 hex-encoded bytes")
            })?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|_| CustodyError::invalid_argument("rootKey", "not a valid ed25519 point"))?;
        self.trust_roots.insert(msp_id.into(), key);
        Ok(())
    }

    /// Verify the certificate chain and proof of key possession, and derive
    /// the endorsing client identity.
    fn authenticate(&self, signer: &Signer, fn_name: &str, args: &[u8]) -> Result<ClientIdentity> {
        let cert = signer.certificate();
        let root = self.trust_roots.get(&cert.document.msp_id).ok_or_else(|| {
            CustodyError::not_authorized(format!("unknown MSP '{}'", cert.document.msp_id))
        })?;
        cert.verify(root.value(), Utc::now())?;

        let proposal = self.proposal_bytes(fn_name, args);
        let sig_bytes: [u8; 64] = hex::decode(signer.sign(&proposal))
            .ok()
            .and_then(|v| v.try_into().ok())
            .ok_or_else(|| CustodyError::not_authorized("malformed proposal signature"))?;
        cert.subject_key()?
            .verify(&proposal, &Signature::from_bytes(&sig_bytes))
            .map_err(|_| CustodyError::not_authorized("proposal signature does not verify"))?;

        Ok(ClientIdentity {
            msp_id: cert.document.msp_id.clone(),
            enrollment_id: cert.document.enrollment_id.clone(),
            attributes: cert.document.attributes.clone(),
        })
    }

    fn proposal_bytes(&self, fn_name: &str, args: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(
            self.channel_name.len() + self.chaincode_name.len() + fn_name.len() + args.len() + 3,
        );
        for part in [self.channel_name.as_bytes(), self.chaincode_name.as_bytes(), fn_name.as_bytes()] {
            bytes.extend_from_slice(part);
            bytes.push(0);
        }
        bytes.extend_from_slice(args);
        bytes
    }
}

/// Read-through overlay the contract executes against; writes are staged
/// and only applied by the commit path.
struct StagedState<'a> {
    base: &'a HashMap<String, Vec<u8>>,
    history: &'a HashMap<String, Vec<RawHistoryRecord>>,
    writes: Vec<(String, Vec<u8>)>,
}

impl StateStore for StagedState<'_> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some((_, value)) = self.writes.iter().rev().find(|(k, _)| k == key) {
            return Ok(Some(value.clone()));
        }
        Ok(self.base.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        self.writes.push((key.to_string(), value));
        Ok(())
    }

    fn scan(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let mut merged: HashMap<&str, &Vec<u8>> =
            self.base.iter().map(|(k, v)| (k.as_str(), v)).collect();
        for (key, value) in &self.writes {
            merged.insert(key.as_str(), value);
        }
        Ok(merged
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect())
    }

    fn history(&self, key: &str) -> Result<Vec<RawHistoryRecord>> {
        Ok(self.history.get(key).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl LedgerService for EmbeddedLedger {
    async fn submit(&self, signer: &Signer, fn_name: &str, args: &[u8]) -> Result<CommitReceipt> {
        let identity = self.authenticate(signer, fn_name, args)?;
        let timestamp = Utc::now();

        let mut guard = self.inner.write().await;
        let (payload, writes, emitted) = {
            let mut staged = StagedState {
                base: &guard.state,
                history: &guard.history,
                writes: Vec::new(),
            };
            let mut ctx = TransactionContext::new(identity, timestamp, &mut staged);
            let payload = DeliveryContract::invoke(&mut ctx, fn_name, args)?;
            let emitted = ctx.into_events();
            (payload, std::mem::take(&mut staged.writes), emitted)
        };

        guard.block_height += 1;
        let block_number = guard.block_height;
        let tx_id = Uuid::new_v4().to_string();
        for (key, value) in writes {
            guard.history.entry(key.clone()).or_default().push(RawHistoryRecord {
                tx_id: tx_id.clone(),
                timestamp,
                value: Some(value.clone()),
                is_delete: false,
            });
            guard.state.insert(key, value);
        }
        drop(guard);

        for (name, payload) in emitted {
            // Send fails only when nobody subscribes; events are not durable.
            let _ = self.events.send(LedgerEvent {
                name,
                payload,
                tx_id: tx_id.clone(),
                block_number,
            });
        }

        tracing::debug!(tx_id = %tx_id, block_number, fn_name, "transaction committed");
        Ok(CommitReceipt { tx_id, block_number, payload })
    }

    async fn evaluate(&self, signer: &Signer, fn_name: &str, args: &[u8]) -> Result<Vec<u8>> {
        let identity = self.authenticate(signer, fn_name, args)?;
        let timestamp = Utc::now();
        if DeliveryContract::is_mutation(fn_name) {
            tracing::debug!(fn_name, "mutation evaluated; its writes will be discarded");
        }

        let guard = self.inner.read().await;
        let mut staged = StagedState {
            base: &guard.state,
            history: &guard.history,
            writes: Vec::new(),
        };
        let mut ctx = TransactionContext::new(identity, timestamp, &mut staged);
        // Staged writes and events are discarded: evaluation never commits.
        DeliveryContract::invoke(&mut ctx, fn_name, args)
    }

    async fn get_history(&self, signer: &Signer, key: &str) -> Result<Vec<RawHistoryRecord>> {
        self.authenticate(signer, "GetHistory", key.as_bytes())?;
        let guard = self.inner.read().await;
        Ok(guard.history.get(key).cloned().unwrap_or_default())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }
}
