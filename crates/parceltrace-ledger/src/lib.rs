//! ParcelTrace ledger client.
//!
//! Models the ledger platform as one interface: `submit`, `evaluate`,
//! `get_history`, and `subscribe_events`, plus the [`Signer`] factory that
//! binds an enrolled certificate to its private key. The
//! [`EmbeddedLedger`] implementation runs the delivery contract in-process
//! with the platform's semantics: verified caller identity, staged
//! write-sets committed atomically, per-key history, and a broadcast event
//! stream stamped with `(txId, blockNumber)`.

pub mod embedded;
pub mod service;
pub mod signer;

pub use embedded::EmbeddedLedger;
pub use service::{CommitReceipt, LedgerEvent, LedgerService, LedgerTimeouts};
pub use signer::Signer;
