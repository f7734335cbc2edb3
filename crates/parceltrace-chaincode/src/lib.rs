//! ParcelTrace delivery chaincode.
//!
//! Runs inside the ledger's endorsement environment: single-threaded per
//! transaction, deterministic, no clock or randomness of its own. The
//! platform supplies a [`context::TransactionContext`] (verified caller
//! identity, transaction timestamp, staged world state) and commits the
//! write-set atomically when an operation succeeds.
//!
//! # Custody invariants
//!
//! 1. A delivery is created `PENDING_PICKUP` with the seller as custodian
//! 2. A pending handoff exists iff the status is one of the three pending
//!    statuses; at most one handoff is in flight per delivery
//! 3. Only the handoff target confirms or disputes; only the initiator
//!    cancels; custody changes on confirm alone
//! 4. `CONFIRMED_DELIVERY`, `CANCELLED`, and the `DISPUTED_*` statuses are
//!    terminal
//! 5. `sellerId`, `customerId`, and `orderId` are write-once

pub mod context;
pub mod contract;

pub use context::{ClientIdentity, RawHistoryRecord, StateStore, TransactionContext};
pub use contract::DeliveryContract;
