//! ParcelTrace Types - Canonical domain types for package-custody tracking
//!
//! This crate contains all foundational types for ParcelTrace with zero
//! dependencies on other parceltrace crates. It defines the complete type
//! system for:
//!
//! - Delivery records, statuses, and the pending-handoff phase
//! - Roles, organizations, and the role→org admission table
//! - Chaincode operation arguments and typed ledger events
//! - The shared custody error taxonomy
//!
//! # Architectural Invariants
//!
//! These types support the core custody invariants:
//!
//! 1. Exactly one custodian per delivery at any time
//! 2. A pending handoff exists iff the delivery is in a pending status
//! 3. Seller, customer, and order references are write-once
//! 4. Terminal statuses (confirmed, cancelled, disputed) are read-only

pub mod delivery;
pub mod error;
pub mod events;
pub mod identity;
pub mod ops;

pub use delivery::*;
pub use error::*;
pub use events::*;
pub use identity::*;
pub use ops::*;

/// Version of the ParcelTrace types schema
pub const TYPES_VERSION: &str = "0.1.0";
