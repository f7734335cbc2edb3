//! ParcelTrace entity store.
//!
//! The off-ledger document store for users, shop items, and orders,
//! treated as an opaque collaborator: CRUD plus secondary-index queries
//! behind the [`EntityStore`] trait, with an in-memory reference
//! implementation.

pub mod memory;
pub mod models;
pub mod store;

pub use memory::MemoryStore;
pub use models::{Order, OrderLine, OrderStatus, ShopItem, User, UserStatus};
pub use store::EntityStore;
