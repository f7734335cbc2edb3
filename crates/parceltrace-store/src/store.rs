//! The entity-store seam.
//!
//! CRUD plus the secondary-index lookups the gateway needs. The storage
//! backend is deliberately opaque; the in-memory implementation in
//! [`crate::memory`] is the reference, and a document database plugs in
//! behind the same trait.

use async_trait::async_trait;

use parceltrace_types::Result;

use crate::models::{Order, ShopItem, User, UserStatus};

#[async_trait]
pub trait EntityStore: Send + Sync {
    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Create a user; `CONFLICT` when the username is taken.
    async fn create_user(&self, user: User) -> Result<()>;
    async fn user_by_id(&self, user_id: &str) -> Result<Option<User>>;
    async fn user_by_username(&self, username: &str) -> Result<Option<User>>;
    /// Flip the account lifecycle flag (enrolment rollback path).
    async fn set_user_status(&self, user_id: &str, status: UserStatus) -> Result<()>;

    // ------------------------------------------------------------------
    // Shop items
    // ------------------------------------------------------------------

    async fn create_item(&self, item: ShopItem) -> Result<()>;
    async fn item_by_id(&self, item_id: &str) -> Result<Option<ShopItem>>;
    async fn list_items(&self) -> Result<Vec<ShopItem>>;
    async fn items_by_seller(&self, seller_id: &str) -> Result<Vec<ShopItem>>;

    // ------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------

    async fn create_order(&self, order: Order) -> Result<()>;
    async fn order_by_id(&self, order_id: &str) -> Result<Option<Order>>;
    /// Replace an existing order record (status / delivery link updates).
    async fn update_order(&self, order: Order) -> Result<()>;
    async fn orders_by_customer(&self, customer_id: &str) -> Result<Vec<Order>>;
    async fn orders_by_seller(&self, seller_id: &str) -> Result<Vec<Order>>;
}
