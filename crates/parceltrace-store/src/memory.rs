//! In-memory entity store.
//!
//! DashMap-backed primary maps with a username secondary index. Suits
//! single-binary deployments and tests; production swaps a document store
//! behind the same trait.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use parceltrace_types::{CustodyError, Result};

use crate::models::{Order, ShopItem, User, UserStatus};
use crate::store::EntityStore;

#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<String, User>,
    usernames: DashMap<String, String>,
    items: DashMap<String, ShopItem>,
    orders: DashMap<String, Order>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn create_user(&self, user: User) -> Result<()> {
        use dashmap::mapref::entry::Entry;
        match self.usernames.entry(user.username.clone()) {
            Entry::Occupied(_) => {
                return Err(CustodyError::conflict("User", user.username));
            }
            Entry::Vacant(slot) => {
                slot.insert(user.user_id.clone());
            }
        }
        self.users.insert(user.user_id.clone(), user);
        Ok(())
    }

    async fn user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.users.get(user_id).map(|u| u.value().clone()))
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        match self.usernames.get(username) {
            Some(user_id) => self.user_by_id(user_id.value()).await,
            None => Ok(None),
        }
    }

    async fn set_user_status(&self, user_id: &str, status: UserStatus) -> Result<()> {
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| CustodyError::not_found("User", user_id))?;
        user.status = status;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn create_item(&self, item: ShopItem) -> Result<()> {
        use dashmap::mapref::entry::Entry;
        match self.items.entry(item.item_id.clone()) {
            Entry::Occupied(_) => Err(CustodyError::conflict("ShopItem", item.item_id)),
            Entry::Vacant(slot) => {
                slot.insert(item);
                Ok(())
            }
        }
    }

    async fn item_by_id(&self, item_id: &str) -> Result<Option<ShopItem>> {
        Ok(self.items.get(item_id).map(|i| i.value().clone()))
    }

    async fn list_items(&self) -> Result<Vec<ShopItem>> {
        let mut items: Vec<ShopItem> = self.items.iter().map(|i| i.value().clone()).collect();
        items.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        Ok(items)
    }

    async fn items_by_seller(&self, seller_id: &str) -> Result<Vec<ShopItem>> {
        let mut items: Vec<ShopItem> = self
            .items
            .iter()
            .filter(|i| i.seller_id == seller_id)
            .map(|i| i.value().clone())
            .collect();
        items.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        Ok(items)
    }

    async fn create_order(&self, order: Order) -> Result<()> {
        use dashmap::mapref::entry::Entry;
        match self.orders.entry(order.order_id.clone()) {
            Entry::Occupied(_) => Err(CustodyError::conflict("Order", order.order_id)),
            Entry::Vacant(slot) => {
                slot.insert(order);
                Ok(())
            }
        }
    }

    async fn order_by_id(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.orders.get(order_id).map(|o| o.value().clone()))
    }

    async fn update_order(&self, order: Order) -> Result<()> {
        let mut existing = self
            .orders
            .get_mut(&order.order_id)
            .ok_or_else(|| CustodyError::not_found("Order", order.order_id.clone()))?;
        *existing = order;
        Ok(())
    }

    async fn orders_by_customer(&self, customer_id: &str) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|o| o.customer_id == customer_id)
            .map(|o| o.value().clone())
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    async fn orders_by_seller(&self, seller_id: &str) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|o| o.seller_id == seller_id)
            .map(|o| o.value().clone())
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }
}
