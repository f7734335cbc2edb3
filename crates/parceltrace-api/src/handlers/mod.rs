//! HTTP handlers, grouped by resource.

pub mod auth;
pub mod deliveries;
pub mod handoffs;
pub mod health;
pub mod orders;
pub mod shop;
