//! Orders module (event-sourced lifecycle, state persisted as a record).
//!
//! This crate contains the order state machine, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod order;

pub use order::{
    AddItem, Cancel, Confirm, CreateOrder, Deliver, ItemAdded, MarkProcessed, Order,
    OrderCancelled, OrderCommand, OrderConfirmed, OrderCreated, OrderDelivered, OrderEvent,
    OrderId, OrderItem, OrderProcessed, OrderRecord, OrderShipped, OrderStatus, Ship,
};
