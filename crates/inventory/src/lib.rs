//! Inventory domain module: stock movement ledger and order stock reduction.
//!
//! This crate contains the rules for deducting stock against an order,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage). The transactional boundary lives in the infrastructure layer.

pub mod events;
pub mod movement;
pub mod outcome;
pub mod reduction;

pub use events::{InventoryEvent, LowStockDetected, OrderFulfilled};
pub use movement::{
    ChainBreak, ChainBreakKind, MovementId, MovementType, ReferenceType, StockMovement,
    verify_chain,
};
pub use outcome::{InsufficientItem, ProcessOrderOutcome, StockUpdate};
pub use reduction::{
    LineItemRequest, PlannedDecrement, ProcessOrderRequest, ReductionPlan, StockSnapshot,
    plan_reduction,
};
