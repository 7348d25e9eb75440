//! Product catalog module.
//!
//! Products are plain entities: catalog management edits them directly and
//! only the fulfillment engine changes `stock` as a result of orders.

pub mod product;

pub use product::{available, CategoryId, NewProduct, Product, ProductId, StockStatus, SupplierId};
