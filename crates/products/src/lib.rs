//! Product catalog domain module.
//!
//! Products are per-company catalog entries whose stock is only ever lowered
//! by approved orders. Pure logic: no IO, no storage.

pub mod product;

pub use product::{Product, StockDeduction, INSUFFICIENT_STOCK};
