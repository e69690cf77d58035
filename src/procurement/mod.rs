//! Procurement: purchase orders, goods receipts and landed costs

pub mod landed_cost;
pub mod purchase_order;

pub use landed_cost::*;
pub use purchase_order::*;
