//! Inventory: item master, stock ledger and inter-location transfers

pub mod stock;
pub mod transfer;

pub use stock::*;
pub use transfer::*;
