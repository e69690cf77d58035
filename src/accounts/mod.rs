//! Accounts and finance: trading parties, invoices, payments and expenses

pub mod expense;
pub mod invoice;
pub mod party;
pub mod payment;

pub use expense::*;
pub use invoice::*;
pub use party::*;
pub use payment::*;
